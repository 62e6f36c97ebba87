//! Compilation sessions
//!
//! A [Session] owns a set of named functions, the configuration they are compiled with, and a
//! cursor on the active function. Pipelines run on one function at a time and end with
//! [Session::gen_he_artifacts], which selects rotation keys and places relinearizations.

use crate::cfg::Cfg;
use crate::error::{Error, Result};
use crate::ir::opt::eqsat::{equality_saturation, Oracle};
use crate::ir::opt::relin::insert_relin_ops;
use crate::ir::opt::rotkeys::reduce_rotation_keys;
use crate::ir::opt::trs::{rulesets, Ruleset};
use crate::ir::opt::{opt, Opt};
use crate::ir::term::eval::agree_on_random_inputs;
use crate::ir::term::{Func, InsertOpts};

use hecirc_opt::RewriteHeuristic;
use log::{debug, info, warn};
use serde::Serialize;

use std::collections::{BTreeMap, BTreeSet};

// Seed for post-oracle verification inputs.
const VERIFY_SEED: u64 = 0x6865_6369_7263;

/// What code generation needs besides the term graph.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Artifacts {
    /// The function
    pub func: String,
    /// Rotation steps that need keys
    pub rotation_keys: BTreeSet<i64>,
    /// Relinearizations inserted
    pub relin_count: usize,
    /// Operations of each kind in the final graph
    pub op_counts: BTreeMap<&'static str, usize>,
}

/// Named functions and how to compile them.
#[derive(Debug, Default)]
pub struct Session {
    cfg: Cfg,
    funcs: BTreeMap<String, Func>,
    active: Option<String>,
}

impl Session {
    /// An empty session.
    pub fn new(cfg: Cfg) -> Self {
        Session {
            cfg,
            funcs: BTreeMap::new(),
            active: None,
        }
    }

    /// The configuration
    pub fn cfg(&self) -> &Cfg {
        &self.cfg
    }

    /// Set the insertion toggles for functions created from now on.
    pub fn set_ir_opts(&mut self, opts: InsertOpts) {
        self.cfg.set_insert_opts(opts);
    }

    /// Create an empty function, which becomes the active one.
    pub fn create_func(
        &mut self,
        name: &str,
        slot_count: usize,
        bit_width: u32,
        signed: bool,
        need_cyclic_rotation: bool,
    ) -> Result<&mut Func> {
        let mut f = Func::new(name, slot_count, bit_width, signed, need_cyclic_rotation)?;
        f.set_insert_opts(self.cfg.insert_opts());
        self.add_func(f)?;
        self.active_func_mut()
    }

    /// Register a function built elsewhere, which becomes the active one.
    pub fn add_func(&mut self, f: Func) -> Result<()> {
        if self.funcs.contains_key(f.name()) {
            return Err(Error::DuplicateFunc(f.name().to_owned()));
        }
        debug!("New function '{}'", f.name());
        self.active = Some(f.name().to_owned());
        self.funcs.insert(f.name().to_owned(), f);
        Ok(())
    }

    /// The function named `name`
    pub fn get_func(&self, name: &str) -> Result<&Func> {
        self.funcs
            .get(name)
            .ok_or_else(|| Error::NoSuchFunc(name.to_owned()))
    }

    /// The function named `name`
    pub fn get_func_mut(&mut self, name: &str) -> Result<&mut Func> {
        self.funcs
            .get_mut(name)
            .ok_or_else(|| Error::NoSuchFunc(name.to_owned()))
    }

    /// Names of all functions
    pub fn func_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.funcs.keys().map(String::as_str)
    }

    /// Make `name` the active function.
    pub fn set_active_func(&mut self, name: &str) -> Result<()> {
        self.get_func(name)?;
        self.active = Some(name.to_owned());
        Ok(())
    }

    /// The active function
    pub fn active_func(&self) -> Result<&Func> {
        let name = self.active.as_deref().ok_or(Error::NoActiveFunc)?;
        self.get_func(name)
    }

    /// The active function
    pub fn active_func_mut(&mut self) -> Result<&mut Func> {
        let name = self.active.clone().ok_or(Error::NoActiveFunc)?;
        self.get_func_mut(&name)
    }

    /// Remove the function named `name`. If it was active, no function is.
    pub fn delete_func(&mut self, name: &str) -> Result<Func> {
        let f = self
            .funcs
            .remove(name)
            .ok_or_else(|| Error::NoSuchFunc(name.to_owned()))?;
        if self.active.as_deref() == Some(name) {
            self.active = None;
        }
        Ok(f)
    }

    fn func_and_cfg(&mut self, name: &str) -> Result<(&mut Func, &Cfg)> {
        let f = self
            .funcs
            .get_mut(name)
            .ok_or_else(|| Error::NoSuchFunc(name.to_owned()))?;
        Ok((f, &self.cfg))
    }

    /// Rewrite `name` with `ruleset`, then (optionally) with the logarithmic-sum rules, then merge
    /// commutative duplicates, and generate its artifacts.
    pub fn compile_trs(&mut self, name: &str, ruleset: &str) -> Result<Artifacts> {
        let ruleset =
            Ruleset::by_name(ruleset).ok_or_else(|| Error::UnknownRuleset(ruleset.to_owned()))?;
        let (f, cfg) = self.func_and_cfg(name)?;
        let mut passes = vec![Opt::Rewrite {
            ruleset,
            heuristic: cfg.trs.heuristic,
            max_passes: cfg.trs.max_passes,
        }];
        if cfg.trs.log2_reduct {
            passes.push(Opt::Rewrite {
                ruleset: rulesets::log2_reduct(),
                heuristic: RewriteHeuristic::TopDown,
                max_passes: cfg.trs.max_passes,
            });
        }
        passes.push(Opt::CseCommut);
        opt(f, passes)?;
        self.gen_he_artifacts(name)
    }

    /// [Session::compile_trs] with the configured ruleset.
    pub fn compile(&mut self, name: &str) -> Result<Artifacts> {
        let ruleset = self.cfg.ruleset().name();
        self.compile_trs(name, ruleset)
    }

    /// Simplify `name` with `oracle`, expand built-in sums, and generate its artifacts.
    ///
    /// When verification is on and the simplified function disagrees with the original on random
    /// inputs, the original is kept.
    pub fn compile_eqsat(&mut self, name: &str, oracle: &mut dyn Oracle) -> Result<Artifacts> {
        let (f, cfg) = self.func_and_cfg(name)?;
        let snapshot = cfg.eqsat.verify.then(|| f.clone());
        equality_saturation(f, oracle, cfg.eqsat.axiomatic, cfg.eqsat.window)?;
        if let Some(original) = snapshot {
            if !agree_on_random_inputs(&original, f, cfg.eqsat.verify_samples, VERIFY_SEED)? {
                warn!(
                    "Equality saturation changed the meaning of '{}'; keeping the original",
                    name
                );
                *f = original;
            }
        }
        opt(
            f,
            vec![Opt::Rewrite {
                ruleset: rulesets::sumvec_reduct(),
                heuristic: RewriteHeuristic::TopDown,
                max_passes: cfg.trs.max_passes,
            }],
        )?;
        self.gen_he_artifacts(name)
    }

    /// Select rotation keys (decomposing rotations if the budget requires it), then insert
    /// relinearizations.
    pub fn gen_he_artifacts(&mut self, name: &str) -> Result<Artifacts> {
        let (f, cfg) = self.func_and_cfg(name)?;
        let rotation_keys = reduce_rotation_keys(f, cfg.rot_keys.threshold)?;
        let relin_count = insert_relin_ops(f, cfg.relin.policy)?;
        info!(
            "'{}': {} rotation keys, {} relinearizations, {} terms",
            name,
            rotation_keys.len(),
            relin_count,
            f.term_count()
        );
        Ok(Artifacts {
            func: name.to_owned(),
            rotation_keys,
            relin_count,
            op_counts: f.op_counts(),
        })
    }
}
