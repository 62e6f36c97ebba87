//! Random functions, for property tests
#![allow(missing_docs)]

use super::*;

use quickcheck::{Arbitrary, Gen};
use rand::distributions::Distribution;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaChaRng;

/// A distribution of functions with `size` operations over a few inputs and constants.
pub struct FuncDist {
    pub size: usize,
    pub slot_count: usize,
    pub opts: InsertOpts,
}

impl FuncDist {
    fn random_op<R: Rng + ?Sized>(&self, rng: &mut R) -> OpCode {
        match rng.gen_range(0..9) {
            0 | 1 => OpCode::Add,
            2 => OpCode::Sub,
            3 | 4 => OpCode::Mul,
            5 => OpCode::Negate,
            6 => OpCode::Square,
            7 => {
                let n = self.slot_count as i64;
                OpCode::Rotate(rng.gen_range(-n..=n))
            }
            _ => OpCode::SumVec(rng.gen_range(0..=4)),
        }
    }
}

impl Distribution<Func> for FuncDist {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Func {
        let mut f = Func::new("rand", self.slot_count, 16, rng.gen(), true).unwrap();
        f.set_insert_opts(self.opts);
        let mut pool = vec![
            f.add_input("x", TermType::Cipher, (-8, 8)).unwrap(),
            f.add_input("y", TermType::Cipher, (0, 15)).unwrap(),
            f.add_input("p", TermType::Plain, (-3, 3)).unwrap(),
            f.add_scalar_const(rng.gen_range(-2..=2)).unwrap(),
        ];
        let v: Vec<i64> = (0..self.slot_count).map(|_| rng.gen_range(-4..=4)).collect();
        pool.push(f.add_const(v).unwrap());
        for _ in 0..self.size {
            let op = self.random_op(rng);
            // Favor recent terms, which makes deeper circuits.
            let operands: Vec<TermId> = (0..op.arity())
                .map(|_| {
                    if rng.gen_bool(0.6) {
                        pool[pool.len() - 1 - rng.gen_range(0..pool.len().min(3))]
                    } else {
                        *pool.choose(rng).unwrap()
                    }
                })
                .collect();
            let t = f.insert_op_term(op, operands).unwrap();
            pool.push(t);
        }
        f.set_output(*pool.last().unwrap(), "out").unwrap();
        if self.size > 1 && rng.gen_bool(0.5) {
            let t = pool[5 + rng.gen_range(0..self.size)];
            f.set_output(t, "aux").unwrap();
        }
        f
    }
}

/// A random function with cipher inputs `x`, `y`, plain input `p`, and output `out`.
#[derive(Clone)]
pub struct ArbitraryFunc(pub Func);

impl std::fmt::Debug for ArbitraryFunc {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        for t in self.0.data_flow().output_terms() {
            writeln!(f, "{}", self.0.expr_str(t))?;
        }
        Ok(())
    }
}

impl Arbitrary for ArbitraryFunc {
    fn arbitrary(g: &mut Gen) -> Self {
        let seed: u64 = Arbitrary::arbitrary(g);
        let mut rng = ChaChaRng::seed_from_u64(seed);
        let opts = InsertOpts {
            cse: Arbitrary::arbitrary(g),
            order_operands: Arbitrary::arbitrary(g),
            const_folding: Arbitrary::arbitrary(g),
        };
        let dist = FuncDist {
            size: 1 + g.size() % 24,
            slot_count: 8,
            opts,
        };
        ArbitraryFunc(dist.sample(&mut rng))
    }
}
