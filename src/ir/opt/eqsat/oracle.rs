//! Optimizer oracles
//!
//! An [Oracle] takes a batch of prefix expressions and returns a simplified expression for each.
//! The bridge never trusts an oracle: every failure leaves the function as it was.

use log::{debug, trace};
use thiserror::Error;

use std::fs;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

/// The environment variable naming the file a [ProcessOracle] command writes its answer to.
pub const RESPONSE_VAR: &str = "HECIRC_RESPONSE";

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// What the oracle is told about the expressions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OracleParams {
    /// Vector width, for rotation arithmetic
    pub slot_count: usize,
    /// Admit axioms that only hold under wraparound rotation
    pub axiomatic: bool,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
/// Why an oracle gave no answer
pub enum OracleError {
    #[error("optimizer unavailable: {0}")]
    /// The oracle could not be run, or its files could not be accessed
    Unavailable(String),
    #[error("optimizer exited with {0}")]
    /// The oracle ran and failed
    Failed(String),
    #[error("optimizer did not finish within {0:?}")]
    /// The oracle was stopped
    Timeout(Duration),
    #[error("optimizer returned {found} expressions for {expected}")]
    /// The answer does not match the request
    ResponseMismatch {
        /// Expressions sent
        expected: usize,
        /// Expressions received
        found: usize,
    },
}

/// A global optimizer over prefix expressions.
pub trait Oracle {
    /// Simplify each of `exprs`, returning one expression per input, in order.
    fn optimize(
        &mut self,
        exprs: &[String],
        params: &OracleParams,
    ) -> Result<Vec<String>, OracleError>;
}

/// Returns its input.
#[derive(Clone, Copy, Debug, Default)]
pub struct IdentityOracle;

impl Oracle for IdentityOracle {
    fn optimize(&mut self, exprs: &[String], _: &OracleParams) -> Result<Vec<String>, OracleError> {
        Ok(exprs.to_vec())
    }
}

/// Runs an external optimizer.
///
/// The request (one expression per line) is written to a temporary file. The command is run
/// with the request path, the slot count and the axiomatic flag (`0` or `1`) appended to its
/// arguments, and must write its answer, one expression per line, to the path in
/// [RESPONSE_VAR].
#[derive(Clone, Debug)]
pub struct ProcessOracle {
    program: Option<String>,
    args: Vec<String>,
    timeout: Duration,
}

impl ProcessOracle {
    /// An oracle running `command` (split on whitespace), stopped after `timeout`.
    pub fn new(command: &str, timeout: Duration) -> Self {
        let mut words = command.split_whitespace().map(str::to_owned);
        ProcessOracle {
            program: words.next(),
            args: words.collect(),
            timeout,
        }
    }
}

fn unavailable(e: std::io::Error) -> OracleError {
    OracleError::Unavailable(e.to_string())
}

impl Oracle for ProcessOracle {
    fn optimize(
        &mut self,
        exprs: &[String],
        params: &OracleParams,
    ) -> Result<Vec<String>, OracleError> {
        let program = self
            .program
            .as_ref()
            .ok_or_else(|| OracleError::Unavailable("no command configured".into()))?;
        let dir = tempfile::tempdir().map_err(unavailable)?;
        let request = dir.path().join("expression.txt");
        let response = dir.path().join("simplified_expression.txt");
        let mut text = exprs.join("\n");
        text.push('\n');
        fs::write(&request, text).map_err(unavailable)?;
        debug!(
            "Running {} on {} expressions ({:?})",
            program,
            exprs.len(),
            params
        );
        let mut child = Command::new(program)
            .args(&self.args)
            .arg(&request)
            .arg(params.slot_count.to_string())
            .arg(if params.axiomatic { "1" } else { "0" })
            .env(RESPONSE_VAR, &response)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .spawn()
            .map_err(unavailable)?;
        let start = Instant::now();
        let status = loop {
            if let Some(status) = child.try_wait().map_err(unavailable)? {
                break status;
            }
            if start.elapsed() >= self.timeout {
                // The child may exit between the poll and the kill.
                let _ = child.kill();
                let _ = child.wait();
                return Err(OracleError::Timeout(self.timeout));
            }
            thread::sleep(POLL_INTERVAL);
        };
        if !status.success() {
            return Err(OracleError::Failed(status.to_string()));
        }
        let answer = fs::read_to_string(&response).map_err(unavailable)?;
        let lines: Vec<String> = answer
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_owned)
            .collect();
        trace!("optimizer answered {:?}", lines);
        if lines.len() != exprs.len() {
            return Err(OracleError::ResponseMismatch {
                expected: exprs.len(),
                found: lines.len(),
            });
        }
        Ok(lines)
    }
}
