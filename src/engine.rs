//! Analysis Engine Abstraction
//!
//! The disassembler and symbolic executor run outside this crate. The
//! coordinator only sees the [`AnalysisEngine`] trait, which hands back one
//! [`EngineOutput`] per contract:
//! - [`FileEngine`] reads outputs dumped to a directory (offline replay, tests)
//! - [`CommandEngine`] runs an external analyzer and parses its stdout
//!
//! Engines signal caller-visible failures by returning a [`TaskError`]
//! through `anyhow`; anything else is reported as an engine failure.

use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{anyhow, Result};
use ctrleth_types::{EngineOutput, TaskError};
use tracing::debug;

use crate::config::EngineArgs;

/// Runs the expensive disassembly + symbolic execution for one contract.
///
/// Called from a blocking worker thread; implementations may block for as
/// long as the analysis takes.
pub trait AnalysisEngine: Send + Sync {
    fn analyze(&self, address: &str, args: &EngineArgs) -> Result<EngineOutput>;

    /// Engine name for logging.
    fn name(&self) -> &str;
}

/// Serves engine outputs stored as `<dir>/<address>.json`.
pub struct FileEngine {
    dir: PathBuf,
}

impl FileEngine {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn output_path(&self, address: &str) -> PathBuf {
        self.dir.join(format!("{}.json", address.to_lowercase()))
    }
}

impl AnalysisEngine for FileEngine {
    fn analyze(&self, address: &str, _args: &EngineArgs) -> Result<EngineOutput> {
        let path = self.output_path(address);
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(TaskError::not_found("No analysis result").into());
            }
            Err(e) => return Err(anyhow!("Failed to read {}: {}", path.display(), e)),
        };
        serde_json::from_slice(&bytes)
            .map_err(|e| anyhow!("Invalid engine output {}: {}", path.display(), e))
    }

    fn name(&self) -> &str {
        "file"
    }
}

/// Runs `program [args...] <address>` with the engine settings exported as
/// `ETHPECTOR_*` variables. Stdout must be one JSON [`EngineOutput`].
///
/// On a non-zero exit, a `{message, status}` object on stdout is passed
/// through as the task's error envelope.
pub struct CommandEngine {
    program: String,
    args: Vec<String>,
}

impl CommandEngine {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Split a shell-style command line on whitespace.
    pub fn from_command_line(command_line: &str) -> Result<Self> {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let program = parts
            .next()
            .ok_or_else(|| anyhow!("Engine command is empty"))?;
        Ok(Self {
            program,
            args: parts.collect(),
        })
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }
}

impl AnalysisEngine for CommandEngine {
    fn analyze(&self, address: &str, args: &EngineArgs) -> Result<EngineOutput> {
        if args.rpc.is_none() && args.etherscan_token.is_none() {
            return Err(TaskError::configuration_missing(
                "Etherscan token or node RPC needed for analysis",
            )
            .into());
        }

        debug!(program = %self.program, address, "spawning analyzer");
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(address)
            .envs(args.to_env())
            .output()
            .map_err(|e| anyhow!("Failed to run analyzer '{}': {}", self.program, e))?;

        if !output.status.success() {
            if let Ok(envelope) = serde_json::from_slice::<TaskError>(&output.stdout) {
                return Err(envelope.into());
            }
            let stderr = String::from_utf8_lossy(&output.stderr);
            let reason = stderr
                .lines()
                .rev()
                .find(|line| !line.trim().is_empty())
                .unwrap_or("no output");
            return Err(TaskError::engine_failure(format!(
                "Analyzer exited with {}: {}",
                output.status,
                reason.trim()
            ))
            .into());
        }

        serde_json::from_slice(&output.stdout)
            .map_err(|e| anyhow!("Analyzer produced invalid output: {}", e))
    }

    fn name(&self) -> &str {
        &self.program
    }
}
