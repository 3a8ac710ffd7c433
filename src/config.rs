//! Service and engine configuration.
//!
//! Everything can be set through the environment; the CLI overrides what it
//! is given on the command line.
//!
//! | Variable | Default |
//! |---|---|
//! | `CTRLETH_RPC` (or `ETHPECTOR_RPC`) | none |
//! | `ETHERSCAN_TOKEN` | none |
//! | `CTRLETH_SIGNATURE_URL` | `https://www.4byte.directory` |
//! | `CTRLETH_WORKERS` | 2 |
//! | `CTRLETH_ONCE_TTL_SECS` | 1200 |
//! | `CTRLETH_HOME` | `~/.ctrleth` |
//! | `CTRLETH_RPC_TIMEOUT_SECS` | 30 |

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::anyhow;
use clap::ValueEnum;
use ctrleth_transport::signatures::FOURBYTE_DIRECTORY;
use ctrleth_types::env_utils::{env_bool_or, env_first, env_string_or, env_var_or};
use serde::{Deserialize, Serialize};

pub fn ctrleth_home() -> PathBuf {
    env_first(&["CTRLETH_HOME"])
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".ctrleth")
        })
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub rpc_url: Option<String>,
    pub etherscan_token: Option<String>,
    pub signature_url: String,
    /// Analysis jobs allowed to run at once.
    pub workers: usize,
    /// Expiry of the in-flight marker. A crashed worker stops blocking new
    /// jobs for its address after this long.
    pub once_ttl: Duration,
    pub home: PathBuf,
    pub rpc_timeout: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            rpc_url: None,
            etherscan_token: None,
            signature_url: FOURBYTE_DIRECTORY.to_string(),
            workers: 2,
            once_ttl: Duration::from_secs(1200),
            home: ctrleth_home(),
            rpc_timeout: Duration::from_secs(30),
        }
    }
}

impl ServiceConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            rpc_url: env_first(&["CTRLETH_RPC", "ETHPECTOR_RPC"]),
            etherscan_token: env_first(&["ETHERSCAN_TOKEN", "ETHPECTOR_ETHERSCAN_TOKEN"]),
            signature_url: env_string_or(&["CTRLETH_SIGNATURE_URL"], &defaults.signature_url),
            workers: env_var_or(&["CTRLETH_WORKERS"], defaults.workers).max(1),
            once_ttl: Duration::from_secs(env_var_or(
                &["CTRLETH_ONCE_TTL_SECS"],
                defaults.once_ttl.as_secs(),
            )),
            home: defaults.home,
            rpc_timeout: Duration::from_secs(env_var_or(
                &["CTRLETH_RPC_TIMEOUT_SECS"],
                defaults.rpc_timeout.as_secs(),
            )),
        }
    }

    pub fn with_rpc_url(mut self, rpc_url: Option<String>) -> Self {
        if rpc_url.is_some() {
            self.rpc_url = rpc_url;
        }
        self
    }

    pub fn with_home(mut self, home: Option<PathBuf>) -> Self {
        if let Some(home) = home {
            self.home = home;
        }
        self
    }

    /// Engine settings seeded with this service's endpoints.
    pub fn engine_args(&self) -> EngineArgs {
        EngineArgs {
            rpc: self.rpc_url.clone(),
            etherscan_token: self.etherscan_token.clone(),
            ..EngineArgs::from_env()
        }
    }
}

// =============================================================================
// Engine arguments
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum SearchStrategy {
    Dfs,
    #[default]
    Bfs,
    NaiveRandom,
    WeightedRandom,
}

impl SearchStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            SearchStrategy::Dfs => "dfs",
            SearchStrategy::Bfs => "bfs",
            SearchStrategy::NaiveRandom => "naive-random",
            SearchStrategy::WeightedRandom => "weighted-random",
        }
    }
}

impl FromStr for SearchStrategy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "dfs" => Ok(SearchStrategy::Dfs),
            "bfs" => Ok(SearchStrategy::Bfs),
            "naive-random" => Ok(SearchStrategy::NaiveRandom),
            "weighted-random" => Ok(SearchStrategy::WeightedRandom),
            other => Err(anyhow!("Unknown search strategy '{}'", other)),
        }
    }
}

impl fmt::Display for SearchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-request settings handed to the analysis engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineArgs {
    #[serde(default)]
    pub rpc: Option<String>,
    /// Never serialized: task listings are user-visible.
    #[serde(skip)]
    pub etherscan_token: Option<String>,
    /// Seconds.
    pub execution_timeout: u64,
    /// Seconds.
    pub create_timeout: u64,
    pub max_depth: u32,
    /// Milliseconds per solver query.
    pub solver_timeout: u64,
    pub loop_bound: u32,
    pub strategy: SearchStrategy,
    pub call_depth_limit: u32,
    pub transaction_count: u32,
    pub concolic: bool,
}

impl Default for EngineArgs {
    fn default() -> Self {
        Self {
            rpc: None,
            etherscan_token: None,
            execution_timeout: 30,
            create_timeout: 40,
            max_depth: 128,
            solver_timeout: 10_000,
            loop_bound: 5,
            strategy: SearchStrategy::Bfs,
            call_depth_limit: 10,
            transaction_count: 3,
            concolic: false,
        }
    }
}

impl EngineArgs {
    /// Defaults overridden by `ETHPECTOR_MYTHRIL_*` variables.
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            rpc: None,
            etherscan_token: None,
            execution_timeout: env_var_or(
                &["ETHPECTOR_MYTHRIL_EXECUTION_TIMEOUT"],
                d.execution_timeout,
            ),
            create_timeout: env_var_or(&["ETHPECTOR_MYTHRIL_CREATE_TIMEOUT"], d.create_timeout),
            max_depth: env_var_or(&["ETHPECTOR_MYTHRIL_MAX_DEPTH"], d.max_depth),
            solver_timeout: env_var_or(&["ETHPECTOR_MYTHRIL_SOLVER_TIMEOUT"], d.solver_timeout),
            loop_bound: env_var_or(&["ETHPECTOR_MYTHRIL_LOOP_BOUND"], d.loop_bound),
            strategy: env_var_or(&["ETHPECTOR_MYTHRIL_STRATEGY"], d.strategy),
            call_depth_limit: env_var_or(
                &["ETHPECTOR_MYTHRIL_CALL_DEPTH_LIMIT"],
                d.call_depth_limit,
            ),
            transaction_count: env_var_or(
                &["ETHPECTOR_MYTHRIL_TRANSACTION_COUNT"],
                d.transaction_count,
            ),
            concolic: env_bool_or(&["ETHPECTOR_MYTHRIL_CONCOLICEXEC"], d.concolic),
        }
    }

    /// Environment for an external analyzer process.
    pub fn to_env(&self) -> Vec<(&'static str, String)> {
        let mut vars = vec![
            (
                "ETHPECTOR_MYTHRIL_EXECUTION_TIMEOUT",
                self.execution_timeout.to_string(),
            ),
            ("ETHPECTOR_MYTHRIL_CREATE_TIMEOUT", self.create_timeout.to_string()),
            ("ETHPECTOR_MYTHRIL_MAX_DEPTH", self.max_depth.to_string()),
            ("ETHPECTOR_MYTHRIL_SOLVER_TIMEOUT", self.solver_timeout.to_string()),
            ("ETHPECTOR_MYTHRIL_LOOP_BOUND", self.loop_bound.to_string()),
            ("ETHPECTOR_MYTHRIL_STRATEGY", self.strategy.to_string()),
            (
                "ETHPECTOR_MYTHRIL_CALL_DEPTH_LIMIT",
                self.call_depth_limit.to_string(),
            ),
            (
                "ETHPECTOR_MYTHRIL_TRANSACTION_COUNT",
                self.transaction_count.to_string(),
            ),
        ];
        if self.concolic {
            vars.push(("ETHPECTOR_MYTHRIL_CONCOLICEXEC", "1".to_string()));
        }
        if let Some(rpc) = &self.rpc {
            vars.push(("ETHPECTOR_RPC", rpc.clone()));
        }
        if let Some(token) = &self.etherscan_token {
            vars.push(("ETHPECTOR_ETHERSCAN_TOKEN", token.clone()));
        }
        vars
    }
}
