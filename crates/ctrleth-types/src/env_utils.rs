//! Environment variable helpers for configuration loading.
//!
//! Several settings have a primary name and legacy fallbacks
//! (`CTRLETH_RPC`, then `ETHPECTOR_RPC`), so most helpers accept a list of
//! keys and use the first one that is set and parses.
//!
//! ```
//! use ctrleth_types::env_utils::{env_var_or, env_first};
//!
//! let workers: usize = env_var_or(&["CTRLETH_WORKERS"], 2);
//! let rpc: Option<String> = env_first(&["CTRLETH_RPC", "ETHPECTOR_RPC"]);
//! ```

use std::str::FromStr;

fn non_empty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// First non-empty value among `keys`.
pub fn env_first(keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| non_empty(key))
}

/// First value among `keys` that parses as `T`.
pub fn env_var<T: FromStr>(keys: &[&str]) -> Option<T> {
    keys.iter()
        .find_map(|key| non_empty(key).and_then(|v| v.trim().parse().ok()))
}

pub fn env_var_or<T: FromStr>(keys: &[&str], default: T) -> T {
    env_var(keys).unwrap_or(default)
}

fn parse_bool(v: &str) -> Option<bool> {
    match v.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Truthy values are `1`, `true`, `yes` and `on`; falsy ones `0`, `false`,
/// `no` and `off` (case-insensitive). Anything else falls through to the next
/// key, then to `default`.
pub fn env_bool_or(keys: &[&str], default: bool) -> bool {
    keys.iter()
        .find_map(|key| non_empty(key).and_then(|v| parse_bool(&v)))
        .unwrap_or(default)
}

pub fn env_string_or(keys: &[&str], default: &str) -> String {
    env_first(keys).unwrap_or_else(|| default.to_string())
}
