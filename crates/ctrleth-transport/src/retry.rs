//! Blocking retry with exponential backoff for transient HTTP failures.

use anyhow::Result;
use ctrleth_types::RetryConfig;
use tracing::debug;

/// Rate limiting, timeouts and connection resets are worth another attempt.
/// Anything else (bad request, JSON-RPC error object) is not.
pub fn should_retry_error(error: &anyhow::Error) -> bool {
    let s = format!("{:#}", error).to_ascii_lowercase();
    s.contains("429")
        || s.contains("too many")
        || s.contains("timed out")
        || s.contains("timeout")
        || s.contains("connection")
        || s.contains("transport")
        || s.contains("status code 502")
        || s.contains("status code 503")
}

pub fn with_retries<T, F>(cfg: RetryConfig, mut f: F) -> Result<T>
where
    F: FnMut() -> Result<T>,
{
    let mut attempt = 0usize;
    let mut backoff = cfg.initial_backoff;

    loop {
        match f() {
            Ok(v) => return Ok(v),
            Err(e) => {
                if attempt >= cfg.retries || !should_retry_error(&e) {
                    return Err(e);
                }
                attempt += 1;
                debug!(attempt, error = %e, "retrying request");
                std::thread::sleep(backoff);
                backoff = std::cmp::min(backoff * 2, cfg.max_backoff);
            }
        }
    }
}
