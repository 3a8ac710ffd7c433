//! Network transport for chain state and signature lookups.
//!
//! - [`node`]: JSON-RPC node client (`eth_getStorageAt`, `eth_getCode`)
//! - [`etherscan`]: Etherscan proxy client for the same two reads
//! - [`signatures`]: 4byte-compatible event and function signature directory
//!
//! All clients are blocking (`ureq`) and retry transient failures with
//! exponential backoff.
//!
//! ```ignore
//! use ctrleth_transport::{NodeClient, SignatureClient};
//!
//! let node = NodeClient::new("http://localhost:8545");
//! let code = node.get_code("0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2")?;
//!
//! let sigs = SignatureClient::fourbyte();
//! let names = sigs.event_signatures("0xddf252ad...")?;
//! ```

pub mod etherscan;
pub mod node;
pub mod retry;
pub mod signatures;

pub use etherscan::EtherscanClient;
pub use node::NodeClient;
pub use signatures::SignatureClient;
