//! Hex encoding helpers for addresses, slots, topics and selectors.

use anyhow::{anyhow, Result};

use crate::word::Word;

/// Number of hex digits in a 20-byte account address.
pub const ADDRESS_HEX_LEN: usize = 40;

fn strip_hex_prefix(s: &str) -> &str {
    s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s)
}

// =============================================================================
// Addresses
// =============================================================================

/// Normalize an address to lowercase with `0x` prefix, left-padded to 20 bytes.
///
/// ```
/// use ctrleth_types::encoding::normalize_address;
///
/// assert_eq!(
///     normalize_address("0xC02AAA39b223FE8D0A0e5C4F27eAD9083C756Cc2"),
///     "0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2"
/// );
/// assert_eq!(normalize_address("abc"), "0x0000000000000000000000000000000000000abc");
/// ```
pub fn normalize_address(addr: &str) -> String {
    let hex = strip_hex_prefix(addr.trim()).to_lowercase();
    if hex.len() < ADDRESS_HEX_LEN {
        format!("0x{:0>40}", hex)
    } else {
        format!("0x{}", hex)
    }
}

/// Validate a full 20-byte address (prefix optional) and return its normalized form.
pub fn parse_address(addr: &str, context: &str) -> Result<String> {
    let hex = strip_hex_prefix(addr.trim());
    if hex.len() != ADDRESS_HEX_LEN {
        return Err(anyhow!(
            "Invalid {} '{}': expected {} hex digits, got {}",
            context,
            addr,
            ADDRESS_HEX_LEN,
            hex.len()
        ));
    }
    hex::decode(hex).map_err(|e| anyhow!("Invalid {} '{}': {}", context, addr, e))?;
    Ok(normalize_address(hex))
}

pub fn try_parse_address(addr: &str) -> Option<String> {
    parse_address(addr, "address").ok()
}

// =============================================================================
// Byte strings
// =============================================================================

/// Parse a hex string (with or without `0x`) to raw bytes.
pub fn parse_hex_bytes(hex_str: &str, context: &str) -> Result<Vec<u8>> {
    let hex_str = strip_hex_prefix(hex_str.trim());
    if hex_str.len() % 2 == 1 {
        return hex::decode(format!("0{}", hex_str))
            .map_err(|e| anyhow!("Invalid {} hex '{}': {}", context, hex_str, e));
    }
    hex::decode(hex_str).map_err(|e| anyhow!("Invalid {} hex '{}': {}", context, hex_str, e))
}

pub fn format_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

// =============================================================================
// Topics and selectors
// =============================================================================

/// Parse an event topic (decimal or hex) into its padded 32-byte hex form.
pub fn parse_topic(topic: &str) -> Result<String> {
    let word = Word::parse(topic).map_err(|e| anyhow!("Invalid topic: {}", e))?;
    if word.bits() > 256 {
        return Err(anyhow!("Invalid topic '{}': wider than 32 bytes", topic));
    }
    Ok(word.to_hex_padded())
}

/// Parse a function selector (decimal or hex) into its 4-byte `0x%08x` form.
pub fn parse_selector(selector: &str) -> Result<String> {
    let word = Word::parse(selector).map_err(|e| anyhow!("Invalid selector: {}", e))?;
    let value = word
        .to_u64()
        .filter(|v| *v <= u64::from(u32::MAX))
        .ok_or_else(|| anyhow!("Invalid selector '{}': wider than 4 bytes", selector))?;
    Ok(format!("0x{:08x}", value))
}
