//! 256-bit EVM words.
//!
//! Stack values, storage slots and log topics routinely exceed the 53-bit
//! integer range that JSON document stores and JavaScript clients handle
//! without loss. [`Word`] serializes as a JSON number while it fits in that
//! range and as a `0x` hex string otherwise; deserialization accepts numbers,
//! decimal strings and hex strings, so both forms round-trip to the same value.

use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, Result};
use num_bigint::BigUint;
use serde::de::{self, MapAccess, Unexpected, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Largest integer a double-precision float represents exactly (2^53 - 1).
pub const MAX_SAFE_INTEGER: u64 = (1 << 53) - 1;

/// Map key under which serde_json (`arbitrary_precision`) hands over the
/// literal text of a number that does not fit a primitive.
const JSON_NUMBER_TOKEN: &str = "$serde_json::private::Number";

/// An unsigned EVM word of arbitrary width (in practice at most 256 bits).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Word(BigUint);

impl Word {
    pub fn zero() -> Self {
        Self(BigUint::default())
    }

    /// Big-endian bytes as returned by a node.
    pub fn from_be_bytes(bytes: &[u8]) -> Self {
        Self(BigUint::from_bytes_be(bytes))
    }

    /// Parse `0x`-prefixed hex or plain decimal, the way Python's `int(s, 0)` does.
    pub fn parse(input: &str) -> Result<Self> {
        let s = input.trim();
        let parsed = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            if hex.is_empty() {
                None
            } else {
                BigUint::parse_bytes(hex.as_bytes(), 16)
            }
        } else if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) {
            BigUint::parse_bytes(s.as_bytes(), 10)
        } else {
            None
        };
        parsed
            .map(Self)
            .ok_or_else(|| anyhow!("Invalid integer literal '{}'", input))
    }

    /// Minimal `0x` hex form (`0x0` for zero), as used for RPC slot arguments.
    pub fn to_hex(&self) -> String {
        format!("0x{}", self.0.to_str_radix(16))
    }

    /// Zero-padded 32-byte hex form, as used for event topics.
    pub fn to_hex_padded(&self) -> String {
        format!("0x{:0>64}", self.0.to_str_radix(16))
    }

    pub fn to_u64(&self) -> Option<u64> {
        u64::try_from(&self.0).ok()
    }

    pub fn bits(&self) -> u64 {
        self.0.bits()
    }

    fn is_json_safe(&self) -> bool {
        self.bits() <= 53
    }
}

impl From<u64> for Word {
    fn from(value: u64) -> Self {
        Self(BigUint::from(value))
    }
}

impl FromStr for Word {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Word {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Serialize for Word {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self.to_u64() {
            Some(small) if self.is_json_safe() => serializer.serialize_u64(small),
            _ => serializer.serialize_str(&self.to_hex()),
        }
    }
}

struct WordVisitor;

impl<'de> Visitor<'de> for WordVisitor {
    type Value = Word;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a non-negative integer, a decimal string or a 0x hex string")
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<Word, E> {
        Ok(Word::from(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<Word, E> {
        u64::try_from(v)
            .map(Word::from)
            .map_err(|_| E::custom(format!("negative word {}", v)))
    }

    /// Integral floats up to `u64::MAX`; anything else lost precision already.
    fn visit_f64<E: de::Error>(self, v: f64) -> std::result::Result<Word, E> {
        if v.is_finite() && v >= 0.0 && v.fract() == 0.0 && v <= u64::MAX as f64 {
            Ok(Word::from(v as u64))
        } else {
            Err(E::invalid_type(Unexpected::Float(v), &self))
        }
    }

    fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<Word, E> {
        Word::parse(v).map_err(E::custom)
    }

    /// Integer literals wider than 64 bits, e.g. 256-bit values written as
    /// plain JSON numbers by the engine.
    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> std::result::Result<Word, A::Error> {
        match map.next_key::<String>()? {
            Some(key) if key == JSON_NUMBER_TOKEN => {
                let literal: String = map.next_value()?;
                Word::parse(&literal).map_err(de::Error::custom)
            }
            _ => Err(de::Error::invalid_type(Unexpected::Map, &self)),
        }
    }
}

impl<'de> Deserialize<'de> for Word {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_any(WordVisitor)
    }
}
