//! Storable form of completed analyses.
//!
//! A cache value is one [`CacheRecord`]: either the full result or the error
//! envelope the job produced. Encoding is JSON. Words wider than 53 bits are
//! written as hex strings and pc-keyed maps as string-keyed objects; both
//! decode back to the original integer types.

use anyhow::{anyhow, Result};
use ctrleth_types::{AnalysisResult, TaskError};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheRecord {
    Analysis(Box<AnalysisResult>),
    TaskError(TaskError),
}

impl CacheRecord {
    pub fn analysis(result: AnalysisResult) -> Self {
        Self::Analysis(Box::new(result))
    }

    pub fn into_result(self) -> Result<AnalysisResult, TaskError> {
        match self {
            Self::Analysis(result) => Ok(*result),
            Self::TaskError(e) => Err(e),
        }
    }
}

impl From<Result<AnalysisResult, TaskError>> for CacheRecord {
    fn from(outcome: Result<AnalysisResult, TaskError>) -> Self {
        match outcome {
            Ok(result) => Self::analysis(result),
            Err(e) => Self::TaskError(e),
        }
    }
}

pub fn encode(record: &CacheRecord) -> Result<Vec<u8>> {
    serde_json::to_vec(record).map_err(|e| anyhow!("Failed to encode cache record: {}", e))
}

pub fn decode(bytes: &[u8]) -> Result<CacheRecord> {
    serde_json::from_slice(bytes).map_err(|e| anyhow!("Failed to decode cache record: {}", e))
}

pub fn encode_analysis(result: &AnalysisResult) -> Result<Vec<u8>> {
    serde_json::to_vec(result).map_err(|e| anyhow!("Failed to encode analysis: {}", e))
}

pub fn decode_analysis(bytes: &[u8]) -> Result<AnalysisResult> {
    serde_json::from_slice(bytes).map_err(|e| anyhow!("Failed to decode analysis: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::sample_analysis;
    use ctrleth_types::{Annotation, Word};

    const SLOT_TEXT: &str = "0x577261707065642045746865720000000000000000000000000000000000001a";

    #[test]
    fn test_analysis_roundtrip_is_lossless() {
        let result = sample_analysis("0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2");
        let record = CacheRecord::analysis(result.clone());

        let decoded = decode(&encode(&record).unwrap()).unwrap();
        assert_eq!(decoded, record);

        let back = decoded.into_result().unwrap();
        assert_eq!(back.pc_to_block.get(20), Some(1));
        let Annotation::Push(push) = &back.blocks[0].instructions[0].annotations[0] else {
            panic!("expected Push");
        };
        assert_eq!(push.value, Some(Word::parse(SLOT_TEXT).unwrap()));
    }

    #[test]
    fn test_non_dyadic_coverage_roundtrips_exactly() {
        let mut result = sample_analysis("0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2");
        result.coverage.assembly = 2.0 / 7.0;
        result.coverage.symbolic = (2.0 / 7.0) / 3.0;
        let record = CacheRecord::analysis(result);

        let decoded = decode(&encode(&record).unwrap()).unwrap();
        assert_eq!(decoded, record);

        let back = decode_analysis(&encode_analysis(&decoded.into_result().unwrap()).unwrap())
            .unwrap();
        assert_eq!(back.coverage.assembly.to_bits(), (2.0f64 / 7.0).to_bits());
        assert_eq!(back.coverage.symbolic.to_bits(), ((2.0f64 / 7.0) / 3.0).to_bits());
    }

    #[test]
    fn test_wide_words_are_strings_on_the_wire() {
        let result = sample_analysis("0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2");
        let json: serde_json::Value =
            serde_json::from_slice(&encode_analysis(&result).unwrap()).unwrap();
        let value = &json["blocks"][0]["instructions"][0]["annotations"][0]["data"]["value"];
        assert_eq!(value, &serde_json::Value::String(SLOT_TEXT.to_string()));
        assert!(json["pc_to_block"].get("20").is_some());
    }

    #[test]
    fn test_error_envelope_roundtrip() {
        let record = CacheRecord::TaskError(TaskError::not_found("No analysis result"));
        let bytes = encode(&record).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["task_error"]["status"], 404);

        let err = decode(&bytes).unwrap().into_result().unwrap_err();
        assert_eq!(err.message, "No analysis result");
    }

    #[test]
    fn test_garbage_is_an_error() {
        assert!(decode(b"not json").is_err());
        assert!(decode_analysis(b"{}").is_err());
    }
}
