//! Sentinel codec for cached results.
//!
//! The cache store only ever sees a [`CachedEnvelope`]. An `Empty` envelope is
//! a present entry, so "cached no record" stays distinguishable from "not
//! cached" even though it decodes to nothing.

use crate::error::EnvelopeError;
use crate::value::{QueryResult, ResultShape};
use serde::{Deserialize, Serialize};

/// What is written to the cache store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value")]
pub enum CachedEnvelope {
    /// No record, or an empty collection.
    Empty,
    /// Any other result.
    Value(QueryResult),
}

impl CachedEnvelope {
    /// Wrap a result for storage.
    pub fn encode(result: &QueryResult) -> Self {
        if result.is_empty() {
            CachedEnvelope::Empty
        } else {
            CachedEnvelope::Value(result.clone())
        }
    }

    /// Unwrap a stored envelope into the result the terminal call expects.
    ///
    /// `Empty` becomes "no record" for single-record retrievals and an empty
    /// collection for collection retrievals.
    pub fn decode(self, expected: ResultShape) -> Result<QueryResult, EnvelopeError> {
        match self {
            CachedEnvelope::Empty => match expected {
                ResultShape::Record => Ok(QueryResult::Record(None)),
                ResultShape::Rows => Ok(QueryResult::Rows(Vec::new())),
                other => Err(EnvelopeError::ShapeMismatch {
                    expected: other.to_string(),
                    found: "empty".to_string(),
                }),
            },
            CachedEnvelope::Value(result) if result.shape() == expected => Ok(result),
            CachedEnvelope::Value(result) => Err(EnvelopeError::ShapeMismatch {
                expected: expected.to_string(),
                found: result.shape().to_string(),
            }),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, CachedEnvelope::Empty)
    }

    /// Serialize for a byte-oriented store.
    pub fn to_bytes(&self) -> Result<Vec<u8>, EnvelopeError> {
        serde_json::to_vec(self).map_err(|e| EnvelopeError::Encode {
            reason: e.to_string(),
        })
    }

    /// Deserialize from store bytes. Anything that is not an envelope fails.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, EnvelopeError> {
        serde_json::from_slice(bytes).map_err(|e| EnvelopeError::Decode {
            reason: e.to_string(),
        })
    }
}
