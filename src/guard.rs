//! Upfront resource guard.
//!
//! Rejects oversized input before canonicalization or indexing starts,
//! bounding the worst-case blow-up from hostile or merely huge documents.

use crate::config::EngineConfig;
use crate::error::{BuildError, SizeMeasure};

/// Checks the token count and (when known) raw byte size against the
/// configured ceilings. A ceiling of zero disables that check.
pub fn check(
    token_count: usize,
    byte_size: Option<usize>,
    config: &EngineConfig,
) -> Result<(), BuildError> {
    if config.max_tokens > 0 && token_count > config.max_tokens {
        return Err(BuildError::DocumentTooLarge {
            measured: token_count,
            limit: config.max_tokens,
            measure: SizeMeasure::Tokens,
        });
    }
    if let Some(bytes) = byte_size {
        if config.max_bytes > 0 && bytes > config.max_bytes {
            return Err(BuildError::DocumentTooLarge {
                measured: bytes,
                limit: config.max_bytes,
                measure: SizeMeasure::Bytes,
            });
        }
    }
    Ok(())
}
