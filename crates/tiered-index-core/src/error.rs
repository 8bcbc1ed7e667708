//! Error type surfaced at the [`Index`](crate::index::Index) boundary.
//!
//! Storage backends report failures through `anyhow`; the façade wraps
//! them so callers can tell a genuinely empty collection (an `Ok` with no
//! rows) apart from a store fault (an `Err`). Retrieval paths that must
//! keep going on a fault opt in through [`Degrade::or_degraded`].

use crate::models::RecordKind;

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("store error: {0:#}")]
    Store(anyhow::Error),

    #[error("embedding error: {0:#}")]
    Embedding(anyhow::Error),

    #[error("invalid metadata for {kind} record: {source}")]
    Metadata {
        kind: RecordKind,
        #[source]
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, IndexError>;

/// Fall back to an empty value when a read fails.
pub trait Degrade<T> {
    /// Returns the value, or `T::default()` after logging the fault.
    fn or_degraded(self, context: &str) -> T;
}

impl<T: Default> Degrade<T> for Result<T> {
    fn or_degraded(self, context: &str) -> T {
        match self {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(error = %e, "{}: continuing with an empty result", context);
                T::default()
            }
        }
    }
}
