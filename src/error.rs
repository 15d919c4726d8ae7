use thiserror::Error;

/// Fatal engine errors.
///
/// "No alignment found" is never an error: the aligner returns `None` and
/// the stitcher returns an empty list for that outcome. Bundles that blow
/// past the block cap are trimmed in place and flagged, not failed.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Invalid configuration, detected at index-build or alignment-start
    /// time. Never silently ignored.
    #[error("configuration error: {0}")]
    Config(String),

    /// Caller/bookkeeping bug: a clump or bundle references a sequence
    /// that is not in the store. Aborts the current task only.
    #[error("data inconsistency: {0}")]
    DataInconsistency(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;
