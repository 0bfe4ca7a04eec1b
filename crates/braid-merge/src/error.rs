//! Error types for payload decoding and encoding.
//!
//! Merging itself never fails; errors only arise where values cross the
//! wire boundary.

/// Errors raised at the payload boundary.
#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    /// A payload could not be decoded or encoded by its codec.
    #[error("codec error for payload type `{payload_type}`: {message}")]
    Codec {
        /// The payload type whose codec failed.
        payload_type: String,
        /// What went wrong.
        message: String,
    },

    /// No codec is registered for the payload type and there is no default.
    #[error("unknown payload type: {0}")]
    UnknownPayloadType(String),
}

/// Convenience alias for merge-boundary results.
pub type MergeResult<T> = Result<T, MergeError>;
