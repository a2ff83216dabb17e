//! Error types for the Trellis core library.

use thiserror::Error;

/// Result type alias using Trellis Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for Trellis operations.
///
/// Transcoding and the event stream report their own errors
/// ([`TranscodeError`](crate::TranscodeError),
/// [`EventError`](crate::events::EventError)).
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}
