//! Error types for the invocation core.

use thiserror::Error;

/// Fatal conditions raised while building, sending, or decoding a request.
#[derive(Error, Debug)]
pub enum Error {
    /// Transport or credential setup failed before anything was sent.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The request could not be dispatched or the service rejected it.
    #[error("invocation failed: {0}")]
    Invocation(String),

    /// A complete (non-streaming) response body did not have the expected shape.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// A single stream chunk could not be decoded; the rest of the stream is abandoned.
    #[error("malformed stream chunk: {0}")]
    MalformedChunk(String),

    /// Decoded text could not be written to the output sink.
    #[error("failed to write output: {0}")]
    Output(#[source] std::io::Error),
}

impl Error {
    /// True when the reader of our output went away, e.g. `converse ... | head -1`.
    pub fn is_broken_pipe(&self) -> bool {
        matches!(self, Error::Output(e) if e.kind() == std::io::ErrorKind::BrokenPipe)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
