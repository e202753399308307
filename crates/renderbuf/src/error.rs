use alloc::string::String;

use thiserror::Error;

/// Failure raised by the chunked buffers themselves.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BufferError {
    /// A reader is positioned in a region that a consuming reader or a
    /// connected-mode flush has already discarded.
    #[error("read position {position} precedes the first readable chunk {first_available}")]
    Bounds { position: u64, first_available: u64 },
    /// A sub-range of a write source is out of bounds or splits a character.
    #[error("range {offset}+{len} does not address a valid span of {available} units")]
    Range {
        offset: usize,
        len: usize,
        available: usize,
    },
    /// The configured hard size limit would be exceeded by a write.
    #[error("buffer size limit of {limit} exceeded")]
    CapacityExceeded { limit: usize },
    /// Embedding a buffer into itself, directly or through its sub-buffers.
    #[error("embedding this buffer would create a cycle")]
    CyclicEmbed,
    #[error("buffer is closed")]
    Closed,
    /// The buffer is being read while something tries to write into it.
    #[error("buffer is already borrowed by an active read or write")]
    Reentrant,
}

/// An encoder could not transform its input.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("encoder '{codec}' failed: {message}")]
pub struct EncodingError {
    pub codec: String,
    pub message: String,
}

impl EncodingError {
    pub fn new(codec: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            codec: codec.into(),
            message: message.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("buffer error: {0}")]
    Buffer(#[from] BufferError),
    #[error("encoding error: {0}")]
    Encoding(#[from] EncodingError),
    #[error("output context stack is empty")]
    NoActiveContext,
    #[error("the root output context needs a target buffer")]
    MissingTarget,
    #[error("unknown codec '{0}'")]
    UnknownCodec(String),
    #[error("invalid UTF-8 in byte buffer: {0}")]
    InvalidUtf8(#[from] bstr::Utf8Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RenderError {
    /// The buffer-level cause, if this error came from a buffer.
    #[must_use]
    pub fn as_buffer_error(&self) -> Option<&BufferError> {
        match self {
            RenderError::Buffer(e) => Some(e),
            _ => None,
        }
    }
}
