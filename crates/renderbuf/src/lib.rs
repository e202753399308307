//! Chunked output buffers and idempotent streaming encoders for template
//! rendering.
//!
//! Text written during a render lands in a [`ChunkedTextBuffer`], a list of
//! chunks that records, for every span, which encoders were already applied
//! to it. Encoders consult that record and skip spans they would only
//! escape twice, so captured output can be embedded, re-encoded or streamed
//! on without double escaping.
//!
//! ```rust
//! use renderbuf::{ChunkedTextBuffer, Encoder, EncodedAppender, EncodingState};
//!
//! let mut page = ChunkedTextBuffer::new();
//! let html = Encoder::html();
//! page.append(Some(&html), &EncodingState::empty(), "a & b").unwrap();
//!
//! // Running the same encoder over the buffer again changes nothing.
//! let again = page.encode_to_buffer(Some(&html)).unwrap();
//! assert_eq!(again.to_aggregated_string(), "a &amp; b");
//! ```

#![allow(missing_docs)]
extern crate alloc;

mod appender;
mod buffer;
mod codec;
mod encoder;
mod encoding_state;
mod error;
mod options;
mod output_stack;
mod render_scope;

#[cfg(test)]
mod tests;

pub use appender::{AppenderId, EncodedAppender, append_encoded_to, append_to};
pub use buffer::{
    BufferKind, Bytes, ChunkReader, ChunkSink, ChunkedBuffer, ChunkedByteBuffer,
    ChunkedTextBuffer, EncodedPart, IoSink, PartVisitor, Text,
};
pub use codec::{CodecIdentifier, CombinedCodecIdentifier};
pub use encoder::{ChainedEncoder, CharReplacementEncoder, Encoder, EscapeFn, FunctionEncoder};
pub use encoding_state::{AppliedCodec, EncodingState, EncodingStateRegistry};
pub use error::{BufferError, EncodingError, RenderError};
pub use options::{BufferOptions, OutputSettings};
pub use output_stack::{OutputContextAttributes, OutputContextStack, OutputRole, OutputTarget};
pub use render_scope::{CodecLookup, RenderScope};
