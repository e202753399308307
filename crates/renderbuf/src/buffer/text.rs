use alloc::{borrow::Cow, string::String, vec::Vec};
use core::fmt;

use super::{ChunkReader, ChunkSink, ChunkedTextBuffer, Text};
use crate::{
    appender::{AppenderId, EncodedAppender, append_to},
    encoder::Encoder,
    encoding_state::EncodingState,
    error::RenderError,
};

/// A run of text sharing one encoding state.
#[cfg_attr(any(test, feature = "serde"), derive(serde::Serialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedPart {
    #[cfg_attr(any(test, feature = "serde"), serde(serialize_with = "serialize_state"))]
    pub state: EncodingState,
    pub text: String,
}

#[cfg(any(test, feature = "serde"))]
fn serialize_state<S: serde::Serializer>(state: &EncodingState, s: S) -> Result<S::Ok, S::Error> {
    s.collect_seq(state.codecs().iter().map(|c| c.id.name()))
}

impl ChunkSink<Text> for String {
    fn write_chunk(&mut self, _state: &EncodingState, part: &str) -> Result<(), RenderError> {
        self.push_str(part);
        Ok(())
    }
}

impl ChunkedTextBuffer {
    pub fn write_char(&self, ch: char) -> Result<(), RenderError> {
        let mut utf8 = [0; 4];
        self.write(ch.encode_utf8(&mut utf8))
    }

    /// The retained content as one string, or the error that stopped the
    /// walk over it.
    pub fn try_to_aggregated_string(&self) -> Result<String, RenderError> {
        let mut out = String::with_capacity(self.try_size()?);
        self.for_each_part(&mut |_, part| {
            out.push_str(part);
            Ok(())
        })?;
        Ok(out)
    }

    /// The retained content as one string. A failure is logged and the
    /// content collected up to it is returned; use
    /// [`try_to_aggregated_string`](Self::try_to_aggregated_string) to see
    /// the error.
    #[must_use]
    pub fn to_aggregated_string(&self) -> String {
        let mut out = String::new();
        if let Err(err) = self.for_each_part(&mut |_, part| {
            out.push_str(part);
            Ok(())
        }) {
            log::warn!("buffer {:?} aggregated partially: {err}", self.id());
        }
        out
    }

    /// Retained content split into runs of equal encoding state.
    pub fn dump_encoded_parts(&self) -> Result<Vec<EncodedPart>, RenderError> {
        let mut parts: Vec<EncodedPart> = Vec::new();
        self.for_each_part(&mut |state, text| {
            match parts.last_mut() {
                Some(last) if last.state == *state => last.text.push_str(text),
                _ => parts.push(EncodedPart {
                    state: state.clone(),
                    text: text.into(),
                }),
            }
            Ok(())
        })?;
        Ok(parts)
    }

    /// Replay the retained content into `appender`, running each span through
    /// `encoder` unless its recorded state makes that redundant.
    pub fn encode_to(
        &self,
        appender: &mut dyn EncodedAppender,
        encoder: Option<&Encoder>,
    ) -> Result<(), RenderError> {
        self.for_each_part(&mut |state, text| append_to(appender, encoder, state, text))
    }

    /// A new buffer holding the content run through `encoder`.
    pub fn encode_to_buffer(&self, encoder: Option<&Encoder>) -> Result<Self, RenderError> {
        let mut encoded = Self::with_options(self.options()?);
        self.encode_to(&mut encoded, encoder)?;
        Ok(encoded)
    }

    /// Whether any span would still be changed by `encoder`.
    pub fn needs_encoding(&self, encoder: &Encoder) -> Result<bool, RenderError> {
        let registry = crate::encoding_state::EncodingStateRegistry;
        let mut needed = false;
        self.for_each_part(&mut |state, _| {
            needed |= registry.should_encode_with(encoder, state);
            Ok(())
        })?;
        Ok(needed)
    }

    /// Store a large owned string as a frozen chunk tagged with `state`.
    pub fn write_owned_encoded(&self, state: &EncodingState, text: String) -> Result<(), RenderError> {
        self.write_frozen(state, Cow::Owned(text))
    }
}

impl ChunkReader<Text> {
    pub fn read_to_string(&mut self, dst: &mut String) -> Result<usize, RenderError> {
        self.read_to_end(dst)
    }
}

impl fmt::Display for ChunkedTextBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_aggregated_string())
    }
}

impl fmt::Write for ChunkedTextBuffer {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.write(s).map_err(|_| fmt::Error)
    }
}

impl EncodedAppender for ChunkedTextBuffer {
    fn appender_id(&self) -> AppenderId {
        self.id()
    }

    fn write_part(&mut self, state: &EncodingState, text: &str) -> Result<(), RenderError> {
        self.write_tagged(state, text)
    }

    fn flush(&mut self) -> Result<(), RenderError> {
        ChunkedTextBuffer::flush(self)
    }
}
