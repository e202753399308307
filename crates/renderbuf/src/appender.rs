//! Destinations for encoded text.

use core::sync::atomic::{AtomicU64, Ordering};

use crate::{
    buffer::ChunkedTextBuffer,
    encoder::Encoder,
    encoding_state::{EncodingState, EncodingStateRegistry},
    error::RenderError,
};

/// Process-unique identity of an appender, stable across clones of a shared
/// handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AppenderId(u64);

impl AppenderId {
    #[must_use]
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Something that stores text together with the encoding state it carries.
///
/// Implementors provide [`write_part`](Self::write_part); everything else is
/// built on top of it.
pub trait EncodedAppender {
    fn appender_id(&self) -> AppenderId;

    /// Store `text` verbatim, tagged with `state`.
    fn write_part(&mut self, state: &EncodingState, text: &str) -> Result<(), RenderError>;

    fn flush(&mut self) -> Result<(), RenderError> {
        Ok(())
    }

    /// Append `text`, which currently carries `state`, applying `encoder`
    /// unless that would be redundant.
    fn append(
        &mut self,
        encoder: Option<&Encoder>,
        state: &EncodingState,
        text: &str,
    ) -> Result<(), RenderError>
    where
        Self: Sized,
    {
        append_to(self, encoder, state, text)
    }

    /// Append `text` that `encoder` has already transformed.
    fn append_encoded(
        &mut self,
        encoder: &Encoder,
        state: &EncodingState,
        text: &str,
    ) -> Result<(), RenderError>
    where
        Self: Sized,
    {
        append_encoded_to(self, encoder, state, text)
    }

    fn append_char(
        &mut self,
        encoder: Option<&Encoder>,
        state: &EncodingState,
        ch: char,
    ) -> Result<(), RenderError>
    where
        Self: Sized,
    {
        let mut utf8 = [0; 4];
        append_to(self, encoder, state, ch.encode_utf8(&mut utf8))
    }

    /// Append every part of `buffer`, encoding each one according to its own
    /// state.
    fn append_buffer_with(
        &mut self,
        encoder: Option<&Encoder>,
        buffer: &ChunkedTextBuffer,
    ) -> Result<(), RenderError>
    where
        Self: Sized,
    {
        buffer.encode_to(self, encoder)
    }
}

/// [`EncodedAppender::append`] for trait objects.
pub fn append_to(
    appender: &mut dyn EncodedAppender,
    encoder: Option<&Encoder>,
    state: &EncodingState,
    text: &str,
) -> Result<(), RenderError> {
    if text.is_empty() {
        return Ok(());
    }
    let registry = EncodingStateRegistry;
    let Some(encoder) = encoder.and_then(|e| registry.effective_encoder(e, state)) else {
        return appender.write_part(state, text);
    };
    let next = registry.append_encoder(state, &encoder);
    match &*encoder {
        Encoder::Function(function) => {
            let encoded = function.encode(text)?;
            appender.write_part(&next, &encoded)
        }
        streaming => streaming.encode_to_stream(text, appender, &next),
    }
}

/// [`EncodedAppender::append_encoded`] for trait objects.
pub fn append_encoded_to(
    appender: &mut dyn EncodedAppender,
    encoder: &Encoder,
    state: &EncodingState,
    text: &str,
) -> Result<(), RenderError> {
    if text.is_empty() {
        return Ok(());
    }
    let next = EncodingStateRegistry.append_encoder(state, encoder);
    appender.write_part(&next, text)
}

#[cfg(test)]
mod tests {
    use alloc::{format, string::String, vec::Vec};

    use super::*;
    use crate::encoder::FunctionEncoder;

    struct Recorder {
        id: AppenderId,
        parts: Vec<(String, String)>,
    }

    impl Default for Recorder {
        fn default() -> Self {
            Self {
                id: AppenderId::next(),
                parts: Vec::new(),
            }
        }
    }

    fn part(state: &str, text: &str) -> (String, String) {
        (state.into(), text.into())
    }

    impl EncodedAppender for Recorder {
        fn appender_id(&self) -> AppenderId {
            self.id
        }

        fn write_part(&mut self, state: &EncodingState, text: &str) -> Result<(), RenderError> {
            self.parts.push((format!("{state:?}"), text.into()));
            Ok(())
        }
    }

    #[test]
    fn ids_are_unique() {
        assert_ne!(AppenderId::next(), AppenderId::next());
    }

    #[test]
    fn encodes_and_records_state() {
        let mut rec = Recorder::default();
        rec.append(Some(&Encoder::html()), &EncodingState::empty(), "a&b")
            .unwrap();
        assert_eq!(
            rec.parts,
            [
                part("[HTML]", "a"),
                part("[HTML]", "&amp;"),
                part("[HTML]", "b"),
            ]
        );
    }

    #[test]
    fn redundant_encoding_is_skipped() {
        let mut rec = Recorder::default();
        let html = Encoder::html();
        let state = EncodingStateRegistry.append_encoder(&EncodingState::empty(), &html);
        rec.append(Some(&html), &state, "&amp;").unwrap();
        assert_eq!(rec.parts, [part("[HTML]", "&amp;")]);
    }

    #[test]
    fn function_encoders_see_the_whole_value() {
        let mut rec = Recorder::default();
        let wrap = Encoder::function(FunctionEncoder::new("wrap", |s| Ok(format!("[{s}]"))));
        rec.append(Some(&wrap), &EncodingState::empty(), "abc").unwrap();
        assert_eq!(rec.parts, [part("[wrap]", "[abc]")]);
    }

    #[test]
    fn pre_encoded_text_is_tagged_not_transformed() {
        let mut rec = Recorder::default();
        rec.append_encoded(&Encoder::html(), &EncodingState::empty(), "<b>")
            .unwrap();
        rec.append(None, &EncodingState::empty(), "<i>").unwrap();
        assert_eq!(
            rec.parts,
            [part("[HTML]", "<b>"), part("[]", "<i>")]
        );
    }
}
