use alloc::{borrow::Cow, string::String};

use crate::{
    appender::EncodedAppender, codec::CodecIdentifier, encoding_state::EncodingState,
    error::RenderError,
};

/// Replacement for `ch`, given the character before it. `Some("")` drops the
/// character; `None` keeps it.
pub type EscapeFn = fn(ch: char, previous: Option<char>) -> Option<&'static str>;

/// Streaming encoder that replaces individual characters.
///
/// Runs of unchanged characters are forwarded as borrowed slices of the input,
/// so only the replacements themselves are written separately.
#[derive(Debug)]
pub struct CharReplacementEncoder {
    id: CodecIdentifier,
    escape: EscapeFn,
    safe: bool,
}

impl CharReplacementEncoder {
    pub fn new(id: CodecIdentifier, escape: EscapeFn) -> Self {
        Self {
            id,
            escape,
            safe: true,
        }
    }

    #[must_use]
    pub fn safe(mut self, safe: bool) -> Self {
        self.safe = safe;
        self
    }

    #[must_use]
    pub fn html() -> Self {
        Self::new(
            CodecIdentifier::with_aliases("HTML", ["html", "HTML4", "html4"]),
            escape_html,
        )
    }

    #[must_use]
    pub fn xml() -> Self {
        Self::new(CodecIdentifier::with_aliases("XML", ["xml"]), escape_xml)
    }

    #[must_use]
    pub fn javascript() -> Self {
        Self::new(
            CodecIdentifier::with_aliases("JavaScript", ["js", "javascript"]),
            escape_javascript,
        )
    }

    #[must_use]
    pub fn codec_identifier(&self) -> &CodecIdentifier {
        &self.id
    }

    #[must_use]
    pub fn is_safe(&self) -> bool {
        self.safe
    }

    fn for_each_segment<E>(
        &self,
        source: &str,
        mut emit: impl FnMut(&str) -> Result<(), E>,
    ) -> Result<(), E> {
        let mut start = 0;
        let mut previous = None;
        for (i, ch) in source.char_indices() {
            if let Some(replacement) = (self.escape)(ch, previous) {
                if start < i {
                    emit(&source[start..i])?;
                }
                if !replacement.is_empty() {
                    emit(replacement)?;
                }
                start = i + ch.len_utf8();
            }
            previous = Some(ch);
        }
        if start < source.len() {
            emit(&source[start..])?;
        }
        Ok(())
    }

    #[must_use]
    pub fn encode<'a>(&self, source: &'a str) -> Cow<'a, str> {
        let mut previous = None;
        let untouched = source.chars().all(|ch| {
            let hit = (self.escape)(ch, previous).is_some();
            previous = Some(ch);
            !hit
        });
        if untouched {
            return Cow::Borrowed(source);
        }
        let mut out = String::with_capacity(source.len() + source.len() / 4);
        let _ = self.for_each_segment(source, |segment| {
            out.push_str(segment);
            Ok::<(), core::convert::Infallible>(())
        });
        Cow::Owned(out)
    }

    pub fn encode_to_stream(
        &self,
        source: &str,
        target: &mut dyn EncodedAppender,
        state: &EncodingState,
    ) -> Result<(), RenderError> {
        self.for_each_segment(source, |segment| target.write_part(state, segment))
    }
}

fn escape_html(ch: char, _previous: Option<char>) -> Option<&'static str> {
    match ch {
        '&' => Some("&amp;"),
        '<' => Some("&lt;"),
        '>' => Some("&gt;"),
        '"' => Some("&quot;"),
        '\'' => Some("&#39;"),
        _ => None,
    }
}

fn escape_xml(ch: char, previous: Option<char>) -> Option<&'static str> {
    match ch {
        '\t' | '\n' | '\r' => None,
        c if c < ' ' => Some(""),
        _ => escape_html(ch, previous),
    }
}

fn escape_javascript(ch: char, previous: Option<char>) -> Option<&'static str> {
    match ch {
        '"' => Some("\\\""),
        '\'' => Some("\\'"),
        '\\' => Some("\\\\"),
        '\n' => Some("\\n"),
        '\r' => Some("\\r"),
        '\t' => Some("\\t"),
        '\u{8}' => Some("\\b"),
        '\u{c}' => Some("\\f"),
        '<' => Some("\\u003C"),
        '>' => Some("\\u003E"),
        '&' => Some("\\u0026"),
        '/' if previous == Some('<') => Some("\\/"),
        '\u{2028}' => Some("\\u2028"),
        '\u{2029}' => Some("\\u2029"),
        _ => None,
    }
}
