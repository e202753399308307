//! Text encoders.
//!
//! [`Encoder`] is a closed set of variants. Streaming-capable variants write
//! their output piecewise into an [`EncodedAppender`]; the
//! [`Encoder::Function`] variant only transforms fully materialized values
//! and is adapted by the caller.

mod chained;
mod replacement;

use alloc::{
    borrow::Cow,
    boxed::Box,
    string::{String, ToString},
    sync::Arc,
};
use core::{fmt, slice};

pub use chained::ChainedEncoder;
pub use replacement::{CharReplacementEncoder, EscapeFn};

use crate::{
    appender::EncodedAppender,
    codec::{CodecIdentifier, CombinedCodecIdentifier},
    encoding_state::EncodingState,
    error::{EncodingError, RenderError},
};

type EncodeFn = dyn Fn(&str) -> Result<String, String> + Send + Sync;

/// A non-streaming encoder backed by a closure over the whole value.
pub struct FunctionEncoder {
    id: CodecIdentifier,
    encode: Box<EncodeFn>,
    safe: bool,
    apply_to_safely_encoded: bool,
}

impl FunctionEncoder {
    pub fn new<F>(name: impl Into<String>, encode: F) -> Self
    where
        F: Fn(&str) -> Result<String, String> + Send + Sync + 'static,
    {
        Self::with_identifier(CodecIdentifier::new(name), encode)
    }

    pub fn with_identifier<F>(id: CodecIdentifier, encode: F) -> Self
    where
        F: Fn(&str) -> Result<String, String> + Send + Sync + 'static,
    {
        Self {
            id,
            encode: Box::new(encode),
            safe: false,
            apply_to_safely_encoded: false,
        }
    }

    /// Mark the output as safe to embed without further escaping.
    #[must_use]
    pub fn safe(mut self, safe: bool) -> Self {
        self.safe = safe;
        self
    }

    /// Run even over values another safe encoder already handled.
    #[must_use]
    pub fn apply_to_safely_encoded(mut self, apply: bool) -> Self {
        self.apply_to_safely_encoded = apply;
        self
    }

    #[must_use]
    pub fn codec_identifier(&self) -> &CodecIdentifier {
        &self.id
    }

    pub fn encode(&self, value: &str) -> Result<String, EncodingError> {
        (self.encode)(value).map_err(|message| EncodingError::new(self.id.name(), message))
    }
}

impl fmt::Debug for FunctionEncoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionEncoder")
            .field("id", &self.id)
            .field("safe", &self.safe)
            .field("apply_to_safely_encoded", &self.apply_to_safely_encoded)
            .finish_non_exhaustive()
    }
}

/// An encoder as seen by the buffering engine. Cheap to clone and safe to
/// share between render calls.
#[derive(Clone, Default)]
pub enum Encoder {
    /// Explicit pass-through. Never applied and never recorded.
    #[default]
    None,
    /// Identity transform whose output counts as safe, e.g. markup that must
    /// not be escaped again.
    Raw(CodecIdentifier),
    /// Streaming per-character replacement (HTML, XML, JavaScript, ...).
    Replacement(Arc<CharReplacementEncoder>),
    /// Whole-value transform; not streaming-capable.
    Function(Arc<FunctionEncoder>),
    /// Several encoders applied in order as one.
    Chained(Arc<ChainedEncoder>),
}

impl Encoder {
    #[must_use]
    pub fn html() -> Self {
        Self::Replacement(Arc::new(CharReplacementEncoder::html()))
    }

    #[must_use]
    pub fn xml() -> Self {
        Self::Replacement(Arc::new(CharReplacementEncoder::xml()))
    }

    #[must_use]
    pub fn javascript() -> Self {
        Self::Replacement(Arc::new(CharReplacementEncoder::javascript()))
    }

    #[must_use]
    pub fn raw() -> Self {
        Self::Raw(CodecIdentifier::new("raw"))
    }

    #[must_use]
    pub fn replacement(encoder: CharReplacementEncoder) -> Self {
        Self::Replacement(Arc::new(encoder))
    }

    #[must_use]
    pub fn function(encoder: FunctionEncoder) -> Self {
        Self::Function(Arc::new(encoder))
    }

    /// Compose `members` into one encoder applied left to right.
    ///
    /// Nested chains are flattened and pass-through members dropped. An empty
    /// chain is [`Encoder::None`] and a single member is returned as is.
    pub fn chain(members: impl IntoIterator<Item = Encoder>) -> Self {
        let mut flat = alloc::vec::Vec::new();
        for member in members {
            match member {
                Encoder::None => {}
                Encoder::Chained(chain) => flat.extend(chain.members().iter().cloned()),
                other => flat.push(other),
            }
        }
        match flat.len() {
            0 => Encoder::None,
            1 => flat.pop().unwrap_or_default(),
            _ => Encoder::Chained(Arc::new(ChainedEncoder::new(flat))),
        }
    }

    #[must_use]
    pub fn is_none(&self) -> bool {
        matches!(self, Encoder::None)
    }

    /// Identity of a single encoder. `None` for pass-through and chains.
    #[must_use]
    pub fn codec_identifier(&self) -> Option<&CodecIdentifier> {
        match self {
            Encoder::None | Encoder::Chained(_) => None,
            Encoder::Raw(id) => Some(id),
            Encoder::Replacement(e) => Some(e.codec_identifier()),
            Encoder::Function(e) => Some(e.codec_identifier()),
        }
    }

    /// Ordered identities of everything this encoder applies.
    #[must_use]
    pub fn combined_identifier(&self) -> CombinedCodecIdentifier {
        match self {
            Encoder::Chained(chain) => chain.identifier().clone(),
            single => CombinedCodecIdentifier::new(single.codec_identifier().cloned()),
        }
    }

    #[must_use]
    pub fn name(&self) -> String {
        match self {
            Encoder::None => "none".to_string(),
            Encoder::Chained(chain) => chain.identifier().name(),
            single => single
                .codec_identifier()
                .map(|id| id.name().to_string())
                .unwrap_or_default(),
        }
    }

    /// Whether the two encoders have the same effect, judged by identity.
    #[must_use]
    pub fn is_equivalent(&self, other: &Encoder) -> bool {
        match (self, other) {
            (Encoder::None, Encoder::None) => true,
            (Encoder::None, _) | (_, Encoder::None) => false,
            _ => self
                .combined_identifier()
                .is_equivalent(&other.combined_identifier()),
        }
    }

    /// The output of this encoder is safe to embed without further escaping.
    #[must_use]
    pub fn is_safe(&self) -> bool {
        match self {
            Encoder::None => false,
            Encoder::Raw(_) => true,
            Encoder::Replacement(e) => e.is_safe(),
            Encoder::Function(e) => e.safe,
            Encoder::Chained(chain) => chain.members().iter().any(Encoder::is_safe),
        }
    }

    #[must_use]
    pub fn is_apply_to_safely_encoded(&self) -> bool {
        match self {
            Encoder::None | Encoder::Raw(_) | Encoder::Replacement(_) => false,
            Encoder::Function(e) => e.apply_to_safely_encoded,
            Encoder::Chained(chain) => chain
                .members()
                .iter()
                .any(Encoder::is_apply_to_safely_encoded),
        }
    }

    #[must_use]
    pub fn is_streaming(&self) -> bool {
        !matches!(self, Encoder::Function(_))
    }

    /// The encoders this one applies, in order; a single encoder is its own
    /// only member.
    #[must_use]
    pub fn members(&self) -> &[Encoder] {
        match self {
            Encoder::Chained(chain) => chain.members(),
            single => slice::from_ref(single),
        }
    }

    /// Transform a fully materialized value. Unchanged input is returned
    /// borrowed.
    pub fn encode<'a>(&self, value: &'a str) -> Result<Cow<'a, str>, EncodingError> {
        match self {
            Encoder::None | Encoder::Raw(_) => Ok(Cow::Borrowed(value)),
            Encoder::Replacement(e) => Ok(e.encode(value)),
            Encoder::Function(e) => e.encode(value).map(Cow::Owned),
            Encoder::Chained(chain) => chain.encode(value),
        }
    }

    /// Write the encoded form of `source` into `target`, tagging every piece
    /// with `state` (the state *after* this encoder).
    ///
    /// Non-streaming variants fall back to [`Encoder::encode`].
    pub fn encode_to_stream(
        &self,
        source: &str,
        target: &mut dyn EncodedAppender,
        state: &EncodingState,
    ) -> Result<(), RenderError> {
        if source.is_empty() {
            return Ok(());
        }
        match self {
            Encoder::None | Encoder::Raw(_) => target.write_part(state, source),
            Encoder::Replacement(e) => e.encode_to_stream(source, target, state),
            Encoder::Function(e) => {
                let encoded = e.encode(source)?;
                target.write_part(state, &encoded)
            }
            Encoder::Chained(chain) => chain.encode_to_stream(source, target, state),
        }
    }
}

impl fmt::Debug for Encoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Encoder::None => f.write_str("Encoder::None"),
            Encoder::Raw(id) => write!(f, "Encoder::Raw({id})"),
            Encoder::Replacement(e) => write!(f, "Encoder::Replacement({:?})", e.codec_identifier()),
            Encoder::Function(e) => write!(f, "Encoder::Function({:?})", e.codec_identifier()),
            Encoder::Chained(chain) => write!(f, "Encoder::Chained({:?})", chain.identifier()),
        }
    }
}

#[cfg(test)]
mod tests {
    use alloc::{format, vec};

    use super::*;

    fn arrows() -> Encoder {
        Encoder::function(FunctionEncoder::new("arrows", |s| Ok(format!("-> {s} <-"))))
    }

    #[test]
    fn html_escapes_markup() {
        assert_eq!(Encoder::html().encode("&&").unwrap(), "&amp;&amp;");
        assert_eq!(
            Encoder::html().encode("<a href=\"x\">'</a>").unwrap(),
            "&lt;a href=&quot;x&quot;&gt;&#39;&lt;/a&gt;"
        );
    }

    #[test]
    fn unchanged_values_are_borrowed() {
        assert!(matches!(Encoder::html().encode("plain").unwrap(), Cow::Borrowed("plain")));
        assert!(matches!(Encoder::raw().encode("<b>").unwrap(), Cow::Borrowed("<b>")));
    }

    #[test]
    fn chain_of_nothing_is_none() {
        assert!(Encoder::chain(vec![]).is_none());
        assert!(Encoder::chain(vec![Encoder::None, Encoder::None]).is_none());
    }

    #[test]
    fn chain_of_one_collapses() {
        let chain = Encoder::chain(vec![Encoder::html()]);
        assert!(matches!(chain, Encoder::Replacement(_)));
        assert_eq!(chain.name(), "HTML");
    }

    #[test]
    fn nested_chains_flatten() {
        let inner = Encoder::chain(vec![Encoder::html(), arrows()]);
        let outer = Encoder::chain(vec![inner, Encoder::javascript()]);
        assert_eq!(outer.members().len(), 3);
        assert_eq!(outer.name(), "HTML->arrows->JavaScript");
    }

    #[test]
    fn chain_encode_applies_in_order() {
        let chain = Encoder::chain(vec![Encoder::html(), arrows()]);
        let direct = arrows()
            .encode(&Encoder::html().encode("<hola>").unwrap())
            .unwrap()
            .into_owned();
        assert_eq!(chain.encode("<hola>").unwrap(), direct);
        assert_eq!(direct, "-> &lt;hola&gt; <-");
    }

    #[test]
    fn function_errors_name_the_codec() {
        let failing = Encoder::function(FunctionEncoder::new("broken", |_| Err("nope".into())));
        let err = failing.encode("x").unwrap_err();
        assert_eq!(err, EncodingError::new("broken", "nope"));
    }

    #[test]
    fn equivalence_ignores_object_identity() {
        assert!(Encoder::html().is_equivalent(&Encoder::html()));
        assert!(!Encoder::html().is_equivalent(&Encoder::xml()));
        assert!(Encoder::chain(vec![Encoder::html()]).is_equivalent(&Encoder::html()));
        assert!(!Encoder::None.is_equivalent(&Encoder::raw()));
    }
}
