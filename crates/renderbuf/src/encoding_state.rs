//! Which encoders a span has already been through, and whether applying
//! another one would be redundant.

use alloc::{borrow::Cow, sync::Arc, vec::Vec};
use core::{
    fmt,
    hash::{Hash, Hasher},
};

use crate::{codec::CodecIdentifier, encoder::Encoder};

/// One entry of an [`EncodingState`].
#[derive(Debug, Clone)]
pub struct AppliedCodec {
    pub id: CodecIdentifier,
    /// The codec's output is safe to embed as-is (see [`Encoder::is_safe`]).
    pub safe: bool,
}

/// Ordered, de-duplicated record of the encoders applied to a value.
///
/// Cheap to clone; the empty state does not allocate. Equality compares the
/// codec identity sequence only.
#[derive(Clone, Default)]
pub struct EncodingState(Option<Arc<[AppliedCodec]>>);

impl EncodingState {
    #[must_use]
    pub fn empty() -> Self {
        Self(None)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }

    #[must_use]
    pub fn codecs(&self) -> &[AppliedCodec] {
        self.0.as_deref().unwrap_or(&[])
    }

    /// Whether an encoder equivalent to `id` has been applied.
    #[must_use]
    pub fn contains(&self, id: &CodecIdentifier) -> bool {
        self.codecs().iter().any(|c| c.id.is_equivalent(id))
    }

    /// The state after additionally applying `id`. Applying an equivalent
    /// codec a second time leaves the state unchanged.
    #[must_use]
    pub fn with_applied(&self, id: &CodecIdentifier, safe: bool) -> Self {
        if self.contains(id) {
            return self.clone();
        }
        let mut codecs: Vec<AppliedCodec> = Vec::with_capacity(self.codecs().len() + 1);
        codecs.extend_from_slice(self.codecs());
        codecs.push(AppliedCodec {
            id: id.clone(),
            safe,
        });
        Self(Some(codecs.into()))
    }
}

impl PartialEq for EncodingState {
    fn eq(&self, other: &Self) -> bool {
        match (&self.0, &other.0) {
            (Some(a), Some(b)) if Arc::ptr_eq(a, b) => true,
            _ => {
                self.codecs().len() == other.codecs().len()
                    && self
                        .codecs()
                        .iter()
                        .zip(other.codecs())
                        .all(|(a, b)| a.id == b.id)
            }
        }
    }
}

impl Eq for EncodingState {}

impl Hash for EncodingState {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for codec in self.codecs() {
            codec.id.hash(state);
        }
    }
}

impl fmt::Debug for EncodingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.codecs().iter().map(|c| &c.id))
            .finish()
    }
}

/// Policy deciding whether an encoder application is redundant.
///
/// Stateless, so one instance can be shared freely between render calls.
#[derive(Debug, Clone, Copy, Default)]
pub struct EncodingStateRegistry;

impl EncodingStateRegistry {
    /// Whether `encoder` still has to run over a span carrying `state`.
    ///
    /// A single encoder is redundant when an equivalent codec is already in
    /// the state, or when a *safe* codec was applied and the candidate is
    /// safe as well. Encoders flagged `apply_to_safely_encoded` are never
    /// redundant. A chain is redundant only when every member is.
    #[must_use]
    pub fn should_encode_with(&self, encoder: &Encoder, state: &EncodingState) -> bool {
        if encoder.is_none() {
            return false;
        }
        encoder
            .members()
            .iter()
            .any(|member| !Self::is_redundant(member, state))
    }

    /// The part of `encoder` that still has to run over a span carrying
    /// `state`: chain members that are redundant for `state` are dropped.
    /// `None` when nothing is left to apply.
    #[must_use]
    pub fn effective_encoder<'e>(
        &self,
        encoder: &'e Encoder,
        state: &EncodingState,
    ) -> Option<Cow<'e, Encoder>> {
        if encoder.is_none() {
            return None;
        }
        let members = encoder.members();
        let pending = members
            .iter()
            .filter(|member| !Self::is_redundant(member, state))
            .count();
        match pending {
            0 => None,
            n if n == members.len() => Some(Cow::Borrowed(encoder)),
            _ => Some(Cow::Owned(Encoder::chain(
                members
                    .iter()
                    .filter(|member| !Self::is_redundant(member, state))
                    .cloned(),
            ))),
        }
    }

    fn is_redundant(encoder: &Encoder, state: &EncodingState) -> bool {
        if encoder.is_apply_to_safely_encoded() {
            return false;
        }
        let Some(id) = encoder.codec_identifier() else {
            return true;
        };
        let safe = encoder.is_safe();
        state
            .codecs()
            .iter()
            .any(|applied| applied.id.is_equivalent(id) || (applied.safe && safe))
    }

    /// The state recorded after `encoder` has transformed a span that carried
    /// `state`.
    #[must_use]
    pub fn append_encoder(&self, state: &EncodingState, encoder: &Encoder) -> EncodingState {
        let mut next = state.clone();
        for member in encoder.members() {
            if let Some(id) = member.codec_identifier() {
                next = next.with_applied(id, member.is_safe());
            }
        }
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::FunctionEncoder;

    #[test]
    fn empty_state_is_cheap_and_equal() {
        assert!(EncodingState::empty().is_empty());
        assert_eq!(EncodingState::empty(), EncodingState::default());
    }

    #[test]
    fn applying_twice_is_idempotent() {
        let html = Encoder::html();
        let registry = EncodingStateRegistry;
        let once = registry.append_encoder(&EncodingState::empty(), &html);
        let twice = registry.append_encoder(&once, &html);
        assert_eq!(once, twice);
        assert_eq!(once.codecs().len(), 1);
    }

    #[test]
    fn equivalent_codec_is_redundant() {
        let registry = EncodingStateRegistry;
        let state = registry.append_encoder(&EncodingState::empty(), &Encoder::html());
        assert!(!registry.should_encode_with(&Encoder::html(), &state));
        assert!(registry.should_encode_with(&Encoder::html(), &EncodingState::empty()));
    }

    #[test]
    fn safe_output_is_not_reencoded_by_another_safe_codec() {
        let registry = EncodingStateRegistry;
        let state = registry.append_encoder(&EncodingState::empty(), &Encoder::html());
        assert!(!registry.should_encode_with(&Encoder::xml(), &state));
    }

    #[test]
    fn unsafe_codec_runs_after_safe_one() {
        let registry = EncodingStateRegistry;
        let wrap = Encoder::function(FunctionEncoder::new("wrap", |s| Ok(s.into())));
        let state = registry.append_encoder(&EncodingState::empty(), &Encoder::html());
        assert!(registry.should_encode_with(&wrap, &state));
    }

    #[test]
    fn apply_to_safely_encoded_always_runs() {
        let registry = EncodingStateRegistry;
        let html = Encoder::html();
        let state = registry.append_encoder(&EncodingState::empty(), &html);
        let forced = Encoder::function(
            FunctionEncoder::new("html", |s| Ok(s.into())).apply_to_safely_encoded(true),
        );
        assert!(registry.should_encode_with(&forced, &state));
    }

    #[test]
    fn applied_chain_members_are_dropped() {
        let registry = EncodingStateRegistry;
        let wrap = Encoder::function(FunctionEncoder::new("wrap", |s| Ok(s.into())));
        let chain = Encoder::chain([Encoder::html(), wrap.clone()]);

        let fresh = registry.effective_encoder(&chain, &EncodingState::empty());
        assert!(matches!(fresh, Some(Cow::Borrowed(_))));

        let state = registry.append_encoder(&EncodingState::empty(), &Encoder::html());
        let reduced = registry.effective_encoder(&chain, &state).unwrap();
        assert!(reduced.is_equivalent(&wrap));

        let done = registry.append_encoder(&state, &wrap);
        assert!(registry.effective_encoder(&chain, &done).is_none());
    }

    #[test]
    fn none_encoder_never_runs() {
        assert!(!EncodingStateRegistry.should_encode_with(&Encoder::None, &EncodingState::empty()));
    }
}
