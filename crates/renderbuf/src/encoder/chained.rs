use alloc::{borrow::Cow, string::String, sync::Arc, vec::Vec};
use core::{
    fmt, mem,
    sync::atomic::{AtomicUsize, Ordering},
};
use std::sync::Mutex;

use log::debug;

use super::Encoder;
use crate::{
    appender::{AppenderId, EncodedAppender},
    codec::CombinedCodecIdentifier,
    encoding_state::EncodingState,
    error::{EncodingError, RenderError},
};

/// Scratch space for one intermediate stage of the pipeline.
#[derive(Debug)]
struct StageSlot {
    id: AppenderId,
    scratch: String,
}

/// The stage pipeline last built for a particular final appender.
#[derive(Debug)]
struct ChainPlan {
    target: AppenderId,
    stages: Vec<StageSlot>,
}

impl ChainPlan {
    fn new(target: AppenderId, stages: usize) -> Self {
        Self {
            target,
            stages: (0..stages)
                .map(|_| StageSlot {
                    id: AppenderId::next(),
                    scratch: String::new(),
                })
                .collect(),
        }
    }
}

/// Collects the output of one member so the next member sees it whole.
struct StageCollector<'a> {
    id: AppenderId,
    scratch: &'a mut String,
}

impl EncodedAppender for StageCollector<'_> {
    fn appender_id(&self) -> AppenderId {
        self.id
    }

    fn write_part(&mut self, _state: &EncodingState, text: &str) -> Result<(), RenderError> {
        self.scratch.push_str(text);
        Ok(())
    }
}

/// Several encoders applied in order, behaving as one.
///
/// Streaming runs each member into a per-stage scratch buffer that feeds the
/// next member; the last member writes into the real target. The stage
/// buffers are cached for the most recently used target and rebuilt when a
/// different target shows up. The cache is only ever taken with `try_lock`,
/// so concurrent or re-entrant use falls back to a throwaway pipeline.
pub struct ChainedEncoder {
    members: Arc<[Encoder]>,
    identifier: CombinedCodecIdentifier,
    plan: Mutex<Option<ChainPlan>>,
    plan_builds: AtomicUsize,
}

impl ChainedEncoder {
    /// Members are taken as given; use [`Encoder::chain`] to flatten.
    #[must_use]
    pub fn new(members: Vec<Encoder>) -> Self {
        let identifier = CombinedCodecIdentifier::new(
            members
                .iter()
                .filter_map(|m| m.codec_identifier().cloned()),
        );
        Self {
            members: members.into(),
            identifier,
            plan: Mutex::new(None),
            plan_builds: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn members(&self) -> &[Encoder] {
        &self.members
    }

    #[must_use]
    pub fn identifier(&self) -> &CombinedCodecIdentifier {
        &self.identifier
    }

    /// How many times the stage pipeline has been (re)built.
    #[must_use]
    pub fn plan_builds(&self) -> usize {
        self.plan_builds.load(Ordering::Relaxed)
    }

    pub fn encode<'a>(&self, value: &'a str) -> Result<Cow<'a, str>, EncodingError> {
        let mut current = Cow::Borrowed(value);
        for member in self.members.iter() {
            let next = match member.encode(&current)? {
                Cow::Borrowed(_) => None,
                Cow::Owned(encoded) => Some(encoded),
            };
            if let Some(encoded) = next {
                current = Cow::Owned(encoded);
            }
        }
        Ok(current)
    }

    pub fn encode_to_stream(
        &self,
        source: &str,
        target: &mut dyn EncodedAppender,
        state: &EncodingState,
    ) -> Result<(), RenderError> {
        let target_id = target.appender_id();
        let stages = self.members.len().saturating_sub(1);
        let Ok(mut guard) = self.plan.try_lock() else {
            let mut plan = ChainPlan::new(target_id, stages);
            return run_stages(&self.members, source, target, state, &mut plan.stages);
        };
        if guard.as_ref().is_some_and(|plan| plan.target != target_id) {
            *guard = None;
        }
        let plan = guard.get_or_insert_with(|| {
            debug!(
                "building {} stage pipeline for {} into appender {:?}",
                stages,
                self.identifier.name(),
                target_id
            );
            self.plan_builds.fetch_add(1, Ordering::Relaxed);
            ChainPlan::new(target_id, stages)
        });
        run_stages(&self.members, source, target, state, &mut plan.stages)
    }
}

fn run_stages(
    members: &[Encoder],
    source: &str,
    target: &mut dyn EncodedAppender,
    state: &EncodingState,
    stages: &mut [StageSlot],
) -> Result<(), RenderError> {
    let Some((member, rest)) = members.split_first() else {
        return target.write_part(state, source);
    };
    let Some((slot, later)) = stages.split_first_mut().filter(|_| !rest.is_empty()) else {
        return member.encode_to_stream(source, target, state);
    };
    slot.scratch.clear();
    member.encode_to_stream(
        source,
        &mut StageCollector {
            id: slot.id,
            scratch: &mut slot.scratch,
        },
        state,
    )?;
    let collected = mem::take(&mut slot.scratch);
    let result = run_stages(rest, &collected, target, state, later);
    slot.scratch = collected;
    result
}

impl Clone for ChainedEncoder {
    fn clone(&self) -> Self {
        Self {
            members: Arc::clone(&self.members),
            identifier: self.identifier.clone(),
            plan: Mutex::new(None),
            plan_builds: AtomicUsize::new(0),
        }
    }
}

impl fmt::Debug for ChainedEncoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainedEncoder")
            .field("members", &self.members)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use alloc::{format, vec};

    use super::*;
    use crate::{
        ChunkedTextBuffer,
        encoder::FunctionEncoder,
    };

    fn arrows() -> Encoder {
        Encoder::function(FunctionEncoder::new("arrows", |s| Ok(format!("-> {s} <-"))))
    }

    fn chain() -> Arc<ChainedEncoder> {
        match Encoder::chain(vec![Encoder::html(), arrows()]) {
            Encoder::Chained(chain) => chain,
            other => panic!("expected a chain, got {other:?}"),
        }
    }

    #[test]
    fn streams_through_every_member() {
        let chain = chain();
        let buffer = ChunkedTextBuffer::new();
        let mut target = buffer.clone();
        chain
            .encode_to_stream("<hola>", &mut target, &EncodingState::empty())
            .unwrap();
        assert_eq!(buffer.to_aggregated_string(), "-> &lt;hola&gt; <-");
    }

    #[test]
    fn plan_is_reused_for_the_same_target() {
        let chain = chain();
        let mut target = ChunkedTextBuffer::new();
        for _ in 0..3 {
            chain
                .encode_to_stream("x", &mut target, &EncodingState::empty())
                .unwrap();
        }
        assert_eq!(chain.plan_builds(), 1);
    }

    #[test]
    fn plan_is_rebuilt_when_the_target_changes() {
        let chain = chain();
        let mut first = ChunkedTextBuffer::new();
        let mut second = ChunkedTextBuffer::new();
        chain.encode_to_stream("a", &mut first, &EncodingState::empty()).unwrap();
        chain.encode_to_stream("b", &mut second, &EncodingState::empty()).unwrap();
        chain.encode_to_stream("c", &mut second, &EncodingState::empty()).unwrap();
        assert_eq!(chain.plan_builds(), 2);
        assert_eq!(first.to_aggregated_string(), "-> a <-");
        assert_eq!(second.to_aggregated_string(), "-> b <--> c <-");
    }

    #[test]
    fn clones_start_with_an_empty_cache() {
        let chain = chain();
        let mut target = ChunkedTextBuffer::new();
        chain.encode_to_stream("a", &mut target, &EncodingState::empty()).unwrap();
        let cloned = ChainedEncoder::clone(&chain);
        assert_eq!(cloned.plan_builds(), 0);
        assert_eq!(cloned.members().len(), 2);
    }
}
