//! Nested output scopes for one render call.
//!
//! Every scope binds a sink to four encoder roles. Writes go to the top
//! scope and reach its target immediately, so the target always holds the
//! writes in the order they were made.

use alloc::{string::ToString, vec::Vec};
use core::fmt;

use log::{debug, trace, warn};

use crate::{
    appender::{AppenderId, EncodedAppender, append_to},
    buffer::ChunkedTextBuffer,
    encoder::Encoder,
    encoding_state::EncodingState,
    error::RenderError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputRole {
    /// Plain `out` writes.
    Out,
    /// Static template markup.
    Static,
    /// Results of `${...}` expressions.
    Expression,
    /// Output produced by tag-library calls.
    Taglib,
}

impl OutputRole {
    pub const ALL: [OutputRole; 4] = [
        OutputRole::Out,
        OutputRole::Static,
        OutputRole::Expression,
        OutputRole::Taglib,
    ];

    fn index(self) -> usize {
        match self {
            OutputRole::Out => 0,
            OutputRole::Static => 1,
            OutputRole::Expression => 2,
            OutputRole::Taglib => 3,
        }
    }
}

/// Where a scope's output goes.
#[derive(Debug, Clone)]
pub enum OutputTarget {
    Buffer(ChunkedTextBuffer),
    /// The enclosing scope's writer for the given role, including its
    /// encoder.
    Proxy(OutputRole),
}

/// What to change when pushing a scope. Unset encoders inherit from the
/// enclosing scope only with `inherit_previous_encoders`.
#[derive(Debug, Clone, Default)]
pub struct OutputContextAttributes {
    /// `None` keeps the enclosing scope's target.
    pub target: Option<OutputTarget>,
    pub out_encoder: Option<Encoder>,
    pub static_encoder: Option<Encoder>,
    pub expression_encoder: Option<Encoder>,
    pub taglib_encoder: Option<Encoder>,
    /// Used for the taglib role when no taglib encoder is set.
    pub default_taglib_encoder: Option<Encoder>,
    pub inherit_previous_encoders: bool,
    /// Only replace an inherited encoder whose output is not already safe.
    pub replace_only: bool,
}

#[derive(Debug, Clone)]
enum Sink {
    Buffer(ChunkedTextBuffer),
    /// The writer for `role` of the scope at `depth`.
    Role { depth: usize, role: OutputRole },
}

#[derive(Debug)]
struct OutputContext {
    original_target: OutputTarget,
    unwrapped_target: ChunkedTextBuffer,
    sink: Sink,
    sink_id: AppenderId,
    encoders: [Option<Encoder>; 4],
    default_taglib: Option<Encoder>,
    role_ids: [AppenderId; 4],
}

impl OutputContext {
    fn encoder(&self, role: OutputRole) -> Option<&Encoder> {
        let encoder = self.encoders[role.index()].as_ref();
        match role {
            OutputRole::Taglib => encoder.or(self.default_taglib.as_ref()),
            _ => encoder,
        }
    }
}

fn apply_encoder(
    requested: Option<Encoder>,
    inherited: Option<&Encoder>,
    allow_inherit: bool,
    replace_only: bool,
) -> Option<Encoder> {
    if let Some(requested) = requested {
        if !replace_only || inherited.is_none_or(|e| !e.is_safe()) {
            return Some(requested);
        }
    }
    if allow_inherit { inherited.cloned() } else { None }
}

/// Writes into the sink of the scope at `depth`.
struct SinkWriter<'a> {
    entries: &'a [OutputContext],
    depth: usize,
}

impl SinkWriter<'_> {
    fn entry(&self) -> Result<&OutputContext, RenderError> {
        self.entries
            .get(self.depth)
            .ok_or(RenderError::NoActiveContext)
    }
}

impl EncodedAppender for SinkWriter<'_> {
    fn appender_id(&self) -> AppenderId {
        self.entries
            .get(self.depth)
            .map_or_else(AppenderId::next, |e| e.sink_id)
    }

    fn write_part(&mut self, state: &EncodingState, text: &str) -> Result<(), RenderError> {
        let entries = self.entries;
        match &self.entry()?.sink {
            Sink::Buffer(buffer) => buffer.write_tagged(state, text),
            Sink::Role { depth, role } => {
                let encoder = entries
                    .get(*depth)
                    .ok_or(RenderError::NoActiveContext)?
                    .encoder(*role);
                let mut parent = SinkWriter {
                    entries,
                    depth: *depth,
                };
                append_to(&mut parent, encoder, state, text)
            }
        }
    }
}

/// A role writer: applies the role's encoder, then writes to the sink.
struct RoleWriter<'a> {
    id: AppenderId,
    encoder: Option<&'a Encoder>,
    sink: SinkWriter<'a>,
}

impl EncodedAppender for RoleWriter<'_> {
    fn appender_id(&self) -> AppenderId {
        self.id
    }

    fn write_part(&mut self, state: &EncodingState, text: &str) -> Result<(), RenderError> {
        append_to(&mut self.sink, self.encoder, state, text)
    }
}

fn embed(
    entries: &[OutputContext],
    depth: usize,
    encoder: Option<&Encoder>,
    buffer: &ChunkedTextBuffer,
) -> Result<(), RenderError> {
    let needs_encoding = match encoder {
        Some(encoder) if !encoder.is_none() => buffer.needs_encoding(encoder)?,
        _ => false,
    };
    if needs_encoding {
        return buffer.encode_to(&mut SinkWriter { entries, depth }, encoder);
    }
    match &entries
        .get(depth)
        .ok_or(RenderError::NoActiveContext)?
        .sink
    {
        Sink::Buffer(target) => {
            debug!("embedding buffer {:?} into {:?}", buffer.id(), target.id());
            target.append_buffer(buffer)
        }
        Sink::Role { depth, role } => {
            let encoder = entries
                .get(*depth)
                .ok_or(RenderError::NoActiveContext)?
                .encoder(*role);
            embed(entries, *depth, encoder, buffer)
        }
    }
}

/// Stack of nested output scopes for one render call.
pub struct OutputContextStack {
    entries: Vec<OutputContext>,
    active: Option<OutputRole>,
}

impl fmt::Debug for OutputContextStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputContextStack")
            .field("depth", &self.entries.len())
            .field("active", &self.active)
            .finish_non_exhaustive()
    }
}

impl OutputContextStack {
    /// A stack holding the root scope. The root needs a buffer target.
    pub fn new(root: OutputContextAttributes) -> Result<Self, RenderError> {
        if !matches!(root.target, Some(OutputTarget::Buffer(_))) {
            return Err(RenderError::MissingTarget);
        }
        let mut stack = Self {
            entries: Vec::new(),
            active: None,
        };
        stack.push(root)?;
        Ok(stack)
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Enter a nested scope.
    pub fn push(&mut self, attributes: OutputContextAttributes) -> Result<(), RenderError> {
        self.active = None;

        let previous = self.entries.last();
        if let Some(OutputTarget::Buffer(target)) = &attributes.target {
            let duplicate = self.entries.iter().any(|e| {
                matches!(&e.original_target, OutputTarget::Buffer(b) if b.ptr_eq(target))
            });
            if duplicate {
                warn!(
                    "buffer {:?} pushed to the output context stack a second time",
                    target.id()
                );
            }
        }

        let (original_target, sink, unwrapped_target) = match attributes.target {
            Some(OutputTarget::Buffer(buffer)) => (
                OutputTarget::Buffer(buffer.clone()),
                Sink::Buffer(buffer.clone()),
                buffer,
            ),
            Some(OutputTarget::Proxy(role)) => {
                let previous = previous.ok_or(RenderError::MissingTarget)?;
                (
                    OutputTarget::Proxy(role),
                    Sink::Role {
                        depth: self.entries.len() - 1,
                        role,
                    },
                    previous.unwrapped_target.clone(),
                )
            }
            None => {
                let previous = previous.ok_or(RenderError::MissingTarget)?;
                (
                    previous.original_target.clone(),
                    previous.sink.clone(),
                    previous.unwrapped_target.clone(),
                )
            }
        };

        let inherit = attributes.inherit_previous_encoders;
        let replace_only = attributes.replace_only;
        let inherited = |role: OutputRole| previous.and_then(|p| p.encoders[role.index()].as_ref());
        let encoders = [
            apply_encoder(attributes.out_encoder, inherited(OutputRole::Out), inherit, replace_only),
            apply_encoder(attributes.static_encoder, inherited(OutputRole::Static), inherit, replace_only),
            apply_encoder(
                attributes.expression_encoder,
                inherited(OutputRole::Expression),
                inherit,
                replace_only,
            ),
            apply_encoder(attributes.taglib_encoder, inherited(OutputRole::Taglib), inherit, replace_only),
        ];
        let default_taglib = apply_encoder(
            attributes.default_taglib_encoder,
            previous.and_then(|p| p.default_taglib.as_ref()),
            inherit,
            replace_only,
        );

        self.entries.push(OutputContext {
            original_target,
            unwrapped_target,
            sink,
            sink_id: AppenderId::next(),
            encoders,
            default_taglib,
            role_ids: [
                AppenderId::next(),
                AppenderId::next(),
                AppenderId::next(),
                AppenderId::next(),
            ],
        });
        Ok(())
    }

    /// Enter a scope writing into `target` with the current encoders.
    pub fn push_target(&mut self, target: ChunkedTextBuffer) -> Result<(), RenderError> {
        self.push(OutputContextAttributes {
            target: Some(OutputTarget::Buffer(target)),
            inherit_previous_encoders: true,
            ..Default::default()
        })
    }

    /// Leave the current scope.
    ///
    /// # Panics
    ///
    /// Panics if the stack is empty.
    pub fn pop(&mut self) -> Result<(), RenderError> {
        assert!(
            !self.entries.is_empty(),
            "pop() called on an empty output context stack"
        );
        self.active = None;
        self.entries.pop();
        Ok(())
    }

    #[must_use]
    pub fn encoder(&self, role: OutputRole) -> Option<&Encoder> {
        self.entries.last().and_then(|e| e.encoder(role))
    }

    /// The concrete buffer the current scope ends up writing into.
    #[must_use]
    pub fn current_target(&self) -> Option<&ChunkedTextBuffer> {
        self.entries.last().map(|e| &e.unwrapped_target)
    }

    #[must_use]
    pub fn original_target(&self) -> Option<&OutputTarget> {
        self.entries.last().map(|e| &e.original_target)
    }

    #[must_use]
    pub fn active_role(&self) -> Option<OutputRole> {
        self.active
    }

    fn activate(&mut self, role: OutputRole) {
        if self.active != Some(role) {
            trace!("output role {:?} -> {role:?}", self.active);
            self.active = Some(role);
        }
    }

    /// Flush the buffer the current scope writes into, forwarding its
    /// content if it is connected.
    pub fn flush_active(&mut self) -> Result<(), RenderError> {
        self.entries
            .last()
            .ok_or(RenderError::NoActiveContext)?
            .unwrapped_target
            .flush()
    }

    fn write_through(
        &mut self,
        role: OutputRole,
        extra: Option<&Encoder>,
        state: &EncodingState,
        text: &str,
    ) -> Result<(), RenderError> {
        if text.is_empty() {
            return Ok(());
        }
        let depth = self
            .entries
            .len()
            .checked_sub(1)
            .ok_or(RenderError::NoActiveContext)?;
        self.activate(role);
        let entry = &self.entries[depth];
        let mut writer = RoleWriter {
            id: entry.role_ids[role.index()],
            encoder: entry.encoder(role),
            sink: SinkWriter {
                entries: &self.entries,
                depth,
            },
        };
        match extra {
            Some(encoder) => append_to(&mut writer, Some(encoder), state, text),
            None => writer.write_part(state, text),
        }
    }

    /// Write `text` through the role's encoder.
    pub fn write(&mut self, role: OutputRole, text: &str) -> Result<(), RenderError> {
        self.write_through(role, None, &EncodingState::empty(), text)
    }

    /// Write `text` that already carries `state`.
    pub fn write_encoded(
        &mut self,
        role: OutputRole,
        state: &EncodingState,
        text: &str,
    ) -> Result<(), RenderError> {
        self.write_through(role, None, state, text)
    }

    /// Encode `text` with `encoder`, then pass it through the role's encoder,
    /// which skips it if that would be redundant.
    pub fn write_with(
        &mut self,
        role: OutputRole,
        encoder: &Encoder,
        text: &str,
    ) -> Result<(), RenderError> {
        self.write_through(role, Some(encoder), &EncodingState::empty(), text)
    }

    pub fn write_literal(&mut self, text: &str) -> Result<(), RenderError> {
        self.write(OutputRole::Static, text)
    }

    pub fn write_expression(&mut self, value: impl fmt::Display) -> Result<(), RenderError> {
        self.write(OutputRole::Expression, &value.to_string())
    }

    pub fn write_taglib(&mut self, text: &str) -> Result<(), RenderError> {
        self.write(OutputRole::Taglib, text)
    }

    /// Add a captured buffer to the role's output.
    ///
    /// When no span of `buffer` needs the role's encoder it is embedded into
    /// the target as a whole; otherwise its spans are encoded one by one.
    pub fn append_buffer(
        &mut self,
        role: OutputRole,
        buffer: &ChunkedTextBuffer,
    ) -> Result<(), RenderError> {
        let depth = self
            .entries
            .len()
            .checked_sub(1)
            .ok_or(RenderError::NoActiveContext)?;
        self.activate(role);
        let encoder = self.entries[depth].encoder(role);
        embed(&self.entries, depth, encoder, buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root(buffer: &ChunkedTextBuffer) -> OutputContextStack {
        OutputContextStack::new(OutputContextAttributes {
            target: Some(OutputTarget::Buffer(buffer.clone())),
            expression_encoder: Some(Encoder::html()),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn apply_encoder_rules() {
        let html = Encoder::html();
        let raw = Encoder::raw();
        let wrap = Encoder::function(crate::encoder::FunctionEncoder::new("wrap", |s| Ok(s.into())));

        assert!(apply_encoder(Some(raw.clone()), Some(&html), false, false).is_some_and(|e| e.is_equivalent(&raw)));
        // replace-only keeps a safe inherited encoder
        assert!(apply_encoder(Some(raw.clone()), Some(&html), true, true).is_some_and(|e| e.is_equivalent(&html)));
        // ...but replaces one that is not safe
        assert!(apply_encoder(Some(raw.clone()), Some(&wrap), true, true).is_some_and(|e| e.is_equivalent(&raw)));
        assert!(apply_encoder(None, Some(&html), true, false).is_some_and(|e| e.is_equivalent(&html)));
        assert!(apply_encoder(None, Some(&html), false, false).is_none());
        assert!(apply_encoder(Some(raw.clone()), None, false, true).is_some());
    }

    #[test]
    fn root_requires_a_buffer() {
        let err = OutputContextStack::new(OutputContextAttributes::default()).unwrap_err();
        assert!(matches!(err, RenderError::MissingTarget));
    }

    #[test]
    fn roles_use_their_own_encoder() {
        let buffer = ChunkedTextBuffer::new();
        let mut stack = root(&buffer);
        stack.write_literal("<p>").unwrap();
        stack.write_expression("a < b").unwrap();
        stack.write_literal("</p>").unwrap();
        stack.flush_active().unwrap();
        assert_eq!(buffer.to_aggregated_string(), "<p>a &lt; b</p>");
    }

    #[test]
    fn writes_reach_the_target_immediately() {
        let buffer = ChunkedTextBuffer::new();
        let mut stack = root(&buffer);
        stack.write(OutputRole::Out, "a").unwrap();
        buffer.write("b").unwrap();
        stack.write(OutputRole::Out, "c").unwrap();
        assert_eq!(stack.active_role(), Some(OutputRole::Out));
        assert_eq!(buffer.to_aggregated_string(), "abc");

        let captured = ChunkedTextBuffer::new();
        stack.push_target(captured.clone()).unwrap();
        stack.write(OutputRole::Out, "4").unwrap();
        assert_eq!(captured.to_aggregated_string(), "4");
        assert_eq!(stack.active_role(), Some(OutputRole::Out));
        stack.pop().unwrap();
        assert_eq!(stack.active_role(), None);
    }

    #[test]
    fn proxy_target_applies_both_encoders_once() {
        let buffer = ChunkedTextBuffer::new();
        let mut stack = root(&buffer);
        stack
            .push(OutputContextAttributes {
                target: Some(OutputTarget::Proxy(OutputRole::Expression)),
                expression_encoder: Some(Encoder::html()),
                ..Default::default()
            })
            .unwrap();
        stack.write_expression("&&").unwrap();
        stack.pop().unwrap();
        assert_eq!(buffer.to_aggregated_string(), "&amp;&amp;");
    }

    #[test]
    fn pop_restores_parent_encoders() {
        let buffer = ChunkedTextBuffer::new();
        let mut stack = root(&buffer);
        stack
            .push(OutputContextAttributes {
                expression_encoder: Some(Encoder::raw()),
                inherit_previous_encoders: true,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(stack.depth(), 2);
        stack.write_expression("<b>").unwrap();
        stack.pop().unwrap();
        stack.write_expression("<i>").unwrap();
        stack.flush_active().unwrap();
        assert_eq!(buffer.to_aggregated_string(), "<b>&lt;i&gt;");
    }

    #[test]
    fn taglib_falls_back_to_default_encoder() {
        let buffer = ChunkedTextBuffer::new();
        let mut stack = OutputContextStack::new(OutputContextAttributes {
            target: Some(OutputTarget::Buffer(buffer.clone())),
            default_taglib_encoder: Some(Encoder::html()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(stack.encoder(OutputRole::Taglib).map(Encoder::name).as_deref(), Some("HTML"));
        stack.write_taglib("<").unwrap();
        stack.flush_active().unwrap();
        assert_eq!(buffer.to_aggregated_string(), "&lt;");
    }

    #[test]
    fn duplicate_push_proceeds() {
        let buffer = ChunkedTextBuffer::new();
        let mut stack = root(&buffer);
        stack.push_target(buffer.clone()).unwrap();
        assert_eq!(stack.depth(), 2);
    }

    #[test]
    #[should_panic(expected = "empty output context stack")]
    fn popping_an_empty_stack_panics() {
        let buffer = ChunkedTextBuffer::new();
        let mut stack = root(&buffer);
        stack.pop().unwrap();
        let _ = stack.pop();
    }

    #[test]
    fn writes_on_an_empty_stack_fail() {
        let buffer = ChunkedTextBuffer::new();
        let mut stack = root(&buffer);
        stack.pop().unwrap();
        assert!(matches!(
            stack.write_literal("x"),
            Err(RenderError::NoActiveContext)
        ));
    }
}
