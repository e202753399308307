//! Per-render state: codec lookup, the response buffer and the lazily created
//! output context stack.

use alloc::{string::ToString, vec::Vec};

use log::debug;

use crate::{
    buffer::ChunkedTextBuffer,
    encoder::Encoder,
    error::RenderError,
    options::OutputSettings,
    output_stack::{OutputContextAttributes, OutputContextStack, OutputTarget},
};

/// Resolves codec names from configuration to encoders.
///
/// `"none"` always resolves to [`Encoder::None`]. Other names match a
/// registered encoder's name or one of its aliases; later registrations win.
#[derive(Debug, Clone)]
pub struct CodecLookup {
    encoders: Vec<Encoder>,
}

impl Default for CodecLookup {
    fn default() -> Self {
        Self {
            encoders: alloc::vec![
                Encoder::raw(),
                Encoder::html(),
                Encoder::xml(),
                Encoder::javascript(),
            ],
        }
    }
}

impl CodecLookup {
    /// A lookup knowing the built-in codecs.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `encoder` available under its name and aliases.
    pub fn register(&mut self, encoder: Encoder) {
        self.encoders.push(encoder);
    }

    pub fn lookup(&self, name: &str) -> Result<Encoder, RenderError> {
        if name.eq_ignore_ascii_case("none") {
            return Ok(Encoder::None);
        }
        self.encoders
            .iter()
            .rev()
            .find(|e| e.codec_identifier().is_some_and(|id| id.answers_to(name)))
            .cloned()
            .ok_or_else(|| RenderError::UnknownCodec(name.to_string()))
    }
}

/// State of one render call.
#[derive(Debug)]
pub struct RenderScope {
    settings: OutputSettings,
    codecs: CodecLookup,
    response: ChunkedTextBuffer,
    output: Option<OutputContextStack>,
}

impl RenderScope {
    /// A scope writing into a fresh response buffer sized by `settings`.
    #[must_use]
    pub fn new(settings: OutputSettings, codecs: CodecLookup) -> Self {
        let response = ChunkedTextBuffer::with_options(settings.buffer);
        Self::with_response(settings, codecs, response)
    }

    #[must_use]
    pub fn with_response(
        settings: OutputSettings,
        codecs: CodecLookup,
        response: ChunkedTextBuffer,
    ) -> Self {
        Self {
            settings,
            codecs,
            response,
            output: None,
        }
    }

    #[must_use]
    pub fn settings(&self) -> &OutputSettings {
        &self.settings
    }

    #[must_use]
    pub fn codecs(&self) -> &CodecLookup {
        &self.codecs
    }

    #[must_use]
    pub fn response(&self) -> &ChunkedTextBuffer {
        &self.response
    }

    /// The output context stack of this render call. With `allow_create` a
    /// root context targeting the response buffer is created on first use,
    /// with encoders taken from the settings.
    pub fn current_output_context(
        &mut self,
        allow_create: bool,
    ) -> Result<Option<&mut OutputContextStack>, RenderError> {
        if self.output.is_none() && allow_create {
            let root = self.root_attributes()?;
            debug!("creating root output context for {:?}", self.response.id());
            self.output = Some(OutputContextStack::new(root)?);
        }
        Ok(self.output.as_mut())
    }

    fn root_attributes(&self) -> Result<OutputContextAttributes, RenderError> {
        let lookup = |name: &str| -> Result<Option<Encoder>, RenderError> {
            let encoder = self.codecs.lookup(name)?;
            Ok((!encoder.is_none()).then_some(encoder))
        };
        Ok(OutputContextAttributes {
            target: Some(OutputTarget::Buffer(self.response.clone())),
            out_encoder: lookup(&self.settings.out)?,
            static_encoder: lookup(&self.settings.static_markup)?,
            expression_encoder: lookup(&self.settings.expression)?,
            taglib_encoder: lookup(&self.settings.taglib)?,
            default_taglib_encoder: None,
            inherit_previous_encoders: false,
            replace_only: false,
        })
    }

    /// Unwind every open output context, flush the response buffer and
    /// return it.
    pub fn finish(mut self) -> Result<ChunkedTextBuffer, RenderError> {
        if let Some(stack) = self.output.as_mut() {
            while !stack.is_empty() {
                stack.pop()?;
            }
        }
        self.response.flush()?;
        Ok(self.response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{encoder::FunctionEncoder, output_stack::OutputRole};

    #[test]
    fn lookup_by_name_and_alias() {
        let codecs = CodecLookup::new();
        assert_eq!(codecs.lookup("html").unwrap().name(), "HTML");
        assert_eq!(codecs.lookup("HTML4").unwrap().name(), "HTML");
        assert_eq!(codecs.lookup("js").unwrap().name(), "JavaScript");
        assert!(codecs.lookup("None").unwrap().is_none());
        assert!(matches!(
            codecs.lookup("rot13"),
            Err(RenderError::UnknownCodec(name)) if name == "rot13"
        ));
    }

    #[test]
    fn registered_codecs_are_found() {
        let mut codecs = CodecLookup::new();
        codecs.register(Encoder::function(FunctionEncoder::new("upper", |s| {
            Ok(s.to_uppercase())
        })));
        assert_eq!(codecs.lookup("upper").unwrap().name(), "upper");
    }

    #[test]
    fn no_context_until_asked_to_create_one() {
        let mut scope = RenderScope::new(OutputSettings::default(), CodecLookup::new());
        assert!(scope.current_output_context(false).unwrap().is_none());
        assert!(scope.current_output_context(true).unwrap().is_some());
        assert_eq!(
            scope.current_output_context(false).unwrap().map(|s| s.depth()),
            Some(1)
        );
    }

    #[test]
    fn unknown_codec_in_settings_fails_creation() {
        let settings = OutputSettings {
            expression: "rot13".into(),
            ..Default::default()
        };
        let mut scope = RenderScope::new(settings, CodecLookup::new());
        assert!(matches!(
            scope.current_output_context(true),
            Err(RenderError::UnknownCodec(_))
        ));
    }

    #[test]
    fn finish_returns_the_response() {
        let mut scope = RenderScope::new(OutputSettings::default(), CodecLookup::new());
        let stack = scope.current_output_context(true).unwrap().unwrap();
        stack.write(OutputRole::Static, "<p>").unwrap();
        stack.write_expression("<script>").unwrap();
        stack.write(OutputRole::Static, "</p>").unwrap();
        let response = scope.finish().unwrap();
        assert_eq!(
            response.to_aggregated_string(),
            "<p>&lt;script&gt;</p>"
        );
    }
}
