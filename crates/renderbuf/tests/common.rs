#![allow(missing_docs, dead_code)]

use core::fmt::Write as _;

use renderbuf::{
    ChunkedTextBuffer, CodecLookup, OutputContextAttributes, OutputRole, OutputSettings,
    OutputTarget, RenderScope,
};

pub const ITEMS: [&str; 3] = ["plain", "<script>", "O'Neil"];

/// Render a small list page: static markup, one expression per item and a
/// captured tag body appended through the taglib role.
pub fn render_page(settings: OutputSettings) -> ChunkedTextBuffer {
    let mut scope = RenderScope::new(settings, CodecLookup::new());
    let stack = scope
        .current_output_context(true)
        .expect("root context")
        .expect("created");

    stack.write_literal("<ul>\n").unwrap();
    for item in ITEMS {
        stack.write_literal("<li>").unwrap();
        stack.write_expression(item).unwrap();
        stack.write_literal("</li>\n").unwrap();
    }

    let body = ChunkedTextBuffer::new();
    stack
        .push(OutputContextAttributes {
            target: Some(OutputTarget::Buffer(body.clone())),
            inherit_previous_encoders: true,
            ..Default::default()
        })
        .unwrap();
    stack.write_expression("Tom & Jerry").unwrap();
    stack.pop().unwrap();
    stack.append_buffer(OutputRole::Taglib, &body).unwrap();
    stack.write_literal("</ul>").unwrap();

    scope.finish().expect("finish")
}

/// One line per run of equal encoding state.
pub fn dump_parts(buffer: &ChunkedTextBuffer) -> String {
    let mut out = String::new();
    for part in buffer.dump_encoded_parts().expect("dump") {
        writeln!(out, "{:?} {:?}", part.state, part.text).unwrap();
    }
    out
}
