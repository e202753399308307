#![expect(missing_docs)]

mod common;

use renderbuf::{Encoder, OutputSettings};

use crate::common::{dump_parts, render_page};

#[test]
fn snapshot_default_settings() {
    let page = render_page(OutputSettings::default());
    insta::assert_snapshot!(dump_parts(&page), @r#"
    [] "<ul>\n<li>"
    [HTML] "plain"
    [] "</li>\n<li>"
    [HTML] "&lt;script&gt;"
    [] "</li>\n<li>"
    [HTML] "O&#39;Neil"
    [] "</li>\n"
    [HTML] "Tom &amp; Jerry"
    [] "</ul>"
    "#);
}

#[test]
fn snapshot_raw_expressions() {
    let page = render_page(OutputSettings {
        expression: "raw".into(),
        ..Default::default()
    });
    insta::assert_snapshot!(dump_parts(&page), @r#"
    [] "<ul>\n<li>"
    [raw] "plain"
    [] "</li>\n<li>"
    [raw] "<script>"
    [] "</li>\n<li>"
    [raw] "O'Neil"
    [] "</li>\n"
    [raw] "Tom & Jerry"
    [] "</ul>"
    "#);
}

#[test]
fn reencoding_a_page_only_touches_unencoded_spans() {
    let page = render_page(OutputSettings::default());
    let escaped = page.encode_to_buffer(Some(&Encoder::html())).unwrap();
    insta::assert_snapshot!(escaped.to_aggregated_string(), @r"
    &lt;ul&gt;
    &lt;li&gt;plain&lt;/li&gt;
    &lt;li&gt;&lt;script&gt;&lt;/li&gt;
    &lt;li&gt;O&#39;Neil&lt;/li&gt;
    Tom &amp; Jerry&lt;/ul&gt;
    ");
}

#[test]
fn unknown_codec_is_reported() {
    let mut scope = renderbuf::RenderScope::new(
        OutputSettings {
            taglib: "base64".into(),
            ..Default::default()
        },
        renderbuf::CodecLookup::new(),
    );
    let err = scope.current_output_context(true).unwrap_err();
    insta::assert_snapshot!(err.to_string(), @"unknown codec 'base64'");
}
