//! Page Rendering
//!
//! Output is a pure function of the document and one registry snapshot.
//! The side channel is computed over the whole document before any markup is
//! written, so a tag that recurs in a later block shows its last value.

use serde_json::{Map, Value};
use std::collections::HashSet;

use crate::document::OrderedDocument;
use crate::resolver::{render_builtin, resolve, standard_tags, RenderAction};
use crate::templates::TemplateRegistry;

const PAGE_HEAD: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>JSON Server</title>
    <style>
        body { font-family: sans-serif; line-height: 1.6; padding: 20px; max-width: 800px; margin: 0 auto; }
        img { max-width: 100%; height: auto; }
    </style>
"#;

const DESIGN_STYLES: &str = r#"    <style>
        body {
            background: linear-gradient(135deg, #f5f7fa 0%, #c3cfe2 100%);
            min-height: 100vh;
        }
        .container {
            background: rgba(255,255,255,0.8);
            padding: 40px;
            border-radius: 12px;
            margin-top: 40px;
        }
    </style>
"#;

const PAGE_FOOT: &str = "</div></body></html>";

pub struct Renderer<'a> {
    registry: &'a TemplateRegistry,
    standard: &'a HashSet<&'static str>,
    design_styles: bool,
}

impl<'a> Renderer<'a> {
    pub fn new(registry: &'a TemplateRegistry) -> Self {
        Self {
            registry,
            standard: standard_tags(),
            design_styles: false,
        }
    }

    /// Include the design-mode base styles in the head
    pub fn with_design_styles(mut self, enabled: bool) -> Self {
        self.design_styles = enabled;
        self
    }

    pub fn resolve(&self, tag: &str) -> RenderAction {
        resolve(tag, self.registry, self.standard)
    }

    /// Non-standard tag -> last value seen, in first-seen order
    pub fn side_channel(&self, doc: &OrderedDocument) -> Map<String, Value> {
        let mut channel = Map::new();
        for block in &doc.blocks {
            for (tag, value) in &block.entries {
                if self.resolve(tag) == RenderAction::InjectAsData {
                    channel.insert(tag.clone(), value.clone());
                }
            }
        }
        channel
    }

    pub fn render(&self, doc: &OrderedDocument) -> String {
        let mut out = String::with_capacity(4096);
        out.push_str(PAGE_HEAD);

        if let Some(lib) = doc.flags.css_lib() {
            out.push_str(lib.head_tags());
        }

        let channel = self.side_channel(doc);
        if !channel.is_empty() {
            out.push_str("    <script>\n        var customContent = Object.create(null);\n");
            for (tag, value) in &channel {
                out.push_str("        customContent[");
                out.push_str(&script_json(&Value::String(tag.clone())));
                out.push_str("] = ");
                out.push_str(&script_json(value));
                out.push_str(";\n");
            }
            out.push_str("    </script>\n");
        }

        if self.design_styles {
            out.push_str(DESIGN_STYLES);
        }

        out.push_str("</head><body><div class=\"container\">");

        for block in &doc.blocks {
            out.push_str("<div id=\"");
            out.push_str(&html_escape::encode_double_quoted_attribute(&block.id));
            out.push_str("\">");
            for (tag, value) in &block.entries {
                self.render_tag(tag, value, &mut out);
            }
            out.push_str("</div>");
        }

        out.push_str(PAGE_FOOT);
        out
    }

    fn render_tag(&self, tag: &str, value: &Value, out: &mut String) {
        match self.resolve(tag) {
            RenderAction::UseTemplate(name) => match self.registry.render(&name, tag, value) {
                Ok(html) => out.push_str(&html),
                Err(e) => {
                    tracing::warn!(template = %name, error = %e, "template failed, continuing");
                    out.push_str("<!-- Error rendering template ");
                    out.push_str(&html_escape::encode_text(&comment_safe(&name)));
                    out.push_str(" -->");
                }
            },
            RenderAction::UseBuiltin(tag) => render_builtin(&tag, value, out),
            RenderAction::InjectAsData => {}
        }
    }
}

/// Text that cannot end an HTML comment early
fn comment_safe(text: &str) -> String {
    let mut out = text.to_string();
    while out.contains("--") {
        out = out.replace("--", "-");
    }
    out
}

/// JSON text that is safe inside a `<script>` element
fn script_json(value: &Value) -> String {
    let json = serde_json::to_string(value).unwrap_or_else(|_| "null".to_string());
    let mut out = String::with_capacity(json.len());
    for c in json.chars() {
        match c {
            '<' => out.push_str("\\u003c"),
            '>' => out.push_str("\\u003e"),
            '&' => out.push_str("\\u0026"),
            '\u{2028}' => out.push_str("\\u2028"),
            '\u{2029}' => out.push_str("\\u2029"),
            c => out.push(c),
        }
    }
    out
}
