//! Tag Resolution - Template, Builtin, or Client Data
//!
//! Strict precedence, no ties:
//! 1. a template named `<tag>.html`, then one named exactly `<tag>`
//! 2. a standard HTML element rendered by the builtin rules
//! 3. injection into the client-side `customContent` object

use serde_json::Value;
use std::collections::HashSet;
use std::sync::OnceLock;

use crate::document::display_text;
use crate::templates::{TemplateRegistry, TEMPLATE_SUFFIX};

/// Canonical HTML element names eligible for builtin rendering
pub const STANDARD_TAGS: &[&str] = &[
    "h1", "h2", "h3", "h4", "h5", "h6",
    "p", "div", "span", "ul", "ol", "li",
    "img", "a", "button", "input", "form",
    "table", "tr", "td", "th", "thead", "tbody",
    "section", "article", "header", "footer", "nav",
    "main", "aside", "figure", "figcaption",
];

/// How one (tag, value) pair is rendered
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderAction {
    UseTemplate(String),
    UseBuiltin(String),
    InjectAsData,
}

/// The fixed set of standard tags
pub fn standard_tags() -> &'static HashSet<&'static str> {
    static TAGS: OnceLock<HashSet<&'static str>> = OnceLock::new();
    TAGS.get_or_init(|| STANDARD_TAGS.iter().copied().collect())
}

pub fn resolve(
    tag: &str,
    registry: &TemplateRegistry,
    standard: &HashSet<&'static str>,
) -> RenderAction {
    let suffixed = format!("{tag}{TEMPLATE_SUFFIX}");
    if registry.contains(&suffixed) {
        return RenderAction::UseTemplate(suffixed);
    }
    if registry.contains(tag) {
        return RenderAction::UseTemplate(tag.to_string());
    }
    if standard.contains(tag) {
        return RenderAction::UseBuiltin(tag.to_string());
    }
    RenderAction::InjectAsData
}

/// Render a standard tag. All inserted text is HTML-escaped.
pub fn render_builtin(tag: &str, value: &Value, out: &mut String) {
    match tag {
        "img" => {
            out.push_str("<img src=\"");
            out.push_str(&html_escape::encode_double_quoted_attribute(&display_text(value)));
            out.push_str("\" alt=\"Image\">");
        }
        "ul" | "ol" => {
            out.push('<');
            out.push_str(tag);
            out.push('>');
            match value {
                Value::Array(items) => {
                    for item in items {
                        push_list_item(item, out);
                    }
                }
                scalar => push_list_item(scalar, out),
            }
            out.push_str("</");
            out.push_str(tag);
            out.push('>');
        }
        _ => {
            out.push('<');
            out.push_str(tag);
            out.push('>');
            out.push_str(&html_escape::encode_text(&display_text(value)));
            out.push_str("</");
            out.push_str(tag);
            out.push('>');
        }
    }
}

fn push_list_item(item: &Value, out: &mut String) {
    out.push_str("<li>");
    out.push_str(&html_escape::encode_text(&display_text(item)));
    out.push_str("</li>");
}
