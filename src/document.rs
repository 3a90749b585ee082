//! Ordered Document - JSON Input With Source Order Preserved
//!
//! Top-level entries keep their textual order, and so do the tags inside each
//! content block. Decoding walks serde's map access stream directly, so order
//! never has to be recovered from the raw text.
//!
//! Duplicate top-level keys: the last value wins, but the entry keeps the
//! position of its first occurrence. Duplicate tags inside a block are kept
//! as separate pairs.

use serde::de::{self, Deserialize, Deserializer, IgnoredAny, MapAccess, SeqAccess, Visitor};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Reserved top-level key holding server-only configuration
pub const FLAGS_KEY: &str = "flags";

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("Malformed document: {0}")]
    Malformed(serde_json::Error),

    #[error("Document root must be a JSON object")]
    NotAnObject,
}

/// One object-valued top-level entry, rendered as a group
#[derive(Debug, Clone, PartialEq)]
pub struct ContentBlock {
    pub id: String,
    pub entries: Vec<(String, Value)>,
}

/// Server-only settings taken from the `flags` entry
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Flags(Map<String, Value>);

/// CSS frameworks that `flags.csslib` may select
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CssLib {
    Bootstrap,
    Tailwind,
    Bulma,
    Materialize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderedDocument {
    pub flags: Flags,
    pub blocks: Vec<ContentBlock>,
}

impl OrderedDocument {
    /// Decode raw document bytes. Empty input is an empty document.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, DocumentError> {
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        serde_json::from_slice(bytes).map_err(|e| {
            if e.is_data() {
                DocumentError::NotAnObject
            } else {
                DocumentError::Malformed(e)
            }
        })
    }

    pub fn block(&self, id: &str) -> Option<&ContentBlock> {
        self.blocks.iter().find(|b| b.id == id)
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

impl Flags {
    pub fn new(map: Map<String, Value>) -> Self {
        Self(map)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn css_lib(&self) -> Option<CssLib> {
        self.0.get("csslib").and_then(Value::as_str).and_then(CssLib::from_name)
    }

    /// The design prompt as display text; null counts as absent
    pub fn design_prompt(&self) -> Option<String> {
        match self.0.get("designprompt")? {
            Value::Null => None,
            other => Some(display_text(other)),
        }
    }
}

impl CssLib {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "bootstrap" => Some(Self::Bootstrap),
            "tailwind" => Some(Self::Tailwind),
            "bulma" => Some(Self::Bulma),
            "materialize" => Some(Self::Materialize),
            _ => None,
        }
    }

    /// Fixed CDN markup placed in the page head
    pub fn head_tags(&self) -> &'static str {
        match self {
            Self::Bootstrap => concat!(
                r#"    <link href="https://cdn.jsdelivr.net/npm/bootstrap@5.3.3/dist/css/bootstrap.min.css" rel="stylesheet">"#,
                "\n",
                r#"    <script src="https://cdn.jsdelivr.net/npm/bootstrap@5.3.3/dist/js/bootstrap.bundle.min.js"></script>"#,
                "\n",
            ),
            Self::Tailwind => concat!(
                r#"    <script src="https://cdn.tailwindcss.com"></script>"#,
                "\n",
            ),
            Self::Bulma => concat!(
                r#"    <link rel="stylesheet" href="https://cdn.jsdelivr.net/npm/bulma@1.0.2/css/bulma.min.css">"#,
                "\n",
            ),
            Self::Materialize => concat!(
                r#"    <link rel="stylesheet" href="https://cdnjs.cloudflare.com/ajax/libs/materialize/1.0.0/css/materialize.min.css">"#,
                "\n",
                r#"    <script src="https://cdnjs.cloudflare.com/ajax/libs/materialize/1.0.0/js/materialize.min.js"></script>"#,
                "\n",
            ),
        }
    }
}

/// Text form of a JSON value: strings verbatim, null empty, everything else
/// as compact JSON.
pub fn display_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

// --- Decoding ---

enum TopLevel {
    Block(Vec<(String, Value)>),
    Dropped,
}

enum Slot {
    Flags(Value),
    Entry(TopLevel),
}

impl<'de> Deserialize<'de> for OrderedDocument {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(DocumentVisitor)
    }
}

struct DocumentVisitor;

impl<'de> Visitor<'de> for DocumentVisitor {
    type Value = OrderedDocument;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a JSON object")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        let mut order: Vec<(String, Slot)> = Vec::new();
        let mut positions: HashMap<String, usize> = HashMap::new();

        while let Some(key) = map.next_key::<String>()? {
            let slot = if key == FLAGS_KEY {
                Slot::Flags(map.next_value::<Value>()?)
            } else {
                Slot::Entry(map.next_value::<TopLevel>()?)
            };
            match positions.get(&key) {
                Some(&idx) => order[idx].1 = slot,
                None => {
                    positions.insert(key.clone(), order.len());
                    order.push((key, slot));
                }
            }
        }

        let mut doc = OrderedDocument::default();
        for (key, slot) in order {
            match slot {
                Slot::Flags(Value::Object(flags)) => doc.flags = Flags(flags),
                Slot::Flags(_) => {
                    tracing::debug!("ignoring non-object flags entry");
                }
                Slot::Entry(TopLevel::Block(entries)) => {
                    doc.blocks.push(ContentBlock { id: key, entries });
                }
                Slot::Entry(TopLevel::Dropped) => {
                    tracing::debug!(key = %key, "dropping non-object top-level entry");
                }
            }
        }
        Ok(doc)
    }
}

impl<'de> Deserialize<'de> for TopLevel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(TopLevelVisitor)
    }
}

struct TopLevelVisitor;

impl<'de> Visitor<'de> for TopLevelVisitor {
    type Value = TopLevel;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("any JSON value")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        let mut entries = Vec::new();
        while let Some((tag, value)) = map.next_entry::<String, Value>()? {
            entries.push((tag, value));
        }
        Ok(TopLevel::Block(entries))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        while seq.next_element::<IgnoredAny>()?.is_some() {}
        Ok(TopLevel::Dropped)
    }

    fn visit_bool<E: de::Error>(self, _: bool) -> Result<Self::Value, E> {
        Ok(TopLevel::Dropped)
    }

    fn visit_i64<E: de::Error>(self, _: i64) -> Result<Self::Value, E> {
        Ok(TopLevel::Dropped)
    }

    fn visit_u64<E: de::Error>(self, _: u64) -> Result<Self::Value, E> {
        Ok(TopLevel::Dropped)
    }

    fn visit_f64<E: de::Error>(self, _: f64) -> Result<Self::Value, E> {
        Ok(TopLevel::Dropped)
    }

    fn visit_str<E: de::Error>(self, _: &str) -> Result<Self::Value, E> {
        Ok(TopLevel::Dropped)
    }

    fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(TopLevel::Dropped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decode(src: &str) -> OrderedDocument {
        OrderedDocument::from_slice(src.as_bytes()).unwrap()
    }

    fn ids(doc: &OrderedDocument) -> Vec<&str> {
        doc.blocks.iter().map(|b| b.id.as_str()).collect()
    }

    #[test]
    fn test_block_order_follows_source() {
        let doc = decode(r#"{"zeta": {"p": "1"}, "alpha": {"p": "2"}, "mid": {"p": "3"}}"#);
        assert_eq!(ids(&doc), vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_tag_order_follows_source() {
        let doc = decode(r#"{"main": {"p": "a", "h1": "b", "card": "c", "div": "d"}}"#);
        let tags: Vec<_> = doc.blocks[0].entries.iter().map(|(t, _)| t.as_str()).collect();
        assert_eq!(tags, vec!["p", "h1", "card", "div"]);
    }

    #[test]
    fn test_duplicate_tags_in_block_are_kept() {
        let doc = decode(r#"{"main": {"p": "first", "h1": "x", "p": "second"}}"#);
        let entries = &doc.blocks[0].entries;
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0], ("p".to_string(), json!("first")));
        assert_eq!(entries[2], ("p".to_string(), json!("second")));
    }

    #[test]
    fn test_duplicate_top_level_key_last_value_first_position() {
        let doc = decode(r#"{"a": {"p": "old"}, "b": {"p": "b"}, "a": {"p": "new"}}"#);
        assert_eq!(ids(&doc), vec!["a", "b"]);
        assert_eq!(doc.blocks[0].entries[0].1, json!("new"));
    }

    #[test]
    fn test_duplicate_key_replaced_by_scalar_is_dropped() {
        let doc = decode(r#"{"a": {"p": "x"}, "b": {"p": "y"}, "a": 3}"#);
        assert_eq!(ids(&doc), vec!["b"]);
    }

    #[test]
    fn test_non_object_entries_dropped() {
        let doc = decode(r#"{"note": "hi", "n": 4, "list": [1, {"x": 2}], "nil": null, "t": true, "main": {"p": "kept"}}"#);
        assert_eq!(ids(&doc), vec!["main"]);
    }

    #[test]
    fn test_empty_input_is_empty_document() {
        assert!(OrderedDocument::from_slice(b"").unwrap().is_empty());
        assert!(OrderedDocument::from_slice(b"  \n\t").unwrap().is_empty());
        assert!(decode("{}").is_empty());
    }

    #[test]
    fn test_malformed_input_fails() {
        let err = OrderedDocument::from_slice(br#"{"main": {"p": "x"}"#).unwrap_err();
        assert!(matches!(err, DocumentError::Malformed(_)));
        let err = OrderedDocument::from_slice(b"{]").unwrap_err();
        assert!(matches!(err, DocumentError::Malformed(_)));
    }

    #[test]
    fn test_non_object_root_fails() {
        let err = OrderedDocument::from_slice(b"[1, 2]").unwrap_err();
        assert!(matches!(err, DocumentError::NotAnObject));
    }

    #[test]
    fn test_flags_extracted_not_a_block() {
        let doc = decode(r#"{"flags": {"csslib": "Bulma", "designprompt": "  dark  ", "x": 1}, "main": {"p": "a"}}"#);
        assert_eq!(ids(&doc), vec!["main"]);
        assert_eq!(doc.flags.css_lib(), Some(CssLib::Bulma));
        assert_eq!(doc.flags.design_prompt().as_deref(), Some("  dark  "));
        assert_eq!(doc.flags.get("x"), Some(&json!(1)));
    }

    #[test]
    fn test_nested_values_keep_key_order() {
        let doc = decode(r#"{"main": {"widget": {"z": 1, "a": 2}}}"#);
        let (_, value) = &doc.blocks[0].entries[0];
        assert_eq!(value.to_string(), r#"{"z":1,"a":2}"#);
    }

    #[test]
    fn test_css_lib_names() {
        assert_eq!(CssLib::from_name("TAILWIND"), Some(CssLib::Tailwind));
        assert_eq!(CssLib::from_name("materialize"), Some(CssLib::Materialize));
        assert_eq!(CssLib::from_name("foundation"), None);
    }

    #[test]
    fn test_display_text() {
        assert_eq!(display_text(&json!("a<b")), "a<b");
        assert_eq!(display_text(&json!(null)), "");
        assert_eq!(display_text(&json!(3.5)), "3.5");
        assert_eq!(display_text(&json!(true)), "true");
        assert_eq!(display_text(&json!([1, "x"])), r#"[1,"x"]"#);
    }
}
