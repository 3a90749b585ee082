//! Design Cache - Prompt-Keyed Template Override Layers
//!
//! Each distinct normalized prompt yields exactly one design record on disk:
//!
//! ```text
//! <root>/<id>/h1.html
//! <root>/<id>/div.html
//! <root>/<id>/style.json
//! <root>/<id>/prompt.txt   (written last; a record exists once this does)
//! ```
//!
//! Style rules run in a fixed order and each match overwrites the parameters
//! it touches, so a later keyword wins over an earlier one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use thiserror::Error;
use uuid::Uuid;

use crate::hashing::sha256_hex;

pub type DesignId = String;

pub const PROMPT_FILE: &str = "prompt.txt";
pub const STYLE_FILE: &str = "style.json";

#[derive(Debug, Error)]
pub enum DesignError {
    #[error("Design prompt is empty")]
    EmptyPrompt,

    #[error("Design cache I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> DesignError + '_ {
    move |source| DesignError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StyleParams {
    pub background: String,
    pub text: String,
    pub accent: String,
    pub font: String,
}

impl Default for StyleParams {
    fn default() -> Self {
        Self {
            background: "#ffffff".to_string(),
            text: "#333333".to_string(),
            accent: "#3498db".to_string(),
            font: "sans-serif".to_string(),
        }
    }
}

/// Keyword rule - overwrites style parameters when its keyword appears
pub trait StyleRule: Send + Sync {
    fn keyword(&self) -> &'static str;
    fn apply(&self, style: &mut StyleParams);
}

// --- Concrete Rules ---

pub struct DarkRule;

impl StyleRule for DarkRule {
    fn keyword(&self) -> &'static str { "dark" }

    fn apply(&self, style: &mut StyleParams) {
        style.background = "#2c3e50".to_string();
        style.text = "#ecf0f1".to_string();
        style.accent = "#e74c3c".to_string();
    }
}

pub struct MoodyRule;

impl StyleRule for MoodyRule {
    fn keyword(&self) -> &'static str { "moody" }

    fn apply(&self, style: &mut StyleParams) {
        style.background = "#1a1a1a".to_string();
        style.text = "#dcdcdc".to_string();
        style.accent = "#8e44ad".to_string();
    }
}

pub struct CleanRule;

impl StyleRule for CleanRule {
    fn keyword(&self) -> &'static str { "clean" }

    fn apply(&self, style: &mut StyleParams) {
        style.font = "'Helvetica Neue', Helvetica, Arial, sans-serif".to_string();
    }
}

pub struct SerifRule;

impl StyleRule for SerifRule {
    fn keyword(&self) -> &'static str { "serif" }

    fn apply(&self, style: &mut StyleParams) {
        style.font = "Georgia, serif".to_string();
    }
}

/// Runs the keyword rules in vocabulary order
pub struct StyleGenerator {
    rules: Vec<Box<dyn StyleRule>>,
}

impl StyleGenerator {
    pub fn new() -> Self {
        Self {
            rules: vec![
                Box::new(DarkRule),
                Box::new(MoodyRule),
                Box::new(CleanRule),
                Box::new(SerifRule),
            ],
        }
    }

    /// Keywords in the order they are tested
    pub fn vocabulary(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.keyword()).collect()
    }

    pub fn derive(&self, prompt: &str) -> StyleParams {
        let prompt = prompt.to_lowercase();
        let mut style = StyleParams::default();
        for rule in &self.rules {
            if prompt.contains(rule.keyword()) {
                rule.apply(&mut style);
            }
        }
        style
    }

    /// Override templates for one style, as (file name, source)
    pub fn synthesize(&self, style: &StyleParams) -> Vec<(&'static str, String)> {
        vec![
            (
                "h1.html",
                format!(
                    r#"<h1 style="color: {accent}; font-family: {font}; border-bottom: 2px solid {accent};">{{{{ value }}}}</h1>"#,
                    accent = style.accent,
                    font = style.font,
                ),
            ),
            (
                "div.html",
                format!(
                    r#"<div style="background: {bg}; color: {text}; padding: 20px; border-radius: 8px; margin: 10px 0;">{{{{ value }}}}</div>"#,
                    bg = style.background,
                    text = style.text,
                ),
            ),
        ]
    }
}

impl Default for StyleGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Contents of `style.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DesignManifest {
    pub id: DesignId,
    pub prompt: String,
    pub style: StyleParams,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesignRecord {
    pub id: DesignId,
    pub prompt: String,
    pub dir: PathBuf,
}

pub fn normalize_prompt(prompt: &str) -> &str {
    prompt.trim()
}

/// 32 lowercase hex characters, the shape of every generated identifier
pub fn is_design_id(candidate: &str) -> bool {
    candidate.len() == 32
        && candidate
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

pub struct DesignCache {
    root: PathBuf,
    generator: StyleGenerator,
    /// One exclusive section per normalized prompt being resolved
    sections: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    /// sha256(normalized prompt) -> id, filled by scans and generations
    index: RwLock<HashMap<String, DesignId>>,
}

impl DesignCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            generator: StyleGenerator::new(),
            sections: Mutex::new(HashMap::new()),
            index: RwLock::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn generator(&self) -> &StyleGenerator {
        &self.generator
    }

    /// Directory holding the override layer of `id`
    pub fn layer_dir(&self, id: &str) -> PathBuf {
        self.root.join(id)
    }

    /// Map a prompt to its design identifier, generating the design the
    /// first time a normalized prompt is seen.
    pub fn resolve(&self, prompt: &str) -> Result<DesignId, DesignError> {
        let prompt = normalize_prompt(prompt);
        if prompt.is_empty() {
            return Err(DesignError::EmptyPrompt);
        }

        if is_design_id(prompt) && self.layer_dir(prompt).join(PROMPT_FILE).is_file() {
            tracing::debug!(design = prompt, "prompt names an existing design");
            return Ok(prompt.to_string());
        }

        let section = self.section(prompt);
        let result = {
            let _guard = section.lock().unwrap_or_else(PoisonError::into_inner);
            self.resolve_exclusive(prompt)
        };
        self.release(prompt, section);
        result
    }

    /// Runs inside the prompt's exclusive section
    fn resolve_exclusive(&self, prompt: &str) -> Result<DesignId, DesignError> {
        let fingerprint = sha256_hex(prompt.as_bytes());
        if let Some(id) = self.indexed(&fingerprint) {
            if self.layer_dir(&id).join(PROMPT_FILE).is_file() {
                tracing::debug!(design = %id, "design cache hit (index)");
                return Ok(id);
            }
        }

        if let Some(record) = self.find(prompt)? {
            tracing::debug!(design = %record.id, "design cache hit (scan)");
            self.remember(fingerprint, &record.id);
            return Ok(record.id);
        }

        let id = self.generate(prompt)?;
        self.remember(fingerprint, &id);
        Ok(id)
    }

    /// All records currently on disk. Directories without a prompt file are
    /// not records.
    pub fn records(&self) -> Result<Vec<DesignRecord>, DesignError> {
        if !self.root.exists() {
            return Ok(vec![]);
        }
        let mut records = vec![];
        for entry in fs::read_dir(&self.root).map_err(io_err(&self.root))? {
            let dir = entry.map_err(io_err(&self.root))?.path();
            if !dir.is_dir() {
                continue;
            }
            let Some(id) = dir.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
                continue;
            };
            if let Ok(content) = fs::read_to_string(dir.join(PROMPT_FILE)) {
                records.push(DesignRecord {
                    id,
                    prompt: content.trim().to_string(),
                    dir,
                });
            }
        }
        records.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(records)
    }

    fn find(&self, prompt: &str) -> Result<Option<DesignRecord>, DesignError> {
        Ok(self.records()?.into_iter().find(|r| r.prompt == prompt))
    }

    fn generate(&self, prompt: &str) -> Result<DesignId, DesignError> {
        let id = Uuid::new_v4().simple().to_string();
        let dir = self.layer_dir(&id);
        fs::create_dir_all(&dir).map_err(io_err(&dir))?;

        if let Err(e) = self.write_record(&id, &dir, prompt) {
            if let Err(cleanup) = fs::remove_dir_all(&dir) {
                tracing::warn!(dir = %dir.display(), error = %cleanup, "cannot remove partial design");
            }
            return Err(e);
        }

        tracing::info!(design = %id, "generated design");
        Ok(id)
    }

    fn write_record(&self, id: &str, dir: &Path, prompt: &str) -> Result<(), DesignError> {
        let style = self.generator.derive(prompt);
        for (name, source) in self.generator.synthesize(&style) {
            let path = dir.join(name);
            fs::write(&path, source).map_err(io_err(&path))?;
        }

        let manifest = DesignManifest {
            id: id.to_string(),
            prompt: prompt.to_string(),
            style,
            created_at: Utc::now(),
        };
        let path = dir.join(STYLE_FILE);
        fs::write(&path, serde_json::to_string_pretty(&manifest)?).map_err(io_err(&path))?;

        let path = dir.join(PROMPT_FILE);
        fs::write(&path, prompt).map_err(io_err(&path))?;
        Ok(())
    }

    fn section(&self, prompt: &str) -> Arc<Mutex<()>> {
        let mut sections = self.sections.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(sections.entry(prompt.to_string()).or_default())
    }

    /// Drop the section entry once no other caller holds it
    fn release(&self, prompt: &str, section: Arc<Mutex<()>>) {
        let mut sections = self.sections.lock().unwrap_or_else(PoisonError::into_inner);
        // One reference in the map, one here
        if Arc::strong_count(&section) == 2 {
            sections.remove(prompt);
        }
    }

    fn indexed(&self, fingerprint: &str) -> Option<DesignId> {
        self.index
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(fingerprint)
            .cloned()
    }

    fn remember(&self, fingerprint: String, id: &str) {
        self.index
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(fingerprint, id.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn cache_dirs(root: &Path) -> usize {
        fs::read_dir(root).map(|d| d.count()).unwrap_or(0)
    }

    #[test]
    fn test_default_style() {
        let style = StyleGenerator::new().derive("something plain");
        assert_eq!(style, StyleParams::default());
    }

    #[test]
    fn test_later_keyword_wins() {
        let generator = StyleGenerator::new();
        let style = generator.derive("dark moody");
        assert_eq!(style.accent, "#8e44ad");
        assert_eq!(style.background, "#1a1a1a");

        // Order in the prompt does not matter, vocabulary order does
        assert_eq!(generator.derive("moody dark"), style);

        let style = generator.derive("Clean SERIF look");
        assert_eq!(style.font, "Georgia, serif");
    }

    #[test]
    fn test_keywords_touch_only_their_params() {
        let style = StyleGenerator::new().derive("dark and clean");
        assert_eq!(style.accent, "#e74c3c");
        assert_eq!(style.font, "'Helvetica Neue', Helvetica, Arial, sans-serif");
    }

    #[test]
    fn test_synthesized_templates_embed_style() {
        let generator = StyleGenerator::new();
        let files = generator.synthesize(&generator.derive("dark"));
        let names: Vec<_> = files.iter().map(|(n, _)| *n).collect();
        assert_eq!(names, vec!["h1.html", "div.html"]);
        assert!(files[0].1.contains("color: #e74c3c;"));
        assert!(files[0].1.ends_with("{{ value }}</h1>"));
        assert!(files[1].1.contains("background: #2c3e50;"));
    }

    #[test]
    fn test_resolve_persists_record() {
        let root = TempDir::new().unwrap();
        let cache = DesignCache::new(root.path());
        let id = cache.resolve("  dark moody  ").unwrap();
        assert!(is_design_id(&id));

        let dir = cache.layer_dir(&id);
        assert_eq!(fs::read_to_string(dir.join(PROMPT_FILE)).unwrap(), "dark moody");
        assert!(dir.join("h1.html").is_file());
        assert!(dir.join("div.html").is_file());

        let manifest: DesignManifest =
            serde_json::from_str(&fs::read_to_string(dir.join(STYLE_FILE)).unwrap()).unwrap();
        assert_eq!(manifest.id, id);
        assert_eq!(manifest.style.accent, "#8e44ad");
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let root = TempDir::new().unwrap();
        let cache = DesignCache::new(root.path());
        let first = cache.resolve("clean serif").unwrap();
        let second = cache.resolve("clean serif\n").unwrap();
        assert_eq!(first, second);
        assert_eq!(cache_dirs(root.path()), 1);

        // A fresh cache over the same directory finds it by scanning
        let reopened = DesignCache::new(root.path());
        assert_eq!(reopened.resolve("clean serif").unwrap(), first);
        assert_eq!(cache_dirs(root.path()), 1);
    }

    #[test]
    fn test_distinct_prompts_get_distinct_ids() {
        let root = TempDir::new().unwrap();
        let cache = DesignCache::new(root.path());
        let a = cache.resolve("dark").unwrap();
        let b = cache.resolve("moody").unwrap();
        assert_ne!(a, b);
        assert_eq!(cache.records().unwrap().len(), 2);
    }

    #[test]
    fn test_identifier_fast_path() {
        let root = TempDir::new().unwrap();
        let cache = DesignCache::new(root.path());
        let id = cache.resolve("dark").unwrap();
        assert_eq!(cache.resolve(&id).unwrap(), id);
        assert_eq!(cache_dirs(root.path()), 1);

        // Right shape but unknown: treated as an ordinary prompt
        let unknown = "0123456789abcdef0123456789abcdef";
        let other = cache.resolve(unknown).unwrap();
        assert_ne!(other, unknown);
        assert_eq!(cache_dirs(root.path()), 2);
    }

    #[test]
    fn test_directory_without_prompt_is_not_an_identifier() {
        let root = TempDir::new().unwrap();
        let stray = "0123456789abcdef0123456789abcdef";
        fs::create_dir_all(root.path().join(stray)).unwrap();
        let cache = DesignCache::new(root.path());

        let id = cache.resolve(stray).unwrap();
        assert_ne!(id, stray);
        assert!(cache.layer_dir(&id).join(PROMPT_FILE).is_file());
        assert_eq!(cache.records().unwrap().len(), 1);
    }

    #[test]
    fn test_sections_released_after_resolve() {
        let root = TempDir::new().unwrap();
        let cache = DesignCache::new(root.path());
        cache.resolve("dark").unwrap();
        cache.resolve("moody").unwrap();
        cache.resolve("dark").unwrap();
        assert!(cache.sections.lock().unwrap().is_empty());
    }

    #[test]
    fn test_empty_prompt_rejected() {
        let root = TempDir::new().unwrap();
        let cache = DesignCache::new(root.path());
        assert!(matches!(cache.resolve("   "), Err(DesignError::EmptyPrompt)));
    }

    #[test]
    fn test_unwritable_root_fails() {
        let root = TempDir::new().unwrap();
        let blocker = root.path().join("cached");
        fs::write(&blocker, "not a directory").unwrap();
        let cache = DesignCache::new(&blocker);
        assert!(matches!(cache.resolve("dark"), Err(DesignError::Io { .. })));
    }

    #[test]
    fn test_directories_without_prompt_are_ignored() {
        let root = TempDir::new().unwrap();
        fs::create_dir_all(root.path().join("stray")).unwrap();
        let cache = DesignCache::new(root.path());
        assert!(cache.records().unwrap().is_empty());
    }

    #[test]
    fn test_design_id_shape() {
        assert!(is_design_id("0123456789abcdef0123456789abcdef"));
        assert!(!is_design_id("0123456789ABCDEF0123456789ABCDEF"));
        assert!(!is_design_id("dark moody"));
    }
}
