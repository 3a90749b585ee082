//! Template System - Layered, Immutable Registries
//!
//! A registry is built once from a default directory plus an optional
//! override layer and is never mutated after it is shared. Reloading builds a
//! complete new registry and swaps the shared `Arc`, so a render that already
//! holds a snapshot keeps seeing one consistent template set.

use minijinja::{context, AutoEscape, Environment};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;

/// File suffix of template files; also the preferred lookup suffix for tags
pub const TEMPLATE_SUFFIX: &str = ".html";

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("Template not found: {0}")]
    NotFound(String),

    #[error("Template {name} failed to parse: {source}")]
    Parse {
        name: String,
        #[source]
        source: minijinja::Error,
    },

    #[error("Template {name} failed to render: {source}")]
    Render {
        name: String,
        #[source]
        source: minijinja::Error,
    },
}

/// Named, compiled templates. Immutable once shared.
pub struct TemplateRegistry {
    env: Environment<'static>,
    names: BTreeSet<String>,
}

impl TemplateRegistry {
    pub fn new() -> Self {
        let mut env = Environment::new();
        // Escape every template, not only the ones whose name ends in .html
        env.set_auto_escape_callback(|_| AutoEscape::Html);
        Self {
            env,
            names: BTreeSet::new(),
        }
    }

    /// Load `default_dir`, then lay `override_dir` on top. A name present in
    /// the override replaces the default of the same name wholesale.
    pub fn load_layers(default_dir: &Path, override_dir: Option<&Path>) -> Self {
        let mut sources = read_layer(default_dir);
        if let Some(dir) = override_dir {
            sources.extend(read_layer(dir));
        }

        let mut registry = Self::new();
        for (name, source) in sources {
            if let Err(e) = registry.register(name, source) {
                tracing::warn!(error = %e, "skipping template");
            }
        }
        registry
    }

    pub fn load_from_dir(dir: &Path) -> Self {
        Self::load_layers(dir, None)
    }

    /// Compile and add a template. On a parse failure the registry is left
    /// as it was.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        source: impl Into<String>,
    ) -> Result<(), TemplateError> {
        let name = name.into();
        self.env
            .add_template_owned(name.clone(), source.into())
            .map_err(|source| TemplateError::Parse {
                name: name.clone(),
                source,
            })?;
        self.names.insert(name);
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Execute template `name` with the tag's value bound as `value` and its
    /// name as `tag`.
    pub fn render(&self, name: &str, tag: &str, value: &Value) -> Result<String, TemplateError> {
        let template = self
            .env
            .get_template(name)
            .map_err(|_| TemplateError::NotFound(name.to_string()))?;
        template
            .render(context! { value => value, tag => tag })
            .map_err(|source| TemplateError::Render {
                name: name.to_string(),
                source,
            })
    }
}

impl Default for TemplateRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TemplateRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemplateRegistry")
            .field("names", &self.names)
            .finish()
    }
}

/// Read every `*.html` file of one layer. A missing directory is an empty
/// layer; an unreadable one is logged and also treated as empty.
fn read_layer(dir: &Path) -> BTreeMap<String, String> {
    let mut sources = BTreeMap::new();
    if !dir.exists() {
        tracing::debug!(dir = %dir.display(), "template directory missing");
        return sources;
    }
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!(dir = %dir.display(), error = %e, "cannot read template directory");
            return sources;
        }
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() || path.extension().map_or(true, |e| e != "html") {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        match fs::read_to_string(&path) {
            Ok(source) => {
                sources.insert(name.to_string(), source);
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "cannot read template");
            }
        }
    }
    sources
}

/// Process-wide publisher of registry snapshots.
///
/// Registries are built outside every lock; the locks only guard the swap of
/// an `Arc`.
pub struct TemplateStore {
    default_dir: PathBuf,
    defaults: RwLock<Arc<TemplateRegistry>>,
    layers: RwLock<HashMap<PathBuf, Arc<TemplateRegistry>>>,
}

impl TemplateStore {
    pub fn open(default_dir: impl Into<PathBuf>) -> Self {
        let default_dir = default_dir.into();
        let defaults = Arc::new(TemplateRegistry::load_from_dir(&default_dir));
        tracing::info!(
            dir = %default_dir.display(),
            templates = defaults.len(),
            "loaded default templates"
        );
        Self {
            default_dir,
            defaults: RwLock::new(defaults),
            layers: RwLock::new(HashMap::new()),
        }
    }

    pub fn default_dir(&self) -> &Path {
        &self.default_dir
    }

    /// Snapshot of the default layer
    pub fn current(&self) -> Arc<TemplateRegistry> {
        Arc::clone(&self.defaults.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Snapshot of defaults plus `layer`, building it on first use
    pub fn layered(&self, layer: &Path) -> Arc<TemplateRegistry> {
        let published = self
            .layers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(layer)
            .cloned();
        match published {
            Some(registry) => registry,
            None => self.reload(Some(layer)),
        }
    }

    /// Rebuild from disk and publish. `None` rebuilds the default layer.
    pub fn reload(&self, layer: Option<&Path>) -> Arc<TemplateRegistry> {
        let registry = Arc::new(TemplateRegistry::load_layers(&self.default_dir, layer));
        match layer {
            Some(dir) => {
                tracing::debug!(layer = %dir.display(), templates = registry.len(), "published override layer");
                self.layers
                    .write()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(dir.to_path_buf(), Arc::clone(&registry));
            }
            None => {
                tracing::debug!(templates = registry.len(), "published default layer");
                *self.defaults.write().unwrap_or_else(PoisonError::into_inner) = Arc::clone(&registry);
                // Layered snapshots embed the old defaults; rebuild them on next use
                self.layers
                    .write()
                    .unwrap_or_else(PoisonError::into_inner)
                    .clear();
            }
        }
        registry
    }
}
