//! Page Service - Single Entry Point Per Request
//!
//! document bytes -> decode -> flags -> (design mode) resolve design and pick
//! its layered registry -> render with that one snapshot.

use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

use crate::config::ServerConfig;
use crate::design::{DesignCache, DesignId};
use crate::document::{DocumentError, Flags, OrderedDocument};
use crate::hashing::page_etag;
use crate::render::Renderer;
use crate::templates::{TemplateRegistry, TemplateStore};

pub const DEFAULT_DOCUMENT: &str = "index.json";

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Invalid page name: {0}")]
    InvalidName(String),

    #[error("Could not read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Document(#[from] DocumentError),
}

impl ServiceError {
    /// Message safe to show a client; no paths or parser details
    pub fn public_message(&self) -> &'static str {
        match self {
            _ if self.is_not_found() => "not found",
            Self::Document(_) => "could not parse document",
            _ => "could not read document",
        }
    }

    pub fn is_not_found(&self) -> bool {
        match self {
            Self::InvalidName(_) => true,
            Self::Read { source, .. } => source.kind() == io::ErrorKind::NotFound,
            Self::Document(_) => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub html: String,
    pub etag: String,
    pub design: Option<DesignId>,
}

pub struct PageService {
    config: ServerConfig,
    templates: TemplateStore,
    designs: DesignCache,
}

impl PageService {
    pub fn new(config: ServerConfig) -> Self {
        let templates = TemplateStore::open(&config.components_dir);
        let designs = DesignCache::new(&config.cache_dir);
        Self {
            config,
            templates,
            designs,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn templates(&self) -> &TemplateStore {
        &self.templates
    }

    pub fn designs(&self) -> &DesignCache {
        &self.designs
    }

    /// `None` is the default document, `Some(name)` is `index.<name>.json`
    pub fn document_path(&self, name: Option<&str>) -> Result<PathBuf, ServiceError> {
        let file = match name {
            None => DEFAULT_DOCUMENT.to_string(),
            Some(name) if is_page_name(name) => format!("index.{name}.json"),
            Some(name) => return Err(ServiceError::InvalidName(name.to_string())),
        };
        Ok(self.config.documents_dir.join(file))
    }

    pub fn render_named(&self, name: Option<&str>) -> Result<RenderedPage, ServiceError> {
        let path = self.document_path(name)?;
        let bytes = fs::read(&path).map_err(|source| ServiceError::Read { path, source })?;
        self.render_bytes(&bytes)
    }

    pub fn render_bytes(&self, bytes: &[u8]) -> Result<RenderedPage, ServiceError> {
        let doc = OrderedDocument::from_slice(bytes)?;
        let (registry, design) = self.registry_for(&doc.flags);
        let html = Renderer::new(&registry)
            .with_design_styles(self.config.design_mode)
            .render(&doc);
        let etag = page_etag(html.as_bytes());
        Ok(RenderedPage { html, etag, design })
    }

    /// The registry snapshot this request renders with. Design failures fall
    /// back to the default layer.
    pub fn registry_for(&self, flags: &Flags) -> (Arc<TemplateRegistry>, Option<DesignId>) {
        if !self.config.design_mode {
            return (self.templates.current(), None);
        }
        let Some(prompt) = flags.design_prompt() else {
            return (self.templates.current(), None);
        };
        match self.designs.resolve(&prompt) {
            Ok(id) => {
                let registry = self.templates.layered(&self.designs.layer_dir(&id));
                (registry, Some(id))
            }
            Err(e) => {
                tracing::warn!(error = %e, "design resolution failed, using default templates");
                (self.templates.current(), None)
            }
        }
    }
}

fn is_page_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}
