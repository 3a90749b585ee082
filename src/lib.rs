//! JSON Page Server Core - Ordered Documents to HTML
//!
//! # Rendering Rules
//! 1. Source order is output order, for blocks and for tags within a block
//! 2. Templates beat builtins, builtins beat client data
//! 3. Flags are server-only and never reach the page
//! 4. A render uses one registry snapshot from start to finish
//! 5. One design per distinct prompt, generated once

pub mod config;
pub mod design;
pub mod document;
pub mod hashing;
pub mod render;
pub mod resolver;
pub mod server;
pub mod service;
pub mod templates;

pub use config::ServerConfig;
pub use design::{DesignCache, DesignError, DesignId, DesignRecord, StyleGenerator, StyleParams};
pub use document::{ContentBlock, CssLib, DocumentError, Flags, OrderedDocument};
pub use hashing::sha256_hex;
pub use render::Renderer;
pub use resolver::{resolve, standard_tags, RenderAction, STANDARD_TAGS};
pub use service::{PageService, RenderedPage, ServiceError};
pub use templates::{TemplateError, TemplateRegistry, TemplateStore};

pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");
