//! Server Configuration

use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Default template layer (`*.html`)
    pub components_dir: PathBuf,
    /// One subdirectory per design record
    pub cache_dir: PathBuf,
    /// Holds `index.json` and `index.<name>.json`
    pub documents_dir: PathBuf,
    /// Static assets and `favicon.ico`
    pub static_dir: PathBuf,
    pub port: u16,
    /// Honor `flags.designprompt`
    pub design_mode: bool,
    pub request_timeout: Duration,
}

impl ServerConfig {
    /// Lay the conventional directories out under `root`
    pub fn rooted(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            components_dir: root.join("components"),
            cache_dir: root.join("components").join("cached"),
            documents_dir: root.clone(),
            static_dir: root.join("static"),
            ..Self::default()
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            components_dir: PathBuf::from("components"),
            cache_dir: PathBuf::from("components").join("cached"),
            documents_dir: PathBuf::from("."),
            static_dir: PathBuf::from("static"),
            port: DEFAULT_PORT,
            design_mode: false,
            request_timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
        }
    }
}
