//! JSON Page Server CLI
//!
//! Commands: serve (default), render, design
//! `render` writes HTML to stdout, `design` writes JSON to stdout.
//! Logs go to stderr; filter with RUST_LOG.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use jsonpage_core::{
    config::{DEFAULT_PORT, DEFAULT_TIMEOUT_MS},
    server, DesignCache, PageService, ServerConfig, ENGINE_VERSION,
};

#[derive(Parser)]
#[command(name = "jsonpage-server")]
#[command(about = "JSON Page Server - ordered JSON documents rendered to HTML")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Enable AI design mode for enhanced styling
    #[arg(long = "ai-design", global = true)]
    ai_design: bool,

    /// Default templates directory
    #[arg(long, default_value = "components", global = true)]
    components_dir: PathBuf,

    /// Design cache directory
    #[arg(long, default_value = "components/cached", global = true)]
    cache_dir: PathBuf,

    /// Directory holding index.json and index.<name>.json
    #[arg(long, default_value = ".", global = true)]
    documents_dir: PathBuf,

    /// Static assets directory
    #[arg(long, default_value = "static", global = true)]
    static_dir: PathBuf,

    /// Per-request timeout in milliseconds
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_MS, global = true)]
    timeout_ms: u64,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve pages over HTTP
    Serve {
        #[arg(short, long, default_value_t = DEFAULT_PORT)]
        port: u16,
    },

    /// Render one document file to stdout
    Render {
        /// JSON document
        file: PathBuf,
    },

    /// Resolve a design prompt and print its identifier
    Design {
        /// Free-text design prompt
        prompt: String,
    },
}

impl Cli {
    fn config(&self, port: u16) -> ServerConfig {
        ServerConfig {
            components_dir: self.components_dir.clone(),
            cache_dir: self.cache_dir.clone(),
            documents_dir: self.documents_dir.clone(),
            static_dir: self.static_dir.clone(),
            port,
            design_mode: self.ai_design,
            request_timeout: Duration::from_millis(self.timeout_ms.max(1)),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match &cli.command {
        None => run_server(cli.config(DEFAULT_PORT)).await,
        Some(Commands::Serve { port }) => run_server(cli.config(*port)).await,

        Some(Commands::Render { file }) => {
            let bytes = match std::fs::read(file) {
                Ok(b) => b,
                Err(e) => {
                    eprintln!("Could not read {}: {}", file.display(), e);
                    return ExitCode::FAILURE;
                }
            };
            let service = PageService::new(cli.config(DEFAULT_PORT));
            match service.render_bytes(&bytes) {
                Ok(page) => {
                    println!("{}", page.html);
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    eprintln!("{}", e);
                    ExitCode::from(2)
                }
            }
        }

        Some(Commands::Design { prompt }) => {
            let cache = DesignCache::new(&cli.cache_dir);
            match cache.resolve(prompt) {
                Ok(id) => {
                    let output = serde_json::json!({
                        "success": true,
                        "id": id,
                        "dir": cache.layer_dir(&id).display().to_string(),
                    });
                    match serde_json::to_string_pretty(&output) {
                        Ok(text) => {
                            println!("{}", text);
                            ExitCode::SUCCESS
                        }
                        Err(e) => {
                            eprintln!("{}", e);
                            ExitCode::FAILURE
                        }
                    }
                }
                Err(e) => {
                    let output = serde_json::json!({
                        "success": false,
                        "error": e.to_string(),
                    });
                    println!("{}", output);
                    ExitCode::from(2)
                }
            }
        }
    }
}

async fn run_server(config: ServerConfig) -> ExitCode {
    tracing::info!(version = ENGINE_VERSION, "jsonpage-server");
    if config.design_mode {
        tracing::info!("AI design mode enabled");
    }
    let service = Arc::new(PageService::new(config));
    match server::serve(service).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "server stopped");
            ExitCode::FAILURE
        }
    }
}
