pub mod cli;
pub mod commands;

use anyhow::Result;
use tracing_subscriber::filter::{Directive, EnvFilter};

pub use locdash_client as client;
pub use locdash_core as core;

pub use locdash_client::HttpStore;
pub use locdash_core::{AppConfig, MemoryStore, Session};

/// Installs the global subscriber. `RUST_LOG` directives are layered over `filter`
/// (default `warn`); logs go to stderr so command output stays clean.
pub fn init_tracing(filter: Option<String>) -> Result<()> {
    let filter = filter.unwrap_or_else(|| "warn".to_string());
    let directive: Directive = filter.parse()?;
    let env_filter = EnvFilter::builder()
        .with_default_directive(directive)
        .from_env_lossy();

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .try_init();
    Ok(())
}
