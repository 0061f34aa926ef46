use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use locdash::core::RemoteStore;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = locdash::cli::Cli::parse();
    locdash::init_tracing(cli.log_filter.clone())?;

    let config = locdash::AppConfig::discover(cli.overrides())?;
    let remote: Arc<dyn RemoteStore> = if cli.demo {
        tracing::info!("using built-in sample data");
        Arc::new(locdash::MemoryStore::with_sample_data())
    } else {
        let store = locdash::HttpStore::from_config(&config)
            .with_context(|| format!("cannot use API at {}", config.api_url()))?;
        Arc::new(store)
    };

    let session = locdash::Session::start(remote, config);
    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    let result = locdash::commands::execute(&session, cli.command, cli.json, &mut handle).await;
    session.shutdown();
    result
}
