//! depot server entry point.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use depot::auth::AuthToken;
use depot::config::{Cli, Config};
use depot_cas::CasStorage;
use depot_hash::HashBuilder;
use depot_upstream::WebDav;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = Config::resolve(cli)?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("building tokio runtime")?
        .block_on(run(config))
}

async fn run(config: Config) -> anyhow::Result<()> {
    let cancel = CancellationToken::new();

    let upstream = WebDav::new(config.webdav).context("creating WebDAV upstream")?;

    let storage = CasStorage::new(
        &config.cache_dir,
        config.cache_max_bytes,
        HashBuilder::new(config.hash_secret),
        config.base_url.clone(),
        Arc::new(upstream),
        cancel.clone(),
    )
    .context("opening blob cache")?;

    let app = depot::app(storage, AuthToken::new(config.token));

    let listener = tokio::net::TcpListener::bind(config.listen)
        .await
        .with_context(|| format!("binding {}", config.listen))?;

    info!(
        listen = %config.listen,
        base_url = %config.base_url,
        cache_dir = %config.cache_dir.display(),
        "listening for connections"
    );

    let shutdown = {
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_err() {
                return;
            }
            info!("shutting down");
            cancel.cancel();
        }
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("running server")?;

    // Stop the trim scheduler and any in-flight transfers.
    cancel.cancel();

    Ok(())
}
