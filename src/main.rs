// src/main.rs
use anyhow::Context;
use clap::Parser;
use ct_warden::api::{self, AppState};
use ct_warden::certstream::CertStream;
use ct_warden::cli::Cli;
use ct_warden::notifier::NotifierSet;
use ct_warden::seed;
use ct_warden::stats::Counter;
use ct_warden::storage::{MatchStore, Storage};
use ct_warden::worker::MatchWorker;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();
    cli.validate()?;

    // Load config file and apply CLI overrides
    let config = cli.load_config()?;

    // Initialize logging
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_level(&config.logging.level)));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .init();

    tracing::info!("Starting ct-warden...");

    // Storage is required; without it there is nothing to match against
    let storage = Storage::open(&config.storage)
        .await
        .with_context(|| format!("Failed to open {:?} storage", config.storage.backend))?;
    tracing::info!("Storage ready ({:?} backend)", storage.backend());

    if let Some(path) = &cli.seed {
        seed::seed_from_file(&*storage, path).await?;
    }

    let domains = storage.domains().await?;
    tracing::info!("Watch-list has {} domains", domains.len());

    let notifiers = NotifierSet::from_config(&config.notifiers, &config.storage.remote).await?;
    if !notifiers.is_empty() {
        tracing::info!("{} notifiers enabled", notifiers.len());
    }

    let counter = Counter::new();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Stream source and match worker
    let stream = CertStream::new(
        config.stream.clone(),
        tracing::info_span!("certstream", url = %config.stream.url),
    )
    .open(shutdown_rx.clone());

    let worker = MatchWorker::new(
        storage.clone(),
        counter.clone(),
        notifiers.clone(),
        &config.worker,
        tracing::info_span!("worker"),
    )
    .spawn(stream.entries, stream.errors, shutdown_rx.clone());

    // HTTP API
    let listener = TcpListener::bind(&config.api.bind)
        .await
        .with_context(|| format!("Failed to bind API on {}", config.api.bind))?;
    let state = AppState {
        storage: storage.clone(),
        counter: counter.clone(),
    };
    let server = tokio::spawn(api::serve(
        listener,
        state,
        shutdown_rx,
        tracing::info_span!("api"),
    ));

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;
    tracing::info!("Shutting down...");
    shutdown_tx.send(true).ok();

    if let Err(e) = stream.task.await {
        tracing::warn!("Certstream task ended abnormally: {}", e);
    }
    if let Err(e) = worker.await {
        tracing::warn!("Worker task ended abnormally: {}", e);
    }
    match server.await {
        Ok(Err(e)) => tracing::warn!("API server error: {}", e),
        Err(e) => tracing::warn!("API task ended abnormally: {}", e),
        Ok(Ok(())) => {}
    }

    // Make everything durable before exit
    notifiers.flush().await?;
    storage.flush().await?;

    let snapshot = counter.snapshot();
    tracing::info!(
        "Final statistics: {} consumed, {} matched, uptime {}",
        snapshot.get(ct_warden::stats::CONSUMED),
        snapshot.get(ct_warden::stats::MATCHED),
        Counter::format_uptime(snapshot.uptime_secs)
    );

    Ok(())
}
