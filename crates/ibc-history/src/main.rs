mod cli;
mod server;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use eyre::WrapErr;

use ibc_history_core::persist::{JsonFileKvStore, KvStore, MemoryKvStore};
use ibc_history_core::registry::StaticChainRegistry;
use ibc_history_core::submit::CometTxSubmitter;
use ibc_history_core::tracer::{HttpTracerFactory, TracerConfig};
use ibc_history_core::IbcHistoryService;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let args = cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_file(true)
        .with_line_number(true)
        .with_level(true)
        .init();

    // Random API token for this server session.
    let api_token = {
        use rand::Rng;
        let bytes: [u8; 16] = rand::thread_rng().r#gen();
        hex::encode(bytes)
    };

    let registry = Arc::new(
        StaticChainRegistry::from_json_file(&args.chains)
            .wrap_err_with(|| format!("load chain registry from {}", args.chains.display()))?,
    );
    tracing::info!(chains = registry.list_chains().len(), "chain registry loaded");

    let store: Arc<dyn KvStore> = match &args.data_dir {
        Some(dir) => {
            let store = JsonFileKvStore::open(dir).context("open history data directory")?;
            tracing::info!(path = %dir.display(), "using persisted history");
            Arc::new(store)
        }
        None => {
            tracing::warn!("no --data-dir given; history is lost on exit");
            Arc::new(MemoryKvStore::new())
        }
    };

    let tracers = Arc::new(
        HttpTracerFactory::new(TracerConfig {
            poll_interval: Duration::from_millis(args.poll_interval_ms.max(1)),
            requests_per_second: args.requests_per_second,
            ..TracerConfig::default()
        })
        .context("build chain RPC client")?,
    );
    let submitter = Arc::new(CometTxSubmitter::new(registry.clone(), tracers.clone()));

    let service = IbcHistoryService::new(registry.clone(), submitter, tracers, store);
    service.init().await.context("restore history")?;

    if args.resweep_secs > 0 {
        spawn_resweep(service.clone(), Duration::from_secs(args.resweep_secs));
    }

    let state = server::AppState {
        service: service.clone(),
        registry,
        api_token: api_token.clone(),
    };

    let bind_addr = format!("{}:{}", args.bind, args.port);
    let origin = format!("http://{}:{}", args.bind, args.port);
    let router = server::build_router(state, &origin);

    if args.bind == "0.0.0.0" {
        tracing::warn!("server is bound to 0.0.0.0 and reachable from the network");
    }

    println!();
    println!("  ibc-history is running:");
    println!("    API:       http://{bind_addr}/api/v1");
    println!("    Token:     {api_token}");
    println!();

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .context("bind TCP listener")?;

    tracing::info!("listening on {bind_addr}");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("run HTTP server")?;

    service.flush().await;
    tracing::info!("history flushed; bye");
    Ok(())
}

/// Periodically hand stalled transfers back to the tracker.
fn spawn_resweep(service: Arc<IbcHistoryService>, period: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        // The first tick fires immediately and init already tracked everything.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let count = service.retrack_all().await;
            tracing::debug!(count, "resweep");
        }
    });
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
