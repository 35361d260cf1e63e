use std::process::ExitCode;

use clap::Parser;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use yeego::{
    api, events, AppState, Config, Dispatcher, LightController, Registry, Scanner, SsdpDiscoverer,
    TcpConnector,
};

#[tokio::main]
async fn main() -> ExitCode {
    let config = Config::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.log_filter()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Config) -> anyhow::Result<()> {
    tracing::info!(
        port = config.port,
        search_secs = config.search_secs,
        rescan_secs = config.rescan_secs,
        filter = %config.filter,
        "starting yeego"
    );

    let registry = Registry::new();
    let (events_tx, events_rx) = events::channel(config.event_capacity);
    let mut dispatcher = Dispatcher::spawn(events_rx);

    let discoverer = SsdpDiscoverer::new();
    let mut scanner = Scanner::new(
        discoverer.clone(),
        TcpConnector::new(config.connect_timeout()),
        registry.clone(),
        events_tx,
        config.search_duration(),
        config.filter.clone(),
    );

    // Without an initial list of lights there is nothing to serve
    scanner
        .initial_scan()
        .await
        .map_err(|e| anyhow::anyhow!("error searching lights, cannot continue: {e}"))?;

    let advertisements = if config.no_monitor {
        None
    } else {
        match discoverer.advertisements().await {
            Ok(rx) => Some(rx),
            Err(e) => {
                tracing::warn!("Error starting SSDP monitor: {}", e);
                None
            }
        }
    };
    scanner.start(config.rescan_interval(), advertisements);

    let controller = LightController::new(registry, config.command_timeout());
    let app = api::router(AppState::new(controller));

    let listener = TcpListener::bind(("0.0.0.0", config.port))
        .await
        .map_err(|e| anyhow::anyhow!("failed to bind port {}: {e}", config.port))?;

    api::serve(listener, app, shutdown_signal()).await?;

    tracing::info!("shutting down");
    scanner.stop().await;
    dispatcher.stop().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for ctrl-c: {e}");
        std::future::pending::<()>().await;
    }
}
