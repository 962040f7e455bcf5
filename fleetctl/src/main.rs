use clap::Parser;
use fleetctl::{telemetry, Application, Config};
use tokio_util::sync::CancellationToken;

/// Wait for shutdown signal (SIGTERM or Ctrl+C)
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c().await.expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, shutting down gracefully...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, shutting down gracefully...");
        },
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = fleetctl::config::Args::parse();
    let config = Config::load(&args)?;

    if args.validate {
        println!("Configuration is valid.");
        return Ok(());
    }

    let tracer_provider = telemetry::init_telemetry(config.enable_otel_export)?;
    tracing::debug!("{:?}", args);

    let result = if args.mcp {
        // MCP mode: the tool surface over stdio, no HTTP listener.
        let state = fleetctl::AppState::from_config(config);
        let shutdown = CancellationToken::new();
        let signal_shutdown = shutdown.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            signal_shutdown.cancel();
        });
        fleetctl::mcp::serve_stdio(state, shutdown).await
    } else {
        Application::new(config).await?.serve(shutdown_signal()).await
    };

    telemetry::shutdown_telemetry(tracer_provider);
    result
}
