use std::time::Duration;

use tokio::net::TcpListener;

use polyglot::config::Config;
use polyglot::server::listener;
use polyglot::startup::{build_app, init_logging, resolve_config_path};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env
    let _ = dotenvy::dotenv();

    // Load config (priority: env vars > POLYGLOT_CONFIG / ./polyglot.toml > defaults)
    let config = Config::load(resolve_config_path().as_deref())?;

    init_logging(&config);

    // Loads payloads; refuses to start without any
    let app = build_app(config.clone())?;

    let addr = format!("{}:{}", config.server.host, config.server.port);
    tracing::info!(addr = %addr, "listening");
    let listener = TcpListener::bind(&addr).await?;

    let shutdown_signal = async {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for SIGINT");
                std::future::pending::<()>().await;
            }
        };
        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut sig) => {
                    sig.recv().await;
                }
                Err(e) => {
                    tracing::error!(error = %e, "failed to install SIGTERM handler");
                    std::future::pending::<()>().await;
                }
            }
        };
        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();
        tokio::select! {
            _ = ctrl_c => tracing::info!("received SIGINT"),
            _ = terminate => tracing::info!("received SIGTERM"),
        }
    };

    listener::serve(
        listener,
        app,
        config.server.connection_limits(),
        Duration::from_secs(config.server.shutdown_timeout_secs),
        shutdown_signal,
    )
    .await?;

    tracing::info!("polyglot shutdown complete");
    Ok(())
}
