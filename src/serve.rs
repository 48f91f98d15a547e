//! Purpose: Run the record relay HTTP server.
//! Exports: `ServeConfig`, `serve`, `validate_config`, `config_json`, `init_tracing`.
//! Role: Process bootstrap around `rowrelay::relay::router` (bind, tracing, shutdown).
//! Invariants: Configuration is validated before anything binds or logs.
//! Invariants: The upstream token never appears in logs or preflight output.
//! Notes: Shutdown drains in-flight requests for at most ten seconds.

use std::future::IntoFuture;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use tracing_subscriber::EnvFilter;

use rowrelay::api::{Error, ErrorKind, UpstreamClient, UpstreamConfig};
use rowrelay::relay::{RelayOptions, router};

#[derive(Clone, Debug)]
pub struct ServeConfig {
    pub bind: SocketAddr,
    pub upstream: UpstreamConfig,
    pub static_dir: Option<PathBuf>,
    pub cors_origins: Vec<String>,
}

pub async fn serve(config: ServeConfig) -> Result<(), Error> {
    validate_config(&config)?;

    init_tracing("info");

    let store = UpstreamClient::new(config.upstream.clone())?;
    let options = RelayOptions {
        static_dir: config.static_dir.clone(),
        cors_origins: config.cors_origins.clone(),
    };
    let app = router(Arc::new(store), &options)?;

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to bind server")
                .with_hint("Pick another --port or stop the process using it.")
                .with_source(err)
        })?;
    tracing::info!(
        bind = %config.bind,
        table = %config.upstream.table,
        "relay listening"
    );

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = shutdown_rx.await;
        })
        .into_future();
    tokio::pin!(server);

    tokio::select! {
        result = &mut server => {
            result.map_err(|err| {
                Error::new(ErrorKind::Io)
                    .with_message("server failed")
                    .with_source(err)
            })?;
        }
        _ = shutdown_signal() => {
            tracing::info!("shutting down");
            let _ = shutdown_tx.send(());
            match tokio::time::timeout(Duration::from_secs(10), &mut server).await {
                Ok(result) => result.map_err(|err| {
                    Error::new(ErrorKind::Io)
                        .with_message("server failed")
                        .with_source(err)
                })?,
                Err(_) => {
                    return Err(Error::new(ErrorKind::Io).with_message("server shutdown timed out"));
                }
            }
        }
    };
    Ok(())
}

pub fn validate_config(config: &ServeConfig) -> Result<(), Error> {
    if config.upstream.token.trim().is_empty() {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("missing upstream token")
            .with_hint("Set AIRTABLE_TOKEN or pass --token."));
    }

    if config.upstream.base_id.trim().is_empty() {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("missing upstream base id")
            .with_hint("Set AIRTABLE_BASE_ID or pass --base-id."));
    }

    if config.upstream.table.trim().is_empty() {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("--table must not be empty")
            .with_hint("Use the table name as shown upstream, for example Clientes."));
    }

    if config.upstream.timeout.is_zero() {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("--upstream-timeout-ms must be greater than zero")
            .with_hint("Use a positive value like 15000."));
    }

    let scheme_ok = config.upstream.api_url.starts_with("http://")
        || config.upstream.api_url.starts_with("https://");
    if !scheme_ok {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("--api-url must use http or https")
            .with_hint("The default is https://api.airtable.com/v0."));
    }

    if let Some(dir) = &config.static_dir {
        if !dir.is_dir() {
            return Err(Error::new(ErrorKind::Usage)
                .with_message(format!("static dir not found: {}", dir.display()))
                .with_hint("Point --static-dir at an existing directory."));
        }
    }

    Ok(())
}

/// Effective configuration for `serve --check`, without the credential.
pub fn config_json(config: &ServeConfig) -> Value {
    json!({
        "bind": config.bind.to_string(),
        "api_url": config.upstream.api_url,
        "base_id": config.upstream.base_id,
        "table": config.upstream.table,
        "upstream_timeout_ms": config.upstream.timeout.as_millis() as u64,
        "static_dir": config.static_dir.as_ref().map(|dir| dir.display().to_string()),
        "cors_origins": if config.cors_origins.is_empty() {
            json!("*")
        } else {
            json!(config.cors_origins)
        },
    })
}

pub fn init_tracing(default_filter: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        let mut signal = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("install SIGTERM handler");
        signal.recv().await;
    };
    #[cfg(unix)]
    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    #[cfg(not(unix))]
    ctrl_c.await;
}
