//! Mutating Admission Webhook
//!
//! HTTP(S) shell around [`crate::protect`]: decodes AdmissionReview envelopes,
//! runs path protection and writes the JSON patch back. The API server is
//! expected to route CREATE and UPDATE requests for workloads here, ideally
//! narrowed with an `objectSelector` on the enabling label.

pub mod admission;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    routing::{get, post},
    Router,
};
use axum_server::tls_rustls::RustlsConfig;
use tracing::{error, info};

use crate::config::ProtectionConfig;
use crate::Error;

/// How long in-flight reviews get to finish on shutdown
const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(10);

/// Shared state for webhook handlers
#[derive(Clone)]
pub struct WebhookState {
    /// Keys and namespaces used to decide eligibility
    pub config: ProtectionConfig,
}

impl WebhookState {
    /// Create a new webhook state with the given protection config
    pub fn new(config: ProtectionConfig) -> Self {
        Self { config }
    }
}

/// Create the webhook router
///
/// - POST /mutate - Path protection for any object kind
/// - GET /healthz - Liveness probe
pub fn webhook_router(state: Arc<WebhookState>) -> Router {
    Router::new()
        .route("/mutate", post(admission::mutate_handler))
        .route("/healthz", get(|| async { "ok" }))
        .with_state(state)
}

/// Certificate and key files for serving HTTPS
#[derive(Debug, Clone)]
pub struct TlsFiles {
    /// PEM encoded certificate chain
    pub cert_path: PathBuf,
    /// PEM encoded private key matching `cert_path`
    pub key_path: PathBuf,
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the server
    pub addr: SocketAddr,
    /// TLS material; plain HTTP when absent
    pub tls: Option<TlsFiles>,
}

/// Serve the webhook until interrupted
///
/// The API server only calls webhooks over HTTPS, so plain HTTP is meant for
/// local testing behind a TLS-terminating proxy.
pub async fn serve(config: ServerConfig, state: Arc<WebhookState>) -> Result<(), Error> {
    let app = webhook_router(state);

    match config.tls {
        Some(tls) => {
            let tls_config = RustlsConfig::from_pem_file(&tls.cert_path, &tls.key_path)
                .await
                .map_err(|e| {
                    Error::tls(format!(
                        "failed to load {} / {}: {}",
                        tls.cert_path.display(),
                        tls.key_path.display(),
                        e
                    ))
                })?;

            let handle = axum_server::Handle::new();
            let shutdown = handle.clone();
            tokio::spawn(async move {
                shutdown_signal().await;
                shutdown.graceful_shutdown(Some(SHUTDOWN_GRACE_PERIOD));
            });

            info!(addr = %config.addr, "Starting webhook server (HTTPS)");
            axum_server::bind_rustls(config.addr, tls_config)
                .handle(handle)
                .serve(app.into_make_service())
                .await
                .inspect_err(|e| error!(error = %e, "Webhook server error"))?;
        }
        None => {
            let listener = tokio::net::TcpListener::bind(config.addr).await?;
            info!(addr = %config.addr, "Starting webhook server (plain HTTP)");
            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await
                .inspect_err(|e| error!(error = %e, "Webhook server error"))?;
        }
    }

    info!("Webhook server stopped");
    Ok(())
}

/// Resolves on SIGINT or SIGTERM
async fn shutdown_signal() {
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = interrupt => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
