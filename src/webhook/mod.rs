//! Mutating admission webhook for CAPI Clusters
//!
//! Intercepts Cluster create/update requests, resolves the TKR and OSImages
//! for the cluster, and answers with a JSON patch that records the decision.
//! Resolution failures are returned as denials so the user sees why their
//! cluster was rejected.

pub mod cluster;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use kube::Client;
use tracing::info;

use crate::recorder::Recorder;

/// Shared state for webhook handlers
#[derive(Clone)]
pub struct WebhookState {
    /// Kubernetes client for looking up ClusterClasses
    pub kube: Client,
    /// Resolution entry point over the shared catalog
    pub recorder: Arc<Recorder>,
}

impl WebhookState {
    /// Create webhook state from a client and a recorder
    pub fn new(kube: Client, recorder: Arc<Recorder>) -> Self {
        Self { kube, recorder }
    }
}

/// Create the webhook router
///
/// - POST /mutate/clusters - Resolve and record TKRs on Clusters
/// - GET /healthz - Liveness
pub fn webhook_router(state: Arc<WebhookState>) -> Router {
    Router::new()
        .route("/mutate/clusters", post(cluster::mutate_handler))
        .route("/healthz", get(|| async { "ok" }))
        .with_state(state)
}

/// Listener configuration of the webhook server
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Listen address
    pub addr: SocketAddr,
    /// PEM certificate and key; plain HTTP when absent
    pub tls: Option<TlsFiles>,
}

/// Paths of the serving certificate and key
#[derive(Clone, Debug)]
pub struct TlsFiles {
    /// PEM certificate chain
    pub cert: PathBuf,
    /// PEM private key
    pub key: PathBuf,
}

/// Error type for webhook server operations
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Failed to load the TLS certificate or key
    #[error("failed to configure TLS: {0}")]
    TlsConfig(String),
    /// Failed to bind or serve
    #[error("webhook server error: {0}")]
    Io(#[from] std::io::Error),
}

/// Run the webhook server until it fails
pub async fn serve(config: ServerConfig, state: Arc<WebhookState>) -> Result<(), ServerError> {
    let app = webhook_router(state);

    match config.tls {
        Some(tls) => {
            let tls_config =
                axum_server::tls_rustls::RustlsConfig::from_pem_file(&tls.cert, &tls.key)
                    .await
                    .map_err(|e| ServerError::TlsConfig(e.to_string()))?;
            info!(addr = %config.addr, cert = %tls.cert.display(), "Starting HTTPS webhook server");
            axum_server::bind_rustls(config.addr, tls_config)
                .serve(app.into_make_service())
                .await?;
        }
        None => {
            let listener = tokio::net::TcpListener::bind(config.addr).await?;
            info!(addr = %config.addr, "Starting plain HTTP webhook server");
            axum::serve(listener, app).await?;
        }
    }
    Ok(())
}
