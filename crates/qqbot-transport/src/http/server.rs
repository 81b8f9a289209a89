//! Webhook server: receives gateway event POSTs.

use std::net::SocketAddr;

use axum::{
    Router,
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::post,
};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info, trace};

use qqbot_core::{BoxedEventSink, TransportResult};

/// HTTP server accepting event callbacks from the gateway.
pub struct WebhookServer;

impl WebhookServer {
    /// Binds `addr` and serves `path`, feeding every POST body to `sink`.
    ///
    /// The server runs on a spawned task until the returned handle is shut
    /// down or dropped.
    pub async fn listen(
        addr: &str,
        path: &str,
        sink: BoxedEventSink,
    ) -> TransportResult<ServerHandle> {
        let path = normalize_path(path);
        let router = router(&path, sink);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;

        info!(addr = %local_addr, path = %path, "Webhook server listening");

        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let task = tokio::spawn(async move {
            let server = axum::serve(listener, router);

            tokio::select! {
                result = server => {
                    if let Err(e) = result {
                        error!(error = %e, "Webhook server error");
                    }
                }
                _ = shutdown_rx => {
                    info!("Webhook server shutting down");
                }
            }
        });

        Ok(ServerHandle {
            local_addr,
            shutdown: Some(shutdown_tx),
            task,
        })
    }
}

/// Builds the webhook router without binding a socket.
pub fn router(path: &str, sink: BoxedEventSink) -> Router {
    Router::new()
        .route(&normalize_path(path), post(webhook_handler))
        .with_state(sink)
}

fn normalize_path(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}

/// Handle to a running [`WebhookServer`].
pub struct ServerHandle {
    local_addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl ServerHandle {
    /// The address actually bound (useful when listening on port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stops accepting requests and waits for the server task to finish.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Err(e) = (&mut self.task).await {
            error!(error = %e, "Webhook server task panicked");
        }
    }
}

impl std::fmt::Debug for ServerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerHandle")
            .field("local_addr", &self.local_addr)
            .field("running", &!self.task.is_finished())
            .finish()
    }
}

/// HTTP POST handler.
async fn webhook_handler(State(sink): State<BoxedEventSink>, body: Bytes) -> impl IntoResponse {
    trace!(len = body.len(), "Received webhook POST");

    match sink.on_event(&body).await {
        Ok(()) => (StatusCode::OK, "ok"),
        Err(e) => {
            error!(error = %e, "Gateway failure while processing event");
            (StatusCode::BAD_GATEWAY, "gateway unavailable")
        }
    }
}
