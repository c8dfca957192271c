//! Unix socket listener.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::net::UnixListener;
use tokio::sync::{Notify, Semaphore};
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::error::RpcError;
use crate::functions::FunctionRegistry;

use super::handle_connection;

/// Connection metrics for monitoring.
#[derive(Debug, Default)]
pub struct ConnectionMetrics {
    /// Total requests processed.
    pub requests_total: AtomicU64,
    /// Requests answered with an error response or dropped.
    pub requests_failed: AtomicU64,
    /// Currently active connections.
    pub active_connections: AtomicUsize,
}

impl ConnectionMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment request count.
    pub fn record_request(&self, success: bool) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.requests_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn total_requests(&self) -> u64 {
        self.requests_total.load(Ordering::Relaxed)
    }

    pub fn failed_requests(&self) -> u64 {
        self.requests_failed.load(Ordering::Relaxed)
    }

    pub fn active(&self) -> usize {
        self.active_connections.load(Ordering::Relaxed)
    }
}

/// Counts one active connection for as long as it lives, even if the
/// connection task panics.
struct ActiveConnection(Arc<ConnectionMetrics>);

impl ActiveConnection {
    fn track(metrics: Arc<ConnectionMetrics>) -> Self {
        metrics.active_connections.fetch_add(1, Ordering::Relaxed);
        Self(metrics)
    }
}

impl Drop for ActiveConnection {
    fn drop(&mut self) {
        self.0.active_connections.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Unix socket server.
pub struct SocketListener {
    listener: UnixListener,
    config: Arc<ServerConfig>,
    registry: Arc<FunctionRegistry>,
    metrics: Arc<ConnectionMetrics>,
    /// Bounds concurrently served connections; excess connections wait.
    connection_semaphore: Arc<Semaphore>,
}

impl SocketListener {
    /// Create and bind a new socket listener.
    pub async fn bind(config: ServerConfig, registry: FunctionRegistry) -> Result<Self, RpcError> {
        config.validate()?;
        let socket_path = &config.socket_path;

        // Remove a stale socket file, but never follow a symlink to do it
        if let Ok(metadata) = std::fs::symlink_metadata(socket_path) {
            if metadata.file_type().is_symlink() {
                return Err(RpcError::Socket {
                    message: format!(
                        "Socket path {} is a symlink, refusing to remove",
                        socket_path.display()
                    ),
                });
            }

            std::fs::remove_file(socket_path).map_err(|e| RpcError::Socket {
                message: format!(
                    "Failed to remove existing socket file {}: {}",
                    socket_path.display(),
                    e
                ),
            })?;
        }

        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| RpcError::Socket {
                message: format!(
                    "Failed to create socket directory {}: {}",
                    parent.display(),
                    e
                ),
            })?;
        }

        let listener = UnixListener::bind(socket_path).map_err(|e| RpcError::Socket {
            message: format!("Failed to bind to socket {}: {}", socket_path.display(), e),
        })?;

        Self::set_socket_permissions(socket_path, &config.socket_permissions)?;

        let connection_semaphore = Arc::new(Semaphore::new(config.max_concurrent_connections));

        info!(
            path = %socket_path.display(),
            package = %config.package,
            functions = registry.len(),
            max_connections = config.max_concurrent_connections,
            "Socket listener bound"
        );

        Ok(Self {
            listener,
            config: Arc::new(config),
            registry: Arc::new(registry),
            metrics: Arc::new(ConnectionMetrics::new()),
            connection_semaphore,
        })
    }

    pub fn socket_path(&self) -> &PathBuf {
        &self.config.socket_path
    }

    /// Get connection metrics.
    pub fn metrics(&self) -> Arc<ConnectionMetrics> {
        Arc::clone(&self.metrics)
    }

    fn set_socket_permissions(path: &Path, permissions_str: &str) -> Result<(), RpcError> {
        let mode = u32::from_str_radix(permissions_str, 8).map_err(|e| RpcError::Socket {
            message: format!("Invalid socket permissions '{}': {}", permissions_str, e),
        })?;

        std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).map_err(|e| {
            RpcError::Socket {
                message: format!(
                    "Failed to set socket permissions on {}: {}",
                    path.display(),
                    e
                ),
            }
        })
    }

    /// Run the socket listener, accepting connections.
    ///
    /// Stops accepting when `shutdown` is notified. Connections already
    /// accepted run to completion.
    pub async fn run(&self, shutdown: Arc<Notify>) -> Result<(), RpcError> {
        info!("Socket listener running, waiting for connections...");

        loop {
            tokio::select! {
                result = self.listener.accept() => {
                    match result {
                        Ok((stream, _addr)) => self.spawn_connection(stream),
                        Err(e) => {
                            warn!(error = %e, "Failed to accept connection");
                        }
                    }
                }
                _ = shutdown.notified() => {
                    info!("Shutdown signal received, stopping listener");
                    break;
                }
            }
        }

        Ok(())
    }

    fn spawn_connection(&self, stream: tokio::net::UnixStream) {
        let config = Arc::clone(&self.config);
        let registry = Arc::clone(&self.registry);
        let metrics = Arc::clone(&self.metrics);
        let semaphore = Arc::clone(&self.connection_semaphore);

        let active = ActiveConnection::track(Arc::clone(&metrics));
        debug!(active = metrics.active(), "New connection accepted");

        tokio::spawn(async move {
            let _active = active;
            // Held until the task completes
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    error!(error = %e, "Connection semaphore closed");
                    return;
                }
            };

            let success = match handle_connection(stream, config, registry).await {
                Ok(success) => success,
                Err(e) => {
                    warn!(error = %e, "Connection dropped without a response");
                    false
                }
            };

            metrics.record_request(success);
            debug!(success, "Connection closed");
        });
    }

    /// Wait for all active connections to drain.
    ///
    /// Returns immediately if there are no active connections.
    pub async fn wait_for_drain(&self) {
        let poll_interval = std::time::Duration::from_millis(100);

        while self.metrics.active() > 0 {
            debug!(active = self.metrics.active(), "Waiting for connections to drain");
            tokio::time::sleep(poll_interval).await;
        }

        info!("All connections drained");
    }
}
