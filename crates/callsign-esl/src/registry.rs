//! Outbound socket service registry
//!
//! A fixed set of named listeners, one per call-handling service, started
//! and stopped as a unit. Every accepted connection runs in its own task;
//! a panicking handler only loses its own call.

use async_trait::async_trait;
use callsign_core::{AppError, AppResult};
use futures::FutureExt;
use parking_lot::RwLock;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

/// Per-connection entry point of a service
#[async_trait]
pub trait ConnectionHandler: Send + Sync + 'static {
    async fn handle(&self, stream: TcpStream, peer: SocketAddr);
}

struct ServiceEntry {
    name: String,
    address: String,
    handler: Arc<dyn ConnectionHandler>,
    local_addr: Option<SocketAddr>,
}

#[derive(Default)]
pub struct ServiceRegistry {
    services: RwLock<Vec<ServiceEntry>>,
    started: AtomicBool,
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a named service to a listen address
    pub fn register(
        &self,
        name: impl Into<String>,
        address: impl Into<String>,
        handler: Arc<dyn ConnectionHandler>,
    ) -> AppResult<()> {
        let name = name.into();
        let address = address.into();

        if self.started.load(Ordering::SeqCst) {
            return Err(AppError::Registry(format!(
                "cannot register {} after start",
                name
            )));
        }

        let mut services = self.services.write();
        if services.iter().any(|s| s.name == name) {
            return Err(AppError::Registry(format!(
                "service {} already registered",
                name
            )));
        }

        info!(service = %name, %address, "Registered ESL service");
        services.push(ServiceEntry {
            name,
            address,
            handler,
            local_addr: None,
        });
        Ok(())
    }

    pub fn names(&self) -> Vec<String> {
        self.services.read().iter().map(|s| s.name.clone()).collect()
    }

    /// Bound address of a started service
    pub fn local_addr(&self, name: &str) -> Option<SocketAddr> {
        self.services
            .read()
            .iter()
            .find(|s| s.name == name)
            .and_then(|s| s.local_addr)
    }

    pub fn is_running(&self) -> bool {
        self.started.load(Ordering::SeqCst) && !self.shutdown.is_cancelled()
    }

    /// Bind and start accepting on every registered address
    ///
    /// Stops at the first bind failure; listeners started before it keep
    /// running until `stop_all`.
    pub async fn start_all(&self) -> AppResult<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(AppError::Registry("services already started".to_string()));
        }

        let pending: Vec<(String, String, Arc<dyn ConnectionHandler>)> = self
            .services
            .read()
            .iter()
            .map(|s| (s.name.clone(), s.address.clone(), s.handler.clone()))
            .collect();

        for (name, address, handler) in pending {
            let listener = TcpListener::bind(&address).await.map_err(|e| {
                AppError::Registry(format!("failed to bind {} at {}: {}", name, address, e))
            })?;
            let local_addr = listener.local_addr()?;

            if let Some(entry) = self.services.write().iter_mut().find(|s| s.name == name) {
                entry.local_addr = Some(local_addr);
            }

            info!(service = %name, address = %local_addr, "Starting ESL service");
            self.tracker.spawn(accept_loop(
                name,
                listener,
                handler,
                self.shutdown.clone(),
                self.tracker.clone(),
            ));
        }

        Ok(())
    }

    /// Close every listener and wait for in-flight connections to finish
    pub async fn stop_all(&self) {
        info!(services = ?self.names(), "Stopping ESL services");
        self.shutdown.cancel();
        self.tracker.close();
        self.tracker.wait().await;
        info!("ESL services stopped");
    }
}

async fn accept_loop(
    name: String,
    listener: TcpListener,
    handler: Arc<dyn ConnectionHandler>,
    shutdown: CancellationToken,
    tracker: TaskTracker,
) {
    loop {
        let accepted = tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((stream, peer)) => {
                debug!(service = %name, %peer, "Incoming ESL connection from FreeSWITCH");
                let handler = handler.clone();
                let service = name.clone();
                tracker.spawn(async move {
                    let outcome = AssertUnwindSafe(handler.handle(stream, peer))
                        .catch_unwind()
                        .await;
                    if outcome.is_err() {
                        error!(service = %service, %peer, "Connection handler panicked");
                    }
                });
            }
            Err(err) => {
                warn!(service = %name, error = %err, "Accept failed");
            }
        }
    }
    debug!(service = %name, "Listener closed");
}
