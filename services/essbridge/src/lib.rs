//! essbridge: polls one Modbus TCP register and serves the latest reading as
//! JSON over HTTP.
//!
//! The poll loop and the HTTP server share a [`SnapshotStore`]; the poller is
//! the only writer.

pub mod api;
pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod poller;
pub mod shutdown;
pub mod snapshot;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

pub use config::BridgeConfig;
pub use error::{BridgeError, Result};
pub use poller::{Poller, PollerConfig};
pub use snapshot::{CommStatus, Snapshot, SnapshotStore};

/// Poller plus HTTP server wired to one store
pub struct Bridge {
    config: BridgeConfig,
    store: SnapshotStore,
}

impl Bridge {
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            config,
            store: SnapshotStore::new(),
        }
    }

    pub fn store(&self) -> SnapshotStore {
        self.store.clone()
    }

    /// Bind the configured API address and run until `shutdown` is cancelled
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let bind_address = self.config.bind_address();
        let listener = TcpListener::bind(&bind_address).await.map_err(|e| {
            BridgeError::server(format!("Failed to bind {}: {}", bind_address, e))
        })?;
        self.run_with_listener(listener, shutdown).await
    }

    pub async fn run_with_listener(
        self,
        listener: TcpListener,
        shutdown: CancellationToken,
    ) -> Result<()> {
        let poller = Poller::new(PollerConfig::from(&self.config), self.store.clone())
            .spawn(shutdown.child_token());

        let app = api::create_api_routes(self.store.clone());
        info!(
            "HTTP API listening on {}",
            listener
                .local_addr()
                .map(|a| a.to_string())
                .unwrap_or_else(|_| self.config.bind_address())
        );

        let served = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown.clone().cancelled_owned())
            .await;

        // Server may have exited on its own error; stop the poller either way
        shutdown.cancel();
        if let Err(e) = poller.await {
            error!("Poller task failed: {}", e);
        }

        served.map_err(|e| BridgeError::server(format!("HTTP server error: {}", e)))
    }
}
