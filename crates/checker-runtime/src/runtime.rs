//! Checker runtime wiring
//!
//! ## Startup Sequence
//!
//! 1. Open the state store once; the handle lives as long as the runtime
//! 2. Build the beacon node client
//! 3. Spawn the sweep task and the metrics server
//! 4. Serve `/check` until shutdown

use crate::config::{CheckerConfig, StorageBackend};
use crate::http::{check_router, metrics_router, AppState};
use crate::sweeper::run_sweeper;
use crate::RuntimeError;
use dg_detection::adapters::{BeaconNodeHttpClient, FileStateStore, Timeouts};
use dg_detection::{DoppelgangerApi, DoppelgangerService};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};

pub struct CheckerRuntime {
    config: CheckerConfig,
    /// Shutdown signal sender.
    shutdown_tx: watch::Sender<bool>,
    /// Shutdown signal receiver.
    shutdown_rx: watch::Receiver<bool>,
}

impl CheckerRuntime {
    pub fn new(config: CheckerConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            config,
            shutdown_tx,
            shutdown_rx,
        }
    }

    /// Build the detection service over the configured backend.
    pub fn build_api(&self) -> Result<Arc<dyn DoppelgangerApi>, RuntimeError> {
        let beacon = Arc::new(BeaconNodeHttpClient::new(
            &self.config.beacon_url,
            Timeouts::set_all(self.config.request_timeout()),
        )?);
        let detection = self.config.detection_config();

        let api: Arc<dyn DoppelgangerApi> = match self.config.storage_backend {
            StorageBackend::File => {
                let store = Arc::new(FileStateStore::open(&self.config.db_path)?);
                Arc::new(DoppelgangerService::new(detection, beacon, store))
            }
            #[cfg(feature = "rocksdb")]
            StorageBackend::Rocksdb => {
                let store = Arc::new(dg_detection::adapters::RocksDbStateStore::open(
                    &self.config.db_path,
                )?);
                Arc::new(DoppelgangerService::new(detection, beacon, store))
            }
            #[cfg(not(feature = "rocksdb"))]
            StorageBackend::Rocksdb => return Err(RuntimeError::BackendUnavailable("rocksdb")),
        };
        Ok(api)
    }

    /// Run until [`CheckerRuntime::shutdown`] is called or the server fails.
    pub async fn run(&self) -> Result<(), RuntimeError> {
        info!(
            beacon = %self.config.beacon_url,
            db = %self.config.db_path.display(),
            cooldown = self.config.vc_doppelganger_epochs_down,
            "Starting doppelganger checker"
        );
        let api = self.build_api()?;

        tokio::spawn(run_sweeper(
            Arc::clone(&api),
            self.config.sweep_interval(),
            self.shutdown_rx.clone(),
        ));

        let metrics_addr = self.config.metrics_addr();
        let metrics_listener = tokio::net::TcpListener::bind(metrics_addr).await?;
        info!(addr = %metrics_addr, "Starting metrics server");
        let mut metrics_shutdown = self.shutdown_rx.clone();
        tokio::spawn(async move {
            let served = axum::serve(metrics_listener, metrics_router())
                .with_graceful_shutdown(async move {
                    let _ = metrics_shutdown.changed().await;
                })
                .await;
            if let Err(e) = served {
                error!(error = %e, "metrics server stopped");
            }
        });

        let state = AppState {
            api,
            validators_dir: self.config.validators_dir.clone(),
        };
        let checker_addr = self.config.checker_addr();
        let listener = tokio::net::TcpListener::bind(checker_addr).await?;
        info!(addr = %checker_addr, "Starting check server");

        let mut shutdown = self.shutdown_rx.clone();
        axum::serve(listener, check_router(state))
            .with_graceful_shutdown(async move {
                let _ = shutdown.changed().await;
                info!("[checker] Shutdown signal received");
            })
            .await?;
        Ok(())
    }

    pub fn shutdown(&self) {
        info!("Shutting down doppelganger checker");
        let _ = self.shutdown_tx.send(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_api_with_file_backend() {
        let dir = tempfile::tempdir().unwrap();
        let config = CheckerConfig {
            db_path: dir.path().join("state.db"),
            ..Default::default()
        };
        assert!(CheckerRuntime::new(config).build_api().is_ok());
    }

    #[test]
    fn test_build_api_rejects_corrupt_store() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("state.db");
        std::fs::write(&db_path, b"garbage").unwrap();
        let config = CheckerConfig {
            db_path,
            ..Default::default()
        };
        assert!(matches!(
            CheckerRuntime::new(config).build_api(),
            Err(RuntimeError::Store(_))
        ));
    }

    #[tokio::test]
    async fn test_shutdown_stops_run() {
        let dir = tempfile::tempdir().unwrap();
        let config = CheckerConfig {
            db_path: dir.path().join("state.db"),
            listen_address: "127.0.0.1".parse().unwrap(),
            checker_port: 38_471,
            metrics_port: 38_472,
            ..Default::default()
        };
        let runtime = Arc::new(CheckerRuntime::new(config));
        let handle = tokio::spawn({
            let runtime = Arc::clone(&runtime);
            async move { runtime.run().await }
        });

        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        runtime.shutdown();
        let result = tokio::time::timeout(std::time::Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }
}
