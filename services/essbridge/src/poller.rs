//! Background poll loop
//!
//! Opens a fresh connection per cycle, reads one register, decodes it as
//! active power and swaps the result into the [`SnapshotStore`].

use std::time::Duration;

use chrono::Local;
use ess_modbus::{register, ModbusExchange, RegisterBank};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::BridgeConfig;
use crate::snapshot::{Snapshot, SnapshotStore};

/// Format of `comm.last_ok_ts`, local time with second resolution
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

#[derive(Debug, Clone, PartialEq)]
pub struct PollerConfig {
    pub device_address: String,
    pub unit_id: u8,
    pub bank: RegisterBank,
    pub address: u16,
    pub interval: Duration,
    pub timeout: Duration,
}

impl From<&BridgeConfig> for PollerConfig {
    fn from(config: &BridgeConfig) -> Self {
        Self {
            device_address: config.device_address(),
            unit_id: config.device.unit_id,
            bank: config.device.bank,
            address: config.device.address,
            interval: config.poll_interval(),
            timeout: config.timeout(),
        }
    }
}

pub struct Poller {
    config: PollerConfig,
    store: SnapshotStore,
}

impl Poller {
    pub fn new(config: PollerConfig, store: SnapshotStore) -> Self {
        Self { config, store }
    }

    /// One connect / read / close cycle
    pub async fn poll_once(&self) -> ess_modbus::Result<u16> {
        let mut exchange =
            ModbusExchange::connect(self.config.device_address.as_str(), self.config.timeout)
                .await?;
        let registers = exchange
            .read_registers(
                self.config.unit_id,
                self.config.bank,
                self.config.address,
                1,
            )
            .await?;

        if let Err(e) = exchange.close().await {
            debug!("Close after poll failed: {}", e);
        }

        registers
            .first()
            .copied()
            .ok_or_else(|| ess_modbus::ModbusError::format("empty register response"))
    }

    /// Run until `token` is cancelled. Cancellation is observed between cycles.
    pub async fn run(self, token: CancellationToken) {
        info!(
            "Polling {} unit {} {}{} every {:?}",
            self.config.device_address,
            self.config.unit_id,
            self.config.bank.label(),
            self.config.address,
            self.config.interval
        );

        let mut current = self.store.get();
        loop {
            if token.is_cancelled() {
                break;
            }

            let outcome = self.poll_once().await;
            current = match outcome {
                Ok(raw) => {
                    let snapshot = reading_snapshot(raw, current_timestamp());
                    debug!(raw, kw = ?snapshot.active_power_kw, "Poll ok");
                    snapshot
                },
                Err(e) => {
                    warn!("Poll of {} failed: {}", self.config.device_address, e);
                    current.with_failure(e.to_string())
                },
            };
            self.store.replace(current.clone());

            tokio::select! {
                () = tokio::time::sleep(self.config.interval) => {},
                () = token.cancelled() => break,
            }
        }

        info!("Poller stopped");
    }

    pub fn spawn(self, token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(token))
    }
}

/// Snapshot for a successful read of `raw`, power rounded to 0.1 kW
pub fn reading_snapshot(raw: u16, timestamp: String) -> Snapshot {
    let kw = (register::decode_power_kw(raw) * 10.0).round() / 10.0;
    Snapshot::success(raw, kw, timestamp)
}

fn current_timestamp() -> String {
    Local::now().format(TIMESTAMP_FORMAT).to_string()
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[test]
    fn test_reading_snapshot_decodes_signed_power() {
        let snapshot = reading_snapshot(1230, "t".to_string());
        assert_eq!(snapshot.active_power_kw, Some(123.0));
        assert_eq!(snapshot.raw, Some(1230));
        assert!(snapshot.comm.ok);

        let snapshot = reading_snapshot(0xFB2E, "t".to_string());
        assert_eq!(snapshot.active_power_kw, Some(-123.4));
        assert_eq!(snapshot.raw, Some(0xFB2E));
    }

    #[test]
    fn test_timestamp_format() {
        let ts = current_timestamp();
        assert!(chrono::NaiveDateTime::parse_from_str(&ts, TIMESTAMP_FORMAT).is_ok());
        assert_eq!(ts.len(), 19);
    }

    #[test]
    fn test_poller_config_from_bridge_config() {
        let config = BridgeConfig::default();
        let poller = PollerConfig::from(&config);
        assert_eq!(poller.device_address, "127.0.0.1:502");
        assert_eq!(poller.unit_id, 10);
        assert_eq!(poller.bank, RegisterBank::Input);
        assert_eq!(poller.interval, Duration::from_secs(1));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_poller_logs_failure_then_stops_on_cancel() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let store = SnapshotStore::new();
        let config = PollerConfig {
            device_address: addr,
            unit_id: 1,
            bank: RegisterBank::Holding,
            address: 0,
            interval: Duration::from_secs(60),
            timeout: Duration::from_millis(500),
        };
        let token = CancellationToken::new();
        let handle = Poller::new(config, store.clone()).spawn(token.clone());

        tokio::time::timeout(Duration::from_secs(5), async {
            while store.get().comm.last_error.as_deref() == Some(crate::snapshot::NOT_POLLED_YET) {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
        token.cancel();
        handle.await.unwrap();

        let snapshot = store.get();
        assert!(!snapshot.comm.ok);
        assert_ne!(snapshot.comm.last_error.as_deref(), Some(crate::snapshot::NOT_POLLED_YET));
        assert!(logs_contain("failed"));
        assert!(logs_contain("Poller stopped"));
    }

    #[tokio::test]
    async fn test_token_cancelled_before_start_skips_polling() {
        let store = SnapshotStore::new();
        let config = PollerConfig {
            // Never contacted
            device_address: "192.0.2.1:502".to_string(),
            unit_id: 1,
            bank: RegisterBank::Input,
            address: 0,
            interval: Duration::from_secs(60),
            timeout: Duration::from_secs(30),
        };
        let token = CancellationToken::new();
        token.cancel();

        tokio::time::timeout(
            Duration::from_secs(1),
            Poller::new(config, store.clone()).run(token),
        )
        .await
        .unwrap();

        assert_eq!(store.get(), Snapshot::default());
    }
}
