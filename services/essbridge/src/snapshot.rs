//! Latest reading shared between the poll loop and the HTTP handlers

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Error text shown before the first poll completes
pub const NOT_POLLED_YET: &str = "not polled yet";

/// Link health as seen by the last poll
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommStatus {
    pub ok: bool,
    #[serde(rename = "last_ok_ts")]
    pub last_ok_timestamp: Option<String>,
    pub last_error: Option<String>,
}

/// One consistent view of the meter, served as-is by `GET /api/multimeter`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub active_power_kw: Option<f64>,
    pub raw: Option<u16>,
    pub comm: CommStatus,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            active_power_kw: None,
            raw: None,
            comm: CommStatus {
                ok: false,
                last_ok_timestamp: None,
                last_error: Some(NOT_POLLED_YET.to_string()),
            },
        }
    }
}

impl Snapshot {
    /// A fresh successful reading
    pub fn success(raw: u16, active_power_kw: f64, timestamp: impl Into<String>) -> Self {
        Self {
            active_power_kw: Some(active_power_kw),
            raw: Some(raw),
            comm: CommStatus {
                ok: true,
                last_ok_timestamp: Some(timestamp.into()),
                last_error: None,
            },
        }
    }

    /// Same reading and last success time, marked as failed
    pub fn with_failure(&self, error: impl Into<String>) -> Self {
        Self {
            active_power_kw: self.active_power_kw,
            raw: self.raw,
            comm: CommStatus {
                ok: false,
                last_ok_timestamp: self.comm.last_ok_timestamp.clone(),
                last_error: Some(error.into()),
            },
        }
    }
}

/// Mutex-guarded snapshot. Writers swap in a whole new value so readers never
/// see a half-updated record.
#[derive(Debug, Clone, Default)]
pub struct SnapshotStore {
    inner: Arc<Mutex<Snapshot>>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the current snapshot; the lock is released before returning
    pub fn get(&self) -> Snapshot {
        self.inner.lock().clone()
    }

    pub fn replace(&self, snapshot: Snapshot) {
        *self.inner.lock() = snapshot;
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_initial_snapshot() {
        let snapshot = SnapshotStore::new().get();
        assert_eq!(snapshot.active_power_kw, None);
        assert_eq!(snapshot.raw, None);
        assert!(!snapshot.comm.ok);
        assert_eq!(snapshot.comm.last_error.as_deref(), Some(NOT_POLLED_YET));
    }

    #[test]
    fn test_failure_keeps_last_good_reading() {
        let good = Snapshot::success(1230, 123.0, "2024-05-01T10:00:00");
        let failed = good.with_failure("timed out");

        assert_eq!(failed.raw, Some(1230));
        assert_eq!(failed.active_power_kw, Some(123.0));
        assert!(!failed.comm.ok);
        assert_eq!(
            failed.comm.last_ok_timestamp.as_deref(),
            Some("2024-05-01T10:00:00")
        );
        assert_eq!(failed.comm.last_error.as_deref(), Some("timed out"));
    }

    #[test]
    fn test_json_shape() {
        let json = serde_json::to_value(Snapshot::success(1230, 123.0, "2024-05-01T10:00:00"))
            .unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "active_power_kw": 123.0,
                "raw": 1230,
                "comm": {"ok": true, "last_ok_ts": "2024-05-01T10:00:00", "last_error": null}
            })
        );

        let json = serde_json::to_value(Snapshot::default()).unwrap();
        assert_eq!(json["active_power_kw"], serde_json::Value::Null);
        assert_eq!(json["comm"]["last_error"], "not polled yet");
    }

    #[test]
    fn test_readers_never_observe_torn_snapshot() {
        let store = SnapshotStore::new();
        let writer_store = store.clone();

        let writer = thread::spawn(move || {
            for i in 0..2000u16 {
                writer_store.replace(Snapshot::success(i, f64::from(i), i.to_string()));
            }
        });

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let store = store.clone();
                thread::spawn(move || {
                    for _ in 0..2000 {
                        let snapshot = store.get();
                        if let Some(raw) = snapshot.raw {
                            assert_eq!(snapshot.active_power_kw, Some(f64::from(raw)));
                            assert_eq!(snapshot.comm.last_ok_timestamp, Some(raw.to_string()));
                        }
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
        assert_eq!(store.get().raw, Some(1999));
    }
}
