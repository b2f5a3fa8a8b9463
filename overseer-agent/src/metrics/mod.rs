//! GPU occupancy snapshots
//!
//! Provides:
//! - Per-device memory capacity and per-user memory usage
//! - A `TelemetrySource` seam so collection can be driven by NVML or by a stub
//! - Grouping of process usage by owner and byte → MB conversion

pub mod nvml;

use crate::error::{OverseerError, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tracing::debug;

pub use nvml::NvmlSource;

/// Bytes in one megabyte as reported in messages.
pub const BYTES_PER_MB: u64 = 1024 * 1024;

/// Memory usage of a single accelerator at one point in time
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeviceStatus {
    pub total_memory_mb: u64,
    /// Username → memory in MB, all processes of the user summed.
    pub users: BTreeMap<String, u64>,
}

/// Snapshot of every device on the host, indexed like the telemetry source
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClusterStatus {
    pub devices: Vec<DeviceStatus>,
}

/// Raw reading for one device as returned by a telemetry source
#[derive(Debug, Clone, Default)]
pub struct DeviceReading {
    pub total_bytes: u64,
    pub processes: Vec<ProcessUsage>,
}

/// One compute process running on a device
#[derive(Debug, Clone)]
pub struct ProcessUsage {
    pub username: String,
    pub used_bytes: u64,
}

/// Anything that can enumerate GPUs and the processes on them.
///
/// Implementations may block; the collector calls them off the async runtime.
pub trait TelemetrySource: Send {
    fn read_devices(&mut self) -> Result<Vec<DeviceReading>>;
}

impl DeviceStatus {
    pub fn from_reading(reading: &DeviceReading) -> Self {
        let mut bytes_by_user: BTreeMap<String, u64> = BTreeMap::new();
        for process in &reading.processes {
            *bytes_by_user.entry(process.username.clone()).or_default() += process.used_bytes;
        }

        Self {
            total_memory_mb: reading.total_bytes / BYTES_PER_MB,
            users: bytes_by_user
                .into_iter()
                .map(|(user, bytes)| (user, bytes / BYTES_PER_MB))
                .collect(),
        }
    }

    pub fn occupied_mb(&self) -> u64 {
        self.users.values().sum()
    }

    pub fn is_vacant(&self) -> bool {
        self.users.is_empty()
    }

    /// Occupied share of total memory in percent, 0 for a device reporting no capacity.
    pub fn utilization_percent(&self) -> f64 {
        if self.total_memory_mb == 0 {
            return 0.0;
        }
        self.occupied_mb() as f64 / self.total_memory_mb as f64 * 100.0
    }
}

impl ClusterStatus {
    pub fn new(devices: Vec<DeviceStatus>) -> Self {
        Self { devices }
    }

    pub fn from_readings(readings: &[DeviceReading]) -> Self {
        Self {
            devices: readings.iter().map(DeviceStatus::from_reading).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

/// Takes snapshots from a telemetry source
#[derive(Clone)]
pub struct SnapshotCollector {
    source: Arc<Mutex<dyn TelemetrySource>>,
}

impl SnapshotCollector {
    pub fn new<S: TelemetrySource + 'static>(source: S) -> Self {
        Self {
            source: Arc::new(Mutex::new(source)),
        }
    }

    /// Query the source once and build a snapshot
    pub async fn collect(&self) -> Result<ClusterStatus> {
        let source = Arc::clone(&self.source);
        let readings = tokio::task::spawn_blocking(move || {
            let mut source = source
                .lock()
                .map_err(|_| OverseerError::telemetry("telemetry source lock poisoned"))?;
            source.read_devices()
        })
        .await
        .map_err(|e| OverseerError::telemetry(format!("telemetry task aborted: {}", e)))??;

        let status = ClusterStatus::from_readings(&readings);
        debug!("Collected snapshot of {} device(s)", status.len());
        Ok(status)
    }
}


#[cfg(test)]
mod tests {
    use super::mock::{reading, ScriptedSource};
    use super::*;

    #[test]
    fn test_processes_grouped_by_user() {
        let status = DeviceStatus::from_reading(&reading(
            16000,
            &[("alice", 1000), ("bob", 500), ("alice", 250)],
        ));

        assert_eq!(status.total_memory_mb, 16000);
        assert_eq!(status.users.len(), 2);
        assert_eq!(status.users["alice"], 1250);
        assert_eq!(status.users["bob"], 500);
        assert_eq!(status.occupied_mb(), 1750);
    }

    #[test]
    fn test_bytes_summed_before_conversion() {
        // Two half-megabyte processes add up to one full megabyte.
        let device = DeviceReading {
            total_bytes: 8 * BYTES_PER_MB + 123,
            processes: vec![
                ProcessUsage { username: "carol".into(), used_bytes: BYTES_PER_MB / 2 },
                ProcessUsage { username: "carol".into(), used_bytes: BYTES_PER_MB / 2 },
            ],
        };
        let status = DeviceStatus::from_reading(&device);
        assert_eq!(status.total_memory_mb, 8);
        assert_eq!(status.users["carol"], 1);
    }

    #[test]
    fn test_utilization() {
        let status = DeviceStatus::from_reading(&reading(10000, &[("a", 2500), ("b", 2500)]));
        assert!((status.utilization_percent() - 50.0).abs() < f64::EPSILON);

        let empty = DeviceStatus::default();
        assert_eq!(empty.utilization_percent(), 0.0);
        assert!(empty.is_vacant());
    }

    #[tokio::test]
    async fn test_collect_preserves_device_order() {
        let source = ScriptedSource::new(vec![Ok(vec![
            reading(24000, &[("alice", 100)]),
            reading(12000, &[]),
        ])]);
        let collector = SnapshotCollector::new(source.clone());

        let status = collector.collect().await.unwrap();
        assert_eq!(status.len(), 2);
        assert_eq!(status.devices[0].total_memory_mb, 24000);
        assert!(status.devices[1].is_vacant());
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn test_collect_propagates_telemetry_error() {
        let source = ScriptedSource::new(vec![Err(OverseerError::telemetry("driver not loaded"))]);
        let collector = SnapshotCollector::new(source);

        let err = collector.collect().await.unwrap_err();
        assert!(matches!(err, OverseerError::Telemetry { .. }));
    }
}
