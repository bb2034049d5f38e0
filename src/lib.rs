//! Presence sensing core.
//!
//! This crate fuses two independent physical signals into one live picture of
//! who and what is present in a monitored space:
//!
//! 1. **Wi-Fi probe requests**: a line-oriented capture stream is parsed into
//!    device sightings and folded into a TTL-evicted device registry, with
//!    operator-managed trust classification.
//! 2. **Camera change detection**: pairs of (baseline, current) frames are run
//!    through four independent difference algorithms whose outputs are fused
//!    into a single free-space percentage.
//!
//! # Module Structure
//!
//! - `capture`: capture-line sources and the probe-request parser
//! - `trust`: durable store of operator-acknowledged, named devices
//! - `registry`: the authoritative set of currently-seen devices
//! - `frame`: image frames and frame sources
//! - `detect`: the four difference algorithms
//! - `fusion`: combining enabled algorithm outputs into one report
//! - `report`: downstream wire-format lines and report sinks
//! - `transport`: MQTT sink for the downstream analysis collaborator
//! - `coordinator`: concurrency contract between producers and consumers
//!
//! The coordinator is the sole writer of registry and frame state. Producers
//! parse and decode outside the lock and only lock to commit; consumers read
//! immutable snapshots. A shared shutdown flag is observed cooperatively at
//! every iteration boundary.

use serde::Serialize;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub mod capture;
pub mod config;
pub mod coordinator;
pub mod detect;
pub mod frame;
pub mod fusion;
pub mod registry;
pub mod report;
pub mod transport;
pub mod trust;

pub use capture::parser::parse_capture_line;
pub use capture::vendor::{VendorTable, UNKNOWN_VENDOR};
pub use capture::{CommandCapture, FileCapture, LineSource, StubCapture};
pub use config::PresencedConfig;
pub use coordinator::{Coordinator, CoordinatorConfig, ShutdownHandle};
pub use detect::{DiffMethod, MethodOutput};
pub use frame::{open_frame_source, FrameSource, FrameStats, ImageFrame, SyntheticSource};
pub use fusion::{render_report, FusionEngine, FusionReport, MethodSet, BASELINE_UNAVAILABLE};
pub use registry::DeviceRegistry;
pub use report::{format_sighting_line, LogSink, ReportSink};
pub use transport::{MqttSink, MqttSinkConfig};
pub use trust::TrustStore;

/// Seconds since the Unix epoch.
pub fn now_s() -> anyhow::Result<u64> {
    Ok(SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs())
}

// -------------------- Sightings --------------------

/// Number of characters in a vendor prefix: three colon-separated octets.
pub const VENDOR_PREFIX_LEN: usize = 8;

/// One observed instance of a device's radio signal at a point in time.
///
/// Produced by the capture parser and consumed immediately by the device
/// registry; never persisted on its own.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sighting {
    /// Normalized lower-case colon-separated MAC address.
    pub mac: String,
    /// Signal strength in dBm (negative).
    pub signal_dbm: i32,
    /// Wall clock at parse time.
    pub observed_at: SystemTime,
}

impl Sighting {
    /// First three octets of the MAC, used as the vendor-lookup key.
    pub fn vendor_prefix(&self) -> &str {
        let end = self.mac.len().min(VENDOR_PREFIX_LEN);
        &self.mac[..end]
    }
}

// -------------------- Device records --------------------

/// One currently-present device, as seen in a registry snapshot.
///
/// Exactly one record exists per MAC at any instant. `last_seen` is
/// monotonically non-decreasing while the record exists.
#[derive(Clone, Debug, Serialize)]
pub struct DeviceRecord {
    pub mac: String,
    /// Vendor label derived from the MAC prefix ("Unknown" on table miss).
    pub vendor: String,
    /// Most recent signal strength in dBm.
    pub signal_dbm: i32,
    /// Wall clock of the most recent sighting.
    #[serde(skip)]
    pub last_seen: SystemTime,
    /// Operator-assigned name, present iff the device is trusted.
    pub trusted_name: Option<String>,
    /// Rough range estimate from signal strength, in meters. Not a
    /// measurement: the log-distance model is only indicative.
    pub estimated_distance_m: f64,
}

impl DeviceRecord {
    pub fn is_trusted(&self) -> bool {
        self.trusted_name.is_some()
    }

    /// Age of the record relative to `now`. Zero if `last_seen` is in the
    /// future (clock skew between producers).
    pub fn age(&self, now: SystemTime) -> Duration {
        now.duration_since(self.last_seen).unwrap_or(Duration::ZERO)
    }
}

/// Estimate distance in meters from RSSI using the log-distance path loss
/// model: `10 ^ ((tx_power - rssi) / (10 * n))`.
pub fn rssi_to_distance(rssi_dbm: i32, tx_power_dbm: f64, path_loss_exponent: f64) -> f64 {
    10f64.powf((tx_power_dbm - rssi_dbm as f64) / (10.0 * path_loss_exponent))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vendor_prefix_is_first_three_octets() {
        let s = Sighting {
            mac: "4c:23:1a:05:bd:d4".to_string(),
            signal_dbm: -69,
            observed_at: SystemTime::UNIX_EPOCH,
        };
        assert_eq!(s.vendor_prefix(), "4c:23:1a");
    }

    #[test]
    fn vendor_prefix_tolerates_short_macs() {
        let s = Sighting {
            mac: "4c:23".to_string(),
            signal_dbm: -40,
            observed_at: SystemTime::UNIX_EPOCH,
        };
        assert_eq!(s.vendor_prefix(), "4c:23");
    }

    #[test]
    fn distance_estimate_follows_path_loss_model() {
        // rssi equal to tx power => 1 meter.
        assert!((rssi_to_distance(-30, -30.0, 2.0) - 1.0).abs() < 1e-9);
        // 20 dB of loss at exponent 2 => 10 meters.
        assert!((rssi_to_distance(-50, -30.0, 2.0) - 10.0).abs() < 1e-9);
    }

    #[test]
    fn record_age_saturates_at_zero() {
        let now = SystemTime::UNIX_EPOCH + Duration::from_secs(100);
        let rec = DeviceRecord {
            mac: "aa:bb:cc:dd:ee:ff".to_string(),
            vendor: "Unknown".to_string(),
            signal_dbm: -50,
            last_seen: now + Duration::from_secs(5),
            trusted_name: None,
            estimated_distance_m: 1.0,
        };
        assert_eq!(rec.age(now), Duration::ZERO);
    }
}
