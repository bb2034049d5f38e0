//! Downstream wire lines and report sinks.
//!
//! Two record shapes leave the core: the free-space block rendered by the
//! fusion module, and one line per device sighting tagged `[TRUSTED]` or
//! `[NOT TRUSTED]`. The exact label strings and line shapes are consumed by
//! an external analysis collaborator and must be reproduced verbatim.

use anyhow::Result;
use chrono::{DateTime, Local};
use std::time::SystemTime;

use crate::DeviceRecord;

/// Format one device sighting line.
///
/// Trusted devices carry their operator-assigned name in addition to the
/// vendor; untrusted ones carry the vendor only.
pub fn format_sighting_line(record: &DeviceRecord) -> String {
    match &record.trusted_name {
        Some(name) => format!(
            "[TRUSTED] MAC: {}, Name: {}, Vendor: {}, Signal: {} dBm, Time: {}",
            record.mac,
            name,
            record.vendor,
            record.signal_dbm,
            ctime(record.last_seen)
        ),
        None => format!(
            "[NOT TRUSTED] MAC: {}, Vendor: {}, Signal: {} dBm, Time: {}",
            record.mac,
            record.vendor,
            record.signal_dbm,
            ctime(record.last_seen)
        ),
    }
}

/// ctime-style local timestamp, e.g. `Thu Aug  6 12:03:09 2026`.
fn ctime(t: SystemTime) -> String {
    DateTime::<Local>::from(t)
        .format("%a %b %e %H:%M:%S %Y")
        .to_string()
}

/// Consumer of wire-format text records.
///
/// Sinks run on the coordinator's cadence and must not block it for long; a
/// failed publish is surfaced to the caller, logged, and does not stop
/// subsequent ticks.
pub trait ReportSink: Send + Sync {
    fn publish(&self, message: &str) -> Result<()>;

    /// Short name for failure logging.
    fn name(&self) -> &str;
}

/// Sink that writes records through the process logger.
pub struct LogSink;

impl ReportSink for LogSink {
    fn publish(&self, message: &str) -> Result<()> {
        log::info!(target: "detection", "{}", message);
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }
}
