//! Device registry.
//!
//! The authoritative, mutable set of currently-seen devices. Each mac moves
//! `Absent -> Present` on its first sighting, stays Present while sightings
//! keep refreshing it, and returns to Absent once its age exceeds the
//! configured timeout. The eviction sweep runs on the evaluation tick,
//! decoupled from sighting arrival; snapshots additionally filter by age so
//! presence at a query instant is exact regardless of sweep granularity.

use std::collections::HashMap;
use std::time::{Duration, SystemTime};

use crate::trust::TrustStore;
use crate::{DeviceRecord, Sighting};

#[derive(Clone, Debug)]
struct DeviceEntry {
    mac: String,
    vendor: String,
    signal_dbm: i32,
    last_seen: SystemTime,
}

/// Registry of currently-present devices, keyed by mac.
///
/// Not internally synchronized: the coordinator owns it and serializes every
/// mutation and snapshot.
#[derive(Default)]
pub struct DeviceRegistry {
    devices: HashMap<String, DeviceEntry>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one sighting into the registry.
    ///
    /// Creates the record on first sighting, refreshes signal and `last_seen`
    /// on subsequent ones. `last_seen` never rewinds: a commit carrying an
    /// older timestamp than the stored one refreshes the signal only.
    pub fn apply(&mut self, sighting: &Sighting, vendor: &str) {
        match self.devices.get_mut(&sighting.mac) {
            Some(entry) => {
                entry.signal_dbm = sighting.signal_dbm;
                if sighting.observed_at > entry.last_seen {
                    entry.last_seen = sighting.observed_at;
                }
            }
            None => {
                self.devices.insert(
                    sighting.mac.clone(),
                    DeviceEntry {
                        mac: sighting.mac.clone(),
                        vendor: vendor.to_string(),
                        signal_dbm: sighting.signal_dbm,
                        last_seen: sighting.observed_at,
                    },
                );
            }
        }
    }

    /// Remove every record whose age exceeds `ttl`. Returns the eviction
    /// count.
    pub fn sweep(&mut self, now: SystemTime, ttl: Duration) -> usize {
        let before = self.devices.len();
        self.devices.retain(|_, entry| !expired(entry, now, ttl));
        before - self.devices.len()
    }

    /// Immutable copy of all records Present at `now`.
    ///
    /// Records past `ttl` are excluded even if the sweep has not evicted them
    /// yet. Trust tags are re-evaluated against the live trust store on every
    /// snapshot, so a mid-session registration takes effect on the next tick.
    /// Output is sorted by mac for stable iteration downstream.
    pub fn snapshot(
        &self,
        now: SystemTime,
        ttl: Duration,
        trust: &TrustStore,
        tx_power_dbm: f64,
        path_loss_exponent: f64,
    ) -> Vec<DeviceRecord> {
        let mut records: Vec<DeviceRecord> = self
            .devices
            .values()
            .filter(|entry| !expired(entry, now, ttl))
            .map(|entry| DeviceRecord {
                mac: entry.mac.clone(),
                vendor: entry.vendor.clone(),
                signal_dbm: entry.signal_dbm,
                last_seen: entry.last_seen,
                trusted_name: trust.lookup(&entry.mac).map(str::to_string),
                estimated_distance_m: crate::rssi_to_distance(
                    entry.signal_dbm,
                    tx_power_dbm,
                    path_loss_exponent,
                ),
            })
            .collect();
        records.sort_by(|a, b| a.mac.cmp(&b.mac));
        records
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

fn expired(entry: &DeviceEntry, now: SystemTime, ttl: Duration) -> bool {
    match now.duration_since(entry.last_seen) {
        Ok(age) => age >= ttl,
        // last_seen in the future: not expired.
        Err(_) => false,
    }
}
