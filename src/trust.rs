//! Trust store.
//!
//! Durable registry of operator-acknowledged devices: one `mac,name` line per
//! entry, append-only. The file is created empty when absent and an unreadable
//! file degrades to an empty trust set rather than halting startup. Writes go
//! to the file first; the in-memory map is only updated after the append
//! succeeds, so a failed registration leaves both views consistent.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// In-memory mirror of the durable trust file.
///
/// Not internally synchronized: the coordinator serializes lookups and
/// registrations under its own exclusion, which also covers the registry
/// snapshots that consult this store.
pub struct TrustStore {
    path: PathBuf,
    entries: HashMap<String, String>,
}

impl TrustStore {
    /// Load the trust file, creating it empty when absent.
    ///
    /// Never fails: an unreadable file is logged and treated as an empty
    /// trust set. Registration against such a store will surface write
    /// errors to the operator action that triggered it.
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            if let Err(e) = File::create(path) {
                log::warn!(
                    "could not create trust store {}: {} (starting with empty trust set)",
                    path.display(),
                    e
                );
            }
        }

        let entries = match File::open(path) {
            Ok(file) => parse_trust_lines(BufReader::new(file)),
            Err(e) => {
                log::warn!(
                    "could not read trust store {}: {} (starting with empty trust set)",
                    path.display(),
                    e
                );
                HashMap::new()
            }
        };

        log::info!(
            "trust store {}: {} device(s)",
            path.display(),
            entries.len()
        );
        Self {
            path: path.to_path_buf(),
            entries,
        }
    }

    /// In-memory store with no durable backing, for tests.
    #[cfg(test)]
    pub(crate) fn in_memory(entries: HashMap<String, String>) -> Self {
        Self {
            path: PathBuf::new(),
            entries,
        }
    }

    pub fn contains(&self, mac: &str) -> bool {
        self.entries.contains_key(mac)
    }

    pub fn lookup(&self, mac: &str) -> Option<&str> {
        self.entries.get(mac).map(String::as_str)
    }

    /// Register a device. Returns `Ok(false)` without touching anything when
    /// the mac is already trusted; otherwise appends the durable record and
    /// then updates the in-memory map.
    pub fn register(&mut self, mac: &str, name: &str) -> Result<bool> {
        if self.entries.contains_key(mac) {
            return Ok(false);
        }

        let mut file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .with_context(|| format!("failed to open trust store {}", self.path.display()))?;
        writeln!(file, "{},{}", mac, name)
            .with_context(|| format!("failed to append to trust store {}", self.path.display()))?;

        self.entries.insert(mac.to_string(), name.to_string());
        Ok(true)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn parse_trust_lines<R: BufRead>(reader: R) -> HashMap<String, String> {
    let mut entries = HashMap::new();
    for line in reader.lines().map_while(|l| l.ok()) {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let (mac, name) = match line.split_once(',') {
            Some((mac, name)) => (mac.trim(), name.trim()),
            None => (line, ""),
        };
        entries.insert(mac.to_string(), name.to_string());
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn load_creates_missing_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("trusted_devices.txt");
        let store = TrustStore::load(&path);
        assert!(path.exists());
        assert!(store.is_empty());
    }

    #[test]
    fn load_parses_entries_and_blank_names() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("trusted_devices.txt");
        std::fs::write(
            &path,
            "4c:23:1a:05:bd:d4,Alice\n\naa:bb:cc:dd:ee:ff,\nbad-line-without-comma\n",
        )
        .expect("write");

        let store = TrustStore::load(&path);
        assert_eq!(store.lookup("4c:23:1a:05:bd:d4"), Some("Alice"));
        assert_eq!(store.lookup("aa:bb:cc:dd:ee:ff"), Some(""));
        assert!(store.contains("bad-line-without-comma"));
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn register_appends_and_updates_map() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("trusted_devices.txt");
        let mut store = TrustStore::load(&path);

        assert!(store.register("4c:23:1a:05:bd:d4", "Alice").expect("register"));
        assert_eq!(store.lookup("4c:23:1a:05:bd:d4"), Some("Alice"));

        let mut contents = String::new();
        File::open(&path)
            .expect("open")
            .read_to_string(&mut contents)
            .expect("read");
        assert_eq!(contents, "4c:23:1a:05:bd:d4,Alice\n");
    }

    #[test]
    fn register_is_idempotent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("trusted_devices.txt");
        let mut store = TrustStore::load(&path);

        assert!(store.register("4c:23:1a:05:bd:d4", "Alice").expect("register"));
        assert!(!store.register("4c:23:1a:05:bd:d4", "Mallory").expect("register"));

        // Durable store size and in-memory map are unchanged by the duplicate.
        assert_eq!(store.len(), 1);
        assert_eq!(store.lookup("4c:23:1a:05:bd:d4"), Some("Alice"));
        let contents = std::fs::read_to_string(&path).expect("read");
        assert_eq!(contents.lines().count(), 1);
    }

    #[test]
    fn failed_append_leaves_map_untouched() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("trusted_devices.txt");
        let mut store = TrustStore::load(&path);

        // Point the store at a path that cannot be opened for append.
        store.path = dir.path().join("missing").join("trusted_devices.txt");
        assert!(store.register("aa:bb:cc:dd:ee:ff", "Bob").is_err());
        assert!(!store.contains("aa:bb:cc:dd:ee:ff"));
    }

    #[test]
    fn unreadable_store_degrades_to_empty() {
        // A directory path cannot be read as a file.
        let dir = tempfile::tempdir().expect("tempdir");
        let store = TrustStore::load(dir.path());
        assert!(store.is_empty());
    }
}
