//! Vendor prefix table.
//!
//! Maps the first three octets of a MAC address to a vendor label. The
//! built-in entries cover the handsets this deployment has actually seen;
//! additional prefixes come from configuration.

use std::collections::HashMap;

use crate::VENDOR_PREFIX_LEN;

/// Label returned on a prefix-table miss.
pub const UNKNOWN_VENDOR: &str = "Unknown";

const BUILTIN_VENDORS: &[(&str, &str)] = &[
    ("94:9b:2c", "Samsung Electronics"),
    ("b8:50:01", "Apple, Inc."),
    ("6e:5d:06", "Huawei Technologies"),
    ("b6:6a:f3", "Xiaomi Communications"),
    ("62:05:5a", "OPPO Electronics"),
    ("fa:62:37", "OnePlus Technology"),
    ("26:09:a8", "Motorola Mobility"),
    ("b6:77:d5", "Won Suk CHO"),
];

/// Prefix-to-vendor lookup table.
#[derive(Clone, Debug)]
pub struct VendorTable {
    entries: HashMap<String, String>,
}

impl VendorTable {
    /// Table with only the built-in entries.
    pub fn builtin() -> Self {
        let entries = BUILTIN_VENDORS
            .iter()
            .map(|(prefix, vendor)| (prefix.to_string(), vendor.to_string()))
            .collect();
        Self { entries }
    }

    /// Empty table, for tests that want full control over misses.
    pub fn empty() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Add or replace entries. Prefixes are normalized to lower case.
    pub fn extend<I>(&mut self, entries: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (prefix, vendor) in entries {
            self.entries.insert(prefix.to_lowercase(), vendor);
        }
    }

    /// Vendor label for a prefix, `UNKNOWN_VENDOR` on miss.
    pub fn label(&self, prefix: &str) -> &str {
        self.entries
            .get(prefix)
            .map(String::as_str)
            .unwrap_or(UNKNOWN_VENDOR)
    }

    /// Vendor label for a full (lower-case) MAC address.
    pub fn label_for_mac(&self, mac: &str) -> &str {
        let end = mac.len().min(VENDOR_PREFIX_LEN);
        self.label(&mac[..end])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_prefix_resolves() {
        let table = VendorTable::builtin();
        assert_eq!(table.label("b8:50:01"), "Apple, Inc.");
        assert_eq!(table.label_for_mac("b8:50:01:12:34:56"), "Apple, Inc.");
    }

    #[test]
    fn miss_is_unknown() {
        let table = VendorTable::builtin();
        assert_eq!(table.label("00:00:00"), UNKNOWN_VENDOR);
        assert_eq!(table.label_for_mac("de:ad"), UNKNOWN_VENDOR);
    }

    #[test]
    fn extend_overrides_and_normalizes() {
        let mut table = VendorTable::empty();
        table.extend([("AA:BB:CC".to_string(), "Acme Labs".to_string())]);
        assert_eq!(table.label("aa:bb:cc"), "Acme Labs");
    }
}
