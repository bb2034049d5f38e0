//! Probe-request line parser.
//!
//! Each line of the capture stream may carry a source MAC after a literal
//! `SA:` marker and a signal token of the form `-NNdBm signal`. A line with
//! both markers yields one [`Sighting`]; anything else is a normal no-match,
//! not an error. Malformed and irrelevant lines are the dominant case on a
//! busy channel.

use regex::Regex;
use std::sync::OnceLock;
use std::time::SystemTime;

use crate::Sighting;

fn mac_re() -> &'static Regex {
    static MAC_RE: OnceLock<Regex> = OnceLock::new();
    MAC_RE.get_or_init(|| Regex::new(r"SA:([0-9a-fA-F:]+)").unwrap())
}

fn signal_re() -> &'static Regex {
    static SIGNAL_RE: OnceLock<Regex> = OnceLock::new();
    SIGNAL_RE.get_or_init(|| Regex::new(r"(-\d+)dBm signal").unwrap())
}

/// Parse one capture line into a sighting.
///
/// Returns `None` when either marker is missing or the signal token does not
/// fit an `i32`. The MAC is normalized to lower case; `observed_at` is the
/// caller-supplied parse-time wall clock.
pub fn parse_capture_line(line: &str, at: SystemTime) -> Option<Sighting> {
    let mac = mac_re().captures(line)?.get(1)?.as_str().to_lowercase();
    let signal_dbm: i32 = signal_re().captures(line)?.get(1)?.as_str().parse().ok()?;
    Some(Sighting {
        mac,
        signal_dbm,
        observed_at: at,
    })
}
