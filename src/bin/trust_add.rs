//! trust_add - register a trusted device
//!
//! Appends one `mac,name` entry to the trust store. Registration is
//! idempotent: a mac already in the store is left untouched.

use anyhow::{anyhow, Result};
use clap::Parser;
use regex::Regex;
use std::path::PathBuf;

use presence_kernel::TrustStore;

#[derive(Parser, Debug)]
#[command(author, version, about = "Register a trusted device")]
struct Args {
    /// Device MAC address (six colon-separated octets).
    mac: String,

    /// Display name for the device.
    name: String,

    /// Path to the trust store file.
    #[arg(
        long,
        env = "PRESENCE_TRUST_PATH",
        default_value = "trusted_devices.txt"
    )]
    trust_path: PathBuf,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();

    let mac = args.mac.to_lowercase();
    let mac_re = Regex::new(r"^([0-9a-f]{2}:){5}[0-9a-f]{2}$").expect("static regex");
    if !mac_re.is_match(&mac) {
        return Err(anyhow!("not a MAC address: {}", args.mac));
    }
    if args.name.contains(',') || args.name.contains('\n') {
        return Err(anyhow!("device name must not contain commas or newlines"));
    }

    let mut store = TrustStore::load(&args.trust_path);
    if store.register(&mac, args.name.trim())? {
        println!("registered {} as {:?}", mac, args.name.trim());
    } else {
        println!(
            "{} is already trusted as {:?}",
            mac,
            store.lookup(&mac).unwrap_or_default()
        );
    }
    Ok(())
}
