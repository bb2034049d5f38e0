//! presenced - presence sensing daemon
//!
//! This daemon:
//! 1. Reads probe-request lines from the capture subprocess (or a replay file)
//! 2. Folds parsed sightings into the TTL-evicted device registry
//! 3. Samples frames from the configured frame source
//! 4. Runs the enabled difference algorithms on each evaluation tick
//! 5. Publishes fusion blocks and sighting lines to the configured sinks

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use presence_kernel::{
    open_frame_source, CommandCapture, Coordinator, CoordinatorConfig, FileCapture, LineSource,
    LogSink, MqttSink, MqttSinkConfig, PresencedConfig, ReportSink, TrustStore, VendorTable,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Presence sensing daemon")]
struct Args {
    /// Replay capture lines from a saved text file instead of spawning the
    /// capture subprocess.
    #[arg(long, value_name = "PATH")]
    replay: Option<PathBuf>,

    /// Capture a baseline automatically from the first sampled frame,
    /// overriding the config.
    #[arg(long)]
    auto_baseline: bool,

    /// Disable the MQTT sink regardless of configuration.
    #[arg(long)]
    no_mqtt: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let cfg = PresencedConfig::load()?;
    log::info!(
        "presenced starting: interface={}, frame source={}, ttl={}s, tick={}s",
        cfg.capture.interface,
        cfg.camera.url,
        cfg.device_ttl.as_secs(),
        cfg.tick_interval.as_secs()
    );

    let trust = TrustStore::load(&cfg.trust_path);

    let mut vendors = VendorTable::builtin();
    vendors.extend(cfg.vendors.clone());

    let mut sinks: Vec<Box<dyn ReportSink>> = vec![Box::new(LogSink)];
    if cfg.mqtt.enabled && !args.no_mqtt {
        let sink = MqttSink::connect(&MqttSinkConfig {
            broker_addr: cfg.mqtt.broker_addr.clone(),
            topic: cfg.mqtt.topic.clone(),
            client_id: cfg.mqtt.client_id.clone(),
        })?;
        sinks.push(Box::new(sink));
    }

    let mut coordinator_cfg = CoordinatorConfig::from(&cfg);
    if args.auto_baseline {
        coordinator_cfg.auto_baseline = true;
    }
    let mut coordinator = Coordinator::new(coordinator_cfg, trust, vendors, sinks);

    let capture: Box<dyn LineSource> = match &args.replay {
        Some(path) => Box::new(FileCapture::open(path)?),
        None => Box::new(
            CommandCapture::spawn(&cfg.capture.command()).context("start capture subprocess")?,
        ),
    };
    coordinator.spawn_capture(capture)?;

    let frames = open_frame_source(&cfg.camera.url, cfg.camera.width, cfg.camera.height)?;
    coordinator.spawn_sampler(frames)?;

    // Cooperative shutdown: the handler only flips the shared flag; every
    // loop observes it at its next iteration boundary.
    let shutdown = coordinator.shutdown_handle();
    ctrlc::set_handler(move || {
        shutdown.request_shutdown();
    })
    .context("install signal handler")?;

    log::info!("presenced running");
    coordinator.run_until_shutdown();

    log::info!("presenced shutting down");
    coordinator.join();
    if coordinator.lines_dropped() > 0 {
        log::warn!(
            "{} capture line(s) dropped under backpressure",
            coordinator.lines_dropped()
        );
    }
    Ok(())
}
