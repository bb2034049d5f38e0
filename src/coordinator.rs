//! Coordinator.
//!
//! Owns the concurrency contract: capture parsing and frame sampling run as
//! independent producers, registry and frame mutation is serialized behind
//! one mutex, and consumers get immutable snapshots on a fixed evaluation
//! cadence.
//!
//! Discipline:
//! - Producers parse and decode outside the lock; they lock only to commit.
//! - The raw line reader and the parse/commit loop are decoupled by a bounded
//!   channel; when the committer falls behind, excess lines are dropped and
//!   counted rather than backing the reader up.
//! - Readers (the tick, snapshot callers) copy state under the lock and
//!   compute outside it.
//! - Shutdown is a checked flag, observed at every iteration boundary; no
//!   producer is interrupted mid-mutation.
//! - A failed capture line, sample, or sink publish never stops the other
//!   producers or the next tick.

use anyhow::Result;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::{Duration, Instant, SystemTime};

use crate::capture::parser::parse_capture_line;
use crate::capture::vendor::VendorTable;
use crate::capture::LineSource;
use crate::config::PresencedConfig;
use crate::frame::{FrameSource, ImageFrame};
use crate::fusion::{render_report, FusionEngine, MethodSet, BASELINE_UNAVAILABLE};
use crate::registry::DeviceRegistry;
use crate::report::{format_sighting_line, ReportSink};
use crate::trust::TrustStore;
use crate::{DeviceRecord, Sighting};

/// Coordinator tuning knobs, typically derived from [`PresencedConfig`].
#[derive(Clone, Debug)]
pub struct CoordinatorConfig {
    pub device_ttl: Duration,
    pub tick_interval: Duration,
    pub sample_interval: Duration,
    pub line_queue_capacity: usize,
    pub methods: MethodSet,
    pub secure_location: bool,
    pub auto_baseline: bool,
    pub tx_power_dbm: f64,
    pub path_loss_exponent: f64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            device_ttl: Duration::from_secs(5),
            tick_interval: Duration::from_secs(3),
            sample_interval: Duration::from_millis(100),
            line_queue_capacity: 256,
            methods: MethodSet::all(),
            secure_location: true,
            auto_baseline: false,
            tx_power_dbm: -30.0,
            path_loss_exponent: 2.0,
        }
    }
}

impl From<&PresencedConfig> for CoordinatorConfig {
    fn from(cfg: &PresencedConfig) -> Self {
        Self {
            device_ttl: cfg.device_ttl,
            tick_interval: cfg.tick_interval,
            sample_interval: cfg.camera.sample_interval,
            line_queue_capacity: cfg.capture.queue_capacity,
            methods: cfg.methods,
            secure_location: cfg.secure_location,
            auto_baseline: cfg.auto_baseline,
            tx_power_dbm: cfg.radio.tx_power_dbm,
            path_loss_exponent: cfg.radio.path_loss_exponent,
        }
    }
}

/// State exclusively owned by the coordinator. Never exposed live; all reads
/// go through snapshot-returning accessors.
struct SharedState {
    registry: DeviceRegistry,
    trust: TrustStore,
    current_frame: Option<ImageFrame>,
    baseline_frame: Option<ImageFrame>,
    secure_location: bool,
}

struct Core {
    cfg: CoordinatorConfig,
    vendors: VendorTable,
    sinks: Vec<Box<dyn ReportSink>>,
    state: Mutex<SharedState>,
    shutdown: AtomicBool,
    lines_dropped: AtomicU64,
    sightings_committed: AtomicU64,
    frames_committed: AtomicU64,
}

impl Core {
    /// Narrow lock helper. A poisoned lock is recovered: every critical
    /// section here is a single complete commit, so the state a panicking
    /// holder left behind is still consistent.
    fn lock_state(&self) -> MutexGuard<'_, SharedState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn commit_sighting(&self, sighting: Sighting) {
        let vendor = self.vendors.label_for_mac(&sighting.mac).to_string();
        let (announce, record) = {
            let mut st = self.lock_state();
            st.registry.apply(&sighting, &vendor);
            let trusted_name = st.trust.lookup(&sighting.mac).map(str::to_string);
            let record = DeviceRecord {
                mac: sighting.mac.clone(),
                vendor,
                signal_dbm: sighting.signal_dbm,
                last_seen: sighting.observed_at,
                trusted_name,
                estimated_distance_m: crate::rssi_to_distance(
                    sighting.signal_dbm,
                    self.cfg.tx_power_dbm,
                    self.cfg.path_loss_exponent,
                ),
            };
            (st.secure_location, record)
        };
        self.sightings_committed.fetch_add(1, Ordering::Relaxed);
        if announce {
            self.publish(&format_sighting_line(&record));
        }
    }

    fn commit_frame(&self, frame: ImageFrame) {
        {
            let mut st = self.lock_state();
            if self.cfg.auto_baseline && st.baseline_frame.is_none() {
                st.baseline_frame = Some(frame.clone());
                log::info!("baseline captured automatically from first sample");
            }
            st.current_frame = Some(frame);
        }
        self.frames_committed.fetch_add(1, Ordering::Relaxed);
    }

    fn evaluate_tick(&self) -> Result<()> {
        let now = SystemTime::now();
        let (baseline, current) = {
            let mut st = self.lock_state();
            let evicted = st.registry.sweep(now, self.cfg.device_ttl);
            if evicted > 0 {
                log::debug!("evicted {} stale device(s)", evicted);
            }
            (st.baseline_frame.clone(), st.current_frame.clone())
        };

        // Image work happens outside the lock; it is bounded by frame size
        // but still far too slow to hold producers up for.
        let block = match (baseline, current) {
            (Some(baseline), Some(current)) => {
                let report = FusionEngine::new(self.cfg.methods).evaluate(&baseline, &current)?;
                render_report(&report)
            }
            _ => BASELINE_UNAVAILABLE.to_string(),
        };
        self.publish(&block);
        Ok(())
    }

    fn publish(&self, message: &str) {
        for sink in &self.sinks {
            if let Err(e) = sink.publish(message) {
                log::warn!("sink {} failed: {}", sink.name(), e);
            }
        }
    }
}

/// Owner of registry, frames, and producer threads.
pub struct Coordinator {
    core: Arc<Core>,
    handles: Vec<JoinHandle<()>>,
}

impl Coordinator {
    pub fn new(
        cfg: CoordinatorConfig,
        trust: TrustStore,
        vendors: VendorTable,
        sinks: Vec<Box<dyn ReportSink>>,
    ) -> Self {
        let secure_location = cfg.secure_location;
        Self {
            core: Arc::new(Core {
                cfg,
                vendors,
                sinks,
                state: Mutex::new(SharedState {
                    registry: DeviceRegistry::new(),
                    trust,
                    current_frame: None,
                    baseline_frame: None,
                    secure_location,
                }),
                shutdown: AtomicBool::new(false),
                lines_dropped: AtomicU64::new(0),
                sightings_committed: AtomicU64::new(0),
                frames_committed: AtomicU64::new(0),
            }),
            handles: Vec::new(),
        }
    }

    // ------------------------------------------------------------------
    // Producers
    // ------------------------------------------------------------------

    /// Start the capture pipeline: a reader thread feeding a bounded line
    /// queue and a committer thread that parses and applies sightings.
    pub fn spawn_capture(&mut self, source: Box<dyn LineSource>) -> Result<()> {
        let (tx, rx) = bounded::<String>(self.core.cfg.line_queue_capacity);

        let core = Arc::clone(&self.core);
        self.handles.push(
            std::thread::Builder::new()
                .name("capture-reader".into())
                .spawn(move || run_line_reader(source, tx, core))?,
        );

        let core = Arc::clone(&self.core);
        self.handles.push(
            std::thread::Builder::new()
                .name("capture-commit".into())
                .spawn(move || run_line_committer(rx, core))?,
        );
        Ok(())
    }

    /// Start the frame sampler thread.
    pub fn spawn_sampler(&mut self, source: Box<dyn FrameSource>) -> Result<()> {
        let core = Arc::clone(&self.core);
        self.handles.push(
            std::thread::Builder::new()
                .name("frame-sampler".into())
                .spawn(move || run_frame_sampler(source, core))?,
        );
        Ok(())
    }

    // ------------------------------------------------------------------
    // Operator actions and snapshots
    // ------------------------------------------------------------------

    /// Copy the current frame into the baseline slot. Returns false when no
    /// frame has been sampled yet.
    pub fn capture_baseline(&self) -> bool {
        let mut st = self.core.lock_state();
        match st.current_frame.clone() {
            Some(frame) => {
                st.baseline_frame = Some(frame);
                true
            }
            None => false,
        }
    }

    /// Toggle publication of device sighting lines.
    pub fn set_secure_location(&self, on: bool) {
        self.core.lock_state().secure_location = on;
    }

    /// Register a trusted device. Serialized with every lookup; the durable
    /// append happens under the same exclusion. A failed write surfaces here
    /// and leaves the in-memory trust set unchanged.
    pub fn register_trust(&self, mac: &str, name: &str) -> Result<bool> {
        self.core.lock_state().trust.register(mac, name)
    }

    /// Immutable copy of all currently-present devices.
    pub fn registry_snapshot(&self) -> Vec<DeviceRecord> {
        let now = SystemTime::now();
        let st = self.core.lock_state();
        st.registry.snapshot(
            now,
            self.core.cfg.device_ttl,
            &st.trust,
            self.core.cfg.tx_power_dbm,
            self.core.cfg.path_loss_exponent,
        )
    }

    /// Apply one sighting directly. Producers normally feed sightings via
    /// the capture pipeline; this is the same commit path.
    pub fn commit_sighting(&self, sighting: Sighting) {
        self.core.commit_sighting(sighting);
    }

    /// Replace the current frame directly. Same commit path as the sampler.
    pub fn commit_frame(&self, frame: ImageFrame) {
        self.core.commit_frame(frame);
    }

    /// Run one evaluation tick: eviction sweep, fusion over the current
    /// frame pair, and publication to every sink.
    pub fn evaluate_tick(&self) -> Result<()> {
        self.core.evaluate_tick()
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Ask every producer and the tick loop to stop at their next iteration
    /// boundary.
    pub fn request_shutdown(&self) {
        self.core.shutdown.store(true, Ordering::Relaxed);
    }

    /// Cloneable handle for signal handlers and other observers that need to
    /// request shutdown without owning the coordinator.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            core: Arc::clone(&self.core),
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.core.shutdown.load(Ordering::Relaxed)
    }

    /// Drive evaluation ticks on the calling thread until shutdown.
    pub fn run_until_shutdown(&self) {
        let mut next_tick = Instant::now();
        while !self.is_shutdown() {
            if Instant::now() >= next_tick {
                if let Err(e) = self.core.evaluate_tick() {
                    log::error!("evaluation tick failed: {}", e);
                }
                next_tick = Instant::now() + self.core.cfg.tick_interval;
            }
            std::thread::sleep(Duration::from_millis(50));
        }
    }

    /// Join all producer threads. Call after `request_shutdown`.
    pub fn join(&mut self) {
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }

    /// Lines dropped because the committer fell behind the capture source.
    pub fn lines_dropped(&self) -> u64 {
        self.core.lines_dropped.load(Ordering::Relaxed)
    }

    pub fn sightings_committed(&self) -> u64 {
        self.core.sightings_committed.load(Ordering::Relaxed)
    }

    pub fn frames_committed(&self) -> u64 {
        self.core.frames_committed.load(Ordering::Relaxed)
    }
}

/// Requests coordinator shutdown from another thread.
#[derive(Clone)]
pub struct ShutdownHandle {
    core: Arc<Core>,
}

impl ShutdownHandle {
    pub fn request_shutdown(&self) {
        self.core.shutdown.store(true, Ordering::Relaxed);
    }
}

// ----------------------------------------------------------------------------
// Producer loops
// ----------------------------------------------------------------------------

fn run_line_reader(mut source: Box<dyn LineSource>, tx: Sender<String>, core: Arc<Core>) {
    let description = source.describe();
    loop {
        if core.shutdown.load(Ordering::Relaxed) {
            break;
        }
        match source.next_line() {
            Ok(Some(line)) => match tx.try_send(line) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    core.lines_dropped.fetch_add(1, Ordering::Relaxed);
                }
                Err(TrySendError::Disconnected(_)) => break,
            },
            Ok(None) => {
                log::info!("capture source {} reached end of stream", description);
                break;
            }
            Err(e) => {
                log::warn!("capture source {} failed: {}", description, e);
                break;
            }
        }
    }
    // Dropping the sender lets the committer drain and exit.
}

fn run_line_committer(rx: Receiver<String>, core: Arc<Core>) {
    loop {
        if core.shutdown.load(Ordering::Relaxed) {
            break;
        }
        match rx.recv_timeout(Duration::from_millis(200)) {
            Ok(line) => {
                // Parsing happens here, outside any lock; a line without
                // both markers is the common case and is simply dropped.
                if let Some(sighting) = parse_capture_line(&line, SystemTime::now()) {
                    core.commit_sighting(sighting);
                }
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}

fn run_frame_sampler(mut source: Box<dyn FrameSource>, core: Arc<Core>) {
    loop {
        if core.shutdown.load(Ordering::Relaxed) {
            break;
        }
        match source.next_frame() {
            Ok(frame) => core.commit_frame(frame),
            Err(e) => {
                // Skip this sample; the previous current frame is retained.
                log::warn!("frame sample failed: {}", e);
            }
        }
        std::thread::sleep(core.cfg.sample_interval);
    }
}
