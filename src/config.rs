use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::detect::DiffMethod;
use crate::fusion::MethodSet;

const DEFAULT_TRUST_PATH: &str = "trusted_devices.txt";
const DEFAULT_CAPTURE_INTERFACE: &str = "en0";
const DEFAULT_CAPTURE_FILTER: &str = "type mgt subtype probe-req";
const DEFAULT_CAPTURE_BUFFER: u32 = 256;
const DEFAULT_LINE_QUEUE_CAPACITY: usize = 256;
const DEFAULT_FRAME_URL: &str = "stub://webcam";
const DEFAULT_FRAME_WIDTH: u32 = 854;
const DEFAULT_FRAME_HEIGHT: u32 = 480;
const DEFAULT_SAMPLE_INTERVAL_MS: u64 = 100;
const DEFAULT_DEVICE_TTL_SECS: u64 = 5;
const DEFAULT_TICK_INTERVAL_SECS: u64 = 3;
const DEFAULT_TX_POWER_DBM: f64 = -30.0;
const DEFAULT_PATH_LOSS_EXPONENT: f64 = 2.0;
const DEFAULT_MQTT_ADDR: &str = "127.0.0.1:1883";
const DEFAULT_MQTT_TOPIC: &str = "iot/detection";
const DEFAULT_MQTT_CLIENT_ID: &str = "presenced";

#[derive(Debug, Deserialize, Default)]
struct PresencedConfigFile {
    trust_path: Option<String>,
    capture: Option<CaptureConfigFile>,
    camera: Option<CameraConfigFile>,
    registry: Option<RegistryConfigFile>,
    evaluation: Option<EvaluationConfigFile>,
    radio: Option<RadioConfigFile>,
    mqtt: Option<MqttConfigFile>,
    vendors: Option<HashMap<String, String>>,
}

#[derive(Debug, Deserialize, Default)]
struct CaptureConfigFile {
    interface: Option<String>,
    filter: Option<String>,
    buffer_size: Option<u32>,
    /// Full capture command override; replaces the default tcpdump argv.
    command: Option<Vec<String>>,
    queue_capacity: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    url: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    sample_interval_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct RegistryConfigFile {
    device_ttl_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct EvaluationConfigFile {
    tick_interval_secs: Option<u64>,
    methods: Option<Vec<String>>,
    secure_location: Option<bool>,
    auto_baseline: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct RadioConfigFile {
    tx_power_dbm: Option<f64>,
    path_loss_exponent: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
struct MqttConfigFile {
    enabled: Option<bool>,
    broker_addr: Option<String>,
    topic: Option<String>,
    client_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PresencedConfig {
    pub trust_path: PathBuf,
    pub capture: CaptureSettings,
    pub camera: CameraSettings,
    pub device_ttl: Duration,
    pub tick_interval: Duration,
    pub methods: MethodSet,
    /// When set, device sighting lines are published to the sinks.
    pub secure_location: bool,
    /// Capture a baseline automatically from the first sampled frame.
    pub auto_baseline: bool,
    pub radio: RadioSettings,
    pub mqtt: MqttSettings,
    pub vendors: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct CaptureSettings {
    pub interface: String,
    pub filter: String,
    pub buffer_size: u32,
    pub command: Option<Vec<String>>,
    pub queue_capacity: usize,
}

impl CaptureSettings {
    /// The capture argv: the configured override, or the default tcpdump
    /// invocation built from interface, filter, and snapshot length.
    pub fn command(&self) -> Vec<String> {
        match &self.command {
            Some(cmd) => cmd.clone(),
            None => crate::capture::default_capture_command(
                &self.interface,
                &self.filter,
                self.buffer_size,
            ),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CameraSettings {
    pub url: String,
    pub width: u32,
    pub height: u32,
    pub sample_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct RadioSettings {
    pub tx_power_dbm: f64,
    pub path_loss_exponent: f64,
}

#[derive(Debug, Clone)]
pub struct MqttSettings {
    pub enabled: bool,
    pub broker_addr: String,
    pub topic: String,
    pub client_id: String,
}

impl PresencedConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("PRESENCE_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: PresencedConfigFile) -> Result<Self> {
        let trust_path = PathBuf::from(
            file.trust_path
                .unwrap_or_else(|| DEFAULT_TRUST_PATH.to_string()),
        );
        let capture = CaptureSettings {
            interface: file
                .capture
                .as_ref()
                .and_then(|c| c.interface.clone())
                .unwrap_or_else(|| DEFAULT_CAPTURE_INTERFACE.to_string()),
            filter: file
                .capture
                .as_ref()
                .and_then(|c| c.filter.clone())
                .unwrap_or_else(|| DEFAULT_CAPTURE_FILTER.to_string()),
            buffer_size: file
                .capture
                .as_ref()
                .and_then(|c| c.buffer_size)
                .unwrap_or(DEFAULT_CAPTURE_BUFFER),
            command: file.capture.as_ref().and_then(|c| c.command.clone()),
            queue_capacity: file
                .capture
                .as_ref()
                .and_then(|c| c.queue_capacity)
                .unwrap_or(DEFAULT_LINE_QUEUE_CAPACITY),
        };
        let camera = CameraSettings {
            url: file
                .camera
                .as_ref()
                .and_then(|c| c.url.clone())
                .unwrap_or_else(|| DEFAULT_FRAME_URL.to_string()),
            width: file
                .camera
                .as_ref()
                .and_then(|c| c.width)
                .unwrap_or(DEFAULT_FRAME_WIDTH),
            height: file
                .camera
                .as_ref()
                .and_then(|c| c.height)
                .unwrap_or(DEFAULT_FRAME_HEIGHT),
            sample_interval: Duration::from_millis(
                file.camera
                    .as_ref()
                    .and_then(|c| c.sample_interval_ms)
                    .unwrap_or(DEFAULT_SAMPLE_INTERVAL_MS),
            ),
        };
        let device_ttl = Duration::from_secs(
            file.registry
                .as_ref()
                .and_then(|r| r.device_ttl_secs)
                .unwrap_or(DEFAULT_DEVICE_TTL_SECS),
        );
        let tick_interval = Duration::from_secs(
            file.evaluation
                .as_ref()
                .and_then(|e| e.tick_interval_secs)
                .unwrap_or(DEFAULT_TICK_INTERVAL_SECS),
        );
        let methods = match file.evaluation.as_ref().and_then(|e| e.methods.as_ref()) {
            Some(keys) => parse_methods(keys.iter().map(String::as_str))?,
            None => MethodSet::all(),
        };
        let secure_location = file
            .evaluation
            .as_ref()
            .and_then(|e| e.secure_location)
            .unwrap_or(true);
        let auto_baseline = file
            .evaluation
            .as_ref()
            .and_then(|e| e.auto_baseline)
            .unwrap_or(false);
        let radio = RadioSettings {
            tx_power_dbm: file
                .radio
                .as_ref()
                .and_then(|r| r.tx_power_dbm)
                .unwrap_or(DEFAULT_TX_POWER_DBM),
            path_loss_exponent: file
                .radio
                .as_ref()
                .and_then(|r| r.path_loss_exponent)
                .unwrap_or(DEFAULT_PATH_LOSS_EXPONENT),
        };
        let mqtt = MqttSettings {
            enabled: file.mqtt.as_ref().and_then(|m| m.enabled).unwrap_or(true),
            broker_addr: file
                .mqtt
                .as_ref()
                .and_then(|m| m.broker_addr.clone())
                .unwrap_or_else(|| DEFAULT_MQTT_ADDR.to_string()),
            topic: file
                .mqtt
                .as_ref()
                .and_then(|m| m.topic.clone())
                .unwrap_or_else(|| DEFAULT_MQTT_TOPIC.to_string()),
            client_id: file
                .mqtt
                .as_ref()
                .and_then(|m| m.client_id.clone())
                .unwrap_or_else(|| DEFAULT_MQTT_CLIENT_ID.to_string()),
        };
        Ok(Self {
            trust_path,
            capture,
            camera,
            device_ttl,
            tick_interval,
            methods,
            secure_location,
            auto_baseline,
            radio,
            mqtt,
            vendors: file.vendors.unwrap_or_default(),
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(path) = std::env::var("PRESENCE_TRUST_PATH") {
            if !path.trim().is_empty() {
                self.trust_path = PathBuf::from(path);
            }
        }
        if let Ok(interface) = std::env::var("PRESENCE_CAPTURE_INTERFACE") {
            if !interface.trim().is_empty() {
                self.capture.interface = interface;
            }
        }
        if let Ok(url) = std::env::var("PRESENCE_FRAME_URL") {
            if !url.trim().is_empty() {
                self.camera.url = url;
            }
        }
        if let Ok(ttl) = std::env::var("PRESENCE_DEVICE_TTL_SECS") {
            let seconds: u64 = ttl.parse().map_err(|_| {
                anyhow!("PRESENCE_DEVICE_TTL_SECS must be an integer number of seconds")
            })?;
            self.device_ttl = Duration::from_secs(seconds);
        }
        if let Ok(tick) = std::env::var("PRESENCE_TICK_SECS") {
            let seconds: u64 = tick
                .parse()
                .map_err(|_| anyhow!("PRESENCE_TICK_SECS must be an integer number of seconds"))?;
            self.tick_interval = Duration::from_secs(seconds);
        }
        if let Ok(methods) = std::env::var("PRESENCE_METHODS") {
            let keys = split_csv(&methods);
            if !keys.is_empty() {
                self.methods = parse_methods(keys.iter().map(String::as_str))?;
            }
        }
        if let Ok(addr) = std::env::var("PRESENCE_MQTT_ADDR") {
            if !addr.trim().is_empty() {
                self.mqtt.broker_addr = addr;
            }
        }
        if let Ok(topic) = std::env::var("PRESENCE_MQTT_TOPIC") {
            if !topic.trim().is_empty() {
                self.mqtt.topic = topic;
            }
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        if self.device_ttl.is_zero() {
            return Err(anyhow!("device ttl must be greater than zero"));
        }
        if self.tick_interval.is_zero() {
            return Err(anyhow!("tick interval must be greater than zero"));
        }
        if self.camera.sample_interval.is_zero() {
            return Err(anyhow!("camera sample interval must be greater than zero"));
        }
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(anyhow!("camera dimensions must be greater than zero"));
        }
        if self.capture.queue_capacity == 0 {
            return Err(anyhow!("capture queue capacity must be greater than zero"));
        }
        if self.radio.path_loss_exponent <= 0.0 {
            return Err(anyhow!("path loss exponent must be positive"));
        }
        if let Some(cmd) = &self.capture.command {
            if cmd.is_empty() {
                return Err(anyhow!("capture command override must not be empty"));
            }
        }
        Ok(())
    }
}

fn parse_methods<'a>(keys: impl Iterator<Item = &'a str>) -> Result<MethodSet> {
    let mut methods = Vec::new();
    for key in keys {
        let method = DiffMethod::from_key(key.trim())
            .ok_or_else(|| anyhow!("unknown detection method: {}", key))?;
        methods.push(method);
    }
    Ok(MethodSet::from_methods(&methods))
}

fn read_config_file(path: &Path) -> Result<PresencedConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}
