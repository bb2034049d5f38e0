use std::sync::Mutex;
use std::time::Duration;

use tempfile::NamedTempFile;

use presence_kernel::config::PresencedConfig;
use presence_kernel::detect::DiffMethod;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "PRESENCE_CONFIG",
        "PRESENCE_TRUST_PATH",
        "PRESENCE_CAPTURE_INTERFACE",
        "PRESENCE_FRAME_URL",
        "PRESENCE_DEVICE_TTL_SECS",
        "PRESENCE_TICK_SECS",
        "PRESENCE_METHODS",
        "PRESENCE_MQTT_ADDR",
        "PRESENCE_MQTT_TOPIC",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "trust_path": "devices_prod.txt",
        "capture": {
            "interface": "wlan1",
            "filter": "type mgt subtype probe-req",
            "buffer_size": 512,
            "queue_capacity": 128
        },
        "camera": {
            "url": "stub://lab",
            "width": 640,
            "height": 360,
            "sample_interval_ms": 250
        },
        "registry": {
            "device_ttl_secs": 10
        },
        "evaluation": {
            "tick_interval_secs": 2,
            "methods": ["frame_diff", "contour"],
            "secure_location": false
        },
        "radio": {
            "tx_power_dbm": -25.0,
            "path_loss_exponent": 2.5
        },
        "mqtt": {
            "enabled": true,
            "broker_addr": "127.0.0.1:2883",
            "topic": "lab/detection"
        },
        "vendors": {
            "aa:bb:cc": "Acme Labs"
        }
    }"#;
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");

    std::env::set_var("PRESENCE_CONFIG", file.path());
    std::env::set_var("PRESENCE_CAPTURE_INTERFACE", "wlan2");
    std::env::set_var("PRESENCE_DEVICE_TTL_SECS", "7");

    let cfg = PresencedConfig::load().expect("load config");

    assert_eq!(cfg.trust_path.to_str().unwrap(), "devices_prod.txt");
    assert_eq!(cfg.capture.interface, "wlan2");
    assert_eq!(cfg.capture.buffer_size, 512);
    assert_eq!(cfg.capture.queue_capacity, 128);
    assert_eq!(cfg.camera.url, "stub://lab");
    assert_eq!(cfg.camera.width, 640);
    assert_eq!(cfg.camera.height, 360);
    assert_eq!(cfg.camera.sample_interval, Duration::from_millis(250));
    assert_eq!(cfg.device_ttl, Duration::from_secs(7));
    assert_eq!(cfg.tick_interval, Duration::from_secs(2));
    assert_eq!(cfg.methods.count(), 2);
    assert!(cfg.methods.is_enabled(DiffMethod::FrameDiff));
    assert!(cfg.methods.is_enabled(DiffMethod::Contour));
    assert!(!cfg.methods.is_enabled(DiffMethod::Ssim));
    assert!(!cfg.secure_location);
    assert!((cfg.radio.tx_power_dbm + 25.0).abs() < f64::EPSILON);
    assert_eq!(cfg.mqtt.broker_addr, "127.0.0.1:2883");
    assert_eq!(cfg.mqtt.topic, "lab/detection");
    assert_eq!(cfg.vendors.get("aa:bb:cc").map(String::as_str), Some("Acme Labs"));

    clear_env();
}

#[test]
fn defaults_apply_without_config_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = PresencedConfig::load().expect("load config");

    assert_eq!(cfg.trust_path.to_str().unwrap(), "trusted_devices.txt");
    assert_eq!(cfg.capture.interface, "en0");
    assert_eq!(cfg.device_ttl, Duration::from_secs(5));
    assert_eq!(cfg.tick_interval, Duration::from_secs(3));
    assert_eq!(cfg.methods.count(), 4);
    assert!(cfg.secure_location);
    assert_eq!(cfg.mqtt.topic, "iot/detection");

    clear_env();
}

#[test]
fn method_csv_env_override() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("PRESENCE_METHODS", "ssim, background_sub");
    let cfg = PresencedConfig::load().expect("load config");
    assert_eq!(cfg.methods.count(), 2);
    assert!(cfg.methods.is_enabled(DiffMethod::Ssim));
    assert!(cfg.methods.is_enabled(DiffMethod::BackgroundSub));

    clear_env();
}

#[test]
fn invalid_env_ttl_is_rejected() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("PRESENCE_DEVICE_TTL_SECS", "soon");
    assert!(PresencedConfig::load().is_err());

    clear_env();
}
