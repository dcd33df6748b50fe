use std::sync::Mutex;
use std::time::Duration;

use tempfile::NamedTempFile;

use headcount::config::CounterConfig;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "HEADCOUNT_CONFIG",
        "HEADCOUNT_SOURCE_URL",
        "HEADCOUNT_DEVICE_NAME",
        "HEADCOUNT_DB_URL",
        "HEADCOUNT_SCALE_PERCENT",
        "HEADCOUNT_DEBUG",
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
        "source": {
            "url": "http://camera-1/stream",
            "target_fps": 12,
            "width": 800,
            "height": 600,
            "scale_percent": 50
        },
        "preview": {
            "enabled": true,
            "path": "live.jpg"
        },
        "record": {
            "image_interval_secs": 600,
            "image_dir": "stills"
        },
        "inference": {
            "interval_secs": 60,
            "point_threshold": 7
        },
        "remote": {
            "enabled": true,
            "base_url": "https://counter.example.com/status",
            "device_name": "lobby-cam",
            "utc_offset_hours": 2
        }
    }"#;
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");

    std::env::set_var("HEADCOUNT_CONFIG", file.path());
    std::env::set_var("HEADCOUNT_DEVICE_NAME", "rear-cam");
    std::env::set_var("HEADCOUNT_SCALE_PERCENT", "25");

    let cfg = CounterConfig::load().expect("load config");

    assert_eq!(cfg.source.url, "http://camera-1/stream");
    assert_eq!(cfg.source.target_fps, 12);
    assert_eq!(cfg.source.width, 800);
    assert_eq!(cfg.source.height, 600);
    assert_eq!(cfg.source.scale_percent, 25);
    assert!(cfg.preview.enabled);
    assert_eq!(cfg.preview.path.to_str().unwrap(), "live.jpg");
    assert_eq!(cfg.record.image_interval, Duration::from_secs(600));
    assert_eq!(cfg.record.image_dir.to_str().unwrap(), "stills");
    assert_eq!(cfg.inference.interval, Duration::from_secs(60));
    assert_eq!(cfg.inference.point_threshold, 7);
    assert!(cfg.remote.enabled);
    assert_eq!(
        cfg.remote.base_url.as_deref(),
        Some("https://counter.example.com/status")
    );
    assert_eq!(cfg.remote.device_name, "rear-cam");
    assert_eq!(cfg.remote.utc_offset_hours, 2);

    clear_env();
}

#[test]
fn defaults_apply_without_config_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = CounterConfig::load().expect("load defaults");

    assert_eq!(cfg.source.url, "stub://camera");
    assert_eq!(cfg.source.scale_percent, 100);
    assert_eq!(cfg.inference.interval, Duration::from_secs(120));
    assert_eq!(cfg.inference.point_threshold, 5);
    assert_eq!(cfg.inference.backend, "stub");
    assert_eq!(cfg.record.image_interval, Duration::from_secs(1800));
    assert!(!cfg.remote.enabled);
    assert_eq!(cfg.remote.utc_offset_hours, 8);
    // No preview or recording consumer, capture idles down.
    assert_eq!(cfg.source.target_fps, 1);

    clear_env();
}

#[test]
fn debug_mode_tightens_cadence_and_disables_remote() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("HEADCOUNT_DB_URL", "https://counter.example.com/status");
    std::env::set_var("HEADCOUNT_DEBUG", "1");

    let cfg = CounterConfig::load().expect("load debug config");

    assert!(cfg.inference.debug);
    assert_eq!(cfg.inference.interval, Duration::from_secs(5));
    assert_eq!(cfg.record.image_interval, Duration::from_secs(5));
    assert_eq!(
        cfg.record.image_dir.to_str().unwrap(),
        "captured_debug_images"
    );
    assert!(!cfg.remote.enabled);

    clear_env();
}

#[test]
fn rejects_invalid_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("HEADCOUNT_SCALE_PERCENT", "150");
    assert!(CounterConfig::load().is_err());
    std::env::set_var("HEADCOUNT_SCALE_PERCENT", "50");

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{ "inference": { "backend": "opencv" } }"#;
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");
    std::env::set_var("HEADCOUNT_CONFIG", file.path());
    assert!(CounterConfig::load().is_err());

    clear_env();
}
