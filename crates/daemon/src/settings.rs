//! Daemon settings

use std::path::{Path, PathBuf};

use hazard_detect::RulesConfig;
use monitor::MonitorConfig;
use serde::{Deserialize, Serialize};

/// Environment variable naming the settings file
pub const CONFIG_PATH_ENV: &str = "SITE_MONITOR_CONFIG";

/// Settings file used when `SITE_MONITOR_CONFIG` is unset
pub const DEFAULT_CONFIG_PATH: &str = "config/site-monitor.toml";

/// Top-level daemon settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// SQLite connection URL for alarm records
    pub database_url: String,

    pub max_connections: u32,

    /// Directory evidence images are written to
    pub evidence_dir: PathBuf,

    /// Public path prefix stored with each alarm
    pub evidence_url_prefix: String,

    /// Pre-computed object detections (JSON, keyed by frame sequence)
    pub detections_file: Option<PathBuf>,

    pub monitor: MonitorConfig,

    pub rules: RulesConfig,

    /// Cameras started at boot
    pub cameras: Vec<CameraSettings>,

    pub log: LogSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_url: "sqlite://site-monitor.db".to_string(),
            max_connections: 5,
            evidence_dir: PathBuf::from("static/alarms"),
            evidence_url_prefix: "/static/alarms".to_string(),
            detections_file: None,
            monitor: MonitorConfig::default(),
            rules: RulesConfig::default(),
            cameras: Vec::new(),
            log: LogSettings::default(),
        }
    }
}

/// One camera backed by a directory of stills
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraSettings {
    pub device_id: String,

    pub frames_dir: PathBuf,

    /// Comma-separated hazard names, e.g. `"helmet,hole_curb"`
    pub hazards: String,

    /// Restart from the first still when the directory is exhausted
    #[serde(default)]
    pub looping: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// trace, debug, info, warn or error
    pub level: String,

    /// Emit JSON lines instead of human readable output
    pub json: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl Settings {
    /// Load from an optional TOML file, then `SITE_MONITOR__*` variables.
    ///
    /// Nested keys use a double underscore: `SITE_MONITOR__MONITOR__SAMPLE_EVERY=10`.
    pub fn load(path: Option<&Path>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("SITE_MONITOR")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }

    /// Load using `SITE_MONITOR_CONFIG` or the default path
    pub fn from_env() -> Result<Self, config::ConfigError> {
        let path = std::env::var_os(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
        Self::load(Some(&path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.database_url, "sqlite://site-monitor.db");
        assert_eq!(settings.evidence_url_prefix, "/static/alarms");
        assert_eq!(settings.monitor.sample_every, 5);
        assert_eq!(settings.log.level, "info");
        assert!(settings.cameras.is_empty());
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load(Some(&dir.path().join("absent.toml"))).unwrap();
        assert_eq!(settings.max_connections, 5);
        assert_eq!(settings.monitor.policy.cooldown_secs, 5);
    }

    #[test]
    fn test_load_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("site.toml");
        std::fs::write(
            &path,
            r#"
database_url = "sqlite://alarms.db"
evidence_dir = "/var/lib/site-monitor/alarms"

[monitor]
sample_every = 10

[monitor.policy]
cooldown_secs = 30
cooldown_scope = "hazard"

[rules]
min_confidence = 0.6

[[cameras]]
device_id = "gate-1"
frames_dir = "/data/gate-1"
hazards = "helmet,hole_curb"
looping = true

[log]
json = true
"#,
        )
        .unwrap();

        let settings = Settings::load(Some(&path)).unwrap();
        assert_eq!(settings.database_url, "sqlite://alarms.db");
        assert_eq!(settings.monitor.sample_every, 10);
        assert_eq!(settings.monitor.frame_retry_ms, 2000);
        assert_eq!(settings.monitor.policy.cooldown_secs, 30);
        assert_eq!(settings.monitor.policy.signage_miss_threshold, 3);
        assert!((settings.rules.min_confidence - 0.6).abs() < 1e-6);
        assert_eq!(settings.cameras.len(), 1);
        assert_eq!(settings.cameras[0].device_id, "gate-1");
        assert!(settings.cameras[0].looping);
        assert!(settings.log.json);
        assert_eq!(settings.log.level, "info");
    }
}
