//! Configuration loading
//!
//! The configuration file is the same small key/value document the bridge has
//! always used (`mac2mqtt.yaml`). A `.toml` file with the same keys is accepted
//! as well. Everything is validated once at startup and then shared read-only.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_CONFIG_FILE: &str = "mac2mqtt.yaml";
const CONFIG_DIR: &str = "mac2mqtt";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("Must specify {0} in the config file")]
    MissingSetting(&'static str),

    #[error("Invalid mqtt_port '{0}'")]
    InvalidPort(String),
}

/// Port as written in the file. Older configs quote it.
#[derive(Deserialize, Debug, Clone)]
#[serde(untagged)]
enum PortValue {
    Number(u16),
    Text(String),
}

/// Raw file contents, before validation
#[derive(Deserialize, Debug, Clone, Default)]
struct ConfigFile {
    #[serde(default)]
    mqtt_ip: Option<String>,
    #[serde(default)]
    mqtt_port: Option<PortValue>,
    #[serde(default)]
    mqtt_user: Option<String>,
    #[serde(default)]
    mqtt_password: Option<String>,
    #[serde(default)]
    debug: bool,
    #[serde(default)]
    dry_run: bool,
    #[serde(default)]
    auto_update: Option<bool>,
}

impl ConfigFile {
    fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        // An empty YAML document deserializes to unit, not to a map
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content).map_err(|e| ConfigError::Parse {
            path: PathBuf::new(),
            reason: e.to_string(),
        })
    }

    fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: PathBuf::new(),
            reason: e.to_string(),
        })
    }

    /// Command line flags can only switch modes on.
    fn force(mut self, forced: RunMode) -> Self {
        self.debug |= forced.debug;
        self.dry_run |= forced.dry_run;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerSettings {
    pub host: String,
    pub port: u16,
    pub user: Option<String>,
    pub password: Option<String>,
}

/// Operating mode flags, passed explicitly to every component that cares.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunMode {
    pub debug: bool,
    pub dry_run: bool,
}

impl RunMode {
    /// Whether publishes should be traced before transmission
    pub fn traces_publishes(&self) -> bool {
        self.debug || self.dry_run
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub broker: BrokerSettings,
    pub mode: RunMode,
    auto_update: Option<bool>,
}

impl Config {
    /// Reads and validates the config file at `path`. Modes set in `forced`
    /// are switched on before validation, so `--dry-run` works without broker
    /// settings.
    pub async fn load(path: &Path, forced: RunMode) -> Result<Self, ConfigError> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;

        let is_toml = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("toml"))
            .unwrap_or(false);

        let file = if is_toml {
            ConfigFile::from_toml(&content)
        } else {
            ConfigFile::from_yaml(&content)
        };

        file.and_then(|file| Self::validate(file.force(forced)))
            .map_err(|e| match e {
                ConfigError::Parse { reason, .. } => ConfigError::Parse {
                    path: path.to_path_buf(),
                    reason,
                },
                other => other,
            })
    }

    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        Self::validate(ConfigFile::from_yaml(content)?)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Self::validate(ConfigFile::from_toml(content)?)
    }

    fn validate(file: ConfigFile) -> Result<Self, ConfigError> {
        let mode = RunMode {
            debug: file.debug,
            dry_run: file.dry_run,
        };

        let host = file.mqtt_ip.unwrap_or_default().trim().to_string();
        let port = match file.mqtt_port {
            Some(PortValue::Number(port)) => Ok(Some(port)),
            Some(PortValue::Text(text)) if text.trim().is_empty() => Ok(None),
            Some(PortValue::Text(text)) => text
                .trim()
                .parse::<u16>()
                .map(Some)
                .map_err(|_| ConfigError::InvalidPort(text)),
            None => Ok(None),
        };

        // Broker settings are only checked when a broker is actually used
        let port = if mode.dry_run {
            port.unwrap_or_default()
        } else {
            if host.is_empty() {
                return Err(ConfigError::MissingSetting("mqtt_ip"));
            }
            match port? {
                Some(port) => Some(port),
                None => return Err(ConfigError::MissingSetting("mqtt_port")),
            }
        };

        Ok(Self {
            broker: BrokerSettings {
                host,
                port: port.unwrap_or(1883),
                user: file.mqtt_user.filter(|u| !u.is_empty()),
                password: file.mqtt_password.filter(|p| !p.is_empty()),
            },
            mode,
            auto_update: file.auto_update,
        })
    }

    /// Auto-update is on unless the file explicitly turns it off. A dry run
    /// never updates, it must not reach the network.
    pub fn auto_update_enabled(&self) -> bool {
        !self.mode.dry_run && self.auto_update.unwrap_or(true)
    }
}

/// Picks the config file: an explicit path wins, then `mac2mqtt.yaml` in the
/// working directory, then the per-user config directory.
pub fn resolve_config_path(explicit: Option<PathBuf>) -> PathBuf {
    if let Some(path) = explicit {
        return path;
    }

    let local = PathBuf::from(DEFAULT_CONFIG_FILE);
    if local.exists() {
        return local;
    }

    dirs::config_dir()
        .map(|dir| dir.join(CONFIG_DIR).join(DEFAULT_CONFIG_FILE))
        .filter(|path| path.exists())
        .unwrap_or(local)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_original_yaml_layout() {
        let yaml = r#"
mqtt_ip: 192.168.1.10
mqtt_port: "1883"
mqtt_user: homeassistant
mqtt_password: secret
"#;
        let config = Config::from_yaml_str(yaml).unwrap();
        assert_eq!(config.broker.host, "192.168.1.10");
        assert_eq!(config.broker.port, 1883);
        assert_eq!(config.broker.user.as_deref(), Some("homeassistant"));
        assert_eq!(config.broker.password.as_deref(), Some("secret"));
        assert_eq!(config.mode, RunMode::default());
        assert!(config.auto_update_enabled());
    }

    #[test]
    fn auto_update_is_tri_state() {
        let base = "mqtt_ip: broker\nmqtt_port: 1883\n";
        let unset = Config::from_yaml_str(base).unwrap();
        let on = Config::from_yaml_str(&format!("{base}auto_update: true\n")).unwrap();
        let off = Config::from_yaml_str(&format!("{base}auto_update: false\n")).unwrap();

        assert!(unset.auto_update_enabled());
        assert!(on.auto_update_enabled());
        assert!(!off.auto_update_enabled());
    }

    #[test]
    fn missing_broker_is_fatal_unless_dry_run() {
        let err = Config::from_yaml_str("mqtt_port: 1883\n").unwrap_err();
        assert!(matches!(err, ConfigError::MissingSetting("mqtt_ip")));

        let err = Config::from_yaml_str("mqtt_ip: broker\n").unwrap_err();
        assert!(matches!(err, ConfigError::MissingSetting("mqtt_port")));

        let config = Config::from_yaml_str("dry_run: true\n").unwrap();
        assert!(config.mode.dry_run);
        assert!(config.mode.traces_publishes());
    }

    #[test]
    fn rejects_unparsable_port() {
        let err = Config::from_yaml_str("mqtt_ip: broker\nmqtt_port: \"abc\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPort(_)));
    }

    #[test]
    fn dry_run_ignores_unparsable_port() {
        let config = Config::from_yaml_str("mqtt_port: \"abc\"\ndry_run: true\n").unwrap();
        assert!(config.mode.dry_run);
        assert_eq!(config.broker.port, 1883);
    }

    #[test]
    fn dry_run_never_auto_updates() {
        let unset = Config::from_yaml_str("dry_run: true\n").unwrap();
        let on = Config::from_yaml_str("dry_run: true\nauto_update: true\n").unwrap();
        assert!(!unset.auto_update_enabled());
        assert!(!on.auto_update_enabled());
    }

    #[test]
    fn accepts_toml_with_same_keys() {
        let toml = r#"
mqtt_ip = "broker.local"
mqtt_port = 8883
debug = true
auto_update = false
"#;
        let config = Config::from_toml_str(toml).unwrap();
        assert_eq!(config.broker.port, 8883);
        assert!(config.mode.debug);
        assert!(!config.mode.dry_run);
        assert!(!config.auto_update_enabled());
        assert!(config.broker.user.is_none());
    }

    #[tokio::test]
    async fn forced_modes_apply_before_validation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mac2mqtt.yaml");
        std::fs::write(&path, "debug: true\n").unwrap();

        let err = Config::load(&path, RunMode::default()).await.unwrap_err();
        assert!(matches!(err, ConfigError::MissingSetting("mqtt_ip")));

        let forced = RunMode {
            debug: false,
            dry_run: true,
        };
        let config = Config::load(&path, forced).await.unwrap();
        assert!(config.mode.debug);
        assert!(config.mode.dry_run);
    }

    #[tokio::test]
    async fn load_reports_path_on_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.yaml");
        let err = Config::load(&path, RunMode::default()).await.unwrap_err();
        match err {
            ConfigError::Read { path: reported, .. } => assert_eq!(reported, path),
            other => panic!("unexpected error: {other}"),
        }
    }
}
