use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::warn;

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device: DeviceConfig::default(),
            client: ClientConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// The device-facing listener. Intended to be reachable only from the same
/// host, so the default binds to loopback.
#[derive(Debug, Deserialize)]
pub struct DeviceConfig {
    #[serde(default = "default_device_listen")]
    pub listen_addr: String,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_device_listen(),
        }
    }
}

/// The client-facing listener. Intended to be reachable from the local
/// network, so the default binds to the wildcard address.
#[derive(Debug, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_client_listen")]
    pub listen_addr: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_client_listen(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_event_log_path")]
    pub event_log_path: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            event_log_path: default_event_log_path(),
        }
    }
}

// ---------------------------------------------------------------------------
// Default-value functions used by serde
// ---------------------------------------------------------------------------

fn default_device_listen() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_client_listen() -> String {
    "0.0.0.0:8081".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_event_log_path() -> PathBuf {
    PathBuf::from("events.jsonl")
}

// ---------------------------------------------------------------------------
// Loader
// ---------------------------------------------------------------------------

/// Load configuration from a YAML file.
///
/// If the file does not exist a default configuration is returned and a
/// warning is emitted. This allows the bridge to start with sensible
/// defaults when no config file has been written yet.
pub fn load(path: &Path) -> anyhow::Result<Config> {
    if !path.exists() {
        warn!(
            path = %path.display(),
            "configuration file not found; using defaults"
        );
        return Ok(Config::default());
    }

    let contents = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read config file {}: {e}", path.display()))?;

    let config: Config = serde_yml::from_str(&contents)
        .map_err(|e| anyhow::anyhow!("failed to parse config file {}: {e}", path.display()))?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_pair_loopback_device_with_wildcard_client() {
        let config = Config::default();
        assert_eq!(config.device.listen_addr, "127.0.0.1:8080");
        assert_eq!(config.client.listen_addr, "0.0.0.0:8081");
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.event_log_path, PathBuf::from("events.jsonl"));
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = load(&dir.path().join("no-such.yaml")).expect("load");
        assert_eq!(config.device.listen_addr, "127.0.0.1:8080");
    }

    #[test]
    fn full_yaml_file_overrides_every_section() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            "device:\n  listen_addr: \"127.0.0.1:9000\"\nclient:\n  listen_addr: \"0.0.0.0:9001\"\nlogging:\n  level: debug\n  event_log_path: /tmp/bridge-events.jsonl\n",
        )
        .expect("write config");

        let config = load(&path).expect("load");
        assert_eq!(config.device.listen_addr, "127.0.0.1:9000");
        assert_eq!(config.client.listen_addr, "0.0.0.0:9001");
        assert_eq!(config.logging.level, "debug");
        assert_eq!(
            config.logging.event_log_path,
            PathBuf::from("/tmp/bridge-events.jsonl")
        );
    }

    #[test]
    fn partial_yaml_keeps_defaults_for_missing_sections() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "client:\n  listen_addr: \"0.0.0.0:18081\"\n").expect("write config");

        let config = load(&path).expect("load");
        assert_eq!(config.client.listen_addr, "0.0.0.0:18081");
        assert_eq!(config.device.listen_addr, "127.0.0.1:8080");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn malformed_yaml_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "device: [not, a, mapping\n").expect("write config");

        assert!(load(&path).is_err());
    }
}
