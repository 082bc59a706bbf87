//! Engine configuration
//!
//! The app config is a TOML file naming the JSON content files (layout,
//! component library, DMX devices, value mappings, waves). Relative content
//! paths resolve against the app config's directory. A machine-level
//! `system.toml` may override the DMX endpoint.

pub mod content;
pub mod layout;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::constants::{DEFAULT_DMX_HOST, DEFAULT_DMX_PORT, DEFAULT_TICK_RATE_HZ};
use crate::error::ConfigError;

pub use content::{load_devices, load_mappings, load_waves, WaveTable};
pub use layout::{
    load_library, ComponentLibrary, ComponentPlacement, ComponentType, Door, FloorConfig, FloorTile,
    PodLayout, RailingConfig,
};

const APP_QUALIFIER: &str = "io";
const APP_ORGANIZATION: &str = "haptics";
const APP_NAME: &str = "haptic-engine";
const SYSTEM_OVERRIDE_FILE: &str = "system.toml";

/// Top-level daemon configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub dmx: DmxConfig,
    pub audio: AudioConfig,
    pub content: ContentConfig,
    /// Simulation ticks per second
    pub tick_rate_hz: f32,
    /// Directory relative content paths resolve against
    #[serde(skip)]
    pub base_dir: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            dmx: DmxConfig::default(),
            audio: AudioConfig::default(),
            content: ContentConfig::default(),
            tick_rate_hz: DEFAULT_TICK_RATE_HZ,
            base_dir: PathBuf::from("."),
        }
    }
}

/// DMX output settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DmxConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    pub universe: u16,
    pub physical: u8,
    /// Frames per second; 0 sends on every tick
    pub send_rate_hz: f32,
    /// Increment the frame sequence byte instead of leaving it at 0
    pub sequenced: bool,
    pub devices: Option<PathBuf>,
    pub mappings: Option<PathBuf>,
}

impl Default for DmxConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: DEFAULT_DMX_HOST.to_string(),
            port: DEFAULT_DMX_PORT,
            universe: 0,
            physical: 0,
            send_rate_hz: 0.0,
            sequenced: false,
            devices: None,
            mappings: None,
        }
    }
}

/// Audio output settings; unset fields use the device defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub enabled: bool,
    /// `output:<name>` or a bare device name
    pub device: Option<String>,
    pub sample_rate: Option<u32>,
    pub channels: Option<u16>,
    pub buffer_size: Option<u32>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            device: None,
            sample_rate: None,
            channels: None,
            buffer_size: None,
        }
    }
}

/// Content file locations
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentConfig {
    pub layout: Option<PathBuf>,
    pub components: Option<PathBuf>,
    pub waves: Option<PathBuf>,
    pub clips: Option<PathBuf>,
}

impl AppConfig {
    /// Load from a TOML file; content paths resolve against its directory
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;
        let mut config = Self::from_toml(&text)?;
        config.base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(self.tick_rate_hz.is_finite() && self.tick_rate_hz > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "tick_rate_hz must be positive, got {}",
                self.tick_rate_hz
            )));
        }
        if !(self.dmx.send_rate_hz.is_finite() && self.dmx.send_rate_hz >= 0.0) {
            return Err(ConfigError::Invalid(format!(
                "dmx.send_rate_hz must not be negative, got {}",
                self.dmx.send_rate_hz
            )));
        }
        Ok(())
    }

    /// Resolve a content path against the config directory
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    /// DMX endpoint `(host, port)`: system override first, then this config
    pub fn dmx_endpoint(&self, system: Option<&SystemOverride>) -> (String, u16) {
        let host = system
            .and_then(|s| s.dmx_host.clone())
            .unwrap_or_else(|| self.dmx.host.clone());
        let port = system.and_then(|s| s.dmx_port).unwrap_or(self.dmx.port);
        (host, port)
    }
}

/// Machine-level settings that take precedence over the app config
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemOverride {
    pub dmx_host: Option<String>,
    pub dmx_port: Option<u16>,
}

impl SystemOverride {
    /// Platform location of `system.toml`, e.g. `~/.config/haptic-engine/`
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from(APP_QUALIFIER, APP_ORGANIZATION, APP_NAME)
            .map(|dirs| dirs.config_dir().join(SYSTEM_OVERRIDE_FILE))
    }

    /// Read `path`; a missing file is not an error
    pub fn load(path: &Path) -> Result<Option<Self>, ConfigError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(ConfigError::read_file(path, e)),
        };
        Ok(Some(toml::from_str(&text)?))
    }

    /// Read from the platform location, logging and ignoring bad files
    pub fn discover() -> Option<Self> {
        let path = Self::default_path()?;
        match Self::load(&path) {
            Ok(Some(system)) => {
                tracing::info!("Using system override {}", path.display());
                Some(system)
            }
            Ok(None) => None,
            Err(e) => {
                tracing::warn!("Ignoring system override: {}", e);
                None
            }
        }
    }
}

/// Read and parse a JSON content file
pub(crate) fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;
    serde_json::from_str(&text).map_err(|e| ConfigError::json(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_toml() {
        let config = AppConfig::from_toml("").unwrap();
        assert!(config.dmx.enabled);
        assert_eq!(config.dmx.port, DEFAULT_DMX_PORT);
        assert_eq!(config.tick_rate_hz, DEFAULT_TICK_RATE_HZ);
        assert!(config.content.layout.is_none());
    }

    #[test]
    fn test_rejects_zero_tick_rate() {
        assert!(matches!(
            AppConfig::from_toml("tick_rate_hz = 0.0"),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_malformed_toml() {
        assert!(matches!(
            AppConfig::from_toml("[dmx\nport = 1"),
            Err(ConfigError::Toml(_))
        ));
    }

    #[test]
    fn test_load_resolves_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("haptics.toml");
        std::fs::write(
            &path,
            r#"
tick_rate_hz = 50.0

[dmx]
host = "10.0.0.20"
universe = 2
devices = "devices.json"

[content]
layout = "/abs/pod.json"
"#,
        )
        .unwrap();

        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.dmx.universe, 2);
        assert_eq!(config.tick_rate_hz, 50.0);
        assert_eq!(
            config.resolve(config.dmx.devices.as_deref().unwrap()),
            dir.path().join("devices.json")
        );
        assert_eq!(
            config.resolve(config.content.layout.as_deref().unwrap()),
            PathBuf::from("/abs/pod.json")
        );
    }

    #[test]
    fn test_system_override_wins() {
        let config = AppConfig::from_toml("[dmx]\nhost = \"192.168.1.50\"\nport = 7000").unwrap();
        assert_eq!(config.dmx_endpoint(None), ("192.168.1.50".to_string(), 7000));

        let system = SystemOverride {
            dmx_host: Some("10.1.1.1".to_string()),
            dmx_port: None,
        };
        assert_eq!(config.dmx_endpoint(Some(&system)), ("10.1.1.1".to_string(), 7000));
    }

    #[test]
    fn test_missing_system_override_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(SystemOverride::load(&dir.path().join("system.toml")).unwrap(), None);

        let path = dir.path().join("system.toml");
        std::fs::write(&path, "dmx_port = 6455\n").unwrap();
        let system = SystemOverride::load(&path).unwrap().unwrap();
        assert_eq!(system.dmx_port, Some(6455));
    }
}
