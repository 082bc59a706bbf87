//! JSON content files: DMX devices, value mappings and harmonic waves

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::audio::generator::Harmonic;
use crate::config::load_json;
use crate::dmx::device::DeviceConfig;
use crate::dmx::mapper::{MappingTable, ValueMapping};
use crate::error::ConfigError;

/// Device list: `[{"name": "Fan1", "kind": "fan", "start_channel": 1, ...}]`
pub fn load_devices(path: &Path) -> Result<Vec<DeviceConfig>, ConfigError> {
    let devices: Vec<DeviceConfig> = load_json(path)?;
    tracing::debug!("Loaded {} DMX devices from {}", devices.len(), path.display());
    Ok(devices)
}

/// Mapping table keyed by mapping name
pub fn load_mappings(path: &Path) -> Result<MappingTable, ConfigError> {
    let mappings: HashMap<String, ValueMapping> = load_json(path)?;
    for (name, mapping) in &mappings {
        if mapping.startup_speed < 0.0
            || mapping.startup_time_secs < 0.0
            || mapping.transition_speed < 0.0
        {
            return Err(ConfigError::Invalid(format!(
                "mapping {} has negative startup or transition values",
                name
            )));
        }
    }
    Ok(mappings
        .into_iter()
        .map(|(name, mapping)| (name, mapping.normalized()))
        .collect())
}

/// Named generated waves, each an ordered list of harmonics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WaveTable {
    waves: HashMap<String, Vec<Harmonic>>,
}

impl WaveTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, harmonics: Vec<Harmonic>) {
        self.waves.insert(name.into(), harmonics);
    }

    /// `None` for unknown names and for waves with no harmonics
    pub fn get(&self, name: &str) -> Option<&[Harmonic]> {
        self.waves
            .get(name)
            .map(Vec::as_slice)
            .filter(|h| !h.is_empty())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.waves.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.waves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waves.is_empty()
    }
}

/// Wave file: `{"Rumble": [{"frequency": 40.0, "volume": 0.8}]}`
pub fn load_waves(path: &Path) -> Result<WaveTable, ConfigError> {
    let table: WaveTable = load_json(path)?;
    if table.is_empty() {
        return Err(ConfigError::Invalid(format!(
            "wave file {} defines no waves",
            path.display()
        )));
    }
    Ok(table)
}
