//! DMX devices, their channel layouts and the device registry

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::constants::DMX_CHANNELS;
use crate::dmx::mapper::{MappingTable, ValueMapper, ValueMapping};
use crate::dmx::protocol::ChannelTable;
use crate::error::{ConfigError, DeviceError};
use crate::geometry::{Vec2, Vec3};
use crate::picker::{self, OrderMethod, Side};

/// Device type descriptor with a fixed channel layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Fan,
    Heater,
    Sprayer,
    /// RGB light: intensity plus one channel per color
    Light,
    Generic { channels: u8 },
}

impl DeviceKind {
    /// Channel names in wire order; the first drives the device speed.
    pub fn channel_layout(&self) -> Vec<String> {
        let fixed: &[&str] = match self {
            DeviceKind::Fan => &["Speed"],
            DeviceKind::Heater => &["Power"],
            DeviceKind::Sprayer => &["Flow", "Valve"],
            DeviceKind::Light => &["Intensity", "Red", "Green", "Blue"],
            DeviceKind::Generic { channels } => {
                return (1..=(*channels).max(1))
                    .map(|i| format!("Channel{}", i))
                    .collect();
            }
        };
        fixed.iter().map(|s| s.to_string()).collect()
    }

    pub fn name(&self) -> &'static str {
        match self {
            DeviceKind::Fan => "fan",
            DeviceKind::Heater => "heater",
            DeviceKind::Sprayer => "sprayer",
            DeviceKind::Light => "light",
            DeviceKind::Generic { .. } => "generic",
        }
    }
}

/// One entry of the DMX device config file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub name: String,
    pub kind: DeviceKind,
    /// 1-based address of the first channel
    pub start_channel: u16,
    #[serde(default)]
    pub mapping: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub position: Option<Vec3>,
}

fn default_true() -> bool {
    true
}

/// One addressable DMX channel
#[derive(Debug, Clone, PartialEq)]
pub struct Channel {
    /// 1-based protocol index
    pub number: u16,
    /// 0-255
    pub value: f32,
    pub name: String,
}

/// A configured DMX device
#[derive(Debug, Clone)]
pub struct Device {
    pub name: String,
    pub kind: DeviceKind,
    pub enabled: bool,
    pub channels: Vec<Channel>,
    pub mapping: Option<String>,
    pub position: Option<Vec3>,
    target: f32,
    mapper: ValueMapper,
}

impl Device {
    pub fn from_config(config: &DeviceConfig) -> Result<Self, ConfigError> {
        let layout = config.kind.channel_layout();
        let last = config.start_channel as usize + layout.len() - 1;
        if config.start_channel == 0 || last > DMX_CHANNELS {
            return Err(ConfigError::Invalid(format!(
                "device '{}' channels {}..={} outside 1..={}",
                config.name, config.start_channel, last, DMX_CHANNELS
            )));
        }

        let channels = layout
            .into_iter()
            .enumerate()
            .map(|(i, name)| Channel {
                number: config.start_channel + i as u16,
                value: 0.0,
                name,
            })
            .collect();

        Ok(Self {
            name: config.name.clone(),
            kind: config.kind,
            enabled: config.enabled,
            channels,
            mapping: config.mapping.clone(),
            position: config.position,
            target: 0.0,
            mapper: ValueMapper::new(),
        })
    }

    /// Requested logical speed (0..1)
    pub fn target(&self) -> f32 {
        self.target
    }

    /// Physical speed after dynamics (0..1)
    pub fn output(&self) -> f32 {
        self.mapper.current()
    }

    pub fn channel(&self, name: &str) -> Option<&Channel> {
        self.channels.iter().find(|c| c.name.eq_ignore_ascii_case(name))
    }

    fn advance(&mut self, mapping: Option<&ValueMapping>, dt: f32) {
        let speed = self.mapper.advance(mapping, self.target, dt);
        if let Some(primary) = self.channels.first_mut() {
            primary.value = speed * 255.0;
        }
    }
}

/// All configured devices plus the shared mapping table
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: Vec<Device>,
    index: HashMap<String, usize>,
    mappings: MappingTable,
}

impl DeviceRegistry {
    /// Build the registry; any invalid entry rejects the whole config.
    pub fn new(configs: &[DeviceConfig], mappings: MappingTable) -> Result<Self, ConfigError> {
        let mappings: MappingTable = mappings
            .into_iter()
            .map(|(name, mapping)| (name, mapping.normalized()))
            .collect();

        let mut devices: Vec<Device> = Vec::with_capacity(configs.len());
        let mut index = HashMap::with_capacity(configs.len());
        // Device index owning each 1-based channel
        let mut owners: Vec<Option<usize>> = vec![None; DMX_CHANNELS + 1];
        for config in configs {
            if index.contains_key(&config.name) {
                return Err(ConfigError::DuplicateName(config.name.clone()));
            }
            if let Some(mapping) = &config.mapping {
                if !mappings.contains_key(mapping) {
                    tracing::warn!(
                        "Device {} references unknown mapping {}, using pass-through",
                        config.name,
                        mapping
                    );
                }
            }
            let device = Device::from_config(config)?;
            for channel in &device.channels {
                let owner = &mut owners[channel.number as usize];
                if let Some(other) = *owner {
                    return Err(ConfigError::Invalid(format!(
                        "device '{}' channel {} overlaps device '{}'",
                        device.name, channel.number, devices[other].name
                    )));
                }
                *owner = Some(devices.len());
            }
            index.insert(config.name.clone(), devices.len());
            devices.push(device);
        }

        Ok(Self {
            devices,
            index,
            mappings,
        })
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    pub fn get(&self, name: &str) -> Option<&Device> {
        self.index.get(name).map(|&i| &self.devices[i])
    }

    fn get_mut(&mut self, name: &str) -> Result<&mut Device, DeviceError> {
        match self.index.get(name) {
            Some(&i) => Ok(&mut self.devices[i]),
            None => Err(DeviceError::NotFound(name.to_string())),
        }
    }

    /// Set the requested speed (clamped to 0..1)
    pub fn set_target(&mut self, name: &str, speed: f32) -> Result<(), DeviceError> {
        let device = self.get_mut(name)?;
        device.target = speed.clamp(0.0, 1.0);
        Ok(())
    }

    pub fn target(&self, name: &str) -> Result<f32, DeviceError> {
        self.get(name)
            .map(Device::target)
            .ok_or_else(|| DeviceError::NotFound(name.to_string()))
    }

    pub fn output(&self, name: &str) -> Result<f32, DeviceError> {
        self.get(name)
            .map(Device::output)
            .ok_or_else(|| DeviceError::NotFound(name.to_string()))
    }

    /// Set a non-speed channel directly (0-255)
    pub fn set_channel(
        &mut self,
        name: &str,
        channel: &str,
        value: f32,
    ) -> Result<(), DeviceError> {
        let device = self.get_mut(name)?;
        let device_name = device.name.clone();
        let slot = device
            .channels
            .iter_mut()
            .find(|c| c.name.eq_ignore_ascii_case(channel))
            .ok_or_else(|| DeviceError::InvalidChannel {
                device: device_name,
                channel: channel.to_string(),
            })?;
        slot.value = value.clamp(0.0, 255.0);
        Ok(())
    }

    pub fn set_enabled(&mut self, name: &str, enabled: bool) -> Result<(), DeviceError> {
        self.get_mut(name)?.enabled = enabled;
        Ok(())
    }

    pub fn stop_all(&mut self) {
        for device in &mut self.devices {
            device.target = 0.0;
        }
    }

    /// Advance every device's dynamics by one simulation tick
    pub fn advance(&mut self, dt: f32) {
        let mappings = &self.mappings;
        for device in &mut self.devices {
            let mapping = device.mapping.as_ref().and_then(|m| mappings.get(m));
            device.advance(mapping, dt);
        }
    }

    /// Write every channel into `table`. Disabled devices and a global mute
    /// write zeros.
    pub fn write_table(&self, table: &mut ChannelTable, muted: bool) {
        table.clear();
        for device in &self.devices {
            for channel in &device.channels {
                let value = if muted || !device.enabled {
                    0
                } else {
                    channel.value.round().clamp(0.0, 255.0) as u8
                };
                table.set(channel.number, value);
            }
        }
    }

    /// The first `count` positioned devices on `side`, ordered by `method`.
    pub fn pick(
        &self,
        reference: Vec2,
        method: OrderMethod,
        side: Side,
        count: usize,
    ) -> Vec<&Device> {
        let positioned: Vec<&Device> =
            self.devices.iter().filter(|d| d.position.is_some()).collect();
        picker::select_and_order(
            &positioned,
            |d| d.position.map(Vec3::horizontal).unwrap_or_default(),
            reference,
            method,
            side,
        )
        .into_iter()
        .take(count)
        .copied()
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dmx::mapper::Breakpoint;

    fn config(name: &str, kind: DeviceKind, start: u16) -> DeviceConfig {
        DeviceConfig {
            name: name.to_string(),
            kind,
            start_channel: start,
            mapping: None,
            enabled: true,
            position: None,
        }
    }

    #[test]
    fn test_layout_by_kind() {
        assert_eq!(DeviceKind::Fan.channel_layout(), vec!["Speed"]);
        assert_eq!(DeviceKind::Light.channel_layout().len(), 4);
        assert_eq!(DeviceKind::Generic { channels: 3 }.channel_layout()[2], "Channel3");
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let configs = vec![
            config("Fan1", DeviceKind::Fan, 1),
            config("Fan1", DeviceKind::Fan, 2),
        ];
        let err = DeviceRegistry::new(&configs, MappingTable::new()).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateName(name) if name == "Fan1"));
    }

    #[test]
    fn test_channels_must_fit_universe() {
        let configs = vec![config("Light", DeviceKind::Light, 510)];
        assert!(DeviceRegistry::new(&configs, MappingTable::new()).is_err());
        let configs = vec![config("Fan0", DeviceKind::Fan, 0)];
        assert!(DeviceRegistry::new(&configs, MappingTable::new()).is_err());
    }

    #[test]
    fn test_overlapping_channels_rejected() {
        let configs = vec![
            config("Lamp", DeviceKind::Light, 10),
            config("Fan1", DeviceKind::Fan, 12),
        ];
        let err = DeviceRegistry::new(&configs, MappingTable::new()).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(msg) if msg.contains("overlaps")));

        let configs = vec![
            config("Lamp", DeviceKind::Light, 10),
            config("Fan1", DeviceKind::Fan, 14),
        ];
        assert!(DeviceRegistry::new(&configs, MappingTable::new()).is_ok());
    }

    #[test]
    fn test_advance_writes_primary_channel() {
        let mut mappings = MappingTable::new();
        mappings.insert(
            "half".to_string(),
            ValueMapping {
                breakpoints: vec![Breakpoint::new(0.0, 0.0), Breakpoint::new(1.0, 0.5)],
                ..Default::default()
            },
        );
        let mut fan = config("Fan1", DeviceKind::Fan, 10);
        fan.mapping = Some("half".to_string());
        let mut registry = DeviceRegistry::new(&[fan], mappings).unwrap();

        registry.set_target("Fan1", 1.0).unwrap();
        registry.advance(0.016);
        assert_eq!(registry.output("Fan1").unwrap(), 0.5);

        let mut table = ChannelTable::new();
        registry.write_table(&mut table, false);
        assert_eq!(table.get(10), 128);
        assert_eq!(table.get(11), 0);
    }

    #[test]
    fn test_disabled_and_muted_write_zero() {
        let configs = vec![config("Fan1", DeviceKind::Fan, 1), config("Fan2", DeviceKind::Fan, 2)];
        let mut registry = DeviceRegistry::new(&configs, MappingTable::new()).unwrap();
        registry.set_target("Fan1", 1.0).unwrap();
        registry.set_target("Fan2", 1.0).unwrap();
        registry.set_enabled("Fan2", false).unwrap();
        registry.advance(0.016);

        let mut table = ChannelTable::new();
        registry.write_table(&mut table, false);
        assert_eq!(table.get(1), 255);
        assert_eq!(table.get(2), 0);

        registry.write_table(&mut table, true);
        assert_eq!(table.get(1), 0);
    }

    #[test]
    fn test_unknown_device_lookup() {
        let mut registry = DeviceRegistry::new(&[], MappingTable::new()).unwrap();
        assert_eq!(
            registry.set_target("Ghost", 0.5),
            Err(DeviceError::NotFound("Ghost".to_string()))
        );
        assert!(registry.set_channel("Ghost", "Speed", 1.0).is_err());
    }

    #[test]
    fn test_set_channel_by_name() {
        let lamp = config("Lamp", DeviceKind::Light, 20);
        let mut registry = DeviceRegistry::new(&[lamp], MappingTable::new()).unwrap();
        registry.set_channel("Lamp", "red", 300.0).unwrap();
        assert_eq!(registry.get("Lamp").unwrap().channel("Red").unwrap().value, 255.0);
        assert!(matches!(
            registry.set_channel("Lamp", "Amber", 1.0),
            Err(DeviceError::InvalidChannel { .. })
        ));
    }

    #[test]
    fn test_pick_nearest_on_side() {
        let mut a = config("A", DeviceKind::Fan, 1);
        a.position = Some(Vec3::new(2.0, 1.0, 0.0));
        let mut b = config("B", DeviceKind::Fan, 2);
        b.position = Some(Vec3::new(1.0, 1.0, 0.0));
        let mut c = config("C", DeviceKind::Fan, 3);
        c.position = Some(Vec3::new(-1.0, 1.0, 0.0));
        let d = config("D", DeviceKind::Fan, 4);
        let registry = DeviceRegistry::new(&[a, b, c, d], MappingTable::new()).unwrap();

        let picked = registry.pick(Vec2::ZERO, OrderMethod::Distance, Side::LEFT, 5);
        let names: Vec<&str> = picked.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["B", "A"]);
    }
}
