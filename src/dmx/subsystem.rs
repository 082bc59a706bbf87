//! DMX output as one unit: registry, channel table and transmitter
//!
//! Built all-or-nothing from config. Any invalid device, mapping or endpoint
//! refuses the whole subsystem so no actuator is driven from a partial
//! configuration.

use crate::config::{load_devices, load_mappings, AppConfig, SystemOverride};
use crate::dmx::device::DeviceRegistry;
use crate::dmx::mapper::MappingTable;
use crate::dmx::protocol::ChannelTable;
use crate::dmx::transmitter::{DmxTransmitter, TransmitterStats};
use crate::error::{ConfigError, Result};
use crate::network::udp::resolve_endpoint;

pub struct DmxSubsystem {
    registry: DeviceRegistry,
    transmitter: DmxTransmitter,
    table: ChannelTable,
    /// Seconds between frames; `None` sends every tick
    send_interval: Option<f32>,
    since_send: f32,
}

impl DmxSubsystem {
    pub fn new(registry: DeviceRegistry, transmitter: DmxTransmitter, send_rate_hz: f32) -> Self {
        let send_interval = (send_rate_hz > 0.0).then(|| 1.0 / send_rate_hz);
        Self {
            registry,
            transmitter,
            table: ChannelTable::new(),
            send_interval,
            since_send: 0.0,
        }
    }

    /// Load devices and mappings, resolve the endpoint and open the socket
    pub fn from_config(config: &AppConfig, system: Option<&SystemOverride>) -> Result<Self> {
        let devices_path = config
            .dmx
            .devices
            .as_deref()
            .ok_or_else(|| ConfigError::Invalid("dmx.devices not set".to_string()))?;
        let devices = load_devices(&config.resolve(devices_path))?;
        let mappings = match config.dmx.mappings.as_deref() {
            Some(path) => load_mappings(&config.resolve(path))?,
            None => MappingTable::new(),
        };
        let registry = DeviceRegistry::new(&devices, mappings)?;

        let (host, port) = config.dmx_endpoint(system);
        let target = resolve_endpoint(&host, port)?;
        let transmitter = DmxTransmitter::new(target, config.dmx.universe, config.dmx.physical)?
            .with_sequencing(config.dmx.sequenced);

        tracing::info!("DMX enabled with {} devices", registry.len());
        Ok(Self::new(registry, transmitter, config.dmx.send_rate_hz))
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut DeviceRegistry {
        &mut self.registry
    }

    pub fn table(&self) -> &ChannelTable {
        &self.table
    }

    pub fn stats(&self) -> TransmitterStats {
        self.transmitter.stats()
    }

    /// Advance device dynamics and send a frame when one is due
    pub fn tick(&mut self, dt: f32, muted: bool) {
        self.registry.advance(dt);

        if let Some(interval) = self.send_interval {
            self.since_send += dt;
            if self.since_send < interval {
                return;
            }
            self.since_send %= interval;
        }

        self.registry.write_table(&mut self.table, muted);
        self.transmitter.send(&self.table);
    }

    /// Stop all devices and put one all-zero frame on the wire
    pub fn close(&mut self) {
        self.registry.stop_all();
        self.table.clear();
        self.transmitter.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dmx::device::{DeviceConfig, DeviceKind};
    use crate::dmx::protocol::decode_frame;
    use std::net::UdpSocket;
    use std::time::Duration;

    fn subsystem(send_rate_hz: f32) -> (DmxSubsystem, UdpSocket) {
        let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
        receiver.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
        let registry = DeviceRegistry::new(
            &[DeviceConfig {
                name: "Fan1".to_string(),
                kind: DeviceKind::Fan,
                start_channel: 3,
                mapping: None,
                enabled: true,
                position: None,
            }],
            MappingTable::new(),
        )
        .unwrap();
        let transmitter = DmxTransmitter::new(receiver.local_addr().unwrap(), 0, 0).unwrap();
        (DmxSubsystem::new(registry, transmitter, send_rate_hz), receiver)
    }

    fn recv(socket: &UdpSocket) -> Vec<u8> {
        let mut buf = [0u8; 1024];
        let n = socket.recv(&mut buf).unwrap();
        let frame = decode_frame(&buf[..n]).unwrap();
        frame.data.to_vec()
    }

    #[test]
    fn test_tick_sends_device_values() {
        let (mut dmx, receiver) = subsystem(0.0);
        dmx.registry_mut().set_target("Fan1", 1.0).unwrap();
        dmx.tick(0.02, false);
        let data = recv(&receiver);
        assert_eq!(data.len(), 512);
        assert_eq!(data[2], 255);
        assert_eq!(dmx.stats().frames_sent, 1);
    }

    #[test]
    fn test_muted_tick_sends_zeros() {
        let (mut dmx, receiver) = subsystem(0.0);
        dmx.registry_mut().set_target("Fan1", 1.0).unwrap();
        dmx.tick(0.02, true);
        assert!(recv(&receiver).iter().all(|v| *v == 0));
        assert_eq!(dmx.registry().output("Fan1").unwrap(), 1.0);
    }

    #[test]
    fn test_send_rate_limits_frames() {
        let (mut dmx, _receiver) = subsystem(8.0);
        for _ in 0..10 {
            dmx.tick(0.03125, false);
        }
        // 0.3125s at 8 Hz
        assert_eq!(dmx.stats().frames_sent, 2);
    }

    #[test]
    fn test_close_sends_zero_frame() {
        let (mut dmx, receiver) = subsystem(0.0);
        dmx.registry_mut().set_target("Fan1", 0.5).unwrap();
        dmx.tick(0.02, false);
        assert_eq!(recv(&receiver)[2], 128);

        dmx.close();
        assert!(recv(&receiver).iter().all(|v| *v == 0));
    }

    fn write_config(dir: &std::path::Path, devices: &str) -> AppConfig {
        std::fs::write(dir.join("devices.json"), devices).unwrap();
        std::fs::write(
            dir.join("mappings.json"),
            r#"{"half": {"breakpoints": [
                {"sourceSpeed": 0.0, "targetSpeed": 0.0},
                {"sourceSpeed": 1.0, "targetSpeed": 0.5}
            ]}}"#,
        )
        .unwrap();
        let path = dir.join("haptics.toml");
        std::fs::write(
            &path,
            r#"
                [dmx]
                host = "192.0.2.1"
                port = 9
                devices = "devices.json"
                mappings = "mappings.json"
            "#,
        )
        .unwrap();
        AppConfig::load(&path).unwrap()
    }

    #[test]
    fn test_from_config_sends_to_system_endpoint() {
        let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
        receiver.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let config = write_config(
            dir.path(),
            r#"[{"name": "Fan1", "kind": "fan", "start_channel": 3, "mapping": "half"}]"#,
        );
        let system = SystemOverride {
            dmx_host: Some("127.0.0.1".to_string()),
            dmx_port: Some(receiver.local_addr().unwrap().port()),
        };

        let mut dmx = DmxSubsystem::from_config(&config, Some(&system)).unwrap();
        assert_eq!(dmx.registry().len(), 1);
        dmx.registry_mut().set_target("Fan1", 1.0).unwrap();
        dmx.tick(0.02, false);
        assert_eq!(recv(&receiver)[2], 128);
    }

    #[test]
    fn test_overlapping_devices_disable_whole_subsystem() {
        let dir = tempfile::tempdir().unwrap();
        let config = write_config(
            dir.path(),
            r#"[
                {"name": "Lamp", "kind": "light", "start_channel": 1},
                {"name": "Fan1", "kind": "fan", "start_channel": 4}
            ]"#,
        );
        let system = SystemOverride {
            dmx_host: Some("127.0.0.1".to_string()),
            dmx_port: None,
        };
        assert!(DmxSubsystem::from_config(&config, Some(&system)).is_err());
    }

    #[test]
    fn test_missing_devices_file_disables() {
        let config = AppConfig::default();
        assert!(DmxSubsystem::from_config(&config, None).is_err());
    }
}
