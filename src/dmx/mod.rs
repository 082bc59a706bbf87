//! DMX actuator output: device dynamics, Art-Net framing and transport

pub mod device;
pub mod mapper;
pub mod protocol;
pub mod subsystem;
pub mod transmitter;

pub use device::{Channel, Device, DeviceConfig, DeviceKind, DeviceRegistry};
pub use mapper::{Breakpoint, MappingTable, StartupPhase, ValueMapper, ValueMapping};
pub use protocol::{decode_frame, encode_frame, ChannelTable, DmxFrame, FrameEncoder, FrameHeader};
pub use subsystem::DmxSubsystem;
pub use transmitter::{DmxTransmitter, TransmitterStats};
