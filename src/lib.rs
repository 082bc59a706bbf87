//! # Haptic Engine
//!
//! Turns "play this effect here" requests into physical feedback: DMX
//! actuator values over Art-Net and real-time audio routed to transducer
//! elements in the pod.
//!
//! ## Architecture Overview
//!
//! ```text
//!                         host simulation loop
//!                                 │
//!                                 ▼
//!                    ┌──────────────────────────┐
//!                    │ HapticsContext (context) │
//!                    └──┬──────────┬─────────┬──┘
//!          play(..)     │          │         │   set_device_value(..)
//!                       ▼          │         ▼
//!      ┌────────────────────────┐  │  ┌──────────────────────────┐
//!      │ HapticEffectPlayer     │  │  │ DeviceRegistry (dmx)     │
//!      │ (effects)              │  │  │  ValueMapper per device  │
//!      └──────────┬─────────────┘  │  └────────────┬─────────────┘
//!                 ▼                ▼               ▼
//!      ┌────────────────────────────────┐  ┌──────────────────────┐
//!      │ AudioHapticsRouter (audio)     │  │ ChannelTable [512]   │
//!      │  elements · players · sounds   │  └──────────┬───────────┘
//!      └──────────┬─────────────────────┘             ▼
//!                 │ ArrayQueue + atomics   ┌──────────────────────┐
//! ════════════════╪═══════════════════════ │ DmxTransmitter       │
//!   audio thread  ▼                        │  Art-Net over UDP    │
//!      ┌────────────────────────────────┐  └──────────────────────┘
//!      │ Mixer::fill_buffer             │
//!      │  harmonics / clips → elements  │
//!      └────────────────────────────────┘
//! ```

pub mod audio;
pub mod config;
pub mod context;
pub mod dmx;
pub mod effects;
pub mod error;
pub mod geometry;
pub mod network;
pub mod picker;

pub use context::HapticsContext;
pub use error::{Error, Result};

/// Application-wide constants
pub mod constants {
    /// Default sample rate for audio output
    pub const DEFAULT_SAMPLE_RATE: u32 = 48000;

    /// Channels in one DMX universe
    pub const DMX_CHANNELS: usize = 512;

    /// Well-known Art-Net UDP port
    pub const DEFAULT_DMX_PORT: u16 = 6454;

    /// Fallback DMX node address
    pub const DEFAULT_DMX_HOST: &str = "2.0.0.1";

    /// Default simulation tick rate
    pub const DEFAULT_TICK_RATE_HZ: f32 = 60.0;

    /// Maximum number of sounds mixed at once
    pub const MAX_SOUNDS: usize = 64;

    /// Mixer scratch size; larger device buffers are rendered in chunks
    pub const MAX_BLOCK_FRAMES: usize = 1024;
}
