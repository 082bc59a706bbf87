//! Error types for the haptics engine

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the engine
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Target error: {0}")]
    Target(#[from] TargetError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Device error: {0}")]
    Device(#[from] DeviceError),

    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Layout, mapping, device and wave file errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse JSON in '{path}': {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to parse TOML: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("duplicate name: {0}")]
    DuplicateName(String),
}

impl ConfigError {
    pub fn read_file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ConfigError::ReadFile {
            path: path.into(),
            source,
        }
    }

    pub fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        ConfigError::Json {
            path: path.into(),
            source,
        }
    }
}

/// Errors resolving what a sound or effect should play on
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TargetError {
    #[error("elements/bounds and players cannot both be targeted")]
    InvalidCombination,

    #[error("no target supplied")]
    MissingTarget,

    #[error("unknown wave: {0}")]
    UnknownWave(String),

    #[error("unknown clip: {0}")]
    UnknownClip(String),

    #[error("bounds can no longer be changed once the sound has started")]
    BoundsLocked,

    #[error("audio haptics unavailable")]
    Unavailable,
}

/// UDP transport and wire format errors
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Failed to resolve endpoint {0}")]
    Resolve(String),

    #[error("Socket bind failed: {0}")]
    BindFailed(String),

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Invalid frame: {0}")]
    InvalidFrame(String),
}

/// Runtime lookups of devices, elements and players
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("Device not found: {0}")]
    NotFound(String),

    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Player not found: {0}")]
    PlayerNotFound(String),

    #[error("Device {device} has no channel {channel}")]
    InvalidChannel { device: String, channel: String },
}

/// Audio output and clip decoding errors
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Failed to open stream: {0}")]
    StreamError(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Failed to decode clip '{path}': {reason}")]
    ClipDecode { path: PathBuf, reason: String },
}

/// Result type alias for the engine
pub type Result<T> = std::result::Result<T, Error>;
