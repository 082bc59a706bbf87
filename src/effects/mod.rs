//! High-level haptic effects: named waves and clips played on elements

pub mod player;
pub mod settings;

pub use player::{EffectHandle, HapticEffectPlayer};
pub use settings::{EffectSignal, PlaySettings};
