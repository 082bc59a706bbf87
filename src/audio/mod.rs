//! Audio haptics: element routing, mixing and device output

pub mod clip;
pub mod generator;
pub mod mixer;
pub mod queue;
pub mod router;

#[cfg(feature = "output")]
pub mod device;
#[cfg(feature = "output")]
pub mod output;

pub use clip::{Clip, ClipLibrary};
pub use generator::{Generator, Harmonic};
pub use mixer::{Mixer, MixerShared, SoundControl};
pub use queue::HandoffQueue;
pub use router::{
    AudioHapticsRouter, Element, ElementSpec, Player, PlayerId, SoundId, SoundLifetime,
    SoundRequest, SoundTarget,
};

#[cfg(feature = "output")]
pub use device::{list_output_devices, AudioDeviceInfo};
#[cfg(feature = "output")]
pub use output::AudioOutput;
