//! Play request description

use serde::{Deserialize, Serialize};

use crate::audio::router::PlayerId;
use crate::geometry::Bounds;

/// What drives an effect's signal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EffectSignal {
    /// Named entry of the wave table
    Wave(String),
    /// Clip name in the clip library
    Clip(String),
}

impl EffectSignal {
    pub fn name(&self) -> &str {
        match self {
            EffectSignal::Wave(name) | EffectSignal::Clip(name) => name,
        }
    }
}

/// Settings for [`HapticEffectPlayer::play`](super::HapticEffectPlayer::play)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaySettings {
    pub signal: EffectSignal,
    pub volume: f32,
    pub muted: bool,
    /// Seconds; unset plays until stopped or released. Persistent effects
    /// ignore it and run until stopped.
    pub duration: Option<f32>,
    pub loop_clip: bool,
    /// Keep playing after every handle is dropped
    pub persistent: bool,
    /// Play regardless of occupancy
    pub always_play: bool,
    pub target_bounds: Option<Bounds>,
    pub muted_element_names: Option<Vec<String>>,
    pub players: Option<Vec<PlayerId>>,
}

impl Default for PlaySettings {
    fn default() -> Self {
        Self {
            signal: EffectSignal::Wave(String::new()),
            volume: 1.0,
            muted: false,
            duration: None,
            loop_clip: false,
            persistent: false,
            always_play: false,
            target_bounds: None,
            muted_element_names: None,
            players: None,
        }
    }
}

impl PlaySettings {
    pub fn wave(name: impl Into<String>) -> Self {
        Self {
            signal: EffectSignal::Wave(name.into()),
            ..Default::default()
        }
    }

    pub fn clip(name: impl Into<String>) -> Self {
        Self {
            signal: EffectSignal::Clip(name.into()),
            ..Default::default()
        }
    }

    pub fn with_volume(mut self, volume: f32) -> Self {
        self.volume = volume;
        self
    }

    pub fn with_duration(mut self, seconds: f32) -> Self {
        self.duration = Some(seconds);
        self
    }

    pub fn with_bounds(mut self, bounds: Bounds) -> Self {
        self.target_bounds = Some(bounds);
        self
    }

    pub fn with_players(mut self, players: Vec<PlayerId>) -> Self {
        self.players = Some(players);
        self
    }

    pub fn muting(mut self, names: Vec<String>) -> Self {
        self.muted_element_names = Some(names);
        self
    }

    pub fn looping(mut self) -> Self {
        self.loop_clip = true;
        self
    }

    pub fn persistent(mut self) -> Self {
        self.persistent = true;
        self
    }

    pub fn always_play(mut self) -> Self {
        self.always_play = true;
        self
    }

    /// Plays on every element, ignoring occupancy
    pub(crate) fn is_global(&self) -> bool {
        self.always_play
            && self.muted_element_names.is_none()
            && self.target_bounds.is_none()
            && self.players.is_none()
    }

    /// Ends on its own without needing a live handle
    pub(crate) fn is_self_terminating(&self) -> bool {
        self.duration.is_some() || (matches!(self.signal, EffectSignal::Clip(_)) && !self.loop_clip)
    }
}
