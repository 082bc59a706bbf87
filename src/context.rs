//! The engine facade handed to the host
//!
//! One [`HapticsContext`] is built at startup and owns every subsystem.
//! The host drives it from its simulation loop with [`HapticsContext::tick`]
//! and tears it down with [`HapticsContext::shutdown`]. Each subsystem
//! degrades on its own: a bad layout leaves audio with no elements, a bad
//! DMX config leaves DMX off, a missing wave file leaves no named waves.

use crate::audio::clip::ClipLibrary;
use crate::audio::mixer::Mixer;
use crate::audio::router::{AudioHapticsRouter, Element, ElementSpec, PlayerId};
use crate::config::{load_library, load_waves, AppConfig, PodLayout, SystemOverride, WaveTable};
use crate::dmx::device::Device;
use crate::dmx::subsystem::DmxSubsystem;
use crate::dmx::transmitter::TransmitterStats;
use crate::effects::{EffectHandle, HapticEffectPlayer, PlaySettings};
use crate::error::{ConfigError, DeviceError};
use crate::geometry::{Vec2, Vec3};
use crate::picker::{OrderMethod, Side};

#[cfg(feature = "output")]
use crate::audio::output::AudioOutput;
#[cfg(feature = "output")]
use crate::error::AudioError;

pub struct HapticsContext {
    router: AudioHapticsRouter,
    effects: HapticEffectPlayer,
    dmx: Option<DmxSubsystem>,
    /// Held until an output stream (or the host) takes it
    mixer: Option<Mixer>,
    #[cfg(feature = "output")]
    output: Option<AudioOutput>,
    muted: bool,
    shut_down: bool,
}

impl HapticsContext {
    /// Assemble from already-built parts
    pub fn new(
        router: AudioHapticsRouter,
        mixer: Mixer,
        effects: HapticEffectPlayer,
        dmx: Option<DmxSubsystem>,
    ) -> Self {
        Self {
            router,
            effects,
            dmx,
            mixer: Some(mixer),
            #[cfg(feature = "output")]
            output: None,
            muted: false,
            shut_down: false,
        }
    }

    /// Build every subsystem from config, disabling the ones that fail
    pub fn init(config: &AppConfig, system: Option<&SystemOverride>) -> Self {
        let (router, mixer) = match load_elements(config).and_then(AudioHapticsRouter::new) {
            Ok(parts) => parts,
            Err(e) => {
                tracing::error!("Audio haptics disabled: {}", e);
                AudioHapticsRouter::empty()
            }
        };

        let waves = match config.content.waves.as_deref() {
            Some(path) => load_waves(&config.resolve(path)).unwrap_or_else(|e| {
                tracing::error!("No haptic waves available: {}", e);
                WaveTable::new()
            }),
            None => WaveTable::new(),
        };
        let clips = config
            .content
            .clips
            .as_deref()
            .map(|dir| ClipLibrary::new(config.resolve(dir)));
        let effects = HapticEffectPlayer::new(waves, clips);

        let dmx = if config.dmx.enabled {
            match DmxSubsystem::from_config(config, system) {
                Ok(dmx) => Some(dmx),
                Err(e) => {
                    tracing::error!("DMX disabled: {}", e);
                    None
                }
            }
        } else {
            None
        };

        tracing::info!(
            "Haptics context ready: {} elements, {} waves, DMX {}",
            router.elements().len(),
            effects.waves().len(),
            if dmx.is_some() { "on" } else { "off" }
        );
        let mut context = Self::new(router, mixer, effects, dmx);
        if !config.audio.enabled {
            tracing::info!("Audio output disabled by config");
            context.mixer = None;
        }
        context
    }

    /// Start the device output stream with the context's mixer
    #[cfg(feature = "output")]
    pub fn start_audio(&mut self, config: &AppConfig) -> Result<(), AudioError> {
        if !config.audio.enabled {
            return Ok(());
        }
        let mixer = self
            .mixer
            .take()
            .ok_or_else(|| AudioError::StreamError("mixer already taken".to_string()))?;
        self.output = Some(AudioOutput::start(&config.audio, mixer)?);
        Ok(())
    }

    /// Hand the mixer to a host that drives its own audio callback.
    ///
    /// `None` once taken or when audio is disabled by config.
    pub fn take_mixer(&mut self) -> Option<Mixer> {
        self.mixer.take()
    }

    /// The running output stream, if [`Self::start_audio`] opened one
    #[cfg(feature = "output")]
    pub fn audio_output(&self) -> Option<&AudioOutput> {
        self.output.as_ref()
    }

    /// One simulation step of `dt` seconds
    pub fn tick(&mut self, dt: f32) {
        if self.shut_down {
            return;
        }
        self.effects.tick(&mut self.router);
        self.router.tick(dt);

        if let Some(dmx) = &mut self.dmx {
            dmx.tick(dt, self.muted);
        }

        #[cfg(feature = "output")]
        {
            if let Some(output) = &self.output {
                while let Some(e) = output.check_errors() {
                    tracing::warn!("Audio output: {}", e);
                }
            }
        }
    }

    /// Start an effect; `None` when it cannot play
    pub fn play(&mut self, settings: PlaySettings) -> Option<EffectHandle> {
        self.effects.play(settings)
    }

    // --- DMX devices ---

    pub fn is_dmx_enabled(&self) -> bool {
        self.dmx.is_some()
    }

    /// Request a logical speed (0..1); unknown devices are logged and ignored
    pub fn set_device_value(&mut self, name: &str, value: f32) -> Result<(), DeviceError> {
        let result = match &mut self.dmx {
            Some(dmx) => dmx.registry_mut().set_target(name, value),
            None => Err(DeviceError::NotFound(name.to_string())),
        };
        if let Err(e) = &result {
            tracing::warn!("Ignoring device value: {}", e);
        }
        result
    }

    /// Last requested logical speed
    pub fn device_value(&self, name: &str) -> Option<f32> {
        self.dmx.as_ref()?.registry().target(name).ok()
    }

    /// Physical speed after startup and transition dynamics
    pub fn device_output(&self, name: &str) -> Option<f32> {
        self.dmx.as_ref()?.registry().output(name).ok()
    }

    /// Set a secondary channel (e.g. a light's color) directly
    pub fn set_device_channel(
        &mut self,
        name: &str,
        channel: &str,
        value: f32,
    ) -> Result<(), DeviceError> {
        let result = match &mut self.dmx {
            Some(dmx) => dmx.registry_mut().set_channel(name, channel, value),
            None => Err(DeviceError::NotFound(name.to_string())),
        };
        if let Err(e) = &result {
            tracing::warn!("Ignoring channel value: {}", e);
        }
        result
    }

    pub fn set_device_enabled(&mut self, name: &str, enabled: bool) -> Result<(), DeviceError> {
        match &mut self.dmx {
            Some(dmx) => dmx.registry_mut().set_enabled(name, enabled),
            None => Err(DeviceError::NotFound(name.to_string())),
        }
    }

    pub fn devices(&self) -> &[Device] {
        self.dmx.as_ref().map(|d| d.registry().devices()).unwrap_or(&[])
    }

    pub fn pick_devices(
        &self,
        reference: Vec2,
        method: OrderMethod,
        side: Side,
        count: usize,
    ) -> Vec<&Device> {
        match &self.dmx {
            Some(dmx) => dmx.registry().pick(reference, method, side, count),
            None => Vec::new(),
        }
    }

    pub fn dmx_stats(&self) -> Option<TransmitterStats> {
        self.dmx.as_ref().map(DmxSubsystem::stats)
    }

    // --- audio elements and players ---

    pub fn elements(&self) -> &[Element] {
        self.router.elements()
    }

    pub fn elements_near(
        &self,
        point: Vec3,
        method: OrderMethod,
        side: Side,
        count: usize,
    ) -> Vec<&Element> {
        self.router.elements_near(point, method, side, count)
    }

    pub fn is_element_playing(&self, name: &str) -> Result<bool, DeviceError> {
        self.router.is_element_playing(name)
    }

    pub fn join(&mut self, player: PlayerId) {
        if !self.router.add_player(player) {
            tracing::debug!("Player {} already joined", player);
        }
    }

    pub fn leave(&mut self, player: PlayerId) {
        if let Err(e) = self.router.remove_player(player) {
            tracing::warn!("{}", e);
        }
    }

    /// Replace both position samples of `player`
    pub fn update_player(&mut self, player: PlayerId, positions: [Vec3; 2]) {
        if let Err(e) = self.router.set_player_positions(player, positions) {
            tracing::warn!("{}", e);
        }
    }

    pub fn push_player_position(&mut self, player: PlayerId, position: Vec3) {
        if let Err(e) = self.router.push_player_position(player, position) {
            tracing::warn!("{}", e);
        }
    }

    pub fn router(&self) -> &AudioHapticsRouter {
        &self.router
    }

    pub fn router_mut(&mut self) -> &mut AudioHapticsRouter {
        &mut self.router
    }

    // --- master mute ---

    /// Mute both DMX (all-zero frames) and audio output
    pub fn set_muted(&mut self, muted: bool) {
        if self.muted != muted {
            tracing::info!("Haptics {}", if muted { "muted" } else { "unmuted" });
        }
        self.muted = muted;
        self.router.set_master_muted(muted);
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    /// Stop effects and audio, then zero every DMX channel. Idempotent.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;

        self.effects.stop_all(&mut self.router);
        self.router.tick(0.0);

        #[cfg(feature = "output")]
        {
            if let Some(mut output) = self.output.take() {
                output.stop();
            }
        }

        if let Some(dmx) = &mut self.dmx {
            dmx.close();
        }
        tracing::info!("Haptics context shut down");
    }
}

impl Drop for HapticsContext {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn load_elements(config: &AppConfig) -> Result<Vec<ElementSpec>, ConfigError> {
    let Some(layout_path) = config.content.layout.as_deref() else {
        return Ok(Vec::new());
    };
    let layout = PodLayout::load(&config.resolve(layout_path))?;
    let library = match config.content.components.as_deref() {
        Some(path) => load_library(&config.resolve(path))?,
        None => Default::default(),
    };
    layout.element_specs(&library)
}
