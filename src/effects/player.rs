//! Effect playback on top of the audio haptics router
//!
//! `play` validates the request and resolves its signal immediately, but the
//! router sound is only created on the next [`HapticEffectPlayer::tick`].
//! Until then the returned handle may still retarget the effect's bounds.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::audio::clip::ClipLibrary;
use crate::audio::generator::Generator;
use crate::audio::mixer::AtomicF32;
use crate::audio::router::{AudioHapticsRouter, SoundId, SoundLifetime, SoundRequest};
use crate::config::WaveTable;
use crate::effects::settings::{EffectSignal, PlaySettings};
use crate::error::TargetError;
use crate::geometry::Bounds;

struct EffectState {
    name: String,
    volume: AtomicF32,
    muted: AtomicBool,
    bounds: Mutex<Option<Bounds>>,
    bounds_changed: AtomicBool,
    /// Player-targeted effects have no bounds to change
    targets_players: bool,
    started: AtomicBool,
    stop_requested: AtomicBool,
    finished: AtomicBool,
}

/// Caller-side control of a playing effect
///
/// Dropping every handle of a non-persistent effect that would otherwise
/// play forever ends it on the next tick.
#[derive(Clone)]
pub struct EffectHandle {
    state: Arc<EffectState>,
}

impl std::fmt::Debug for EffectHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectHandle")
            .field("name", &self.state.name)
            .field("volume", &self.volume())
            .field("muted", &self.is_muted())
            .field("started", &self.is_started())
            .field("finished", &self.is_finished())
            .finish()
    }
}

impl EffectHandle {
    pub fn name(&self) -> &str {
        &self.state.name
    }

    pub fn volume(&self) -> f32 {
        self.state.volume.load()
    }

    pub fn set_volume(&self, volume: f32) {
        self.state.volume.store(volume.max(0.0));
    }

    pub fn is_muted(&self) -> bool {
        self.state.muted.load(Ordering::Relaxed)
    }

    pub fn set_muted(&self, muted: bool) {
        self.state.muted.store(muted, Ordering::Relaxed);
    }

    /// True until the underlying sound exists and while bounds were never
    /// changed. Always false for effects that follow players.
    pub fn can_set_bounds(&self) -> bool {
        !self.state.targets_players
            && !self.is_started()
            && !self.state.bounds_changed.load(Ordering::Relaxed)
    }

    /// Retarget once, before the sound starts
    pub fn set_bounds(&self, bounds: Bounds) -> Result<(), TargetError> {
        if self.state.targets_players {
            return Err(TargetError::InvalidCombination);
        }
        let mut slot = self.state.bounds.lock();
        if !self.can_set_bounds() {
            return Err(TargetError::BoundsLocked);
        }
        *slot = Some(bounds);
        self.state.bounds_changed.store(true, Ordering::Relaxed);
        Ok(())
    }

    pub fn stop(&self) {
        self.state.stop_requested.store(true, Ordering::Relaxed);
    }

    pub fn is_started(&self) -> bool {
        self.state.started.load(Ordering::Relaxed)
    }

    pub fn is_finished(&self) -> bool {
        self.state.finished.load(Ordering::Relaxed)
    }
}

struct ActiveEffect {
    state: Arc<EffectState>,
    settings: PlaySettings,
    generator: Option<Generator>,
    sound: Option<SoundId>,
}

impl ActiveEffect {
    fn has_handles(&self) -> bool {
        Arc::strong_count(&self.state) > 1
    }

    fn finish(&self, router: &mut AudioHapticsRouter) {
        if let Some(id) = self.sound {
            router.dispose(id);
        }
        self.state.finished.store(true, Ordering::Relaxed);
    }
}

/// Turns play requests into router sounds and keeps them alive
pub struct HapticEffectPlayer {
    waves: WaveTable,
    clips: Option<ClipLibrary>,
    effects: Vec<ActiveEffect>,
}

impl HapticEffectPlayer {
    pub fn new(waves: WaveTable, clips: Option<ClipLibrary>) -> Self {
        Self {
            waves,
            clips,
            effects: Vec::new(),
        }
    }

    pub fn waves(&self) -> &WaveTable {
        &self.waves
    }

    /// Effects not yet finished
    pub fn active_count(&self) -> usize {
        self.effects.len()
    }

    /// Start an effect; `None` means the effect is unavailable.
    pub fn play(&mut self, settings: PlaySettings) -> Option<EffectHandle> {
        match self.try_play(settings) {
            Ok(handle) => Some(handle),
            Err(e) => {
                tracing::warn!("Effect not played: {}", e);
                None
            }
        }
    }

    pub fn try_play(&mut self, settings: PlaySettings) -> Result<EffectHandle, TargetError> {
        let has_elements =
            settings.target_bounds.is_some() || settings.muted_element_names.is_some();
        if has_elements && settings.players.is_some() {
            return Err(TargetError::InvalidCombination);
        }

        let generator = self.resolve(&settings)?;
        let state = Arc::new(EffectState {
            name: settings.signal.name().to_string(),
            volume: AtomicF32::new(settings.volume.max(0.0)),
            muted: AtomicBool::new(settings.muted),
            bounds: Mutex::new(settings.target_bounds),
            bounds_changed: AtomicBool::new(false),
            targets_players: settings.players.is_some(),
            started: AtomicBool::new(false),
            stop_requested: AtomicBool::new(false),
            finished: AtomicBool::new(false),
        });

        tracing::debug!("Effect {} queued", state.name);
        self.effects.push(ActiveEffect {
            state: state.clone(),
            settings,
            generator: Some(generator),
            sound: None,
        });
        Ok(EffectHandle { state })
    }

    fn resolve(&self, settings: &PlaySettings) -> Result<Generator, TargetError> {
        match &settings.signal {
            EffectSignal::Wave(name) => self
                .waves
                .get(name)
                .map(|harmonics| Generator::harmonics(harmonics.to_vec()))
                .ok_or_else(|| TargetError::UnknownWave(name.clone())),
            EffectSignal::Clip(name) => {
                let library = self
                    .clips
                    .as_ref()
                    .ok_or_else(|| TargetError::UnknownClip(name.clone()))?;
                match library.get(name) {
                    Ok(clip) => Ok(Generator::clip(clip, settings.loop_clip)),
                    Err(e) => {
                        tracing::warn!("{}", e);
                        Err(TargetError::UnknownClip(name.clone()))
                    }
                }
            }
        }
    }

    /// Create queued sounds, forward handle state and renew keep-alives.
    ///
    /// Call once per simulation tick, before the router's own tick.
    pub fn tick(&mut self, router: &mut AudioHapticsRouter) {
        let mut index = 0;
        while index < self.effects.len() {
            if self.update(index, router) {
                index += 1;
            } else {
                let effect = self.effects.swap_remove(index);
                effect.finish(router);
                tracing::debug!("Effect {} ended", effect.state.name);
            }
        }
    }

    /// Returns false once the effect is over
    fn update(&mut self, index: usize, router: &mut AudioHapticsRouter) -> bool {
        let effect = &mut self.effects[index];
        let state = &effect.state;
        if state.stop_requested.load(Ordering::Relaxed) {
            return false;
        }

        let id = match effect.sound {
            Some(id) => {
                if !router.is_alive(id) {
                    return false;
                }
                id
            }
            None => {
                let Some(generator) = effect.generator.take() else {
                    return false;
                };
                // Lock so a concurrent set_bounds either lands or is refused.
                let bounds = state.bounds.lock();
                let created = create_sound(router, &effect.settings, *bounds, generator);
                state.started.store(true, Ordering::Relaxed);
                drop(bounds);
                match created {
                    Ok(id) => {
                        effect.sound = Some(id);
                        id
                    }
                    Err(e) => {
                        tracing::warn!("Effect {} not started: {}", state.name, e);
                        return false;
                    }
                }
            }
        };

        router.set_gain(id, state.volume.load());
        router.set_muted(id, state.muted.load(Ordering::Relaxed));

        if !effect.settings.persistent {
            if effect.has_handles() || effect.settings.is_self_terminating() {
                router.keep_alive(id);
            } else {
                return false;
            }
        }
        true
    }

    /// End every effect immediately
    pub fn stop_all(&mut self, router: &mut AudioHapticsRouter) {
        for effect in self.effects.drain(..) {
            effect.finish(router);
        }
    }
}

fn create_sound(
    router: &mut AudioHapticsRouter,
    settings: &PlaySettings,
    bounds: Option<Bounds>,
    generator: Generator,
) -> Result<SoundId, TargetError> {
    let name = settings.signal.name();
    let lifetime = SoundLifetime {
        persistent: settings.persistent,
        duration: settings.duration,
    };

    if settings.is_global() && bounds.is_none() {
        return router.create_global_sound(name, true, generator, lifetime);
    }

    let request = match &settings.players {
        Some(players) => SoundRequest {
            name: name.to_string(),
            players: Some(players.clone()),
            bounds,
            ..Default::default()
        },
        None => {
            let muted = settings.muted_element_names.as_deref().unwrap_or_default();
            SoundRequest {
                name: name.to_string(),
                elements: Some(
                    router
                        .elements()
                        .iter()
                        .filter(|e| !muted.contains(&e.name))
                        .map(|e| e.name.clone())
                        .collect(),
                ),
                bounds,
                ignore_mute_when_unoccupied: settings.always_play,
                ..Default::default()
            }
        }
    };
    router.create_sound(request, generator, lifetime)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::clip::Clip;
    use crate::audio::generator::Harmonic;
    use crate::audio::mixer::Mixer;
    use crate::audio::router::{ElementSpec, PlayerId, SoundTarget};
    use crate::geometry::Vec3;

    fn tile(name: &str, x: f32, channel: usize) -> ElementSpec {
        ElementSpec {
            name: name.to_string(),
            bounds: Bounds::new(Vec3::new(x, 0.0, 0.0), Vec3::new(x + 1.0, 0.5, 1.0)),
            channel,
            mute_when_unoccupied: true,
        }
    }

    fn setup() -> (HapticEffectPlayer, AudioHapticsRouter, Mixer) {
        let mut waves = WaveTable::new();
        waves.insert("Rumble", vec![Harmonic::new(40.0, 0.8)]);
        let (router, mixer) =
            AudioHapticsRouter::new(vec![tile("A", 0.0, 0), tile("B", 2.0, 1)]).unwrap();
        (HapticEffectPlayer::new(waves, None), router, mixer)
    }

    fn tick(player: &mut HapticEffectPlayer, router: &mut AudioHapticsRouter) {
        player.tick(router);
        router.tick(0.02);
    }

    // Fresh routers hand out slot 0 first
    fn first_sound() -> SoundId {
        SoundId::new(0, 0)
    }

    #[test]
    fn test_unknown_wave_returns_none() {
        let (mut player, _router, _mixer) = setup();
        assert!(player.play(PlaySettings::wave("Missing")).is_none());
        assert!(player.play(PlaySettings::clip("thump")).is_none());
        assert_eq!(player.active_count(), 0);
    }

    #[test]
    fn test_sound_created_on_tick() {
        let (mut player, mut router, _mixer) = setup();
        let handle = player.play(PlaySettings::wave("Rumble")).unwrap();
        assert!(handle.can_set_bounds());
        assert_eq!(router.sound_count(), 0);

        tick(&mut player, &mut router);
        assert!(handle.is_started());
        assert!(!handle.can_set_bounds());
        assert_eq!(router.sound_count(), 1);
        assert_eq!(
            handle.set_bounds(Bounds::new(Vec3::ZERO, Vec3::new(1.0, 1.0, 1.0))),
            Err(TargetError::BoundsLocked)
        );
    }

    #[test]
    fn test_bounds_change_once_before_start() {
        let (mut player, mut router, _mixer) = setup();
        let handle = player.play(PlaySettings::wave("Rumble")).unwrap();
        let b_only = Bounds::new(Vec3::new(2.2, 0.0, 0.2), Vec3::new(2.8, 0.4, 0.8));
        assert!(handle.set_bounds(b_only).is_ok());
        assert_eq!(handle.set_bounds(b_only), Err(TargetError::BoundsLocked));

        tick(&mut player, &mut router);
        let id = first_sound();
        assert_eq!(router.target(id), Some(&SoundTarget::Elements(vec![1])));
    }

    #[test]
    fn test_always_play_uses_global_sound() {
        let (mut player, mut router, _mixer) = setup();
        let _handle = player.play(PlaySettings::wave("Rumble").always_play()).unwrap();
        tick(&mut player, &mut router);
        let id = first_sound();
        assert_eq!(router.target(id), Some(&SoundTarget::Global));
        assert_eq!(router.routing_gain(id, "A"), Some(1.0));
        assert_eq!(router.routing_gain(id, "B"), Some(1.0));
    }

    #[test]
    fn test_muted_element_names_excluded() {
        let (mut player, mut router, _mixer) = setup();
        let _handle = player
            .play(PlaySettings::wave("Rumble").always_play().muting(vec!["A".to_string()]))
            .unwrap();
        tick(&mut player, &mut router);
        let id = first_sound();
        assert_eq!(router.target(id), Some(&SoundTarget::Elements(vec![1])));
        assert_eq!(router.routing_gain(id, "A"), Some(0.0));
        assert_eq!(router.routing_gain(id, "B"), Some(1.0));
    }

    #[test]
    fn test_occupancy_applies_without_always_play() {
        let (mut player, mut router, _mixer) = setup();
        let _handle = player.play(PlaySettings::wave("Rumble")).unwrap();
        tick(&mut player, &mut router);
        let id = first_sound();
        assert_eq!(router.routing_gain(id, "A"), Some(0.0));

        let p = PlayerId::new();
        router.add_player(p);
        router.push_player_position(p, Vec3::new(0.5, 0.1, 0.5)).unwrap();
        tick(&mut player, &mut router);
        assert_eq!(router.routing_gain(id, "A"), Some(1.0));
        assert_eq!(router.routing_gain(id, "B"), Some(0.0));
    }

    #[test]
    fn test_handle_volume_reaches_sound() {
        let (mut player, mut router, _mixer) = setup();
        let handle = player.play(PlaySettings::wave("Rumble").with_volume(0.5)).unwrap();
        tick(&mut player, &mut router);
        let id = first_sound();
        assert_eq!(router.gain(id), Some(0.5));

        handle.set_volume(0.2);
        handle.set_muted(true);
        tick(&mut player, &mut router);
        assert_eq!(router.gain(id), Some(0.2));
        assert_eq!(router.is_muted(id), Some(true));
    }

    #[test]
    fn test_dropping_handle_ends_endless_effect() {
        let (mut player, mut router, _mixer) = setup();
        let handle = player.play(PlaySettings::wave("Rumble")).unwrap();
        for _ in 0..3 {
            tick(&mut player, &mut router);
        }
        assert_eq!(router.sound_count(), 1);

        drop(handle);
        tick(&mut player, &mut router);
        assert_eq!(router.sound_count(), 0);
        assert_eq!(player.active_count(), 0);
    }

    #[test]
    fn test_persistent_effect_outlives_handle() {
        let (mut player, mut router, _mixer) = setup();
        drop(player.play(PlaySettings::wave("Rumble").persistent()).unwrap());
        for _ in 0..5 {
            tick(&mut player, &mut router);
        }
        assert_eq!(router.sound_count(), 1);
        player.stop_all(&mut router);
        assert_eq!(router.sound_count(), 0);
    }

    #[test]
    fn test_duration_ends_effect() {
        let (mut player, mut router, _mixer) = setup();
        let handle = player.play(PlaySettings::wave("Rumble").with_duration(0.05)).unwrap();
        for _ in 0..3 {
            tick(&mut player, &mut router);
        }
        assert_eq!(router.sound_count(), 0);
        tick(&mut player, &mut router);
        assert!(handle.is_finished());
        assert_eq!(player.active_count(), 0);
    }

    #[test]
    fn test_stop_ends_effect() {
        let (mut player, mut router, _mixer) = setup();
        let handle = player.play(PlaySettings::wave("Rumble").persistent()).unwrap();
        tick(&mut player, &mut router);
        handle.stop();
        tick(&mut player, &mut router);
        assert!(handle.is_finished());
        assert_eq!(router.sound_count(), 0);
    }

    #[test]
    fn test_players_and_bounds_rejected() {
        let (mut player, _router, _mixer) = setup();
        let settings = PlaySettings::wave("Rumble")
            .with_players(vec![PlayerId::new()])
            .with_bounds(Bounds::new(Vec3::ZERO, Vec3::new(1.0, 1.0, 1.0)));
        assert_eq!(player.try_play(settings).err(), Some(TargetError::InvalidCombination));
    }

    #[test]
    fn test_player_effect_refuses_bounds() {
        let (mut player, mut router, _mixer) = setup();
        let p = PlayerId::new();
        router.add_player(p);
        let handle = player
            .play(PlaySettings::wave("Rumble").with_players(vec![p]))
            .unwrap();
        assert!(!handle.can_set_bounds());
        assert_eq!(
            handle.set_bounds(Bounds::new(Vec3::ZERO, Vec3::new(1.0, 1.0, 1.0))),
            Err(TargetError::InvalidCombination)
        );

        tick(&mut player, &mut router);
        assert!(!handle.is_finished());
        assert_eq!(router.sound_count(), 1);
        assert_eq!(router.target(first_sound()), Some(&SoundTarget::Players(vec![p])));
    }

    #[test]
    fn test_persistent_timed_effect_runs_until_stopped() {
        let (mut player, mut router, _mixer) = setup();
        let handle = player
            .play(PlaySettings::wave("Rumble").with_duration(0.05).persistent())
            .unwrap();
        for _ in 0..5 {
            tick(&mut player, &mut router);
        }
        assert_eq!(router.sound_count(), 1);
        assert!(!handle.is_finished());

        handle.stop();
        tick(&mut player, &mut router);
        assert!(handle.is_finished());
        assert_eq!(router.sound_count(), 0);
    }

    #[test]
    fn test_clip_effect_from_library() {
        let (_, mut router, mut mixer) = setup();
        let library = ClipLibrary::new("/nonexistent");
        library.insert(Clip {
            name: "thump".to_string(),
            samples: vec![0.5; 64].into(),
            sample_rate: 48_000,
        });
        let mut player = HapticEffectPlayer::new(WaveTable::new(), Some(library));

        // Fire and forget: a one-shot clip needs no handle
        drop(player.play(PlaySettings::clip("thump").always_play()).unwrap());
        tick(&mut player, &mut router);
        assert_eq!(router.sound_count(), 1);

        let mut out = vec![0.0f32; 2 * 128];
        mixer.fill_buffer(&mut out, 2, 48_000);
        assert_eq!(out[0], 0.5);
        assert_eq!(out[1], 0.5);
        assert_eq!(out[2 * 100], 0.0);

        tick(&mut player, &mut router);
        assert_eq!(router.sound_count(), 0);
        tick(&mut player, &mut router);
        assert_eq!(player.active_count(), 0);
    }
}
