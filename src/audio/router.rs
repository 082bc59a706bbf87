//! Elements, players and sound bookkeeping on the simulation thread
//!
//! The router owns the arena of sounds and decides, once per simulation
//! tick, which elements each sound is routed to. Routing decisions reach the
//! audio thread only through [`SoundControl`] atomics; sounds themselves are
//! handed over through the mixer's lock-free queues. Handles are
//! generation-checked, so a stale [`SoundId`] never aliases a newer sound.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

use crate::audio::generator::Generator;
use crate::audio::mixer::{ActiveSound, Mixer, MixerShared, SoundControl};
use crate::error::{ConfigError, DeviceError, TargetError};
use crate::geometry::{Bounds, Vec3};
use crate::picker::{self, OrderMethod, Side};

/// Routing gain for an element muted because nobody stands on it
pub const MUTED_GAIN: f32 = 0.0;

/// Element definition produced from the pod layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementSpec {
    pub name: String,
    pub bounds: Bounds,
    /// Output channel index on the audio device
    pub channel: usize,
    #[serde(default)]
    pub mute_when_unoccupied: bool,
}

/// One physical audio-haptic output
#[derive(Debug, Clone)]
pub struct Element {
    pub name: String,
    pub bounds: Bounds,
    pub channel: usize,
    pub mute_when_unoccupied: bool,
    occupied: bool,
}

impl Element {
    pub fn is_occupied(&self) -> bool {
        self.occupied
    }

    pub fn side(&self) -> Side {
        Side::classify(self.bounds.center().horizontal())
    }
}

/// Opaque participant id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlayerId(pub Uuid);

impl PlayerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PlayerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A tracked participant with a two-sample position feed
#[derive(Debug, Clone)]
pub struct Player {
    pub id: PlayerId,
    positions: [Option<Vec3>; 2],
}

impl Player {
    fn new(id: PlayerId) -> Self {
        Self {
            id,
            positions: [None, None],
        }
    }

    pub fn positions(&self) -> impl Iterator<Item = Vec3> + '_ {
        self.positions.iter().flatten().copied()
    }

    fn is_inside(&self, bounds: &Bounds) -> bool {
        self.positions().any(|p| bounds.contains(p))
    }
}

/// Generation-checked sound handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SoundId {
    index: u32,
    generation: u32,
}

impl SoundId {
    pub(crate) fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }
}

impl fmt::Display for SoundId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

/// Who a sound plays on; fixed at creation
#[derive(Debug, Clone, PartialEq)]
pub enum SoundTarget {
    Elements(Vec<usize>),
    Players(Vec<PlayerId>),
    Global,
}

/// Target selectors for [`AudioHapticsRouter::create_sound`]
#[derive(Debug, Clone, Default)]
pub struct SoundRequest {
    pub name: String,
    pub elements: Option<Vec<String>>,
    pub bounds: Option<Bounds>,
    pub players: Option<Vec<PlayerId>>,
    pub ignore_mute_when_unoccupied: bool,
}

/// When a sound ends on its own
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SoundLifetime {
    /// Only an explicit dispose ends a persistent sound
    pub persistent: bool,
    /// Seconds of simulated time; non-persistent sounds only
    pub duration: Option<f32>,
}

struct SoundEntry {
    name: String,
    target: SoundTarget,
    ignore_mute_when_unoccupied: bool,
    lifetime: SoundLifetime,
    elapsed: f32,
    kept_alive: bool,
    control: Arc<SoundControl>,
}

struct Slot {
    generation: u32,
    entry: Option<SoundEntry>,
}

/// Sound, element and player bookkeeping
pub struct AudioHapticsRouter {
    elements: Vec<Element>,
    element_index: HashMap<String, usize>,
    players: Vec<Player>,
    slots: Vec<Slot>,
    free: Vec<u32>,
    shared: Arc<MixerShared>,
}

impl AudioHapticsRouter {
    /// Register elements and build the matching audio-thread mixer
    pub fn new(specs: Vec<ElementSpec>) -> Result<(Self, Mixer), ConfigError> {
        let mut element_index = HashMap::with_capacity(specs.len());
        let mut elements = Vec::with_capacity(specs.len());
        for spec in specs {
            if element_index.contains_key(&spec.name) {
                return Err(ConfigError::DuplicateName(spec.name));
            }
            element_index.insert(spec.name.clone(), elements.len());
            elements.push(Element {
                name: spec.name,
                bounds: spec.bounds,
                channel: spec.channel,
                mute_when_unoccupied: spec.mute_when_unoccupied,
                occupied: false,
            });
        }

        let (mixer, shared) = Mixer::new(elements.iter().map(|e| e.channel).collect());
        tracing::info!("Audio haptics router started with {} elements", elements.len());

        Ok((
            Self {
                elements,
                element_index,
                players: Vec::new(),
                slots: Vec::new(),
                free: Vec::new(),
                shared,
            },
            mixer,
        ))
    }

    /// Router with no elements; sounds are accepted and route nowhere
    pub fn empty() -> (Self, Mixer) {
        let (mixer, shared) = Mixer::new(Vec::new());
        (
            Self {
                elements: Vec::new(),
                element_index: HashMap::new(),
                players: Vec::new(),
                slots: Vec::new(),
                free: Vec::new(),
                shared,
            },
            mixer,
        )
    }

    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    pub fn element(&self, name: &str) -> Option<&Element> {
        self.element_index.get(name).map(|&i| &self.elements[i])
    }

    /// Whether the audio thread wrote signal to `name` in its last block
    pub fn is_element_playing(&self, name: &str) -> Result<bool, DeviceError> {
        self.element_index
            .get(name)
            .map(|&i| self.shared.is_element_playing(i))
            .ok_or_else(|| DeviceError::ElementNotFound(name.to_string()))
    }

    /// The first `count` elements on `side`, ordered relative to `reference`
    pub fn elements_near(
        &self,
        reference: Vec3,
        method: OrderMethod,
        side: Side,
        count: usize,
    ) -> Vec<&Element> {
        picker::select_and_order(
            &self.elements,
            |e| e.bounds.center().horizontal(),
            reference.horizontal(),
            method,
            side,
        )
        .into_iter()
        .take(count)
        .collect()
    }

    pub fn set_master_muted(&self, muted: bool) {
        self.shared.set_master_muted(muted);
    }

    pub fn is_master_muted(&self) -> bool {
        self.shared.is_master_muted()
    }

    // --- players ---

    /// Returns false if the player was already tracked
    pub fn add_player(&mut self, id: PlayerId) -> bool {
        if self.players.iter().any(|p| p.id == id) {
            return false;
        }
        tracing::debug!("Player {} joined", id);
        self.players.push(Player::new(id));
        true
    }

    pub fn remove_player(&mut self, id: PlayerId) -> Result<(), DeviceError> {
        let pos = self
            .players
            .iter()
            .position(|p| p.id == id)
            .ok_or_else(|| DeviceError::PlayerNotFound(id.to_string()))?;
        self.players.remove(pos);
        tracing::debug!("Player {} left", id);
        Ok(())
    }

    pub fn players(&self) -> &[Player] {
        &self.players
    }

    fn player_mut(&mut self, id: PlayerId) -> Result<&mut Player, DeviceError> {
        self.players
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| DeviceError::PlayerNotFound(id.to_string()))
    }

    /// Replace both position samples (e.g. left and right foot)
    pub fn set_player_positions(
        &mut self,
        id: PlayerId,
        positions: [Vec3; 2],
    ) -> Result<(), DeviceError> {
        self.player_mut(id)?.positions = [Some(positions[0]), Some(positions[1])];
        Ok(())
    }

    /// Push one sample, discarding the oldest
    pub fn push_player_position(
        &mut self,
        id: PlayerId,
        position: Vec3,
    ) -> Result<(), DeviceError> {
        let player = self.player_mut(id)?;
        player.positions[1] = player.positions[0];
        player.positions[0] = Some(position);
        Ok(())
    }

    // --- sounds ---

    /// Create a sound bound to elements (by name and/or bounds) or to players.
    ///
    /// Elements/bounds and players are mutually exclusive. Bounds that hit no
    /// element still produce a valid sound routed nowhere.
    pub fn create_sound(
        &mut self,
        request: SoundRequest,
        generator: Generator,
        lifetime: SoundLifetime,
    ) -> Result<SoundId, TargetError> {
        let wants_elements = request.elements.is_some() || request.bounds.is_some();

        let target = match (wants_elements, request.players) {
            (true, Some(_)) => {
                tracing::warn!(
                    "Sound {} targets both elements and players, ignoring",
                    request.name
                );
                return Err(TargetError::InvalidCombination);
            }
            (false, Some(players)) => SoundTarget::Players(players),
            (true, None) => SoundTarget::Elements(self.resolve_elements(
                &request.name,
                request.elements,
                request.bounds,
            )),
            (false, None) => return Err(TargetError::MissingTarget),
        };

        self.spawn(
            request.name,
            target,
            request.ignore_mute_when_unoccupied,
            generator,
            lifetime,
        )
    }

    /// Create a sound that plays on every element
    pub fn create_global_sound(
        &mut self,
        name: &str,
        ignore_mute_when_unoccupied: bool,
        generator: Generator,
        lifetime: SoundLifetime,
    ) -> Result<SoundId, TargetError> {
        self.spawn(
            name.to_string(),
            SoundTarget::Global,
            ignore_mute_when_unoccupied,
            generator,
            lifetime,
        )
    }

    fn resolve_elements(
        &self,
        sound: &str,
        names: Option<Vec<String>>,
        bounds: Option<Bounds>,
    ) -> Vec<usize> {
        let mut seen = HashSet::new();
        let mut candidates: Vec<usize> = match names {
            Some(names) => names
                .iter()
                .filter_map(|name| {
                    let index = self.element_index.get(name).copied();
                    if index.is_none() {
                        tracing::warn!(
                            "Sound {}: {}",
                            sound,
                            DeviceError::ElementNotFound(name.clone())
                        );
                    }
                    index
                })
                .filter(|index| seen.insert(*index))
                .collect(),
            None => (0..self.elements.len()).collect(),
        };

        if let Some(bounds) = bounds {
            candidates.retain(|&i| self.elements[i].bounds.intersects(&bounds));
            if candidates.is_empty() {
                tracing::warn!("Sound {}: no element intersects {:?}", sound, bounds);
            }
        }
        candidates
    }

    fn spawn(
        &mut self,
        name: String,
        target: SoundTarget,
        ignore_mute_when_unoccupied: bool,
        generator: Generator,
        lifetime: SoundLifetime,
    ) -> Result<SoundId, TargetError> {
        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    entry: None,
                });
                (self.slots.len() - 1) as u32
            }
        };
        let id = SoundId::new(index, self.slots[index as usize].generation);

        let control = Arc::new(SoundControl::new(self.elements.len(), 1.0));
        let entry = SoundEntry {
            name,
            target,
            ignore_mute_when_unoccupied,
            lifetime,
            elapsed: 0.0,
            kept_alive: false,
            control: control.clone(),
        };
        self.apply_routing(&entry);

        if !self.has_mixer() {
            // Nothing renders; a one-shot signal is over as soon as it starts
            if generator.is_one_shot() {
                entry.control.mark_finished();
            }
        } else {
            let sound = ActiveSound::new(id, generator, control);
            if self.shared.pending.push(sound).is_err() {
                tracing::warn!("Sound {} dropped: mixer queue full", entry.name);
                self.free.push(index);
                return Err(TargetError::Unavailable);
            }
        }

        tracing::debug!("Sound {} created as {}", entry.name, id);
        self.slots[index as usize].entry = Some(entry);
        Ok(id)
    }

    /// Whether a [`Mixer`] for this router still exists to take sounds
    pub fn has_mixer(&self) -> bool {
        Arc::strong_count(&self.shared) > 1
    }

    fn entry(&self, id: SoundId) -> Option<&SoundEntry> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.entry.as_ref())
    }

    fn entry_mut(&mut self, id: SoundId) -> Option<&mut SoundEntry> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.entry.as_mut())
    }

    pub fn is_alive(&self, id: SoundId) -> bool {
        self.entry(id).is_some()
    }

    pub fn sound_count(&self) -> usize {
        self.slots.iter().filter(|s| s.entry.is_some()).count()
    }

    /// Renew a non-persistent sound for the next tick check
    pub fn keep_alive(&mut self, id: SoundId) -> bool {
        match self.entry_mut(id) {
            Some(entry) => {
                entry.kept_alive = true;
                true
            }
            None => false,
        }
    }

    pub fn set_gain(&mut self, id: SoundId, gain: f32) -> bool {
        self.entry(id).map(|e| e.control.set_gain(gain)).is_some()
    }

    pub fn gain(&self, id: SoundId) -> Option<f32> {
        self.entry(id).map(|e| e.control.gain())
    }

    pub fn set_muted(&mut self, id: SoundId, muted: bool) -> bool {
        self.entry(id).map(|e| e.control.set_muted(muted)).is_some()
    }

    pub fn is_muted(&self, id: SoundId) -> Option<bool> {
        self.entry(id).map(|e| e.control.is_muted())
    }

    pub fn target(&self, id: SoundId) -> Option<&SoundTarget> {
        self.entry(id).map(|e| &e.target)
    }

    /// Current routing gain of sound `id` on element `element`
    pub fn routing_gain(&self, id: SoundId, element: &str) -> Option<f32> {
        let index = *self.element_index.get(element)?;
        self.entry(id).map(|e| e.control.routing(index))
    }

    /// Stop a sound now; safe at any time from the simulation thread
    pub fn dispose(&mut self, id: SoundId) -> bool {
        if self.entry(id).is_none() {
            return false;
        }
        self.release(id.index as usize, "disposed");
        true
    }

    fn release(&mut self, index: usize, reason: &str) {
        let slot = &mut self.slots[index];
        if let Some(entry) = slot.entry.take() {
            entry.control.stop();
            slot.generation = slot.generation.wrapping_add(1);
            self.free.push(index as u32);
            tracing::debug!("Sound {} ended: {}", entry.name, reason);
        }
    }

    /// Per-tick bookkeeping: lifecycle, occupancy and routing.
    ///
    /// Runs on the simulation thread after effects have renewed their sounds.
    pub fn tick(&mut self, dt: f32) {
        while self.shared.retired.pop().is_some() {}

        for index in 0..self.slots.len() {
            let reason = match self.slots[index].entry.as_mut() {
                Some(entry) => {
                    entry.elapsed += dt;
                    if entry.lifetime.persistent {
                        None
                    } else if entry.control.is_finished() {
                        Some("source finished")
                    } else if entry.lifetime.duration.is_some_and(|d| entry.elapsed >= d) {
                        Some("duration elapsed")
                    } else if !entry.kept_alive {
                        Some("not kept alive")
                    } else {
                        entry.kept_alive = false;
                        None
                    }
                }
                None => None,
            };
            if let Some(reason) = reason {
                self.release(index, reason);
            }
        }

        for element in &mut self.elements {
            element.occupied = self.players.iter().any(|p| p.is_inside(&element.bounds));
        }

        for slot in &self.slots {
            if let Some(entry) = &slot.entry {
                self.apply_routing(entry);
            }
        }
    }

    fn apply_routing(&self, entry: &SoundEntry) {
        for (index, element) in self.elements.iter().enumerate() {
            let gated = if element.mute_when_unoccupied
                && !entry.ignore_mute_when_unoccupied
                && !element.occupied
            {
                MUTED_GAIN
            } else {
                1.0
            };

            let gain = match &entry.target {
                SoundTarget::Global => gated,
                SoundTarget::Elements(targets) => {
                    if targets.contains(&index) {
                        gated
                    } else {
                        0.0
                    }
                }
                SoundTarget::Players(ids) => {
                    let under_player = self
                        .players
                        .iter()
                        .filter(|p| ids.contains(&p.id))
                        .any(|p| p.is_inside(&element.bounds));
                    if under_player {
                        1.0
                    } else {
                        0.0
                    }
                }
            };
            entry.control.set_routing(index, gain);
        }
    }
}
