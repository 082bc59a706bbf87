//! Real-time mixing of active sounds into per-element output channels
//!
//! The [`Mixer`] lives on the audio callback thread. It only ever touches:
//! - its own preallocated sound list and scratch buffer,
//! - [`SoundControl`] atomics written by the simulation thread
//!   (latest value wins, never blocking),
//! - the lock-free pending/retired queues in [`MixerShared`].
//!
//! New sounds arrive fully built through `pending`; finished or stopped
//! sounds leave through `retired` so their memory is released on the
//! simulation thread.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use crate::audio::generator::Generator;
use crate::audio::queue::HandoffQueue;
use crate::audio::router::SoundId;
use crate::constants::{MAX_BLOCK_FRAMES, MAX_SOUNDS};

/// f32 stored as bits in an `AtomicU32`
#[derive(Debug)]
pub struct AtomicF32(AtomicU32);

impl AtomicF32 {
    pub fn new(value: f32) -> Self {
        Self(AtomicU32::new(value.to_bits()))
    }

    pub fn load(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }

    pub fn store(&self, value: f32) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }
}

/// Live per-sound state shared between the simulation and audio threads
#[derive(Debug)]
pub struct SoundControl {
    gain: AtomicF32,
    muted: AtomicBool,
    /// Set by the simulation thread; the mixer retires the sound
    stopped: AtomicBool,
    /// Set by the mixer once the sound has left the mix
    finished: AtomicBool,
    /// Routing gain per element index (0 = not routed / muted)
    routing: Box<[AtomicF32]>,
}

impl SoundControl {
    pub fn new(element_count: usize, gain: f32) -> Self {
        Self {
            gain: AtomicF32::new(gain),
            muted: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            finished: AtomicBool::new(false),
            routing: (0..element_count).map(|_| AtomicF32::new(0.0)).collect(),
        }
    }

    pub fn gain(&self) -> f32 {
        self.gain.load()
    }

    pub fn set_gain(&self, gain: f32) {
        self.gain.store(gain.max(0.0));
    }

    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::Relaxed)
    }

    pub fn set_muted(&self, muted: bool) {
        self.muted.store(muted, Ordering::Relaxed);
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    pub(crate) fn mark_finished(&self) {
        self.finished.store(true, Ordering::Release);
    }

    /// Routing gain for element `index`; out of range reads as 0
    pub fn routing(&self, index: usize) -> f32 {
        self.routing.get(index).map(AtomicF32::load).unwrap_or(0.0)
    }

    pub fn set_routing(&self, index: usize, gain: f32) {
        if let Some(slot) = self.routing.get(index) {
            slot.store(gain);
        }
    }

    /// Gain the mixer applies before routing
    fn effective_gain(&self) -> f32 {
        if self.is_muted() {
            0.0
        } else {
            self.gain()
        }
    }
}

/// A sound as owned by the mixer
pub struct ActiveSound {
    pub id: SoundId,
    generator: Generator,
    control: Arc<SoundControl>,
}

impl ActiveSound {
    pub fn new(id: SoundId, generator: Generator, control: Arc<SoundControl>) -> Self {
        Self {
            id,
            generator,
            control,
        }
    }
}

/// State shared by the router (simulation thread) and the mixer
pub struct MixerShared {
    pub pending: HandoffQueue<ActiveSound>,
    pub retired: HandoffQueue<ActiveSound>,
    master_muted: AtomicBool,
    element_activity: Box<[AtomicBool]>,
}

impl MixerShared {
    fn new(element_count: usize) -> Self {
        Self {
            pending: HandoffQueue::new(MAX_SOUNDS),
            retired: HandoffQueue::new(MAX_SOUNDS * 2),
            master_muted: AtomicBool::new(false),
            element_activity: (0..element_count).map(|_| AtomicBool::new(false)).collect(),
        }
    }

    pub fn set_master_muted(&self, muted: bool) {
        self.master_muted.store(muted, Ordering::Relaxed);
    }

    pub fn is_master_muted(&self) -> bool {
        self.master_muted.load(Ordering::Relaxed)
    }

    /// Whether any sound wrote to element `index` during the last block
    pub fn is_element_playing(&self, index: usize) -> bool {
        self.element_activity
            .get(index)
            .map(|a| a.load(Ordering::Relaxed))
            .unwrap_or(false)
    }
}

/// Audio-thread mixer; see the module docs for the threading contract
pub struct Mixer {
    shared: Arc<MixerShared>,
    sounds: Vec<ActiveSound>,
    scratch: Vec<f32>,
    /// Output channel per element index
    element_channels: Vec<usize>,
    activity: Vec<bool>,
}

impl Mixer {
    /// Build a mixer for elements mapped onto the given output channels
    pub fn new(element_channels: Vec<usize>) -> (Self, Arc<MixerShared>) {
        let shared = Arc::new(MixerShared::new(element_channels.len()));
        let mixer = Self {
            shared: shared.clone(),
            sounds: Vec::with_capacity(MAX_SOUNDS),
            scratch: vec![0.0; MAX_BLOCK_FRAMES],
            activity: vec![false; element_channels.len()],
            element_channels,
        };
        (mixer, shared)
    }

    /// Sounds currently in the mix
    pub fn active_count(&self) -> usize {
        self.sounds.len()
    }

    /// Render one interleaved block of `channels` channels.
    ///
    /// Every sample of `out` is overwritten. Never allocates, never blocks.
    pub fn fill_buffer(&mut self, out: &mut [f32], channels: usize, sample_rate: u32) {
        let Mixer {
            shared,
            sounds,
            scratch,
            element_channels,
            activity,
        } = self;

        out.fill(0.0);
        let channels = channels.max(1);
        let frames = out.len() / channels;

        while sounds.len() < sounds.capacity() {
            match shared.pending.pop() {
                Some(sound) => sounds.push(sound),
                None => break,
            }
        }

        activity.fill(false);
        let master_muted = shared.is_master_muted();

        let mut i = 0;
        while i < sounds.len() {
            if sounds[i].control.is_stopped() {
                retire(shared, sounds, i);
                continue;
            }

            let sound = &mut sounds[i];
            let gain = if master_muted {
                0.0
            } else {
                sound.control.effective_gain()
            };

            let mut offset = 0;
            while offset < frames {
                let n = (frames - offset).min(scratch.len());
                let block = &mut scratch[..n];
                sound.generator.fill(block, sample_rate);

                if gain > 0.0 {
                    for (element, &channel) in element_channels.iter().enumerate() {
                        let g = gain * sound.control.routing(element);
                        if g <= 0.0 || channel >= channels {
                            continue;
                        }
                        activity[element] = true;
                        for (f, sample) in block.iter().enumerate() {
                            out[(offset + f) * channels + channel] += sample * g;
                        }
                    }
                }
                offset += n;
            }

            if sound.generator.is_finished() {
                retire(shared, sounds, i);
                continue;
            }
            i += 1;
        }

        for (flag, active) in shared.element_activity.iter().zip(activity.iter()) {
            flag.store(*active, Ordering::Relaxed);
        }
    }
}

fn retire(shared: &MixerShared, sounds: &mut Vec<ActiveSound>, index: usize) {
    let sound = sounds.swap_remove(index);
    sound.control.mark_finished();
    // A full retired queue means the simulation thread stalled; dropping here
    // is the only option left.
    let _ = shared.retired.push(sound);
}
