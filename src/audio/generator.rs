//! Signal sources pulled by the mixer on the audio thread
//!
//! Both generators render mono blocks into a caller-supplied slice and never
//! allocate while rendering.

use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;
use std::sync::Arc;

use crate::audio::clip::Clip;

/// One partial of a generated wave
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Harmonic {
    /// Hz
    pub frequency: f32,
    /// Linear amplitude
    pub volume: f32,
}

impl Harmonic {
    pub const fn new(frequency: f32, volume: f32) -> Self {
        Self { frequency, volume }
    }
}

/// Sum-of-sines synthesizer: `Σ volume_i · sin(2π · phase_i)`
///
/// Each partial keeps its own phase in `[0, 1)` so long runs do not lose
/// precision.
#[derive(Debug, Clone)]
pub struct HarmonicGenerator {
    harmonics: Vec<Harmonic>,
    phases: Vec<f64>,
}

impl HarmonicGenerator {
    pub fn new(harmonics: Vec<Harmonic>) -> Self {
        let phases = vec![0.0; harmonics.len()];
        Self { harmonics, phases }
    }

    pub fn harmonics(&self) -> &[Harmonic] {
        &self.harmonics
    }

    pub fn fill(&mut self, out: &mut [f32], sample_rate: u32) -> usize {
        let sample_rate = sample_rate.max(1) as f64;
        out.fill(0.0);
        for (harmonic, phase) in self.harmonics.iter().zip(self.phases.iter_mut()) {
            let step = harmonic.frequency as f64 / sample_rate;
            let volume = harmonic.volume as f64;
            for sample in out.iter_mut() {
                *sample += (volume * (TAU * *phase).sin()) as f32;
                *phase += step;
                if *phase >= 1.0 {
                    *phase -= phase.floor();
                }
            }
        }
        out.len()
    }
}

/// Plays a decoded clip, optionally looping, resampling to the output rate
#[derive(Debug, Clone)]
pub struct ClipReader {
    clip: Arc<Clip>,
    position: f64,
    looping: bool,
    finished: bool,
}

impl ClipReader {
    pub fn new(clip: Arc<Clip>, looping: bool) -> Self {
        let finished = clip.samples.is_empty();
        Self {
            clip,
            position: 0.0,
            looping,
            finished,
        }
    }

    /// Writes up to `out.len()` samples; the rest of `out` is zeroed.
    pub fn fill(&mut self, out: &mut [f32], sample_rate: u32) -> usize {
        let samples = &self.clip.samples;
        let len = samples.len();
        if self.finished || len == 0 {
            self.finished = true;
            out.fill(0.0);
            return 0;
        }

        let step = self.clip.sample_rate as f64 / sample_rate.max(1) as f64;
        let mut written = 0;
        for sample in out.iter_mut() {
            if self.position >= len as f64 {
                if self.looping {
                    self.position %= len as f64;
                } else {
                    self.finished = true;
                    break;
                }
            }
            let index = self.position as usize;
            let frac = (self.position - index as f64) as f32;
            let a = samples[index];
            let b = if index + 1 < len {
                samples[index + 1]
            } else if self.looping {
                samples[0]
            } else {
                a
            };
            *sample = a + (b - a) * frac;
            self.position += step;
            written += 1;
        }
        if !self.looping && self.position >= len as f64 {
            self.finished = true;
        }
        out[written..].fill(0.0);
        written
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn is_looping(&self) -> bool {
        self.looping
    }
}

/// What drives a sound
#[derive(Debug, Clone)]
pub enum Generator {
    Harmonic(HarmonicGenerator),
    Clip(ClipReader),
}

impl Generator {
    pub fn harmonics(harmonics: Vec<Harmonic>) -> Self {
        Generator::Harmonic(HarmonicGenerator::new(harmonics))
    }

    pub fn clip(clip: Arc<Clip>, looping: bool) -> Self {
        Generator::Clip(ClipReader::new(clip, looping))
    }

    /// Render the next block; returns how many samples carry signal.
    pub fn fill(&mut self, out: &mut [f32], sample_rate: u32) -> usize {
        match self {
            Generator::Harmonic(generator) => generator.fill(out, sample_rate),
            Generator::Clip(reader) => reader.fill(out, sample_rate),
        }
    }

    /// Whether the signal runs out without being stopped
    pub fn is_one_shot(&self) -> bool {
        match self {
            Generator::Harmonic(_) => false,
            Generator::Clip(reader) => !reader.is_looping(),
        }
    }

    /// Generated waves never finish; clips finish unless looping.
    pub fn is_finished(&self) -> bool {
        match self {
            Generator::Harmonic(_) => false,
            Generator::Clip(reader) => reader.is_finished(),
        }
    }
}
