//! Decoded haptic clips and the on-demand clip library

use parking_lot::Mutex;
use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::AudioError;

/// Mono f32 samples at the clip's native rate
#[derive(Debug, Clone, PartialEq)]
pub struct Clip {
    pub name: String,
    pub samples: Arc<[f32]>,
    pub sample_rate: u32,
}

impl Clip {
    /// Decode a WAV file, mixing all channels down to mono
    pub fn load(path: &Path) -> Result<Self, AudioError> {
        let reader = hound::WavReader::open(path).map_err(|e| AudioError::ClipDecode {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self::decode(name, reader).map_err(|reason| AudioError::ClipDecode {
            path: path.to_path_buf(),
            reason,
        })
    }

    fn decode<R: Read>(name: String, reader: hound::WavReader<R>) -> Result<Self, String> {
        let spec = reader.spec();
        let channels = spec.channels.max(1) as usize;

        let interleaved: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .into_samples::<f32>()
                .collect::<Result<_, _>>()
                .map_err(|e| e.to_string())?,
            hound::SampleFormat::Int => {
                let scale = 1.0 / (1i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
                reader
                    .into_samples::<i32>()
                    .map(|s| s.map(|v| v as f32 * scale))
                    .collect::<Result<_, _>>()
                    .map_err(|e| e.to_string())?
            }
        };

        let samples: Vec<f32> = interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect();

        Ok(Self {
            name,
            samples: samples.into(),
            sample_rate: spec.sample_rate,
        })
    }

    pub fn duration_secs(&self) -> f32 {
        self.samples.len() as f32 / self.sample_rate.max(1) as f32
    }
}

/// Clips resolved by name from a directory, decoded once and cached
pub struct ClipLibrary {
    root: PathBuf,
    cache: Mutex<HashMap<String, Arc<Clip>>>,
}

impl ClipLibrary {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Register an already-decoded clip under its name
    pub fn insert(&self, clip: Clip) -> Arc<Clip> {
        let clip = Arc::new(clip);
        self.cache.lock().insert(clip.name.clone(), clip.clone());
        clip
    }

    /// Look up `name`, decoding `<root>/<name>.wav` on first use
    pub fn get(&self, name: &str) -> Result<Arc<Clip>, AudioError> {
        if let Some(clip) = self.cache.lock().get(name) {
            return Ok(clip.clone());
        }

        let file = if Path::new(name).extension().is_some() {
            self.root.join(name)
        } else {
            self.root.join(format!("{}.wav", name))
        };
        let mut clip = Clip::load(&file)?;
        clip.name = name.to_string();
        tracing::debug!(
            "Loaded clip {} ({:.2}s at {} Hz)",
            name,
            clip.duration_secs(),
            clip.sample_rate
        );
        Ok(self.insert(clip))
    }
}
