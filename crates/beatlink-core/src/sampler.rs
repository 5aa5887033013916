use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::Arc,
    thread,
};

use anyhow::Result;
use parking_lot::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::{
    assets::{decode_audio_file_mono, discover_sound_files},
    instrument::Instrument,
    sound::{PreloadSignal, SoundBackend, SoundError, SoundHandle},
};

type SampleCache = Arc<Mutex<BTreeMap<PathBuf, Arc<[f32]>>>>;

#[derive(Debug, Clone)]
struct Voice {
    samples: Arc<[f32]>,
    position: usize,
    gain: f32,
}

#[derive(Debug)]
pub struct SampleBank {
    root: PathBuf,
    overrides: BTreeMap<Instrument, PathBuf>,
    sample_rate: u32,
    cache: SampleCache,
    voices: Vec<Voice>,
    rendered: Vec<f32>,
}

impl SampleBank {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, sample_rate: u32) -> Self {
        Self {
            root: root.into(),
            overrides: BTreeMap::new(),
            sample_rate: sample_rate.max(1),
            cache: Arc::new(Mutex::new(BTreeMap::new())),
            voices: Vec::new(),
            rendered: Vec::new(),
        }
    }

    pub fn from_directory(directory: &Path, sample_rate: u32) -> Result<Self> {
        let overrides = discover_sound_files(directory)?;
        info!(
            directory = %directory.display(),
            found = overrides.len(),
            "sample directory scanned"
        );
        let mut bank = Self::new(directory, sample_rate);
        bank.overrides = overrides;
        Ok(bank)
    }

    #[must_use]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    #[must_use]
    pub fn cached_samples(&self) -> usize {
        self.cache.lock().len()
    }

    #[must_use]
    pub fn active_voices(&self) -> usize {
        self.voices.len()
    }

    #[must_use]
    pub fn position(&self) -> usize {
        self.rendered.len()
    }

    pub fn mix_until(&mut self, frame: usize) {
        let start = self.rendered.len();
        if frame <= start {
            return;
        }
        self.rendered.resize(frame, 0.0);
        let window = &mut self.rendered[start..];
        for voice in &mut self.voices {
            let remaining = &voice.samples[voice.position.min(voice.samples.len())..];
            let count = remaining.len().min(window.len());
            for (out, sample) in window.iter_mut().zip(&remaining[..count]) {
                *out += sample * voice.gain;
            }
            voice.position += count;
        }
        self.voices.retain(|voice| voice.position < voice.samples.len());
    }

    pub fn take_rendered(&mut self) -> Vec<f32> {
        self.voices.clear();
        let mut rendered = std::mem::take(&mut self.rendered);
        for sample in &mut rendered {
            *sample = sample.clamp(-1.0, 1.0);
        }
        rendered
    }
}

impl SoundBackend for SampleBank {
    fn resolve(&mut self, instrument: Instrument) -> SoundHandle {
        let source = self
            .overrides
            .get(&instrument)
            .cloned()
            .unwrap_or_else(|| self.root.join(instrument.sound_file()));
        SoundHandle { instrument, source }
    }

    #[instrument(skip(self), fields(instrument = %handle.instrument))]
    fn preload(&mut self, handle: &SoundHandle) -> PreloadSignal {
        if self.cache.lock().contains_key(&handle.source) {
            return PreloadSignal::ready();
        }

        let (completer, signal) = PreloadSignal::channel();
        let cache = Arc::clone(&self.cache);
        let source = handle.source.clone();
        let sample_rate = self.sample_rate;
        let spawned = thread::Builder::new()
            .name(format!("preload-{}", handle.instrument))
            .spawn(move || match decode_audio_file_mono(&source) {
                Ok(decoded) => {
                    let samples: Arc<[f32]> = decoded.resampled(sample_rate).samples.into();
                    debug!(path = %source.display(), frames = samples.len(), "sample cached");
                    cache.lock().insert(source, samples);
                    completer.complete();
                }
                Err(error) => {
                    let reason = format!("{error:#}");
                    warn!(path = %source.display(), %reason, "sample preload failed");
                    completer.fail(reason);
                }
            });

        match spawned {
            Ok(_) => signal,
            Err(error) => {
                PreloadSignal::failed(format!("failed to spawn loader thread: {error}"))
            }
        }
    }

    fn trigger(&mut self, handle: &SoundHandle, volume: f64) -> Result<(), SoundError> {
        let samples = self
            .cache
            .lock()
            .get(&handle.source)
            .cloned()
            .ok_or(SoundError::NotLoaded(handle.instrument))?;
        if volume <= 0.0 {
            return Ok(());
        }
        #[allow(clippy::cast_possible_truncation)]
        let gain = volume as f32;
        self.voices.push(Voice {
            samples,
            position: 0,
            gain,
        });
        Ok(())
    }
}
