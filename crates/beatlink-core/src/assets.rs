use std::{
    collections::BTreeMap,
    fs::File,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, anyhow, bail};
use serde::Serialize;
use symphonia::core::{
    audio::{AudioBufferRef, SampleBuffer},
    codecs::DecoderOptions,
    errors::Error as SymphoniaError,
    formats::{FormatOptions, FormatReader, Packet},
    io::MediaSourceStream,
    meta::MetadataOptions,
    probe::Hint,
};
use tracing::{debug, instrument, warn};
use walkdir::WalkDir;

use crate::instrument::Instrument;

pub const SAMPLE_EXTENSIONS: &[&str] = &["wav", "mp3", "flac", "ogg", "aiff", "aif"];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodedAudio {
    pub sample_rate: u32,
    pub source_channels: u16,
    pub samples: Vec<f32>,
}

impl DecodedAudio {
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / f64::from(self.sample_rate)
    }

    #[must_use]
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn resampled(&self, target_rate: u32) -> Self {
        if self.sample_rate == target_rate || self.sample_rate == 0 || self.samples.is_empty() {
            return Self {
                sample_rate: target_rate,
                ..self.clone()
            };
        }

        let ratio = f64::from(self.sample_rate) / f64::from(target_rate);
        let frames = ((self.samples.len() as f64) / ratio).round() as usize;
        let last = self.samples.len() - 1;
        let samples = (0..frames)
            .map(|frame| {
                let position = frame as f64 * ratio;
                let index = (position.floor() as usize).min(last);
                let next = (index + 1).min(last);
                let fraction = (position - index as f64) as f32;
                self.samples[index] + (self.samples[next] - self.samples[index]) * fraction
            })
            .collect();

        Self {
            sample_rate: target_rate,
            source_channels: self.source_channels,
            samples,
        }
    }
}

#[instrument(fields(path = %path.display()))]
pub fn decode_audio_file_mono(path: &Path) -> Result<DecodedAudio> {
    let file = File::open(path)
        .with_context(|| format!("failed to open sample file: {}", path.display()))?;
    let stream = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(extension) = path.extension().and_then(|value| value.to_str()) {
        hint.with_extension(extension);
    }

    let mut format = symphonia::default::get_probe()
        .format(
            &hint,
            stream,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .with_context(|| format!("unrecognised sample format: {}", path.display()))?
        .format;
    let track = format
        .default_track()
        .ok_or_else(|| anyhow!("no audio track in {}", path.display()))?;
    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(44_100);
    let mut source_channels = track
        .codec_params
        .channels
        .and_then(|channels| u16::try_from(channels.count()).ok())
        .unwrap_or(1);
    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .with_context(|| format!("no decoder for {}", path.display()))?;

    let mut samples = Vec::new();
    while let Some(packet) = next_packet(format.as_mut(), track_id, path)? {
        let buffer = match decoder.decode(&packet) {
            Ok(buffer) => buffer,
            Err(SymphoniaError::DecodeError(reason)) => {
                debug!(reason, "skipping undecodable packet");
                continue;
            }
            Err(error) => {
                return Err(error).with_context(|| format!("failed decoding {}", path.display()));
            }
        };
        sample_rate = buffer.spec().rate;
        source_channels = u16::try_from(buffer.spec().channels.count()).unwrap_or(u16::MAX);
        downmix_into(buffer, &mut samples);
    }

    if samples.is_empty() {
        bail!("decoded zero samples from {}", path.display());
    }

    debug!(
        sample_rate,
        source_channels,
        frames = samples.len(),
        "sample decoded"
    );
    Ok(DecodedAudio {
        sample_rate,
        source_channels,
        samples,
    })
}

#[instrument(fields(directory = %directory.display()))]
pub fn discover_sound_files(directory: &Path) -> Result<BTreeMap<Instrument, PathBuf>> {
    if !directory.is_dir() {
        bail!("sample directory not found: {}", directory.display());
    }

    let mut candidates: Vec<PathBuf> = Vec::new();
    for entry in WalkDir::new(directory).follow_links(true) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(error) => {
                warn!(?error, "skipping unreadable entry in sample directory");
                continue;
            }
        };
        if entry.file_type().is_file() && has_sample_extension(entry.path()) {
            candidates.push(entry.into_path());
        }
    }
    candidates.sort();

    let mut found = BTreeMap::new();
    for path in candidates {
        let instrument = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .and_then(|stem| Instrument::from_name(&stem.to_ascii_lowercase()));
        if let Some(instrument) = instrument {
            found.entry(instrument).or_insert(path);
        }
    }

    debug!(count = found.len(), "sample discovery complete");
    Ok(found)
}

fn has_sample_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|value| value.to_str())
        .is_some_and(|extension| {
            SAMPLE_EXTENSIONS.contains(&extension.to_ascii_lowercase().as_str())
        })
}

fn next_packet(
    format: &mut dyn FormatReader,
    track_id: u32,
    path: &Path,
) -> Result<Option<Packet>> {
    loop {
        match format.next_packet() {
            Ok(packet) if packet.track_id() == track_id => return Ok(Some(packet)),
            Ok(_) => {}
            Err(SymphoniaError::IoError(error)) if error.kind() == ErrorKind::UnexpectedEof => {
                return Ok(None);
            }
            Err(error) => {
                return Err(error).with_context(|| format!("failed reading {}", path.display()));
            }
        }
    }
}

#[allow(clippy::cast_precision_loss)]
fn downmix_into(buffer: AudioBufferRef<'_>, samples: &mut Vec<f32>) {
    let spec = *buffer.spec();
    let channels = spec.channels.count().max(1);
    let mut interleaved = SampleBuffer::<f32>::new(buffer.capacity() as u64, spec);
    interleaved.copy_interleaved_ref(buffer);
    samples.extend(
        interleaved
            .samples()
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32),
    );
}
