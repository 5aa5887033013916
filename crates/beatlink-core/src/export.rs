use std::{
    fs,
    io::{BufWriter, Write},
    path::Path,
    thread,
    time::{Duration, Instant},
};

use anyhow::{Context, Result, anyhow};
use midly::{
    Format, Header, MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind,
    num::{u4, u7, u15, u24, u28},
};
use tempfile::NamedTempFile;
use tracing::{debug, info, instrument, warn};

use crate::{
    registry::TrackRegistry,
    sampler::SampleBank,
    session::Session,
    state::{Composition, StateStore},
    time::{
        DEFAULT_PPQ, DEFAULT_STEPS_PER_BEAT, seconds_to_frames, steps_to_frames, ticks_per_step,
    },
};

/// General MIDI percussion channel (channel 10, zero-based 9).
const GM_DRUM_CHANNEL: u8 = 9;

#[derive(Debug, Clone, PartialEq)]
pub struct RenderOptions {
    pub loops: u32,
    pub steps_per_beat: u32,
    pub tail_seconds: f64,
    pub preload_timeout: Duration,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            loops: 1,
            steps_per_beat: DEFAULT_STEPS_PER_BEAT,
            tail_seconds: 1.0,
            preload_timeout: Duration::from_secs(5),
        }
    }
}

/// Bounces `loops` passes of the composition through `bank` on a synthetic clock.
///
/// Beat 0 of the first pass lands on frame 0. Returns mono samples at the
/// bank's sample rate.
#[instrument(skip(store, bank, options), fields(loops = options.loops))]
pub fn render_composition(
    store: &StateStore,
    bank: SampleBank,
    options: &RenderOptions,
) -> Result<Vec<f32>> {
    let sample_rate = bank.sample_rate();
    let registry = TrackRegistry::with_steps_per_beat(bank, options.steps_per_beat);
    let mut session = Session::new(store.clone(), registry);
    wait_for_preloads(&mut session, options.preload_timeout);

    let tempo = store.tempo();
    let steps_per_beat = session.registry().steps_per_beat();
    let total_ticks = session.registry().total_beats() as u64 * u64::from(options.loops);
    let frame_of = |step: u64| steps_to_frames(step, tempo, steps_per_beat, sample_rate);

    session.toggle_play(Instant::now());
    for step in 0..total_ticks {
        session.registry_mut().sound_mut().mix_until(frame_of(step));
        let Some(due) = session.registry().next_tick_at() else {
            return Err(anyhow!("transport stopped during render"));
        };
        session.pump(due);
    }
    session.stop();

    let end = frame_of(total_ticks) + seconds_to_frames(options.tail_seconds, sample_rate);
    let bank = session.registry_mut().sound_mut();
    bank.mix_until(end);
    let rendered = bank.take_rendered();
    debug!(frames = rendered.len(), ticks = total_ticks, "render completed");
    Ok(rendered)
}

#[instrument(skip(samples), fields(path = %path.display(), frames = samples.len()))]
pub fn export_wav(samples: &[f32], sample_rate: u32, path: &Path) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    write_atomically(path, |file| {
        let mut writer = hound::WavWriter::new(BufWriter::new(file), spec)
            .context("failed to start wav stream")?;
        for sample in samples {
            #[allow(clippy::cast_possible_truncation)]
            let quantized = (sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)).round() as i16;
            writer
                .write_sample(quantized)
                .context("failed to write wav sample")?;
        }
        writer.finalize().context("failed to finalize wav file")
    })?;

    info!("wav export completed");
    Ok(())
}

#[instrument(skip(composition), fields(path = %path.display()))]
pub fn export_midi(
    composition: &Composition,
    loops: u32,
    steps_per_beat: u32,
    path: &Path,
) -> Result<()> {
    let bytes = midi_bytes(composition, loops, steps_per_beat)?;
    write_atomically(path, |file| {
        file.write_all(&bytes).context("failed to write midi bytes")
    })?;
    info!("midi export completed");
    Ok(())
}

pub fn midi_bytes(
    composition: &Composition,
    loops: u32,
    steps_per_beat: u32,
) -> Result<Vec<u8>> {
    let step_ticks = u64::from(ticks_per_step(DEFAULT_PPQ, steps_per_beat));
    let total_steps = composition.total_beats() as u64;

    let mut notes: Vec<(u64, u8, TrackEventKind<'static>)> = Vec::new();
    for pass in 0..u64::from(loops) {
        for track in composition.tracks.values() {
            let Some(velocity) = velocity_for(track.volume) else {
                continue;
            };
            let key = u7::from(track.instrument.gm_drum_key());
            let active_steps = track
                .pattern
                .iter()
                .enumerate()
                .filter_map(|(step, active)| active.then_some(step as u64));
            for step in active_steps {
                let on_tick = (pass * total_steps + step) * step_ticks;
                notes.push((
                    on_tick,
                    1,
                    drum_message(MidiMessage::NoteOn { key, vel: velocity }),
                ));
                notes.push((
                    on_tick + step_ticks,
                    0,
                    drum_message(MidiMessage::NoteOff {
                        key,
                        vel: u7::from(0),
                    }),
                ));
            }
        }
    }
    notes.sort_by_key(|(tick, order, _)| (*tick, *order));

    let mut drum_track = Vec::with_capacity(notes.len() + 2);
    if !composition.title.is_empty() {
        drum_track.push(TrackEvent {
            delta: u28::from(0_u32),
            kind: TrackEventKind::Meta(MetaMessage::TrackName(composition.title.as_bytes())),
        });
    }
    let mut previous = 0_u64;
    for (tick, _, kind) in notes {
        let delta = u32::try_from(tick - previous).unwrap_or(u32::MAX);
        drum_track.push(TrackEvent {
            delta: u28::from(delta),
            kind,
        });
        previous = tick;
    }
    drum_track.push(end_of_track());

    let micros_per_quarter = 60_000_000 / composition.tempo.max(1);
    let tempo_track = vec![
        TrackEvent {
            delta: u28::from(0_u32),
            kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::from(micros_per_quarter))),
        },
        end_of_track(),
    ];

    let smf = Smf {
        header: Header {
            format: Format::Parallel,
            timing: Timing::Metrical(u15::from(DEFAULT_PPQ)),
        },
        tracks: vec![tempo_track, drum_track],
    };
    let mut bytes = Vec::new();
    smf.write_std(&mut bytes).context("failed to encode midi bytes")?;
    Ok(bytes)
}

fn wait_for_preloads(session: &mut Session<SampleBank>, timeout: Duration) {
    let started = Instant::now();
    loop {
        let pending = session.registry_mut().preloads_pending();
        if pending == 0 {
            return;
        }
        if started.elapsed() >= timeout {
            warn!(
                pending,
                timeout_ms = timeout.as_millis(),
                "rendering before every sample finished loading"
            );
            return;
        }
        thread::sleep(Duration::from_millis(5));
    }
}

fn write_atomically(path: &Path, write: impl FnOnce(&mut fs::File) -> Result<()>) -> Result<()> {
    let parent = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)
        .with_context(|| format!("failed to create output directory: {}", parent.display()))?;

    let mut temp_file = NamedTempFile::new_in(parent)
        .with_context(|| format!("failed to create temp file in {}", parent.display()))?;
    write(temp_file.as_file_mut())?;
    temp_file
        .persist(path)
        .map_err(|error| anyhow!(error.error))
        .with_context(|| format!("failed to persist {}", path.display()))?;
    Ok(())
}

fn velocity_for(volume: f64) -> Option<u7> {
    if volume <= 0.0 {
        return None;
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let velocity = (volume * 100.0).round().clamp(1.0, 127.0) as u8;
    Some(u7::from(velocity))
}

fn drum_message(message: MidiMessage) -> TrackEventKind<'static> {
    TrackEventKind::Midi {
        channel: u4::from(GM_DRUM_CHANNEL),
        message,
    }
}

fn end_of_track() -> TrackEvent<'static> {
    TrackEvent {
        delta: u28::from(0_u32),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    }
}
