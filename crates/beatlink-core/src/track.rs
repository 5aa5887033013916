use tracing::{debug, instrument, trace, warn};

use crate::{
    events::{Event, EventContext, Listener, ListenerError},
    instrument::Instrument,
    registry::SequencerError,
    schema::{StateKey, Value},
    sound::{PreloadSignal, PreloadStatus, SoundBackend, SoundError, SoundHandle},
    state::{StateStore, TrackEntry},
};

#[derive(Debug)]
pub struct Track {
    slot: usize,
    instrument: Instrument,
    handle: SoundHandle,
    preload: PreloadSignal,
    preload_reported: bool,
    pattern: Vec<bool>,
    muted: bool,
    volume: f64,
}

impl Track {
    pub fn new(slot: usize, entry: &TrackEntry, sound: &mut dyn SoundBackend) -> Self {
        let handle = sound.resolve(entry.instrument);
        let preload = sound.preload(&handle);
        debug!(slot, instrument = %entry.instrument, "track built");
        Self {
            slot,
            instrument: entry.instrument,
            handle,
            preload,
            preload_reported: false,
            pattern: entry.pattern.clone(),
            muted: false,
            volume: entry.volume,
        }
    }

    #[must_use]
    pub fn slot(&self) -> usize {
        self.slot
    }

    #[must_use]
    pub fn instrument(&self) -> Instrument {
        self.instrument
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.instrument.name()
    }

    #[must_use]
    pub fn handle(&self) -> &SoundHandle {
        &self.handle
    }

    #[must_use]
    pub fn pattern(&self) -> &[bool] {
        &self.pattern
    }

    #[must_use]
    pub fn is_muted(&self) -> bool {
        self.muted
    }

    #[must_use]
    pub fn volume(&self) -> f64 {
        self.volume
    }

    #[must_use]
    pub fn preload_status(&self) -> &PreloadStatus {
        self.preload.status()
    }

    pub fn poll_preload(&mut self) -> &PreloadStatus {
        self.preload.poll()
    }

    #[instrument(skip(self, store), fields(slot = self.slot))]
    pub fn toggle_step(
        &mut self,
        store: &mut StateStore,
        step: usize,
    ) -> Result<bool, SequencerError> {
        let len = self.pattern.len();
        if step >= len {
            return Err(SequencerError::StepOutOfBounds {
                track: self.slot,
                step,
                len,
            });
        }

        let mut pattern = self.pattern.clone();
        pattern[step] = !pattern[step];
        store.set_value(StateKey::TrackState(self.slot), Value::Bools(pattern));
        self.sync_from(store);
        Ok(self.pattern.get(step).copied().unwrap_or(false))
    }

    pub fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
    }

    pub fn set_volume(&mut self, store: &mut StateStore, volume: f64) -> f64 {
        store.set_value(StateKey::TrackVolume(self.slot), volume);
        self.sync_from(store);
        self.volume
    }

    pub fn on_tick(
        &mut self,
        beat: usize,
        sound: &mut dyn SoundBackend,
    ) -> Result<bool, SoundError> {
        if self.muted || !self.pattern.get(beat).copied().unwrap_or(false) {
            return Ok(false);
        }

        match self.preload.poll() {
            PreloadStatus::Ready => {}
            PreloadStatus::Pending => {
                trace!(slot = self.slot, beat, "preload pending, step skipped");
                return Ok(false);
            }
            PreloadStatus::Failed(reason) => {
                if !self.preload_reported {
                    warn!(
                        slot = self.slot,
                        instrument = %self.instrument,
                        %reason,
                        "preload failed, track stays silent"
                    );
                    self.preload_reported = true;
                }
                return Ok(false);
            }
        }

        sound.trigger(&self.handle, self.volume)?;
        Ok(true)
    }

    fn sync_from(&mut self, store: &StateStore) {
        if let Some(entry) = store.track(self.slot) {
            self.pattern = entry.pattern;
            self.volume = entry.volume;
        }
    }
}

impl Listener for Track {
    fn on_event(
        &mut self,
        event: &Event,
        context: &mut EventContext<'_>,
    ) -> Result<(), ListenerError> {
        match event {
            Event::Tick { current_beat } => {
                self.on_tick(*current_beat, context.sound)?;
                Ok(())
            }
            Event::Transport { .. } => Ok(()),
        }
    }
}
