use std::{
    collections::BTreeMap,
    time::{Duration, Instant},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, instrument, trace, warn};

use crate::{
    events::{Event, EventBus, EventContext, EventKind, Listener, ListenerId},
    schema::{StateKey, Value},
    sound::{PreloadStatus, SoundBackend},
    state::StateStore,
    time::{DEFAULT_STEPS_PER_BEAT, step_period},
    track::Track,
    transport::{Transport, TransportState},
};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SequencerError {
    #[error("no live track in slot {0}")]
    TrackNotFound(usize),
    #[error("step {step} out of bounds for track {track} with {len} steps")]
    StepOutOfBounds {
        track: usize,
        step: usize,
        len: usize,
    },
    #[error("listener not found: {0:?}")]
    ListenerNotFound(ListenerId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToggleBeat {
    pub track_index: usize,
    pub beat_index: usize,
}

pub struct TrackRegistry<B: SoundBackend> {
    sound: B,
    tracks: Vec<Track>,
    observers: BTreeMap<u32, Box<dyn Listener>>,
    next_observer: u32,
    bus: EventBus,
    transport: Transport,
    current_beat: usize,
    total_beats: usize,
    steps_per_beat: u32,
    ticks_published: u64,
}

impl<B: SoundBackend> TrackRegistry<B> {
    pub fn new(sound: B) -> Self {
        Self::with_steps_per_beat(sound, DEFAULT_STEPS_PER_BEAT)
    }

    pub fn with_steps_per_beat(sound: B, steps_per_beat: u32) -> Self {
        Self {
            sound,
            tracks: Vec::new(),
            observers: BTreeMap::new(),
            next_observer: 0,
            bus: EventBus::default(),
            transport: Transport::new(),
            current_beat: 0,
            total_beats: 0,
            steps_per_beat: steps_per_beat.max(1),
            ticks_published: 0,
        }
    }

    /// Stops playback and rebuilds every track from the store.
    ///
    /// All subscriptions are dropped; tracks are re-subscribed to ticks, observers
    /// have to subscribe again.
    #[instrument(skip(self, store))]
    pub fn init(&mut self, store: &StateStore) {
        if self.transport.stop() {
            self.publish(Event::Transport {
                state: TransportState::Stopped,
            });
        }
        self.current_beat = 0;
        self.total_beats = store.total_beats();
        self.bus.clear();
        self.tracks.clear();
        self.sound.abandon_preloads();

        let composition = store.composition();
        self.tracks = composition
            .tracks
            .iter()
            .map(|(slot, entry)| Track::new(*slot, entry, &mut self.sound))
            .collect();
        for track in &self.tracks {
            self.bus
                .subscribe(EventKind::Tick, ListenerId::Track(track.slot()));
        }

        info!(
            tracks = self.tracks.len(),
            total_beats = self.total_beats,
            tempo = composition.tempo,
            "track registry initialised"
        );
    }

    pub fn attach_observer(&mut self, observer: Box<dyn Listener>) -> ListenerId {
        let id = self.next_observer;
        self.next_observer += 1;
        self.observers.insert(id, observer);
        ListenerId::Observer(id)
    }

    pub fn detach_observer(&mut self, id: ListenerId) -> Option<Box<dyn Listener>> {
        let ListenerId::Observer(key) = id else {
            return None;
        };
        let observer = self.observers.remove(&key)?;
        self.bus.unsubscribe_all(id);
        Some(observer)
    }

    pub fn subscribe(&mut self, kind: EventKind, id: ListenerId) -> Result<bool, SequencerError> {
        let known = match id {
            ListenerId::Track(slot) => self.track(slot).is_some(),
            ListenerId::Observer(key) => self.observers.contains_key(&key),
        };
        if !known {
            return Err(SequencerError::ListenerNotFound(id));
        }
        Ok(self.bus.subscribe(kind, id))
    }

    pub fn unsubscribe(&mut self, kind: EventKind, id: ListenerId) -> bool {
        self.bus.unsubscribe(kind, id)
    }

    #[instrument(skip(self, store))]
    pub fn play(&mut self, store: &StateStore, now: Instant) -> TransportState {
        if self.transport.stop() {
            info!(beat = self.current_beat, "transport stopped");
        } else {
            let period = step_period(store.tempo(), self.steps_per_beat);
            self.transport.start(period, now);
            info!(
                beat = self.current_beat,
                period_ms = period.as_millis(),
                "transport started"
            );
        }
        let state = self.transport.state();
        self.publish(Event::Transport { state });
        state
    }

    pub fn stop(&mut self) -> bool {
        if !self.transport.stop() {
            return false;
        }
        info!(beat = self.current_beat, "transport stopped");
        self.publish(Event::Transport {
            state: TransportState::Stopped,
        });
        true
    }

    pub fn pump(&mut self, now: Instant) -> usize {
        let mut fired = 0;
        while self.transport.take_due(now).is_some() {
            self.tick();
            fired += 1;
        }
        fired
    }

    #[instrument(skip(self, store, tempo))]
    pub fn set_speed(
        &mut self,
        store: &mut StateStore,
        tempo: impl Into<Value>,
        now: Instant,
    ) -> u32 {
        store.set_value(StateKey::Bpm, tempo);
        let bpm = store.tempo();
        let period = step_period(bpm, self.steps_per_beat);
        let restarted = self.transport.restart(period, now);
        info!(bpm, restarted, beat = self.current_beat, "tempo changed");
        bpm
    }

    pub fn toggle_beat(
        &mut self,
        store: &mut StateStore,
        request: ToggleBeat,
    ) -> Result<bool, SequencerError> {
        self.track_mut(request.track_index)?
            .toggle_step(store, request.beat_index)
    }

    pub fn set_track_muted(&mut self, slot: usize, muted: bool) -> Result<(), SequencerError> {
        self.track_mut(slot)?.set_muted(muted);
        Ok(())
    }

    pub fn set_track_volume(
        &mut self,
        store: &mut StateStore,
        slot: usize,
        volume: f64,
    ) -> Result<f64, SequencerError> {
        Ok(self.track_mut(slot)?.set_volume(store, volume))
    }

    #[must_use]
    pub fn track_names(&self) -> Vec<&'static str> {
        self.tracks.iter().map(Track::name).collect()
    }

    #[must_use]
    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    #[must_use]
    pub fn track(&self, slot: usize) -> Option<&Track> {
        self.tracks.iter().find(|track| track.slot() == slot)
    }

    #[must_use]
    pub fn current_beat(&self) -> usize {
        self.current_beat
    }

    #[must_use]
    pub fn total_beats(&self) -> usize {
        self.total_beats
    }

    #[must_use]
    pub fn steps_per_beat(&self) -> u32 {
        self.steps_per_beat
    }

    #[must_use]
    pub fn ticks_published(&self) -> u64 {
        self.ticks_published
    }

    #[must_use]
    pub fn is_playing(&self) -> bool {
        self.transport.is_playing()
    }

    #[must_use]
    pub fn state(&self) -> TransportState {
        self.transport.state()
    }

    #[must_use]
    pub fn period(&self) -> Option<Duration> {
        self.transport.period()
    }

    #[must_use]
    pub fn next_tick_at(&self) -> Option<Instant> {
        self.transport.next_tick_at()
    }

    #[must_use]
    pub fn sound(&self) -> &B {
        &self.sound
    }

    pub fn sound_mut(&mut self) -> &mut B {
        &mut self.sound
    }

    pub fn preloads_pending(&mut self) -> usize {
        let mut pending = 0;
        for track in &mut self.tracks {
            if *track.poll_preload() == PreloadStatus::Pending {
                pending += 1;
            }
        }
        pending
    }

    fn track_mut(&mut self, slot: usize) -> Result<&mut Track, SequencerError> {
        self.tracks
            .iter_mut()
            .find(|track| track.slot() == slot)
            .ok_or(SequencerError::TrackNotFound(slot))
    }

    fn tick(&mut self) {
        let beat = self.current_beat;
        trace!(beat, "tick");
        self.publish(Event::Tick { current_beat: beat });
        self.current_beat = (beat + 1) % self.total_beats.max(1);
        self.ticks_published += 1;
    }

    fn publish(&mut self, event: Event) -> usize {
        let subscribers = self.bus.subscribers(event.kind()).to_vec();
        let mut failures = 0;
        for id in subscribers {
            let mut context = EventContext {
                sound: &mut self.sound,
            };
            let result = match id {
                ListenerId::Track(slot) => {
                    match self.tracks.iter_mut().find(|track| track.slot() == slot) {
                        Some(track) => track.on_event(&event, &mut context),
                        None => continue,
                    }
                }
                ListenerId::Observer(key) => match self.observers.get_mut(&key) {
                    Some(observer) => observer.on_event(&event, &mut context),
                    None => continue,
                },
            };
            if let Err(error) = result {
                failures += 1;
                warn!(listener = ?id, ?event, %error, "listener failed, delivery continues");
            }
        }
        failures
    }
}
