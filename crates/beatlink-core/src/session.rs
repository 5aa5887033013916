use std::time::Instant;

use tracing::{info, instrument, warn};

use crate::{
    events::{EventKind, Listener, ListenerId},
    link::LinkHost,
    registry::{SequencerError, ToggleBeat, TrackRegistry},
    schema::{Schema, StateKey, Value},
    sound::SoundBackend,
    state::{Composition, Repair, StateError, StateStore},
    transport::TransportState,
};

pub struct Session<B: SoundBackend> {
    store: StateStore,
    registry: TrackRegistry<B>,
    observers: Vec<(ListenerId, Vec<EventKind>)>,
}

impl<B: SoundBackend> Session<B> {
    pub fn new(store: StateStore, mut registry: TrackRegistry<B>) -> Self {
        registry.init(&store);
        Self {
            store,
            registry,
            observers: Vec::new(),
        }
    }

    pub fn open(link: &str, schema: Schema, sound: B) -> (Self, Vec<Repair>) {
        let mut store = StateStore::new(schema);
        let repairs = store.decode(link);
        (Self::new(store, TrackRegistry::new(sound)), repairs)
    }

    #[must_use]
    pub fn store(&self) -> &StateStore {
        &self.store
    }

    #[must_use]
    pub fn registry(&self) -> &TrackRegistry<B> {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut TrackRegistry<B> {
        &mut self.registry
    }

    #[must_use]
    pub fn composition(&self) -> Composition {
        self.store.composition()
    }

    pub fn attach_observer(
        &mut self,
        observer: Box<dyn Listener>,
        kinds: &[EventKind],
    ) -> ListenerId {
        let id = self.registry.attach_observer(observer);
        for kind in kinds {
            if let Err(error) = self.registry.subscribe(*kind, id) {
                warn!(%error, "observer subscription failed");
            }
        }
        self.observers.push((id, kinds.to_vec()));
        id
    }

    pub fn detach_observer(&mut self, id: ListenerId) -> Option<Box<dyn Listener>> {
        self.observers.retain(|(existing, _)| *existing != id);
        self.registry.detach_observer(id)
    }

    #[instrument(skip(self))]
    pub fn reset(&mut self) -> Vec<Repair> {
        let repairs = self.store.reset_to_defaults();
        self.reinit();
        info!("session reset to defaults");
        repairs
    }

    pub fn toggle_play(&mut self, now: Instant) -> TransportState {
        self.registry.play(&self.store, now)
    }

    pub fn stop(&mut self) -> bool {
        self.registry.stop()
    }

    pub fn set_speed(&mut self, tempo: impl Into<Value>, now: Instant) -> u32 {
        self.registry.set_speed(&mut self.store, tempo, now)
    }

    pub fn toggle_beat(&mut self, request: ToggleBeat) -> Result<bool, SequencerError> {
        self.registry.toggle_beat(&mut self.store, request)
    }

    pub fn set_track_muted(&mut self, slot: usize, muted: bool) -> Result<(), SequencerError> {
        self.registry.set_track_muted(slot, muted)
    }

    pub fn set_track_volume(&mut self, slot: usize, volume: f64) -> Result<f64, SequencerError> {
        self.registry.set_track_volume(&mut self.store, slot, volume)
    }

    #[instrument(skip(self, bars))]
    pub fn set_bar_beats(&mut self, bars: impl Into<Value>) -> Vec<Repair> {
        self.registry.stop();
        let repairs = self.store.set_value(StateKey::BarBeats, bars);
        self.reinit();
        info!(
            total_beats = self.store.total_beats(),
            "bar structure changed"
        );
        repairs
    }

    #[instrument(skip(self, link))]
    pub fn load_link(&mut self, link: &str) -> Vec<Repair> {
        self.registry.stop();
        self.store.reset_to_defaults();
        let repairs = self.store.decode(link);
        self.reinit();
        repairs
    }

    pub fn share_link(&self, host: &dyn LinkHost) -> Result<String, StateError> {
        self.store.encode(&host.base_link())
    }

    pub fn pump(&mut self, now: Instant) -> usize {
        self.registry.pump(now)
    }

    fn reinit(&mut self) {
        self.registry.init(&self.store);
        for (id, kinds) in &self.observers {
            for kind in kinds {
                if let Err(error) = self.registry.subscribe(*kind, *id) {
                    warn!(%error, "observer re-subscription failed");
                }
            }
        }
    }
}
