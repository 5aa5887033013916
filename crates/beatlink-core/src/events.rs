use std::collections::BTreeMap;

use serde::Serialize;
use thiserror::Error;

use crate::{
    sound::{SoundBackend, SoundError},
    transport::TransportState,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Tick,
    Transport,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Event {
    Tick { current_beat: usize },
    Transport { state: TransportState },
}

impl Event {
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::Tick { .. } => EventKind::Tick,
            Self::Transport { .. } => EventKind::Transport,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ListenerId {
    Track(usize),
    Observer(u32),
}

#[derive(Debug, Error)]
pub enum ListenerError {
    #[error(transparent)]
    Sound(#[from] SoundError),
    #[error("observer failed: {0}")]
    Observer(String),
}

pub struct EventContext<'a> {
    pub sound: &'a mut dyn SoundBackend,
}

pub trait Listener {
    fn on_event(
        &mut self,
        event: &Event,
        context: &mut EventContext<'_>,
    ) -> Result<(), ListenerError>;
}

#[derive(Debug, Default, Clone)]
pub struct EventBus {
    subscribers: BTreeMap<EventKind, Vec<ListenerId>>,
}

impl EventBus {
    pub fn subscribe(&mut self, kind: EventKind, listener: ListenerId) -> bool {
        let listeners = self.subscribers.entry(kind).or_default();
        if listeners.contains(&listener) {
            return false;
        }
        listeners.push(listener);
        true
    }

    pub fn unsubscribe(&mut self, kind: EventKind, listener: ListenerId) -> bool {
        let Some(listeners) = self.subscribers.get_mut(&kind) else {
            return false;
        };
        let before = listeners.len();
        listeners.retain(|existing| *existing != listener);
        listeners.len() != before
    }

    pub fn unsubscribe_all(&mut self, listener: ListenerId) {
        for listeners in self.subscribers.values_mut() {
            listeners.retain(|existing| *existing != listener);
        }
    }

    pub fn clear(&mut self) {
        self.subscribers.clear();
    }

    #[must_use]
    pub fn subscribers(&self, kind: EventKind) -> &[ListenerId] {
        self.subscribers.get(&kind).map_or(&[], Vec::as_slice)
    }
}
