use std::{collections::BTreeSet, path::PathBuf};

use crossbeam_channel::{Receiver, Sender, TryRecvError};
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::instrument::Instrument;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SoundError {
    #[error("sound not loaded: {0}")]
    NotLoaded(Instrument),
    #[error("playback failed for {instrument}: {reason}")]
    Playback {
        instrument: Instrument,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SoundHandle {
    pub instrument: Instrument,
    pub source: PathBuf,
}

impl SoundHandle {
    #[must_use]
    pub fn for_instrument(instrument: Instrument) -> Self {
        Self {
            instrument,
            source: PathBuf::from(instrument.sound_file()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreloadStatus {
    Pending,
    Ready,
    Failed(String),
}

#[derive(Debug)]
pub struct PreloadCompleter {
    sender: Sender<Result<(), String>>,
}

impl PreloadCompleter {
    pub fn complete(self) {
        let _ = self.sender.send(Ok(()));
    }

    pub fn fail(self, reason: impl Into<String>) {
        let _ = self.sender.send(Err(reason.into()));
    }
}

#[derive(Debug)]
pub struct PreloadSignal {
    status: PreloadStatus,
    receiver: Option<Receiver<Result<(), String>>>,
}

impl PreloadSignal {
    #[must_use]
    pub fn channel() -> (PreloadCompleter, Self) {
        let (sender, receiver) = crossbeam_channel::bounded(1);
        (
            PreloadCompleter { sender },
            Self {
                status: PreloadStatus::Pending,
                receiver: Some(receiver),
            },
        )
    }

    #[must_use]
    pub fn ready() -> Self {
        Self {
            status: PreloadStatus::Ready,
            receiver: None,
        }
    }

    #[must_use]
    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            status: PreloadStatus::Failed(reason.into()),
            receiver: None,
        }
    }

    pub fn poll(&mut self) -> &PreloadStatus {
        if let Some(receiver) = &self.receiver {
            let settled = match receiver.try_recv() {
                Ok(Ok(())) => Some(PreloadStatus::Ready),
                Ok(Err(reason)) => Some(PreloadStatus::Failed(reason)),
                Err(TryRecvError::Empty) => None,
                Err(TryRecvError::Disconnected) => {
                    Some(PreloadStatus::Failed("preload abandoned".to_string()))
                }
            };
            if let Some(status) = settled {
                debug!(?status, "preload settled");
                self.status = status;
                self.receiver = None;
            }
        }
        &self.status
    }

    #[must_use]
    pub fn status(&self) -> &PreloadStatus {
        &self.status
    }
}

pub trait SoundBackend {
    fn resolve(&mut self, instrument: Instrument) -> SoundHandle;

    fn preload(&mut self, handle: &SoundHandle) -> PreloadSignal;

    fn trigger(&mut self, handle: &SoundHandle, volume: f64) -> Result<(), SoundError>;

    /// Every signal handed out so far has been dropped; loads still queued for
    /// them can be discarded.
    fn abandon_preloads(&mut self) {}
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TriggerRecord {
    pub instrument: Instrument,
    pub volume: f64,
}

#[derive(Debug, Default)]
pub struct RecordingBackend {
    triggers: Vec<TriggerRecord>,
    trigger_count: usize,
    count_only: bool,
    deferred: Vec<(SoundHandle, PreloadCompleter)>,
    defer_preloads: bool,
    failing: BTreeSet<Instrument>,
}

impl RecordingBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn deferred() -> Self {
        Self {
            defer_preloads: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn counting() -> Self {
        Self {
            count_only: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn failing_on(mut self, instrument: Instrument) -> Self {
        self.failing.insert(instrument);
        self
    }

    pub fn complete_preloads(&mut self) -> usize {
        let completed = self.deferred.len();
        for (handle, completer) in self.deferred.drain(..) {
            debug!(instrument = %handle.instrument, "deferred preload completed");
            completer.complete();
        }
        completed
    }

    #[must_use]
    pub fn triggers(&self) -> &[TriggerRecord] {
        &self.triggers
    }

    #[must_use]
    pub fn trigger_count(&self) -> usize {
        self.trigger_count
    }
}

impl SoundBackend for RecordingBackend {
    fn resolve(&mut self, instrument: Instrument) -> SoundHandle {
        SoundHandle::for_instrument(instrument)
    }

    fn preload(&mut self, handle: &SoundHandle) -> PreloadSignal {
        if !self.defer_preloads {
            return PreloadSignal::ready();
        }
        let (completer, signal) = PreloadSignal::channel();
        self.deferred.push((handle.clone(), completer));
        signal
    }

    fn trigger(&mut self, handle: &SoundHandle, volume: f64) -> Result<(), SoundError> {
        if self.failing.contains(&handle.instrument) {
            return Err(SoundError::Playback {
                instrument: handle.instrument,
                reason: "simulated failure".to_string(),
            });
        }
        self.trigger_count += 1;
        if !self.count_only {
            self.triggers.push(TriggerRecord {
                instrument: handle.instrument,
                volume,
            });
        }
        Ok(())
    }

    fn abandon_preloads(&mut self) {
        if !self.deferred.is_empty() {
            debug!(dropped = self.deferred.len(), "abandoned deferred preloads");
            self.deferred.clear();
        }
    }
}
