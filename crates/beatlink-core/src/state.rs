use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::{
    instrument::Instrument,
    link::query_params,
    schema::{
        DEFAULT_BAR_BEATS, DEFAULT_BPM, DEFAULT_VOLUME, FieldKind, Repaired, Schema, StateKey,
        Value,
    },
};

#[derive(Debug, Error)]
pub enum StateError {
    #[error("invalid base link {link:?}: {source}")]
    InvalidBaseLink {
        link: String,
        source: url::ParseError,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Repair {
    MalformedLinkValue { key: StateKey, raw: String },
    OutOfRange { key: StateKey },
    ReplacedWithDefault { key: StateKey },
    InvalidTrackDefinition { slot: usize },
    PatternResized { slot: usize, from: usize, to: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackEntry {
    pub instrument: Instrument,
    pub pattern: Vec<bool>,
    pub volume: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Composition {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub title: String,
    pub bar_beats: Vec<u32>,
    pub tempo: u32,
    pub tracks: BTreeMap<usize, TrackEntry>,
}

impl Composition {
    #[must_use]
    pub fn total_beats(&self) -> usize {
        self.bar_beats.iter().map(|beats| *beats as usize).sum()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StateStore {
    schema: Schema,
    data: BTreeMap<StateKey, Value>,
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new(Schema::drum_machine())
    }
}

impl StateStore {
    #[must_use]
    pub fn new(schema: Schema) -> Self {
        let mut store = Self {
            data: schema.defaults(),
            schema,
        };
        store.validate();
        store
    }

    #[must_use]
    pub fn from_link(link: &str, schema: Schema) -> Self {
        let mut store = Self::new(schema);
        store.decode(link);
        store
    }

    #[must_use]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn reset_to_defaults(&mut self) -> Vec<Repair> {
        self.data = self.schema.defaults();
        self.validate()
    }

    #[instrument(skip(self, link), fields(link_len = link.len()))]
    pub fn decode(&mut self, link: &str) -> Vec<Repair> {
        let params = query_params(link);
        let mut repairs = Vec::new();

        for field in self.schema.fields() {
            let Some(raw) = params.get(&field.key.to_string()) else {
                continue;
            };
            match field.kind.decode(raw) {
                Some(value) => {
                    self.data.insert(field.key, value);
                }
                None => {
                    warn!(key = %field.key, raw = %raw, "malformed link value ignored");
                    repairs.push(Repair::MalformedLinkValue {
                        key: field.key,
                        raw: raw.clone(),
                    });
                }
            }
        }

        repairs.extend(self.validate());
        info!(
            repairs = repairs.len(),
            tracks = self.track_slots().len(),
            "link state decoded"
        );
        repairs
    }

    pub fn validate(&mut self) -> Vec<Repair> {
        let mut repairs = Vec::new();
        let schema = self.schema.clone();

        for field in schema.fields() {
            if field.key.track_slot().is_none() {
                self.repair_field(field.key, &field.kind, &mut repairs);
            }
        }

        let total_beats = self.total_beats();
        for slot in schema.track_slots() {
            self.repair_track(slot, total_beats, &mut repairs);
        }

        let before = self.data.len();
        self.data.retain(|key, _| schema.field(*key).is_some());
        if self.data.len() != before {
            debug!(
                dropped = before - self.data.len(),
                "dropped keys missing from schema"
            );
        }

        for repair in &repairs {
            debug!(?repair, "state repaired");
        }
        repairs
    }

    #[must_use]
    pub fn get_value(&self, key: StateKey) -> Option<Value> {
        self.data.get(&key).cloned()
    }

    #[instrument(skip(self, value), fields(key = %key))]
    pub fn set_value(&mut self, key: StateKey, value: impl Into<Value>) -> Vec<Repair> {
        if self.schema.field(key).is_none() {
            warn!("ignoring write to key missing from schema");
            return Vec::new();
        }
        self.data.insert(key, value.into());
        self.validate()
    }

    pub fn replace_composition(&mut self, composition: &Composition) -> Vec<Repair> {
        let mut data = BTreeMap::new();
        if !composition.title.is_empty() {
            data.insert(StateKey::Title, Value::Text(composition.title.clone()));
        }
        data.insert(
            StateKey::BarBeats,
            Value::Ints(composition.bar_beats.iter().map(|b| i64::from(*b)).collect()),
        );
        data.insert(StateKey::Bpm, Value::from(composition.tempo));
        for (slot, track) in &composition.tracks {
            data.insert(
                StateKey::TrackSound(*slot),
                Value::from(track.instrument.code()),
            );
            data.insert(
                StateKey::TrackState(*slot),
                Value::Bools(track.pattern.clone()),
            );
            data.insert(StateKey::TrackVolume(*slot), Value::Float(track.volume));
        }
        self.data = data;
        self.validate()
    }

    /// Writes every stored schema value onto `base_link`'s query, keeping any
    /// parameters the schema does not own.
    pub fn encode(&self, base_link: &str) -> Result<String, StateError> {
        let mut url = Url::parse(base_link).map_err(|source| StateError::InvalidBaseLink {
            link: base_link.to_string(),
            source,
        })?;

        let foreign: Vec<(String, String)> = url
            .query_pairs()
            .into_owned()
            .filter(|(name, _)| {
                StateKey::parse(name).is_none_or(|key| self.schema.field(key).is_none())
            })
            .collect();

        {
            let mut pairs = url.query_pairs_mut();
            pairs.clear();
            pairs.extend_pairs(foreign);
            for field in self.schema.fields() {
                let encoded = match self.data.get(&field.key) {
                    Some(value) => field.kind.encode(value),
                    // A default track slot that was removed is written as an empty
                    // instrument so decoding onto the defaults removes it again.
                    None if matches!(field.key, StateKey::TrackSound(_))
                        && self.schema.default_for(field.key).is_some() =>
                    {
                        Some(String::new())
                    }
                    None => None,
                };
                if let Some(encoded) = encoded {
                    pairs.append_pair(&field.key.to_string(), &encoded);
                }
            }
        }

        Ok(url.into())
    }

    #[must_use]
    pub fn title(&self) -> String {
        match self.data.get(&StateKey::Title) {
            Some(Value::Text(title)) => title.clone(),
            _ => String::new(),
        }
    }

    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn tempo(&self) -> u32 {
        match self.data.get(&StateKey::Bpm) {
            Some(Value::Int(bpm)) => u32::try_from(*bpm).unwrap_or(DEFAULT_BPM as u32),
            _ => DEFAULT_BPM as u32,
        }
    }

    #[must_use]
    pub fn bar_beats(&self) -> Vec<u32> {
        let bars = match self.data.get(&StateKey::BarBeats) {
            Some(Value::Ints(bars)) => bars.as_slice(),
            _ => DEFAULT_BAR_BEATS.as_slice(),
        };
        bars.iter()
            .filter_map(|beats| u32::try_from(*beats).ok())
            .collect()
    }

    #[must_use]
    pub fn total_beats(&self) -> usize {
        self.bar_beats().iter().map(|beats| *beats as usize).sum()
    }

    #[must_use]
    pub fn track_slots(&self) -> Vec<usize> {
        self.data
            .keys()
            .filter_map(|key| match key {
                StateKey::TrackSound(slot) => Some(*slot),
                _ => None,
            })
            .filter(|slot| self.data.contains_key(&StateKey::TrackState(*slot)))
            .collect()
    }

    #[must_use]
    pub fn track(&self, slot: usize) -> Option<TrackEntry> {
        let instrument = match self.data.get(&StateKey::TrackSound(slot))? {
            Value::Text(code) => Instrument::from_code(code)?,
            _ => return None,
        };
        let pattern = match self.data.get(&StateKey::TrackState(slot))? {
            Value::Bools(steps) => steps.clone(),
            _ => return None,
        };
        let volume = match self.data.get(&StateKey::TrackVolume(slot)) {
            Some(Value::Float(volume)) => *volume,
            _ => DEFAULT_VOLUME,
        };
        Some(TrackEntry {
            instrument,
            pattern,
            volume,
        })
    }

    #[must_use]
    pub fn composition(&self) -> Composition {
        Composition {
            title: self.title(),
            bar_beats: self.bar_beats(),
            tempo: self.tempo(),
            tracks: self
                .track_slots()
                .into_iter()
                .filter_map(|slot| self.track(slot).map(|track| (slot, track)))
                .collect(),
        }
    }

    fn repair_field(
        &mut self,
        key: StateKey,
        kind: &FieldKind,
        repairs: &mut Vec<Repair>,
    ) -> bool {
        let current = self.data.remove(&key);
        let present = current.is_some();
        match kind.repair(current) {
            Repaired::Valid(value) | Repaired::Converted(value) => {
                self.data.insert(key, value);
                true
            }
            Repaired::Adjusted(value) => {
                repairs.push(Repair::OutOfRange { key });
                self.data.insert(key, value);
                true
            }
            Repaired::Defaulted(value) => {
                if present {
                    repairs.push(Repair::ReplacedWithDefault { key });
                }
                match value {
                    Some(value) => {
                        self.data.insert(key, value);
                        true
                    }
                    None => false,
                }
            }
            Repaired::Rejected => false,
        }
    }

    fn repair_track(&mut self, slot: usize, total_beats: usize, repairs: &mut Vec<Repair>) {
        let sound_key = StateKey::TrackSound(slot);
        let state_key = StateKey::TrackState(slot);
        let volume_key = StateKey::TrackVolume(slot);
        let declared = self.data.contains_key(&sound_key) || self.data.contains_key(&state_key);
        let cleared = matches!(
            self.data.get(&sound_key),
            Some(Value::Text(code)) if code.is_empty()
        );

        if cleared {
            self.data.remove(&sound_key);
            self.data.remove(&state_key);
            self.data.remove(&volume_key);
            debug!(slot, "track slot cleared");
            return;
        }

        let mut scratch = Vec::new();
        let sound_ok = self
            .schema
            .field(sound_key)
            .cloned()
            .is_some_and(|kind| self.repair_field(sound_key, &kind, &mut scratch));
        let state_ok = self
            .schema
            .field(state_key)
            .cloned()
            .is_some_and(|kind| self.repair_field(state_key, &kind, &mut scratch));

        if !(sound_ok && state_ok) {
            self.data.remove(&sound_key);
            self.data.remove(&state_key);
            self.data.remove(&volume_key);
            if declared {
                warn!(slot, "dropping invalid track definition");
                repairs.push(Repair::InvalidTrackDefinition { slot });
            }
            return;
        }
        repairs.extend(scratch);

        if let Some(Value::Bools(pattern)) = self.data.get_mut(&state_key) {
            let from = pattern.len();
            if from != total_beats {
                pattern.resize(total_beats, false);
                repairs.push(Repair::PatternResized {
                    slot,
                    from,
                    to: total_beats,
                });
            }
        }

        if let Some(kind) = self.schema.field(volume_key).cloned() {
            self.repair_field(volume_key, &kind, repairs);
        } else {
            self.data.remove(&volume_key);
        }
    }
}
