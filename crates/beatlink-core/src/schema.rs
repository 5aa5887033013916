use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize, Serializer};

use crate::instrument::{INSTRUMENT_CODES, Instrument};

pub const MAX_TRACKS: usize = 8;
pub const MIN_BPM: i64 = 40;
pub const MAX_BPM: i64 = 220;
pub const DEFAULT_BPM: i64 = 120;
pub const MIN_BAR_BEATS: i64 = 1;
pub const MAX_BAR_BEATS: i64 = 16;
pub const MAX_BARS: usize = 32;
pub const DEFAULT_BAR_BEATS: [i64; 4] = [4, 4, 4, 4];
pub const BAR_DELIMITER: char = ',';
pub const MIN_VOLUME: f64 = -1.0;
pub const MAX_VOLUME: f64 = 2.0;
pub const DEFAULT_VOLUME: f64 = 1.0;
pub const MAX_TITLE_CHARS: usize = 64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum Value {
    Int(i64),
    Float(f64),
    Ints(Vec<i64>),
    Bools(Vec<bool>),
    Text(String),
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<Vec<i64>> for Value {
    fn from(value: Vec<i64>) -> Self {
        Self::Ints(value)
    }
}

impl From<Vec<bool>> for Value {
    fn from(value: Vec<bool>) -> Self {
        Self::Bools(value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StateKey {
    Title,
    BarBeats,
    Bpm,
    TrackSound(usize),
    TrackState(usize),
    TrackVolume(usize),
}

impl StateKey {
    #[must_use]
    pub const fn track_slot(self) -> Option<usize> {
        match self {
            Self::TrackSound(slot) | Self::TrackState(slot) | Self::TrackVolume(slot) => {
                Some(slot)
            }
            Self::Title | Self::BarBeats | Self::Bpm => None,
        }
    }

    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "title" => return Some(Self::Title),
            "barbeats" => return Some(Self::BarBeats),
            "bpm" => return Some(Self::Bpm),
            _ => {}
        }

        let rest = name.strip_prefix('t')?;
        let digits_end = rest.find(|c: char| !c.is_ascii_digit())?;
        let (digits, suffix) = rest.split_at(digits_end);
        if digits.is_empty() || (digits.len() > 1 && digits.starts_with('0')) {
            return None;
        }
        let slot = digits.parse().ok()?;
        match suffix {
            "sound" => Some(Self::TrackSound(slot)),
            "state" => Some(Self::TrackState(slot)),
            "vol" => Some(Self::TrackVolume(slot)),
            _ => None,
        }
    }
}

impl fmt::Display for StateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Title => f.write_str("title"),
            Self::BarBeats => f.write_str("barbeats"),
            Self::Bpm => f.write_str("bpm"),
            Self::TrackSound(slot) => write!(f, "t{slot}sound"),
            Self::TrackState(slot) => write!(f, "t{slot}state"),
            Self::TrackVolume(slot) => write!(f, "t{slot}vol"),
        }
    }
}

impl Serialize for StateKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Repaired {
    Valid(Value),
    /// Same value, stored as the field's own type (`"135"` as `Int(135)`).
    Converted(Value),
    Adjusted(Value),
    Defaulted(Option<Value>),
    Rejected,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    BoundedInt {
        min: i64,
        max: i64,
        default: i64,
    },
    BoundedFloat {
        min: f64,
        max: f64,
        default: f64,
    },
    IntSequence {
        min: i64,
        max: i64,
        max_len: usize,
        delimiter: char,
        default: Vec<i64>,
    },
    BoolSequence,
    Enum {
        allowed: &'static [&'static str],
    },
    Text {
        max_chars: usize,
    },
}

impl FieldKind {
    #[must_use]
    pub fn decode(&self, raw: &str) -> Option<Value> {
        match self {
            Self::BoundedInt { .. } => raw.trim().parse().ok().map(Value::Int),
            Self::BoundedFloat { .. } => parse_finite_float(raw).map(Value::Float),
            Self::IntSequence { delimiter, .. } => {
                parse_int_sequence(raw, *delimiter).map(Value::Ints)
            }
            Self::BoolSequence => parse_bool_sequence(raw).map(Value::Bools),
            Self::Enum { .. } => Some(Value::Text(raw.trim().to_string())),
            Self::Text { .. } => Some(Value::Text(raw.to_string())),
        }
    }

    #[must_use]
    pub fn encode(&self, value: &Value) -> Option<String> {
        match (self, value) {
            (Self::BoundedInt { .. }, Value::Int(number)) => Some(number.to_string()),
            (Self::BoundedFloat { .. }, Value::Float(number)) => Some(number.to_string()),
            (Self::IntSequence { delimiter, .. }, Value::Ints(numbers)) => Some(
                numbers
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(&delimiter.to_string()),
            ),
            (Self::BoolSequence, Value::Bools(steps)) => Some(
                steps
                    .iter()
                    .map(|active| if *active { '1' } else { '0' })
                    .collect(),
            ),
            (Self::Enum { .. } | Self::Text { .. }, Value::Text(text)) => Some(text.clone()),
            _ => None,
        }
    }

    #[must_use]
    pub fn default_value(&self) -> Option<Value> {
        match self {
            Self::BoundedInt { default, .. } => Some(Value::Int(*default)),
            Self::BoundedFloat { default, .. } => Some(Value::Float(*default)),
            Self::IntSequence { default, .. } => Some(Value::Ints(default.clone())),
            Self::BoolSequence | Self::Enum { .. } | Self::Text { .. } => None,
        }
    }

    #[must_use]
    pub fn repair(&self, value: Option<Value>) -> Repaired {
        let Some(original) = value else {
            return Repaired::Defaulted(self.default_value());
        };

        match self {
            Self::BoundedInt { min, max, .. } => match integer_of(&original) {
                Some(number) => {
                    let clamped = number.clamp(*min, *max);
                    settled(original, Value::Int(clamped), clamped != number)
                }
                None => Repaired::Defaulted(self.default_value()),
            },
            Self::BoundedFloat { min, max, .. } => match float_of(&original) {
                Some(number) => {
                    let clamped = number.clamp(*min, *max);
                    let changed = clamped.total_cmp(&number).is_ne();
                    settled(original, Value::Float(clamped), changed)
                }
                None => Repaired::Defaulted(self.default_value()),
            },
            Self::IntSequence {
                min,
                max,
                max_len,
                delimiter,
                ..
            } => {
                let numbers = match &original {
                    Value::Ints(numbers) => Some(numbers.clone()),
                    Value::Int(number) => Some(vec![*number]),
                    Value::Text(text) => parse_int_sequence(text, *delimiter),
                    Value::Float(_) | Value::Bools(_) => None,
                };
                match numbers.filter(|numbers| !numbers.is_empty()) {
                    Some(numbers) => {
                        let bounded: Vec<i64> = numbers
                            .iter()
                            .take(*max_len)
                            .map(|number| (*number).clamp(*min, *max))
                            .collect();
                        let changed = bounded != numbers;
                        settled(original, Value::Ints(bounded), changed)
                    }
                    None => Repaired::Defaulted(self.default_value()),
                }
            }
            Self::BoolSequence => match original {
                Value::Bools(steps) => Repaired::Valid(Value::Bools(steps)),
                Value::Text(text) => {
                    parse_bool_sequence(&text).map_or(Repaired::Rejected, |steps| {
                        Repaired::Converted(Value::Bools(steps))
                    })
                }
                Value::Int(_) | Value::Float(_) | Value::Ints(_) => Repaired::Rejected,
            },
            Self::Enum { allowed } => match original {
                Value::Text(code) if allowed.contains(&code.as_str()) => {
                    Repaired::Valid(Value::Text(code))
                }
                _ => Repaired::Rejected,
            },
            Self::Text { max_chars } => match original {
                Value::Text(text) => {
                    let truncated: String = text.chars().take(*max_chars).collect();
                    if truncated == text {
                        Repaired::Valid(Value::Text(text))
                    } else {
                        Repaired::Adjusted(Value::Text(truncated))
                    }
                }
                _ => Repaired::Rejected,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub key: StateKey,
    pub kind: FieldKind,
}

impl FieldSpec {
    #[must_use]
    pub fn new(key: StateKey, kind: FieldKind) -> Self {
        Self { key, kind }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    fields: Vec<FieldSpec>,
    defaults: BTreeMap<StateKey, Value>,
}

impl Default for Schema {
    fn default() -> Self {
        Self::drum_machine()
    }
}

impl Schema {
    #[must_use]
    pub fn new(fields: Vec<FieldSpec>) -> Self {
        let defaults = fields
            .iter()
            .filter(|field| field.key.track_slot().is_none())
            .filter_map(|field| field.kind.default_value().map(|value| (field.key, value)))
            .collect();
        Self { fields, defaults }
    }

    #[must_use]
    pub fn with_default(mut self, key: StateKey, value: Value) -> Self {
        self.defaults.insert(key, value);
        self
    }

    #[must_use]
    pub fn drum_machine() -> Self {
        let mut fields = vec![
            FieldSpec::new(
                StateKey::Title,
                FieldKind::Text {
                    max_chars: MAX_TITLE_CHARS,
                },
            ),
            FieldSpec::new(
                StateKey::BarBeats,
                FieldKind::IntSequence {
                    min: MIN_BAR_BEATS,
                    max: MAX_BAR_BEATS,
                    max_len: MAX_BARS,
                    delimiter: BAR_DELIMITER,
                    default: DEFAULT_BAR_BEATS.to_vec(),
                },
            ),
            FieldSpec::new(
                StateKey::Bpm,
                FieldKind::BoundedInt {
                    min: MIN_BPM,
                    max: MAX_BPM,
                    default: DEFAULT_BPM,
                },
            ),
        ];

        for slot in 0..MAX_TRACKS {
            fields.push(FieldSpec::new(
                StateKey::TrackSound(slot),
                FieldKind::Enum {
                    allowed: INSTRUMENT_CODES,
                },
            ));
            fields.push(FieldSpec::new(
                StateKey::TrackState(slot),
                FieldKind::BoolSequence,
            ));
            fields.push(FieldSpec::new(
                StateKey::TrackVolume(slot),
                FieldKind::BoundedFloat {
                    min: MIN_VOLUME,
                    max: MAX_VOLUME,
                    default: DEFAULT_VOLUME,
                },
            ));
        }

        let default_steps: usize = DEFAULT_BAR_BEATS
            .iter()
            .map(|beats| usize::try_from(*beats).unwrap_or(0))
            .sum();

        Instrument::ALL.into_iter().enumerate().fold(
            Self::new(fields),
            |schema, (slot, instrument)| {
                schema
                    .with_default(StateKey::TrackSound(slot), Value::from(instrument.code()))
                    .with_default(
                        StateKey::TrackState(slot),
                        Value::Bools(vec![false; default_steps]),
                    )
                    .with_default(StateKey::TrackVolume(slot), Value::Float(DEFAULT_VOLUME))
            },
        )
    }

    #[must_use]
    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    #[must_use]
    pub fn field(&self, key: StateKey) -> Option<&FieldKind> {
        self.fields
            .iter()
            .find(|field| field.key == key)
            .map(|field| &field.kind)
    }

    #[must_use]
    pub fn default_for(&self, key: StateKey) -> Option<&Value> {
        self.defaults.get(&key)
    }

    #[must_use]
    pub fn defaults(&self) -> BTreeMap<StateKey, Value> {
        self.defaults.clone()
    }

    #[must_use]
    pub fn track_slots(&self) -> Vec<usize> {
        let mut slots: Vec<usize> = self
            .fields
            .iter()
            .filter_map(|field| match field.key {
                StateKey::TrackSound(slot)
                    if self.field(StateKey::TrackState(slot)).is_some() =>
                {
                    Some(slot)
                }
                _ => None,
            })
            .collect();
        slots.sort_unstable();
        slots.dedup();
        slots
    }
}

fn settled(original: Value, repaired: Value, clamped: bool) -> Repaired {
    if clamped {
        Repaired::Adjusted(repaired)
    } else if original == repaired {
        Repaired::Valid(repaired)
    } else {
        Repaired::Converted(repaired)
    }
}

#[allow(clippy::cast_possible_truncation)]
fn integer_of(value: &Value) -> Option<i64> {
    match value {
        Value::Int(number) => Some(*number),
        Value::Float(number) if number.is_finite() => Some(number.round() as i64),
        Value::Text(text) => text.trim().parse().ok(),
        Value::Float(_) | Value::Ints(_) | Value::Bools(_) => None,
    }
}

#[allow(clippy::cast_precision_loss)]
fn float_of(value: &Value) -> Option<f64> {
    match value {
        Value::Float(number) if number.is_finite() => Some(*number),
        Value::Int(number) => Some(*number as f64),
        Value::Text(text) => parse_finite_float(text),
        Value::Float(_) | Value::Ints(_) | Value::Bools(_) => None,
    }
}

fn parse_finite_float(raw: &str) -> Option<f64> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|number| number.is_finite())
}

fn parse_int_sequence(raw: &str, delimiter: char) -> Option<Vec<i64>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    raw.split(delimiter)
        .map(|part| part.trim().parse::<i64>().ok())
        .collect()
}

fn parse_bool_sequence(raw: &str) -> Option<Vec<bool>> {
    raw.trim()
        .chars()
        .map(|c| match c {
            '0' => Some(false),
            '1' => Some(true),
            _ => None,
        })
        .collect()
}
