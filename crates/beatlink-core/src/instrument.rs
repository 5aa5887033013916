use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Instrument {
    Kick,
    Snare,
    OpenHat,
    ClosedHat,
}

pub const INSTRUMENT_CODES: &[&str] = &["a", "b", "c", "d"];

impl Instrument {
    pub const ALL: [Self; 4] = [Self::Kick, Self::Snare, Self::OpenHat, Self::ClosedHat];

    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Kick => "a",
            Self::Snare => "b",
            Self::OpenHat => "c",
            Self::ClosedHat => "d",
        }
    }

    #[must_use]
    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|instrument| instrument.code() == code)
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Kick => "kick",
            Self::Snare => "snare",
            Self::OpenHat => "open-hat",
            Self::ClosedHat => "closed-hat",
        }
    }

    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|instrument| instrument.name().eq_ignore_ascii_case(name))
    }

    #[must_use]
    pub const fn sound_file(self) -> &'static str {
        match self {
            Self::Kick => "sounds/kick.mp3",
            Self::Snare => "sounds/snare.mp3",
            Self::OpenHat => "sounds/open-hat.mp3",
            Self::ClosedHat => "sounds/closed-hat.mp3",
        }
    }

    #[must_use]
    pub const fn gm_drum_key(self) -> u8 {
        match self {
            Self::Kick => 36,
            Self::Snare => 38,
            Self::OpenHat => 46,
            Self::ClosedHat => 42,
        }
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
