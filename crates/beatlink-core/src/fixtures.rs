use std::collections::BTreeMap;

use crate::{
    instrument::Instrument,
    link::DEFAULT_BASE_LINK,
    schema::Schema,
    state::{Composition, StateStore, TrackEntry},
};

fn steps(pattern: &str) -> Vec<bool> {
    pattern.chars().map(|step| step == 'x').collect()
}

#[must_use]
pub fn demo_composition() -> Composition {
    let tracks = [
        (Instrument::Kick, "x.......x.x.....", 1.0),
        (Instrument::Snare, "....x.......x...", 0.9),
        (Instrument::OpenHat, "..............x.", 0.6),
        (Instrument::ClosedHat, "x.x.x.x.x.x.x...", 0.7),
    ]
    .into_iter()
    .enumerate()
    .map(|(slot, (instrument, pattern, volume))| {
        (
            slot,
            TrackEntry {
                instrument,
                pattern: steps(pattern),
                volume,
            },
        )
    })
    .collect::<BTreeMap<_, _>>();

    Composition {
        title: "Demo Beat".to_string(),
        bar_beats: vec![4, 4, 4, 4],
        tempo: 100,
        tracks,
    }
}

#[must_use]
pub fn demo_store() -> StateStore {
    let mut store = StateStore::new(Schema::drum_machine());
    store.replace_composition(&demo_composition());
    store
}

#[must_use]
pub fn demo_link() -> String {
    demo_store()
        .encode(DEFAULT_BASE_LINK)
        .expect("fixture base link should be valid")
}
