use beatlink_core::{
    Instrument, Repair, Schema, StateError, StateKey, StateStore, Value,
    fixtures::{demo_composition, demo_link},
    link::query_params,
};

fn decode(link: &str) -> (StateStore, Vec<Repair>) {
    let mut store = StateStore::new(Schema::drum_machine());
    let repairs = store.decode(link);
    (store, repairs)
}

#[test]
fn out_of_range_tempo_is_clamped_to_the_maximum() {
    let (store, repairs) = decode("https://beatlink.example/?bpm=9999");
    assert_eq!(store.tempo(), 220);
    assert!(repairs.contains(&Repair::OutOfRange {
        key: StateKey::Bpm
    }));

    let (store, _) = decode("?bpm=3");
    assert_eq!(store.tempo(), 40);
}

#[test]
fn short_pattern_is_false_padded_to_the_bar_length() {
    let (store, repairs) = decode("barbeats=4,4&t0sound=a&t0state=101");
    let kick = store.track(0).expect("kick slot should survive");
    assert_eq!(
        kick.pattern,
        vec![true, false, true, false, false, false, false, false]
    );
    assert!(repairs.contains(&Repair::PatternResized {
        slot: 0,
        from: 3,
        to: 8
    }));
}

#[test]
fn long_pattern_is_truncated_to_the_bar_length() {
    let (store, _) = decode("barbeats=2&t0sound=a&t0state=0111111");
    assert_eq!(
        store.track(0).map(|track| track.pattern),
        Some(vec![false, true])
    );
}

#[test]
fn unparsable_bars_fall_back_to_defaults() {
    let (store, repairs) = decode("barbeats=abc&t0state=1");
    assert_eq!(store.bar_beats(), vec![4, 4, 4, 4]);
    assert_eq!(store.total_beats(), 16);
    assert_eq!(store.track(0).map(|track| track.pattern.len()), Some(16));
    assert!(repairs.contains(&Repair::MalformedLinkValue {
        key: StateKey::BarBeats,
        raw: "abc".to_string()
    }));
}

#[test]
fn bar_lengths_and_bar_count_are_bounded() {
    let many_bars = vec!["1"; 40].join(",");
    let (store, _) = decode(&format!("barbeats={many_bars}"));
    assert_eq!(store.bar_beats().len(), 32);

    let (store, _) = decode("barbeats=0,17,5");
    assert_eq!(store.bar_beats(), vec![1, 16, 5]);
}

#[test]
fn unknown_instrument_drops_the_whole_slot() {
    let (store, repairs) = decode("t2sound=z&t2state=1111");
    assert!(store.track(2).is_none());
    assert_eq!(store.get_value(StateKey::TrackState(2)), None);
    assert_eq!(store.get_value(StateKey::TrackVolume(2)), None);
    assert!(repairs.contains(&Repair::InvalidTrackDefinition { slot: 2 }));
    assert_eq!(store.track_slots(), vec![0, 1, 3]);
}

#[test]
fn track_without_pattern_does_not_exist() {
    let (store, repairs) = decode("t5sound=b");
    assert!(store.track(5).is_none());
    assert!(repairs.contains(&Repair::InvalidTrackDefinition { slot: 5 }));
}

#[test]
fn empty_instrument_clears_a_default_slot_silently() {
    let (store, repairs) = decode("t1sound=");
    assert!(store.track(1).is_none());
    assert!(repairs.is_empty(), "unexpected repairs {repairs:?}");
}

#[test]
fn malformed_pattern_keeps_the_default_pattern() {
    let (store, repairs) = decode("t0state=10x1");
    assert_eq!(store.track(0).map(|track| track.pattern), Some(vec![false; 16]));
    assert!(repairs.contains(&Repair::MalformedLinkValue {
        key: StateKey::TrackState(0),
        raw: "10x1".to_string()
    }));
}

#[test]
fn first_occurrence_of_a_repeated_key_wins() {
    let (store, _) = decode("bpm=90&bpm=150");
    assert_eq!(store.tempo(), 90);
}

#[test]
fn keys_outside_the_schema_are_ignored() {
    let (store, _) = decode("t9sound=a&t9state=1&t01sound=b&volume=3");
    assert_eq!(store.track_slots(), vec![0, 1, 2, 3]);
}

#[test]
fn new_slot_is_built_from_link_values() {
    let (store, repairs) = decode("t6sound=c&t6state=1000100010001000&t6vol=0.25");
    let track = store.track(6).expect("slot 6 should be live");
    assert_eq!(track.instrument, Instrument::OpenHat);
    assert!((track.volume - 0.25).abs() < f64::EPSILON);
    assert!(repairs.is_empty(), "unexpected repairs {repairs:?}");
}

#[test]
fn encoding_keeps_foreign_parameters() {
    let (store, _) = decode("bpm=128");
    let link = store
        .encode("https://host.example/app?ref=newsletter&bpm=10")
        .expect("base link should parse");
    let params = query_params(&link);
    assert_eq!(params.get("ref").map(String::as_str), Some("newsletter"));
    assert_eq!(params.get("bpm").map(String::as_str), Some("128"));
    assert!(link.starts_with("https://host.example/app?"));
}

#[test]
fn encoding_writes_one_rule_per_field_kind() {
    let (store, _) = decode("barbeats=2,3&t0state=10&title=Night%20Run");
    let params = query_params(&store.encode("https://beatlink.example/").expect("valid base"));
    assert_eq!(params.get("barbeats").map(String::as_str), Some("2,3"));
    assert_eq!(params.get("t0state").map(String::as_str), Some("10000"));
    assert_eq!(params.get("t0sound").map(String::as_str), Some("a"));
    assert_eq!(params.get("t0vol").map(String::as_str), Some("1"));
    assert_eq!(params.get("title").map(String::as_str), Some("Night Run"));
}

#[test]
fn unparsable_base_link_is_an_error() {
    let store = StateStore::default();
    let error = store
        .encode("not a link")
        .expect_err("relative base link should be rejected");
    assert!(matches!(error, StateError::InvalidBaseLink { .. }));
}

#[test]
fn over_long_title_is_truncated() {
    let title = "x".repeat(80);
    let (store, repairs) = decode(&format!("title={title}"));
    assert_eq!(store.title().chars().count(), 64);
    assert!(repairs.contains(&Repair::OutOfRange {
        key: StateKey::Title
    }));
}

#[test]
fn query_params_accept_links_and_bare_queries() {
    let absolute = query_params("https://beatlink.example/?bpm=90&title=a%20b#top");
    assert_eq!(absolute.get("bpm").map(String::as_str), Some("90"));
    assert_eq!(absolute.get("title").map(String::as_str), Some("a b"));

    assert_eq!(query_params("?bpm=90"), query_params("bpm=90"));
    let relative = query_params("/app?bpm=90#x");
    assert_eq!(relative.get("bpm").map(String::as_str), Some("90"));
}

#[test]
fn query_params_of_nothing_are_empty() {
    assert!(query_params("").is_empty());
    assert!(query_params("   ").is_empty());
    assert!(query_params("https://beatlink.example/").is_empty());
}

#[test]
fn defaults_describe_four_silent_tracks() {
    let store = StateStore::default();
    assert_eq!(store.tempo(), 120);
    assert_eq!(store.bar_beats(), vec![4, 4, 4, 4]);
    assert_eq!(store.track_slots(), vec![0, 1, 2, 3]);
    let instruments: Vec<Instrument> = store
        .composition()
        .tracks
        .values()
        .map(|track| track.instrument)
        .collect();
    assert_eq!(instruments, Instrument::ALL.to_vec());
    assert!(
        store
            .composition()
            .tracks
            .values()
            .all(|track| track.pattern == vec![false; 16])
    );
}

#[test]
fn get_value_hands_out_copies() {
    let store = StateStore::default();
    let mut bars = store
        .get_value(StateKey::BarBeats)
        .expect("bars have a default");
    if let Value::Ints(values) = &mut bars {
        values.push(9);
    }
    assert_eq!(store.bar_beats(), vec![4, 4, 4, 4]);
}

#[test]
fn text_tempo_from_an_input_field_is_coerced() {
    let mut store = StateStore::default();
    let repairs = store.set_value(StateKey::Bpm, "135");
    assert!(repairs.is_empty(), "unexpected repairs {repairs:?}");
    assert_eq!(store.get_value(StateKey::Bpm), Some(Value::Int(135)));
}

#[test]
fn writes_outside_the_schema_are_ignored() {
    let mut store = StateStore::default();
    let before = store.composition();
    assert!(store.set_value(StateKey::TrackSound(9), "a").is_empty());
    assert_eq!(store.get_value(StateKey::TrackSound(9)), None);
    assert_eq!(store.composition(), before);
}

#[test]
fn demo_link_decodes_back_to_the_demo() {
    let (store, repairs) = decode(&demo_link());
    assert!(repairs.is_empty(), "unexpected repairs {repairs:?}");
    assert_eq!(store.composition(), demo_composition());
}

#[test]
fn instruments_map_to_link_codes_and_names() {
    for instrument in Instrument::ALL {
        assert_eq!(Instrument::from_code(instrument.code()), Some(instrument));
        assert_eq!(Instrument::from_name(instrument.name()), Some(instrument));
    }
    assert_eq!(Instrument::from_code("e"), None);
    assert_eq!(Instrument::from_name("OPEN-HAT"), Some(Instrument::OpenHat));
}
