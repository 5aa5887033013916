use beatlink_core::{
    Repair, Schema, StateKey, StateStore, Value,
    instrument::INSTRUMENT_CODES,
    schema::{
        DEFAULT_BAR_BEATS, DEFAULT_BPM, DEFAULT_VOLUME, FieldKind, MAX_BPM, MAX_TRACKS,
        MAX_VOLUME, MIN_BPM, MIN_VOLUME, Repaired,
    },
};

fn bpm_kind() -> FieldKind {
    FieldKind::BoundedInt {
        min: MIN_BPM,
        max: MAX_BPM,
        default: DEFAULT_BPM,
    }
}

#[test]
fn state_keys_parse_their_own_names() {
    let keys = [
        StateKey::Title,
        StateKey::BarBeats,
        StateKey::Bpm,
        StateKey::TrackSound(0),
        StateKey::TrackState(7),
        StateKey::TrackVolume(12),
    ];
    for key in keys {
        assert_eq!(StateKey::parse(&key.to_string()), Some(key));
    }
    assert_eq!(StateKey::parse("t01sound"), None);
    assert_eq!(StateKey::parse("tsound"), None);
    assert_eq!(StateKey::parse("t1pan"), None);
}

#[test]
fn bounded_int_decodes_and_clamps() {
    let kind = bpm_kind();
    assert_eq!(kind.decode(" 135 "), Some(Value::Int(135)));
    assert_eq!(kind.decode("fast"), None);
    assert_eq!(
        kind.repair(Some(Value::Int(9_999))),
        Repaired::Adjusted(Value::Int(MAX_BPM))
    );
    assert_eq!(
        kind.repair(Some(Value::from("90"))),
        Repaired::Converted(Value::Int(90))
    );
    assert_eq!(
        kind.repair(Some(Value::from("500"))),
        Repaired::Adjusted(Value::Int(MAX_BPM))
    );
    assert_eq!(
        kind.repair(Some(Value::from("fast"))),
        Repaired::Defaulted(Some(Value::Int(DEFAULT_BPM)))
    );
    assert_eq!(
        kind.repair(Some(Value::Int(100))),
        Repaired::Valid(Value::Int(100))
    );
}

#[test]
fn int_sequence_rejects_any_bad_element() {
    let schema = Schema::drum_machine();
    let kind = schema
        .field(StateKey::BarBeats)
        .expect("drum machine declares barbeats");
    assert_eq!(kind.decode("4,3,5"), Some(Value::Ints(vec![4, 3, 5])));
    assert_eq!(kind.decode("4,x"), None);
    assert_eq!(kind.decode(""), None);
    assert_eq!(
        kind.repair(Some(Value::Ints(vec![0, 20, 4]))),
        Repaired::Adjusted(Value::Ints(vec![1, 16, 4]))
    );
    assert_eq!(
        kind.repair(Some(Value::from("3,5"))),
        Repaired::Converted(Value::Ints(vec![3, 5]))
    );
    assert_eq!(
        kind.repair(Some(Value::Ints(Vec::new()))),
        Repaired::Defaulted(Some(Value::Ints(DEFAULT_BAR_BEATS.to_vec())))
    );
}

#[test]
fn bool_sequence_is_strict_about_characters() {
    let kind = FieldKind::BoolSequence;
    assert_eq!(
        kind.decode("1010"),
        Some(Value::Bools(vec![true, false, true, false]))
    );
    assert_eq!(kind.decode("10x0"), None);
    assert_eq!(
        kind.encode(&Value::Bools(vec![false, true, true])),
        Some("011".to_string())
    );
    assert_eq!(kind.repair(Some(Value::Int(3))), Repaired::Rejected);
    assert_eq!(kind.repair(None), Repaired::Defaulted(None));
}

#[test]
fn enum_membership_is_checked_on_repair_not_decode() {
    let kind = FieldKind::Enum {
        allowed: INSTRUMENT_CODES,
    };
    assert_eq!(kind.decode("z"), Some(Value::from("z")));
    assert_eq!(kind.repair(Some(Value::from("z"))), Repaired::Rejected);
    assert_eq!(
        kind.repair(Some(Value::from("a"))),
        Repaired::Valid(Value::from("a"))
    );
}

#[test]
fn text_is_truncated_by_characters() {
    let kind = FieldKind::Text { max_chars: 3 };
    assert_eq!(
        kind.repair(Some(Value::from("ßßßß"))),
        Repaired::Adjusted(Value::from("ßßß"))
    );
}

#[test]
fn float_encoding_survives_decoding() {
    let kind = FieldKind::BoundedFloat {
        min: MIN_VOLUME,
        max: MAX_VOLUME,
        default: DEFAULT_VOLUME,
    };
    for volume in [0.1, -0.75, 1.0, 1.999_999_9] {
        let encoded = kind
            .encode(&Value::Float(volume))
            .expect("float kind encodes floats");
        assert_eq!(kind.decode(&encoded), Some(Value::Float(volume)));
    }
    assert_eq!(kind.decode("NaN"), None);
}

#[test]
fn drum_machine_declares_all_track_slots() {
    let schema = Schema::drum_machine();
    assert_eq!(schema.track_slots(), (0..MAX_TRACKS).collect::<Vec<_>>());
    assert_eq!(
        schema.defaults().get(&StateKey::TrackSound(1)),
        Some(&Value::from("b"))
    );
}

#[test]
fn type_conversion_alone_is_not_reported_as_a_clamp() {
    let mut store = StateStore::default();
    assert_eq!(store.set_value(StateKey::Bpm, "135"), Vec::new());
    assert_eq!(store.tempo(), 135);
    assert_eq!(store.set_value(StateKey::TrackVolume(0), 1_i64), Vec::new());
    assert_eq!(store.track(0).map(|track| track.volume), Some(1.0));
}

#[test]
fn real_clamps_are_still_reported() {
    let mut store = StateStore::default();
    assert_eq!(
        store.set_value(StateKey::Bpm, "500"),
        vec![Repair::OutOfRange { key: StateKey::Bpm }]
    );
    assert_eq!(store.tempo(), 220);
    assert_eq!(
        store.set_value(StateKey::TrackVolume(2), 7.5),
        vec![Repair::OutOfRange {
            key: StateKey::TrackVolume(2)
        }]
    );
    assert_eq!(store.track(2).map(|track| track.volume), Some(2.0));
}
