use std::time::{Duration, Instant};

use beatlink_core::{
    EventKind, Instrument, ListenerId, PreloadStatus, RecordingBackend, Repair, Schema,
    SequencerError, Session, StaticLinkHost, StateKey, ToggleBeat, Track, TrackEntry, Value,
};

fn session(link: &str) -> Session<RecordingBackend> {
    Session::open(link, Schema::drum_machine(), RecordingBackend::new()).0
}

fn toggle(track_index: usize, beat_index: usize) -> ToggleBeat {
    ToggleBeat {
        track_index,
        beat_index,
    }
}

#[test]
fn toggling_twice_restores_the_pattern() {
    let mut session = session("t2state=0110000000000001");
    let original = session.store().track(2).expect("slot 2 should be live").pattern;

    assert_eq!(session.toggle_beat(toggle(2, 5)), Ok(true));
    assert_eq!(session.toggle_beat(toggle(2, 5)), Ok(false));

    assert_eq!(
        session.store().track(2).map(|track| track.pattern),
        Some(original.clone())
    );
    assert_eq!(
        session.registry().track(2).map(|track| track.pattern().to_vec()),
        Some(original)
    );
}

#[test]
fn toggle_writes_through_to_the_shared_link() {
    let mut session = session("");
    session
        .toggle_beat(toggle(0, 0))
        .expect("kick slot should be live");
    assert_eq!(
        session.store().get_value(StateKey::TrackState(0)),
        Some(Value::Bools(
            std::iter::once(true)
                .chain(std::iter::repeat_n(false, 15))
                .collect()
        ))
    );

    let link = session
        .share_link(&StaticLinkHost::default())
        .expect("default base link should parse");
    assert!(link.contains("t0state=1000000000000000"), "{link}");
}

#[test]
fn missing_track_is_not_found() {
    let mut session = session("t1sound=");
    assert_eq!(
        session.toggle_beat(toggle(1, 0)),
        Err(SequencerError::TrackNotFound(1))
    );
    assert_eq!(
        session.toggle_beat(toggle(7, 0)),
        Err(SequencerError::TrackNotFound(7))
    );
    assert_eq!(
        session.set_track_muted(1, true),
        Err(SequencerError::TrackNotFound(1))
    );
}

#[test]
fn step_past_the_pattern_is_rejected() {
    let mut session = session("barbeats=4");
    assert_eq!(
        session.toggle_beat(toggle(0, 4)),
        Err(SequencerError::StepOutOfBounds {
            track: 0,
            step: 4,
            len: 4
        })
    );
    assert_eq!(
        session.store().track(0).map(|track| track.pattern),
        Some(vec![false; 4])
    );
}

#[test]
fn track_index_addresses_the_slot() {
    let mut session = session("t0sound=&t5sound=d&t5state=0000000000000000");
    let names = session.registry().track_names();
    assert_eq!(names, vec!["snare", "open-hat", "closed-hat", "closed-hat"]);
    assert_eq!(session.toggle_beat(toggle(5, 3)), Ok(true));
    assert_eq!(
        session.store().track(5).map(|track| track.pattern[3]),
        Some(true)
    );
    assert_eq!(
        session.registry().track(5).map(|track| track.instrument()),
        Some(Instrument::ClosedHat)
    );
}

#[test]
fn volume_is_validated_and_mirrored() {
    let mut session = session("");
    assert_eq!(session.set_track_volume(3, 5.0), Ok(2.0));
    assert_eq!(
        session.store().get_value(StateKey::TrackVolume(3)),
        Some(Value::Float(2.0))
    );
    assert_eq!(
        session.registry().track(3).map(|track| track.volume()),
        Some(2.0)
    );
}

#[test]
fn mute_is_runtime_only_and_prospective() {
    let mut session = session("barbeats=2&t0state=11&t1sound=&t2sound=&t3sound=");
    let host = StaticLinkHost::default();
    let before = session.share_link(&host).expect("valid base link");

    let start = Instant::now();
    let period = Duration::from_millis(125);
    session.toggle_play(start);
    session.pump(start + period);
    session
        .set_track_muted(0, true)
        .expect("kick slot should be live");
    session.pump(start + period * 2);
    session
        .set_track_muted(0, false)
        .expect("kick slot should be live");
    session.pump(start + period * 3);

    let triggers = session.registry().sound().triggers();
    assert_eq!(triggers.len(), 2, "the muted tick must not trigger");
    assert!(triggers.iter().all(|t| t.instrument == Instrument::Kick));
    assert_eq!(session.share_link(&host).expect("valid base link"), before);
}

#[test]
fn edits_while_playing_apply_on_the_next_pass() {
    let mut session = session("barbeats=4&t1sound=&t2sound=&t3sound=");
    let start = Instant::now();
    let period = Duration::from_millis(125);
    session.toggle_play(start);
    session.pump(start + period);

    session
        .toggle_beat(toggle(0, 0))
        .expect("kick slot should be live");
    session
        .toggle_beat(toggle(0, 2))
        .expect("kick slot should be live");
    session.pump(start + period * 5);

    let triggers = session.registry().sound().triggers();
    assert_eq!(triggers.len(), 2, "beat 2 this pass and beat 0 next pass");
}

#[test]
fn toggle_request_uses_camel_case_fields() {
    let request: ToggleBeat = serde_json::from_str(r#"{"trackIndex":2,"beatIndex":5}"#)
        .expect("camelCase request should parse");
    assert_eq!(request, toggle(2, 5));
    assert_eq!(
        serde_json::to_string(&request).expect("request should serialize"),
        r#"{"trackIndex":2,"beatIndex":5}"#
    );
}

#[test]
fn unknown_listeners_cannot_subscribe() {
    let mut session = session("t1sound=");
    let registry = session.registry_mut();
    assert_eq!(
        registry.subscribe(EventKind::Tick, ListenerId::Observer(9)),
        Err(SequencerError::ListenerNotFound(ListenerId::Observer(9)))
    );
    assert_eq!(
        registry.subscribe(EventKind::Tick, ListenerId::Track(1)),
        Err(SequencerError::ListenerNotFound(ListenerId::Track(1)))
    );
    assert_eq!(
        registry.subscribe(EventKind::Tick, ListenerId::Track(0)),
        Ok(false),
        "tracks are subscribed to ticks on init"
    );
}

#[test]
fn bar_change_resizes_live_tracks() {
    let mut session = session("barbeats=4&t0state=1011");
    session.set_bar_beats(vec![3_i64, 3]);

    assert_eq!(session.registry().total_beats(), 6);
    assert_eq!(
        session.registry().track(0).map(|track| track.pattern().to_vec()),
        Some(vec![true, false, true, true, false, false])
    );
    assert_eq!(
        session.store().track(0).map(|track| track.pattern),
        Some(vec![true, false, true, true, false, false])
    );
}

#[test]
fn shared_link_reopens_to_the_same_composition() {
    let mut original = session("barbeats=3,5&bpm=90&t2sound=a&t2state=10101010");
    original
        .toggle_beat(toggle(0, 7))
        .expect("kick slot should be live");
    original
        .set_track_volume(1, 0.25)
        .expect("snare slot should be live");
    let link = original
        .share_link(&StaticLinkHost::default())
        .expect("valid base link");

    let (reopened, repairs) =
        Session::open(&link, Schema::drum_machine(), RecordingBackend::new());
    assert_eq!(repairs, Vec::<Repair>::new());
    assert_eq!(reopened.composition(), original.composition());
    assert_eq!(
        reopened.registry().track_names(),
        original.registry().track_names()
    );
}

#[test]
fn deferred_track_is_silent_until_its_sound_loads() {
    let mut sound = RecordingBackend::deferred();
    let entry = TrackEntry {
        instrument: Instrument::Kick,
        pattern: vec![true, false],
        volume: 0.8,
    };
    let mut track = Track::new(0, &entry, &mut sound);
    assert_eq!(track.name(), "kick");
    assert_eq!(track.poll_preload(), &PreloadStatus::Pending);

    assert_eq!(sound.complete_preloads(), 1);
    assert_eq!(track.poll_preload(), &PreloadStatus::Ready);
    assert!((track.volume() - 0.8).abs() < f64::EPSILON);
    assert!(!track.is_muted());
}
