pub mod assets;
pub mod config;
pub mod diagnostics;
pub mod driver;
pub mod events;
pub mod export;
pub mod fixtures;
pub mod instrument;
pub mod link;
pub mod registry;
pub mod sampler;
pub mod schema;
pub mod session;
pub mod sound;
pub mod state;
pub mod time;
pub mod track;
pub mod transport;

pub use assets::{DecodedAudio, decode_audio_file_mono, discover_sound_files};
pub use config::AppConfig;
pub use diagnostics::{TelemetryGuard, init_tracing, init_tracing_from_config};
pub use events::{Event, EventBus, EventContext, EventKind, Listener, ListenerError, ListenerId};
pub use export::{RenderOptions, export_midi, export_wav, midi_bytes, render_composition};
pub use instrument::Instrument;
pub use link::{LinkHost, StaticLinkHost};
pub use registry::{SequencerError, ToggleBeat, TrackRegistry};
pub use sampler::SampleBank;
pub use schema::{FieldKind, FieldSpec, MAX_TRACKS, Schema, StateKey, Value};
pub use session::Session;
pub use sound::{
    PreloadSignal, PreloadStatus, RecordingBackend, SoundBackend, SoundError, SoundHandle,
};
pub use state::{Composition, Repair, StateError, StateStore, TrackEntry};
pub use track::Track;
pub use transport::{Transport, TransportState};
