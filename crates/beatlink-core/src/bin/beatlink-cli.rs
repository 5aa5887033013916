use std::{
    collections::BTreeMap,
    path::PathBuf,
    time::Instant,
};

use anyhow::{Context, anyhow};
use beatlink_core::{
    AppConfig, Composition, Event, EventContext, EventKind, LinkHost, Listener, ListenerError,
    RecordingBackend, Repair, SampleBank, Schema, Session, StateStore, StaticLinkHost,
    TrackRegistry, driver::run_realtime, export_midi, export_wav, fixtures::demo_link,
    init_tracing_from_config, render_composition, time::seconds_to_duration,
};
use clap::{Parser, Subcommand};
use serde::Serialize;

#[derive(Debug, Parser)]
#[command(name = "beatlink-cli")]
#[command(about = "Headless tools for inspecting, playing and rendering beat links")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Keep log lines off the terminal; the log file is still written.
    #[arg(long)]
    quiet: bool,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print the validated composition and the repairs applied to it.
    Inspect { link: String },
    /// Print the canonical form of a link.
    Normalize {
        link: String,

        #[arg(long)]
        base: Option<String>,
    },
    /// Play a link against the wall clock, printing each beat.
    Play {
        link: String,

        #[arg(long, default_value_t = 4.0)]
        seconds: f64,
    },
    /// Bounce a link to a WAV file through the sample bank.
    Render {
        link: String,

        #[arg(long)]
        output: PathBuf,

        #[arg(long)]
        loops: Option<u32>,

        #[arg(long)]
        samples: Option<PathBuf>,
    },
    /// Write the pattern grid as a General MIDI drum file.
    ExportMidi {
        link: String,

        #[arg(long)]
        output: PathBuf,

        #[arg(long, default_value_t = 1)]
        loops: u32,
    },
    /// Print the built-in demo link.
    Demo,
}

#[derive(Debug, Serialize)]
struct Inspection<'a> {
    composition: Composition,
    repairs: &'a [Repair],
}

/// Prints the highlighted beat and the instruments scheduled on it.
struct ConsoleObserver {
    lanes: BTreeMap<usize, (&'static str, Vec<bool>)>,
}

impl ConsoleObserver {
    fn new(store: &StateStore) -> Self {
        let lanes = store
            .composition()
            .tracks
            .into_iter()
            .map(|(slot, track)| (slot, (track.instrument.name(), track.pattern)))
            .collect();
        Self { lanes }
    }
}

impl Listener for ConsoleObserver {
    fn on_event(
        &mut self,
        event: &Event,
        _context: &mut EventContext<'_>,
    ) -> Result<(), ListenerError> {
        match event {
            Event::Tick { current_beat } => {
                let hits: Vec<&str> = self
                    .lanes
                    .values()
                    .filter(|(_, pattern)| pattern.get(*current_beat).copied().unwrap_or(false))
                    .map(|(name, _)| *name)
                    .collect();
                println!("beat {current_beat:>3}  {}", hits.join(" "));
            }
            Event::Transport { state } => println!("transport {state:?}"),
        }
        Ok(())
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => AppConfig::from_path(path)?,
        None => AppConfig::load_or_default()?,
    };
    if let Some(log_dir) = cli.log_dir {
        config.diagnostics.logs_dir = log_dir;
    }
    if cli.quiet {
        config.diagnostics.console = false;
    }
    let _telemetry = init_tracing_from_config(&config.diagnostics)?;

    match cli.command {
        Commands::Inspect { link } => {
            let mut store = StateStore::new(Schema::drum_machine());
            let repairs = store.decode(&link);
            let inspection = Inspection {
                composition: store.composition(),
                repairs: &repairs,
            };
            println!(
                "{}",
                serde_json::to_string_pretty(&inspection).context("failed to encode inspection")?
            );
        }
        Commands::Normalize { link, base } => {
            let store = StateStore::from_link(&link, Schema::drum_machine());
            let host = base.map_or_else(|| config.link_host(), StaticLinkHost::new);
            println!("{}", store.encode(&host.base_link())?);
        }
        Commands::Play { link, seconds } => {
            let mut store = StateStore::new(Schema::drum_machine());
            let repairs = store.decode(&link);
            let duration = seconds_to_duration(seconds).ok_or_else(|| {
                anyhow!("--seconds must be a finite, non-negative number, got {seconds}")
            })?;
            let registry = TrackRegistry::with_steps_per_beat(
                RecordingBackend::counting(),
                config.transport.steps_per_beat,
            );
            let mut session = Session::new(store, registry);
            if !repairs.is_empty() {
                tracing::warn!(repairs = repairs.len(), "link needed repairs before playing");
            }
            let observer = ConsoleObserver::new(session.store());
            session.attach_observer(
                Box::new(observer),
                &[EventKind::Tick, EventKind::Transport],
            );
            session.toggle_play(Instant::now());
            let fired = run_realtime(&mut session, duration);
            session.stop();
            let triggers = session.registry().sound().trigger_count();
            tracing::info!(fired, triggers, "playback finished");
        }
        Commands::Render {
            link,
            output,
            loops,
            samples,
        } => {
            let store = StateStore::from_link(&link, Schema::drum_machine());
            let directory = samples.unwrap_or_else(|| config.samples.directory.clone());
            let bank = SampleBank::from_directory(&directory, config.render.sample_rate)?;
            let mut options = config.render_options();
            if let Some(loops) = loops {
                options.loops = loops;
            }
            let rendered = render_composition(&store, bank, &options)?;
            export_wav(&rendered, config.render.sample_rate, &output)?;
            tracing::info!(path = %output.display(), frames = rendered.len(), "render written");
        }
        Commands::ExportMidi {
            link,
            output,
            loops,
        } => {
            let store = StateStore::from_link(&link, Schema::drum_machine());
            export_midi(
                &store.composition(),
                loops,
                config.transport.steps_per_beat,
                &output,
            )?;
            tracing::info!(path = %output.display(), "midi written");
        }
        Commands::Demo => println!("{}", demo_link()),
    }

    Ok(())
}
