use std::{
    thread,
    time::{Duration, Instant},
};

use tracing::{debug, info};

use crate::{session::Session, sound::SoundBackend};

/// Pumps `session` against the wall clock for `duration`, sleeping between ticks.
///
/// Runs on the calling thread, so two ticks never overlap. Returns the number of
/// ticks fired.
pub fn run_realtime<B: SoundBackend>(session: &mut Session<B>, duration: Duration) -> usize {
    let started = Instant::now();
    let deadline = started + duration;
    let mut fired = 0;

    loop {
        let now = Instant::now();
        fired += session.pump(now);
        if now >= deadline {
            break;
        }
        let wake = session
            .registry()
            .next_tick_at()
            .map_or(deadline, |next| next.min(deadline));
        let wait = wake.saturating_duration_since(Instant::now());
        if !wait.is_zero() {
            thread::sleep(wait);
        }
    }

    info!(
        fired,
        elapsed_ms = started.elapsed().as_millis(),
        "realtime run finished"
    );
    fired
}

pub fn run_synthetic<B: SoundBackend>(
    session: &mut Session<B>,
    start: Instant,
    ticks: usize,
) -> Vec<Instant> {
    let mut due = Vec::with_capacity(ticks);
    let mut now = start;
    while due.len() < ticks {
        let Some(next) = session.registry().next_tick_at() else {
            debug!(fired = due.len(), "transport stopped before all ticks fired");
            break;
        };
        now = now.max(next);
        if session.pump(now) > 0 {
            due.push(now);
        }
    }
    due
}
