use std::time::Duration;

pub const DEFAULT_STEPS_PER_BEAT: u32 = 4;
pub const DEFAULT_PPQ: u16 = 480;

#[must_use]
pub fn step_period(bpm: u32, steps_per_beat: u32) -> Duration {
    let steps_per_minute = f64::from(bpm.max(1)) * f64::from(steps_per_beat.max(1));
    Duration::from_secs_f64(60.0 / steps_per_minute)
}

#[must_use]
pub fn steps_to_seconds(steps: u64, bpm: u32, steps_per_beat: u32) -> f64 {
    #[allow(clippy::cast_precision_loss)]
    let steps = steps as f64;
    steps * step_period(bpm, steps_per_beat).as_secs_f64()
}

#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn seconds_to_frames(seconds: f64, sample_rate: u32) -> usize {
    if seconds <= 0.0 {
        return 0;
    }
    (seconds * f64::from(sample_rate)).round() as usize
}

#[must_use]
pub fn steps_to_frames(steps: u64, bpm: u32, steps_per_beat: u32, sample_rate: u32) -> usize {
    seconds_to_frames(steps_to_seconds(steps, bpm, steps_per_beat), sample_rate)
}

#[must_use]
pub fn seconds_to_duration(seconds: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(seconds).ok()
}

#[must_use]
pub fn ticks_per_step(ppq: u16, steps_per_beat: u32) -> u32 {
    (u32::from(ppq) / steps_per_beat.max(1)).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sixteenth_at_120_bpm_is_125_ms() {
        assert_eq!(
            step_period(120, DEFAULT_STEPS_PER_BEAT),
            Duration::from_millis(125)
        );
    }

    #[test]
    fn zero_inputs_do_not_divide_by_zero() {
        assert!(step_period(0, 0) > Duration::ZERO);
        assert_eq!(ticks_per_step(480, 0), 480);
    }

    #[test]
    fn one_bar_of_sixteenths_fills_two_seconds_at_120_bpm() {
        let frames = steps_to_frames(16, 120, DEFAULT_STEPS_PER_BEAT, 48_000);
        assert_eq!(frames, 96_000);
    }

    #[test]
    fn unrepresentable_seconds_have_no_duration() {
        assert_eq!(seconds_to_duration(1.5), Some(Duration::from_millis(1_500)));
        assert_eq!(seconds_to_duration(0.0), Some(Duration::ZERO));
        assert_eq!(seconds_to_duration(f64::INFINITY), None);
        assert_eq!(seconds_to_duration(f64::NAN), None);
        assert_eq!(seconds_to_duration(-1.0), None);
        assert_eq!(seconds_to_duration(1e30), None);
    }

    #[test]
    fn ticks_per_step_splits_quarter_notes() {
        assert_eq!(ticks_per_step(DEFAULT_PPQ, DEFAULT_STEPS_PER_BEAT), 120);
    }
}
