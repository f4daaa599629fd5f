//! Simulated time control.
//!
//! Every duration inside the engine is expressed in simulated seconds. The
//! clock converts them to wall time through the configured time multiplier
//! and reads `tokio::time::Instant`, so a paused tokio runtime drives the
//! whole simulation in virtual time.

use std::time::Duration;

use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Smallest accepted multiplier; anything lower is treated as this value.
const MIN_TIME_MULTIPLIER: f64 = 1e-3;

/// Clock mapping simulated seconds onto the tokio timer.
///
/// Cheap to copy; every task holds its own copy sharing the same origin.
#[derive(Debug, Clone, Copy)]
pub struct SimClock {
    origin: Instant,
    time_multiplier: f64,
}

impl SimClock {
    /// Creates a clock starting at simulated time zero.
    ///
    /// `time_multiplier` is simulated seconds per wall second.
    pub fn new(time_multiplier: f64) -> Self {
        Self {
            origin: Instant::now(),
            time_multiplier: time_multiplier.max(MIN_TIME_MULTIPLIER),
        }
    }

    /// Simulated seconds elapsed since the clock was created.
    pub fn elapsed_secs(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() * self.time_multiplier
    }

    pub fn time_multiplier(&self) -> f64 {
        self.time_multiplier
    }

    /// Wall duration corresponding to `sim_secs` simulated seconds.
    ///
    /// Negative and NaN inputs map to zero. Values too large for a `Duration`
    /// saturate at `Duration::MAX`, which tokio treats as a far-future deadline.
    pub fn wall_duration(&self, sim_secs: f64) -> Duration {
        if sim_secs.is_nan() || sim_secs <= 0.0 {
            return Duration::ZERO;
        }
        Duration::try_from_secs_f64(sim_secs / self.time_multiplier).unwrap_or(Duration::MAX)
    }

    /// Sleeps for `sim_secs` simulated seconds.
    pub async fn sleep(&self, sim_secs: f64) {
        tokio::time::sleep(self.wall_duration(sim_secs)).await;
    }

    /// Sleeps for `sim_secs` unless `cancel` fires first.
    ///
    /// Returns true if the full duration elapsed, false if cancelled.
    pub async fn sleep_or_cancel(&self, sim_secs: f64, cancel: &CancellationToken) -> bool {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => false,
            _ = self.sleep(sim_secs) => true,
        }
    }

    /// Fixed-rate ticker firing every `sim_secs` simulated seconds.
    ///
    /// Missed ticks are delayed rather than bursted.
    pub fn interval(&self, sim_secs: f64) -> Interval {
        let period = self.wall_duration(sim_secs).max(Duration::from_micros(1));
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval
    }
}

impl Default for SimClock {
    fn default() -> Self {
        Self::new(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wall_duration_scaling() {
        let clock = SimClock::new(4.0);
        assert_eq!(clock.wall_duration(8.0), Duration::from_secs(2));

        let realtime = SimClock::new(1.0);
        assert_eq!(realtime.wall_duration(1.5), Duration::from_millis(1500));
    }

    #[test]
    fn test_degenerate_inputs_are_clamped() {
        let clock = SimClock::new(0.0);
        assert_eq!(clock.time_multiplier(), MIN_TIME_MULTIPLIER);

        let clock = SimClock::default();
        assert_eq!(clock.wall_duration(-3.0), Duration::ZERO);
        assert_eq!(clock.wall_duration(f64::NAN), Duration::ZERO);
    }

    #[test]
    fn test_long_durations_are_not_truncated() {
        let clock = SimClock::default();
        assert_eq!(clock.wall_duration(160_000.0), Duration::from_secs(160_000));
        assert_eq!(clock.wall_duration(1e12), Duration::from_secs_f64(1e12));
        assert_eq!(clock.wall_duration(f64::INFINITY), Duration::MAX);
        assert_eq!(SimClock::new(1e-3).wall_duration(1e300), Duration::MAX);
    }

    #[tokio::test(start_paused = true)]
    async fn test_elapsed_tracks_simulated_time() {
        let clock = SimClock::new(2.0);
        clock.sleep(10.0).await;

        let elapsed = clock.elapsed_secs();
        assert!((elapsed - 10.0).abs() < 1e-6, "elapsed {elapsed}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_or_cancel_observes_cancellation() {
        let clock = SimClock::default();
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let completed = clock.sleep_or_cancel(60.0, &cancel).await;
        assert!(!completed);
        assert!(clock.elapsed_secs() < 2.0);

        let fresh = CancellationToken::new();
        assert!(clock.sleep_or_cancel(0.5, &fresh).await);
    }
}
