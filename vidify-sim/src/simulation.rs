//! Simulation runner wiring the engine to a simulated user.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;
use vidify_core::{
    BandwidthArbiter, ConfigError, Feed, FlowStats, LoadScheduler, PlaybackDriver, PlaybackStats,
    SchedulerStats, SimClock, VidifyConfig, VideoSnapshot, Viewport,
};

use crate::generator::generate_feed;
use crate::invariants::{
    FlowLimitInvariant, Invariant, PlaybackBoundsInvariant, PlaybackMonotonicInvariant,
    WatchedWithinLoadedInvariant,
};
use crate::rng::{DeterministicRng, FEED_STREAM, USER_STREAM};
use crate::state::{FeedState, SimulationMetrics};
use crate::user::{UserSimulator, UserStats};

/// Maximum number of invariant violations before aborting the run.
const MAX_INVARIANT_VIOLATIONS: usize = 10;

/// Errors that can occur during simulation.
#[derive(Debug, thiserror::Error)]
pub enum SimulationError {
    /// Configuration failed validation
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// Requested run length is negative or not finite
    #[error("Invalid simulation duration: {secs}")]
    InvalidDuration {
        /// Requested duration in simulated seconds
        secs: f64,
    },

    /// Too many invariant violations occurred
    #[error("Too many invariant violations: {count}")]
    TooManyInvariantViolations {
        /// Number of violations that occurred
        count: usize,
    },

    /// A simulation task panicked
    #[error("Simulation task '{task}' failed: {reason}")]
    TaskFailed {
        /// Which task failed
        task: &'static str,
        /// Panic or join error message
        reason: String,
    },
}

/// Result of a simulation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationReport {
    /// Unique identifier of this run
    pub run_id: Uuid,
    /// Seed used for reproduction
    pub seed: u64,
    /// Wall-clock start of the run
    pub started_at: DateTime<Utc>,
    /// Simulated seconds the run lasted
    pub duration_secs: f64,
    /// Whether the run was stopped by an external cancellation
    pub cancelled: bool,
    /// Final state of every video
    pub videos: Vec<VideoSnapshot>,
    /// Load scheduler counters
    pub scheduler: SchedulerStats,
    /// Playback counters
    pub playback: PlaybackStats,
    /// Simulated user counters
    pub user: UserStats,
    /// Bandwidth arbiter counters
    pub flows: FlowStats,
    /// Monitor metrics and invariant violations
    pub metrics: SimulationMetrics,
}

impl SimulationReport {
    /// True if no invariant was violated.
    pub fn success(&self) -> bool {
        self.metrics.invariant_violations.is_empty()
    }

    /// Seconds of video watched across the feed.
    pub fn total_watched_secs(&self) -> f64 {
        self.videos.iter().map(|v| v.watched.covered_length()).sum()
    }

    /// Seconds spent stalled across the feed.
    pub fn total_stalled_secs(&self) -> f64 {
        self.videos.iter().map(|v| v.stalled_secs).sum()
    }

    /// Megabytes loaded across the feed.
    pub fn total_loaded_mb(&self) -> f64 {
        self.videos.iter().map(VideoSnapshot::loaded_mb).sum()
    }

    /// Number of videos loaded end to end.
    pub fn fully_loaded_count(&self) -> usize {
        self.videos.iter().filter(|v| v.is_fully_loaded()).count()
    }

    /// Serializes the report as pretty-printed JSON.
    ///
    /// # Errors
    /// Returns `serde_json::Error` if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Generates human-readable summary.
    pub fn summary(&self) -> String {
        let mut summary = String::new();
        summary.push_str(&format!(
            "Simulation Report (seed: {}, run: {})\n",
            self.seed, self.run_id
        ));
        summary.push_str(&format!("Started: {}\n", self.started_at.to_rfc3339()));
        summary.push_str(&format!("Duration: {:.1}s simulated\n", self.duration_secs));
        if self.cancelled {
            summary.push_str("Cancelled before the requested duration\n");
        }
        summary.push_str(&format!("Success: {}\n", self.success()));

        summary.push_str(&format!(
            "\nLoading:\n  Launched: {}  Completed: {}  Cancelled: {}  Denied ticks: {}\n",
            self.scheduler.launched,
            self.scheduler.completed,
            self.scheduler.cancelled,
            self.scheduler.denied
        ));
        summary.push_str(&format!(
            "  Flows started: {}  released: {}  peak: {}/{}\n",
            self.flows.started, self.flows.released, self.flows.peak, self.flows.max_flows
        ));
        summary.push_str(&format!(
            "  Loaded: {:.1} MB, {}/{} videos complete\n",
            self.total_loaded_mb(),
            self.fully_loaded_count(),
            self.videos.len()
        ));

        summary.push_str(&format!(
            "\nPlayback:\n  Watched: {:.1}s  Stalled: {:.1}s  Buffering samples: {:.1}%\n",
            self.total_watched_secs(),
            self.total_stalled_secs(),
            self.metrics.buffering_ratio() * 100.0
        ));
        summary.push_str(&format!(
            "  Replays: {}  Scrolling steps: {}\n",
            self.playback.replays, self.playback.scrolling
        ));
        summary.push_str(&format!(
            "\nUser:\n  Scrolls: {}  Jumps: {}  Stops: {}  Seeks: {}\n",
            self.user.scrolls, self.user.jumps, self.user.stops, self.user.seeks
        ));

        if !self.metrics.invariant_violations.is_empty() {
            summary.push_str("\nInvariant violations:\n");
            for violation in &self.metrics.invariant_violations {
                summary.push_str(&format!("  - {violation}\n"));
            }
        }

        summary
    }
}

/// A complete feed simulation: feed, arbiter, user, and invariant monitor.
pub struct FeedSimulation {
    config: Arc<VidifyConfig>,
    seed: u64,
    feed: Arc<Feed>,
    arbiter: Arc<BandwidthArbiter>,
    invariants: Vec<Arc<dyn Invariant>>,
}

impl FeedSimulation {
    /// Creates a simulation with a randomly generated feed.
    ///
    /// Uses `config.simulation.seed`, or a fresh random seed when unset.
    ///
    /// # Errors
    ///
    /// - `SimulationError::Config` - Configuration failed validation
    pub fn new(config: VidifyConfig) -> Result<Self, SimulationError> {
        config.validate()?;
        let seed = config.simulation.seed.unwrap_or_else(rand::random);
        let mut rng = DeterministicRng::stream(seed, FEED_STREAM);
        let feed = generate_feed(
            &config.media,
            &config.layout,
            config.simulation.video_count,
            &mut rng,
        );
        Ok(Self::assemble(config, seed, feed))
    }

    /// Creates a simulation over a prepared feed.
    ///
    /// # Errors
    ///
    /// - `SimulationError::Config` - Configuration failed validation
    pub fn with_feed(config: VidifyConfig, feed: Feed) -> Result<Self, SimulationError> {
        config.validate()?;
        let seed = config.simulation.seed.unwrap_or_else(rand::random);
        Ok(Self::assemble(config, seed, feed))
    }

    fn assemble(config: VidifyConfig, seed: u64, feed: Feed) -> Self {
        let arbiter = Arc::new(BandwidthArbiter::from_config(&config.network));
        Self {
            config: Arc::new(config),
            seed,
            feed: Arc::new(feed),
            arbiter,
            invariants: vec![
                Arc::new(FlowLimitInvariant),
                Arc::new(PlaybackBoundsInvariant),
                Arc::new(PlaybackMonotonicInvariant::new()),
                Arc::new(WatchedWithinLoadedInvariant),
            ],
        }
    }

    /// Adds an invariant checked on every monitor tick.
    pub fn add_invariant(&mut self, invariant: Arc<dyn Invariant>) {
        self.invariants.push(invariant);
    }

    /// Returns the seed driving feed generation and the user.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Returns the simulated feed.
    pub fn feed(&self) -> &Arc<Feed> {
        &self.feed
    }

    /// Returns the shared bandwidth arbiter.
    pub fn arbiter(&self) -> &Arc<BandwidthArbiter> {
        &self.arbiter
    }

    /// Runs for `secs` simulated seconds.
    ///
    /// # Errors
    ///
    /// - `SimulationError::InvalidDuration` - Duration is negative or not finite
    /// - `SimulationError::TooManyInvariantViolations` - Too many invariant violations
    /// - `SimulationError::TaskFailed` - A simulation task panicked
    pub async fn run_for(self, secs: f64) -> Result<SimulationReport, SimulationError> {
        self.run_until(secs, CancellationToken::new()).await
    }

    /// Runs for `secs` simulated seconds or until `cancel` fires.
    ///
    /// All tasks are stopped and joined before returning, so every flow has
    /// been released and no video is left marked as loading.
    ///
    /// # Errors
    ///
    /// - `SimulationError::InvalidDuration` - Duration is negative or not finite
    /// - `SimulationError::TooManyInvariantViolations` - Too many invariant violations
    /// - `SimulationError::TaskFailed` - A simulation task panicked
    pub async fn run_until(
        self,
        secs: f64,
        cancel: CancellationToken,
    ) -> Result<SimulationReport, SimulationError> {
        if !secs.is_finite() || secs < 0.0 {
            return Err(SimulationError::InvalidDuration { secs });
        }

        let config = Arc::clone(&self.config);
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let clock = SimClock::new(config.simulation.time_multiplier);
        let tasks_cancel = cancel.child_token();

        info!(
            %run_id,
            seed = self.seed,
            videos = self.feed.len(),
            duration_secs = secs,
            "Starting feed simulation"
        );

        let viewport_height = config.layout.viewport_height;
        let (viewport_tx, viewport_rx) = watch::channel(Viewport::new(viewport_height));

        let user = UserSimulator::new(
            &config.user,
            viewport_height,
            self.feed.max_scroll(viewport_height),
            DeterministicRng::stream(self.seed, USER_STREAM),
        );
        let scheduler = LoadScheduler::new(
            Arc::clone(&self.feed),
            Arc::clone(&self.arbiter),
            &config,
            clock,
            tasks_cancel.clone(),
        );
        let playback = PlaybackDriver::new(Arc::clone(&self.feed), &config.playback);

        let user_handle = tokio::spawn(user.run(
            Arc::clone(&self.feed),
            viewport_tx,
            clock,
            tasks_cancel.clone(),
        ));
        let scheduler_handle = tokio::spawn(scheduler.run(viewport_rx.clone()));
        let playback_handle = tokio::spawn(playback.run(
            viewport_rx.clone(),
            clock,
            config.playback.tick_secs,
            tasks_cancel.clone(),
        ));

        let mut metrics = SimulationMetrics::default();
        let mut cancelled = false;
        let deadline = clock.sleep(secs);
        tokio::pin!(deadline);
        let mut monitor = clock.interval(config.simulation.monitor_interval_secs);

        let outcome = loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    cancelled = true;
                    break Ok(());
                }
                _ = &mut deadline => break Ok(()),
                _ = monitor.tick() => {
                    let state = self.capture(&clock, &viewport_rx);
                    metrics.record_sample(&state);
                    if let Err(e) = self.check_invariants(&state, &mut metrics) {
                        break Err(e);
                    }
                }
            }
        };
        let duration_secs = clock.elapsed_secs();

        tasks_cancel.cancel();
        let user_stats = join_task("user", user_handle).await;
        let scheduler_stats = join_task("scheduler", scheduler_handle).await;
        let playback_stats = join_task("playback", playback_handle).await;
        outcome?;
        let user_stats = user_stats?;
        let scheduler_stats = scheduler_stats?;
        let playback_stats = playback_stats?;

        // Quiescent state: every load has been released
        let final_state = self.capture(&clock, &viewport_rx);
        self.check_invariants(&final_state, &mut metrics)?;

        let report = SimulationReport {
            run_id,
            seed: self.seed,
            started_at,
            duration_secs,
            cancelled,
            videos: final_state.videos,
            scheduler: scheduler_stats,
            playback: playback_stats,
            user: user_stats,
            flows: final_state.flows,
            metrics,
        };

        info!(
            %run_id,
            success = report.success(),
            watched_secs = report.total_watched_secs(),
            stalled_secs = report.total_stalled_secs(),
            "Feed simulation finished"
        );

        Ok(report)
    }

    fn capture(&self, clock: &SimClock, viewport: &watch::Receiver<Viewport>) -> FeedState {
        let current = *viewport.borrow();
        FeedState {
            time_secs: clock.elapsed_secs(),
            visible: self.feed.visible_index(&current),
            videos: self.feed.snapshot(),
            flows: self.arbiter.stats(),
        }
    }

    fn check_invariants(
        &self,
        state: &FeedState,
        metrics: &mut SimulationMetrics,
    ) -> Result<(), SimulationError> {
        for invariant in &self.invariants {
            metrics.invariant_checks += 1;
            if let Err(violation) = invariant.check(state) {
                warn!("{violation}");
                metrics.invariant_violations.push(violation);

                if metrics.invariant_violations.len() >= MAX_INVARIANT_VIOLATIONS {
                    return Err(SimulationError::TooManyInvariantViolations {
                        count: metrics.invariant_violations.len(),
                    });
                }
            }
        }
        Ok(())
    }
}

async fn join_task<T>(task: &'static str, handle: JoinHandle<T>) -> Result<T, SimulationError> {
    handle.await.map_err(|e| SimulationError::TaskFailed {
        task,
        reason: e.to_string(),
    })
}
