//! Preload scheduling.
//!
//! On every tick the scheduler ranks the videos around the viewport and
//! launches one load task per candidate until the bandwidth arbiter runs out
//! of flow slots. Load tasks live in a `JoinSet` owned by the scheduler and
//! share the simulation's cancellation token.

pub mod candidates;
pub mod load_task;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub use candidates::{PreloadCandidate, PreloadWindow, rank_candidates};
pub use load_task::{LoadOutcome, LoadTask};

use crate::bandwidth::BandwidthArbiter;
use crate::clock::SimClock;
use crate::config::VidifyConfig;
use crate::feed::{Feed, Viewport};
use crate::video::VideoId;

/// Counters accumulated over a scheduler's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerStats {
    pub ticks: u64,
    pub launched: u64,
    /// Ticks that stopped launching because the arbiter had no free slot
    pub denied: u64,
    pub completed: u64,
    pub cancelled: u64,
    /// Tasks that panicked
    pub failed: u64,
}

/// Drives preload decisions and owns every in-flight load task.
pub struct LoadScheduler {
    feed: Arc<Feed>,
    arbiter: Arc<BandwidthArbiter>,
    clock: SimClock,
    cancel: CancellationToken,
    chunk_secs: f64,
    preload_factor: f64,
    tick_secs: f64,
    tasks: JoinSet<(VideoId, LoadOutcome)>,
    stats: SchedulerStats,
}

impl LoadScheduler {
    pub fn new(
        feed: Arc<Feed>,
        arbiter: Arc<BandwidthArbiter>,
        config: &VidifyConfig,
        clock: SimClock,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            feed,
            arbiter,
            clock,
            cancel,
            chunk_secs: config.network.chunk_duration_secs,
            preload_factor: config.layout.preload_distance_factor,
            tick_secs: config.simulation.scheduler_tick_secs,
            tasks: JoinSet::new(),
            stats: SchedulerStats::default(),
        }
    }

    /// Runs one scheduling pass and returns how many tasks it launched.
    ///
    /// The visible video resumes from its live playback position; every
    /// other video fills its first gap from zero. Must be called from within
    /// a tokio runtime.
    pub fn tick(&mut self, viewport: &Viewport) -> usize {
        self.reap();
        self.stats.ticks += 1;

        let mut launched = 0;
        for candidate in rank_candidates(&self.feed, viewport, self.preload_factor) {
            let Some(video) = self.feed.video(candidate.index) else {
                continue;
            };
            if !video.try_begin_loading() {
                continue;
            }

            let Some(grant) = self.arbiter.acquire() else {
                video.finish_loading();
                self.stats.denied += 1;
                debug!(
                    video = %candidate.id,
                    active = self.arbiter.active_flows(),
                    "No bandwidth available, retrying next tick"
                );
                break;
            };

            let resume_from = if candidate.is_current {
                video.position()
            } else {
                0.0
            };
            let task = LoadTask::new(Arc::clone(video), grant, resume_from, self.chunk_secs);
            let clock = self.clock;
            let cancel = self.cancel.clone();
            let id = candidate.id;
            self.tasks
                .spawn(async move { (id, task.run(clock, cancel).await) });
            launched += 1;
        }

        self.stats.launched += launched as u64;
        launched
    }

    /// Number of load tasks not yet reaped.
    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }

    pub fn stats(&self) -> SchedulerStats {
        self.stats
    }

    /// Waits for every in-flight task to finish.
    pub async fn drain(&mut self) {
        while let Some(result) = self.tasks.join_next().await {
            self.record(result);
        }
    }

    /// Ticks at the configured rate until cancelled, then drains in-flight tasks.
    pub async fn run(mut self, viewport: watch::Receiver<Viewport>) -> SchedulerStats {
        let mut ticker = self.clock.interval(self.tick_secs);

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                Some(result) = self.tasks.join_next(), if !self.tasks.is_empty() => {
                    self.record(result);
                }
                _ = ticker.tick() => {
                    let current = *viewport.borrow();
                    self.tick(&current);
                }
            }
        }

        self.drain().await;
        debug!(stats = ?self.stats, "Scheduler stopped");
        self.stats
    }

    fn reap(&mut self) {
        while let Some(result) = self.tasks.try_join_next() {
            self.record(result);
        }
    }

    fn record(&mut self, result: Result<(VideoId, LoadOutcome), JoinError>) {
        match result {
            Ok((_, LoadOutcome::Completed)) => self.stats.completed += 1,
            Ok((_, LoadOutcome::Cancelled)) => self.stats.cancelled += 1,
            Err(e) => {
                self.stats.failed += 1;
                warn!("Load task failed: {e}");
            }
        }
    }
}
