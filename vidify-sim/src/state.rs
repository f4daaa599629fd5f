//! Observed feed state and metrics collected while a simulation runs.

use serde::{Deserialize, Serialize};
use vidify_core::{FlowStats, VideoSnapshot};

use crate::invariants::InvariantViolation;

/// Snapshot of everything the monitor inspects at one instant.
///
/// Each video is copied under its own lock in turn, so the snapshot is
/// consistent per video but not across videos.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedState {
    /// Simulated seconds since the run started
    pub time_secs: f64,
    /// Index of the video under the viewport centre
    pub visible: Option<usize>,
    /// Per-video state
    pub videos: Vec<VideoSnapshot>,
    /// Bandwidth arbiter counters
    pub flows: FlowStats,
}

impl FeedState {
    /// Returns true if the visible video is stalled on unloaded data.
    pub fn visible_is_buffering(&self) -> bool {
        self.visible
            .and_then(|index| self.videos.get(index))
            .is_some_and(VideoSnapshot::is_buffering)
    }

    /// Number of videos with an active load.
    pub fn loading_count(&self) -> usize {
        self.videos.iter().filter(|video| video.loading).count()
    }
}

/// Metrics collected during simulation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimulationMetrics {
    /// Monitor samples taken
    pub samples: u64,
    /// Samples where the visible video was buffering
    pub buffering_samples: u64,
    /// Highest number of concurrently loading videos observed
    pub peak_loading_videos: usize,
    /// Highest number of active flows observed
    pub peak_active_flows: usize,
    /// Individual invariant evaluations
    pub invariant_checks: u64,
    /// Every violation recorded
    pub invariant_violations: Vec<InvariantViolation>,
}

impl SimulationMetrics {
    /// Folds one sample into the running metrics.
    pub fn record_sample(&mut self, state: &FeedState) {
        self.samples += 1;
        if state.visible_is_buffering() {
            self.buffering_samples += 1;
        }
        self.peak_loading_videos = self.peak_loading_videos.max(state.loading_count());
        self.peak_active_flows = self.peak_active_flows.max(state.flows.active);
    }

    /// Fraction of samples where the viewer was waiting on data.
    pub fn buffering_ratio(&self) -> f64 {
        if self.samples == 0 {
            return 0.0;
        }
        self.buffering_samples as f64 / self.samples as f64
    }
}
