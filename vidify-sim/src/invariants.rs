//! Invariant checking framework for simulation validation.

use std::collections::HashMap;
use std::fmt;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use vidify_core::VideoId;

use crate::state::FeedState;

/// Tolerance for floating point comparisons of positions.
const POSITION_EPSILON: f64 = 1e-9;

/// Violation of a simulation invariant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvariantViolation {
    /// Name of the violated invariant
    pub invariant: String,
    /// Detailed description of the violation
    pub description: String,
    /// Simulated second at which the violation was observed
    pub time_secs: f64,
}

impl fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Invariant '{}' violated at {:.2}s: {}",
            self.invariant, self.time_secs, self.description
        )
    }
}

/// Trait for checking simulation invariants.
pub trait Invariant: Send + Sync {
    /// Checks if invariant holds for current state.
    ///
    /// # Errors
    /// Returns `InvariantViolation` if the invariant condition is not met.
    fn check(&self, state: &FeedState) -> Result<(), InvariantViolation>;

    /// Returns name of this invariant.
    fn name(&self) -> &str;

    /// Builds a violation of this invariant at the state's time.
    fn violation(&self, state: &FeedState, description: String) -> InvariantViolation {
        InvariantViolation {
            invariant: self.name().to_string(),
            description,
            time_secs: state.time_secs,
        }
    }
}

/// Ensures the arbiter never exceeds its flow limit and never leaks a flow.
pub struct FlowLimitInvariant;

impl Invariant for FlowLimitInvariant {
    fn check(&self, state: &FeedState) -> Result<(), InvariantViolation> {
        let flows = &state.flows;
        if flows.active > flows.max_flows {
            return Err(self.violation(
                state,
                format!("{} active flows exceed limit {}", flows.active, flows.max_flows),
            ));
        }
        if flows.started.checked_sub(flows.released) != Some(flows.active as u64) {
            return Err(self.violation(
                state,
                format!(
                    "{} started minus {} released does not equal {} active",
                    flows.started, flows.released, flows.active
                ),
            ));
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "FlowLimit"
    }
}

/// Ensures positions and recorded ranges stay within each video's duration.
pub struct PlaybackBoundsInvariant;

impl Invariant for PlaybackBoundsInvariant {
    fn check(&self, state: &FeedState) -> Result<(), InvariantViolation> {
        for video in &state.videos {
            if video.position < 0.0 || video.position > video.duration_secs {
                return Err(self.violation(
                    state,
                    format!(
                        "{} position {:.3} outside [0, {:.3}]",
                        video.id, video.position, video.duration_secs
                    ),
                ));
            }
            if !video.loaded.is_within(0.0, video.duration_secs) {
                return Err(self.violation(
                    state,
                    format!("{} loaded ranges exceed its duration", video.id),
                ));
            }
            if !video.watched.is_within(0.0, video.duration_secs) {
                return Err(self.violation(
                    state,
                    format!("{} watched ranges exceed its duration", video.id),
                ));
            }
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "PlaybackBounds"
    }
}

/// Ensures playback never moves backwards except through a reset or seek.
///
/// Remembers the last position seen per video along with the video's jump
/// generation; a lower position is only accepted after the generation moves.
#[derive(Default)]
pub struct PlaybackMonotonicInvariant {
    last_seen: Mutex<HashMap<VideoId, (u64, f64)>>,
}

impl PlaybackMonotonicInvariant {
    /// Creates invariant with no history.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Invariant for PlaybackMonotonicInvariant {
    fn check(&self, state: &FeedState) -> Result<(), InvariantViolation> {
        let mut last_seen = self.last_seen.lock();
        let mut result = Ok(());

        for video in &state.videos {
            let previous = last_seen.insert(video.id, (video.generation, video.position));
            if let Some((generation, position)) = previous {
                let rewound = generation == video.generation
                    && video.position + POSITION_EPSILON < position;
                if rewound && result.is_ok() {
                    result = Err(self.violation(
                        state,
                        format!(
                            "{} moved back from {:.3} to {:.3} without a reset",
                            video.id, position, video.position
                        ),
                    ));
                }
            }
        }
        result
    }

    fn name(&self) -> &str {
        "PlaybackMonotonic"
    }
}

/// Ensures every watched second was loaded first.
pub struct WatchedWithinLoadedInvariant;

impl Invariant for WatchedWithinLoadedInvariant {
    fn check(&self, state: &FeedState) -> Result<(), InvariantViolation> {
        for video in &state.videos {
            let unloaded = video
                .watched
                .ranges()
                .iter()
                .find(|range| !video.loaded.contains_range(range.start, range.end));
            if let Some(range) = unloaded {
                return Err(self.violation(
                    state,
                    format!("{} watched {range} without loading it", video.id),
                ));
            }
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "WatchedWithinLoaded"
    }
}
