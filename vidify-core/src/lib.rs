//! Vidify Core - Bandwidth-constrained video preloading for scrolling feeds
//!
//! This crate provides the engine of the feed simulator: interval tracking of
//! loaded and watched time, the shared bandwidth arbiter, the preload
//! scheduler with its chunked load tasks, the playback driver, and the
//! configuration and tracing setup shared by the other crates.

pub mod bandwidth;
pub mod clock;
pub mod config;
pub mod feed;
pub mod interval;
pub mod playback;
pub mod scheduler;
pub mod tracing_setup;
pub mod video;

// Re-export main types for convenient access
pub use bandwidth::{BandwidthArbiter, FlowGrant, FlowStats};
pub use clock::SimClock;
pub use config::{ConfigError, Quality, Resolution, VidifyConfig};
pub use feed::{Feed, LayoutSpan, Viewport};
pub use interval::{IntervalSet, TimeRange};
pub use playback::{PlaybackDriver, PlaybackStats};
pub use scheduler::{LoadOutcome, LoadScheduler, LoadTask, PreloadCandidate, SchedulerStats};
pub use video::{PlaybackState, VideoAsset, VideoId, VideoProfile, VideoSnapshot};

/// Errors surfaced by the engine's setup paths.
///
/// Runtime operations (loading, playback, arbitration) never fail: denied
/// bandwidth, cancellation and buffering are reported as values instead.
#[derive(Debug, thiserror::Error)]
pub enum VidifyError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Tracing setup failed: {reason}")]
    Tracing { reason: String },
}

impl VidifyError {
    /// Returns a user-friendly error message suitable for display.
    pub fn user_message(&self) -> String {
        match self {
            VidifyError::Config(ConfigError::Invalid { field, reason }) => {
                format!("Invalid setting '{field}': {reason}")
            }
            VidifyError::Config(ConfigError::Parse(e)) => {
                format!("Could not parse configuration file: {e}")
            }
            VidifyError::Config(ConfigError::Io(_)) => {
                "Could not read configuration file".to_string()
            }
            VidifyError::Io(_) => "File system error occurred".to_string(),
            VidifyError::Tracing { .. } => "Logging could not be initialized".to_string(),
        }
    }

    /// Checks if this error is due to user input validation.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            VidifyError::Config(ConfigError::Invalid { .. } | ConfigError::Parse(_))
        )
    }
}

pub type Result<T> = std::result::Result<T, VidifyError>;
