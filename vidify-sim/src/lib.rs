//! Vidify Simulation - Seeded feed and user simulation for the preloading engine.

#![warn(missing_docs)]
#![warn(clippy::missing_errors_doc)]
//!
//! This crate drives `vidify-core` with a generated feed and a simulated
//! user, watches the engine's invariants while it runs, and reports what
//! happened.
//!
//! # Features
//!
//! - **Reproducible Runs**: The same seed yields the same feed and the same user trajectory
//! - **Media Model**: Durations, quality rungs, and frame rates drawn from the configuration
//! - **User Simulation**: Scroll, jump, and stop behavior with occasional seeks
//! - **Invariant Checking**: Flow limits, playback bounds, and watched-within-loaded checks
//! - **Run Reports**: Human summary and JSON output
//!
//! # Example
//!
//! ```rust,no_run
//! use vidify_core::VidifyConfig;
//! use vidify_sim::FeedSimulation;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = VidifyConfig::for_testing();
//! let simulation = FeedSimulation::new(config)?;
//!
//! let report = simulation.run_for(120.0).await?;
//! println!("{}", report.summary());
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! - **Generator**: Builds the feed from the media model
//! - **User Simulator**: Publishes viewport updates over a watch channel
//! - **Engine Tasks**: Load scheduler and playback driver from `vidify-core`
//! - **Monitor**: Samples feed state, checks invariants, and collects metrics

pub mod generator;
pub mod invariants;
pub mod rng;
pub mod simulation;
pub mod state;
pub mod user;

pub use generator::{generate_feed, generate_profile};
pub use invariants::{
    FlowLimitInvariant, Invariant, InvariantViolation, PlaybackBoundsInvariant,
    PlaybackMonotonicInvariant, WatchedWithinLoadedInvariant,
};
pub use rng::DeterministicRng;
pub use simulation::{FeedSimulation, SimulationError, SimulationReport};
pub use state::{FeedState, SimulationMetrics};
pub use user::{UserAction, UserSimulator, UserStats, UserStep};
