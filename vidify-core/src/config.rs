//! Centralized configuration for Vidify.
//!
//! Every tunable of the preloading engine and the simulation harness lives
//! here. The configuration is built once at startup, validated, and shared
//! by reference (`Arc<VidifyConfig>`) with every component that needs it.

use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Errors raised while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("Failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse configuration file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Central configuration for all Vidify components.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VidifyConfig {
    pub network: NetworkConfig,
    pub media: MediaConfig,
    pub layout: LayoutConfig,
    pub playback: PlaybackConfig,
    pub user: UserConfig,
    pub simulation: SimulationConfig,
}

/// Shared network interface limits and fetch granularity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Total interface capacity in megabits per second
    pub bandwidth_mbps: f64,
    /// Maximum number of concurrent load flows
    pub max_flows: usize,
    /// Seconds of video fetched per chunk
    pub chunk_duration_secs: f64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bandwidth_mbps: 10.0,
            max_flows: 3,
            chunk_duration_secs: 4.0,
        }
    }
}

/// Encoding rungs a generated video can be assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    Low,
    Medium,
    High,
}

impl Quality {
    const LADDER: &[Quality] = &[Quality::Low, Quality::Medium, Quality::High];

    /// Frame size encoded at this rung.
    pub fn resolution(self) -> Resolution {
        match self {
            Quality::Low => Resolution::new(640, 360),
            Quality::Medium => Resolution::new(1280, 720),
            Quality::High => Resolution::new(1920, 1080),
        }
    }

    /// Every rung up to and including `max`, lowest first.
    pub fn up_to(max: Quality) -> &'static [Quality] {
        let count = Self::LADDER.iter().filter(|q| **q <= max).count();
        &Self::LADDER[..count]
    }
}

impl FromStr for Quality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Quality::Low),
            "med" | "medium" => Ok(Quality::Medium),
            "high" => Ok(Quality::High),
            _ => Err(format!("Invalid quality: {s}")),
        }
    }
}

/// Frame dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn pixels(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

/// Parameters of the randomized media model.
///
/// Durations follow a clamped normal distribution; bitrate is derived from
/// resolution, frame rate and a bits-per-pixel encoding factor, then clamped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    pub mean_duration_secs: f64,
    pub duration_stddev_secs: f64,
    pub min_duration_secs: f64,
    pub max_duration_secs: f64,
    /// Frame rates a video is drawn from
    pub frame_rates: Vec<f64>,
    /// Highest encoding rung a video may be assigned
    pub max_quality: Quality,
    /// Encoded bits per pixel per frame
    pub bits_per_pixel: f64,
    pub min_bitrate_mbps: f64,
    pub max_bitrate_mbps: f64,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            mean_duration_secs: 30.0,
            duration_stddev_secs: 10.0,
            min_duration_secs: 20.0,
            max_duration_secs: 300.0,
            frame_rates: vec![24.0, 30.0, 60.0],
            max_quality: Quality::High,
            bits_per_pixel: 0.1,
            min_bitrate_mbps: 0.5,
            max_bitrate_mbps: 8.0,
        }
    }
}

impl MediaConfig {
    /// Derives the bitrate in Mbps for a resolution and frame rate.
    ///
    /// The result is clamped to `[min_bitrate_mbps, max_bitrate_mbps]` and is
    /// always strictly positive.
    pub fn bitrate_for(&self, resolution: Resolution, frame_rate: f64) -> f64 {
        let raw = resolution.pixels() as f64 * frame_rate * self.bits_per_pixel / 1_000_000.0;
        let clamped = raw.max(self.min_bitrate_mbps).min(self.max_bitrate_mbps);
        crate::video::clamp_bitrate(clamped)
    }
}

/// Feed geometry in pixels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    pub viewport_height: f64,
    /// Height of one feed item
    pub video_height: f64,
    /// Preload padding on each side of the viewport, in viewport heights
    pub preload_distance_factor: f64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            viewport_height: 1080.0,
            video_height: 1080.0,
            preload_distance_factor: 1.5,
        }
    }
}

/// Playback driver behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Simulated seconds between playback steps
    pub tick_secs: f64,
    /// Scroll speed (px/s) above which the visible video does not play
    pub scroll_speed_threshold: f64,
    /// Restart a video from zero when it becomes visible again
    pub replay_on_reentry: bool,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            tick_secs: 0.1,
            scroll_speed_threshold: 300.0,
            replay_on_reentry: true,
        }
    }
}

/// Simulated user behavior ranges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserConfig {
    /// Simulated seconds between stimulus updates
    pub tick_secs: f64,
    pub min_scroll_speed: f64,
    pub max_scroll_speed: f64,
    pub min_scroll_secs: f64,
    pub max_scroll_secs: f64,
    pub min_dwell_secs: f64,
    pub max_dwell_secs: f64,
    /// Jump displacement range, in viewport heights
    pub min_jump_screens: u32,
    pub max_jump_screens: u32,
    /// Chance of seeking inside the visible video when a dwell starts
    pub seek_probability: f64,
}

impl Default for UserConfig {
    fn default() -> Self {
        Self {
            tick_secs: 0.05,
            min_scroll_speed: 200.0,
            max_scroll_speed: 3000.0,
            min_scroll_secs: 0.5,
            max_scroll_secs: 3.0,
            min_dwell_secs: 2.0,
            max_dwell_secs: 20.0,
            min_jump_screens: 1,
            max_jump_screens: 5,
            seek_probability: 0.1,
        }
    }
}

/// Simulation harness configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Seed for reproducible feeds and user trajectories
    pub seed: Option<u64>,
    /// Number of videos in the generated feed
    pub video_count: usize,
    /// Simulated seconds per wall-clock second
    pub time_multiplier: f64,
    /// Simulated seconds between scheduler passes
    pub scheduler_tick_secs: f64,
    /// Simulated seconds between invariant checks
    pub monitor_interval_secs: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: None,
            video_count: 20,
            time_multiplier: 1.0,
            scheduler_tick_secs: 1.0,
            monitor_interval_secs: 0.5,
        }
    }
}

impl VidifyConfig {
    /// Creates a configuration for deterministic testing.
    pub fn for_testing() -> Self {
        Self {
            simulation: SimulationConfig {
                seed: Some(42), // Fixed seed for reproducible tests
                video_count: 5,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Creates a configuration for interactive runs that finish quickly.
    pub fn for_development() -> Self {
        Self {
            simulation: SimulationConfig {
                time_multiplier: 8.0,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Creates configuration with environment variable overrides.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    /// Applies `VIDIFY_*` environment variables on top of this configuration.
    pub fn apply_env_overrides(&mut self) {
        if let Some(mbps) = env_override("VIDIFY_BANDWIDTH_MBPS") {
            self.network.bandwidth_mbps = mbps;
        }
        if let Some(flows) = env_override("VIDIFY_MAX_FLOWS") {
            self.network.max_flows = flows;
        }
        if let Some(secs) = env_override("VIDIFY_CHUNK_SECS") {
            self.network.chunk_duration_secs = secs;
        }
        if let Some(factor) = env_override("VIDIFY_PRELOAD_FACTOR") {
            self.layout.preload_distance_factor = factor;
        }
        if let Some(quality) = env_override("VIDIFY_MAX_QUALITY") {
            self.media.max_quality = quality;
        }
        if let Some(seed) = env_override("VIDIFY_SEED") {
            self.simulation.seed = Some(seed);
        }
        if let Some(count) = env_override("VIDIFY_VIDEO_COUNT") {
            self.simulation.video_count = count;
        }
        if let Some(multiplier) = env_override("VIDIFY_TIME_MULTIPLIER") {
            self.simulation.time_multiplier = multiplier;
        }
    }

    /// Loads a JSON configuration file. Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// - `ConfigError::Io` - If the file cannot be read
    /// - `ConfigError::Parse` - If the file is not valid configuration JSON
    /// - `ConfigError::Invalid` - If the loaded values fail validation
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that every value is usable by the engine.
    ///
    /// # Errors
    ///
    /// - `ConfigError::Invalid` - Naming the first offending field
    pub fn validate(&self) -> Result<(), ConfigError> {
        let network = &self.network;
        ensure(
            network.bandwidth_mbps > 0.0,
            "network.bandwidth_mbps",
            "must be positive",
        )?;
        ensure(network.max_flows > 0, "network.max_flows", "must be at least 1")?;
        ensure(
            network.chunk_duration_secs > 0.0,
            "network.chunk_duration_secs",
            "must be positive",
        )?;

        let media = &self.media;
        ensure(
            media.min_duration_secs > 0.0 && media.min_duration_secs <= media.max_duration_secs,
            "media.min_duration_secs",
            "must be positive and not exceed max_duration_secs",
        )?;
        ensure(
            media.duration_stddev_secs >= 0.0,
            "media.duration_stddev_secs",
            "must not be negative",
        )?;
        ensure(
            !media.frame_rates.is_empty() && media.frame_rates.iter().all(|fps| *fps > 0.0),
            "media.frame_rates",
            "must list at least one positive frame rate",
        )?;
        ensure(
            media.bits_per_pixel > 0.0,
            "media.bits_per_pixel",
            "must be positive",
        )?;
        ensure(
            media.min_bitrate_mbps > 0.0 && media.min_bitrate_mbps <= media.max_bitrate_mbps,
            "media.min_bitrate_mbps",
            "must be positive and not exceed max_bitrate_mbps",
        )?;

        let layout = &self.layout;
        ensure(
            layout.viewport_height > 0.0,
            "layout.viewport_height",
            "must be positive",
        )?;
        ensure(
            layout.video_height > 0.0,
            "layout.video_height",
            "must be positive",
        )?;
        ensure(
            layout.preload_distance_factor >= 0.0,
            "layout.preload_distance_factor",
            "must not be negative",
        )?;

        ensure(
            self.playback.tick_secs > 0.0,
            "playback.tick_secs",
            "must be positive",
        )?;
        ensure(
            self.playback.scroll_speed_threshold >= 0.0,
            "playback.scroll_speed_threshold",
            "must not be negative",
        )?;

        let user = &self.user;
        ensure(user.tick_secs > 0.0, "user.tick_secs", "must be positive")?;
        ensure(
            user.min_scroll_speed >= 0.0 && user.min_scroll_speed <= user.max_scroll_speed,
            "user.min_scroll_speed",
            "must not be negative or exceed max_scroll_speed",
        )?;
        ensure(
            user.min_scroll_secs > 0.0 && user.min_scroll_secs <= user.max_scroll_secs,
            "user.min_scroll_secs",
            "must be positive and not exceed max_scroll_secs",
        )?;
        ensure(
            user.min_dwell_secs > 0.0 && user.min_dwell_secs <= user.max_dwell_secs,
            "user.min_dwell_secs",
            "must be positive and not exceed max_dwell_secs",
        )?;
        ensure(
            user.min_jump_screens > 0 && user.min_jump_screens <= user.max_jump_screens,
            "user.min_jump_screens",
            "must be at least 1 and not exceed max_jump_screens",
        )?;
        ensure(
            (0.0..=1.0).contains(&user.seek_probability),
            "user.seek_probability",
            "must be within 0.0..=1.0",
        )?;

        let simulation = &self.simulation;
        ensure(
            simulation.video_count > 0,
            "simulation.video_count",
            "must be at least 1",
        )?;
        ensure(
            simulation.time_multiplier > 0.0,
            "simulation.time_multiplier",
            "must be positive",
        )?;
        ensure(
            simulation.scheduler_tick_secs > 0.0,
            "simulation.scheduler_tick_secs",
            "must be positive",
        )?;
        ensure(
            simulation.monitor_interval_secs > 0.0,
            "simulation.monitor_interval_secs",
            "must be positive",
        )?;

        Ok(())
    }
}

fn ensure(condition: bool, field: &'static str, reason: &str) -> Result<(), ConfigError> {
    if condition {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            field,
            reason: reason.to_string(),
        })
    }
}

fn env_override<T: FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok()?.parse().ok()
}
