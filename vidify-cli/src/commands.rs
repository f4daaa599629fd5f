//! CLI command implementations

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Subcommand;
use tokio_util::sync::CancellationToken;
use vidify_core::{Result, VidifyConfig};
use vidify_sim::FeedSimulation;

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Run a feed simulation and print the report
    Run {
        /// Simulated seconds to run for
        #[arg(short, long, default_value = "120")]
        duration: f64,
        /// Seed for the feed and user trajectory
        #[arg(short, long)]
        seed: Option<u64>,
        /// Number of videos in the feed
        #[arg(long)]
        videos: Option<usize>,
        /// Interface capacity in megabits per second
        #[arg(short, long)]
        bandwidth: Option<f64>,
        /// Maximum concurrent load flows
        #[arg(long)]
        max_flows: Option<usize>,
        /// Simulated seconds per wall-clock second
        #[arg(long)]
        time_multiplier: Option<f64>,
        /// JSON configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Print the report as JSON instead of a summary
        #[arg(long)]
        json: bool,
    },
    /// Print the effective configuration as JSON
    Config {
        /// JSON configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

/// Command-line values that take precedence over the loaded configuration.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Overrides {
    pub seed: Option<u64>,
    pub videos: Option<usize>,
    pub bandwidth: Option<f64>,
    pub max_flows: Option<usize>,
    pub time_multiplier: Option<f64>,
}

impl Overrides {
    pub fn apply(&self, config: &mut VidifyConfig) {
        if let Some(seed) = self.seed {
            config.simulation.seed = Some(seed);
        }
        if let Some(videos) = self.videos {
            config.simulation.video_count = videos;
        }
        if let Some(bandwidth) = self.bandwidth {
            config.network.bandwidth_mbps = bandwidth;
        }
        if let Some(max_flows) = self.max_flows {
            config.network.max_flows = max_flows;
        }
        if let Some(multiplier) = self.time_multiplier {
            config.simulation.time_multiplier = multiplier;
        }
    }
}

/// Handle the CLI command
///
/// # Errors
/// Returns appropriate error based on the command that fails
pub async fn handle_command(command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Run {
            duration,
            seed,
            videos,
            bandwidth,
            max_flows,
            time_multiplier,
            config,
            json,
        } => {
            let overrides = Overrides {
                seed,
                videos,
                bandwidth,
                max_flows,
                time_multiplier,
            };
            let config = effective_config(config.as_deref(), &overrides)?;
            run_simulation(config, duration, json).await
        }
        Commands::Config { config } => {
            let config = effective_config(config.as_deref(), &Overrides::default())?;
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

/// Loads the file (or environment) configuration, applies overrides, and validates.
///
/// # Errors
/// - `VidifyError::Config` - File unreadable, malformed, or values out of range
pub fn effective_config(path: Option<&Path>, overrides: &Overrides) -> Result<VidifyConfig> {
    let mut config = match path {
        Some(path) => VidifyConfig::from_json_file(path)?,
        None => VidifyConfig::from_env(),
    };
    overrides.apply(&mut config);
    config.validate()?;
    Ok(config)
}

/// Run a simulation until the duration elapses or Ctrl-C is pressed
///
/// # Errors
/// - `SimulationError` - Invalid duration, task failure, or too many invariant violations
pub async fn run_simulation(config: VidifyConfig, duration: f64, json: bool) -> anyhow::Result<()> {
    let simulation = FeedSimulation::new(config)?;
    let cancel = CancellationToken::new();

    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Interrupted, stopping simulation");
                cancel.cancel();
            }
        })
    };

    println!(
        "Simulating {} videos for {duration}s (seed {})",
        simulation.feed().len(),
        simulation.seed()
    );

    let result = simulation.run_until(duration, cancel).await;
    interrupt.abort();
    let report = result.context("Simulation failed")?;

    if json {
        println!("{}", report.to_json()?);
    } else {
        println!("{}", report.summary());
    }

    if !report.success() {
        anyhow::bail!(
            "{} invariant violations recorded",
            report.metrics.invariant_violations.len()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;
    use vidify_core::{ConfigError, VidifyError};

    use super::*;

    #[test]
    fn test_overrides_take_precedence_over_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("vidify.json");
        fs::write(
            &path,
            r#"{ "network": { "bandwidth_mbps": 25.0, "max_flows": 4 } }"#,
        )
        .unwrap();

        let overrides = Overrides {
            max_flows: Some(2),
            seed: Some(7),
            ..Default::default()
        };
        let config = effective_config(Some(&path), &overrides).unwrap();

        assert_eq!(config.network.bandwidth_mbps, 25.0);
        assert_eq!(config.network.max_flows, 2);
        assert_eq!(config.simulation.seed, Some(7));
    }

    #[test]
    fn test_invalid_override_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("vidify.json");
        fs::write(&path, "{}").unwrap();

        let overrides = Overrides {
            bandwidth: Some(0.0),
            ..Default::default()
        };
        let error = effective_config(Some(&path), &overrides).unwrap_err();

        assert!(matches!(
            error,
            VidifyError::Config(ConfigError::Invalid {
                field: "network.bandwidth_mbps",
                ..
            })
        ));
        assert!(error.is_user_error());
    }

    #[test]
    fn test_missing_file_is_reported() {
        let dir = TempDir::new().unwrap();
        let error = effective_config(Some(&dir.path().join("absent.json")), &Overrides::default())
            .unwrap_err();
        assert_eq!(error.user_message(), "Could not read configuration file");
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_simulation_succeeds() {
        let mut config = VidifyConfig::for_testing();
        config.simulation.video_count = 3;
        run_simulation(config, 10.0, true).await.unwrap();
    }
}
