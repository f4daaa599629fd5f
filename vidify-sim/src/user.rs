//! Simulated user producing a viewport trajectory.
//!
//! The user repeatedly picks one of three actions uniformly at random:
//! scroll in a random direction for a while, jump several screens at once,
//! or stop and watch. Any other source of viewport updates can replace it
//! without the engine noticing.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};
use vidify_core::config::UserConfig;
use vidify_core::{Feed, SimClock, Viewport};

use crate::rng::DeterministicRng;

/// What the user is doing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum UserAction {
    /// Moving through the feed at a fixed speed
    Scroll {
        /// Layout units per second
        speed: f64,
    },
    /// Instantaneous displacement by whole viewport heights
    Jump {
        /// Viewport heights moved
        screens: u32,
    },
    /// Holding still on the current video
    Stop,
}

/// Result of advancing the user by one step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UserStep {
    /// Viewport after the step
    pub viewport: Viewport,
    /// Action performed during the step
    pub action: UserAction,
    /// Seek target inside the visible video as a fraction of its duration
    pub seek: Option<f64>,
}

/// Counts of actions taken over a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserStats {
    /// Steps taken
    pub steps: u64,
    /// Scroll actions started
    pub scrolls: u64,
    /// Jumps performed
    pub jumps: u64,
    /// Stops started
    pub stops: u64,
    /// Seeks requested
    pub seeks: u64,
}

/// Random scroll/jump/stop state machine.
pub struct UserSimulator {
    config: UserConfig,
    rng: DeterministicRng,
    viewport: Viewport,
    max_scroll: f64,
    /// +1 scrolls down the feed, -1 scrolls up
    direction: f64,
    action: UserAction,
    remaining_secs: f64,
    stats: UserStats,
}

impl UserSimulator {
    /// Creates a user at the top of a feed.
    ///
    /// `max_scroll` is the largest reachable scroll offset.
    pub fn new(
        config: &UserConfig,
        viewport_height: f64,
        max_scroll: f64,
        rng: DeterministicRng,
    ) -> Self {
        Self {
            config: config.clone(),
            rng,
            viewport: Viewport::new(viewport_height),
            max_scroll: max_scroll.max(0.0),
            direction: 1.0,
            action: UserAction::Stop,
            remaining_secs: 0.0,
            stats: UserStats::default(),
        }
    }

    /// Current viewport.
    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    /// Action in progress.
    pub fn action(&self) -> UserAction {
        self.action
    }

    /// Action counters so far.
    pub fn stats(&self) -> UserStats {
        self.stats
    }

    /// Advances the user by `dt` seconds.
    pub fn step(&mut self, dt: f64) -> UserStep {
        let mut seek = None;
        if self.remaining_secs <= 0.0 {
            seek = self.choose_next_action();
        }

        match self.action {
            UserAction::Scroll { speed } => {
                self.move_by(self.direction * speed * dt);
                self.viewport.speed = speed;
            }
            UserAction::Jump { screens } => {
                self.move_by(self.direction * f64::from(screens) * self.viewport.height);
                self.viewport.speed = 0.0;
            }
            UserAction::Stop => {
                self.viewport.speed = 0.0;
            }
        }

        self.remaining_secs -= dt;
        self.stats.steps += 1;

        UserStep {
            viewport: self.viewport,
            action: self.action,
            seek,
        }
    }

    /// Picks the next action; returns a seek fraction when a stop starts with one.
    fn choose_next_action(&mut self) -> Option<f64> {
        let config = &self.config;
        let mut seek = None;

        match self.rng.random_inclusive(0, 2) {
            0 => {
                self.direction = if self.rng.random_bool(0.5) { 1.0 } else { -1.0 };
                let speed = self
                    .rng
                    .random_range_f64(config.min_scroll_speed, config.max_scroll_speed);
                self.action = UserAction::Scroll { speed };
                self.remaining_secs = self
                    .rng
                    .random_range_f64(config.min_scroll_secs, config.max_scroll_secs);
                self.stats.scrolls += 1;
            }
            1 => {
                let screens = self
                    .rng
                    .random_inclusive(config.min_jump_screens, config.max_jump_screens);
                self.action = UserAction::Jump { screens };
                self.remaining_secs = 0.0;
                self.stats.jumps += 1;
            }
            _ => {
                self.action = UserAction::Stop;
                self.remaining_secs = self
                    .rng
                    .random_range_f64(config.min_dwell_secs, config.max_dwell_secs);
                if self.rng.random_bool(config.seek_probability) {
                    seek = Some(self.rng.random_f64());
                    self.stats.seeks += 1;
                }
                self.stats.stops += 1;
            }
        }

        trace!(action = ?self.action, remaining = self.remaining_secs, "User action");
        seek
    }

    /// Moves the viewport, turning around at either end of the feed.
    fn move_by(&mut self, distance: f64) {
        let target = self.viewport.scroll_y + distance;
        if target <= 0.0 {
            self.viewport.scroll_y = 0.0;
            self.direction = 1.0;
        } else if target >= self.max_scroll {
            self.viewport.scroll_y = self.max_scroll;
            self.direction = -1.0;
        } else {
            self.viewport.scroll_y = target;
        }
    }

    /// Publishes a new viewport every `config.tick_secs` until cancelled.
    ///
    /// Seeks are applied to the video under the viewport centre.
    pub async fn run(
        mut self,
        feed: Arc<Feed>,
        viewport_tx: watch::Sender<Viewport>,
        clock: SimClock,
        cancel: CancellationToken,
    ) -> UserStats {
        let tick_secs = self.config.tick_secs;
        let mut ticker = clock.interval(tick_secs);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let step = self.step(tick_secs);
                    if let Some(fraction) = step.seek {
                        let visible = feed
                            .visible_index(&step.viewport)
                            .and_then(|index| feed.video(index));
                        if let Some(video) = visible {
                            let target = fraction * video.duration_secs();
                            debug!(video = %video.id(), target, "User seek");
                            video.seek(target);
                        }
                    }
                    viewport_tx.send_replace(step.viewport);
                }
            }
        }

        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(seed: u64, max_scroll: f64) -> UserSimulator {
        UserSimulator::new(
            &UserConfig::default(),
            1080.0,
            max_scroll,
            DeterministicRng::from_seed(seed),
        )
    }

    #[test]
    fn test_viewport_stays_inside_the_feed() {
        let mut user = user(17, 20_000.0);

        for _ in 0..20_000 {
            let step = user.step(0.05);
            assert!(step.viewport.scroll_y >= 0.0);
            assert!(step.viewport.scroll_y <= 20_000.0);
            assert_eq!(step.viewport.height, 1080.0);
        }
    }

    #[test]
    fn test_every_action_occurs() {
        let mut user = user(23, 50_000.0);
        for _ in 0..20_000 {
            user.step(0.05);
        }

        let stats = user.stats();
        assert!(stats.scrolls > 0);
        assert!(stats.jumps > 0);
        assert!(stats.stops > 0);
        assert_eq!(stats.steps, 20_000);
    }

    #[test]
    fn test_speed_matches_action() {
        let mut user = user(31, 50_000.0);

        for _ in 0..5_000 {
            let step = user.step(0.05);
            match step.action {
                UserAction::Scroll { speed } => {
                    assert_eq!(step.viewport.speed, speed);
                    assert!((200.0..=3000.0).contains(&speed));
                }
                UserAction::Jump { screens } => {
                    assert!((1..=5).contains(&screens));
                    assert_eq!(step.viewport.speed, 0.0);
                }
                UserAction::Stop => assert_eq!(step.viewport.speed, 0.0),
            }
        }
    }

    #[test]
    fn test_same_seed_same_trajectory() {
        let mut first = user(5, 10_000.0);
        let mut second = user(5, 10_000.0);

        for _ in 0..1_000 {
            assert_eq!(first.step(0.05), second.step(0.05));
        }
    }

    #[test]
    fn test_zero_length_feed_pins_viewport() {
        let mut user = user(8, 0.0);
        for _ in 0..500 {
            assert_eq!(user.step(0.1).viewport.scroll_y, 0.0);
        }
    }
}
