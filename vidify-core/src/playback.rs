//! Playback of the visible video.
//!
//! The driver advances exactly one video per step: the one under the
//! viewport centre. It pauses the previously visible video when the user
//! moves on, and replays a video from zero when it comes back into view.
//! A video seen for the first time, or seeked since it left view, keeps its
//! position so the seek is honoured.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::clock::SimClock;
use crate::config::PlaybackConfig;
use crate::feed::{Feed, Viewport};
use crate::video::{PlaybackState, VideoId};

/// Counts of playback steps by outcome.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackStats {
    pub steps: u64,
    pub playing: u64,
    pub buffering: u64,
    pub finished: u64,
    pub scrolling: u64,
    /// Videos restarted from zero on re-entering view
    pub replays: u64,
}

pub struct PlaybackDriver {
    feed: Arc<Feed>,
    scroll_speed_threshold: f64,
    replay_on_reentry: bool,
    current: Option<usize>,
    /// Generation each video had when it last left view
    left_at: Vec<Option<u64>>,
    stats: PlaybackStats,
}

impl PlaybackDriver {
    pub fn new(feed: Arc<Feed>, config: &PlaybackConfig) -> Self {
        Self {
            scroll_speed_threshold: config.scroll_speed_threshold,
            replay_on_reentry: config.replay_on_reentry,
            current: None,
            left_at: vec![None; feed.len()],
            feed,
            stats: PlaybackStats::default(),
        }
    }

    /// Advances the visible video by `dt` simulated seconds.
    ///
    /// Returns the video stepped and its resulting state, or `None` for an
    /// empty feed. While the viewport moves faster than the threshold the
    /// video is paused and nothing is recorded as watched.
    pub fn step(&mut self, viewport: &Viewport, dt: f64) -> Option<(VideoId, PlaybackState)> {
        let index = self.feed.visible_index(viewport)?;
        let video = Arc::clone(self.feed.video(index)?);

        if self.current != Some(index) {
            if let Some(previous) = self.current {
                if let Some(left) = self.feed.video(previous) {
                    left.pause();
                    self.left_at[previous] = Some(left.generation());
                }
            }
            let untouched = self.left_at[index] == Some(video.generation());
            if self.replay_on_reentry && untouched && video.has_history() {
                video.reset();
                self.stats.replays += 1;
                debug!(video = %video.id(), "Replaying from start on re-entry");
            }
            debug!(from = ?self.current, to = index, "Visible video changed");
            self.current = Some(index);
        }

        let state = if viewport.speed > self.scroll_speed_threshold {
            video.pause();
            PlaybackState::Scrolling
        } else {
            video.advance_playback(dt)
        };

        self.stats.steps += 1;
        match state {
            PlaybackState::Playing => self.stats.playing += 1,
            PlaybackState::Buffering => self.stats.buffering += 1,
            PlaybackState::Finished => self.stats.finished += 1,
            PlaybackState::Scrolling => self.stats.scrolling += 1,
        }
        trace!(video = %video.id(), ?state, "Playback step");

        Some((video.id(), state))
    }

    /// Index of the video currently treated as visible.
    pub fn current(&self) -> Option<usize> {
        self.current
    }

    pub fn stats(&self) -> PlaybackStats {
        self.stats
    }

    /// Steps every `tick_secs` simulated seconds until cancelled.
    pub async fn run(
        mut self,
        viewport: watch::Receiver<Viewport>,
        clock: SimClock,
        tick_secs: f64,
        cancel: CancellationToken,
    ) -> PlaybackStats {
        let mut ticker = clock.interval(tick_secs);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let current = *viewport.borrow();
                    self.step(&current, tick_secs);
                }
            }
        }

        if let Some(video) = self.current.and_then(|i| self.feed.video(i)) {
            video.pause();
        }
        debug!(stats = ?self.stats, "Playback driver stopped");
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::VideoProfile;

    fn setup(count: usize) -> (PlaybackDriver, Arc<Feed>) {
        let feed = Arc::new(Feed::from_profiles(
            (0..count).map(|_| VideoProfile::new(20.0, 2.0)),
            1080.0,
        ));
        let driver = PlaybackDriver::new(Arc::clone(&feed), &PlaybackConfig::default());
        (driver, feed)
    }

    #[test]
    fn test_plays_loaded_visible_video() {
        let (mut driver, feed) = setup(2);
        feed.videos()[0].record_loaded(0.0, 20.0);
        let viewport = Viewport::at(0.0, 1080.0);

        for _ in 0..10 {
            assert_eq!(
                driver.step(&viewport, 0.1),
                Some((VideoId(0), PlaybackState::Playing))
            );
        }

        let snapshot = feed.videos()[0].snapshot();
        assert!((snapshot.position - 1.0).abs() < 1e-9);
        assert!(snapshot.playing);
        assert_eq!(feed.videos()[1].position(), 0.0);
    }

    #[test]
    fn test_fast_scroll_suppresses_playback() {
        let (mut driver, feed) = setup(2);
        feed.videos()[0].record_loaded(0.0, 20.0);
        let flicking = Viewport::at(0.0, 1080.0).with_speed(2000.0);

        for _ in 0..20 {
            assert_eq!(
                driver.step(&flicking, 0.1).map(|(_, state)| state),
                Some(PlaybackState::Scrolling)
            );
        }

        let snapshot = feed.videos()[0].snapshot();
        assert!(snapshot.watched.is_empty());
        assert_eq!(snapshot.position, 0.0);
        assert!(!snapshot.playing);
    }

    #[test]
    fn test_unloaded_position_buffers() {
        let (mut driver, feed) = setup(1);
        let viewport = Viewport::at(0.0, 1080.0);

        assert_eq!(
            driver.step(&viewport, 0.1).map(|(_, state)| state),
            Some(PlaybackState::Buffering)
        );
        assert_eq!(feed.videos()[0].position(), 0.0);
        assert_eq!(driver.stats().buffering, 1);
    }

    #[test]
    fn test_leaving_pauses_and_returning_replays() {
        let (mut driver, feed) = setup(2);
        for video in feed.videos() {
            video.record_loaded(0.0, 20.0);
        }
        let first = Viewport::at(0.0, 1080.0);
        let second = Viewport::at(1080.0, 1080.0);

        driver.step(&first, 1.0);
        driver.step(&first, 1.0);
        assert_eq!(feed.videos()[0].position(), 2.0);

        driver.step(&second, 1.0);
        let left = feed.videos()[0].snapshot();
        assert!(!left.playing);
        assert_eq!(left.position, 2.0);

        driver.step(&first, 0.5);
        let replayed = feed.videos()[0].snapshot();
        assert_eq!(replayed.position, 0.5);
        assert_eq!(replayed.watched.covered_length(), 0.5);
        assert_eq!(replayed.loaded.covered_length(), 20.0);
        assert_eq!(driver.stats().replays, 1);
    }

    #[test]
    fn test_first_entry_keeps_an_earlier_seek() {
        let (mut driver, feed) = setup(2);
        for video in feed.videos() {
            video.record_loaded(0.0, 20.0);
        }

        driver.step(&Viewport::at(0.0, 1080.0), 1.0);
        // Seek lands while the next video scrolls in, before the driver sees it
        feed.videos()[1].seek(12.0);
        driver.step(&Viewport::at(1080.0, 1080.0), 0.5);

        let seeked = feed.videos()[1].snapshot();
        assert_eq!(seeked.position, 12.5);
        assert!(seeked.watched.contains_range(12.0, 12.5));
        assert_eq!(driver.stats().replays, 0);
    }

    #[test]
    fn test_seek_while_away_survives_reentry() {
        let (mut driver, feed) = setup(2);
        for video in feed.videos() {
            video.record_loaded(0.0, 20.0);
        }
        let first = Viewport::at(0.0, 1080.0);

        driver.step(&first, 2.0);
        driver.step(&Viewport::at(1080.0, 1080.0), 1.0);
        feed.videos()[0].seek(8.0);
        driver.step(&first, 1.0);

        assert_eq!(feed.videos()[0].position(), 9.0);
        assert_eq!(driver.stats().replays, 0);
    }

    #[test]
    fn test_replay_can_be_disabled() {
        let feed = Arc::new(Feed::from_profiles(
            (0..2).map(|_| VideoProfile::new(20.0, 2.0)),
            1080.0,
        ));
        let config = PlaybackConfig {
            replay_on_reentry: false,
            ..PlaybackConfig::default()
        };
        let mut driver = PlaybackDriver::new(Arc::clone(&feed), &config);
        feed.videos()[0].record_loaded(0.0, 20.0);

        driver.step(&Viewport::at(0.0, 1080.0), 3.0);
        driver.step(&Viewport::at(1080.0, 1080.0), 1.0);
        driver.step(&Viewport::at(0.0, 1080.0), 1.0);

        assert_eq!(feed.videos()[0].position(), 4.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_advances_with_simulated_time() {
        let (driver, feed) = setup(1);
        feed.videos()[0].record_loaded(0.0, 20.0);
        let (_tx, rx) = watch::channel(Viewport::at(0.0, 1080.0));
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(driver.run(rx, SimClock::default(), 0.5, cancel.clone()));
        tokio::time::sleep(std::time::Duration::from_millis(2_250)).await;
        cancel.cancel();
        let stats = handle.await.unwrap();

        // Ticks at 0.0, 0.5, 1.0, 1.5 and 2.0
        assert_eq!(stats.playing, 5);
        assert!((feed.videos()[0].position() - 2.5).abs() < 1e-9);
        assert!(!feed.videos()[0].snapshot().playing);
    }
}
