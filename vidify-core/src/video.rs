//! Feed items and their per-asset runtime state.
//!
//! A `VideoAsset` pairs immutable characteristics (duration, bitrate, size)
//! with mutable runtime state guarded by the asset's own exclusive lock.
//! Callers never hold the lock themselves: every operation acquires it,
//! does its read-modify-write, and releases it before returning.

use std::fmt;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::config::{MediaConfig, Quality, Resolution};
use crate::interval::{IntervalSet, TimeRange};

/// Floor applied to every bitrate so size and transfer math never divide by zero.
pub const MIN_BITRATE_MBPS: f64 = 0.01;

/// Floor applied to every duration.
pub const MIN_DURATION_SECS: f64 = 0.1;

/// Smallest chunk a fetch step will request.
const MIN_CHUNK_SECS: f64 = 0.01;

/// Clamps a bitrate to a strictly positive minimum.
pub fn clamp_bitrate(bitrate_mbps: f64) -> f64 {
    if bitrate_mbps.is_nan() {
        MIN_BITRATE_MBPS
    } else {
        bitrate_mbps.max(MIN_BITRATE_MBPS)
    }
}

fn clamp_duration(duration_secs: f64) -> f64 {
    if duration_secs.is_nan() {
        MIN_DURATION_SECS
    } else {
        duration_secs.max(MIN_DURATION_SECS)
    }
}

/// Position of a video in its feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VideoId(pub usize);

impl fmt::Display for VideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "video-{}", self.0)
    }
}

/// How a video was encoded, when generated from the media model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Encoding {
    pub quality: Quality,
    pub resolution: Resolution,
    pub frame_rate: f64,
}

/// Immutable characteristics fixed when a video is created.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VideoProfile {
    duration_secs: f64,
    bitrate_mbps: f64,
    encoding: Option<Encoding>,
}

impl VideoProfile {
    /// Creates a profile with an explicit bitrate.
    ///
    /// Duration and bitrate are clamped to positive minimums.
    pub fn new(duration_secs: f64, bitrate_mbps: f64) -> Self {
        Self {
            duration_secs: clamp_duration(duration_secs),
            bitrate_mbps: clamp_bitrate(bitrate_mbps),
            encoding: None,
        }
    }

    /// Creates a profile whose bitrate is derived from the media model.
    pub fn encoded(
        duration_secs: f64,
        quality: Quality,
        frame_rate: f64,
        media: &MediaConfig,
    ) -> Self {
        let resolution = quality.resolution();
        Self {
            encoding: Some(Encoding {
                quality,
                resolution,
                frame_rate,
            }),
            ..Self::new(duration_secs, media.bitrate_for(resolution, frame_rate))
        }
    }

    pub fn duration_secs(&self) -> f64 {
        self.duration_secs
    }

    pub fn bitrate_mbps(&self) -> f64 {
        self.bitrate_mbps
    }

    pub fn encoding(&self) -> Option<&Encoding> {
        self.encoding.as_ref()
    }

    /// Total size in megabytes.
    pub fn size_mb(&self) -> f64 {
        self.duration_secs * self.bitrate_mbps / 8.0
    }

    /// Megabits needed to transfer `secs` seconds of this video.
    pub fn megabits_for(&self, secs: f64) -> f64 {
        secs.max(0.0) * self.bitrate_mbps
    }
}

/// Result of one playback step on the visible video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlaybackState {
    /// Position advanced through loaded data
    Playing,
    /// Position sits on unloaded data; playback is stalled
    Buffering,
    /// Position reached the end of the video
    Finished,
    /// User is flicking through the feed; playback suppressed
    Scrolling,
}

#[derive(Debug, Default)]
struct VideoState {
    loaded: IntervalSet,
    watched: IntervalSet,
    position: f64,
    loading: bool,
    playing: bool,
    stalled_secs: f64,
    /// Bumped whenever the position jumps (reset or seek)
    generation: u64,
}

/// One feed item.
#[derive(Debug)]
pub struct VideoAsset {
    id: VideoId,
    profile: VideoProfile,
    state: Mutex<VideoState>,
}

impl VideoAsset {
    pub fn new(id: VideoId, profile: VideoProfile) -> Self {
        Self {
            id,
            profile,
            state: Mutex::new(VideoState::default()),
        }
    }

    pub fn id(&self) -> VideoId {
        self.id
    }

    pub fn profile(&self) -> &VideoProfile {
        &self.profile
    }

    pub fn duration_secs(&self) -> f64 {
        self.profile.duration_secs
    }

    /// Marks the asset as loading.
    ///
    /// Returns false without changing anything if a load is already active
    /// or the video is fully loaded. The check and the set happen under one
    /// lock acquisition, so two callers can never both succeed.
    pub fn try_begin_loading(&self) -> bool {
        let mut state = self.state.lock();
        if state.loading || state.loaded.is_full(self.profile.duration_secs) {
            return false;
        }
        state.loading = true;
        true
    }

    /// Clears the loading flag.
    pub fn finish_loading(&self) {
        self.state.lock().loading = false;
    }

    pub fn is_loading(&self) -> bool {
        self.state.lock().loading
    }

    pub fn is_fully_loaded(&self) -> bool {
        self.state.lock().loaded.is_full(self.profile.duration_secs)
    }

    /// Next chunk to fetch when resuming from `cursor`.
    ///
    /// Starts at the first unloaded second at or after `cursor`, wrapping to
    /// zero when the tail is already loaded. The chunk is at most `chunk_secs`
    /// long and stops at the duration or at the next loaded range. Returns
    /// `None` once the video is fully loaded.
    pub fn next_chunk(&self, cursor: f64, chunk_secs: f64) -> Option<TimeRange> {
        let duration = self.profile.duration_secs;
        let state = self.state.lock();
        if state.loaded.is_full(duration) {
            return None;
        }

        let cursor = if cursor.is_finite() {
            cursor.clamp(0.0, duration)
        } else {
            0.0
        };

        let mut start = state.loaded.first_uncovered_from(cursor);
        if start >= duration {
            start = state.loaded.first_uncovered_from(0.0);
        }
        if start >= duration {
            return None;
        }

        let mut end = (start + chunk_secs.max(MIN_CHUNK_SECS)).min(duration);
        if let Some(next_loaded) = state.loaded.next_start_after(start) {
            end = end.min(next_loaded);
        }

        Some(TimeRange { start, end })
    }

    /// Merges a completed chunk into the loaded ranges, clipped to the duration.
    pub fn record_loaded(&self, start: f64, end: f64) {
        let mut state = self.state.lock();
        state
            .loaded
            .add(start.max(0.0), end.min(self.profile.duration_secs));
    }

    /// Advances playback by `dt` seconds if the current position is loaded.
    ///
    /// The advance stops at the duration and at the end of the loaded range
    /// under the position, so watched seconds are always loaded seconds. On
    /// unloaded data the position holds and the stall is accumulated.
    pub fn advance_playback(&self, dt: f64) -> PlaybackState {
        let duration = self.profile.duration_secs;
        let mut state = self.state.lock();

        if state.position >= duration {
            state.playing = false;
            return PlaybackState::Finished;
        }

        match state.loaded.range_containing(state.position) {
            Some(range) => {
                let start = state.position;
                let end = (start + dt.max(0.0)).min(duration).min(range.end);
                state.watched.add(start, end);
                state.position = end;
                state.playing = true;
                PlaybackState::Playing
            }
            None => {
                state.playing = false;
                state.stalled_secs += dt.max(0.0);
                PlaybackState::Buffering
            }
        }
    }

    /// Marks the video as not playing without touching its position.
    pub fn pause(&self) {
        self.state.lock().playing = false;
    }

    /// Clears watch history and rewinds to zero; loaded data is kept.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.watched.clear();
        state.position = 0.0;
        state.playing = false;
        state.generation += 1;
    }

    /// Moves the playback position, clamped to `[0, duration]`.
    pub fn seek(&self, position: f64) {
        let target = if position.is_nan() { 0.0 } else { position };
        let mut state = self.state.lock();
        state.position = target.clamp(0.0, self.profile.duration_secs);
        state.generation += 1;
    }

    pub fn position(&self) -> f64 {
        self.state.lock().position
    }

    /// Number of resets and seeks applied so far.
    pub fn generation(&self) -> u64 {
        self.state.lock().generation
    }

    /// True if the video has any watch history or a non-zero position.
    pub fn has_history(&self) -> bool {
        let state = self.state.lock();
        state.position > 0.0 || !state.watched.is_empty()
    }

    /// Copies the current state for read-only consumers.
    pub fn snapshot(&self) -> VideoSnapshot {
        let state = self.state.lock();
        VideoSnapshot {
            id: self.id,
            duration_secs: self.profile.duration_secs,
            bitrate_mbps: self.profile.bitrate_mbps,
            size_mb: self.profile.size_mb(),
            loaded: state.loaded.clone(),
            watched: state.watched.clone(),
            position: state.position,
            playing: state.playing,
            loading: state.loading,
            stalled_secs: state.stalled_secs,
            generation: state.generation,
        }
    }
}

/// Point-in-time copy of one video's state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoSnapshot {
    pub id: VideoId,
    pub duration_secs: f64,
    pub bitrate_mbps: f64,
    pub size_mb: f64,
    pub loaded: IntervalSet,
    pub watched: IntervalSet,
    pub position: f64,
    pub playing: bool,
    pub loading: bool,
    pub stalled_secs: f64,
    pub generation: u64,
}

impl VideoSnapshot {
    /// Playback is stuck on unloaded data before the end of the video.
    pub fn is_buffering(&self) -> bool {
        self.position < self.duration_secs && !self.loaded.covers(self.position)
    }

    pub fn is_fully_loaded(&self) -> bool {
        self.loaded.is_full(self.duration_secs)
    }

    /// Megabytes loaded so far.
    pub fn loaded_mb(&self) -> f64 {
        self.loaded.covered_length() * self.bitrate_mbps / 8.0
    }

    pub fn loaded_fraction(&self) -> f64 {
        (self.loaded.covered_length() / self.duration_secs).min(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn asset(duration: f64, bitrate: f64) -> VideoAsset {
        VideoAsset::new(VideoId(0), VideoProfile::new(duration, bitrate))
    }

    #[test]
    fn test_profile_size_and_clamping() {
        let profile = VideoProfile::new(20.0, 2.0);
        assert_eq!(profile.size_mb(), 5.0);
        assert_eq!(profile.megabits_for(4.0), 8.0);

        let degenerate = VideoProfile::new(0.0, 0.0);
        assert_eq!(degenerate.duration_secs(), MIN_DURATION_SECS);
        assert_eq!(degenerate.bitrate_mbps(), MIN_BITRATE_MBPS);
        assert!(degenerate.size_mb() > 0.0);

        let nan = VideoProfile::new(f64::NAN, f64::NAN);
        assert!(nan.size_mb() > 0.0);
    }

    #[test]
    fn test_encoded_profile_uses_media_model() {
        let media = MediaConfig::default();
        let profile = VideoProfile::encoded(30.0, Quality::Medium, 30.0, &media);

        let encoding = profile.encoding().unwrap();
        assert_eq!(encoding.resolution, Resolution::new(1280, 720));
        assert_eq!(
            profile.bitrate_mbps(),
            media.bitrate_for(encoding.resolution, 30.0)
        );
    }

    #[test]
    fn test_loading_flag_is_exclusive() {
        let video = asset(20.0, 2.0);

        assert!(video.try_begin_loading());
        assert!(!video.try_begin_loading());
        assert!(video.is_loading());

        video.finish_loading();
        assert!(video.try_begin_loading());
    }

    #[test]
    fn test_fully_loaded_video_never_starts_loading() {
        let video = asset(20.0, 2.0);
        video.record_loaded(0.0, 20.0);

        assert!(video.is_fully_loaded());
        assert!(!video.try_begin_loading());
        assert_eq!(video.next_chunk(0.0, 4.0), None);
    }

    #[test]
    fn test_next_chunk_resumes_and_wraps() {
        let video = asset(20.0, 2.0);

        let first = video.next_chunk(0.0, 4.0).unwrap();
        assert_eq!((first.start, first.end), (0.0, 4.0));

        // Resume from a live position mid-video
        video.record_loaded(10.0, 18.0);
        let mid = video.next_chunk(12.0, 4.0).unwrap();
        assert_eq!((mid.start, mid.end), (18.0, 20.0));

        // Tail loaded: wrap to the first gap from zero, stopping at loaded data
        video.record_loaded(18.0, 20.0);
        let wrapped = video.next_chunk(19.0, 4.0).unwrap();
        assert_eq!((wrapped.start, wrapped.end), (0.0, 4.0));

        video.record_loaded(0.0, 8.0);
        let gap = video.next_chunk(0.0, 4.0).unwrap();
        assert_eq!((gap.start, gap.end), (8.0, 10.0));
    }

    #[test]
    fn test_record_loaded_is_clipped_to_duration() {
        let video = asset(10.0, 1.0);
        video.record_loaded(-5.0, 50.0);

        let snapshot = video.snapshot();
        assert!(snapshot.loaded.is_within(0.0, 10.0));
        assert!(snapshot.is_fully_loaded());
    }

    #[test]
    fn test_playback_advances_through_loaded_data() {
        let video = asset(20.0, 2.0);
        video.record_loaded(0.0, 20.0);

        assert_eq!(video.advance_playback(1.0), PlaybackState::Playing);
        assert_eq!(video.advance_playback(1.0), PlaybackState::Playing);

        let snapshot = video.snapshot();
        assert_eq!(snapshot.position, 2.0);
        assert!(snapshot.playing);
        assert_eq!(snapshot.watched.ranges().len(), 1);
        assert_eq!(snapshot.watched.covered_length(), 2.0);
    }

    #[test]
    fn test_playback_stalls_at_loaded_edge() {
        let video = asset(20.0, 2.0);
        video.record_loaded(0.0, 1.5);

        assert_eq!(video.advance_playback(1.0), PlaybackState::Playing);
        assert_eq!(video.advance_playback(1.0), PlaybackState::Playing);
        assert_eq!(video.position(), 1.5);

        assert_eq!(video.advance_playback(1.0), PlaybackState::Buffering);
        assert_eq!(video.advance_playback(1.0), PlaybackState::Buffering);

        let snapshot = video.snapshot();
        assert_eq!(snapshot.position, 1.5);
        assert!(!snapshot.playing);
        assert!(snapshot.is_buffering());
        assert_eq!(snapshot.stalled_secs, 2.0);

        // Data arrives, playback resumes from the same spot
        video.record_loaded(1.5, 4.0);
        assert_eq!(video.advance_playback(1.0), PlaybackState::Playing);
        assert_eq!(video.position(), 2.5);
    }

    #[test]
    fn test_playback_finishes_at_duration() {
        let video = asset(1.0, 1.0);
        video.record_loaded(0.0, 1.0);

        assert_eq!(video.advance_playback(5.0), PlaybackState::Playing);
        assert_eq!(video.position(), 1.0);
        assert_eq!(video.advance_playback(1.0), PlaybackState::Finished);
        assert!(!video.snapshot().playing);
        assert!(!video.snapshot().is_buffering());
    }

    #[test]
    fn test_reset_keeps_loaded_data() {
        let video = asset(20.0, 2.0);
        video.record_loaded(0.0, 8.0);
        video.advance_playback(3.0);
        assert!(video.has_history());

        video.reset();

        let snapshot = video.snapshot();
        assert_eq!(snapshot.position, 0.0);
        assert!(snapshot.watched.is_empty());
        assert_eq!(snapshot.loaded.covered_length(), 8.0);
        assert_eq!(snapshot.generation, 1);
        assert!(!video.has_history());
    }

    #[test]
    fn test_seek_is_clamped() {
        let video = asset(20.0, 2.0);

        video.seek(50.0);
        assert_eq!(video.position(), 20.0);

        video.seek(-1.0);
        assert_eq!(video.position(), 0.0);
        assert_eq!(video.snapshot().generation, 2);
    }
}
