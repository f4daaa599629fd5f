//! Ordered video collection and its vertical layout.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::video::{VideoAsset, VideoId, VideoProfile, VideoSnapshot};

/// Smallest layout height a video may occupy.
const MIN_VIDEO_HEIGHT: f64 = 1.0;

/// What the user currently sees of the feed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    /// Distance from the top of the feed to the top of the viewport
    pub scroll_y: f64,
    pub height: f64,
    /// Absolute scroll speed in layout units per second
    pub speed: f64,
}

impl Viewport {
    pub fn new(height: f64) -> Self {
        Self {
            scroll_y: 0.0,
            height,
            speed: 0.0,
        }
    }

    pub fn at(scroll_y: f64, height: f64) -> Self {
        Self {
            scroll_y,
            height,
            speed: 0.0,
        }
    }

    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = speed.abs();
        self
    }

    pub fn top(&self) -> f64 {
        self.scroll_y
    }

    pub fn bottom(&self) -> f64 {
        self.scroll_y + self.height
    }

    pub fn center(&self) -> f64 {
        self.scroll_y + self.height / 2.0
    }
}

/// Vertical extent `[top, bottom)` of one video in the feed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LayoutSpan {
    pub top: f64,
    pub bottom: f64,
}

impl LayoutSpan {
    pub fn center(&self) -> f64 {
        (self.top + self.bottom) / 2.0
    }

    /// True if the span overlaps `[lower, upper)`.
    pub fn intersects(&self, lower: f64, upper: f64) -> bool {
        self.top < upper && lower < self.bottom
    }

    /// Distance from `point` to the nearest edge, zero when inside.
    pub fn distance_to(&self, point: f64) -> f64 {
        if point < self.top {
            self.top - point
        } else if point >= self.bottom {
            point - self.bottom
        } else {
            0.0
        }
    }
}

/// The feed: videos stacked top to bottom.
///
/// Append-only during setup, read-only afterwards. Assets are shared as
/// `Arc<VideoAsset>` so load tasks and the playback driver can hold them
/// without borrowing the feed.
#[derive(Debug, Default)]
pub struct Feed {
    videos: Vec<Arc<VideoAsset>>,
    spans: Vec<LayoutSpan>,
    total_height: f64,
}

impl Feed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a feed where every video has the same layout height.
    pub fn from_profiles(profiles: impl IntoIterator<Item = VideoProfile>, height: f64) -> Self {
        let mut feed = Self::new();
        for profile in profiles {
            feed.push(profile, height);
        }
        feed
    }

    /// Appends a video below the current last one.
    pub fn push(&mut self, profile: VideoProfile, height: f64) -> VideoId {
        let id = VideoId(self.videos.len());
        let height = if height.is_nan() {
            MIN_VIDEO_HEIGHT
        } else {
            height.max(MIN_VIDEO_HEIGHT)
        };

        let top = self.total_height;
        self.spans.push(LayoutSpan {
            top,
            bottom: top + height,
        });
        self.total_height = top + height;
        self.videos.push(Arc::new(VideoAsset::new(id, profile)));
        id
    }

    pub fn len(&self) -> usize {
        self.videos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.videos.is_empty()
    }

    pub fn videos(&self) -> &[Arc<VideoAsset>] {
        &self.videos
    }

    pub fn video(&self, index: usize) -> Option<&Arc<VideoAsset>> {
        self.videos.get(index)
    }

    pub fn span(&self, index: usize) -> Option<LayoutSpan> {
        self.spans.get(index).copied()
    }

    pub fn total_height(&self) -> f64 {
        self.total_height
    }

    /// Largest scroll offset that keeps the viewport inside the feed.
    pub fn max_scroll(&self, viewport_height: f64) -> f64 {
        (self.total_height - viewport_height).max(0.0)
    }

    /// Index of the video whose span contains the viewport centre.
    ///
    /// Positions above the feed map to the first video and positions below
    /// it to the last. Returns `None` only for an empty feed.
    pub fn visible_index(&self, viewport: &Viewport) -> Option<usize> {
        if self.videos.is_empty() {
            return None;
        }
        let center = viewport.center();
        let after = self.spans.partition_point(|span| span.top <= center);
        Some(after.saturating_sub(1).min(self.videos.len() - 1))
    }

    /// Copies every video's state, one lock at a time.
    pub fn snapshot(&self) -> Vec<VideoSnapshot> {
        self.videos.iter().map(|video| video.snapshot()).collect()
    }
}
