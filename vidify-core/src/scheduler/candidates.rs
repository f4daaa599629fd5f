//! Preload candidate selection and ordering.

use serde::{Deserialize, Serialize};

use crate::feed::{Feed, Viewport};
use crate::video::VideoId;

/// Region of the feed eligible for proactive loading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PreloadWindow {
    pub lower: f64,
    pub upper: f64,
}

impl PreloadWindow {
    /// Viewport padded by `factor * height` above and below.
    pub fn around(viewport: &Viewport, factor: f64) -> Self {
        let padding = viewport.height * factor.max(0.0);
        Self {
            lower: viewport.top() - padding,
            upper: viewport.bottom() + padding,
        }
    }
}

/// A video that should be loading, with its priority inputs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PreloadCandidate {
    pub index: usize,
    pub id: VideoId,
    /// The video under the viewport centre
    pub is_current: bool,
    /// Layout distance from the viewport centre to the video's nearest edge
    pub distance: f64,
}

/// Videos inside the preload window that still have data to fetch, best first.
///
/// The visible video always ranks first; the rest follow by ascending
/// distance. The sort is stable, so equal distances keep feed order. Each
/// asset lock is taken on its own while checking for completion.
pub fn rank_candidates(feed: &Feed, viewport: &Viewport, factor: f64) -> Vec<PreloadCandidate> {
    let window = PreloadWindow::around(viewport, factor);
    let current = feed.visible_index(viewport);
    let center = viewport.center();

    let mut candidates: Vec<PreloadCandidate> = feed
        .videos()
        .iter()
        .enumerate()
        .filter_map(|(index, video)| {
            let span = feed.span(index)?;
            if !span.intersects(window.lower, window.upper) || video.is_fully_loaded() {
                return None;
            }
            Some(PreloadCandidate {
                index,
                id: video.id(),
                is_current: current == Some(index),
                distance: span.distance_to(center),
            })
        })
        .collect();

    candidates.sort_by(|a, b| {
        b.is_current
            .cmp(&a.is_current)
            .then(a.distance.total_cmp(&b.distance))
    });
    candidates
}
