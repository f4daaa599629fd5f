//! Random feed generation from the media model.

use vidify_core::config::{LayoutConfig, MediaConfig, Quality};
use vidify_core::{Feed, VideoProfile};

use crate::rng::DeterministicRng;

/// Frame rate used when the configured list is empty.
const FALLBACK_FRAME_RATE: f64 = 30.0;

/// Draws one video profile.
///
/// Duration is normally distributed and clamped to the configured bounds;
/// quality is uniform over the rungs up to the maximum quality; frame rate
/// is uniform over the configured choices.
pub fn generate_profile(media: &MediaConfig, rng: &mut DeterministicRng) -> VideoProfile {
    let duration = rng
        .gaussian(media.mean_duration_secs, media.duration_stddev_secs)
        .max(media.min_duration_secs)
        .min(media.max_duration_secs);
    let quality = rng
        .choose(Quality::up_to(media.max_quality))
        .copied()
        .unwrap_or(Quality::Low);
    let frame_rate = rng
        .choose(&media.frame_rates)
        .copied()
        .unwrap_or(FALLBACK_FRAME_RATE);

    VideoProfile::encoded(duration, quality, frame_rate, media)
}

/// Builds a feed of `count` generated videos, each `layout.video_height` tall.
pub fn generate_feed(
    media: &MediaConfig,
    layout: &LayoutConfig,
    count: usize,
    rng: &mut DeterministicRng,
) -> Feed {
    Feed::from_profiles(
        (0..count).map(|_| generate_profile(media, rng)),
        layout.video_height,
    )
}
