//! Chunked, resumable transfer of one video.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::bandwidth::FlowGrant;
use crate::clock::SimClock;
use crate::video::VideoAsset;

/// How a load task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoadOutcome {
    /// Every second of the video is loaded
    Completed,
    /// Shutdown interrupted the task; the in-progress chunk was discarded
    Cancelled,
}

/// Holds the flow grant and the asset's loading flag for a task's lifetime.
///
/// Dropping the lease returns the bandwidth share and then clears the flag,
/// on every exit path including cancellation and task abort.
struct LoadLease {
    video: Arc<VideoAsset>,
    grant: FlowGrant,
}

impl Drop for LoadLease {
    fn drop(&mut self) {
        self.grant.release();
        self.video.finish_loading();
    }
}

/// A single in-flight load of one video.
///
/// Created by the scheduler after it has set the asset's loading flag and
/// obtained a grant; the task owns both until it finishes.
pub struct LoadTask {
    lease: LoadLease,
    resume_from: f64,
    chunk_secs: f64,
}

impl LoadTask {
    pub fn new(
        video: Arc<VideoAsset>,
        grant: FlowGrant,
        resume_from: f64,
        chunk_secs: f64,
    ) -> Self {
        Self {
            lease: LoadLease { video, grant },
            resume_from,
            chunk_secs,
        }
    }

    /// Fetches chunks until the video is fully loaded or `cancel` fires.
    ///
    /// Each chunk sleeps for its megabits divided by the granted share. A
    /// chunk is merged into the loaded ranges only after its whole transfer
    /// time has elapsed.
    pub async fn run(self, clock: SimClock, cancel: CancellationToken) -> LoadOutcome {
        let video = Arc::clone(&self.lease.video);
        let share = self.lease.grant.share();
        let mut cursor = self.resume_from;

        debug!(
            video = %video.id(),
            share_mbps = share,
            resume_from = cursor,
            "Load task started"
        );

        loop {
            let Some(chunk) = video.next_chunk(cursor, self.chunk_secs) else {
                debug!(video = %video.id(), "Load task completed");
                return LoadOutcome::Completed;
            };

            let transfer_secs = video.profile().megabits_for(chunk.length()) / share;
            trace!(
                video = %video.id(),
                chunk = %chunk,
                transfer_secs,
                "Fetching chunk"
            );

            if !clock.sleep_or_cancel(transfer_secs, &cancel).await {
                debug!(video = %video.id(), chunk = %chunk, "Load task cancelled");
                return LoadOutcome::Cancelled;
            }

            video.record_loaded(chunk.start, chunk.end);
            cursor = chunk.end;
        }
    }
}
