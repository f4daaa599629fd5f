//! Shared network capacity split across concurrent load flows.
//!
//! Each flow receives `capacity / active_flows` at the moment it is granted
//! and keeps that share for its whole lifetime; later grants divide capacity
//! further without shrinking shares already handed out.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::config::NetworkConfig;

#[derive(Debug, Default)]
struct FlowState {
    active: usize,
    started: u64,
    released: u64,
    peak: usize,
}

/// Counters describing flow activity since the arbiter was created.
///
/// `started - released == active` holds for every snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FlowStats {
    pub active: usize,
    pub max_flows: usize,
    pub started: u64,
    pub released: u64,
    pub peak: usize,
}

/// Capacity-limited bandwidth allocator.
///
/// The lock is held only for the counter update; it is never held across a
/// simulated transfer.
#[derive(Debug)]
pub struct BandwidthArbiter {
    capacity_mbps: f64,
    max_flows: usize,
    state: Mutex<FlowState>,
}

impl BandwidthArbiter {
    pub fn new(capacity_mbps: f64, max_flows: usize) -> Self {
        Self {
            capacity_mbps,
            max_flows,
            state: Mutex::new(FlowState::default()),
        }
    }

    pub fn from_config(config: &NetworkConfig) -> Self {
        Self::new(config.bandwidth_mbps, config.max_flows)
    }

    pub fn capacity_mbps(&self) -> f64 {
        self.capacity_mbps
    }

    pub fn max_flows(&self) -> usize {
        self.max_flows
    }

    /// Grants a share in Mbps, or returns `0.0` when no flow slot is free.
    ///
    /// Every non-zero grant must be matched by exactly one `release_share`.
    /// Prefer [`BandwidthArbiter::acquire`], which releases automatically.
    pub fn request_share(&self) -> f64 {
        if self.capacity_mbps.is_nan() || self.capacity_mbps <= 0.0 {
            return 0.0;
        }

        let mut state = self.state.lock();
        if state.active >= self.max_flows {
            return 0.0;
        }
        state.active += 1;
        state.started += 1;
        state.peak = state.peak.max(state.active);
        self.capacity_mbps / state.active as f64
    }

    /// Returns one flow slot. Extra releases are ignored.
    pub fn release_share(&self) {
        let mut state = self.state.lock();
        if state.active == 0 {
            tracing::warn!("release_share called with no active flows");
            return;
        }
        state.active -= 1;
        state.released += 1;
    }

    /// Grants a share wrapped in a guard that releases it on drop.
    pub fn acquire(self: &Arc<Self>) -> Option<FlowGrant> {
        let share = self.request_share();
        if share > 0.0 {
            Some(FlowGrant {
                arbiter: Arc::clone(self),
                share,
                released: false,
            })
        } else {
            None
        }
    }

    pub fn active_flows(&self) -> usize {
        self.state.lock().active
    }

    pub fn stats(&self) -> FlowStats {
        let state = self.state.lock();
        FlowStats {
            active: state.active,
            max_flows: self.max_flows,
            started: state.started,
            released: state.released,
            peak: state.peak,
        }
    }
}

/// One granted flow. Releasing is idempotent and happens on drop at the latest.
#[derive(Debug)]
pub struct FlowGrant {
    arbiter: Arc<BandwidthArbiter>,
    share: f64,
    released: bool,
}

impl FlowGrant {
    /// Bandwidth in Mbps fixed for this flow's lifetime.
    pub fn share(&self) -> f64 {
        self.share
    }

    pub fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.arbiter.release_share();
        }
    }
}

impl Drop for FlowGrant {
    fn drop(&mut self) {
        self.release();
    }
}
