//! Invocation deadline
//!
//! The host bounds every remote invocation by the timeout of its resource
//! profile. The worker has no watchdog of its own; when the deadline passes
//! the transport kills the invocation and the run must restart from SYNC.

use std::time::{Duration, Instant};

use aosp_protocol::ops::ResourceProfile;

/// Deadline check result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeadlineStatus {
    Ok,
    Expired,
}

/// Wall-clock limit for one remote invocation.
#[derive(Debug, Clone, Copy)]
pub struct InvocationDeadline {
    limit: Duration,
    start: Instant,
}

impl InvocationDeadline {
    /// Start a deadline of `limit` from now.
    pub fn new(limit: Duration) -> Self {
        Self {
            limit,
            start: Instant::now(),
        }
    }

    /// Deadline matching a profile's `timeout_seconds`.
    pub fn for_profile(profile: &ResourceProfile) -> Self {
        Self::new(Duration::from_secs(profile.timeout_seconds))
    }

    pub fn limit(&self) -> Duration {
        self.limit
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Time left before the deadline, zero once expired.
    pub fn remaining(&self) -> Duration {
        self.limit.saturating_sub(self.elapsed())
    }

    pub fn check(&self) -> DeadlineStatus {
        if self.elapsed() >= self.limit {
            DeadlineStatus::Expired
        } else {
            DeadlineStatus::Ok
        }
    }

    pub fn expired(&self) -> bool {
        self.check() == DeadlineStatus::Expired
    }
}
