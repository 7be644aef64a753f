//! SCGI request counters

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

pub struct ScgiActivity {
    started: Instant,
    requests_received: AtomicU64,
    responses_sent: AtomicU64,
    /// Requests abandoned before an answer, e.g. on connection timeout
    requests_dropped: AtomicU64,
}

impl Default for ScgiActivity {
    fn default() -> Self {
        Self::new()
    }
}

impl ScgiActivity {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            requests_received: AtomicU64::new(0),
            responses_sent: AtomicU64::new(0),
            requests_dropped: AtomicU64::new(0),
        }
    }

    /// Count a request as received; it stays pending until the guard is
    /// answered or dropped
    pub fn start_request(&self) -> RequestGuard<'_> {
        self.report_request_received();
        RequestGuard {
            activity: self,
            answered: false,
        }
    }

    pub fn report_request_received(&self) {
        self.requests_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn report_response_sent(&self) {
        self.responses_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn requests_received(&self) -> u64 {
        self.requests_received.load(Ordering::Relaxed)
    }

    pub fn responses_sent(&self) -> u64 {
        self.responses_sent.load(Ordering::Relaxed)
    }

    pub fn pending(&self) -> u64 {
        self.requests_received()
            .saturating_sub(self.responses_sent())
            .saturating_sub(self.requests_dropped.load(Ordering::Relaxed))
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }
}

pub struct RequestGuard<'a> {
    activity: &'a ScgiActivity,
    answered: bool,
}

impl RequestGuard<'_> {
    pub fn answered(mut self) {
        self.answered = true;
        self.activity.report_response_sent();
    }
}

impl Drop for RequestGuard<'_> {
    fn drop(&mut self) {
        if !self.answered {
            self.activity.requests_dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending() {
        let activity = ScgiActivity::new();
        activity.report_request_received();
        activity.report_request_received();
        activity.report_response_sent();
        assert_eq!(activity.requests_received(), 2);
        assert_eq!(activity.responses_sent(), 1);
        assert_eq!(activity.pending(), 1);
    }

    #[test]
    fn test_dropped_request_is_not_pending() {
        let activity = ScgiActivity::new();
        activity.start_request().answered();
        let guard = activity.start_request();
        assert_eq!(activity.pending(), 1);
        drop(guard);
        assert_eq!(activity.requests_received(), 2);
        assert_eq!(activity.responses_sent(), 1);
        assert_eq!(activity.pending(), 0);
    }
}
