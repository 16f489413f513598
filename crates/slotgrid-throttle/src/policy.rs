//! ThrottleConfig — a single concurrency and rate policy.
//!
//! Tracks recent execution start times and answers whether one more
//! execution may begin. Not synchronized on its own: the registry wraps
//! each policy in a mutex so check and record happen as one unit.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

use slotgrid_core::{SlotgridError, SlotgridResult};

/// History is kept for this many windows past `now` when pruning.
const RETENTION_WINDOWS: u64 = 2;

/// A concurrency cap plus an optional sliding-window rate cap.
///
/// `max_concurrent` is used for both limits: at most `max_concurrent`
/// executions may run at once, and when `period_seconds > 0`, at most
/// `max_concurrent` may have started within the last `period_seconds`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ThrottleConfig {
    max_concurrent: u32,
    period_seconds: u64,
    /// Execution start times (epoch milliseconds), ascending.
    execution_times: Vec<u64>,
}

impl ThrottleConfig {
    /// Create a policy. `max_concurrent` must be positive.
    pub fn new(max_concurrent: u32, period_seconds: u64) -> SlotgridResult<Self> {
        if max_concurrent == 0 {
            return Err(SlotgridError::InvalidArgument(
                "max_concurrent must be a positive integer".to_string(),
            ));
        }
        Ok(Self {
            max_concurrent,
            period_seconds,
            execution_times: Vec::new(),
        })
    }

    pub fn max_concurrent(&self) -> u32 {
        self.max_concurrent
    }

    pub fn period_seconds(&self) -> u64 {
        self.period_seconds
    }

    /// Whether the sliding-window rate limit is active.
    pub fn is_rate_limited(&self) -> bool {
        self.period_seconds > 0
    }

    /// Recorded execution start times, oldest first.
    pub fn execution_times(&self) -> &[u64] {
        &self.execution_times
    }

    /// Check admission against the system clock.
    pub fn is_allowed_to_start(&self, current_running: u32) -> bool {
        self.is_allowed_to_start_at(current_running, epoch_millis())
    }

    /// Check admission as of `now_ms`.
    ///
    /// Denies when `current_running` has reached the cap, or when the
    /// number of starts in `[now - period, now]` has reached it.
    pub fn is_allowed_to_start_at(&self, current_running: u32, now_ms: u64) -> bool {
        if current_running >= self.max_concurrent {
            return false;
        }
        if self.is_rate_limited() {
            let recent = self.starts_in_window(now_ms);
            if recent >= self.max_concurrent as usize {
                return false;
            }
        }
        true
    }

    /// Record an execution start at the current system time.
    pub fn record_execution(&mut self) {
        self.record_execution_at(epoch_millis());
    }

    /// Record an execution start at `now_ms`.
    ///
    /// When rate limiting is active, starts older than two periods are
    /// dropped so the history stays bounded.
    pub fn record_execution_at(&mut self, now_ms: u64) {
        let idx = self.execution_times.partition_point(|&t| t <= now_ms);
        self.execution_times.insert(idx, now_ms);

        if self.is_rate_limited() {
            let retention_ms = self
                .period_seconds
                .saturating_mul(RETENTION_WINDOWS)
                .saturating_mul(1000);
            let cutoff = now_ms.saturating_sub(retention_ms);
            self.execution_times.retain(|&t| t >= cutoff);
        }
    }

    /// Starts with `now - period <= t <= now`.
    fn starts_in_window(&self, now_ms: u64) -> usize {
        let window_start = now_ms.saturating_sub(self.period_seconds.saturating_mul(1000));
        self.execution_times
            .iter()
            .filter(|&&t| t >= window_start && t <= now_ms)
            .count()
    }
}

pub(crate) fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
