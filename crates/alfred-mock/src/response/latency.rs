//! Declared response latency and the process-wide delay offset.

use parking_lot::RwLock;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Uniform delay range in milliseconds. `max <= min` means a fixed `min`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LatencyRange {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl LatencyRange {
    pub fn new(min_ms: u64, max_ms: u64) -> Self {
        Self { min_ms, max_ms }
    }

    pub fn is_zero(&self) -> bool {
        self.min_ms == 0 && self.max_ms == 0
    }

    pub fn sample_ms(&self) -> u64 {
        if self.max_ms <= self.min_ms {
            self.min_ms
        } else {
            rand::thread_rng().gen_range(self.min_ms..=self.max_ms)
        }
    }

    pub fn sample(&self) -> Duration {
        Duration::from_millis(self.sample_ms())
    }
}

/// Payload of `POST /alfred/delay`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DelayRequest {
    pub min_response_time: u64,
    /// How long the offset stays in force, in milliseconds
    pub duration: u64,
}

/// Extra latency added to every mock response until it expires
#[derive(Debug, Default)]
pub struct GlobalDelay {
    state: RwLock<Option<(Duration, Instant)>>,
}

impl GlobalDelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply an offset for a limited time, replacing any previous one
    pub fn set(&self, request: DelayRequest) {
        let offset = Duration::from_millis(request.min_response_time);
        let until = Instant::now() + Duration::from_millis(request.duration);
        *self.state.write() = if offset.is_zero() {
            None
        } else {
            Some((offset, until))
        };
    }

    pub fn clear(&self) {
        *self.state.write() = None;
    }

    /// Offset in force right now
    pub fn current(&self) -> Duration {
        match *self.state.read() {
            Some((offset, until)) if Instant::now() < until => offset,
            _ => Duration::ZERO,
        }
    }
}
