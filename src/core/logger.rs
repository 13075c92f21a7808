//! In-memory log ring
//!
//! Keeps the most recent formatted lines for consoles and status pages that
//! poll incrementally by sequence number.

use chrono::{DateTime, Local};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;

/// Default number of retained lines
pub const DEFAULT_CAPACITY: usize = 128;

/// Longest stored line in bytes
pub const MAX_LINE_BYTES: usize = 159;

/// A single retained line
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogLine {
    /// Sequence number, starting at 1
    pub seq: u64,
    /// Time the line was pushed
    pub timestamp: DateTime<Local>,
    /// Line text
    pub text: String,
}

impl LogLine {
    /// Format as text
    pub fn to_text(&self, show_timestamp: bool) -> String {
        if show_timestamp {
            format!("[{}] {}", self.timestamp.format("%Y-%m-%d %H:%M:%S%.3f"), self.text)
        } else {
            self.text.clone()
        }
    }
}

#[derive(Debug, Default)]
struct Ring {
    lines: VecDeque<LogLine>,
    last_seq: u64,
}

/// Fixed-capacity ring of log lines; the oldest line is evicted when full
#[derive(Debug)]
pub struct LogRing {
    capacity: usize,
    inner: Mutex<Ring>,
}

impl Default for LogRing {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl LogRing {
    /// Ring holding at most `capacity` lines (at least one)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            inner: Mutex::new(Ring {
                lines: VecDeque::with_capacity(capacity),
                last_seq: 0,
            }),
        }
    }

    /// Append a line and return its sequence number
    pub fn push(&self, text: impl Into<String>) -> u64 {
        let mut text = text.into();
        truncate_on_char_boundary(&mut text, MAX_LINE_BYTES);

        let mut ring = self.inner.lock();
        ring.last_seq += 1;
        let seq = ring.last_seq;
        if ring.lines.len() == self.capacity {
            ring.lines.pop_front();
        }
        ring.lines.push_back(LogLine {
            seq,
            timestamp: Local::now(),
            text,
        });
        seq
    }

    /// Lines with a sequence number above `since_seq`, oldest first, at most `max`
    pub fn get_logs(&self, since_seq: u64, max: usize) -> Vec<LogLine> {
        self.inner
            .lock()
            .lines
            .iter()
            .filter(|line| line.seq > since_seq)
            .take(max)
            .cloned()
            .collect()
    }

    /// Sequence number of the newest line, 0 when nothing was pushed
    pub fn latest_seq(&self) -> u64 {
        self.inner.lock().last_seq
    }

    /// Retained line count
    pub fn len(&self) -> usize {
        self.inner.lock().lines.len()
    }

    /// Nothing retained
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum retained line count
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

fn truncate_on_char_boundary(text: &mut String, max: usize) {
    if text.len() <= max {
        return;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text.truncate(end);
}
