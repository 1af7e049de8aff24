//! Per-link delivery statistics
//!
//! Counts how often each edge was enabled in a bitmap and how often it was
//! reported failed. At the end of every window the counts are folded into a
//! reliability estimate and cleared.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;
use tschmesh_protocol::Edge;

/// Default aggregation window (10 minutes)
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(600);

/// Enabled and failed counts for one edge
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkCounters {
    pub enabled: u64,
    pub failed: u64,
}

impl LinkCounters {
    /// `1 - failed / enabled`, or `None` for an edge never enabled
    pub fn reliability(&self) -> Option<f64> {
        if self.enabled == 0 {
            return None;
        }
        Some((1.0 - self.failed as f64 / self.enabled as f64).clamp(0.0, 1.0))
    }
}

/// Reliability estimate for one closed window
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReliabilityReport {
    /// Sequence number of the window, starting at 1
    pub window: u64,
    pub generated_at: DateTime<Utc>,
    pub reliability: BTreeMap<Edge, f64>,
}

/// Windowed link-state counters
#[derive(Debug)]
pub struct LinkStateAggregator {
    counters: BTreeMap<Edge, LinkCounters>,
    window: Duration,
    window_start: Instant,
    windows_closed: u64,
}

impl LinkStateAggregator {
    pub fn new(window: Duration) -> Self {
        LinkStateAggregator {
            counters: BTreeMap::new(),
            window,
            window_start: Instant::now(),
            windows_closed: 0,
        }
    }

    pub fn record_enabled<'a, I>(&mut self, edges: I)
    where
        I: IntoIterator<Item = &'a Edge>,
    {
        for edge in edges {
            self.counters.entry(*edge).or_default().enabled += 1;
        }
    }

    pub fn record_failed<'a, I>(&mut self, edges: I)
    where
        I: IntoIterator<Item = &'a Edge>,
    {
        for edge in edges {
            self.counters.entry(*edge).or_default().failed += 1;
        }
    }

    pub fn counters(&self, edge: &Edge) -> LinkCounters {
        self.counters.get(edge).copied().unwrap_or_default()
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Whether the current window has run its full length
    pub fn is_due(&self) -> bool {
        self.window_start.elapsed() >= self.window
    }

    /// Reliability of every edge enabled in the current window
    pub fn estimate(&self) -> BTreeMap<Edge, f64> {
        self.counters
            .iter()
            .filter_map(|(edge, counters)| counters.reliability().map(|r| (*edge, r)))
            .collect()
    }

    /// Close the window: report, clear the counters and start a new one
    pub fn rollover(&mut self) -> ReliabilityReport {
        self.windows_closed += 1;
        let report = ReliabilityReport {
            window: self.windows_closed,
            generated_at: Utc::now(),
            reliability: self.estimate(),
        };
        debug!(
            "Link-state window {} closed: {} edges tracked, {} estimated",
            report.window,
            self.counters.len(),
            report.reliability.len()
        );
        self.counters.clear();
        self.window_start = Instant::now();
        report
    }

    /// Drop the current window's counters and restart it
    pub fn reset(&mut self) {
        self.counters.clear();
        self.window_start = Instant::now();
    }
}

impl Default for LinkStateAggregator {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}
