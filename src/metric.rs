//! Hallucination metric tracker.
//!
//! One handle per engine, passed in explicitly; the tracker is the only
//! shared mutable state in the system, so every `record` call takes the
//! internal mutex for the full read-modify-write. Counters are cumulative
//! for the session and never averaged across calls.

use crate::model::{MetricSummary, OperationStats, hall_rate};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// The one deliberately loud failure mode: a recorded data point pushed the
/// hallucination rate to or past the threshold while strict mode was on.
/// The metric update has already happened when this is returned.
#[derive(Debug, Error, Clone, PartialEq)]
#[error(
    "hallucination rate {hall_m:.4} breached threshold {threshold:.4} \
     during {context} ({validated} validated, {rejected} rejected)"
)]
pub struct HallMetricExceeded {
    pub hall_m: f64,
    pub threshold: f64,
    pub validated: u64,
    pub rejected: u64,
    pub context: String,
}

#[derive(Debug, Default, Clone)]
struct Bucket {
    validated: u64,
    rejected: u64,
}

#[derive(Debug)]
struct MetricState {
    total_validated: u64,
    total_rejected: u64,
    per_operation: BTreeMap<String, Bucket>,
    rate_samples: Vec<f64>,
    session_start: i64,
}

impl MetricState {
    fn fresh() -> Self {
        MetricState {
            total_validated: 0,
            total_rejected: 0,
            per_operation: BTreeMap::new(),
            rate_samples: Vec::new(),
            session_start: unix_now(),
        }
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Session-scoped tracker of validated vs. rejected claims.
///
/// Cloning shares the underlying counters; tests construct fresh trackers
/// instead of resetting a global.
#[derive(Clone)]
pub struct HallMetric {
    state: Arc<Mutex<MetricState>>,
    threshold: f64,
    fail_on_exceed: bool,
}

impl HallMetric {
    pub fn new(threshold: f64, fail_on_exceed: bool) -> Self {
        HallMetric {
            state: Arc::new(Mutex::new(MetricState::fresh())),
            threshold,
            fail_on_exceed,
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn is_strict(&self) -> bool {
        self.fail_on_exceed
    }

    /// Record one operation's outcome. The cumulative totals, the named
    /// operation bucket, and the rate sample are all updated before any
    /// strict-mode check runs, so the tracker stays an accurate historical
    /// log even when this returns the breach error.
    pub fn record(
        &self,
        operation: &str,
        validated: u64,
        rejected: u64,
    ) -> Result<(), HallMetricExceeded> {
        let (cumulative, call_rate) = {
            let mut state = self.state.lock().expect("metric mutex poisoned");
            state.total_validated += validated;
            state.total_rejected += rejected;
            let bucket = state.per_operation.entry(operation.to_string()).or_default();
            bucket.validated += validated;
            bucket.rejected += rejected;
            let cumulative = hall_rate(state.total_validated, state.total_rejected);
            state.rate_samples.push(cumulative);
            (cumulative, hall_rate(validated, rejected))
        };

        if !self.fail_on_exceed {
            return Ok(());
        }
        let breaching = if validated + rejected > 0 && cumulative >= self.threshold {
            Some(cumulative)
        } else if rejected > 0 && call_rate >= self.threshold {
            Some(call_rate)
        } else {
            None
        };
        match breaching {
            Some(hall_m) => Err(HallMetricExceeded {
                hall_m,
                threshold: self.threshold,
                validated,
                rejected,
                context: operation.to_string(),
            }),
            None => Ok(()),
        }
    }

    /// Snapshot the current state.
    pub fn summary(&self) -> MetricSummary {
        let state = self.state.lock().expect("metric mutex poisoned");
        let hall_m = hall_rate(state.total_validated, state.total_rejected);
        let per_operation = state
            .per_operation
            .iter()
            .map(|(name, bucket)| {
                (
                    name.clone(),
                    OperationStats {
                        validated: bucket.validated,
                        rejected: bucket.rejected,
                        hall_m: hall_rate(bucket.validated, bucket.rejected),
                    },
                )
            })
            .collect();
        let samples = &state.rate_samples;
        let min_hall_m = samples.iter().copied().fold(None, |acc: Option<f64>, v| {
            Some(acc.map_or(v, |a| a.min(v)))
        });
        let max_hall_m = samples.iter().copied().fold(None, |acc: Option<f64>, v| {
            Some(acc.map_or(v, |a| a.max(v)))
        });
        let avg_hall_m = if samples.is_empty() {
            None
        } else {
            Some(samples.iter().sum::<f64>() / samples.len() as f64)
        };
        MetricSummary {
            total_validated: state.total_validated,
            total_rejected: state.total_rejected,
            hall_m,
            threshold: self.threshold,
            is_within_threshold: hall_m < self.threshold,
            per_operation,
            min_hall_m,
            max_hall_m,
            avg_hall_m,
            samples: samples.len(),
            session_start: state.session_start,
        }
    }

    /// Drop all recorded history and restamp the session start.
    pub fn reset(&self) {
        let mut state = self.state.lock().expect("metric mutex poisoned");
        *state = MetricState::fresh();
    }
}
