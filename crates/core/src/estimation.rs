//! Processing-time estimation from recent completions.
//!
//! A job's projected duration is `per_file_ms * file_count + base_overhead_ms`.
//! Both coefficients are re-derived from a bounded ring buffer of completed
//! jobs, and queue wait times are projected by greedy least-loaded assignment
//! over the processing slots.

use std::collections::VecDeque;

use serde::Serialize;

use crate::config::QueueConfig;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Fraction of the shortest recorded job treated as fixed per-job overhead.
pub const BASE_OVERHEAD_FRACTION: f64 = 0.3;

/// Milliseconds per second (1000).
pub const MS_PER_SEC: u64 = 1000;

// ---------------------------------------------------------------------------
// History
// ---------------------------------------------------------------------------

/// Duration and size of one finished job (successful or failed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub duration_ms: u64,
    pub file_count: u32,
}

/// Result of [`EstimationModel::refresh`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RefreshOutcome {
    /// No history yet; defaults remain in effect.
    Empty,
    /// Coefficients were replaced.
    Updated { per_file_ms: f64, base_overhead_ms: f64 },
    /// The derived coefficients were negative or non-finite and were dropped.
    Discarded { per_file_ms: f64, base_overhead_ms: f64 },
}

// ---------------------------------------------------------------------------
// Model
// ---------------------------------------------------------------------------

/// Adaptive per-file and per-job time coefficients.
///
/// Coefficients are always finite and non-negative: a refresh that would
/// produce anything else leaves the previous values in place.
#[derive(Debug, Clone)]
pub struct EstimationModel {
    history: VecDeque<HistoryEntry>,
    capacity: usize,
    per_file_ms: f64,
    base_overhead_ms: f64,
}

impl EstimationModel {
    /// Create a model with the given history capacity and starting coefficients.
    ///
    /// A capacity of zero is treated as one.
    pub fn new(capacity: usize, default_per_file_ms: u64, default_base_overhead_ms: u64) -> Self {
        let capacity = capacity.max(1);
        Self {
            history: VecDeque::with_capacity(capacity),
            capacity,
            per_file_ms: default_per_file_ms as f64,
            base_overhead_ms: default_base_overhead_ms as f64,
        }
    }

    pub fn from_config(config: &QueueConfig) -> Self {
        Self::new(
            config.history_capacity,
            config.default_per_file_ms,
            config.default_base_overhead_ms,
        )
    }

    /// Append a finished job, evicting the oldest entry beyond capacity.
    pub fn record_completion(&mut self, duration_ms: u64, file_count: u32) {
        self.history.push_back(HistoryEntry {
            duration_ms,
            file_count,
        });
        while self.history.len() > self.capacity {
            self.history.pop_front();
        }
    }

    /// Re-derive the coefficients from the retained history.
    pub fn refresh(&mut self) -> RefreshOutcome {
        if self.history.is_empty() {
            return RefreshOutcome::Empty;
        }

        let count = self.history.len() as f64;
        let total_ms: f64 = self.history.iter().map(|h| h.duration_ms as f64).sum();
        let total_files: u64 = self.history.iter().map(|h| u64::from(h.file_count)).sum();

        let (per_file_ms, base_overhead_ms) = if total_files > 0 {
            let shortest = self
                .history
                .iter()
                .map(|h| h.duration_ms)
                .min()
                .unwrap_or_default() as f64;
            let candidate = shortest * BASE_OVERHEAD_FRACTION;
            // A zero-length job says nothing about overhead; keep the current one.
            let base = if candidate > 0.0 {
                self.base_overhead_ms.min(candidate)
            } else {
                self.base_overhead_ms
            };
            ((total_ms - count * base) / total_files as f64, base)
        } else {
            // Only empty batches on record: all time is overhead.
            (self.per_file_ms, total_ms / count)
        };

        let sane = per_file_ms.is_finite()
            && base_overhead_ms.is_finite()
            && per_file_ms >= 0.0
            && base_overhead_ms >= 0.0;
        if !sane {
            return RefreshOutcome::Discarded {
                per_file_ms,
                base_overhead_ms,
            };
        }

        self.per_file_ms = per_file_ms;
        self.base_overhead_ms = base_overhead_ms;
        RefreshOutcome::Updated {
            per_file_ms,
            base_overhead_ms,
        }
    }

    /// Projected total processing time for a job of `file_count` files.
    pub fn estimate_ms(&self, file_count: u32) -> f64 {
        self.per_file_ms * f64::from(file_count) + self.base_overhead_ms
    }

    pub fn per_file_ms(&self) -> f64 {
        self.per_file_ms
    }

    pub fn base_overhead_ms(&self) -> f64 {
        self.base_overhead_ms
    }

    /// Retained history, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.history.iter()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }
}

// ---------------------------------------------------------------------------
// Wait projection
// ---------------------------------------------------------------------------

/// Project the wait of each queued job by greedy least-loaded assignment.
///
/// `active_remaining_ms` seeds one slot each (extra entries beyond
/// `slot_count` are ignored, missing ones start free). Queued jobs are
/// walked in order; each takes the earliest-free slot (lowest index on
/// ties), waits for it, then occupies it for its own projected duration.
pub fn project_wait_times(
    slot_count: usize,
    active_remaining_ms: &[f64],
    queued_durations_ms: &[f64],
) -> Vec<f64> {
    let mut free_at = vec![0.0_f64; slot_count.max(1)];

    let mut remaining: Vec<f64> = active_remaining_ms
        .iter()
        .map(|ms| sanitize_ms(*ms))
        .collect();
    remaining.sort_by(f64::total_cmp);
    for (slot, ms) in free_at.iter_mut().zip(remaining) {
        *slot = ms;
    }

    queued_durations_ms
        .iter()
        .map(|duration| {
            let mut earliest = 0;
            for idx in 1..free_at.len() {
                if free_at[idx] < free_at[earliest] {
                    earliest = idx;
                }
            }
            let wait = free_at[earliest];
            free_at[earliest] += sanitize_ms(*duration);
            wait
        })
        .collect()
}

/// Clamp to a finite, non-negative millisecond value.
fn sanitize_ms(ms: f64) -> f64 {
    if ms.is_finite() && ms > 0.0 {
        ms
    } else {
        0.0
    }
}

// ---------------------------------------------------------------------------
// Formatting
// ---------------------------------------------------------------------------

/// Human-readable rendering of a wait estimate for queue messages.
pub fn format_wait(ms: u64) -> String {
    if ms == 0 {
        return "Starting soon".to_string();
    }
    if ms < MS_PER_SEC {
        return "< 1 sec".to_string();
    }

    let total_secs = (ms + MS_PER_SEC / 2) / MS_PER_SEC;
    if total_secs < 60 {
        return format!("{total_secs} sec");
    }

    let minutes = total_secs / 60;
    let seconds = total_secs % 60;
    if minutes < 60 && seconds > 0 {
        format!("{minutes} min {seconds} sec")
    } else {
        format!("{minutes} min")
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
