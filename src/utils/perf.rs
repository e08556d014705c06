//! Performance measurement utilities for flop rates and memory.
//!
//! Operators count their floating-point work in an accumulator that is read and
//! reset through [`LinearOperator::flops`](crate::matrix::LinearOperator::flops).
//! A [`PerfReport`] pairs that count with a wall-clock duration.

use serde::Serialize;
use std::{fmt, time::Duration};

/// Flop count and wall-clock time of one measured section.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct PerfReport {
    pub flops: u64,
    pub seconds: f64,
}

impl PerfReport {
    pub fn new(flops: u64, elapsed: Duration) -> Self {
        Self {
            flops,
            seconds: elapsed.as_secs_f64(),
        }
    }

    /// Sustained rate in GFLOPS, zero for an unmeasurably short section.
    pub fn gflops(&self) -> f64 {
        if self.seconds > 0.0 {
            self.flops as f64 * 1e-9 / self.seconds
        } else {
            0.0
        }
    }
}

impl fmt::Display for PerfReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} flops in {:.3} s ({:.3} GFLOPS)",
            self.flops,
            self.seconds,
            self.gflops()
        )
    }
}

/// Peak resident set size (`VmHWM`) in kilobytes from /proc/self/status, or 0
/// if it cannot be read.
#[cfg(target_os = "linux")]
pub fn peak_rss_kb() -> u64 {
    std::fs::read_to_string("/proc/self/status")
        .ok()
        .and_then(|status| {
            status.lines().find_map(|line| {
                line.strip_prefix("VmHWM:")
                    .and_then(|rest| rest.split_whitespace().next())
                    .and_then(|value| value.parse().ok())
            })
        })
        .unwrap_or(0)
}

#[cfg(not(target_os = "linux"))]
pub fn peak_rss_kb() -> u64 {
    log::warn!("Peak RSS measurement is only supported on Linux; returning 0.");
    0
}
