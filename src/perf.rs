//! Lightweight performance aggregation utilities.
//!
//! Coarse timing and counter tracking for end-of-run summaries. The collector
//! is process-wide and lock-free, so concurrent generation runs can record
//! into it without coordination.

use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MetricKind {
    Duration,
    Counter,
}

/// Named metrics tracked by the perf collector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Metric {
    RuntimeFromConfigPath,
    RuntimeFromConfig,
    LoadWeights,
    BulkForward,
    Generate,
    GenerateStep,
    ResidualStack,
    OutputHead,
    Sampling,
    GeneratedSteps,
    GeneratedSamples,
}

impl Metric {
    const COUNT: usize = 11;

    const ALL: [Metric; Metric::COUNT] = [
        Metric::RuntimeFromConfigPath,
        Metric::RuntimeFromConfig,
        Metric::LoadWeights,
        Metric::BulkForward,
        Metric::Generate,
        Metric::GenerateStep,
        Metric::ResidualStack,
        Metric::OutputHead,
        Metric::Sampling,
        Metric::GeneratedSteps,
        Metric::GeneratedSamples,
    ];

    fn index(self) -> usize {
        self as usize
    }

    fn name(self) -> &'static str {
        match self {
            Metric::RuntimeFromConfigPath => "runtime.from_config_path",
            Metric::RuntimeFromConfig => "runtime.from_config",
            Metric::LoadWeights => "wavenet.load_weights",
            Metric::BulkForward => "wavenet.forward",
            Metric::Generate => "wavenet.generate",
            Metric::GenerateStep => "wavenet.generate.step",
            Metric::ResidualStack => "wavenet.residual_stack",
            Metric::OutputHead => "wavenet.output_head",
            Metric::Sampling => "wavenet.sampling",
            Metric::GeneratedSteps => "wavenet.steps",
            Metric::GeneratedSamples => "wavenet.samples",
        }
    }

    fn kind(self) -> MetricKind {
        match self {
            Metric::GeneratedSteps | Metric::GeneratedSamples => MetricKind::Counter,
            _ => MetricKind::Duration,
        }
    }
}

struct PerfCollector {
    start: Instant,
    totals_us: [AtomicU64; Metric::COUNT],
    counts: [AtomicU64; Metric::COUNT],
}

impl PerfCollector {
    fn new() -> Self {
        Self {
            start: Instant::now(),
            totals_us: std::array::from_fn(|_| AtomicU64::new(0)),
            counts: std::array::from_fn(|_| AtomicU64::new(0)),
        }
    }

    fn add_duration(&self, metric: Metric, duration: Duration) {
        let micros = u64::try_from(duration.as_micros()).unwrap_or(u64::MAX);
        let index = metric.index();
        self.totals_us[index].fetch_add(micros, Ordering::Relaxed);
        self.counts[index].fetch_add(1, Ordering::Relaxed);
    }

    fn add_count(&self, metric: Metric, delta: u64) {
        self.counts[metric.index()].fetch_add(delta, Ordering::Relaxed);
    }

    fn snapshot(&self) -> PerfSnapshot {
        PerfSnapshot {
            uptime: self.start.elapsed(),
            totals_us: std::array::from_fn(|idx| self.totals_us[idx].load(Ordering::Relaxed)),
            counts: std::array::from_fn(|idx| self.counts[idx].load(Ordering::Relaxed)),
        }
    }
}

static COLLECTOR: OnceLock<PerfCollector> = OnceLock::new();

fn collector() -> &'static PerfCollector {
    COLLECTOR.get_or_init(PerfCollector::new)
}

/// A RAII timer that records its duration when dropped.
pub struct PerfSpan {
    metric: Metric,
    start: Instant,
}

impl Drop for PerfSpan {
    fn drop(&mut self) {
        collector().add_duration(self.metric, self.start.elapsed());
    }
}

/// Begin a named timing span.
pub fn span(metric: Metric) -> PerfSpan {
    PerfSpan {
        metric,
        start: Instant::now(),
    }
}

/// Record a counter delta for a named metric.
pub fn add_count(metric: Metric, delta: u64) {
    collector().add_count(metric, delta);
}

/// Snapshot of collected performance data.
#[derive(Debug)]
pub struct PerfSnapshot {
    uptime: Duration,
    totals_us: [u64; Metric::COUNT],
    counts: [u64; Metric::COUNT],
}

impl PerfSnapshot {
    /// Count recorded for `metric` (span completions or counter total).
    pub fn count(&self, metric: Metric) -> u64 {
        self.counts[metric.index()]
    }

    /// Format a human-readable report, largest totals first.
    pub fn format(&self) -> String {
        let mut durations: Vec<(Metric, u64, u64)> = Vec::new();
        let mut counters: Vec<(Metric, u64)> = Vec::new();
        for metric in Metric::ALL {
            let total_us = self.totals_us[metric.index()];
            let count = self.counts[metric.index()];
            match metric.kind() {
                MetricKind::Duration if count > 0 || total_us > 0 => {
                    durations.push((metric, total_us, count))
                }
                MetricKind::Counter if count > 0 => counters.push((metric, count)),
                _ => {}
            }
        }
        durations.sort_by(|a, b| b.1.cmp(&a.1));
        counters.sort_by(|a, b| b.1.cmp(&a.1));

        let mut output = String::new();
        let _ = writeln!(
            &mut output,
            "Performance summary (uptime: {:.3}s)",
            self.uptime.as_secs_f64()
        );
        if durations.is_empty() && counters.is_empty() {
            let _ = writeln!(&mut output, "No performance data recorded.");
            return output;
        }

        if !durations.is_empty() {
            let _ = writeln!(&mut output, "Durations:");
            let _ = writeln!(
                &mut output,
                "  {:<28} {:>10} {:>8} {:>10}",
                "name", "total", "count", "avg"
            );
            for (metric, total_us, count) in durations {
                let avg_ms = if count == 0 {
                    0.0
                } else {
                    total_us as f64 / count as f64 / 1000.0
                };
                let _ = writeln!(
                    &mut output,
                    "  {:<28} {:>9.3}s {:>8} {:>8.3}ms",
                    metric.name(),
                    total_us as f64 / 1_000_000.0,
                    count,
                    avg_ms
                );
            }
        }

        if !counters.is_empty() {
            let _ = writeln!(&mut output, "Counters:");
            for (metric, value) in counters {
                let _ = writeln!(&mut output, "  {:<28} {}", metric.name(), value);
            }
        }
        output
    }
}

/// Snapshot the current totals.
pub fn snapshot() -> PerfSnapshot {
    collector().snapshot()
}

/// Format a report of all collected metrics.
pub fn report() -> String {
    snapshot().format()
}
