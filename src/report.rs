use std::fmt;
use std::time::Duration;

use anyhow::Result;
use histogram::Histogram;
use tokio::time::Instant;

const REPORT_INTERVAL: Duration = Duration::from_secs(1);

const PERCENTILES: [(&str, f64); 4] = [("p50", 50.0), ("p90", 90.0), ("p99", 99.0), ("p99.9", 99.9)];

/// Outcome of a single workload run against one server.
pub struct BenchResult {
    pub name: String,
    pub operations: u64,
    pub elapsed: Duration,
    /// Rows read, for workloads where one operation touches many rows.
    pub items: u64,
    latencies: Histogram,
}

impl BenchResult {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            operations: 0,
            elapsed: Duration::from_secs(0),
            items: 0,
            latencies: Histogram::new(),
        }
    }

    /// Records one completed operation.
    pub fn record(&mut self, latency: Duration) -> Result<()> {
        let micros = latency.as_micros() as u64;
        self.latencies
            .increment(micros)
            .map_err(|err| anyhow::anyhow!("Cannot record latency of {}us: {}", micros, err))?;
        self.operations += 1;
        Ok(())
    }

    pub fn ops_per_sec(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.operations as f64 / secs
        } else {
            0.0
        }
    }

    pub fn items_per_sec(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.items as f64 / secs
        } else {
            0.0
        }
    }

    pub fn latency_percentile(&self, percentile: f64) -> Option<u64> {
        self.latencies.percentile(percentile).ok()
    }
}

impl fmt::Display for BenchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{}: {} ops in {:.3}s, {:.1} ops/s",
            self.name,
            self.operations,
            self.elapsed.as_secs_f64(),
            self.ops_per_sec()
        )?;
        if self.items > 0 {
            writeln!(
                f,
                "  {} rows, {:.1} rows/s",
                self.items,
                self.items_per_sec()
            )?;
        }
        if self.operations == 0 {
            return write!(f, "  latency: no samples");
        }

        write!(
            f,
            "  latency [us]: min {} mean {}",
            show(self.latencies.minimum().ok()),
            show(self.latencies.mean().ok())
        )?;
        for (label, percentile) in PERCENTILES.iter() {
            write!(f, " {} {}", label, show(self.latency_percentile(*percentile)))?;
        }
        write!(f, " max {}", show(self.latencies.maximum().ok()))
    }
}

fn show(value: Option<u64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_owned())
}

/// Everything measured on one target.
///
/// Results are printed as soon as they are added and kept when a later
/// workload fails, so an aborted run still reports what it completed.
pub struct TargetReport {
    target: String,
    results: Vec<BenchResult>,
    failure: Option<String>,
}

impl TargetReport {
    pub fn new(target: impl fmt::Display) -> Self {
        Self {
            target: target.to_string(),
            results: Vec::new(),
            failure: None,
        }
    }

    pub fn add(&mut self, result: BenchResult) {
        println!("{}", result);
        self.results.push(result);
    }

    pub fn fail(&mut self, err: anyhow::Error) {
        self.failure = Some(format!("{:#}", err));
    }

    pub fn results(&self) -> &[BenchResult] {
        &self.results
    }

    pub fn is_failed(&self) -> bool {
        self.failure.is_some()
    }

    pub fn summary(&self) -> String {
        let completed = self
            .results
            .iter()
            .map(|r| r.name.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        match &self.failure {
            Some(failure) => format!(
                "Benchmark on {} failed after {} completed workload(s) [{}]: {}",
                self.target,
                self.results.len(),
                completed,
                failure
            ),
            None => format!(
                "Benchmark on {} finished: {}",
                self.target, completed
            ),
        }
    }
}

/// Prints the throughput of a running workload about once a second.
pub struct ProgressReporter {
    start_time: Instant,
    previous_ops: u64,
    previous_report_time: Instant,
}

impl ProgressReporter {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            start_time: now,
            previous_ops: 0,
            previous_report_time: now,
        }
    }

    pub fn maybe_print_report(&mut self, ops_done: u64) {
        let now = Instant::now();
        if now >= self.previous_report_time + REPORT_INTERVAL {
            self.print_report(now, ops_done);
        }
    }

    fn print_report(&mut self, now: Instant, ops_done: u64) {
        let elapsed = now - self.start_time;

        let ops_delta = ops_done - self.previous_ops;
        let time_delta = now - self.previous_report_time;

        let ops_per_sec = ops_delta as f64 / time_delta.as_secs_f64();

        println!("{:?}: {} {:.0}ops/s", elapsed, ops_done, ops_per_sec);

        self.previous_ops = ops_done;
        self.previous_report_time = now;
    }
}
