use serde::Serialize;
use std::{collections::BTreeMap, fmt, future::Future, time::Duration};

use chrono::{DateTime, Utc};

use crate::pool::{FailureKind, RunResult, SessionOutcome};

/// Elapsed times below this are rounded up when computing throughput.
pub const MIN_ELAPSED: Duration = Duration::from_millis(1);

/// Mergeable counts over session outcomes.
///
/// A `Tally` keeps only raw counts; rates and throughput are derived later by
/// [`Report`]. `merge` is associative and commutative, so tallies built over
/// disjoint slices of a batch can be combined in any order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Tally {
    pub total: usize,
    pub succeeded: usize,
    pub failures: BTreeMap<FailureKind, usize>,
}

impl Tally {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn consume(&mut self, outcome: &SessionOutcome) {
        self.total += 1;
        match outcome.failure {
            None => self.succeeded += 1,
            Some(kind) => *self.failures.entry(kind).or_default() += 1,
        }
    }

    pub fn aggregate(&mut self, outcomes: &[SessionOutcome]) {
        outcomes.iter().for_each(|o| self.consume(o));
    }

    pub fn merge(&mut self, other: Self) {
        self.total += other.total;
        self.succeeded += other.succeeded;
        for (kind, n) in other.failures {
            *self.failures.entry(kind).or_default() += n;
        }
    }

    pub fn failed(&self) -> usize {
        self.total - self.succeeded
    }
}

/// Final statistics of one batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Percentage of sessions that completed, `0.0` for an empty batch.
    pub success_rate: f64,
    pub elapsed_secs: f64,
    /// Sessions per second over the batch's wall-clock time.
    pub throughput: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub failures: BTreeMap<FailureKind, usize>,
}

impl Report {
    pub fn new(tally: Tally, elapsed: Duration) -> Self {
        let success_rate = if tally.total == 0 {
            0.0
        } else {
            tally.succeeded as f64 / tally.total as f64 * 100.0
        };
        let throughput = if tally.total == 0 {
            0.0
        } else {
            tally.total as f64 / elapsed.max(MIN_ELAPSED).as_secs_f64()
        };

        Self {
            total: tally.total,
            succeeded: tally.succeeded,
            failed: tally.failed(),
            success_rate,
            elapsed_secs: elapsed.as_secs_f64(),
            throughput,
            started_at: None,
            finished_at: None,
            failures: tally.failures,
        }
    }

    pub fn from_outcomes(outcomes: &[SessionOutcome], elapsed: Duration) -> Self {
        let mut tally = Tally::new();
        tally.aggregate(outcomes);
        Self::new(tally, elapsed)
    }

    /// At least one session ran and none of them completed.
    pub fn all_failed(&self) -> bool {
        self.total > 0 && self.succeeded == 0
    }
}

impl From<&RunResult> for Report {
    fn from(run: &RunResult) -> Self {
        Self {
            started_at: Some(run.started_at),
            finished_at: Some(run.finished_at),
            ..Self::from_outcomes(&run.outcomes, run.elapsed)
        }
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== {} concurrent sessions finished ===", self.total)?;
        writeln!(f, "Total sessions: {}", self.total)?;
        writeln!(f, "Succeeded: {}", self.succeeded)?;
        writeln!(f, "Failed: {}", self.failed)?;
        for (kind, n) in &self.failures {
            writeln!(f, "  {kind:?}: {n}")?;
        }
        writeln!(f, "Success rate: {:.2}%", self.success_rate)?;
        writeln!(f, "Elapsed: {:.2}s", self.elapsed_secs)?;
        write!(f, "Throughput: {:.2} sessions/s", self.throughput)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Sends a [`Report`] somewhere: a log, stdout, a file, a database.
///
/// Reporters are the I/O boundary; computing the report stays pure.
pub trait Reporter {
    fn report(&self, report: &Report) -> impl Future<Output = Result<(), ReportError>> + Send;
}

/// Writes the summary through `tracing`, one line per statistic.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl Reporter for LogReporter {
    async fn report(&self, report: &Report) -> Result<(), ReportError> {
        for line in report.to_string().lines() {
            tracing::info!("{line}");
        }
        Ok(())
    }
}

/// Prints the report as pretty JSON on stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonReporter;

impl JsonReporter {
    pub fn render(&self, report: &Report) -> Result<String, ReportError> {
        Ok(serde_json::to_string_pretty(report)?)
    }
}

impl Reporter for JsonReporter {
    async fn report(&self, report: &Report) -> Result<(), ReportError> {
        println!("{}", self.render(report)?);
        Ok(())
    }
}
