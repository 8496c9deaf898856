use std::fmt;
use std::time::Duration;

use serde::Serialize;

use crate::progress::rate;
use crate::strategy::Strategy;

/// Итог одного прогона стратегии.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub strategy: Strategy,
    pub workers: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<usize>,
    /// Успешно опубликованные сообщения.
    pub sent: u64,
    /// Ошибки publish и откаченные батчи.
    pub failed: u64,
    pub elapsed_secs: f64,
    pub rate: f64,
}

impl RunReport {
    pub fn new(
        strategy: Strategy,
        workers: usize,
        batch_size: Option<usize>,
        tally: WorkerTally,
        elapsed: Duration,
    ) -> Self {
        Self {
            strategy,
            workers,
            batch_size,
            sent: tally.sent,
            failed: tally.failed,
            elapsed_secs: elapsed.as_secs_f64(),
            rate: rate(tally.sent, elapsed),
        }
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Completed!")?;
        writeln!(f, "Total messages: {}", self.sent)?;
        if self.failed > 0 {
            writeln!(f, "Failed messages: {}", self.failed)?;
        }
        writeln!(f, "Total time: {:.2} seconds", self.elapsed_secs)?;
        write!(f, "Average rate: {:.0} messages/second", self.rate)
    }
}

/// Счётчики одного воркера, суммируются после join.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WorkerTally {
    pub sent: u64,
    pub failed: u64,
}

impl std::ops::AddAssign for WorkerTally {
    fn add_assign(&mut self, rhs: Self) {
        self.sent += rhs.sent;
        self.failed += rhs.failed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_classic_summary() {
        let report = RunReport::new(
            Strategy::Single,
            1,
            None,
            WorkerTally { sent: 50_000, failed: 0 },
            Duration::from_millis(2_500),
        );
        let text = report.to_string();
        assert_eq!(
            text,
            "Completed!\nTotal messages: 50000\nTotal time: 2.50 seconds\nAverage rate: 20000 messages/second"
        );
    }

    #[test]
    fn failures_are_listed() {
        let report = RunReport::new(
            Strategy::Batch,
            4,
            Some(100),
            WorkerTally { sent: 900, failed: 100 },
            Duration::from_secs(1),
        );
        assert!(report.to_string().contains("Failed messages: 100"));
        assert_eq!(report.rate, 900.0);
    }

    #[test]
    fn json_shape() {
        let report = RunReport::new(
            Strategy::UltraFast,
            16,
            Some(100),
            WorkerTally { sent: 10, failed: 0 },
            Duration::from_secs(1),
        );
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["strategy"], "ultra-fast");
        assert_eq!(json["batch_size"], 100);
        assert_eq!(json["sent"], 10);
    }

    #[test]
    fn tally_sums() {
        let mut total = WorkerTally::default();
        total += WorkerTally { sent: 3, failed: 1 };
        total += WorkerTally { sent: 2, failed: 0 };
        assert_eq!(total, WorkerTally { sent: 5, failed: 1 });
    }
}
