use crate::collector::ClientStats;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::info;

/// Periodic statistics reporter.
///
/// Every `period` the reporter formats the client's counters and logs the
/// line, but only when it differs from the previous report so that an idle
/// client does not repeat itself.
pub struct StatReporter {
    name: String,
    stats: ClientStats,
    period: Duration,
    last: Option<String>,
}

impl StatReporter {
    /// Creates a reporter for the named host.
    ///
    /// # Arguments
    /// * `name` - Host name prefixed to each report
    /// * `stats` - Counters to report on
    /// * `period` - Interval between reports
    pub fn new(name: impl Into<String>, stats: ClientStats, period: Duration) -> Self {
        Self {
            name: name.into(),
            stats,
            period,
            last: None,
        }
    }

    /// Starts the reporter task.
    ///
    /// Returns `None` when the period is zero, which disables reporting.
    pub fn spawn(self) -> Option<JoinHandle<()>> {
        if self.period.is_zero() {
            return None;
        }

        Some(tokio::spawn(async move {
            self.run().await;
        }))
    }

    /// Main report loop. The first report fires one period after start.
    async fn run(mut self) {
        let start = tokio::time::Instant::now() + self.period;
        let mut interval = tokio::time::interval_at(start, self.period);

        loop {
            interval.tick().await;
            self.report();
        }
    }

    /// Produces one report, returning the line if it was logged.
    pub fn report(&mut self) -> Option<String> {
        let msg = self.stats.format_stat();
        if msg.is_empty() || self.last.as_deref() == Some(msg.as_str()) {
            return None;
        }

        info!("{} {}", self.name, msg);
        self.last = Some(msg.clone());
        Some(msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_deduplicates() {
        let stats = ClientStats::new();
        let mut reporter = StatReporter::new("test", stats.clone(), Duration::from_secs(1));

        // Nothing recorded yet
        assert_eq!(reporter.report(), None);

        stats.invoke.increment(1, 1000);
        assert!(reporter.report().is_some());

        // Unchanged counters produce no second report
        assert_eq!(reporter.report(), None);

        stats.invoke.increment(1, 1000);
        assert!(reporter.report().is_some());
    }

    #[tokio::test]
    async fn test_zero_period_disables_reporter() {
        let reporter = StatReporter::new("test", ClientStats::new(), Duration::ZERO);
        assert!(reporter.spawn().is_none());
    }

    #[tokio::test]
    async fn test_spawned_reporter_can_be_aborted() {
        let reporter = StatReporter::new("test", ClientStats::new(), Duration::from_millis(10));
        let handle = reporter.spawn().unwrap();
        handle.abort();
        let result = handle.await;
        assert!(result.unwrap_err().is_cancelled());
    }
}
