use tracing_subscriber::{fmt, EnvFilter};

/// Install the global fmt subscriber. `RUST_LOG` wins over `default_level`.
pub fn init_logging(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));
    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

/// Outcome of one iteration of a periodic job.
#[derive(Debug, Clone)]
pub struct JobMetrics {
    pub job: &'static str,
    pub tick_number: u64,
    pub duration_us: u128,
    /// Items (players, keys) handled successfully this tick.
    pub processed: usize,
    /// Items whose handling failed and will be retried next tick.
    pub failed: usize,
    pub budget_us: u128,
}

impl JobMetrics {
    pub fn over_budget(&self) -> bool {
        self.duration_us > self.budget_us
    }

    pub fn log(&self) {
        if self.over_budget() {
            tracing::warn!(
                job = self.job,
                tick = self.tick_number,
                duration_us = self.duration_us,
                processed = self.processed,
                failed = self.failed,
                "job tick exceeded budget ({}us > {}us)",
                self.duration_us,
                self.budget_us
            );
        } else if self.failed > 0 {
            tracing::warn!(
                job = self.job,
                tick = self.tick_number,
                processed = self.processed,
                failed = self.failed,
                "job tick completed with failures"
            );
        } else {
            tracing::debug!(
                job = self.job,
                tick = self.tick_number,
                duration_us = self.duration_us,
                processed = self.processed,
                "job tick completed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn over_budget_compares_duration() {
        let mut m = JobMetrics {
            job: "spirit",
            tick_number: 1,
            duration_us: 400,
            processed: 3,
            failed: 0,
            budget_us: 500,
        };
        assert!(!m.over_budget());
        m.duration_us = 501;
        assert!(m.over_budget());
    }
}
