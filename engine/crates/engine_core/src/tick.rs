use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use observability::JobMetrics;

/// Longest uninterrupted sleep between shutdown checks.
const STOP_POLL: Duration = Duration::from_millis(100);

/// Periodic loop configuration.
#[derive(Debug, Clone)]
pub struct TickConfig {
    pub interval: Duration,
    /// Maximum ticks to run (0 = unlimited).
    pub max_ticks: u64,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            max_ticks: 0,
        }
    }
}

impl TickConfig {
    pub fn every(interval: Duration) -> Self {
        Self {
            interval,
            max_ticks: 0,
        }
    }

    /// A tick should finish within half its interval.
    pub fn budget(&self) -> Duration {
        self.interval / 2
    }
}

/// Counts reported by one job iteration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobOutcome {
    pub processed: usize,
    pub failed: usize,
}

impl JobOutcome {
    pub fn record(&mut self, ok: bool) {
        if ok {
            self.processed += 1;
        } else {
            self.failed += 1;
        }
    }
}

/// A unit of periodic background work (spirit accrual, presence sweep,
/// resource sync). Implementations must not block for long: every tick runs
/// to completion before the shutdown flag is checked again.
pub trait TickJob: Send {
    fn name(&self) -> &'static str;
    fn run_tick(&mut self, tick: u64) -> JobOutcome;
}

/// Drives a [`TickJob`] at a fixed cadence.
pub struct TickLoop<J: TickJob> {
    pub job: J,
    pub config: TickConfig,
    pub current_tick: u64,
}

impl<J: TickJob> TickLoop<J> {
    pub fn new(config: TickConfig, job: J) -> Self {
        Self {
            job,
            config,
            current_tick: 0,
        }
    }

    /// Execute a single tick and measure it.
    pub fn step(&mut self) -> JobMetrics {
        let start = Instant::now();
        self.current_tick += 1;
        let outcome = self.job.run_tick(self.current_tick);

        JobMetrics {
            job: self.job.name(),
            tick_number: self.current_tick,
            duration_us: start.elapsed().as_micros(),
            processed: outcome.processed,
            failed: outcome.failed,
            budget_us: self.config.budget().as_micros(),
        }
    }

    /// Run until `should_stop` returns true (checked between ticks and while
    /// sleeping) or `max_ticks` is reached. Returns the number of ticks run.
    pub fn run(&mut self, should_stop: impl Fn() -> bool) -> u64 {
        let mut ran = 0;
        loop {
            if should_stop() {
                tracing::info!(job = self.job.name(), "tick loop: shutdown signal received");
                break;
            }
            if self.config.max_ticks > 0 && ran >= self.config.max_ticks {
                break;
            }

            let tick_start = Instant::now();
            let metrics = self.step();
            metrics.log();
            ran += 1;

            // Sleep until next tick, waking periodically to honor shutdown.
            while tick_start.elapsed() < self.config.interval {
                if should_stop() {
                    break;
                }
                let remaining = self.config.interval.saturating_sub(tick_start.elapsed());
                std::thread::sleep(remaining.min(STOP_POLL));
            }
        }
        ran
    }
}

/// Run a job on a dedicated OS thread until `should_stop` fires.
pub fn spawn_tick_thread<J, F>(config: TickConfig, job: J, should_stop: F) -> std::io::Result<JoinHandle<u64>>
where
    J: TickJob + 'static,
    F: Fn() -> bool + Send + 'static,
{
    let name = format!("tick-{}", job.name());
    std::thread::Builder::new().name(name).spawn(move || {
        let mut tick_loop = TickLoop::new(config, job);
        tracing::info!(
            job = tick_loop.job.name(),
            interval_ms = tick_loop.config.interval.as_millis() as u64,
            "tick loop started"
        );
        tick_loop.run(should_stop)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use std::sync::Arc;

    struct CountingJob {
        runs: Arc<AtomicU64>,
        fail_every: u64,
    }

    impl TickJob for CountingJob {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn run_tick(&mut self, tick: u64) -> JobOutcome {
            self.runs.fetch_add(1, Ordering::SeqCst);
            let mut outcome = JobOutcome::default();
            outcome.record(self.fail_every == 0 || tick % self.fail_every != 0);
            outcome
        }
    }

    #[test]
    fn tick_config_budget_is_half_interval() {
        let config = TickConfig::every(Duration::from_secs(1));
        assert_eq!(config.budget(), Duration::from_millis(500));
        assert_eq!(TickConfig::default().interval, Duration::from_secs(1));
    }

    #[test]
    fn single_step_reports_outcome() {
        let runs = Arc::new(AtomicU64::new(0));
        let mut tick_loop = TickLoop::new(
            TickConfig::every(Duration::from_millis(10)),
            CountingJob {
                runs: runs.clone(),
                fail_every: 1,
            },
        );
        let metrics = tick_loop.step();
        assert_eq!(metrics.job, "counting");
        assert_eq!(metrics.tick_number, 1);
        assert_eq!(metrics.processed, 0);
        assert_eq!(metrics.failed, 1);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn run_honors_max_ticks() {
        let runs = Arc::new(AtomicU64::new(0));
        let mut tick_loop = TickLoop::new(
            TickConfig {
                interval: Duration::from_millis(1),
                max_ticks: 5,
            },
            CountingJob {
                runs: runs.clone(),
                fail_every: 0,
            },
        );
        assert_eq!(tick_loop.run(|| false), 5);
        assert_eq!(runs.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn spawned_thread_stops_on_signal() {
        let runs = Arc::new(AtomicU64::new(0));
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();
        let handle = spawn_tick_thread(
            TickConfig::every(Duration::from_secs(60)),
            CountingJob {
                runs: runs.clone(),
                fail_every: 0,
            },
            move || stop_flag.load(Ordering::SeqCst),
        )
        .unwrap();

        std::thread::sleep(Duration::from_millis(50));
        stop.store(true, Ordering::SeqCst);
        let ticks = handle.join().unwrap();
        // The first tick runs immediately; the 60 s sleep is cut short.
        assert_eq!(ticks, 1);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }
}
