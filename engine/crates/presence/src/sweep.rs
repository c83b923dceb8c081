use std::sync::Arc;

use engine_core::{JobOutcome, TickJob};

use crate::tracker::PresenceTracker;

/// Periodic heartbeat-timeout scan (default every 5 s).
pub struct PresenceSweepJob {
    tracker: Arc<PresenceTracker>,
}

impl PresenceSweepJob {
    pub fn new(tracker: Arc<PresenceTracker>) -> Self {
        Self { tracker }
    }
}

impl TickJob for PresenceSweepJob {
    fn name(&self) -> &'static str {
        "presence-sweep"
    }

    fn run_tick(&mut self, _tick: u64) -> JobOutcome {
        match self.tracker.sweep() {
            Ok(timed_out) => JobOutcome {
                processed: timed_out.len(),
                failed: 0,
            },
            Err(e) => {
                tracing::warn!(error = %e, "presence sweep failed");
                JobOutcome {
                    processed: 0,
                    failed: 1,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::{offline_channel, PresenceConfig};
    use cache::{CacheStore, ManualClock};
    use std::time::Duration;

    #[test]
    fn job_reports_timed_out_players() {
        let clock = ManualClock::new(0);
        let cache = Arc::new(CacheStore::new(clock.clone()));
        let (tx, mut rx) = offline_channel();
        let tracker = Arc::new(PresenceTracker::new(cache, PresenceConfig::default()).with_offline_tx(tx));
        tracker.login(1, "a").unwrap();
        tracker.login(2, "b").unwrap();

        let mut job = PresenceSweepJob::new(tracker.clone());
        assert_eq!(job.run_tick(1).processed, 0);

        clock.advance(Duration::from_secs(11));
        assert_eq!(job.run_tick(2).processed, 2);
        assert_eq!(rx.try_recv().unwrap().player_id, 1);
        assert_eq!(rx.try_recv().unwrap().player_id, 2);
    }
}
