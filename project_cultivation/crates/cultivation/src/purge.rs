use std::sync::Arc;

use cache::CacheStore;
use engine_core::{JobOutcome, TickJob};

/// Evicts expired cache entries so abandoned sessions and locks free memory.
pub struct CachePurgeJob {
    cache: Arc<CacheStore>,
}

impl CachePurgeJob {
    pub fn new(cache: Arc<CacheStore>) -> Self {
        Self { cache }
    }
}

impl TickJob for CachePurgeJob {
    fn name(&self) -> &'static str {
        "cache-purge"
    }

    fn run_tick(&mut self, _tick: u64) -> JobOutcome {
        match self.cache.purge_expired() {
            Ok(evicted) => JobOutcome {
                processed: evicted,
                failed: 0,
            },
            Err(e) => {
                tracing::warn!(error = %e, "cache purge failed");
                JobOutcome {
                    processed: 0,
                    failed: 1,
                }
            }
        }
    }
}
