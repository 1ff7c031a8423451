// ========== Checkpoint scheduling ==========

use async_trait::async_trait;
use dfs_lib::DfsResult;
use log::{debug, warn};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Decides when the journal should be folded into a new snapshot.
/// A checkpoint is due when the journal holds at least `size_threshold` entries,
/// or when `interval` has passed since the last one. An empty journal is never due.
#[derive(Clone, Debug)]
pub struct CheckpointPolicy {
    pub size_threshold: usize,
    pub interval: Duration,
    last_checkpoint: Instant,
    retry_after: Option<Instant>,
}

impl CheckpointPolicy {
    pub fn new(size_threshold: usize, interval: Duration) -> Self {
        Self {
            size_threshold: size_threshold.max(1),
            interval,
            last_checkpoint: Instant::now(),
            retry_after: None,
        }
    }

    pub fn is_due(&self, journal_len: usize, now: Instant) -> bool {
        if journal_len == 0 {
            return false;
        }
        if let Some(retry_after) = self.retry_after {
            if now < retry_after {
                return false;
            }
        }
        journal_len >= self.size_threshold
            || now.saturating_duration_since(self.last_checkpoint) >= self.interval
    }

    pub fn record_success(&mut self, now: Instant) {
        self.last_checkpoint = now;
        self.retry_after = None;
    }

    /// After a failed attempt, hold off for one interval instead of retrying on
    /// every mutation.
    pub fn record_failure(&mut self, now: Instant) {
        self.retry_after = Some(now + self.interval);
    }

    pub fn in_backoff(&self, now: Instant) -> bool {
        matches!(self.retry_after, Some(r) if now < r)
    }
}

#[async_trait]
pub trait CheckpointExecutor: Send + Sync {
    /// Run a checkpoint if the policy says one is due. Returns whether one ran.
    async fn checkpoint_if_due(&self) -> DfsResult<bool>;
}

pub struct CheckpointWorker;

impl CheckpointWorker {
    /// Poll the executor on a fixed tick so time-based checkpoints happen even
    /// when no mutation arrives.
    pub fn spawn(
        executor: Arc<dyn CheckpointExecutor + Send + Sync>,
        poll_interval: Duration,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                match executor.checkpoint_if_due().await {
                    Ok(true) => debug!("checkpoint worker: checkpoint done"),
                    Ok(false) => {}
                    Err(e) => warn!("checkpoint worker: checkpoint failed: {}", e),
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dfs_lib::DfsError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::sleep;

    #[test]
    fn test_policy_threshold_and_interval() {
        let start = Instant::now();
        let mut policy = CheckpointPolicy::new(2, Duration::from_secs(60));
        policy.record_success(start);

        assert!(!policy.is_due(0, start + Duration::from_secs(3600)));
        assert!(!policy.is_due(1, start));
        assert!(policy.is_due(2, start));
        assert!(policy.is_due(1, start + Duration::from_secs(60)));
    }

    #[test]
    fn test_policy_backoff_after_failure() {
        let start = Instant::now();
        let mut policy = CheckpointPolicy::new(1, Duration::from_secs(10));
        policy.record_success(start);
        assert!(policy.is_due(5, start));

        policy.record_failure(start);
        assert!(policy.in_backoff(start + Duration::from_secs(1)));
        assert!(!policy.is_due(5, start + Duration::from_secs(9)));
        assert!(policy.is_due(5, start + Duration::from_secs(10)));

        policy.record_success(start + Duration::from_secs(10));
        assert!(!policy.in_backoff(start + Duration::from_secs(10)));
    }

    struct MockExecutor {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl CheckpointExecutor for MockExecutor {
        async fn checkpoint_if_due(&self) -> DfsResult<bool> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(DfsError::IoError("disk full".to_string()));
            }
            Ok(true)
        }
    }

    #[tokio::test]
    async fn test_worker_polls_executor() {
        for fail in [false, true] {
            let executor = Arc::new(MockExecutor {
                calls: AtomicUsize::new(0),
                fail,
            });
            let handle = CheckpointWorker::spawn(executor.clone(), Duration::from_millis(10));
            sleep(Duration::from_millis(120)).await;
            handle.abort();

            // errors do not stop the worker
            assert!(executor.calls.load(Ordering::SeqCst) >= 2);
        }
    }
}
