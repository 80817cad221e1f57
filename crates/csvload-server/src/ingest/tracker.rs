//! Completion tracker: counts jobs submitted but not yet finished

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tokio::sync::Notify;

#[derive(Debug, Default)]
pub struct CompletionTracker {
    outstanding: AtomicUsize,
    completed: AtomicU64,
    drained: Notify,
}

impl CompletionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a job. Call before handing it to the queue.
    pub fn submit(&self) {
        self.outstanding.fetch_add(1, Ordering::AcqRel);
    }

    /// Mark one job finished. Returns `false`, without changing anything, when
    /// nothing is outstanding.
    pub fn complete(&self) -> bool {
        let previous = self
            .outstanding
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));

        match previous {
            Ok(previous) => {
                self.completed.fetch_add(1, Ordering::AcqRel);
                if previous == 1 {
                    self.drained.notify_waiters();
                }
                true
            },
            Err(_) => {
                tracing::error!("completion tracker decremented below zero");
                false
            },
        }
    }

    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Acquire)
    }

    /// Total decrements since creation
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Acquire)
    }

    /// Resolve once no job is outstanding.
    pub async fn wait_drained(&self) {
        loop {
            let notified = self.drained.notified();
            tokio::pin!(notified);
            // register before checking so a concurrent final `complete` is not missed
            notified.as_mut().enable();

            if self.outstanding() == 0 {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_counts() {
        let tracker = CompletionTracker::new();
        tracker.submit();
        tracker.submit();
        assert_eq!(tracker.outstanding(), 2);

        assert!(tracker.complete());
        assert_eq!(tracker.outstanding(), 1);
        assert_eq!(tracker.completed(), 1);
    }

    #[test]
    fn test_never_negative() {
        let tracker = CompletionTracker::new();
        assert!(!tracker.complete());
        assert_eq!(tracker.outstanding(), 0);
        assert_eq!(tracker.completed(), 0);
    }

    #[tokio::test]
    async fn test_wait_drained_when_idle() {
        let tracker = CompletionTracker::new();
        tokio::time::timeout(Duration::from_millis(100), tracker.wait_drained())
            .await
            .expect("idle tracker is already drained");
    }

    #[tokio::test]
    async fn test_wait_drained_across_tasks() {
        let tracker = Arc::new(CompletionTracker::new());
        for _ in 0..100 {
            tracker.submit();
        }

        let mut handles = Vec::new();
        for _ in 0..10 {
            let tracker = tracker.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..10 {
                    tokio::task::yield_now().await;
                    tracker.complete();
                }
            }));
        }

        tokio::time::timeout(Duration::from_secs(5), tracker.wait_drained())
            .await
            .expect("tracker should drain");
        assert_eq!(tracker.completed(), 100);
        for h in handles {
            h.await.unwrap();
        }
    }
}
