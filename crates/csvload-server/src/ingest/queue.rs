//! Bounded job queue between the row source and the worker pool
//!
//! Single producer, many consumers, FIFO. With capacity 0 the queue is a rendezvous:
//! `submit` returns only once a worker has taken the job.

use thiserror::Error;
use tokio::sync::oneshot;

use super::source::Row;

#[derive(Error, Debug)]
#[error("job queue is closed")]
pub struct QueueClosed(pub Row);

struct Envelope {
    row: Row,
    ack: Option<oneshot::Sender<()>>,
}

pub struct JobQueue;

impl JobQueue {
    pub fn bounded(capacity: usize) -> (JobSender, JobReceiver) {
        let rendezvous = capacity == 0;
        let (tx, rx) = async_channel::bounded(capacity.max(1));
        (JobSender { tx, rendezvous }, JobReceiver { rx })
    }
}

/// Producer half. Closing consumes it, so the queue is closed at most once.
pub struct JobSender {
    tx: async_channel::Sender<Envelope>,
    rendezvous: bool,
}

impl JobSender {
    /// Hand a job to the pool, suspending while the queue is full.
    ///
    /// Dropping a pending rendezvous submit leaves the job queued.
    pub async fn submit(&self, row: Row) -> Result<(), QueueClosed> {
        if !self.rendezvous {
            return self
                .tx
                .send(Envelope { row, ack: None })
                .await
                .map_err(|e| QueueClosed(e.into_inner().row));
        }

        let (ack, received) = oneshot::channel();
        let line = row.line;
        self.tx
            .send(Envelope {
                row,
                ack: Some(ack),
            })
            .await
            .map_err(|e| QueueClosed(e.into_inner().row))?;

        // the envelope was dropped unread when every consumer went away
        received
            .await
            .map_err(|_| QueueClosed(Row::new(line, Vec::new())))
    }

    /// Jobs already queued stay receivable after close.
    pub fn close(self) {
        self.tx.close();
    }

    pub fn len(&self) -> usize {
        self.tx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }
}

/// Consumer half, cloned once per worker
#[derive(Clone)]
pub struct JobReceiver {
    rx: async_channel::Receiver<Envelope>,
}

impl JobReceiver {
    /// Next job, or `None` once the queue is closed and drained.
    pub async fn recv(&self) -> Option<Row> {
        let envelope = self.rx.recv().await.ok()?;
        if let Some(ack) = envelope.ack {
            let _ = ack.send(());
        }
        Some(envelope.row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::time::Duration;

    fn row(n: u64) -> Row {
        Row::new(n, vec![n.to_string()])
    }

    #[tokio::test]
    async fn test_fifo_single_consumer() {
        let (tx, rx) = JobQueue::bounded(8);
        for n in 0..5 {
            tx.submit(row(n)).await.unwrap();
        }
        tx.close();

        let mut seen = Vec::new();
        while let Some(r) = rx.recv().await {
            seen.push(r.line);
        }
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_rendezvous_blocks_until_received() {
        let (tx, rx) = JobQueue::bounded(0);

        let producer = tokio::spawn(async move { tx.submit(row(1)).await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!producer.is_finished(), "submit must wait for a consumer");

        assert_eq!(rx.recv().await.map(|r| r.line), Some(1));
        producer.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_bounded_blocks_when_full() {
        let (tx, rx) = JobQueue::bounded(2);
        tx.submit(row(1)).await.unwrap();
        tx.submit(row(2)).await.unwrap();
        assert_eq!(tx.len(), 2);

        let blocked = tokio::time::timeout(Duration::from_millis(50), tx.submit(row(3))).await;
        assert!(blocked.is_err());

        assert_eq!(rx.recv().await.map(|r| r.line), Some(1));
        tx.submit(row(4)).await.unwrap();
    }

    #[tokio::test]
    async fn test_rendezvous_never_loses_jobs() {
        let (tx, rx) = JobQueue::bounded(0);
        let mut consumers = Vec::new();
        for _ in 0..4 {
            let rx = rx.clone();
            consumers.push(tokio::spawn(async move {
                let mut got = Vec::new();
                while let Some(r) = rx.recv().await {
                    got.push(r.line);
                }
                got
            }));
        }
        drop(rx);

        for n in 0..500 {
            tx.submit(row(n)).await.unwrap();
        }
        tx.close();

        let mut all = Vec::new();
        for c in consumers {
            all.extend(c.await.unwrap());
        }
        assert_eq!(all.len(), 500);
        let unique: HashSet<u64> = all.into_iter().collect();
        assert_eq!(unique.len(), 500);
    }

    #[tokio::test]
    async fn test_submit_fails_without_consumers() {
        let (tx, rx) = JobQueue::bounded(1);
        drop(rx);
        let err = tx.submit(row(9)).await.unwrap_err();
        assert_eq!(err.0.line, 9);
    }
}
