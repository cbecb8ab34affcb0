use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use uuid::Uuid;

/// A contract deadline waiting in the queue.
#[derive(Debug, Clone, Copy)]
pub struct DeadlineEntry {
    pub contract_id: Uuid,
    pub deadline: Instant,
}

/// Invoked when a deadline fires.
#[async_trait]
pub trait DeadlineHandler: Send + Sync {
    async fn on_deadline(&self, contract_id: Uuid);
}

/// Deadline queue for contract timeouts: a min-heap drained by a single
/// loop that sleeps until the nearest deadline. Active contracts are never
/// polled; each is visited exactly once, when its deadline passes.
pub struct DeadlineQueue {
    handler: Arc<dyn DeadlineHandler>,
    deadline_rx: mpsc::Receiver<DeadlineEntry>,
    shutdown_rx: watch::Receiver<bool>,
}

impl DeadlineQueue {
    pub fn new(
        handler: Arc<dyn DeadlineHandler>,
        deadline_rx: mpsc::Receiver<DeadlineEntry>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            handler,
            deadline_rx,
            shutdown_rx,
        }
    }

    /// Run until the deadline channel closes or shutdown is signalled.
    pub async fn run(mut self) {
        let mut heap: BinaryHeap<Reverse<(Instant, Uuid)>> = BinaryHeap::new();

        loop {
            let next = heap.peek().map(|Reverse((at, _))| *at);
            tokio::select! {
                received = self.deadline_rx.recv() => {
                    match received {
                        Some(entry) => {
                            heap.push(Reverse((entry.deadline, entry.contract_id)));
                        }
                        None => break,
                    }
                }
                _ = sleep_until_or_forever(next), if next.is_some() => {
                    let now = Instant::now();
                    while heap
                        .peek()
                        .is_some_and(|Reverse((at, _))| *at <= now)
                    {
                        let Reverse((_, contract_id)) =
                            heap.pop().expect("peeked entry exists");
                        self.handler.on_deadline(contract_id).await;
                    }
                }
                changed = self.shutdown_rx.changed() => {
                    if changed.is_err() || *self.shutdown_rx.borrow() {
                        tracing::info!("deadline queue shutting down");
                        break;
                    }
                }
            }
        }
    }
}

async fn sleep_until_or_forever(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::Mutex;

    struct Recorder {
        fired: Mutex<Vec<Uuid>>,
        notify: mpsc::Sender<Uuid>,
    }

    #[async_trait]
    impl DeadlineHandler for Recorder {
        async fn on_deadline(&self, contract_id: Uuid) {
            self.fired.lock().await.push(contract_id);
            let _ = self.notify.send(contract_id).await;
        }
    }

    #[tokio::test]
    async fn test_deadline_fires_in_order() {
        let (deadline_tx, deadline_rx) = mpsc::channel(16);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (notify_tx, mut notify_rx) = mpsc::channel(16);
        let recorder = Arc::new(Recorder {
            fired: Mutex::new(Vec::new()),
            notify: notify_tx,
        });

        let queue = DeadlineQueue::new(recorder.clone(), deadline_rx, shutdown_rx);
        tokio::spawn(queue.run());

        let late = Uuid::new_v4();
        let soon = Uuid::new_v4();
        let now = Instant::now();
        deadline_tx
            .send(DeadlineEntry {
                contract_id: late,
                deadline: now + Duration::from_millis(60),
            })
            .await
            .unwrap();
        deadline_tx
            .send(DeadlineEntry {
                contract_id: soon,
                deadline: now + Duration::from_millis(10),
            })
            .await
            .unwrap();

        let first = notify_rx.recv().await.unwrap();
        let second = notify_rx.recv().await.unwrap();
        assert_eq!(first, soon);
        assert_eq!(second, late);

        let _ = shutdown_tx.send(true);
    }

    #[tokio::test]
    async fn test_shutdown_stops_queue() {
        let (_deadline_tx, deadline_rx) = mpsc::channel(16);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (notify_tx, _notify_rx) = mpsc::channel(16);
        let recorder = Arc::new(Recorder {
            fired: Mutex::new(Vec::new()),
            notify: notify_tx,
        });

        let queue = DeadlineQueue::new(recorder, deadline_rx, shutdown_rx);
        let handle = tokio::spawn(queue.run());
        let _ = shutdown_tx.send(true);

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("queue should stop on shutdown")
            .expect("queue task should not panic");
    }

    #[tokio::test]
    async fn test_channel_close_stops_queue() {
        let (deadline_tx, deadline_rx) = mpsc::channel(16);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let (notify_tx, _notify_rx) = mpsc::channel(16);
        let recorder = Arc::new(Recorder {
            fired: Mutex::new(Vec::new()),
            notify: notify_tx,
        });

        let queue = DeadlineQueue::new(recorder, deadline_rx, shutdown_rx);
        let handle = tokio::spawn(queue.run());
        drop(deadline_tx);

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("queue should stop when the channel closes")
            .expect("queue task should not panic");
    }
}
