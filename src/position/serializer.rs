//! Per-position operation serializer.
//!
//! Every piece of logic that reads-then-writes position state runs as an
//! operation on that position's lane: a FIFO queue with exactly one
//! operation in flight. Lanes for distinct positions run concurrently.
//! Closing a lane cancels queued operations with `PositionError::Gone`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use futures::future::BoxFuture;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::error::PositionError;
use crate::market::types::PositionId;

type Job = BoxFuture<'static, ()>;

struct Lane {
    tx: mpsc::UnboundedSender<Job>,
    cancelled: Arc<AtomicBool>,
}

/// Per-position FIFO operation queues.
#[derive(Default)]
pub struct OpQueue {
    lanes: DashMap<PositionId, Lane>,
}

impl OpQueue {
    /// Create an empty queue set.
    pub fn new() -> Self {
        Self {
            lanes: DashMap::new(),
        }
    }

    /// Open a lane for a position. Idempotent.
    pub fn open(&self, id: PositionId) {
        if self.lanes.contains_key(&id) {
            return;
        }

        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = cancelled.clone();

        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                // Dropping a queued job resolves its caller with Gone.
                if flag.load(Ordering::SeqCst) {
                    continue;
                }
                job.await;
            }
        });

        self.lanes.insert(id, Lane { tx, cancelled });
    }

    /// Run an operation on a position's lane, awaiting its result.
    ///
    /// Returns `PositionError::Gone` when the lane is closed before the
    /// operation gets to run.
    pub async fn run<T, F>(&self, id: PositionId, op: F) -> Result<T, PositionError>
    where
        T: Send + 'static,
        F: std::future::Future<Output = T> + Send + 'static,
    {
        let (done_tx, done_rx) = oneshot::channel();
        let job: Job = Box::pin(async move {
            let _ = done_tx.send(op.await);
        });

        {
            let lane = self.lanes.get(&id).ok_or(PositionError::Gone)?;
            lane.tx.send(job).map_err(|_| PositionError::Gone)?;
        }

        done_rx.await.map_err(|_| PositionError::Gone)
    }

    /// Enqueue an operation without awaiting it (event dispatch path).
    ///
    /// Silently drops the operation when the lane no longer exists.
    pub fn submit<F>(&self, id: PositionId, op: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        if let Some(lane) = self.lanes.get(&id) {
            let _ = lane.tx.send(Box::pin(op));
        } else {
            debug!(position = id, "dropping op for closed lane");
        }
    }

    /// Close a lane: the in-flight operation finishes, queued ones are
    /// cancelled with `PositionGone`.
    pub fn close(&self, id: PositionId) {
        if let Some((_, lane)) = self.lanes.remove(&id) {
            lane.cancelled.store(true, Ordering::SeqCst);
        }
    }

    /// Close every lane (process shutdown).
    pub fn close_all(&self) {
        let ids: Vec<PositionId> = self.lanes.iter().map(|e| *e.key()).collect();
        for id in ids {
            self.close(id);
        }
    }

    /// Whether a lane is open.
    pub fn is_open(&self, id: PositionId) -> bool {
        self.lanes.contains_key(&id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    #[tokio::test]
    async fn ops_run_in_submission_order() {
        let queue = OpQueue::new();
        queue.open(1);

        let log = Arc::new(Mutex::new(Vec::new()));
        for i in 0u64..10 {
            let log = log.clone();
            queue.submit(1, async move {
                // Vary op duration so reordering would show up.
                tokio::time::sleep(Duration::from_millis(10 - i)).await;
                log.lock().unwrap().push(i);
            });
        }

        // Barrier op: everything submitted before it has run.
        queue.run(1, async {}).await.unwrap();
        assert_eq!(*log.lock().unwrap(), (0..10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn one_in_flight_even_when_fired_and_forgotten() {
        let queue = OpQueue::new();
        queue.open(1);

        let in_flight = Arc::new(AtomicBool::new(false));
        let violated = Arc::new(AtomicBool::new(false));

        for _ in 0..20 {
            let in_flight = in_flight.clone();
            let violated = violated.clone();
            queue.submit(1, async move {
                if in_flight.swap(true, Ordering::SeqCst) {
                    violated.store(true, Ordering::SeqCst);
                }
                tokio::time::sleep(Duration::from_millis(1)).await;
                in_flight.store(false, Ordering::SeqCst);
            });
        }

        // Barrier op: everything before it has run.
        queue.run(1, async {}).await.unwrap();
        assert!(!violated.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn distinct_positions_run_concurrently(){
        let queue = Arc::new(OpQueue::new());
        queue.open(1);
        queue.open(2);

        let (tx, rx) = oneshot::channel::<()>();

        // Lane 1 blocks until lane 2 releases it; only possible if the
        // lanes actually run concurrently.
        let q = queue.clone();
        let blocked = tokio::spawn(async move {
            q.run(1, async move {
                rx.await.unwrap();
            })
            .await
        });

        queue
            .run(2, async move {
                let _ = tx.send(());
            })
            .await
            .unwrap();

        tokio::time::timeout(Duration::from_secs(1), blocked)
            .await
            .expect("lane 1 should unblock")
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn close_cancels_queued_ops_with_gone() {
        let queue = Arc::new(OpQueue::new());
        queue.open(1);

        // Occupy the lane.
        let (hold_tx, hold_rx) = oneshot::channel::<()>();
        queue.submit(1, async move {
            let _ = hold_rx.await;
        });

        // Queue an op behind it, then close the lane.
        let q = queue.clone();
        let queued = tokio::spawn(async move { q.run(1, async { 42 }).await });
        tokio::time::sleep(Duration::from_millis(10)).await;

        queue.close(1);
        let _ = hold_tx.send(());

        assert_eq!(queued.await.unwrap(), Err(PositionError::Gone));
        assert!(!queue.is_open(1));
    }

    #[tokio::test]
    async fn run_on_missing_lane_is_gone() {
        let queue = OpQueue::new();
        assert_eq!(queue.run(7, async {}).await, Err(PositionError::Gone));
    }
}
