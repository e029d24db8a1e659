//! Serialized, priority-ordered admission gate for store writes.
//!
//! The store offers no nested-transaction or dependency-graph primitive, so
//! dependent writes (an event before its signups) are serialized here: at
//! most one operation runs against the store at a time, and pending
//! operations are admitted in non-decreasing priority order, FIFO within a
//! tier. An operation failure propagates to its caller through the reply
//! channel and never stalls the queue.
//!
//! Constructed once per process and cloned into every resolver; there is no
//! process-wide singleton.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::future::Future;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::types::{Result, SyncError};

/// Event-level writes: the event row and its nested shifts/location.
pub const PRIORITY_EVENT: u8 = 1;
/// Signup-level writes: signups and their people. Admitted only after any
/// pending event-level writes.
pub const PRIORITY_SIGNUP: u8 = 2;

struct Job {
    priority: u8,
    seq: u64,
    run: Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>,
}

impl PartialEq for Job {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for Job {}

impl PartialOrd for Job {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Job {
    // BinaryHeap is a max-heap; invert so the smallest (priority, seq)
    // pops first.
    fn cmp(&self, other: &Self) -> Ordering {
        (other.priority, other.seq).cmp(&(self.priority, self.seq))
    }
}

/// Handle to the single write lane. Cheap to clone.
#[derive(Clone)]
pub struct WriteScheduler {
    submit_tx: mpsc::UnboundedSender<Job>,
}

impl Default for WriteScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl WriteScheduler {
    /// Create a scheduler and spawn its worker task.
    pub fn new() -> Self {
        let (submit_tx, submit_rx) = mpsc::unbounded_channel();
        tokio::spawn(run_worker(submit_rx));
        Self { submit_tx }
    }

    /// Admit `op` at `priority` and wait for its result.
    ///
    /// Lower priority values are admitted first; ties are FIFO. Once
    /// admitted the operation runs to completion even if this future is
    /// dropped.
    pub async fn schedule<T, F, Fut>(&self, priority: u8, op: F) -> Result<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let (done_tx, done_rx) = oneshot::channel();

        let job = Job {
            priority,
            seq: 0, // assigned by the worker in arrival order
            run: Box::new(move || {
                async move {
                    let _ = done_tx.send(op().await);
                }
                .boxed()
            }),
        };

        self.submit_tx
            .send(job)
            .map_err(|_| SyncError::SchedulerClosed)?;

        done_rx.await.map_err(|_| SyncError::SchedulerClosed)?
    }
}

async fn run_worker(mut submit_rx: mpsc::UnboundedReceiver<Job>) {
    let mut pending: BinaryHeap<Job> = BinaryHeap::new();
    let mut next_seq: u64 = 0;

    loop {
        // Drain everything already submitted so priorities compete before
        // the next admission.
        loop {
            match submit_rx.try_recv() {
                Ok(mut job) => {
                    job.seq = next_seq;
                    next_seq += 1;
                    pending.push(job);
                }
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    if pending.is_empty() {
                        return;
                    }
                    break;
                }
            }
        }

        let job = match pending.pop() {
            Some(job) => job,
            None => match submit_rx.recv().await {
                Some(mut job) => {
                    job.seq = next_seq;
                    next_seq += 1;
                    job
                }
                None => return,
            },
        };

        debug!(priority = job.priority, seq = job.seq, "admitting write");
        (job.run)().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::sync::Mutex;

    /// Block the lane with a gate job, queue more jobs behind it, then open
    /// the gate and observe admission order.
    async fn admission_order(jobs: Vec<(u8, &'static str)>) -> Vec<&'static str> {
        let scheduler = WriteScheduler::new();
        let order: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));

        let (gate_tx, gate_rx) = oneshot::channel::<()>();
        let gate = tokio::spawn({
            let scheduler = scheduler.clone();
            async move {
                scheduler
                    .schedule(0, move || async move {
                        let _ = gate_rx.await;
                        Ok(())
                    })
                    .await
            }
        });
        // Let the worker pick up the gate before queueing the rest.
        tokio::task::yield_now().await;

        let mut handles = Vec::new();
        for (priority, label) in jobs {
            let scheduler = scheduler.clone();
            let order = order.clone();
            handles.push(tokio::spawn(async move {
                scheduler
                    .schedule(priority, move || async move {
                        order.lock().await.push(label);
                        Ok(())
                    })
                    .await
            }));
            // Serialize submissions so FIFO sequence numbers are deterministic.
            tokio::task::yield_now().await;
        }

        let _ = gate_tx.send(());
        gate.await.unwrap().unwrap();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let order = order.lock().await;
        order.clone()
    }

    #[tokio::test]
    async fn lower_priority_value_admitted_first() {
        let order = admission_order(vec![(2, "signup"), (1, "event")]).await;
        assert_eq!(order, vec!["event", "signup"]);
    }

    #[tokio::test]
    async fn ties_are_fifo() {
        let order = admission_order(vec![(1, "a"), (1, "b"), (1, "c")]).await;
        assert_eq!(order, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn mixed_tiers_interleave_by_priority_then_arrival() {
        let order =
            admission_order(vec![(2, "s1"), (1, "e1"), (2, "s2"), (1, "e2")]).await;
        assert_eq!(order, vec!["e1", "e2", "s1", "s2"]);
    }

    #[tokio::test]
    async fn failure_propagates_without_stalling_the_queue() {
        let scheduler = WriteScheduler::new();

        let failed: Result<()> = scheduler
            .schedule(1, || async {
                Err(SyncError::MissingShift {
                    event_external_id: 42,
                })
            })
            .await;
        assert!(matches!(
            failed,
            Err(SyncError::MissingShift {
                event_external_id: 42
            })
        ));

        let ok = scheduler.schedule(2, || async { Ok(7) }).await.unwrap();
        assert_eq!(ok, 7);
    }

    #[tokio::test]
    async fn default_construction_yields_a_working_lane() {
        let scheduler = WriteScheduler::default();
        let value = scheduler.schedule(1, || async { Ok(1) }).await.unwrap();
        assert_eq!(value, 1);
    }

    #[tokio::test]
    async fn result_value_returned_to_caller() {
        let scheduler = WriteScheduler::new();
        let value = scheduler
            .schedule(1, || async { Ok("created".to_string()) })
            .await
            .unwrap();
        assert_eq!(value, "created");
    }
}
