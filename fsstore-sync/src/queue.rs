//! Write queue (§4.6): a single-consumer FIFO that serializes every mutation
//! - whether it originated from an API call or from an inbound sync
//! subscription - across every entity set in a provider. Callers never touch
//! an `Index` directly once a provider is running; they send a closure
//! through [`WriteQueue::enqueue`] and await the result, which only resolves
//! once the closure has actually run on the queue's single worker task.
//!
//! This is the classic mailbox/actor shape: an mpsc channel feeds jobs to one
//! task, each job pairs its closure with a oneshot sender for the reply.

use std::future::Future;
use std::pin::Pin;

use tokio::sync::{mpsc, oneshot};

type Job = Box<dyn FnOnce() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send>;

#[derive(Clone)]
pub struct WriteQueue {
    sender: mpsc::UnboundedSender<Job>,
}

impl WriteQueue {
    /// Spawn the worker task and return a handle. The worker runs until
    /// every clone of the returned handle is dropped.
    pub fn spawn() -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel::<Job>();

        tokio::spawn(async move {
            while let Some(job) = receiver.recv().await {
                job().await;
            }
        });

        Self { sender }
    }

    /// Enqueue a unit of work and await its result. The future `f` produces
    /// is run to completion on the queue's worker before the next job is
    /// dequeued, which is what gives every caller a consistent,
    /// serialized view of mutations (§4.6).
    pub async fn enqueue<F, Fut, T>(&self, f: F) -> T
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let job: Job = Box::new(move || {
            Box::pin(async move {
                let result = f().await;
                let _ = reply_tx.send(result);
            })
        });

        if self.sender.send(job).is_err() {
            panic!("write queue worker task has stopped");
        }

        reply_rx.await.expect("write queue worker dropped the reply channel")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn enqueued_jobs_run_in_order() {
        let queue = WriteQueue::spawn();
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for i in 0..10 {
            let queue = queue.clone();
            let order = order.clone();
            handles.push(tokio::spawn(async move {
                queue
                    .enqueue(move || {
                        let order = order.clone();
                        async move {
                            order.lock().push(i);
                        }
                    })
                    .await;
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        // FIFO delivery from each spawned task is not guaranteed relative to
        // the others, but every job must have run exactly once.
        let recorded = order.lock();
        let mut sorted = recorded.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn enqueue_returns_the_closures_result() {
        let queue = WriteQueue::spawn();
        let counter = Arc::new(AtomicUsize::new(0));
        let counter2 = counter.clone();
        let result = queue
            .enqueue(move || async move {
                counter2.fetch_add(1, Ordering::SeqCst);
                42
            })
            .await;
        assert_eq!(result, 42);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
