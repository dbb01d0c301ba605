//! Bounded worker pool with queue-wait/run-time latency buckets
//! (C6), per spec.md §4.6 "Request lifecycle" / §5.
//!
//! Every dispatched command runs as one `WorkerTask`: enqueue time is
//! recorded at submission, dequeue time when a worker picks it up, and
//! end time when the handler future resolves. Both `queue_wait` and
//! `run_time` are bucketed into `{0-1, 1-10, 10-100, 100-1000, >1000}`
//! ms counters, matching the original's fixed bucket boundaries.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{mpsc, oneshot, Semaphore};

type BoxFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Five fixed buckets: `<1ms`, `1-10ms`, `10-100ms`, `100-1000ms`, `>1000ms`.
#[derive(Default)]
pub struct LatencyHistogram {
    buckets: [AtomicU64; 5],
}

impl LatencyHistogram {
    fn bucket_index(millis: u128) -> usize {
        match millis {
            0 => 0,
            1..=9 => 1,
            10..=99 => 2,
            100..=999 => 3,
            _ => 4,
        }
    }

    pub fn record(&self, duration: std::time::Duration) {
        let idx = Self::bucket_index(duration.as_millis());
        self.buckets[idx].fetch_add(1, Ordering::Relaxed);
    }

    /// `(0-1, 1-10, 10-100, 100-1000, >1000)` counts, for `?command=stats`.
    pub fn snapshot(&self) -> [u64; 5] {
        let mut out = [0u64; 5];
        for (i, b) in self.buckets.iter().enumerate() {
            out[i] = b.load(Ordering::Relaxed);
        }
        out
    }
}

struct Task {
    enqueued_at: Instant,
    /// Runs the handler and ships its result out through whatever
    /// channel the caller's `submit` closure captured; the pool
    /// itself stays result-type-agnostic.
    work: BoxFuture,
}

/// A fixed-size pool of tasks draining a bounded MPSC queue. Submission
/// is non-blocking up to `worker_queue_size`; beyond that, `submit`
/// returns `Err` so the caller can answer with a 503 rather than block
/// the HTTP accept loop.
pub struct WorkerPool {
    tx: mpsc::Sender<Task>,
    pub queue_wait: Arc<LatencyHistogram>,
    pub run_time: Arc<LatencyHistogram>,
}

impl WorkerPool {
    pub fn new(num_workers: usize, queue_size: usize) -> Arc<Self> {
        let (tx, rx) = mpsc::channel(queue_size.max(1));
        let queue_wait = Arc::new(LatencyHistogram::default());
        let run_time = Arc::new(LatencyHistogram::default());

        let pool = Arc::new(Self {
            tx,
            queue_wait: queue_wait.clone(),
            run_time: run_time.clone(),
        });

        let shared_rx = Arc::new(tokio::sync::Mutex::new(rx));
        let semaphore = Arc::new(Semaphore::new(num_workers.max(1)));
        for _ in 0..num_workers.max(1) {
            let rx = shared_rx.clone();
            let queue_wait = queue_wait.clone();
            let run_time = run_time.clone();
            let semaphore = semaphore.clone();
            tokio::spawn(async move {
                loop {
                    let task = { rx.lock().await.recv().await };
                    let Some(task) = task else { return };
                    let _permit = semaphore.acquire().await;
                    queue_wait.record(task.enqueued_at.elapsed());
                    let run_started = Instant::now();
                    task.work.await;
                    run_time.record(run_started.elapsed());
                }
            });
        }

        pool
    }

    /// Enqueues `work` and awaits its result. Returns `Err(())` if the
    /// bounded queue is full (the caller should answer 503) or if the
    /// worker that picked up the task was dropped before finishing.
    pub async fn submit<F, R>(&self, work: F) -> Result<R, ()>
    where
        F: Future<Output = R> + Send + 'static,
        R: Send + 'static,
    {
        let (result_tx, result_rx) = oneshot::channel();
        let wrapped: BoxFuture = Box::pin(async move {
            let result = work.await;
            let _ = result_tx.send(result);
        });
        let task = Task {
            enqueued_at: Instant::now(),
            work: wrapped,
        };
        self.tx.try_send(task).map_err(|_| ())?;
        result_rx.await.map_err(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_boundaries() {
        assert_eq!(LatencyHistogram::bucket_index(0), 0);
        assert_eq!(LatencyHistogram::bucket_index(5), 1);
        assert_eq!(LatencyHistogram::bucket_index(50), 2);
        assert_eq!(LatencyHistogram::bucket_index(500), 3);
        assert_eq!(LatencyHistogram::bucket_index(5000), 4);
    }

    #[tokio::test]
    async fn submit_runs_work_and_records_histograms() {
        let pool = WorkerPool::new(2, 8);
        let result = pool.submit(async move { 42 }).await.unwrap();
        assert_eq!(result, 42);
        assert_eq!(pool.run_time.snapshot().iter().sum::<u64>(), 1);
    }
}
