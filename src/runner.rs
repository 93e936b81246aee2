use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tracing::warn;

type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Fixed-size pool of worker tasks draining a shared job queue.
///
/// Submission always succeeds — when all workers are busy, jobs queue.
/// Jobs are independent and unordered, run to completion, and never report
/// back to the submitter; anything a job needs to surface it writes into
/// shared state itself.
pub struct JobRunner;

#[derive(Clone)]
pub struct JobHandle {
    tx: mpsc::UnboundedSender<Job>,
}

impl JobRunner {
    pub fn spawn(workers: usize) -> JobHandle {
        let (tx, rx) = mpsc::unbounded_channel::<Job>();
        let rx = Arc::new(Mutex::new(rx));
        for _ in 0..workers {
            let rx = Arc::clone(&rx);
            tokio::spawn(async move {
                loop {
                    // Hold the receiver lock only across recv, not the job.
                    let job = rx.lock().await.recv().await;
                    match job {
                        Some(job) => job.await,
                        None => break,
                    }
                }
            });
        }
        JobHandle { tx }
    }
}

impl JobHandle {
    pub fn submit<F>(&self, job: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.tx.send(Box::pin(job)).is_err() {
            warn!("Job runner has shut down; background job dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Notify;

    #[tokio::test(flavor = "multi_thread")]
    async fn submitted_jobs_all_run() {
        let handle = JobRunner::spawn(3);
        let counter = Arc::new(AtomicUsize::new(0));
        let done = Arc::new(Notify::new());

        for _ in 0..20 {
            let counter = Arc::clone(&counter);
            let done = Arc::clone(&done);
            handle.submit(async move {
                if counter.fetch_add(1, Ordering::SeqCst) + 1 == 20 {
                    done.notify_one();
                }
            });
        }

        tokio::time::timeout(Duration::from_secs(5), done.notified())
            .await
            .expect("jobs did not finish in time");
        assert_eq!(counter.load(Ordering::SeqCst), 20);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn submission_succeeds_while_workers_are_busy() {
        let handle = JobRunner::spawn(1);
        let gate = Arc::new(Notify::new());
        let ran = Arc::new(AtomicUsize::new(0));

        // Park the only worker.
        let g = Arc::clone(&gate);
        handle.submit(async move { g.notified().await });

        // Queueing more jobs must not fail or block.
        for _ in 0..5 {
            let ran = Arc::clone(&ran);
            handle.submit(async move {
                ran.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(ran.load(Ordering::SeqCst), 0);

        gate.notify_one();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(ran.load(Ordering::SeqCst), 5);
    }
}
