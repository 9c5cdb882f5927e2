//! # Worker Pool
//! Bounded-concurrency execution for fetch work so the scheduling loop is
//! never blocked on slow network I/O. A fixed number of workers drain one
//! FIFO queue; submissions beyond capacity wait their turn rather than
//! being rejected. Shutdown lets queued work finish, within a grace period.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use tokio::sync::{mpsc, oneshot, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

#[derive(Default)]
struct InFlight {
    count: AtomicUsize,
    idle: Notify,
}

impl InFlight {
    fn enter(&self) {
        self.count.fetch_add(1, Ordering::AcqRel);
    }

    fn leave(&self) {
        if self.count.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.idle.notify_waiters();
        }
    }
}

pub struct WorkerPool {
    tx: std::sync::Mutex<Option<mpsc::UnboundedSender<Job>>>,
    workers: tokio::sync::Mutex<Vec<JoinHandle<()>>>,
    in_flight: Arc<InFlight>,
}

impl WorkerPool {
    pub fn new(worker_count: usize) -> Self {
        let worker_count = worker_count.max(1);
        let (tx, rx) = mpsc::unbounded_channel::<Job>();
        let rx = Arc::new(tokio::sync::Mutex::new(rx));

        let mut workers = Vec::with_capacity(worker_count);
        for id in 0..worker_count {
            let rx = rx.clone();
            workers.push(tokio::spawn(async move {
                loop {
                    // Lock only to pop; run the job with the queue released.
                    let job = { rx.lock().await.recv().await };
                    match job {
                        Some(job) => job.await,
                        None => break,
                    }
                }
                debug!(worker = id, "fetch worker exiting");
            }));
        }

        Self {
            tx: std::sync::Mutex::new(Some(tx)),
            workers: tokio::sync::Mutex::new(workers),
            in_flight: Arc::new(InFlight::default()),
        }
    }

    /// Queue a task and get a receiver for its result. The receiver can be
    /// dropped for fire-and-forget dispatch; the task still runs.
    pub fn submit<F, T>(&self, fut: F) -> Result<oneshot::Receiver<T>>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (result_tx, result_rx) = oneshot::channel();
        let in_flight = self.in_flight.clone();
        in_flight.enter();

        let job: Job = Box::pin(async move {
            let out = fut.await;
            // Caller may have dropped the receiver; that's fine.
            let _ = result_tx.send(out);
            in_flight.leave();
        });

        let tx = self.tx.lock().expect("pool lock poisoned");
        let sent = match tx.as_ref() {
            Some(tx) => tx.send(job).is_ok(),
            None => false,
        };
        if sent {
            Ok(result_rx)
        } else {
            self.in_flight.leave();
            Err(anyhow!("worker pool is shut down"))
        }
    }

    /// Wait until nothing is queued or running.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.in_flight.idle.notified();
            if self.in_flight.count.load(Ordering::Acquire) == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Close the queue and join workers, letting queued work finish within
    /// `grace`. Idempotent.
    pub async fn shutdown(&self, grace: Duration) {
        {
            let mut tx = self.tx.lock().expect("pool lock poisoned");
            tx.take();
        }
        let mut workers = self.workers.lock().await;
        for handle in workers.drain(..) {
            if tokio::time::timeout(grace, handle).await.is_err() {
                warn!("fetch worker did not finish within grace period");
            }
        }
    }
}
