//! Fixed set of worker threads running calculation tasks from a bounded FIFO queue.
//!
//! Each worker owns nothing between jobs: every request gets a fresh engine from the
//! factory and disposes it before the reply is sent. A panic inside a task is caught at the
//! job boundary and reported as an internal failure, so the worker keeps serving.

use crate::config::{Limits, PoolConfig};
use crate::engine::EngineFactory;
use crate::error::PoolError;
use crate::outcome::{CalculationOutcome, Failure};
use crate::request::CalculationRequest;
use crate::task::run_calculation;
use crossbeam_channel::{Receiver, Sender, TrySendError, bounded, unbounded};
use parking_lot::Mutex;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

struct Job {
    request: CalculationRequest,
    reply: Sender<CalculationOutcome>,
    enqueued: Instant,
}

#[derive(Default)]
struct Counters {
    live: AtomicUsize,
    in_flight: AtomicUsize,
    completed: AtomicU64,
    panicked: AtomicU64,
}

/// Handle to a submitted request.
#[must_use = "the outcome is only observable through `wait`"]
pub struct PendingOutcome {
    reply: Receiver<CalculationOutcome>,
}

impl PendingOutcome {
    /// Block until the worker replies.
    pub fn wait(self) -> Result<CalculationOutcome, PoolError> {
        self.reply.recv().map_err(|_| PoolError::WorkerLost)
    }

    pub fn wait_timeout(&self, timeout: Duration) -> Option<CalculationOutcome> {
        self.reply.recv_timeout(timeout).ok()
    }
}

/// Point-in-time view of the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    pub workers: usize,
    pub live_workers: usize,
    pub queued: usize,
    pub in_flight: usize,
    pub completed: u64,
    pub panicked: u64,
}

/// What [`ExecutionPool::drain`] managed to finish before returning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    pub completed: u64,
    pub workers_joined: usize,
    /// Jobs still queued or running when the shutdown timeout elapsed.
    pub unfinished: usize,
    pub timed_out: bool,
}

pub struct ExecutionPool {
    config: PoolConfig,
    jobs: Mutex<Option<Sender<Job>>>,
    queue: Receiver<Job>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    exits: Receiver<usize>,
    counters: Arc<Counters>,
    started: Instant,
}

impl ExecutionPool {
    /// Spawn `config.workers` threads, each building engines through `factory`.
    pub fn start<F>(config: PoolConfig, factory: F) -> Result<Self, PoolError>
    where
        F: EngineFactory + Send + Sync + 'static,
    {
        let workers = config.workers.max(1);
        let (job_tx, job_rx) = bounded::<Job>(config.queue_capacity.max(1));
        let (exit_tx, exit_rx) = unbounded::<usize>();
        let factory = Arc::new(factory);
        let counters = Arc::new(Counters::default());

        let mut handles = Vec::with_capacity(workers);
        for id in 0..workers {
            let jobs = job_rx.clone();
            let factory = Arc::clone(&factory);
            let limits = config.limits.clone();
            let counters_for_worker = Arc::clone(&counters);
            let exit = exit_tx.clone();
            counters.live.fetch_add(1, Ordering::SeqCst);
            let spawned = thread::Builder::new()
                .name(format!("calc-worker-{id}"))
                .spawn(move || {
                    let _exit = ExitSignal {
                        id,
                        counters: Arc::clone(&counters_for_worker),
                        exit,
                    };
                    worker_loop(id, jobs, factory.as_ref(), &limits, &counters_for_worker);
                });
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(err) => {
                    counters.live.fetch_sub(1, Ordering::SeqCst);
                    // Dropping the sender lets already spawned workers exit.
                    drop(job_tx);
                    return Err(PoolError::Spawn(err.to_string()));
                }
            }
        }

        tracing::info!(
            workers,
            queue_capacity = config.queue_capacity,
            max_total_cells = config.limits.max_total_cells,
            "execution pool started"
        );
        Ok(Self {
            config,
            jobs: Mutex::new(Some(job_tx)),
            queue: job_rx,
            handles: Mutex::new(handles),
            exits: exit_rx,
            counters,
            started: Instant::now(),
        })
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn worker_count(&self) -> usize {
        self.config.workers.max(1)
    }

    pub fn live_workers(&self) -> usize {
        self.counters.live.load(Ordering::SeqCst)
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn in_flight(&self) -> usize {
        self.counters.in_flight.load(Ordering::SeqCst)
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn status(&self) -> PoolStatus {
        PoolStatus {
            workers: self.worker_count(),
            live_workers: self.live_workers(),
            queued: self.queued(),
            in_flight: self.in_flight(),
            completed: self.counters.completed.load(Ordering::SeqCst),
            panicked: self.counters.panicked.load(Ordering::SeqCst),
        }
    }

    fn sender(&self) -> Result<Sender<Job>, PoolError> {
        self.jobs.lock().clone().ok_or(PoolError::Draining)
    }

    fn job(request: CalculationRequest) -> (Job, PendingOutcome) {
        let (reply, rx) = bounded(1);
        let job = Job {
            request,
            reply,
            enqueued: Instant::now(),
        };
        (job, PendingOutcome { reply: rx })
    }

    /// Queue a request, blocking while the queue is full.
    pub fn submit(&self, request: CalculationRequest) -> Result<PendingOutcome, PoolError> {
        let sender = self.sender()?;
        let (job, pending) = Self::job(request);
        sender.send(job).map_err(|_| PoolError::Draining)?;
        Ok(pending)
    }

    /// Queue a request, failing with [`PoolError::Busy`] instead of blocking.
    pub fn try_submit(&self, request: CalculationRequest) -> Result<PendingOutcome, PoolError> {
        let sender = self.sender()?;
        let (job, pending) = Self::job(request);
        match sender.try_send(job) {
            Ok(()) => Ok(pending),
            Err(TrySendError::Full(_)) => Err(PoolError::Busy),
            Err(TrySendError::Disconnected(_)) => Err(PoolError::Draining),
        }
    }

    /// Submit and wait for the outcome.
    pub fn run(&self, request: CalculationRequest) -> Result<CalculationOutcome, PoolError> {
        self.submit(request)?.wait()
    }

    /// Stop accepting work, let queued and running tasks finish, and join the workers.
    ///
    /// Waits at most `shutdown_timeout`; workers still busy after that are left to finish
    /// on their own and are not joined.
    pub fn drain(&self) -> DrainReport {
        drop(self.jobs.lock().take());
        let handles = std::mem::take(&mut *self.handles.lock());
        let deadline = Instant::now() + self.config.shutdown_timeout;
        tracing::info!(
            queued = self.queued(),
            in_flight = self.in_flight(),
            "draining execution pool"
        );

        let mut exited = 0;
        let mut timed_out = false;
        while exited < handles.len() {
            match self.exits.recv_deadline(deadline) {
                Ok(_) => exited += 1,
                Err(_) => {
                    timed_out = true;
                    break;
                }
            }
        }

        let mut workers_joined = 0;
        for handle in handles {
            if !timed_out || handle.is_finished() {
                if handle.join().is_err() {
                    tracing::warn!("worker thread terminated by panic");
                }
                workers_joined += 1;
            }
        }

        let report = DrainReport {
            completed: self.counters.completed.load(Ordering::SeqCst),
            workers_joined,
            unfinished: self.queued() + self.in_flight(),
            timed_out,
        };
        if report.timed_out {
            tracing::warn!(
                unfinished = report.unfinished,
                "shutdown timeout elapsed before the pool drained"
            );
        } else {
            tracing::info!(completed = report.completed, "execution pool drained");
        }
        report
    }
}

impl Drop for ExecutionPool {
    fn drop(&mut self) {
        // Close the queue; workers finish what is queued and exit.
        self.jobs.get_mut().take();
    }
}

/// Marks a worker as gone, however its loop ended.
struct ExitSignal {
    id: usize,
    counters: Arc<Counters>,
    exit: Sender<usize>,
}

impl Drop for ExitSignal {
    fn drop(&mut self) {
        self.counters.live.fetch_sub(1, Ordering::SeqCst);
        let _ = self.exit.send(self.id);
    }
}

fn worker_loop<F: EngineFactory>(
    id: usize,
    jobs: Receiver<Job>,
    factory: &F,
    limits: &Limits,
    counters: &Counters,
) {
    while let Ok(job) = jobs.recv() {
        counters.in_flight.fetch_add(1, Ordering::SeqCst);
        tracing::trace!(
            worker = id,
            waited_ms = job.enqueued.elapsed().as_millis() as u64,
            queued = jobs.len(),
            "picked up request"
        );

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            run_calculation(factory, &job.request, limits)
        }));
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(payload) => {
                counters.panicked.fetch_add(1, Ordering::SeqCst);
                tracing::warn!(
                    worker = id,
                    panic = panic_message(payload.as_ref()),
                    "calculation task panicked"
                );
                Failure::internal("Worker execution failed").into()
            }
        };

        counters.in_flight.fetch_sub(1, Ordering::SeqCst);
        counters.completed.fetch_add(1, Ordering::SeqCst);
        // The submitter may have stopped waiting.
        let _ = job.reply.send(outcome);
    }
    tracing::trace!(worker = id, "worker exiting");
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}
