use super::{js_engine, Hook, HookOutcome, ScriptBudget, ScriptError, ScriptSource};
use crate::config::ScriptingConfig;
use crate::store::KeyValueStore;
use crossbeam::channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

/// Configuration for the script thread pool
#[derive(Clone, Debug)]
pub struct ScriptPoolConfig {
    /// Number of worker threads
    pub workers: usize,
    /// Maximum queue size for pending tasks
    pub queue_size: usize,
    /// Time budget in milliseconds for one invocation, queueing included
    pub timeout_ms: u64,
    /// Iteration cap applied to every JavaScript loop
    pub loop_iteration_limit: u64,
}

fn auto_workers() -> usize {
    (num_cpus::get() / 2).clamp(2, 16) // Min 2, max 16
}

impl Default for ScriptPoolConfig {
    fn default() -> Self {
        Self {
            workers: auto_workers(),
            queue_size: 1000,
            timeout_ms: 1000,
            loop_iteration_limit: 10_000_000,
        }
    }
}

impl From<&ScriptingConfig> for ScriptPoolConfig {
    fn from(config: &ScriptingConfig) -> Self {
        Self {
            workers: if config.workers == 0 {
                auto_workers()
            } else {
                config.workers
            },
            queue_size: config.queue_size.max(1),
            timeout_ms: config.timeout_ms,
            loop_iteration_limit: config.loop_iteration_limit,
        }
    }
}

/// A hook invocation waiting for a worker
struct ScriptTask {
    script: Arc<ScriptSource>,
    hook: Hook,
    budget: Arc<ScriptBudget>,
    result_tx: oneshot::Sender<Result<HookOutcome, ScriptError>>,
}

/// Script worker thread
struct ScriptWorker {
    worker_id: usize,
    thread_handle: Option<JoinHandle<()>>,
}

impl ScriptWorker {
    fn spawn(
        worker_id: usize,
        work_rx: Receiver<ScriptTask>,
        shutdown_rx: Receiver<()>,
        store: Arc<dyn KeyValueStore>,
    ) -> std::io::Result<Self> {
        let handle = thread::Builder::new()
            .name(format!("script-worker-{worker_id}"))
            .spawn(move || {
                debug!("Script worker {} started", worker_id);

                loop {
                    if shutdown_rx.try_recv().is_ok() {
                        debug!("Script worker {} received shutdown signal", worker_id);
                        break;
                    }

                    // Wait for work with timeout to allow shutdown checks
                    match work_rx.recv_timeout(Duration::from_millis(100)) {
                        Ok(task) => {
                            // The caller already gave up on this one
                            if task.result_tx.is_closed() {
                                debug!(
                                    "Skipping {} for {}: caller is gone",
                                    task.hook.function_name(),
                                    task.script.name
                                );
                                continue;
                            }
                            if task.budget.is_exhausted() {
                                debug!(
                                    "Skipping {} for {}: budget spent in the queue",
                                    task.hook.function_name(),
                                    task.script.name
                                );
                                let _ = task.result_tx.send(Err(ScriptError::Timeout {
                                    script: task.script.name.clone(),
                                    timeout_ms: task.budget.timeout_ms(),
                                }));
                                continue;
                            }

                            let start = Instant::now();
                            let hook_name = task.hook.function_name();
                            let result = js_engine::run_hook(
                                &task.script,
                                task.hook,
                                Arc::clone(&store),
                                &task.budget,
                            );
                            debug!(
                                "{}() of {} completed in {:?} on worker {}",
                                hook_name,
                                task.script.name,
                                start.elapsed(),
                                worker_id
                            );

                            // Send result back (ignore if receiver dropped)
                            let _ = task.result_tx.send(result);
                        }
                        Err(RecvTimeoutError::Timeout) => continue,
                        Err(RecvTimeoutError::Disconnected) => {
                            debug!("Script worker {} channel disconnected", worker_id);
                            break;
                        }
                    }
                }

                debug!("Script worker {} shutting down", worker_id);
            })?;

        Ok(Self {
            worker_id,
            thread_handle: Some(handle),
        })
    }

    fn join(&mut self) {
        if let Some(handle) = self.thread_handle.take() {
            debug!("Waiting for script worker {} to finish", self.worker_id);
            if handle.join().is_err() {
                error!("Script worker {} panicked", self.worker_id);
            }
        }
    }
}

/// Decrements a counter when dropped, so cancelled futures are accounted for
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::Relaxed);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Script execution thread pool
///
/// Each worker is a plain OS thread, so a runaway script never blocks the
/// async runtime. Every invocation carries a [`ScriptBudget`] whose deadline
/// starts at submission. Past it the caller returns a timeout, the script's
/// buffered store writes are discarded and its next native call throws. A
/// script spinning in pure JavaScript keeps its worker until the loop
/// iteration limit trips, without any visible effect.
pub struct ScriptPool {
    workers: Vec<ScriptWorker>,
    work_tx: Sender<ScriptTask>,
    shutdown_tx: Sender<()>,
    config: ScriptPoolConfig,
    in_flight: AtomicUsize,
}

impl ScriptPool {
    /// Create a new script pool bound to the shared store
    pub fn new(config: ScriptPoolConfig, store: Arc<dyn KeyValueStore>) -> anyhow::Result<Self> {
        info!(
            "Creating script pool with {} workers, queue size {}, {} ms budget",
            config.workers, config.queue_size, config.timeout_ms
        );

        let (work_tx, work_rx) = bounded(config.queue_size);
        let (shutdown_tx, shutdown_rx) = bounded(config.workers);

        let mut workers = Vec::with_capacity(config.workers);
        for worker_id in 0..config.workers {
            let worker = ScriptWorker::spawn(
                worker_id,
                work_rx.clone(),
                shutdown_rx.clone(),
                Arc::clone(&store),
            )
            .map_err(|e| anyhow::anyhow!("Failed to spawn script worker {worker_id}: {e}"))?;
            workers.push(worker);
        }

        Ok(Self {
            workers,
            work_tx,
            shutdown_tx,
            config,
            in_flight: AtomicUsize::new(0),
        })
    }

    /// Run one hook, waiting at most the configured budget
    pub async fn execute(
        &self,
        script: Arc<ScriptSource>,
        hook: Hook,
    ) -> Result<HookOutcome, ScriptError> {
        let (result_tx, mut result_rx) = oneshot::channel();
        let script_name = script.name.clone();
        let budget = Arc::new(ScriptBudget::new(
            self.config.timeout_ms,
            self.config.loop_iteration_limit,
        ));

        let _in_flight = InFlight::enter(&self.in_flight);

        self.work_tx
            .try_send(ScriptTask {
                script,
                hook,
                budget: Arc::clone(&budget),
                result_tx,
            })
            .map_err(|e| match e {
                TrySendError::Full(_) => {
                    warn!("Script pool queue is full");
                    ScriptError::QueueFull
                }
                TrySendError::Disconnected(_) => {
                    error!("Script pool is shut down");
                    ScriptError::ShutDown
                }
            })?;

        let deadline = tokio::time::Instant::from_std(budget.deadline());
        match tokio::time::timeout_at(deadline, &mut result_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(ScriptError::Cancelled),
            Err(_) if budget.abandon() => Err(ScriptError::Timeout {
                script: script_name,
                timeout_ms: self.config.timeout_ms,
            }),
            // The worker committed right at the deadline; its writes are visible
            Err(_) => result_rx.await.unwrap_or(Err(ScriptError::Cancelled)),
        }
    }

    /// Invocations submitted and not yet answered
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Relaxed)
    }

    pub fn worker_count(&self) -> usize {
        self.config.workers
    }

    pub fn config(&self) -> &ScriptPoolConfig {
        &self.config
    }

    /// Stop the workers and wait for them. Calling it twice is harmless.
    pub fn shutdown(&mut self) {
        if self.workers.is_empty() {
            return;
        }
        info!(
            "Shutting down script pool with {} workers",
            self.workers.len()
        );

        for _ in 0..self.workers.len() {
            let _ = self.shutdown_tx.try_send(());
        }
        for mut worker in self.workers.drain(..) {
            worker.join();
        }

        info!("Script pool shutdown complete");
    }
}

impl Drop for ScriptPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}
