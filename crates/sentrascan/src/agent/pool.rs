use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use log::{debug, error, info, warn};
use serde::Serialize;
use tokio::sync::mpsc;

use crate::detect::{DetectorProvider, EngineConfig, EngineDetectorProvider};
use crate::error::{PoolError, Result};

use super::work::{AgentResult, WorkItem};
use super::worker::{run_agent, AgentMessage};

/// Memory footprint per agent (classification model + overhead), in MB.
const AGENT_MEMORY_MB: u64 = 400;
/// Memory kept free for the OS and other processes, in MB.
const MIN_SYSTEM_MEMORY_MB: u64 = 2048;

/// How long `results()` waits before re-checking pool state.
const RESULT_POLL_INTERVAL: Duration = Duration::from_millis(500);
/// Poll interval of the background result forwarder.
const FORWARD_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Pool lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolState {
    Initializing,
    Running,
    /// No new work accepted; in-flight work allowed to finish.
    Draining,
    Stopped,
}

impl fmt::Display for PoolState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolState::Initializing => write!(f, "initializing"),
            PoolState::Running => write!(f, "running"),
            PoolState::Draining => write!(f, "draining"),
            PoolState::Stopped => write!(f, "stopped"),
        }
    }
}

/// Configuration for the agent pool.
#[derive(Debug, Clone)]
pub struct AgentPoolConfig {
    /// Number of agents. 0 = auto-detect from CPU cores and memory.
    pub num_agents: usize,
    /// Inbound channel capacity (bounded for backpressure).
    pub input_queue_size: usize,
    /// Outbound channel capacity.
    pub output_queue_size: usize,
    /// Per-agent classification engine configuration.
    pub engine: EngineConfig,
    /// Graceful shutdown deadline before agents are abandoned.
    pub shutdown_timeout: Duration,
    /// Default batch size for `results_batched`.
    pub result_batch_size: usize,
    /// Default flush timeout for `results_batched`.
    pub result_batch_timeout: Duration,
}

impl Default for AgentPoolConfig {
    fn default() -> Self {
        Self {
            num_agents: 0,
            input_queue_size: 100,
            output_queue_size: 1000,
            engine: EngineConfig::default(),
            shutdown_timeout: Duration::from_secs(30),
            result_batch_size: 50,
            result_batch_timeout: Duration::from_millis(500),
        }
    }
}

impl AgentPoolConfig {
    /// Determines the agent count from system resources.
    ///
    /// CPU cores bound the count (agents are CPU-bound), available memory may
    /// reduce it further, and one core stays reserved for file I/O and
    /// coordination.
    pub fn auto_detect_agents() -> usize {
        let cpu_count = match num_cpus::get_physical() {
            0 => match num_cpus::get() {
                0 => 4,
                logical => logical,
            },
            physical => physical,
        };

        let mut system = sysinfo::System::new();
        system.refresh_memory();
        let available_mb = system.available_memory() / (1024 * 1024);
        let memory_agents = if available_mb == 0 {
            // Memory reporting unavailable; let CPU count decide
            cpu_count
        } else {
            let usable_mb = available_mb.saturating_sub(MIN_SYSTEM_MEMORY_MB);
            ((usable_mb / AGENT_MEMORY_MB) as usize).max(1)
        };

        let optimal = cpu_count.saturating_sub(1).min(memory_agents).max(1);
        info!(
            "Auto-detected agents: {} (CPUs: {}, memory allows: {})",
            optimal, cpu_count, memory_agents
        );
        optimal
    }
}

#[derive(Default)]
struct StatsInner {
    submitted: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    processing_us: AtomicU64,
}

/// Runtime statistics snapshot for the pool.
#[derive(Debug, Clone, Serialize)]
pub struct PoolStats {
    pub items_submitted: u64,
    pub items_completed: u64,
    pub items_failed: u64,
    pub items_pending: u64,
    pub total_processing_ms: f64,
    pub avg_processing_ms: f64,
    pub throughput_per_sec: f64,
}

/// Pool health snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub state: PoolState,
    pub agents_total: usize,
    pub agents_alive: usize,
    pub items_submitted: u64,
    pub items_completed: u64,
    pub items_pending: u64,
    pub avg_processing_ms: f64,
    pub throughput_per_sec: f64,
}

struct PoolShared {
    state: Mutex<PoolState>,
    stats: StatsInner,
    started_at: Mutex<Option<Instant>>,
}

impl PoolShared {
    fn state(&self) -> PoolState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, next: PoolState) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = next;
    }

    fn pending(&self) -> u64 {
        let submitted = self.stats.submitted.load(Ordering::Relaxed);
        let completed = self.stats.completed.load(Ordering::Relaxed);
        submitted.saturating_sub(completed)
    }

    /// True once `results()` has nothing further to wait for.
    fn finished(&self) -> bool {
        match self.state() {
            PoolState::Stopped => true,
            PoolState::Draining => self.pending() == 0,
            _ => false,
        }
    }
}

struct PoolInner {
    work_tx: Option<Sender<AgentMessage>>,
    agents: Vec<JoinHandle<()>>,
    forward_task: Option<tokio::task::JoinHandle<()>>,
    result_rx: Option<mpsc::UnboundedReceiver<AgentResult>>,
    sentinels_sent: bool,
}

/// Manages a pool of classification agent threads.
///
/// Work flows in through a bounded channel (`submit` blocks when it is full,
/// which is the backpressure mechanism) and results flow out through a second
/// bounded channel drained by a background task into the stream returned by
/// [`results`](AgentPool::results).
pub struct AgentPool {
    config: AgentPoolConfig,
    num_agents: usize,
    provider: Arc<dyn DetectorProvider>,
    shared: Arc<PoolShared>,
    inner: Mutex<PoolInner>,
}

impl AgentPool {
    /// Production constructor; detectors come from the configured engine.
    pub fn new(config: AgentPoolConfig) -> Self {
        let provider = Arc::new(EngineDetectorProvider::new(config.engine.clone()));
        Self::with_provider(config, provider)
    }

    /// Constructor with an injected detector provider.
    ///
    /// The sizing policy runs here, once, not per scan.
    pub fn with_provider(config: AgentPoolConfig, provider: Arc<dyn DetectorProvider>) -> Self {
        let num_agents = if config.num_agents == 0 {
            AgentPoolConfig::auto_detect_agents()
        } else {
            config.num_agents
        };

        Self {
            config,
            num_agents,
            provider,
            shared: Arc::new(PoolShared {
                state: Mutex::new(PoolState::Initializing),
                stats: StatsInner::default(),
                started_at: Mutex::new(None),
            }),
            inner: Mutex::new(PoolInner {
                work_tx: None,
                agents: Vec::new(),
                forward_task: None,
                result_rx: None,
                sentinels_sent: false,
            }),
        }
    }

    pub fn state(&self) -> PoolState {
        self.shared.state()
    }

    pub fn num_agents(&self) -> usize {
        self.num_agents
    }

    /// Spawns the agents and the background result forwarder.
    ///
    /// Detector construction and thread spawn failures surface here, before
    /// the pool transitions to running.
    pub async fn start(&self) -> Result<()> {
        let current = self.shared.state();
        if current != PoolState::Initializing {
            return Err(PoolError::InvalidState {
                expected: "initializing",
                actual: current.to_string(),
            }
            .into());
        }

        info!("Starting agent pool with {} agents", self.num_agents);

        let (work_tx, work_rx) = bounded::<AgentMessage>(self.config.input_queue_size);
        let (result_tx, result_rx) = bounded::<AgentResult>(self.config.output_queue_size);

        let mut agents = Vec::with_capacity(self.num_agents);
        for agent_id in 0..self.num_agents {
            let detector = self.provider.create()?;
            let rx = work_rx.clone();
            let tx = result_tx.clone();
            let handle = thread::Builder::new()
                .name(format!("agent-{agent_id}"))
                .spawn(move || run_agent(agent_id, rx, tx, detector))
                .map_err(|source| PoolError::SpawnFailed {
                    id: agent_id,
                    source,
                })?;
            debug!("Started agent thread {}", agent_id);
            agents.push(handle);
        }
        // Agents hold the only remaining clones; the result channel
        // disconnects once they all exit.
        drop(work_rx);
        drop(result_tx);

        let (async_tx, async_rx) = mpsc::unbounded_channel();
        let shared = Arc::clone(&self.shared);
        let forward_task =
            tokio::task::spawn_blocking(move || forward_results(result_rx, async_tx, shared));

        {
            let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            inner.work_tx = Some(work_tx);
            inner.agents = agents;
            inner.forward_task = Some(forward_task);
            inner.result_rx = Some(async_rx);
            inner.sentinels_sent = false;
        }

        *self
            .shared
            .started_at
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(Instant::now());
        self.shared.set_state(PoolState::Running);
        info!("Agent pool running with {} agents", self.num_agents);
        Ok(())
    }

    /// Submits a work item for classification.
    ///
    /// Blocks (asynchronously) while the inbound channel is full.
    pub async fn submit(&self, item: WorkItem) -> Result<()> {
        let current = self.shared.state();
        if current != PoolState::Running {
            return Err(PoolError::InvalidState {
                expected: "running",
                actual: current.to_string(),
            }
            .into());
        }

        let tx = {
            let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            inner.work_tx.clone().ok_or(PoolError::ChannelClosed)?
        };

        // Blocking send on a bounded channel; run off the async executor.
        let sent = tokio::task::spawn_blocking(move || tx.send(AgentMessage::Work(item)))
            .await
            .map_err(|_| PoolError::ChannelClosed)?;
        sent.map_err(|_| PoolError::ChannelClosed)?;

        self.shared.stats.submitted.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Graceful stop request: no more submissions, pending work continues.
    ///
    /// Pushes one stop sentinel per agent and returns without waiting; use
    /// [`stop`](AgentPool::stop) to wait for the agents to exit.
    pub async fn drain(&self) -> Result<()> {
        match self.shared.state() {
            PoolState::Running => {}
            PoolState::Draining => return Ok(()),
            other => {
                return Err(PoolError::InvalidState {
                    expected: "running",
                    actual: other.to_string(),
                }
                .into());
            }
        }

        self.shared.set_state(PoolState::Draining);
        info!("Draining agent pool");
        self.send_stop_sentinels().await;
        Ok(())
    }

    async fn send_stop_sentinels(&self) {
        let (tx, already_sent) = {
            let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            let already_sent = inner.sentinels_sent;
            inner.sentinels_sent = true;
            (inner.work_tx.clone(), already_sent)
        };
        if already_sent {
            return;
        }
        if let Some(tx) = tx {
            let count = self.num_agents;
            let send_all = tokio::task::spawn_blocking(move || {
                for _ in 0..count {
                    if tx.send(AgentMessage::Stop).is_err() {
                        break;
                    }
                }
            });
            if send_all.await.is_err() {
                warn!("Failed to deliver stop sentinels");
            }
        }
    }

    /// Stops the pool.
    ///
    /// With `wait`, drains first and gives agents until the shutdown timeout
    /// to exit, abandoning any still alive afterwards. Without `wait`, agents
    /// are abandoned immediately regardless of in-flight work. Idempotent
    /// once stopped.
    pub async fn stop(&self, wait: bool) -> Result<()> {
        if self.shared.state() == PoolState::Stopped {
            return Ok(());
        }

        let agents = {
            let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            std::mem::take(&mut inner.agents)
        };

        if wait {
            if self.shared.state() == PoolState::Running {
                self.shared.set_state(PoolState::Draining);
                info!("Draining agent pool");
            }
            self.send_stop_sentinels().await;

            let deadline = Instant::now() + self.config.shutdown_timeout;
            while agents.iter().any(|h| !h.is_finished()) && Instant::now() < deadline {
                tokio::time::sleep(Duration::from_millis(25)).await;
            }

            for handle in agents {
                if handle.is_finished() {
                    if let Err(panic) = handle.join() {
                        error!("Agent thread panicked: {:?}", panic);
                    }
                } else {
                    warn!(
                        "Force abandoning agent '{}' still alive at shutdown deadline",
                        handle.thread().name().unwrap_or("unnamed")
                    );
                }
            }
        } else if !agents.is_empty() {
            warn!(
                "Stopping agent pool without draining; abandoning {} agents",
                agents.len()
            );
        }

        // Stops the forwarder loop, then close the channels.
        self.shared.set_state(PoolState::Stopped);
        let forward_task = {
            let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            inner.work_tx = None;
            inner.forward_task.take()
        };
        if let Some(task) = forward_task {
            let _ = task.await;
        }

        info!("Agent pool stopped");
        Ok(())
    }

    /// Lazy sequence of classification results.
    ///
    /// The stream ends once the pool is stopped, or draining with zero
    /// pending items, after flushing internally buffered results. May be
    /// taken once; a second call yields an already-exhausted stream.
    pub fn results(&self) -> ResultStream {
        let rx = {
            let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            inner.result_rx.take()
        };
        if rx.is_none() {
            debug!("results() called twice; returning exhausted stream");
        }
        ResultStream {
            rx,
            shared: Arc::clone(&self.shared),
        }
    }

    /// Batched variant of [`results`](AgentPool::results): yields at most
    /// `batch_size` results, flushing early once `timeout` elapses after a
    /// batch opens. Defaults come from the pool configuration.
    pub fn results_batched(
        &self,
        batch_size: Option<usize>,
        timeout: Option<Duration>,
    ) -> BatchStream {
        BatchStream {
            stream: self.results(),
            batch_size: batch_size.unwrap_or(self.config.result_batch_size).max(1),
            timeout: timeout.unwrap_or(self.config.result_batch_timeout),
        }
    }

    pub fn stats(&self) -> PoolStats {
        let submitted = self.shared.stats.submitted.load(Ordering::Relaxed);
        let completed = self.shared.stats.completed.load(Ordering::Relaxed);
        let failed = self.shared.stats.failed.load(Ordering::Relaxed);
        let total_processing_ms =
            self.shared.stats.processing_us.load(Ordering::Relaxed) as f64 / 1000.0;

        let elapsed = self
            .shared
            .started_at
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0);

        PoolStats {
            items_submitted: submitted,
            items_completed: completed,
            items_failed: failed,
            items_pending: submitted.saturating_sub(completed),
            total_processing_ms,
            avg_processing_ms: if completed > 0 {
                total_processing_ms / completed as f64
            } else {
                0.0
            },
            throughput_per_sec: if elapsed > 0.0 {
                completed as f64 / elapsed
            } else {
                0.0
            },
        }
    }

    pub fn health_check(&self) -> HealthSnapshot {
        let agents_alive = {
            let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            inner.agents.iter().filter(|h| !h.is_finished()).count()
        };
        let stats = self.stats();

        HealthSnapshot {
            state: self.shared.state(),
            agents_total: self.num_agents,
            agents_alive,
            items_submitted: stats.items_submitted,
            items_completed: stats.items_completed,
            items_pending: stats.items_pending,
            avg_processing_ms: stats.avg_processing_ms,
            throughput_per_sec: stats.throughput_per_sec,
        }
    }
}

/// Background loop moving results from the agents' bounded channel into the
/// async stream while keeping the running statistics current.
///
/// Counters are bumped after the forward so `items_pending == 0` implies
/// every result is already visible to the consumer.
fn forward_results(
    rx: Receiver<AgentResult>,
    tx: mpsc::UnboundedSender<AgentResult>,
    shared: Arc<PoolShared>,
) {
    loop {
        match rx.recv_timeout(FORWARD_POLL_INTERVAL) {
            Ok(result) => {
                let failed = result.error.is_some();
                let processing_us = (result.processing_ms * 1000.0) as u64;

                if tx.send(result).is_err() {
                    debug!("Result consumer dropped; stopping forwarder");
                    break;
                }

                shared
                    .stats
                    .processing_us
                    .fetch_add(processing_us, Ordering::Relaxed);
                if failed {
                    shared.stats.failed.fetch_add(1, Ordering::Relaxed);
                }
                shared.stats.completed.fetch_add(1, Ordering::Relaxed);
            }
            Err(RecvTimeoutError::Timeout) => {
                if shared.state() == PoolState::Stopped {
                    break;
                }
            }
            Err(RecvTimeoutError::Disconnected) => {
                debug!("All agents exited; forwarder finished");
                break;
            }
        }
    }
}

/// Async iterator over classification results. See [`AgentPool::results`].
pub struct ResultStream {
    rx: Option<mpsc::UnboundedReceiver<AgentResult>>,
    shared: Arc<PoolShared>,
}

impl ResultStream {
    /// Next result, or `None` once the pool has nothing further to produce.
    ///
    /// Waits in bounded intervals so pool shutdown is observed promptly.
    pub async fn next(&mut self) -> Option<AgentResult> {
        let rx = self.rx.as_mut()?;
        loop {
            match rx.try_recv() {
                Ok(result) => return Some(result),
                Err(mpsc::error::TryRecvError::Disconnected) => return None,
                Err(mpsc::error::TryRecvError::Empty) => {}
            }

            if self.shared.finished() {
                // Flush anything that raced in between the checks
                return rx.try_recv().ok();
            }

            match tokio::time::timeout(RESULT_POLL_INTERVAL, rx.recv()).await {
                Ok(Some(result)) => return Some(result),
                Ok(None) => return None,
                Err(_) => continue,
            }
        }
    }
}

/// Time/size double-bounded batches of results. See
/// [`AgentPool::results_batched`].
pub struct BatchStream {
    stream: ResultStream,
    batch_size: usize,
    timeout: Duration,
}

impl BatchStream {
    /// Next non-empty batch, or `None` once the stream is exhausted.
    pub async fn next_batch(&mut self) -> Option<Vec<AgentResult>> {
        let first = self.stream.next().await?;
        let mut batch = Vec::with_capacity(self.batch_size);
        batch.push(first);

        let deadline = Instant::now() + self.timeout;
        while batch.len() < self.batch_size {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match tokio::time::timeout(remaining, self.stream.next()).await {
                Ok(Some(result)) => batch.push(result),
                Ok(None) | Err(_) => break,
            }
        }

        Some(batch)
    }
}
