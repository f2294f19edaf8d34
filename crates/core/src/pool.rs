//! Stdio agent pool: supervised child processes with single-in-flight
//! dispatch, FIFO queueing, idle reaping, and crash restart.
//!
//! One pool serves one agent identifier. The **primary** worker is spawned
//! first and never reaped by idle timeout; **pooled** workers are created
//! on demand under concurrent load, up to `max_pool_size`, and destroyed
//! after `max_idle_time_ms` of idleness. When every worker is busy,
//! dispatches wait in a strict FIFO queue bounded by `queue_max_size`.
//!
//! Queue operations, worker-state transitions, and pool membership are all
//! guarded by the single pool mutex; dispatch I/O runs outside it. Worker
//! crash handling (in-flight rejection, restart with backoff) is inherited
//! from the stdio transport the worker wraps.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cubicler_transport::{McpTransport, StdioTransport};
use cubicler_types::config::{AgentConfig, McpServerConfig, PoolConfig, TransportKind};
use cubicler_types::{AgentRequest, AgentResponse, CubiclerError, McpRequest};
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, warn};
use uuid::Uuid;

/// One supervised stdio worker speaking JSON-RPC `dispatch` over its
/// stdin/stdout.
pub struct PoolWorker {
    index: usize,
    primary: bool,
    // The busy flag enforces single in-flight; the transport itself is only
    // ever used by the holder of the reservation, so the inner lock is
    // uncontended.
    transport: Mutex<StdioTransport>,
    busy: AtomicBool,
    // Bumped on every reservation so stale idle timers recognize reuse.
    idle_epoch: AtomicU64,
}

fn worker_config(agent: &AgentConfig) -> Result<McpServerConfig, CubiclerError> {
    let command = agent.command.clone().ok_or_else(|| {
        CubiclerError::Config(format!(
            "agent {}: stdio transport requires 'command'",
            agent.identifier
        ))
    })?;
    Ok(McpServerConfig {
        identifier: agent.identifier.clone(),
        name: agent.name.clone(),
        description: agent.description.clone(),
        transport: Some(TransportKind::Stdio),
        url: None,
        headers: Default::default(),
        auth: None,
        command: Some(command),
        args: agent.args.clone(),
        env: agent.env.clone(),
        cwd: agent.cwd.clone(),
    })
}

impl PoolWorker {
    /// Spawn a worker process for an agent. The worker comes back idle.
    pub async fn connect(
        agent: &AgentConfig,
        index: usize,
        call_timeout: Duration,
    ) -> Result<Arc<Self>, CubiclerError> {
        let mut transport = StdioTransport::new(worker_config(agent)?, call_timeout)?;
        transport.initialize().await?;
        Ok(Arc::new(Self {
            index,
            primary: index == 0,
            transport: Mutex::new(transport),
            busy: AtomicBool::new(false),
            idle_epoch: AtomicU64::new(0),
        }))
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    pub fn is_primary(&self) -> bool {
        self.primary
    }

    fn try_reserve(&self) -> bool {
        let reserved = !self.busy.swap(true, Ordering::SeqCst);
        if reserved {
            self.idle_epoch.fetch_add(1, Ordering::SeqCst);
        }
        reserved
    }

    fn release_slot(&self) {
        self.busy.store(false, Ordering::SeqCst);
    }

    /// Dispatch directly on this worker, rejecting re-entrant use while a
    /// dispatch is in flight.
    pub async fn dispatch(&self, request: &AgentRequest) -> Result<AgentResponse, CubiclerError> {
        if !self.try_reserve() {
            return Err(CubiclerError::Agent(format!("worker {} is busy", self.index)));
        }
        let result = self.execute(request).await;
        self.release_slot();
        result
    }

    /// Run one dispatch. Caller holds the reservation.
    async fn execute(&self, request: &AgentRequest) -> Result<AgentResponse, CubiclerError> {
        let id = Uuid::new_v4().to_string();
        let payload = serde_json::to_value(request)
            .map_err(|e| CubiclerError::JsonDecode(format!("failed to encode request: {}", e)))?;
        let rpc = McpRequest::new(id.as_str(), "dispatch", Some(payload));

        let response = self.transport.lock().await.send(rpc).await?;
        if let Some(error) = response.error {
            return Err(CubiclerError::Agent(error.message));
        }
        let result = response.result.ok_or_else(|| {
            CubiclerError::Agent("response carried neither result nor error".to_string())
        })?;
        AgentResponse::from_value(result)
    }

    async fn shutdown(&self) {
        if let Err(e) = self.transport.lock().await.close().await {
            warn!(worker = self.index, error = %e, "worker shutdown failed");
        }
    }
}

struct PoolState {
    workers: Vec<Arc<PoolWorker>>,
    queue: VecDeque<oneshot::Sender<Arc<PoolWorker>>>,
    spawning: usize,
    next_index: usize,
}

enum Plan {
    Ready(Arc<PoolWorker>),
    Spawn(usize),
    Wait(oneshot::Receiver<Arc<PoolWorker>>),
}

pub struct StdioAgentPool {
    agent: AgentConfig,
    pool_config: PoolConfig,
    call_timeout: Duration,
    state: Arc<Mutex<PoolState>>,
    shutting_down: Arc<AtomicBool>,
}

impl StdioAgentPool {
    pub fn new(agent: AgentConfig, call_timeout: Duration) -> Result<Self, CubiclerError> {
        if agent.command.is_none() {
            return Err(CubiclerError::Config(format!(
                "agent {}: stdio transport requires 'command'",
                agent.identifier
            )));
        }
        let pool_config = agent.pooling.clone().unwrap_or_default();
        if pool_config.max_pool_size == 0 {
            return Err(CubiclerError::Config(format!(
                "agent {}: maxPoolSize must be at least 1",
                agent.identifier
            )));
        }
        Ok(Self {
            agent,
            pool_config,
            call_timeout,
            state: Arc::new(Mutex::new(PoolState {
                workers: Vec::new(),
                queue: VecDeque::new(),
                spawning: 0,
                next_index: 0,
            })),
            shutting_down: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Spawn the primary worker up front.
    pub async fn start(&self) -> Result<(), CubiclerError> {
        let mut state = self.state.lock().await;
        if !state.workers.is_empty() || state.spawning > 0 {
            return Ok(());
        }
        state.next_index = 1;
        let worker = PoolWorker::connect(&self.agent, 0, self.call_timeout).await?;
        state.workers.push(worker);
        Ok(())
    }

    pub async fn worker_count(&self) -> usize {
        self.state.lock().await.workers.len()
    }

    pub async fn dispatch(&self, request: AgentRequest) -> Result<AgentResponse, CubiclerError> {
        let worker = self.acquire().await?;
        let result = worker.execute(&request).await;
        self.release(&worker).await;
        result
    }

    async fn acquire(&self) -> Result<Arc<PoolWorker>, CubiclerError> {
        if self.shutting_down.load(Ordering::SeqCst) {
            return Err(CubiclerError::Agent("agent pool is shut down".to_string()));
        }

        let plan = {
            let mut state = self.state.lock().await;
            // Primary first: workers keep their spawn order.
            if let Some(worker) = state.workers.iter().find(|w| w.try_reserve()).cloned() {
                Plan::Ready(worker)
            } else if state.workers.len() + state.spawning < self.pool_config.max_pool_size {
                state.spawning += 1;
                let index = state.next_index;
                state.next_index += 1;
                Plan::Spawn(index)
            } else if state.queue.len() >= self.pool_config.queue_max_size {
                return Err(CubiclerError::Agent("Agent pool at max capacity".to_string()));
            } else {
                let (tx, rx) = oneshot::channel();
                state.queue.push_back(tx);
                Plan::Wait(rx)
            }
        };

        match plan {
            Plan::Ready(worker) => Ok(worker),
            Plan::Spawn(index) => {
                let spawned = PoolWorker::connect(&self.agent, index, self.call_timeout).await;
                let mut state = self.state.lock().await;
                state.spawning -= 1;
                match spawned {
                    Ok(worker) => {
                        debug!(agent = %self.agent.identifier, worker = index, "spawned pooled worker");
                        // Freshly spawned and not yet shared: the
                        // reservation cannot fail.
                        let _ = worker.try_reserve();
                        state.workers.push(Arc::clone(&worker));
                        Ok(worker)
                    }
                    Err(e) => Err(e),
                }
            }
            Plan::Wait(mut rx) => {
                let deadline = Duration::from_millis(self.pool_config.queue_timeout_ms);
                tokio::select! {
                    result = &mut rx => match result {
                        Ok(worker) => Ok(worker),
                        Err(_) => Err(CubiclerError::Agent("agent pool is shut down".to_string())),
                    },
                    _ = tokio::time::sleep(deadline) => {
                        // A release may hand a worker over right at the
                        // deadline; close the channel and drain it so that
                        // worker is not leaked in the reserved state.
                        rx.close();
                        if let Ok(worker) = rx.try_recv() {
                            return Ok(worker);
                        }
                        let mut state = self.state.lock().await;
                        state.queue.retain(|tx| !tx.is_closed());
                        Err(CubiclerError::Agent("Queue wait timeout".to_string()))
                    }
                }
            }
        }
    }

    /// Return a worker: hand it (still reserved) to the oldest waiter, or
    /// mark it idle and arm the reap timer.
    async fn release(&self, worker: &Arc<PoolWorker>) {
        let mut state = self.state.lock().await;
        while let Some(waiter) = state.queue.pop_front() {
            if waiter.send(Arc::clone(worker)).is_ok() {
                return;
            }
            // Waiter timed out and dropped its receiver; try the next one.
        }
        worker.release_slot();
        if !worker.primary && !self.shutting_down.load(Ordering::SeqCst) {
            self.arm_idle_timer(worker);
        }
    }

    fn arm_idle_timer(&self, worker: &Arc<PoolWorker>) {
        let epoch = worker.idle_epoch.load(Ordering::SeqCst);
        let worker = Arc::clone(worker);
        let state = Arc::clone(&self.state);
        let shutting_down = Arc::clone(&self.shutting_down);
        let max_idle = Duration::from_millis(self.pool_config.max_idle_time_ms);

        tokio::spawn(async move {
            tokio::time::sleep(max_idle).await;
            if shutting_down.load(Ordering::SeqCst) {
                return;
            }
            {
                let mut state = state.lock().await;
                if worker.is_busy() || worker.idle_epoch.load(Ordering::SeqCst) != epoch {
                    return;
                }
                state.workers.retain(|w| !Arc::ptr_eq(w, &worker));
            }
            debug!(worker = worker.index, "reaping idle pooled worker");
            worker.shutdown().await;
        });
    }

    /// Shut the pool down: reject queued waiters and close every worker.
    pub async fn shutdown(&self) -> Result<(), CubiclerError> {
        self.shutting_down.store(true, Ordering::SeqCst);
        let (workers, queue) = {
            let mut state = self.state.lock().await;
            (std::mem::take(&mut state.workers), std::mem::take(&mut state.queue))
        };
        // Dropping the senders rejects every queued waiter.
        drop(queue);
        for worker in workers {
            worker.shutdown().await;
        }
        Ok(())
    }
}
