//! Stdio MCP transport: a supervised child process speaking line-framed
//! JSON-RPC.
//!
//! Each outbound request is one JSON object followed by `\n`, written
//! atomically under the stdin mutex. Stdout is split on `\n` and each
//! non-empty line is parsed as a response and correlated by id; stderr is
//! drained into tracing diagnostics.
//!
//! # Supervision
//!
//! The lifecycle is `Uninit → Starting → Running → Exited → (Starting |
//! Dead)`. An exit outside `close()` rejects all in-flight requests with
//! "connection to <id> was closed" and schedules a restart with exponential
//! backoff: 500 ms doubling up to 10 s, at most 5 attempts. A successful
//! start resets the attempt counter; after the cap the transport parks in
//! `Dead` and the next `send` restarts it on demand. `close()` moves to
//! `ShuttingDown → Stopped`, disables restarts, signals the child by
//! closing stdin, and kills it after a 5 s grace period.

use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cubicler_types::config::McpServerConfig;
use cubicler_types::jsonrpc::INTERNAL_ERROR;
use cubicler_types::{CubiclerError, McpRequest, McpResponse};
use futures::StreamExt;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::pending::PendingRequests;
use crate::reader::MessageReader;
use crate::McpTransport;

const RESTART_BASE_DELAY: Duration = Duration::from_millis(500);
const RESTART_MAX_DELAY: Duration = Duration::from_secs(10);
const MAX_RESTART_ATTEMPTS: u32 = 5;
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Uninit,
    Starting,
    Running,
    Exited,
    Dead,
    ShuttingDown,
    Stopped,
}

struct StdioState {
    lifecycle: Lifecycle,
    child: Option<Child>,
    reader_abort: Option<tokio::task::AbortHandle>,
    stderr_abort: Option<tokio::task::AbortHandle>,
}

struct Shared {
    server_id: String,
    config: McpServerConfig,
    state: Mutex<StdioState>,
    // Separate from the state lock so a slow write never blocks lifecycle
    // transitions. Held across the write to keep lines atomic.
    stdin: Mutex<Option<ChildStdin>>,
    pending: PendingRequests,
    shutting_down: AtomicBool,
    connected: AtomicBool,
    restart_attempts: AtomicU32,
    generation: AtomicU64,
}

fn backoff_delay(attempt: u32) -> Duration {
    let factor = 1u64 << attempt.min(31);
    RESTART_MAX_DELAY.min(RESTART_BASE_DELAY * factor as u32)
}

impl Shared {
    /// Spawn the child and wire up the reader tasks. Caller holds the state
    /// lock.
    async fn spawn_locked(
        shared: &Arc<Shared>,
        state: &mut StdioState,
    ) -> Result<(), CubiclerError> {
        state.lifecycle = Lifecycle::Starting;

        let command = shared.config.command.as_deref().ok_or_else(|| {
            CubiclerError::Config(format!("server {}: missing command", shared.server_id))
        })?;
        let mut cmd = Command::new(command);
        cmd.args(&shared.config.args);
        // The child sees the parent environment plus the configured
        // overrides.
        cmd.envs(&shared.config.env);
        if let Some(ref cwd) = shared.config.cwd {
            cmd.current_dir(cwd);
        }
        cmd.stdin(Stdio::piped()).stdout(Stdio::piped()).stderr(Stdio::piped());

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                state.lifecycle = Lifecycle::Exited;
                return Err(CubiclerError::Process(format!(
                    "failed to spawn {}: {}",
                    shared.server_id, e
                )));
            }
        };

        let Some(stdin) = child.stdin.take() else {
            state.lifecycle = Lifecycle::Exited;
            return Err(CubiclerError::Process(format!(
                "no stdin handle for {}",
                shared.server_id
            )));
        };
        let Some(stdout) = child.stdout.take() else {
            state.lifecycle = Lifecycle::Exited;
            return Err(CubiclerError::Process(format!(
                "no stdout handle for {}",
                shared.server_id
            )));
        };
        let stderr = child.stderr.take();

        *shared.stdin.lock().await = Some(stdin);

        let generation = shared.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let reader_shared = Arc::clone(shared);
        let reader_abort = tokio::spawn(async move {
            let mut stream = Box::pin(MessageReader::new(stdout));
            while let Some(item) = stream.next().await {
                match item {
                    Ok(value) => match serde_json::from_value::<McpResponse>(value) {
                        Ok(response) => {
                            if !reader_shared.pending.resolve(response) {
                                warn!(
                                    server = %reader_shared.server_id,
                                    "dropping response with no pending request"
                                );
                            }
                        }
                        Err(e) => {
                            warn!(
                                server = %reader_shared.server_id,
                                error = %e,
                                "ignoring non-response line"
                            );
                        }
                    },
                    Err(e) => {
                        warn!(server = %reader_shared.server_id, error = %e, "stdout read error");
                    }
                }
            }
            Shared::handle_exit(&reader_shared, generation).await;
        })
        .abort_handle();

        let stderr_abort = stderr.map(|stderr| {
            let server_id = shared.server_id.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(server = %server_id, line = %line, "stderr");
                }
            })
            .abort_handle()
        });

        state.child = Some(child);
        state.reader_abort = Some(reader_abort);
        state.stderr_abort = stderr_abort;
        state.lifecycle = Lifecycle::Running;
        shared.connected.store(true, Ordering::SeqCst);
        shared.restart_attempts.store(0, Ordering::SeqCst);
        debug!(server = %shared.server_id, "stdio process started");
        Ok(())
    }

    /// Handle an unexpected exit observed by the stdout reader for the given
    /// process generation.
    async fn handle_exit(shared: &Arc<Shared>, generation: u64) {
        {
            let mut state = shared.state.lock().await;
            if shared.shutting_down.load(Ordering::SeqCst) {
                return;
            }
            if shared.generation.load(Ordering::SeqCst) != generation {
                // A newer process already replaced this one.
                return;
            }
            if state.lifecycle != Lifecycle::Running && state.lifecycle != Lifecycle::Starting {
                return;
            }
            state.lifecycle = Lifecycle::Exited;
            shared.connected.store(false, Ordering::SeqCst);
            *shared.stdin.lock().await = None;
            if let Some(mut child) = state.child.take() {
                tokio::spawn(async move {
                    let _ = child.wait().await;
                });
            }
        }

        warn!(server = %shared.server_id, "stdio process exited unexpectedly");
        shared.pending.reject_all(
            INTERNAL_ERROR,
            &format!("connection to {} was closed", shared.server_id),
        );
        Shared::schedule_restart(shared);
    }

    fn schedule_restart(shared: &Arc<Shared>) {
        let shared = Arc::clone(shared);
        tokio::spawn(async move {
            loop {
                let attempt = shared.restart_attempts.fetch_add(1, Ordering::SeqCst);
                if attempt >= MAX_RESTART_ATTEMPTS {
                    let mut state = shared.state.lock().await;
                    if state.lifecycle == Lifecycle::Exited {
                        state.lifecycle = Lifecycle::Dead;
                    }
                    warn!(
                        server = %shared.server_id,
                        "restart attempts exhausted; next send restarts on demand"
                    );
                    return;
                }

                tokio::time::sleep(backoff_delay(attempt)).await;

                let mut state = shared.state.lock().await;
                if shared.shutting_down.load(Ordering::SeqCst)
                    || state.lifecycle != Lifecycle::Exited
                {
                    return;
                }
                match Shared::spawn_locked(&shared, &mut state).await {
                    Ok(()) => return,
                    Err(e) => {
                        warn!(server = %shared.server_id, error = %e, "restart attempt failed");
                        state.lifecycle = Lifecycle::Exited;
                        // Loop for the next backoff step.
                    }
                }
            }
        });
    }

    /// Make sure a process is running, restarting on demand after crashes or
    /// an exhausted backoff schedule.
    async fn ensure_running(shared: &Arc<Shared>) -> Result<(), CubiclerError> {
        if shared.shutting_down.load(Ordering::SeqCst) {
            return Err(CubiclerError::Transport("transport is closed".to_string()));
        }
        let mut state = shared.state.lock().await;
        match state.lifecycle {
            Lifecycle::Running | Lifecycle::Starting => Ok(()),
            Lifecycle::Uninit | Lifecycle::Exited | Lifecycle::Dead => {
                Shared::spawn_locked(shared, &mut state).await
            }
            Lifecycle::ShuttingDown | Lifecycle::Stopped => {
                Err(CubiclerError::Transport("transport is closed".to_string()))
            }
        }
    }
}

pub struct StdioTransport {
    shared: Arc<Shared>,
    call_timeout: Duration,
}

impl StdioTransport {
    pub fn new(config: McpServerConfig, call_timeout: Duration) -> Result<Self, CubiclerError> {
        if config.command.is_none() {
            return Err(CubiclerError::Config(format!(
                "server {}: stdio transport requires 'command'",
                config.identifier
            )));
        }
        let shared = Arc::new(Shared {
            server_id: config.identifier.clone(),
            config,
            state: Mutex::new(StdioState {
                lifecycle: Lifecycle::Uninit,
                child: None,
                reader_abort: None,
                stderr_abort: None,
            }),
            stdin: Mutex::new(None),
            pending: PendingRequests::new(),
            shutting_down: AtomicBool::new(false),
            connected: AtomicBool::new(false),
            restart_attempts: AtomicU32::new(0),
            generation: AtomicU64::new(0),
        });
        Ok(Self { shared, call_timeout })
    }
}

#[async_trait]
impl McpTransport for StdioTransport {
    async fn initialize(&mut self) -> Result<(), CubiclerError> {
        let mut state = self.shared.state.lock().await;
        Shared::spawn_locked(&self.shared, &mut state).await
    }

    async fn send(&self, request: McpRequest) -> Result<McpResponse, CubiclerError> {
        request.validate()?;
        Shared::ensure_running(&self.shared).await?;

        let id = request.id.clone();
        let rx = self.shared.pending.register(id.clone())?;

        let line = serde_json::to_string(&request)
            .map_err(|e| CubiclerError::JsonDecode(format!("failed to encode request: {}", e)))?;

        {
            let mut stdin = self.shared.stdin.lock().await;
            let Some(handle) = stdin.as_mut() else {
                self.shared.pending.forget(&id);
                return Err(CubiclerError::Transport("transport not connected".to_string()));
            };
            let write = async {
                handle.write_all(line.as_bytes()).await?;
                handle.write_all(b"\n").await?;
                handle.flush().await
            };
            if let Err(e) = write.await {
                self.shared.pending.forget(&id);
                return Err(CubiclerError::Transport(format!("write failed: {}", e)));
            }
        }

        match tokio::time::timeout(self.call_timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(CubiclerError::Transport(format!(
                "connection to {} was closed",
                self.shared.server_id
            ))),
            Err(_) => {
                self.shared.pending.forget(&id);
                Err(CubiclerError::Timeout(format!(
                    "request {} timed out after {}ms",
                    id,
                    self.call_timeout.as_millis()
                )))
            }
        }
    }

    async fn close(&mut self) -> Result<(), CubiclerError> {
        self.shared.shutting_down.store(true, Ordering::SeqCst);
        self.shared.connected.store(false, Ordering::SeqCst);

        let child = {
            let mut state = self.shared.state.lock().await;
            state.lifecycle = Lifecycle::ShuttingDown;
            if let Some(abort) = state.reader_abort.take() {
                abort.abort();
            }
            if let Some(abort) = state.stderr_abort.take() {
                abort.abort();
            }
            state.child.take()
        };

        // Closing stdin asks the child to exit on its own.
        *self.shared.stdin.lock().await = None;
        self.shared.pending.reject_all(
            INTERNAL_ERROR,
            &format!("connection to {} was closed", self.shared.server_id),
        );

        if let Some(mut child) = child {
            match tokio::time::timeout(SHUTDOWN_GRACE, child.wait()).await {
                Ok(_) => {}
                Err(_) => {
                    warn!(server = %self.shared.server_id, "grace period expired, killing child");
                    let _ = child.start_kill();
                    let _ = child.wait().await;
                }
            }
        }

        let mut state = self.shared.state.lock().await;
        state.lifecycle = Lifecycle::Stopped;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    fn server_id(&self) -> &str {
        &self.shared.server_id
    }
}
