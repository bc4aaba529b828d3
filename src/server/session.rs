//! Restartable server session
//!
//! State machine: `Starting -> Running -> Stopping -> Stopped`, and
//! `Stopped -> Starting` on start/restart. All transitions run under one
//! lock, so the old child is fully gone before a new one is spawned. A child
//! that exits on its own moves the session straight to `Stopped`.

use crate::server::launcher::{ExitHook, LaunchConfig, RunningServer};
use crate::server::transport::ServerTransport;
use crate::types::{LaunchError, OutputSink};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info};

const RESTART_BANNER: &str = " === Language Server Restart ===";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Starting,
    Running,
    Stopping,
    Stopped,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Starting => "starting",
            SessionState::Running => "running",
            SessionState::Stopping => "stopping",
            SessionState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Handle returned to collaborators
pub struct ServerSession {
    config: LaunchConfig,
    output: Arc<dyn OutputSink>,
    state: Arc<watch::Sender<SessionState>>,
    current: Mutex<Option<RunningServer>>,
    /// Bumped on every successful start
    generation: AtomicU64,
    /// Bumped on every successful restart
    restarts: AtomicU64,
}

/// Puts the session back to `Stopped` if a start is abandoned midway
struct StartingGuard<'a> {
    state: &'a watch::Sender<SessionState>,
    armed: bool,
}

impl Drop for StartingGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            debug!("Start abandoned, session state: {}", SessionState::Stopped);
            self.state.send_replace(SessionState::Stopped);
        }
    }
}

impl ServerSession {
    /// A stopped session; call `start` to launch
    pub fn new(config: LaunchConfig, output: Arc<dyn OutputSink>) -> Self {
        let (state, _) = watch::channel(SessionState::Stopped);
        Self {
            config,
            output,
            state: Arc::new(state),
            current: Mutex::new(None),
            generation: AtomicU64::new(0),
            restarts: AtomicU64::new(0),
        }
    }

    /// Create a session and launch the server right away
    pub async fn launch(
        config: LaunchConfig,
        output: Arc<dyn OutputSink>,
    ) -> Result<Self, LaunchError> {
        let session = Self::new(config, output);
        session.start().await?;
        Ok(session)
    }

    pub fn config(&self) -> &LaunchConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Observe state transitions
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Number of children started so far
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Take the transport of the current child. Each child's transport is
    /// handed out once; after a restart a fresh one is available.
    pub async fn take_transport(&self) -> Option<ServerTransport> {
        self.current
            .lock()
            .await
            .as_mut()
            .and_then(RunningServer::take_transport)
    }

    pub async fn tcp_port(&self) -> Option<u16> {
        self.current.lock().await.as_ref().and_then(RunningServer::tcp_port)
    }

    pub async fn pid(&self) -> Option<u32> {
        self.current.lock().await.as_ref().and_then(RunningServer::pid)
    }

    /// Whether the current child has exited on its own
    pub async fn has_exited(&self) -> bool {
        self.current
            .lock()
            .await
            .as_ref()
            .map_or(true, RunningServer::has_exited)
    }

    /// Start the server if it is not already running. A child that died on
    /// its own is reaped and replaced.
    pub async fn start(&self) -> Result<(), LaunchError> {
        let mut current = self.current.lock().await;
        let alive = current.as_ref().is_some_and(|server| !server.has_exited());
        if alive && self.state() == SessionState::Running {
            debug!("Server already running");
            return Ok(());
        }
        self.stop_locked(&mut current).await;
        self.start_locked(&mut current).await
    }

    pub async fn stop(&self) {
        let mut current = self.current.lock().await;
        self.stop_locked(&mut current).await;
    }

    /// Stop the current child and start a new one with the same config and
    /// output sink. A caller that queued behind a restart which completed
    /// meanwhile shares that restart instead of spawning another child. A
    /// restart requested during a plain start waits for it, then restarts.
    pub async fn restart(&self) -> Result<(), LaunchError> {
        let observed = self.restarts.load(Ordering::SeqCst);
        let mut current = self.current.lock().await;

        if self.restarts.load(Ordering::SeqCst) != observed && current.is_some() {
            debug!("Restart already performed by a concurrent caller");
            return Ok(());
        }

        info!("Restarting language server");
        self.stop_locked(&mut current).await;

        self.output.append_line("");
        self.output.append_line(RESTART_BANNER);
        self.output.append_line("");

        self.start_locked(&mut current).await?;
        self.restarts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn start_locked(&self, current: &mut Option<RunningServer>) -> Result<(), LaunchError> {
        self.set_state(SessionState::Starting);
        let mut guard = StartingGuard {
            state: &self.state,
            armed: true,
        };

        let result = RunningServer::spawn(&self.config, self.output.clone(), self.exit_hook()).await;
        guard.armed = false;

        match result {
            Ok(server) => {
                *current = Some(server);
                self.generation.fetch_add(1, Ordering::SeqCst);
                // The child may already have died and published `Stopped`
                self.state.send_if_modified(|state| {
                    if *state == SessionState::Starting {
                        *state = SessionState::Running;
                        true
                    } else {
                        false
                    }
                });
                debug!("Session state: {}", self.state());
                Ok(())
            }
            Err(e) => {
                self.set_state(SessionState::Stopped);
                Err(e)
            }
        }
    }

    /// Marks the session stopped when the child exits unprompted. A stop in
    /// progress owns the transition, so only `Starting` and `Running` change.
    fn exit_hook(&self) -> ExitHook {
        let state = self.state.clone();
        Box::new(move || {
            state.send_if_modified(|state| match *state {
                SessionState::Starting | SessionState::Running => {
                    info!("Language server exited unexpectedly");
                    *state = SessionState::Stopped;
                    true
                }
                _ => false,
            });
        })
    }

    async fn stop_locked(&self, current: &mut Option<RunningServer>) {
        if let Some(server) = current.take() {
            self.set_state(SessionState::Stopping);
            server.stop().await;
        }
        self.set_state(SessionState::Stopped);
    }

    fn set_state(&self, state: SessionState) {
        debug!("Session state: {}", state);
        self.state.send_replace(state);
    }
}
