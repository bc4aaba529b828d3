//! Process launcher
//!
//! Starts the server process, establishes the transport and forwards every
//! diagnostic line the child prints to the output sink.

use crate::server::platform::ensure_executable;
use crate::server::transport::{ServerTransport, TransportConfig};
use crate::types::{LaunchError, OutputSink};
use std::collections::BTreeMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Longer lines are cut; the rest of the line is read and dropped
const MAX_LINE_LENGTH: usize = 64 * 1024;

/// How long the exit line waits for the output forwarders to drain
const DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Everything needed to start the server; built once, then only read
#[derive(Debug, Clone)]
pub struct LaunchConfig {
    pub executable: PathBuf,
    pub transport: TransportConfig,
    pub working_dir: Option<PathBuf>,
    /// Overrides layered over the inherited environment
    pub env: BTreeMap<String, String>,
    /// Bound on waiting for a tcp server to connect back
    pub connect_timeout: Duration,
    /// Time a stopping server gets to exit before it is killed
    pub shutdown_grace: Duration,
}

impl LaunchConfig {
    pub fn new(executable: impl Into<PathBuf>, transport: TransportConfig) -> Self {
        Self {
            executable: executable.into(),
            transport,
            working_dir: None,
            env: BTreeMap::new(),
            connect_timeout: Duration::from_secs(30),
            shutdown_grace: Duration::from_secs(2),
        }
    }

    fn command(&self, args: &[String]) -> Command {
        let mut command = Command::new(&self.executable);
        command.args(args).envs(&self.env).kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }
        command
    }

    fn spawn_error(&self, source: std::io::Error) -> LaunchError {
        LaunchError::Spawn {
            path: self.executable.clone(),
            source,
        }
    }
}

/// Called by the monitor when the child exits without being asked to
pub type ExitHook = Box<dyn FnOnce() + Send>;

/// A live child process plus its transport
#[derive(Debug)]
pub struct RunningServer {
    pid: Option<u32>,
    tcp_port: Option<u16>,
    transport: Option<ServerTransport>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    monitor: JoinHandle<()>,
}

enum Connection {
    Accepted(std::io::Result<(TcpStream, SocketAddr)>),
    Exited(std::io::Result<ExitStatus>),
    TimedOut,
}

impl RunningServer {
    /// Launch the server described by `config`
    pub async fn spawn(
        config: &LaunchConfig,
        output: Arc<dyn OutputSink>,
        on_exit: ExitHook,
    ) -> Result<Self, LaunchError> {
        ensure_executable(&config.executable);

        match config.transport {
            TransportConfig::Stdio => Self::spawn_stdio(config, output, on_exit).await,
            TransportConfig::Tcp { port } => Self::spawn_tcp(config, port, output, on_exit).await,
        }
    }

    async fn spawn_stdio(
        config: &LaunchConfig,
        output: Arc<dyn OutputSink>,
        on_exit: ExitHook,
    ) -> Result<Self, LaunchError> {
        info!("Creating client at {}", config.executable.display());

        let mut child = config
            .command(&[])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| config.spawn_error(e))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| std::io::Error::other("Failed to get stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| std::io::Error::other("Failed to get stdout"))?;

        let forwarders = forward_streams(&mut child, &output);
        let transport = ServerTransport::Stdio { stdin, stdout };

        Ok(Self::supervise(
            child,
            transport,
            None,
            forwarders,
            config,
            output,
            on_exit,
        ))
    }

    async fn spawn_tcp(
        config: &LaunchConfig,
        port: u16,
        output: Arc<dyn OutputSink>,
        on_exit: ExitHook,
    ) -> Result<Self, LaunchError> {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, port))
            .await
            .map_err(|source| LaunchError::Bind { port, source })?;
        let port = listener.local_addr()?.port();

        info!(
            "Creating client at {} via TCP port {}",
            config.executable.display(),
            port
        );

        let args = ["--tcpClientPort".to_string(), port.to_string()];
        let mut child = config
            .command(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| config.spawn_error(e))?;

        let forwarders = forward_streams(&mut child, &output);

        let connection = tokio::select! {
            accepted = listener.accept() => Connection::Accepted(accepted),
            status = child.wait() => Connection::Exited(status),
            _ = tokio::time::sleep(config.connect_timeout) => Connection::TimedOut,
        };

        let stream = match connection {
            Connection::Accepted(Ok((stream, peer))) => {
                debug!("Server connected from {}", peer);
                stream
            }
            Connection::Accepted(Err(e)) => {
                let _ = child.kill().await;
                return Err(LaunchError::NoClientConnected {
                    port,
                    reason: e.to_string(),
                });
            }
            Connection::Exited(status) => {
                let reason = match status {
                    Ok(status) => {
                        let line = exit_line(&status);
                        output.append_line(&line);
                        format!("server exited before connecting ({})", line)
                    }
                    Err(e) => e.to_string(),
                };
                return Err(LaunchError::NoClientConnected { port, reason });
            }
            Connection::TimedOut => {
                let _ = child.kill().await;
                return Err(LaunchError::NoClientConnected {
                    port,
                    reason: format!(
                        "no connection within {}ms",
                        config.connect_timeout.as_millis()
                    ),
                });
            }
        };

        // Single client: stop listening once the server is connected
        drop(listener);
        info!("Closing listener on port {} since server has connected", port);

        let transport = ServerTransport::Tcp { stream, port };
        Ok(Self::supervise(
            child,
            transport,
            Some(port),
            forwarders,
            config,
            output,
            on_exit,
        ))
    }

    fn supervise(
        child: Child,
        transport: ServerTransport,
        tcp_port: Option<u16>,
        forwarders: Vec<JoinHandle<()>>,
        config: &LaunchConfig,
        output: Arc<dyn OutputSink>,
        on_exit: ExitHook,
    ) -> Self {
        let pid = child.id();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let monitor = tokio::spawn(monitor(
            child,
            shutdown_rx,
            config.shutdown_grace,
            forwarders,
            output,
            on_exit,
        ));

        Self {
            pid,
            tcp_port,
            transport: Some(transport),
            shutdown_tx: Some(shutdown_tx),
            monitor,
        }
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn tcp_port(&self) -> Option<u16> {
        self.tcp_port
    }

    /// Hand the transport to the protocol client; only the first call gets it
    pub fn take_transport(&mut self) -> Option<ServerTransport> {
        self.transport.take()
    }

    pub fn has_exited(&self) -> bool {
        self.monitor.is_finished()
    }

    /// Close our end of the transport and ask the child to terminate. It is
    /// killed if still alive after the grace period. Returns once reaped.
    pub async fn stop(mut self) {
        drop(self.transport.take());

        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }

        if let Err(e) = (&mut self.monitor).await {
            warn!("Server monitor task failed: {}", e);
        }
    }
}

/// Owns the child until it exits. Dropping the shutdown sender counts as a
/// shutdown request, so an abandoned server never outlives its owner.
async fn monitor(
    mut child: Child,
    shutdown_rx: oneshot::Receiver<()>,
    grace: Duration,
    forwarders: Vec<JoinHandle<()>>,
    output: Arc<dyn OutputSink>,
    on_exit: ExitHook,
) {
    let exited = tokio::select! {
        status = child.wait() => Some(status),
        _ = shutdown_rx => None,
    };
    let unprompted = exited.is_some();

    let status = match exited {
        Some(status) => status,
        None => {
            terminate(&child);
            match timeout(grace, child.wait()).await {
                Ok(status) => status,
                Err(_) => {
                    debug!("Server did not exit within {}ms, killing it", grace.as_millis());
                    match child.kill().await {
                        Ok(()) => child.wait().await,
                        Err(e) => Err(e),
                    }
                }
            }
        }
    };

    if timeout(DRAIN_TIMEOUT, futures::future::join_all(forwarders))
        .await
        .is_err()
    {
        debug!("Output forwarders still running after server exit");
    }

    match status {
        Ok(status) => {
            let line = exit_line(&status);
            info!("{}", line);
            output.append_line(&line);
        }
        Err(e) => warn!("Failed to wait for server process: {}", e),
    }

    if unprompted {
        on_exit();
    }
}

/// Ask the child to shut down with SIGTERM
#[cfg(unix)]
fn terminate(child: &Child) {
    use nix::sys::signal::{self, Signal};
    use nix::unistd::Pid;

    let Some(pid) = child.id() else {
        return;
    };
    match signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
        Ok(()) => debug!("Sent SIGTERM to server (PID: {})", pid),
        Err(e) => warn!("Failed to send SIGTERM to server (PID: {}): {}", pid, e),
    }
}

/// No polite signal to send; the grace period covers EOF-driven shutdown
#[cfg(not(unix))]
fn terminate(_child: &Child) {}

/// Forward stderr, and stdout when it is not the transport
fn forward_streams(child: &mut Child, output: &Arc<dyn OutputSink>) -> Vec<JoinHandle<()>> {
    let mut forwarders = Vec::new();
    if let Some(stdout) = child.stdout.take() {
        forwarders.push(forward_lines(stdout, output.clone()));
    }
    if let Some(stderr) = child.stderr.take() {
        forwarders.push(forward_lines(stderr, output.clone()));
    }
    forwarders
}

fn forward_lines<R>(reader: R, output: Arc<dyn OutputSink>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut line = Vec::new();
        // Keep reading until EOF; closing the pipe early would SIGPIPE the server
        loop {
            match read_line_capped(&mut reader, &mut line).await {
                Ok(Some(truncated)) => {
                    let text = String::from_utf8_lossy(&line);
                    if truncated {
                        output.append_line(&format!("{} [line truncated]", text));
                    } else {
                        output.append_line(&text);
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    debug!("Stopped forwarding server output: {}", e);
                    break;
                }
            }
        }
    })
}

/// Read one line without its terminator, keeping at most `MAX_LINE_LENGTH`
/// bytes. Returns whether the line was cut, or `None` at end of stream.
async fn read_line_capped<R>(reader: &mut R, line: &mut Vec<u8>) -> std::io::Result<Option<bool>>
where
    R: AsyncBufRead + Unpin,
{
    line.clear();
    let mut read_any = false;
    let mut truncated = false;

    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            break;
        }
        read_any = true;

        let newline = available.iter().position(|&b| b == b'\n');
        let content = &available[..newline.unwrap_or(available.len())];
        let room = MAX_LINE_LENGTH - line.len();
        if content.len() > room {
            truncated = true;
        }
        line.extend_from_slice(&content[..content.len().min(room)]);

        let used = newline.map_or(available.len(), |i| i + 1);
        reader.consume(used);
        if newline.is_some() {
            break;
        }
    }

    if !read_any {
        return Ok(None);
    }
    if line.last() == Some(&b'\r') {
        line.pop();
    }
    Ok(Some(truncated))
}

pub fn exit_line(status: &ExitStatus) -> String {
    let code = status
        .code()
        .map(|c| c.to_string())
        .unwrap_or_else(|| "null".to_string());

    format!(
        "The language server exited, code: {}, signal: {}",
        code,
        exit_signal(status)
    )
}

#[cfg(unix)]
fn exit_signal(status: &ExitStatus) -> String {
    use std::os::unix::process::ExitStatusExt;
    status
        .signal()
        .map(|s| s.to_string())
        .unwrap_or_else(|| "null".to_string())
}

#[cfg(not(unix))]
fn exit_signal(_status: &ExitStatus) -> String {
    "null".to_string()
}
