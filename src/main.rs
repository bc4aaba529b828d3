use anyhow::Result;
use clap::{Parser, Subcommand};
use futures::StreamExt;
use lsvisor::server::ServerTransport;
use lsvisor::types::{LogStatus, TracingSink};
use lsvisor::{ConfigLoader, SupervisorConfig, UpdateOutcome, VersionStore};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt, Stdin, Stdout};
use tokio_util::codec::{BytesCodec, FramedRead};
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, EnvFilter};

/// Language server supervisor
///
/// Downloads, updates, launches and restarts an external language server.
#[derive(Parser, Debug)]
#[command(name = "lsvisor")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file
    ///
    /// If not specified, looks for ./.lsvisor.toml, $LSVISOR_CONFIG and
    /// ~/.config/lsvisor/config.toml, then falls back to built-in defaults.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Log to file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Install or update the managed server
    Update,
    /// Show what is installed and where
    Info,
    /// Launch the server and proxy its transport over this process's stdio.
    /// SIGHUP restarts the server.
    Run,
}

fn setup_logging(log_level: &str, log_file: Option<PathBuf>) -> Result<()> {
    let level = match log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    let subscriber = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    // stdout is reserved for the proxied protocol in `run`
    if let Some(log_path) = log_file {
        let file = std::fs::File::create(log_path)?;
        subscriber.with_writer(file).init();
    } else {
        subscriber.with_writer(std::io::stderr).init();
    }

    Ok(())
}

fn print_info(config: &SupervisorConfig) -> Result<()> {
    let install_dir = config.install_dir()?;
    println!("server:      {}", config.server.display_name);
    println!("install dir: {}", install_dir.display());
    println!("executable:  {}", config.server_executable(&install_dir).display());

    if config.has_custom_path() {
        println!("version:     custom build (not managed)");
        return Ok(());
    }

    match VersionStore::new(&install_dir).read() {
        Some(info) => {
            println!("version:     {}", info.version);
            match chrono::DateTime::from_timestamp_millis(info.last_update) {
                Some(checked) => println!("last check:  {}", checked.to_rfc3339()),
                None => println!("last check:  never"),
            }
        }
        None => println!("version:     not installed"),
    }

    Ok(())
}

enum Bridge {
    ClientClosed,
    ServerClosed,
    Interrupted,
    Restart,
}

type ClientInput = FramedRead<Stdin, BytesCodec>;

/// SIGHUP listener, registered once for the whole run
struct Hangup {
    #[cfg(unix)]
    signal: Option<tokio::signal::unix::Signal>,
}

impl Hangup {
    #[cfg(unix)]
    fn new() -> Self {
        use tokio::signal::unix::{signal, SignalKind};
        let signal = signal(SignalKind::hangup())
            .map_err(|e| warn!("Cannot listen for SIGHUP: {}", e))
            .ok();
        Self { signal }
    }

    #[cfg(not(unix))]
    fn new() -> Self {
        Self {}
    }

    async fn recv(&mut self) {
        #[cfg(unix)]
        if let Some(signal) = self.signal.as_mut() {
            if signal.recv().await.is_some() {
                return;
            }
        }
        std::future::pending::<()>().await;
    }
}

async fn write_chunk<W>(writer: &mut W, bytes: &[u8]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    writer.write_all(bytes).await?;
    writer.flush().await
}

/// Pump bytes between our stdio and the server until one side goes away.
/// Client input and output outlive a single server, so a restart never drops
/// bytes already read from the client.
async fn bridge(
    transport: ServerTransport,
    client: &mut ClientInput,
    stdout: &mut Stdout,
    hangup: &mut Hangup,
) -> Bridge {
    let (reader, mut writer) = transport.into_split();
    let mut server = FramedRead::new(reader, BytesCodec::new());

    loop {
        tokio::select! {
            chunk = client.next() => match chunk {
                Some(Ok(bytes)) => {
                    if let Err(e) = write_chunk(&mut writer, &bytes).await {
                        warn!("Server stream error: {}", e);
                        return Bridge::ServerClosed;
                    }
                }
                Some(Err(e)) => {
                    warn!("Client stream error: {}", e);
                    return Bridge::ClientClosed;
                }
                None => return Bridge::ClientClosed,
            },
            chunk = server.next() => match chunk {
                Some(Ok(bytes)) => {
                    if let Err(e) = write_chunk(stdout, &bytes).await {
                        warn!("Client stream error: {}", e);
                        return Bridge::ClientClosed;
                    }
                }
                Some(Err(e)) => {
                    warn!("Server stream error: {}", e);
                    return Bridge::ServerClosed;
                }
                None => return Bridge::ServerClosed,
            },
            _ = tokio::signal::ctrl_c() => return Bridge::Interrupted,
            _ = hangup.recv() => return Bridge::Restart,
        }
    }
}

async fn run(config: &SupervisorConfig) -> Result<()> {
    let mut hangup = Hangup::new();
    let session = lsvisor::activate(config, &LogStatus, Arc::new(TracingSink)).await?;

    let mut client = FramedRead::new(tokio::io::stdin(), BytesCodec::new());
    let mut stdout = tokio::io::stdout();

    loop {
        let Some(transport) = session.take_transport().await else {
            warn!("Server transport unavailable");
            break;
        };

        match bridge(transport, &mut client, &mut stdout, &mut hangup).await {
            Bridge::Restart => {
                session.restart().await?;
            }
            Bridge::ClientClosed => {
                info!("Client closed the connection");
                break;
            }
            Bridge::ServerClosed => {
                info!("Language server closed the connection");
                break;
            }
            Bridge::Interrupted => {
                info!("Interrupted");
                break;
            }
        }
    }

    session.stop().await;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    setup_logging(&args.log_level, args.log_file)?;

    info!("Starting lsvisor v{}", env!("CARGO_PKG_VERSION"));

    let config = ConfigLoader::load(args.config.as_deref())?;

    match args.command {
        Command::Info => print_info(&config)?,
        Command::Update => {
            let outcome = lsvisor::update(&config, &LogStatus).await?;
            match outcome {
                UpdateOutcome::CoolingDown => println!("Checked recently, nothing to do"),
                UpdateOutcome::Offline { installed } => {
                    println!("Release index unreachable, keeping {}", installed)
                }
                UpdateOutcome::UpToDate { installed } => println!("{} is up to date", installed),
                UpdateOutcome::Installed { version } => println!("Installed {}", version),
            }
        }
        Command::Run => run(&config).await?,
    }

    Ok(())
}
