// ============================================
// File: crates/wiretape/src/main.rs
// ============================================
//! # Wiretape Entry Point
//!
//! ## Creation Reason
//! Command-line front end for recording wire traffic into an operation
//! log and replaying it.
//!
//! ## Main Functionality
//! - CLI argument parsing with clap
//! - Logging initialization with tracing
//! - Configuration loading and flag overrides
//! - Ctrl+C wired to graceful shutdown
//!
//! ## Usage
//! ```bash
//! # Capture with tcpdump, then turn the capture into an op log
//! tcpdump -i eth0 -w traffic.pcap port 27017
//! wiretape record --pcap traffic.pcap --output traffic.ops
//!
//! # Replay at double speed, twice, with a per-op report
//! wiretape play --playback-file traffic.ops --host db2:27017 \
//!     --speed 2 --repeat 2 --report stats.jsonl
//!
//! # Look inside a log
//! wiretape inspect traffic.ops --limit 20
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - `RUST_LOG` wins over `-v`, which wins over `[logging] level`
//! - Setup failures exit with status 1; per-op failures never do
//!
//! ## Last Modified
//! v0.1.0 - Initial CLI implementation

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use wiretape::config::PlaybackOverrides;
use wiretape::{LogSource, OpLogReader, OpLogWriter, Player, Recorder, ReplayError, WiretapeConfig};
use wiretape_transport::{PcapFileSource, TcpDialer, TransportError};

// ============================================
// CLI Definition
// ============================================

/// Wiretape: MongoDB wire traffic capture and replay
#[derive(Parser, Debug)]
#[command(name = "wiretape")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Turn a packet capture into an operation log
    Record(RecordArgs),

    /// Replay an operation log against a live server
    Play(PlayArgs),

    /// Print the records of an operation log
    Inspect {
        /// Operation log to read
        log: PathBuf,

        /// Stop after this many records
        #[arg(long)]
        limit: Option<u64>,
    },
}

#[derive(Args, Debug)]
#[command(group(clap::ArgGroup::new("source").required(true).args(["pcap", "interface"])))]
struct RecordArgs {
    /// Capture file to read
    #[arg(short = 'f', long)]
    pcap: Option<PathBuf>,

    /// Network interface to capture from
    #[arg(short, long)]
    interface: Option<String>,

    /// Operation log to write
    #[arg(short, long)]
    output: PathBuf,

    /// Maximum out-of-order segments held per stream direction
    #[arg(short = 'b', long)]
    packet_buf_size: Option<usize>,

    /// Stop after writing this many ops
    #[arg(long)]
    max_ops: Option<u64>,

    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Args, Debug)]
struct PlayArgs {
    /// Operation log to replay
    #[arg(short, long)]
    playback_file: PathBuf,

    /// Target server (host:port)
    #[arg(long)]
    host: Option<String>,

    /// Maximum ops queued per session
    #[arg(short = 'b', long)]
    packet_buf_size: Option<usize>,

    /// Playback speed multiplier
    #[arg(long)]
    speed: Option<f64>,

    /// Number of passes over the log
    #[arg(long)]
    repeat: Option<u32>,

    /// Stop after dispatching this many ops
    #[arg(long)]
    max_ops: Option<u64>,

    /// Write a JSON-lines execution report
    #[arg(long)]
    report: Option<PathBuf>,

    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

// ============================================
// Main
// ============================================

#[tokio::main]
async fn main() {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Execute command
    let result = match cli.command {
        Commands::Record(args) => cmd_record(args).await,
        Commands::Play(args) => cmd_play(args).await,
        Commands::Inspect { log, limit } => {
            init_logging("warn");
            cmd_inspect(&log, limit).await
        }
    };

    // Handle errors
    if let Err(e) = result {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

// ============================================
// Commands
// ============================================

/// Records a capture into an operation log.
async fn cmd_record(args: RecordArgs) -> anyhow::Result<()> {
    let mut config = load_config(args.config.as_deref()).await?;
    config.apply_capture_overrides(args.packet_buf_size, args.max_ops);
    config.apply_verbosity(args.verbose);
    init_logging(&config.logging.level);
    config.validate()?;

    if let Some(interface) = args.interface {
        return Err(TransportError::UnsupportedSource {
            what: format!(
                "live interface {interface}; capture to a file with tcpdump and use --pcap"
            ),
        }
        .into());
    }
    let Some(pcap) = args.pcap else {
        return Err(ReplayError::startup_failed("no capture source given").into());
    };

    let mut source = PcapFileSource::open(&pcap).await?;
    let writer = OpLogWriter::create(&args.output).await?;

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    spawn_ctrl_c(shutdown_tx.clone());

    let summary = Recorder::new(config.capture)
        .run(&mut source, writer, shutdown_rx)
        .await?;

    println!();
    println!("Capture summary");
    println!("════════════════════════════════════════");
    println!("   Source:        {}", summary.source);
    if let Some(first) = summary.first_seen {
        println!("   First packet:  {first}");
    }
    println!("   Span:          {:?}", summary.capture_span());
    println!("   Packets:       {}", summary.stats.packets);
    println!("   Malformed:     {}", summary.stats.malformed_packets);
    println!("   Connections:   {}", summary.stats.connections_opened);
    println!(
        "   Gaps:          {} ({} bytes)",
        summary.stats.gaps, summary.stats.gap_bytes
    );
    println!(
        "   Dropped:       {} segments, {} late bytes",
        summary.stats.dropped_segments, summary.stats.late_bytes
    );
    println!("   Decode errors: {}", summary.stats.decode_errors);
    println!("   Ops written:   {}", summary.ops_written);
    println!("   Output:        {}", args.output.display());
    println!("════════════════════════════════════════");

    drop(shutdown_tx);
    Ok(())
}

/// Replays an operation log.
async fn cmd_play(args: PlayArgs) -> anyhow::Result<()> {
    let mut config = load_config(args.config.as_deref()).await?;
    config.apply_playback_overrides(PlaybackOverrides {
        target: args.host,
        queue_depth: args.packet_buf_size,
        speed: args.speed,
        repeat: args.repeat,
        max_ops: args.max_ops,
        report: args.report,
    });
    config.apply_verbosity(args.verbose);
    init_logging(&config.logging.level);
    config.validate()?;

    let source = LogSource::File(args.playback_file);
    // Fail on an unreadable log before touching the target.
    drop(source.open().await?);

    let dialer = TcpDialer::new(
        config.playback.target.clone(),
        config.playback.connect_timeout(),
    )
    .with_max_message_size(config.capture.max_message_size);
    let peer = dialer
        .check_reachable()
        .await
        .map_err(|e| ReplayError::TargetUnreachable {
            target: config.playback.target.clone(),
            reason: e.to_string(),
        })?;
    info!(target = %config.playback.target, %peer, "Target reachable");

    let mut player = Player::new(config.playback, Arc::new(dialer));
    spawn_ctrl_c(player.shutdown_handle());
    let report = player.run(&source).await?;

    println!();
    println!("Playback summary");
    println!("════════════════════════════════════════");
    println!("   Ops read:      {}", report.ops_read);
    println!("   Executed:      {}", report.ops_executed);
    println!("   Failed:        {}", report.ops_failed);
    println!("   Skipped:       {}", report.ops_skipped);
    println!("   Dropped:       {}", report.ops_dropped);
    println!("   Connections:   {}", report.connections);
    println!("   Max lag:       {:?}", report.max_lag);
    println!("   Elapsed:       {:?}", report.elapsed);
    println!("════════════════════════════════════════");

    Ok(())
}

/// Prints one line per record.
async fn cmd_inspect(path: &Path, limit: Option<u64>) -> anyhow::Result<()> {
    let mut reader = OpLogReader::open(path).await?;
    while limit.map_or(true, |max| reader.records_read() < max) {
        let Some(record) = reader.next_record().await? else {
            break;
        };
        println!(
            "{:>8}  {}  {:<8} {} -> {}  {}{}",
            record.order,
            record.seen,
            record.connection_id.to_string(),
            record.src,
            record.dst,
            record.op,
            if record.gap { "  [after gap]" } else { "" }
        );
    }
    Ok(())
}

// ============================================
// Helper Functions
// ============================================

/// Initializes the tracing subscriber.
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .try_init()
        .ok();
}

/// Loads the config file if one was given.
async fn load_config(path: Option<&Path>) -> anyhow::Result<WiretapeConfig> {
    match path {
        Some(path) => Ok(WiretapeConfig::load(path).await?),
        None => Ok(WiretapeConfig::default()),
    }
}

/// Sends on `shutdown` when Ctrl+C is pressed.
fn spawn_ctrl_c(shutdown: broadcast::Sender<()>) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl+C, shutting down...");
                let _ = shutdown.send(());
            }
            Err(e) => warn!("Failed to listen for Ctrl+C: {}", e),
        }
    });
}
