//! lamco-clipshare - LAN clipboard sharing
//!
//! Entry point for the node binary.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lamco_clipshare::clipboard::{
    ArgumentSource, ClipboardSource, Payload, SourceData, SourceEntry, SpoolClipboard,
};
use lamco_clipshare::config::{Config, LoggingConfig};
use lamco_clipshare::discovery::{Discovery, MdnsDiscovery, PeerId, StaticDiscovery};
use lamco_clipshare::server::{ClipShareNode, NodeSummary};
use lamco_clipshare::utils::format_user_error;

/// Command-line arguments for lamco-clipshare
#[derive(Parser, Debug)]
#[command(name = "lamco-clipshare")]
#[command(version, about = "LAN clipboard sharing", long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short, long, env = "CLIPSHARE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Listen address (e.g., 0.0.0.0:52700)
    #[arg(short, long, env = "CLIPSHARE_LISTEN_ADDR")]
    pub listen: Option<String>,

    /// Verbose logging (can be specified multiple times)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Log format (json|pretty|compact)
    #[arg(long, default_value = "pretty")]
    pub log_format: String,

    /// Write logs to file (in addition to stdout)
    #[arg(long)]
    pub log_file: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

/// Node operations
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Accept transfers and spool received payloads
    Serve,

    /// Send one payload to a peer and exit when the transfer ends
    Send {
        /// Destination peer name
        #[arg(short, long)]
        peer: String,

        /// Text item (repeatable, one item each)
        #[arg(short, long)]
        text: Vec<String>,

        /// File item as PATH or PATH:TYPE (repeatable, one item each)
        #[arg(short, long)]
        file: Vec<String>,
    },

    /// List configured and discovered peers
    Peers,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => return report_failure(&e),
    };

    // Initialize logging
    if let Err(e) = init_logging(&args, &config.logging) {
        return report_failure(&e);
    }

    info!("════════════════════════════════════════════════════════");
    info!("  lamco-clipshare v{}", env!("CARGO_PKG_VERSION"));
    info!("  Built: {} {}", env!("BUILD_DATE"), env!("BUILD_TIME"));
    info!("  Commit: {}", env!("GIT_HASH"));
    info!("  Profile: {}", if cfg!(debug_assertions) { "debug" } else { "release" });
    info!("════════════════════════════════════════════════════════");
    debug!("Config: {:?}", config);

    match run(&args, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => report_failure(&e),
    }
}

/// Print a fatal error once, formatted for the user
fn report_failure(error: &anyhow::Error) -> ExitCode {
    eprintln!("{}", format_user_error(error));
    ExitCode::FAILURE
}

async fn run(args: &Args, config: Config) -> Result<()> {
    let configured = StaticDiscovery::from_config(&config.peers)?;
    if config.discovery.mdns {
        let discovery = MdnsDiscovery::new(&config.discovery, configured)
            .context("Failed to start mDNS discovery")?;
        dispatch(args, config, discovery).await
    } else {
        dispatch(args, config, configured).await
    }
}

async fn dispatch<D: Discovery>(args: &Args, config: Config, discovery: D) -> Result<()> {
    match &args.command {
        Command::Serve => serve(config, discovery).await,
        Command::Send { peer, text, file } => {
            send(config, discovery, args, peer, text, file).await
        }
        Command::Peers => list_peers(discovery).await,
    }
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("lamco-clipshare").join("config.toml"))
}

fn load_config(args: &Args) -> Result<Config> {
    let config = match &args.config {
        Some(path) => Config::load(path)?,
        None => match default_config_path().filter(|p| p.exists()) {
            Some(path) => Config::load(&path)?,
            None => Config::default_config()?,
        },
    };

    let config = config.with_overrides(args.listen.clone());
    config.validate()?;
    Ok(config)
}

async fn serve<D: Discovery>(config: Config, discovery: D) -> Result<()> {
    let sink = SpoolClipboard::new(&config.clipboard.spool_dir).with_context(|| {
        format!(
            "Failed to create spool directory {}",
            config.clipboard.spool_dir.display()
        )
    })?;

    info!("Spooling received payloads into {}", sink.dir().display());
    let node = ClipShareNode::bind(&config, sink, discovery).await?;

    let handle = node.handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received");
            let _ = handle.shutdown();
        }
    });

    let summary = node.run().await?;
    log_summary(&summary);
    info!("Node shut down");
    Ok(())
}

async fn send<D: Discovery>(
    mut config: Config,
    mut discovery: D,
    args: &Args,
    peer: &str,
    text: &[String],
    files: &[String],
) -> Result<()> {
    let peer_id = PeerId::from(peer);
    let address = discovery.resolve(&peer_id).await?;

    let entries = source_entries(&config, text, files);
    if entries.is_empty() {
        anyhow::bail!("Nothing to send: pass --text or --file");
    }
    let payload = Payload::new(ArgumentSource::new(entries).read_items()?);
    info!(
        "Sending {} items ({} bytes) to {} at {}",
        payload.len(),
        payload.encoded_len(),
        peer,
        address
    );

    // A one-shot sender must not collide with a serving node on this host
    if args.listen.is_none() {
        config.node.listen_addr = "0.0.0.0:0".to_string();
    }

    let sink = SpoolClipboard::new(&config.clipboard.spool_dir)?;
    let node = ClipShareNode::bind(&config, sink, discovery)
        .await?
        .exit_when_idle(true);
    node.handle().send(peer_id, payload)?;

    let summary = node.run().await?;
    log_summary(&summary);
    if summary.failed_sends > 0 {
        anyhow::bail!("Send to {} failed", peer);
    }
    Ok(())
}

fn source_entries(config: &Config, text: &[String], files: &[String]) -> Vec<SourceEntry> {
    let texts = text.iter().map(|t| SourceEntry {
        type_tag: config.clipboard.text_type.clone(),
        data: SourceData::Text(t.clone()),
    });
    let files = files.iter().map(|spec| {
        let (path, type_tag) = split_file_spec(spec, &config.clipboard.file_type);
        SourceEntry {
            type_tag,
            data: SourceData::File(path),
        }
    });
    texts.chain(files).collect()
}

/// Split `PATH:TYPE`, keeping paths that merely contain a colon intact
fn split_file_spec(spec: &str, default_type: &str) -> (PathBuf, String) {
    match spec.rsplit_once(':') {
        Some((path, tag)) if !path.is_empty() && !tag.is_empty() && !Path::new(spec).exists() => {
            (PathBuf::from(path), tag.to_string())
        }
        _ => (PathBuf::from(spec), default_type.to_string()),
    }
}

async fn list_peers<D: Discovery>(mut discovery: D) -> Result<()> {
    let peers = discovery.browse().await?;

    if peers.is_empty() {
        println!("No peers found");
        return Ok(());
    }
    for peer in peers {
        println!("{:<24} {}", peer.id, peer.address);
    }
    Ok(())
}

fn log_summary(summary: &NodeSummary) {
    let stats = &summary.sessions;
    info!(
        "Transfers: {} received ({} items, {} delivered), {} sent, {} rejected, {} failed sends",
        stats.inbound_finished,
        stats.items_received,
        stats.payloads_delivered,
        stats.outbound_finished,
        stats.rejected,
        summary.failed_sends
    );
}

fn init_logging(args: &Args, logging: &LoggingConfig) -> Result<()> {
    use std::fs::File;

    let log_level = match args.verbose {
        0 => logging.level.as_str(),
        1 => "debug",
        _ => "trace",
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!("lamco={level},warn", level = log_level))
    });

    let log_file_path = args.log_file.clone().map(PathBuf::from).or_else(|| {
        logging
            .log_dir
            .as_ref()
            .map(|dir| dir.join("lamco-clipshare.log"))
    });

    // If log file is specified, write to both stdout and file
    if let Some(log_file_path) = &log_file_path {
        let file = File::create(log_file_path)
            .with_context(|| format!("Failed to create log file {}", log_file_path.display()))?;

        match args.log_format.as_str() {
            "json" => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(
                        tracing_subscriber::fmt::layer()
                            .json()
                            .with_writer(std::io::stdout),
                    )
                    .with(
                        tracing_subscriber::fmt::layer()
                            .json()
                            .with_writer(file)
                            .with_ansi(false),
                    )
                    .init();
            }
            "compact" => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(
                        tracing_subscriber::fmt::layer()
                            .compact()
                            .with_writer(std::io::stdout),
                    )
                    .with(
                        tracing_subscriber::fmt::layer()
                            .compact()
                            .with_writer(file)
                            .with_ansi(false),
                    )
                    .init();
            }
            _ => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(
                        tracing_subscriber::fmt::layer()
                            .pretty()
                            .with_writer(std::io::stdout),
                    )
                    .with(
                        tracing_subscriber::fmt::layer()
                            .with_writer(file)
                            .with_ansi(false),
                    )
                    .init();
            }
        }
        info!("Logging to file: {}", log_file_path.display());
    } else {
        // Stdout only
        match args.log_format.as_str() {
            "json" => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(tracing_subscriber::fmt::layer().json())
                    .init();
            }
            "compact" => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(tracing_subscriber::fmt::layer().compact())
                    .init();
            }
            _ => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(tracing_subscriber::fmt::layer().pretty())
                    .init();
            }
        }
    }

    if args.log_format != "json" && args.log_format != "compact" && args.log_format != "pretty" {
        warn!("Unknown log format {}, using pretty", args.log_format);
    }

    Ok(())
}
