//! Replay a recorded detection log through the guard and report decisions.
//!
//! See `musth_guard_supervisor::replay` for the input format.

use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use musth_guard_core::{AlertCfg, CommandNotifier, DirectorySink, EvidenceSink, LogNotifier};
use musth_guard_supervisor::{replay, GuardSupervisor};

#[derive(Parser, Debug)]
#[command(name = "musth-replay", version, about = "Replay detection logs through the aggression guard")]
struct Cli {
    /// JSON-lines detection log
    #[arg(long)]
    input: PathBuf,

    /// TOML alert configuration (defaults apply when omitted)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory for combined-alert evidence images
    #[arg(long, default_value = "Aggressive")]
    evidence_dir: PathBuf,

    /// Show a desktop dialog on combined alerts instead of only logging
    #[arg(long)]
    dialog: bool,

    /// Emit logs as JSON
    #[arg(long)]
    json: bool,

    /// State shards
    #[arg(long, default_value_t = 1)]
    shards: usize,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_env("MUSTH_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer().with_target(false)).init();
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json);

    let cfg = match &cli.config {
        Some(path) => AlertCfg::from_toml_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => AlertCfg::default(),
    };
    let supervisor = GuardSupervisor::new(cli.shards, cfg)?;

    let mut sink: Box<dyn EvidenceSink<Frame = [u8]>> = if cli.dialog {
        Box::new(DirectorySink::new(&cli.evidence_dir, CommandNotifier::default()))
    } else {
        Box::new(DirectorySink::new(&cli.evidence_dir, LogNotifier))
    };

    let input = File::open(&cli.input).with_context(|| format!("opening {}", cli.input.display()))?;
    let summary = replay(&supervisor, BufReader::new(input), sink.as_mut())?;

    println!("frames: {}", summary.frames);
    println!("sources: {}", supervisor.source_count());
    for (kind, count) in &summary.tally {
        println!("{kind}: {count}");
    }
    if summary.sink_failures > 0 {
        println!("evidence failures: {}", summary.sink_failures);
    }
    Ok(())
}
