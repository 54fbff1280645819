//! Sidetree Node - local node on in-memory ledger and CAS.
//! Reads newline-delimited commands from stdin:
//!   operation <json>   submit an operation request
//!   resolve <did>      resolve a DID
//!   batch              write a batch now
//!   observe            process new ledger transactions now

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use sidetree_core::config::{Config, ProtocolVersionConfig};
use sidetree_core::{Collaborators, Core};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Node configuration (JSON). Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Protocol version table (JSON list). A single "1.0" from time 0 when omitted.
    #[arg(short, long)]
    versions: Option<PathBuf>,

    /// Do not start the periodic batch writer and observer.
    #[arg(long)]
    manual: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    // 1. Load configuration
    let config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    let versions = match &args.versions {
        Some(path) => ProtocolVersionConfig::list_from_file(path)?,
        None => vec![ProtocolVersionConfig { start_time: 0, version: "1.0".to_string(), parameters: Default::default() }],
    };

    // 2. Start the node
    let core = Core::new(config, &versions, Collaborators::in_memory()).context("starting node")?;
    if !args.manual {
        core.start().await;
    }
    info!("Ready. Commands: operation <json> | resolve <did> | batch | observe");

    // 3. Serve stdin until EOF or Ctrl-C
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line? {
                    Some(line) => handle_command(&core, line.trim()).await,
                    None => break,
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    core.close().await;
    Ok(())
}

async fn handle_command(core: &Core, line: &str) {
    let (command, argument) = line.split_once(' ').unwrap_or((line, ""));
    match command {
        "" => {}
        "operation" => print_json(&core.handle_operation_request(argument.trim().as_bytes()).await),
        "resolve" => print_json(&core.handle_resolve_request(argument.trim()).await),
        "batch" => match core.trigger_batch_writing().await {
            Ok(count) => println!("{{\"anchored_operations\":{}}}", count),
            Err(e) => error!("Batch failed: {}", e),
        },
        "observe" => {
            if let Err(e) = core.trigger_process_transactions().await {
                error!("Observing failed: {}", e);
            }
        }
        other => error!("Unknown command '{}'", other),
    }
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string(value) {
        Ok(s) => println!("{}", s),
        Err(e) => error!("Cannot render response: {}", e),
    }
}
