//! Redis Mock Connection - CLI Entry Point
//!
//! Loads a fixture file and replays commands against it, printing one JSON
//! line per outcome.

use anyhow::Result;
use clap::Parser;
use redis_mock_conn::{Cmd, Conn, MockConn, MockConnConfig, MockError, Reply};
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(
    name = "redis-mock-conn",
    about = "Mock Redis connection - replay commands against canned fixtures",
    version
)]
struct Args {
    /// Path to fixture file
    #[arg(short, long, default_value = "redis-mock.yaml")]
    config: PathBuf,

    /// Command to issue, e.g. "HGETALL person:1" (repeatable)
    #[arg(short = 'e', long = "exec", value_name = "COMMAND")]
    exec: Vec<String>,

    /// Send every command first, then receive all replies
    #[arg(long)]
    pipeline: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'L', long, default_value = "info")]
    log_level: Level,

    /// Print default fixture and exit
    #[arg(long)]
    print_config: bool,

    /// Validate fixture and exit
    #[arg(long)]
    validate: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // Print default fixture if requested
    if args.print_config {
        let default_config = include_str!("../fixtures/default.yaml");
        println!("{}", default_config);
        return Ok(());
    }

    // Load fixture
    let config = if args.config.exists() {
        info!(path = ?args.config, "Loading fixture");
        MockConnConfig::from_file(&args.config)?
    } else if args.validate {
        anyhow::bail!("Fixture file not found: {:?}", args.config);
    } else {
        info!("Using empty fixture (no commands registered)");
        MockConnConfig::default()
    };

    // Validate and exit if requested
    if args.validate {
        config.validate()?;
        println!(
            "Fixture is valid ({} commands, {} responses)",
            config.commands.len(),
            config.response_count()
        );
        return Ok(());
    }

    let conn = MockConn::from_config(&config)?;
    let commands = args
        .exec
        .iter()
        .map(|line| parse_command(line))
        .collect::<Result<Vec<_>>>()?;

    if args.pipeline {
        for command in &commands {
            conn.send(command).await?;
        }
        conn.flush().await?;
        for command in &commands {
            print_outcome(command, conn.receive().await)?;
        }
    } else {
        for command in &commands {
            print_outcome(command, conn.do_cmd(command).await)?;
        }
    }

    info!(
        requests = conn.total_requests(),
        matched = conn.total_matched(),
        unmatched = conn.total_unmatched(),
        "Replay finished"
    );

    Ok(())
}

/// Split a command line into name and whitespace-separated arguments.
fn parse_command(line: &str) -> Result<Cmd> {
    let mut parts = line.split_whitespace();
    let name = parts
        .next()
        .ok_or_else(|| anyhow::anyhow!("Empty command: {:?}", line))?;
    Ok(Cmd::with_args(name, parts))
}

fn print_outcome(command: &Cmd, outcome: Result<Reply, MockError>) -> Result<()> {
    let line = match outcome {
        Ok(reply) => serde_json::json!({
            "command": command.to_string(),
            "reply": reply,
        }),
        Err(e) => serde_json::json!({
            "command": command.to_string(),
            "error": e.to_string(),
        }),
    };
    println!("{}", serde_json::to_string(&line)?);
    Ok(())
}
