use std::time::Duration;

use amqp_bench::client::Client;
use amqp_bench::config::{parse_engine, parse_param_kv, Options};
use amqp_bench::transport::Engine;
use amqp_bench::workload::{ReceiverWorkload, SenderWorkload, Workload};
use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tokio::signal;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "amqp-bench")]
#[command(about = "Load-testing harness for an AMQP messaging endpoint")]
struct Cli {
    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct CommonArgs {
    /// Messaging engine (amqp|mock)
    #[arg(long, default_value = "amqp")]
    engine: String,

    /// Endpoint address
    #[arg(long, default_value = "amqp://127.0.0.1:5672/%2f")]
    address: String,

    /// SASL username
    #[arg(long)]
    user: Option<String>,

    /// SASL password
    #[arg(long)]
    pass: Option<String>,

    /// Node (queue) the link attaches to
    #[arg(long, default_value = "bench")]
    node: String,

    /// Engine connect options as KEY=VALUE (repeatable)
    #[arg(long, value_parser = clap::builder::NonEmptyStringValueParser::new())]
    param: Vec<String>,

    /// Total operation count (0 = run until interrupted)
    #[arg(long, default_value = "0")]
    count: u64,

    /// Number of concurrent operation loops
    #[arg(long, default_value = "1")]
    requests: u32,

    /// Log a progress line every N attempts (0 = disabled)
    #[arg(long, default_value = "0")]
    progress: u64,

    /// Open timeout in seconds (connection, session, link)
    #[arg(long, default_value = "30")]
    open_timeout: u64,

    /// Per-operation timeout in milliseconds
    #[arg(long, default_value = "5000")]
    op_timeout: u64,

    /// Close timeout in seconds
    #[arg(long, default_value = "10")]
    close_timeout: u64,
}

impl CommonArgs {
    fn into_options(self) -> Result<Options> {
        let engine = parse_engine(&self.engine)
            .ok_or_else(|| anyhow::anyhow!("unknown engine: {}", self.engine))?;
        Ok(Options {
            engine,
            address: self.address,
            username: self.user,
            password: self.pass,
            node: self.node,
            count: self.count,
            requests: self.requests,
            progress: self.progress,
            open_timeout: Duration::from_secs(self.open_timeout),
            op_timeout: Duration::from_millis(self.op_timeout),
            close_timeout: Duration::from_secs(self.close_timeout),
            params: parse_param_kv(&self.param),
            ..Options::default()
        })
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Sender client: each operation sends one message
    Send {
        #[command(flatten)]
        common: CommonArgs,

        /// Payload size in bytes
        #[arg(long, default_value = "1024")]
        payload: u32,
    },
    /// Receiver client: each operation receives one message
    Recv {
        #[command(flatten)]
        common: CommonArgs,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    amqp_bench::logging::init(&cli.log_level)?;

    match cli.command {
        Commands::Send { common, payload } => {
            let mut options = common.into_options()?;
            options.payload_size = payload as usize;
            let workload = SenderWorkload::new(
                options.node.clone(),
                options.payload_size,
                options.op_timeout,
            );
            drive(Client::new(options, workload)).await
        }
        Commands::Recv { common } => {
            let options = common.into_options()?;
            let workload = ReceiverWorkload::new(options.node.clone(), options.op_timeout);
            drive(Client::new(options, workload)).await
        }
    }
}

/// Init, run until done or interrupted, clean up, report.
async fn drive<W: Workload + 'static>(mut client: Client<W>) -> Result<()> {
    client.init().await?;

    if client.options().count == 0 {
        warn!("count is 0; running until interrupted (Ctrl+C)");
    }

    tokio::select! {
        res = client.run() => res?,
        _ = signal::ctrl_c() => {
            warn!("Ctrl+C received, stopping");
        }
    }

    client.cleanup().await?;

    let snap = client.run_state().snapshot();
    info!(
        attempts = snap.attempts,
        successes = snap.successes,
        failures = snap.failures,
        p50_ms = format!("{:.2}", snap.latency_ns_p50 as f64 / 1_000_000.0),
        p99_ms = format!("{:.2}", snap.latency_ns_p99 as f64 / 1_000_000.0),
        "Final harness statistics"
    );
    println!("{}", client.status());
    Ok(())
}
