use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::thread;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tokio::runtime::{Builder, Runtime};
use tokio::signal;
use tokio::sync::mpsc;
use tracing::info;

use myftp_abstract::{SimConfig, TransferConfig};
use myftp_cli::{Client, DirStore, Flow, Interrupts, NodeConfig, Overrides, Peer, ShellCommand};
use myftp_simulator::{Simulation, SimulationReport, scenario_runner};

#[derive(Parser, Debug)]
#[command(author, version, about = "Reliable file transfer over UDP")]
struct Args {
    /// TOML file with node and transfer settings.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand, Debug)]
enum Mode {
    /// Wait for a client and obey its get/put commands.
    Server(NodeArgs),
    /// Interactive shell: connect, get, put, quit.
    Client(NodeArgs),
    /// Run both engines over an impaired in-memory link.
    Simulate(SimulateArgs),
}

#[derive(clap::Args, Debug, Default)]
struct NodeArgs {
    #[arg(long)]
    bind: Option<String>,
    #[arg(long)]
    server_port: Option<u16>,
    #[arg(long)]
    client_port: Option<u16>,
    /// Directory files are served from.
    #[arg(long)]
    serve_dir: Option<PathBuf>,
    /// Directory received files are written to.
    #[arg(long)]
    download_dir: Option<PathBuf>,
    #[arg(long)]
    ack_timeout_ms: Option<u64>,
    #[arg(long)]
    linger_ms: Option<u64>,
}

impl From<NodeArgs> for Overrides {
    fn from(args: NodeArgs) -> Self {
        Overrides {
            bind_addr: args.bind,
            server_port: args.server_port,
            client_port: args.client_port,
            serve_dir: args.serve_dir,
            download_dir: args.download_dir,
            ack_timeout_ms: args.ack_timeout_ms,
            linger_ms: args.linger_ms,
        }
    }
}

#[derive(clap::Args, Debug)]
struct SimulateArgs {
    /// Load a scenario from disk.
    #[arg(long)]
    scenario: Option<PathBuf>,

    #[arg(long, default_value_t = 0.1)]
    loss: f64,
    #[arg(long, default_value_t = 0.05)]
    corrupt: f64,
    #[arg(long, default_value_t = 42)]
    seed: u64,
    /// Size of the generated blob when no scenario is given.
    #[arg(long, default_value_t = 20_000)]
    bytes: usize,

    /// Write a JSON trace of the finished simulation.
    #[arg(long)]
    trace_out: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt().with_writer(io::stderr).init();
    let mut config = NodeConfig::load(args.config.as_deref())?;

    match args.mode {
        Mode::Server(node) => {
            Overrides::from(node).apply_to(&mut config);
            live_runtime()?.block_on(run_server(config))
        }
        Mode::Client(node) => {
            Overrides::from(node).apply_to(&mut config);
            live_runtime()?.block_on(run_client(config))
        }
        Mode::Simulate(sim) => {
            // Simulated time: timeouts and latency elapse instantly.
            let runtime = Builder::new_current_thread()
                .enable_all()
                .start_paused(true)
                .build()
                .context("Failed to start simulation runtime")?;
            runtime.block_on(run_simulation(sim, config.transfer))
        }
    }
}

fn live_runtime() -> Result<Runtime> {
    Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start runtime")
}

/// First Ctrl-C cancels the running transfer; one with nothing running exits.
fn watch_interrupts(interrupts: Interrupts) {
    tokio::spawn(async move {
        while signal::ctrl_c().await.is_ok() {
            if interrupts.interrupt() {
                info!("transfer interrupted");
            } else {
                break;
            }
        }
    });
}

async fn bind_peer(config: &NodeConfig, port: u16) -> Result<Peer<DirStore>> {
    let store = DirStore::new(&config.serve_dir, &config.download_dir);
    Peer::bind((config.bind_addr.as_str(), port), store, config.transfer.clone())
        .await
        .with_context(|| format!("Failed to bind {}:{port}", config.bind_addr))
}

async fn run_server(config: NodeConfig) -> Result<()> {
    let interrupts = Interrupts::new();
    watch_interrupts(interrupts.clone());
    let peer = bind_peer(&config, config.server_port).await?;
    peer.serve(&interrupts).await?;
    Ok(())
}

/// Lines typed by the user. Read on a plain thread so a pending read never
/// holds up shutdown.
fn stdin_lines() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    thread::spawn(move || {
        for line in io::stdin().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

async fn run_client(config: NodeConfig) -> Result<()> {
    let interrupts = Interrupts::new();
    watch_interrupts(interrupts.clone());
    let peer = bind_peer(&config, config.client_port).await?;
    let mut client = Client::new(peer, config.server_port, interrupts.clone());
    let mut lines = stdin_lines();

    loop {
        print!("myftp> ");
        io::stdout().flush()?;
        let Ok(Some(line)) = interrupts.shutdown().guard(lines.recv()).await else {
            println!();
            break;
        };
        let command = match line.parse::<ShellCommand>() {
            Ok(command) => command,
            Err(err) => {
                println!("{err}");
                continue;
            }
        };
        match client.execute(command).await {
            Ok(Flow::Quit) => break,
            Ok(Flow::Continue) => {}
            Err(err) if err.is_cancelled() => println!("transfer cancelled"),
            Err(err) => println!("error: {err}"),
        }
    }
    Ok(())
}

async fn run_simulation(args: SimulateArgs, transfer: TransferConfig) -> Result<()> {
    let (report, failures) = match &args.scenario {
        Some(path) => {
            let scenario = scenario_runner::load_scenario(path)?;
            let result = scenario_runner::run_scenario(&scenario, transfer).await?;
            (result.report, result.failures)
        }
        None => {
            let config = SimConfig {
                loss_rate: args.loss,
                corrupt_rate: args.corrupt,
                seed: args.seed,
                ..Default::default()
            };
            let blob: Vec<u8> = (0..args.bytes).map(|i| (i % 251) as u8).collect();
            info!("Starting default headless simulation…");
            let outcome = Simulation::new(config, transfer)
                .named("default")
                .run(blob.into())
                .await?;
            (outcome.report, Vec::new())
        }
    };

    info!(
        delivered_intact = report.delivered_intact,
        duration_ms = report.duration_ms,
        datagrams = report.sender.datagrams_sent,
        retransmissions = report.sender.retransmissions,
        dropped = report.link.dropped,
        corrupted = report.link.corrupted,
        "Simulation summary"
    );
    if let Some(trace_path) = &args.trace_out {
        write_trace(trace_path, &report)?;
    }
    if !failures.is_empty() {
        bail!("{} assertion(s) failed: {}", failures.len(), failures.join("; "));
    }
    if !report.delivered_intact {
        bail!("receiver did not reassemble the payload");
    }
    Ok(())
}

fn write_trace(path: &Path, report: &SimulationReport) -> Result<()> {
    let data = serde_json::to_vec_pretty(report).context("Failed to serialize simulation trace")?;
    fs::write(path, &data)
        .with_context(|| format!("Failed to write trace file {}", path.display()))?;
    Ok(())
}
