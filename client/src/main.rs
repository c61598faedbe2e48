use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueHint};
use gambit_client::adapters::memory::MemoryChain;
use gambit_client::adapters::simulated::SimulatedAdapter;
use gambit_client::EscrowClient;
use gambit_core::clock::ManualClock;
use gambit_core::interface::{load_escrow_data, save_escrow_data};
use gambit_core::{Address, Amount, EscrowLedger, EscrowMetadata, EscrowParams, Resolution};
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

const DEFAULT_ESCROW_PARAMS_PATH: &str = "./escrow_params.json";
const DEFAULT_ESCROW_METADATA_PATH: &str = "./escrow_metadata.json";
const DEFAULT_SCRIPT_PATH: &str = "./escrow_script.json";
const DEFAULT_MODULE_ADDRESS: &str = "0xc4e55";
// 2024-01-01T00:00:00Z, so simulated runs are reproducible
const SIMULATION_EPOCH: u64 = 1_704_067_200;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Create {
            params,
            outfile,
            module,
        } => {
            let params: EscrowParams = load_escrow_data(&params)?;
            let (client, _) = open(&module, 0, params.clone()).await?;

            let metadata = EscrowMetadata::new(params, &client.ledger());
            save_escrow_data(&outfile, &metadata)?;
            tracing::info!(escrow = %metadata.escrow, "Escrow created successfully");
        }
        Commands::Simulate {
            params,
            script,
            module,
            delay_ms,
        } => {
            let params: EscrowParams = load_escrow_data(&params)?;
            let steps: Vec<Step> = load_escrow_data(&script)?;
            let (client, clock) = open(&module, delay_ms, params.clone()).await?;

            for (i, step) in steps.iter().enumerate() {
                run_step(&client, &clock, &params, step)
                    .await
                    .with_context(|| format!("step {} ({step:?}) failed", i + 1))?;
            }
            client.disarm().await;

            let ledger = client.ledger();
            let report = Report {
                metadata: EscrowMetadata::new(params, &ledger),
                ledger,
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
            tracing::info!(steps = steps.len(), "Simulation finished");
        }
    }

    Ok(())
}

async fn open(
    module: &str,
    delay_ms: u64,
    params: EscrowParams,
) -> anyhow::Result<(EscrowClient<SimulatedAdapter>, Arc<ManualClock>)> {
    let module: Address = module.parse().context("parsing module address")?;
    let clock = Arc::new(ManualClock::new(SIMULATION_EPOCH));
    let chain = MemoryChain::new(module.clone(), clock.clone());
    let adapter = SimulatedAdapter::new(Arc::new(chain), Duration::from_millis(delay_ms));
    let creator = params.player1.clone();
    let client =
        EscrowClient::initialize_escrow(Arc::new(adapter), module, creator, params, clock.clone())
            .await?;
    Ok((client, clock))
}

async fn run_step(
    client: &EscrowClient<SimulatedAdapter>,
    clock: &ManualClock,
    params: &EscrowParams,
    step: &Step,
) -> anyhow::Result<()> {
    match step {
        Step::Deposit { player, amount } => {
            let amount = Amount::from_human(amount)?;
            client.deposit(player, amount).await?;
        }
        Step::Sign { player } => {
            client.sign_to_start_game(player).await?;
        }
        Step::Start { player } => {
            client.start_game(player).await?;
        }
        Step::Complete { player, winner } => {
            client.complete_game(player, winner).await?;
        }
        Step::Draw { player } => {
            client.complete_game_as_draw(player).await?;
        }
        Step::Dispute { player, reason } => {
            client.raise_dispute(player, reason.as_str()).await?;
        }
        Step::Resolve { resolution, notes } => {
            let resolution: Resolution = resolution.parse().map_err(anyhow::Error::msg)?;
            client
                .resolve_dispute(&params.config.arbiter, resolution, notes.as_str())
                .await?;
        }
        Step::Cancel { player } => {
            client.cancel_escrow(player).await?;
        }
        Step::Advance { secs } => {
            clock.advance(*secs);
        }
        Step::CheckTimeout => {
            let timed_out = client.check_timeout(&params.player1).await?;
            tracing::info!(timed_out, "Timeout checked");
        }
    }
    Ok(())
}

/// One scripted escrow call. Amounts are human-unit decimal strings.
#[derive(Debug, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
enum Step {
    Deposit { player: Address, amount: String },
    Sign { player: Address },
    Start { player: Address },
    Complete { player: Address, winner: Address },
    Draw { player: Address },
    Dispute { player: Address, reason: String },
    Resolve {
        resolution: String,
        #[serde(default)]
        notes: String,
    },
    Cancel { player: Address },
    /// Move the simulated clock forward.
    Advance { secs: u64 },
    CheckTimeout,
}

#[derive(Serialize)]
struct Report {
    metadata: EscrowMetadata,
    ledger: EscrowLedger,
}

#[derive(Parser)]
#[command(name = "gambit-cli")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an escrow on a simulated chain and save its metadata
    Create {
        #[arg(short, long,
            value_parser,
            default_value = DEFAULT_ESCROW_PARAMS_PATH,
            value_hint = ValueHint::FilePath)]
        params: PathBuf,

        #[arg(short, long,
            value_parser,
            default_value = DEFAULT_ESCROW_METADATA_PATH,
            value_hint = ValueHint::FilePath)]
        outfile: PathBuf,

        #[arg(short, long, default_value = DEFAULT_MODULE_ADDRESS)]
        module: String,
    },
    /// Replay a script of escrow calls and print the final ledger
    Simulate {
        #[arg(short, long,
            value_parser,
            default_value = DEFAULT_ESCROW_PARAMS_PATH,
            value_hint = ValueHint::FilePath)]
        params: PathBuf,

        #[arg(short, long,
            value_parser,
            default_value = DEFAULT_SCRIPT_PATH,
            value_hint = ValueHint::FilePath)]
        script: PathBuf,

        #[arg(short, long, default_value = DEFAULT_MODULE_ADDRESS)]
        module: String,

        /// Artificial confirmation delay per call
        #[arg(long, default_value_t = 0)]
        delay_ms: u64,
    },
}
