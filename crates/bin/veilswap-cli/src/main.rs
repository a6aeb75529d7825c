//! veilswap operational cli
//!
//! drives the local accumulator and the relayed swap protocol:
//! 1. inserts deposit commitments and serves authentication paths
//! 2. runs the full swap flow against configured prover/ledger/relayer
//!    endpoints

use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::info;
use veilswap_accumulator::Accumulator;
use veilswap_core::{encode, FieldElement};
use veilswap_relay::{
    EligibilityRequirement, HttpBalanceOracle, HttpLedger, HttpProver, HttpRelayer, RelayConfig,
    SwapDirection, SwapIntent, SwapOrchestrator, SwapPhase,
};

#[derive(Parser)]
#[command(name = "veilswap")]
#[command(about = "Shielded pool accumulator and relayed swap client")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// accumulator store path
    #[arg(long, default_value = "veilswap-store")]
    store: String,

    /// prover oracle endpoint
    #[arg(long, default_value = "http://localhost:8700")]
    prover: String,

    /// relayer endpoint
    #[arg(long, default_value = "http://localhost:8710")]
    relayer: String,

    /// ledger rpc endpoint
    #[arg(long, default_value = "http://localhost:8899")]
    ledger: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Insert a deposit commitment into a pool's tree
    Insert {
        /// pool id
        #[arg(long)]
        pool: String,

        /// commitment as a decimal field element
        #[arg(long)]
        commitment: String,
    },

    /// Print the authentication path for a leaf
    Path {
        #[arg(long)]
        pool: String,

        #[arg(long)]
        index: u64,
    },

    /// Print the current root of a pool's tree
    Root {
        #[arg(long)]
        pool: String,
    },

    /// Run a relayed private swap end to end
    Swap {
        #[arg(long)]
        pool: String,

        /// depositor address
        #[arg(long)]
        owner: String,

        /// recipient token account
        #[arg(long)]
        recipient: String,

        /// mint of the swapped asset
        #[arg(long)]
        mint: String,

        #[arg(long)]
        amount: u64,

        /// slippage bound
        #[arg(long, default_value_t = 0)]
        min_out: u64,

        /// swap direction: a-to-b or b-to-a
        #[arg(long, default_value = "a-to-b")]
        direction: String,

        /// require balance of the swapped asset at or above this floor
        #[arg(long)]
        min_balance: Option<u64>,

        /// require holdings of a gating asset, as mint:amount
        #[arg(long)]
        token_gate: Option<String>,

        /// require non-membership under this blacklist root
        #[arg(long)]
        exclusion_root: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "veilswap=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let accumulator = Arc::new(Accumulator::open(&cli.store)?);

    match cli.command {
        Commands::Insert { pool, commitment } => {
            let commitment = FieldElement::from_decimal(&commitment)?;
            let insertion = accumulator.insert(&pool, commitment)?;
            println!("index: {}", insertion.index);
            println!("root:  {}", insertion.new_root);
        }
        Commands::Path { pool, index } => {
            let path = accumulator.path(&pool, index)?;
            println!("{}", serde_json::to_string_pretty(&path)?);
        }
        Commands::Root { pool } => {
            println!("{}", accumulator.root(&pool)?);
        }
        Commands::Swap {
            pool,
            owner,
            recipient,
            mint,
            amount,
            min_out,
            direction,
            min_balance,
            token_gate,
            exclusion_root,
        } => {
            let config = RelayConfig {
                prover_endpoint: cli.prover,
                relayer_endpoint: cli.relayer,
                ledger_endpoint: cli.ledger,
                ..RelayConfig::default()
            };
            let intent = SwapIntent {
                pool_id: pool,
                owner,
                recipient,
                mint_in: mint,
                amount_in: amount,
                min_out,
                direction: parse_direction(&direction)?,
                guard_address: None,
                requirements: parse_requirements(min_balance, token_gate, exclusion_root)?,
            };

            let orchestrator = SwapOrchestrator::new(
                HttpProver::new(config.prover_endpoint.clone(), config.prover_timeout_secs),
                HttpBalanceOracle::new(
                    config.ledger_endpoint.clone(),
                    config.request_timeout_secs,
                    config.read_retry_attempts,
                ),
                HttpLedger::new(config.ledger_endpoint.clone(), config.request_timeout_secs),
                HttpRelayer::new(config.relayer_endpoint.clone(), config.request_timeout_secs),
                accumulator,
            );

            info!("starting swap of {} against pool {}", amount, intent.pool_id);
            let mut attempt = orchestrator.begin(intent)?;
            match orchestrator.run(&mut attempt).await {
                Ok(()) => {
                    println!("confirmed");
                    if let Some(signature) = &attempt.relay_signature {
                        println!("signature: {signature}");
                    }
                }
                Err(e) => {
                    println!("halted at {:?}: {e}", attempt.phase);
                    if attempt.phase != SwapPhase::Ineligible {
                        println!("re-run with the same arguments to resume this attempt");
                    }
                    std::process::exit(1);
                }
            }
        }
    }

    Ok(())
}

fn parse_direction(value: &str) -> anyhow::Result<SwapDirection> {
    match value {
        "a-to-b" => Ok(SwapDirection::AToB),
        "b-to-a" => Ok(SwapDirection::BToA),
        other => anyhow::bail!("unknown direction {other:?}, expected a-to-b or b-to-a"),
    }
}

fn parse_requirements(
    min_balance: Option<u64>,
    token_gate: Option<String>,
    exclusion_root: Option<String>,
) -> anyhow::Result<Vec<EligibilityRequirement>> {
    let mut requirements = Vec::new();
    if let Some(threshold) = min_balance {
        requirements.push(EligibilityRequirement::MinBalance { threshold });
    }
    if let Some(gate) = token_gate {
        let (mint, amount) = gate
            .split_once(':')
            .ok_or_else(|| anyhow::anyhow!("token gate must be mint:amount"))?;
        requirements.push(EligibilityRequirement::TokenHolder {
            mint: mint.to_string(),
            min_required: amount.parse()?,
        });
    }
    if let Some(root) = exclusion_root {
        requirements.push(EligibilityRequirement::Exclusion {
            blacklist_root: encode(&root),
        });
    }
    Ok(requirements)
}
