mod commands;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use warden_core::codec::parse_u256;
use warden_core::{Address, U256};
use warden_engine::WardenConfig;

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

/// Multi-party approval workflows for role-guarded contracts.
#[derive(Parser)]
#[command(name = "warden", version, about = "Multi-party approval workflows for role-guarded contracts")]
struct Cli {
    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text", value_enum)]
    output: OutputFormat,

    /// Suppress non-essential output
    #[arg(long, global = true)]
    quiet: bool,

    /// Path to a TOML config file
    #[arg(long, global = true, env = "WARDEN_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the registered operations
    Operations,

    /// Time-lock progress of a record
    Progress {
        /// Release time of the record (unix seconds)
        release_time: u64,
        /// Time-lock period (seconds)
        lock: u64,
        /// Evaluate at this instant instead of now (unix seconds)
        #[arg(long)]
        now: Option<u64>,
    },

    /// Generate a secp256k1 signing key
    Keygen {
        /// Output file prefix (<prefix>.secret and <prefix>.addr)
        #[arg(long, default_value = "warden")]
        prefix: String,
    },

    /// Decode a signed payload and verify its signature
    Inspect {
        /// Path to a canonical JSON signed payload
        payload: PathBuf,
        /// Verifying contract for the EIP-712 domain (defaults to the handler contract)
        #[arg(long)]
        contract: Option<Address>,
    },

    /// Manage stored signed payloads
    Store {
        /// Store directory (overrides [store] dir)
        #[arg(long)]
        dir: Option<PathBuf>,
        #[command(subcommand)]
        command: StoreCommands,
    },

    /// Query a node for its chain id and gas price
    Probe {
        /// JSON-RPC endpoint
        #[arg(long, env = "WARDEN_RPC_URL")]
        rpc: String,
    },
}

#[derive(Subcommand)]
enum StoreCommands {
    /// List stored payloads for one contract, or for every contract
    List { contract: Option<Address> },
    /// Remove one stored payload
    Remove {
        contract: Address,
        #[arg(value_parser = parse_tx_id)]
        tx_id: U256,
    },
    /// Remove every stored payload for a contract
    Clear { contract: Address },
}

fn parse_tx_id(text: &str) -> Result<U256, String> {
    parse_u256(text).map_err(|e| e.to_string())
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(std::io::stderr)
        .without_time()
        .init();

    let config = match WardenConfig::discover(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            report_error(&e.to_string(), cli.output, cli.quiet);
            process::exit(1);
        }
    };

    match cli.command {
        Commands::Operations => commands::operations::cmd_operations(cli.output),
        Commands::Progress {
            release_time,
            lock,
            now,
        } => commands::progress::cmd_progress(release_time, lock, now, cli.output),
        Commands::Keygen { prefix } => {
            commands::keygen::cmd_keygen(&prefix, cli.output, cli.quiet)
        }
        Commands::Inspect { payload, contract } => {
            commands::inspect::cmd_inspect(&payload, contract, &config, cli.output, cli.quiet)
        }
        Commands::Store { dir, command } => {
            let dir = dir.unwrap_or_else(|| config.store.dir.clone());
            let action = match command {
                StoreCommands::List { contract } => commands::store::StoreAction::List(contract),
                StoreCommands::Remove { contract, tx_id } => {
                    commands::store::StoreAction::Remove(contract, tx_id)
                }
                StoreCommands::Clear { contract } => commands::store::StoreAction::Clear(contract),
            };
            commands::store::cmd_store(&dir, action, cli.output, cli.quiet)
        }
        Commands::Probe { rpc } => commands::probe::cmd_probe(&rpc, cli.output, cli.quiet),
    }
}

pub(crate) fn report_error(msg: &str, output: OutputFormat, quiet: bool) {
    if quiet {
        return;
    }
    match output {
        OutputFormat::Text => eprintln!("error: {}", msg),
        OutputFormat::Json => {
            eprintln!("{}", serde_json::json!({ "error": msg }));
        }
    }
}
