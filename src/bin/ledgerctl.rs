//! ledgerctl — operate a persisted attribution ledger from the command line.
//!
//! Usage:
//!   ledgerctl --db-path ./ledger.json record-time-fee --table t1 --club c1 --player p1 --state-version 1 --fee-amount 50
//!   ledgerctl --db-path ./ledger.json verify --from 1 --to 100
//!   ledgerctl --db-path ./ledger.json check-invariants --preset strict
//!   ledgerctl --db-path ./ledger.json query --club c1 --limit 20

use anyhow::{Context, Result};
use attribution_ledger::config::LedgerConfig;
use attribution_ledger::ids::AttributedParty;
use attribution_ledger::invariants::{InvariantChecker, InvariantConfig};
use attribution_ledger::recorder::{AdjustmentAttribution, BonusAttribution, Recorder, TimeFeeAttribution};
use attribution_ledger::store::{Clock, LedgerStore, StoreConfig, StoreSnapshot, SystemClock};
use attribution_ledger::view::{LedgerView, QueryParams};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "ledgerctl")]
#[command(about = "Operate a persisted attribution ledger")]
struct Cli {
    /// Path to the ledger's JSON snapshot file
    #[arg(long, env = "LEDGER_DB_PATH", default_value = "ledger.json")]
    db_path: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Record a time-fee debit/credit pair
    RecordTimeFee {
        #[arg(long)]
        table: String,
        #[arg(long)]
        club: String,
        #[arg(long)]
        player: String,
        #[arg(long)]
        state_version: String,
        #[arg(long)]
        fee_amount: i64,
    },

    /// Record a manual adjustment entry
    RecordAdjustment {
        #[arg(long)]
        party_type: String,
        #[arg(long)]
        party_id: String,
        #[arg(long)]
        state_version: String,
        #[arg(long)]
        delta: i64,
        #[arg(long)]
        reason: String,
    },

    /// Record a bonus credit to a player
    RecordBonus {
        #[arg(long)]
        player: String,
        #[arg(long)]
        state_version: String,
        #[arg(long)]
        amount: i64,
        #[arg(long)]
        description: String,
    },

    /// Verify the hash chain, optionally restricted to a sequence range
    Verify {
        #[arg(long)]
        from: Option<u64>,
        #[arg(long)]
        to: Option<u64>,
    },

    /// Run invariant checks against the current ledger
    CheckInvariants {
        /// default | strict | performance
        #[arg(long, default_value = "default")]
        preset: String,
    },

    /// Query entries by filter, printed as JSON
    Query {
        #[arg(long)]
        club: Option<String>,
        #[arg(long)]
        player: Option<String>,
        #[arg(long)]
        table: Option<String>,
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Print the store's JSON snapshot
    Export,
}

fn load_store(path: &PathBuf, config: StoreConfig) -> Result<LedgerStore> {
    if !path.exists() {
        return Ok(LedgerStore::new(config));
    }
    let contents = std::fs::read_to_string(path).with_context(|| format!("reading {:?}", path))?;
    let snapshot: StoreSnapshot = serde_json::from_str(&contents)?;
    Ok(LedgerStore::import(config, snapshot))
}

fn save_store(path: &PathBuf, store: &LedgerStore) -> Result<()> {
    let snapshot = store.export();
    let contents = serde_json::to_string_pretty(&snapshot)?;
    std::fs::write(path, contents).with_context(|| format!("writing {:?}", path))?;
    Ok(())
}

fn parse_party(party_type: &str, party_id: &str) -> Result<AttributedParty> {
    let party = match party_type {
        "player" => AttributedParty::Player(party_id.to_string().into()),
        "club" => AttributedParty::Club(party_id.to_string().into()),
        "agent" => AttributedParty::Agent(party_id.to_string().into()),
        "platform" => AttributedParty::Platform(party_id.to_string().into()),
        other => anyhow::bail!("unknown party type: {}", other),
    };
    Ok(party)
}

fn main() -> Result<()> {
    // Load a `.env` file (if any) before anything reads environment
    // variables: `LEDGER_CONFIG_PATH`, `LEDGER_DB_PATH`, and `RUST_LOG` are
    // all read below, directly or via clap/tracing-subscriber.
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let clock = SystemClock;
    let ledger_config = LedgerConfig::from_env();

    match cli.command {
        Commands::RecordTimeFee { table, club, player, state_version, fee_amount } => {
            let mut store = load_store(&cli.db_path, ledger_config.store.clone())?;
            let mut recorder = Recorder::new(ledger_config.recorder.clone());
            let attribution = TimeFeeAttribution {
                table_id: table.into(),
                club_id: club.into(),
                player_id: player.into(),
                state_version: state_version.into(),
                fee_amount,
            };
            let outcome = recorder.record_time_fee(&mut store, attribution, &clock)?;
            save_store(&cli.db_path, &store)?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }

        Commands::RecordAdjustment { party_type, party_id, state_version, delta, reason } => {
            let mut store = load_store(&cli.db_path, ledger_config.store.clone())?;
            let mut recorder = Recorder::new(ledger_config.recorder.clone());
            let affected_party = parse_party(&party_type, &party_id)?;
            let attribution = AdjustmentAttribution {
                affected_party,
                delta,
                state_version: state_version.into(),
                reason,
                table_id: None,
                club_id: None,
            };
            let entry = recorder.record_adjustment(&mut store, attribution, &clock)?;
            save_store(&cli.db_path, &store)?;
            println!("{}", serde_json::to_string_pretty(&entry)?);
        }

        Commands::RecordBonus { player, state_version, amount, description } => {
            let mut store = load_store(&cli.db_path, ledger_config.store.clone())?;
            let mut recorder = Recorder::new(ledger_config.recorder.clone());
            let attribution = BonusAttribution {
                player_id: player.into(),
                amount,
                state_version: state_version.into(),
                club_id: None,
                description,
            };
            let entry = recorder.record_bonus(&mut store, attribution, &clock)?;
            save_store(&cli.db_path, &store)?;
            println!("{}", serde_json::to_string_pretty(&entry)?);
        }

        Commands::Verify { from, to } => {
            let store = load_store(&cli.db_path, ledger_config.store.clone())?;
            let range = from.zip(to);
            let report = store.verify_integrity(range);
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.is_valid {
                std::process::exit(1);
            }
        }

        Commands::CheckInvariants { preset } => {
            let store = load_store(&cli.db_path, ledger_config.store.clone())?;
            let config = match preset.as_str() {
                "default" => ledger_config.invariants.clone(),
                "strict" => InvariantConfig::strict_preset(),
                "performance" => InvariantConfig::performance_preset(),
                other => anyhow::bail!("unknown preset: {}", other),
            };
            let checker = InvariantChecker::new(&store);
            let report = checker.check_all(&config, clock.now_millis());
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.all_passed {
                std::process::exit(1);
            }
        }

        Commands::Query { club, player, table, limit } => {
            let store = load_store(&cli.db_path, ledger_config.store.clone())?;
            let view = LedgerView::new(&store);
            let params = QueryParams {
                club_id: club.map(Into::into),
                player_id: player.map(Into::into),
                table_id: table.map(Into::into),
                limit,
                ..Default::default()
            };
            let rows = view.query(&params);
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }

        Commands::Export => {
            let store = load_store(&cli.db_path, ledger_config.store.clone())?;
            println!("{}", serde_json::to_string_pretty(&store.export())?);
        }
    }

    Ok(())
}
