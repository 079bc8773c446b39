//! COFFER simulator.
//!
//! ```text
//! coffer_sim --catalog data/catalog.toml list
//! coffer_sim contents premium
//! coffer_sim simulate basic --draws 100000 --seed 42
//! coffer_sim open basic --player tg:1 --count 20 --coins 2000 --ledger openings.ledger
//! coffer_sim audit --ledger openings.ledger
//! ```
//!
//! Log verbosity follows `RUST_LOG` (default `info`).

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use coffer_economy::{
    Catalog, Currency, EconomyConfig, EconomyError, EconomyResult, EconomySystem, EntityKind,
    FileLedger, FixedPoint, MemoryLedger, MemoryStore, OpeningLedger, Rarity, RngSource,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(version, about = "Chest economy simulator")]
struct Cli {
    /// Catalog file.
    #[arg(long, default_value = "data/catalog.toml")]
    catalog: PathBuf,

    /// Economy settings file.
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List chests, cheapest first.
    List,
    /// Show a chest's resolved drop pool.
    Contents {
        /// Chest name.
        chest: String,
    },
    /// Draw repeatedly from a chest without touching any player.
    Simulate {
        /// Chest name.
        chest: String,
        #[arg(short, long, default_value_t = 100_000)]
        draws: u32,
        #[arg(short, long, default_value_t = 42)]
        seed: u64,
    },
    /// Open chests for one player through the full pipeline.
    Open(OpenArgs),
    /// Print every record in a ledger file.
    Audit {
        #[arg(long)]
        ledger: PathBuf,
    },
}

#[derive(Args)]
struct OpenArgs {
    /// Chest name.
    chest: String,
    #[arg(short, long, default_value = "sim:1")]
    player: String,
    #[arg(short = 'n', long, default_value_t = 10)]
    count: u32,
    /// Coins credited before opening.
    #[arg(long, default_value_t = 0)]
    coins: u64,
    /// Gems credited before opening.
    #[arg(long, default_value_t = 0)]
    gems: u64,
    /// Append openings to this ledger file instead of memory.
    #[arg(long)]
    ledger: Option<PathBuf>,
}

fn init_logging() {
    let filter = EnvFilter::builder()
        .with_default_directive(tracing::Level::INFO.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true)
        .init();
}

fn main() -> ExitCode {
    init_logging();
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "coffer_sim failed");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> EconomyResult<()> {
    let load = || -> EconomyResult<(Arc<Catalog>, EconomyConfig)> {
        let catalog = Arc::new(Catalog::load(&cli.catalog)?);
        let config = match &cli.config {
            Some(path) => EconomyConfig::load(path)?,
            None => EconomyConfig::default(),
        };
        Ok((catalog, config))
    };

    match &cli.command {
        Commands::Audit { ledger } => audit(ledger),
        Commands::List => list(&load()?.0),
        Commands::Contents { chest } => {
            let (catalog, config) = load()?;
            contents(catalog, config, chest)
        }
        Commands::Simulate { chest, draws, seed } => simulate(&load()?.0, chest, *draws, *seed),
        Commands::Open(args) => {
            let (catalog, config) = load()?;
            open(catalog, config, args)
        }
    }
}

fn list(catalog: &Catalog) -> EconomyResult<()> {
    for chest in catalog.chests_by_cost() {
        let guarantee = chest
            .guaranteed_minimum_rarity
            .map_or("-", Rarity::id);
        println!(
            "{:<12} {:<18} {:>6} {:<6} min={guarantee}",
            chest.name,
            chest.display_name,
            chest.cost,
            chest.currency.as_str(),
        );
    }
    Ok(())
}

fn contents(catalog: Arc<Catalog>, config: EconomyConfig, chest: &str) -> EconomyResult<()> {
    let system = EconomySystem::new(
        catalog,
        Arc::new(MemoryStore::new()),
        Arc::new(MemoryLedger::new()),
        config,
    );
    let contents = system.chest_contents(chest)?;
    let total: f64 = contents.items.iter().map(|c| c.drop_weight).sum();

    println!("{} ({})", contents.chest.display_name, contents.chest.name);
    for entry in &contents.items {
        println!(
            "  {:<16} {:<10} {:>8.3} {:>6.2}%",
            entry.item.name,
            entry.item.rarity.name,
            entry.drop_weight,
            entry.drop_weight / total * 100.0,
        );
    }
    Ok(())
}

fn simulate(catalog: &Catalog, chest: &str, draws: u32, seed: u64) -> EconomyResult<()> {
    let definition = catalog
        .chest_by_name(chest)
        .ok_or_else(|| EconomyError::not_found(EntityKind::Chest, chest))?;
    let table = catalog.resolve_candidates(definition)?;
    let mut rng = RngSource::seeded(seed);
    let stats = table.run_statistics(&mut rng, draws)?;

    println!("{draws} draws from {} (seed {seed})", definition.display_name);
    for rarity in Rarity::ALL {
        let share = stats.rarity_frequency(rarity);
        if share > 0.0 {
            println!("  {:<10} {:>7.3}%", rarity.id(), share * 100.0);
        }
    }
    for candidate in table.candidates() {
        println!(
            "    {:<16} {:>7.3}%",
            candidate.item.name,
            stats.item_frequency(&candidate.item.id) * 100.0
        );
    }
    Ok(())
}

fn open(catalog: Arc<Catalog>, config: EconomyConfig, args: &OpenArgs) -> EconomyResult<()> {
    let ledger: Arc<dyn OpeningLedger> = match &args.ledger {
        Some(path) => Arc::new(FileLedger::open(path)?),
        None => Arc::new(MemoryLedger::new()),
    };
    let system = EconomySystem::new(catalog, Arc::new(MemoryStore::new()), ledger, config);

    let player = system.ensure_player(&args.player, None)?;
    system.credit(player.id, Currency::Coins, FixedPoint::from_whole(args.coins))?;
    system.credit(player.id, Currency::Gems, FixedPoint::from_whole(args.gems))?;

    for _ in 0..args.count {
        let opened = system.open_chest(&args.player, &args.chest)?;
        println!(
            "#{:<4} {:<16} {:<10} paid {} {}, left {}",
            opened.instance_id,
            opened.item.name,
            opened.item.rarity.name,
            opened.cost_paid,
            opened.currency.as_str(),
            opened.balance_after,
        );
    }

    let player = system.player(player.id)?;
    println!(
        "{}: {} coins, {} gems, {} items",
        player.external_identity,
        player.coins,
        player.gems,
        system.player_items(player.id)?.len()
    );

    system.shutdown()
}

fn audit(path: &Path) -> EconomyResult<()> {
    for record in FileLedger::read(path)? {
        println!(
            "{:>6} {} player={} chest={} item={} rarity={} paid={} {}",
            record.id,
            record.opened_at.to_rfc3339(),
            record.player_id,
            record.chest_id,
            record.item_id,
            record.rarity.id(),
            record.cost_paid,
            record.currency.as_str(),
        );
    }
    Ok(())
}
