use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use campaign_atlas::report::{format_money, group_thousands};
use campaign_atlas::store::{load_demographics, save_demographics};
use campaign_atlas::{
    normalize, AtlasConfig, CampaignState, CityDirectory, MetricsEngine,
    PercentageConverter, RollIngestionPipeline, StrategicReportBuilder,
};

/// Electoral roll aggregation and campaign reconciliation
#[derive(Parser, Debug)]
#[command(name = "campaign-atlas")]
#[command(version)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, global = true, env = "CAMPAIGN_ATLAS_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Aggregate the electoral roll into the demographic table
    Ingest {
        /// Roll file (overrides paths.roll_source)
        #[arg(long)]
        source: Option<PathBuf>,
        /// Region code to keep (overrides region_code)
        #[arg(long)]
        region: Option<String>,
        /// Output file (overrides paths.demographics)
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Rebuild the campaign summary from both ledgers
    Rebuild,
    /// Build the strategic report for a question
    Report {
        /// Question text, used for exact-match numbers and list requests
        query: Vec<String>,
    },
    /// Show demographics and campaign metrics for one city
    Lookup {
        /// City name, any accents / casing
        city: Vec<String>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "campaign_atlas=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config = AtlasConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    match args.command {
        Command::Ingest {
            source,
            region,
            output,
        } => run_ingest(&config, source, region, output),
        Command::Rebuild => run_rebuild(&config),
        Command::Report { query } => run_report(&config, &query.join(" ")),
        Command::Lookup { city } => run_lookup(&config, &city.join(" ")),
    }
}

fn run_ingest(
    config: &AtlasConfig,
    source: Option<PathBuf>,
    region: Option<String>,
    output: Option<PathBuf>,
) -> Result<()> {
    let source = source.unwrap_or_else(|| config.paths.roll_source.clone());
    let output = output.unwrap_or_else(|| config.paths.demographics.clone());
    let region = region.unwrap_or_else(|| config.region_code.clone());

    println!("🗳️  Electoral roll → demographic table");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    println!("\n📂 Streaming {} (region {})...", source.display(), region);
    let pipeline = RollIngestionPipeline::new(region);
    let outcome = pipeline
        .ingest_path(&source)
        .with_context(|| format!("Failed to ingest roll: {}", source.display()))?;
    println!("✓ {}", outcome.stats.summary());

    let totals = outcome.table.state_totals();
    println!(
        "✓ {} cities, {} electors ({} women, {} men)",
        totals.cities,
        group_thousands(totals.total_electors),
        group_thousands(totals.feminine),
        group_thousands(totals.masculine)
    );

    println!("\n📊 Converting to percentages...");
    let table = PercentageConverter::convert(outcome.table);

    save_demographics(&output, &table)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    println!("✓ Saved {}", output.display());

    Ok(())
}

fn campaign_state(config: &AtlasConfig) -> CampaignState {
    CampaignState::new(&config.paths.votes_ledger, &config.paths.investments_ledger)
}

fn run_rebuild(config: &AtlasConfig) -> Result<()> {
    println!("⚖️  Rebuilding campaign summary from ledgers");

    let state = campaign_state(config).with_cache(&config.paths.campaign_summary);
    let outcome = state.refresh().context("Ledger rebuild failed")?;
    let stats = outcome.stats;
    let snapshot = state.snapshot();

    println!(
        "✓ {} cities ({} with votes, {} investment entries, {} skipped)",
        stats.cities, stats.vote_cities, stats.investment_entries, stats.skipped_investments
    );
    println!("✓ Fingerprint: {}", snapshot.fingerprint()?);
    match outcome.cache_error {
        None => println!("✓ Saved {}", config.paths.campaign_summary.display()),
        Some(e) => eprintln!(
            "⚠️  Summary cache not written ({}): {}",
            config.paths.campaign_summary.display(),
            e
        ),
    }

    Ok(())
}

fn run_report(config: &AtlasConfig, query: &str) -> Result<()> {
    let state = campaign_state(config);
    state.refresh().context("Ledger rebuild failed")?;
    let snapshot = state.snapshot();

    let demographics = load_demographics::<f64>(&config.paths.demographics)
        .with_context(|| format!("Failed to load {}", config.paths.demographics.display()))?;
    let directory = CityDirectory::load(&config.paths.cities)?;

    let builder = StrategicReportBuilder::new(config.report.clone()).with_directory(&directory);
    if !builder.is_strategic_query(query) {
        eprintln!("ℹ️  Query does not mention campaign topics; building the report anyway.");
    }

    let report = builder.build_report(&snapshot, &demographics, query);
    print!("{}", report.render());

    Ok(())
}

fn run_lookup(config: &AtlasConfig, city: &str) -> Result<()> {
    let key = normalize(city);
    let demographics = load_demographics::<f64>(&config.paths.demographics)
        .with_context(|| format!("Failed to load {}", config.paths.demographics.display()))?;
    let directory = CityDirectory::load(&config.paths.cities)?;

    let state = campaign_state(config);
    state.refresh().context("Ledger rebuild failed")?;
    let snapshot = state.snapshot();

    println!("🏙️  {} ({})", directory.name(&key).unwrap_or(city), key);

    match demographics.get(&key) {
        Some(data) => {
            println!("   {}", data.digest());
            println!(
                "   Gender: {:.1}% M | {:.1}% F | {:.1}% N",
                data.gender.masculine, data.gender.feminine, data.gender.unspecified
            );
        }
        None => println!("   Demographics unavailable"),
    }

    let summary = snapshot.get(&key).copied().unwrap_or_default();
    let metrics = MetricsEngine::derive(
        &summary,
        directory.population(&key),
        demographics.registered_electors(&key),
    );

    println!(
        "   Votes: {} | Invested: R$ {} | R$/vote: {:.2} | R$/inhabitant: {:.2} | Conversion: {:.2}%",
        group_thousands(summary.votes),
        format_money(summary.money),
        metrics.cost_per_vote,
        metrics.cost_per_capita,
        metrics.conversion_rate
    );

    Ok(())
}
