//! ans-etl CLI - Consolidate regulator expense statements
//!
//! # Main Commands
//!
//! ```bash
//! ans-etl run                          # Every stage, then run_report.json
//! ans-etl stats                        # Dataset statistics (JSON)
//! ans-etl operators list --search alfa # Registry directory
//! ```
//!
//! # Stage Commands
//!
//! ```bash
//! ans-etl registry                     # Load and check the registry
//! ans-etl consolidate                  # Archives → consolidated table
//! ans-etl validate                     # Consolidated → validated + invalid rows
//! ans-etl enrich                       # Validated → enriched + unmatched + conflicts
//! ans-etl aggregate                    # Enriched → aggregated
//! ans-etl package                      # Zip consolidated and aggregated tables
//! ```
//!
//! Paths come from the environment (`ANS_DATA_DIR`, ...) and can be
//! overridden with the global flags.

use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;

use ans_etl::transform::require_input;
use ans_etl::{
    load_registry_file, package_outputs, run_aggregation, run_consolidation, run_enrichment,
    run_pipeline, run_validation, OperatorDirectory, ParsePolicy, PipelineConfig, StatisticsService,
};

#[derive(Parser)]
#[command(name = "ans-etl")]
#[command(about = "Consolidate, validate and aggregate health-plan operator expenses", long_about = None)]
struct Cli {
    #[command(flatten)]
    paths: PathArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct PathArgs {
    /// Data directory (overrides ANS_DATA_DIR)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Statement archive root (overrides ANS_RAW_DIR)
    #[arg(long, global = true)]
    raw_dir: Option<PathBuf>,

    /// Operator registry file (overrides ANS_REGISTRY_PATH)
    #[arg(long, global = true)]
    registry: Option<PathBuf>,

    /// strict | tolerant (overrides ANS_PARSE_POLICY)
    #[arg(long, global = true)]
    policy: Option<ParsePolicy>,
}

#[derive(Subcommand)]
enum Commands {
    /// Full pipeline: registry → consolidate → validate → enrich → aggregate → package
    Run,

    /// Load the operator registry and report what was skipped
    Registry,

    /// Consolidate statement archives into the consolidated table
    Consolidate,

    /// Split the consolidated table into valid and invalid rows
    Validate,

    /// Join validated rows with the registry
    Enrich,

    /// Aggregate enriched rows per operator and region
    Aggregate,

    /// Zip the consolidated and aggregated tables
    Package,

    /// Print dataset statistics as JSON
    Stats,

    /// Browse operators
    Operators {
        #[command(subcommand)]
        action: OperatorAction,
    },
}

#[derive(Subcommand)]
enum OperatorAction {
    /// List registry records ordered by legal name
    List {
        #[arg(long, default_value = "1")]
        page: usize,

        #[arg(long, default_value = "10")]
        limit: usize,

        /// Tax id digits or part of the legal name
        #[arg(short, long)]
        search: Option<String>,
    },

    /// Show the registry record of a tax id
    Show {
        tax_id: String,
    },

    /// Show the quarterly expense history of a tax id
    Expenses {
        tax_id: String,
    },
}

type CliResult = Result<(), Box<dyn std::error::Error>>;

fn main() {
    let cli = Cli::parse();

    let result = build_config(&cli.paths).and_then(|config| match cli.command {
        Commands::Run => cmd_run(&config),
        Commands::Registry => cmd_registry(&config),
        Commands::Consolidate => cmd_consolidate(&config),
        Commands::Validate => cmd_validate(&config),
        Commands::Enrich => cmd_enrich(&config),
        Commands::Aggregate => cmd_aggregate(&config),
        Commands::Package => cmd_package(&config),
        Commands::Stats => cmd_stats(&config),
        Commands::Operators { action } => cmd_operators(&config, action),
    });

    if let Err(e) = result {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}

fn build_config(args: &PathArgs) -> Result<PipelineConfig, Box<dyn std::error::Error>> {
    let mut config = PipelineConfig::from_env()?;

    if let Some(data_dir) = &args.data_dir {
        let policy = config.policy;
        let cache = config.stats_cache;
        config = PipelineConfig::with_data_dir(data_dir).with_policy(policy);
        config.stats_cache = cache;
    }
    if let Some(raw_dir) = &args.raw_dir {
        config.raw_dir = raw_dir.clone();
    }
    if let Some(registry) = &args.registry {
        config.registry_path = registry.clone();
    }
    if let Some(policy) = args.policy {
        config.policy = policy;
    }
    Ok(config)
}

fn print_json<T: Serialize>(value: &T) -> CliResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn cmd_run(config: &PipelineConfig) -> CliResult {
    let report = run_pipeline(config)?;
    let anomalies = report.anomalies().count();

    eprintln!("\n📊 Run {}", report.run_id);
    eprintln!("   Consolidated: {} rows", report.consolidation.rows);
    eprintln!(
        "   Validated:    {} valid, {} invalid",
        report.validation.valid_rows, report.validation.invalid_rows
    );
    eprintln!(
        "   Enriched:     {} matched, {} unmatched, {} conflicting tax ids",
        report.enrichment.matched_rows, report.enrichment.unmatched_rows, report.enrichment.conflicting_tax_ids
    );
    eprintln!("   Aggregated:   {} groups", report.aggregation.groups);
    if anomalies > 0 {
        eprintln!("   ⚠️  {} anomalies recorded in the run report", anomalies);
    }
    eprintln!("\n✨ Done!");
    Ok(())
}

fn cmd_registry(config: &PipelineConfig) -> CliResult {
    require_input("registry", &config.registry_path)?;
    let registry = load_registry_file(&config.registry_path, config.policy)?;
    for anomaly in &registry.anomalies {
        eprintln!("   - {}", anomaly);
    }
    Ok(())
}

fn cmd_consolidate(config: &PipelineConfig) -> CliResult {
    require_input("registry", &config.registry_path)?;
    require_input("consolidate", &config.raw_dir)?;
    let registry = load_registry_file(&config.registry_path, config.policy)?;
    let report = run_consolidation(&config.raw_dir, &registry, &config.outputs().consolidated_csv, config.policy)?;
    print_json(&report)
}

fn cmd_validate(config: &PipelineConfig) -> CliResult {
    let outputs = config.outputs();
    require_input("validate", &outputs.consolidated_csv)?;
    let report = run_validation(&outputs.consolidated_csv, &outputs.validated_csv, &outputs.invalid_rows_csv)?;
    print_json(&report)
}

fn cmd_enrich(config: &PipelineConfig) -> CliResult {
    let outputs = config.outputs();
    require_input("enrich", &outputs.validated_csv)?;
    require_input("registry", &config.registry_path)?;
    let registry = load_registry_file(&config.registry_path, config.policy)?;
    let report = run_enrichment(
        &outputs.validated_csv,
        &registry,
        &outputs.enriched_csv,
        &outputs.unmatched_csv,
        &outputs.conflicts_csv,
        config.policy,
    )?;
    print_json(&report)
}

fn cmd_aggregate(config: &PipelineConfig) -> CliResult {
    let outputs = config.outputs();
    require_input("aggregate", &outputs.enriched_csv)?;
    let report = run_aggregation(&outputs.enriched_csv, &outputs.aggregated_csv, config.policy)?;
    print_json(&report)
}

fn cmd_package(config: &PipelineConfig) -> CliResult {
    for artifact in package_outputs(&config.outputs())? {
        println!("{}", artifact.display());
    }
    Ok(())
}

fn cmd_stats(config: &PipelineConfig) -> CliResult {
    let outputs = config.outputs();
    require_input("stats", &outputs.validated_csv)?;
    require_input("registry", &config.registry_path)?;
    let registry = load_registry_file(&config.registry_path, config.policy)?;
    let mut service = StatisticsService::new(&outputs.validated_csv, &registry, config.stats_cache);
    print_json(&service.statistics()?)
}

fn cmd_operators(config: &PipelineConfig, action: OperatorAction) -> CliResult {
    let outputs = config.outputs();
    require_input("operators", &config.registry_path)?;
    require_input("operators", &outputs.validated_csv)?;
    let directory = OperatorDirectory::load(&config.registry_path, &outputs.validated_csv, config.policy)?;

    match action {
        OperatorAction::List { page, limit, search } => {
            print_json(&directory.list(page, limit, search.as_deref())?)
        }
        OperatorAction::Show { tax_id } => print_json(&directory.get(&tax_id)?),
        OperatorAction::Expenses { tax_id } => {
            let history = directory.expenses(&tax_id);
            if history.is_empty() {
                eprintln!("📋 No validated expenses for {}", tax_id.trim());
            }
            print_json(&history)
        }
    }
}
