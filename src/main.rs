use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{error, info};

use oar_pipeline::constants;
use oar_pipeline::logging;
use oar_pipeline::pipeline::processing::IntegrityWarningKind;
use oar_pipeline::{export_tables, FileSource, Pipeline, PipelineConfig};

#[derive(Parser)]
#[command(name = "oar_pipeline")]
#[command(about = "Open Apparel Registry company/facility cleaning and relational export")]
#[command(version)]
struct Cli {
    /// Path to the TOML config file (falls back to OAR_CONFIG, then config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Clean a raw batch and export the relational tables
    Run {
        /// Raw company records (.json or .csv)
        #[arg(long)]
        companies: PathBuf,
        /// Raw facility records (.json or .csv)
        #[arg(long)]
        facilities: PathBuf,
        /// Directory the tables and summaries are written to
        #[arg(long, default_value = constants::DEFAULT_OUTPUT_DIR)]
        output_dir: PathBuf,
    },
    /// Load and validate the config, then print the effective values
    CheckConfig,
}

fn config_path(cli_value: Option<PathBuf>) -> PathBuf {
    cli_value
        .or_else(|| std::env::var_os("OAR_CONFIG").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(constants::DEFAULT_CONFIG_PATH))
}

fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let _guard = logging::init_logging();

    let cli = Cli::parse();
    let config_path = config_path(cli.config);
    let config = PipelineConfig::load(&config_path)
        .with_context(|| format!("loading config from {}", config_path.display()))?;

    match cli.command {
        Commands::CheckConfig => {
            config.validate()?;
            let table = config.normalizer.country_table()?;
            println!("✅ Config OK ({})", config_path.display());
            println!("   Company id width: {}", config.identifiers.company_id_width);
            println!("   Facility id width: {}", config.identifiers.facility_id_width);
            println!("   Legal suffixes: {}", config.normalizer.legal_suffixes.join(", "));
            println!("   Country aliases: {}", table.alias_count());
        }
        Commands::Run {
            companies,
            facilities,
            output_dir,
        } => {
            println!("🚀 Running OAR cleaning pipeline...");
            let span = tracing::info_span!("run", output_dir = %output_dir.display());
            let _enter = span.enter();

            let export_config = config.export.clone();
            let pipeline = Pipeline::new(config)?;
            let source = FileSource::new(&companies, &facilities);

            let result = match pipeline.run_source(&source) {
                Ok(result) => result,
                Err(e) => {
                    error!("Pipeline failed: {}", e);
                    println!("❌ Pipeline failed: {}", e);
                    return Err(e.into());
                }
            };

            let artifacts = export_tables(&result.outcome, result.run_id, &export_config, &output_dir)
                .context("exporting relational tables")?;
            info!("Run {} exported", result.run_id);

            let tables = &result.outcome.tables;
            println!("\n📊 Pipeline Results (run {}):", result.run_id);
            println!("   Companies: {}", tables.companies().len());
            println!("   Facilities: {}", tables.facilities().len());
            println!("   Links: {}", tables.links().len());
            for report in &result.reports {
                println!(
                    "   {} records: {} in, {} out, {} duplicates collapsed, {} skipped",
                    report.entity,
                    report.input,
                    report.output,
                    report.collapsed,
                    report.skipped_total()
                );
            }
            println!("   Duration: {:.3}s", result.duration_secs);

            if !result.outcome.warnings.is_empty() {
                let orphans = result
                    .outcome
                    .warnings
                    .iter()
                    .filter(|w| w.kind == IntegrityWarningKind::OrphanFacility)
                    .count();
                println!("\n⚠️  Integrity warnings: {}", result.outcome.warnings.len());
                println!("   Orphan facilities: {}", orphans);
                println!(
                    "   Ambiguous owners: {}",
                    result.outcome.warnings.len() - orphans
                );
            }

            println!("\n📁 Output:");
            for path in [
                &artifacts.companies,
                &artifacts.facilities,
                &artifacts.links,
                &artifacts.warnings,
                &artifacts.summary,
            ] {
                println!("   {}", path.display());
            }
            println!("✅ Pipeline completed successfully");
        }
    }
    Ok(())
}
