use clap::Parser;
use contact_etl::config::toml_config::TomlConfig;
use contact_etl::core::column_detector;
use contact_etl::core::ConfigProvider;
use contact_etl::utils::error::ErrorSeverity;
use contact_etl::utils::{logger, validation::Validate};
use contact_etl::{CsvEnrichmentPipeline, EtlEngine, LocalStorage};

#[derive(Parser)]
#[command(name = "toml-enrich")]
#[command(about = "Contact enrichment with TOML configuration support")]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "enrich-config.toml")]
    config: String,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Override monitoring setting from config
    #[arg(long)]
    monitor: Option<bool>,

    /// Dry run - detect columns and show the plan without enriching
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    logger::init_cli_logger(args.verbose);

    tracing::info!("🚀 Starting TOML-based contact enrichment");
    tracing::info!("📁 Loading configuration from: {}", args.config);

    let config = match TomlConfig::from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Failed to load config file '{}': {}", args.config, e);
            eprintln!("💡 Make sure the file exists and is valid TOML format");
            std::process::exit(1);
        }
    };

    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
        eprintln!("❌ {}", e.user_friendly_message());
        std::process::exit(1);
    }

    tracing::info!("✅ Configuration loaded and validated successfully");

    display_config_summary(&config, &args);

    if args.dry_run {
        tracing::info!("🔍 DRY RUN MODE - No enrichment will be performed");
        perform_dry_run(&config).await?;
        return Ok(());
    }

    let monitor_enabled = args.monitor.unwrap_or_else(|| config.monitoring_enabled());
    if monitor_enabled {
        tracing::info!("🔍 System monitoring enabled");
    }

    let input = LocalStorage::new(".");
    let output = LocalStorage::new(config.output_path().to_string());
    let pipeline = CsvEnrichmentPipeline::new(input, output, config);

    let engine = EtlEngine::new_with_monitoring(pipeline, monitor_enabled);

    match engine.run().await {
        Ok(output_path) => {
            tracing::info!("✅ Enrichment completed successfully!");
            println!("✅ Enrichment completed successfully!");
            println!("📁 Output saved to: {}", output_path);
        }
        Err(e) => {
            tracing::error!(
                "❌ Enrichment failed: {} (Category: {:?}, Severity: {:?})",
                e,
                e.category(),
                e.severity()
            );
            tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

            eprintln!("❌ {}", e.user_friendly_message());
            eprintln!("💡 建議: {}", e.recovery_suggestion());

            let exit_code = match e.severity() {
                ErrorSeverity::Low => 0,
                ErrorSeverity::Medium => 2,
                ErrorSeverity::High => 1,
                ErrorSeverity::Critical => 3,
            };

            if exit_code > 0 {
                std::process::exit(exit_code);
            }
        }
    }

    Ok(())
}

fn display_config_summary(config: &TomlConfig, args: &Args) {
    let settings = config.settings();

    println!("📋 Configuration Summary:");
    println!(
        "  Pipeline: {} v{}",
        config.pipeline.name,
        config.pipeline.version.as_deref().unwrap_or("0.0.0")
    );
    if let Some(description) = &config.pipeline.description {
        println!("  Description: {}", description);
    }
    println!("  Input: {}", config.input_file());
    println!("  Reference: {}", config.reference_file().unwrap_or("(none)"));
    println!("  Output: {}", config.output_path());
    println!("  Batch Size: {}", settings.batch_size);
    println!("  Concurrent Lookups: {}", settings.concurrent_lookups);

    if let Some(timeout) = settings.lookup_timeout {
        println!("  Lookup Timeout: {} ms", timeout.as_millis());
    }

    if args.dry_run {
        println!("  🔍 DRY RUN MODE ENABLED");
    }

    println!();
}

async fn perform_dry_run(config: &TomlConfig) -> anyhow::Result<()> {
    println!("🔍 Dry Run Analysis:");
    println!();

    let content = tokio::fs::read(config.input_file()).await?;
    let rows = contact_etl::adapters::csv_rows::read_contact_rows(&content)?;
    let delimiter = contact_etl::adapters::csv_rows::sniff_delimiter(&content);

    println!("📄 Input Analysis:");
    println!("  Rows: {}", rows.len());
    println!("  Delimiter: '{}'", delimiter as char);

    let Some(first_row) = rows.first() else {
        println!("  ⚠️ No data rows, the run would fail with an empty-input error");
        return Ok(());
    };

    let columns: Vec<&str> = first_row.field_names().collect();
    println!("  Columns: {}", columns.join(", "));

    let mapping = column_detector::detect(columns.iter().copied());
    println!();
    println!("🔎 Column Detection:");
    println!(
        "  First name: {}",
        mapping.first_name_field.as_deref().unwrap_or("❌ not detected")
    );
    println!(
        "  Last name: {}",
        mapping.last_name_field.as_deref().unwrap_or("❌ not detected")
    );

    let settings = config.settings();
    let batches = rows.len().div_ceil(settings.batch_size);
    println!();
    println!("⚙️ Processing Plan:");
    println!("  Batches: {} of up to {} rows", batches, settings.batch_size);
    println!("  Civility column: {}", settings.civility_field);

    if let Some(reference) = config.reference_file() {
        let content = tokio::fs::read(reference).await?;
        let lines = contact_etl::adapters::reference_import::parse_reference_lines(&content);
        let usable = lines.iter().flatten().count();
        println!();
        println!("📚 Reference Analysis:");
        println!("  Lines: {} ({} usable)", lines.len(), usable);
    }

    println!();
    println!("✅ Dry run analysis complete. Use --verbose for more details during actual run.");

    Ok(())
}
