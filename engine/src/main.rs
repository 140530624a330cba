//! Creative Sync CLI - turn campaign CSV files into ad creatives
//!
//! # Commands
//!
//! ```bash
//! creative-sync parse input.csv                      # Parse CSV to JSON
//! creative-sync analyze input.csv                    # Infer column types
//! creative-sync transform input.csv -c transform.json
//! creative-sync render input.csv -c pipeline.json --rules rules.json --assets assets.json
//! creative-sync check-template "{name|upper}" --fields name,city
//! ```
//!
//! Logging goes to stderr and is controlled by `CREATIVE_SYNC_LOG`
//! (e.g. `CREATIVE_SYNC_LOG=creative_sync=debug`).

use clap::{Parser, Subcommand};
use creative_sync::{
    analyze_columns, decode_content, detect_encoding, normalize_rows, parse_bytes_auto, preview_csv,
    transform, CreativeAsset, CreativeLinker, CreativeSelectionRule, CsvOptions, FilterRegistry, ParsedCsv, Pipeline,
    PipelineConfig, TransformConfig, VariableEngine,
};
use serde::de::DeserializeOwned;
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "CREATIVE_SYNC_LOG";

#[derive(Parser)]
#[command(name = "creative-sync")]
#[command(about = "Turn campaign CSV files into validated ad creatives", long_about = None)]
struct Cli {
    /// Log at debug level unless CREATIVE_SYNC_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a CSV file and output JSON
    Parse {
        /// Input CSV file
        input: PathBuf,

        /// CSV delimiter (auto-detect if not specified)
        #[arg(short, long)]
        delimiter: Option<char>,

        /// Only read this many rows
        #[arg(long)]
        preview: Option<usize>,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Infer column names and types
    Analyze {
        /// Input CSV file
        input: PathBuf,

        /// CSV delimiter (auto-detect if not specified)
        #[arg(short, long)]
        delimiter: Option<char>,
    },

    /// Group and aggregate rows
    Transform {
        /// Input CSV file
        input: PathBuf,

        /// Transform configuration (JSON)
        #[arg(short, long)]
        config: PathBuf,

        /// CSV delimiter (auto-detect if not specified)
        #[arg(short, long)]
        delimiter: Option<char>,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Run the full pipeline and output creative payloads
    Render {
        /// Input CSV file
        input: PathBuf,

        /// Pipeline configuration (JSON)
        #[arg(short, long)]
        config: PathBuf,

        /// Creative selection rules (JSON array)
        #[arg(long, requires = "assets")]
        rules: Option<PathBuf>,

        /// Asset catalogue (JSON array)
        #[arg(long, requires = "rules")]
        assets: Option<PathBuf>,

        /// CSV delimiter (overrides the config and auto-detection)
        #[arg(short, long)]
        delimiter: Option<char>,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Check a template against a list of available fields
    CheckTemplate {
        /// Template text, e.g. "Hello {name|title}"
        template: String,

        /// Available fields, comma separated
        #[arg(short, long, value_delimiter = ',')]
        fields: Vec<String>,
    },
}

fn main() {
    // Load .env file (if present)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Parse {
            input,
            delimiter,
            preview,
            output,
        } => cmd_parse(&input, delimiter, preview, output.as_deref()),

        Commands::Analyze { input, delimiter } => cmd_analyze(&input, delimiter),

        Commands::Transform {
            input,
            config,
            delimiter,
            output,
        } => cmd_transform(&input, &config, delimiter, output.as_deref()),

        Commands::Render {
            input,
            config,
            rules,
            assets,
            delimiter,
            output,
        } => cmd_render(&input, &config, rules.as_deref(), assets.as_deref(), delimiter, output.as_deref()),

        Commands::CheckTemplate { template, fields } => cmd_check_template(&template, &fields),
    };

    if let Err(e) = result {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let fallback = if verbose { "creative_sync=debug" } else { "creative_sync=info" };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .init();
}

// =============================================================================
// Commands
// =============================================================================

fn cmd_parse(
    input: &Path,
    delimiter: Option<char>,
    preview: Option<usize>,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("📄 Parsing CSV: {}", input.display());

    let parsed = match preview {
        Some(limit) => {
            let (content, options) = decode_input(input, delimiter)?;
            preview_csv(&content, &options, limit)
        }
        None => read_csv(input, delimiter)?,
    };
    print_csv_info(&parsed, delimiter.is_none());

    let json = serde_json::to_string_pretty(&parsed.records())?;
    write_output(&json, output)
}

fn cmd_analyze(input: &Path, delimiter: Option<char>) -> Result<(), Box<dyn std::error::Error>> {
    let parsed = read_csv(input, delimiter)?;
    print_csv_info(&parsed, delimiter.is_none());

    let columns = analyze_columns(&parsed.headers, &parsed.rows);
    for column in columns.iter().filter(|c| c.is_mixed) {
        eprintln!("   ⚠️  Column '{}' mixes types ({:.0}% {})", column.name, column.consistency * 100.0, column.column_type);
    }
    println!("{}", serde_json::to_string_pretty(&columns)?);
    Ok(())
}

fn cmd_transform(
    input: &Path,
    config_path: &Path,
    delimiter: Option<char>,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = TransformConfig::from_json(&fs::read_to_string(config_path)?)?;
    let parsed = read_csv(input, delimiter)?;
    print_csv_info(&parsed, delimiter.is_none());

    let columns = analyze_columns(&parsed.headers, &parsed.rows);
    let schema: Vec<_> = columns.iter().map(|c| c.schema()).collect();
    let check = transform::validate(&config, &schema);
    for warning in &check.warnings {
        eprintln!("   ⚠️  {}", warning);
    }
    if !check.is_valid() {
        for error in &check.errors {
            eprintln!("   ❌ {}", error);
        }
        return Err("transform configuration is invalid".into());
    }

    let normalized = normalize_rows(&parsed.rows, &columns);
    let result = transform::run(&normalized.rows, &config)?;
    eprintln!(
        "⚙️  {} rows → {} groups ({} errors, {} warnings)",
        result.source_row_count,
        result.group_count,
        result.errors.len(),
        result.warnings.len()
    );

    let json = serde_json::to_string_pretty(&result)?;
    write_output(&json, output)
}

fn cmd_render(
    input: &Path,
    config_path: &Path,
    rules_path: Option<&Path>,
    assets_path: Option<&Path>,
    delimiter: Option<char>,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("📄 Rendering: {}", input.display());

    let mut config = PipelineConfig::from_json(&fs::read_to_string(config_path)?)?;
    if delimiter.is_some() {
        config.csv.delimiter = delimiter;
    }

    let linker = match (rules_path, assets_path) {
        (Some(rules), Some(assets)) => {
            let rules: Vec<CreativeSelectionRule> = read_json(rules)?;
            let assets: Vec<CreativeAsset> = read_json(assets)?;
            eprintln!("   Rules: {}, assets: {}", rules.len(), assets.len());
            Some(CreativeLinker::new(rules, assets)?)
        }
        _ => None,
    };

    let pipeline = Pipeline::new(config, FilterRegistry::with_builtins(), linker)?;
    let result = pipeline.run_bytes(&fs::read(input)?)?;

    let stats = &result.stats;
    eprintln!("   Rows: {} → {}", stats.source_rows, stats.output_rows);
    eprintln!("   Creatives: {} ({} blocked)", stats.creatives, stats.blocked);
    if let Some(groups) = stats.groups {
        eprintln!("   Groups: {}", groups);
    }
    if stats.linked + stats.unlinked > 0 {
        eprintln!("   Linked: {}, unlinked: {}", stats.linked, stats.unlinked);
    }
    for error in result.errors.iter().take(5) {
        eprintln!("   ❌ {}", error);
    }
    if result.errors.len() > 5 {
        eprintln!("   ... and {} more errors", result.errors.len() - 5);
    }

    let json = serde_json::to_string_pretty(&result)?;
    write_output(&json, output)?;
    eprintln!("✨ Done!");
    Ok(())
}

fn cmd_check_template(template: &str, fields: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    let engine = VariableEngine::default();
    let validation = engine.validate(template, fields);
    println!("{}", serde_json::to_string_pretty(&validation)?);

    if !validation.is_valid() {
        std::process::exit(1);
    }
    Ok(())
}

// =============================================================================
// Helpers
// =============================================================================

fn decode_input(input: &Path, delimiter: Option<char>) -> Result<(String, CsvOptions), Box<dyn std::error::Error>> {
    let bytes = fs::read(input)?;
    let content = decode_content(&bytes, &detect_encoding(&bytes))?;
    let delimiter = delimiter.unwrap_or_else(|| creative_sync::detect_delimiter(&content));
    Ok((content, CsvOptions::default().with_delimiter(delimiter)))
}

fn read_csv(input: &Path, delimiter: Option<char>) -> Result<ParsedCsv, Box<dyn std::error::Error>> {
    let options = CsvOptions {
        delimiter,
        ..CsvOptions::default()
    };
    Ok(parse_bytes_auto(&fs::read(input)?, &options)?)
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, Box<dyn std::error::Error>> {
    Ok(serde_json::from_str(&fs::read_to_string(path)?)?)
}

fn print_csv_info(parsed: &ParsedCsv, auto_delimiter: bool) {
    eprintln!("   Encoding: {}", parsed.encoding);
    eprintln!(
        "   Delimiter: '{}'{}",
        format_delimiter(parsed.delimiter),
        if auto_delimiter { " (auto-detected)" } else { "" }
    );
    eprintln!("   Columns: {}", parsed.headers.join(", "));
    eprintln!("✅ Parsed {} rows{}", parsed.rows.len(), if parsed.truncated { " (truncated)" } else { "" });
    for error in parsed.errors.iter().take(5) {
        eprintln!("   ⚠️  Row {}: {}", error.row, error.message);
    }
}

fn format_delimiter(d: char) -> String {
    match d {
        '\t' => "\\t".to_string(),
        c => c.to_string(),
    }
}

fn write_output(content: &str, path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    match path {
        Some(p) => {
            fs::write(p, content)?;
            eprintln!("💾 Output written to: {}", p.display());
        }
        None => {
            println!("{}", content);
        }
    }
    Ok(())
}
