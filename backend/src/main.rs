//! nockpi CLI - NOC KPI CSV ingestion and dashboard reports
//!
//! # Main Commands
//!
//! ```bash
//! nockpi serve                          # Start HTTP server (port 3000)
//! nockpi report kpi.csv --site SiteA    # Full pipeline, DashboardReport JSON
//! ```
//!
//! # Debug Commands
//!
//! ```bash
//! nockpi parse kpi.csv                  # Loader only, rows as JSON
//! nockpi validate kpi.csv               # Schema check and coercion report
//! nockpi trend kpi.csv --column prb     # One trend series
//! nockpi sites kpi.csv                  # Per-site means
//! nockpi aliases                        # Show the column alias table
//! ```

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use nockpi::{
    build_report, build_table, ingest_file, load_file, site_summary, trend_by_date, validate_required, AppConfig,
    ColumnAliases, CsvInfo, DateRange, FilterCriteria, FilterOptions, GeoHeuristic, IngestOptions, IngestedTable,
    ReportRequest, Selection, Thresholds, Warnings,
};
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "nockpi")]
#[command(about = "Ingest NOC KPI exports and derive dashboard reports", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Options shared by every command that reads a CSV.
#[derive(Args)]
struct InputArgs {
    /// Input CSV file
    input: PathBuf,

    /// CSV delimiter (auto-detect if not specified)
    #[arg(short, long)]
    delimiter: Option<char>,

    /// Column alias table (JSON); overrides NOCKPI_ALIASES
    #[arg(long)]
    aliases: Option<PathBuf>,
}

/// Geo sanitizer tuning.
#[derive(Args)]
struct GeoArgs {
    /// Never swap lat/lon, even when latitudes look like longitudes
    #[arg(long)]
    no_geo_swap: bool,

    /// Mean |lat| above which lat/lon are swapped (default: 50)
    #[arg(long)]
    swap_threshold: Option<f64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a CSV file and output rows as JSON
    Parse {
        #[command(flatten)]
        input: InputArgs,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Check required columns and report rows that fail coercion
    Validate {
        #[command(flatten)]
        input: InputArgs,
    },

    /// Full pipeline: CSV → filtered dashboard report JSON
    Report {
        #[command(flatten)]
        input: InputArgs,

        #[command(flatten)]
        geo: GeoArgs,

        /// Site filter (default: All)
        #[arg(long)]
        site: Option<String>,

        /// Sector filter (ignored when the file has no sector column)
        #[arg(long)]
        sector: Option<String>,

        /// Band filter (ignored when the file has no band column)
        #[arg(long)]
        band: Option<String>,

        /// First day included (YYYY-MM-DD)
        #[arg(long)]
        start: Option<NaiveDate>,

        /// Last day included (YYYY-MM-DD)
        #[arg(long)]
        end: Option<NaiveDate>,

        /// Availability below this is congested [90, 100]
        #[arg(long)]
        avail_threshold: Option<f64>,

        /// PRB above this is congested [70, 100]
        #[arg(long)]
        prb_threshold: Option<f64>,

        /// Columns to chart over time (repeatable)
        #[arg(long = "chart")]
        charts: Vec<String>,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Per-date mean of one numeric column
    Trend {
        #[command(flatten)]
        input: InputArgs,

        #[command(flatten)]
        geo: GeoArgs,

        /// Column to average
        #[arg(short, long)]
        column: String,
    },

    /// Per-site mean of every numeric column
    Sites {
        #[command(flatten)]
        input: InputArgs,

        #[command(flatten)]
        geo: GeoArgs,
    },

    /// Print the column alias table (built-in, or a checked file)
    Aliases {
        /// Alias table to validate and print
        file: Option<PathBuf>,
    },

    /// Start HTTP server
    Serve {
        /// Port to listen on (default: NOCKPI_PORT or 3000)
        #[arg(short, long)]
        port: Option<u16>,

        /// Column alias table (JSON)
        #[arg(long)]
        aliases: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    // Load .env file (if present)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let result = match AppConfig::from_env() {
        Ok(config) => run(cli.command, config).await,
        Err(e) => Err(e.into()),
    };

    if let Err(e) = result {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}

async fn run(command: Commands, config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Commands::Parse { input, output } => cmd_parse(&input, &config, output.as_deref()),

        Commands::Validate { input } => cmd_validate(&input, &config),

        Commands::Report {
            input,
            geo,
            site,
            sector,
            band,
            start,
            end,
            avail_threshold,
            prb_threshold,
            charts,
            output,
        } => {
            let filters = Filters {
                site,
                sector,
                band,
                start,
                end,
            };
            let thresholds = Thresholds {
                availability: avail_threshold.unwrap_or(config.thresholds.availability),
                prb: prb_threshold.unwrap_or(config.thresholds.prb),
            };
            cmd_report(&input, &geo, &config, filters, thresholds, charts, output.as_deref())
        }

        Commands::Trend { input, geo, column } => cmd_trend(&input, &geo, &config, &column),

        Commands::Sites { input, geo } => cmd_sites(&input, &geo, &config),

        Commands::Aliases { file } => cmd_aliases(file.as_deref()),

        Commands::Serve { port, aliases } => {
            let config = AppConfig {
                port: port.unwrap_or(config.port),
                aliases_path: aliases.or(config.aliases_path),
                ..config
            };
            let aliases = config.load_aliases()?;
            nockpi::server::start_server(config, aliases).await
        }
    }
}

fn load_aliases(input: &InputArgs, config: &AppConfig) -> Result<ColumnAliases, Box<dyn std::error::Error>> {
    match &input.aliases {
        Some(path) => Ok(ColumnAliases::from_file(path)?),
        None => Ok(config.load_aliases()?),
    }
}

fn geo_heuristic(geo: &GeoArgs, config: &AppConfig) -> Result<GeoHeuristic, Box<dyn std::error::Error>> {
    let heuristic = GeoHeuristic {
        swap_enabled: !geo.no_geo_swap,
        swap_threshold: geo.swap_threshold.unwrap_or(config.geo.swap_threshold),
    };
    heuristic.validate()?;
    Ok(heuristic)
}

fn ingest_input(input: &InputArgs, geo: &GeoArgs, config: &AppConfig) -> Result<IngestedTable, Box<dyn std::error::Error>> {
    let options = IngestOptions {
        aliases: load_aliases(input, config)?,
        delimiter: input.delimiter,
        geo: geo_heuristic(geo, config)?,
    };
    let ingested = ingest_file(&input.input, &options)?;
    print_csv_info(&ingested.csv_info);
    Ok(ingested)
}

fn print_csv_info(info: &CsvInfo) {
    eprintln!("   Encoding: {}", info.encoding);
    eprintln!("   Delimiter: '{}'", format_delimiter(info.delimiter));
    eprintln!("   Rows: {}", info.row_count);
    eprintln!("   Columns: {}", info.headers.join(", "));
}

fn format_delimiter(d: char) -> String {
    match d {
        '\t' => "\\t".to_string(),
        c => c.to_string(),
    }
}

fn cmd_parse(input: &InputArgs, config: &AppConfig, output: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("📄 Parsing CSV: {}", input.input.display());

    let aliases = load_aliases(input, config)?;
    let raw = load_file(&input.input, &aliases, input.delimiter)?;

    eprintln!("   Encoding: {}", raw.encoding);
    eprintln!(
        "   Delimiter: '{}'{}",
        format_delimiter(raw.delimiter),
        if input.delimiter.is_none() { " (auto-detected)" } else { "" }
    );
    eprintln!("   Columns: {}", raw.headers.join(", "));
    eprintln!("✅ Parsed {} records", raw.row_count());

    let json = serde_json::to_string_pretty(&raw.to_json_records())?;
    write_output(&json, output)
}

fn cmd_validate(input: &InputArgs, config: &AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("✔️  Validating: {}", input.input.display());

    let aliases = load_aliases(input, config)?;
    let raw = load_file(&input.input, &aliases, input.delimiter)?;
    validate_required(&raw)?;
    eprintln!("   ✅ All required columns present");

    let typed = build_table(&raw)?;
    for issue in typed.row_issues.iter().take(5) {
        eprintln!("   ⚠️  {}", issue);
    }
    eprintln!(
        "\n📊 Results: {} usable rows, {} skipped",
        typed.table.len(),
        typed.row_issues.len()
    );

    let summary = json!({
        "headers": raw.headers,
        "rows": raw.row_count(),
        "usableRows": typed.table.len(),
        "rowIssues": typed.row_issues,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

/// Filter flags as given on the command line.
struct Filters {
    site: Option<String>,
    sector: Option<String>,
    band: Option<String>,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
}

impl Filters {
    /// A missing end of the window defaults to the table's own span.
    fn criteria(self, options: &FilterOptions) -> Result<FilterCriteria, Box<dyn std::error::Error>> {
        let date_range = match (self.start, self.end, options.date_range) {
            (None, None, _) => None,
            (Some(start), Some(end), _) => Some(DateRange::new(start, end)?),
            (Some(start), None, Some(span)) => Some(DateRange::new(start, span.end.max(start))?),
            (None, Some(end), Some(span)) => Some(DateRange::new(span.start.min(end), end)?),
            (Some(day), None, None) | (None, Some(day), None) => Some(DateRange::new(day, day)?),
        };

        let selection = |value: Option<String>| value.map(Selection::from).unwrap_or_default();

        Ok(FilterCriteria {
            site: selection(self.site),
            sector: selection(self.sector),
            band: selection(self.band),
            date_range,
        })
    }
}

fn cmd_report(
    input: &InputArgs,
    geo: &GeoArgs,
    config: &AppConfig,
    filters: Filters,
    thresholds: Thresholds,
    charts: Vec<String>,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("📄 Processing: {}", input.input.display());

    let ingested = ingest_input(input, geo, config)?;
    let options = FilterOptions::from_table(&ingested.table);

    let mut request = ReportRequest {
        filters: filters.criteria(&options)?,
        thresholds,
        ..ReportRequest::default()
    };
    if !charts.is_empty() {
        request.charts = charts;
    }

    let report = build_report(&ingested.table, &request)?;

    eprintln!("\n📊 SUMMARY");
    eprintln!("   Rows after filters: {}", report.filtered_rows);
    eprintln!("   Sites:              {}", report.summary.total_sites);
    if let Some(avg) = report.summary.avg_availability {
        eprintln!("   Avg availability:   {:.2}%", avg);
    }
    eprintln!("   Total traffic:      {:.2} GB", report.summary.total_traffic_gb);
    eprintln!("   Congested rows:     {}", report.congestion.count);
    if ingested.geo.swapped {
        eprintln!("   ⚠️  lat/lon were swapped for every row");
    }

    let json = serde_json::to_string_pretty(&report)?;
    write_output(&json, output)?;

    eprintln!("\n✨ Done!");
    Ok(())
}

fn cmd_trend(input: &InputArgs, geo: &GeoArgs, config: &AppConfig, column: &str) -> Result<(), Box<dyn std::error::Error>> {
    let ingested = ingest_input(input, geo, config)?;
    let mut warnings = Warnings::new();
    let series = trend_by_date(&ingested.table, column, &mut warnings);

    println!("{}", serde_json::to_string_pretty(&series)?);
    Ok(())
}

fn cmd_sites(input: &InputArgs, geo: &GeoArgs, config: &AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let ingested = ingest_input(input, geo, config)?;
    let sites = site_summary(&ingested.table);
    eprintln!("📦 {} sites", sites.len());

    println!("{}", serde_json::to_string_pretty(&sites)?);
    Ok(())
}

fn cmd_aliases(file: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let aliases = match file {
        Some(path) => {
            let table = ColumnAliases::from_file(path)?;
            eprintln!("✅ {} is a valid alias table", path.display());
            table
        }
        None => ColumnAliases::builtin(),
    };
    println!("{}", aliases.to_json()?);
    Ok(())
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
