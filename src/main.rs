use anyhow::{bail, Context, Result};
use arrow::record_batch::RecordBatch;
use chrono::{Local, NaiveDate};
use clap::{Args, Parser, Subcommand};
use concursal::{
    build_report,
    classify::date_bounds,
    export::{self, default_report_name, display_table, write_workbook},
    fetch::{self, DataSource, FetchConfig, Fetcher},
    process::{
        columns::{resolve_date_column, resolve_procedure_column, resolve_publication_column},
        date_parser::parse_date,
        normalize::normalize_dates,
    },
    Cohort, DateWindow, Report,
};
use serde::Serialize;
use std::{
    fs::{self, File},
    io::BufWriter,
    path::{Path, PathBuf},
    time::Duration,
};
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Boletín Concursal registry: fetch, classify into cohorts, export"
)]
struct Cli {
    /// Directory holding the cached registry CSV
    #[arg(long, env = "CONCURSAL_DATA_DIR", default_value = "data", global = true)]
    data_dir: PathBuf,

    /// Procedures page that carries the CSV export button
    #[arg(long, env = "CONCURSAL_URL", default_value = fetch::DEFAULT_URL, global = true)]
    url: String,

    /// HTTP timeout per request
    #[arg(long, env = "CONCURSAL_TIMEOUT_SECS", default_value_t = 30, global = true)]
    timeout_secs: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Download the registry (or reuse the cache) and report where it came from
    Update {
        /// Download even when a usable cache exists
        #[arg(long)]
        force: bool,
    },
    /// List the registry's columns and which ones the classifier will use
    Columns,
    /// Rows of a single cohort
    Report {
        /// `renegociaciones` or `liquidaciones-voluntarias`
        cohort: Cohort,
        #[command(flatten)]
        window: WindowArgs,
        /// Also write the rows to this CSV file
        #[arg(long)]
        csv: Option<PathBuf>,
        /// Rows shown on screen
        #[arg(long, default_value_t = 20)]
        limit: usize,
        #[arg(long)]
        force: bool,
    },
    /// Both cohorts side by side, with optional exports
    Summary {
        #[command(flatten)]
        window: WindowArgs,
        /// Write a workbook with one sheet per cohort (default name when no path given)
        #[arg(long, num_args = 0..=1)]
        xlsx: Option<Option<PathBuf>>,
        /// Write `<cohort>.csv` files into this directory
        #[arg(long)]
        csv_dir: Option<PathBuf>,
        /// Print counts as JSON instead of tables
        #[arg(long)]
        json: bool,
        #[arg(long, default_value_t = 10)]
        limit: usize,
        #[arg(long)]
        force: bool,
    },
}

#[derive(Args)]
struct WindowArgs {
    /// First publication date to include (DD/MM/YYYY or YYYY-MM-DD)
    #[arg(long, value_parser = parse_cli_date, requires = "end")]
    start: Option<NaiveDate>,
    /// Last publication date to include
    #[arg(long, value_parser = parse_cli_date, requires = "start")]
    end: Option<NaiveDate>,
    /// Do not filter by date at all
    #[arg(long, conflicts_with_all = ["start", "end"])]
    all_dates: bool,
}

impl WindowArgs {
    fn resolve(
        &self,
        today: NaiveDate,
        bounds: Option<(NaiveDate, NaiveDate)>,
    ) -> Result<Option<DateWindow>> {
        if self.all_dates {
            return Ok(None);
        }
        match (self.start, self.end) {
            (Some(start), Some(end)) => {
                if start > end {
                    bail!("--start {} is after --end {}", start, end);
                }
                Ok(Some(DateWindow::new(start, end)))
            }
            _ => Ok(Some(DateWindow::default_within(today, bounds))),
        }
    }
}

fn parse_cli_date(s: &str) -> Result<NaiveDate, String> {
    parse_date(s).ok_or_else(|| format!("unrecognised date `{}`", s))
}

#[derive(Serialize)]
struct Summary<'a> {
    source: String,
    total_rows: usize,
    date_column: &'a str,
    data_range: Option<(NaiveDate, NaiveDate)>,
    window: Option<DateWindow>,
    renegociaciones: usize,
    liquidaciones_voluntarias: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_writer(std::io::stderr)
        .init();

    // ─── 2) configure fetcher ────────────────────────────────────────
    let cli = Cli::parse();
    let fetcher = Fetcher::new(FetchConfig {
        url: cli.url.clone(),
        data_dir: cli.data_dir.clone(),
        timeout: Duration::from_secs(cli.timeout_secs),
    })?;
    info!(data_dir = %cli.data_dir.display(), url = %cli.url, "startup");

    match &cli.command {
        Command::Update { force } => {
            let (batch, source) = fetcher.update_data(*force).await?;
            println!(
                "{} rows ({}) in {}",
                batch.num_rows(),
                source,
                fetcher.cache_path().display()
            );
        }
        Command::Columns => {
            let (batch, _) = fetcher.update_data(false).await?;
            print_columns(&batch);
        }
        Command::Report {
            cohort,
            window,
            csv,
            limit,
            force,
        } => {
            let (raw, source) = fetcher.update_data(*force).await?;
            let report = prepare_report(&raw, window)?;
            let rows = report.cohort(*cohort);

            println!("{}: {} rows (data: {})", cohort, rows.num_rows(), source);
            print_window(&report);
            if rows.num_rows() > 0 {
                println!("{}", display_table(rows, &report.date_column, Some(*limit))?);
            } else {
                warn!(%cohort, "no records found matching the criteria");
            }
            if let Some(path) = csv {
                write_csv_file(path, rows)?;
            }
        }
        Command::Summary {
            window,
            xlsx,
            csv_dir,
            json,
            limit,
            force,
        } => {
            let (raw, source) = fetcher.update_data(*force).await?;
            let report = prepare_report(&raw, window)?;

            if *json {
                let summary = Summary {
                    source: source.to_string(),
                    total_rows: raw.num_rows(),
                    date_column: &report.date_column,
                    data_range: report.bounds,
                    window: report.window,
                    renegociaciones: report.renegociaciones.num_rows(),
                    liquidaciones_voluntarias: report.liquidaciones_voluntarias.num_rows(),
                };
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                print_summary(&report, source, raw.num_rows(), *limit)?;
            }

            if let Some(dir) = csv_dir {
                fs::create_dir_all(dir)
                    .with_context(|| format!("creating {}", dir.display()))?;
                for (cohort, rows) in report.sheets() {
                    if rows.num_rows() == 0 {
                        continue;
                    }
                    write_csv_file(&dir.join(format!("{}.csv", cohort.sheet_name())), rows)?;
                }
            }

            if let Some(target) = xlsx {
                let path = target
                    .clone()
                    .unwrap_or_else(|| PathBuf::from(default_report_name(&Local::now())));
                let sheets: Vec<(&str, &RecordBatch)> = report
                    .sheets()
                    .into_iter()
                    .map(|(c, b)| (c.sheet_name(), b))
                    .collect();
                if write_workbook(&path, &sheets)? {
                    println!("workbook: {}", path.display());
                }
            }
        }
    }

    Ok(())
}

/// Normalize once, pick the window against the data's own range, classify.
fn prepare_report(raw: &RecordBatch, window: &WindowArgs) -> Result<Report> {
    let schema = raw.schema();
    let date_column = resolve_date_column(schema.fields().iter().map(|f| f.name().as_str()));
    let normalized = normalize_dates(raw, &date_column);
    let bounds = date_bounds(&normalized, &date_column);
    if bounds.is_none() {
        warn!(column = %date_column, "no usable publication dates in data");
    }
    let window = window.resolve(Local::now().date_naive(), bounds)?;
    Ok(build_report(&normalized, window))
}

fn print_window(report: &Report) {
    match &report.window {
        Some(w) => println!(
            "date range: {} to {}",
            w.start.format("%d/%m/%Y"),
            w.end.format("%d/%m/%Y")
        ),
        None => println!("date range: all"),
    }
}

fn print_summary(report: &Report, source: DataSource, total: usize, limit: usize) -> Result<()> {
    println!("PROCEDIMIENTOS DE RENEGOCIACION");
    println!("data: {} ({} rows)", source, total);
    if let Some((min, max)) = report.bounds {
        println!(
            "data spans {} to {}",
            min.format("%d/%m/%Y"),
            max.format("%d/%m/%Y")
        );
    }
    print_window(report);

    for (cohort, rows) in report.sheets() {
        println!();
        println!("{}: {} records", cohort, rows.num_rows());
        if rows.num_rows() > 0 {
            println!("{}", display_table(rows, &report.date_column, Some(limit))?);
        } else {
            println!("no {} records found matching the criteria", cohort);
        }
    }
    Ok(())
}

fn print_columns(batch: &RecordBatch) {
    let schema = batch.schema();
    let names: Vec<&str> = schema.fields().iter().map(|f| f.name().as_str()).collect();
    println!("{} rows, {} columns:", batch.num_rows(), names.len());
    for field in schema.fields() {
        println!("  {} ({})", field.name(), field.data_type());
    }
    let show = |label: &str, resolved: String| {
        let present = if names.contains(&resolved.as_str()) {
            ""
        } else {
            " [missing]"
        };
        println!("{}: {}{}", label, resolved, present);
    };
    show("date column", resolve_date_column(names.iter().copied()));
    show("procedure column", resolve_procedure_column(names.iter().copied()));
    show("publication column", resolve_publication_column(names.iter().copied()));
}

fn write_csv_file(path: &Path, rows: &RecordBatch) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    export::write_csv(rows, BufWriter::new(file))?;
    info!(path = %path.display(), rows = rows.num_rows(), "CSV written");
    Ok(())
}
