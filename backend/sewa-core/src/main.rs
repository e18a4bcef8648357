// src/main.rs
use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::io;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sewa_core::bs_date::BsDate;
use sewa_core::config::Config;
use sewa_core::era::EraSplitter;
use sewa_core::excel_date;
use sewa_core::geographic::employee_assignment_marks;
use sewa_core::ingest::{
    parse_absences, parse_assignments, parse_employees, parse_leaves,
    synthesize_pre_level_assignments,
};
use sewa_core::records::{EmployeeProfile, EmployeeRecords, Gender};
use sewa_core::reference::{CsvReferenceStore, ReferenceLookup};
use sewa_core::scorecard::{build_scorecard, Vacancy};
use sewa_core::seniority::build_seniority_timeline;
use sewa_core::timeline::{TimelineBuilder, TimelineRequest};
use sewa_core::workbook::read_rows;

// --- CLI ---

#[derive(Parser)]
#[command(name = "sewa")]
#[command(version)]
#[command(about = "Seniority and geographical marks from service-record exports", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Normalise raw date cells to BS `YYYY-MM-DD`
    Normalize {
        values: Vec<String>,
    },
    /// Scored geographical-marks timeline of one employee
    Timeline {
        #[arg(short, long)]
        employee: String,
        #[arg(long)]
        gender: Option<String>,
        #[command(flatten)]
        levels: LevelArgs,
        #[command(flatten)]
        records: RecordArgs,
        #[command(flatten)]
        engine: EngineArgs,
    },
    /// Seniority timeline between a seniority date and an evaluation end date
    Seniority {
        #[arg(short, long)]
        employee: String,
        #[arg(long)]
        seniority_date: String,
        #[arg(long)]
        end_date: String,
        #[command(flatten)]
        records: RecordArgs,
    },
    /// Per-assignment geographical marks (the values stored on assignment rows)
    Assignments {
        /// Only this employee; every employee in the file otherwise
        #[arg(short, long)]
        employee: Option<String>,
        #[arg(long)]
        gender: Option<String>,
        #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,
        #[command(flatten)]
        records: RecordArgs,
        #[command(flatten)]
        engine: EngineArgs,
    },
    /// Applicant scorecards for a vacancy
    Scorecard {
        /// Employee sheet (id, gender, level, seniority date)
        #[arg(long)]
        employees: PathBuf,
        #[arg(long)]
        bigyapan_end_date: String,
        #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,
        #[command(flatten)]
        levels: LevelArgs,
        #[command(flatten)]
        records: RecordArgs,
        #[command(flatten)]
        engine: EngineArgs,
    },
}

#[derive(Args)]
struct RecordArgs {
    /// Assignment sheet (.csv, .xlsx, .xls, .ods)
    #[arg(long)]
    assignments: Option<PathBuf>,
    #[arg(long)]
    absences: Option<PathBuf>,
    #[arg(long)]
    leaves: Option<PathBuf>,
    /// Worksheet name; the first sheet otherwise
    #[arg(long)]
    sheet: Option<String>,
    /// Do not add synthetic assignments before the first row of a level
    #[arg(long)]
    no_synthetic: bool,
}

#[derive(Args)]
struct EngineArgs {
    /// Overrides SEWA_REFERENCE_DIR
    #[arg(long)]
    reference_dir: Option<PathBuf>,
    /// Overrides SEWA_ERA_CUTOFF
    #[arg(long)]
    era_cutoff: Option<String>,
    /// Overrides SEWA_TODAY
    #[arg(long)]
    today: Option<String>,
}

#[derive(Args)]
struct LevelArgs {
    #[arg(long)]
    level_min: Option<i32>,
    #[arg(long)]
    level_max: Option<i32>,
}

impl LevelArgs {
    fn range(&self) -> Option<RangeInclusive<i32>> {
        match (self.level_min, self.level_max) {
            (None, None) => None,
            (min, max) => Some(min.unwrap_or(i32::MIN)..=max.unwrap_or(i32::MAX)),
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Json,
    Csv,
}

// --- Loading ---

fn load_records(args: &RecordArgs) -> Result<EmployeeRecords> {
    let sheet = args.sheet.as_deref();
    let mut records = EmployeeRecords::default();
    if let Some(path) = &args.assignments {
        let rows = read_rows(path, sheet).with_context(|| format!("Reading {:?}", path))?;
        let assignments = parse_assignments(&rows)?;
        records.assignments = if args.no_synthetic {
            assignments
        } else {
            synthesize_pre_level_assignments(assignments)
        };
    }
    if let Some(path) = &args.absences {
        let rows = read_rows(path, sheet).with_context(|| format!("Reading {:?}", path))?;
        records.absences = parse_absences(&rows)?;
    }
    if let Some(path) = &args.leaves {
        let rows = read_rows(path, sheet).with_context(|| format!("Reading {:?}", path))?;
        records.leaves = parse_leaves(&rows)?;
    }
    Ok(records)
}

fn load_employees(path: &Path) -> Result<Vec<EmployeeProfile>> {
    let rows = read_rows(path, None).with_context(|| format!("Reading {:?}", path))?;
    Ok(parse_employees(&rows)?)
}

fn parse_gender(value: Option<&str>) -> Result<Option<Gender>> {
    match value {
        None => Ok(None),
        Some(s) => match Gender::parse(s) {
            Some(g) => Ok(Some(g)),
            None => bail!("Unknown gender '{}'", s),
        },
    }
}

/// Runtime settings: environment first, CLI flags on top.
struct Engine {
    builder: TimelineBuilder,
    today: BsDate,
}

impl Engine {
    fn new(config: &Config, args: &EngineArgs) -> Result<Self> {
        let mut config = config.clone();
        if let Some(dir) = &args.reference_dir {
            config.reference_dir = dir.clone();
        }
        if let Some(cutoff) = &args.era_cutoff {
            config.era_cutoff = cutoff.clone();
        }
        if let Some(today) = &args.today {
            config.today = Some(today.clone());
        }

        let cutoff = config.era_cutoff()?;
        let today = config
            .today()?
            .context("Current date is outside the supported BS calendar range")?;
        let store = CsvReferenceStore::from_dir(&config.reference_dir)
            .with_context(|| format!("Loading reference data from {:?}", config.reference_dir))?;
        info!("Era cutoff {}, open ends resolve to {}", cutoff, today);
        Ok(Self {
            builder: TimelineBuilder::new(
                EraSplitter::new(cutoff),
                ReferenceLookup::new(Arc::new(store)),
            ),
            today,
        })
    }
}

// --- Output ---

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_rows<T: Serialize>(rows: &[T], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(rows),
        OutputFormat::Csv => {
            let mut writer = csv::Writer::from_writer(io::stdout());
            for row in rows {
                writer.serialize(row)?;
            }
            writer.flush()?;
            Ok(())
        }
    }
}

// --- Main ---

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let cli = Cli::parse();
    let config = Config::from_env().context("Failed to read SEWA_* configuration")?;

    match cli.command {
        Commands::Normalize { values } => {
            for value in values {
                println!("{}\t{}", value, excel_date::normalize_str(&value));
            }
        }
        Commands::Timeline {
            employee,
            gender,
            levels,
            records,
            engine,
        } => {
            let engine = Engine::new(&config, &engine)?;
            let records = load_records(&records)?;
            let request = TimelineRequest {
                employee_id: &employee,
                gender: parse_gender(gender.as_deref())?,
                level_range: levels.range(),
                assignments: &records.assignments,
                absences: &records.absences,
                leaves: &records.leaves,
                today: engine.today,
            };
            let segments = engine.builder.build_timeline(&request).await?;
            print_json(&segments)?;
        }
        Commands::Seniority {
            employee,
            seniority_date,
            end_date,
            records,
        } => {
            let records = load_records(&records)?.for_employee(&employee);
            let segments = build_seniority_timeline(
                &excel_date::normalize_str(&seniority_date),
                &excel_date::normalize_str(&end_date),
                &records.absences,
                &records.leaves,
            )?;
            print_json(&segments)?;
        }
        Commands::Assignments {
            employee,
            gender,
            format,
            records,
            engine,
        } => {
            let engine = Engine::new(&config, &engine)?;
            let records = load_records(&records)?;
            let gender = parse_gender(gender.as_deref())?;
            let mut ids: Vec<String> = match employee {
                Some(id) => vec![id],
                None => records
                    .assignments
                    .iter()
                    .map(|a| a.employee_id.trim().to_string())
                    .collect(),
            };
            ids.sort();
            ids.dedup();

            let mut rows = Vec::new();
            for id in &ids {
                rows.extend(
                    employee_assignment_marks(
                        id,
                        &records.assignments,
                        gender,
                        engine.today,
                        engine.builder.splitter(),
                        engine.builder.lookup(),
                    )
                    .await?,
                );
            }
            print_rows(&rows, format)?;
        }
        Commands::Scorecard {
            employees,
            bigyapan_end_date,
            format,
            levels,
            records,
            engine,
        } => {
            let engine = Engine::new(&config, &engine)?;
            let records = load_records(&records)?;
            let vacancy = Vacancy {
                bigyapan_end_date: excel_date::normalize_str(&bigyapan_end_date),
                level_range: levels.range(),
            };
            let mut cards = Vec::new();
            for profile in load_employees(&employees)? {
                match build_scorecard(&engine.builder, &profile, &records, &vacancy).await {
                    Ok(card) => cards.push(card),
                    Err(e) => warn!("No scorecard for {}: {}", profile.employee_id, e),
                }
            }
            cards.sort_by(|a, b| b.total_marks.cmp(&a.total_marks));
            print_rows(&cards, format)?;
        }
    }
    Ok(())
}
