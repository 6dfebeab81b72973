#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]

use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use std::process;

use tadpole::config::{FailurePolicy, ForecastConfig, StrategyKind};
use tadpole::data::load_visit_table;
use tadpole::evaluate::{evaluate_submission, load_ground_truth};
use tadpole::pipeline::ForecastPipeline;
use tadpole::submission::SubmissionTable;

#[derive(Clone, Copy, ValueEnum)]
pub enum StrategyCli {
    Naive,
    LinearTrend,
}

impl From<StrategyCli> for StrategyKind {
    fn from(value: StrategyCli) -> Self {
        match value {
            StrategyCli::Naive => StrategyKind::Naive,
            StrategyCli::LinearTrend => StrategyKind::LinearTrend,
        }
    }
}

#[derive(Args)]
pub struct ForecastArgs {
    /// Path to the visit table CSV (e.g. TADPOLE_LB1_LB2.csv)
    pub visits: String,

    /// TOML configuration file; built-in defaults are used when omitted
    #[arg(long, value_name = "FILE")]
    pub config: Option<String>,

    /// Forecasting rule, overriding the configuration
    #[arg(long, value_enum)]
    pub strategy: Option<StrategyCli>,

    /// Number of monthly forecasts per subject, overriding the configuration
    #[arg(long, value_name = "MONTHS")]
    pub horizon: Option<u32>,

    /// Name of the 0/1 column selecting the subjects to forecast
    #[arg(long, value_name = "COLUMN")]
    pub cohort_column: Option<String>,

    /// Leave out subjects that cannot be forecast instead of stopping
    #[arg(long)]
    pub skip_failures: bool,

    /// Forecast subjects one at a time on the main thread
    #[arg(long)]
    pub sequential: bool,

    /// Where to write the submission CSV
    #[arg(long, short, default_value = "submission.csv")]
    pub output: String,
}

#[derive(Args)]
pub struct EvaluateArgs {
    /// Path to a submission CSV in the challenge format
    pub submission: String,

    /// Ground truth CSV with RID, CognitiveAssessmentDate, Diagnosis, ADAS13, ScanDate, Ventricles
    #[arg(long, value_name = "FILE")]
    pub truth: String,

    /// Also save the scores as TOML
    #[arg(long, short, value_name = "FILE")]
    pub output: Option<String>,
}

#[derive(Args)]
pub struct ConfigArgs {
    /// Where to write the default configuration
    #[arg(long, short, default_value = "forecast.toml")]
    pub output: String,
}

#[derive(Parser)]
#[command(
    name = "tadpole",
    version,
    about = "Forecast generation and submission scoring for the TADPOLE challenge",
    long_about = "Fills monthly forecasts of clinical status, ADAS13 and ventricle volume for \
                 every cohort subject, and scores submissions with MAUC, BCA, WES and CPA."
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Generate a submission from a visit table (outputs: submission.csv)")]
    Forecast(ForecastArgs),
    #[command(about = "Score a submission against ground truth")]
    Evaluate(EvaluateArgs),
    #[command(about = "Write the default configuration (outputs: forecast.toml)")]
    Config(ConfigArgs),
}

fn main() {
    env_logger::init();
    let Cli { command } = Cli::parse();

    let result = match command {
        Some(Commands::Forecast(args)) => forecast(args),
        Some(Commands::Evaluate(args)) => evaluate(args),
        Some(Commands::Config(args)) => write_default_config(args),
        None => {
            Cli::command().print_help().expect("print help");
            println!();
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

pub fn forecast(args: ForecastArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => {
            println!("Loading configuration from: {path}");
            ForecastConfig::load(path)?
        }
        None => ForecastConfig::default(),
    };
    if let Some(strategy) = args.strategy {
        config.strategy = strategy.into();
    }
    if let Some(horizon) = args.horizon {
        config.horizon_months = horizon;
    }
    if let Some(column) = args.cohort_column {
        config.cohort_column = column;
    }
    if args.skip_failures {
        config.failure_policy = FailurePolicy::Skip;
    }
    if args.sequential {
        config.parallel = false;
    }

    let pipeline = ForecastPipeline::from_config(&config)?;
    let table = load_visit_table(&args.visits, &config.cohort_column)?;
    println!(
        "Forecasting {} months from {} with the {} strategy",
        config.horizon_months,
        config.anchor_date,
        pipeline.strategy().name()
    );

    let run = pipeline.run_cohort(&table)?;
    for skipped in &run.skipped {
        println!("Skipped subject {}: {}", skipped.rid, skipped.error);
    }
    run.submission.write_csv(&args.output)?;
    println!(
        "Submission with {} rows for {} subjects saved to: {}",
        run.submission.len(),
        run.submission.subjects().len(),
        args.output
    );
    Ok(())
}

pub fn evaluate(args: EvaluateArgs) -> Result<(), Box<dyn std::error::Error>> {
    println!("Loading submission from: {}", args.submission);
    let submission = SubmissionTable::read_csv(&args.submission)?;
    println!("Loading ground truth from: {}", args.truth);
    let truth = load_ground_truth(&args.truth)?;

    let report = evaluate_submission(&submission, &truth)?;
    print!("{report}");
    if let Some(path) = &args.output {
        report.save(path)?;
        println!("Scores saved to: {path}");
    }
    Ok(())
}

pub fn write_default_config(args: ConfigArgs) -> Result<(), Box<dyn std::error::Error>> {
    ForecastConfig::default().save(&args.output)?;
    println!("Default configuration saved to: {}", args.output);
    Ok(())
}
