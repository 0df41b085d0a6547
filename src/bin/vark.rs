//! Vark CLI - Command-line interface for Vark Flux
//!
//! Commands:
//! - train: Fit a hybrid predictor on a dataset (or synthetic data) and save it
//! - predict: Classify session records with a saved model
//! - synthesize: Generate a labeled synthetic dataset
//! - doctor: Diagnose model and configuration health
//! - schema: Print input record and feature schema information

use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use tracing::info;

use vark_flux::adapter::{parse_dataset_array, parse_dataset_ndjson, parse_record, to_ndjson};
use vark_flux::features::{engineer_batch, feature_columns, FeatureSchema};
use vark_flux::hybrid::FitReport;
use vark_flux::metrics::ClassificationReport;
use vark_flux::pipeline::{fit_records, PredictionReport, VarkProcessor};
use vark_flux::preprocessing::{stratified_split, take_rows};
use vark_flux::synth::{synthesize, DEFAULT_SAMPLES, DEFAULT_SEED};
use vark_flux::types::{LabeledRecord, LearningStyle, RawMetricsRecord, NUM_STYLES};
use vark_flux::{HybridConfig, PRODUCER_NAME, VARK_FLUX_VERSION};

/// Vark - Hybrid learning-style classifier for VARK session metrics
#[derive(Parser)]
#[command(name = "vark")]
#[command(author = "Vark Flux Contributors")]
#[command(version = VARK_FLUX_VERSION)]
#[command(about = "Classify learning sessions into VARK styles", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train a hybrid predictor and save it
    Train {
        /// Model output path
        #[arg(short, long)]
        output: PathBuf,

        /// Labeled dataset (use - for stdin); synthetic data is generated if omitted
        #[arg(short, long)]
        data: Option<PathBuf>,

        /// Dataset format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        /// Number of synthetic samples when no dataset is given
        #[arg(long, default_value_t = DEFAULT_SAMPLES)]
        samples: usize,

        /// Seed for synthetic data generation
        #[arg(long, default_value_t = DEFAULT_SEED)]
        data_seed: u64,

        /// Training configuration JSON (missing keys use defaults)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Use the small fast configuration
        #[arg(long, conflicts_with = "config")]
        quick: bool,

        /// Feature schema, overriding the configuration
        #[arg(long)]
        features: Option<FeatureSet>,

        /// Hold out this fraction of records and report test metrics
        #[arg(long)]
        holdout: Option<f64>,
    },

    /// Classify session records with a saved model
    Predict {
        /// Saved model path
        #[arg(short, long)]
        model: PathBuf,

        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        /// Output format
        #[arg(long, default_value = "ndjson")]
        output_format: OutputFormat,
    },

    /// Generate a labeled synthetic dataset
    Synthesize {
        /// Number of records
        #[arg(short = 'n', long, default_value_t = DEFAULT_SAMPLES)]
        samples: usize,

        /// Generator seed
        #[arg(long, default_value_t = DEFAULT_SEED)]
        seed: u64,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Output format
        #[arg(long, default_value = "ndjson")]
        output_format: OutputFormat,
    },

    /// Diagnose model and configuration health
    Doctor {
        /// Check a saved model file
        #[arg(long)]
        model: Option<PathBuf>,

        /// Check a training configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print schema information
    Schema {
        /// Schema to print
        #[arg(value_enum)]
        schema_type: SchemaType,

        /// Feature schema for `features`
        #[arg(long, default_value = "full")]
        features: FeatureSet,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, ValueEnum)]
enum InputFormat {
    /// Newline-delimited JSON (one record per line)
    Ndjson,
    /// JSON array of records (or a single record object)
    Json,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Newline-delimited JSON (one record per line)
    Ndjson,
    /// JSON array of records
    Json,
    /// Pretty-printed JSON
    JsonPretty,
}

#[derive(Clone, Copy, ValueEnum)]
enum FeatureSet {
    /// All 72 engineered features
    Full,
    /// 38 features from clicks, time and questionnaire only
    Compact,
}

impl From<FeatureSet> for FeatureSchema {
    fn from(set: FeatureSet) -> Self {
        match set {
            FeatureSet::Full => FeatureSchema::Full,
            FeatureSet::Compact => FeatureSchema::Compact,
        }
    }
}

#[derive(Clone, ValueEnum)]
enum SchemaType {
    /// Session metrics record accepted by `predict`
    Input,
    /// Engineered feature columns
    Features,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let error = CliError::from(e);
            eprintln!(
                "{}",
                serde_json::to_string(&error).unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), VarkCliError> {
    match cli.command {
        Commands::Train {
            output,
            data,
            input_format,
            samples,
            data_seed,
            config,
            quick,
            features,
            holdout,
        } => {
            let mut config = match config {
                Some(path) => HybridConfig::from_file(&path)?,
                None if quick => HybridConfig::quick(),
                None => HybridConfig::default(),
            };
            if let Some(set) = features {
                config.feature_schema = set.into();
            }
            let records = match data {
                Some(path) => load_dataset(&path, input_format)?,
                None => {
                    info!(samples, seed = data_seed, "synthesizing training data");
                    synthesize(samples, data_seed)
                }
            };
            cmd_train(&output, records, config, holdout)
        }

        Commands::Predict {
            model,
            input,
            input_format,
            output_format,
        } => cmd_predict(&model, &input, input_format, output_format),

        Commands::Synthesize {
            samples,
            seed,
            output,
            output_format,
        } => cmd_synthesize(samples, seed, &output, output_format),

        Commands::Doctor { model, config, json } => {
            cmd_doctor(model.as_deref(), config.as_deref(), json)
        }

        Commands::Schema {
            schema_type,
            features,
            json,
        } => cmd_schema(schema_type, features.into(), json),
    }
}

#[derive(serde::Serialize)]
struct TrainSummary {
    fit: FitReport,
    holdout: Option<ClassificationReport>,
}

fn cmd_train(
    output: &Path,
    records: Vec<LabeledRecord>,
    config: HybridConfig,
    holdout: Option<f64>,
) -> Result<(), VarkCliError> {
    if records.is_empty() {
        return Err(VarkCliError::NoRecords);
    }

    let (train, test) = match holdout {
        Some(fraction) => {
            let codes: Vec<usize> = records.iter().map(|r| r.label.code() as usize).collect();
            let split = stratified_split(&codes, NUM_STYLES, fraction, config.seed)?;
            (take_rows(&records, &split.train), take_rows(&records, &split.validation))
        }
        None => (records, Vec::new()),
    };

    let schema = config.feature_schema;
    let (predictor, fit) = fit_records(&train, config)?;

    let holdout_report = if test.is_empty() {
        None
    } else {
        let raw: Vec<RawMetricsRecord> = test.iter().map(|r| r.record.clone()).collect();
        let actual: Vec<LearningStyle> = test.iter().map(|r| r.label).collect();
        let predicted = predictor.predict(&engineer_batch(&raw, schema)?)?;
        let report = ClassificationReport::new(&actual, &predicted)?;
        info!(
            rows = test.len(),
            accuracy = report.accuracy,
            macro_f1 = report.macro_f1(),
            "holdout evaluation"
        );
        Some(report)
    };

    VarkProcessor::new(predictor)?.save(output)?;

    let summary = TrainSummary {
        fit,
        holdout: holdout_report,
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn cmd_predict(
    model: &Path,
    input: &Path,
    input_format: InputFormat,
    output_format: OutputFormat,
) -> Result<(), VarkCliError> {
    let processor = VarkProcessor::load(model)?;
    let input_data = read_input(input)?;

    let records = match input_format {
        InputFormat::Ndjson => parse_records_ndjson(&input_data)?,
        InputFormat::Json => parse_records_json(&input_data)?,
    };

    if records.is_empty() {
        return Err(VarkCliError::NoRecords);
    }

    let mut reports: Vec<PredictionReport> = Vec::with_capacity(records.len());
    for record in &records {
        reports.push(processor.classify(record)?);
    }

    print!("{}", format_output(&reports, &output_format)?);
    Ok(())
}

fn cmd_synthesize(
    samples: usize,
    seed: u64,
    output: &Path,
    output_format: OutputFormat,
) -> Result<(), VarkCliError> {
    let records = synthesize(samples, seed);
    let output_data = match output_format {
        OutputFormat::Ndjson => to_ndjson(&records)?,
        _ => format_output(&records, &output_format)?,
    };

    if output.to_string_lossy() == "-" {
        print!("{}", output_data);
    } else {
        fs::write(output, output_data)?;
        info!(records = records.len(), path = %output.display(), "dataset written");
    }

    Ok(())
}

fn cmd_doctor(model: Option<&Path>, config: Option<&Path>, json: bool) -> Result<(), VarkCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "vark_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("Vark Flux version {}", VARK_FLUX_VERSION),
    });

    checks.push(DoctorCheck {
        name: "feature_schema".to_string(),
        status: CheckStatus::Ok,
        message: format!(
            "full: {} columns, compact: {} columns",
            feature_columns(FeatureSchema::Full).len(),
            feature_columns(FeatureSchema::Compact).len()
        ),
    });

    if let Some(model_path) = model {
        let check = if !model_path.exists() {
            DoctorCheck {
                name: "model".to_string(),
                status: CheckStatus::Warning,
                message: "Model file does not exist".to_string(),
            }
        } else {
            match VarkProcessor::load(model_path) {
                Ok(processor) => {
                    let predictor = processor.predictor();
                    DoctorCheck {
                        name: "model".to_string(),
                        status: CheckStatus::Ok,
                        message: format!(
                            "Model valid ({} features, {} schema, id {})",
                            predictor.feature_columns().len(),
                            predictor.config().feature_schema.as_str(),
                            predictor
                                .model_id()
                                .map(|id| id.to_string())
                                .unwrap_or_else(|| "unknown".to_string())
                        ),
                    }
                }
                Err(e) => DoctorCheck {
                    name: "model".to_string(),
                    status: CheckStatus::Error,
                    message: format!("Cannot load model: {}", e),
                },
            }
        };
        checks.push(check);
    }

    if let Some(config_path) = config {
        let check = match HybridConfig::from_file(config_path) {
            Ok(cfg) => DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Ok,
                message: format!(
                    "Config valid (fusion {:.2}/{:.2}, {} trees, {} boosting stages)",
                    cfg.fusion.neural,
                    cfg.fusion.ensemble,
                    cfg.forest.n_trees,
                    cfg.boosting.n_stages
                ),
            },
            Err(e) => DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Error,
                message: format!("Invalid config: {}", e),
            },
        };
        checks.push(check);
    }

    let stdin_check = if atty::is(atty::Stream::Stdin) {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a TTY (interactive mode)".to_string(),
        }
    } else {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a pipe (ready for `predict -i -`)".to_string(),
        }
    };
    checks.push(stdin_check);

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: VARK_FLUX_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Vark Doctor Report");
        println!("==================");
        println!("Producer: {}", report.producer);
        println!("Version:  {}", report.version);
        println!("\nChecks:");

        for check in &report.checks {
            let status_icon = match check.status {
                CheckStatus::Ok => "[OK]",
                CheckStatus::Warning => "[WARN]",
                CheckStatus::Error => "[ERR]",
            };
            println!("  {} {}: {}", status_icon, check.name, check.message);
        }
    }

    let has_errors = report.checks.iter().any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(VarkCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

fn cmd_schema(
    schema_type: SchemaType,
    features: FeatureSchema,
    json: bool,
) -> Result<(), VarkCliError> {
    match schema_type {
        SchemaType::Input => {
            if json {
                println!("{}", get_input_json_schema());
            } else {
                println!("Input: session metrics record");
                println!();
                println!("- engagement.visual: clicks, timeSpent, videoPlays, videoPauses, videoCompletion, hoverTime, revisits");
                println!("- engagement.auditory: clicks, timeSpent, audioPlays, audioPauses, audioCompletion, audioSeeks, hoverTime, revisits");
                println!("- engagement.reading: clicks, timeSpent, scrollDepth, maxScroll, textSelections, hoverTime, revisits");
                println!("- engagement.kinesthetic: clicks, timeSpent, dragAttempts, incorrectDrops, correctDrops, completionTime, firstSuccess, resetClicks, hoverTime, revisits");
                println!("- questionnaire: exactly 10 answers, each 0=Visual 1=Auditory 2=Reading 3=Kinesthetic");
                println!();
                println!("clicks and timeSpent are required; other signals default to 0.");
                println!("Labeled datasets add a top-level \"label\" (Visual, Auditory, Reading, Kinesthetic).");
            }
        }
        SchemaType::Features => {
            let columns = feature_columns(features);
            if json {
                println!(
                    "{}",
                    serde_json::json!({
                        "schema": features.as_str(),
                        "columns": columns,
                    })
                );
            } else {
                println!("Feature schema: {} ({} columns)", features.as_str(), columns.len());
                println!();
                for (i, column) in columns.iter().enumerate() {
                    println!("{:>3}  {}", i, column);
                }
            }
        }
    }

    Ok(())
}

// Helper functions

fn read_input(input: &Path) -> Result<String, VarkCliError> {
    if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(input)?)
    }
}

fn load_dataset(path: &Path, format: InputFormat) -> Result<Vec<LabeledRecord>, VarkCliError> {
    let data = read_input(path)?;
    let records = match format {
        InputFormat::Ndjson => parse_dataset_ndjson(&data)?,
        InputFormat::Json => parse_dataset_array(&data)?,
    };
    info!(records = records.len(), path = %path.display(), "dataset loaded");
    Ok(records)
}

fn parse_records_ndjson(data: &str) -> Result<Vec<RawMetricsRecord>, VarkCliError> {
    let mut records = Vec::new();
    for (line_no, line) in data.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let record = parse_record(trimmed)
            .map_err(|e| VarkCliError::ParseError(format!("line {}: {}", line_no + 1, e)))?;
        records.push(record);
    }
    Ok(records)
}

fn parse_records_json(data: &str) -> Result<Vec<RawMetricsRecord>, VarkCliError> {
    let value: serde_json::Value = serde_json::from_str(data)?;
    match value {
        serde_json::Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                parse_record(&item.to_string())
                    .map_err(|e| VarkCliError::ParseError(format!("record {}: {}", i, e)))
            })
            .collect(),
        other => Ok(vec![parse_record(&other.to_string())?]),
    }
}

fn format_output<T: serde::Serialize>(
    items: &[T],
    format: &OutputFormat,
) -> Result<String, VarkCliError> {
    match format {
        OutputFormat::Ndjson => {
            let mut lines: Vec<String> = Vec::new();
            for item in items {
                lines.push(serde_json::to_string(item)?);
            }
            Ok(lines.join("\n") + "\n")
        }
        OutputFormat::Json => Ok(serde_json::to_string(items)? + "\n"),
        OutputFormat::JsonPretty => Ok(serde_json::to_string_pretty(items)? + "\n"),
    }
}

fn get_input_json_schema() -> String {
    let modality = |signals: &[(&str, &str)]| {
        let mut properties = serde_json::Map::new();
        for (name, kind) in signals {
            let property = if *kind == "boolean" {
                serde_json::json!({ "type": "boolean" })
            } else {
                serde_json::json!({ "type": kind, "minimum": 0 })
            };
            properties.insert(name.to_string(), property);
        }
        serde_json::json!({
            "type": "object",
            "required": ["clicks", "timeSpent"],
            "properties": properties
        })
    };
    let common = [
        ("clicks", "integer"),
        ("timeSpent", "number"),
        ("hoverTime", "number"),
        ("revisits", "integer"),
    ];
    let with_common = |extra: &[(&'static str, &'static str)]| {
        let mut signals: Vec<(&str, &str)> = common.to_vec();
        signals.extend_from_slice(extra);
        modality(&signals)
    };

    serde_json::json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "title": "vark.session_metrics.v1",
        "description": "Learning session engagement metrics and VARK questionnaire answers",
        "type": "object",
        "required": ["engagement", "questionnaire"],
        "properties": {
            "engagement": {
                "type": "object",
                "required": ["visual", "auditory", "reading", "kinesthetic"],
                "properties": {
                    "visual": with_common(&[
                        ("videoPlays", "integer"),
                        ("videoPauses", "integer"),
                        ("videoCompletion", "number"),
                    ]),
                    "auditory": with_common(&[
                        ("audioPlays", "integer"),
                        ("audioPauses", "integer"),
                        ("audioCompletion", "number"),
                        ("audioSeeks", "integer"),
                    ]),
                    "reading": with_common(&[
                        ("scrollDepth", "number"),
                        ("maxScroll", "number"),
                        ("textSelections", "integer"),
                    ]),
                    "kinesthetic": with_common(&[
                        ("dragAttempts", "integer"),
                        ("incorrectDrops", "integer"),
                        ("correctDrops", "integer"),
                        ("completionTime", "number"),
                        ("firstSuccess", "boolean"),
                        ("resetClicks", "integer"),
                    ]),
                }
            },
            "questionnaire": {
                "type": "array",
                "items": { "type": "integer", "minimum": 0, "maximum": 3 },
                "minItems": 10,
                "maxItems": 10
            },
            "label": {
                "type": "string",
                "enum": ["Visual", "Auditory", "Reading", "Kinesthetic"]
            }
        }
    })
    .to_string()
}

// Error types

#[derive(Debug)]
enum VarkCliError {
    Io(io::Error),
    Compute(vark_flux::ComputeError),
    Json(serde_json::Error),
    NoRecords,
    DoctorFailed,
    ParseError(String),
}

impl From<io::Error> for VarkCliError {
    fn from(e: io::Error) -> Self {
        VarkCliError::Io(e)
    }
}

impl From<vark_flux::ComputeError> for VarkCliError {
    fn from(e: vark_flux::ComputeError) -> Self {
        VarkCliError::Compute(e)
    }
}

impl From<serde_json::Error> for VarkCliError {
    fn from(e: serde_json::Error) -> Self {
        VarkCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<VarkCliError> for CliError {
    fn from(e: VarkCliError) -> Self {
        use vark_flux::ComputeError;

        match e {
            VarkCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            VarkCliError::Compute(e) => {
                let (code, hint) = match &e {
                    ComputeError::ParseError(_)
                    | ComputeError::JsonError(_)
                    | ComputeError::MissingField(_) => {
                        ("PARSE_ERROR", "Run 'vark schema input' for the record format")
                    }
                    ComputeError::SchemaError(_)
                    | ComputeError::QuestionnaireLength { .. }
                    | ComputeError::QuestionnaireCode { .. }
                    | ComputeError::UnknownStyle(_) => {
                        ("VALIDATION_ERROR", "Questionnaires need 10 answers coded 0-3")
                    }
                    ComputeError::InvalidConfig(_) => {
                        ("CONFIG_ERROR", "Run 'vark doctor --config <file>' for details")
                    }
                    ComputeError::NotFitted(_) | ComputeError::FeatureMismatch(_) => {
                        ("MODEL_ERROR", "Retrain the model with 'vark train'")
                    }
                    ComputeError::PersistenceError(_) => {
                        ("IO_ERROR", "Check file paths and permissions")
                    }
                    _ => ("COMPUTE_ERROR", "Check the training data and configuration"),
                };
                CliError {
                    code: code.to_string(),
                    message: e.to_string(),
                    hint: Some(hint.to_string()),
                }
            }
            VarkCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            VarkCliError::NoRecords => CliError {
                code: "NO_RECORDS".to_string(),
                message: "No records found in input".to_string(),
                hint: Some("Ensure input file is not empty".to_string()),
            },
            VarkCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
            VarkCliError::ParseError(msg) => CliError {
                code: "PARSE_ERROR".to_string(),
                message: msg,
                hint: Some("Check input format".to_string()),
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct DoctorReport {
    producer: String,
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(serde::Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(serde::Serialize)]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}
