//! VibeFlow CLI - Command-line interface for the VibeFlow engine
//!
//! Commands:
//! - replay: Feed recorded host events through a session (batch mode)
//! - run: Process host events from stdin, one response per line (streaming mode)
//! - validate: Validate host event schema
//! - doctor: Diagnose configuration and state files
//! - schema: Print schema information

use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, BufRead, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use vibeflow::clock::ManualClock;
use vibeflow::export::FileExportSink;
use vibeflow::schema::{HostEvent, HostEventAdapter, SCHEMA_VERSION};
use vibeflow::scorer::{Jitter, NoJitter, UniformJitter};
use vibeflow::store::{JsonFileStore, KeyValueStore, MemoryStore};
use vibeflow::{FlowConfig, FlowSession, HostResponse, VibeflowError, PRODUCER_NAME, VIBEFLOW_VERSION};

/// VibeFlow - flow-state estimation for code editors
#[derive(Parser)]
#[command(name = "vibeflow")]
#[command(version = VIBEFLOW_VERSION)]
#[command(about = "Score editing sessions for flow and nudge on low flow", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay recorded host events through a session (batch mode)
    Replay {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long)]
        output: PathBuf,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        /// Output format
        #[arg(long, default_value = "ndjson")]
        output_format: OutputFormat,

        /// Session config (JSON)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Persist assist mode and logs in this JSON file
        #[arg(long)]
        state: Option<PathBuf>,

        /// Disable score jitter
        #[arg(long)]
        no_jitter: bool,

        /// Seed for score jitter
        #[arg(long, conflicts_with = "no_jitter")]
        seed: Option<u64>,

        /// Export the log bundle to this file after replay
        #[arg(long)]
        bundle: Option<PathBuf>,
    },

    /// Process streaming host events from stdin (streaming mode)
    Run {
        /// Session config (JSON)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Persist assist mode and logs in this JSON file
        #[arg(long)]
        state: Option<PathBuf>,

        /// Disable score jitter
        #[arg(long)]
        no_jitter: bool,

        /// Buffer output instead of flushing after each record
        #[arg(long)]
        no_flush: bool,
    },

    /// Validate host event schema
    Validate {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        /// Output validation report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Diagnose configuration and state files
    Doctor {
        /// Check a session config file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Check a state file
        #[arg(long)]
        state: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print schema information
    Schema {
        /// Schema to print (input or output)
        #[arg(value_enum)]
        schema_type: SchemaType,

        /// Output as JSON schema
        #[arg(long)]
        json_schema: bool,
    },
}

#[derive(Clone, ValueEnum)]
enum InputFormat {
    /// Newline-delimited JSON (one event per line)
    Ndjson,
    /// JSON array of events
    Json,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Newline-delimited JSON (one response per line)
    Ndjson,
    /// JSON array of responses
    Json,
    /// Pretty-printed JSON
    JsonPretty,
}

#[derive(Clone, ValueEnum)]
enum SchemaType {
    /// Input schema (vibeflow.host_event.v1)
    Input,
    /// Output schema (session responses)
    Output,
}

fn main() -> ExitCode {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", serde_json::to_string(&CliError::from(e)).unwrap_or_else(|_| "Unknown error".to_string()));
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), VibeflowCliError> {
    match cli.command {
        Commands::Replay {
            input,
            output,
            input_format,
            output_format,
            config,
            state,
            no_jitter,
            seed,
            bundle,
        } => cmd_replay(
            &input,
            &output,
            input_format,
            output_format,
            SessionOptions {
                config: config.as_deref(),
                state: state.as_deref(),
                jitter: jitter_source(no_jitter, seed),
            },
            bundle.as_deref(),
        ),

        Commands::Run {
            config,
            state,
            no_jitter,
            no_flush,
        } => cmd_run(
            SessionOptions {
                config: config.as_deref(),
                state: state.as_deref(),
                jitter: jitter_source(no_jitter, None),
            },
            !no_flush,
        ),

        Commands::Validate {
            input,
            input_format,
            json,
        } => cmd_validate(&input, input_format, json),

        Commands::Doctor { config, state, json } => cmd_doctor(config.as_deref(), state.as_deref(), json),

        Commands::Schema { schema_type, json_schema } => cmd_schema(schema_type, json_schema),
    }
}

struct SessionOptions<'a> {
    config: Option<&'a Path>,
    state: Option<&'a Path>,
    jitter: Box<dyn Jitter>,
}

fn jitter_source(no_jitter: bool, seed: Option<u64>) -> Box<dyn Jitter> {
    match (no_jitter, seed) {
        (true, _) => Box::new(NoJitter),
        (false, Some(seed)) => Box::new(UniformJitter::seeded(seed)),
        (false, None) => Box::new(UniformJitter::new()),
    }
}

/// Build a session whose clock follows the host event timestamps
fn open_session(options: SessionOptions<'_>, clock: &ManualClock) -> Result<FlowSession, VibeflowCliError> {
    let config = match options.config {
        Some(path) => FlowConfig::load(path)?,
        None => FlowConfig::default(),
    };

    let store: Box<dyn KeyValueStore> = match options.state {
        Some(path) => Box::new(JsonFileStore::open(path)?),
        None => Box::new(MemoryStore::new()),
    };

    Ok(FlowSession::with_parts(
        config,
        Box::new(clock.clone()),
        options.jitter,
        store,
    )?)
}

fn respond(session: &mut FlowSession, clock: &ManualClock, event: &HostEvent) -> HostResponse {
    clock.set(event.timestamp);
    session.handle(event).unwrap_or_else(|e| HostResponse::Error {
        message: e.to_string(),
    })
}

fn read_input(input: &Path) -> Result<String, VibeflowCliError> {
    if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(input)?)
    }
}

fn parse_events(input_data: &str, input_format: InputFormat) -> Result<Vec<HostEvent>, VibeflowCliError> {
    Ok(match input_format {
        InputFormat::Ndjson => HostEventAdapter::parse_ndjson(input_data)?,
        InputFormat::Json => HostEventAdapter::parse_array(input_data)?,
    })
}

fn cmd_replay(
    input: &Path,
    output: &Path,
    input_format: InputFormat,
    output_format: OutputFormat,
    options: SessionOptions<'_>,
    bundle: Option<&Path>,
) -> Result<(), VibeflowCliError> {
    let events = parse_events(&read_input(input)?, input_format)?;

    let Some(first) = events.first() else {
        return Err(VibeflowCliError::NoEvents);
    };

    let out_of_order = HostEventAdapter::out_of_order(&events);
    if !out_of_order.is_empty() {
        log::warn!("{} events arrive earlier than their predecessor", out_of_order.len());
    }

    let clock = ManualClock::new(first.timestamp);
    let mut session = open_session(options, &clock)?;

    let responses: Vec<HostResponse> = events
        .iter()
        .map(|event| respond(&mut session, &clock, event))
        .collect();

    // Export the log bundle if requested
    if let Some(bundle_path) = bundle {
        session.export_logs(&mut FileExportSink::new(bundle_path))?;
    }

    let output_data = format_output(&responses, &output_format)?;

    if output.to_string_lossy() == "-" {
        print!("{}", output_data);
    } else {
        fs::write(output, output_data)?;
    }

    Ok(())
}

fn cmd_run(options: SessionOptions<'_>, flush: bool) -> Result<(), VibeflowCliError> {
    let clock = ManualClock::new(chrono::Utc::now());
    let mut session = open_session(options, &clock)?;

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = line?;
        let trimmed = line.trim();

        if trimmed.is_empty() {
            continue;
        }

        let response = match HostEventAdapter::parse_line(trimmed) {
            Ok(event) => respond(&mut session, &clock, &event),
            Err(e) => HostResponse::Error {
                message: format!("Failed to parse event: {}", e),
            },
        };

        writeln!(stdout, "{}", serde_json::to_string(&response)?)?;
        if flush {
            stdout.flush()?;
        }
    }

    stdout.flush()?;
    Ok(())
}

fn cmd_validate(input: &Path, input_format: InputFormat, json: bool) -> Result<(), VibeflowCliError> {
    let events = parse_events(&read_input(input)?, input_format)?;

    let results = HostEventAdapter::validate_events(&events);
    let out_of_order = HostEventAdapter::out_of_order(&events);

    let report = ValidationReport {
        total_events: events.len(),
        valid_events: events.len() - results.len(),
        invalid_events: results.len(),
        out_of_order,
        errors: results
            .iter()
            .map(|r| ValidationErrorDetail {
                index: r.index,
                kind: format!("{:?}", r.kind),
                error: r.error.to_string(),
            })
            .collect(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Validation Report");
        println!("=================");
        println!("Total events:   {}", report.total_events);
        println!("Valid events:   {}", report.valid_events);
        println!("Invalid events: {}", report.invalid_events);

        if !report.out_of_order.is_empty() {
            println!("Out of order:   {:?}", report.out_of_order);
        }

        if !report.errors.is_empty() {
            println!("\nErrors:");
            for err in &report.errors {
                println!("  - {} event (index {}): {}", err.kind, err.index, err.error);
            }
        }
    }

    if report.invalid_events > 0 {
        Err(VibeflowCliError::ValidationFailed(report.invalid_events))
    } else {
        Ok(())
    }
}

fn cmd_doctor(config: Option<&Path>, state: Option<&Path>, json: bool) -> Result<(), VibeflowCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "vibeflow_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("VibeFlow version {}", VIBEFLOW_VERSION),
    });

    checks.push(DoctorCheck {
        name: "schema_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("Input schema: {}", SCHEMA_VERSION),
    });

    if let Some(config_path) = config {
        checks.push(match FlowConfig::load(config_path) {
            Ok(config) => DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Ok,
                message: format!(
                    "Config valid (thresholds {}/{}, streak {})",
                    config.nudge.low_threshold, config.nudge.high_threshold, config.nudge.streak
                ),
            },
            Err(e) => DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Error,
                message: e.to_string(),
            },
        });
    }

    if let Some(state_path) = state {
        checks.push(if !state_path.exists() {
            DoctorCheck {
                name: "state".to_string(),
                status: CheckStatus::Warning,
                message: "State file does not exist (a fresh one will be created)".to_string(),
            }
        } else {
            match JsonFileStore::open(state_path) {
                Ok(store) => DoctorCheck {
                    name: "state".to_string(),
                    status: CheckStatus::Ok,
                    message: format!(
                        "State file {} valid ({} keys)",
                        store.path().display(),
                        store.keys().count()
                    ),
                },
                Err(e) => DoctorCheck {
                    name: "state".to_string(),
                    status: CheckStatus::Error,
                    message: e.to_string(),
                },
            }
        });
    }

    // Check stdin is available (for streaming mode)
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
            message: "stdin is a pipe (streaming mode ready)".to_string(),
        }
    };
    checks.push(stdin_check);

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: VIBEFLOW_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("VibeFlow Doctor Report");
        println!("======================");
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
        Err(VibeflowCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

fn cmd_schema(schema_type: SchemaType, json_schema: bool) -> Result<(), VibeflowCliError> {
    match schema_type {
        SchemaType::Input => {
            if json_schema {
                println!("{}", get_input_json_schema());
            } else {
                println!("Input Schema: {}", SCHEMA_VERSION);
                println!();
                println!("Each record is {{ schema_version, timestamp, kind, payload }}:");
                println!();
                println!("1. text_change - {{ changes: [{{ text, range_length }}] }}");
                println!("   - one entry per sub-change; missing fields count as empty");
                println!();
                println!("2. focus - {{ focused: bool }}");
                println!();
                println!("3. tick - no payload; evaluated at most once per second");
                println!();
                println!("4. command - {{ command, mood?, path? }}");
                println!("   - report_mood, toggle_assist, log_ai_reject, export_logs, open_dashboard");
                println!();
                println!("5. decision - {{ token, choice? }} answering a prompt; no choice = dismissed");
                println!();
                println!("6. dashboard_ack - no payload; cancels the fallback snapshot push");
            }
        }
        SchemaType::Output => {
            if json_schema {
                println!("{}", get_output_json_schema());
            } else {
                println!("Output Schema: session responses");
                println!();
                println!("Every response carries a \"type\" tag:");
                println!();
                println!("- edits: {{ events: [{{ type, timestamp, payload }}] }}");
                println!("- tick: {{ status?, prompt?, dashboard?, applied? }}");
                println!("  - status: {{ timestamp, score, band, state, consecutive_low, assist_enabled }}");
                println!("- prompt: {{ prompt: {{ token, kind, issued_at, options }} }}");
                println!("- mood: {{ entry: {{ timestamp, mood }} }}");
                println!("- assist: {{ enabled }}");
                println!("- rejected: {{ ai_rejections }}");
                println!("- snapshot: {{ snapshot: {{ history, moods, events, metrics }} }}");
                println!("- exported: {{ location }}");
                println!("- ack, error: {{ message }}");
            }
        }
    }

    Ok(())
}

// Helper functions

fn format_output(responses: &[HostResponse], format: &OutputFormat) -> Result<String, VibeflowCliError> {
    match format {
        OutputFormat::Ndjson => {
            let mut lines: Vec<String> = Vec::new();
            for response in responses {
                lines.push(serde_json::to_string(response)?);
            }
            Ok(lines.join("\n") + "\n")
        }
        OutputFormat::Json => Ok(serde_json::to_string(responses)?),
        OutputFormat::JsonPretty => Ok(serde_json::to_string_pretty(responses)?),
    }
}

fn get_input_json_schema() -> String {
    serde_json::json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "title": SCHEMA_VERSION,
        "description": "VibeFlow host event schema",
        "type": "object",
        "required": ["timestamp", "kind"],
        "properties": {
            "schema_version": {
                "type": "string",
                "const": SCHEMA_VERSION
            },
            "timestamp": { "type": "string", "format": "date-time" },
            "kind": {
                "type": "string",
                "enum": ["text_change", "focus", "tick", "command", "decision", "dashboard_ack"]
            },
            "payload": {
                "oneOf": [
                    {
                        "type": "object",
                        "required": ["changes"],
                        "properties": {
                            "changes": {
                                "type": "array",
                                "items": {
                                    "type": "object",
                                    "properties": {
                                        "text": { "type": "string" },
                                        "range_length": { "type": "integer", "minimum": 0 }
                                    }
                                }
                            }
                        }
                    },
                    {
                        "type": "object",
                        "required": ["focused"],
                        "properties": { "focused": { "type": "boolean" } }
                    },
                    {
                        "type": "object",
                        "required": ["command"],
                        "properties": {
                            "command": {
                                "type": "string",
                                "enum": ["report_mood", "toggle_assist", "log_ai_reject", "export_logs", "open_dashboard"]
                            },
                            "mood": { "type": "string", "enum": ["Happy", "Neutral", "Stuck"] },
                            "path": { "type": "string" }
                        }
                    },
                    {
                        "type": "object",
                        "required": ["token"],
                        "properties": {
                            "token": { "type": "string", "format": "uuid" },
                            "choice": { "type": "string" }
                        }
                    }
                ]
            }
        }
    })
    .to_string()
}

fn get_output_json_schema() -> String {
    serde_json::json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "title": "vibeflow.response",
        "description": "VibeFlow session response",
        "type": "object",
        "required": ["type"],
        "properties": {
            "type": {
                "type": "string",
                "enum": ["edits", "tick", "prompt", "mood", "assist", "rejected", "snapshot", "exported", "ack", "error"]
            },
            "events": { "type": "array", "items": { "type": "object" } },
            "status": {
                "type": "object",
                "properties": {
                    "timestamp": { "type": "string", "format": "date-time" },
                    "score": { "type": "integer", "minimum": 0, "maximum": 100 },
                    "band": { "type": "string", "enum": ["high", "mid", "low"] },
                    "state": { "type": "string" },
                    "consecutive_low": { "type": "integer" },
                    "assist_enabled": { "type": "boolean" }
                }
            },
            "prompt": { "type": "object" },
            "snapshot": { "type": "object" },
            "location": { "type": "string" },
            "message": { "type": "string" }
        }
    })
    .to_string()
}

// Error types

#[derive(Debug)]
enum VibeflowCliError {
    Io(io::Error),
    Engine(VibeflowError),
    Json(serde_json::Error),
    NoEvents,
    ValidationFailed(usize),
    DoctorFailed,
}

impl From<io::Error> for VibeflowCliError {
    fn from(e: io::Error) -> Self {
        VibeflowCliError::Io(e)
    }
}

impl From<VibeflowError> for VibeflowCliError {
    fn from(e: VibeflowError) -> Self {
        VibeflowCliError::Engine(e)
    }
}

impl From<serde_json::Error> for VibeflowCliError {
    fn from(e: serde_json::Error) -> Self {
        VibeflowCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<VibeflowCliError> for CliError {
    fn from(e: VibeflowCliError) -> Self {
        match e {
            VibeflowCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            VibeflowCliError::Engine(e) => {
                let (code, hint) = match &e {
                    VibeflowError::ParseError(_) | VibeflowError::JsonError(_) => {
                        ("PARSE_ERROR", "Ensure input matches the vibeflow.host_event.v1 schema")
                    }
                    VibeflowError::InvalidEvent(_) => ("INVALID_EVENT", "Run 'vibeflow validate' for details"),
                    VibeflowError::Config(_) => ("CONFIG_ERROR", "Run 'vibeflow doctor --config <file>'"),
                    VibeflowError::Store(_) => ("STATE_ERROR", "Run 'vibeflow doctor --state <file>'"),
                    VibeflowError::Export(_) => ("EXPORT_ERROR", "Check the bundle path is writable"),
                };
                CliError {
                    code: code.to_string(),
                    message: e.to_string(),
                    hint: Some(hint.to_string()),
                }
            }
            VibeflowCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            VibeflowCliError::NoEvents => CliError {
                code: "NO_EVENTS".to_string(),
                message: "No events found in input".to_string(),
                hint: Some("Ensure input file is not empty".to_string()),
            },
            VibeflowCliError::ValidationFailed(count) => CliError {
                code: "VALIDATION_FAILED".to_string(),
                message: format!("{} events failed validation", count),
                hint: Some("Fix validation errors and retry".to_string()),
            },
            VibeflowCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct ValidationReport {
    total_events: usize,
    valid_events: usize,
    invalid_events: usize,
    out_of_order: Vec<usize>,
    errors: Vec<ValidationErrorDetail>,
}

#[derive(serde::Serialize)]
struct ValidationErrorDetail {
    index: usize,
    kind: String,
    error: String,
}

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

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn run_flush(args: &[&str]) -> bool {
        let cli = Cli::try_parse_from(args).unwrap();
        match cli.command {
            Commands::Run { no_flush, .. } => !no_flush,
            _ => panic!("expected run command"),
        }
    }

    #[test]
    fn test_run_flushes_by_default() {
        assert_eq!(run_flush(&["vibeflow", "run"]), true);
    }

    #[test]
    fn test_run_no_flush_disables_flushing() {
        assert_eq!(run_flush(&["vibeflow", "run", "--no-flush"]), false);
        assert!(Cli::try_parse_from(["vibeflow", "run", "--flush", "false"]).is_err());
    }
}
