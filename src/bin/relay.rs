//! Relay CLI - Command-line interface for Synheart Relay
//!
//! Commands:
//! - simulate: Run a session in virtual time against an in-memory link
//! - decode: Decode a payload received on one of the relay channels
//! - config: Print and validate the effective configuration
//! - doctor: Diagnose environment and configuration

use clap::{Parser, Subcommand};
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use synheart_relay::clock::ManualClock;
use synheart_relay::config::{
    RelayConfig, BUFFER_CAPACITY, MAX_RETAINED, MIN_TRANSMISSION_INTERVAL_MILLIS,
    TARGET_SAMPLE_RATE_HZ,
};
use synheart_relay::encoder::InboundMessage;
use synheart_relay::error::TransportError;
use synheart_relay::session::{AggregationSession, MotionSensor};
use synheart_relay::sync::SyncFacade;
use synheart_relay::transport::{MemoryTransport, Peer};
use synheart_relay::types::{RawHeartRateEvent, TrackingMode, TransmissionOutcome};
use synheart_relay::{RelayError, PRODUCER_NAME, RELAY_VERSION};
use tokio::runtime::Builder;
use tracing_subscriber::EnvFilter;

/// Relay - Wrist-side sensor aggregation and batched relay
#[derive(Parser)]
#[command(name = "relay")]
#[command(author = "Synheart AI Inc")]
#[command(version = RELAY_VERSION)]
#[command(
    about = "Aggregate wrist sensor data and relay it to a companion device",
    long_about = None
)]
struct Cli {
    /// Log at debug level unless RUST_LOG is set
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a tracking session in virtual time against an in-memory link
    Simulate {
        /// Session length in seconds
        #[arg(long, default_value = "10")]
        duration_secs: u32,

        /// Accelerometer delivery rate in Hz
        #[arg(long, default_value = "50")]
        rate_hz: u32,

        /// Connected peer ids (comma-separated, empty for none)
        #[arg(long, value_delimiter = ',', default_value = "phone")]
        peers: Vec<String>,

        /// Make every send fail
        #[arg(long)]
        fail_sends: bool,

        /// Simulate a device without an accelerometer
        #[arg(long)]
        no_accelerometer: bool,

        /// Resting heart rate of the simulated wearer
        #[arg(long, default_value = "72")]
        bpm: i32,

        /// Load configuration from file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Write delivered messages as NDJSON (use - for stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Export heart-rate history before stopping
        #[arg(long)]
        export: bool,

        /// Output the summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Decode a payload received on a relay channel
    Decode {
        /// Channel the payload arrived on (e.g. /sensor_data)
        #[arg(short, long)]
        channel: String,

        /// Payload file path (use - for stdin)
        #[arg(short, long, default_value = "-")]
        input: PathBuf,
    },

    /// Print the effective configuration
    Config {
        /// Configuration file to validate (defaults when omitted)
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Diagnose environment and configuration
    Doctor {
        /// Check configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let report = serde_json::to_string(&CliError::from(e))
                .unwrap_or_else(|_| "Unknown error".to_string());
            eprintln!("{report}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<(), RelayCliError> {
    match cli.command {
        Commands::Simulate {
            duration_secs,
            rate_hz,
            peers,
            fail_sends,
            no_accelerometer,
            bpm,
            config,
            output,
            export,
            json,
        } => {
            let options = SimulationOptions {
                duration_secs,
                rate_hz,
                peers,
                fail_sends,
                accelerometer: !no_accelerometer,
                bpm,
                export,
            };
            cmd_simulate(&options, config.as_deref(), output.as_deref(), json)
        }

        Commands::Decode { channel, input } => cmd_decode(&channel, &input),

        Commands::Config { file } => cmd_config(file.as_deref()),

        Commands::Doctor { config, json } => cmd_doctor(config.as_deref(), json),
    }
}

fn load_config(path: Option<&Path>) -> Result<RelayConfig, RelayCliError> {
    match path {
        Some(path) => Ok(RelayConfig::from_json(&fs::read_to_string(path)?)?),
        None => Ok(RelayConfig::default()),
    }
}

// Simulation

struct SimulationOptions {
    duration_secs: u32,
    rate_hz: u32,
    peers: Vec<String>,
    fail_sends: bool,
    accelerometer: bool,
    bpm: i32,
    export: bool,
}

struct SimulatedAccelerometer {
    present: bool,
}

impl MotionSensor for SimulatedAccelerometer {
    fn is_present(&self) -> bool {
        self.present
    }

    fn register(&self) -> Result<(), String> {
        Ok(())
    }

    fn unregister(&self) {}
}

#[derive(Default, serde::Serialize)]
struct SimulationReport {
    session_id: String,
    mode: Option<TrackingMode>,
    virtual_duration_ms: i64,
    samples_offered: usize,
    samples_accepted: usize,
    samples_dropped: usize,
    heart_rate_events: usize,
    heart_rate_valid: usize,
    batches_formed: usize,
    batches_delivered: usize,
    batches_failed: usize,
    discarded_on_stop: usize,
    history_export: Option<TransmissionOutcome>,
}

fn cmd_simulate(
    options: &SimulationOptions,
    config: Option<&Path>,
    output: Option<&Path>,
    json: bool,
) -> Result<(), RelayCliError> {
    if options.rate_hz == 0 {
        return Err(RelayCliError::InvalidArgument(
            "rate_hz must be greater than 0".to_string(),
        ));
    }

    let config = load_config(config)?;
    let runtime = Builder::new_current_thread().enable_time().build()?;

    let clock = Arc::new(ManualClock::new(0));
    let transport = Arc::new(MemoryTransport::new());
    transport.set_peers(
        options
            .peers
            .iter()
            .filter(|id| !id.is_empty())
            .map(|id| Peer::new(id.as_str(), id.as_str()))
            .collect(),
    );
    if options.fail_sends {
        transport.fail_sends(TransportError::Rejected("simulated failure".to_string()));
    }

    let session = AggregationSession::new(
        config,
        transport.clone(),
        clock.clone(),
        runtime.handle().clone(),
    )?;
    let accelerometer = SimulatedAccelerometer {
        present: options.accelerometer,
    };

    let mut report = SimulationReport {
        session_id: session.session_id().to_string(),
        ..SimulationReport::default()
    };
    let mode = session.start(&accelerometer);
    report.mode = Some(mode);

    let total_samples = options.duration_secs as usize * options.rate_hz as usize;
    let mut next_heart_rate_ms = 0;

    for i in 0..total_samples {
        let now = (i as i64 * 1_000) / i64::from(options.rate_hz);
        clock.set(now);

        if now >= next_heart_rate_ms {
            report.heart_rate_events += 1;
            let event = simulated_heart_rate(options.bpm, report.heart_rate_events);
            if session.on_heart_rate_event(&event).is_some() {
                report.heart_rate_valid += 1;
            }
            next_heart_rate_ms += 1_000;
        }

        let t = now as f32 / 1_000.0;
        let admission = session.on_accel_sample(
            0.3 * (t * 2.1).sin(),
            0.2 * (t * 1.3).cos(),
            9.81 + 0.05 * (t * 4.7).sin(),
        );

        if mode != TrackingMode::Full {
            continue;
        }
        report.samples_offered += 1;
        if admission.accepted {
            report.samples_accepted += 1;
        } else {
            report.samples_dropped += 1;
        }

        if let Some(handle) = admission.dispatched {
            report.batches_formed += 1;
            let outcome = runtime.block_on(handle)?;
            if outcome.success {
                report.batches_delivered += 1;
            } else {
                report.batches_failed += 1;
            }
        }
    }

    report.virtual_duration_ms = i64::from(options.duration_secs) * 1_000;

    if options.export {
        let sync = SyncFacade::new(transport.clone());
        let history = session.history();
        report.history_export = Some(runtime.block_on(sync.export_history(&history)));
    }

    report.discarded_on_stop = session.stop(&accelerometer);

    if let Some(path) = output {
        write_messages(&transport, path)?;
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_simulation_report(&report);
    }

    Ok(())
}

/// Deterministic wearer: bpm drifts ±3 around the resting rate and every
/// tenth reading comes back without a valid status.
fn simulated_heart_rate(resting_bpm: i32, sequence: usize) -> RawHeartRateEvent {
    let bpm = resting_bpm + (sequence % 7) as i32 - 3;
    let valid = sequence % 10 != 0;
    let ibi = if bpm > 0 { 60_000 / bpm } else { 0 };

    RawHeartRateEvent {
        bpm,
        status_code: i32::from(valid),
        ibi_values: vec![ibi, ibi + 8, 0],
        ibi_statuses: vec![0, 0, 0],
    }
}

fn write_messages(transport: &MemoryTransport, path: &Path) -> Result<(), RelayCliError> {
    let mut out = String::new();
    for message in transport.sent() {
        let decoded = InboundMessage::decode(&message.channel, &message.payload)?;
        let line = serde_json::json!({
            "peer_id": message.peer_id,
            "channel": message.channel,
            "message": decoded.to_json_value()?,
        });
        out.push_str(&line.to_string());
        out.push('\n');
    }

    if path.to_string_lossy() == "-" {
        let mut stdout = io::stdout();
        stdout.write_all(out.as_bytes())?;
        stdout.flush()?;
    } else {
        fs::write(path, out)?;
    }
    Ok(())
}

fn print_simulation_report(report: &SimulationReport) {
    println!("Relay Simulation Report");
    println!("=======================");
    println!("Session:  {}", report.session_id);
    if let Some(mode) = report.mode {
        println!("Mode:     {:?}", mode);
    }
    println!("Duration: {} ms (virtual)", report.virtual_duration_ms);
    println!("\nMotion:");
    println!("  samples offered:  {}", report.samples_offered);
    println!("  samples buffered: {}", report.samples_accepted);
    println!("  samples dropped:  {}", report.samples_dropped);
    println!("  batches formed:   {}", report.batches_formed);
    println!("  delivered:        {}", report.batches_delivered);
    println!("  failed:           {}", report.batches_failed);
    println!("  discarded on stop: {}", report.discarded_on_stop);
    println!("\nHeart rate:");
    println!("  events: {}", report.heart_rate_events);
    println!("  valid:  {}", report.heart_rate_valid);
    if let Some(export) = &report.history_export {
        match &export.error_kind {
            None if export.success => println!(
                "  history exported to {}",
                export.peer_id.as_deref().unwrap_or("?")
            ),
            None => println!("  history export skipped (nothing retained)"),
            Some(kind) => println!("  history export failed: {}", kind.as_str()),
        }
    }
}

// Decode

fn cmd_decode(channel: &str, input: &Path) -> Result<(), RelayCliError> {
    let payload = if input.to_string_lossy() == "-" {
        let mut buffer = Vec::new();
        io::stdin().read_to_end(&mut buffer)?;
        buffer
    } else {
        fs::read(input)?
    };

    let message = InboundMessage::decode(channel, &payload)?;
    println!("{}", serde_json::to_string_pretty(&message.to_json_value()?)?);
    Ok(())
}

// Config

fn cmd_config(file: Option<&Path>) -> Result<(), RelayCliError> {
    let config = load_config(file)?;
    println!("{}", config.to_json()?);
    Ok(())
}

// Doctor

fn cmd_doctor(config: Option<&Path>, json: bool) -> Result<(), RelayCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "relay_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("Relay version {}", RELAY_VERSION),
    });

    checks.push(DoctorCheck {
        name: "wire_constants".to_string(),
        status: CheckStatus::Ok,
        message: format!(
            "batch {} samples @ {} Hz, min interval {} ms, history {}",
            BUFFER_CAPACITY, TARGET_SAMPLE_RATE_HZ, MIN_TRANSMISSION_INTERVAL_MILLIS, MAX_RETAINED
        ),
    });

    if let Some(config_path) = config {
        if config_path.exists() {
            match fs::read_to_string(config_path) {
                Ok(content) => match RelayConfig::from_json(&content) {
                    Ok(config) => {
                        let defaults = RelayConfig::default();
                        let (status, message) = if config == defaults {
                            (CheckStatus::Ok, "Config file valid (defaults)".to_string())
                        } else if config.buffer_capacity != defaults.buffer_capacity {
                            (
                                CheckStatus::Warning,
                                format!(
                                    "Config file valid, buffer_capacity {} differs from the companion's expected {}",
                                    config.buffer_capacity, defaults.buffer_capacity
                                ),
                            )
                        } else {
                            (CheckStatus::Ok, "Config file valid (overrides applied)".to_string())
                        };
                        checks.push(DoctorCheck {
                            name: "config".to_string(),
                            status,
                            message,
                        });
                    }
                    Err(e) => {
                        checks.push(DoctorCheck {
                            name: "config".to_string(),
                            status: CheckStatus::Error,
                            message: format!("Invalid config: {}", e),
                        });
                    }
                },
                Err(e) => {
                    checks.push(DoctorCheck {
                        name: "config".to_string(),
                        status: CheckStatus::Error,
                        message: format!("Cannot read config file: {}", e),
                    });
                }
            }
        } else {
            checks.push(DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Warning,
                message: "Config file does not exist".to_string(),
            });
        }
    }

    let stdin_check = if atty::is(atty::Stream::Stdin) {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a TTY (pass payloads to decode with --input)".to_string(),
        }
    } else {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a pipe (decode ready)".to_string(),
        }
    };
    checks.push(stdin_check);

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: RELAY_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Relay Doctor Report");
        println!("===================");
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
        Err(RelayCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

// Error types

#[derive(Debug)]
enum RelayCliError {
    Io(io::Error),
    Relay(RelayError),
    Json(serde_json::Error),
    Task(tokio::task::JoinError),
    InvalidArgument(String),
    DoctorFailed,
}

impl From<io::Error> for RelayCliError {
    fn from(e: io::Error) -> Self {
        RelayCliError::Io(e)
    }
}

impl From<RelayError> for RelayCliError {
    fn from(e: RelayError) -> Self {
        RelayCliError::Relay(e)
    }
}

impl From<serde_json::Error> for RelayCliError {
    fn from(e: serde_json::Error) -> Self {
        RelayCliError::Json(e)
    }
}

impl From<tokio::task::JoinError> for RelayCliError {
    fn from(e: tokio::task::JoinError) -> Self {
        RelayCliError::Task(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<RelayCliError> for CliError {
    fn from(e: RelayCliError) -> Self {
        match e {
            RelayCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            RelayCliError::Relay(e @ RelayError::InvalidConfig(_)) => CliError {
                code: "CONFIG_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Run 'relay config' to see the defaults".to_string()),
            },
            RelayCliError::Relay(e @ (RelayError::Decode(_) | RelayError::UnknownChannel(_))) => {
                CliError {
                    code: "DECODE_ERROR".to_string(),
                    message: e.to_string(),
                    hint: Some(
                        "Channels are /sensor_data, /heart_rate_batch and /heart_rate".to_string(),
                    ),
                }
            }
            RelayCliError::Relay(e) => CliError {
                code: "RELAY_ERROR".to_string(),
                message: e.to_string(),
                hint: None,
            },
            RelayCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            RelayCliError::Task(e) => CliError {
                code: "TASK_ERROR".to_string(),
                message: e.to_string(),
                hint: None,
            },
            RelayCliError::InvalidArgument(msg) => CliError {
                code: "INVALID_ARGUMENT".to_string(),
                message: msg,
                hint: Some("See 'relay --help'".to_string()),
            },
            RelayCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
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
