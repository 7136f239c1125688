//! Run a simulated marker-anchored session and print a JSON report.
//!
//! Usage:
//!   ar-anchor --refreshes 120 --occlude 30..60
//!   ar-anchor --config session.json --permission denied

use std::ops::Range;
use std::path::PathBuf;
use std::process::ExitCode;

use ar_anchor::session::{ConfigError, ConfigIoError};
use ar_anchor::sim::{demo_config, run_scenario, CameraPermission, Scenario, SimulatedCamera};
use ar_anchor::{SessionConfig, SessionError, Viewport};
use clap::{ArgAction, Parser, ValueEnum};
use log::LevelFilter;

/// Exit code for a run whose session never reached `Running`.
const EXIT_NOT_STARTED: u8 = 2;

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error("config: {0}")]
    ConfigIo(#[from] ConfigIoError),
    #[error("config: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("report: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Permission {
    Granted,
    Denied,
    Unavailable,
}

impl From<Permission> for CameraPermission {
    fn from(p: Permission) -> Self {
        match p {
            Permission::Granted => CameraPermission::Granted,
            Permission::Denied => CameraPermission::Denied,
            Permission::Unavailable => CameraPermission::Unavailable,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "ar-anchor",
    version,
    about = "Run a simulated marker-anchored AR session and print a JSON report"
)]
struct Cli {
    /// Session config (JSON). A single marker with a plane overlay when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Display refreshes to run once the session is up.
    #[arg(long, default_value_t = 120)]
    refreshes: u64,

    /// Outcome of the camera permission prompt.
    #[arg(long, value_enum, default_value_t = Permission::Granted)]
    permission: Permission,

    /// Hide every marker on camera frames START..END (repeatable).
    #[arg(long = "occlude", value_name = "START..END", value_parser = parse_frames)]
    occlusions: Vec<Range<u64>>,

    /// The camera delivers a new frame every N display refreshes.
    #[arg(long, default_value_t = 1)]
    camera_every: u32,

    /// Make the estimator reject its marker descriptor.
    #[arg(long)]
    fail_init: bool,

    /// Read the marker descriptor asset from disk during init.
    #[arg(long)]
    load_descriptor: bool,

    /// Run the estimator on a worker thread.
    #[arg(long)]
    worker: bool,

    /// Resize the output surface to WxH halfway through the run.
    #[arg(long, value_name = "WxH", value_parser = parse_viewport)]
    resize: Option<Viewport>,

    /// Write the effective config to this path and exit.
    #[arg(long, value_name = "PATH")]
    write_config: Option<PathBuf>,

    /// Pretty-print the report.
    #[arg(long)]
    pretty: bool,

    /// More log output on stderr (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Log through `tracing` as JSON lines (filter from RUST_LOG).
    #[cfg(feature = "tracing")]
    #[arg(long)]
    json_logs: bool,
}

fn parse_frames(raw: &str) -> Result<Range<u64>, String> {
    let (start, end) = raw
        .split_once("..")
        .ok_or_else(|| format!("invalid frame range {raw:?}, expected START..END"))?;
    let start: u64 = start
        .trim()
        .parse()
        .map_err(|e| format!("invalid range start {start:?}: {e}"))?;
    let end: u64 = end
        .trim()
        .parse()
        .map_err(|e| format!("invalid range end {end:?}: {e}"))?;
    if end <= start {
        return Err(format!("invalid frame range {raw:?}: empty"));
    }
    Ok(start..end)
}

fn parse_viewport(raw: &str) -> Result<Viewport, String> {
    let (w, h) = raw
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("invalid size {raw:?}, expected WxH"))?;
    let width: u32 = w.parse().map_err(|e| format!("invalid width {w:?}: {e}"))?;
    let height: u32 = h.parse().map_err(|e| format!("invalid height {h:?}: {e}"))?;
    if width == 0 || height == 0 {
        return Err(format!("invalid size {raw:?}: empty surface"));
    }
    Ok(Viewport::new(width, height))
}

fn init_logging(cli: &Cli) {
    #[cfg(feature = "tracing")]
    if cli.json_logs {
        let _ = tracing_log::LogTracer::init();
        ar_anchor::init_tracing(true);
        return;
    }
    let level = match cli.verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    if let Err(err) = ar_anchor::init_with_level(level) {
        eprintln!("logger already installed: {err}");
    }
}

fn run(cli: Cli) -> Result<bool, CliError> {
    let config = match &cli.config {
        Some(path) => SessionConfig::load_json(path)?,
        None => demo_config(),
    };
    config.validate()?;

    if let Some(path) = &cli.write_config {
        config.write_json(path)?;
        log::info!("config written to {}", path.display());
        return Ok(true);
    }

    let mut scenario = Scenario::from_config(config);
    scenario.refreshes = cli.refreshes;
    scenario.camera = SimulatedCamera {
        permission: cli.permission.into(),
        frame_every: cli.camera_every,
    };
    scenario.fail_init = cli.fail_init;
    scenario.load_descriptor = cli.load_descriptor;
    scenario.worker = cli.worker;
    scenario.resize = cli.resize.map(|viewport| (cli.refreshes / 2, viewport));
    for frames in &cli.occlusions {
        scenario.occlude(frames.clone());
    }

    let report = run_scenario(&scenario)?;
    let json = if cli.pretty {
        serde_json::to_string_pretty(&report)?
    } else {
        serde_json::to_string(&report)?
    };
    println!("{json}");
    Ok(report.started)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli);

    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(EXIT_NOT_STARTED),
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_ranges_parse() {
        assert_eq!(parse_frames("10..20"), Ok(10..20));
        assert_eq!(parse_frames(" 3 .. 4 "), Ok(3..4));
        assert!(parse_frames("20..10").is_err());
        assert!(parse_frames("10-20").is_err());
    }

    #[test]
    fn viewport_sizes_parse() {
        assert_eq!(parse_viewport("640x480"), Ok(Viewport::new(640, 480)));
        assert!(parse_viewport("0x480").is_err());
        assert!(parse_viewport("640").is_err());
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
