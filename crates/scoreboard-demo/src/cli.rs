#![forbid(unsafe_code)]

//! Command-line argument parsing for the demo.
//!
//! Parses args manually to keep the binary lean. Supports environment
//! variable overrides via the `SCOREBOARD_DEMO_*` prefix; engine settings
//! come from `SCOREBOARD_*` (see `PanelConfig::from_env`).

use std::env;
use std::path::PathBuf;
use std::process;

const VERSION: &str = env!("CARGO_PKG_VERSION");

const HELP_TEXT: &str = "\
Scoreboard Demo: a headless network of viewers and animated panels

USAGE:
    scoreboard-demo [OPTIONS]

OPTIONS:
    --ticks=N             Ticks to run (default: 120)
    --viewers=N           Viewers to spread over hub and arenas (default: 4)
    --definitions=PATH    Load definitions from a JSON file instead of the built-in set
    --state=PATH          Persist viewer state to PATH (enables persistence)
    --rich                Offer a rich backend (long rows, hex colours, multi-byte)
    --realtime            Drive ticks from the background scheduler instead of a loop
    --log-json            Emit logs as JSON lines
    --help, -h            Show this help message
    --version, -V         Show version

ENVIRONMENT VARIABLES:
    SCOREBOARD_DEMO_TICKS         Override --ticks
    SCOREBOARD_DEMO_VIEWERS       Override --viewers
    SCOREBOARD_LOG_JSON           Same as --log-json when set to 1 or true
    RUST_LOG                      Log filter (default: info)";

/// Parsed command-line options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Opts {
    /// Ticks to run.
    pub ticks: u64,
    /// Number of viewers.
    pub viewers: u32,
    /// Definitions file; built-in set when absent.
    pub definitions: Option<PathBuf>,
    /// State file; persistence is off when absent.
    pub state: Option<PathBuf>,
    /// Offer a rich backend.
    pub rich: bool,
    /// Use the background scheduler.
    pub realtime: bool,
    /// JSON log output.
    pub log_json: bool,
}

impl Default for Opts {
    fn default() -> Self {
        Self {
            ticks: 120,
            viewers: 4,
            definitions: None,
            state: None,
            rich: false,
            realtime: false,
            log_json: false,
        }
    }
}

impl Opts {
    /// Parse command-line arguments and environment variables.
    ///
    /// Environment variables take precedence over defaults but are overridden
    /// by explicit command-line flags.
    pub fn parse() -> Self {
        let args: Vec<String> = env::args().skip(1).collect();
        match Self::parse_from(&args, |key| env::var(key).ok()) {
            Ok(opts) => opts,
            Err(Exit::Help) => {
                println!("{HELP_TEXT}");
                process::exit(0);
            }
            Err(Exit::Version) => {
                println!("scoreboard-demo {VERSION}");
                process::exit(0);
            }
            Err(Exit::Invalid(message)) => {
                eprintln!("{message}");
                eprintln!("Run with --help for usage information.");
                process::exit(1);
            }
        }
    }

    fn parse_from(args: &[String], lookup: impl Fn(&str) -> Option<String>) -> Result<Self, Exit> {
        let mut opts = Self::default();

        if let Some(val) = lookup("SCOREBOARD_DEMO_TICKS")
            && let Ok(n) = val.parse()
        {
            opts.ticks = n;
        }
        if let Some(val) = lookup("SCOREBOARD_DEMO_VIEWERS")
            && let Ok(n) = val.parse()
        {
            opts.viewers = n;
        }
        if let Some(val) = lookup("SCOREBOARD_LOG_JSON") {
            opts.log_json = matches!(val.trim(), "1" | "true" | "TRUE" | "True");
        }

        for arg in args {
            match arg.as_str() {
                "--help" | "-h" => return Err(Exit::Help),
                "--version" | "-V" => return Err(Exit::Version),
                "--rich" => opts.rich = true,
                "--realtime" => opts.realtime = true,
                "--log-json" => opts.log_json = true,
                other => {
                    if let Some(val) = other.strip_prefix("--ticks=") {
                        opts.ticks = number("--ticks", val)?;
                    } else if let Some(val) = other.strip_prefix("--viewers=") {
                        opts.viewers = number("--viewers", val)?;
                    } else if let Some(val) = other.strip_prefix("--definitions=") {
                        opts.definitions = Some(PathBuf::from(val));
                    } else if let Some(val) = other.strip_prefix("--state=") {
                        opts.state = Some(PathBuf::from(val));
                    } else {
                        return Err(Exit::Invalid(format!("Unknown argument: {other}")));
                    }
                }
            }
        }

        Ok(opts)
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Exit {
    Help,
    Version,
    Invalid(String),
}

fn number<T: std::str::FromStr>(flag: &str, val: &str) -> Result<T, Exit> {
    val.parse()
        .map_err(|_| Exit::Invalid(format!("Invalid {flag} value: {val}")))
}
