#![forbid(unsafe_code)]

//! Scoreboard demo binary entry point.

use scoreboard::PanelConfig;
use scoreboard_demo::{cli, logging, scenario};

fn main() {
    let opts = cli::Opts::parse();
    logging::init(opts.log_json);

    let config = PanelConfig::from_env();
    tracing::info!(
        ticks = opts.ticks,
        viewers = opts.viewers,
        realtime = opts.realtime,
        tick_ms = config.tick_interval.as_millis() as u64,
        "starting demo"
    );

    match scenario::run(&opts, config) {
        Ok(outcome) => {
            tracing::info!(
                profile = %outcome.profile,
                clock = outcome.clock,
                panels = outcome.panels.iter().filter(|(_, p)| p.is_some()).count(),
                "demo finished"
            );
        }
        Err(e) => {
            eprintln!("Demo error: {e}");
            std::process::exit(1);
        }
    }
}
