#![forbid(unsafe_code)]

//! The scripted demo network.
//!
//! A handful of viewers spread over a hub and a few arenas, a placeholder
//! source backed by the population, and a short script of requests that
//! exercises hiding, overriding, and disabling while the panels animate.

use std::borrow::Cow;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use scoreboard::runtime::{FileStorage, Population};
use scoreboard::{
    BackendCapabilities, BackendProfile, BackendSelector, Definitions, MemoryBackend,
    PanelConfig, PanelContext, PanelFrame, PlaceholderError, PlaceholderResolver, RenderBackend,
    RequesterId, Result, StaticPopulation, TemplateName, Tick, ViewerId,
};

use crate::cli::Opts;

const BUILTIN_DEFINITIONS: &str = include_str!("../assets/definitions.json");

// ─────────────────────────────────────────────────────────────────────────────
// Definitions
// ─────────────────────────────────────────────────────────────────────────────

/// Parse definitions from JSON text.
pub fn parse_definitions(json: &str) -> Result<Definitions> {
    serde_json::from_str(json)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e).into())
}

/// Load definitions from `path`, or the built-in set.
pub fn load_definitions(path: Option<&Path>) -> Result<Definitions> {
    match path {
        Some(path) => parse_definitions(&std::fs::read_to_string(path)?),
        None => parse_definitions(BUILTIN_DEFINITIONS),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Placeholders
// ─────────────────────────────────────────────────────────────────────────────

/// Expands `%online%`, `%location%`, and `%viewer%`; anything else between
/// percent signs fails.
pub struct DemoPlaceholders {
    population: Arc<StaticPopulation>,
}

impl DemoPlaceholders {
    pub fn new(population: Arc<StaticPopulation>) -> Self {
        Self { population }
    }
}

impl PlaceholderResolver for DemoPlaceholders {
    fn resolve<'a>(
        &self,
        viewer: ViewerId,
        raw: &'a str,
    ) -> std::result::Result<Cow<'a, str>, PlaceholderError> {
        if !raw.contains('%') {
            return Ok(Cow::Borrowed(raw));
        }
        let mut out = String::with_capacity(raw.len());
        let mut rest = raw;
        while let Some(start) = rest.find('%') {
            out.push_str(&rest[..start]);
            let after = &rest[start + 1..];
            let Some(end) = after.find('%') else {
                out.push_str(&rest[start..]);
                rest = "";
                break;
            };
            let key = &after[..end];
            match key {
                "online" => out.push_str(&self.population.len().to_string()),
                "location" => out.push_str(&self.population.location(viewer).unwrap_or_default()),
                "viewer" => out.push_str(&short_name(viewer)),
                other => return Err(PlaceholderError::new(format!("unknown placeholder %{other}%"))),
            }
            rest = &after[end + 1..];
        }
        out.push_str(rest);
        Ok(Cow::Owned(out))
    }
}

fn short_name(viewer: ViewerId) -> String {
    format!("viewer{}", viewer.as_u128())
}

// ─────────────────────────────────────────────────────────────────────────────
// Script
// ─────────────────────────────────────────────────────────────────────────────

/// One scripted request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Hide(&'static str, u128, bool),
    Disable(&'static str, u128, bool),
    Override(&'static str, u128, Option<&'static str>),
    ClearOverride(&'static str, u128),
    Move(u128, &'static str),
}

/// Requests to apply, keyed by the tick before which they run.
pub fn script() -> Vec<(Tick, Step)> {
    vec![
        (20, Step::Hide("cutscene", 1, true)),
        (35, Step::Override("staff", 2, Some("event"))),
        (50, Step::Hide("cutscene", 1, false)),
        (60, Step::Disable("minigame", 3, true)),
        (70, Step::Move(4, "hub")),
        (80, Step::ClearOverride("staff", 2)),
        (90, Step::Disable("minigame", 3, false)),
    ]
}

fn apply(ctx: &PanelContext, population: &StaticPopulation, step: &Step) {
    tracing::info!(?step, clock = ctx.clock().now(), "scripted request");
    match *step {
        Step::Hide(who, viewer, on) => {
            ctx.set_hidden(&RequesterId::new(who), ViewerId::from_u128(viewer), on);
        }
        Step::Disable(who, viewer, on) => {
            ctx.set_disabled(&RequesterId::new(who), ViewerId::from_u128(viewer), on);
        }
        Step::Override(who, viewer, template) => {
            ctx.set_override(
                &RequesterId::new(who),
                ViewerId::from_u128(viewer),
                template.map(TemplateName::new),
            );
        }
        Step::ClearOverride(who, viewer) => {
            ctx.clear_override(&RequesterId::new(who), ViewerId::from_u128(viewer));
        }
        Step::Move(viewer, location) => population.move_to(ViewerId::from_u128(viewer), location),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Run
// ─────────────────────────────────────────────────────────────────────────────

/// What the demo ended with.
#[derive(Debug)]
pub struct Outcome {
    /// Backend profile in use.
    pub profile: BackendProfile,
    /// Final panel per viewer (`None` for blank or absent).
    pub panels: Vec<(ViewerId, Option<PanelFrame>)>,
    /// Final clock.
    pub clock: Tick,
}

/// Location for the `n`th viewer: every third viewer starts in the hub.
fn location_for(n: u32) -> String {
    if n % 3 == 0 {
        "hub".to_string()
    } else {
        format!("arena-{}", n % 3)
    }
}

/// Run the demo network with `opts` on top of `config`.
pub fn run(opts: &Opts, config: PanelConfig) -> Result<Outcome> {
    let definitions = load_definitions(opts.definitions.as_deref())?;

    let baseline = Arc::new(MemoryBackend::new(BackendCapabilities::baseline()));
    let rich = Arc::new(MemoryBackend::new(BackendCapabilities::rich()));
    let offer_rich = opts.rich;
    let selected = {
        let baseline = Arc::clone(&baseline);
        let rich = Arc::clone(&rich);
        BackendSelector::new(move || baseline)
            .rich(move || offer_rich.then(|| rich as Arc<dyn RenderBackend>))
            .force_legacy(config.force_legacy)
            .select()
    };
    let memory = match selected.profile {
        BackendProfile::Rich => rich,
        _ => baseline,
    };

    let persist = config.persist || opts.state.is_some();
    let config = config.persist(persist);
    let population = Arc::new(StaticPopulation::new());
    let mut builder = PanelContext::builder(selected.backend, population.clone())
        .access(population.clone())
        .placeholders(Arc::new(DemoPlaceholders::new(population.clone())))
        .config(config)
        .definitions(definitions);
    if let Some(path) = &opts.state {
        builder = builder.storage(Box::new(FileStorage::new(path)));
    }
    let ctx = Arc::new(builder.build());

    let viewers: Vec<ViewerId> = (1..=opts.viewers)
        .map(|n| {
            let viewer = ViewerId::from_u128(u128::from(n));
            population.join(viewer, location_for(n));
            if n % 2 == 0 {
                population.grant(viewer, "rank.vip");
            }
            ctx.viewer_joined(viewer);
            viewer
        })
        .collect();

    let mut script = script().into_iter().peekable();
    if opts.realtime {
        let handle = ctx.start_scheduler()?;
        let interval = ctx.config().tick_interval;
        while ctx.clock().now() < opts.ticks && handle.is_running() {
            let now = ctx.clock().now();
            while let Some((_, step)) = script.next_if(|(at, _)| *at <= now) {
                apply(&ctx, &population, &step);
            }
            thread::sleep(interval.min(Duration::from_millis(10)));
        }
        let stats = handle.stop();
        tracing::info!(?stats, "realtime run finished");
    } else {
        for tick in 1..=opts.ticks {
            while let Some((_, step)) = script.next_if(|(at, _)| *at <= tick) {
                apply(&ctx, &population, &step);
            }
            let report = ctx.tick();
            tracing::debug!(?report, "tick");
        }
    }

    let panels = viewers
        .iter()
        .map(|&viewer| (viewer, memory.displayed(viewer)))
        .collect::<Vec<_>>();
    for (viewer, panel) in &panels {
        match panel {
            Some(frame) => tracing::info!(
                viewer = %short_name(*viewer),
                title = frame.title(),
                rows = ?frame.rows(),
                "final panel"
            ),
            None => tracing::info!(viewer = %short_name(*viewer), "final panel blank or absent"),
        }
    }
    let clock = ctx.clock().now();
    ctx.shutdown()?;
    Ok(Outcome {
        profile: selected.profile,
        panels,
        clock,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn title(outcome: &Outcome, viewer: u128) -> Option<String> {
        outcome
            .panels
            .iter()
            .find(|(v, _)| *v == ViewerId::from_u128(viewer))
            .and_then(|(_, frame)| frame.as_ref().map(|f| f.title().to_string()))
    }

    #[test]
    fn builtin_definitions_load_cleanly() {
        let defs = load_definitions(None).unwrap();
        assert!(defs.compile().issues.is_empty());
        assert_eq!(defs.templates.len(), 5);
        assert_eq!(defs.rules.len(), 3);
        assert_eq!(defs.conditions.len(), 1);
    }

    #[test]
    fn invalid_json_is_an_io_error() {
        let err = parse_definitions("{ nope").unwrap_err();
        assert!(matches!(err, scoreboard::Error::Io(_)));
    }

    #[test]
    fn placeholders_expand_and_fail() {
        let population = Arc::new(StaticPopulation::new());
        let viewer = ViewerId::from_u128(7);
        population.join(viewer, "hub");
        let resolver = DemoPlaceholders::new(population);

        assert_eq!(
            resolver.resolve(viewer, "%viewer% @ %location% (%online%)").unwrap(),
            "viewer7 @ hub (1)"
        );
        assert_eq!(resolver.resolve(viewer, "100%").unwrap(), "100%");
        assert!(resolver.resolve(viewer, "%balance%").is_err());
    }

    #[test]
    fn scripted_run_ends_where_expected() {
        let opts = Opts {
            ticks: 100,
            ..Opts::default()
        };
        let outcome = run(&opts, PanelConfig::default()).unwrap();
        assert_eq!(outcome.clock, 100);
        assert_eq!(outcome.profile, BackendProfile::Baseline);

        // viewer1: arena-1, no vip, crowded -> arena
        assert_eq!(title(&outcome, 1).as_deref(), Some("§c§lArena"));
        // viewer2: arena-2, vip, override cleared -> vip
        assert_eq!(title(&outcome, 2).as_deref(), Some("§d§lVIP Lounge"));
        // viewer3: re-enabled in the hub
        assert!(title(&outcome, 3).is_some());
        // viewer4: moved to the hub
        let lobby = title(&outcome, 4).unwrap();
        assert!(lobby.contains("Welcome") || lobby.contains("Enjoy!"));
    }

    #[test]
    fn state_file_written_on_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let opts = Opts {
            ticks: 5,
            state: Some(dir.path().join("state.json")),
            ..Opts::default()
        };
        run(&opts, PanelConfig::default()).unwrap();
        assert!(dir.path().join("state.json").exists());
    }
}
