#![forbid(unsafe_code)]

//! Runtime configuration.
//!
//! # Environment
//!
//! | Variable | Field | Format |
//! |----------|-------|--------|
//! | `SCOREBOARD_TICK_MS` | [`PanelConfig::tick_interval`] | milliseconds, > 0 |
//! | `SCOREBOARD_INITIAL_DELAY_MS` | [`PanelConfig::initial_delay`] | milliseconds |
//! | `SCOREBOARD_PERSIST` | [`PanelConfig::persist`] | `true`/`false`/`1`/`0` |
//! | `SCOREBOARD_FORCE_LEGACY` | [`PanelConfig::force_legacy`] | `true`/`false`/`1`/`0` |
//!
//! Unparsable values are ignored with a warning and the default is kept.

use std::env;
use std::time::Duration;

use scoreboard_core::RequesterId;

/// Requester id the engine itself uses for persisted state.
pub const DEFAULT_OWNER: &str = "scoreboard";

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelConfig {
    /// Scheduler cadence; one animation tick.
    pub tick_interval: Duration,
    /// Delay before the first tick.
    pub initial_delay: Duration,
    /// Backend calls slower than this are reported.
    pub backend_budget: Duration,
    /// Keep the owner's viewer state across restarts.
    pub persist: bool,
    /// Use the baseline backend even when a richer one is available.
    pub force_legacy: bool,
    /// Requester whose state is persisted.
    pub owner: RequesterId,
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(50),
            initial_delay: Duration::from_secs(1),
            backend_budget: Duration::from_millis(5),
            persist: false,
            force_legacy: false,
            owner: RequesterId::new(DEFAULT_OWNER),
        }
    }
}

impl PanelConfig {
    /// Defaults overridden by `SCOREBOARD_*` environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_vars(|key| env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each variable.
    #[must_use]
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(ms) = parse_var(&lookup, "SCOREBOARD_TICK_MS", parse_millis)
            && !ms.is_zero()
        {
            config.tick_interval = ms;
        }
        if let Some(ms) = parse_var(&lookup, "SCOREBOARD_INITIAL_DELAY_MS", parse_millis) {
            config.initial_delay = ms;
        }
        if let Some(flag) = parse_var(&lookup, "SCOREBOARD_PERSIST", parse_flag) {
            config.persist = flag;
        }
        if let Some(flag) = parse_var(&lookup, "SCOREBOARD_FORCE_LEGACY", parse_flag) {
            config.force_legacy = flag;
        }
        config
    }

    /// Set the tick interval (builder). Zero is ignored.
    #[must_use]
    pub fn tick_interval(mut self, interval: Duration) -> Self {
        if !interval.is_zero() {
            self.tick_interval = interval;
        }
        self
    }

    /// Set the initial delay (builder).
    #[must_use]
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set the backend call budget (builder).
    #[must_use]
    pub fn backend_budget(mut self, budget: Duration) -> Self {
        self.backend_budget = budget;
        self
    }

    /// Enable or disable persistence (builder).
    #[must_use]
    pub fn persist(mut self, persist: bool) -> Self {
        self.persist = persist;
        self
    }

    /// Force the baseline backend (builder).
    #[must_use]
    pub fn force_legacy(mut self, force: bool) -> Self {
        self.force_legacy = force;
        self
    }

    /// Set the owning requester (builder).
    #[must_use]
    pub fn owner(mut self, owner: RequesterId) -> Self {
        self.owner = owner;
        self
    }
}

fn parse_var<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    parse: fn(&str) -> Option<T>,
) -> Option<T> {
    let raw = lookup(key)?;
    let parsed = parse(raw.trim());
    if parsed.is_none() {
        tracing::warn!(key, value = %raw, "ignoring unparsable configuration value");
    }
    parsed
}

fn parse_millis(raw: &str) -> Option<Duration> {
    raw.parse::<u64>().ok().map(Duration::from_millis)
}

fn parse_flag(raw: &str) -> Option<bool> {
    if raw.eq_ignore_ascii_case("true") || raw == "1" {
        Some(true)
    } else if raw.eq_ignore_ascii_case("false") || raw == "0" {
        Some(false)
    } else {
        None
    }
}
