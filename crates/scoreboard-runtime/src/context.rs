#![forbid(unsafe_code)]

//! The process-scoped engine context.
//!
//! [`PanelContext`] owns the registry, the viewer state store, the animation
//! clock, and the chosen backend. It is built once by [`PanelContextBuilder`],
//! shared as an `Arc` with the scheduler thread and with request handlers,
//! and torn down by [`PanelContext::shutdown`].
//!
//! # Invariants
//!
//! 1. **Disabled means no panel**: no tick or request ever creates or updates
//!    a panel for a disabled viewer.
//! 2. **Hidden keeps selection**: a hidden viewer keeps its panel (blank) and
//!    its resolved selection; showing it again draws what routing would have
//!    picked had it never been hidden.
//! 3. **Instant effect**: a request that changes a viewer's effective state
//!    clears and redraws that viewer's panel immediately.
//! 4. **Non-overlapping ticks**: ticks are serialized; a request and a tick
//!    for the same viewer are serialized by that viewer's lock.
//! 5. **Isolation**: a backend error or panic for one viewer never affects
//!    another viewer in the same tick.
//!
//! # Failure Modes
//!
//! | Failure | Behavior |
//! |---------|----------|
//! | Backend call fails or panics | Logged at debug, counted in [`TickReport::failed`] |
//! | Backend call exceeds budget | Logged at warn, counted in [`TickReport::slow_calls`] |
//! | Placeholder substitution fails | Last-known text for the line, else the raw text |
//! | Viewer leaves mid-tick | Skipped, counted in [`TickReport::skipped_offline`] |
//! | Request for an offline viewer | Record updated, no backend calls |
//! | Persistence fails | Error returned, in-memory state unaffected |

use std::borrow::Cow;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use scoreboard_core::text::adapt_line;
use scoreboard_core::{
    AnimationClock, BackendCapabilities, Definitions, RequesterId, Template, TemplateName, Tick,
    ViewerId,
};

use crate::backend::{BackendResult, PanelFrame, RenderBackend};
use crate::config::PanelConfig;
use crate::host::{AccessControl, AllowAll, NoPlaceholders, PlaceholderResolver, Population};
use crate::registry::{Catalog, LoadReport, Registry};
use crate::resolver::{Resolution, Resolver};
use crate::scheduler::{self, SchedulerHandle, TickReport, TickTarget};
use crate::state_persistence::{PersistedState, PersistedViewer, StorageBackend, StorageResult};
use crate::viewer_state::{
    FlagChange, SharedEntry, ViewerEntry, ViewerRecord, ViewerStateStore, lock_entry,
};

// ─────────────────────────────────────────────────────────────────────────────
// Builder
// ─────────────────────────────────────────────────────────────────────────────

/// Builds a [`PanelContext`].
pub struct PanelContextBuilder {
    backend: Arc<dyn RenderBackend>,
    population: Arc<dyn Population>,
    access: Arc<dyn AccessControl>,
    placeholders: Arc<dyn PlaceholderResolver>,
    storage: Option<Box<dyn StorageBackend>>,
    config: PanelConfig,
    definitions: Option<Definitions>,
}

impl PanelContextBuilder {
    /// Start with the two collaborators every context needs.
    pub fn new(backend: Arc<dyn RenderBackend>, population: Arc<dyn Population>) -> Self {
        Self {
            backend,
            population,
            access: Arc::new(AllowAll),
            placeholders: Arc::new(NoPlaceholders),
            storage: None,
            config: PanelConfig::default(),
            definitions: None,
        }
    }

    /// Permission checks (default: everything allowed).
    #[must_use]
    pub fn access(mut self, access: Arc<dyn AccessControl>) -> Self {
        self.access = access;
        self
    }

    /// Placeholder expansion (default: none).
    #[must_use]
    pub fn placeholders(mut self, placeholders: Arc<dyn PlaceholderResolver>) -> Self {
        self.placeholders = placeholders;
        self
    }

    /// Storage for persisted viewer state.
    #[must_use]
    pub fn storage(mut self, storage: Box<dyn StorageBackend>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Configuration.
    #[must_use]
    pub fn config(mut self, config: PanelConfig) -> Self {
        self.config = config;
        self
    }

    /// Definitions to load at build time.
    #[must_use]
    pub fn definitions(mut self, definitions: Definitions) -> Self {
        self.definitions = Some(definitions);
        self
    }

    /// Build the context, load definitions, and seed persisted state.
    ///
    /// A failed seed is logged and the context starts with empty state.
    #[must_use]
    pub fn build(self) -> PanelContext {
        let context = PanelContext {
            config: self.config,
            registry: Registry::new(),
            store: ViewerStateStore::new(),
            clock: AnimationClock::new(),
            backend: self.backend,
            population: self.population,
            access: self.access,
            placeholders: self.placeholders,
            storage: self.storage,
            tick_gate: Mutex::new(()),
        };
        if let Some(definitions) = &self.definitions {
            context.registry.load(definitions);
        }
        if let Err(error) = context.seed() {
            tracing::warn!(%error, "could not seed persisted viewer state");
        }
        context
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Outcomes
// ─────────────────────────────────────────────────────────────────────────────

/// Why a viewer was not drawn this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Skip {
    Disabled,
    Hidden,
    NoPanel,
    Offline,
}

/// What happened to one viewer in one pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Rendered { slow: bool },
    Unchanged,
    Cleared { slow: bool },
    Skipped(Skip),
    Failed { slow: bool },
}

impl TickReport {
    fn apply(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Rendered { slow } => {
                self.rendered += 1;
                self.slow_calls += usize::from(slow);
            }
            Outcome::Unchanged => self.unchanged += 1,
            Outcome::Cleared { slow } => {
                self.cleared += 1;
                self.slow_calls += usize::from(slow);
            }
            Outcome::Skipped(Skip::Disabled) => self.skipped_disabled += 1,
            Outcome::Skipped(Skip::Hidden) => self.skipped_hidden += 1,
            Outcome::Skipped(Skip::NoPanel) => self.skipped_no_panel += 1,
            Outcome::Skipped(Skip::Offline) => self.skipped_offline += 1,
            Outcome::Failed { slow } => {
                self.failed += 1;
                self.slow_calls += usize::from(slow);
            }
        }
    }
}

/// A backend call that did not succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CallFailed {
    slow: bool,
}

// ─────────────────────────────────────────────────────────────────────────────
// PanelContext
// ─────────────────────────────────────────────────────────────────────────────

/// The engine: registry, viewer state, clock, and backend.
pub struct PanelContext {
    config: PanelConfig,
    registry: Registry,
    store: ViewerStateStore,
    clock: AnimationClock,
    backend: Arc<dyn RenderBackend>,
    population: Arc<dyn Population>,
    access: Arc<dyn AccessControl>,
    placeholders: Arc<dyn PlaceholderResolver>,
    storage: Option<Box<dyn StorageBackend>>,
    tick_gate: Mutex<()>,
}

impl PanelContext {
    /// Start building a context.
    pub fn builder(
        backend: Arc<dyn RenderBackend>,
        population: Arc<dyn Population>,
    ) -> PanelContextBuilder {
        PanelContextBuilder::new(backend, population)
    }

    // -- Accessors ----------------------------------------------------------

    /// Configuration.
    #[must_use]
    pub fn config(&self) -> &PanelConfig {
        &self.config
    }

    /// Template registry.
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Viewer state store.
    #[must_use]
    pub fn store(&self) -> &ViewerStateStore {
        &self.store
    }

    /// Global animation clock.
    #[must_use]
    pub fn clock(&self) -> &AnimationClock {
        &self.clock
    }

    /// The rendering backend.
    #[must_use]
    pub fn backend(&self) -> &Arc<dyn RenderBackend> {
        &self.backend
    }

    /// Copy of a viewer's record.
    #[must_use]
    pub fn viewer_record(&self, viewer: ViewerId) -> Option<ViewerRecord> {
        self.store.snapshot(viewer)
    }

    // -- Resolution ---------------------------------------------------------

    /// Resolve an online viewer against the current catalog.
    ///
    /// Returns `None` for a viewer who is offline.
    #[must_use]
    pub fn resolve(&self, viewer: ViewerId) -> Option<Resolution> {
        let location = self.population.location(viewer)?;
        let catalog = self.registry.catalog();
        let resolver = Resolver::new(&catalog, self.access.as_ref(), self.placeholders.as_ref());
        let resolution = match self.store.get(viewer) {
            Some(entry) => resolver.resolve(viewer, &location, &lock_entry(&entry).record),
            None => resolver.resolve(viewer, &location, &ViewerRecord::new()),
        };
        Some(resolution)
    }

    // -- Definitions --------------------------------------------------------

    /// Load definitions without touching any panel.
    pub fn load(&self, definitions: &Definitions) -> LoadReport {
        self.registry.load(definitions)
    }

    /// Replace definitions and redraw everyone.
    ///
    /// The routing cache starts empty with the new catalog. Without
    /// persistence all viewer state is dropped. Every online viewer's panel
    /// is then cleared and recreated against the new catalog.
    pub fn reload(&self, definitions: &Definitions) -> LoadReport {
        let report = self.registry.load(definitions);
        if !self.config.persist {
            self.store.clear();
        }
        let catalog = self.registry.catalog();
        for viewer in self.population.online() {
            let entry = self.store.entry(viewer);
            let mut guard = lock_entry(&entry);
            self.refresh_locked(viewer, &mut guard, &catalog);
        }
        report
    }

    // -- Requests -----------------------------------------------------------

    /// Add or remove `requester`'s hide request.
    pub fn set_hidden(&self, requester: &RequesterId, viewer: ViewerId, hidden: bool) -> FlagChange {
        self.update(viewer, |record| record.set_hidden(requester, hidden), flag_changed)
    }

    /// Add or remove `requester`'s disable request.
    pub fn set_disabled(&self, requester: &RequesterId, viewer: ViewerId, disabled: bool) -> FlagChange {
        self.update(viewer, |record| record.set_disabled(requester, disabled), flag_changed)
    }

    /// Flip `requester`'s hide request.
    pub fn toggle_hidden(&self, requester: &RequesterId, viewer: ViewerId) -> FlagChange {
        self.update(viewer, |record| record.toggle_hidden(requester), flag_changed)
    }

    /// Flip `requester`'s disable request.
    pub fn toggle_disabled(&self, requester: &RequesterId, viewer: ViewerId) -> FlagChange {
        self.update(viewer, |record| record.toggle_disabled(requester), flag_changed)
    }

    /// Force a template (or explicitly none) for `viewer` on behalf of
    /// `requester`. Returns whether the effective target changed.
    pub fn set_override(
        &self,
        requester: &RequesterId,
        viewer: ViewerId,
        template: Option<TemplateName>,
    ) -> bool {
        self.update(viewer, |record| record.set_override(requester, template), |changed| *changed)
    }

    /// Remove `requester`'s override. Returns whether the effective target changed.
    pub fn clear_override(&self, requester: &RequesterId, viewer: ViewerId) -> bool {
        if self.store.get(viewer).is_none() {
            return false;
        }
        self.update(viewer, |record| record.clear_override(requester), |changed| *changed)
    }

    /// Apply `change` under the viewer's lock; refresh the panel if
    /// `changed` says the effective state moved.
    fn update<T>(
        &self,
        viewer: ViewerId,
        change: impl FnOnce(&mut ViewerRecord) -> T,
        changed: fn(&T) -> bool,
    ) -> T {
        let entry = self.store.entry(viewer);
        let mut guard = lock_entry(&entry);
        let outcome = change(&mut guard.record);
        if changed(&outcome) {
            let catalog = self.registry.catalog();
            self.refresh_locked(viewer, &mut guard, &catalog);
        }
        outcome
    }

    // -- Session lifecycle --------------------------------------------------

    /// A viewer came online: create the panel unless disabled and draw it.
    pub fn viewer_joined(&self, viewer: ViewerId) {
        let entry = self.store.entry(viewer);
        let mut guard = lock_entry(&entry);
        let catalog = self.registry.catalog();
        tracing::debug!(%viewer, "viewer joined");
        self.refresh_locked(viewer, &mut guard, &catalog);
    }

    /// A viewer went offline: remove the panel and drop transient state.
    ///
    /// With persistence on, the owner's requests are kept so the next
    /// flush can save them; everything else is dropped.
    pub fn viewer_left(&self, viewer: ViewerId) {
        let Some(entry) = self.store.get(viewer) else {
            return;
        };
        {
            let mut guard = lock_entry(&entry);
            if self.backend.has_panel(viewer) {
                let _ = self.call(viewer, "remove_panel", || self.backend.remove_panel(viewer));
            }
            guard.mark_cleared();
            if self.config.persist {
                guard.record.retain_only(&self.config.owner);
            } else {
                guard.record = ViewerRecord::new();
            }
        }
        let dropped = self.store.remove_if_default(viewer);
        tracing::debug!(%viewer, kept = !dropped, "viewer left");
    }

    // -- Persistence --------------------------------------------------------

    /// Load persisted owner requests into the store.
    ///
    /// Does nothing unless persistence is enabled and storage is set.
    /// Templates no longer in the catalog are skipped. Returns the number
    /// of viewers seeded.
    pub fn seed(&self) -> StorageResult<usize> {
        let Some(storage) = self.active_storage() else {
            return Ok(0);
        };
        let state = storage.load_all()?;
        let catalog = self.registry.catalog();
        let owner = &self.config.owner;
        let mut seeded = 0;
        for (viewer, persisted) in state {
            if persisted.is_empty() {
                continue;
            }
            let entry = self.store.entry(viewer);
            let mut guard = lock_entry(&entry);
            guard.record.set_hidden(owner, persisted.hidden);
            guard.record.set_disabled(owner, persisted.disabled);
            if let Some(raw) = &persisted.template {
                let name = TemplateName::new(raw);
                if catalog.contains(&name) {
                    guard.record.set_override(owner, Some(name));
                } else {
                    tracing::warn!(%viewer, template = %name, "skipping persisted override of unknown template");
                }
            }
            seeded += 1;
        }
        tracing::debug!(backend = storage.name(), seeded, "seeded viewer state");
        Ok(seeded)
    }

    /// The owner's requests for every viewer, as they would be persisted.
    #[must_use]
    pub fn persisted_state(&self) -> PersistedState {
        let owner = &self.config.owner;
        let mut state = PersistedState::new();
        for viewer in self.store.viewers() {
            let Some(entry) = self.store.get(viewer) else {
                continue;
            };
            let guard = lock_entry(&entry);
            let record = &guard.record;
            let persisted = PersistedViewer {
                hidden: record.hidden_by().contains(owner),
                disabled: record.disabled_by().contains(owner),
                template: record.override_for(owner).flatten().map(ToString::to_string),
            };
            if !persisted.is_empty() {
                state.insert(viewer, persisted);
            }
        }
        state
    }

    /// Save the owner's requests. Returns whether anything was written.
    pub fn flush(&self) -> StorageResult<bool> {
        let Some(storage) = self.active_storage() else {
            return Ok(false);
        };
        let state = self.persisted_state();
        storage.save_all(&state)?;
        tracing::info!(backend = storage.name(), viewers = state.len(), "persisted viewer state");
        Ok(true)
    }

    fn active_storage(&self) -> Option<&dyn StorageBackend> {
        if self.config.persist {
            self.storage.as_deref()
        } else {
            None
        }
    }

    /// Flush persistence and remove every panel.
    ///
    /// Panels are removed even when the flush fails; the flush error is
    /// returned afterwards.
    pub fn shutdown(&self) -> StorageResult<()> {
        let flushed = self.flush();
        let mut removed = 0usize;
        for viewer in self.population.online() {
            let entry = self.store.get(viewer);
            let mut guard = entry.as_ref().map(lock_entry);
            if self.backend.has_panel(viewer) {
                let _ = self.call(viewer, "remove_panel", || self.backend.remove_panel(viewer));
                removed += 1;
            }
            if let Some(guard) = guard.as_mut() {
                guard.mark_cleared();
            }
        }
        tracing::info!(removed, "scoreboard shut down");
        flushed.map(|_| ())
    }

    // -- Scheduling ---------------------------------------------------------

    /// Start the background tick loop.
    pub fn start_scheduler(self: &Arc<Self>) -> std::io::Result<SchedulerHandle> {
        let target: Arc<dyn TickTarget> = Arc::clone(self) as Arc<dyn TickTarget>;
        scheduler::spawn(target, (&self.config).into())
    }

    /// Advance the clock and draw every online viewer once.
    pub fn tick(&self) -> TickReport {
        let _gate = self.tick_gate.lock().unwrap_or_else(|e| e.into_inner());
        let clock = self.clock.advance();
        let catalog = self.registry.catalog();
        let mut report = TickReport {
            clock,
            ..TickReport::default()
        };

        for viewer in self.population.online() {
            report.viewers += 1;
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                self.tick_viewer(viewer, clock, &catalog)
            }));
            match outcome {
                Ok(outcome) => report.apply(outcome),
                Err(_) => {
                    tracing::warn!(%viewer, clock, "viewer update panicked");
                    report.apply(Outcome::Failed { slow: false });
                }
            }
        }
        report
    }

    fn tick_viewer(&self, viewer: ViewerId, clock: Tick, catalog: &Catalog) -> Outcome {
        let Some(entry) = self.store_entry_if_online(viewer) else {
            return Outcome::Skipped(Skip::Offline);
        };
        let mut guard = lock_entry(&entry);
        if guard.record.is_disabled() {
            return Outcome::Skipped(Skip::Disabled);
        }
        if !self.backend.has_panel(viewer) {
            return Outcome::Skipped(Skip::NoPanel);
        }
        self.render_locked(viewer, &mut guard, clock, catalog)
    }

    fn store_entry_if_online(&self, viewer: ViewerId) -> Option<SharedEntry> {
        self.population
            .is_online(viewer)
            .then(|| self.store.entry(viewer))
    }

    // -- Drawing ------------------------------------------------------------

    /// Clear-and-recreate for one viewer whose effective state changed.
    fn refresh_locked(&self, viewer: ViewerId, guard: &mut MutexGuard<'_, ViewerEntry>, catalog: &Catalog) {
        if !self.population.is_online(viewer) {
            tracing::trace!(%viewer, "state changed for offline viewer; no panel work");
            return;
        }

        if guard.record.is_disabled() {
            if self.backend.has_panel(viewer) {
                let _ = self.call(viewer, "remove_panel", || self.backend.remove_panel(viewer));
            }
            guard.mark_cleared();
            return;
        }

        let ready = if self.backend.has_panel(viewer) {
            self.call(viewer, "clear_panel", || self.backend.clear_panel(viewer))
        } else {
            self.call(viewer, "create_panel", || self.backend.create_panel(viewer))
        };
        guard.mark_cleared();
        if ready.is_err() || guard.record.is_hidden() {
            return;
        }
        let clock = self.clock.now();
        self.render_locked(viewer, guard, clock, catalog);
    }

    /// Resolve and draw one viewer who is known to have a panel.
    fn render_locked(
        &self,
        viewer: ViewerId,
        guard: &mut MutexGuard<'_, ViewerEntry>,
        clock: Tick,
        catalog: &Catalog,
    ) -> Outcome {
        let Some(location) = self.population.location(viewer) else {
            return Outcome::Skipped(Skip::Offline);
        };
        let resolver = Resolver::new(catalog, self.access.as_ref(), self.placeholders.as_ref());
        let resolution = resolver.resolve(viewer, &location, &guard.record);
        if resolution.hidden {
            return Outcome::Skipped(Skip::Hidden);
        }

        let Some(template) = resolution.template() else {
            if !guard.has_content() {
                return Outcome::Unchanged;
            }
            return match self.call(viewer, "clear_panel", || self.backend.clear_panel(viewer)) {
                Ok(slow) => {
                    guard.mark_cleared();
                    Outcome::Cleared { slow }
                }
                Err(CallFailed { slow }) => Outcome::Failed { slow },
            };
        };

        let previous = guard.last_frame_of(template.name());
        let frame = self.compose(viewer, template, clock, previous);
        if guard.is_showing(&frame) {
            return Outcome::Unchanged;
        }
        match self.call(viewer, "update_panel", || self.backend.update_panel(viewer, &frame)) {
            Ok(slow) => {
                guard.mark_shown(template.name(), frame);
                Outcome::Rendered { slow }
            }
            Err(CallFailed { slow }) => {
                guard.mark_cleared();
                Outcome::Failed { slow }
            }
        }
    }

    /// Title and rows at `clock`, substituted and adapted to the backend.
    ///
    /// `previous` is the last frame this same template produced; lines that
    /// fail substitution fall back to it, else to their raw text.
    fn compose(
        &self,
        viewer: ViewerId,
        template: &Template,
        clock: Tick,
        previous: Option<&PanelFrame>,
    ) -> PanelFrame {
        let caps: &BackendCapabilities = self.backend.capabilities();
        let features = caps.features();
        let row_width = self.backend.max_row_text_length();

        let title = self.substitute(viewer, template.title_at(clock), previous.map(PanelFrame::title));
        let mut frame = PanelFrame::new(adapt_line(&title, caps.max_title_length(), features));
        for (index, raw) in template.rows_at(clock, caps.max_rows()) {
            let last = previous.and_then(|p| p.row(index));
            let text = self.substitute(viewer, raw, last);
            frame.push_row(index, adapt_line(&text, row_width, features));
        }
        frame
    }

    fn substitute<'a>(&self, viewer: ViewerId, raw: &'a str, last_known: Option<&'a str>) -> Cow<'a, str> {
        match self.placeholders.resolve(viewer, raw) {
            Ok(text) => text,
            Err(error) => {
                tracing::debug!(%viewer, %error, "placeholder substitution failed; using fallback");
                Cow::Borrowed(last_known.unwrap_or(raw))
            }
        }
    }

    /// Run one backend call with panic isolation and budget timing.
    ///
    /// `Ok(slow)` on success.
    fn call(&self, viewer: ViewerId, op: &'static str, f: impl FnOnce() -> BackendResult<()>) -> Result<bool, CallFailed> {
        let started = Instant::now();
        let result = panic::catch_unwind(AssertUnwindSafe(f));
        let elapsed = started.elapsed();
        let slow = self.over_budget(viewer, op, elapsed);
        match result {
            Ok(Ok(())) => Ok(slow),
            Ok(Err(error)) => {
                tracing::debug!(%viewer, op, %error, "backend call failed");
                Err(CallFailed { slow })
            }
            Err(_) => {
                tracing::warn!(%viewer, op, "backend call panicked");
                Err(CallFailed { slow })
            }
        }
    }

    fn over_budget(&self, viewer: ViewerId, op: &'static str, elapsed: Duration) -> bool {
        let slow = elapsed > self.config.backend_budget;
        if slow {
            tracing::warn!(
                %viewer,
                op,
                elapsed_us = elapsed.as_micros() as u64,
                budget_us = self.config.backend_budget.as_micros() as u64,
                "slow backend call"
            );
        }
        slow
    }
}

fn flag_changed(change: &FlagChange) -> bool {
    change.changed
}

impl TickTarget for PanelContext {
    fn tick(&self) -> TickReport {
        PanelContext::tick(self)
    }
}

impl std::fmt::Debug for PanelContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PanelContext")
            .field("backend", &self.backend.name())
            .field("clock", &self.clock.now())
            .field("viewers", &self.store.len())
            .field("persist", &self.config.persist)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendCall, MemoryBackend};
    use crate::host::{PlaceholderError, StaticPopulation};
    use crate::state_persistence::MemoryStorage;
    use scoreboard_core::{FrameDef, LocationMatchDef, RoutingRuleDef, TemplateDef};
    use std::sync::atomic::{AtomicBool, Ordering};

    const ALICE: ViewerId = ViewerId::from_u128(1);

    struct Harness {
        ctx: PanelContext,
        backend: Arc<MemoryBackend>,
        population: Arc<StaticPopulation>,
    }

    fn lobby_defs() -> Definitions {
        Definitions {
            templates: vec![
                TemplateDef::new("lobby")
                    .title(FrameDef::timed("Welcome", 40))
                    .title(FrameDef::timed("Enjoy!", 20))
                    .row(1, vec![FrameDef::timed("Online: %online%", 60)]),
                TemplateDef::new("event")
                    .title(FrameDef::text("Event"))
                    .row(1, vec![FrameDef::text("Players: %online%")]),
            ],
            rules: vec![RoutingRuleDef::new(LocationMatchDef::Any, ["lobby"])],
            ..Definitions::default()
        }
    }

    fn harness_with(config: PanelConfig, placeholders: Arc<dyn PlaceholderResolver>) -> Harness {
        let backend = Arc::new(MemoryBackend::new(BackendCapabilities::baseline()));
        let population = Arc::new(StaticPopulation::new());
        let ctx = PanelContext::builder(backend.clone(), population.clone())
            .access(population.clone())
            .placeholders(placeholders)
            .storage(Box::new(MemoryStorage::new()))
            .config(config)
            .definitions(lobby_defs())
            .build();
        Harness {
            ctx,
            backend,
            population,
        }
    }

    fn harness() -> Harness {
        harness_with(PanelConfig::default(), Arc::new(NoPlaceholders))
    }

    #[derive(Default)]
    struct Flaky {
        broken: AtomicBool,
    }

    impl PlaceholderResolver for Flaky {
        fn resolve<'a>(&self, _viewer: ViewerId, raw: &'a str) -> Result<Cow<'a, str>, PlaceholderError> {
            if self.broken.load(Ordering::SeqCst) {
                Err(PlaceholderError::new("service down"))
            } else {
                Ok(Cow::Owned(raw.replace("%online%", "5")))
            }
        }
    }

    #[test]
    fn joined_viewer_is_drawn_immediately() {
        let h = harness();
        h.population.join(ALICE, "hub");
        h.ctx.viewer_joined(ALICE);
        let shown = h.backend.displayed(ALICE).unwrap();
        assert_eq!(shown.title(), "Welcome");
        assert_eq!(shown.row(1), Some("Online: %online%"));
    }

    #[test]
    fn identical_frames_are_not_pushed_twice() {
        let h = harness();
        h.population.join(ALICE, "hub");
        h.ctx.viewer_joined(ALICE);
        h.backend.take_calls();

        let report = h.ctx.tick();
        assert_eq!(report.unchanged, 1);
        assert_eq!(report.rendered, 0);
        assert!(h.backend.take_calls().is_empty());
    }

    #[test]
    fn title_changes_at_frame_boundary() {
        let h = harness();
        h.population.join(ALICE, "hub");
        h.ctx.viewer_joined(ALICE);
        for _ in 0..40 {
            h.ctx.tick();
        }
        assert_eq!(h.ctx.clock().now(), 40);
        assert_eq!(h.backend.displayed(ALICE).unwrap().title(), "Enjoy!");
    }

    #[test]
    fn failed_substitution_uses_last_known_line() {
        let flaky = Arc::new(Flaky::default());
        let h = harness_with(PanelConfig::default(), flaky.clone());
        h.population.join(ALICE, "hub");
        h.ctx.viewer_joined(ALICE);
        assert_eq!(h.backend.displayed(ALICE).unwrap().row(1), Some("Online: 5"));

        flaky.broken.store(true, Ordering::SeqCst);
        h.ctx.tick();
        assert_eq!(h.backend.displayed(ALICE).unwrap().row(1), Some("Online: 5"));
    }

    #[test]
    fn template_switch_ignores_other_templates_last_lines() {
        let flaky = Arc::new(Flaky::default());
        let h = harness_with(PanelConfig::default(), flaky.clone());
        let staff = RequesterId::new("staff");
        h.population.join(ALICE, "hub");
        h.ctx.viewer_joined(ALICE);
        assert_eq!(h.backend.displayed(ALICE).unwrap().title(), "Welcome");

        flaky.broken.store(true, Ordering::SeqCst);
        assert!(h.ctx.set_override(&staff, ALICE, Some(TemplateName::new("event"))));
        let shown = h.backend.displayed(ALICE).unwrap();
        assert_eq!(shown.title(), "Event");
        assert_eq!(shown.row(1), Some("Players: %online%"));

        assert!(h.ctx.clear_override(&staff, ALICE));
        let shown = h.backend.displayed(ALICE).unwrap();
        assert_eq!(shown.title(), "Welcome");
        assert_eq!(shown.row(1), Some("Online: %online%"));
    }

    #[test]
    fn hide_clears_and_show_redraws() {
        let h = harness();
        let me = RequesterId::new("cmd");
        h.population.join(ALICE, "hub");
        h.ctx.viewer_joined(ALICE);

        assert!(h.ctx.set_hidden(&me, ALICE, true).changed);
        assert!(h.backend.has_panel(ALICE));
        assert_eq!(h.backend.displayed(ALICE), None);
        assert_eq!(h.ctx.tick().skipped_hidden, 1);

        assert!(h.ctx.set_hidden(&me, ALICE, false).changed);
        assert_eq!(h.backend.displayed(ALICE).unwrap().title(), "Welcome");
    }

    #[test]
    fn offline_requests_update_record_only() {
        let h = harness();
        let me = RequesterId::new("cmd");
        assert!(h.ctx.set_disabled(&me, ALICE, true).changed);
        assert!(h.backend.calls().is_empty());
        assert!(h.ctx.viewer_record(ALICE).unwrap().is_disabled());
    }

    #[test]
    fn viewer_left_drops_transient_state() {
        let h = harness();
        h.population.join(ALICE, "hub");
        h.ctx.viewer_joined(ALICE);
        h.ctx.set_hidden(&RequesterId::new("cmd"), ALICE, true);

        h.population.leave(ALICE);
        h.ctx.viewer_left(ALICE);
        assert!(!h.backend.has_panel(ALICE));
        assert!(h.ctx.viewer_record(ALICE).is_none());
    }

    #[test]
    fn persistence_keeps_only_owner_state() {
        let config = PanelConfig::default().persist(true);
        let h = harness_with(config.clone(), Arc::new(NoPlaceholders));
        h.population.join(ALICE, "hub");
        h.ctx.viewer_joined(ALICE);
        h.ctx.set_hidden(&config.owner, ALICE, true);
        h.ctx.set_disabled(&RequesterId::new("minigame"), ALICE, true);
        h.ctx
            .set_override(&config.owner, ALICE, Some(TemplateName::new("lobby")));

        let state = h.ctx.persisted_state();
        let saved = &state[&ALICE];
        assert!(saved.hidden);
        assert!(!saved.disabled);
        assert_eq!(saved.template.as_deref(), Some("lobby"));

        h.population.leave(ALICE);
        h.ctx.viewer_left(ALICE);
        let kept = h.ctx.viewer_record(ALICE).unwrap();
        assert!(kept.is_hidden());
        assert!(!kept.is_disabled());
    }

    #[test]
    fn tick_reports_offline_viewers_without_panels() {
        let h = harness();
        h.population.join(ALICE, "hub");
        let report = h.ctx.tick();
        assert_eq!(report.viewers, 1);
        assert_eq!(report.skipped_no_panel, 1);
        assert!(
            h.backend
                .calls()
                .iter()
                .all(|c| !matches!(c, BackendCall::Create(_)))
        );
    }
}
