#![forbid(unsafe_code)]

//! Rendering backend interface, startup selection, and an in-memory backend.
//!
//! The engine talks to exactly one [`RenderBackend`], chosen once at startup
//! by a [`BackendSelector`]. Backends differ in their
//! [`BackendCapabilities`]; the engine adapts every line to those limits
//! before calling [`RenderBackend::update_panel`], so backends never see
//! text they cannot show.
//!
//! # Contract
//!
//! | Call | Must |
//! |------|------|
//! | `create_panel` | Be idempotent for a viewer that already has a panel |
//! | `remove_panel` / `clear_panel` | Succeed for a viewer without a panel |
//! | `update_panel` | Return promptly; fail with [`BackendError::NoPanel`] if no panel exists |
//! | All | Never block on a slow viewer connection |
//!
//! Errors are isolated per viewer by the caller; a backend never needs to
//! protect other viewers from its own failures.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rustc_hash::{FxHashMap, FxHashSet};
use scoreboard_core::{BackendCapabilities, BackendProfile, RowIndex, ViewerId};
use smallvec::SmallVec;

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Errors a backend may report for one viewer.
#[derive(Debug)]
pub enum BackendError {
    /// The viewer has no panel.
    NoPanel(ViewerId),
    /// The viewer's connection went away.
    Disconnected(ViewerId),
    /// The backend refused the request.
    Rejected {
        /// Viewer the request was for.
        viewer: ViewerId,
        /// Backend-specific reason.
        reason: String,
    },
    /// Transport failure.
    Io(std::io::Error),
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendError::NoPanel(viewer) => write!(f, "viewer {viewer} has no panel"),
            BackendError::Disconnected(viewer) => write!(f, "viewer {viewer} disconnected"),
            BackendError::Rejected { viewer, reason } => {
                write!(f, "backend rejected request for {viewer}: {reason}")
            }
            BackendError::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for BackendError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BackendError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for BackendError {
    fn from(e: std::io::Error) -> Self {
        BackendError::Io(e)
    }
}

/// Result type for backend calls.
pub type BackendResult<T> = Result<T, BackendError>;

// ─────────────────────────────────────────────────────────────────────────────
// Panel frame
// ─────────────────────────────────────────────────────────────────────────────

/// Inline row capacity; matches the largest row count any backend supports.
const INLINE_ROWS: usize = 16;

/// One fully resolved panel: the title and rows, highest row first.
///
/// Text is already placeholder-substituted and adapted to the backend.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PanelFrame {
    title: String,
    rows: SmallVec<[(RowIndex, String); INLINE_ROWS]>,
}

impl PanelFrame {
    /// A frame with a title and no rows.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            rows: SmallVec::new(),
        }
    }

    /// Append a row (builder).
    #[must_use]
    pub fn with_row(mut self, index: RowIndex, text: impl Into<String>) -> Self {
        self.push_row(index, text);
        self
    }

    /// Append a row.
    pub fn push_row(&mut self, index: RowIndex, text: impl Into<String>) {
        self.rows.push((index, text.into()));
    }

    /// Title text.
    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Rows in display order.
    #[must_use]
    pub fn rows(&self) -> &[(RowIndex, String)] {
        &self.rows
    }

    /// Text of one row.
    #[must_use]
    pub fn row(&self, index: RowIndex) -> Option<&str> {
        self.rows
            .iter()
            .find(|(i, _)| *i == index)
            .map(|(_, text)| text.as_str())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Backend trait
// ─────────────────────────────────────────────────────────────────────────────

/// A rendering backend.
///
/// Implementations must be thread-safe (`Send + Sync`): the scheduler
/// thread and request handlers call into the same backend.
///
/// Calls must not block. The engine calls the backend on the tick thread
/// while holding the viewer's lock, and it only times each call against
/// `PanelConfig::backend_budget`: an over-budget call is logged and counted
/// in `TickReport::slow_calls`, but it is never interrupted. A backend that
/// talks to something slow must queue the work and return.
pub trait RenderBackend: Send + Sync {
    /// Human-readable name for logging.
    fn name(&self) -> &str;

    /// What the backend can display.
    fn capabilities(&self) -> &BackendCapabilities;

    /// Longest row text the backend accepts, in display cells.
    fn max_row_text_length(&self) -> usize {
        self.capabilities().max_row_text_length()
    }

    /// Create an empty panel for `viewer`.
    fn create_panel(&self, viewer: ViewerId) -> BackendResult<()>;

    /// Remove the viewer's panel entirely.
    fn remove_panel(&self, viewer: ViewerId) -> BackendResult<()>;

    /// Blank the panel's contents, keeping the panel itself.
    fn clear_panel(&self, viewer: ViewerId) -> BackendResult<()>;

    /// Whether `viewer` currently has a panel.
    fn has_panel(&self, viewer: ViewerId) -> bool;

    /// Replace the panel's contents with `frame`.
    fn update_panel(&self, viewer: ViewerId, frame: &PanelFrame) -> BackendResult<()>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Selection
// ─────────────────────────────────────────────────────────────────────────────

type BaselineFactory = Box<dyn FnOnce() -> Arc<dyn RenderBackend>>;
type RichFactory = Box<dyn FnOnce() -> Option<Arc<dyn RenderBackend>>>;

/// Picks the rendering backend once at startup.
///
/// The rich factory returns `None` when its prerequisites are missing; the
/// baseline factory is the unconditional fallback.
///
/// ```
/// use std::sync::Arc;
/// use scoreboard_core::{BackendCapabilities, BackendProfile};
/// use scoreboard_runtime::backend::{BackendSelector, MemoryBackend, RenderBackend};
///
/// let selected = BackendSelector::new(|| Arc::new(MemoryBackend::new(BackendCapabilities::baseline())))
///     .rich(|| Some(Arc::new(MemoryBackend::new(BackendCapabilities::rich())) as Arc<dyn RenderBackend>))
///     .select();
/// assert_eq!(selected.profile, BackendProfile::Rich);
/// ```
pub struct BackendSelector {
    baseline: BaselineFactory,
    rich: Option<RichFactory>,
    force_legacy: bool,
}

/// The backend chosen by a [`BackendSelector`].
pub struct SelectedBackend {
    /// The backend.
    pub backend: Arc<dyn RenderBackend>,
    /// Which profile was chosen.
    pub profile: BackendProfile,
}

impl BackendSelector {
    /// Start with the baseline backend factory.
    pub fn new<B, F>(baseline: F) -> Self
    where
        B: RenderBackend + 'static,
        F: FnOnce() -> Arc<B> + 'static,
    {
        Self {
            baseline: Box::new(move || baseline() as Arc<dyn RenderBackend>),
            rich: None,
            force_legacy: false,
        }
    }

    /// Offer a richer backend, used when it is available.
    #[must_use]
    pub fn rich(mut self, factory: impl FnOnce() -> Option<Arc<dyn RenderBackend>> + 'static) -> Self {
        self.rich = Some(Box::new(factory));
        self
    }

    /// Always use the baseline backend.
    #[must_use]
    pub fn force_legacy(mut self, force: bool) -> Self {
        self.force_legacy = force;
        self
    }

    /// Build the chosen backend.
    #[must_use]
    pub fn select(self) -> SelectedBackend {
        let rich = if self.force_legacy {
            None
        } else {
            self.rich.and_then(|factory| factory())
        };
        let profile = BackendProfile::select(rich.is_some(), self.force_legacy);
        let backend = match rich {
            Some(backend) => backend,
            None => (self.baseline)(),
        };
        tracing::info!(
            backend = backend.name(),
            profile = profile.as_str(),
            force_legacy = self.force_legacy,
            "selected rendering backend"
        );
        SelectedBackend { backend, profile }
    }
}

impl fmt::Debug for BackendSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendSelector")
            .field("rich", &self.rich.is_some())
            .field("force_legacy", &self.force_legacy)
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Memory backend
// ─────────────────────────────────────────────────────────────────────────────

/// A call recorded by [`MemoryBackend`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    /// `create_panel`
    Create(ViewerId),
    /// `remove_panel`
    Remove(ViewerId),
    /// `clear_panel`
    Clear(ViewerId),
    /// `update_panel`
    Update(ViewerId, PanelFrame),
}

impl BackendCall {
    /// The viewer the call was for.
    #[must_use]
    pub fn viewer(&self) -> ViewerId {
        match self {
            BackendCall::Create(v)
            | BackendCall::Remove(v)
            | BackendCall::Clear(v)
            | BackendCall::Update(v, _) => *v,
        }
    }
}

#[derive(Default)]
struct MemoryState {
    /// Panel per viewer; `None` content means the panel is blank.
    panels: FxHashMap<ViewerId, Option<PanelFrame>>,
    calls: Vec<BackendCall>,
    failing: FxHashSet<ViewerId>,
    panicking: FxHashSet<ViewerId>,
}

/// In-memory backend for headless runs and tests.
///
/// Records every call, keeps the current contents of each panel, and can
/// be told to fail or panic for specific viewers.
pub struct MemoryBackend {
    name: String,
    capabilities: BackendCapabilities,
    latency: Duration,
    state: Mutex<MemoryState>,
}

impl MemoryBackend {
    /// Create a backend with the given capabilities.
    #[must_use]
    pub fn new(capabilities: BackendCapabilities) -> Self {
        Self {
            name: format!("memory-{}", capabilities.profile()),
            capabilities,
            latency: Duration::ZERO,
            state: Mutex::new(MemoryState::default()),
        }
    }

    /// Sleep this long inside every `update_panel` (builder).
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Make every call for `viewer` fail with [`BackendError::Disconnected`].
    pub fn fail_for(&self, viewer: ViewerId) {
        self.lock().failing.insert(viewer);
    }

    /// Make every call for `viewer` panic.
    pub fn panic_for(&self, viewer: ViewerId) {
        self.lock().panicking.insert(viewer);
    }

    /// Stop injecting failures for `viewer`.
    pub fn heal(&self, viewer: ViewerId) {
        let mut state = self.lock();
        state.failing.remove(&viewer);
        state.panicking.remove(&viewer);
    }

    /// All calls so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<BackendCall> {
        self.lock().calls.clone()
    }

    /// Calls for one viewer, in order.
    #[must_use]
    pub fn calls_for(&self, viewer: ViewerId) -> Vec<BackendCall> {
        self.lock()
            .calls
            .iter()
            .filter(|call| call.viewer() == viewer)
            .cloned()
            .collect()
    }

    /// Drain the call log.
    pub fn take_calls(&self) -> Vec<BackendCall> {
        std::mem::take(&mut self.lock().calls)
    }

    /// What the viewer's panel shows now; `None` if absent or blank.
    #[must_use]
    pub fn displayed(&self, viewer: ViewerId) -> Option<PanelFrame> {
        self.lock().panels.get(&viewer).cloned().flatten()
    }

    /// Number of viewers with a panel.
    #[must_use]
    pub fn panel_count(&self) -> usize {
        self.lock().panels.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check(&self, state: &MemoryState, viewer: ViewerId) -> BackendResult<()> {
        if state.panicking.contains(&viewer) {
            panic!("{}: injected panic for viewer {viewer}", self.name);
        }
        if state.failing.contains(&viewer) {
            return Err(BackendError::Disconnected(viewer));
        }
        Ok(())
    }
}

impl RenderBackend for MemoryBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> &BackendCapabilities {
        &self.capabilities
    }

    fn create_panel(&self, viewer: ViewerId) -> BackendResult<()> {
        let mut state = self.lock();
        state.calls.push(BackendCall::Create(viewer));
        self.check(&state, viewer)?;
        state.panels.entry(viewer).or_insert(None);
        Ok(())
    }

    fn remove_panel(&self, viewer: ViewerId) -> BackendResult<()> {
        let mut state = self.lock();
        state.calls.push(BackendCall::Remove(viewer));
        self.check(&state, viewer)?;
        state.panels.remove(&viewer);
        Ok(())
    }

    fn clear_panel(&self, viewer: ViewerId) -> BackendResult<()> {
        let mut state = self.lock();
        state.calls.push(BackendCall::Clear(viewer));
        self.check(&state, viewer)?;
        if let Some(panel) = state.panels.get_mut(&viewer) {
            *panel = None;
        }
        Ok(())
    }

    fn has_panel(&self, viewer: ViewerId) -> bool {
        self.lock().panels.contains_key(&viewer)
    }

    fn update_panel(&self, viewer: ViewerId, frame: &PanelFrame) -> BackendResult<()> {
        if !self.latency.is_zero() {
            std::thread::sleep(self.latency);
        }
        let mut state = self.lock();
        state.calls.push(BackendCall::Update(viewer, frame.clone()));
        self.check(&state, viewer)?;
        match state.panels.get_mut(&viewer) {
            Some(panel) => {
                *panel = Some(frame.clone());
                Ok(())
            }
            None => Err(BackendError::NoPanel(viewer)),
        }
    }
}

impl fmt::Debug for MemoryBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryBackend")
            .field("name", &self.name)
            .field("panels", &self.panel_count())
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
