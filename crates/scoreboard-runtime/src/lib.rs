#![forbid(unsafe_code)]

//! Scoreboard Runtime
//!
//! This crate turns the pure definitions of `scoreboard-core` into live,
//! per-viewer panels: it tracks who asked to hide or disable a viewer's
//! panel, decides which template each viewer sees, and drives a fixed-rate
//! tick loop that pushes adapted frames to a rendering backend.
//!
//! # Key Components
//!
//! - [`PanelContext`] - The engine; owns everything below and exposes the request API
//! - [`Registry`] - Versioned template catalog with atomic reload
//! - [`ViewerStateStore`] - Per-viewer hide/disable/override requests
//! - [`Resolver`] - Disabled > override > routed precedence
//! - [`RoutingTable`] - First-matching-rule routing with a per-location cache
//! - [`RenderBackend`] - Trait for the display surface; [`MemoryBackend`] for headless use
//! - [`scheduler`] - Background tick loop with stop signal and deferred ticks
//! - [`state_persistence`] - Storage of the engine's own viewer requests
//!
//! # How it fits
//! The host embeds a [`PanelContext`], forwards join/leave events and
//! requests to it, and implements [`Population`], [`AccessControl`], and
//! [`PlaceholderResolver`] for its own world. Everything else happens on the
//! scheduler thread.

pub mod backend;
pub mod config;
pub mod context;
pub mod host;
pub mod registry;
pub mod resolver;
pub mod routing;
pub mod scheduler;
pub mod state_persistence;
pub mod viewer_state;

pub use backend::{
    BackendCall, BackendError, BackendResult, BackendSelector, MemoryBackend, PanelFrame,
    RenderBackend, SelectedBackend,
};
pub use config::{DEFAULT_OWNER, PanelConfig};
pub use context::{PanelContext, PanelContextBuilder};
pub use host::{
    AccessControl, AllowAll, NoPlaceholders, PlaceholderError, PlaceholderResolver, Population,
    StaticPopulation,
};
pub use registry::{Catalog, LoadReport, Registry};
pub use resolver::{Resolution, Resolver, Selection};
pub use routing::{Route, RouteCacheStats, RoutingTable};
pub use scheduler::{
    SchedulerConfig, SchedulerHandle, SchedulerStats, StopSignal, StopTrigger, TickReport,
    TickTarget,
};
#[cfg(feature = "state-persistence")]
pub use state_persistence::FileStorage;
pub use state_persistence::{
    MemoryStorage, PersistedState, PersistedViewer, StorageBackend, StorageError, StorageResult,
};
pub use viewer_state::{FlagChange, ViewerEntry, ViewerRecord, ViewerStateStore};
