#![forbid(unsafe_code)]

//! Scoreboard public facade crate.
//!
//! Re-exports the types a host needs from the core and runtime crates and
//! offers a prelude for day-to-day usage.

use std::fmt;

// --- Core re-exports -------------------------------------------------------

pub use scoreboard_core::{
    AnimationClock, BackendCapabilities, BackendProfile, CompareOp, ConditionDef,
    ConditionKindDef, DEFAULT_FRAME_DURATION, DefinitionError, Definitions, Frame, FrameDef,
    LoadIssue, LocationMatchDef, RequesterId, RowDef, RowIndex, RoutingRuleDef, Template,
    TemplateDef, TemplateName, TextFeatures, Tick, Track, ViewerId,
};

// --- Runtime re-exports ----------------------------------------------------

pub use scoreboard_runtime::{
    AccessControl, AllowAll, BackendError, BackendSelector, LoadReport, MemoryBackend,
    MemoryStorage, NoPlaceholders, PanelConfig, PanelContext, PanelContextBuilder, PanelFrame,
    PlaceholderError, PlaceholderResolver, Population, RenderBackend, Resolution,
    SchedulerHandle, SchedulerStats, Selection, StaticPopulation, StorageBackend, StorageError,
    TickReport,
};
#[cfg(feature = "state-persistence")]
pub use scoreboard_runtime::FileStorage;

// --- Errors ---------------------------------------------------------------

/// Top-level error type for scoreboard hosts.
#[derive(Debug)]
pub enum Error {
    /// I/O failure, e.g. the scheduler thread could not be spawned.
    Io(std::io::Error),
    /// Persisted viewer state could not be read or written.
    Storage(StorageError),
    /// A backend call failed outside the tick loop.
    Backend(BackendError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "{err}"),
            Self::Storage(err) => write!(f, "storage: {err}"),
            Self::Backend(err) => write!(f, "backend: {err}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Storage(err) => Some(err),
            Self::Backend(err) => Some(err),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<StorageError> for Error {
    fn from(err: StorageError) -> Self {
        Self::Storage(err)
    }
}

impl From<BackendError> for Error {
    fn from(err: BackendError) -> Self {
        Self::Backend(err)
    }
}

/// Standard result type for scoreboard APIs.
pub type Result<T> = std::result::Result<T, Error>;

// --- Prelude --------------------------------------------------------------

pub mod prelude {
    pub use crate::{
        BackendCapabilities, Definitions, Error, FrameDef, LocationMatchDef, MemoryBackend,
        PanelConfig, PanelContext, RenderBackend, RequesterId, Result, RoutingRuleDef,
        StaticPopulation, TemplateDef, TemplateName, ViewerId,
    };

    pub use crate::{core, runtime};
}

pub use scoreboard_core as core;
pub use scoreboard_runtime as runtime;
