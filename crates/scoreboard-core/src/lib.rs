#![forbid(unsafe_code)]

//! Core: animated tracks, templates, conditions, routing rules, backend
//! capabilities, and text adaptation.
//!
//! Everything in this crate is pure data and pure functions. Threads,
//! logging, and backend calls live in `scoreboard-runtime`.

pub mod animation;
pub mod capabilities;
pub mod condition;
pub mod definition;
pub mod identity;
pub mod routing;
pub mod template;
pub mod text;

pub use animation::{AnimationClock, Frame, Tick, Track};
pub use capabilities::{BackendCapabilities, BackendProfile, CapabilityProfileBuilder, TextFeatures};
pub use condition::{CompareOp, Condition, ConditionContext, ConditionId, ConditionKind};
pub use definition::{
    Compiled, ConditionDef, ConditionKindDef, DEFAULT_FRAME_DURATION, DefinitionError, Definitions,
    FrameDef, IssueResolution, LoadIssue, LocationMatchDef, RowDef, RoutingRuleDef, TemplateDef,
};
pub use identity::{ParseViewerIdError, RequesterId, TemplateName, ViewerId};
pub use routing::{LocationPredicate, RoutingRule};
pub use template::{RowIndex, Template};
