#![forbid(unsafe_code)]

//! Collaborators supplied by the hosting session.
//!
//! The engine never owns the viewer population, permissions, or
//! placeholder expansion; it queries them through these traits. All queries
//! are pure: implementations must not mutate engine state.

use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::RwLock;

use scoreboard_core::ViewerId;

// ─────────────────────────────────────────────────────────────────────────────
// Traits
// ─────────────────────────────────────────────────────────────────────────────

/// The set of connected viewers.
pub trait Population: Send + Sync {
    /// Viewers online right now.
    fn online(&self) -> Vec<ViewerId>;

    /// Whether `viewer` is online.
    fn is_online(&self, viewer: ViewerId) -> bool;

    /// The viewer's current location, or `None` if the viewer is gone.
    fn location(&self, viewer: ViewerId) -> Option<String>;
}

/// Permission checks.
pub trait AccessControl: Send + Sync {
    /// Whether `viewer` holds `permission`.
    fn has_permission(&self, viewer: ViewerId, permission: &str) -> bool;
}

/// Error returned by a [`PlaceholderResolver`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceholderError {
    message: String,
}

impl PlaceholderError {
    /// Create an error with a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for PlaceholderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "placeholder substitution failed: {}", self.message)
    }
}

impl std::error::Error for PlaceholderError {}

/// Expands placeholders in frame text for one viewer.
pub trait PlaceholderResolver: Send + Sync {
    /// Substitute placeholders in `raw`.
    fn resolve<'a>(&self, viewer: ViewerId, raw: &'a str) -> Result<Cow<'a, str>, PlaceholderError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Trivial collaborators
// ─────────────────────────────────────────────────────────────────────────────

/// Leaves text untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPlaceholders;

impl PlaceholderResolver for NoPlaceholders {
    fn resolve<'a>(&self, _viewer: ViewerId, raw: &'a str) -> Result<Cow<'a, str>, PlaceholderError> {
        Ok(Cow::Borrowed(raw))
    }
}

/// Grants every permission.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl AccessControl for AllowAll {
    fn has_permission(&self, _viewer: ViewerId, _permission: &str) -> bool {
        true
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// StaticPopulation
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
struct Presence {
    location: String,
    permissions: BTreeSet<String>,
}

/// A mutable, in-process population with per-viewer permissions.
///
/// Used by the demo binary and by tests to play the role of the hosting
/// session. Viewers are listed in id order.
#[derive(Debug, Default)]
pub struct StaticPopulation {
    viewers: RwLock<BTreeMap<ViewerId, Presence>>,
}

impl StaticPopulation {
    /// Create an empty population.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bring `viewer` online at `location`.
    pub fn join(&self, viewer: ViewerId, location: impl Into<String>) {
        let mut viewers = self.viewers.write().unwrap_or_else(|e| e.into_inner());
        viewers.entry(viewer).or_default().location = location.into();
    }

    /// Take `viewer` offline. Returns whether the viewer was online.
    pub fn leave(&self, viewer: ViewerId) -> bool {
        self.viewers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&viewer)
            .is_some()
    }

    /// Move an online viewer to another location.
    pub fn move_to(&self, viewer: ViewerId, location: impl Into<String>) {
        let mut viewers = self.viewers.write().unwrap_or_else(|e| e.into_inner());
        if let Some(presence) = viewers.get_mut(&viewer) {
            presence.location = location.into();
        }
    }

    /// Grant a permission to an online viewer.
    pub fn grant(&self, viewer: ViewerId, permission: impl Into<String>) {
        let mut viewers = self.viewers.write().unwrap_or_else(|e| e.into_inner());
        if let Some(presence) = viewers.get_mut(&viewer) {
            presence.permissions.insert(permission.into());
        }
    }

    /// Revoke a permission.
    pub fn revoke(&self, viewer: ViewerId, permission: &str) {
        let mut viewers = self.viewers.write().unwrap_or_else(|e| e.into_inner());
        if let Some(presence) = viewers.get_mut(&viewer) {
            presence.permissions.remove(permission);
        }
    }

    /// Number of online viewers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.viewers.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Whether nobody is online.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Population for StaticPopulation {
    fn online(&self) -> Vec<ViewerId> {
        self.viewers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .copied()
            .collect()
    }

    fn is_online(&self, viewer: ViewerId) -> bool {
        self.viewers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(&viewer)
    }

    fn location(&self, viewer: ViewerId) -> Option<String> {
        self.viewers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&viewer)
            .map(|presence| presence.location.clone())
    }
}

impl AccessControl for StaticPopulation {
    fn has_permission(&self, viewer: ViewerId, permission: &str) -> bool {
        self.viewers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&viewer)
            .is_some_and(|presence| presence.permissions.contains(permission))
    }
}
