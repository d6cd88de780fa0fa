#![forbid(unsafe_code)]

//! Per-viewer hide/disable/override state.
//!
//! Several independent components (requesters) may hide, disable, or force
//! a template on the same viewer. Each request is recorded under the
//! requester's id; the viewer's effective state is derived from all of
//! them.
//!
//! # Invariants
//!
//! 1. **Aggregate flags**: a viewer is hidden iff `hidden_by` is non-empty,
//!    disabled iff `disabled_by` is non-empty. One requester's "show" never
//!    undoes another's "hide".
//! 2. **Orthogonality**: hidden and disabled are independent; disabled is
//!    the stronger of the two.
//! 3. **Override precedence**: the most recently set override wins; clearing
//!    it reveals the previous one.
//! 4. **Single creation**: [`ViewerStateStore::entry`] creates at most one
//!    record per viewer, even under concurrent first access.
//!
//! # Concurrency
//!
//! The store is a read-mostly map of `Arc<Mutex<ViewerEntry>>`. The map lock
//! is held only to look up or insert a record; all per-viewer work happens
//! under that viewer's own mutex, so unrelated viewers never contend.
//! Records are changed only through `PanelContext` requests, which redraw
//! the panel under the same lock; the store never talks to a backend.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use rustc_hash::FxHashMap;
use scoreboard_core::{RequesterId, TemplateName, ViewerId};

use crate::backend::PanelFrame;

// ─────────────────────────────────────────────────────────────────────────────
// Flag changes
// ─────────────────────────────────────────────────────────────────────────────

/// Outcome of a hide/disable request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlagChange {
    /// Whether the requester is in the set after the call.
    pub member: bool,
    /// Whether the aggregate flag is set after the call.
    pub active: bool,
    /// Whether the aggregate flag flipped.
    pub changed: bool,
}

fn set_membership(set: &mut BTreeSet<RequesterId>, requester: &RequesterId, on: bool) -> FlagChange {
    let before = !set.is_empty();
    if on {
        if !set.contains(requester) {
            set.insert(requester.clone());
        }
    } else {
        set.remove(requester);
    }
    let active = !set.is_empty();
    FlagChange {
        member: on,
        active,
        changed: before != active,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ViewerRecord
// ─────────────────────────────────────────────────────────────────────────────

/// Everything requesters have asked for one viewer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewerRecord {
    hidden_by: BTreeSet<RequesterId>,
    disabled_by: BTreeSet<RequesterId>,
    /// Oldest first; the last entry wins.
    overrides: Vec<(RequesterId, Option<TemplateName>)>,
}

impl ViewerRecord {
    /// An empty record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether any requester hides the viewer.
    #[must_use]
    pub fn is_hidden(&self) -> bool {
        !self.hidden_by.is_empty()
    }

    /// Whether any requester disables the viewer.
    #[must_use]
    pub fn is_disabled(&self) -> bool {
        !self.disabled_by.is_empty()
    }

    /// Requesters hiding the viewer.
    #[must_use]
    pub fn hidden_by(&self) -> &BTreeSet<RequesterId> {
        &self.hidden_by
    }

    /// Requesters disabling the viewer.
    #[must_use]
    pub fn disabled_by(&self) -> &BTreeSet<RequesterId> {
        &self.disabled_by
    }

    /// Overrides, oldest first.
    pub fn overrides(&self) -> impl Iterator<Item = (&RequesterId, Option<&TemplateName>)> {
        self.overrides.iter().map(|(r, t)| (r, t.as_ref()))
    }

    /// Whether nothing was requested for this viewer.
    #[must_use]
    pub fn is_default(&self) -> bool {
        self.hidden_by.is_empty() && self.disabled_by.is_empty() && self.overrides.is_empty()
    }

    /// Add or remove `requester` from the hiding set.
    pub fn set_hidden(&mut self, requester: &RequesterId, hidden: bool) -> FlagChange {
        set_membership(&mut self.hidden_by, requester, hidden)
    }

    /// Add or remove `requester` from the disabling set.
    pub fn set_disabled(&mut self, requester: &RequesterId, disabled: bool) -> FlagChange {
        set_membership(&mut self.disabled_by, requester, disabled)
    }

    /// Flip `requester`'s membership in the hiding set.
    pub fn toggle_hidden(&mut self, requester: &RequesterId) -> FlagChange {
        let on = !self.hidden_by.contains(requester);
        self.set_hidden(requester, on)
    }

    /// Flip `requester`'s membership in the disabling set.
    pub fn toggle_disabled(&mut self, requester: &RequesterId) -> FlagChange {
        let on = !self.disabled_by.contains(requester);
        self.set_disabled(requester, on)
    }

    /// The winning override: requester and target (`None` forces no template).
    #[must_use]
    pub fn effective_override(&self) -> Option<(&RequesterId, Option<&TemplateName>)> {
        self.overrides.last().map(|(r, t)| (r, t.as_ref()))
    }

    /// The override `requester` set, if any.
    #[must_use]
    pub fn override_for(&self, requester: &RequesterId) -> Option<Option<&TemplateName>> {
        self.overrides
            .iter()
            .find(|(r, _)| r == requester)
            .map(|(_, t)| t.as_ref())
    }

    fn effective_target(&self) -> Option<Option<TemplateName>> {
        self.overrides.last().map(|(_, t)| t.clone())
    }

    /// Set `requester`'s override and make it the most recent.
    ///
    /// Returns whether the effective target changed.
    pub fn set_override(&mut self, requester: &RequesterId, template: Option<TemplateName>) -> bool {
        let before = self.effective_target();
        self.overrides.retain(|(r, _)| r != requester);
        self.overrides.push((requester.clone(), template));
        before != self.effective_target()
    }

    /// Remove `requester`'s override.
    ///
    /// Returns whether the effective target changed.
    pub fn clear_override(&mut self, requester: &RequesterId) -> bool {
        let before = self.effective_target();
        self.overrides.retain(|(r, _)| r != requester);
        before != self.effective_target()
    }

    /// Drop everything except what `requester` asked for.
    pub fn retain_only(&mut self, requester: &RequesterId) {
        self.hidden_by.retain(|r| r == requester);
        self.disabled_by.retain(|r| r == requester);
        self.overrides.retain(|(r, _)| r == requester);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ViewerEntry
// ─────────────────────────────────────────────────────────────────────────────

/// A viewer's record plus what was last rendered for it.
#[derive(Debug, Default)]
pub struct ViewerEntry {
    /// Requested state.
    pub record: ViewerRecord,
    last_frame: Option<PanelFrame>,
    last_template: Option<TemplateName>,
    showing: bool,
}

impl ViewerEntry {
    /// The last frame pushed, kept after a clear for placeholder fallback.
    #[must_use]
    pub fn last_frame(&self) -> Option<&PanelFrame> {
        self.last_frame.as_ref()
    }

    /// The last frame pushed, but only if `template` produced it.
    #[must_use]
    pub fn last_frame_of(&self, template: &TemplateName) -> Option<&PanelFrame> {
        if self.last_template.as_ref() == Some(template) {
            self.last_frame.as_ref()
        } else {
            None
        }
    }

    /// Whether `frame` is exactly what the panel shows now.
    #[must_use]
    pub fn is_showing(&self, frame: &PanelFrame) -> bool {
        self.showing && self.last_frame.as_ref() == Some(frame)
    }

    /// Whether the panel currently shows any frame.
    #[must_use]
    pub fn has_content(&self) -> bool {
        self.showing
    }

    /// Remember a frame that `template` produced and that was pushed.
    pub fn mark_shown(&mut self, template: &TemplateName, frame: PanelFrame) {
        self.last_frame = Some(frame);
        self.last_template = Some(template.clone());
        self.showing = true;
    }

    /// The panel was cleared or recreated.
    pub fn mark_cleared(&mut self) {
        self.showing = false;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ViewerStateStore
// ─────────────────────────────────────────────────────────────────────────────

/// Shared handle to one viewer's entry.
pub type SharedEntry = Arc<Mutex<ViewerEntry>>;

/// Lock an entry, recovering from poisoning.
pub fn lock_entry(entry: &SharedEntry) -> MutexGuard<'_, ViewerEntry> {
    entry.lock().unwrap_or_else(|e| e.into_inner())
}

/// All viewer records, keyed by viewer.
#[derive(Debug, Default)]
pub struct ViewerStateStore {
    records: RwLock<FxHashMap<ViewerId, SharedEntry>>,
}

impl ViewerStateStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The viewer's entry, if one exists.
    #[must_use]
    pub fn get(&self, viewer: ViewerId) -> Option<SharedEntry> {
        self.records
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&viewer)
            .cloned()
    }

    /// The viewer's entry, created on first use.
    pub fn entry(&self, viewer: ViewerId) -> SharedEntry {
        if let Some(entry) = self.get(viewer) {
            return entry;
        }
        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        records.entry(viewer).or_default().clone()
    }

    /// Copy of the viewer's record.
    #[must_use]
    pub fn snapshot(&self, viewer: ViewerId) -> Option<ViewerRecord> {
        self.get(viewer).map(|entry| lock_entry(&entry).record.clone())
    }

    /// Remove the viewer's entry, returning its record.
    pub fn remove(&self, viewer: ViewerId) -> Option<ViewerRecord> {
        let entry = self
            .records
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&viewer)?;
        let record = lock_entry(&entry).record.clone();
        Some(record)
    }

    /// Remove the entry only if its record is default.
    pub fn remove_if_default(&self, viewer: ViewerId) -> bool {
        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        let is_default = records
            .get(&viewer)
            .is_some_and(|entry| lock_entry(entry).record.is_default());
        if is_default {
            records.remove(&viewer);
        }
        is_default
    }

    /// Viewers with an entry.
    #[must_use]
    pub fn viewers(&self) -> Vec<ViewerId> {
        self.records
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .copied()
            .collect()
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.records.write().unwrap_or_else(|e| e.into_inner()).clear();
    }
}
