#![forbid(unsafe_code)]

//! Scoreboard templates: a title track, numbered row tracks, and access rules.

use std::collections::BTreeMap;

use crate::animation::{Tick, Track};
use crate::condition::ConditionId;
use crate::identity::TemplateName;

/// Row number on the panel. Higher rows are drawn first.
pub type RowIndex = i32;

/// A named bundle of animated content.
///
/// Immutable after load. Shared read-only by the registry, routing rules,
/// and every viewer currently displaying it.
#[derive(Debug, Clone)]
pub struct Template {
    name: TemplateName,
    title: Track,
    rows: BTreeMap<RowIndex, Track>,
    permission: Option<String>,
    conditions: Vec<ConditionId>,
}

impl Template {
    /// Create a template with a title and no rows.
    #[must_use]
    pub fn new(name: TemplateName, title: Track) -> Self {
        Self {
            name,
            title,
            rows: BTreeMap::new(),
            permission: None,
            conditions: Vec::new(),
        }
    }

    /// Add a row (builder). A later row with the same index replaces the earlier one.
    #[must_use]
    pub fn with_row(mut self, index: RowIndex, track: Track) -> Self {
        self.rows.insert(index, track);
        self
    }

    /// Require a permission (builder). An empty string means no requirement.
    #[must_use]
    pub fn with_permission(mut self, permission: impl Into<String>) -> Self {
        let permission = permission.into();
        self.permission = (!permission.trim().is_empty()).then_some(permission);
        self
    }

    /// Require a condition (builder).
    #[must_use]
    pub fn with_condition(mut self, condition: ConditionId) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Template name.
    #[must_use]
    pub fn name(&self) -> &TemplateName {
        &self.name
    }

    /// Title track.
    #[must_use]
    pub fn title(&self) -> &Track {
        &self.title
    }

    /// Row tracks by index, ascending.
    #[must_use]
    pub fn rows(&self) -> &BTreeMap<RowIndex, Track> {
        &self.rows
    }

    /// One row track.
    #[must_use]
    pub fn row(&self, index: RowIndex) -> Option<&Track> {
        self.rows.get(&index)
    }

    /// Permission a viewer must hold, if any.
    #[must_use]
    pub fn permission(&self) -> Option<&str> {
        self.permission.as_deref()
    }

    /// Conditions that must all hold.
    #[must_use]
    pub fn conditions(&self) -> &[ConditionId] {
        &self.conditions
    }

    /// Raw title text at `clock`.
    #[must_use]
    pub fn title_at(&self, clock: Tick) -> &str {
        self.title.value_at(clock)
    }

    /// Raw row texts at `clock`, highest row first, at most `max_rows` rows.
    pub fn rows_at(&self, clock: Tick, max_rows: usize) -> impl Iterator<Item = (RowIndex, &str)> {
        self.rows
            .iter()
            .rev()
            .take(max_rows)
            .map(move |(index, track)| (*index, track.value_at(clock)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::Frame;

    fn lobby() -> Template {
        Template::new(
            TemplateName::new("Lobby"),
            Track::new(vec![Frame::new("Welcome", 40), Frame::new("Enjoy!", 20)]),
        )
        .with_row(1, Track::new(vec![Frame::new("Online: 5", 60)]))
    }

    #[test]
    fn lobby_scenario() {
        let t = lobby();
        assert_eq!(t.title_at(0), "Welcome");
        assert_eq!(t.title_at(45), "Enjoy!");
        assert_eq!(t.title_at(60), "Welcome");
        for clock in [0, 17, 45, 60, 119] {
            let rows: Vec<_> = t.rows_at(clock, 15).collect();
            assert_eq!(rows, vec![(1, "Online: 5")]);
        }
    }

    #[test]
    fn empty_permission_means_none() {
        assert_eq!(lobby().with_permission("  ").permission(), None);
        assert_eq!(lobby().with_permission("board.vip").permission(), Some("board.vip"));
    }

    #[test]
    fn rows_keep_highest_indices() {
        let t = lobby()
            .with_row(15, Track::constant("top"))
            .with_row(-3, Track::constant("bottom"));
        let rows: Vec<_> = t.rows_at(0, 2).collect();
        assert_eq!(rows, vec![(15, "top"), (1, "Online: 5")]);
    }
}
