#![forbid(unsafe_code)]

//! Parsed configuration definitions and their compilation.
//!
//! A configuration collaborator parses raw files into [`Definitions`]; this
//! module turns them into immutable [`Template`]s, [`Condition`]s, and
//! [`RoutingRule`]s. Raw files are never read here.
//!
//! # Failure Modes
//!
//! | Problem | Resolution |
//! |---------|------------|
//! | Empty template name or condition id | Entry skipped |
//! | Duplicate template name / condition id (case-insensitive) | First wins, later skipped |
//! | Duplicate row index in one template | First wins, later skipped |
//! | Frame duration of zero | Coerced to one tick |
//! | Template references an unknown condition | Template skipped |
//! | Invalid location pattern | Rule or condition skipped |
//!
//! Every problem is reported as a [`LoadIssue`]; compilation itself never
//! fails, so a bad entry never prevents the rest from loading.

use std::collections::HashSet;
use std::fmt;

use crate::animation::{Frame, Track};
use crate::condition::{CompareOp, Condition, ConditionId, ConditionKind};
use crate::identity::TemplateName;
use crate::routing::{LocationPredicate, RoutingRule};
use crate::template::{RowIndex, Template};

/// Frame duration used when a definition omits one (one second at 20 ticks/s).
pub const DEFAULT_FRAME_DURATION: u32 = 20;

// ---------------------------------------------------------------------------
// Definition types
// ---------------------------------------------------------------------------

/// One frame as written in configuration: bare text, or text with a duration.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum FrameDef {
    /// Text shown for the default duration.
    Text(String),
    /// Text shown for an explicit number of ticks.
    Timed {
        /// Frame text.
        text: String,
        /// Ticks the frame stays visible.
        #[cfg_attr(feature = "serde", serde(alias = "time"))]
        duration: u32,
    },
}

impl FrameDef {
    /// Bare text frame.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    /// Frame with an explicit duration.
    pub fn timed(text: impl Into<String>, duration: u32) -> Self {
        Self::Timed {
            text: text.into(),
            duration,
        }
    }
}

/// One numbered row as written in configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RowDef {
    /// Row number.
    pub index: RowIndex,
    /// Frames in order.
    pub frames: Vec<FrameDef>,
}

/// A template as written in configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TemplateDef {
    /// Template name (case-insensitive).
    pub name: String,
    /// Title frames.
    #[cfg_attr(feature = "serde", serde(default))]
    pub titles: Vec<FrameDef>,
    /// Rows.
    #[cfg_attr(feature = "serde", serde(default))]
    pub rows: Vec<RowDef>,
    /// Required permission; empty or absent means none.
    #[cfg_attr(feature = "serde", serde(default))]
    pub permission: Option<String>,
    /// Condition ids that must all hold.
    #[cfg_attr(feature = "serde", serde(default))]
    pub conditions: Vec<String>,
}

impl TemplateDef {
    /// Start a template definition.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Append a title frame (builder).
    #[must_use]
    pub fn title(mut self, frame: FrameDef) -> Self {
        self.titles.push(frame);
        self
    }

    /// Append a row (builder).
    #[must_use]
    pub fn row(mut self, index: RowIndex, frames: Vec<FrameDef>) -> Self {
        self.rows.push(RowDef { index, frames });
        self
    }

    /// Set the permission (builder).
    #[must_use]
    pub fn permission(mut self, permission: impl Into<String>) -> Self {
        self.permission = Some(permission.into());
        self
    }

    /// Require a condition (builder).
    #[must_use]
    pub fn condition(mut self, id: impl Into<String>) -> Self {
        self.conditions.push(id.into());
        self
    }
}

/// A location test as written in configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum LocationMatchDef {
    /// Every location.
    Any,
    /// Case-insensitive exact name.
    Exact(String),
    /// Case-insensitive regular expression over the whole name.
    Pattern(String),
}

impl LocationMatchDef {
    fn compile(&self) -> Result<LocationPredicate, DefinitionError> {
        match self {
            Self::Any => Ok(LocationPredicate::Any),
            Self::Exact(name) => Ok(LocationPredicate::exact(name)),
            Self::Pattern(source) => LocationPredicate::pattern(source),
        }
    }
}

/// A routing rule as written in configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RoutingRuleDef {
    /// Location test.
    pub location: LocationMatchDef,
    /// Candidate template names in priority order.
    pub templates: Vec<String>,
}

impl RoutingRuleDef {
    /// Create a rule definition.
    pub fn new<I, S>(location: LocationMatchDef, templates: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            location,
            templates: templates.into_iter().map(Into::into).collect(),
        }
    }
}

/// The test a condition performs, as written in configuration.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind", rename_all = "snake_case"))]
pub enum ConditionKindDef {
    /// Viewer holds a permission node.
    HasPermission {
        /// Permission node.
        permission: String,
    },
    /// Viewer's location satisfies a test.
    InLocation {
        /// Location test.
        location: LocationMatchDef,
    },
    /// Substituted text equals a value.
    TextEquals {
        /// Text with placeholders.
        input: String,
        /// Expected value.
        value: String,
        /// Compare ignoring case.
        #[cfg_attr(feature = "serde", serde(default))]
        ignore_case: bool,
    },
    /// Substituted text compares numerically to a value.
    NumberCompare {
        /// Text with placeholders.
        input: String,
        /// Operator.
        op: CompareOp,
        /// Right-hand side.
        value: f64,
    },
}

/// A condition as written in configuration.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ConditionDef {
    /// Condition id (case-insensitive).
    pub id: String,
    /// The test.
    #[cfg_attr(feature = "serde", serde(flatten))]
    pub kind: ConditionKindDef,
    /// Invert the result.
    #[cfg_attr(feature = "serde", serde(default))]
    pub negate: bool,
}

/// Everything the registry loads in one pass.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Definitions {
    /// Templates in declaration order.
    #[cfg_attr(feature = "serde", serde(default))]
    pub templates: Vec<TemplateDef>,
    /// Routing rules in declaration order.
    #[cfg_attr(feature = "serde", serde(default))]
    pub rules: Vec<RoutingRuleDef>,
    /// Conditions.
    #[cfg_attr(feature = "serde", serde(default))]
    pub conditions: Vec<ConditionDef>,
    /// Duration of frames declared without one.
    #[cfg_attr(feature = "serde", serde(default = "default_frame_duration"))]
    pub default_frame_duration: u32,
}

#[cfg(feature = "serde")]
fn default_frame_duration() -> u32 {
    DEFAULT_FRAME_DURATION
}

impl Default for Definitions {
    fn default() -> Self {
        Self {
            templates: Vec::new(),
            rules: Vec::new(),
            conditions: Vec::new(),
            default_frame_duration: DEFAULT_FRAME_DURATION,
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// A problem found in one definition entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefinitionError {
    /// A template has an empty name.
    EmptyTemplateName,
    /// A template name was already declared.
    DuplicateTemplate(TemplateName),
    /// A row index was declared twice in one template.
    DuplicateRow {
        /// Template name.
        template: TemplateName,
        /// Row index.
        row: RowIndex,
    },
    /// A frame declared a zero duration.
    ZeroDuration {
        /// Template name.
        template: TemplateName,
        /// `"title"` or `"row N"`.
        track: String,
    },
    /// The default frame duration is zero.
    ZeroDefaultDuration,
    /// A template references a condition that does not exist.
    UnknownCondition {
        /// Template name.
        template: TemplateName,
        /// Missing condition id.
        condition: ConditionId,
    },
    /// A condition has an empty id.
    EmptyConditionId,
    /// A condition id was already declared.
    DuplicateCondition(ConditionId),
    /// A location pattern does not compile.
    InvalidPattern {
        /// Pattern source.
        pattern: String,
        /// Compiler message.
        reason: String,
    },
}

impl fmt::Display for DefinitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyTemplateName => write!(f, "template with an empty name"),
            Self::DuplicateTemplate(name) => write!(f, "duplicate template \"{name}\""),
            Self::DuplicateRow { template, row } => {
                write!(f, "duplicate row {row} in template \"{template}\"")
            }
            Self::ZeroDuration { template, track } => {
                write!(f, "zero frame duration in {track} of template \"{template}\"")
            }
            Self::ZeroDefaultDuration => write!(f, "zero default frame duration"),
            Self::UnknownCondition {
                template,
                condition,
            } => write!(
                f,
                "template \"{template}\" references unknown condition \"{condition}\""
            ),
            Self::EmptyConditionId => write!(f, "condition with an empty id"),
            Self::DuplicateCondition(id) => write!(f, "duplicate condition \"{id}\""),
            Self::InvalidPattern { pattern, reason } => {
                write!(f, "invalid location pattern \"{pattern}\": {reason}")
            }
        }
    }
}

impl std::error::Error for DefinitionError {}

/// How a load issue was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueResolution {
    /// The offending entry was left out.
    Skipped,
    /// The value was corrected and the entry kept.
    Coerced,
}

/// A definition problem and what was done about it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadIssue {
    /// The problem.
    pub error: DefinitionError,
    /// What happened to the entry.
    pub resolution: IssueResolution,
}

impl LoadIssue {
    fn skipped(error: DefinitionError) -> Self {
        Self {
            error,
            resolution: IssueResolution::Skipped,
        }
    }

    fn coerced(error: DefinitionError) -> Self {
        Self {
            error,
            resolution: IssueResolution::Coerced,
        }
    }
}

impl fmt::Display for LoadIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.resolution {
            IssueResolution::Skipped => write!(f, "{} (skipped)", self.error),
            IssueResolution::Coerced => write!(f, "{} (coerced)", self.error),
        }
    }
}

// ---------------------------------------------------------------------------
// Compilation
// ---------------------------------------------------------------------------

/// Output of [`Definitions::compile`].
#[derive(Debug, Clone, Default)]
pub struct Compiled {
    /// Templates in declaration order, names unique.
    pub templates: Vec<Template>,
    /// Conditions, ids unique.
    pub conditions: Vec<Condition>,
    /// Rules in declaration order.
    pub rules: Vec<RoutingRule>,
    /// Every problem found.
    pub issues: Vec<LoadIssue>,
}

impl Definitions {
    /// Compile into immutable runtime types, skipping bad entries.
    #[must_use]
    pub fn compile(&self) -> Compiled {
        let mut out = Compiled::default();
        if self.default_frame_duration == 0 {
            out.issues
                .push(LoadIssue::coerced(DefinitionError::ZeroDefaultDuration));
        }
        self.compile_conditions(&mut out);
        self.compile_templates(&mut out);
        self.compile_rules(&mut out);
        out
    }

    fn compile_conditions(&self, out: &mut Compiled) {
        let mut seen = HashSet::new();
        for def in &self.conditions {
            let id = ConditionId::new(&def.id);
            if id.as_str().is_empty() {
                out.issues.push(LoadIssue::skipped(DefinitionError::EmptyConditionId));
                continue;
            }
            if !seen.insert(id.clone()) {
                out.issues
                    .push(LoadIssue::skipped(DefinitionError::DuplicateCondition(id)));
                continue;
            }
            let kind = match &def.kind {
                ConditionKindDef::HasPermission { permission } => {
                    ConditionKind::HasPermission(permission.clone())
                }
                ConditionKindDef::InLocation { location } => match location.compile() {
                    Ok(predicate) => ConditionKind::InLocation(predicate),
                    Err(error) => {
                        seen.remove(&id);
                        out.issues.push(LoadIssue::skipped(error));
                        continue;
                    }
                },
                ConditionKindDef::TextEquals {
                    input,
                    value,
                    ignore_case,
                } => ConditionKind::TextEquals {
                    input: input.clone(),
                    value: value.clone(),
                    ignore_case: *ignore_case,
                },
                ConditionKindDef::NumberCompare { input, op, value } => {
                    ConditionKind::NumberCompare {
                        input: input.clone(),
                        op: *op,
                        value: *value,
                    }
                }
            };
            out.conditions
                .push(Condition::new(id, kind).negated(def.negate));
        }
    }

    fn compile_templates(&self, out: &mut Compiled) {
        let known: HashSet<ConditionId> =
            out.conditions.iter().map(|c| c.id().clone()).collect();
        let mut seen = HashSet::new();

        'templates: for def in &self.templates {
            let name = TemplateName::new(&def.name);
            if name.is_empty() {
                out.issues
                    .push(LoadIssue::skipped(DefinitionError::EmptyTemplateName));
                continue;
            }
            if seen.contains(&name) {
                out.issues
                    .push(LoadIssue::skipped(DefinitionError::DuplicateTemplate(name)));
                continue;
            }

            let mut conditions = Vec::with_capacity(def.conditions.len());
            for raw in &def.conditions {
                let condition = ConditionId::new(raw);
                if !known.contains(&condition) {
                    out.issues
                        .push(LoadIssue::skipped(DefinitionError::UnknownCondition {
                            template: name.clone(),
                            condition,
                        }));
                    continue 'templates;
                }
                conditions.push(condition);
            }

            let title = self.compile_track(&name, "title", &def.titles, &mut out.issues);
            let mut template = Template::new(name.clone(), title);

            let mut rows_seen = HashSet::new();
            for row in &def.rows {
                if !rows_seen.insert(row.index) {
                    out.issues.push(LoadIssue::skipped(DefinitionError::DuplicateRow {
                        template: name.clone(),
                        row: row.index,
                    }));
                    continue;
                }
                let label = format!("row {}", row.index);
                let track = self.compile_track(&name, &label, &row.frames, &mut out.issues);
                template = template.with_row(row.index, track);
            }

            if let Some(permission) = &def.permission {
                template = template.with_permission(permission.clone());
            }
            for condition in conditions {
                template = template.with_condition(condition);
            }

            seen.insert(name);
            out.templates.push(template);
        }
    }

    fn compile_track(
        &self,
        template: &TemplateName,
        label: &str,
        frames: &[FrameDef],
        issues: &mut Vec<LoadIssue>,
    ) -> Track {
        let mut coerced = false;
        let track = frames
            .iter()
            .map(|def| match def {
                FrameDef::Text(text) => Frame::new(text.clone(), self.default_frame_duration),
                FrameDef::Timed { text, duration } => {
                    coerced |= *duration == 0;
                    Frame::new(text.clone(), *duration)
                }
            })
            .collect();
        if coerced {
            issues.push(LoadIssue::coerced(DefinitionError::ZeroDuration {
                template: template.clone(),
                track: label.to_string(),
            }));
        }
        track
    }

    fn compile_rules(&self, out: &mut Compiled) {
        for def in &self.rules {
            match def.location.compile() {
                Ok(predicate) => {
                    let candidates = def.templates.iter().map(TemplateName::new).collect();
                    out.rules.push(RoutingRule::new(predicate, candidates));
                }
                Err(error) => out.issues.push(LoadIssue::skipped(error)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lobby() -> TemplateDef {
        TemplateDef::new("Lobby")
            .title(FrameDef::timed("Welcome", 40))
            .title(FrameDef::timed("Enjoy!", 20))
            .row(1, vec![FrameDef::timed("Online: 5", 60)])
    }

    #[test]
    fn compiles_clean_definitions() {
        let defs = Definitions {
            templates: vec![lobby()],
            rules: vec![RoutingRuleDef::new(LocationMatchDef::Any, ["lobby"])],
            ..Definitions::default()
        };
        let compiled = defs.compile();
        assert!(compiled.issues.is_empty(), "{:?}", compiled.issues);
        assert_eq!(compiled.templates.len(), 1);
        assert_eq!(compiled.templates[0].name().as_str(), "lobby");
        assert_eq!(compiled.templates[0].title_at(45), "Enjoy!");
        assert_eq!(compiled.rules.len(), 1);
    }

    #[test]
    fn zero_default_duration_is_reported_once() {
        let defs = Definitions {
            templates: vec![
                TemplateDef::new("a")
                    .title(FrameDef::text("one"))
                    .title(FrameDef::text("two"))
                    .row(1, vec![FrameDef::text("row")]),
            ],
            default_frame_duration: 0,
            ..Definitions::default()
        };
        let compiled = defs.compile();
        assert_eq!(
            compiled.issues,
            vec![LoadIssue::coerced(DefinitionError::ZeroDefaultDuration)]
        );
        let t = &compiled.templates[0];
        assert_eq!(t.title_at(0), "one");
        assert_eq!(t.title_at(1), "two");
    }

    #[test]
    fn bare_text_uses_default_duration() {
        let defs = Definitions {
            templates: vec![
                TemplateDef::new("a")
                    .title(FrameDef::text("one"))
                    .title(FrameDef::text("two")),
            ],
            default_frame_duration: 5,
            ..Definitions::default()
        };
        let t = &defs.compile().templates[0];
        assert_eq!(t.title().cycle_len(), 10);
        assert_eq!(t.title_at(4), "one");
        assert_eq!(t.title_at(5), "two");
    }

    #[test]
    fn first_duplicate_wins() {
        let defs = Definitions {
            templates: vec![lobby(), TemplateDef::new("LOBBY").title(FrameDef::text("other"))],
            ..Definitions::default()
        };
        let compiled = defs.compile();
        assert_eq!(compiled.templates.len(), 1);
        assert_eq!(compiled.templates[0].title_at(0), "Welcome");
        assert_eq!(
            compiled.issues,
            vec![LoadIssue::skipped(DefinitionError::DuplicateTemplate(
                TemplateName::new("lobby")
            ))]
        );
    }

    #[test]
    fn zero_duration_is_coerced_and_reported() {
        let defs = Definitions {
            templates: vec![TemplateDef::new("z").title(FrameDef::timed("x", 0))],
            ..Definitions::default()
        };
        let compiled = defs.compile();
        assert_eq!(compiled.templates[0].title().cycle_len(), 1);
        assert_eq!(compiled.issues.len(), 1);
        assert_eq!(compiled.issues[0].resolution, IssueResolution::Coerced);
    }

    #[test]
    fn unknown_condition_skips_template() {
        let defs = Definitions {
            templates: vec![lobby().condition("missing"), TemplateDef::new("other")],
            ..Definitions::default()
        };
        let compiled = defs.compile();
        assert_eq!(compiled.templates.len(), 1);
        assert_eq!(compiled.templates[0].name().as_str(), "other");
        assert!(matches!(
            compiled.issues[0].error,
            DefinitionError::UnknownCondition { .. }
        ));
    }

    #[test]
    fn invalid_patterns_skip_only_their_entry() {
        let defs = Definitions {
            templates: vec![lobby().condition("in_bad")],
            rules: vec![
                RoutingRuleDef::new(LocationMatchDef::Pattern("(".into()), ["lobby"]),
                RoutingRuleDef::new(LocationMatchDef::Exact("hub".into()), ["lobby"]),
            ],
            conditions: vec![ConditionDef {
                id: "in_bad".into(),
                kind: ConditionKindDef::InLocation {
                    location: LocationMatchDef::Pattern("[".into()),
                },
                negate: false,
            }],
            ..Definitions::default()
        };
        let compiled = defs.compile();
        assert_eq!(compiled.rules.len(), 1);
        assert!(compiled.conditions.is_empty());
        // The template depended on the broken condition.
        assert!(compiled.templates.is_empty());
        assert_eq!(compiled.issues.len(), 3);
    }

    #[test]
    fn duplicate_rows_keep_first() {
        let defs = Definitions {
            templates: vec![lobby().row(1, vec![FrameDef::text("again")])],
            ..Definitions::default()
        };
        let compiled = defs.compile();
        assert_eq!(compiled.templates[0].row(1).map(|t| t.value_at(0)), Some("Online: 5"));
        assert_eq!(compiled.issues.len(), 1);
    }
}
