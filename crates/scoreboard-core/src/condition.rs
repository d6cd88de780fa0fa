#![forbid(unsafe_code)]

//! Named boolean predicates over a viewer.
//!
//! Conditions are declared once and referenced by id from templates. A
//! template reachable only under conditions is selected for a viewer when
//! every one of them evaluates true.
//!
//! Evaluation is a pure query: the viewer's permissions, location, and
//! placeholder values are read through a [`ConditionContext`] supplied by
//! the caller, and nothing is mutated.

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use crate::routing::LocationPredicate;

/// Case-insensitive condition identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConditionId(Arc<str>);

impl ConditionId {
    /// Normalize `id` (trimmed, lowercased).
    #[must_use]
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(Arc::from(id.as_ref().trim().to_lowercase()))
    }

    /// The normalized id.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ConditionId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl fmt::Display for ConditionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Everything a condition may ask about the viewer being evaluated.
pub trait ConditionContext {
    /// Whether the viewer holds `permission`.
    fn has_permission(&self, permission: &str) -> bool;

    /// The viewer's current location name.
    fn location(&self) -> &str;

    /// Substitute placeholders in `raw` for this viewer.
    ///
    /// Implementations fall back to `raw` when substitution fails.
    fn resolve_text<'a>(&self, raw: &'a str) -> Cow<'a, str>;
}

/// Numeric comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum CompareOp {
    /// `<`
    Less,
    /// `<=`
    LessOrEqual,
    /// `==`
    Equal,
    /// `>=`
    GreaterOrEqual,
    /// `>`
    Greater,
}

impl CompareOp {
    /// Apply the operator.
    #[must_use]
    pub fn apply(self, lhs: f64, rhs: f64) -> bool {
        match self {
            Self::Less => lhs < rhs,
            Self::LessOrEqual => lhs <= rhs,
            Self::Equal => (lhs - rhs).abs() < f64::EPSILON,
            Self::GreaterOrEqual => lhs >= rhs,
            Self::Greater => lhs > rhs,
        }
    }
}

/// What a condition tests.
#[derive(Debug, Clone)]
pub enum ConditionKind {
    /// The viewer holds a permission node.
    HasPermission(String),
    /// The viewer's location satisfies a predicate.
    InLocation(LocationPredicate),
    /// Placeholder-substituted `input` equals `value`.
    TextEquals {
        /// Text with placeholders, substituted per viewer.
        input: String,
        /// Expected value.
        value: String,
        /// Compare ignoring case.
        ignore_case: bool,
    },
    /// Placeholder-substituted `input` parses as a number and compares to `value`.
    NumberCompare {
        /// Text with placeholders, substituted per viewer.
        input: String,
        /// Comparison operator.
        op: CompareOp,
        /// Right-hand side.
        value: f64,
    },
}

/// A named, reusable boolean test.
#[derive(Debug, Clone)]
pub struct Condition {
    id: ConditionId,
    kind: ConditionKind,
    negate: bool,
}

impl Condition {
    /// Create a condition.
    #[must_use]
    pub fn new(id: ConditionId, kind: ConditionKind) -> Self {
        Self {
            id,
            kind,
            negate: false,
        }
    }

    /// Invert the result (builder).
    #[must_use]
    pub fn negated(mut self, negate: bool) -> Self {
        self.negate = negate;
        self
    }

    /// Identifier.
    #[must_use]
    pub fn id(&self) -> &ConditionId {
        &self.id
    }

    /// The test.
    #[must_use]
    pub fn kind(&self) -> &ConditionKind {
        &self.kind
    }

    /// Whether the result is inverted.
    #[must_use]
    pub fn is_negated(&self) -> bool {
        self.negate
    }

    /// Evaluate against a viewer.
    ///
    /// A numeric comparison whose input does not parse evaluates false
    /// before negation.
    #[must_use]
    pub fn evaluate(&self, ctx: &dyn ConditionContext) -> bool {
        let raw = match &self.kind {
            ConditionKind::HasPermission(node) => ctx.has_permission(node),
            ConditionKind::InLocation(predicate) => predicate.matches(ctx.location()),
            ConditionKind::TextEquals {
                input,
                value,
                ignore_case,
            } => {
                let resolved = ctx.resolve_text(input);
                if *ignore_case {
                    resolved.to_lowercase() == value.to_lowercase()
                } else {
                    resolved == value.as_str()
                }
            }
            ConditionKind::NumberCompare { input, op, value } => ctx
                .resolve_text(input)
                .trim()
                .parse::<f64>()
                .is_ok_and(|lhs| op.apply(lhs, *value)),
        };
        raw != self.negate
    }
}
