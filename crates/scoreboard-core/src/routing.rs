#![forbid(unsafe_code)]

//! Location predicates and routing rules.

use std::fmt;

use regex::{Regex, RegexBuilder};

use crate::definition::DefinitionError;
use crate::identity::TemplateName;

/// A test over a location name.
#[derive(Clone)]
pub enum LocationPredicate {
    /// Matches every location.
    Any,
    /// Case-insensitive exact name.
    Exact(String),
    /// Case-insensitive full match of a regular expression.
    Pattern(Regex),
}

impl LocationPredicate {
    /// Exact, case-insensitive match on `name`.
    pub fn exact(name: impl AsRef<str>) -> Self {
        Self::Exact(name.as_ref().to_lowercase())
    }

    /// Compile a pattern. The whole location name must match.
    pub fn pattern(source: &str) -> Result<Self, DefinitionError> {
        RegexBuilder::new(&format!("^(?:{source})$"))
            .case_insensitive(true)
            .build()
            .map(Self::Pattern)
            .map_err(|e| DefinitionError::InvalidPattern {
                pattern: source.to_string(),
                reason: e.to_string(),
            })
    }

    /// Whether `location` satisfies the predicate.
    #[must_use]
    pub fn matches(&self, location: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Exact(name) => {
                name.eq_ignore_ascii_case(location)
                    || (!location.is_ascii() && *name == location.to_lowercase())
            }
            Self::Pattern(re) => re.is_match(location),
        }
    }
}

impl fmt::Debug for LocationPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("Any"),
            Self::Exact(name) => f.debug_tuple("Exact").field(name).finish(),
            Self::Pattern(re) => f.debug_tuple("Pattern").field(&re.as_str()).finish(),
        }
    }
}

/// A location predicate and the ordered templates it routes to.
#[derive(Debug, Clone)]
pub struct RoutingRule {
    predicate: LocationPredicate,
    candidates: Vec<TemplateName>,
}

impl RoutingRule {
    /// Create a rule.
    #[must_use]
    pub fn new(predicate: LocationPredicate, candidates: Vec<TemplateName>) -> Self {
        Self {
            predicate,
            candidates,
        }
    }

    /// The location test.
    #[must_use]
    pub fn predicate(&self) -> &LocationPredicate {
        &self.predicate
    }

    /// Candidate template names in priority order.
    #[must_use]
    pub fn candidates(&self) -> &[TemplateName] {
        &self.candidates
    }

    /// Whether the rule applies to `location`.
    #[must_use]
    pub fn matches(&self, location: &str) -> bool {
        self.predicate.matches(location)
    }
}
