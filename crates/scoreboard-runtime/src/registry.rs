#![forbid(unsafe_code)]

//! Template registry: the loaded catalog of templates, conditions, and rules.
//!
//! A load compiles [`Definitions`] into a fresh [`Catalog`] and swaps it in
//! atomically. Readers hold an `Arc<Catalog>` for the duration of one
//! resolution, so a reload never tears a resolution in half, and the new
//! catalog starts with an empty routing cache.
//!
//! # Failure Modes
//!
//! | Problem | Behavior |
//! |---------|----------|
//! | Bad definition entry | Skipped, reported in [`LoadReport::issues`], logged at warn |
//! | Rule or override names an unknown template | Treated as non-matching, logged once per generation |

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use rustc_hash::{FxHashMap, FxHashSet};
use scoreboard_core::{Condition, ConditionId, Definitions, LoadIssue, Template, TemplateName};

use crate::routing::{Route, RouteCacheStats, RoutingTable};

// ─────────────────────────────────────────────────────────────────────────────
// Catalog
// ─────────────────────────────────────────────────────────────────────────────

/// One immutable generation of loaded definitions.
#[derive(Debug, Default)]
pub struct Catalog {
    generation: u64,
    templates: FxHashMap<TemplateName, Arc<Template>>,
    order: Vec<TemplateName>,
    conditions: FxHashMap<ConditionId, Condition>,
    routing: RoutingTable,
    reported: Mutex<FxHashSet<TemplateName>>,
}

impl Catalog {
    fn build(generation: u64, definitions: &Definitions) -> (Self, Vec<LoadIssue>) {
        let compiled = definitions.compile();
        let mut templates = FxHashMap::default();
        let mut order = Vec::with_capacity(compiled.templates.len());
        for template in compiled.templates {
            order.push(template.name().clone());
            templates.insert(template.name().clone(), Arc::new(template));
        }
        let conditions = compiled
            .conditions
            .into_iter()
            .map(|c| (c.id().clone(), c))
            .collect();
        let catalog = Self {
            generation,
            templates,
            order,
            conditions,
            routing: RoutingTable::new(compiled.rules),
            reported: Mutex::new(FxHashSet::default()),
        };
        (catalog, compiled.issues)
    }

    /// Load generation; increases by one per load.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// A template by name, without logging.
    #[must_use]
    pub fn template(&self, name: &TemplateName) -> Option<Arc<Template>> {
        self.templates.get(name).cloned()
    }

    /// A template referenced by a rule or override.
    ///
    /// An unknown name is logged at warn the first time it is seen in this
    /// generation.
    pub fn resolve_reference(&self, name: &TemplateName) -> Option<Arc<Template>> {
        let found = self.template(name);
        if found.is_none() {
            let first = self
                .reported
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .insert(name.clone());
            if first {
                tracing::warn!(
                    template = %name,
                    generation = self.generation,
                    "reference to unknown template"
                );
            }
        }
        found
    }

    /// Whether a template with `name` is loaded.
    #[must_use]
    pub fn contains(&self, name: &TemplateName) -> bool {
        self.templates.contains_key(name)
    }

    /// Template names in declaration order.
    #[must_use]
    pub fn template_names(&self) -> &[TemplateName] {
        &self.order
    }

    /// A condition by id.
    #[must_use]
    pub fn condition(&self, id: &ConditionId) -> Option<&Condition> {
        self.conditions.get(id)
    }

    /// Candidate templates for `location`, cached.
    pub fn route_for(&self, location: &str) -> Route {
        self.routing
            .route_for(location, |name| self.resolve_reference(name))
    }

    /// The routing table.
    #[must_use]
    pub fn routing(&self) -> &RoutingTable {
        &self.routing
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// LoadReport
// ─────────────────────────────────────────────────────────────────────────────

/// Summary of one registry load.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Generation of the new catalog.
    pub generation: u64,
    /// Templates loaded.
    pub templates: usize,
    /// Conditions loaded.
    pub conditions: usize,
    /// Routing rules loaded.
    pub rules: usize,
    /// Problems found, in discovery order.
    pub issues: Vec<LoadIssue>,
}

impl LoadReport {
    /// Whether the load found no problems.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Registry
// ─────────────────────────────────────────────────────────────────────────────

/// Holder of the current [`Catalog`].
#[derive(Debug, Default)]
pub struct Registry {
    current: RwLock<Arc<Catalog>>,
    generation: AtomicU64,
}

impl Registry {
    /// An empty registry (generation 0, nothing loaded).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile `definitions` and swap the result in.
    pub fn load(&self, definitions: &Definitions) -> LoadReport {
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let (catalog, issues) = Catalog::build(generation, definitions);

        for issue in &issues {
            tracing::warn!(generation, issue = %issue, "definition problem");
        }

        let report = LoadReport {
            generation,
            templates: catalog.templates.len(),
            conditions: catalog.conditions.len(),
            rules: catalog.routing.rules().len(),
            issues,
        };
        *self.current.write().unwrap_or_else(|e| e.into_inner()) = Arc::new(catalog);

        tracing::info!(
            generation,
            templates = report.templates,
            conditions = report.conditions,
            rules = report.rules,
            issues = report.issues.len(),
            "loaded scoreboard definitions"
        );
        report
    }

    /// The current catalog.
    #[must_use]
    pub fn catalog(&self) -> Arc<Catalog> {
        Arc::clone(&self.current.read().unwrap_or_else(|e| e.into_inner()))
    }

    /// A template by name from the current catalog.
    #[must_use]
    pub fn template(&self, name: &TemplateName) -> Option<Arc<Template>> {
        self.catalog().template(name)
    }

    /// Candidate templates for `location` from the current catalog.
    pub fn route_for(&self, location: &str) -> Route {
        self.catalog().route_for(location)
    }

    /// Drop the current catalog's routing cache.
    pub fn invalidate(&self) {
        self.catalog().routing().invalidate();
    }

    /// Routing cache counters for the current catalog.
    #[must_use]
    pub fn route_stats(&self) -> RouteCacheStats {
        self.catalog().routing().stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scoreboard_core::{FrameDef, LocationMatchDef, RoutingRuleDef, TemplateDef};
    use tracing_test::traced_test;

    fn defs(rules: Vec<RoutingRuleDef>) -> Definitions {
        Definitions {
            templates: vec![
                TemplateDef::new("lobby").title(FrameDef::text("Lobby")),
                TemplateDef::new("arena").title(FrameDef::text("Arena")),
            ],
            rules,
            ..Definitions::default()
        }
    }

    fn names(route: &Route) -> Vec<String> {
        route.iter().map(|t| t.name().to_string()).collect()
    }

    #[test]
    fn load_reports_counts_and_bumps_generation() {
        let registry = Registry::new();
        assert_eq!(registry.catalog().generation(), 0);
        let report = registry.load(&defs(vec![RoutingRuleDef::new(
            LocationMatchDef::Any,
            ["lobby"],
        )]));
        assert!(report.is_clean());
        assert_eq!(report.generation, 1);
        assert_eq!(report.templates, 2);
        assert_eq!(report.rules, 1);
        assert_eq!(registry.load(&Definitions::default()).generation, 2);
    }

    #[test]
    fn reload_replaces_routes() {
        let registry = Registry::new();
        registry.load(&defs(vec![RoutingRuleDef::new(LocationMatchDef::Any, ["lobby"])]));
        assert_eq!(names(&registry.route_for("hub")), ["lobby"]);

        registry.load(&defs(vec![RoutingRuleDef::new(LocationMatchDef::Any, ["arena"])]));
        assert_eq!(names(&registry.route_for("hub")), ["arena"]);
    }

    #[test]
    fn readers_keep_their_generation() {
        let registry = Registry::new();
        registry.load(&defs(Vec::new()));
        let held = registry.catalog();
        registry.load(&Definitions::default());
        assert!(held.contains(&TemplateName::new("lobby")));
        assert!(!registry.catalog().contains(&TemplateName::new("lobby")));
    }

    #[test]
    fn template_names_keep_declaration_order() {
        let registry = Registry::new();
        registry.load(&defs(Vec::new()));
        let catalog = registry.catalog();
        let order: Vec<&str> = catalog.template_names().iter().map(|n| n.as_str()).collect();
        assert_eq!(order, ["lobby", "arena"]);
    }

    #[test]
    #[traced_test]
    fn unknown_template_logged_once_per_generation() {
        let registry = Registry::new();
        let definitions = defs(vec![RoutingRuleDef::new(LocationMatchDef::Any, ["ghost", "lobby"])]);
        registry.load(&definitions);

        assert_eq!(names(&registry.route_for("a")), ["lobby"]);
        assert_eq!(names(&registry.route_for("b")), ["lobby"]);
        registry.catalog().resolve_reference(&TemplateName::new("ghost"));

        logs_assert(|lines: &[&str]| {
            match lines
                .iter()
                .filter(|l| l.contains("reference to unknown template"))
                .count()
            {
                1 => Ok(()),
                n => Err(format!("expected one warning, saw {n}")),
            }
        });

        registry.load(&definitions);
        registry.route_for("a");
        logs_assert(|lines: &[&str]| {
            match lines
                .iter()
                .filter(|l| l.contains("reference to unknown template"))
                .count()
            {
                2 => Ok(()),
                n => Err(format!("expected two warnings, saw {n}")),
            }
        });
    }

    #[test]
    #[traced_test]
    fn load_issues_are_logged() {
        let registry = Registry::new();
        let report = registry.load(&Definitions {
            templates: vec![TemplateDef::new("a"), TemplateDef::new("A")],
            ..Definitions::default()
        });
        assert_eq!(report.issues.len(), 1);
        assert!(logs_contain("duplicate template"));
    }
}
