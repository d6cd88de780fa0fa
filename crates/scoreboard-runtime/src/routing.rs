#![forbid(unsafe_code)]

//! Location routing with a per-location cache.
//!
//! Rules are tried in declaration order; the first whose predicate matches
//! supplies the whole candidate list for that location. The result is
//! cached under the exact location name until the table is invalidated.
//!
//! # Invariants
//!
//! 1. **At most one scan per location**: after the first lookup, a location
//!    is served from the cache until [`RoutingTable::invalidate`].
//! 2. **No divergence**: two threads racing on the first lookup of a
//!    location may both compute the route, but only the first insert is
//!    kept and both callers return it. The computation is pure, so the
//!    discarded copy was identical anyway.
//! 3. **Unknown names**: candidates naming no loaded template are dropped
//!    from the route.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use rustc_hash::FxHashMap;
use scoreboard_core::{RoutingRule, Template, TemplateName};

/// Templates routed to one location, in priority order.
pub type Route = Arc<[Arc<Template>]>;

/// Cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouteCacheStats {
    /// Lookups served from the cache.
    pub hits: u64,
    /// Lookups that scanned the rules.
    pub misses: u64,
    /// Cached locations.
    pub entries: usize,
}

/// Ordered routing rules plus the per-location cache.
#[derive(Debug, Default)]
pub struct RoutingTable {
    rules: Vec<RoutingRule>,
    cache: RwLock<FxHashMap<String, Route>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl RoutingTable {
    /// Create a table from rules in declaration order.
    #[must_use]
    pub fn new(rules: Vec<RoutingRule>) -> Self {
        Self {
            rules,
            ..Self::default()
        }
    }

    /// The rules.
    #[must_use]
    pub fn rules(&self) -> &[RoutingRule] {
        &self.rules
    }

    /// Candidate templates for `location`.
    ///
    /// `lookup` maps a candidate name to its template; it is only called on
    /// a cache miss.
    pub fn route_for<F>(&self, location: &str, lookup: F) -> Route
    where
        F: Fn(&TemplateName) -> Option<Arc<Template>>,
    {
        if let Some(route) = self
            .cache
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(location)
        {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Arc::clone(route);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let computed = self.compute(location, lookup);

        let mut cache = self.cache.write().unwrap_or_else(|e| e.into_inner());
        Arc::clone(cache.entry(location.to_string()).or_insert(computed))
    }

    fn compute<F>(&self, location: &str, lookup: F) -> Route
    where
        F: Fn(&TemplateName) -> Option<Arc<Template>>,
    {
        let Some(rule) = self.rules.iter().find(|rule| rule.matches(location)) else {
            tracing::trace!(location, "no routing rule matches");
            return Arc::from(Vec::new());
        };
        rule.candidates().iter().filter_map(&lookup).collect()
    }

    /// Drop every cached route.
    pub fn invalidate(&self) {
        let mut cache = self.cache.write().unwrap_or_else(|e| e.into_inner());
        let dropped = cache.len();
        cache.clear();
        tracing::debug!(dropped, "routing cache invalidated");
    }

    /// Cache counters.
    #[must_use]
    pub fn stats(&self) -> RouteCacheStats {
        RouteCacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.cache.read().unwrap_or_else(|e| e.into_inner()).len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scoreboard_core::{LocationPredicate, Track};
    use std::sync::Barrier;
    use std::thread;

    fn template(name: &str) -> Arc<Template> {
        Arc::new(Template::new(TemplateName::new(name), Track::constant(name)))
    }

    fn names(route: &Route) -> Vec<&str> {
        route.iter().map(|t| t.name().as_str()).collect()
    }

    fn catalog() -> FxHashMap<TemplateName, Arc<Template>> {
        ["nether", "vip", "default"]
            .into_iter()
            .map(|n| (TemplateName::new(n), template(n)))
            .collect()
    }

    fn table() -> RoutingTable {
        RoutingTable::new(vec![
            RoutingRule::new(
                LocationPredicate::pattern("world_.*").unwrap(),
                vec!["vip".into(), "nether".into()],
            ),
            RoutingRule::new(LocationPredicate::exact("world_nether"), vec!["default".into()]),
            RoutingRule::new(LocationPredicate::Any, vec!["default".into()]),
        ])
    }

    #[test]
    fn first_matching_rule_wins_without_fallthrough() {
        let templates = catalog();
        let table = table();
        let route = table.route_for("world_nether", |n| templates.get(n).cloned());
        assert_eq!(names(&route), ["vip", "nether"]);
        let route = table.route_for("lobby", |n| templates.get(n).cloned());
        assert_eq!(names(&route), ["default"]);
    }

    #[test]
    fn cache_serves_repeat_lookups() {
        let templates = catalog();
        let table = table();
        for _ in 0..5 {
            table.route_for("lobby", |n| templates.get(n).cloned());
        }
        let stats = table.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 4);
        assert_eq!(stats.entries, 1);
    }

    #[test]
    fn order_independent_for_locations_sharing_a_rule() {
        let templates = catalog();
        let a = table();
        let b = table();
        let a1 = a.route_for("world_end", |n| templates.get(n).cloned());
        let a2 = a.route_for("world_nether", |n| templates.get(n).cloned());
        let b2 = b.route_for("world_nether", |n| templates.get(n).cloned());
        let b1 = b.route_for("world_end", |n| templates.get(n).cloned());
        assert_eq!(names(&a1), names(&b1));
        assert_eq!(names(&a2), names(&b2));
        assert_eq!(names(&a1), names(&a2));
    }

    #[test]
    fn unknown_candidates_are_dropped() {
        let templates = catalog();
        let table = RoutingTable::new(vec![RoutingRule::new(
            LocationPredicate::Any,
            vec!["ghost".into(), "default".into()],
        )]);
        let route = table.route_for("anywhere", |n| templates.get(n).cloned());
        assert_eq!(names(&route), ["default"]);
    }

    #[test]
    fn no_rule_means_empty_route() {
        let table = RoutingTable::new(vec![RoutingRule::new(
            LocationPredicate::exact("lobby"),
            vec!["default".into()],
        )]);
        assert!(table.route_for("arena", |_| None).is_empty());
    }

    #[test]
    fn invalidate_forces_recompute() {
        let templates = catalog();
        let table = table();
        table.route_for("lobby", |n| templates.get(n).cloned());
        table.invalidate();
        assert_eq!(table.stats().entries, 0);
        table.route_for("lobby", |n| templates.get(n).cloned());
        assert_eq!(table.stats().misses, 2);
    }

    #[test]
    fn concurrent_first_access_converges() {
        let templates = Arc::new(catalog());
        let table = Arc::new(table());
        let barrier = Arc::new(Barrier::new(8));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let templates = Arc::clone(&templates);
                let table = Arc::clone(&table);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    table.route_for("world_end", |n| templates.get(n).cloned())
                })
            })
            .collect();
        let routes: Vec<Route> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for route in &routes[1..] {
            assert!(Arc::ptr_eq(route, &routes[0]));
        }
        assert_eq!(table.stats().entries, 1);
    }
}
