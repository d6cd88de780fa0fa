//! Property-based invariant tests for viewer requests and the panels they
//! produce.
//!
//! Viewer record (1–4):
//! 1. Hidden/disabled equal non-emptiness of the requester sets.
//! 2. `changed` is reported exactly when the aggregate flips.
//! 3. The effective override is the most recent one still set.
//! 4. `retain_only` keeps exactly one requester's requests.
//!
//! Engine (5–7):
//! 5. A disabled online viewer never has a panel.
//! 6. A hidden, enabled viewer has a blank panel.
//! 7. Otherwise the panel shows the effective override, else the routed template.

use std::collections::BTreeSet;
use std::sync::Arc;

use proptest::prelude::*;
use scoreboard_core::{
    BackendCapabilities, Definitions, FrameDef, LocationMatchDef, RequesterId, RoutingRuleDef,
    TemplateDef, TemplateName, ViewerId,
};
use scoreboard_runtime::{
    MemoryBackend, PanelContext, RenderBackend, StaticPopulation, ViewerRecord,
};

// ── Strategies ────────────────────────────────────────────────────────────

const REQUESTERS: [&str; 3] = ["a", "b", "c"];
const TEMPLATES: [&str; 3] = ["alpha", "beta", "gone"];

#[derive(Debug, Clone)]
enum Op {
    Hide(usize, bool),
    Disable(usize, bool),
    ToggleHide(usize),
    ToggleDisable(usize),
    Override(usize, Option<usize>),
    ClearOverride(usize),
    Tick,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    let who = 0..REQUESTERS.len();
    prop_oneof![
        (who.clone(), any::<bool>()).prop_map(|(r, on)| Op::Hide(r, on)),
        (who.clone(), any::<bool>()).prop_map(|(r, on)| Op::Disable(r, on)),
        who.clone().prop_map(Op::ToggleHide),
        who.clone().prop_map(Op::ToggleDisable),
        (who.clone(), proptest::option::of(0..TEMPLATES.len()))
            .prop_map(|(r, t)| Op::Override(r, t)),
        who.prop_map(Op::ClearOverride),
        Just(Op::Tick),
    ]
}

// ── Reference model ───────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct Model {
    hidden: BTreeSet<usize>,
    disabled: BTreeSet<usize>,
    overrides: Vec<(usize, Option<usize>)>,
}

impl Model {
    fn flag(set: &mut BTreeSet<usize>, who: usize, on: bool) -> bool {
        let before = !set.is_empty();
        if on {
            set.insert(who);
        } else {
            set.remove(&who);
        }
        before != !set.is_empty()
    }

    fn target(&self) -> Option<Option<usize>> {
        self.overrides.last().map(|(_, t)| *t)
    }

    fn set_override(&mut self, who: usize, target: Option<usize>) -> bool {
        let before = self.target();
        self.overrides.retain(|(r, _)| *r != who);
        self.overrides.push((who, target));
        before != self.target()
    }

    fn clear_override(&mut self, who: usize) -> bool {
        let before = self.target();
        self.overrides.retain(|(r, _)| *r != who);
        before != self.target()
    }

    /// Title the panel should show, `None` for blank.
    fn expected_title(&self) -> Option<&'static str> {
        if !self.hidden.is_empty() {
            return None;
        }
        match self.target() {
            Some(Some(0)) => Some("Alpha"),
            Some(Some(1)) => Some("Beta"),
            Some(_) => None,
            None => Some("Alpha"),
        }
    }
}

fn req(i: usize) -> RequesterId {
    RequesterId::new(REQUESTERS[i])
}

fn template(i: usize) -> TemplateName {
    TemplateName::new(TEMPLATES[i])
}

/// Apply `op` to both sides and return the engine's and the model's `changed`.
fn apply_record(record: &mut ViewerRecord, model: &mut Model, op: &Op) -> Option<(bool, bool)> {
    Some(match *op {
        Op::Hide(r, on) => (
            record.set_hidden(&req(r), on).changed,
            Model::flag(&mut model.hidden, r, on),
        ),
        Op::Disable(r, on) => (
            record.set_disabled(&req(r), on).changed,
            Model::flag(&mut model.disabled, r, on),
        ),
        Op::ToggleHide(r) => {
            let on = !model.hidden.contains(&r);
            (
                record.toggle_hidden(&req(r)).changed,
                Model::flag(&mut model.hidden, r, on),
            )
        }
        Op::ToggleDisable(r) => {
            let on = !model.disabled.contains(&r);
            (
                record.toggle_disabled(&req(r)).changed,
                Model::flag(&mut model.disabled, r, on),
            )
        }
        Op::Override(r, t) => (
            record.set_override(&req(r), t.map(template)),
            model.set_override(r, t),
        ),
        Op::ClearOverride(r) => (record.clear_override(&req(r)), model.clear_override(r)),
        Op::Tick => return None,
    })
}

fn definitions() -> Definitions {
    Definitions {
        templates: vec![
            TemplateDef::new("alpha").title(FrameDef::text("Alpha")),
            TemplateDef::new("beta").title(FrameDef::text("Beta")),
        ],
        rules: vec![RoutingRuleDef::new(LocationMatchDef::Any, ["alpha"])],
        ..Definitions::default()
    }
}

// ── Properties ────────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn record_matches_model(ops in proptest::collection::vec(op_strategy(), 0..64)) {
        let mut record = ViewerRecord::new();
        let mut model = Model::default();
        for op in &ops {
            if let Some((got, want)) = apply_record(&mut record, &mut model, op) {
                prop_assert_eq!(got, want, "changed mismatch after {:?}", op);
            }
            prop_assert_eq!(record.is_hidden(), !model.hidden.is_empty());
            prop_assert_eq!(record.is_disabled(), !model.disabled.is_empty());
            let effective = record
                .effective_override()
                .map(|(_, t)| t.map(|name| name.as_str().to_string()));
            let expected = model
                .target()
                .map(|t| t.map(|i| TEMPLATES[i].to_string()));
            prop_assert_eq!(effective, expected);
        }
    }

    #[test]
    fn retain_only_keeps_one_requester(
        ops in proptest::collection::vec(op_strategy(), 0..64),
        keep in 0..REQUESTERS.len(),
    ) {
        let mut record = ViewerRecord::new();
        let mut model = Model::default();
        for op in &ops {
            apply_record(&mut record, &mut model, op);
        }
        record.retain_only(&req(keep));
        prop_assert_eq!(record.is_hidden(), model.hidden.contains(&keep));
        prop_assert_eq!(record.is_disabled(), model.disabled.contains(&keep));
        prop_assert!(record.overrides().all(|(r, _)| *r == req(keep)));
    }

    #[test]
    fn panel_follows_requests(ops in proptest::collection::vec(op_strategy(), 0..48)) {
        let viewer = ViewerId::from_u128(42);
        let backend = Arc::new(MemoryBackend::new(BackendCapabilities::baseline()));
        let population = Arc::new(StaticPopulation::new());
        let ctx = PanelContext::builder(backend.clone(), population.clone())
            .definitions(definitions())
            .build();
        population.join(viewer, "anywhere");
        ctx.viewer_joined(viewer);

        let mut mirror = ViewerRecord::new();
        let mut model = Model::default();
        for op in &ops {
            match *op {
                Op::Hide(r, on) => { ctx.set_hidden(&req(r), viewer, on); }
                Op::Disable(r, on) => { ctx.set_disabled(&req(r), viewer, on); }
                Op::ToggleHide(r) => { ctx.toggle_hidden(&req(r), viewer); }
                Op::ToggleDisable(r) => { ctx.toggle_disabled(&req(r), viewer); }
                Op::Override(r, t) => { ctx.set_override(&req(r), viewer, t.map(template)); }
                Op::ClearOverride(r) => { ctx.clear_override(&req(r), viewer); }
                Op::Tick => { ctx.tick(); }
            }
            apply_record(&mut mirror, &mut model, op);

            if !model.disabled.is_empty() {
                prop_assert!(!backend.has_panel(viewer), "panel while disabled after {:?}", op);
                continue;
            }
            prop_assert!(backend.has_panel(viewer), "no panel after {:?}", op);
            let shown = backend.displayed(viewer).map(|f| f.title().to_string());
            prop_assert_eq!(shown.as_deref(), model.expected_title(), "after {:?}", op);
        }
    }
}
