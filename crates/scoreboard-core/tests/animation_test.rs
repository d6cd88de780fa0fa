//! Integration tests for tracks, templates, and text adaptation.
//!
//! Properties:
//! 1. Periodicity: `value_at(t) == value_at(t + k * cycle_len())`.
//! 2. Every tick in a cycle maps to a frame; frame `i` is visible for exactly
//!    `duration(i)` ticks per cycle.
//! 3. Adapted text never exceeds the width limit.
//! 4. Rendering never yields more rows than the backend allows.

use scoreboard_core::animation::{Frame, Track};
use scoreboard_core::capabilities::{BackendCapabilities, TextFeatures};
use scoreboard_core::identity::TemplateName;
use scoreboard_core::template::Template;
use scoreboard_core::text::{adapt_line, display_width};
use proptest::prelude::*;

// ── Strategies ────────────────────────────────────────────────────────────

fn frames_strategy() -> impl Strategy<Value = Vec<(String, u32)>> {
    proptest::collection::vec(("[a-z]{1,6}", 0u32..=50), 1..=8)
}

fn track_from(frames: &[(String, u32)]) -> Track {
    frames
        .iter()
        .map(|(text, duration)| Frame::new(text.clone(), *duration))
        .collect()
}

// ── Scenarios ─────────────────────────────────────────────────────────────

#[test]
fn lobby_title_cycles() {
    let title = Track::new(vec![Frame::new("Welcome", 40), Frame::new("Enjoy!", 20)]);
    let seen: Vec<&str> = [0, 45, 60].iter().map(|t| title.value_at(*t)).collect();
    assert_eq!(seen, ["Welcome", "Enjoy!", "Welcome"]);
}

#[test]
fn template_respects_baseline_row_limit() {
    let caps = BackendCapabilities::baseline();
    let mut template = Template::new(TemplateName::new("tall"), Track::constant("Tall"));
    for index in 0..20 {
        template = template.with_row(index, Track::constant(format!("row {index}")));
    }
    let rows: Vec<_> = template.rows_at(0, caps.max_rows()).collect();
    assert_eq!(rows.len(), caps.max_rows());
    assert_eq!(rows.first().map(|(i, _)| *i), Some(19));
    assert_eq!(rows.last().map(|(i, _)| *i), Some(5));
}

// ── Properties ────────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn track_is_periodic(frames in frames_strategy(), t in 0u64..10_000, k in 0u64..50) {
        let track = track_from(&frames);
        let cycle = track.cycle_len();
        prop_assert!(cycle >= frames.len() as u64);
        prop_assert_eq!(track.value_at(t), track.value_at(t + k * cycle));
    }

    #[test]
    fn frames_visible_for_their_duration(frames in frames_strategy()) {
        let track = track_from(&frames);
        let mut counts = vec![0u64; track.len()];
        for t in 0..track.cycle_len() {
            let index = track.index_at(t);
            prop_assert!(index.is_some());
            if let Some(index) = index {
                counts[index] += 1;
            }
        }
        for (count, frame) in counts.iter().zip(track.frames()) {
            prop_assert_eq!(*count, u64::from(frame.duration()));
        }
    }

    #[test]
    fn adapted_text_fits(text in "[a-zA-Z0-9 §★é日本]{0,64}", width in 0usize..48) {
        for features in [TextFeatures::LEGACY_CODES, TextFeatures::all()] {
            let out = adapt_line(&text, width, features);
            prop_assert!(display_width(&out) <= width, "{:?} -> {:?}", text, out);
        }
    }
}
