#![forbid(unsafe_code)]

//! Tick-quantized text animation.
//!
//! A [`Track`] is an ordered list of [`Frame`]s, each shown for a whole
//! number of scheduler ticks. The track is a pure function of a global
//! clock: every viewer looking at the same track at the same tick sees the
//! same frame, with no per-viewer animation state.
//!
//! # Invariants
//!
//! 1. **Positive durations**: every frame lasts at least one tick. A zero
//!    duration is coerced to one at construction.
//! 2. **Periodicity**: `value_at(t) == value_at(t + k * cycle_len())` for all
//!    `k >= 0`.
//! 3. **Empty fallback**: a track without frames yields `""` forever.
//!
//! # Example
//!
//! ```
//! use scoreboard_core::animation::{Frame, Track};
//!
//! let title = Track::new(vec![Frame::new("Welcome", 40), Frame::new("Enjoy!", 20)]);
//! assert_eq!(title.value_at(0), "Welcome");
//! assert_eq!(title.value_at(45), "Enjoy!");
//! assert_eq!(title.value_at(60), "Welcome");
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

/// Scheduler tick counter.
pub type Tick = u64;

// ---------------------------------------------------------------------------
// Frame
// ---------------------------------------------------------------------------

/// One animation step: a text shown for `duration` ticks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    text: String,
    duration: u32,
}

impl Frame {
    /// Create a frame. A zero duration is coerced to one tick.
    pub fn new(text: impl Into<String>, duration: u32) -> Self {
        Self {
            text: text.into(),
            duration: duration.max(1),
        }
    }

    /// Raw frame text (before placeholder substitution).
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Number of ticks this frame stays visible.
    #[must_use]
    pub fn duration(&self) -> u32 {
        self.duration
    }
}

// ---------------------------------------------------------------------------
// Track
// ---------------------------------------------------------------------------

/// An immutable, cyclic sequence of frames.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Track {
    frames: Vec<Frame>,
    /// `ends[i]` is the tick (within one cycle) at which frame `i` stops
    /// being visible. Strictly increasing.
    ends: Vec<Tick>,
}

impl Track {
    /// Build a track from frames.
    pub fn new(frames: Vec<Frame>) -> Self {
        let mut ends = Vec::with_capacity(frames.len());
        let mut acc: Tick = 0;
        for frame in &frames {
            acc += Tick::from(frame.duration);
            ends.push(acc);
        }
        Self { frames, ends }
    }

    /// A track without frames.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// A single frame that never changes.
    pub fn constant(text: impl Into<String>) -> Self {
        Self::new(vec![Frame::new(text, 1)])
    }

    /// Total length of one cycle in ticks (0 for an empty track).
    #[must_use]
    pub fn cycle_len(&self) -> Tick {
        self.ends.last().copied().unwrap_or(0)
    }

    /// Number of frames.
    #[must_use]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Whether the track has no frames.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// The frames in declaration order.
    #[must_use]
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// Index of the frame visible at `clock`, or `None` for an empty track.
    ///
    /// Durations weight the selection: the clock is reduced modulo the cycle
    /// length and walked against cumulative frame ends.
    #[must_use]
    pub fn index_at(&self, clock: Tick) -> Option<usize> {
        let cycle = self.cycle_len();
        if cycle == 0 {
            return None;
        }
        let t = clock % cycle;
        Some(self.ends.partition_point(|&end| end <= t))
    }

    /// Raw text visible at `clock`.
    #[must_use]
    pub fn value_at(&self, clock: Tick) -> &str {
        self.index_at(clock)
            .map_or("", |index| self.frames[index].text())
    }
}

impl FromIterator<Frame> for Track {
    fn from_iter<I: IntoIterator<Item = Frame>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

// ---------------------------------------------------------------------------
// AnimationClock
// ---------------------------------------------------------------------------

/// Global, monotonically increasing animation clock.
///
/// Shared by every viewer so that panels showing the same template stay in
/// lockstep. Safe to read from any thread; only the scheduler advances it.
#[derive(Debug, Default)]
pub struct AnimationClock {
    ticks: AtomicU64,
}

impl AnimationClock {
    /// A clock starting at tick zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A clock starting at `tick`.
    #[must_use]
    pub fn starting_at(tick: Tick) -> Self {
        Self {
            ticks: AtomicU64::new(tick),
        }
    }

    /// Current tick.
    #[must_use]
    pub fn now(&self) -> Tick {
        self.ticks.load(Ordering::Acquire)
    }

    /// Advance by one tick and return the new value.
    pub fn advance(&self) -> Tick {
        self.ticks.fetch_add(1, Ordering::AcqRel).wrapping_add(1)
    }
}
