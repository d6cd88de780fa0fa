#![forbid(unsafe_code)]

//! Rendering backend capability model.
//!
//! Backends differ in how long a row may be, how many rows fit on the
//! panel, and which text styling they can carry. The engine never assumes a
//! specific limit: it reads a [`BackendCapabilities`] from the backend and
//! adapts every line before pushing it (see [`crate::text`]).
//!
//! # Predefined Profiles
//!
//! | Profile | Row length | Title length | Rows | Text features |
//! |---------|-----------:|-------------:|-----:|---------------|
//! | `baseline()` | 40 | 32 | 15 | legacy codes |
//! | `rich()` | 128 | 128 | 15 | legacy codes, hex colours, multi-byte |
//!
//! # Decision Rule
//!
//! The backend is chosen once at startup:
//!
//! ```text
//! IF force_legacy THEN baseline
//! ELSE IF rich backend available THEN rich
//! ELSE baseline
//! ```
//!
//! # Example
//!
//! ```
//! use scoreboard_core::capabilities::{BackendCapabilities, TextFeatures};
//!
//! let custom = BackendCapabilities::builder()
//!     .max_row_text_length(24)
//!     .features(TextFeatures::LEGACY_CODES | TextFeatures::MULTI_BYTE)
//!     .build();
//! assert_eq!(custom.max_row_text_length(), 24);
//! assert!(!custom.supports(TextFeatures::HEX_COLORS));
//! ```

use bitflags::bitflags;

bitflags! {
    /// Styling a backend can render.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TextFeatures: u8 {
        /// `§`-prefixed legacy colour and format codes.
        const LEGACY_CODES = 1 << 0;
        /// `§x§r§r§g§g§b§b` hexadecimal colour sequences.
        const HEX_COLORS = 1 << 1;
        /// Characters outside ASCII.
        const MULTI_BYTE = 1 << 2;
    }
}

/// Known backend profile identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendProfile {
    /// Baseline backend available on every host.
    Baseline,
    /// Richer packet-level backend.
    Rich,
    /// Custom profile built with [`CapabilityProfileBuilder`].
    Custom,
}

impl BackendProfile {
    /// Get the profile name as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Baseline => "baseline",
            Self::Rich => "rich",
            Self::Custom => "custom",
        }
    }

    /// Pick the profile to run with.
    #[must_use]
    pub const fn select(rich_available: bool, force_legacy: bool) -> Self {
        if !force_legacy && rich_available {
            Self::Rich
        } else {
            Self::Baseline
        }
    }
}

impl std::fmt::Display for BackendProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a rendering backend can display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendCapabilities {
    profile: BackendProfile,
    max_row_text_length: usize,
    max_title_length: usize,
    max_rows: usize,
    features: TextFeatures,
}

impl Default for BackendCapabilities {
    fn default() -> Self {
        Self::baseline()
    }
}

impl BackendCapabilities {
    /// Baseline profile: short rows, legacy formatting only.
    #[must_use]
    pub const fn baseline() -> Self {
        Self {
            profile: BackendProfile::Baseline,
            max_row_text_length: 40,
            max_title_length: 32,
            max_rows: 15,
            features: TextFeatures::LEGACY_CODES,
        }
    }

    /// Rich profile: long rows, hex colours, multi-byte text.
    #[must_use]
    pub const fn rich() -> Self {
        Self {
            profile: BackendProfile::Rich,
            max_row_text_length: 128,
            max_title_length: 128,
            max_rows: 15,
            features: TextFeatures::all(),
        }
    }

    /// Capabilities of a predefined profile. `Custom` maps to baseline.
    #[must_use]
    pub const fn from_profile(profile: BackendProfile) -> Self {
        match profile {
            BackendProfile::Rich => Self::rich(),
            BackendProfile::Baseline | BackendProfile::Custom => Self::baseline(),
        }
    }

    /// Create a builder for custom profiles, starting from baseline limits.
    #[must_use]
    pub fn builder() -> CapabilityProfileBuilder {
        CapabilityProfileBuilder::new()
    }

    /// Profile identifier.
    #[must_use]
    pub const fn profile(&self) -> BackendProfile {
        self.profile
    }

    /// Maximum display width of one row.
    #[must_use]
    pub const fn max_row_text_length(&self) -> usize {
        self.max_row_text_length
    }

    /// Maximum display width of the title.
    #[must_use]
    pub const fn max_title_length(&self) -> usize {
        self.max_title_length
    }

    /// Maximum number of rows on one panel.
    #[must_use]
    pub const fn max_rows(&self) -> usize {
        self.max_rows
    }

    /// Supported text features.
    #[must_use]
    pub const fn features(&self) -> TextFeatures {
        self.features
    }

    /// Whether every feature in `features` is supported.
    #[must_use]
    pub const fn supports(&self, features: TextFeatures) -> bool {
        self.features.contains(features)
    }
}

/// Builder for custom capability profiles.
#[derive(Debug, Clone)]
pub struct CapabilityProfileBuilder {
    caps: BackendCapabilities,
}

impl Default for CapabilityProfileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CapabilityProfileBuilder {
    /// Start from the baseline limits with the `Custom` profile id.
    #[must_use]
    pub const fn new() -> Self {
        let mut caps = BackendCapabilities::baseline();
        caps.profile = BackendProfile::Custom;
        Self { caps }
    }

    /// Start from an existing profile.
    #[must_use]
    pub const fn from_profile(profile: BackendProfile) -> Self {
        let mut caps = BackendCapabilities::from_profile(profile);
        caps.profile = BackendProfile::Custom;
        Self { caps }
    }

    /// Set the maximum row width.
    #[must_use]
    pub const fn max_row_text_length(mut self, width: usize) -> Self {
        self.caps.max_row_text_length = width;
        self
    }

    /// Set the maximum title width.
    #[must_use]
    pub const fn max_title_length(mut self, width: usize) -> Self {
        self.caps.max_title_length = width;
        self
    }

    /// Set the maximum number of rows.
    #[must_use]
    pub const fn max_rows(mut self, rows: usize) -> Self {
        self.caps.max_rows = rows;
        self
    }

    /// Replace the supported text features.
    #[must_use]
    pub const fn features(mut self, features: TextFeatures) -> Self {
        self.caps.features = features;
        self
    }

    /// Build the final capability set.
    #[must_use]
    pub const fn build(self) -> BackendCapabilities {
        self.caps
    }
}
