#![forbid(unsafe_code)]

//! Adapting frame text to a backend's limits.
//!
//! Lines are measured in display cells and cut at grapheme boundaries, so an
//! emoji, ZWJ sequence, or combining sequence is never split. A trailing
//! format marker (`§`) whose code was cut off is dropped with it.

use std::borrow::Cow;

use unicode_segmentation::UnicodeSegmentation;
use unicode_width::UnicodeWidthStr;

use crate::capabilities::TextFeatures;

/// Prefix of every legacy format code.
pub const FORMAT_MARKER: char = '§';

/// Replacement for graphemes a single-byte backend cannot show.
pub const REPLACEMENT: char = '?';

/// Display width of `text` in cells.
#[inline]
#[must_use]
pub fn display_width(text: &str) -> usize {
    text.width()
}

/// Truncate text to fit within `max_width` cells.
///
/// Respects grapheme boundaries and never leaves a dangling format marker.
#[must_use]
pub fn truncate_to_width(text: &str, max_width: usize) -> String {
    let mut result = String::new();
    let mut current_width = 0;

    for grapheme in text.graphemes(true) {
        let grapheme_width = grapheme.width();
        if current_width + grapheme_width > max_width {
            break;
        }
        result.push_str(grapheme);
        current_width += grapheme_width;
    }

    if result.ends_with(FORMAT_MARKER) && !ends_with_escaped_marker(&result) {
        result.pop();
    }
    result
}

/// `§§` renders a literal marker, so a trailing pair is not dangling.
fn ends_with_escaped_marker(text: &str) -> bool {
    let trailing = text.chars().rev().take_while(|c| *c == FORMAT_MARKER).count();
    trailing % 2 == 0
}

/// Remove `§x§r§r§g§g§b§b` hexadecimal colour sequences.
#[must_use]
pub fn strip_hex_colors(text: &str) -> Cow<'_, str> {
    if !text.contains("§x") && !text.contains("§X") {
        return Cow::Borrowed(text);
    }

    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;
    while i < chars.len() {
        if is_hex_sequence(&chars[i..]) {
            i += 14;
            continue;
        }
        out.push(chars[i]);
        i += 1;
    }
    Cow::Owned(out)
}

fn is_hex_sequence(chars: &[char]) -> bool {
    if chars.len() < 14 || chars[0] != FORMAT_MARKER || !matches!(chars[1], 'x' | 'X') {
        return false;
    }
    chars[2..14]
        .chunks(2)
        .all(|pair| pair[0] == FORMAT_MARKER && pair[1].is_ascii_hexdigit())
}

/// Replace every non-ASCII grapheme with [`REPLACEMENT`], keeping format markers.
#[must_use]
pub fn replace_multi_byte(text: &str) -> Cow<'_, str> {
    if text.chars().all(|c| c.is_ascii() || c == FORMAT_MARKER) {
        return Cow::Borrowed(text);
    }
    let mut out = String::with_capacity(text.len());
    for grapheme in text.graphemes(true) {
        if grapheme.chars().all(|c| c.is_ascii() || c == FORMAT_MARKER) {
            out.push_str(grapheme);
        } else {
            out.push(REPLACEMENT);
        }
    }
    Cow::Owned(out)
}

/// Adapt one line to a backend: drop unsupported styling, then truncate.
#[must_use]
pub fn adapt_line(text: &str, max_width: usize, features: TextFeatures) -> String {
    let styled = if features.contains(TextFeatures::HEX_COLORS) {
        Cow::Borrowed(text)
    } else {
        strip_hex_colors(text)
    };
    let encoded = if features.contains(TextFeatures::MULTI_BYTE) {
        styled
    } else {
        Cow::Owned(replace_multi_byte(&styled).into_owned())
    };
    if display_width(&encoded) <= max_width {
        return encoded.into_owned();
    }
    truncate_to_width(&encoded, max_width)
}
