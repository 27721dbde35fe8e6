//! Text utilities for line-oriented source handling.
//!
//! All functions here treat text as a sequence of `\n`-separated lines:
//!
//! - Lines are **1-indexed** (matching editor conventions)
//! - Columns are **0-indexed** and count characters, not bytes
//! - A trailing `\n` produces a final empty line
//!
//! These conventions match [`Pos`] and keep line arithmetic exact when
//! splitting source into spans and joining it back together.

use crate::pos::Pos;

// ============================================================================
// Line Measurement
// ============================================================================

/// Count the lines of a text block.
///
/// A block has one more line than it has newlines, so the empty string is
/// one (empty) line and `"a\n"` is two lines.
pub fn line_count(text: &str) -> u32 {
    text.split('\n').count() as u32
}

/// Count the leading indentation characters of a line.
///
/// Spaces and tabs each count as one. No tab expansion is performed; the
/// result is a character count, not a display width.
pub fn measure_indent(line: &str) -> u32 {
    line.chars().take_while(|&c| c == ' ' || c == '\t').count() as u32
}

/// The position just past the last character of a text block.
///
/// Positions are relative to the block itself: line 1 is the block's first
/// line. For the empty string this is `(1, 0)`.
pub fn end_of_block(text: &str) -> Pos {
    let line = line_count(text);
    let col = text
        .split('\n')
        .next_back()
        .map(|last| last.chars().count() as u32)
        .unwrap_or(0);
    Pos::new(line, col)
}

// ============================================================================
// Slicing
// ============================================================================

/// Extract the text between two positions.
///
/// The range is half-open: `start` is included, `end` is not. Columns are
/// character offsets, so multi-byte characters are handled correctly.
/// Out-of-range positions are clamped to the text; an inverted range yields
/// the empty string.
///
/// An `end` of `(line, 0)` includes the newline that terminates the
/// previous line.
pub fn slice_lines(text: &str, start: Pos, end: Pos) -> String {
    if end <= start {
        return String::new();
    }
    let mut out = String::new();
    for (idx, line) in text.split('\n').enumerate() {
        let line_no = idx as u32 + 1;
        if line_no < start.line {
            continue;
        }
        if line_no > end.line {
            break;
        }
        if line_no > start.line {
            out.push('\n');
        }
        let from = if line_no == start.line {
            start.col as usize
        } else {
            0
        };
        let take = if line_no == end.line {
            (end.col as usize).saturating_sub(from)
        } else {
            usize::MAX
        };
        out.extend(line.chars().skip(from).take(take));
    }
    out
}

// ============================================================================
// Tests
// ============================================================================
