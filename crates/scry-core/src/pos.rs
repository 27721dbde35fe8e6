//! Source positions.
//!
//! Positions are line/column pairs: lines are 1-indexed (editors, diagnostics,
//! and tracebacks all count lines from 1), columns are 0-indexed character
//! offsets within the line. Ordering is line-major: compare lines first,
//! columns break ties.

use std::fmt;

use serde::{Deserialize, Serialize};

// ============================================================================
// Pos
// ============================================================================

/// A position in source text.
///
/// `line` is 1-indexed; `col` is a 0-indexed character offset (characters,
/// not bytes). The derived ordering is line-major, which matches source
/// order for positions within one document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Pos {
    /// 1-indexed line number.
    pub line: u32,
    /// 0-indexed character offset within the line.
    pub col: u32,
}

impl Pos {
    /// The first position of any module: line 1, column 0.
    pub const MODULE_START: Pos = Pos { line: 1, col: 0 };

    pub fn new(line: u32, col: u32) -> Self {
        Pos { line, col }
    }

    /// Returns this position shifted down by `lines` lines.
    ///
    /// The column is unchanged. Used to convert tree-relative positions to
    /// absolute document positions in O(1).
    pub fn shift_lines(self, lines: u32) -> Self {
        Pos {
            line: self.line + lines,
            col: self.col,
        }
    }
}

impl fmt::Display for Pos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.line, self.col)
    }
}

// ============================================================================
// Tests
// ============================================================================
