//! Splits Python source into top-level chunks for span-by-span parsing.
//!
//! A chunk is a run of lines that can be parsed (and cached) independently:
//! a top-level `def` or `class` with its body and decorators, a top-level
//! flow block together with the lines around it, or a run of plain
//! statements. Boundary rules:
//!
//! - A dedent back to a previously seen indent starts a new chunk, unless it
//!   happens inside an open top-level flow block.
//! - A top-level line starting with `def`, `class`, or `@` starts a new
//!   chunk. Keywords are recognized on word boundaries (`definitely = 1` is
//!   not a `def`), and only at the top level: nested definitions ride inside
//!   their enclosing chunk.
//! - Decorators fuse with the definition they decorate; blank and comment
//!   lines never open a boundary and stay with the current chunk.
//! - Flow clause keywords (`else:`, `except:`) re-open the flow on dedent,
//!   keeping the whole block in one chunk.
//!
//! The split is exact: joining the chunk texts with `\n` reproduces the
//! input byte for byte.

use std::sync::LazyLock;

use regex::Regex;
use scry_core::text::{line_count, measure_indent};

/// Matches a line whose first word is a chunk-relevant keyword.
static HEAD_KEYWORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[ \t]*(def|class|@|if|elif|else|while|for|try|except|finally|with)\b")
        .expect("keyword regex is valid")
});

const FLOW_KEYWORDS: &[&str] = &[
    "if", "elif", "else", "while", "for", "try", "except", "finally", "with",
];

// ============================================================================
// SourceChunk
// ============================================================================

/// One chunk of source, without a trailing newline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceChunk {
    text: String,
}

impl SourceChunk {
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Number of lines the chunk occupies in the document.
    pub fn line_count(&self) -> u32 {
        line_count(&self.text)
    }
}

// ============================================================================
// Splitting
// ============================================================================

/// Split source into chunks at top-level boundaries.
///
/// Every line of the input lands in exactly one chunk; the chunk texts
/// joined with `\n` equal the input. The empty string yields a single empty
/// chunk.
pub fn split_source(source: &str) -> Vec<SourceChunk> {
    let mut chunks: Vec<SourceChunk> = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut flush = |current: &mut Vec<&str>| {
        if !current.is_empty() {
            chunks.push(SourceChunk {
                text: current.join("\n"),
            });
            current.clear();
        }
    };

    let mut current_indent: u32 = 0;
    let mut new_indent = false;
    let mut in_flow = false;
    let mut is_decorator = false;

    for line in source.split('\n') {
        let trimmed = line.trim_start_matches(|c: char| c == ' ' || c == '\t');
        let first = trimmed.chars().next();
        if first.is_none() || first == Some('#') {
            current.push(line);
            continue;
        }

        let indent = measure_indent(line);
        if indent < current_indent {
            current_indent = indent;
            new_indent = false;
            if !in_flow {
                flush(&mut current);
            }
            in_flow = false;
        } else if new_indent {
            // First line after a block header fixes the body indent.
            current_indent = indent;
            new_indent = false;
        }

        if !in_flow && indent == 0 {
            if let Some(keyword) = head_keyword(line) {
                in_flow = FLOW_KEYWORDS.contains(&keyword);
                if !is_decorator && !in_flow {
                    flush(&mut current);
                }
                is_decorator = keyword == "@";
                if !is_decorator {
                    // Expect the body one level deeper; the next body line
                    // adjusts this to the real indent.
                    current_indent += 1;
                    new_indent = true;
                }
            }
        }
        current.push(line);
    }
    flush(&mut current);
    chunks
}

fn head_keyword(line: &str) -> Option<&str> {
    HEAD_KEYWORD
        .captures(line)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

// ============================================================================
// Tests
// ============================================================================
