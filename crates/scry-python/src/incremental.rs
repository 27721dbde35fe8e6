//! Incremental parsing sessions.
//!
//! A [`Document`] owns one evolving source file. Each [`Document::update`]
//! splits the new text into top-level chunks, reuses every previous
//! [`ParseUnit`] whose chunk is byte-identical, and parses only the rest.
//! Reuse is an O(1) line-offset update because trees store span-relative
//! positions. Units that found no match are dropped.
//!
//! A chunk is reusable only once scanning has caught up with the previous
//! unit's end line; chunks consumed as trailing context of an earlier parse
//! are counted as absorbed, not parsed. On a verbatim reuse, any position
//! inside the chunk resolves to the same statement and scope handles a full
//! reparse would produce.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use scry_core::hash::ContentHash;
use scry_core::pos::Pos;
use thiserror::Error;
use tracing::{debug, trace};

use crate::chunker::split_source;
use crate::module::{ModuleView, ParseUnit};
use crate::tree::{ParseError, ScopeRef, SpanParser, SpanRequest, StatementRef};

// ============================================================================
// Options and Stats
// ============================================================================

/// Session behavior switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseOptions {
    /// Reuse unchanged spans between updates.
    pub incremental: bool,
    /// Drop all cached spans on every update, even in incremental mode.
    pub always_reparse: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        ParseOptions {
            incremental: true,
            always_reparse: false,
        }
    }
}

impl ParseOptions {
    pub fn new() -> Self {
        ParseOptions::default()
    }

    pub fn incremental(mut self, incremental: bool) -> Self {
        self.incremental = incremental;
        self
    }

    pub fn always_reparse(mut self, always_reparse: bool) -> Self {
        self.always_reparse = always_reparse;
        self
    }
}

/// What one update did with the splitter's chunks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateStats {
    /// Chunks the splitter produced.
    pub chunks: usize,
    /// Units reused verbatim from the previous update.
    pub reused: usize,
    /// Chunks parsed fresh.
    pub parsed: usize,
    /// Chunks consumed as trailing context of an earlier parse.
    pub absorbed: usize,
}

// ============================================================================
// SessionError
// ============================================================================

/// Failure to update a document session.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The span parser rejected a chunk.
    #[error(transparent)]
    Parse(#[from] ParseError),
}

pub type SessionResult<T> = Result<T, SessionError>;

// ============================================================================
// Document
// ============================================================================

/// The scope the cursor resolved to across the whole document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserScope {
    /// The cursor sits at the module's top level.
    Module,
    /// The cursor sits inside a class or function.
    Local(ScopeRef),
}

/// One source file's parsing session.
pub struct Document {
    parser: Rc<dyn SpanParser>,
    options: ParseOptions,
    module_path: Option<String>,
    view: ModuleView,
    stats: UpdateStats,
}

impl Document {
    pub fn new(
        parser: Rc<dyn SpanParser>,
        options: ParseOptions,
        module_path: Option<String>,
    ) -> Self {
        Document {
            parser,
            options,
            module_path,
            view: ModuleView::new(),
            stats: UpdateStats::default(),
        }
    }

    /// Re-read the document from `source`, reusing unchanged spans.
    ///
    /// `cursor` re-resolves the per-unit cursor caches; pass `None` when no
    /// position is of interest. On a parser error the view keeps the
    /// successfully rebuilt prefix and the error propagates.
    pub fn update(&mut self, source: &str, cursor: Option<Pos>) -> SessionResult<()> {
        let chunks = split_source(source);
        let mut previous = self.view.take_units();
        if !self.options.incremental || self.options.always_reparse {
            previous.clear();
        }
        // Later duplicates win, so repeated chunk text keeps the last unit.
        let mut by_hash: HashMap<ContentHash, ParseUnit> = HashMap::new();
        for unit in previous {
            by_hash.insert(unit.hash().clone(), unit);
        }

        let mut units: Vec<ParseUnit> = Vec::new();
        let mut stats = UpdateStats {
            chunks: chunks.len(),
            ..UpdateStats::default()
        };
        let mut line_offset = 0u32;
        let mut start = 0usize;

        for chunk in &chunks {
            if units
                .last()
                .is_some_and(|unit| line_offset < unit.end_line())
            {
                // Still inside the last unit's span: this chunk was trailing
                // context of that parse.
                stats.absorbed += 1;
            } else {
                let hash = ContentHash::compute(chunk.text().as_bytes());
                let reusable = by_hash
                    .get(&hash)
                    .is_some_and(|unit| unit.chunk_text() == chunk.text());
                if reusable {
                    let mut unit = by_hash.remove(&hash).expect("hash was just found");
                    unit.set_line_offset(line_offset);
                    unit.resolve_cursor(cursor);
                    trace!("reused span at line {}", line_offset + 1);
                    stats.reused += 1;
                    units.push(unit);
                } else {
                    let request = SpanRequest {
                        source: &source[start..],
                        first_line: line_offset + 1,
                        module_path: self.module_path.as_deref(),
                    };
                    let tree = match self.parser.parse_span(&request) {
                        Ok(tree) => tree,
                        Err(err) => {
                            self.view.replace_units(units);
                            self.stats = stats;
                            return Err(err.into());
                        }
                    };
                    let mut unit =
                        ParseUnit::new(hash, chunk.text().to_string(), Rc::new(tree), line_offset);
                    unit.resolve_cursor(cursor);
                    stats.parsed += 1;
                    units.push(unit);
                }
            }
            line_offset += chunk.line_count();
            start += chunk.text().len() + 1;
        }

        debug!(
            "update: {} chunks, {} reused, {} parsed, {} absorbed",
            stats.chunks, stats.reused, stats.parsed, stats.absorbed
        );
        self.view.replace_units(units);
        self.stats = stats;
        Ok(())
    }

    pub fn view(&self) -> &ModuleView {
        &self.view
    }

    pub fn view_mut(&mut self) -> &mut ModuleView {
        &mut self.view
    }

    /// What the most recent update did.
    pub fn last_stats(&self) -> UpdateStats {
        self.stats
    }

    pub fn options(&self) -> ParseOptions {
        self.options
    }

    pub fn module_path(&self) -> Option<&str> {
        self.module_path.as_deref()
    }

    /// The statement under the cursor of the last update, if any.
    pub fn user_stmt(&self) -> Option<StatementRef> {
        self.view.units().iter().find_map(ParseUnit::cursor_stmt)
    }

    /// The scope under the cursor of the last update.
    ///
    /// A cursor inside a class or function reports that scope; a cursor at
    /// a unit's top level reports the aggregate module.
    pub fn user_scope(&self) -> Option<UserScope> {
        let mut top_level = false;
        for unit in self.view.units() {
            if let Some(scope) = unit.cursor_scope() {
                if scope.is_module() {
                    top_level = true;
                } else {
                    return Some(UserScope::Local(scope));
                }
            }
        }
        top_level.then_some(UserScope::Module)
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("module_path", &self.module_path)
            .field("units", &self.view.units().len())
            .finish()
    }
}

// ============================================================================
// DocumentCache
// ============================================================================

/// Sessions keyed by module path, sharing one parser and one option set.
pub struct DocumentCache {
    parser: Rc<dyn SpanParser>,
    options: ParseOptions,
    documents: HashMap<String, Document>,
}

impl DocumentCache {
    pub fn new(parser: Rc<dyn SpanParser>, options: ParseOptions) -> Self {
        DocumentCache {
            parser,
            options,
            documents: HashMap::new(),
        }
    }

    /// Update the session for `path`, creating it on first sight.
    pub fn update_document(
        &mut self,
        path: &str,
        source: &str,
        cursor: Option<Pos>,
    ) -> SessionResult<()> {
        let document = self.documents.entry(path.to_string()).or_insert_with(|| {
            Document::new(self.parser.clone(), self.options, Some(path.to_string()))
        });
        document.update(source, cursor)
    }

    pub fn document(&self, path: &str) -> Option<&Document> {
        self.documents.get(path)
    }

    pub fn remove(&mut self, path: &str) -> Option<Document> {
        self.documents.remove(path)
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

impl fmt::Debug for DocumentCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentCache")
            .field("documents", &self.documents.len())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::outline::OutlineParser;
    use crate::tree::{ScopeKind, StmtKind, SyntaxTree};

    const SOURCE: &str = "import os\n\ndef alpha(x):\n    return x\n\nBETA = 2\n";

    fn document() -> Document {
        Document::new(
            Rc::new(OutlineParser::new()),
            ParseOptions::default(),
            Some("/srv/pkg/mod.py".to_string()),
        )
    }

    mod updates {
        use super::*;

        #[test]
        fn first_update_parses_every_chunk() {
            let mut doc = document();
            doc.update(SOURCE, None).unwrap();
            assert_eq!(
                doc.last_stats(),
                UpdateStats {
                    chunks: 3,
                    reused: 0,
                    parsed: 3,
                    absorbed: 0,
                }
            );
            assert_eq!(doc.view().units().len(), 3);
            assert_eq!(doc.view().name().unwrap(), "mod");
            assert_eq!(doc.view().code().unwrap(), SOURCE);
        }

        #[test]
        fn identical_update_reuses_every_unit() {
            let mut doc = document();
            doc.update(SOURCE, None).unwrap();
            let before: Vec<Rc<SyntaxTree>> = doc
                .view()
                .units()
                .iter()
                .map(|unit| unit.tree().clone())
                .collect();
            doc.update(SOURCE, None).unwrap();
            assert_eq!(
                doc.last_stats(),
                UpdateStats {
                    chunks: 3,
                    reused: 3,
                    parsed: 0,
                    absorbed: 0,
                }
            );
            for (old, unit) in before.iter().zip(doc.view().units()) {
                assert!(Rc::ptr_eq(old, unit.tree()));
            }
        }

        #[test]
        fn non_incremental_mode_never_reuses() {
            let mut doc = Document::new(
                Rc::new(OutlineParser::new()),
                ParseOptions::new().incremental(false),
                None,
            );
            doc.update(SOURCE, None).unwrap();
            doc.update(SOURCE, None).unwrap();
            assert_eq!(doc.last_stats().reused, 0);
            assert_eq!(doc.last_stats().parsed, 3);
        }

        #[test]
        fn options_builder_round_trips() {
            let options = ParseOptions::new().incremental(false).always_reparse(true);
            assert!(!options.incremental);
            assert!(options.always_reparse);
            assert_eq!(ParseOptions::default(), ParseOptions::new());
        }
    }

    mod cursors {
        use super::*;

        #[test]
        fn cursor_in_a_function_reports_the_local_scope() {
            let mut doc = document();
            doc.update(SOURCE, Some(Pos::new(4, 6))).unwrap();
            let stmt = doc.user_stmt().expect("cursor is on the return");
            assert_eq!(stmt.kind(), StmtKind::Return);
            match doc.user_scope() {
                Some(UserScope::Local(scope)) => {
                    assert_eq!(scope.kind(), ScopeKind::Function);
                    assert_eq!(
                        scope.name().map(|n| n.value().to_string()),
                        Some("alpha".to_string())
                    );
                }
                other => panic!("expected a local scope, got {other:?}"),
            }
        }

        #[test]
        fn cursor_at_the_top_level_reports_the_module() {
            let mut doc = document();
            doc.update(SOURCE, Some(Pos::new(6, 0))).unwrap();
            let stmt = doc.user_stmt().expect("cursor is on the assignment");
            assert_eq!(stmt.kind(), StmtKind::Assign);
            assert_eq!(doc.user_scope(), Some(UserScope::Module));
        }

        #[test]
        fn no_cursor_resolves_nothing() {
            let mut doc = document();
            doc.update(SOURCE, None).unwrap();
            assert!(doc.user_stmt().is_none());
            assert!(doc.user_scope().is_none());
        }
    }

    mod cache {
        use super::*;

        #[test]
        fn sessions_are_keyed_by_path() {
            let mut cache =
                DocumentCache::new(Rc::new(OutlineParser::new()), ParseOptions::default());
            assert!(cache.is_empty());
            cache.update_document("/lib/a.py", "x = 1\n", None).unwrap();
            cache.update_document("/lib/b.py", "y = 2\n", None).unwrap();
            assert_eq!(cache.len(), 2);
            let a = cache.document("/lib/a.py").expect("session exists");
            assert_eq!(a.view().name().unwrap(), "a");
            assert_eq!(a.module_path(), Some("/lib/a.py"));
        }

        #[test]
        fn repeated_updates_reuse_the_session() {
            let mut cache =
                DocumentCache::new(Rc::new(OutlineParser::new()), ParseOptions::default());
            cache.update_document("/lib/a.py", "x = 1\n", None).unwrap();
            cache.update_document("/lib/a.py", "x = 1\n", None).unwrap();
            assert_eq!(cache.len(), 1);
            let a = cache.document("/lib/a.py").expect("session exists");
            assert_eq!(a.last_stats().reused, 1);
        }

        #[test]
        fn removed_sessions_are_gone() {
            let mut cache =
                DocumentCache::new(Rc::new(OutlineParser::new()), ParseOptions::default());
            cache.update_document("/lib/a.py", "x = 1\n", None).unwrap();
            let doc = cache.remove("/lib/a.py").expect("session exists");
            assert_eq!(doc.view().units().len(), 1);
            assert!(cache.is_empty());
            assert!(cache.document("/lib/a.py").is_none());
        }
    }
}
