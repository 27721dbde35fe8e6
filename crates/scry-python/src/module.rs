//! The aggregate module view.
//!
//! A module is parsed as a vector of [`ParseUnit`]s, one per cached source
//! span. Each unit owns its tree and the number of document lines above it,
//! so reusing a unit after an edit elsewhere is a line-offset update, not a
//! reparse. [`ModuleView`] stitches the units back into one module: merged
//! accessors concatenate per-unit indexes in source order and cache the
//! result until the next update replaces the units.
//!
//! All merge results are cached in a single [`ViewCache`] that is cleared
//! wholesale whenever the unit vector changes. There is no partial
//! invalidation; a view is either fully consistent or freshly rebuilt.

use std::cell::{OnceCell, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::rc::Rc;

use scry_core::hash::ContentHash;
use scry_core::pos::Pos;
use thiserror::Error;
use tracing::trace;

use crate::tree::{ImportRef, NameId, NameRef, ScopeRef, StatementRef, SyntaxTree};

// ============================================================================
// ParseUnit
// ============================================================================

/// One parsed span of the document: the tree, the chunk text it was keyed
/// on, and its position in the document.
///
/// Trees hold only span-relative positions; `line_offset` is the number of
/// document lines above the unit, so moving a unit is an offset update.
#[derive(Debug)]
pub struct ParseUnit {
    hash: ContentHash,
    chunk_text: String,
    tree: Rc<SyntaxTree>,
    line_offset: u32,
    cursor_stmt: Option<StatementRef>,
    cursor_scope: Option<ScopeRef>,
}

impl ParseUnit {
    pub(crate) fn new(
        hash: ContentHash,
        chunk_text: String,
        tree: Rc<SyntaxTree>,
        line_offset: u32,
    ) -> Self {
        ParseUnit {
            hash,
            chunk_text,
            tree,
            line_offset,
            cursor_stmt: None,
            cursor_scope: None,
        }
    }

    /// Hash of the chunk text this unit was parsed for.
    pub fn hash(&self) -> &ContentHash {
        &self.hash
    }

    /// The chunk text this unit was keyed on. For parsers that consume
    /// trailing context this can be shorter than the parsed code.
    pub fn chunk_text(&self) -> &str {
        &self.chunk_text
    }

    pub fn tree(&self) -> &Rc<SyntaxTree> {
        &self.tree
    }

    /// Document lines above this unit.
    pub fn line_offset(&self) -> u32 {
        self.line_offset
    }

    /// Absolute position of the unit's first line.
    pub fn start_pos(&self) -> Pos {
        Pos::new(self.line_offset + 1, 0)
    }

    /// Absolute position just past the unit's last consumed character.
    pub fn end_pos(&self) -> Pos {
        self.tree.end().shift_lines(self.line_offset)
    }

    /// Absolute line number of the unit's last line.
    pub fn end_line(&self) -> u32 {
        self.line_offset + self.tree.end().line
    }

    /// The statement the cursor resolved to on the last update.
    pub fn cursor_stmt(&self) -> Option<StatementRef> {
        self.cursor_stmt.clone()
    }

    /// The scope the cursor resolved to on the last update. The unit's
    /// top-level scope means the cursor sat outside any definition.
    pub fn cursor_scope(&self) -> Option<ScopeRef> {
        self.cursor_scope.clone()
    }

    /// Handle on the unit's top-level scope, positioned in the document.
    pub fn root_scope(&self) -> ScopeRef {
        ScopeRef::new(self.tree.clone(), self.tree.root(), self.line_offset)
    }

    /// First statement covering the absolute position, in source order.
    pub fn statement_at(&self, pos: Pos, include_imports: bool) -> Option<StatementRef> {
        let relative = self.relative(pos)?;
        self.tree
            .statement_at(relative, include_imports)
            .map(|id| StatementRef::new(self.tree.clone(), id, self.line_offset))
    }

    /// Deepest class or function scope covering the absolute position.
    pub fn innermost_scope_at(&self, pos: Pos) -> Option<ScopeRef> {
        let relative = self.relative(pos)?;
        self.tree
            .innermost_scope_at(relative)
            .map(|id| ScopeRef::new(self.tree.clone(), id, self.line_offset))
    }

    fn relative(&self, pos: Pos) -> Option<Pos> {
        if pos.line <= self.line_offset {
            return None;
        }
        Some(Pos::new(pos.line - self.line_offset, pos.col))
    }

    pub(crate) fn set_line_offset(&mut self, line_offset: u32) {
        self.line_offset = line_offset;
    }

    /// Re-resolve the cached cursor statement and scope. A cursor outside
    /// the unit's span clears both.
    pub(crate) fn resolve_cursor(&mut self, cursor: Option<Pos>) {
        self.cursor_stmt = None;
        self.cursor_scope = None;
        let Some(pos) = cursor else {
            return;
        };
        if pos < self.start_pos() || pos > self.end_pos() {
            return;
        }
        if let Some(stmt) = self.statement_at(pos, true) {
            self.cursor_scope = Some(stmt.scope());
            self.cursor_stmt = Some(stmt);
        } else if let Some(scope) = self.innermost_scope_at(pos) {
            self.cursor_scope = Some(scope);
        } else {
            self.cursor_scope = Some(self.root_scope());
        }
    }
}

// ============================================================================
// ViewError
// ============================================================================

/// Failure to read from a module view.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ViewError {
    /// The view holds no parse units.
    #[error("module view is empty")]
    Empty,
}

pub type ViewResult<T> = Result<T, ViewError>;

// ============================================================================
// ModuleView
// ============================================================================

/// Caches for the merged accessors. Merges are pure walks over the unit
/// trees, so `OnceCell` is safe here; the position map is the only cache
/// keyed by input.
#[derive(Debug, Default)]
struct ViewCache {
    imports: OnceCell<Vec<ImportRef>>,
    statements: OnceCell<Vec<StatementRef>>,
    sub_scopes: OnceCell<Vec<ScopeRef>>,
    defined_names: OnceCell<Vec<NameRef>>,
    set_vars: OnceCell<Vec<NameRef>>,
    global_vars: OnceCell<Vec<NameRef>>,
    asserts: OnceCell<Vec<StatementRef>>,
    used_names: OnceCell<BTreeMap<String, Vec<NameRef>>>,
    code: OnceCell<String>,
    is_empty: OnceCell<bool>,
    positions: RefCell<HashMap<Pos, Option<StatementRef>>>,
}

/// The ordered parse units of one document, merged back into a module.
#[derive(Debug, Default)]
pub struct ModuleView {
    units: Vec<ParseUnit>,
    cache: ViewCache,
    /// Largest end position ever reached; survives shrinking edits until
    /// [`ModuleView::reset_end_pos`].
    end_pos: Option<Pos>,
}

impl ModuleView {
    pub fn new() -> Self {
        ModuleView::default()
    }

    /// The parse units in document order.
    pub fn units(&self) -> &[ParseUnit] {
        &self.units
    }

    /// Remove and return all units, clearing the merge caches.
    pub(crate) fn take_units(&mut self) -> Vec<ParseUnit> {
        self.clear_cache();
        std::mem::take(&mut self.units)
    }

    /// Install a freshly built unit vector. Clears the merge caches and
    /// advances `end_pos` when the new units reach further.
    pub(crate) fn replace_units(&mut self, units: Vec<ParseUnit>) {
        self.units = units;
        self.clear_cache();
        if let Some(end) = self.units.last().map(ParseUnit::end_pos) {
            if self.end_pos.is_none_or(|prev| end > prev) {
                self.end_pos = Some(end);
            }
        }
        trace!("module view rebuilt: {} units", self.units.len());
    }

    /// Drop every cached merge result.
    pub fn clear_cache(&mut self) {
        self.cache = ViewCache::default();
    }

    /// Modules always start at line 1, column 0.
    pub fn start_pos(&self) -> Pos {
        Pos::MODULE_START
    }

    /// The furthest end position any update has reached, if any.
    pub fn end_pos(&self) -> Option<Pos> {
        self.end_pos
    }

    /// Forget the recorded end position.
    pub fn reset_end_pos(&mut self) {
        self.end_pos = None;
    }

    fn require_units(&self) -> ViewResult<()> {
        if self.units.is_empty() {
            return Err(ViewError::Empty);
        }
        Ok(())
    }

    fn first_unit(&self) -> ViewResult<&ParseUnit> {
        self.units.first().ok_or(ViewError::Empty)
    }

    // ------------------------------------------------------------------
    // First-unit metadata
    // ------------------------------------------------------------------

    /// The module name, taken from the first unit.
    pub fn name(&self) -> ViewResult<&str> {
        Ok(self.first_unit()?.tree().name())
    }

    /// The module's file path, if it was parsed with one.
    pub fn path(&self) -> ViewResult<Option<&str>> {
        Ok(self.first_unit()?.tree().path())
    }

    /// The module docstring. Only the first unit can carry one.
    pub fn docstring(&self) -> ViewResult<Option<&str>> {
        Ok(self.first_unit()?.tree().docstring())
    }

    pub fn is_builtin(&self) -> ViewResult<bool> {
        Ok(self.first_unit()?.tree().is_builtin())
    }

    // ------------------------------------------------------------------
    // Merged accessors
    // ------------------------------------------------------------------

    /// All top-level imports, in document order.
    pub fn imports(&self) -> ViewResult<&[ImportRef]> {
        self.require_units()?;
        Ok(self.cache.imports.get_or_init(|| {
            self.units
                .iter()
                .flat_map(|unit| unit.root_scope().imports())
                .collect()
        }))
    }

    /// All top-level statements, imports excluded, in document order.
    pub fn statements(&self) -> ViewResult<&[StatementRef]> {
        self.require_units()?;
        Ok(self.cache.statements.get_or_init(|| {
            self.units
                .iter()
                .flat_map(|unit| unit.root_scope().statements())
                .collect()
        }))
    }

    /// All top-level classes and functions, in document order.
    pub fn sub_scopes(&self) -> ViewResult<&[ScopeRef]> {
        self.require_units()?;
        Ok(self.cache.sub_scopes.get_or_init(|| {
            self.units
                .iter()
                .flat_map(|unit| {
                    let tree = unit.tree();
                    tree.scope_sub_scopes(tree.root())
                        .iter()
                        .map(move |&id| ScopeRef::new(tree.clone(), id, unit.line_offset()))
                })
                .collect()
        }))
    }

    /// Names defined at the module's top level, in document order.
    pub fn defined_names(&self) -> ViewResult<&[NameRef]> {
        self.require_units()?;
        Ok(self
            .cache
            .defined_names
            .get_or_init(|| merged_names(&self.units, SyntaxTree::defined_name_ids)))
    }

    /// Top-level assignment targets, in document order.
    pub fn set_vars(&self) -> ViewResult<&[NameRef]> {
        self.require_units()?;
        Ok(self
            .cache
            .set_vars
            .get_or_init(|| merged_names(&self.units, SyntaxTree::set_var_ids)))
    }

    /// Names declared `global` anywhere in the module.
    pub fn global_vars(&self) -> ViewResult<&[NameRef]> {
        self.require_units()?;
        Ok(self
            .cache
            .global_vars
            .get_or_init(|| merged_names(&self.units, SyntaxTree::global_var_ids)))
    }

    /// Top-level `assert` statements, in document order.
    pub fn asserts(&self) -> ViewResult<&[StatementRef]> {
        self.require_units()?;
        Ok(self.cache.asserts.get_or_init(|| {
            self.units
                .iter()
                .flat_map(|unit| {
                    let tree = unit.tree();
                    tree.assert_ids()
                        .iter()
                        .map(move |&id| StatementRef::new(tree.clone(), id, unit.line_offset()))
                })
                .collect()
        }))
    }

    /// Every name occurrence in the module, keyed by identifier text.
    ///
    /// Occurrence lists keep source order; entries are deduplicated by
    /// handle identity when units repeat.
    pub fn used_names(&self) -> ViewResult<&BTreeMap<String, Vec<NameRef>>> {
        self.require_units()?;
        Ok(self.cache.used_names.get_or_init(|| {
            let mut merged: BTreeMap<String, Vec<NameRef>> = BTreeMap::new();
            for unit in &self.units {
                for (value, ids) in unit.tree().used_name_ids() {
                    let entry = merged.entry(value.clone()).or_default();
                    for &id in ids {
                        let name = NameRef::new(unit.tree().clone(), id, unit.line_offset());
                        if !entry.contains(&name) {
                            entry.push(name);
                        }
                    }
                }
            }
            merged
        }))
    }

    /// The module source, reassembled from the units' parsed code.
    pub fn code(&self) -> ViewResult<&str> {
        self.require_units()?;
        let code = self.cache.code.get_or_init(|| {
            let parts: Vec<&str> = self.units.iter().map(|unit| unit.tree().code()).collect();
            parts.join("\n")
        });
        Ok(code.as_str())
    }

    /// True when no unit contains a statement or definition.
    pub fn is_empty(&self) -> ViewResult<bool> {
        self.require_units()?;
        Ok(*self
            .cache
            .is_empty
            .get_or_init(|| self.units.iter().all(|unit| unit.tree().is_empty())))
    }

    /// First statement covering `pos`, searching units in document order.
    ///
    /// A miss is `None`, never an error; misses are memoized too.
    pub fn statement_for_position(&self, pos: Pos) -> Option<StatementRef> {
        if let Some(cached) = self.cache.positions.borrow().get(&pos) {
            return cached.clone();
        }
        let found = self
            .units
            .iter()
            .find_map(|unit| unit.statement_at(pos, true));
        self.cache
            .positions
            .borrow_mut()
            .insert(pos, found.clone());
        found
    }
}

impl fmt::Display for ModuleView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self
            .units
            .first()
            .map(|unit| unit.tree().name())
            .unwrap_or("empty");
        let end = self
            .units
            .last()
            .map(|unit| unit.end_pos().line)
            .unwrap_or(self.start_pos().line);
        write!(f, "<Module: {}@{}-{}>", name, self.start_pos().line, end)
    }
}

fn merged_names(units: &[ParseUnit], ids: fn(&SyntaxTree) -> &[NameId]) -> Vec<NameRef> {
    units
        .iter()
        .flat_map(|unit| {
            let tree = unit.tree();
            ids(tree)
                .iter()
                .map(move |&id| NameRef::new(tree.clone(), id, unit.line_offset()))
        })
        .collect()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::chunker::split_source;
    use crate::outline::OutlineParser;
    use crate::tree::{ScopeKind, SpanParser, SpanRequest, StmtKind};

    const SOURCE: &str = "import os\nLIMIT = 10\n\ndef first(a):\n    return a\n\nassert LIMIT\n";

    fn units_for(source: &str) -> Vec<ParseUnit> {
        let parser = OutlineParser::new();
        let mut units = Vec::new();
        let mut offset = 0u32;
        let mut start = 0usize;
        for chunk in split_source(source) {
            let request = SpanRequest {
                source: &source[start..],
                first_line: offset + 1,
                module_path: Some("/lib/sample.py"),
            };
            let tree = parser
                .parse_span(&request)
                .expect("outline parsing cannot fail");
            units.push(ParseUnit::new(
                ContentHash::compute(chunk.text().as_bytes()),
                chunk.text().to_string(),
                Rc::new(tree),
                offset,
            ));
            offset += chunk.line_count();
            start += chunk.text().len() + 1;
        }
        units
    }

    fn view_of(source: &str) -> ModuleView {
        let mut view = ModuleView::new();
        view.replace_units(units_for(source));
        view
    }

    fn values(names: &[NameRef]) -> Vec<String> {
        names.iter().map(|n| n.value().to_string()).collect()
    }

    mod units {
        use super::*;

        #[test]
        fn offsets_shift_absolute_positions() {
            let units = units_for(SOURCE);
            assert_eq!(units.len(), 3);
            assert_eq!(units[0].start_pos(), Pos::new(1, 0));
            assert_eq!(units[0].end_pos(), Pos::new(3, 0));
            assert_eq!(units[1].line_offset(), 3);
            assert_eq!(units[1].start_pos(), Pos::new(4, 0));
            assert_eq!(units[1].end_pos(), Pos::new(6, 0));
            assert_eq!(units[1].end_line(), 6);
            assert_eq!(units[2].start_pos(), Pos::new(7, 0));
        }

        #[test]
        fn set_line_offset_moves_the_unit() {
            let mut units = units_for(SOURCE);
            units[1].set_line_offset(10);
            assert_eq!(units[1].start_pos(), Pos::new(11, 0));
            let scope = units[1].root_scope().sub_scopes().remove(0);
            assert_eq!(scope.start(), Pos::new(11, 0));
        }

        #[test]
        fn hash_matches_the_chunk_text() {
            let units = units_for(SOURCE);
            assert_eq!(units[2].chunk_text(), "assert LIMIT\n");
            assert_eq!(units[2].hash(), &ContentHash::compute(b"assert LIMIT\n"));
        }

        #[test]
        fn statement_at_respects_the_offset() {
            let units = units_for(SOURCE);
            let stmt = units[1]
                .statement_at(Pos::new(5, 4), false)
                .expect("return statement covers the position");
            assert_eq!(stmt.kind(), StmtKind::Return);
            assert_eq!(stmt.start(), Pos::new(5, 4));
            assert!(units[1].statement_at(Pos::new(2, 0), false).is_none());
        }
    }

    mod cursors {
        use super::*;

        #[test]
        fn cursor_in_a_function_body() {
            let mut units = units_for(SOURCE);
            units[1].resolve_cursor(Some(Pos::new(5, 6)));
            let stmt = units[1].cursor_stmt().expect("cursor is on a statement");
            assert_eq!(stmt.kind(), StmtKind::Return);
            let scope = units[1].cursor_scope().expect("cursor is inside a scope");
            assert_eq!(scope.kind(), ScopeKind::Function);
            assert_eq!(
                scope.name().map(|n| n.value().to_string()),
                Some("first".to_string())
            );
        }

        #[test]
        fn cursor_on_an_import_line() {
            let mut units = units_for(SOURCE);
            units[0].resolve_cursor(Some(Pos::new(1, 3)));
            let stmt = units[0].cursor_stmt().expect("cursor is on the import");
            assert!(matches!(stmt.kind(), StmtKind::Import(_)));
            let scope = units[0].cursor_scope().expect("cursor resolved a scope");
            assert!(scope.is_module());
        }

        #[test]
        fn cursor_between_statements_reports_the_top_level() {
            let mut units = units_for(SOURCE);
            units[0].resolve_cursor(Some(Pos::new(3, 0)));
            assert!(units[0].cursor_stmt().is_none());
            let scope = units[0].cursor_scope().expect("top level is a scope");
            assert!(scope.is_module());
        }

        #[test]
        fn cursor_outside_the_span_clears_the_cache() {
            let mut units = units_for(SOURCE);
            units[1].resolve_cursor(Some(Pos::new(5, 4)));
            assert!(units[1].cursor_stmt().is_some());
            units[1].resolve_cursor(Some(Pos::new(99, 0)));
            assert!(units[1].cursor_stmt().is_none());
            assert!(units[1].cursor_scope().is_none());
            units[1].resolve_cursor(None);
            assert!(units[1].cursor_stmt().is_none());
        }
    }

    mod merges {
        use super::*;

        #[test]
        fn concatenation_keeps_document_order() {
            let view = view_of(SOURCE);
            let imports = view.imports().unwrap();
            assert_eq!(imports.len(), 1);
            assert_eq!(imports[0].start(), Pos::new(1, 0));

            let statements = view.statements().unwrap();
            let kinds: Vec<_> = statements.iter().map(|s| s.kind()).collect();
            assert_eq!(kinds, [StmtKind::Assign, StmtKind::Assert]);
            assert_eq!(statements[1].start(), Pos::new(7, 0));

            let scopes = view.sub_scopes().unwrap();
            assert_eq!(scopes.len(), 1);
            assert_eq!(scopes[0].start(), Pos::new(4, 0));
            assert_eq!(
                scopes[0].name().map(|n| n.value().to_string()),
                Some("first".to_string())
            );
        }

        #[test]
        fn name_indexes_merge_across_units() {
            let view = view_of(SOURCE);
            assert_eq!(
                values(view.defined_names().unwrap()),
                ["os", "LIMIT", "first"]
            );
            assert_eq!(values(view.set_vars().unwrap()), ["LIMIT"]);
            assert!(view.global_vars().unwrap().is_empty());
            let asserts = view.asserts().unwrap();
            assert_eq!(asserts.len(), 1);
            assert_eq!(asserts[0].start(), Pos::new(7, 0));
        }

        #[test]
        fn used_names_union_spans_units() {
            let view = view_of(SOURCE);
            let used = view.used_names().unwrap();
            let limits = used.get("LIMIT").expect("LIMIT occurs in two units");
            assert_eq!(limits.len(), 2);
            assert_eq!(limits[0].start(), Pos::new(2, 0));
            assert_eq!(limits[1].start(), Pos::new(7, 7));
            assert!(limits[0].is_definition());
            assert!(!limits[1].is_definition());
        }

        #[test]
        fn code_reassembles_the_source() {
            let view = view_of(SOURCE);
            assert_eq!(view.code().unwrap(), SOURCE);
        }

        #[test]
        fn first_unit_metadata() {
            let view = view_of(SOURCE);
            assert_eq!(view.name().unwrap(), "sample");
            assert_eq!(view.path().unwrap(), Some("/lib/sample.py"));
            assert_eq!(view.docstring().unwrap(), None);
            assert!(!view.is_builtin().unwrap());
            assert!(!view.is_empty().unwrap());

            let doc = view_of("\"\"\"Top.\"\"\"\nx = 1\n");
            assert_eq!(doc.docstring().unwrap(), Some("Top."));
        }

        #[test]
        fn empty_view_is_a_precondition_failure() {
            let view = ModuleView::new();
            assert_eq!(view.imports().unwrap_err(), ViewError::Empty);
            assert_eq!(view.name().unwrap_err(), ViewError::Empty);
            assert_eq!(view.code().unwrap_err(), ViewError::Empty);
            assert!(view.statement_for_position(Pos::new(1, 0)).is_none());
        }

        #[test]
        fn empty_source_is_an_empty_module() {
            let view = view_of("");
            assert!(view.is_empty().unwrap());
            assert!(view.imports().unwrap().is_empty());
        }
    }

    mod positions {
        use super::*;

        #[test]
        fn finds_statements_across_units() {
            let view = view_of(SOURCE);
            let assign = view
                .statement_for_position(Pos::new(2, 5))
                .expect("assignment covers the position");
            assert_eq!(assign.kind(), StmtKind::Assign);
            let ret = view
                .statement_for_position(Pos::new(5, 4))
                .expect("return covers the position");
            assert_eq!(ret.start(), Pos::new(5, 4));
            assert!(view.statement_for_position(Pos::new(3, 0)).is_none());
        }

        #[test]
        fn lookups_are_memoized_by_identity() {
            let view = view_of(SOURCE);
            let first = view.statement_for_position(Pos::new(2, 5)).unwrap();
            let second = view.statement_for_position(Pos::new(2, 5)).unwrap();
            assert_eq!(first, second);
        }
    }

    mod lifecycle {
        use super::*;

        #[test]
        fn end_pos_only_advances() {
            let mut view = view_of(SOURCE);
            assert_eq!(view.end_pos(), Some(Pos::new(8, 0)));
            view.replace_units(units_for("x = 1\n"));
            assert_eq!(view.end_pos(), Some(Pos::new(8, 0)));
            view.reset_end_pos();
            assert_eq!(view.end_pos(), None);
            view.replace_units(units_for("y = 2\n"));
            assert_eq!(view.end_pos(), Some(Pos::new(2, 0)));
        }

        #[test]
        fn replace_units_invalidates_merges() {
            let mut view = view_of(SOURCE);
            assert_eq!(view.imports().unwrap().len(), 1);
            view.replace_units(units_for("x = 1\n"));
            assert!(view.imports().unwrap().is_empty());
            assert_eq!(values(view.set_vars().unwrap()), ["x"]);
        }

        #[test]
        fn display_renders_name_and_span() {
            let view = view_of(SOURCE);
            assert_eq!(view.to_string(), "<Module: sample@1-8>");
            assert_eq!(ModuleView::new().to_string(), "<Module: empty@1-1>");
        }
    }
}
