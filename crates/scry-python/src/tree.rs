//! Arena-based syntax trees for parsed source spans.
//!
//! A [`SyntaxTree`] is the immutable result of parsing one source span. All
//! nodes live in typed arenas indexed by small ids; cross-references between
//! nodes are ids, never pointers, so a finished tree has no lifetimes and is
//! cheap to share behind an `Rc`.
//!
//! Positions inside a tree are **relative**: line 1 is the first line of the
//! parsed span, wherever that span currently sits in the document. The handle
//! types ([`ScopeRef`], [`StatementRef`], [`NameRef`], ...) pair a shared
//! tree with a node id and a line offset, and report absolute document
//! positions. Moving a span up or down in the document changes only the
//! offset carried by its handles, never the tree.

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use scry_core::pos::Pos;
use scry_core::text::{end_of_block, slice_lines};
use thiserror::Error;

// ============================================================================
// Node Ids
// ============================================================================

/// Identifies a scope within one [`SyntaxTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(u32);

/// Identifies a statement within one [`SyntaxTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StmtId(u32);

/// Identifies a name occurrence within one [`SyntaxTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NameId(u32);

/// Identifies a parameter within one [`SyntaxTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParamId(u32);

/// Identifies a parameter list within one [`SyntaxTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParamListId(u32);

/// Identifies an import statement within one [`SyntaxTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImportId(u32);

/// Identifies an expression within one [`SyntaxTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExprId(u32);

impl ScopeId {
    fn idx(self) -> usize {
        self.0 as usize
    }
}
impl StmtId {
    fn idx(self) -> usize {
        self.0 as usize
    }
}
impl NameId {
    fn idx(self) -> usize {
        self.0 as usize
    }
}
impl ParamId {
    fn idx(self) -> usize {
        self.0 as usize
    }
}
impl ParamListId {
    fn idx(self) -> usize {
        self.0 as usize
    }
}
impl ImportId {
    fn idx(self) -> usize {
        self.0 as usize
    }
}
impl ExprId {
    fn idx(self) -> usize {
        self.0 as usize
    }
}

// ============================================================================
// Node Kinds
// ============================================================================

/// What kind of block a scope is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    /// The span's own top level.
    Module,
    /// A `class` body.
    Class,
    /// A `def` body.
    Function,
}

/// What a name occurrence defines, if anything.
///
/// A name with no definition kind is a plain use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefinitionKind {
    /// Bound by an import statement.
    Import,
    /// The name of a `def`.
    Function,
    /// The name of a `class`.
    Class,
    /// A function parameter.
    Param,
    /// Bound by an ordinary statement (assignment target, loop variable).
    Statement,
}

/// Statement classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StmtKind {
    /// An expression statement, or anything not otherwise classified.
    Expr,
    /// An assignment (including annotated and augmented forms).
    Assign,
    /// An `assert` statement.
    Assert,
    /// A `global` declaration.
    Global,
    /// A `return` statement.
    Return,
    /// A decorator line.
    Decorator,
    /// A control-flow header (`if`, `for`, `while`, `try`, `with`, ...).
    Flow,
    /// An import statement; the payload is the import's own node.
    Import(ImportId),
}

/// Which syntactic form an import uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportKind {
    /// `import a.b`
    Plain,
    /// `from a.b import c`
    From,
}

// ============================================================================
// Nodes
// ============================================================================

struct ScopeNode {
    kind: ScopeKind,
    name: Option<NameId>,
    parent: Option<ScopeId>,
    start: Pos,
    end: Pos,
    /// Statements in source order, imports included.
    body: Vec<StmtId>,
    sub_scopes: Vec<ScopeId>,
    param_list: Option<ParamListId>,
    docstring: Option<String>,
}

struct StatementNode {
    kind: StmtKind,
    scope: ScopeId,
    start: Pos,
    end: Pos,
}

struct NameNode {
    value: String,
    start: Pos,
    scope: ScopeId,
    stmt: Option<StmtId>,
    import: Option<ImportId>,
    definition: Option<DefinitionKind>,
}

struct ParamNode {
    name: NameId,
    star_count: u8,
    annotation: Option<ExprId>,
    default: Option<ExprId>,
    /// Index among the parameters of the list (markers excluded).
    position_index: usize,
    list: ParamListId,
}

/// One slot of a parameter list: a parameter or a bare `*` / `/` marker.
#[derive(Clone, Copy)]
enum ParamSlot {
    Param(ParamId),
    Star,
    Slash,
}

struct ParamListNode {
    function: ScopeId,
    slots: Vec<ParamSlot>,
}

struct ImportNode {
    kind: ImportKind,
    /// Number of leading dots in a relative import; 0 for absolute.
    level: u32,
    /// The dotted module segments, in source order.
    module_path: Vec<NameId>,
    /// The names bound by the import (`from m import a, b` binds `a`, `b`).
    imported: Vec<NameId>,
    /// Names the statement mentions without binding them, such as the
    /// original in `from m import a as b`.
    uses: Vec<NameId>,
    stmt: StmtId,
    start: Pos,
    end: Pos,
}

struct ExprNode {
    code: String,
    start: Pos,
}

// ============================================================================
// SyntaxTree
// ============================================================================

/// The immutable parse result for one source span.
///
/// Built through [`TreeBuilder`], then shared behind `Rc`. All positional
/// data is relative to the span's own first line.
pub struct SyntaxTree {
    name: String,
    path: Option<String>,
    is_builtin: bool,
    code: String,
    end: Pos,
    scopes: Vec<ScopeNode>,
    statements: Vec<StatementNode>,
    names: Vec<NameNode>,
    params: Vec<ParamNode>,
    param_lists: Vec<ParamListNode>,
    imports: Vec<ImportNode>,
    exprs: Vec<ExprNode>,
    /// Identifier text to every occurrence, in source order.
    used_names: BTreeMap<String, Vec<NameId>>,
    /// Top-level bindings: `def`/`class` names, assignment targets, imports.
    defined_names: Vec<NameId>,
    /// Top-level assignment targets.
    set_vars: Vec<NameId>,
    /// Names declared `global`, at any depth.
    global_vars: Vec<NameId>,
    /// Top-level `assert` statements.
    asserts: Vec<StmtId>,
}

const ROOT: ScopeId = ScopeId(0);

impl SyntaxTree {
    /// The module name this span was parsed under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The file path of the enclosing module, if known.
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// Whether this tree describes a synthetic builtin module.
    pub fn is_builtin(&self) -> bool {
        self.is_builtin
    }

    /// The exact source text this tree was parsed from, without a trailing
    /// newline.
    pub fn code(&self) -> &str {
        &self.code
    }

    /// The relative position just past the last consumed character.
    pub fn end(&self) -> Pos {
        self.end
    }

    /// The docstring of the span's top level, if the span opens with one.
    pub fn docstring(&self) -> Option<&str> {
        self.scopes[ROOT.idx()].docstring.as_deref()
    }

    /// True when the span contains no statements and no definitions.
    pub fn is_empty(&self) -> bool {
        let root = &self.scopes[ROOT.idx()];
        root.body.is_empty() && root.sub_scopes.is_empty()
    }

    pub(crate) fn root(&self) -> ScopeId {
        ROOT
    }

    pub(crate) fn used_name_ids(&self) -> &BTreeMap<String, Vec<NameId>> {
        &self.used_names
    }

    pub(crate) fn defined_name_ids(&self) -> &[NameId] {
        &self.defined_names
    }

    pub(crate) fn set_var_ids(&self) -> &[NameId] {
        &self.set_vars
    }

    pub(crate) fn global_var_ids(&self) -> &[NameId] {
        &self.global_vars
    }

    pub(crate) fn assert_ids(&self) -> &[StmtId] {
        &self.asserts
    }

    pub(crate) fn scope_sub_scopes(&self, id: ScopeId) -> &[ScopeId] {
        &self.scopes[id.idx()].sub_scopes
    }

    /// First statement whose span contains `pos`, in source order.
    ///
    /// Spans are inclusive at both ends. Import statements are skipped
    /// unless `include_imports` is set.
    pub(crate) fn statement_at(&self, pos: Pos, include_imports: bool) -> Option<StmtId> {
        self.statements.iter().enumerate().find_map(|(i, node)| {
            if !include_imports && matches!(node.kind, StmtKind::Import(_)) {
                return None;
            }
            if node.start <= pos && pos <= node.end {
                Some(StmtId(i as u32))
            } else {
                None
            }
        })
    }

    /// Deepest class or function scope whose span contains `pos`.
    ///
    /// Returns `None` when the position sits at the span's own top level.
    pub(crate) fn innermost_scope_at(&self, pos: Pos) -> Option<ScopeId> {
        let mut found = None;
        let mut current = ROOT;
        loop {
            let next = self.scopes[current.idx()]
                .sub_scopes
                .iter()
                .copied()
                .find(|&child| {
                    let node = &self.scopes[child.idx()];
                    node.start <= pos && pos <= node.end
                });
            match next {
                Some(child) => {
                    found = Some(child);
                    current = child;
                }
                None => break,
            }
        }
        found
    }

    /// The literal dotted path up to and including `name` within an import.
    ///
    /// For `import a.b`, the path of `b` is `["a", "b"]`. For
    /// `from a.b import c`, the path of `c` is `["a", "b", "c"]`. Returns
    /// `None` when the name does not belong to the import.
    pub(crate) fn path_for_name(&self, import: ImportId, name: NameId) -> Option<Vec<String>> {
        let node = &self.imports[import.idx()];
        let value = |id: NameId| self.names[id.idx()].value.clone();
        if let Some(i) = node.module_path.iter().position(|&n| n == name) {
            return Some(node.module_path[..=i].iter().map(|&n| value(n)).collect());
        }
        if node.imported.contains(&name) || node.uses.contains(&name) {
            let mut path: Vec<String> = node.module_path.iter().map(|&n| value(n)).collect();
            path.push(value(name));
            return Some(path);
        }
        None
    }

    fn scope(&self, id: ScopeId) -> &ScopeNode {
        &self.scopes[id.idx()]
    }

    fn statement(&self, id: StmtId) -> &StatementNode {
        &self.statements[id.idx()]
    }

    fn nm(&self, id: NameId) -> &NameNode {
        &self.names[id.idx()]
    }

    fn param(&self, id: ParamId) -> &ParamNode {
        &self.params[id.idx()]
    }

    fn param_list(&self, id: ParamListId) -> &ParamListNode {
        &self.param_lists[id.idx()]
    }

    fn import(&self, id: ImportId) -> &ImportNode {
        &self.imports[id.idx()]
    }

    fn expr(&self, id: ExprId) -> &ExprNode {
        &self.exprs[id.idx()]
    }
}

impl fmt::Debug for SyntaxTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<SyntaxTree: {}@{}>", self.name, self.end)
    }
}

// ============================================================================
// Handles
// ============================================================================

/// Implements identity semantics for a handle type: two handles are equal
/// when they view the same node of the same tree. The line offset is display
/// state, not identity.
macro_rules! handle_identity {
    ($ty:ident) => {
        impl PartialEq for $ty {
            fn eq(&self, other: &Self) -> bool {
                Rc::ptr_eq(&self.tree, &other.tree) && self.id == other.id
            }
        }
        impl Eq for $ty {}
        impl std::hash::Hash for $ty {
            fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
                (Rc::as_ptr(&self.tree) as usize).hash(state);
                self.id.hash(state);
            }
        }
    };
}

/// A scope of a shared tree, positioned in the document.
#[derive(Clone)]
pub struct ScopeRef {
    tree: Rc<SyntaxTree>,
    id: ScopeId,
    line_offset: u32,
}

handle_identity!(ScopeRef);

impl ScopeRef {
    pub(crate) fn new(tree: Rc<SyntaxTree>, id: ScopeId, line_offset: u32) -> Self {
        ScopeRef {
            tree,
            id,
            line_offset,
        }
    }

    pub fn kind(&self) -> ScopeKind {
        self.tree.scope(self.id).kind
    }

    /// True for the top-level scope of the parsed span.
    pub fn is_module(&self) -> bool {
        self.id == ROOT
    }

    pub fn name(&self) -> Option<NameRef> {
        self.tree
            .scope(self.id)
            .name
            .map(|id| NameRef::new(self.tree.clone(), id, self.line_offset))
    }

    /// Absolute start position.
    pub fn start(&self) -> Pos {
        self.tree.scope(self.id).start.shift_lines(self.line_offset)
    }

    /// Absolute end position.
    pub fn end(&self) -> Pos {
        self.tree.scope(self.id).end.shift_lines(self.line_offset)
    }

    pub fn parent(&self) -> Option<ScopeRef> {
        self.tree
            .scope(self.id)
            .parent
            .map(|id| ScopeRef::new(self.tree.clone(), id, self.line_offset))
    }

    pub fn sub_scopes(&self) -> Vec<ScopeRef> {
        self.tree
            .scope(self.id)
            .sub_scopes
            .iter()
            .map(|&id| ScopeRef::new(self.tree.clone(), id, self.line_offset))
            .collect()
    }

    /// The scope's statements in source order, imports excluded.
    pub fn statements(&self) -> Vec<StatementRef> {
        self.tree
            .scope(self.id)
            .body
            .iter()
            .filter(|&&id| !matches!(self.tree.statement(id).kind, StmtKind::Import(_)))
            .map(|&id| StatementRef::new(self.tree.clone(), id, self.line_offset))
            .collect()
    }

    /// The scope's import statements in source order.
    pub fn imports(&self) -> Vec<ImportRef> {
        self.tree
            .scope(self.id)
            .body
            .iter()
            .filter_map(|&id| match self.tree.statement(id).kind {
                StmtKind::Import(import) => {
                    Some(ImportRef::new(self.tree.clone(), import, self.line_offset))
                }
                _ => None,
            })
            .collect()
    }

    pub fn param_list(&self) -> Option<ParamListRef> {
        self.tree
            .scope(self.id)
            .param_list
            .map(|id| ParamListRef::new(self.tree.clone(), id, self.line_offset))
    }

    /// The function's parameters in declaration order.
    pub fn params(&self) -> Vec<ParamRef> {
        self.param_list().map(|list| list.params()).unwrap_or_default()
    }

    pub fn docstring(&self) -> Option<&str> {
        self.tree.scope(self.id).docstring.as_deref()
    }
}

impl fmt::Debug for ScopeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind() {
            ScopeKind::Module => "Module",
            ScopeKind::Class => "Class",
            ScopeKind::Function => "Function",
        };
        let name = self
            .name()
            .map(|n| n.value().to_string())
            .unwrap_or_else(|| self.tree.name().to_string());
        write!(
            f,
            "<{}: {}@{}-{}>",
            kind,
            name,
            self.start().line,
            self.end().line
        )
    }
}

/// A statement of a shared tree, positioned in the document.
#[derive(Clone)]
pub struct StatementRef {
    tree: Rc<SyntaxTree>,
    id: StmtId,
    line_offset: u32,
}

handle_identity!(StatementRef);

impl StatementRef {
    pub(crate) fn new(tree: Rc<SyntaxTree>, id: StmtId, line_offset: u32) -> Self {
        StatementRef {
            tree,
            id,
            line_offset,
        }
    }

    pub fn kind(&self) -> StmtKind {
        self.tree.statement(self.id).kind
    }

    pub fn start(&self) -> Pos {
        self.tree
            .statement(self.id)
            .start
            .shift_lines(self.line_offset)
    }

    pub fn end(&self) -> Pos {
        self.tree
            .statement(self.id)
            .end
            .shift_lines(self.line_offset)
    }

    /// The statement's source text, sliced from the span it was parsed from.
    pub fn code(&self) -> String {
        let node = self.tree.statement(self.id);
        slice_lines(self.tree.code(), node.start, node.end)
    }

    pub fn scope(&self) -> ScopeRef {
        ScopeRef::new(
            self.tree.clone(),
            self.tree.statement(self.id).scope,
            self.line_offset,
        )
    }

    /// The name occurrences inside this statement, in source order.
    pub fn names(&self) -> Vec<NameRef> {
        self.tree
            .names
            .iter()
            .enumerate()
            .filter(|(_, node)| node.stmt == Some(self.id))
            .map(|(i, _)| NameRef::new(self.tree.clone(), NameId(i as u32), self.line_offset))
            .collect()
    }

    /// The import node, when this is an import statement.
    pub fn import(&self) -> Option<ImportRef> {
        match self.tree.statement(self.id).kind {
            StmtKind::Import(import) => {
                Some(ImportRef::new(self.tree.clone(), import, self.line_offset))
            }
            _ => None,
        }
    }
}

impl fmt::Debug for StatementRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<Statement: {:?}@{}>", self.kind(), self.start())
    }
}

/// A name occurrence of a shared tree, positioned in the document.
#[derive(Clone)]
pub struct NameRef {
    tree: Rc<SyntaxTree>,
    id: NameId,
    line_offset: u32,
}

handle_identity!(NameRef);

impl NameRef {
    pub(crate) fn new(tree: Rc<SyntaxTree>, id: NameId, line_offset: u32) -> Self {
        NameRef {
            tree,
            id,
            line_offset,
        }
    }

    pub(crate) fn tree(&self) -> &Rc<SyntaxTree> {
        &self.tree
    }

    /// The identifier text.
    pub fn value(&self) -> &str {
        &self.tree.nm(self.id).value
    }

    pub fn start(&self) -> Pos {
        self.tree.nm(self.id).start.shift_lines(self.line_offset)
    }

    /// Position just past the identifier's last character.
    pub fn end(&self) -> Pos {
        let start = self.start();
        Pos::new(start.line, start.col + self.value().chars().count() as u32)
    }

    pub fn scope(&self) -> ScopeRef {
        ScopeRef::new(self.tree.clone(), self.tree.nm(self.id).scope, self.line_offset)
    }

    pub fn statement(&self) -> Option<StatementRef> {
        self.tree
            .nm(self.id)
            .stmt
            .map(|id| StatementRef::new(self.tree.clone(), id, self.line_offset))
    }

    /// The import statement this name sits inside, if any.
    pub fn import(&self) -> Option<ImportRef> {
        self.tree
            .nm(self.id)
            .import
            .map(|id| ImportRef::new(self.tree.clone(), id, self.line_offset))
    }

    pub fn definition(&self) -> Option<DefinitionKind> {
        self.tree.nm(self.id).definition
    }

    pub fn is_definition(&self) -> bool {
        self.definition().is_some()
    }
}

impl fmt::Debug for NameRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<Name: {}@{}>", self.value(), self.start())
    }
}

/// A parameter of a shared tree.
#[derive(Clone)]
pub struct ParamRef {
    tree: Rc<SyntaxTree>,
    id: ParamId,
    line_offset: u32,
}

handle_identity!(ParamRef);

impl ParamRef {
    pub(crate) fn new(tree: Rc<SyntaxTree>, id: ParamId, line_offset: u32) -> Self {
        ParamRef {
            tree,
            id,
            line_offset,
        }
    }

    pub fn name(&self) -> NameRef {
        NameRef::new(self.tree.clone(), self.tree.param(self.id).name, self.line_offset)
    }

    /// The identifier text, without star prefixes.
    pub fn name_value(&self) -> &str {
        &self.tree.nm(self.tree.param(self.id).name).value
    }

    /// 0 for a plain parameter, 1 for `*args`, 2 for `**kwargs`.
    pub fn star_count(&self) -> u8 {
        self.tree.param(self.id).star_count
    }

    pub fn annotation(&self) -> Option<ExprRef> {
        self.tree
            .param(self.id)
            .annotation
            .map(|id| ExprRef::new(self.tree.clone(), id, self.line_offset))
    }

    pub fn default_value(&self) -> Option<ExprRef> {
        self.tree
            .param(self.id)
            .default
            .map(|id| ExprRef::new(self.tree.clone(), id, self.line_offset))
    }

    /// Index among the list's parameters, `*` and `/` markers excluded.
    pub fn position_index(&self) -> usize {
        self.tree.param(self.id).position_index
    }

    pub fn list(&self) -> ParamListRef {
        ParamListRef::new(self.tree.clone(), self.tree.param(self.id).list, self.line_offset)
    }

    /// The function scope declaring this parameter.
    pub fn function(&self) -> ScopeRef {
        let list = self.tree.param(self.id).list;
        ScopeRef::new(
            self.tree.clone(),
            self.tree.param_list(list).function,
            self.line_offset,
        )
    }
}

impl fmt::Debug for ParamRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<Param: {}>", self.name_value())
    }
}

/// One item of a parameter list, as seen through handles.
#[derive(Debug, Clone)]
pub enum ParamListItem {
    Param(ParamRef),
    /// A bare `*` keyword-only marker.
    Star,
    /// A `/` positional-only marker.
    Slash,
}

/// A function's parameter list, markers included.
#[derive(Clone)]
pub struct ParamListRef {
    tree: Rc<SyntaxTree>,
    id: ParamListId,
    line_offset: u32,
}

handle_identity!(ParamListRef);

impl ParamListRef {
    pub(crate) fn new(tree: Rc<SyntaxTree>, id: ParamListId, line_offset: u32) -> Self {
        ParamListRef {
            tree,
            id,
            line_offset,
        }
    }

    /// All slots in declaration order, `*` and `/` markers included.
    pub fn items(&self) -> Vec<ParamListItem> {
        self.tree
            .param_list(self.id)
            .slots
            .iter()
            .map(|slot| match slot {
                ParamSlot::Param(id) => {
                    ParamListItem::Param(ParamRef::new(self.tree.clone(), *id, self.line_offset))
                }
                ParamSlot::Star => ParamListItem::Star,
                ParamSlot::Slash => ParamListItem::Slash,
            })
            .collect()
    }

    /// The parameters only, markers skipped.
    pub fn params(&self) -> Vec<ParamRef> {
        self.tree
            .param_list(self.id)
            .slots
            .iter()
            .filter_map(|slot| match slot {
                ParamSlot::Param(id) => {
                    Some(ParamRef::new(self.tree.clone(), *id, self.line_offset))
                }
                _ => None,
            })
            .collect()
    }

    pub fn function(&self) -> ScopeRef {
        ScopeRef::new(
            self.tree.clone(),
            self.tree.param_list(self.id).function,
            self.line_offset,
        )
    }
}

impl fmt::Debug for ParamListRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<ParamList: {} slots>", self.tree.param_list(self.id).slots.len())
    }
}

/// An import statement of a shared tree.
#[derive(Clone)]
pub struct ImportRef {
    tree: Rc<SyntaxTree>,
    id: ImportId,
    line_offset: u32,
}

handle_identity!(ImportRef);

impl ImportRef {
    pub(crate) fn new(tree: Rc<SyntaxTree>, id: ImportId, line_offset: u32) -> Self {
        ImportRef {
            tree,
            id,
            line_offset,
        }
    }

    pub fn kind(&self) -> ImportKind {
        self.tree.import(self.id).kind
    }

    /// Number of leading dots; 0 for an absolute import.
    pub fn level(&self) -> u32 {
        self.tree.import(self.id).level
    }

    pub fn start(&self) -> Pos {
        self.tree.import(self.id).start.shift_lines(self.line_offset)
    }

    pub fn end(&self) -> Pos {
        self.tree.import(self.id).end.shift_lines(self.line_offset)
    }

    pub fn statement(&self) -> StatementRef {
        StatementRef::new(self.tree.clone(), self.tree.import(self.id).stmt, self.line_offset)
    }

    /// The dotted module segments, in source order.
    pub fn module_path_names(&self) -> Vec<NameRef> {
        self.tree
            .import(self.id)
            .module_path
            .iter()
            .map(|&id| NameRef::new(self.tree.clone(), id, self.line_offset))
            .collect()
    }

    /// The names the import binds.
    pub fn imported_names(&self) -> Vec<NameRef> {
        self.tree
            .import(self.id)
            .imported
            .iter()
            .map(|&id| NameRef::new(self.tree.clone(), id, self.line_offset))
            .collect()
    }

    /// The literal dotted path up to and including `name`.
    ///
    /// `None` when the name belongs to a different tree or does not appear
    /// in this import.
    pub fn path_for_name(&self, name: &NameRef) -> Option<Vec<String>> {
        if !Rc::ptr_eq(&self.tree, name.tree()) {
            return None;
        }
        self.tree.path_for_name(self.id, name.id)
    }
}

impl fmt::Debug for ImportRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<Import: level {} @{}>", self.level(), self.start())
    }
}

/// An expression of a shared tree, carried as source text.
#[derive(Clone)]
pub struct ExprRef {
    tree: Rc<SyntaxTree>,
    id: ExprId,
    line_offset: u32,
}

handle_identity!(ExprRef);

impl ExprRef {
    pub(crate) fn new(tree: Rc<SyntaxTree>, id: ExprId, line_offset: u32) -> Self {
        ExprRef {
            tree,
            id,
            line_offset,
        }
    }

    /// The expression's source text.
    pub fn code(&self) -> &str {
        &self.tree.expr(self.id).code
    }

    pub fn start(&self) -> Pos {
        self.tree.expr(self.id).start.shift_lines(self.line_offset)
    }
}

impl fmt::Debug for ExprRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<Expr: {}>", self.code())
    }
}

// ============================================================================
// TreeBuilder
// ============================================================================

/// Incremental constructor for [`SyntaxTree`].
///
/// Parsers create nodes in source order: open a scope, add statements and
/// names into it, close it with its end position. `finish` seals the tree
/// with the exact source text consumed; unclosed scopes are closed at the
/// tree's end.
///
/// Import statements are built in two steps because the import node needs
/// its name ids: add a plain statement, add the names, then call
/// [`TreeBuilder::add_import`], which converts the statement in place.
pub struct TreeBuilder {
    tree: SyntaxTree,
}

impl TreeBuilder {
    /// Start a tree for a module named `name`.
    pub fn new(name: impl Into<String>) -> Self {
        let root = ScopeNode {
            kind: ScopeKind::Module,
            name: None,
            parent: None,
            start: Pos::MODULE_START,
            end: Pos::MODULE_START,
            body: Vec::new(),
            sub_scopes: Vec::new(),
            param_list: None,
            docstring: None,
        };
        TreeBuilder {
            tree: SyntaxTree {
                name: name.into(),
                path: None,
                is_builtin: false,
                code: String::new(),
                end: Pos::MODULE_START,
                scopes: vec![root],
                statements: Vec::new(),
                names: Vec::new(),
                params: Vec::new(),
                param_lists: Vec::new(),
                imports: Vec::new(),
                exprs: Vec::new(),
                used_names: BTreeMap::new(),
                defined_names: Vec::new(),
                set_vars: Vec::new(),
                global_vars: Vec::new(),
                asserts: Vec::new(),
            },
        }
    }

    pub fn root(&self) -> ScopeId {
        ROOT
    }

    pub fn set_path(&mut self, path: impl Into<String>) {
        self.tree.path = Some(path.into());
    }

    pub fn set_builtin(&mut self, is_builtin: bool) {
        self.tree.is_builtin = is_builtin;
    }

    /// Open a class or function scope under `parent`.
    pub fn open_scope(
        &mut self,
        parent: ScopeId,
        kind: ScopeKind,
        name: Option<NameId>,
        start: Pos,
    ) -> ScopeId {
        let id = ScopeId(self.tree.scopes.len() as u32);
        self.tree.scopes.push(ScopeNode {
            kind,
            name,
            parent: Some(parent),
            start,
            end: start,
            body: Vec::new(),
            sub_scopes: Vec::new(),
            param_list: None,
            docstring: None,
        });
        self.tree.scopes[parent.idx()].sub_scopes.push(id);
        id
    }

    pub fn close_scope(&mut self, scope: ScopeId, end: Pos) {
        self.tree.scopes[scope.idx()].end = end;
    }

    pub fn set_docstring(&mut self, scope: ScopeId, text: impl Into<String>) {
        self.tree.scopes[scope.idx()].docstring = Some(text.into());
    }

    pub fn add_statement(&mut self, scope: ScopeId, kind: StmtKind, start: Pos, end: Pos) -> StmtId {
        let id = StmtId(self.tree.statements.len() as u32);
        self.tree.statements.push(StatementNode {
            kind,
            scope,
            start,
            end,
        });
        self.tree.scopes[scope.idx()].body.push(id);
        if matches!(kind, StmtKind::Assert) && scope == ROOT {
            self.tree.asserts.push(id);
        }
        id
    }

    /// Record a name occurrence and register it under its identifier text.
    pub fn add_name(
        &mut self,
        scope: ScopeId,
        value: impl Into<String>,
        start: Pos,
        stmt: Option<StmtId>,
        definition: Option<DefinitionKind>,
    ) -> NameId {
        let value = value.into();
        let id = NameId(self.tree.names.len() as u32);
        self.tree
            .used_names
            .entry(value.clone())
            .or_default()
            .push(id);
        self.tree.names.push(NameNode {
            value,
            start,
            scope,
            stmt,
            import: None,
            definition,
        });
        id
    }

    /// Convert `stmt` into an import statement.
    ///
    /// All names in `module_path`, `imported`, and `uses` are linked back
    /// to the new import node.
    pub fn add_import(
        &mut self,
        stmt: StmtId,
        kind: ImportKind,
        level: u32,
        module_path: Vec<NameId>,
        imported: Vec<NameId>,
        uses: Vec<NameId>,
    ) -> ImportId {
        let id = ImportId(self.tree.imports.len() as u32);
        for &name in module_path.iter().chain(imported.iter()).chain(uses.iter()) {
            self.tree.names[name.idx()].import = Some(id);
        }
        let node = &mut self.tree.statements[stmt.idx()];
        node.kind = StmtKind::Import(id);
        let (start, end) = (node.start, node.end);
        self.tree.imports.push(ImportNode {
            kind,
            level,
            module_path,
            imported,
            uses,
            stmt,
            start,
            end,
        });
        id
    }

    /// Attach a parameter list to a function scope.
    pub fn begin_params(&mut self, function: ScopeId) -> ParamListId {
        let id = ParamListId(self.tree.param_lists.len() as u32);
        self.tree.param_lists.push(ParamListNode {
            function,
            slots: Vec::new(),
        });
        self.tree.scopes[function.idx()].param_list = Some(id);
        id
    }

    pub fn add_param(
        &mut self,
        list: ParamListId,
        name: NameId,
        star_count: u8,
        annotation: Option<ExprId>,
        default: Option<ExprId>,
    ) -> ParamId {
        let id = ParamId(self.tree.params.len() as u32);
        let position_index = self
            .tree
            .param_list(list)
            .slots
            .iter()
            .filter(|slot| matches!(slot, ParamSlot::Param(_)))
            .count();
        self.tree.params.push(ParamNode {
            name,
            star_count,
            annotation,
            default,
            position_index,
            list,
        });
        self.tree.param_lists[list.idx()].slots.push(ParamSlot::Param(id));
        id
    }

    /// Record a bare `*` keyword-only marker.
    pub fn add_star_marker(&mut self, list: ParamListId) {
        self.tree.param_lists[list.idx()].slots.push(ParamSlot::Star);
    }

    /// Record a `/` positional-only marker.
    pub fn add_slash_marker(&mut self, list: ParamListId) {
        self.tree.param_lists[list.idx()].slots.push(ParamSlot::Slash);
    }

    pub fn add_expr(&mut self, code: impl Into<String>, start: Pos) -> ExprId {
        let id = ExprId(self.tree.exprs.len() as u32);
        self.tree.exprs.push(ExprNode {
            code: code.into(),
            start,
        });
        id
    }

    /// Record a top-level binding.
    pub fn mark_defined(&mut self, name: NameId) {
        self.tree.defined_names.push(name);
    }

    /// Record a top-level assignment target.
    pub fn mark_set_var(&mut self, name: NameId) {
        self.tree.set_vars.push(name);
    }

    /// Record a name declared `global`.
    pub fn mark_global(&mut self, name: NameId) {
        self.tree.global_vars.push(name);
    }

    /// Seal the tree with the source text it was parsed from.
    ///
    /// The tree's end position is derived from `code`. Scopes still open
    /// (ended by end of input rather than a dedent) are closed at that end.
    pub fn finish(mut self, code: impl Into<String>) -> SyntaxTree {
        let code = code.into();
        let end = end_of_block(&code);
        self.tree.code = code;
        self.tree.end = end;
        for scope in &mut self.tree.scopes {
            if scope.end <= scope.start {
                scope.end = end;
            }
        }
        self.tree.scopes[ROOT.idx()].start = Pos::MODULE_START;
        self.tree.scopes[ROOT.idx()].end = end;
        self.tree
    }
}

// ============================================================================
// Parser Contract
// ============================================================================

/// A request to parse one source span.
#[derive(Debug, Clone)]
pub struct SpanRequest<'a> {
    /// Remaining source, from the span's first line through end of file.
    /// The parser decides how much of it one span consumes.
    pub source: &'a str,
    /// Absolute 1-indexed line number of `source`'s first line. Carried for
    /// diagnostics; positions in the returned tree stay span-relative.
    pub first_line: u32,
    /// Path of the enclosing module, if known.
    pub module_path: Option<&'a str>,
}

/// Parses source spans into [`SyntaxTree`]s.
///
/// Implementations may stop at the first span boundary or consume several
/// spans' worth of trailing context, as long as the returned tree's end
/// position covers everything consumed.
pub trait SpanParser {
    fn parse_span(&self, request: &SpanRequest<'_>) -> Result<SyntaxTree, ParseError>;
}

/// Failure to parse a span.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The span is not syntactically valid. `line` is absolute.
    #[error("syntax error at line {line}: {message}")]
    Syntax { line: u32, message: String },
}

pub type ParseResult<T> = Result<T, ParseError>;

// ============================================================================
// Tests
// ============================================================================
