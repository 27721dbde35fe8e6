//! The name hierarchy.
//!
//! A [`NameDef`] is anything an editor can point at and interrogate: where
//! is it defined, what does it resolve to, what is its dotted path. Names
//! are cheap lookup objects; resolution happens on demand through the
//! collaborator seams in [`crate::infer`], never eagerly.
//!
//! The variants cover the sources a name can come from: a bare string with
//! no syntax behind it ([`ArbitraryName`]), an occurrence in a parsed tree
//! ([`TreeNameDefinition`]), the definition name of an already-resolved
//! value ([`ValueName`]), and names bound by imports ([`ImportName`],
//! [`SubModuleImportName`]). [`WrappedName`] decorates any of them with a
//! replacement resolution while forwarding everything else.

use std::cell::OnceCell;
use std::fmt;
use std::rc::Rc;

use scry_core::Pos;
use thiserror::Error;

use crate::infer::{ApiType, ContextHandle, ImporterHandle, ValueHandle, ValueSet};
use crate::tree::{DefinitionKind, NameRef};

// ============================================================================
// Errors
// ============================================================================

/// Failure constructing a name.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NameError {
    /// Submodule names exist only for direct relative imports.
    #[error("unsupported import level {level}; submodule names require level 1")]
    UnsupportedImportLevel { level: u32 },
}

pub type NameResult<T> = Result<T, NameError>;

// ============================================================================
// NameDef
// ============================================================================

/// A shared, dynamically typed name.
pub type NameHandle = Rc<dyn NameDef>;

/// Common interface of every name variant.
///
/// Defaults encode the usual case; variants override only where they
/// differ. `clone_name` is the one hook without a default, so that `goto`
/// can hand out an owning handle to `self`.
pub trait NameDef {
    /// The identifier text.
    fn string_name(&self) -> &str;

    /// Where the name starts, when it has a position at all.
    fn start_pos(&self) -> Option<Pos> {
        None
    }

    /// The context the name is defined in. `None` only for names that are
    /// their own root, such as module names.
    fn parent_context(&self) -> Option<ContextHandle>;

    /// The module-level context reached by walking parents.
    fn root_context(&self) -> ContextHandle {
        self.parent_context()
            .expect("name without a parent context must override root_context")
            .root_context()
    }

    /// Resolve the name to its values.
    fn infer(&self) -> ValueSet;

    /// The definition names an editor should jump to. Most names are their
    /// own definition.
    fn goto(&self) -> Vec<NameHandle> {
        vec![self.clone_name()]
    }

    /// The dotted path of the name, optionally prefixed with the module
    /// path of its root context. `None` when no meaningful path exists.
    fn qualified_names(&self, include_module_names: bool) -> Option<Vec<String>> {
        compose_qualified(
            self.own_qualified_names(),
            || self.root_context(),
            include_module_names,
        )
    }

    /// Override hook for [`NameDef::qualified_names`]: the path from the
    /// root context down to this name, module prefix excluded.
    fn own_qualified_names(&self) -> Option<Vec<String>> {
        None
    }

    /// The name as users should see it.
    fn public_name(&self) -> &str {
        self.string_name()
    }

    /// Whether the name is bound by an import statement.
    fn is_import(&self) -> bool {
        false
    }

    /// Editor-facing classification.
    fn api_type(&self) -> ApiType {
        self.parent_context()
            .expect("name without a parent context must override api_type")
            .api_type()
    }

    /// `false` for synthetic names that stand in for plain strings, such
    /// as completion fragments.
    fn is_value_name(&self) -> bool {
        true
    }

    /// The backing tree occurrence, when the name has one.
    fn tree_name(&self) -> Option<NameRef> {
        None
    }

    /// An owning handle to a copy of this name.
    fn clone_name(&self) -> NameHandle;
}

/// Own chain, optionally prefixed by the root context's module path.
fn compose_qualified(
    own: Option<Vec<String>>,
    root: impl FnOnce() -> ContextHandle,
    include_module_names: bool,
) -> Option<Vec<String>> {
    let own = own?;
    if !include_module_names {
        return Some(own);
    }
    let mut names = root().string_names()?;
    names.extend(own);
    Some(names)
}

/// Qualified names for a tree-backed name, honoring import ancestry.
///
/// A name inside an import usually has no qualified path: the path it spells
/// belongs to the imported module, not to the importing one. Two carve-outs:
/// an absolute import keeps its literal dotted path when module names are
/// requested, and a direct relative import inside a package resolves like an
/// ordinary name.
pub(crate) fn tree_qualified_names(
    tree_name: &NameRef,
    root: impl Fn() -> ContextHandle,
    own: impl FnOnce() -> Option<Vec<String>>,
    include_module_names: bool,
) -> Option<Vec<String>> {
    if let Some(import) = tree_name.import() {
        if !(import.level() == 1 && root().is_package()) {
            if include_module_names && import.level() == 0 {
                return import.path_for_name(tree_name);
            }
            return None;
        }
    }
    compose_qualified(own(), root, include_module_names)
}

/// Shared `Debug` shape for name types.
pub(crate) fn fmt_name(
    f: &mut fmt::Formatter<'_>,
    kind: &str,
    name: &dyn NameDef,
) -> fmt::Result {
    match name.start_pos() {
        Some(pos) => write!(f, "<{}: {}@{}>", kind, name.string_name(), pos),
        None => write!(f, "<{}: {}>", kind, name.string_name()),
    }
}

// ============================================================================
// ArbitraryName
// ============================================================================

/// A name that exists only as a string.
///
/// Completion fragments and other synthetic names have no tree node and
/// resolve to nothing; they are anchored at the builtins context so that
/// `root_context` and `api_type` still answer.
#[derive(Clone)]
pub struct ArbitraryName {
    builtins: ContextHandle,
    string_name: String,
}

impl ArbitraryName {
    pub fn new(builtins: ContextHandle, string_name: impl Into<String>) -> Self {
        ArbitraryName {
            builtins,
            string_name: string_name.into(),
        }
    }
}

impl NameDef for ArbitraryName {
    fn string_name(&self) -> &str {
        &self.string_name
    }

    fn parent_context(&self) -> Option<ContextHandle> {
        Some(self.builtins.clone())
    }

    fn infer(&self) -> ValueSet {
        ValueSet::empty()
    }

    fn is_value_name(&self) -> bool {
        false
    }

    fn clone_name(&self) -> NameHandle {
        Rc::new(self.clone())
    }
}

impl fmt::Debug for ArbitraryName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_name(f, "ArbitraryName", self)
    }
}

// ============================================================================
// TreeNameDefinition
// ============================================================================

/// A name occurrence in a syntax tree, resolved through the engine.
#[derive(Clone)]
pub struct TreeNameDefinition {
    parent_context: ContextHandle,
    tree_name: NameRef,
}

impl TreeNameDefinition {
    pub fn new(parent_context: ContextHandle, tree_name: NameRef) -> Self {
        TreeNameDefinition {
            parent_context,
            tree_name,
        }
    }
}

impl NameDef for TreeNameDefinition {
    fn string_name(&self) -> &str {
        self.tree_name.value()
    }

    fn start_pos(&self) -> Option<Pos> {
        Some(self.tree_name.start())
    }

    fn parent_context(&self) -> Option<ContextHandle> {
        Some(self.parent_context.clone())
    }

    fn infer(&self) -> ValueSet {
        let state = self.parent_context.state();
        state.infer_name(&self.parent_context, &self.tree_name)
    }

    fn goto(&self) -> Vec<NameHandle> {
        let state = self.parent_context.state();
        state.goto(&self.parent_context, &self.tree_name)
    }

    fn qualified_names(&self, include_module_names: bool) -> Option<Vec<String>> {
        tree_qualified_names(
            &self.tree_name,
            || self.root_context(),
            || self.own_qualified_names(),
            include_module_names,
        )
    }

    fn own_qualified_names(&self) -> Option<Vec<String>> {
        let mut names = self.parent_context.qualified_names()?;
        names.push(self.tree_name.value().to_string());
        Some(names)
    }

    fn is_import(&self) -> bool {
        self.tree_name.import().is_some()
    }

    fn api_type(&self) -> ApiType {
        match self.tree_name.definition() {
            Some(DefinitionKind::Import) => ApiType::Module,
            Some(DefinitionKind::Function) => ApiType::Function,
            Some(DefinitionKind::Class) => ApiType::Class,
            Some(DefinitionKind::Param) => ApiType::Param,
            Some(DefinitionKind::Statement) | None => ApiType::Statement,
        }
    }

    fn tree_name(&self) -> Option<NameRef> {
        Some(self.tree_name.clone())
    }

    fn clone_name(&self) -> NameHandle {
        Rc::new(self.clone())
    }
}

impl fmt::Debug for TreeNameDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_name(f, "TreeNameDefinition", self)
    }
}

// ============================================================================
// ValueName
// ============================================================================

/// The definition name of a value the engine has already produced.
///
/// Resolution is a foregone conclusion: `infer` returns the known value,
/// and path questions delegate to it.
#[derive(Clone)]
pub struct ValueName {
    value: ValueHandle,
    parent_context: Option<ContextHandle>,
    tree_name: NameRef,
}

impl ValueName {
    pub fn new(value: ValueHandle, tree_name: NameRef) -> Self {
        let parent_context = value.parent_context();
        ValueName {
            value,
            parent_context,
            tree_name,
        }
    }

    pub fn value(&self) -> &ValueHandle {
        &self.value
    }
}

impl NameDef for ValueName {
    fn string_name(&self) -> &str {
        self.tree_name.value()
    }

    fn start_pos(&self) -> Option<Pos> {
        Some(self.tree_name.start())
    }

    fn parent_context(&self) -> Option<ContextHandle> {
        self.parent_context.clone()
    }

    fn root_context(&self) -> ContextHandle {
        match self.parent_context.clone() {
            Some(context) => context.root_context(),
            // A module-level name: the value is its own root.
            None => self.value.clone().as_context(),
        }
    }

    fn infer(&self) -> ValueSet {
        ValueSet::single(self.value.clone())
    }

    fn goto(&self) -> Vec<NameHandle> {
        vec![self.value.name()]
    }

    fn qualified_names(&self, include_module_names: bool) -> Option<Vec<String>> {
        tree_qualified_names(
            &self.tree_name,
            || self.root_context(),
            || self.own_qualified_names(),
            include_module_names,
        )
    }

    fn own_qualified_names(&self) -> Option<Vec<String>> {
        self.value.qualified_names()
    }

    fn is_import(&self) -> bool {
        self.tree_name.import().is_some()
    }

    fn api_type(&self) -> ApiType {
        self.value.api_type()
    }

    fn tree_name(&self) -> Option<NameRef> {
        Some(self.tree_name.clone())
    }

    fn clone_name(&self) -> NameHandle {
        Rc::new(self.clone())
    }
}

impl fmt::Debug for ValueName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_name(f, "ValueName", self)
    }
}

// ============================================================================
// ImportName
// ============================================================================

/// A module name bound by an absolute `import` statement.
///
/// Resolution goes through the [`crate::infer::Importer`] seam exactly once
/// per instance; the answer is memoized in the name itself and dies with it.
#[derive(Clone)]
pub struct ImportName {
    importer: ImporterHandle,
    from_module: ContextHandle,
    string_name: String,
    level: u32,
    resolved: OnceCell<ValueSet>,
}

impl ImportName {
    pub fn new(
        importer: ImporterHandle,
        from_module: ContextHandle,
        string_name: impl Into<String>,
    ) -> Self {
        ImportName::with_level(importer, from_module, string_name, 0)
    }

    fn with_level(
        importer: ImporterHandle,
        from_module: ContextHandle,
        string_name: impl Into<String>,
        level: u32,
    ) -> Self {
        ImportName {
            importer,
            from_module,
            string_name: string_name.into(),
            level,
            resolved: OnceCell::new(),
        }
    }

    fn resolve(&self) -> ValueSet {
        if let Some(values) = self.resolved.get() {
            return values.clone();
        }
        let names = std::slice::from_ref(&self.string_name);
        let values = self.importer.follow(names, self.level, &self.from_module);
        // The importer may have re-entered this name; the first completed
        // store wins and later results are dropped.
        self.resolved.get_or_init(|| values).clone()
    }
}

impl NameDef for ImportName {
    fn string_name(&self) -> &str {
        &self.string_name
    }

    fn start_pos(&self) -> Option<Pos> {
        Some(Pos::MODULE_START)
    }

    fn parent_context(&self) -> Option<ContextHandle> {
        match self.resolve().first() {
            Some(value) => Some(value.clone().as_context()),
            None => Some(self.from_module.clone()),
        }
    }

    fn infer(&self) -> ValueSet {
        self.resolve()
    }

    fn goto(&self) -> Vec<NameHandle> {
        self.resolve().iter().map(|value| value.name()).collect()
    }

    fn qualified_names(&self, include_module_names: bool) -> Option<Vec<String>> {
        if !include_module_names {
            return Some(Vec::new());
        }
        if self.level == 0 {
            return Some(vec![self.string_name.clone()]);
        }
        let mut names = self.from_module.string_names()?;
        names.push(self.string_name.clone());
        Some(names)
    }

    fn api_type(&self) -> ApiType {
        ApiType::Module
    }

    fn clone_name(&self) -> NameHandle {
        Rc::new(self.clone())
    }
}

impl fmt::Debug for ImportName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_name(f, "ImportName", self)
    }
}

// ============================================================================
// SubModuleImportName
// ============================================================================

/// A sibling module made visible by a direct relative import.
///
/// Only level 1 is meaningful here; deeper levels would need filesystem
/// knowledge this crate does not have.
#[derive(Clone)]
pub struct SubModuleImportName {
    inner: ImportName,
}

impl SubModuleImportName {
    pub fn new(
        importer: ImporterHandle,
        from_module: ContextHandle,
        string_name: impl Into<String>,
        level: u32,
    ) -> NameResult<Self> {
        if level != 1 {
            return Err(NameError::UnsupportedImportLevel { level });
        }
        Ok(SubModuleImportName {
            inner: ImportName::with_level(importer, from_module, string_name, level),
        })
    }
}

impl NameDef for SubModuleImportName {
    fn string_name(&self) -> &str {
        self.inner.string_name()
    }

    fn start_pos(&self) -> Option<Pos> {
        self.inner.start_pos()
    }

    fn parent_context(&self) -> Option<ContextHandle> {
        self.inner.parent_context()
    }

    fn infer(&self) -> ValueSet {
        self.inner.infer()
    }

    fn goto(&self) -> Vec<NameHandle> {
        self.inner.goto()
    }

    fn qualified_names(&self, include_module_names: bool) -> Option<Vec<String>> {
        self.inner.qualified_names(include_module_names)
    }

    fn api_type(&self) -> ApiType {
        ApiType::Module
    }

    fn clone_name(&self) -> NameHandle {
        Rc::new(self.clone())
    }
}

impl fmt::Debug for SubModuleImportName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_name(f, "SubModuleImportName", self)
    }
}

// ============================================================================
// WrappedName
// ============================================================================

/// The resolution override carried by a [`WrappedName`].
pub trait WrappedInfer {
    /// Replaces [`NameDef::infer`] on the wrapper. `wrapped` is the name
    /// being shadowed, available for delegation.
    fn infer(&self, wrapped: &NameHandle) -> ValueSet;
}

/// A name that forwards everything to an inner name except resolution.
///
/// Decorating a name (a narrowed type, an overlay from elsewhere) should
/// not require restating the whole interface: the overlay supplies `infer`
/// and the wrapper forwards the rest verbatim.
#[derive(Clone)]
pub struct WrappedName<I> {
    inner: NameHandle,
    overlay: I,
}

impl<I> WrappedName<I> {
    pub fn new(inner: NameHandle, overlay: I) -> Self {
        WrappedName { inner, overlay }
    }

    pub fn wrapped(&self) -> &NameHandle {
        &self.inner
    }
}

impl<I: WrappedInfer + Clone + 'static> NameDef for WrappedName<I> {
    fn string_name(&self) -> &str {
        self.inner.string_name()
    }

    fn start_pos(&self) -> Option<Pos> {
        self.inner.start_pos()
    }

    fn parent_context(&self) -> Option<ContextHandle> {
        self.inner.parent_context()
    }

    fn root_context(&self) -> ContextHandle {
        self.inner.root_context()
    }

    fn infer(&self) -> ValueSet {
        self.overlay.infer(&self.inner)
    }

    fn goto(&self) -> Vec<NameHandle> {
        self.inner.goto()
    }

    fn qualified_names(&self, include_module_names: bool) -> Option<Vec<String>> {
        self.inner.qualified_names(include_module_names)
    }

    fn own_qualified_names(&self) -> Option<Vec<String>> {
        self.inner.own_qualified_names()
    }

    fn public_name(&self) -> &str {
        self.inner.public_name()
    }

    fn is_import(&self) -> bool {
        self.inner.is_import()
    }

    fn api_type(&self) -> ApiType {
        self.inner.api_type()
    }

    fn is_value_name(&self) -> bool {
        self.inner.is_value_name()
    }

    fn tree_name(&self) -> Option<NameRef> {
        self.inner.tree_name()
    }

    fn clone_name(&self) -> NameHandle {
        Rc::new(self.clone())
    }
}

impl<I: WrappedInfer + Clone + 'static> fmt::Debug for WrappedName<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_name(f, "WrappedName", self)
    }
}
