//! Inference collaborator contracts.
//!
//! Everything in this crate is syntactic; anything semantic (resolving a
//! name to its values, executing an annotation, following an import) is
//! reached through the traits here. An embedding engine implements them and
//! hands the crate trait-object handles. The crate is single-threaded, so
//! handles are `Rc`, not `Arc`.

use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::names::NameHandle;
use crate::params::ParamNameHandle;
use crate::tree::{ExprRef, NameRef, ParamRef};

// ============================================================================
// ApiType
// ============================================================================

/// Coarse classification of a definition, as editors present it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiType {
    Module,
    Class,
    Function,
    Param,
    Statement,
    Keyword,
}

impl ApiType {
    pub fn as_str(self) -> &'static str {
        match self {
            ApiType::Module => "module",
            ApiType::Class => "class",
            ApiType::Function => "function",
            ApiType::Param => "param",
            ApiType::Statement => "statement",
            ApiType::Keyword => "keyword",
        }
    }
}

impl fmt::Display for ApiType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// ValueSet
// ============================================================================

/// An ordered set of inferred values.
///
/// Deduplication is by handle identity (`Rc` pointer), since values are
/// opaque to this crate. Insertion order is preserved, so results stay
/// deterministic.
#[derive(Clone, Default)]
pub struct ValueSet {
    values: Vec<ValueHandle>,
}

impl ValueSet {
    pub fn empty() -> Self {
        ValueSet { values: Vec::new() }
    }

    pub fn single(value: ValueHandle) -> Self {
        ValueSet {
            values: vec![value],
        }
    }

    /// Build a set from values in order, dropping duplicates.
    pub fn from_values(values: Vec<ValueHandle>) -> Self {
        values.into_iter().collect()
    }

    /// Append a value unless the set already holds it.
    pub fn push(&mut self, value: ValueHandle) {
        if !self.contains(&value) {
            self.values.push(value);
        }
    }

    /// This set followed by the values of `other` that are new.
    pub fn union(&self, other: &ValueSet) -> ValueSet {
        let mut merged = self.clone();
        for value in other.iter() {
            merged.push(value.clone());
        }
        merged
    }

    pub fn first(&self) -> Option<&ValueHandle> {
        self.values.first()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ValueHandle> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn contains(&self, value: &ValueHandle) -> bool {
        self.values.iter().any(|held| Rc::ptr_eq(held, value))
    }
}

impl FromIterator<ValueHandle> for ValueSet {
    fn from_iter<I: IntoIterator<Item = ValueHandle>>(iter: I) -> Self {
        let mut set = ValueSet::empty();
        for value in iter {
            set.push(value);
        }
        set
    }
}

impl IntoIterator for ValueSet {
    type Item = ValueHandle;
    type IntoIter = std::vec::IntoIter<ValueHandle>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.into_iter()
    }
}

impl fmt::Debug for ValueSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<ValueSet: {} values>", self.values.len())
    }
}

// ============================================================================
// Collaborator Traits
// ============================================================================

/// A semantic value: a module, class, function, or instance as the
/// embedding engine models it.
pub trait Value {
    fn api_type(&self) -> ApiType;

    /// The value's own definition name.
    fn name(&self) -> NameHandle;

    /// The dotted-name chain from the value's module root, if the value has
    /// a stable one.
    fn qualified_names(&self) -> Option<Vec<String>>;

    fn parent_context(&self) -> Option<ContextHandle>;

    /// The value viewed as a context for resolution inside it.
    fn as_context(self: Rc<Self>) -> ContextHandle;

    /// The context parameter defaults are evaluated in. Plain functions use
    /// their own context; bound methods override this with the instance's.
    fn default_param_context(self: Rc<Self>) -> ContextHandle {
        self.as_context()
    }
}

/// A resolution context: the scope-like thing a name is looked up in.
pub trait Context {
    fn state(&self) -> InferenceHandle;

    /// The module context at the root of this context's parent chain. A
    /// module context returns itself.
    fn root_context(self: Rc<Self>) -> ContextHandle;

    fn api_type(&self) -> ApiType;

    /// The dotted-name chain from the module root, if stable.
    fn qualified_names(&self) -> Option<Vec<String>>;

    /// The dotted-name segments of the enclosing module (`["os", "path"]`
    /// for `os.path`), or `None` when the module has no importable name.
    fn string_names(&self) -> Option<Vec<String>>;

    /// True when this context is a package (`__init__` module).
    fn is_package(&self) -> bool {
        false
    }

    /// Infer the values of an expression in this context.
    fn infer_node(&self, node: &ExprRef) -> ValueSet;
}

/// The engine's resolution entry points.
pub trait InferenceState {
    /// Definitions `name` refers to, without inferring their values.
    fn goto(&self, context: &ContextHandle, name: &NameRef) -> Vec<NameHandle>;

    /// Values `name` refers to.
    fn infer_name(&self, context: &ContextHandle, name: &NameRef) -> ValueSet;

    /// Annotation-declared types for `param` of `function`. With
    /// `ignore_stars` the declared type is reported without the tuple/dict
    /// wrapping that `*args` / `**kwargs` introduce.
    fn infer_param(&self, function: &ValueHandle, param: &ParamRef, ignore_stars: bool)
        -> ValueSet;

    /// Turn annotation values into the instances they describe.
    fn execute_annotation(&self, values: ValueSet) -> ValueSet;

    /// Docstring-declared types for `param` of `function`.
    fn docstring_param_types(&self, function: &ValueHandle, param: &ParamRef) -> ValueSet;
}

/// Resolves dotted import paths to module values.
pub trait Importer {
    /// Follow `names` (one segment per element) from `from_module`.
    /// `level` counts leading dots of a relative import; 0 is absolute.
    fn follow(&self, names: &[String], level: u32, from_module: &ContextHandle) -> ValueSet;
}

/// A concrete call site's arguments, bound to a function's parameters.
pub trait CallArguments {
    /// Parameter names of `function` with call-site bindings applied, in
    /// declaration order.
    fn executed_param_names(&self, function: &ValueHandle) -> Vec<ParamNameHandle>;
}

pub type ValueHandle = Rc<dyn Value>;
pub type ContextHandle = Rc<dyn Context>;
pub type InferenceHandle = Rc<dyn InferenceState>;
pub type ImporterHandle = Rc<dyn Importer>;
pub type CallArgumentsHandle = Rc<dyn CallArguments>;

// ============================================================================
// Tests
// ============================================================================
