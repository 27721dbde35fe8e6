//! Canned collaborators for tests.
//!
//! The crate resolves nothing by itself; every semantic question goes out
//! through the trait seams in [`crate::infer`]. The stubs here answer those
//! questions with fixed values and record what they were asked, which is
//! all the tests need to pin down the crate's side of each conversation.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::infer::{
    ApiType, CallArguments, Context, ContextHandle, Importer, InferenceHandle, InferenceState,
    Value, ValueHandle, ValueSet,
};
use crate::names::{NameDef, NameHandle};
use crate::params::{ParamKind, ParamNameHandle, ParamNameLike};
use crate::tree::{ExprRef, NameRef, ParamRef};

// ============================================================================
// StubState
// ============================================================================

/// An inference engine with scripted answers.
#[derive(Default)]
pub struct StubState {
    name_values: RefCell<ValueSet>,
    goto_results: RefCell<Vec<NameHandle>>,
    param_values: RefCell<ValueSet>,
    docstring_values: RefCell<ValueSet>,
    node_values: RefCell<ValueSet>,
    annotation_executions: Cell<usize>,
}

impl StubState {
    pub fn new() -> Rc<Self> {
        Rc::new(StubState::default())
    }

    pub fn set_name_values(&self, values: ValueSet) {
        *self.name_values.borrow_mut() = values;
    }

    pub fn push_goto_result(&self, name: NameHandle) {
        self.goto_results.borrow_mut().push(name);
    }

    pub fn set_param_values(&self, values: ValueSet) {
        *self.param_values.borrow_mut() = values;
    }

    pub fn set_docstring_values(&self, values: ValueSet) {
        *self.docstring_values.borrow_mut() = values;
    }

    pub fn set_node_values(&self, values: ValueSet) {
        *self.node_values.borrow_mut() = values;
    }

    /// How many times `execute_annotation` ran.
    pub fn annotation_executions(&self) -> usize {
        self.annotation_executions.get()
    }

    fn node_values(&self) -> ValueSet {
        self.node_values.borrow().clone()
    }
}

impl InferenceState for StubState {
    fn goto(&self, _context: &ContextHandle, _name: &NameRef) -> Vec<NameHandle> {
        self.goto_results.borrow().clone()
    }

    fn infer_name(&self, _context: &ContextHandle, _name: &NameRef) -> ValueSet {
        self.name_values.borrow().clone()
    }

    fn infer_param(
        &self,
        _function: &ValueHandle,
        _param: &ParamRef,
        _ignore_stars: bool,
    ) -> ValueSet {
        self.param_values.borrow().clone()
    }

    fn execute_annotation(&self, values: ValueSet) -> ValueSet {
        self.annotation_executions
            .set(self.annotation_executions.get() + 1);
        values
    }

    fn docstring_param_types(&self, _function: &ValueHandle, _param: &ParamRef) -> ValueSet {
        self.docstring_values.borrow().clone()
    }
}

// ============================================================================
// StubContext
// ============================================================================

/// A context with fixed paths.
pub struct StubContext {
    state: Rc<StubState>,
    api_type: ApiType,
    module_path: Vec<String>,
    local_chain: Vec<String>,
    package: bool,
}

impl StubContext {
    /// A plain module context.
    pub fn module(state: Rc<StubState>, path: &[&str]) -> ContextHandle {
        Rc::new(StubContext {
            state,
            api_type: ApiType::Module,
            module_path: owned(path),
            local_chain: Vec::new(),
            package: false,
        })
    }

    /// A package `__init__` context.
    pub fn package(state: Rc<StubState>, path: &[&str]) -> ContextHandle {
        Rc::new(StubContext {
            state,
            api_type: ApiType::Module,
            module_path: owned(path),
            local_chain: Vec::new(),
            package: true,
        })
    }

    /// A class-like context nested inside a module, e.g. the body of
    /// `Outer` with `local_chain = ["Outer"]`.
    pub fn nested(state: Rc<StubState>, module_path: &[&str], local_chain: &[&str]) -> ContextHandle {
        Rc::new(StubContext {
            state,
            api_type: ApiType::Class,
            module_path: owned(module_path),
            local_chain: owned(local_chain),
            package: false,
        })
    }
}

impl Context for StubContext {
    fn state(&self) -> InferenceHandle {
        self.state.clone()
    }

    fn root_context(self: Rc<Self>) -> ContextHandle {
        if self.local_chain.is_empty() {
            return self;
        }
        Rc::new(StubContext {
            state: self.state.clone(),
            api_type: ApiType::Module,
            module_path: self.module_path.clone(),
            local_chain: Vec::new(),
            package: self.package,
        })
    }

    fn api_type(&self) -> ApiType {
        self.api_type
    }

    fn qualified_names(&self) -> Option<Vec<String>> {
        Some(self.local_chain.clone())
    }

    fn string_names(&self) -> Option<Vec<String>> {
        Some(self.module_path.clone())
    }

    fn is_package(&self) -> bool {
        self.package
    }

    fn infer_node(&self, _node: &ExprRef) -> ValueSet {
        self.state.node_values()
    }
}

// ============================================================================
// StubValue
// ============================================================================

/// A value that can also act as its own context.
pub struct StubValue {
    state: Rc<StubState>,
    api_type: ApiType,
    path: Vec<String>,
    parent: Option<ContextHandle>,
}

impl StubValue {
    /// A module value named by `path`, its own root.
    pub fn module(state: Rc<StubState>, path: &[&str]) -> ValueHandle {
        Rc::new(StubValue {
            state,
            api_type: ApiType::Module,
            path: owned(path),
            parent: None,
        })
    }

    /// A function value; everything but the last path segment is the
    /// enclosing module.
    pub fn function(state: Rc<StubState>, path: &[&str]) -> ValueHandle {
        let parent = StubContext::module(state.clone(), &path[..path.len() - 1]);
        Rc::new(StubValue {
            state,
            api_type: ApiType::Function,
            path: owned(path),
            parent: Some(parent),
        })
    }

    fn label(&self) -> &str {
        self.path.last().map(String::as_str).unwrap_or("")
    }
}

impl Value for StubValue {
    fn api_type(&self) -> ApiType {
        self.api_type
    }

    fn name(&self) -> NameHandle {
        LabelName::new(self.label())
    }

    fn qualified_names(&self) -> Option<Vec<String>> {
        Some(self.path.clone())
    }

    fn parent_context(&self) -> Option<ContextHandle> {
        self.parent.clone()
    }

    fn as_context(self: Rc<Self>) -> ContextHandle {
        self
    }
}

impl Context for StubValue {
    fn state(&self) -> InferenceHandle {
        self.state.clone()
    }

    fn root_context(self: Rc<Self>) -> ContextHandle {
        match self.parent.clone() {
            Some(parent) => parent.root_context(),
            None => self,
        }
    }

    fn api_type(&self) -> ApiType {
        self.api_type
    }

    fn qualified_names(&self) -> Option<Vec<String>> {
        match self.api_type {
            ApiType::Module => Some(Vec::new()),
            _ => Some(vec![self.label().to_string()]),
        }
    }

    fn string_names(&self) -> Option<Vec<String>> {
        match self.api_type {
            ApiType::Module => Some(self.path.clone()),
            _ => self.parent.as_ref().and_then(|parent| parent.string_names()),
        }
    }

    fn infer_node(&self, _node: &ExprRef) -> ValueSet {
        self.state.node_values()
    }
}

// ============================================================================
// LabelName
// ============================================================================

/// A detached name carrying only its text.
#[derive(Clone)]
pub struct LabelName {
    label: String,
}

impl LabelName {
    pub fn new(label: impl Into<String>) -> Rc<Self> {
        Rc::new(LabelName {
            label: label.into(),
        })
    }
}

impl NameDef for LabelName {
    fn string_name(&self) -> &str {
        &self.label
    }

    fn parent_context(&self) -> Option<ContextHandle> {
        None
    }

    fn infer(&self) -> ValueSet {
        ValueSet::empty()
    }

    fn api_type(&self) -> ApiType {
        ApiType::Statement
    }

    fn clone_name(&self) -> NameHandle {
        Rc::new(self.clone())
    }
}

// ============================================================================
// StubImporter
// ============================================================================

/// An importer that always resolves to the same values.
pub struct StubImporter {
    result: ValueSet,
    calls: RefCell<Vec<(Vec<String>, u32)>>,
}

impl StubImporter {
    pub fn returning(result: ValueSet) -> Rc<Self> {
        Rc::new(StubImporter {
            result,
            calls: RefCell::new(Vec::new()),
        })
    }

    /// Every `(names, level)` pair this importer was asked to follow.
    pub fn calls(&self) -> Vec<(Vec<String>, u32)> {
        self.calls.borrow().clone()
    }
}

impl Importer for StubImporter {
    fn follow(&self, names: &[String], level: u32, _from_module: &ContextHandle) -> ValueSet {
        self.calls.borrow_mut().push((names.to_vec(), level));
        self.result.clone()
    }
}

// ============================================================================
// StubArguments
// ============================================================================

/// Call arguments with a fixed executed-param list.
pub struct StubArguments {
    executed: Vec<ParamNameHandle>,
}

impl StubArguments {
    pub fn new(executed: Vec<ParamNameHandle>) -> Rc<Self> {
        Rc::new(StubArguments { executed })
    }
}

impl CallArguments for StubArguments {
    fn executed_param_names(&self, _function: &ValueHandle) -> Vec<ParamNameHandle> {
        self.executed.clone()
    }
}

// ============================================================================
// StubParamName
// ============================================================================

/// A param name with a fixed kind and resolution.
#[derive(Clone)]
pub struct StubParamName {
    name: String,
    kind: ParamKind,
    values: ValueSet,
}

impl StubParamName {
    pub fn new(name: impl Into<String>, values: ValueSet) -> Rc<Self> {
        Rc::new(StubParamName {
            name: name.into(),
            kind: ParamKind::PositionalOrKeyword,
            values,
        })
    }

    pub fn with_kind(name: impl Into<String>, kind: ParamKind) -> ParamNameHandle {
        Rc::new(StubParamName {
            name: name.into(),
            kind,
            values: ValueSet::empty(),
        })
    }
}

impl NameDef for StubParamName {
    fn string_name(&self) -> &str {
        &self.name
    }

    fn parent_context(&self) -> Option<ContextHandle> {
        None
    }

    fn infer(&self) -> ValueSet {
        self.values.clone()
    }

    fn api_type(&self) -> ApiType {
        ApiType::Param
    }

    fn clone_name(&self) -> NameHandle {
        Rc::new(self.clone())
    }
}

impl ParamNameLike for StubParamName {
    fn kind(&self) -> ParamKind {
        self.kind
    }

    fn to_param_string(&self) -> String {
        self.name.clone()
    }
}

fn owned(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|part| part.to_string()).collect()
}
