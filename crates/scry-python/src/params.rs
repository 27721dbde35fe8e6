//! Parameter names and kinds.
//!
//! Python distinguishes five parameter kinds, and only some of them are
//! spelled out in the source (`*args`, `**kwargs`, the bare `*` and `/`
//! markers). [`param_kind`] recovers the kind of any parameter from its
//! signature alone; [`TreeParamName`] and friends expose parameters through
//! the [`NameDef`] interface with signature rendering on top.

use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::infer::{ApiType, CallArgumentsHandle, ContextHandle, ValueHandle, ValueSet};
use crate::names::{fmt_name, tree_qualified_names, NameDef, NameHandle};
use crate::tree::{ExprRef, NameRef, ParamListItem, ParamRef};
use scry_core::Pos;

// ============================================================================
// ParamKind
// ============================================================================

/// The binding discipline of one parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamKind {
    PositionalOnly,
    PositionalOrKeyword,
    VarPositional,
    KeywordOnly,
    VarKeyword,
}

impl ParamKind {
    /// The star prefix the kind carries in a signature.
    pub fn prefix(self) -> &'static str {
        match self {
            ParamKind::VarPositional => "*",
            ParamKind::VarKeyword => "**",
            _ => "",
        }
    }
}

/// Determine the kind of a parameter from its signature.
///
/// Starred parameters answer directly. A `__` name prefix marks positional
/// only, the stub-file convention. Everything else takes a scan over the
/// parameter list: a `/` after this parameter makes it positional only, a
/// bare `*` or a starred parameter before it makes it keyword only.
pub fn param_kind(param: &ParamRef) -> ParamKind {
    match param.star_count() {
        1 => return ParamKind::VarPositional,
        2 => return ParamKind::VarKeyword,
        _ => {}
    }
    if param.name_value().starts_with("__") {
        return ParamKind::PositionalOnly;
    }
    let mut appeared = false;
    for item in param.list().items() {
        if appeared {
            if matches!(item, ParamListItem::Slash) {
                return ParamKind::PositionalOnly;
            }
        } else {
            match item {
                ParamListItem::Star => return ParamKind::KeywordOnly,
                ParamListItem::Param(other) => {
                    if other.star_count() > 0 {
                        return ParamKind::KeywordOnly;
                    }
                    if other == *param {
                        appeared = true;
                    }
                }
                ParamListItem::Slash => {}
            }
        }
    }
    ParamKind::PositionalOrKeyword
}

// ============================================================================
// ParamNameLike
// ============================================================================

/// A shared, dynamically typed parameter name.
pub type ParamNameHandle = Rc<dyn ParamNameLike>;

/// What parameter names answer beyond the plain name interface.
pub trait ParamNameLike: NameDef {
    fn kind(&self) -> ParamKind;

    /// The parameter as it appears in a signature, annotation and default
    /// included.
    fn to_param_string(&self) -> String;

    /// The param name bound by an actual call, when one is known.
    fn executed_param(&self) -> Option<ParamNameHandle> {
        None
    }

    fn star_count(&self) -> u8 {
        match self.kind() {
            ParamKind::VarPositional => 1,
            ParamKind::VarKeyword => 2,
            _ => 0,
        }
    }

    /// Whether an argument could bind this parameter by position.
    fn maybe_positional_argument(&self, include_star: bool) -> bool {
        match self.kind() {
            ParamKind::PositionalOnly | ParamKind::PositionalOrKeyword => true,
            ParamKind::VarPositional => include_star,
            _ => false,
        }
    }

    /// Whether an argument could bind this parameter by keyword.
    fn maybe_keyword_argument(&self, include_stars: bool) -> bool {
        match self.kind() {
            ParamKind::KeywordOnly | ParamKind::PositionalOrKeyword => true,
            ParamKind::VarKeyword => include_stars,
            _ => false,
        }
    }
}

// ============================================================================
// TreeParamName
// ============================================================================

/// A parameter of a function value, outside any particular call.
#[derive(Clone)]
pub struct TreeParamName {
    function: ValueHandle,
    parent_context: ContextHandle,
    param: ParamRef,
}

impl TreeParamName {
    pub fn new(function: ValueHandle, param: ParamRef) -> Self {
        let parent_context = function.clone().default_param_context();
        TreeParamName {
            function,
            parent_context,
            param,
        }
    }

    pub fn function(&self) -> &ValueHandle {
        &self.function
    }

    pub fn annotation(&self) -> Option<ExprRef> {
        self.param.annotation()
    }

    pub fn default_value(&self) -> Option<ExprRef> {
        self.param.default_value()
    }

    /// Values of the annotation. `execute` turns the annotation into
    /// instances (`x: T` binds a `T`, not the class itself); `ignore_stars`
    /// skips the tuple/dict wrapping of starred parameters.
    pub fn infer_annotation(&self, execute: bool, ignore_stars: bool) -> ValueSet {
        let state = self.parent_context.state();
        let values = state.infer_param(&self.function, &self.param, ignore_stars);
        if execute {
            return state.execute_annotation(values);
        }
        values
    }

    /// Values of the default expression, when there is one.
    pub fn infer_default(&self) -> ValueSet {
        match self.param.default_value() {
            Some(node) => self.parent_context.infer_node(&node),
            None => ValueSet::empty(),
        }
    }
}

impl NameDef for TreeParamName {
    fn string_name(&self) -> &str {
        self.param.name_value()
    }

    fn start_pos(&self) -> Option<Pos> {
        Some(self.param.name().start())
    }

    fn parent_context(&self) -> Option<ContextHandle> {
        Some(self.parent_context.clone())
    }

    fn infer(&self) -> ValueSet {
        let values = self.infer_annotation(true, false);
        if !values.is_empty() {
            return values;
        }
        let state = self.parent_context.state();
        state.docstring_param_types(&self.function, &self.param)
    }

    fn qualified_names(&self, include_module_names: bool) -> Option<Vec<String>> {
        tree_qualified_names(
            &self.param.name(),
            || self.root_context(),
            || self.own_qualified_names(),
            include_module_names,
        )
    }

    fn own_qualified_names(&self) -> Option<Vec<String>> {
        let mut names = self.parent_context.qualified_names()?;
        names.push(self.param.name_value().to_string());
        Some(names)
    }

    fn public_name(&self) -> &str {
        let name = self.param.name_value();
        name.strip_prefix("__").unwrap_or(name)
    }

    fn api_type(&self) -> ApiType {
        ApiType::Param
    }

    fn tree_name(&self) -> Option<NameRef> {
        Some(self.param.name())
    }

    fn clone_name(&self) -> NameHandle {
        Rc::new(self.clone())
    }
}

impl ParamNameLike for TreeParamName {
    fn kind(&self) -> ParamKind {
        param_kind(&self.param)
    }

    fn to_param_string(&self) -> String {
        let mut output = format!("{}{}", self.kind().prefix(), self.public_name());
        if let Some(annotation) = self.param.annotation() {
            output.push_str(": ");
            output.push_str(annotation.code());
        }
        if let Some(default) = self.param.default_value() {
            output.push('=');
            output.push_str(default.code());
        }
        output
    }
}

impl fmt::Debug for TreeParamName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_name(f, "TreeParamName", self)
    }
}

// ============================================================================
// CallBoundParamName
// ============================================================================

/// A parameter seen through one call site.
///
/// Adds the arguments actually passed: when neither annotation nor
/// docstring says anything, the bound argument's values answer instead.
#[derive(Clone)]
pub struct CallBoundParamName {
    inner: TreeParamName,
    arguments: CallArgumentsHandle,
}

impl CallBoundParamName {
    pub fn new(function: ValueHandle, param: ParamRef, arguments: CallArgumentsHandle) -> Self {
        CallBoundParamName {
            inner: TreeParamName::new(function, param),
            arguments,
        }
    }
}

impl NameDef for CallBoundParamName {
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
        let values = self.inner.infer();
        if !values.is_empty() {
            return values;
        }
        match self.executed_param() {
            Some(executed) => executed.infer(),
            None => ValueSet::empty(),
        }
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

    fn api_type(&self) -> ApiType {
        ApiType::Param
    }

    fn tree_name(&self) -> Option<NameRef> {
        self.inner.tree_name()
    }

    fn clone_name(&self) -> NameHandle {
        Rc::new(self.clone())
    }
}

impl ParamNameLike for CallBoundParamName {
    fn kind(&self) -> ParamKind {
        self.inner.kind()
    }

    fn to_param_string(&self) -> String {
        self.inner.to_param_string()
    }

    fn executed_param(&self) -> Option<ParamNameHandle> {
        let names = self.arguments.executed_param_names(&self.inner.function);
        names.into_iter().nth(self.inner.param.position_index())
    }
}

impl fmt::Debug for CallBoundParamName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_name(f, "CallBoundParamName", self)
    }
}

// ============================================================================
// ParamNameWrapper
// ============================================================================

/// Verbatim delegation around any param name.
///
/// A base for decorations that adjust a single answer; on its own it
/// changes nothing.
#[derive(Clone)]
pub struct ParamNameWrapper {
    inner: ParamNameHandle,
}

impl ParamNameWrapper {
    pub fn new(inner: ParamNameHandle) -> Self {
        ParamNameWrapper { inner }
    }

    pub fn wrapped(&self) -> &ParamNameHandle {
        &self.inner
    }
}

impl NameDef for ParamNameWrapper {
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
        self.inner.infer()
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

impl ParamNameLike for ParamNameWrapper {
    fn kind(&self) -> ParamKind {
        self.inner.kind()
    }

    fn to_param_string(&self) -> String {
        self.inner.to_param_string()
    }

    fn executed_param(&self) -> Option<ParamNameHandle> {
        self.inner.executed_param()
    }

    fn star_count(&self) -> u8 {
        self.inner.star_count()
    }

    fn maybe_positional_argument(&self, include_star: bool) -> bool {
        self.inner.maybe_positional_argument(include_star)
    }

    fn maybe_keyword_argument(&self, include_stars: bool) -> bool {
        self.inner.maybe_keyword_argument(include_stars)
    }
}

impl fmt::Debug for ParamNameWrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_name(f, "ParamNameWrapper", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{StubArguments, StubParamName, StubState, StubValue};
    use crate::tree::{DefinitionKind, ScopeKind, ScopeRef, TreeBuilder};

    /// Build a parameter list from slot specs: `"a"`, `"a:int"`, `"a=1"`,
    /// `"*args"`, `"**kw"`, and the bare `"*"` / `"/"` markers.
    fn build_params(slots: &[&str]) -> Vec<ParamRef> {
        let mut builder = TreeBuilder::new("mod");
        let root = builder.root();
        let f_name = builder.add_name(
            root,
            "f",
            Pos::new(1, 4),
            None,
            Some(DefinitionKind::Function),
        );
        let scope = builder.open_scope(root, ScopeKind::Function, Some(f_name), Pos::new(1, 0));
        let list = builder.begin_params(scope);
        for (i, slot) in slots.iter().enumerate() {
            match *slot {
                "*" => builder.add_star_marker(list),
                "/" => builder.add_slash_marker(list),
                spec => {
                    let (star_count, rest) = if let Some(rest) = spec.strip_prefix("**") {
                        (2, rest)
                    } else if let Some(rest) = spec.strip_prefix('*') {
                        (1, rest)
                    } else {
                        (0, spec)
                    };
                    let (rest, default) = match rest.split_once('=') {
                        Some((head, default)) => (head, Some(default)),
                        None => (rest, None),
                    };
                    let (name, annotation) = match rest.split_once(':') {
                        Some((head, annotation)) => (head, Some(annotation)),
                        None => (rest, None),
                    };
                    let name_id = builder.add_name(
                        scope,
                        name,
                        Pos::new(1, 6 + i as u32),
                        None,
                        Some(DefinitionKind::Param),
                    );
                    let annotation =
                        annotation.map(|code| builder.add_expr(code, Pos::new(1, 6 + i as u32)));
                    let default =
                        default.map(|code| builder.add_expr(code, Pos::new(1, 6 + i as u32)));
                    builder.add_param(list, name_id, star_count, annotation, default);
                }
            }
        }
        builder.close_scope(scope, Pos::new(2, 8));
        let tree = Rc::new(builder.finish("def f():\n    pass"));
        ScopeRef::new(tree, scope, 0).params()
    }

    fn kinds(slots: &[&str]) -> Vec<ParamKind> {
        build_params(slots).iter().map(param_kind).collect()
    }

    mod kind {
        use super::*;

        #[test]
        fn plain_params_take_either() {
            assert_eq!(
                kinds(&["a", "b"]),
                vec![
                    ParamKind::PositionalOrKeyword,
                    ParamKind::PositionalOrKeyword
                ]
            );
        }

        #[test]
        fn starred_params_answer_directly() {
            assert_eq!(
                kinds(&["*args", "**kw"]),
                vec![ParamKind::VarPositional, ParamKind::VarKeyword]
            );
        }

        #[test]
        fn bare_star_starts_keyword_only() {
            assert_eq!(
                kinds(&["a", "*", "b"]),
                vec![ParamKind::PositionalOrKeyword, ParamKind::KeywordOnly]
            );
        }

        #[test]
        fn starred_param_starts_keyword_only() {
            assert_eq!(
                kinds(&["a", "*args", "b"]),
                vec![
                    ParamKind::PositionalOrKeyword,
                    ParamKind::VarPositional,
                    ParamKind::KeywordOnly
                ]
            );
        }

        #[test]
        fn slash_ends_positional_only() {
            assert_eq!(
                kinds(&["a", "/", "b"]),
                vec![ParamKind::PositionalOnly, ParamKind::PositionalOrKeyword]
            );
        }

        #[test]
        fn dunder_prefix_is_positional_only() {
            assert_eq!(kinds(&["__x"]), vec![ParamKind::PositionalOnly]);
        }

        #[test]
        fn serde_uses_snake_case() {
            let kind = ParamKind::PositionalOrKeyword;
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, "\"positional_or_keyword\"");
            let back: ParamKind = serde_json::from_str(&json).unwrap();
            assert_eq!(back, kind);
        }
    }

    mod tree_param {
        use super::*;

        fn param_name(slots: &[&str], index: usize) -> (Rc<StubState>, TreeParamName) {
            let state = StubState::new();
            let function = StubValue::function(state.clone(), &["mod", "f"]);
            let params = build_params(slots);
            (state, TreeParamName::new(function, params[index].clone()))
        }

        #[test]
        fn renders_signature_forms() {
            let cases = [
                (vec!["a"], 0, "a"),
                (vec!["a:int"], 0, "a: int"),
                (vec!["a=3"], 0, "a=3"),
                (vec!["a:int=3"], 0, "a: int=3"),
                (vec!["*args"], 0, "*args"),
                (vec!["**kwargs"], 0, "**kwargs"),
            ];
            for (slots, index, expected) in cases {
                let (_state, name) = param_name(&slots, index);
                assert_eq!(name.to_param_string(), expected);
            }
        }

        #[test]
        fn dunder_names_are_stripped_in_public() {
            let (_state, name) = param_name(&["__x"], 0);
            assert_eq!(name.string_name(), "__x");
            assert_eq!(name.public_name(), "x");
            assert_eq!(name.to_param_string(), "x");
        }

        #[test]
        fn annotation_wins_over_docstring() {
            let (state, name) = param_name(&["a:int"], 0);
            let annotated = StubValue::module(state.clone(), &["int"]);
            state.set_param_values(ValueSet::single(annotated));
            state.set_docstring_values(ValueSet::empty());
            let values = name.infer();
            assert_eq!(values.len(), 1);
            assert_eq!(state.annotation_executions(), 1);
        }

        #[test]
        fn docstring_fills_in_for_missing_annotation() {
            let (state, name) = param_name(&["a"], 0);
            let documented = StubValue::module(state.clone(), &["str"]);
            state.set_param_values(ValueSet::empty());
            state.set_docstring_values(ValueSet::single(documented));
            let values = name.infer();
            assert_eq!(values.len(), 1);
        }

        #[test]
        fn infer_default_uses_the_parent_context() {
            let (state, name) = param_name(&["a=3"], 0);
            let number = StubValue::module(state.clone(), &["int"]);
            state.set_node_values(ValueSet::single(number));
            assert_eq!(name.infer_default().len(), 1);

            let (_state, bare) = param_name(&["a"], 0);
            assert!(bare.infer_default().is_empty());
        }

        #[test]
        fn classified_as_param() {
            let (_state, name) = param_name(&["a"], 0);
            assert_eq!(name.api_type(), ApiType::Param);
            assert_eq!(name.kind(), ParamKind::PositionalOrKeyword);
            assert_eq!(name.star_count(), 0);
            assert!(name.tree_name().is_some());
        }

        #[test]
        fn qualified_names_run_through_the_function_context() {
            let (_state, name) = param_name(&["a"], 0);
            assert_eq!(
                name.qualified_names(false),
                Some(vec!["f".to_string(), "a".to_string()])
            );
        }
    }

    mod call_bound {
        use super::*;

        #[test]
        fn executed_param_matches_by_position() {
            let state = StubState::new();
            let function = StubValue::function(state.clone(), &["mod", "f"]);
            let params = build_params(&["a", "b"]);
            let executed = StubValue::module(state.clone(), &["bound"]);
            let arguments = StubArguments::new(vec![
                StubParamName::new("a", ValueSet::empty()),
                StubParamName::new("b", ValueSet::single(executed)),
            ]);

            let name = CallBoundParamName::new(function, params[1].clone(), arguments);
            let bound = name.executed_param().unwrap();
            assert_eq!(bound.string_name(), "b");
            assert_eq!(name.infer().len(), 1);
        }

        #[test]
        fn out_of_range_position_resolves_to_nothing() {
            let state = StubState::new();
            let function = StubValue::function(state.clone(), &["mod", "f"]);
            let params = build_params(&["a", "b"]);
            let arguments = StubArguments::new(vec![StubParamName::new("a", ValueSet::empty())]);

            let name = CallBoundParamName::new(function, params[1].clone(), arguments);
            assert!(name.executed_param().is_none());
            assert!(name.infer().is_empty());
        }

        #[test]
        fn annotation_still_wins() {
            let state = StubState::new();
            let function = StubValue::function(state.clone(), &["mod", "f"]);
            let params = build_params(&["a:int"]);
            let annotated = StubValue::module(state.clone(), &["int"]);
            state.set_param_values(ValueSet::single(annotated));
            let arguments = StubArguments::new(Vec::new());

            let name = CallBoundParamName::new(function, params[0].clone(), arguments);
            assert_eq!(name.infer().len(), 1);
        }
    }

    mod wrapper {
        use super::*;

        #[test]
        fn forwards_everything() {
            let inner = StubParamName::with_kind("x", ParamKind::KeywordOnly);
            let wrapper = ParamNameWrapper::new(inner);
            assert_eq!(wrapper.string_name(), "x");
            assert_eq!(wrapper.kind(), ParamKind::KeywordOnly);
            assert_eq!(wrapper.to_param_string(), "x");
            assert!(wrapper.maybe_keyword_argument(false));
            assert!(!wrapper.maybe_positional_argument(true));
            assert_eq!(format!("{wrapper:?}"), "<ParamNameWrapper: x>");
        }
    }

    mod argument_matching {
        use super::*;

        fn with_kind(kind: ParamKind) -> ParamNameHandle {
            StubParamName::with_kind("p", kind)
        }

        #[test]
        fn positional_matrix() {
            assert!(with_kind(ParamKind::PositionalOnly).maybe_positional_argument(false));
            assert!(with_kind(ParamKind::PositionalOrKeyword).maybe_positional_argument(false));
            assert!(!with_kind(ParamKind::VarPositional).maybe_positional_argument(false));
            assert!(with_kind(ParamKind::VarPositional).maybe_positional_argument(true));
            assert!(!with_kind(ParamKind::KeywordOnly).maybe_positional_argument(true));
            assert!(!with_kind(ParamKind::VarKeyword).maybe_positional_argument(true));
        }

        #[test]
        fn keyword_matrix() {
            assert!(with_kind(ParamKind::KeywordOnly).maybe_keyword_argument(false));
            assert!(with_kind(ParamKind::PositionalOrKeyword).maybe_keyword_argument(false));
            assert!(!with_kind(ParamKind::VarKeyword).maybe_keyword_argument(false));
            assert!(with_kind(ParamKind::VarKeyword).maybe_keyword_argument(true));
            assert!(!with_kind(ParamKind::PositionalOnly).maybe_keyword_argument(true));
            assert!(!with_kind(ParamKind::VarPositional).maybe_keyword_argument(true));
        }

        #[test]
        fn star_counts_follow_kind() {
            assert_eq!(with_kind(ParamKind::VarPositional).star_count(), 1);
            assert_eq!(with_kind(ParamKind::VarKeyword).star_count(), 2);
            assert_eq!(with_kind(ParamKind::PositionalOnly).star_count(), 0);
        }
    }
}
