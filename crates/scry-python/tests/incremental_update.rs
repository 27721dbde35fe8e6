//! Integration tests for incremental document updates.
//!
//! These tests drive [`Document`] and [`DocumentCache`] through the public
//! API with real sources:
//! - Span reuse and tree identity across edits
//! - Offset shifting when text moves
//! - Chunk absorption under parsers that consume trailing context
//! - Prefix retention when the parser rejects a span
//! - Always-reparse mode
//! - Cursor promotion to the module or a local scope

use std::rc::Rc;

use scry_core::pos::Pos;
use scry_python::chunker::split_source;
use scry_python::tree::TreeBuilder;
use scry_python::{
    Document, DocumentCache, OutlineParser, ParseError, ParseOptions, SessionError, SpanParser,
    SpanRequest, SyntaxTree, UpdateStats, UserScope,
};

const THREE_FUNCS: &str =
    "def alpha():\n    return 1\n\ndef beta():\n    return 2\n\ndef gamma():\n    return 3\n";

fn document() -> Document {
    Document::new(
        Rc::new(OutlineParser::new()),
        ParseOptions::default(),
        Some("/pkg/sample.py".to_string()),
    )
}

/// Parses the whole remaining source as a single span.
struct GreedyParser;

impl SpanParser for GreedyParser {
    fn parse_span(&self, request: &SpanRequest<'_>) -> Result<SyntaxTree, ParseError> {
        Ok(TreeBuilder::new("module").finish(request.source))
    }
}

const MARKER: &str = "% unparsable %";

/// Rejects spans whose first chunk contains [`MARKER`].
struct BrittleParser;

impl SpanParser for BrittleParser {
    fn parse_span(&self, request: &SpanRequest<'_>) -> Result<SyntaxTree, ParseError> {
        let chunks = split_source(request.source);
        if chunks
            .first()
            .is_some_and(|chunk| chunk.text().contains(MARKER))
        {
            return Err(ParseError::Syntax {
                line: request.first_line,
                message: "unbalanced brackets".to_string(),
            });
        }
        OutlineParser::new().parse_span(request)
    }
}

// ============================================================================
// Reuse
// ============================================================================

mod reuse {
    use super::*;

    #[test]
    fn edit_one_chunk_reuses_the_rest() {
        let mut doc = document();
        doc.update(THREE_FUNCS, None).unwrap();
        let alpha = doc.view().units()[0].tree().clone();
        let gamma = doc.view().units()[2].tree().clone();

        let edited = THREE_FUNCS.replace("return 2", "return 20");
        doc.update(&edited, None).unwrap();
        assert_eq!(
            doc.last_stats(),
            UpdateStats {
                chunks: 3,
                reused: 2,
                parsed: 1,
                absorbed: 0,
            }
        );
        assert!(Rc::ptr_eq(&alpha, doc.view().units()[0].tree()));
        assert!(Rc::ptr_eq(&gamma, doc.view().units()[2].tree()));
        assert_eq!(doc.view().code().unwrap(), edited);
    }

    #[test]
    fn duplicate_chunks_reuse_only_one_unit() {
        let source = "def f():\n    pass\n\ndef f():\n    pass\n";
        let mut doc = document();
        doc.update(source, None).unwrap();
        assert_eq!(doc.last_stats().parsed, 2);

        doc.update(source, None).unwrap();
        assert_eq!(doc.last_stats().reused, 1);
        assert_eq!(doc.last_stats().parsed, 1);
        assert_eq!(doc.view().code().unwrap(), source);
    }
}

// ============================================================================
// Offsets
// ============================================================================

mod offsets {
    use super::*;

    #[test]
    fn insertion_above_shifts_reused_spans() {
        let mut doc = document();
        doc.update(THREE_FUNCS, None).unwrap();

        let inserted = format!("import os\n\n{THREE_FUNCS}");
        doc.update(&inserted, None).unwrap();
        assert_eq!(
            doc.last_stats(),
            UpdateStats {
                chunks: 4,
                reused: 3,
                parsed: 1,
                absorbed: 0,
            }
        );

        let starts: Vec<Pos> = doc
            .view()
            .sub_scopes()
            .unwrap()
            .iter()
            .map(|scope| scope.start())
            .collect();
        assert_eq!(starts, [Pos::new(3, 0), Pos::new(6, 0), Pos::new(9, 0)]);
        assert_eq!(doc.view().units()[1].line_offset(), 2);
        assert_eq!(doc.view().end_pos(), Some(Pos::new(11, 0)));
        assert_eq!(doc.view().code().unwrap(), inserted);
    }
}

// ============================================================================
// Absorption
// ============================================================================

mod absorption {
    use super::*;

    #[test]
    fn greedy_parser_absorbs_trailing_chunks() {
        let mut doc = Document::new(Rc::new(GreedyParser), ParseOptions::default(), None);
        doc.update(THREE_FUNCS, None).unwrap();
        assert_eq!(
            doc.last_stats(),
            UpdateStats {
                chunks: 3,
                reused: 0,
                parsed: 1,
                absorbed: 2,
            }
        );
        assert_eq!(doc.view().units().len(), 1);
        assert_eq!(doc.view().end_pos(), Some(Pos::new(9, 0)));
    }

    #[test]
    fn absorbed_spans_reuse_on_identical_update() {
        let mut doc = Document::new(Rc::new(GreedyParser), ParseOptions::default(), None);
        doc.update(THREE_FUNCS, None).unwrap();
        let tree = doc.view().units()[0].tree().clone();

        doc.update(THREE_FUNCS, None).unwrap();
        assert_eq!(
            doc.last_stats(),
            UpdateStats {
                chunks: 3,
                reused: 1,
                parsed: 0,
                absorbed: 2,
            }
        );
        assert!(Rc::ptr_eq(&tree, doc.view().units()[0].tree()));
    }
}

// ============================================================================
// Failures
// ============================================================================

mod failures {
    use super::*;

    fn broken_source() -> String {
        format!("def alpha():\n    return 1\n\nBETA = {MARKER}\n\ndef gamma():\n    return 3\n")
    }

    #[test]
    fn parse_error_keeps_the_rebuilt_prefix() {
        let mut doc = Document::new(Rc::new(BrittleParser), ParseOptions::default(), None);
        let err = doc.update(&broken_source(), None).unwrap_err();
        assert_eq!(
            err.to_string(),
            "syntax error at line 4: unbalanced brackets"
        );
        match err {
            SessionError::Parse(ParseError::Syntax { line, .. }) => assert_eq!(line, 4),
        }
        assert_eq!(doc.view().units().len(), 1);
        assert_eq!(
            doc.last_stats(),
            UpdateStats {
                chunks: 3,
                reused: 0,
                parsed: 1,
                absorbed: 0,
            }
        );
    }

    #[test]
    fn recovery_reuses_the_prefix() {
        let mut doc = Document::new(Rc::new(BrittleParser), ParseOptions::default(), None);
        doc.update(&broken_source(), None).unwrap_err();

        let fixed = broken_source().replace(MARKER, "2");
        doc.update(&fixed, None).unwrap();
        assert_eq!(
            doc.last_stats(),
            UpdateStats {
                chunks: 3,
                reused: 1,
                parsed: 2,
                absorbed: 0,
            }
        );
        assert_eq!(doc.view().code().unwrap(), fixed);
    }
}

// ============================================================================
// Modes
// ============================================================================

mod modes {
    use super::*;

    #[test]
    fn always_reparse_rebuilds_every_tree() {
        let mut doc = Document::new(
            Rc::new(OutlineParser::new()),
            ParseOptions::new().always_reparse(true),
            None,
        );
        doc.update(THREE_FUNCS, None).unwrap();
        let alpha = doc.view().units()[0].tree().clone();

        doc.update(THREE_FUNCS, None).unwrap();
        assert_eq!(doc.last_stats().parsed, 3);
        assert_eq!(doc.last_stats().reused, 0);
        assert!(!Rc::ptr_eq(&alpha, doc.view().units()[0].tree()));
    }
}

// ============================================================================
// Spans
// ============================================================================

mod spans {
    use super::*;

    #[test]
    fn end_pos_is_a_high_water_mark() {
        let mut doc = document();
        doc.update(THREE_FUNCS, None).unwrap();
        assert_eq!(doc.view().end_pos(), Some(Pos::new(9, 0)));

        doc.update("x = 1\n", None).unwrap();
        assert_eq!(doc.view().end_pos(), Some(Pos::new(9, 0)));

        doc.view_mut().reset_end_pos();
        assert_eq!(doc.view().end_pos(), None);
        doc.update("x = 1\n", None).unwrap();
        assert_eq!(doc.view().end_pos(), Some(Pos::new(2, 0)));
    }
}

// ============================================================================
// Cursors
// ============================================================================

mod cursors {
    use super::*;
    use scry_python::tree::{ScopeKind, StmtKind};

    const SOURCE: &str = "GAMMA = 3\n\ndef delta():\n    return GAMMA\n";

    #[test]
    fn cursor_promotes_to_the_module_at_top_level() {
        let mut doc = document();
        doc.update(SOURCE, Some(Pos::new(1, 0))).unwrap();
        let stmt = doc.user_stmt().expect("cursor is on the assignment");
        assert_eq!(stmt.kind(), StmtKind::Assign);
        assert_eq!(doc.user_scope(), Some(UserScope::Module));
    }

    #[test]
    fn cursor_in_a_nested_scope_is_local() {
        let mut doc = document();
        doc.update(SOURCE, Some(Pos::new(4, 4))).unwrap();
        match doc.user_scope() {
            Some(UserScope::Local(scope)) => {
                assert_eq!(scope.kind(), ScopeKind::Function);
                assert_eq!(
                    scope.name().map(|n| n.value().to_string()),
                    Some("delta".to_string())
                );
            }
            other => panic!("expected a local scope, got {other:?}"),
        }
    }
}

// ============================================================================
// Cache
// ============================================================================

mod cache {
    use super::*;

    #[test]
    fn sessions_track_paths_independently() {
        let mut cache = DocumentCache::new(Rc::new(OutlineParser::new()), ParseOptions::default());
        cache
            .update_document("/pkg/a.py", "def a():\n    pass\n", None)
            .unwrap();
        cache.update_document("/pkg/b.py", THREE_FUNCS, None).unwrap();
        cache.update_document("/pkg/b.py", THREE_FUNCS, None).unwrap();
        assert_eq!(cache.len(), 2);

        let a = cache.document("/pkg/a.py").expect("session exists");
        assert_eq!(a.last_stats().parsed, 1);
        let b = cache.document("/pkg/b.py").expect("session exists");
        assert_eq!(
            b.last_stats(),
            UpdateStats {
                chunks: 3,
                reused: 3,
                parsed: 0,
                absorbed: 0,
            }
        );
        assert_eq!(b.view().name().unwrap(), "b");
    }
}
