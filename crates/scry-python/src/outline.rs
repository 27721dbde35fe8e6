//! A line-oriented structural parser.
//!
//! [`OutlineParser`] is the built-in [`SpanParser`]. It recognizes the
//! outline of Python source (scopes, imports, bindings, name occurrences)
//! one line at a time and records it into a [`SyntaxTree`]. Each request
//! consumes exactly one chunk, so spans stay aligned with
//! [`crate::chunker::split_source`], and parsing never fails: anything the
//! parser does not recognize becomes a plain expression statement with its
//! identifiers recorded as name occurrences.
//!
//! This is deliberately not a grammar. One line is one statement, bracketed
//! continuations are approximated, and docstrings are the only multi-line
//! form it tracks.

use std::ffi::OsStr;
use std::path::Path;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use scry_core::pos::Pos;
use scry_core::text::{line_count, measure_indent};
use tracing::trace;

use crate::chunker::{split_source, SourceChunk};
use crate::tree::{
    DefinitionKind, ExprId, ImportKind, ParamListId, ParseResult, ScopeId, ScopeKind, SpanParser,
    SpanRequest, StmtId, StmtKind, SyntaxTree, TreeBuilder,
};

static DEF_HEAD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[ \t]*(?:async[ \t]+)?def[ \t]+([A-Za-z_]\w*)").expect("def regex is valid")
});

static CLASS_HEAD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[ \t]*class[ \t]+([A-Za-z_]\w*)").expect("class regex is valid")
});

static FROM_HEAD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[ \t]*from[ \t]+(\.*)[ \t]*([A-Za-z_][\w.]*)?[ \t]*import[ \t]+(.*)$")
        .expect("from regex is valid")
});

/// An identifier target followed by a top-level annotation colon.
static ANN_TARGET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Za-z_]\w*)[ \t]*:").expect("annotation regex is valid"));

/// The leading identifier of a comma- or dot-separated piece.
static NAME_START: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[ \t]*([A-Za-z_]\w*)").expect("name regex is valid"));

static AS_SEP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]+as[ \t]+").expect("as regex is valid"));

const FLOW_KEYWORDS: &[&str] = &[
    "if", "elif", "else", "while", "for", "try", "except", "finally", "with",
];

// ============================================================================
// OutlineParser
// ============================================================================

/// Line-oriented parser producing one tree per source chunk.
#[derive(Debug, Default, Clone, Copy)]
pub struct OutlineParser;

impl OutlineParser {
    pub fn new() -> Self {
        OutlineParser
    }
}

impl SpanParser for OutlineParser {
    fn parse_span(&self, request: &SpanRequest<'_>) -> ParseResult<SyntaxTree> {
        let chunks = split_source(request.source);
        let chunk = chunks.first().map(SourceChunk::text).unwrap_or("");
        let tree = parse_chunk(chunk, request.module_path);
        trace!(
            "outline span at line {}: {} lines",
            request.first_line,
            line_count(chunk)
        );
        Ok(tree)
    }
}

fn parse_chunk(code: &str, module_path: Option<&str>) -> SyntaxTree {
    let name = module_path
        .map(Path::new)
        .and_then(Path::file_stem)
        .and_then(OsStr::to_str)
        .unwrap_or("module");
    let mut parser = ChunkParser::new(name);
    if let Some(path) = module_path {
        parser.builder.set_path(path);
    }
    parser.run(code);
    parser.builder.finish(code)
}

// ============================================================================
// ChunkParser
// ============================================================================

/// One line of the chunk, 1-indexed. Byte offsets into it convert to
/// character columns through [`Cursor::pos`].
#[derive(Clone, Copy)]
struct Cursor<'a> {
    line: &'a str,
    no: u32,
}

impl Cursor<'_> {
    fn pos(&self, byte: usize) -> Pos {
        Pos::new(self.no, self.line[..byte].chars().count() as u32)
    }

    fn end(&self) -> Pos {
        Pos::new(self.no, self.line.chars().count() as u32)
    }
}

/// One open `def` or `class` block and the indent of its header line.
struct OpenScope {
    scope: ScopeId,
    header_indent: u32,
}

struct ChunkParser {
    builder: TreeBuilder,
    /// Innermost open scopes, outermost first. The root is never on it.
    stack: Vec<OpenScope>,
    /// The scope whose next statement may still be its docstring.
    pending_docstring: Option<ScopeId>,
    /// End of the last code line seen; dedents close scopes here.
    last_end: Pos,
}

impl ChunkParser {
    fn new(name: &str) -> Self {
        let builder = TreeBuilder::new(name);
        let pending = builder.root();
        ChunkParser {
            builder,
            stack: Vec::new(),
            pending_docstring: Some(pending),
            last_end: Pos::MODULE_START,
        }
    }

    fn run(&mut self, code: &str) {
        let lines: Vec<&str> = code.split('\n').collect();
        let mut index = 0;
        while index < lines.len() {
            index = self.line(&lines, index);
        }
        while let Some(open) = self.stack.pop() {
            self.builder.close_scope(open.scope, self.last_end);
        }
    }

    fn scope(&self) -> ScopeId {
        self.stack
            .last()
            .map(|open| open.scope)
            .unwrap_or_else(|| self.builder.root())
    }

    /// Close open scopes whose bodies a line at `indent` sits outside of.
    fn pop_to(&mut self, indent: u32) {
        while self
            .stack
            .last()
            .is_some_and(|open| indent <= open.header_indent)
        {
            if let Some(open) = self.stack.pop() {
                self.builder.close_scope(open.scope, self.last_end);
                if self.pending_docstring == Some(open.scope) {
                    self.pending_docstring = None;
                }
            }
        }
    }

    /// Process the line at `index` and return the index of the next one.
    fn line(&mut self, lines: &[&str], index: usize) -> usize {
        let line = lines[index];
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            return index + 1;
        }
        let cur = Cursor {
            line,
            no: index as u32 + 1,
        };
        let indent = measure_indent(line);
        self.pop_to(indent);
        let scope = self.scope();

        if self.pending_docstring == Some(scope) {
            if let Some(next) = self.try_docstring(lines, index, scope) {
                return next;
            }
            self.pending_docstring = None;
        }

        let start = Pos::new(cur.no, indent);
        let end = cur.end();
        self.last_end = end;
        let base = indent as usize;
        let stripped = &line[base..];

        if stripped.starts_with('@') {
            let stmt = self
                .builder
                .add_statement(scope, StmtKind::Decorator, start, end);
            self.record_names(scope, Some(stmt), cur, base, line.len());
            return index + 1;
        }
        if let Some(caps) = DEF_HEAD.captures(line) {
            self.def_header(cur, indent, &caps);
            return index + 1;
        }
        if let Some(caps) = CLASS_HEAD.captures(line) {
            self.class_header(cur, indent, &caps);
            return index + 1;
        }
        if let Some(rest) = keyword_rest(stripped, "import") {
            self.plain_import(scope, cur, indent, base + "import".len(), rest);
            return index + 1;
        }
        if keyword_rest(stripped, "from").is_some() && self.from_import(scope, cur, indent) {
            return index + 1;
        }
        if let Some(rest) = keyword_rest(stripped, "global") {
            let stmt = self
                .builder
                .add_statement(scope, StmtKind::Global, start, end);
            self.global_names(scope, stmt, cur, base + "global".len(), rest);
            return index + 1;
        }
        if keyword_rest(stripped, "return").is_some() {
            let stmt = self
                .builder
                .add_statement(scope, StmtKind::Return, start, end);
            self.record_names(scope, Some(stmt), cur, base, line.len());
            return index + 1;
        }
        if keyword_rest(stripped, "assert").is_some() {
            let stmt = self
                .builder
                .add_statement(scope, StmtKind::Assert, start, end);
            self.record_names(scope, Some(stmt), cur, base, line.len());
            return index + 1;
        }
        let flow_text = match keyword_rest(stripped, "async") {
            Some(rest) => rest.trim_start(),
            None => stripped,
        };
        if FLOW_KEYWORDS
            .iter()
            .any(|kw| keyword_rest(flow_text, kw).is_some())
        {
            let stmt = self.builder.add_statement(scope, StmtKind::Flow, start, end);
            self.record_names(scope, Some(stmt), cur, base, line.len());
            return index + 1;
        }
        self.simple_statement(scope, cur, indent);
        index + 1
    }

    /// Consume a docstring starting at `index`, if one starts there.
    fn try_docstring(&mut self, lines: &[&str], index: usize, scope: ScopeId) -> Option<usize> {
        let line = lines[index];
        let line_no = index as u32 + 1;
        let indent = measure_indent(line);
        let stripped = &line[indent as usize..];
        let (content, last_index) = read_string_literal(lines, index, stripped)?;
        let end = Cursor {
            line: lines[last_index],
            no: last_index as u32 + 1,
        }
        .end();
        self.builder
            .add_statement(scope, StmtKind::Expr, Pos::new(line_no, indent), end);
        self.builder.set_docstring(scope, content);
        self.last_end = end;
        self.pending_docstring = None;
        Some(last_index + 1)
    }

    fn def_header(&mut self, cur: Cursor<'_>, indent: u32, caps: &Captures<'_>) {
        let parent = self.scope();
        let root = self.builder.root();
        let name = caps.get(1).expect("def regex captures a name");
        let name_id = self.builder.add_name(
            parent,
            name.as_str(),
            cur.pos(name.start()),
            None,
            Some(DefinitionKind::Function),
        );
        if parent == root {
            self.builder.mark_defined(name_id);
        }
        let scope = self.builder.open_scope(
            parent,
            ScopeKind::Function,
            Some(name_id),
            Pos::new(cur.no, indent),
        );
        let list = self.builder.begin_params(scope);

        let after = &cur.line[name.end()..];
        let rest = after.trim_start();
        if rest.starts_with('(') {
            let open = name.end() + (after.len() - rest.len());
            let close = matching_close(cur.line, open);
            let end = close.unwrap_or(cur.line.len());
            self.param_list(scope, parent, list, cur, open + 1, &cur.line[open + 1..end]);
            if let Some(close) = close {
                // Return annotation names read in the enclosing scope.
                self.record_names(parent, None, cur, close + 1, cur.line.len());
            }
        }
        self.stack.push(OpenScope {
            scope,
            header_indent: indent,
        });
        self.pending_docstring = Some(scope);
    }

    fn class_header(&mut self, cur: Cursor<'_>, indent: u32, caps: &Captures<'_>) {
        let parent = self.scope();
        let root = self.builder.root();
        let name = caps.get(1).expect("class regex captures a name");
        let name_id = self.builder.add_name(
            parent,
            name.as_str(),
            cur.pos(name.start()),
            None,
            Some(DefinitionKind::Class),
        );
        if parent == root {
            self.builder.mark_defined(name_id);
        }
        let scope = self.builder.open_scope(
            parent,
            ScopeKind::Class,
            Some(name_id),
            Pos::new(cur.no, indent),
        );
        let after = &cur.line[name.end()..];
        let rest = after.trim_start();
        if rest.starts_with('(') {
            let open = name.end() + (after.len() - rest.len());
            let to = matching_close(cur.line, open).unwrap_or(cur.line.len());
            self.record_names(parent, None, cur, open + 1, to);
        }
        self.stack.push(OpenScope {
            scope,
            header_indent: indent,
        });
        self.pending_docstring = Some(scope);
    }

    /// Parse the text between a `def` header's parentheses.
    fn param_list(
        &mut self,
        function: ScopeId,
        enclosing: ScopeId,
        list: ParamListId,
        cur: Cursor<'_>,
        base: usize,
        text: &str,
    ) {
        for (part_off, part) in split_top_level(text, b',') {
            let trimmed = part.trim();
            match trimmed {
                "" => continue,
                "*" => {
                    self.builder.add_star_marker(list);
                    continue;
                }
                "/" => {
                    self.builder.add_slash_marker(list);
                    continue;
                }
                _ => {}
            }
            let lead = part.len() - part.trim_start().len();
            let (star_count, body_off) = if trimmed.starts_with("**") {
                (2u8, lead + 2)
            } else if trimmed.starts_with('*') {
                (1, lead + 1)
            } else {
                (0, lead)
            };
            let body = &part[body_off..];
            let Some(name) = NAME_START.captures(body).and_then(|caps| caps.get(1)) else {
                continue;
            };
            let name_id = self.builder.add_name(
                function,
                name.as_str(),
                cur.pos(base + part_off + body_off + name.start()),
                None,
                Some(DefinitionKind::Param),
            );
            let tail = &body[name.end()..];
            let tail_base = base + part_off + body_off + name.end();
            let eq = top_level_positions(tail, b'=').into_iter().next();
            let ann_end = eq.unwrap_or(tail.len());
            let colon = top_level_positions(&tail[..ann_end], b':').into_iter().next();
            let annotation = colon.map(|colon| {
                self.expr_at(enclosing, cur, tail_base + colon + 1, tail_base + ann_end)
            });
            let default = eq.map(|eq| {
                self.expr_at(enclosing, cur, tail_base + eq + 1, tail_base + tail.len())
            });
            self.builder
                .add_param(list, name_id, star_count, annotation, default);
        }
    }

    fn plain_import(
        &mut self,
        scope: ScopeId,
        cur: Cursor<'_>,
        indent: u32,
        rest_base: usize,
        rest: &str,
    ) {
        let root = self.builder.root();
        let start = Pos::new(cur.no, indent);
        let end = cur.end();
        for (part_off, part) in split_top_level(rest, b',') {
            let (path_part, alias) = match AS_SEP.find(part) {
                Some(m) => (&part[..m.start()], Some((m.end(), &part[m.end()..]))),
                None => (part, None),
            };
            let stmt = self.builder.add_statement(scope, StmtKind::Expr, start, end);
            let mut path_ids = Vec::new();
            let mut seg_off = 0usize;
            for seg in path_part.split('.') {
                if let Some(m) = NAME_START.captures(seg).and_then(|caps| caps.get(1)) {
                    let definition =
                        (path_ids.is_empty() && alias.is_none()).then_some(DefinitionKind::Import);
                    path_ids.push(self.builder.add_name(
                        scope,
                        m.as_str(),
                        cur.pos(rest_base + part_off + seg_off + m.start()),
                        Some(stmt),
                        definition,
                    ));
                }
                seg_off += seg.len() + 1;
            }
            let mut imported_ids = Vec::new();
            if let Some((alias_off, alias_text)) = alias {
                if let Some(m) = NAME_START.captures(alias_text).and_then(|caps| caps.get(1)) {
                    imported_ids.push(self.builder.add_name(
                        scope,
                        m.as_str(),
                        cur.pos(rest_base + part_off + alias_off + m.start()),
                        Some(stmt),
                        Some(DefinitionKind::Import),
                    ));
                }
            }
            if path_ids.is_empty() && imported_ids.is_empty() {
                continue;
            }
            let binding = imported_ids.first().or(path_ids.first()).copied();
            self.builder
                .add_import(stmt, ImportKind::Plain, 0, path_ids, imported_ids, Vec::new());
            if scope == root {
                if let Some(binding) = binding {
                    self.builder.mark_defined(binding);
                }
            }
        }
    }

    /// Parse a `from ... import ...` line. Returns false when the line does
    /// not fit the form, leaving it for the fallback classification.
    fn from_import(&mut self, scope: ScopeId, cur: Cursor<'_>, indent: u32) -> bool {
        let Some(caps) = FROM_HEAD.captures(cur.line) else {
            return false;
        };
        let root = self.builder.root();
        let stmt = self.builder.add_statement(
            scope,
            StmtKind::Expr,
            Pos::new(cur.no, indent),
            cur.end(),
        );
        let level = caps.get(1).map(|m| m.as_str().len() as u32).unwrap_or(0);

        let mut module_ids = Vec::new();
        if let Some(module) = caps.get(2) {
            let mut seg_off = 0usize;
            for seg in module.as_str().split('.') {
                if let Some(m) = NAME_START.captures(seg).and_then(|caps| caps.get(1)) {
                    module_ids.push(self.builder.add_name(
                        scope,
                        m.as_str(),
                        cur.pos(module.start() + seg_off + m.start()),
                        Some(stmt),
                        None,
                    ));
                }
                seg_off += seg.len() + 1;
            }
        }

        let (mut names_base, names_text) = caps
            .get(3)
            .map(|m| (m.start(), m.as_str()))
            .unwrap_or((cur.line.len(), ""));
        let names_text = match names_text.strip_prefix('(') {
            Some(rest) => {
                names_base += 1;
                rest
            }
            None => names_text,
        };
        let trimmed = names_text.trim_end();
        let names_text = trimmed.strip_suffix(')').unwrap_or(trimmed);

        let mut imported_ids = Vec::new();
        let mut use_ids = Vec::new();
        let mut bindings = Vec::new();
        for (piece_off, piece) in split_top_level(names_text, b',') {
            let (name_part, alias) = match AS_SEP.find(piece) {
                Some(m) => (&piece[..m.start()], Some((m.end(), &piece[m.end()..]))),
                None => (piece, None),
            };
            let Some(m) = NAME_START.captures(name_part).and_then(|caps| caps.get(1)) else {
                continue;
            };
            let name_pos = cur.pos(names_base + piece_off + m.start());
            match alias {
                None => {
                    let id = self.builder.add_name(
                        scope,
                        m.as_str(),
                        name_pos,
                        Some(stmt),
                        Some(DefinitionKind::Import),
                    );
                    imported_ids.push(id);
                    bindings.push(id);
                }
                Some((alias_off, alias_text)) => {
                    // The alias is the binding; the original stays unbound
                    // but still belongs to the import.
                    use_ids.push(self.builder.add_name(
                        scope,
                        m.as_str(),
                        name_pos,
                        Some(stmt),
                        None,
                    ));
                    if let Some(am) = NAME_START.captures(alias_text).and_then(|caps| caps.get(1)) {
                        let id = self.builder.add_name(
                            scope,
                            am.as_str(),
                            cur.pos(names_base + piece_off + alias_off + am.start()),
                            Some(stmt),
                            Some(DefinitionKind::Import),
                        );
                        imported_ids.push(id);
                        bindings.push(id);
                    }
                }
            }
        }
        self.builder
            .add_import(stmt, ImportKind::From, level, module_ids, imported_ids, use_ids);
        if scope == root {
            for id in bindings {
                self.builder.mark_defined(id);
            }
        }
        true
    }

    fn global_names(
        &mut self,
        scope: ScopeId,
        stmt: StmtId,
        cur: Cursor<'_>,
        rest_base: usize,
        rest: &str,
    ) {
        for (off, piece) in split_top_level(rest, b',') {
            if let Some(m) = NAME_START.captures(piece).and_then(|caps| caps.get(1)) {
                let id = self.builder.add_name(
                    scope,
                    m.as_str(),
                    cur.pos(rest_base + off + m.start()),
                    Some(stmt),
                    None,
                );
                self.builder.mark_global(id);
            }
        }
    }

    /// Classify a line with no leading keyword: assignment or expression.
    fn simple_statement(&mut self, scope: ScopeId, cur: Cursor<'_>, indent: u32) {
        let root = self.builder.root();
        let start = Pos::new(cur.no, indent);
        let end = cur.end();
        let base = indent as usize;
        let stripped = &cur.line[base..];
        if let Some((target_end, value_start)) = assignment_split(stripped) {
            let stmt = self.builder.add_statement(scope, StmtKind::Assign, start, end);
            let target = &stripped[..target_end];
            let colon = top_level_positions(target, b':').into_iter().next();
            let bind_end = colon.unwrap_or(target_end);
            self.assign_targets(scope, root, stmt, cur, base, base + bind_end);
            if let Some(colon) = colon {
                self.record_names(scope, Some(stmt), cur, base + colon + 1, base + target_end);
            }
            self.record_names(scope, Some(stmt), cur, base + value_start, cur.line.len());
        } else if let Some(caps) = ANN_TARGET.captures(stripped) {
            let stmt = self.builder.add_statement(scope, StmtKind::Assign, start, end);
            let name = caps.get(1).expect("annotation regex captures a name");
            let id = self.builder.add_name(
                scope,
                name.as_str(),
                cur.pos(base + name.start()),
                Some(stmt),
                Some(DefinitionKind::Statement),
            );
            if scope == root {
                self.builder.mark_set_var(id);
                self.builder.mark_defined(id);
            }
            let whole = caps.get(0).expect("regex matched");
            self.record_names(scope, Some(stmt), cur, base + whole.end(), cur.line.len());
        } else {
            let stmt = self.builder.add_statement(scope, StmtKind::Expr, start, end);
            self.record_names(scope, Some(stmt), cur, base, cur.line.len());
        }
    }

    /// Record the names on an assignment's target side. Bare names become
    /// bindings; attribute and subscript targets stay plain uses.
    fn assign_targets(
        &mut self,
        scope: ScopeId,
        root: ScopeId,
        stmt: StmtId,
        cur: Cursor<'_>,
        from: usize,
        to: usize,
    ) {
        let region = &cur.line[from..to];
        for ident in scan_identifiers(region) {
            if is_keyword(ident.text) {
                continue;
            }
            let before = region[..ident.start].trim_end();
            let after = region[ident.start + ident.text.len()..].trim_start();
            let plain = bracket_depth(region, ident.start) == 0
                && !before.ends_with('.')
                && !matches!(after.chars().next(), Some('.') | Some('(') | Some('['));
            let definition = plain.then_some(DefinitionKind::Statement);
            let id = self.builder.add_name(
                scope,
                ident.text,
                cur.pos(from + ident.start),
                Some(stmt),
                definition,
            );
            if plain && scope == root {
                self.builder.mark_set_var(id);
                self.builder.mark_defined(id);
            }
        }
    }

    /// Record identifier occurrences in `cur.line[from..to]` as used names.
    fn record_names(
        &mut self,
        scope: ScopeId,
        stmt: Option<StmtId>,
        cur: Cursor<'_>,
        from: usize,
        to: usize,
    ) {
        let region = &cur.line[from..to];
        for ident in scan_identifiers(region) {
            if is_keyword(ident.text) {
                continue;
            }
            self.builder
                .add_name(scope, ident.text, cur.pos(from + ident.start), stmt, None);
        }
    }

    /// Record a small expression: its trimmed text becomes an expression
    /// node and its identifiers count as used names in `scope`.
    fn expr_at(&mut self, scope: ScopeId, cur: Cursor<'_>, from: usize, to: usize) -> ExprId {
        let text = &cur.line[from..to];
        let lead = text.len() - text.trim_start().len();
        let start = cur.pos(from + lead);
        self.record_names(scope, None, cur, from, to);
        self.builder.add_expr(text.trim(), start)
    }
}

// ============================================================================
// Line Scanning
// ============================================================================

struct Ident<'a> {
    text: &'a str,
    start: usize,
}

/// Identifier tokens outside strings and comments, with byte offsets.
fn scan_identifiers(text: &str) -> Vec<Ident<'_>> {
    let bytes = text.as_bytes();
    let mut out = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'#' => break,
            b'"' | b'\'' => i = skip_string(bytes, i),
            b'_' | b'A'..=b'Z' | b'a'..=b'z' => {
                let start = i;
                while i < bytes.len() && (bytes[i] == b'_' || bytes[i].is_ascii_alphanumeric()) {
                    i += 1;
                }
                let word = &text[start..i];
                let prefixes_string = i < bytes.len()
                    && (bytes[i] == b'"' || bytes[i] == b'\'')
                    && is_string_prefix(word);
                if !prefixes_string {
                    out.push(Ident { text: word, start });
                }
            }
            b'0'..=b'9' => {
                while i < bytes.len()
                    && (bytes[i] == b'_' || bytes[i] == b'.' || bytes[i].is_ascii_alphanumeric())
                {
                    i += 1;
                }
            }
            _ => i += 1,
        }
    }
    out
}

/// Advance past the string literal whose opening quote sits at `start`.
fn skip_string(bytes: &[u8], start: usize) -> usize {
    let quote = bytes[start];
    let triple =
        bytes.len() >= start + 3 && bytes[start + 1] == quote && bytes[start + 2] == quote;
    let mut i = start + if triple { 3 } else { 1 };
    while i < bytes.len() {
        if bytes[i] == b'\\' {
            i += 2;
            continue;
        }
        if bytes[i] == quote {
            if !triple {
                return i + 1;
            }
            if bytes.len() >= i + 3 && bytes[i + 1] == quote && bytes[i + 2] == quote {
                return i + 3;
            }
        }
        i += 1;
    }
    bytes.len()
}

/// Byte positions of `needle` outside strings, comments, and brackets.
fn top_level_positions(text: &str, needle: u8) -> Vec<usize> {
    let bytes = text.as_bytes();
    let mut out = Vec::new();
    let mut depth = 0usize;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'#' => break,
            b'"' | b'\'' => {
                i = skip_string(bytes, i);
                continue;
            }
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' | b'}' => depth = depth.saturating_sub(1),
            b => {
                if b == needle && depth == 0 {
                    out.push(i);
                }
            }
        }
        i += 1;
    }
    out
}

/// Split at top-level occurrences of `sep`, keeping each piece's offset.
fn split_top_level(text: &str, sep: u8) -> Vec<(usize, &str)> {
    let mut out = Vec::new();
    let mut start = 0;
    for pos in top_level_positions(text, sep) {
        out.push((start, &text[start..pos]));
        start = pos + 1;
    }
    out.push((start, &text[start..]));
    out
}

/// Byte index of the bracket closing the one at `open`, on this line.
fn matching_close(text: &str, open: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut i = open;
    while i < bytes.len() {
        match bytes[i] {
            b'"' | b'\'' => {
                i = skip_string(bytes, i);
                continue;
            }
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' | b'}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// Bracket nesting depth at byte `until`, strings skipped.
fn bracket_depth(text: &str, until: usize) -> usize {
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut i = 0;
    while i < until.min(bytes.len()) {
        match bytes[i] {
            b'"' | b'\'' => {
                i = skip_string(bytes, i);
                continue;
            }
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' | b'}' => depth = depth.saturating_sub(1),
            _ => {}
        }
        i += 1;
    }
    depth
}

/// Find the `=` splitting an assignment, if the line is one. Returns the
/// byte length of the target side (augmented operators excluded) and the
/// byte offset where the value side starts.
fn assignment_split(text: &str) -> Option<(usize, usize)> {
    let bytes = text.as_bytes();
    for pos in top_level_positions(text, b'=') {
        if bytes.get(pos + 1) == Some(&b'=') {
            continue;
        }
        match pos.checked_sub(1).map(|i| bytes[i]) {
            Some(b'=') | Some(b'!') | Some(b'<') | Some(b'>') | Some(b':') => continue,
            _ => {}
        }
        let mut target_end = pos;
        while target_end > 0
            && matches!(
                bytes[target_end - 1],
                b'+' | b'-' | b'*' | b'/' | b'%' | b'&' | b'|' | b'^' | b'@'
            )
        {
            target_end -= 1;
        }
        return Some((target_end, pos + 1));
    }
    None
}

/// Read a string literal opening at `stripped` on `lines[index]`. Returns
/// its contents and the index of the line it closes on.
fn read_string_literal(lines: &[&str], index: usize, stripped: &str) -> Option<(String, usize)> {
    let stripped = strip_string_prefix(stripped)?;
    for delim in ["\"\"\"", "'''"] {
        let Some(rest) = stripped.strip_prefix(delim) else {
            continue;
        };
        if let Some(pos) = rest.find(delim) {
            return Some((rest[..pos].to_string(), index));
        }
        let mut content = rest.to_string();
        for (offset, line) in lines[index + 1..].iter().enumerate() {
            if let Some(pos) = line.find(delim) {
                content.push('\n');
                content.push_str(&line[..pos]);
                return Some((content, index + 1 + offset));
            }
            content.push('\n');
            content.push_str(line);
        }
        // Unterminated: the rest of the chunk is the docstring.
        return Some((content, lines.len() - 1));
    }
    let quote = stripped.chars().next()?;
    if quote != '"' && quote != '\'' {
        return None;
    }
    let rest = stripped[1..].trim_end();
    let body = rest.strip_suffix(quote)?;
    Some((body.to_string(), index))
}

/// Drop a string prefix (`r`, `b`, `f`, `u` and combinations) so the quote
/// is at the front, or return None when the text is not a string at all.
fn strip_string_prefix(stripped: &str) -> Option<&str> {
    let quote = stripped.find(['"', '\''])?;
    if quote == 0 {
        return Some(stripped);
    }
    is_string_prefix(&stripped[..quote]).then(|| &stripped[quote..])
}

fn is_string_prefix(word: &str) -> bool {
    word.len() <= 2
        && word
            .chars()
            .all(|c| matches!(c, 'r' | 'R' | 'b' | 'B' | 'f' | 'F' | 'u' | 'U'))
}

/// The remainder of `stripped` after `keyword`, if the line starts with the
/// keyword on a word boundary.
fn keyword_rest<'a>(stripped: &'a str, keyword: &str) -> Option<&'a str> {
    let rest = stripped.strip_prefix(keyword)?;
    match rest.chars().next() {
        Some(c) if c == '_' || c.is_ascii_alphanumeric() => None,
        _ => Some(rest),
    }
}

fn is_keyword(word: &str) -> bool {
    matches!(
        word,
        "False"
            | "None"
            | "True"
            | "and"
            | "as"
            | "assert"
            | "async"
            | "await"
            | "break"
            | "class"
            | "continue"
            | "def"
            | "del"
            | "elif"
            | "else"
            | "except"
            | "finally"
            | "for"
            | "from"
            | "global"
            | "if"
            | "import"
            | "in"
            | "is"
            | "lambda"
            | "nonlocal"
            | "not"
            | "or"
            | "pass"
            | "raise"
            | "return"
            | "try"
            | "while"
            | "with"
            | "yield"
    )
}

// ============================================================================
// Tests
// ============================================================================
