use std::collections::BTreeMap;

use super::lexer::{tokenize, Token, TokenKind};
use crate::util;

/// Identifier bound to the value of an anonymous `export default`.
pub const DEFAULT_EXPORT_IDENT: &str = "__default_export";

/// Individual rewrites, in their conventional application order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Rule {
    /// Drop `import` statements (bindings are recorded).
    Imports,
    /// Drop `export type {..}`, `export interface`, `export type X =` and `export declare`.
    TypeExports,
    /// Drop `interface`, `type` aliases and `declare` statements; rewrite `enum`.
    TypeDeclarations,
    /// Strip `: Type` annotations, optional markers, access modifiers, `implements`.
    Annotations,
    /// Strip `<T>` lists in front of parameter/argument lists and class heritage.
    Generics,
    /// Strip `as T`, `as const`, `satisfies T` and non-null `!`.
    Assertions,
    /// Rewrite `export default` and strip `export` from declarations.
    Exports,
}

impl Rule {
    pub const ALL: [Rule; 7] = [
        Rule::Imports,
        Rule::TypeExports,
        Rule::TypeDeclarations,
        Rule::Annotations,
        Rule::Generics,
        Rule::Assertions,
        Rule::Exports,
    ];

    fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RuleSet(u8);

impl RuleSet {
    pub fn all() -> Self {
        Rule::ALL.into_iter().fold(RuleSet(0), |set, r| set.with(r))
    }

    pub fn only(rule: Rule) -> Self {
        RuleSet(rule.bit())
    }

    pub fn with(self, rule: Rule) -> Self {
        RuleSet(self.0 | rule.bit())
    }

    pub fn contains(self, rule: Rule) -> bool {
        self.0 & rule.bit() != 0
    }
}

#[derive(Clone, Copy, Debug)]
pub struct NormalizeOptions {
    pub rules: RuleSet,
    /// Whether `<` in expression position may open JSX.
    pub jsx: bool,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            rules: RuleSet::all(),
            jsx: true,
        }
    }
}

impl NormalizeOptions {
    /// Plain `.ts` files cannot contain JSX, so `<T>x` there is a cast.
    pub fn for_file(name: &str) -> Self {
        let jsx = !matches!(util::extension(name).as_deref(), Some("ts" | "mts" | "cts"));
        Self {
            jsx,
            ..Self::default()
        }
    }
}

/// One `import` statement.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ImportBinding {
    pub source: String,
    pub default: Option<String>,
    pub namespace: Option<String>,
    /// `(imported, local)` pairs.
    pub named: Vec<(String, String)>,
}

impl ImportBinding {
    pub fn is_side_effect_only(&self) -> bool {
        self.default.is_none() && self.namespace.is_none() && self.named.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExportBinding {
    pub local: String,
    pub exported: String,
}

/// Erased source plus the module interface recovered while erasing.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Normalized {
    pub code: String,
    pub imports: Vec<ImportBinding>,
    pub exports: Vec<ExportBinding>,
    /// Name bound to the default export, when there is one.
    pub default_export: Option<String>,
}

pub fn normalize(source: &str) -> Normalized {
    normalize_with(source, NormalizeOptions::default())
}

pub fn normalize_with(source: &str, options: NormalizeOptions) -> Normalized {
    let mut eraser = Eraser::new(tokenize(source, options.jsx), options);
    eraser.run();
    eraser.finish()
}

/// Shorthand for callers that only need the code.
pub fn erase_types(source: &str) -> String {
    normalize(source).code
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FrameKind {
    Paren,
    Bracket,
    Block,
    Object,
    Class,
    JsxExpr,
}

#[derive(Clone, Copy, Debug)]
struct Frame {
    kind: FrameKind,
    ternary: u32,
    decl_pattern: bool,
}

impl Frame {
    fn new(kind: FrameKind) -> Self {
        Self {
            kind,
            ternary: 0,
            decl_pattern: false,
        }
    }
}

const MODIFIERS: &[&str] = &[
    "public", "private", "protected", "readonly", "override", "declare", "abstract",
];

/// Keywords that never end an expression.
const NON_VALUE_KEYWORDS: &[&str] = &[
    "return", "typeof", "case", "in", "of", "new", "delete", "void", "throw", "yield", "await",
    "else", "do", "export", "import", "const", "let", "var", "extends", "function", "class",
    "instanceof", "if", "while", "for", "switch", "default",
];

/// Tokens that, at the end of a line, mean the type continues on the next line.
const TYPE_CONTINUES_AFTER: &[&str] = &[
    "|", "&", "=>", ",", ":", ".", "<", "?", "=", "keyof", "typeof", "extends", "(", "[", "{",
];
const TYPE_CONTINUES_BEFORE: &[&str] = &["|", "&", ".", "=>", "extends", "?", ":"];

/// Single pass over the tokens. The frame stack tells an annotation colon
/// from an object key, a ternary branch, a label or a `case` clause. Tokens
/// are dropped or substituted in place, so line structure survives, and
/// syntax the eraser does not recognise passes through unchanged.
struct Eraser {
    toks: Vec<Token>,
    /// Indices of significant (non-trivia) tokens.
    sig: Vec<usize>,
    dropped: Vec<bool>,
    subst: Vec<Option<String>>,
    /// Text emitted right after a raw token.
    inserted: BTreeMap<usize, String>,
    rules: RuleSet,
    jsx: bool,
    stack: Vec<Frame>,
    pending_class: Option<usize>,
    after_decl: bool,
    decl_binding_end: Option<usize>,
    /// Frame depth of the `const`/`let`/`var` list being scanned.
    decl_depth: Option<usize>,
    /// Constructor parameter properties awaiting `this.x = x;`.
    param_props: Vec<String>,
    param_props_depth: Option<usize>,
    ctor_body_pending: bool,
    in_case: bool,
    last_case_colon: Option<usize>,
    imports: Vec<ImportBinding>,
    exports: Vec<ExportBinding>,
    default_export: Option<String>,
}

impl Eraser {
    fn new(toks: Vec<Token>, options: NormalizeOptions) -> Self {
        let sig = toks
            .iter()
            .enumerate()
            .filter(|(_, t)| !t.is_trivia())
            .map(|(i, _)| i)
            .collect();
        let n = toks.len();
        Self {
            toks,
            sig,
            dropped: vec![false; n],
            subst: vec![None; n],
            inserted: BTreeMap::new(),
            rules: options.rules,
            jsx: options.jsx,
            stack: vec![Frame::new(FrameKind::Block)],
            pending_class: None,
            after_decl: false,
            decl_binding_end: None,
            decl_depth: None,
            param_props: Vec::new(),
            param_props_depth: None,
            ctor_body_pending: false,
            in_case: false,
            last_case_colon: None,
            imports: Vec::new(),
            exports: Vec::new(),
            default_export: None,
        }
    }

    fn finish(self) -> Normalized {
        let mut code = String::with_capacity(self.toks.iter().map(|t| t.text.len()).sum());
        for (i, tok) in self.toks.iter().enumerate() {
            if !self.dropped[i] {
                match &self.subst[i] {
                    Some(text) => code.push_str(text),
                    None => code.push_str(&tok.text),
                }
            }
            if let Some(text) = self.inserted.get(&i) {
                code.push_str(text);
            }
        }
        Normalized {
            code,
            imports: self.imports,
            exports: self.exports,
            default_export: self.default_export,
        }
    }

    // ── token access ────────────────────────────────────────────────────────

    fn len(&self) -> usize {
        self.sig.len()
    }

    fn tok(&self, p: usize) -> Option<&Token> {
        self.sig.get(p).map(|&i| &self.toks[i])
    }

    fn kind(&self, p: usize) -> Option<TokenKind> {
        self.tok(p).map(|t| t.kind)
    }

    fn text(&self, p: usize) -> &str {
        self.tok(p).map(|t| t.text.as_str()).unwrap_or("")
    }

    fn is_punct(&self, p: usize, s: &str) -> bool {
        self.tok(p).is_some_and(|t| t.is_punct(s))
    }

    fn is_ident(&self, p: usize, s: &str) -> bool {
        self.tok(p).is_some_and(|t| t.is_ident(s))
    }

    fn is_name(&self, p: usize) -> bool {
        self.kind(p) == Some(TokenKind::Ident)
    }

    fn unquoted(&self, p: usize) -> String {
        let text = self.text(p);
        if self.kind(p) == Some(TokenKind::Str) && text.len() >= 2 {
            text[1..text.len() - 1].to_string()
        } else {
            text.to_string()
        }
    }

    /// Whether original trivia between significant tokens `q` and `p` spans a line break.
    fn newline_between(&self, q: usize, p: usize) -> bool {
        let start = self.sig.get(q).map_or(0, |&i| i + 1);
        let end = self.sig.get(p).copied().unwrap_or(self.toks.len());
        start < end && self.toks[start..end].iter().any(Token::has_newline)
    }

    fn newline_before(&self, p: usize) -> bool {
        if p == 0 {
            let end = self.sig.first().copied().unwrap_or(self.toks.len());
            return self.toks[..end].iter().any(Token::has_newline);
        }
        self.newline_between(p - 1, p)
    }

    fn is_dropped(&self, p: usize) -> bool {
        self.dropped[self.sig[p]]
    }

    fn prev_kept(&self, p: usize) -> Option<usize> {
        (0..p.min(self.len())).rev().find(|&q| !self.is_dropped(q))
    }

    /// Text a later reader sees at `q`, accounting for substitutions.
    fn effective_text(&self, q: usize) -> &str {
        match &self.subst[self.sig[q]] {
            Some(s) => s.split_whitespace().last().unwrap_or(""),
            None => self.text(q),
        }
    }

    fn top(&mut self) -> &mut Frame {
        if self.stack.is_empty() {
            self.stack.push(Frame::new(FrameKind::Block));
        }
        let last = self.stack.len() - 1;
        &mut self.stack[last]
    }

    fn top_kind(&self) -> FrameKind {
        self.stack.last().map_or(FrameKind::Block, |f| f.kind)
    }

    fn pop(&mut self) -> Option<Frame> {
        if self.stack.len() <= 1 {
            return None;
        }
        let frame = self.stack.pop();
        if self.decl_depth.is_some_and(|d| d > self.stack.len()) {
            self.decl_depth = None;
        }
        frame
    }

    // ── edits ───────────────────────────────────────────────────────────────

    /// Drops significant tokens `from..=to` and all trivia between them.
    fn drop_range(&mut self, from: usize, to: usize) {
        if from > to || to >= self.len() {
            return;
        }
        for i in self.sig[from]..=self.sig[to] {
            self.dropped[i] = true;
        }
    }

    /// Drops a token together with the whitespace that follows it.
    fn drop_keyword(&mut self, p: usize) {
        self.drop_range(p, p);
        let after = self.sig[p] + 1;
        if self.toks.get(after).is_some_and(|t| t.kind == TokenKind::Whitespace) {
            self.dropped[after] = true;
        }
    }

    /// Drops the same-line whitespace in front of `p`.
    fn drop_space_before(&mut self, p: usize) {
        let Some(before) = self.sig[p].checked_sub(1) else {
            return;
        };
        let tok = &self.toks[before];
        if tok.kind == TokenKind::Whitespace && !tok.has_newline() {
            self.dropped[before] = true;
        }
    }

    fn current_text(&self, i: usize) -> String {
        self.subst[i]
            .clone()
            .unwrap_or_else(|| self.toks[i].text.clone())
    }

    /// Drops a whole statement, including its indentation and line break.
    fn drop_statement(&mut self, from: usize, to: usize) {
        if from > to || to >= self.len() {
            return;
        }
        self.drop_range(from, to);

        let after = self.sig[to] + 1;
        if after < self.toks.len() && self.toks[after].kind == TokenKind::Whitespace && !self.dropped[after] {
            let current = self.current_text(after);
            match current.find('\n') {
                Some(idx) => self.subst[after] = Some(current[idx + 1..].to_string()),
                None => self.dropped[after] = true,
            }
        }

        if let Some(before) = self.sig[from].checked_sub(1) {
            if self.toks[before].kind == TokenKind::Whitespace && !self.dropped[before] {
                let current = self.current_text(before);
                let kept = match current.rfind('\n') {
                    Some(idx) => current[..=idx].to_string(),
                    None => String::new(),
                };
                self.subst[before] = Some(kept);
            }
        }
    }

    // ── scanning helpers ───────────────────────────────────────────────────

    /// Position of the bracket closing the one at `open`, or the last token.
    fn matching(&self, open: usize, o: &str, c: &str) -> usize {
        let mut depth = 0usize;
        for q in open..self.len() {
            if self.is_punct(q, o) {
                depth += 1;
            } else if self.is_punct(q, c) {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return q;
                }
            }
        }
        self.len().saturating_sub(1)
    }

    fn type_continues(&self, last: usize, next: usize) -> bool {
        TYPE_CONTINUES_AFTER.contains(&self.text(last))
            || TYPE_CONTINUES_BEFORE.contains(&self.text(next))
    }

    /// Scans a type starting at `start`; returns the position of the first token
    /// past it. Stops at a `stops` punctuator at depth zero, at an unbalanced
    /// closer, or (when `newline_ends`) at a line break the type cannot span.
    fn scan_type(&self, start: usize, stops: &[&str], newline_ends: bool) -> usize {
        let mut depth = 0usize;
        let mut q = start;
        while q < self.len() {
            let is_punct = self.kind(q) == Some(TokenKind::Punct);
            let t = self.text(q);
            if depth == 0 {
                if is_punct && stops.contains(&t) && !(q == start && matches!(t, "{" | "(" | "[")) {
                    break;
                }
                if newline_ends && q > start && self.newline_before(q) && !self.type_continues(q - 1, q) {
                    break;
                }
            }
            if is_punct {
                match t {
                    "(" | "[" | "{" | "<" => depth += 1,
                    ")" | "]" | "}" | ">" => {
                        if depth == 0 {
                            break;
                        }
                        depth -= 1;
                    }
                    _ => {}
                }
            } else if matches!(self.kind(q), Some(TokenKind::Jsx)) {
                break;
            }
            q += 1;
        }
        q
    }

    /// Scans the type following `as`/`satisfies`.
    fn scan_assertion_type(&self, start: usize) -> usize {
        let mut q = start;
        loop {
            if q >= self.len() {
                break;
            }
            match self.kind(q) {
                Some(TokenKind::Ident) if matches!(self.text(q), "typeof" | "keyof" | "readonly" | "unique") => {
                    q += 1;
                    continue;
                }
                Some(TokenKind::Ident) => {
                    q += 1;
                    while self.is_punct(q, ".") && self.is_name(q + 1) {
                        q += 2;
                    }
                    if self.is_punct(q, "<") && !self.newline_before(q) {
                        q = self.matching(q, "<", ">") + 1;
                    }
                }
                Some(TokenKind::Str | TokenKind::Number | TokenKind::Template) => q += 1,
                Some(TokenKind::Punct) if self.is_punct(q, "{") => q = self.matching(q, "{", "}") + 1,
                Some(TokenKind::Punct) if self.is_punct(q, "[") => q = self.matching(q, "[", "]") + 1,
                Some(TokenKind::Punct) if self.is_punct(q, "(") => {
                    q = self.matching(q, "(", ")") + 1;
                    if self.is_punct(q, "=>") {
                        q += 1;
                        continue;
                    }
                }
                _ => break,
            }
            while self.is_punct(q, "[") && !self.newline_before(q) {
                q = self.matching(q, "[", "]") + 1;
            }
            if self.is_punct(q, "|") || self.is_punct(q, "&") {
                q += 1;
                continue;
            }
            break;
        }
        q.min(self.len())
    }

    /// If `<` at `open` starts a balanced list of type-looking tokens, returns
    /// the position of its closing `>`.
    fn match_type_args(&self, open: usize) -> Option<usize> {
        let mut angle = 0usize;
        let mut nested = 0usize;
        let mut q = open;
        while q < self.len() && q - open < 256 {
            match self.kind(q)? {
                TokenKind::Ident | TokenKind::Str | TokenKind::Number | TokenKind::Template => {}
                TokenKind::Punct => match self.text(q) {
                    "<" => angle += 1,
                    ">" => {
                        angle -= 1;
                        if angle == 0 {
                            return (nested == 0).then_some(q);
                        }
                    }
                    "(" | "[" | "{" => nested += 1,
                    ")" | "]" | "}" => {
                        if nested == 0 {
                            return None;
                        }
                        nested -= 1;
                    }
                    "," | "|" | "&" | "." | ":" | ";" | "?" | "=>" | "=" | "..." | "-" => {}
                    _ => return None,
                },
                _ => return None,
            }
            q += 1;
        }
        None
    }

    fn is_expression_end(&self, q: Option<usize>) -> bool {
        let Some(q) = q else {
            return false;
        };
        match self.kind(q) {
            Some(TokenKind::Ident) => !NON_VALUE_KEYWORDS.contains(&self.effective_text(q)),
            Some(TokenKind::Number | TokenKind::Str | TokenKind::Template | TokenKind::Regex | TokenKind::Jsx) => true,
            Some(TokenKind::Punct) => matches!(self.effective_text(q), ")" | "]" | "}"),
            _ => false,
        }
    }

    fn at_statement_start(&self, p: usize) -> bool {
        if self.top_kind() != FrameKind::Block {
            return false;
        }
        let Some(q) = self.prev_kept(p) else {
            return true;
        };
        let prev = self.effective_text(q);
        if self.kind(q) == Some(TokenKind::Punct) && matches!(prev, ";" | "}" | "{") {
            return true;
        }
        if !self.newline_between(q, p) {
            return false;
        }
        match self.kind(q) {
            Some(TokenKind::Punct) => matches!(prev, ")" | "]"),
            Some(TokenKind::Ident) => !NON_VALUE_KEYWORDS.contains(&prev),
            _ => true,
        }
    }

    /// Last position of the line that `p` is on.
    fn line_end(&self, p: usize) -> usize {
        let mut q = p;
        while q + 1 < self.len() && !self.newline_before(q + 1) {
            q += 1;
        }
        q
    }

    // ── walk ────────────────────────────────────────────────────────────────

    fn run(&mut self) {
        let mut p = 0;
        while p < self.len() {
            let next = self.step(p);
            p = next.max(p + 1);
        }
    }

    fn step(&mut self, p: usize) -> usize {
        let Some(tok) = self.tok(p) else {
            return p + 1;
        };
        let kind = tok.kind;
        let text = tok.text.clone();

        let after_decl = std::mem::take(&mut self.after_decl);
        if after_decl && kind == TokenKind::Ident {
            self.decl_binding_end = Some(p);
        }

        match kind {
            TokenKind::Ident => {
                if self.at_statement_start(p) {
                    if let Some(next) = self.statement(p, &text) {
                        return next;
                    }
                }
                self.ident(p, &text)
            }
            TokenKind::Punct => self.punct(p, &text, after_decl),
            _ => p + 1,
        }
    }

    fn statement(&mut self, p: usize, text: &str) -> Option<usize> {
        let decls = self.rules.contains(Rule::TypeDeclarations);
        match text {
            "import" if self.rules.contains(Rule::Imports)
                && !self.is_punct(p + 1, "(")
                && !self.is_punct(p + 1, ".") =>
            {
                Some(self.import_statement(p))
            }
            "export" => self.export_statement(p),
            "interface" if decls && self.is_name(p + 1) => Some(self.drop_interface(p, p)),
            "type" if decls && self.is_type_alias(p) => Some(self.drop_type_alias(p, p)),
            "declare" if decls && matches!(self.kind(p + 1), Some(TokenKind::Ident | TokenKind::Str)) => {
                Some(self.drop_declare(p))
            }
            "enum" if decls && self.is_name(p + 1) => self.rewrite_enum(p, p),
            "const" if decls && self.is_ident(p + 1, "enum") => self.rewrite_enum(p, p + 1),
            _ => None,
        }
    }

    fn is_type_alias(&self, kw: usize) -> bool {
        self.is_name(kw + 1) && (self.is_punct(kw + 2, "=") || self.is_punct(kw + 2, "<"))
    }

    fn ident(&mut self, p: usize, text: &str) -> usize {
        match text {
            "as" | "satisfies"
                if self.rules.contains(Rule::Assertions) && self.is_expression_end(self.prev_kept(p)) =>
            {
                let end = self.scan_assertion_type(p + 1);
                if end > p + 1 {
                    self.drop_space_before(p);
                    self.drop_range(p, end - 1);
                    return end;
                }
                p + 1
            }
            "const" | "let" | "var" => {
                self.after_decl = true;
                self.decl_binding_end = None;
                self.decl_depth = Some(self.stack.len());
                p + 1
            }
            "class" => {
                self.pending_class = Some(self.stack.len());
                p + 1
            }
            "implements"
                if self.rules.contains(Rule::Annotations) && self.pending_class == Some(self.stack.len()) =>
            {
                let mut q = p + 1;
                while q < self.len() && !self.is_punct(q, "{") {
                    q += 1;
                }
                self.drop_space_before(p);
                self.drop_range(p, q.saturating_sub(1));
                q
            }
            "case" => {
                if self.top_kind() == FrameKind::Block {
                    self.in_case = true;
                }
                p + 1
            }
            "abstract"
                if self.rules.contains(Rule::Annotations)
                    && self.top_kind() == FrameKind::Class
                    && !self.is_ident(p + 1, "class") =>
            {
                self.drop_abstract_member(p)
            }
            "this"
                if self.rules.contains(Rule::Annotations)
                    && self.top_kind() == FrameKind::Paren
                    && self.is_punct(p + 1, ":")
                    && self.prev_kept(p).is_some_and(|q| self.is_punct(q, "(")) =>
            {
                self.drop_this_param(p)
            }
            _ if MODIFIERS.contains(&text) && self.rules.contains(Rule::Annotations) && self.is_modifier(p, text) => {
                if self.top_kind() == FrameKind::Paren && !MODIFIERS.contains(&self.text(p + 1)) {
                    let name = self.text(p + 1).to_string();
                    self.param_props.push(name);
                    self.param_props_depth = Some(self.stack.len());
                }
                self.drop_keyword(p);
                p + 1
            }
            _ => p + 1,
        }
    }

    fn is_modifier(&self, p: usize, text: &str) -> bool {
        if text == "abstract" && self.is_ident(p + 1, "class") {
            return true;
        }
        if !matches!(self.top_kind(), FrameKind::Class | FrameKind::Paren) {
            return false;
        }
        if text == "declare" && self.top_kind() != FrameKind::Class {
            return false;
        }
        let next_is_member = self.is_name(p + 1) || self.is_punct(p + 1, "[");
        next_is_member && !self.newline_between(p, p + 1)
    }

    fn punct(&mut self, p: usize, text: &str, after_decl: bool) -> usize {
        match text {
            "(" => {
                self.stack.push(Frame::new(FrameKind::Paren));
                p + 1
            }
            "[" => {
                let mut frame = Frame::new(FrameKind::Bracket);
                frame.decl_pattern = after_decl;
                self.stack.push(frame);
                p + 1
            }
            "{" => {
                let kind = self.classify_brace(p);
                if kind == FrameKind::Class {
                    self.pending_class = None;
                }
                if kind == FrameKind::Block && std::mem::take(&mut self.ctor_body_pending) {
                    self.assign_param_props(p);
                }
                let mut frame = Frame::new(kind);
                frame.decl_pattern = after_decl;
                self.stack.push(frame);
                p + 1
            }
            ")" => {
                if self.param_props_depth == Some(self.stack.len()) {
                    self.param_props_depth = None;
                    self.ctor_body_pending = true;
                }
                self.pop();
                self.return_type(p)
            }
            "]" | "}" => {
                if let Some(frame) = self.pop() {
                    if frame.decl_pattern {
                        self.decl_binding_end = Some(p);
                    }
                }
                p + 1
            }
            "?" => self.question(p),
            ":" => self.colon(p),
            "!" => {
                self.non_null(p);
                p + 1
            }
            "<" => match self.angle_cast(p) {
                Some(next) => next,
                None => self.type_arguments(p),
            },
            ";" => {
                self.top().ternary = 0;
                self.in_case = false;
                if self.decl_depth == Some(self.stack.len()) {
                    self.decl_depth = None;
                }
                p + 1
            }
            // Next declarator in `let a = 1, b: T = 2`.
            "," if self.decl_depth == Some(self.stack.len()) && self.top().ternary == 0 => {
                self.after_decl = true;
                p + 1
            }
            _ => p + 1,
        }
    }

    fn classify_brace(&self, p: usize) -> FrameKind {
        if self.pending_class == Some(self.stack.len()) {
            return FrameKind::Class;
        }
        let Some(q) = self.prev_kept(p) else {
            return FrameKind::Block;
        };
        if Some(q) == self.last_case_colon {
            return FrameKind::Block;
        }
        let prev = self.effective_text(q);
        match self.kind(q) {
            Some(TokenKind::Jsx) => FrameKind::JsxExpr,
            Some(TokenKind::Punct) => match prev {
                ")" | "=>" | ";" | "{" | "}" => FrameKind::Block,
                _ => FrameKind::Object,
            },
            Some(TokenKind::Ident) => match prev {
                "return" | "typeof" | "yield" | "await" | "case" | "in" | "of" | "new" | "void"
                | "throw" | "default" | "=" => FrameKind::Object,
                _ => FrameKind::Block,
            },
            _ => FrameKind::Block,
        }
    }

    fn question(&mut self, p: usize) -> usize {
        let in_params = self.top_kind() == FrameKind::Paren;
        let optional = self.is_punct(p + 1, ":")
            || (in_params && (self.is_punct(p + 1, ",") || self.is_punct(p + 1, ")") || self.is_punct(p + 1, "=")));
        if optional {
            if self.rules.contains(Rule::Annotations) {
                self.drop_range(p, p);
            }
        } else {
            self.top().ternary += 1;
        }
        p + 1
    }

    fn colon(&mut self, p: usize) -> usize {
        let frame = *self.top();
        if frame.ternary > 0 {
            self.top().ternary -= 1;
            return p + 1;
        }
        if self.in_case && frame.kind == FrameKind::Block {
            self.in_case = false;
            self.last_case_colon = Some(p);
            return p + 1;
        }
        if !self.rules.contains(Rule::Annotations) {
            return p + 1;
        }
        match frame.kind {
            FrameKind::Paren => self.strip_annotation(p, &[",", ")", "="], false),
            FrameKind::Class => self.strip_annotation(p, &[";", "=", "}"], true),
            FrameKind::Block
                if self.decl_binding_end.is_some() && self.prev_kept(p) == self.decl_binding_end =>
            {
                self.strip_annotation(p, &["=", ";", ",", ")"], true)
            }
            _ => p + 1,
        }
    }

    fn strip_annotation(&mut self, colon: usize, stops: &[&str], newline_ends: bool) -> usize {
        let end = self.scan_type(colon + 1, stops, newline_ends);
        if end == colon + 1 {
            return colon + 1;
        }
        self.drop_range(colon, end - 1);
        end
    }

    /// `): Type {` / `): Type =>` after a parameter list.
    fn return_type(&mut self, close: usize) -> usize {
        let next = close + 1;
        if !self.rules.contains(Rule::Annotations)
            || !self.is_punct(next, ":")
            || self.in_case
            || self.top().ternary > 0
        {
            return next;
        }
        let end = self.scan_type(next + 1, &["{", "=>", ";", "="], false);
        let body_follows = self.is_punct(end, "{")
            || self.is_punct(end, "=>")
            || (self.is_punct(end, ";") && self.top_kind() == FrameKind::Class);
        if end == next + 1 || !body_follows {
            return next;
        }
        self.drop_range(next, end - 1);
        end
    }

    fn non_null(&mut self, p: usize) {
        if !self.rules.contains(Rule::Assertions) {
            return;
        }
        let prev_ok = self.prev_kept(p).is_some_and(|q| match self.kind(q) {
            Some(TokenKind::Ident) => !NON_VALUE_KEYWORDS.contains(&self.effective_text(q)),
            Some(TokenKind::Punct) => matches!(self.effective_text(q), ")" | "]"),
            _ => false,
        });
        let glued = self.sig[p]
            .checked_sub(1)
            .is_some_and(|i| !self.toks[i].is_trivia());
        let next_ok = p + 1 >= self.len()
            || self.newline_before(p + 1)
            || matches!(self.text(p + 1), "." | "?." | ")" | "," | ";" | "]" | "}" | "[" | ":" | "=");
        if prev_ok && glued && next_ok {
            self.drop_range(p, p);
        }
    }

    /// `<T>expr` casts; only outside JSX, where `<` cannot open an element.
    fn angle_cast(&mut self, p: usize) -> Option<usize> {
        if self.jsx || !self.rules.contains(Rule::Assertions) || self.is_expression_end(self.prev_kept(p)) {
            return None;
        }
        let close = self.match_type_args(p)?;
        let operand = matches!(
            self.kind(close + 1),
            Some(TokenKind::Ident | TokenKind::Str | TokenKind::Number | TokenKind::Template)
        ) || self.is_punct(close + 1, "(")
            || self.is_punct(close + 1, "[");
        if !operand {
            return None;
        }
        self.drop_range(p, close);
        Some(close + 1)
    }

    /// `this: T` as the first parameter, with its trailing comma.
    fn drop_this_param(&mut self, p: usize) -> usize {
        let end = self.scan_type(p + 2, &[",", ")", "="], false);
        if self.is_punct(end, ",") {
            self.drop_keyword(end);
            self.drop_range(p, end);
            end + 1
        } else {
            self.drop_range(p, end - 1);
            end
        }
    }

    /// Abstract members never have a body or an initializer.
    fn drop_abstract_member(&mut self, p: usize) -> usize {
        let mut depth = 0usize;
        let mut last = p;
        let mut q = p + 1;
        while q < self.len() {
            if depth == 0 && q > p + 1 && self.newline_before(q) && !self.type_continues(last, q) {
                break;
            }
            if self.kind(q) == Some(TokenKind::Punct) {
                match self.text(q) {
                    "(" | "[" | "{" | "<" => depth += 1,
                    ")" | "]" | ">" => depth = depth.saturating_sub(1),
                    "}" if depth == 0 => break,
                    "}" => depth -= 1,
                    ";" if depth == 0 => {
                        last = q;
                        break;
                    }
                    _ => {}
                }
            }
            last = q;
            q += 1;
        }
        self.drop_statement(p, last);
        last + 1
    }

    /// Emits `this.x = x;` for constructor parameter properties at the start
    /// of the body opened at `open`, or right after a leading `super(..)` call.
    fn assign_param_props(&mut self, open: usize) {
        let assigns: Vec<String> = std::mem::take(&mut self.param_props)
            .iter()
            .map(|name| format!("this.{name} = {name};"))
            .collect();
        if assigns.is_empty() {
            return;
        }
        let mut anchor = open;
        if self.is_ident(open + 1, "super") && self.is_punct(open + 2, "(") {
            let close = self.matching(open + 2, "(", ")");
            anchor = if self.is_punct(close + 1, ";") { close + 1 } else { close };
        }
        let raw = self.sig[anchor];
        let spaced = self.toks.get(raw + 1).is_some_and(Token::is_trivia);
        let text = if spaced {
            format!(" {}", assigns.join(" "))
        } else {
            format!(" {} ", assigns.join(" "))
        };
        self.inserted.insert(raw, text);
    }

    fn type_arguments(&mut self, p: usize) -> usize {
        if !self.rules.contains(Rule::Generics) {
            return p + 1;
        }
        let prev = self.prev_kept(p);
        let after_name = prev.is_some_and(|q| {
            self.is_name(q) && !NON_VALUE_KEYWORDS.contains(&self.effective_text(q)) && !self.newline_between(q, p)
        });
        let arrow_head = self.is_name(p + 1) && (self.is_punct(p + 2, ",") || self.is_ident(p + 2, "extends"));
        if !after_name && !arrow_head {
            return p + 1;
        }
        let Some(close) = self.match_type_args(p) else {
            return p + 1;
        };
        let after = close + 1;
        let in_class_head = self.pending_class == Some(self.stack.len());
        let follows = self.is_punct(after, "(")
            || (in_class_head
                && (self.is_punct(after, "{")
                    || self.is_ident(after, "extends")
                    || self.is_ident(after, "implements")
                    || self.is_punct(after, ",")));
        if !follows {
            return p + 1;
        }
        self.drop_range(p, close);
        after
    }

    // ── statements ──────────────────────────────────────────────────────────

    fn import_statement(&mut self, p: usize) -> usize {
        let mut binding = ImportBinding::default();
        let mut q = p + 1;
        let type_only = self.is_ident(q, "type") && !self.is_ident(q + 1, "from") && !self.is_punct(q + 1, ",");
        if type_only {
            q += 1;
        }

        let end = if self.kind(q) == Some(TokenKind::Str) {
            binding.source = self.unquoted(q);
            q
        } else {
            if self.is_name(q) && !self.is_ident(q, "from") {
                binding.default = Some(self.text(q).to_string());
                q += 1;
                if self.is_punct(q, ",") {
                    q += 1;
                }
            }
            if self.is_punct(q, "*") && self.is_ident(q + 1, "as") && self.is_name(q + 2) {
                binding.namespace = Some(self.text(q + 2).to_string());
                q += 3;
            }
            if self.is_punct(q, "{") {
                let close = self.matching(q, "{", "}");
                binding.named = self.specifiers(q + 1, close);
                q = close + 1;
            }
            if self.is_ident(q, "from") && self.kind(q + 1) == Some(TokenKind::Str) {
                binding.source = self.unquoted(q + 1);
                q + 1
            } else {
                self.line_end(p)
            }
        };
        let end = if self.is_punct(end + 1, ";") { end + 1 } else { end };

        if !type_only && !binding.source.is_empty() {
            self.imports.push(binding);
        }
        self.drop_statement(p, end);
        end + 1
    }

    /// Parses `a, b as c, type T` between braces into `(name, alias)` pairs,
    /// skipping type-only specifiers.
    fn specifiers(&self, from: usize, close: usize) -> Vec<(String, String)> {
        let mut out = Vec::new();
        let mut q = from;
        while q < close {
            if self.is_punct(q, ",") {
                q += 1;
                continue;
            }
            let type_only = self.is_ident(q, "type")
                && q + 1 < close
                && !self.is_punct(q + 1, ",")
                && !self.is_ident(q + 1, "as");
            if type_only {
                q += 1;
            }
            let name = self.unquoted(q);
            q += 1;
            let alias = if self.is_ident(q, "as") && q + 1 < close {
                q += 2;
                self.unquoted(q - 1)
            } else {
                name.clone()
            };
            if !type_only {
                out.push((name, alias));
            }
        }
        out
    }

    fn export_statement(&mut self, p: usize) -> Option<usize> {
        let q = p + 1;
        let types = self.rules.contains(Rule::TypeExports);
        let exports = self.rules.contains(Rule::Exports);
        let next = self.text(q).to_string();
        match next.as_str() {
            "type" if types && (self.is_punct(q + 1, "{") || self.is_punct(q + 1, "*")) => {
                let (end, _) = self.export_clause_end(q + 1);
                self.drop_statement(p, end);
                Some(end + 1)
            }
            "type" if types && self.is_type_alias(q) => Some(self.drop_type_alias(p, q)),
            "interface" if types && self.is_name(q + 1) => Some(self.drop_interface(p, q)),
            "declare" if types => Some(self.drop_declare(p)),
            "default" if exports => Some(self.export_default(p, q)),
            "{" | "*" if exports && self.kind(q) == Some(TokenKind::Punct) => {
                let (end, reexport) = self.export_clause_end(q);
                if next == "{" && !reexport {
                    let close = self.matching(q, "{", "}");
                    for (local, exported) in self.specifiers(q + 1, close) {
                        if exported == "default" {
                            self.default_export = Some(local.clone());
                        }
                        self.exports.push(ExportBinding { local, exported });
                    }
                }
                self.drop_statement(p, end);
                Some(end + 1)
            }
            "const" | "let" | "var" | "function" | "class" | "async" | "abstract" | "enum" if exports => {
                if let Some(name) = self.declared_name(q) {
                    self.exports.push(ExportBinding {
                        local: name.clone(),
                        exported: name,
                    });
                }
                self.drop_keyword(p);
                Some(q)
            }
            _ => None,
        }
    }

    fn declared_name(&self, kw: usize) -> Option<String> {
        let mut q = kw + 1;
        match self.text(kw) {
            "async" if self.is_ident(q, "function") => q += 1,
            "abstract" if self.is_ident(q, "class") => q += 1,
            "const" if self.is_ident(q, "enum") => q += 1,
            _ => {}
        }
        if self.is_punct(q, "*") {
            q += 1;
        }
        self.is_name(q).then(|| self.text(q).to_string())
    }

    /// End of `{ .. } [from '..'][;]` or `* [as ns] from '..'[;]` starting at
    /// `q`, and whether it re-exports from another module.
    fn export_clause_end(&self, q: usize) -> (usize, bool) {
        let mut r = if self.is_punct(q, "{") {
            self.matching(q, "{", "}") + 1
        } else {
            q + 1
        };
        if self.is_ident(r, "as") && self.is_name(r + 1) {
            r += 2;
        }
        let (mut end, reexport) = if self.is_ident(r, "from") && self.kind(r + 1) == Some(TokenKind::Str) {
            (r + 1, true)
        } else {
            (r - 1, false)
        };
        if self.is_punct(end + 1, ";") {
            end += 1;
        }
        (end.min(self.len().saturating_sub(1)), reexport)
    }

    fn export_default(&mut self, p: usize, q: usize) -> usize {
        let r = q + 1;
        let function_kw = if self.is_ident(r, "async") && self.is_ident(r + 1, "function") {
            Some(r + 1)
        } else if self.is_ident(r, "function") {
            Some(r)
        } else {
            None
        };
        let class_kw = if self.is_ident(r, "class") {
            Some(r)
        } else if self.is_ident(r, "abstract") && self.is_ident(r + 1, "class") {
            Some(r + 1)
        } else {
            None
        };
        let name_pos = function_kw
            .map(|f| if self.is_punct(f + 1, "*") { f + 2 } else { f + 1 })
            .or(class_kw.map(|c| c + 1))
            .filter(|&n| self.is_name(n) && !self.is_ident(n, "extends"));

        // `export default App;` names an existing binding.
        let bare_name = name_pos.is_none()
            && self.is_name(r)
            && !NON_VALUE_KEYWORDS.contains(&self.text(r))
            && !matches!(self.text(r), "async" | "class" | "this")
            && (r + 1 >= self.len() || self.is_punct(r + 1, ";") || self.newline_before(r + 1));

        match name_pos {
            Some(n) => {
                self.default_export = Some(self.text(n).to_string());
                self.drop_keyword(p);
                self.drop_keyword(q);
            }
            None if bare_name => {
                self.default_export = Some(self.text(r).to_string());
                let end = if self.is_punct(r + 1, ";") { r + 1 } else { r };
                self.drop_statement(p, end);
                return end + 1;
            }
            None => {
                self.default_export = Some(DEFAULT_EXPORT_IDENT.to_string());
                self.subst[self.sig[p]] = Some(format!("const {DEFAULT_EXPORT_IDENT} ="));
                for i in self.sig[p] + 1..=self.sig[q] {
                    self.dropped[i] = true;
                }
            }
        }
        r
    }

    fn drop_interface(&mut self, start: usize, kw: usize) -> usize {
        let mut q = kw + 1;
        let mut angle = 0usize;
        while q < self.len() {
            if self.is_punct(q, "<") {
                angle += 1;
            } else if self.is_punct(q, ">") {
                angle = angle.saturating_sub(1);
            } else if self.is_punct(q, "{") && angle == 0 {
                break;
            }
            q += 1;
        }
        if q >= self.len() {
            let last = self.len() - 1;
            self.drop_statement(start, last);
            return self.len();
        }
        let close = self.matching(q, "{", "}");
        let close = if self.is_punct(close + 1, ";") { close + 1 } else { close };
        self.drop_statement(start, close);
        close + 1
    }

    fn drop_type_alias(&mut self, start: usize, kw: usize) -> usize {
        let mut q = kw + 2;
        if self.is_punct(q, "<") {
            q = self.matching(q, "<", ">") + 1;
        }
        if !self.is_punct(q, "=") {
            return kw + 1;
        }
        let end = self.scan_type(q + 1, &[";"], true);
        let last = if self.is_punct(end, ";") { end } else { end - 1 };
        self.drop_statement(start, last);
        last + 1
    }

    fn drop_declare(&mut self, p: usize) -> usize {
        let mut depth = 0usize;
        let mut last = p;
        let mut q = p + 1;
        while q < self.len() {
            if depth == 0 && q > p + 2 && self.newline_before(q) && !self.type_continues(last, q) {
                break;
            }
            last = q;
            if self.kind(q) == Some(TokenKind::Punct) {
                match self.text(q) {
                    "(" | "[" | "{" => depth += 1,
                    ")" | "]" => depth = depth.saturating_sub(1),
                    "}" => {
                        depth = depth.saturating_sub(1);
                        if depth == 0 {
                            break;
                        }
                    }
                    ";" if depth == 0 => break,
                    _ => {}
                }
            }
            q += 1;
        }
        self.drop_statement(p, last);
        last + 1
    }

    /// `enum E { A, B = 4, C = "c" }` becomes a frozen object literal.
    fn rewrite_enum(&mut self, start: usize, kw: usize) -> Option<usize> {
        let name_pos = kw + 1;
        let open = kw + 2;
        if !self.is_name(name_pos) || !self.is_punct(open, "{") {
            return None;
        }
        let close = self.matching(open, "{", "}");
        let name = self.text(name_pos).to_string();

        let mut members = Vec::new();
        let mut next_value: Option<i64> = Some(0);
        let mut q = open + 1;
        while q < close {
            if self.is_punct(q, ",") {
                q += 1;
                continue;
            }
            let key = self.text(q).to_string();
            q += 1;
            let value = if self.is_punct(q, "=") {
                let init_start = q + 1;
                let mut depth = 0usize;
                let mut r = init_start;
                while r < close && !(depth == 0 && self.is_punct(r, ",")) {
                    match self.text(r) {
                        "(" | "[" | "{" => depth += 1,
                        ")" | "]" | "}" => depth = depth.saturating_sub(1),
                        _ => {}
                    }
                    r += 1;
                }
                let init = self.raw_text(init_start, r.saturating_sub(1)).trim().to_string();
                q = r;
                match init.parse::<i64>() {
                    Ok(v) => {
                        next_value = v.checked_add(1);
                        v.to_string()
                    }
                    Err(_) => {
                        next_value = None;
                        init
                    }
                }
            } else {
                let value = next_value.map_or_else(|| "undefined".to_string(), |v| v.to_string());
                next_value = next_value.and_then(|v| v.checked_add(1));
                value
            };
            members.push(format!("{key}: {value}"));
        }

        let replacement = format!("const {name} = Object.freeze({{ {} }});", members.join(", "));
        let end = if self.is_punct(close + 1, ";") { close + 1 } else { close };
        self.drop_range(start, end);
        let first = self.sig[start];
        self.dropped[first] = false;
        self.subst[first] = Some(replacement);
        Some(end + 1)
    }

    /// Original text of significant tokens `from..=to`, trivia included.
    fn raw_text(&self, from: usize, to: usize) -> String {
        if from > to || to >= self.len() {
            return String::new();
        }
        self.toks[self.sig[from]..=self.sig[to]]
            .iter()
            .map(|t| t.text.as_str())
            .collect()
    }
}
