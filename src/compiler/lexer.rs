#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenKind {
    Whitespace,
    Comment,
    Ident,
    Number,
    Str,
    Template,
    Regex,
    Punct,
    Jsx,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
}

impl Token {
    pub fn is_trivia(&self) -> bool {
        matches!(self.kind, TokenKind::Whitespace | TokenKind::Comment)
    }

    pub fn has_newline(&self) -> bool {
        self.text.contains('\n')
    }

    pub fn is_punct(&self, text: &str) -> bool {
        self.kind == TokenKind::Punct && self.text == text
    }

    pub fn is_ident(&self, text: &str) -> bool {
        self.kind == TokenKind::Ident && self.text == text
    }
}

const PUNCTUATORS: &[&str] = &[
    "...", "===", "!==", "**=", "&&=", "||=", "??=", "<<=", "=>", "==", "!=", "<=", ">=", "&&",
    "||", "??", "?.", "++", "--", "+=", "-=", "*=", "/=", "%=", "&=", "|=", "^=", "**", "<<",
];

/// Keywords after which a `/` starts a regex literal rather than a division.
const REGEX_KEYWORDS: &[&str] = &[
    "return", "typeof", "case", "do", "else", "in", "of", "new", "delete", "void", "throw",
    "yield", "await", "instanceof",
];

/// Punctuation after which a `<` opens a JSX element.
const JSX_AFTER_PUNCT: &[&str] = &[
    "(", ",", "=", ":", "?", "[", "{", ";", "=>", "&&", "||", "??", "!",
];

const JSX_AFTER_KEYWORD: &[&str] = &["return", "yield", "await", "default", "case", "else", "do"];

pub fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$' || c == '#'
}

pub fn is_ident_part(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

/// Tokenizes `source`. With `jsx` disabled, `<` is always punctuation.
///
/// Lossless: concatenating the token texts reproduces the source, and input
/// that cannot be classified becomes single-character punctuation. Strings,
/// templates, comments and regex literals stay whole. JSX tag bodies and text
/// become opaque [`TokenKind::Jsx`] tokens; `{...}` containers inside JSX are
/// tokenized as ordinary code.
pub fn tokenize(source: &str, jsx: bool) -> Vec<Token> {
    let mut lexer = Lexer {
        chars: source.chars().collect(),
        pos: 0,
        tokens: Vec::new(),
        jsx,
    };
    lexer.lex_code(false);
    lexer.tokens
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    tokens: Vec<Token>,
    jsx: bool,
}

impl Lexer {
    fn peek(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn push(&mut self, kind: TokenKind, start: usize, end: usize) {
        if start >= end {
            return;
        }
        self.tokens.push(Token {
            kind,
            text: self.chars[start..end].iter().collect(),
        });
        self.pos = end;
    }

    fn last_significant(&self) -> Option<&Token> {
        self.tokens.iter().rev().find(|t| !t.is_trivia())
    }

    /// Lexes code until end of input or, when `stop_at_close` is set, until an
    /// unbalanced `}` (left unconsumed).
    fn lex_code(&mut self, stop_at_close: bool) {
        let mut depth = 0usize;
        while let Some(c) = self.peek(0) {
            if c == '}' {
                if depth == 0 && stop_at_close {
                    return;
                }
                depth = depth.saturating_sub(1);
            } else if c == '{' {
                depth += 1;
            }
            self.lex_token();
        }
    }

    fn lex_token(&mut self) {
        let start = self.pos;
        let Some(c) = self.peek(0) else {
            return;
        };
        let next = self.peek(1);

        if c.is_whitespace() {
            let mut end = start;
            while end < self.chars.len() && self.chars[end].is_whitespace() {
                end += 1;
            }
            self.push(TokenKind::Whitespace, start, end);
        } else if c == '/' && next == Some('/') {
            let mut end = start;
            while end < self.chars.len() && self.chars[end] != '\n' {
                end += 1;
            }
            self.push(TokenKind::Comment, start, end);
        } else if c == '/' && next == Some('*') {
            let mut end = start + 2;
            while end < self.chars.len() && !(self.chars[end] == '*' && self.chars.get(end + 1) == Some(&'/')) {
                end += 1;
            }
            let end = (end + 2).min(self.chars.len());
            self.push(TokenKind::Comment, start, end);
        } else if c == '"' || c == '\'' {
            match self.scan_quoted(start) {
                Some(end) => self.push(TokenKind::Str, start, end),
                // An unterminated quote on this line is not a string opener.
                None => self.push(TokenKind::Punct, start, start + 1),
            }
        } else if c == '`' {
            let end = self.scan_template(start);
            self.push(TokenKind::Template, start, end);
        } else if is_ident_start(c) {
            let mut end = start + 1;
            while end < self.chars.len() && is_ident_part(self.chars[end]) {
                end += 1;
            }
            self.push(TokenKind::Ident, start, end);
        } else if c.is_ascii_digit() || (c == '.' && next.is_some_and(|n| n.is_ascii_digit())) {
            let mut end = start + 1;
            while end < self.chars.len() && (self.chars[end].is_ascii_alphanumeric() || matches!(self.chars[end], '.' | '_')) {
                end += 1;
            }
            self.push(TokenKind::Number, start, end);
        } else if c == '/' && self.regex_allowed() {
            match self.scan_regex(start) {
                Some(end) => self.push(TokenKind::Regex, start, end),
                None => self.push(TokenKind::Punct, start, start + 1),
            }
        } else if c == '<' && self.jsx && self.jsx_allowed() {
            self.lex_jsx_element();
        } else {
            let len = PUNCTUATORS
                .iter()
                .find(|p| self.matches_at(start, p) && !(**p == "?." && self.chars.get(start + 2).is_some_and(|d| d.is_ascii_digit())))
                .map(|p| p.chars().count())
                .unwrap_or(1);
            self.push(TokenKind::Punct, start, start + len);
        }
    }

    fn matches_at(&self, start: usize, text: &str) -> bool {
        text.chars()
            .enumerate()
            .all(|(i, ch)| self.chars.get(start + i) == Some(&ch))
    }

    fn scan_quoted(&self, start: usize) -> Option<usize> {
        let quote = self.chars[start];
        let mut i = start + 1;
        while i < self.chars.len() {
            match self.chars[i] {
                '\\' => i += 2,
                '\n' => return None,
                ch if ch == quote => return Some(i + 1),
                _ => i += 1,
            }
        }
        None
    }

    fn scan_template(&self, start: usize) -> usize {
        let mut i = start + 1;
        while i < self.chars.len() {
            match self.chars[i] {
                '\\' => i += 2,
                '`' => return i + 1,
                '$' if self.chars.get(i + 1) == Some(&'{') => i = self.scan_template_expr(i + 2),
                _ => i += 1,
            }
        }
        self.chars.len()
    }

    fn scan_template_expr(&self, mut i: usize) -> usize {
        let mut depth = 0usize;
        while i < self.chars.len() {
            match self.chars[i] {
                '{' => depth += 1,
                '}' if depth == 0 => return i + 1,
                '}' => depth -= 1,
                '`' => {
                    i = self.scan_template(i);
                    continue;
                }
                '"' | '\'' => {
                    if let Some(end) = self.scan_quoted(i) {
                        i = end;
                        continue;
                    }
                }
                _ => {}
            }
            i += 1;
        }
        self.chars.len()
    }

    fn regex_allowed(&self) -> bool {
        match self.last_significant() {
            None => true,
            Some(t) => match t.kind {
                TokenKind::Punct => !matches!(t.text.as_str(), ")" | "]" | "}"),
                TokenKind::Ident => REGEX_KEYWORDS.contains(&t.text.as_str()),
                TokenKind::Jsx => true,
                _ => false,
            },
        }
    }

    fn scan_regex(&self, start: usize) -> Option<usize> {
        let mut i = start + 1;
        let mut in_class = false;
        while i < self.chars.len() {
            match self.chars[i] {
                '\\' => i += 2,
                '\n' => return None,
                '[' => {
                    in_class = true;
                    i += 1;
                }
                ']' => {
                    in_class = false;
                    i += 1;
                }
                '/' if !in_class => {
                    i += 1;
                    while i < self.chars.len() && is_ident_part(self.chars[i]) {
                        i += 1;
                    }
                    return Some(i);
                }
                _ => i += 1,
            }
        }
        None
    }

    fn jsx_allowed(&self) -> bool {
        let after_ok = match self.last_significant() {
            None => true,
            Some(t) => match t.kind {
                TokenKind::Punct => JSX_AFTER_PUNCT.contains(&t.text.as_str()),
                TokenKind::Ident => JSX_AFTER_KEYWORD.contains(&t.text.as_str()),
                _ => false,
            },
        };
        if !after_ok {
            return false;
        }
        match self.peek(1) {
            Some('>') => true,
            Some(c) if is_ident_start(c) => !self.is_generic_arrow_head(),
            _ => false,
        }
    }

    /// `<T,>(x: T) => x` and `<T extends U>(...)` are type parameters, not JSX.
    fn is_generic_arrow_head(&self) -> bool {
        let mut i = self.pos + 1;
        while i < self.chars.len() && is_ident_part(self.chars[i]) {
            i += 1;
        }
        while i < self.chars.len() && self.chars[i] == ' ' {
            i += 1;
        }
        if self.chars.get(i) == Some(&',') {
            return true;
        }
        let word: String = self.chars[i..]
            .iter()
            .take_while(|c| is_ident_part(**c))
            .collect();
        word == "extends"
    }

    fn flush_jsx(&mut self, start: usize) {
        let end = self.pos;
        if start < end {
            self.tokens.push(Token {
                kind: TokenKind::Jsx,
                text: self.chars[start..end].iter().collect(),
            });
        }
    }

    fn lex_expr_container(&mut self) {
        let start = self.pos;
        self.push(TokenKind::Punct, start, start + 1);
        self.lex_code(true);
        if self.peek(0) == Some('}') {
            let close = self.pos;
            self.push(TokenKind::Punct, close, close + 1);
        }
    }

    fn lex_jsx_element(&mut self) {
        let mut chunk = self.pos;
        self.pos += 1;
        while let Some(c) = self.peek(0) {
            if is_ident_part(c) || matches!(c, '.' | '-' | ':') {
                self.pos += 1;
            } else {
                break;
            }
        }

        // Attributes up to the end of the opening tag.
        loop {
            let Some(c) = self.peek(0) else {
                self.flush_jsx(chunk);
                return;
            };
            match c {
                '{' => {
                    self.flush_jsx(chunk);
                    self.lex_expr_container();
                    chunk = self.pos;
                }
                '"' | '\'' => {
                    self.pos += 1;
                    while self.peek(0).is_some_and(|ch| ch != c) {
                        self.pos += 1;
                    }
                    self.pos = (self.pos + 1).min(self.chars.len());
                }
                '/' if self.peek(1) == Some('>') => {
                    self.pos += 2;
                    self.flush_jsx(chunk);
                    return;
                }
                '>' => {
                    self.pos += 1;
                    break;
                }
                _ => self.pos += 1,
            }
        }

        // Children up to the matching closing tag.
        loop {
            let Some(c) = self.peek(0) else {
                self.flush_jsx(chunk);
                return;
            };
            match c {
                '{' => {
                    self.flush_jsx(chunk);
                    self.lex_expr_container();
                    chunk = self.pos;
                }
                '<' if self.peek(1) == Some('/') => {
                    while self.peek(0).is_some_and(|ch| ch != '>') {
                        self.pos += 1;
                    }
                    self.pos = (self.pos + 1).min(self.chars.len());
                    self.flush_jsx(chunk);
                    return;
                }
                '<' => {
                    self.flush_jsx(chunk);
                    self.lex_jsx_element();
                    chunk = self.pos;
                }
                _ => self.pos += 1,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<(TokenKind, String)> {
        tokenize(src, true)
            .into_iter()
            .filter(|t| t.kind != TokenKind::Whitespace)
            .map(|t| (t.kind, t.text))
            .collect()
    }

    #[test]
    fn test_tokenize_is_lossless() {
        let src = "const a = `x${ {b: 1}.b }` + 'y' / 2; // done\n<div className=\"a\">{a}</div>";
        let joined: String = tokenize(src, true).into_iter().map(|t| t.text).collect();
        assert_eq!(joined, src);
    }

    #[test]
    fn test_unterminated_quote_is_punct() {
        let toks = kinds("a = b ' c\n");
        assert!(toks.contains(&(TokenKind::Punct, "'".to_string())));
    }

    #[test]
    fn test_regex_vs_division() {
        let toks = kinds("x = a / b; y = /ab+c/gi.test(s)");
        assert!(toks.contains(&(TokenKind::Punct, "/".to_string())));
        assert!(toks.contains(&(TokenKind::Regex, "/ab+c/gi".to_string())));
    }

    #[test]
    fn test_jsx_text_is_opaque() {
        let toks = kinds("return (<p>Don't: stop</p>);");
        assert!(toks.contains(&(TokenKind::Jsx, "<p>Don't: stop</p>".to_string())));
    }

    #[test]
    fn test_jsx_expression_container_is_code() {
        let toks = kinds("<input onChange={(e: Event) => set(e)} />");
        assert!(toks.contains(&(TokenKind::Ident, "Event".to_string())));
        assert!(toks.contains(&(TokenKind::Punct, "=>".to_string())));
        assert_eq!(toks.last().unwrap(), &(TokenKind::Jsx, " />".to_string()));
    }

    #[test]
    fn test_nested_jsx_elements() {
        let toks = kinds("x = <ul>{items.map(i => <li key={i}>{i}</li>)}</ul>;");
        let idents: Vec<_> = toks
            .iter()
            .filter(|(k, _)| *k == TokenKind::Ident)
            .map(|(_, t)| t.as_str())
            .collect();
        assert_eq!(idents, vec!["x", "items", "map", "i", "i", "i"]);
        assert_eq!(toks.last().unwrap(), &(TokenKind::Punct, ";".to_string()));
    }

    #[test]
    fn test_generic_call_is_not_jsx() {
        let toks = kinds("const [v, setV] = useState<string>('');");
        assert!(toks.contains(&(TokenKind::Punct, "<".to_string())));
        assert!(!toks.iter().any(|(k, _)| *k == TokenKind::Jsx));
    }

    #[test]
    fn test_generic_arrow_is_not_jsx() {
        let toks = kinds("const id = <T,>(x: T) => x;");
        assert!(!toks.iter().any(|(k, _)| *k == TokenKind::Jsx));
    }

    #[test]
    fn test_jsx_disabled() {
        let toks = tokenize("const n = <number>x;", false);
        assert!(!toks.iter().any(|t| t.kind == TokenKind::Jsx));
    }
}
