//! Token stream over normalized source text.
use std::ops::Range;

use logos::Logos;
use serde::Serialize;

use crate::error::ExprError;

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TokenKind {
    Ident,
    Number,
    Str,
    Punct,
    /// `$name` (or a lone `$`)
    System,
    /// `` `name ``
    Directive,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    /// 1-based
    pub line: usize,
    /// byte range into the unit text
    pub span: Range<usize>,
}

impl Token {
    /// Keyword or punctuation match. Never true for string literals.
    pub fn is(&self, text: &str) -> bool {
        self.kind != TokenKind::Str && self.text == text
    }
    pub fn is_ident(&self) -> bool {
        self.kind == TokenKind::Ident
    }
}

/// Raw lexemes. Whitespace is skipped; anything unmatched lexes as a single `Other` char.
#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
#[logos(skip r"[ \t\r\n\f]+")]
enum Lexeme {
    #[regex(r"[A-Za-z_][A-Za-z0-9_$]*")]
    Ident,

    #[regex(r"[0-9][0-9_]*(\.[0-9][0-9_]*)?")]
    #[regex(r"[0-9][0-9_]*'[sS]?[bBoOdDhH][ \t]*[0-9a-fA-FxXzZ?_]+")]
    #[regex(r"'[sS]?[bBoOdDhH][ \t]*[0-9a-fA-FxXzZ?_]+")]
    #[regex(r"'[01xXzZ]")]
    Number,

    // unterminated strings stop at the end of the line
    #[regex(r#""([^"\\\n]|\\[^\n])*"?"#)]
    Str,

    #[regex(r"\$[A-Za-z0-9_$]*")]
    System,

    #[regex(r"`[A-Za-z0-9_$]*")]
    Directive,

    #[token("<->")]
    #[token("===")]
    #[token("!==")]
    #[token("<<<")]
    #[token(">>>")]
    #[token("->")]
    #[token("==")]
    #[token("!=")]
    #[token("<=")]
    #[token(">=")]
    #[token("&&")]
    #[token("||")]
    #[token("<<")]
    #[token(">>")]
    #[token("**")]
    #[token(":=")]
    #[token(":/")]
    #[token("::")]
    #[token("~^")]
    #[token("^~")]
    #[token("~&")]
    #[token("~|")]
    #[token("++")]
    #[token("--")]
    #[token("+:")]
    #[token("-:")]
    Operator,

    #[regex(r".", priority = 0)]
    Other,
}

impl Lexeme {
    fn kind(self) -> TokenKind {
        match self {
            Self::Ident => TokenKind::Ident,
            Self::Number => TokenKind::Number,
            Self::Str => TokenKind::Str,
            Self::System => TokenKind::System,
            Self::Directive => TokenKind::Directive,
            Self::Operator | Self::Other => TokenKind::Punct,
        }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// LEXER
// ————————————————————————————————————————————————————————————————————————————

/// Tokenize normalized text. Never fails; unknown input becomes single-char punctuation.
pub fn tokenize(src: &str) -> Vec<Token> {
    let mut lexer = Lexeme::lexer(src);
    let mut tokens = Vec::new();
    let mut line = 1usize;
    let mut counted = 0usize;

    while let Some(result) = lexer.next() {
        let span = lexer.span();
        line += src[counted..span.start].matches('\n').count();
        counted = span.start;
        tokens.push(Token {
            kind: result.unwrap_or(Lexeme::Other).kind(),
            text: lexer.slice().to_string(),
            line,
            span,
        });
    }

    tokens
}

// ————————————————————————————————————————————————————————————————————————————
// CURSOR
// ————————————————————————————————————————————————————————————————————————————

/// Forward-only view over a token slice, with access to the text the spans index.
#[derive(Debug, Clone)]
pub struct Cursor<'a> {
    tokens: &'a [Token],
    pos: usize,
    src: &'a str,
}

impl<'a> Cursor<'a> {
    pub fn new(tokens: &'a [Token], src: &'a str) -> Self {
        Self { tokens, pos: 0, src }
    }
    pub fn pos(&self) -> usize {
        self.pos
    }
    pub fn reset(&mut self, pos: usize) {
        self.pos = pos.min(self.tokens.len());
    }
    pub fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }
    pub fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos)
    }
    pub fn peek_at(&self, offset: usize) -> Option<&'a Token> {
        self.tokens.get(self.pos + offset)
    }
    pub fn peek_is(&self, text: &str) -> bool {
        self.peek().is_some_and(|t| t.is(text))
    }
    pub fn next(&mut self) -> Option<&'a Token> {
        let token = self.tokens.get(self.pos)?;
        self.pos += 1;
        Some(token)
    }
    /// Consume the next token if it matches.
    pub fn eat(&mut self, text: &str) -> bool {
        if self.peek_is(text) {
            self.pos += 1;
            true
        } else {
            false
        }
    }
    pub fn expect(&mut self, text: &str) -> Result<&'a Token, ExprError> {
        match self.peek() {
            Some(t) if t.is(text) => {
                self.pos += 1;
                Ok(t)
            }
            Some(t) => Err(ExprError::Expected {
                expected: format!("`{text}`"),
                found: t.text.clone(),
                line: t.line,
            }),
            None => Err(ExprError::UnexpectedEnd {
                expected: format!("`{text}`"),
            }),
        }
    }
    pub fn expect_ident(&mut self) -> Result<&'a Token, ExprError> {
        match self.peek() {
            Some(t) if t.is_ident() => {
                self.pos += 1;
                Ok(t)
            }
            Some(t) => Err(ExprError::Expected {
                expected: "identifier".to_string(),
                found: t.text.clone(),
                line: t.line,
            }),
            None => Err(ExprError::UnexpectedEnd {
                expected: "identifier".to_string(),
            }),
        }
    }
    /// Line of the next token, or of the last one when exhausted.
    pub fn line(&self) -> usize {
        self.peek()
            .or_else(|| self.tokens.last())
            .map_or(1, |t| t.line)
    }
    /// Source text covering tokens `from..to` (token indices), whitespace collapsed.
    pub fn text_between(&self, from: usize, to: usize) -> String {
        span_text(self.src, &self.tokens[from.min(to)..to.min(self.tokens.len())])
    }
    /// Skip past the next `;` at bracket depth zero (or to the end).
    pub fn skip_statement(&mut self) {
        let mut depth = 0i32;
        while let Some(t) = self.next() {
            match t.text.as_str() {
                "(" | "[" | "{" => depth += 1,
                ")" | "]" | "}" => depth -= 1,
                ";" if depth <= 0 => return,
                _ => {}
            }
        }
    }
}

/// Whitespace-collapsed source text spanning a run of tokens.
pub fn span_text(src: &str, tokens: &[Token]) -> String {
    match (tokens.first(), tokens.last()) {
        (Some(first), Some(last)) => collapse_ws(&src[first.span.start..last.span.end]),
        _ => String::new(),
    }
}

pub fn collapse_ws(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(src: &str) -> Vec<String> {
        tokenize(src).into_iter().map(|t| t.text).collect()
    }

    #[test]
    fn based_literals_are_single_tokens() {
        assert_eq!(texts("x == 8'hFF && y < 'b1010"), ["x", "==", "8'hFF", "&&", "y", "<", "'b1010"]);
        assert_eq!(texts("16'sd5 1_000 'x"), ["16'sd5", "1_000", "'x"]);
        let tokens = tokenize("8'hFF");
        assert_eq!(tokens[0].kind, TokenKind::Number);
    }

    #[test]
    fn operators_are_greedy() {
        assert_eq!(texts("a <-> b -> c"), ["a", "<->", "b", "->", "c"]);
        assert_eq!(texts("a !== b === c"), ["a", "!==", "b", "===", "c"]);
        assert_eq!(texts("x dist {[0:3]:=60}"), ["x", "dist", "{", "[", "0", ":", "3", "]", ":=", "60", "}"]);
        assert_eq!(texts("a>>>2"), ["a", ">>>", "2"]);
    }

    #[test]
    fn lines_and_spans_track_source() {
        let src = "class a;\n  rand int x;\nendclass";
        let tokens = tokenize(src);
        let x = tokens.iter().find(|t| t.text == "x").unwrap();
        assert_eq!(x.line, 2);
        assert_eq!(&src[x.span.clone()], "x");
        assert_eq!(tokens.last().unwrap().line, 3);
    }

    #[test]
    fn system_directive_and_cast_tokens() {
        let tokens = tokenize("$countones(v) `uvm_object_utils(p) int'(x)");
        assert_eq!(tokens[0].kind, TokenKind::System);
        assert_eq!(tokens[0].text, "$countones");
        assert!(tokens.iter().any(|t| t.kind == TokenKind::Directive && t.text == "`uvm_object_utils"));
        assert!(tokens.iter().any(|t| t.text == "'"));
    }

    #[test]
    fn strings_and_stray_chars() {
        let tokens = tokenize("\"a \\\"q\\\"\" \u{a3} 'x");
        assert_eq!(tokens[0].kind, TokenKind::Str);
        assert_eq!(tokens[0].text, "\"a \\\"q\\\"\"");
        assert_eq!(tokens[1].kind, TokenKind::Punct);
        assert_eq!(tokens[1].text, "\u{a3}");
        assert_eq!(tokens[2].kind, TokenKind::Number);

        let tokens = tokenize("\"open\nnext");
        assert_eq!(tokens[0].text, "\"open");
        assert_eq!((tokens[1].text.as_str(), tokens[1].line), ("next", 2));
    }

    #[test]
    fn cursor_expect_and_skip() {
        let src = "foo(a; b); next;";
        let tokens = tokenize(src);
        let mut cursor = Cursor::new(&tokens, src);
        assert!(cursor.expect("bar").is_err());
        assert_eq!(cursor.expect_ident().unwrap().text, "foo");
        cursor.skip_statement();
        assert!(cursor.peek_is("next"));
        assert_eq!(cursor.text_between(0, 5), "foo(a; b");
    }
}
