//! Lexical analysis for Ember scripts.
//!
//! Tokenization uses logos. The lexer never aborts: a bad character or an
//! unterminated string produces a diagnostic and scanning continues, so one
//! pass reports every lexical problem in a script.
//!
//! # Design
//!
//! - `TokenKind` — all token types (keywords, operators, literals, identifiers)
//! - Whitespace and `//` line comments are stripped during lexing
//! - `lex` pairs every token with its exact source span

use ember_ast::{Diagnostic, LineIndex, Span};
use logos::Logos;

/// Ember token kind.
///
/// Keywords are matched ahead of the identifier rule, so an identifier that
/// spells a keyword is reclassified automatically. Two-character operators
/// win over their one-character prefixes by longest match.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n]+")] // Skip whitespace
#[logos(skip r"//[^\n]*")] // Skip // line comments
pub enum TokenKind {
    // === Keywords ===
    #[token("let")]
    Let,
    #[token("fn")]
    Fn,
    #[token("return")]
    Return,
    #[token("if")]
    If,
    #[token("else")]
    Else,
    #[token("while")]
    While,
    #[token("schedule")]
    Schedule,
    #[token("call")]
    Call,
    #[token("true")]
    True,
    #[token("false")]
    False,
    #[token("null")]
    Null,

    // === Operators ===
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("!")]
    Bang,
    #[token("=")]
    Assign,
    #[token("==")]
    EqEq,
    #[token("!=")]
    BangEq,
    #[token("<")]
    Lt,
    #[token("<=")]
    LtEq,
    #[token(">")]
    Gt,
    #[token(">=")]
    GtEq,
    #[token("&&")]
    AndAnd,
    #[token("||")]
    OrOr,

    // === Delimiters ===
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token(",")]
    Comma,
    #[token(";")]
    Semicolon,

    // === Literals ===
    /// Number literal: digits with an optional fractional part. No exponent
    /// and no sign; unary minus is a separate operator.
    #[regex(r"[0-9]+(\.[0-9]+)?", |lex| lex.slice().parse::<f64>().ok())]
    Number(f64),

    /// Double-quoted string literal with escape processing.
    #[regex(r#""([^"\\\r\n]|\\[^\r\n])*""#, |lex| {
        let s = lex.slice();
        unescape_string(&s[1..s.len() - 1])
    })]
    Str(String),

    /// A string opened but never closed before a newline or end of input.
    /// Reported as a diagnostic by `lex`; yields no token.
    #[regex(r#""([^"\\\r\n]|\\[^\r\n])*"#)]
    UnterminatedStr,

    /// Identifier.
    #[regex(r"[A-Za-z_][A-Za-z0-9_]*", |lex| lex.slice().to_string())]
    Ident(String),
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TokenKind::Let => "let",
            TokenKind::Fn => "fn",
            TokenKind::Return => "return",
            TokenKind::If => "if",
            TokenKind::Else => "else",
            TokenKind::While => "while",
            TokenKind::Schedule => "schedule",
            TokenKind::Call => "call",
            TokenKind::True => "true",
            TokenKind::False => "false",
            TokenKind::Null => "null",
            TokenKind::Plus => "+",
            TokenKind::Minus => "-",
            TokenKind::Star => "*",
            TokenKind::Slash => "/",
            TokenKind::Percent => "%",
            TokenKind::Bang => "!",
            TokenKind::Assign => "=",
            TokenKind::EqEq => "==",
            TokenKind::BangEq => "!=",
            TokenKind::Lt => "<",
            TokenKind::LtEq => "<=",
            TokenKind::Gt => ">",
            TokenKind::GtEq => ">=",
            TokenKind::AndAnd => "&&",
            TokenKind::OrOr => "||",
            TokenKind::LParen => "(",
            TokenKind::RParen => ")",
            TokenKind::LBrace => "{",
            TokenKind::RBrace => "}",
            TokenKind::Comma => ",",
            TokenKind::Semicolon => ";",
            TokenKind::Number(n) => return write!(f, "{}", n),
            TokenKind::Str(s) => return write!(f, "\"{}\"", s),
            TokenKind::UnterminatedStr => "unterminated string",
            TokenKind::Ident(id) => return write!(f, "{}", id),
        };
        write!(f, "{}", s)
    }
}

/// A token with its lexeme and exact source extent.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub span: Span,
}

/// Process escape sequences in a string literal body.
///
/// Supported escapes are `\n`, `\t`, `\"`, and `\\`. Any other escaped
/// character passes through with the backslash preserved.
fn unescape_string(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => result.push('\n'),
                Some('t') => result.push('\t'),
                Some('"') => result.push('"'),
                Some('\\') => result.push('\\'),
                Some(other) => {
                    result.push('\\');
                    result.push(other);
                }
                None => result.push('\\'),
            }
        } else {
            result.push(c);
        }
    }
    result
}

/// Tokenize a script.
///
/// Returns the ordered token sequence plus any lexical diagnostics. The
/// token list is complete even when diagnostics are present; callers decide
/// whether to continue to the parser (they must refuse to *execute* anything
/// compiled from a source with error diagnostics).
pub fn lex(source: &str) -> (Vec<Token>, Vec<Diagnostic>) {
    let index = LineIndex::new(source);
    let mut tokens = Vec::new();
    let mut diagnostics = Vec::new();

    let mut lexer = TokenKind::lexer(source);
    while let Some(result) = lexer.next() {
        let range = lexer.span();
        let span = index.span(range.start as u32, range.end as u32);
        match result {
            Ok(TokenKind::UnterminatedStr) => {
                diagnostics.push(Diagnostic::error("unterminated string literal", span));
            }
            Ok(kind) => tokens.push(Token {
                kind,
                lexeme: lexer.slice().to_string(),
                span,
            }),
            Err(()) => {
                diagnostics.push(Diagnostic::error(
                    format!("unexpected character '{}'", lexer.slice()),
                    span,
                ));
            }
        }
    }

    (tokens, diagnostics)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Test helper: lex source and panic on any diagnostic.
    fn lex_strict(source: &str) -> Vec<TokenKind> {
        let (tokens, diagnostics) = lex(source);
        assert!(diagnostics.is_empty(), "diagnostics: {:?}", diagnostics);
        tokens.into_iter().map(|t| t.kind).collect()
    }

    fn ident(s: &str) -> TokenKind {
        TokenKind::Ident(s.to_string())
    }

    #[test]
    fn test_keywords_and_identifiers() {
        let tokens = lex_strict("let fn letter while0 null");
        assert_eq!(
            tokens,
            vec![
                TokenKind::Let,
                TokenKind::Fn,
                ident("letter"),
                ident("while0"),
                TokenKind::Null,
            ]
        );
    }

    #[test]
    fn test_numbers() {
        let tokens = lex_strict("42 3.25 0.5");
        assert_eq!(
            tokens,
            vec![
                TokenKind::Number(42.0),
                TokenKind::Number(3.25),
                TokenKind::Number(0.5),
            ]
        );
    }

    #[test]
    fn test_number_has_no_exponent_form() {
        // `1e3` is a number followed by an identifier
        let tokens = lex_strict("1e3");
        assert_eq!(tokens, vec![TokenKind::Number(1.0), ident("e3")]);
    }

    #[test]
    fn test_two_char_operators() {
        let tokens = lex_strict("== != <= >= && || = < >");
        assert_eq!(
            tokens,
            vec![
                TokenKind::EqEq,
                TokenKind::BangEq,
                TokenKind::LtEq,
                TokenKind::GtEq,
                TokenKind::AndAnd,
                TokenKind::OrOr,
                TokenKind::Assign,
                TokenKind::Lt,
                TokenKind::Gt,
            ]
        );
    }

    #[test]
    fn test_string_escapes() {
        let tokens = lex_strict(r#""a\nb\t\"c\\" "#);
        assert_eq!(tokens, vec![TokenKind::Str("a\nb\t\"c\\".to_string())]);
    }

    #[test]
    fn test_unknown_escape_passes_through() {
        let tokens = lex_strict(r#""a\qb""#);
        assert_eq!(tokens, vec![TokenKind::Str("a\\qb".to_string())]);
    }

    #[test]
    fn test_unterminated_string_is_diagnostic_not_token() {
        let (tokens, diagnostics) = lex("let x = \"oops\nlet y = 1;");
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].message.contains("unterminated"));
        // Scanning continues on the next line
        assert!(tokens.iter().any(|t| t.kind == TokenKind::Ident("y".into())));
    }

    #[test]
    fn test_bad_character_continues() {
        let (tokens, diagnostics) = lex("let @ x");
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].message.contains("unexpected character"));
        assert_eq!(tokens.len(), 2);
    }

    #[test]
    fn test_comments_and_crlf_spans() {
        let (tokens, diagnostics) = lex("// header\r\nlet x");
        assert!(diagnostics.is_empty());
        assert_eq!(tokens[0].kind, TokenKind::Let);
        assert_eq!(tokens[0].span.start.line, 2);
        assert_eq!(tokens[0].span.start.column, 1);
        assert_eq!(tokens[1].span.start.column, 5);
    }

    #[test]
    fn test_token_spans_are_exact() {
        let (tokens, _) = lex("ab + cd");
        assert_eq!(tokens[0].span.start.index, 0);
        assert_eq!(tokens[0].span.end.index, 2);
        assert_eq!(tokens[1].span.start.index, 3);
        assert_eq!(tokens[2].span.start.index, 5);
        assert_eq!(tokens[2].span.end.index, 7);
    }
}
