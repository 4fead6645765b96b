use std::{collections::BTreeMap, iter::Peekable, str::Chars};

use once_cell::sync::Lazy;
use strum::EnumString;

use super::SourceFile;
use crate::diagnostics::LexicalError;

#[derive(Debug)]
pub struct Lexer<'source> {
    source: &'source SourceFile,
    chars: Peekable<Chars<'source>>,
    position: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /* Words */
    Keyword(Keyword), // while
    Identifier,       // row

    /* Literals */
    IntegerLiteral, // 42
    StringLiteral,  // "hello, world"

    /* Delimiters */
    OpenParen,    // (
    CloseParen,   // )
    OpenBracket,  // [
    CloseBracket, // ]
    OpenBrace,    // {
    CloseBrace,   // }
    Semicolon,    // ;
    Comma,        // ,
    Colon,        // :
    Dot,          // .

    /* Operators */
    Plus,                 // +
    Minus,                // -
    Asterisk,             // *
    Divide,               // /
    Equals,               // =
    NotEquals,            // <>
    LessThan,             // <
    LessThanOrEqualTo,    // <=
    GreaterThan,          // >
    GreaterThanOrEqualTo, // >=
    Ampersand,            // &
    Pipe,                 // |

    /* Assignment */
    Assign, // :=
}

impl TokenKind {
    pub fn is_comparison_operator(&self) -> bool {
        matches!(
            self,
            Self::Equals
                | Self::NotEquals
                | Self::LessThan
                | Self::LessThanOrEqualTo
                | Self::GreaterThan
                | Self::GreaterThanOrEqualTo
        )
    }

    pub fn is_term_operator(&self) -> bool {
        matches!(self, Self::Plus | Self::Minus)
    }

    pub fn is_factor_operator(&self) -> bool {
        matches!(self, Self::Asterisk | Self::Divide)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum Keyword {
    Array,
    Break,
    Do,
    Else,
    End,
    For,
    Function,
    If,
    In,
    Let,
    Nil,
    Of,
    Then,
    To,
    Type,
    Var,
    While,
}

/// Table of single char tokens (matched after longer sequences are checked
/// for)
static SINGLE_TOKENS: Lazy<BTreeMap<char, TokenKind>> = Lazy::new(|| {
    BTreeMap::from([
        ('(', TokenKind::OpenParen),
        (')', TokenKind::CloseParen),
        ('[', TokenKind::OpenBracket),
        (']', TokenKind::CloseBracket),
        ('{', TokenKind::OpenBrace),
        ('}', TokenKind::CloseBrace),
        (';', TokenKind::Semicolon),
        (',', TokenKind::Comma),
        ('.', TokenKind::Dot),
        ('+', TokenKind::Plus),
        ('-', TokenKind::Minus),
        ('*', TokenKind::Asterisk),
        ('=', TokenKind::Equals),
        ('&', TokenKind::Ampersand),
        ('|', TokenKind::Pipe),
    ])
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn to(self, other: Span) -> Span {
        Span::new(self.start, other.end)
    }
}

impl<'source> Lexer<'source> {
    pub fn new(source: &'source SourceFile) -> Self {
        Self {
            source,
            chars: source.contents.chars().peekable(),
            position: 0,
        }
    }

    /// Tokenizes the whole source file. The parser indexes into the returned
    /// buffer directly (the array-constructor grammar needs bounded
    /// backtracking).
    pub fn tokenize(source: &'source SourceFile) -> Result<Vec<Token>, LexicalError> {
        let mut lexer = Self::new(source);
        let mut tokens = Vec::new();

        while let Some(token) = lexer.next_token()? {
            tokens.push(token);
        }

        Ok(tokens)
    }

    fn error_at(&self, position: usize, message: impl Into<String>) -> LexicalError {
        LexicalError {
            line: self.source.line_number_for_position(position),
            column: self.source.column_for_position(position),
            message: message.into(),
        }
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        self.position += c.len_utf8();
        Some(c)
    }

    fn new_span(&self, start: usize) -> Span {
        Span::new(start, self.position)
    }

    fn ignore_whitespace(&mut self) {
        while let Some(c) = self.chars.peek().copied() {
            if !c.is_ascii_whitespace() {
                break;
            }

            self.bump();
        }
    }

    /// Skips a `/* ... */` comment, honoring nesting.
    fn ignore_comment(&mut self) -> Result<(), LexicalError> {
        let start_position = self.position;

        // Consume the opening "/*"
        self.bump();
        self.bump();

        let mut depth = 1usize;

        while depth > 0 {
            match self.bump() {
                Some('/') if self.chars.peek() == Some(&'*') => {
                    self.bump();
                    depth += 1;
                }
                Some('*') if self.chars.peek() == Some(&'/') => {
                    self.bump();
                    depth -= 1;
                }
                Some(_) => {}
                None => {
                    return Err(
                        self.error_at(start_position, "reached end of file inside a comment")
                    );
                }
            }
        }

        Ok(())
    }

    fn next_token(&mut self) -> Result<Option<Token>, LexicalError> {
        loop {
            self.ignore_whitespace();

            let Some(c) = self.chars.peek().copied() else {
                return Ok(None);
            };

            if c == '/' {
                let mut lookahead = self.chars.clone();
                lookahead.next();

                if lookahead.peek() == Some(&'*') {
                    self.ignore_comment()?;
                    continue;
                }
            }

            return self.read_token(c).map(Some);
        }
    }

    fn read_token(&mut self, c: char) -> Result<Token, LexicalError> {
        if c.is_ascii_alphabetic() || c == '_' {
            return Ok(self.read_word());
        }

        if c.is_ascii_digit() {
            return Ok(self.read_number());
        }

        if c == '"' {
            return self.read_string();
        }

        let start_position = self.position;

        match c {
            ':' => {
                self.bump();
                if self.chars.peek() == Some(&'=') {
                    self.bump();
                    Ok(self.token_at(start_position, TokenKind::Assign))
                } else {
                    Ok(self.token_at(start_position, TokenKind::Colon))
                }
            }
            '<' => {
                self.bump();
                match self.chars.peek() {
                    Some('=') => {
                        self.bump();
                        Ok(self.token_at(start_position, TokenKind::LessThanOrEqualTo))
                    }
                    Some('>') => {
                        self.bump();
                        Ok(self.token_at(start_position, TokenKind::NotEquals))
                    }
                    _ => Ok(self.token_at(start_position, TokenKind::LessThan)),
                }
            }
            '>' => {
                self.bump();
                if self.chars.peek() == Some(&'=') {
                    self.bump();
                    Ok(self.token_at(start_position, TokenKind::GreaterThanOrEqualTo))
                } else {
                    Ok(self.token_at(start_position, TokenKind::GreaterThan))
                }
            }
            '/' => {
                self.bump();
                Ok(self.token_at(start_position, TokenKind::Divide))
            }
            _ => {
                if let Some(kind) = SINGLE_TOKENS.get(&c).copied() {
                    self.bump();
                    Ok(self.token_at(start_position, kind))
                } else {
                    Err(self.error_at(start_position, format!("unexpected character: {c:?}")))
                }
            }
        }
    }

    fn token_at(&self, start_position: usize, kind: TokenKind) -> Token {
        Token {
            kind,
            span: self.new_span(start_position),
        }
    }

    // Keyword or identifier
    fn read_word(&mut self) -> Token {
        let start_position = self.position;

        while let Some(c) = self.chars.peek().copied() {
            if !(c.is_ascii_alphanumeric() || c == '_') {
                break;
            }

            self.bump();
        }

        let span = self.new_span(start_position);
        let value = self.source.value_of_span(span);

        let kind = match value.parse() {
            Ok(keyword) => TokenKind::Keyword(keyword),
            Err(_) => TokenKind::Identifier,
        };

        Token { kind, span }
    }

    fn read_number(&mut self) -> Token {
        let start_position = self.position;

        while let Some(c) = self.chars.peek().copied() {
            if !c.is_ascii_digit() {
                break;
            }

            self.bump();
        }

        self.token_at(start_position, TokenKind::IntegerLiteral)
    }

    fn read_string(&mut self) -> Result<Token, LexicalError> {
        let start_position = self.position;

        // Consume the opening quote
        self.bump();

        loop {
            match self.bump() {
                Some('"') => {
                    return Ok(self.token_at(start_position, TokenKind::StringLiteral));
                }
                Some('\\') => {
                    // The escaped character is validated when the parser
                    // decodes the literal; here it only must not terminate
                    // the scan
                    if self.bump().is_none() {
                        return Err(
                            self.error_at(start_position, "unterminated string literal")
                        );
                    }
                }
                Some(_) => {}
                None => {
                    return Err(self.error_at(start_position, "unterminated string literal"));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        let source = SourceFile::from_string(source);
        Lexer::tokenize(&source)
            .expect("tokenize")
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn keywords_and_identifiers() {
        assert_eq!(
            kinds("let var x while whilst"),
            vec![
                TokenKind::Keyword(Keyword::Let),
                TokenKind::Keyword(Keyword::Var),
                TokenKind::Identifier,
                TokenKind::Keyword(Keyword::While),
                TokenKind::Identifier,
            ]
        );
    }

    #[test]
    fn digraph_operators() {
        assert_eq!(
            kinds(":= <> <= >= < >"),
            vec![
                TokenKind::Assign,
                TokenKind::NotEquals,
                TokenKind::LessThanOrEqualTo,
                TokenKind::GreaterThanOrEqualTo,
                TokenKind::LessThan,
                TokenKind::GreaterThan,
            ]
        );
    }

    #[test]
    fn nested_comments_are_skipped() {
        assert_eq!(
            kinds("1 /* outer /* inner */ still outer */ 2"),
            vec![TokenKind::IntegerLiteral, TokenKind::IntegerLiteral]
        );
    }

    #[test]
    fn unterminated_comment_is_an_error() {
        let source = SourceFile::from_string("1 /* no end");
        assert!(Lexer::tokenize(&source).is_err());
    }

    #[test]
    fn unterminated_string_is_an_error() {
        let source = SourceFile::from_string("\"no end");
        assert!(Lexer::tokenize(&source).is_err());
    }

    #[test]
    fn string_spans_include_quotes() {
        let source = SourceFile::from_string(r#" "a\"b" "#);
        let tokens = Lexer::tokenize(&source).expect("tokenize");

        assert_eq!(tokens.len(), 1);
        assert_eq!(source.value_of_span(tokens[0].span), r#""a\"b""#);
    }
}
