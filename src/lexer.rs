//! Tokens of the ontology source language.
//!
//! Identifiers may be any Unicode letters. `#` and `//` both start a line
//! comment. Numbers only ever appear as cardinality bounds, so they are
//! unsigned.

use std::iter::Peekable;
use std::str::Chars;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Ident(String),
    Str(String),
    Num(u32),

    LBrace, // {
    RBrace, // }
    Comma,  // ,
    Colon,  // :
    Star,   // *
    Arrow,  // ->
    Dash,   // --
    DotDot, // ..

    Eof,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum LexError {
    #[error("Unexpected character {ch:?} at line {line}, column {column}")]
    UnexpectedChar { ch: char, line: usize, column: usize },
    #[error("Unterminated string starting at line {line}")]
    UnterminatedString { line: usize },
    #[error("Cardinality bound too large at line {line}: {digits}")]
    BoundTooLarge { digits: String, line: usize },
}

pub struct Lexer<'a> {
    chars: Peekable<Chars<'a>>,
    line: usize,
    column: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            chars: input.chars().peekable(),
            line: 1,
            column: 0,
        }
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
            self.column = 0;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.chars.peek() == Some(&expected) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn unexpected(&self, ch: char) -> LexError {
        LexError::UnexpectedChar {
            ch,
            line: self.line,
            column: self.column,
        }
    }

    fn skip_line(&mut self) {
        while let Some(c) = self.bump() {
            if c == '\n' {
                break;
            }
        }
    }

    fn skip_trivia(&mut self) -> Result<(), LexError> {
        loop {
            match self.chars.peek() {
                Some(c) if c.is_whitespace() => {
                    self.bump();
                }
                Some('#') => self.skip_line(),
                Some('/') => {
                    self.bump();
                    if !self.eat('/') {
                        return Err(self.unexpected('/'));
                    }
                    self.skip_line();
                }
                _ => return Ok(()),
            }
        }
    }

    fn read_while(&mut self, first: char, accept: impl Fn(char) -> bool) -> String {
        let mut s = String::from(first);
        while let Some(&c) = self.chars.peek() {
            if !accept(c) {
                break;
            }
            s.push(c);
            self.bump();
        }
        s
    }

    fn read_string(&mut self) -> Result<String, LexError> {
        let line = self.line;
        let mut s = String::new();
        loop {
            match self.bump() {
                Some('"') => return Ok(s),
                Some('\\') => match self.bump() {
                    Some('n') => s.push('\n'),
                    Some('t') => s.push('\t'),
                    Some(c) => s.push(c),
                    None => return Err(LexError::UnterminatedString { line }),
                },
                Some(c) => s.push(c),
                None => return Err(LexError::UnterminatedString { line }),
            }
        }
    }

    pub fn next_token(&mut self) -> Result<Token, LexError> {
        self.skip_trivia()?;

        let Some(c) = self.bump() else {
            return Ok(Token::Eof);
        };

        let tok = match c {
            '{' => Token::LBrace,
            '}' => Token::RBrace,
            ',' => Token::Comma,
            ':' => Token::Colon,
            '*' => Token::Star,
            '.' if self.eat('.') => Token::DotDot,
            '-' if self.eat('-') => Token::Dash,
            '-' if self.eat('>') => Token::Arrow,
            '"' => Token::Str(self.read_string()?),
            c if c.is_ascii_digit() => {
                let digits = self.read_while(c, |c| c.is_ascii_digit());
                let line = self.line;
                Token::Num(
                    digits
                        .parse()
                        .map_err(|_| LexError::BoundTooLarge { digits, line })?,
                )
            }
            c if c.is_alphabetic() || c == '_' => {
                Token::Ident(self.read_while(c, |c| c.is_alphanumeric() || c == '_'))
            }
            _ => return Err(self.unexpected(c)),
        };

        Ok(tok)
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::new();
        loop {
            let tok = self.next_token()?;
            let done = tok == Token::Eof;
            tokens.push(tok);
            if done {
                return Ok(tokens);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(input: &str) -> Vec<Token> {
        Lexer::new(input).tokenize().unwrap()
    }

    #[test]
    fn test_basic_tokens() {
        assert_eq!(
            lex("kind Person { }"),
            vec![
                Token::Ident("kind".into()),
                Token::Ident("Person".into()),
                Token::LBrace,
                Token::RBrace,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_unicode_ident() {
        let tokens = lex("kind 人 { 名前 string }");
        assert_eq!(tokens[1], Token::Ident("人".into()));
        assert_eq!(tokens[3], Token::Ident("名前".into()));
    }

    #[test]
    fn test_both_comment_styles() {
        let tokens = lex("# comment\nkind Person { // inline\n}");
        assert_eq!(tokens.len(), 5);
        assert_eq!(tokens[3], Token::RBrace);
    }

    #[test]
    fn test_cardinality_tokens() {
        assert_eq!(
            lex("1 0..1 * 1..*"),
            vec![
                Token::Num(1),
                Token::Num(0),
                Token::DotDot,
                Token::Num(1),
                Token::Star,
                Token::Num(1),
                Token::DotDot,
                Token::Star,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_symbols() {
        assert_eq!(
            lex("-- -> : ,"),
            vec![Token::Dash, Token::Arrow, Token::Colon, Token::Comma, Token::Eof]
        );
    }

    #[test]
    fn test_errors_carry_position() {
        let err = Lexer::new("kind A\n  0.1").tokenize().unwrap_err();
        assert_eq!(err, LexError::UnexpectedChar { ch: '.', line: 2, column: 4 });

        let err = Lexer::new("rel {\n\"holds").tokenize().unwrap_err();
        assert_eq!(err, LexError::UnterminatedString { line: 2 });

        let err = Lexer::new("kind A / B").tokenize().unwrap_err();
        assert!(matches!(err, LexError::UnexpectedChar { ch: '/', .. }));
    }

    #[test]
    fn test_bound_overflow() {
        let err = Lexer::new("99999999999").tokenize().unwrap_err();
        assert!(matches!(err, LexError::BoundTooLarge { .. }));
    }
}
