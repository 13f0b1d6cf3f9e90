// Copyright 2024 OctoFHIR Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Tokenizer for jq filters
//!
//! Token names used in error messages follow jq's grammar so that syntax
//! errors read the same as the reference implementation.

use super::SyntaxError;
use std::fmt;

/// Piece of a string literal
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum StrPart {
    /// Literal text with escapes resolved
    Text(String),
    /// `\(...)` interpolation, as a byte range of the whole source
    Interp { start: usize, end: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    // Paths
    Dot,
    DotDot,
    Field(String),

    // Atoms
    Ident(String),
    Variable(String),
    Number(f64),
    Str(Vec<StrPart>),

    // Operators
    Pipe,
    Comma,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Alternative,
    Assign,
    /// Update-assignment operators (`|=`, `+=`, ...), recognized but unsupported
    Update(&'static str),

    // Punctuation
    LeftParen,
    RightParen,
    LeftBracket,
    RightBracket,
    LeftBrace,
    RightBrace,
    Colon,
    Semicolon,
    Question,

    // Keywords
    And,
    Or,
    If,
    Then,
    Elif,
    Else,
    End,
    As,
    Try,
    Catch,
    Reduce,
    /// Reserved words of the full language that this engine does not support
    Reserved(&'static str),

    Invalid(char),
    Eof,
}

impl Token {
    /// Whether a term can begin with this token
    pub(crate) fn starts_term(&self) -> bool {
        matches!(
            self,
            Token::Dot
                | Token::DotDot
                | Token::Field(_)
                | Token::Ident(_)
                | Token::Variable(_)
                | Token::Number(_)
                | Token::Str(_)
                | Token::LeftParen
                | Token::LeftBracket
                | Token::LeftBrace
                | Token::Minus
                | Token::If
                | Token::Try
                | Token::Reduce
        )
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Token::Dot => "'.'",
            Token::DotDot => "REC",
            Token::Field(_) => "FIELD",
            Token::Ident(_) => "IDENT",
            Token::Variable(_) => "'$'",
            Token::Number(_) => "LITERAL",
            Token::Str(_) => "QQSTRING_START",
            Token::Pipe => "'|'",
            Token::Comma => "','",
            Token::Plus => "'+'",
            Token::Minus => "'-'",
            Token::Star => "'*'",
            Token::Slash => "'/'",
            Token::Percent => "'%'",
            Token::Equal => "EQ",
            Token::NotEqual => "NEQ",
            Token::Less => "'<'",
            Token::LessEqual => "LESSEQ",
            Token::Greater => "'>'",
            Token::GreaterEqual => "GREATEREQ",
            Token::Alternative => "DEFINEDOR",
            Token::Assign => "'='",
            Token::Update(name) => *name,
            Token::LeftParen => "'('",
            Token::RightParen => "')'",
            Token::LeftBracket => "'['",
            Token::RightBracket => "']'",
            Token::LeftBrace => "'{'",
            Token::RightBrace => "'}'",
            Token::Colon => "':'",
            Token::Semicolon => "';'",
            Token::Question => "'?'",
            Token::And => "and",
            Token::Or => "or",
            Token::If => "if",
            Token::Then => "then",
            Token::Elif => "elif",
            Token::Else => "else",
            Token::End => "end",
            Token::As => "as",
            Token::Try => "try",
            Token::Catch => "catch",
            Token::Reduce => "reduce",
            Token::Reserved(word) => *word,
            Token::Invalid(_) => "INVALID_CHARACTER",
            Token::Eof => "$end",
        };
        f.write_str(name)
    }
}

/// Token with its byte offset in the source
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Spanned {
    pub token: Token,
    pub offset: usize,
}

fn keyword(word: &str) -> Option<Token> {
    Some(match word {
        "and" => Token::And,
        "or" => Token::Or,
        "if" => Token::If,
        "then" => Token::Then,
        "elif" => Token::Elif,
        "else" => Token::Else,
        "end" => Token::End,
        "as" => Token::As,
        "try" => Token::Try,
        "catch" => Token::Catch,
        "reduce" => Token::Reduce,
        "def" => Token::Reserved("def"),
        "foreach" => Token::Reserved("foreach"),
        "label" => Token::Reserved("label"),
        "import" => Token::Reserved("import"),
        "include" => Token::Reserved("include"),
        "__loc__" => Token::Reserved("__loc__"),
        _ => return None,
    })
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

pub(crate) struct Lexer<'s> {
    source: &'s str,
    pos: usize,
    end: usize,
}

impl<'s> Lexer<'s> {
    /// Tokenize `source[start..end]`, reporting offsets into the whole source
    pub(crate) fn new(source: &'s str, start: usize, end: usize) -> Self {
        Self {
            source,
            pos: start,
            end,
        }
    }

    pub(crate) fn tokenize(mut self) -> Result<Vec<Spanned>, SyntaxError> {
        let mut tokens = Vec::new();
        loop {
            let spanned = self.next_token()?;
            let done = spanned.token == Token::Eof;
            tokens.push(spanned);
            if done {
                return Ok(tokens);
            }
        }
    }

    fn peek(&self) -> Option<char> {
        self.source[self.pos..self.end].chars().next()
    }

    fn peek_second(&self) -> Option<char> {
        let mut chars = self.source[self.pos..self.end].chars();
        chars.next();
        chars.next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += expected.len_utf8();
            true
        } else {
            false
        }
    }

    fn skip_trivia(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.bump();
            } else if c == '#' {
                while let Some(c) = self.bump() {
                    if c == '\n' {
                        break;
                    }
                }
            } else {
                break;
            }
        }
    }

    fn ident(&mut self) -> String {
        let start = self.pos;
        while self.peek().is_some_and(is_ident_continue) {
            self.bump();
        }
        self.source[start..self.pos].to_string()
    }

    fn next_token(&mut self) -> Result<Spanned, SyntaxError> {
        self.skip_trivia();
        let offset = self.pos;
        let Some(c) = self.bump() else {
            return Ok(Spanned {
                token: Token::Eof,
                offset,
            });
        };

        let token = match c {
            '.' => match self.peek() {
                Some('.') => {
                    self.bump();
                    Token::DotDot
                }
                Some(next) if is_ident_start(next) => Token::Field(self.ident()),
                Some(next) if next.is_ascii_digit() => {
                    self.pos = offset;
                    self.number()?
                }
                _ => Token::Dot,
            },
            '0'..='9' => {
                self.pos = offset;
                self.number()?
            }
            '"' => self.string(offset)?,
            '$' => {
                if self.peek().is_some_and(is_ident_start) {
                    let name = self.ident();
                    match name.as_str() {
                        "__loc__" => Token::Reserved("$__loc__"),
                        _ => Token::Variable(name),
                    }
                } else {
                    Token::Invalid('$')
                }
            }
            c if is_ident_start(c) => {
                self.pos = offset;
                let word = self.ident();
                keyword(&word).unwrap_or(Token::Ident(word))
            }
            '|' => {
                if self.eat('=') {
                    Token::Update("SETPIPE")
                } else {
                    Token::Pipe
                }
            }
            ',' => Token::Comma,
            '+' => self.maybe_update(Token::Plus, "SETPLUS"),
            '-' => self.maybe_update(Token::Minus, "SETMINUS"),
            '*' => self.maybe_update(Token::Star, "SETMULT"),
            '%' => self.maybe_update(Token::Percent, "SETMOD"),
            '/' => {
                if self.eat('/') {
                    self.maybe_update(Token::Alternative, "SETDEFINEDOR")
                } else {
                    self.maybe_update(Token::Slash, "SETDIV")
                }
            }
            '=' => {
                if self.eat('=') {
                    Token::Equal
                } else {
                    Token::Assign
                }
            }
            '!' => {
                if self.eat('=') {
                    Token::NotEqual
                } else {
                    Token::Invalid('!')
                }
            }
            '<' => {
                if self.eat('=') {
                    Token::LessEqual
                } else {
                    Token::Less
                }
            }
            '>' => {
                if self.eat('=') {
                    Token::GreaterEqual
                } else {
                    Token::Greater
                }
            }
            '(' => Token::LeftParen,
            ')' => Token::RightParen,
            '[' => Token::LeftBracket,
            ']' => Token::RightBracket,
            '{' => Token::LeftBrace,
            '}' => Token::RightBrace,
            ':' => Token::Colon,
            ';' => Token::Semicolon,
            '?' => Token::Question,
            other => Token::Invalid(other),
        };

        Ok(Spanned { token, offset })
    }

    fn maybe_update(&mut self, plain: Token, update: &'static str) -> Token {
        if self.eat('=') {
            Token::Update(update)
        } else {
            plain
        }
    }

    fn number(&mut self) -> Result<Token, SyntaxError> {
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
        }
        if self.peek() == Some('.') && self.peek_second() != Some('.') {
            self.bump();
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.bump();
            }
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            let mark = self.pos;
            self.bump();
            if matches!(self.peek(), Some('+' | '-')) {
                self.bump();
            }
            if self.peek().is_some_and(|c| c.is_ascii_digit()) {
                while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                    self.bump();
                }
            } else {
                self.pos = mark;
            }
        }
        let text = &self.source[start..self.pos];
        text.parse::<f64>()
            .map(Token::Number)
            .map_err(|_| SyntaxError::new(format!("invalid numeric literal {text}"), start))
    }

    fn string(&mut self, open: usize) -> Result<Token, SyntaxError> {
        let mut parts = Vec::new();
        let mut text = String::new();
        loop {
            let Some(c) = self.bump() else {
                return Err(SyntaxError::new(
                    "syntax error, unexpected $end, expecting QQSTRING_TEXT or QQSTRING_INTERP_START or QQSTRING_END",
                    open,
                ));
            };
            match c {
                '"' => break,
                '\\' => {
                    let escape_at = self.pos - 1;
                    match self.bump() {
                        Some('"') => text.push('"'),
                        Some('\\') => text.push('\\'),
                        Some('/') => text.push('/'),
                        Some('b') => text.push('\u{8}'),
                        Some('f') => text.push('\u{c}'),
                        Some('n') => text.push('\n'),
                        Some('r') => text.push('\r'),
                        Some('t') => text.push('\t'),
                        Some('u') => text.push(self.unicode_escape(escape_at)?),
                        Some('(') => {
                            if !text.is_empty() {
                                parts.push(StrPart::Text(std::mem::take(&mut text)));
                            }
                            let start = self.pos;
                            let end = self.interpolation_end(open)?;
                            parts.push(StrPart::Interp { start, end });
                        }
                        _ => {
                            return Err(SyntaxError::new("invalid escape", escape_at));
                        }
                    }
                }
                other => text.push(other),
            }
        }
        if !text.is_empty() || parts.is_empty() {
            parts.push(StrPart::Text(text));
        }
        Ok(Token::Str(parts))
    }

    fn hex4(&mut self, escape_at: usize) -> Result<u32, SyntaxError> {
        let start = self.pos;
        for _ in 0..4 {
            if !self.peek().is_some_and(|c| c.is_ascii_hexdigit()) {
                return Err(SyntaxError::new("invalid \\u escape", escape_at));
            }
            self.bump();
        }
        u32::from_str_radix(&self.source[start..self.pos], 16)
            .map_err(|_| SyntaxError::new("invalid \\u escape", escape_at))
    }

    fn unicode_escape(&mut self, escape_at: usize) -> Result<char, SyntaxError> {
        let high = self.hex4(escape_at)?;
        let code = if (0xD800..0xDC00).contains(&high)
            && self.source[self.pos..self.end].starts_with("\\u")
        {
            let mark = self.pos;
            self.pos += 2;
            let low = self.hex4(escape_at)?;
            if (0xDC00..0xE000).contains(&low) {
                0x10000 + ((high - 0xD800) << 10) + (low - 0xDC00)
            } else {
                self.pos = mark;
                high
            }
        } else {
            high
        };
        Ok(char::from_u32(code).unwrap_or('\u{FFFD}'))
    }

    /// Find the `)` closing an interpolation, skipping nested parentheses and strings
    fn interpolation_end(&mut self, open: usize) -> Result<usize, SyntaxError> {
        let mut depth = 1usize;
        while let Some(c) = self.bump() {
            match c {
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(self.pos - 1);
                    }
                }
                '"' => {
                    while let Some(inner) = self.bump() {
                        match inner {
                            '\\' => {
                                self.bump();
                            }
                            '"' => break,
                            _ => {}
                        }
                    }
                }
                _ => {}
            }
        }
        Err(SyntaxError::new(
            "syntax error, unexpected $end, expecting QQSTRING_INTERP_END",
            open,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(source: &str) -> Vec<Token> {
        Lexer::new(source, 0, source.len())
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|s| s.token)
            .collect()
    }

    #[test]
    fn test_paths_and_operators() {
        assert_eq!(
            tokens(".foo | .[] // ..")
                .into_iter()
                .map(|t| t.to_string())
                .collect::<Vec<_>>(),
            vec!["FIELD", "'|'", "'.'", "'['", "']'", "DEFINEDOR", "REC", "$end"]
        );
    }

    #[test]
    fn test_numbers() {
        assert_eq!(
            tokens("1 2.5 .5 1e3"),
            vec![
                Token::Number(1.0),
                Token::Number(2.5),
                Token::Number(0.5),
                Token::Number(1000.0),
                Token::Eof
            ]
        );
    }

    #[test]
    fn test_string_escapes_and_interpolation() {
        let source = r#""a\né\(1 + (2))!""#;
        let toks = tokens(source);
        let Token::Str(parts) = &toks[0] else {
            panic!("expected string token");
        };
        assert_eq!(parts[0], StrPart::Text("a\né".to_string()));
        let StrPart::Interp { start, end } = parts[1] else {
            panic!("expected interpolation");
        };
        assert_eq!(&source[start..end], "1 + (2)");
        assert_eq!(parts[2], StrPart::Text("!".to_string()));
    }

    #[test]
    fn test_variables_keywords_and_invalid() {
        assert_eq!(
            tokens("$foo as if ! ="),
            vec![
                Token::Variable("foo".to_string()),
                Token::As,
                Token::If,
                Token::Invalid('!'),
                Token::Assign,
                Token::Eof
            ]
        );
    }

    #[test]
    fn test_comments_are_skipped() {
        assert_eq!(tokens(". # identity\n"), vec![Token::Dot, Token::Eof]);
    }
}
