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

//! Precedence-climbing parser for jq filters
//!
//! ### Precedence levels (lowest to highest):
//! - `|` (right associative), with `Term as $x | body` binding the rest of the pipe
//! - `,`
//! - `//` (right associative)
//! - `or`
//! - `and`
//! - `==`, `!=`, `<`, `<=`, `>`, `>=` (non associative)
//! - `+`, `-`
//! - `*`, `/`, `%`
//! - unary `-`
//! - postfix: `.foo`, `[...]`, `?`

use super::SyntaxError;
use super::ast::{BinaryOp, Filter, FilterRef, InterpPart};
use super::functions;
use super::lexer::{Lexer, Spanned, StrPart, Token};
use crate::engine::EngineValue;
use std::rc::Rc;

/// Parse a whole program
///
/// An empty program is the identity filter.
pub(crate) fn parse_program(source: &str) -> Result<FilterRef, SyntaxError> {
    let mut parser = Parser::new(source, 0, source.len())?;
    if parser.current() == &Token::Eof {
        return Ok(Filter::identity());
    }
    if !parser.current().starts_term() {
        return Err(parser.unexpected_expecting("$end"));
    }
    let filter = parser.parse_pipe()?;
    parser.finish()?;
    Ok(filter)
}

struct Parser<'s> {
    source: &'s str,
    tokens: Vec<Spanned>,
    pos: usize,
}

impl<'s> Parser<'s> {
    fn new(source: &'s str, start: usize, end: usize) -> Result<Self, SyntaxError> {
        Ok(Self {
            source,
            tokens: Lexer::new(source, start, end).tokenize()?,
            pos: 0,
        })
    }

    fn current(&self) -> &Token {
        &self.tokens[self.pos].token
    }

    fn offset(&self) -> usize {
        self.tokens[self.pos].offset
    }

    fn peek_next(&self) -> &Token {
        let next = (self.pos + 1).min(self.tokens.len() - 1);
        &self.tokens[next].token
    }

    fn advance(&mut self) -> Token {
        let token = self.tokens[self.pos].token.clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn check(&self, expected: &Token) -> bool {
        self.current() == expected
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.check(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: Token) -> Result<(), SyntaxError> {
        if self.eat(&expected) {
            Ok(())
        } else {
            Err(self.unexpected_expecting(&expected.to_string()))
        }
    }

    fn finish(&mut self) -> Result<(), SyntaxError> {
        if self.check(&Token::Eof) {
            Ok(())
        } else {
            Err(self.unexpected_expecting("$end"))
        }
    }

    fn unexpected(&self) -> SyntaxError {
        SyntaxError::new(
            format!("syntax error, unexpected {}", self.current()),
            self.offset(),
        )
    }

    fn unexpected_expecting(&self, expected: &str) -> SyntaxError {
        SyntaxError::new(
            format!(
                "syntax error, unexpected {}, expecting {expected}",
                self.current()
            ),
            self.offset(),
        )
    }

    fn parse_pipe(&mut self) -> Result<FilterRef, SyntaxError> {
        let lhs = self.parse_comma()?;
        if self.eat(&Token::Pipe) {
            let rhs = self.parse_pipe()?;
            return Ok(Rc::new(Filter::Pipe(lhs, rhs)));
        }
        Ok(lhs)
    }

    fn parse_comma(&mut self) -> Result<FilterRef, SyntaxError> {
        let mut lhs = self.parse_alternative()?;
        while self.eat(&Token::Comma) {
            let rhs = self.parse_alternative()?;
            lhs = Rc::new(Filter::Comma(lhs, rhs));
        }
        Ok(lhs)
    }

    fn parse_alternative(&mut self) -> Result<FilterRef, SyntaxError> {
        let lhs = self.parse_or()?;
        if self.eat(&Token::Alternative) {
            let rhs = self.parse_alternative()?;
            return Ok(Rc::new(Filter::Alternative(lhs, rhs)));
        }
        Ok(lhs)
    }

    fn parse_or(&mut self) -> Result<FilterRef, SyntaxError> {
        let mut lhs = self.parse_and()?;
        while self.eat(&Token::Or) {
            let rhs = self.parse_and()?;
            lhs = Rc::new(Filter::Or(lhs, rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<FilterRef, SyntaxError> {
        let mut lhs = self.parse_comparison()?;
        while self.eat(&Token::And) {
            let rhs = self.parse_comparison()?;
            lhs = Rc::new(Filter::And(lhs, rhs));
        }
        Ok(lhs)
    }

    fn comparison_op(token: &Token) -> Option<BinaryOp> {
        Some(match token {
            Token::Equal => BinaryOp::Equal,
            Token::NotEqual => BinaryOp::NotEqual,
            Token::Less => BinaryOp::Less,
            Token::LessEqual => BinaryOp::LessEqual,
            Token::Greater => BinaryOp::Greater,
            Token::GreaterEqual => BinaryOp::GreaterEqual,
            _ => return None,
        })
    }

    fn parse_comparison(&mut self) -> Result<FilterRef, SyntaxError> {
        let lhs = self.parse_additive()?;
        let Some(op) = Self::comparison_op(self.current()) else {
            return Ok(lhs);
        };
        self.advance();
        let rhs = self.parse_additive()?;
        if Self::comparison_op(self.current()).is_some() {
            return Err(self.unexpected());
        }
        Ok(Rc::new(Filter::Binary { op, lhs, rhs }))
    }

    fn parse_additive(&mut self) -> Result<FilterRef, SyntaxError> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.current() {
                Token::Plus => BinaryOp::Add,
                Token::Minus => BinaryOp::Subtract,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.parse_multiplicative()?;
            lhs = Rc::new(Filter::Binary { op, lhs, rhs });
        }
    }

    fn parse_multiplicative(&mut self) -> Result<FilterRef, SyntaxError> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.current() {
                Token::Star => BinaryOp::Multiply,
                Token::Slash => BinaryOp::Divide,
                Token::Percent => BinaryOp::Modulo,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.parse_unary()?;
            lhs = Rc::new(Filter::Binary { op, lhs, rhs });
        }
    }

    fn parse_unary(&mut self) -> Result<FilterRef, SyntaxError> {
        if self.eat(&Token::Minus) {
            let operand = self.parse_unary()?;
            return Ok(Rc::new(Filter::Negate(operand)));
        }
        self.parse_postfix(true)
    }

    /// Parse a term with its suffixes; `allow_bind` enables `Term as $x | body`
    fn parse_postfix(&mut self, allow_bind: bool) -> Result<FilterRef, SyntaxError> {
        let mut term = self.parse_primary()?;
        loop {
            match self.current().clone() {
                Token::Field(name) => {
                    self.advance();
                    term = Filter::field(term, &name);
                }
                Token::Dot if matches!(self.peek_next(), Token::Str(_)) => {
                    self.advance();
                    let key = self.parse_string()?;
                    term = Rc::new(Filter::Index { target: term, key });
                }
                Token::Dot if matches!(self.peek_next(), Token::LeftBracket) => {
                    self.advance();
                    self.advance();
                    term = self.parse_bracket_suffix(term)?;
                }
                Token::LeftBracket => {
                    self.advance();
                    term = self.parse_bracket_suffix(term)?;
                }
                Token::Question => {
                    self.advance();
                    term = Rc::new(Filter::Try {
                        body: term,
                        handler: None,
                    });
                }
                Token::As if allow_bind => {
                    self.advance();
                    let name = self.parse_variable_name()?;
                    self.expect(Token::Pipe)?;
                    let body = self.parse_pipe()?;
                    return Ok(Rc::new(Filter::Bind {
                        source: term,
                        name,
                        body,
                    }));
                }
                _ => return Ok(term),
            }
        }
    }

    fn parse_variable_name(&mut self) -> Result<String, SyntaxError> {
        match self.current().clone() {
            Token::Variable(name) => {
                self.advance();
                Ok(name)
            }
            _ => Err(self.unexpected_expecting("'$'")),
        }
    }

    /// Parse what follows `[` after a term: `]`, `e]`, `e:e]`, `:e]`, `e:]`
    fn parse_bracket_suffix(&mut self, target: FilterRef) -> Result<FilterRef, SyntaxError> {
        if self.eat(&Token::RightBracket) {
            return Ok(Rc::new(Filter::Iterate(target)));
        }
        if self.eat(&Token::Colon) {
            let to = self.parse_pipe()?;
            self.expect(Token::RightBracket)?;
            return Ok(Rc::new(Filter::Slice {
                target,
                from: None,
                to: Some(to),
            }));
        }
        let key = self.parse_pipe()?;
        if self.eat(&Token::Colon) {
            let to = if self.check(&Token::RightBracket) {
                None
            } else {
                Some(self.parse_pipe()?)
            };
            self.expect(Token::RightBracket)?;
            return Ok(Rc::new(Filter::Slice {
                target,
                from: Some(key),
                to,
            }));
        }
        self.expect(Token::RightBracket)?;
        Ok(Rc::new(Filter::Index { target, key }))
    }

    fn parse_primary(&mut self) -> Result<FilterRef, SyntaxError> {
        let offset = self.offset();
        match self.current().clone() {
            Token::Dot => {
                self.advance();
                match self.current() {
                    Token::Str(_) => {
                        let key = self.parse_string()?;
                        Ok(Rc::new(Filter::Index {
                            target: Filter::identity(),
                            key,
                        }))
                    }
                    Token::LeftBracket => {
                        self.advance();
                        self.parse_bracket_suffix(Filter::identity())
                    }
                    _ => Ok(Filter::identity()),
                }
            }
            Token::DotDot => {
                self.advance();
                Ok(Rc::new(Filter::Recurse))
            }
            Token::Field(name) => {
                self.advance();
                Ok(Filter::field(Filter::identity(), &name))
            }
            Token::Number(n) => {
                self.advance();
                Ok(Filter::literal(n))
            }
            Token::Str(_) => self.parse_string(),
            Token::Variable(name) => {
                self.advance();
                Ok(Rc::new(Filter::Variable { name, offset }))
            }
            Token::Ident(name) => {
                self.advance();
                self.parse_ident(name, offset)
            }
            Token::LeftParen => {
                self.advance();
                let inner = self.parse_pipe()?;
                self.expect(Token::RightParen)?;
                Ok(inner)
            }
            Token::LeftBracket => {
                self.advance();
                if self.eat(&Token::RightBracket) {
                    return Ok(Rc::new(Filter::Array(None)));
                }
                let body = self.parse_pipe()?;
                self.expect(Token::RightBracket)?;
                Ok(Rc::new(Filter::Array(Some(body))))
            }
            Token::LeftBrace => {
                self.advance();
                self.parse_object()
            }
            Token::If => {
                self.advance();
                self.parse_if()
            }
            Token::Try => {
                self.advance();
                let body = self.parse_postfix(false)?;
                let handler = if self.eat(&Token::Catch) {
                    Some(self.parse_postfix(false)?)
                } else {
                    None
                };
                Ok(Rc::new(Filter::Try { body, handler }))
            }
            Token::Reduce => {
                self.advance();
                self.parse_reduce()
            }
            _ => Err(self.unexpected()),
        }
    }

    fn parse_ident(&mut self, name: String, offset: usize) -> Result<FilterRef, SyntaxError> {
        let mut args = Vec::new();
        if self.eat(&Token::LeftParen) {
            args.push(self.parse_pipe()?);
            while self.eat(&Token::Semicolon) {
                args.push(self.parse_pipe()?);
            }
            self.expect(Token::RightParen)?;
        } else {
            match name.as_str() {
                "true" => return Ok(Filter::literal(true)),
                "false" => return Ok(Filter::literal(false)),
                "null" => return Ok(Filter::literal(EngineValue::null())),
                _ => {}
            }
        }
        let native = functions::lookup(&name, args.len());
        Ok(Rc::new(Filter::Call {
            name,
            args,
            native,
            offset,
        }))
    }

    fn parse_string(&mut self) -> Result<FilterRef, SyntaxError> {
        let Token::Str(parts) = self.advance() else {
            return Err(self.unexpected());
        };
        if let [StrPart::Text(text)] = parts.as_slice() {
            return Ok(Filter::literal(text.as_str()));
        }
        let mut pieces = Vec::with_capacity(parts.len());
        for part in parts {
            match part {
                StrPart::Text(text) => pieces.push(InterpPart::Text(text)),
                StrPart::Interp { start, end } => {
                    let mut inner = Parser::new(self.source, start, end)?;
                    let expr = inner.parse_pipe()?;
                    inner.finish()?;
                    pieces.push(InterpPart::Expr(expr));
                }
            }
        }
        Ok(Rc::new(Filter::Interpolated(pieces)))
    }

    fn parse_if(&mut self) -> Result<FilterRef, SyntaxError> {
        let cond = self.parse_pipe()?;
        self.expect(Token::Then)?;
        let then = self.parse_pipe()?;
        let otherwise = match self.current() {
            Token::Elif => {
                self.advance();
                self.parse_if()?
            }
            Token::Else => {
                self.advance();
                let otherwise = self.parse_pipe()?;
                self.expect(Token::End)?;
                otherwise
            }
            Token::End => {
                self.advance();
                Filter::identity()
            }
            _ => return Err(self.unexpected()),
        };
        Ok(Rc::new(Filter::If {
            cond,
            then,
            otherwise,
        }))
    }

    fn parse_reduce(&mut self) -> Result<FilterRef, SyntaxError> {
        let source = self.parse_postfix(false)?;
        self.expect(Token::As)?;
        let name = self.parse_variable_name()?;
        self.expect(Token::LeftParen)?;
        let init = self.parse_pipe()?;
        self.expect(Token::Semicolon)?;
        let update = self.parse_pipe()?;
        self.expect(Token::RightParen)?;
        Ok(Rc::new(Filter::Reduce {
            source,
            name,
            init,
            update,
        }))
    }

    fn parse_object(&mut self) -> Result<FilterRef, SyntaxError> {
        let mut entries = Vec::new();
        if self.eat(&Token::RightBrace) {
            return Ok(Rc::new(Filter::Object(entries)));
        }
        loop {
            entries.push(self.parse_object_entry()?);
            if self.eat(&Token::Comma) {
                continue;
            }
            self.expect(Token::RightBrace)?;
            return Ok(Rc::new(Filter::Object(entries)));
        }
    }

    fn parse_object_entry(&mut self) -> Result<(FilterRef, FilterRef), SyntaxError> {
        let offset = self.offset();
        match self.current().clone() {
            Token::Variable(name) => {
                self.advance();
                let value = Rc::new(Filter::Variable {
                    name: name.clone(),
                    offset,
                });
                Ok((Filter::literal(name), value))
            }
            Token::Ident(name) => {
                self.advance();
                let key = Filter::literal(name.as_str());
                if self.eat(&Token::Colon) {
                    Ok((key, self.parse_object_value()?))
                } else {
                    Ok((key, Filter::field(Filter::identity(), &name)))
                }
            }
            Token::Str(_) => {
                let key = self.parse_string()?;
                if self.eat(&Token::Colon) {
                    Ok((key, self.parse_object_value()?))
                } else {
                    let value = Rc::new(Filter::Index {
                        target: Filter::identity(),
                        key: key.clone(),
                    });
                    Ok((key, value))
                }
            }
            Token::LeftParen => {
                self.advance();
                let key = self.parse_pipe()?;
                self.expect(Token::RightParen)?;
                self.expect(Token::Colon)?;
                Ok((key, self.parse_object_value()?))
            }
            _ => Err(self.unexpected()),
        }
    }

    /// Object values may pipe but not use `,`, which separates entries
    fn parse_object_value(&mut self) -> Result<FilterRef, SyntaxError> {
        let mut value = self.parse_alternative()?;
        while self.eat(&Token::Pipe) {
            let rhs = self.parse_alternative()?;
            value = Rc::new(Filter::Pipe(value, rhs));
        }
        Ok(value)
    }
}
