//! Hand-written lexer: a permissive ASCII tokenizer for the SQL surface
//! the executor contracts against. It exists so the crate is independently
//! exercisable end to end and the test suite can express scenarios as SQL
//! text rather than hand-built AST nodes.

use crate::error::{Error, Result};
use crate::sql::token::{Token, TokenKind};

pub struct Lexer<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input: input.as_bytes(),
            pos: 0,
        }
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>> {
        let mut tokens = Vec::new();
        loop {
            let tok = self.next_token()?;
            let is_eof = tok.kind == TokenKind::Eof;
            tokens.push(tok);
            if is_eof {
                break;
            }
        }
        Ok(tokens)
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.input.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            while matches!(self.peek(), Some(b) if b.is_ascii_whitespace()) {
                self.pos += 1;
            }
            if self.peek() == Some(b'-') && self.peek_at(1) == Some(b'-') {
                while !matches!(self.peek(), None | Some(b'\n')) {
                    self.pos += 1;
                }
                continue;
            }
            break;
        }
    }

    fn next_token(&mut self) -> Result<Token> {
        self.skip_whitespace_and_comments();
        let pos = self.pos;
        let Some(c) = self.peek() else {
            return Ok(Token { kind: TokenKind::Eof, pos });
        };

        let kind = match c {
            b'(' => { self.advance(); TokenKind::LParen }
            b')' => { self.advance(); TokenKind::RParen }
            b'[' => { self.advance(); TokenKind::LBracket }
            b']' => { self.advance(); TokenKind::RBracket }
            b',' => { self.advance(); TokenKind::Comma }
            b'.' if !self.peek_at(1).map(|b| b.is_ascii_digit()).unwrap_or(false) => {
                self.advance();
                TokenKind::Dot
            }
            b';' => { self.advance(); TokenKind::Semicolon }
            b'*' => { self.advance(); TokenKind::Star }
            b'=' => { self.advance(); TokenKind::Eq }
            b'!' if self.peek_at(1) == Some(b'=') => {
                self.pos += 2;
                TokenKind::Ne
            }
            b'<' if self.peek_at(1) == Some(b'>') => {
                self.pos += 2;
                TokenKind::Ne
            }
            b'<' if self.peek_at(1) == Some(b'=') => {
                self.pos += 2;
                TokenKind::Le
            }
            b'<' => { self.advance(); TokenKind::Lt }
            b'>' if self.peek_at(1) == Some(b'=') => {
                self.pos += 2;
                TokenKind::Ge
            }
            b'>' => { self.advance(); TokenKind::Gt }
            b'\'' => return self.lex_string(pos),
            b'0'..=b'9' => return self.lex_number(pos),
            b'-' if self.peek_at(1).map(|b| b.is_ascii_digit()).unwrap_or(false) => {
                return self.lex_number(pos)
            }
            c if c.is_ascii_alphabetic() || c == b'_' => return self.lex_ident(pos),
            other => {
                return Err(Error::ParseForm(format!(
                    "unexpected character '{}' at byte {pos}",
                    other as char
                )))
            }
        };
        Ok(Token { kind, pos })
    }

    fn lex_string(&mut self, pos: usize) -> Result<Token> {
        self.advance(); // opening quote
        let mut s = String::new();
        loop {
            match self.advance() {
                Some(b'\'') => {
                    if self.peek() == Some(b'\'') {
                        s.push('\'');
                        self.advance();
                    } else {
                        break;
                    }
                }
                Some(c) => s.push(c as char),
                None => return Err(Error::ParseForm("unterminated string literal".into())),
            }
        }
        Ok(Token { kind: TokenKind::String(s), pos })
    }

    fn lex_number(&mut self, pos: usize) -> Result<Token> {
        let start = self.pos;
        if self.peek() == Some(b'-') {
            self.advance();
        }
        let mut is_float = false;
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                self.advance();
            } else if c == b'.' && !is_float {
                is_float = true;
                self.advance();
            } else {
                break;
            }
        }
        let text = std::str::from_utf8(&self.input[start..self.pos]).unwrap();
        let kind = if is_float {
            TokenKind::Number(text.parse().map_err(|_| Error::ParseForm(format!("bad number literal '{text}'")))?)
        } else {
            TokenKind::IntNumber(text.parse().map_err(|_| Error::ParseForm(format!("bad integer literal '{text}'")))?)
        };
        Ok(Token { kind, pos })
    }

    fn lex_ident(&mut self, pos: usize) -> Result<Token> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_alphanumeric() || c == b'_') {
            self.advance();
        }
        let text = std::str::from_utf8(&self.input[start..self.pos]).unwrap();
        let kind = TokenKind::keyword(text).unwrap_or_else(|| TokenKind::Identifier(text.to_string()));
        Ok(Token { kind, pos })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizes_simple_select() {
        let tokens = Lexer::new("SELECT name FROM t WHERE id = 2").tokenize().unwrap();
        assert!(matches!(tokens[0].kind, TokenKind::Select));
        assert!(matches!(tokens.last().unwrap().kind, TokenKind::Eof));
    }

    #[test]
    fn negative_number_literal() {
        let tokens = Lexer::new("-1.5").tokenize().unwrap();
        assert!(matches!(tokens[0].kind, TokenKind::Number(n) if (n + 1.5).abs() < 1e-9));
    }
}
