//! Lexer and Pratt parser for the expression grammar the quiz accepts.
//!
//! Both `^` and `**` denote exponentiation, `×`, `·`, `÷` and the unicode
//! minus are folded onto their ascii forms, and multiplication may be left
//! implicit the way people type it in chat: `2x`, `3(x+1)`, `(a)(b)`.

use super::{Expr, Func};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseError {
    #[error("empty expression")]
    Empty,
    #[error("unexpected character '{0}'")]
    UnexpectedChar(char),
    #[error("malformed number '{0}'")]
    BadNumber(String),
    #[error("unexpected '{0}'")]
    UnexpectedToken(String),
    #[error("missing closing parenthesis")]
    MissingParen,
    #[error("unexpected input after the expression")]
    TrailingInput,
    #[error("expression ends too early")]
    UnexpectedEnd,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Num(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    LParen,
    RParen,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Num(value) => super::format_number(*value),
            Token::Ident(name) => name.clone(),
            Token::Plus => "+".to_string(),
            Token::Minus => "-".to_string(),
            Token::Star => "*".to_string(),
            Token::Slash => "/".to_string(),
            Token::Caret => "^".to_string(),
            Token::LParen => "(".to_string(),
            Token::RParen => ")".to_string(),
        }
    }
}

fn lex(input: &str) -> Result<Vec<Token>, ParseError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '0'..='9' | '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let value = text
                    .parse::<f64>()
                    .map_err(|_| ParseError::BadNumber(text))?;
                tokens.push(Token::Num(value));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' | '−' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '*' => {
                if chars.get(i + 1) == Some(&'*') {
                    tokens.push(Token::Caret);
                    i += 2;
                } else {
                    tokens.push(Token::Star);
                    i += 1;
                }
            }
            '×' | '·' => {
                tokens.push(Token::Star);
                i += 1;
            }
            '/' | '÷' => {
                tokens.push(Token::Slash);
                i += 1;
            }
            '^' => {
                tokens.push(Token::Caret);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            other => return Err(ParseError::UnexpectedChar(other)),
        }
    }
    Ok(tokens)
}

/// Parses `input` into an [`Expr`].
pub fn parse(input: &str) -> Result<Expr, ParseError> {
    let tokens = lex(input)?;
    if tokens.is_empty() {
        return Err(ParseError::Empty);
    }
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.expression(0)?;
    if parser.pos < parser.tokens.len() {
        return Err(ParseError::TrailingInput);
    }
    Ok(expr)
}

enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    /// Adjacent operands with no operator between them, read as `*`.
    Implicit,
}

// Unary minus binds tighter than `*` and looser than `^`,
// so -x^2 reads as -(x^2) and -2x as (-2)*x.
const PREFIX_MINUS_BP: u8 = 5;

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expression(&mut self, min_bp: u8) -> Result<Expr, ParseError> {
        let mut lhs = match self.advance() {
            Some(Token::Num(value)) => Expr::Num(value),
            Some(Token::Ident(name)) => self.ident(name)?,
            Some(Token::LParen) => {
                let inner = self.expression(0)?;
                self.expect_rparen()?;
                inner
            }
            Some(Token::Minus) => Expr::Neg(Box::new(self.expression(PREFIX_MINUS_BP)?)),
            Some(Token::Plus) => self.expression(PREFIX_MINUS_BP)?,
            Some(token) => return Err(ParseError::UnexpectedToken(token.describe())),
            None => return Err(ParseError::UnexpectedEnd),
        };

        loop {
            let (left_bp, right_bp, op) = match self.peek() {
                Some(Token::Plus) => (1, 2, BinOp::Add),
                Some(Token::Minus) => (1, 2, BinOp::Sub),
                Some(Token::Star) => (3, 4, BinOp::Mul),
                Some(Token::Slash) => (3, 4, BinOp::Div),
                Some(Token::Caret) => (8, 7, BinOp::Pow),
                // Implicit multiplication never glues two bare numbers:
                // "1 1/4" is a mixed number, not 1*1/4, and must not parse.
                Some(Token::Ident(_)) | Some(Token::LParen) => (3, 4, BinOp::Implicit),
                _ => break,
            };
            if left_bp < min_bp {
                break;
            }
            if !matches!(op, BinOp::Implicit) {
                self.advance();
            }
            let rhs = self.expression(right_bp)?;
            lhs = match op {
                BinOp::Add => Expr::Add(Box::new(lhs), Box::new(rhs)),
                BinOp::Sub => Expr::Sub(Box::new(lhs), Box::new(rhs)),
                BinOp::Mul | BinOp::Implicit => Expr::Mul(Box::new(lhs), Box::new(rhs)),
                BinOp::Div => Expr::Div(Box::new(lhs), Box::new(rhs)),
                BinOp::Pow => Expr::Pow(Box::new(lhs), Box::new(rhs)),
            };
        }
        Ok(lhs)
    }

    fn ident(&mut self, name: String) -> Result<Expr, ParseError> {
        if let Some(func) = Func::from_name(&name) {
            if matches!(self.peek(), Some(Token::LParen)) {
                self.advance();
                let arg = self.expression(0)?;
                self.expect_rparen()?;
                return Ok(Expr::Call(func, Box::new(arg)));
            }
        }
        Ok(match name.as_str() {
            "pi" => Expr::Num(std::f64::consts::PI),
            "e" => Expr::Num(std::f64::consts::E),
            _ => Expr::Var(name),
        })
    }

    fn expect_rparen(&mut self) -> Result<(), ParseError> {
        match self.advance() {
            Some(Token::RParen) => Ok(()),
            Some(token) => Err(ParseError::UnexpectedToken(token.describe())),
            None => Err(ParseError::MissingParen),
        }
    }
}
