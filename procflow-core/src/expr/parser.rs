use serde_json::Value as JsonValue;

use super::ast::{BinaryOp, Expr, Function, UnaryOp};
use super::lexer::{tokenize, Spanned, Token};
use super::ExprError;

/// Parses `simple` expression text into an AST.
pub fn parse_expr(input: &str) -> Result<Expr, ExprError> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(ExprError::Empty);
    }
    let mut p = Parser { tokens, pos: 0 };
    let expr = p.parse_or()?;
    if let Some(t) = p.peek_spanned() {
        return Err(ExprError::UnexpectedToken {
            found: t.tok.describe(),
            pos: t.pos,
        });
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|s| &s.tok)
    }

    fn peek_spanned(&self) -> Option<&Spanned> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Spanned> {
        let t = self.tokens.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn expect(&mut self, want: Token) -> Result<(), ExprError> {
        match self.next() {
            Some(t) if t.tok == want => Ok(()),
            Some(t) => Err(ExprError::UnexpectedToken {
                found: t.tok.describe(),
                pos: t.pos,
            }),
            None => Err(ExprError::UnexpectedEnd),
        }
    }

    fn binary_level(
        &mut self,
        ops: &[(Token, BinaryOp)],
        next: fn(&mut Self) -> Result<Expr, ExprError>,
    ) -> Result<Expr, ExprError> {
        let mut lhs = next(self)?;
        'outer: loop {
            for (tok, op) in ops {
                if self.peek() == Some(tok) {
                    self.pos += 1;
                    let rhs = next(self)?;
                    lhs = Expr::Binary(*op, Box::new(lhs), Box::new(rhs));
                    continue 'outer;
                }
            }
            return Ok(lhs);
        }
    }

    fn parse_or(&mut self) -> Result<Expr, ExprError> {
        self.binary_level(&[(Token::OrOr, BinaryOp::Or)], Self::parse_and)
    }

    fn parse_and(&mut self) -> Result<Expr, ExprError> {
        self.binary_level(&[(Token::AndAnd, BinaryOp::And)], Self::parse_equality)
    }

    fn parse_equality(&mut self) -> Result<Expr, ExprError> {
        self.binary_level(
            &[(Token::EqEq, BinaryOp::Eq), (Token::NotEq, BinaryOp::Ne)],
            Self::parse_comparison,
        )
    }

    fn parse_comparison(&mut self) -> Result<Expr, ExprError> {
        self.binary_level(
            &[
                (Token::Le, BinaryOp::Le),
                (Token::Ge, BinaryOp::Ge),
                (Token::Lt, BinaryOp::Lt),
                (Token::Gt, BinaryOp::Gt),
            ],
            Self::parse_additive,
        )
    }

    fn parse_additive(&mut self) -> Result<Expr, ExprError> {
        self.binary_level(
            &[(Token::Plus, BinaryOp::Add), (Token::Minus, BinaryOp::Sub)],
            Self::parse_multiplicative,
        )
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, ExprError> {
        self.binary_level(
            &[
                (Token::Star, BinaryOp::Mul),
                (Token::Slash, BinaryOp::Div),
                (Token::Percent, BinaryOp::Rem),
            ],
            Self::parse_unary,
        )
    }

    fn parse_unary(&mut self) -> Result<Expr, ExprError> {
        match self.peek() {
            Some(Token::Bang) => {
                self.pos += 1;
                Ok(Expr::Unary(UnaryOp::Not, Box::new(self.parse_unary()?)))
            }
            Some(Token::Minus) => {
                self.pos += 1;
                Ok(Expr::Unary(UnaryOp::Neg, Box::new(self.parse_unary()?)))
            }
            _ => self.parse_postfix(),
        }
    }

    fn parse_postfix(&mut self) -> Result<Expr, ExprError> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek() {
                Some(Token::Dot) => {
                    self.pos += 1;
                    match self.next() {
                        Some(Spanned {
                            tok: Token::Ident(field),
                            ..
                        }) => expr = Expr::Member(Box::new(expr), field),
                        Some(t) => {
                            return Err(ExprError::UnexpectedToken {
                                found: t.tok.describe(),
                                pos: t.pos,
                            })
                        }
                        None => return Err(ExprError::UnexpectedEnd),
                    }
                }
                Some(Token::LBracket) => {
                    self.pos += 1;
                    let idx = self.parse_or()?;
                    self.expect(Token::RBracket)?;
                    expr = Expr::Index(Box::new(expr), Box::new(idx));
                }
                _ => return Ok(expr),
            }
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, ExprError> {
        let t = self.next().ok_or(ExprError::UnexpectedEnd)?;
        match t.tok {
            Token::Int(i) => Ok(Expr::Literal(JsonValue::from(i))),
            Token::Float(f) => serde_json::Number::from_f64(f)
                .map(|n| Expr::Literal(JsonValue::Number(n)))
                .ok_or_else(|| ExprError::InvalidNumber(f.to_string())),
            Token::Str(s) => Ok(Expr::Literal(JsonValue::String(s))),
            Token::True => Ok(Expr::Literal(JsonValue::Bool(true))),
            Token::False => Ok(Expr::Literal(JsonValue::Bool(false))),
            Token::Null => Ok(Expr::Literal(JsonValue::Null)),
            Token::LParen => {
                let e = self.parse_or()?;
                self.expect(Token::RParen)?;
                Ok(e)
            }
            Token::Ident(name) => {
                if self.peek() == Some(&Token::LParen) {
                    self.pos += 1;
                    let func = Function::from_name(&name)
                        .ok_or_else(|| ExprError::UnknownFunction(name.clone()))?;
                    let args = self.parse_args()?;
                    if args.len() != func.arity() {
                        return Err(ExprError::Arity {
                            name: func.name().to_string(),
                            expected: func.arity(),
                            got: args.len(),
                        });
                    }
                    Ok(Expr::Call(func, args))
                } else {
                    Ok(Expr::Var(name))
                }
            }
            other => Err(ExprError::UnexpectedToken {
                found: other.describe(),
                pos: t.pos,
            }),
        }
    }

    fn parse_args(&mut self) -> Result<Vec<Expr>, ExprError> {
        let mut args = Vec::new();
        if self.peek() == Some(&Token::RParen) {
            self.pos += 1;
            return Ok(args);
        }
        loop {
            args.push(self.parse_or()?);
            match self.next() {
                Some(Spanned {
                    tok: Token::Comma, ..
                }) => continue,
                Some(Spanned {
                    tok: Token::RParen, ..
                }) => return Ok(args),
                Some(t) => {
                    return Err(ExprError::UnexpectedToken {
                        found: t.tok.describe(),
                        pos: t.pos,
                    })
                }
                None => return Err(ExprError::UnexpectedEnd),
            }
        }
    }
}
