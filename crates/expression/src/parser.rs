//! Recursive-descent parser over the token stream.

use crate::ast::{BinaryOp, Builtin, Expr, PathSegment};
use crate::error::ExpressionError;
use crate::lexer::{Token, tokenize};

/// Parse an expression string into an AST.
pub fn parse(expr: &str) -> Result<Expr, ExpressionError> {
    let tokens = tokenize(expr)?;
    let mut parser = Parser {
        expr,
        tokens,
        pos: 0,
    };
    let ast = parser.or_expr()?;
    if parser.pos != parser.tokens.len() {
        return Err(parser.error("trailing tokens after expression"));
    }
    Ok(ast)
}

struct Parser<'a> {
    expr: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser<'_> {
    fn error(&self, message: impl Into<String>) -> ExpressionError {
        ExpressionError::Parse {
            expr: self.expr.to_string(),
            message: message.into(),
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: &Token, what: &str) -> Result<(), ExpressionError> {
        if self.eat(expected) {
            Ok(())
        } else {
            Err(self.error(format!("expected {what}")))
        }
    }

    fn or_expr(&mut self) -> Result<Expr, ExpressionError> {
        let mut lhs = self.and_expr()?;
        while self.eat(&Token::OrOr) {
            let rhs = self.and_expr()?;
            lhs = Expr::Binary {
                op: BinaryOp::Or,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn and_expr(&mut self) -> Result<Expr, ExpressionError> {
        let mut lhs = self.cmp_expr()?;
        while self.eat(&Token::AndAnd) {
            let rhs = self.cmp_expr()?;
            lhs = Expr::Binary {
                op: BinaryOp::And,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn cmp_expr(&mut self) -> Result<Expr, ExpressionError> {
        let lhs = self.add_expr()?;
        let op = match self.peek() {
            Some(Token::EqEq) => Some(BinaryOp::Eq),
            Some(Token::NotEq) => Some(BinaryOp::Ne),
            Some(Token::Lt) => Some(BinaryOp::Lt),
            Some(Token::LtEq) => Some(BinaryOp::Le),
            Some(Token::Gt) => Some(BinaryOp::Gt),
            Some(Token::GtEq) => Some(BinaryOp::Ge),
            _ => None,
        };
        if let Some(op) = op {
            self.pos += 1;
            let rhs = self.add_expr()?;
            Ok(Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            })
        } else {
            Ok(lhs)
        }
    }

    fn add_expr(&mut self) -> Result<Expr, ExpressionError> {
        let mut lhs = self.mul_expr()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.mul_expr()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn mul_expr(&mut self) -> Result<Expr, ExpressionError> {
        let mut lhs = self.unary_expr()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Percent) => BinaryOp::Rem,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.unary_expr()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn unary_expr(&mut self) -> Result<Expr, ExpressionError> {
        if self.eat(&Token::Bang) {
            Ok(Expr::Not(Box::new(self.unary_expr()?)))
        } else if self.eat(&Token::Minus) {
            Ok(Expr::Neg(Box::new(self.unary_expr()?)))
        } else {
            self.primary()
        }
    }

    fn primary(&mut self) -> Result<Expr, ExpressionError> {
        match self.bump() {
            Some(Token::Int(n)) => Ok(Expr::Int(n)),
            Some(Token::Float(f)) => Ok(Expr::Float(f)),
            Some(Token::Str(s)) => Ok(Expr::Str(s)),
            Some(Token::LParen) => {
                let inner = self.or_expr()?;
                self.expect(&Token::RParen, "closing parenthesis")?;
                Ok(inner)
            }
            Some(Token::Ident(name)) => match name.as_str() {
                "null" => Ok(Expr::Null),
                "true" => Ok(Expr::Bool(true)),
                "false" => Ok(Expr::Bool(false)),
                "exists" | "size" | "sum" if self.peek() == Some(&Token::LParen) => {
                    let builtin = match name.as_str() {
                        "exists" => Builtin::Exists,
                        "size" => Builtin::Size,
                        _ => Builtin::Sum,
                    };
                    self.pos += 1;
                    let arg = self.or_expr()?;
                    self.expect(&Token::RParen, "closing parenthesis")?;
                    Ok(Expr::Call {
                        builtin,
                        arg: Box::new(arg),
                    })
                }
                _ => self.path(name),
            },
            _ => Err(self.error("expected operand")),
        }
    }

    fn path(&mut self, head: String) -> Result<Expr, ExpressionError> {
        let mut segments = vec![PathSegment::Field(head)];
        loop {
            if self.eat(&Token::Dot) {
                match self.bump() {
                    Some(Token::Ident(name)) => segments.push(PathSegment::Field(name)),
                    _ => return Err(self.error("expected field name after '.'")),
                }
            } else if self.eat(&Token::LBracket) {
                match self.bump() {
                    Some(Token::Int(n)) if n >= 0 => {
                        segments.push(PathSegment::Index(n as usize));
                    }
                    _ => return Err(self.error("expected non-negative index after '['")),
                }
                self.expect(&Token::RBracket, "closing bracket")?;
            } else {
                break;
            }
        }
        Ok(Expr::Path(segments))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parse_comparison() {
        let ast = parse("data.x == 1").unwrap();
        assert!(matches!(ast, Expr::Binary { op: BinaryOp::Eq, .. }));
    }

    #[test]
    fn parse_path_with_index() {
        let ast = parse("items[2].name").unwrap();
        assert_eq!(
            ast,
            Expr::Path(vec![
                PathSegment::Field("items".into()),
                PathSegment::Index(2),
                PathSegment::Field("name".into()),
            ])
        );
    }

    #[test]
    fn precedence_and_binds_tighter_than_or() {
        let ast = parse("a || b && c").unwrap();
        let Expr::Binary { op, rhs, .. } = ast else {
            panic!("expected binary")
        };
        assert_eq!(op, BinaryOp::Or);
        assert!(matches!(*rhs, Expr::Binary { op: BinaryOp::And, .. }));
    }

    #[test]
    fn precedence_arithmetic_in_comparison() {
        let ast = parse("a + 1 > 3").unwrap();
        let Expr::Binary { op, lhs, .. } = ast else {
            panic!("expected binary")
        };
        assert_eq!(op, BinaryOp::Gt);
        assert!(matches!(*lhs, Expr::Binary { op: BinaryOp::Add, .. }));
    }

    #[test]
    fn parse_builtins() {
        assert!(matches!(
            parse("exists(data.x)").unwrap(),
            Expr::Call { builtin: Builtin::Exists, .. }
        ));
        assert!(matches!(
            parse("size(items) == 3").unwrap(),
            Expr::Binary { .. }
        ));
    }

    #[test]
    fn keywords_are_literals() {
        assert_eq!(parse("null").unwrap(), Expr::Null);
        assert_eq!(parse("true").unwrap(), Expr::Bool(true));
        assert_eq!(parse("false").unwrap(), Expr::Bool(false));
    }

    #[test]
    fn ident_named_like_builtin_without_call_is_path() {
        // `size` with no parenthesis is an ordinary field reference.
        assert!(matches!(parse("size").unwrap(), Expr::Path(_)));
    }

    #[test]
    fn trailing_tokens_rejected() {
        assert!(parse("a == 1 2").is_err());
    }

    #[test]
    fn dangling_operator_rejected() {
        assert!(parse("a ==").is_err());
        assert!(parse("&& b").is_err());
    }
}
