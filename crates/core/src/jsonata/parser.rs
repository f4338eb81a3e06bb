use super::ast::{BinaryOp, Expr};
use super::lexer::{lex, Spanned, Token};
use crate::error::SyntaxError;

struct Parser<'a> {
    src: &'a str,
    tokens: Vec<Spanned>,
    pos: usize,
}

/// Parse the body of a JSONata expression (without the `{% %}` delimiters).
pub fn parse(src: &str) -> Result<Expr, SyntaxError> {
    let tokens = lex(src)?;
    let mut parser = Parser {
        src,
        tokens,
        pos: 0,
    };
    let expr = parser.parse_expr()?;
    if parser.peek() != &Token::Eof {
        return Err(parser.err(format!("unexpected {:?}", parser.peek())));
    }
    Ok(expr)
}

impl<'a> Parser<'a> {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)].token
    }

    fn peek_at(&self, ahead: usize) -> &Token {
        &self.tokens[(self.pos + ahead).min(self.tokens.len() - 1)].token
    }

    fn advance(&mut self) -> Token {
        let t = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        t
    }

    fn err(&self, msg: impl Into<String>) -> SyntaxError {
        let offset = self.tokens[self.pos.min(self.tokens.len() - 1)].offset;
        SyntaxError::new("expression", self.src, offset, msg)
    }

    fn expect(&mut self, token: Token) -> Result<(), SyntaxError> {
        if self.peek() == &token {
            self.advance();
            Ok(())
        } else {
            Err(self.err(format!("expected {:?}, got {:?}", token, self.peek())))
        }
    }

    fn is_keyword(&self, word: &str) -> bool {
        matches!(self.peek(), Token::Name(w) if w == word)
    }

    // -- Precedence climbing ------------------------------------

    fn parse_expr(&mut self) -> Result<Expr, SyntaxError> {
        if let (Token::Variable(name), Token::Assign) = (self.peek().clone(), self.peek_at(1)) {
            self.advance();
            self.advance();
            let value = self.parse_expr()?;
            return Ok(Expr::Bind(name, Box::new(value)));
        }
        self.parse_condition()
    }

    fn parse_condition(&mut self) -> Result<Expr, SyntaxError> {
        let cond = self.parse_or()?;
        if self.peek() != &Token::Question {
            return Ok(cond);
        }
        self.advance();
        let then = self.parse_expr()?;
        let otherwise = if self.peek() == &Token::Colon {
            self.advance();
            Some(Box::new(self.parse_expr()?))
        } else {
            None
        };
        Ok(Expr::Condition(Box::new(cond), Box::new(then), otherwise))
    }

    fn parse_or(&mut self) -> Result<Expr, SyntaxError> {
        let mut left = self.parse_and()?;
        while self.is_keyword("or") {
            self.advance();
            let right = self.parse_and()?;
            left = Expr::Binary(BinaryOp::Or, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, SyntaxError> {
        let mut left = self.parse_comparison()?;
        while self.is_keyword("and") {
            self.advance();
            let right = self.parse_comparison()?;
            left = Expr::Binary(BinaryOp::And, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_comparison(&mut self) -> Result<Expr, SyntaxError> {
        let left = self.parse_additive()?;
        let op = match self.peek() {
            Token::Eq => BinaryOp::Eq,
            Token::Neq => BinaryOp::Ne,
            Token::Lt => BinaryOp::Lt,
            Token::Lte => BinaryOp::Le,
            Token::Gt => BinaryOp::Gt,
            Token::Gte => BinaryOp::Ge,
            Token::Name(w) if w == "in" => BinaryOp::In,
            _ => return Ok(left),
        };
        self.advance();
        let right = self.parse_additive()?;
        Ok(Expr::Binary(op, Box::new(left), Box::new(right)))
    }

    fn parse_additive(&mut self) -> Result<Expr, SyntaxError> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Token::Plus => BinaryOp::Add,
                Token::Minus => BinaryOp::Sub,
                Token::Amp => BinaryOp::Concat,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, SyntaxError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Token::Star => BinaryOp::Mul,
                Token::Slash => BinaryOp::Div,
                Token::Percent => BinaryOp::Mod,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_unary()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn parse_unary(&mut self) -> Result<Expr, SyntaxError> {
        if self.peek() == &Token::Minus {
            self.advance();
            let operand = self.parse_unary()?;
            return Ok(match operand {
                Expr::Number(n) => Expr::Number(-n),
                other => Expr::Negate(Box::new(other)),
            });
        }
        self.parse_path()
    }

    fn parse_path(&mut self) -> Result<Expr, SyntaxError> {
        let mut steps = vec![self.parse_step()?];
        while self.peek() == &Token::Dot {
            self.advance();
            steps.push(self.parse_step()?);
        }
        if steps.len() == 1 {
            Ok(steps.remove(0))
        } else {
            Ok(Expr::Path(steps))
        }
    }

    fn parse_step(&mut self) -> Result<Expr, SyntaxError> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek() {
                Token::LBracket => {
                    self.advance();
                    let predicate = self.parse_expr()?;
                    self.expect(Token::RBracket)?;
                    expr = Expr::Filter(Box::new(expr), Box::new(predicate));
                }
                Token::LParen => {
                    let Expr::Variable(name) = &expr else {
                        return Ok(expr);
                    };
                    let name = name.clone();
                    self.advance();
                    let mut args = Vec::new();
                    if self.peek() != &Token::RParen {
                        loop {
                            args.push(self.parse_expr()?);
                            if self.peek() == &Token::Comma {
                                self.advance();
                                continue;
                            }
                            break;
                        }
                    }
                    self.expect(Token::RParen)?;
                    expr = Expr::Call(name, args);
                }
                _ => return Ok(expr),
            }
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, SyntaxError> {
        match self.advance() {
            Token::Number(n) => Ok(Expr::Number(n)),
            Token::Str(s) => Ok(Expr::Str(s)),
            Token::Name(w) => Ok(match w.as_str() {
                "true" => Expr::Bool(true),
                "false" => Expr::Bool(false),
                "null" => Expr::Null,
                _ => Expr::Field(w),
            }),
            Token::QuotedName(w) => Ok(Expr::Field(w)),
            Token::Variable(v) => Ok(Expr::Variable(v)),
            Token::Star => Ok(Expr::Wildcard),
            Token::LParen => {
                let mut exprs = Vec::new();
                while self.peek() != &Token::RParen {
                    exprs.push(self.parse_expr()?);
                    if self.peek() == &Token::Semicolon {
                        self.advance();
                    } else {
                        break;
                    }
                }
                self.expect(Token::RParen)?;
                Ok(Expr::Block(exprs))
            }
            Token::LBracket => {
                let mut items = Vec::new();
                while self.peek() != &Token::RBracket {
                    let item = self.parse_expr()?;
                    if self.peek() == &Token::DotDot {
                        self.advance();
                        let end = self.parse_expr()?;
                        items.push(Expr::Range(Box::new(item), Box::new(end)));
                    } else {
                        items.push(item);
                    }
                    if self.peek() == &Token::Comma {
                        self.advance();
                    } else {
                        break;
                    }
                }
                self.expect(Token::RBracket)?;
                Ok(Expr::Array(items))
            }
            Token::LBrace => {
                let mut fields = Vec::new();
                while self.peek() != &Token::RBrace {
                    let key = self.parse_expr()?;
                    self.expect(Token::Colon)?;
                    let value = self.parse_expr()?;
                    fields.push((key, value));
                    if self.peek() == &Token::Comma {
                        self.advance();
                    } else {
                        break;
                    }
                }
                self.expect(Token::RBrace)?;
                Ok(Expr::Object(fields))
            }
            other => {
                // step back so the error points at the offending token
                self.pos = self.pos.saturating_sub(1);
                Err(self.err(format!("unexpected {:?}", other)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comparison_binds_looser_than_arithmetic() {
        let expr = parse("$states.input.amount * 2 > 100").unwrap();
        let Expr::Binary(BinaryOp::Gt, left, right) = expr else {
            panic!("expected comparison");
        };
        assert!(matches!(*left, Expr::Binary(BinaryOp::Mul, _, _)));
        assert_eq!(*right, Expr::Number(100.0));
    }

    #[test]
    fn path_steps_and_filters() {
        let expr = parse("orders[0].total").unwrap();
        let Expr::Path(steps) = expr else {
            panic!("expected path");
        };
        assert_eq!(steps.len(), 2);
        assert!(matches!(&steps[0], Expr::Filter(_, _)));
        assert_eq!(steps[1], Expr::Field("total".to_string()));
    }

    #[test]
    fn function_calls_and_objects() {
        let expr = parse("{ 'n': $count($states.input.items), \"ok\": true }").unwrap();
        let Expr::Object(fields) = expr else {
            panic!("expected object");
        };
        assert_eq!(fields.len(), 2);
        assert!(matches!(&fields[0].1, Expr::Call(name, args) if name == "count" && args.len() == 1));
    }

    #[test]
    fn conditional_and_logic() {
        let expr = parse("$a and not_a_keyword or $b ? 'y' : 'n'").unwrap();
        assert!(matches!(expr, Expr::Condition(_, _, Some(_))));
    }

    #[test]
    fn blocks_with_bindings() {
        let expr = parse("($x := 2; $x * 3)").unwrap();
        let Expr::Block(items) = expr else {
            panic!("expected block");
        };
        assert!(matches!(&items[0], Expr::Bind(name, _) if name == "x"));
    }

    #[test]
    fn negative_literals_fold() {
        assert_eq!(parse("-5").unwrap(), Expr::Number(-5.0));
    }

    #[test]
    fn reports_trailing_garbage() {
        assert!(parse("1 2").is_err());
        assert!(parse("(1").is_err());
    }
}
