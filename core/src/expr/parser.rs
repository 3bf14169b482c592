use super::ast::{BinaryOp, Expr, UnaryOp};
use super::error::{ParseError, ParseResult};
use super::lexer::{Lexer, Token};
use crate::value::Value;

pub struct Parser {
    lexer: Lexer,
    current_token: Token,
    token_start: usize,
}

impl Parser {
    pub fn new(input: &str) -> ParseResult<Self> {
        let mut lexer = Lexer::new(input);
        let current_token = lexer.next()?;

        Ok(Self {
            lexer,
            current_token,
            token_start: 0,
        })
    }

    /// Parse a complete expression; trailing tokens are an error.
    pub fn parse(mut self) -> ParseResult<Expr> {
        if self.current_token == Token::Eof {
            return Err(ParseError::UnexpectedEof);
        }

        let expr = self.parse_or()?;
        if self.current_token != Token::Eof {
            return Err(self.unexpected_token("end of expression"));
        }
        Ok(expr)
    }

    fn parse_or(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_and()?;

        while self.current_token == Token::Or {
            self.advance()?;
            let right = self.parse_and()?;
            left = binary(BinaryOp::Or, left, right);
        }

        Ok(left)
    }

    fn parse_and(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_equality()?;

        while self.current_token == Token::And {
            self.advance()?;
            let right = self.parse_equality()?;
            left = binary(BinaryOp::And, left, right);
        }

        Ok(left)
    }

    fn parse_equality(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_comparison()?;

        loop {
            let op = match self.current_token {
                Token::Equal => BinaryOp::Eq,
                Token::NotEqual => BinaryOp::NotEq,
                _ => break,
            };
            self.advance()?;
            let right = self.parse_comparison()?;
            left = binary(op, left, right);
        }

        Ok(left)
    }

    fn parse_comparison(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_additive()?;

        loop {
            let op = match self.current_token {
                Token::Less => BinaryOp::Lt,
                Token::LessEqual => BinaryOp::LtEq,
                Token::Greater => BinaryOp::Gt,
                Token::GreaterEqual => BinaryOp::GtEq,
                _ => break,
            };
            self.advance()?;
            let right = self.parse_additive()?;
            left = binary(op, left, right);
        }

        Ok(left)
    }

    fn parse_additive(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_multiplicative()?;

        loop {
            let op = match self.current_token {
                Token::Plus => BinaryOp::Add,
                Token::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.advance()?;
            let right = self.parse_multiplicative()?;
            left = binary(op, left, right);
        }

        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_unary()?;

        loop {
            let op = match self.current_token {
                Token::Star => BinaryOp::Mul,
                Token::Slash => BinaryOp::Div,
                Token::Percent => BinaryOp::Mod,
                _ => break,
            };
            self.advance()?;
            let right = self.parse_unary()?;
            left = binary(op, left, right);
        }

        Ok(left)
    }

    fn parse_unary(&mut self) -> ParseResult<Expr> {
        let op = match self.current_token {
            Token::Not => UnaryOp::Not,
            Token::Minus => UnaryOp::Neg,
            _ => return self.parse_postfix(),
        };
        self.advance()?;

        let expr = self.parse_unary()?;
        Ok(Expr::Unary {
            op,
            expr: Box::new(expr),
        })
    }

    fn parse_postfix(&mut self) -> ParseResult<Expr> {
        let mut expr = self.parse_primary()?;

        loop {
            match self.current_token {
                Token::Dot => {
                    self.advance()?;
                    let name = self.parse_identifier()?;
                    if self.current_token == Token::LeftParen {
                        self.advance()?;
                        self.expect(Token::RightParen)?;
                        expr = Expr::Call {
                            target: Box::new(expr),
                            method: name,
                        };
                    } else {
                        expr = Expr::Member {
                            target: Box::new(expr),
                            name,
                        };
                    }
                }
                Token::LeftBracket => {
                    self.advance()?;
                    let index = self.parse_or()?;
                    self.expect(Token::RightBracket)?;
                    expr = Expr::Index {
                        target: Box::new(expr),
                        index: Box::new(index),
                    };
                }
                _ => break,
            }
        }

        Ok(expr)
    }

    fn parse_primary(&mut self) -> ParseResult<Expr> {
        let expr = match &self.current_token {
            Token::IntLiteral(i) => Expr::Literal(Value::Int(*i)),
            Token::FloatLiteral(f) => Expr::Literal(Value::Float(*f)),
            Token::StringLiteral(s) => Expr::Literal(Value::Text(s.clone())),
            Token::True => Expr::Literal(Value::Bool(true)),
            Token::False => Expr::Literal(Value::Bool(false)),
            Token::Null => Expr::Literal(Value::Null),
            Token::Identifier(name) => Expr::Ident(name.clone()),
            Token::LeftParen => {
                self.advance()?;
                let inner = self.parse_or()?;
                self.expect(Token::RightParen)?;
                return Ok(inner);
            }
            Token::Eof => return Err(ParseError::UnexpectedEof),
            _ => return Err(self.unexpected_token("expression")),
        };

        self.advance()?;
        Ok(expr)
    }

    fn parse_identifier(&mut self) -> ParseResult<String> {
        match &self.current_token {
            Token::Identifier(name) => {
                let name = name.clone();
                self.advance()?;
                Ok(name)
            }
            _ => Err(self.unexpected_token("identifier")),
        }
    }

    fn advance(&mut self) -> ParseResult<()> {
        self.token_start = self.lexer.position();
        self.current_token = self.lexer.next()?;
        Ok(())
    }

    fn expect(&mut self, expected: Token) -> ParseResult<()> {
        if std::mem::discriminant(&self.current_token) == std::mem::discriminant(&expected) {
            self.advance()
        } else {
            Err(self.unexpected_token(&format!("{:?}", expected)))
        }
    }

    fn unexpected_token(&self, expected: &str) -> ParseError {
        if self.current_token == Token::Eof {
            return ParseError::UnexpectedEof;
        }
        ParseError::UnexpectedToken {
            expected: expected.to_string(),
            found: format!("{:?}", self.current_token),
            position: self.token_start,
        }
    }
}

fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    Expr::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}
