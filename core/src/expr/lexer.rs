use super::error::{ParseError, ParseResult};

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Literals
    IntLiteral(i64),
    FloatLiteral(f64),
    StringLiteral(String),
    True,
    False,
    Null,

    Identifier(String),

    // Logical
    And,
    Or,
    Not,

    // Comparison
    Equal,        // == / eq
    NotEqual,     // != / neq
    Less,         // < / lt
    Greater,      // > / gt
    LessEqual,    // <= / lte
    GreaterEqual, // >= / gte

    // Arithmetic
    Plus,
    Minus,
    Star,
    Slash,
    Percent,

    // Symbols
    Dot,
    Comma,
    LeftParen,
    RightParen,
    LeftBracket,
    RightBracket,

    Eof,
}

pub struct Lexer {
    input: Vec<char>,
    position: usize,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        Self {
            input: input.chars().collect(),
            position: 0,
        }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    fn current(&self) -> Option<char> {
        self.input.get(self.position).copied()
    }

    fn peek(&self) -> Option<char> {
        self.input.get(self.position + 1).copied()
    }

    fn advance(&mut self) {
        self.position += 1;
    }

    pub fn next(&mut self) -> ParseResult<Token> {
        self.skip_whitespace();

        let Some(ch) = self.current() else {
            return Ok(Token::Eof);
        };

        match ch {
            '(' => self.single(Token::LeftParen),
            ')' => self.single(Token::RightParen),
            '[' => self.single(Token::LeftBracket),
            ']' => self.single(Token::RightBracket),
            ',' => self.single(Token::Comma),
            '.' => self.single(Token::Dot),
            '+' => self.single(Token::Plus),
            '-' => self.single(Token::Minus),
            '*' => self.single(Token::Star),
            '/' => self.single(Token::Slash),
            '%' => self.single(Token::Percent),
            '=' => {
                if self.peek() == Some('=') {
                    self.advance();
                    self.single(Token::Equal)
                } else {
                    Err(ParseError::UnexpectedChar('=', self.position))
                }
            }
            '!' => {
                if self.peek() == Some('=') {
                    self.advance();
                    self.single(Token::NotEqual)
                } else {
                    self.single(Token::Not)
                }
            }
            '<' => {
                if self.peek() == Some('=') {
                    self.advance();
                    self.single(Token::LessEqual)
                } else {
                    self.single(Token::Less)
                }
            }
            '>' => {
                if self.peek() == Some('=') {
                    self.advance();
                    self.single(Token::GreaterEqual)
                } else {
                    self.single(Token::Greater)
                }
            }
            '&' if self.peek() == Some('&') => {
                self.advance();
                self.single(Token::And)
            }
            '|' if self.peek() == Some('|') => {
                self.advance();
                self.single(Token::Or)
            }
            '\'' | '"' => self.read_string(ch),
            '0'..='9' => self.read_number(),
            c if c.is_alphabetic() || c == '_' || c == '$' => Ok(self.read_identifier()),
            _ => Err(ParseError::UnexpectedChar(ch, self.position)),
        }
    }

    fn single(&mut self, token: Token) -> ParseResult<Token> {
        self.advance();
        Ok(token)
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.current() {
            if ch.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn read_string(&mut self, quote: char) -> ParseResult<Token> {
        let start = self.position;
        self.advance(); // skip opening quote

        let mut value = String::new();
        loop {
            match self.current() {
                None => return Err(ParseError::UnterminatedString(start)),
                Some(c) if c == quote => break,
                Some('\\') => {
                    self.advance();
                    match self.current() {
                        Some('n') => value.push('\n'),
                        Some('t') => value.push('\t'),
                        Some('\\') => value.push('\\'),
                        Some(q) if q == '\'' || q == '"' => value.push(q),
                        _ => return Err(ParseError::InvalidEscape(self.position)),
                    }
                }
                Some(c) => value.push(c),
            }
            self.advance();
        }

        self.advance(); // skip closing quote
        Ok(Token::StringLiteral(value))
    }

    fn read_number(&mut self) -> ParseResult<Token> {
        let start = self.position;
        let mut is_float = false;

        while let Some(ch) = self.current() {
            if ch.is_ascii_digit() {
                self.advance();
            } else if ch == '.' && !is_float && self.peek().is_some_and(|c| c.is_ascii_digit()) {
                is_float = true;
                self.advance();
            } else {
                break;
            }
        }

        let text: String = self.input[start..self.position].iter().collect();
        if is_float {
            text.parse::<f64>()
                .map(Token::FloatLiteral)
                .map_err(|_| ParseError::InvalidNumber(start))
        } else {
            text.parse::<i64>()
                .map(Token::IntLiteral)
                .map_err(|_| ParseError::InvalidNumber(start))
        }
    }

    fn read_identifier(&mut self) -> Token {
        let start = self.position;

        while let Some(ch) = self.current() {
            if ch.is_alphanumeric() || ch == '_' || ch == '$' {
                self.advance();
            } else {
                break;
            }
        }

        let text: String = self.input[start..self.position].iter().collect();
        classify_identifier(text)
    }
}

fn classify_identifier(text: String) -> Token {
    match text.as_str() {
        "and" => Token::And,
        "or" => Token::Or,
        "not" => Token::Not,
        "eq" => Token::Equal,
        "neq" => Token::NotEqual,
        "lt" => Token::Less,
        "lte" => Token::LessEqual,
        "gt" => Token::Greater,
        "gte" => Token::GreaterEqual,
        "true" => Token::True,
        "false" => Token::False,
        "null" => Token::Null,
        _ => Token::Identifier(text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(input: &str) -> Vec<Token> {
        let mut lexer = Lexer::new(input);
        let mut out = Vec::new();
        loop {
            let token = lexer.next().unwrap();
            if token == Token::Eof {
                break;
            }
            out.push(token);
        }
        out
    }

    #[test]
    fn test_operators_and_keywords() {
        assert_eq!(
            tokens("a != null and b.size() gte 2"),
            vec![
                Token::Identifier("a".into()),
                Token::NotEqual,
                Token::Null,
                Token::And,
                Token::Identifier("b".into()),
                Token::Dot,
                Token::Identifier("size".into()),
                Token::LeftParen,
                Token::RightParen,
                Token::GreaterEqual,
                Token::IntLiteral(2),
            ]
        );
    }

    #[test]
    fn test_literals() {
        assert_eq!(
            tokens("'it\\'s' 1.5 42 \"x\""),
            vec![
                Token::StringLiteral("it's".into()),
                Token::FloatLiteral(1.5),
                Token::IntLiteral(42),
                Token::StringLiteral("x".into()),
            ]
        );
    }

    #[test]
    fn test_errors() {
        assert!(matches!(
            Lexer::new("'open").next(),
            Err(ParseError::UnterminatedString(0))
        ));
        let mut lexer = Lexer::new("a = b");
        assert_eq!(lexer.next().unwrap(), Token::Identifier("a".into()));
        assert!(matches!(lexer.next(), Err(ParseError::UnexpectedChar('=', 2))));
        assert!(matches!(Lexer::new("#").next(), Err(ParseError::UnexpectedChar('#', 0))));
    }
}
