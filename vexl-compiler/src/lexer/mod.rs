use thiserror::Error;

use crate::source::SourceFile;

#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub line: usize,
    pub column: usize,
}

impl Token {
    fn new(kind: TokenKind, lexeme: String, line: usize, column: usize) -> Self {
        Self {
            kind,
            lexeme,
            line,
            column,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Identifier,
    /// `$name`; the lexeme keeps the sigil, the payload does not.
    Variable(String),
    NumberLiteral(f64),
    StringLiteral(String),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Semicolon,
    Equal,
    DoubleEqual,
    BangEqual,
    Greater,
    GreaterEqual,
    Less,
    LessEqual,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Caret,
    Eof,
}

#[derive(Debug, Clone, Error)]
#[error("{message} at line {line}, column {column}")]
pub struct LexerError {
    message: String,
    line: usize,
    column: usize,
}

impl LexerError {
    fn new<S: Into<String>>(message: S, line: usize, column: usize) -> Self {
        Self {
            message: message.into(),
            line,
            column,
        }
    }

    pub fn line(&self) -> usize {
        self.line
    }

    pub fn column(&self) -> usize {
        self.column
    }
}

pub struct Lexer<'a> {
    input: &'a str,
    position: usize,
    line: usize,
    column: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a SourceFile) -> Self {
        Self {
            input: &source.contents,
            position: 0,
            line: 1,
            column: 1,
        }
    }

    pub fn tokenize(&mut self) -> Result<Vec<Token>, LexerError> {
        let mut tokens = Vec::new();

        while let Some(ch) = self.peek_char() {
            match ch {
                ' ' | '\t' | '\r' | '\n' => {
                    self.advance_char();
                }
                '#' => {
                    self.skip_comment();
                }
                '"' | '\'' => {
                    let token = self.lex_string(ch)?;
                    tokens.push(token);
                }
                '0'..='9' => {
                    let token = self.lex_number()?;
                    tokens.push(token);
                }
                '.' if matches!(self.peek_next_char(), Some('0'..='9')) => {
                    let token = self.lex_number()?;
                    tokens.push(token);
                }
                'a'..='z' | 'A'..='Z' | '_' => {
                    let token = self.lex_identifier();
                    tokens.push(token);
                }
                '$' => {
                    let token = self.lex_variable()?;
                    tokens.push(token);
                }
                '(' => tokens.push(self.simple_token(TokenKind::LParen)),
                ')' => tokens.push(self.simple_token(TokenKind::RParen)),
                '[' => tokens.push(self.simple_token(TokenKind::LBracket)),
                ']' => tokens.push(self.simple_token(TokenKind::RBracket)),
                ',' => tokens.push(self.simple_token(TokenKind::Comma)),
                ';' => tokens.push(self.simple_token(TokenKind::Semicolon)),
                '+' => tokens.push(self.simple_token(TokenKind::Plus)),
                '-' => tokens.push(self.simple_token(TokenKind::Minus)),
                '*' => tokens.push(self.simple_token(TokenKind::Star)),
                '/' => tokens.push(self.simple_token(TokenKind::Slash)),
                '%' => tokens.push(self.simple_token(TokenKind::Percent)),
                '^' => tokens.push(self.simple_token(TokenKind::Caret)),
                '=' => {
                    let token = self.lex_pair('=', TokenKind::DoubleEqual, TokenKind::Equal);
                    tokens.push(token);
                }
                '<' => {
                    let token = self.lex_pair('=', TokenKind::LessEqual, TokenKind::Less);
                    tokens.push(token);
                }
                '>' => {
                    let token = self.lex_pair('=', TokenKind::GreaterEqual, TokenKind::Greater);
                    tokens.push(token);
                }
                '!' => {
                    if self.peek_next_char() != Some('=') {
                        return Err(LexerError::new(
                            "Unexpected character '!'",
                            self.line,
                            self.column,
                        ));
                    }
                    let token = self.lex_pair('=', TokenKind::BangEqual, TokenKind::BangEqual);
                    tokens.push(token);
                }
                other => {
                    return Err(LexerError::new(
                        format!("Unexpected character '{other}'"),
                        self.line,
                        self.column,
                    ));
                }
            }
        }

        tokens.push(Token::new(
            TokenKind::Eof,
            String::new(),
            self.line,
            self.column,
        ));

        Ok(tokens)
    }

    fn skip_comment(&mut self) {
        while let Some(ch) = self.peek_char() {
            if ch == '\n' {
                break;
            }
            self.advance_char();
        }
    }

    fn lex_string(&mut self, quote: char) -> Result<Token, LexerError> {
        let start = self.position;
        let start_line = self.line;
        let start_column = self.column;
        self.advance_char(); // consume opening quote

        let mut value = String::new();
        while let Some(ch) = self.peek_char() {
            match ch {
                c if c == quote => {
                    self.advance_char(); // consume closing quote
                    let lexeme = self.slice(start, self.position);
                    return Ok(Token::new(
                        TokenKind::StringLiteral(value),
                        lexeme.to_string(),
                        start_line,
                        start_column,
                    ));
                }
                '\\' => {
                    self.advance_char();
                    let escaped = self.peek_char().ok_or_else(|| {
                        LexerError::new(
                            "Unterminated escape sequence in string literal",
                            self.line,
                            self.column,
                        )
                    })?;
                    let escaped_char = match escaped {
                        'n' => '\n',
                        'r' => '\r',
                        't' => '\t',
                        other => other,
                    };
                    value.push(escaped_char);
                    self.advance_char();
                }
                '\n' => break,
                _ => {
                    value.push(ch);
                    self.advance_char();
                }
            }
        }

        Err(LexerError::new(
            "Unterminated string literal",
            start_line,
            start_column,
        ))
    }

    fn lex_number(&mut self) -> Result<Token, LexerError> {
        let start = self.position;
        let start_line = self.line;
        let start_column = self.column;
        let mut seen_dot = false;
        let mut seen_exponent = false;

        while let Some(ch) = self.peek_char() {
            match ch {
                '0'..='9' | '_' => {
                    self.advance_char();
                }
                '.' if !seen_dot && !seen_exponent => {
                    seen_dot = true;
                    self.advance_char();
                }
                'e' | 'E' if !seen_exponent => {
                    seen_exponent = true;
                    self.advance_char();
                    if matches!(self.peek_char(), Some('+') | Some('-')) {
                        self.advance_char();
                    }
                }
                _ => break,
            }
        }

        let lexeme = self.slice(start, self.position).to_string();
        let value = lexeme.replace('_', "").parse::<f64>().map_err(|_| {
            LexerError::new(
                format!("Failed to parse number literal '{lexeme}'"),
                start_line,
                start_column,
            )
        })?;
        Ok(Token::new(
            TokenKind::NumberLiteral(value),
            lexeme,
            start_line,
            start_column,
        ))
    }

    fn lex_identifier(&mut self) -> Token {
        let start = self.position;
        let start_line = self.line;
        let start_column = self.column;
        self.advance_char();
        self.consume_identifier_tail();

        let lexeme = self.slice(start, self.position).to_string();
        Token::new(TokenKind::Identifier, lexeme, start_line, start_column)
    }

    fn lex_variable(&mut self) -> Result<Token, LexerError> {
        let start = self.position;
        let start_line = self.line;
        let start_column = self.column;
        self.advance_char(); // consume '$'

        match self.peek_char() {
            Some(ch) if ch.is_ascii_alphabetic() || ch == '_' => {}
            _ => {
                return Err(LexerError::new(
                    "Expected a variable name after '$'",
                    start_line,
                    start_column,
                ))
            }
        }
        self.consume_identifier_tail();

        let lexeme = self.slice(start, self.position).to_string();
        let name = lexeme[1..].to_string();
        Ok(Token::new(
            TokenKind::Variable(name),
            lexeme,
            start_line,
            start_column,
        ))
    }

    fn consume_identifier_tail(&mut self) {
        while let Some(ch) = self.peek_char() {
            if ch.is_ascii_alphanumeric() || ch == '_' {
                self.advance_char();
            } else {
                break;
            }
        }
    }

    fn lex_pair(&mut self, second: char, paired: TokenKind, single: TokenKind) -> Token {
        let start_line = self.line;
        let start_column = self.column;
        let start = self.position;
        self.advance_char();

        let kind = if self.peek_char() == Some(second) {
            self.advance_char();
            paired
        } else {
            single
        };
        Token::new(
            kind,
            self.slice(start, self.position).to_string(),
            start_line,
            start_column,
        )
    }

    fn simple_token(&mut self, kind: TokenKind) -> Token {
        let start_line = self.line;
        let start_column = self.column;
        let start = self.position;
        self.advance_char();
        Token::new(
            kind,
            self.slice(start, self.position).to_string(),
            start_line,
            start_column,
        )
    }

    fn peek_char(&self) -> Option<char> {
        self.input[self.position..].chars().next()
    }

    fn peek_next_char(&self) -> Option<char> {
        let mut chars = self.input[self.position..].chars();
        chars.next();
        chars.next()
    }

    fn advance_char(&mut self) -> Option<char> {
        let ch = self.peek_char()?;
        self.position += ch.len_utf8();
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(ch)
    }

    fn slice(&self, start: usize, end: usize) -> &str {
        &self.input[start..end]
    }
}
