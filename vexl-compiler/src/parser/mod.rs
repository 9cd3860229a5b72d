use anyhow::{bail, Result};

use crate::ast::*;
use crate::diagnostics::Diagnostics;
use crate::lexer::{Token, TokenKind};
use crate::source::SourceFile;

#[derive(Copy, Clone, PartialEq, PartialOrd)]
enum Precedence {
    Lowest = 0,
    Equality,
    Comparison,
    Term,
    Factor,
    Unary,
    Power,
}

impl Precedence {
    fn of(kind: &TokenKind) -> Option<Self> {
        match kind {
            TokenKind::DoubleEqual | TokenKind::BangEqual => Some(Precedence::Equality),
            TokenKind::Greater
            | TokenKind::GreaterEqual
            | TokenKind::Less
            | TokenKind::LessEqual => Some(Precedence::Comparison),
            TokenKind::Plus | TokenKind::Minus => Some(Precedence::Term),
            TokenKind::Star | TokenKind::Slash | TokenKind::Percent => Some(Precedence::Factor),
            TokenKind::Caret => Some(Precedence::Power),
            _ => None,
        }
    }
}

pub struct Parser<'a> {
    _source: &'a SourceFile,
    tokens: Vec<Token>,
    current: usize,
    diagnostics: Diagnostics,
    next_call_id: usize,
}

impl<'a> Parser<'a> {
    pub fn new(source: &'a SourceFile, tokens: Vec<Token>) -> Self {
        Self {
            _source: source,
            tokens,
            current: 0,
            diagnostics: Diagnostics::new(),
            next_call_id: 0,
        }
    }

    fn span_from_token(token: &Token) -> SourceSpan {
        let len = token.lexeme.chars().count().max(1);
        SourceSpan::new(
            token.line,
            token.column,
            token.line,
            token.column + len.saturating_sub(1),
        )
    }

    fn make_expression(span: SourceSpan, kind: ExpressionKind) -> Expression {
        Expression { span, kind }
    }

    fn union_spans(a: &SourceSpan, b: &SourceSpan) -> SourceSpan {
        SourceSpan::union(a, b)
    }

    pub fn parse(&mut self) -> Result<Script> {
        let mut assignments = Vec::new();

        loop {
            if self.is_at_end() {
                let span = Self::span_from_token(self.peek());
                self.diagnostics
                    .push_error_with_span("expression has no result value", Some(span));
                bail!("expression has no result value");
            }

            if matches!(self.peek_kind(), TokenKind::Identifier)
                && matches!(self.peek_kind_at(1), Some(TokenKind::Equal))
            {
                assignments.push(self.parse_assignment()?);
                continue;
            }

            let result = self.parse_expression_prec(Precedence::Lowest)?;
            if matches!(self.peek_kind(), TokenKind::Semicolon) {
                self.advance();
            }
            if !self.is_at_end() {
                let token = self.peek().clone();
                self.diagnostics.push_error_with_span(
                    format!("unexpected '{}' after result expression", token.lexeme),
                    Some(Self::span_from_token(&token)),
                );
                bail!(
                    "unexpected '{}' at line {}, column {}",
                    token.lexeme,
                    token.line,
                    token.column
                );
            }
            return Ok(Script {
                assignments,
                result,
            });
        }
    }

    pub fn into_diagnostics(self) -> Diagnostics {
        self.diagnostics
    }

    fn allocate_call_id(&mut self) -> CallSiteId {
        let id = CallSiteId(self.next_call_id);
        self.next_call_id += 1;
        id
    }

    fn parse_assignment(&mut self) -> Result<Assignment> {
        let name_token = self.advance().clone();
        let name_span = Self::span_from_token(&name_token);
        self.advance(); // consume '='
        let value = self.parse_expression_prec(Precedence::Lowest)?;
        self.expect_token(TokenKind::Semicolon, "expected ';' after assignment")?;
        Ok(Assignment {
            name: name_token.lexeme,
            name_span,
            value,
        })
    }

    fn parse_expression_prec(&mut self, precedence: Precedence) -> Result<Expression> {
        let mut expr = self.parse_prefix_expression()?;

        loop {
            let next_precedence = match Precedence::of(self.peek_kind()) {
                Some(p) => p,
                None => break,
            };

            if precedence >= next_precedence {
                break;
            }

            expr = self.parse_infix_expression(expr, next_precedence)?;
        }

        Ok(expr)
    }

    fn parse_prefix_expression(&mut self) -> Result<Expression> {
        let token = self.advance().clone();
        let token_span = Self::span_from_token(&token);
        match token.kind {
            TokenKind::Identifier => {
                if matches!(self.peek_kind(), TokenKind::LParen) {
                    self.finish_call(token)
                } else {
                    Ok(Self::make_expression(
                        token_span,
                        ExpressionKind::Local(token.lexeme),
                    ))
                }
            }
            TokenKind::Variable(name) => Ok(Self::make_expression(
                token_span,
                ExpressionKind::Variable(name),
            )),
            TokenKind::NumberLiteral(value) => Ok(Self::make_expression(
                token_span,
                ExpressionKind::Number(value),
            )),
            TokenKind::StringLiteral(value) => Ok(Self::make_expression(
                token_span,
                ExpressionKind::String(value),
            )),
            TokenKind::Minus => {
                let operand = self.parse_expression_prec(Precedence::Unary)?;
                let span = Self::union_spans(&token_span, &operand.span);
                Ok(Self::make_expression(
                    span,
                    ExpressionKind::Unary(UnaryExpression {
                        operator: UnaryOperator::Negate,
                        operand: Box::new(operand),
                    }),
                ))
            }
            TokenKind::Plus => self.parse_expression_prec(Precedence::Unary),
            TokenKind::LParen => {
                let expr = self.parse_expression_prec(Precedence::Lowest)?;
                let closing_token = self.peek().clone();
                self.expect_token(TokenKind::RParen, "expected ')' after expression")?;
                let closing_span = Self::span_from_token(&closing_token);
                let span =
                    Self::union_spans(&token_span, &Self::union_spans(&expr.span, &closing_span));
                Ok(Self::make_expression(span, expr.kind))
            }
            TokenKind::LBracket => self.parse_vector_literal(token_span),
            other => {
                self.diagnostics.push_error_with_span(
                    format!("unexpected token '{}'", token.lexeme),
                    Some(token_span),
                );
                bail!(
                    "unexpected token {:?} at line {}, column {}",
                    other,
                    token.line,
                    token.column
                )
            }
        }
    }

    fn parse_vector_literal(&mut self, opening_span: SourceSpan) -> Result<Expression> {
        let mut elements = Vec::new();
        loop {
            let element = self.parse_expression_prec(Precedence::Lowest)?;
            elements.push(element);
            match self.peek_kind() {
                TokenKind::Comma => {
                    self.advance();
                }
                TokenKind::RBracket => {
                    let closing_token = self.advance().clone();
                    let span =
                        Self::union_spans(&opening_span, &Self::span_from_token(&closing_token));
                    return Ok(Self::make_expression(span, ExpressionKind::Vector(elements)));
                }
                _ => {
                    let token = self.peek().clone();
                    self.diagnostics.push_error_with_span(
                        format!("expected ',' or ']' in vector literal, found '{}'", token.lexeme),
                        Some(Self::span_from_token(&token)),
                    );
                    bail!("invalid vector literal separator");
                }
            }
        }
    }

    fn parse_infix_expression(
        &mut self,
        left: Expression,
        precedence: Precedence,
    ) -> Result<Expression> {
        let operator_token = self.advance().clone();
        let operator_span = Self::span_from_token(&operator_token);
        let operator = binary_operator_from_token(&operator_token.kind)?;
        // `^` is right-associative, everything else binds left.
        let right_precedence = if operator == BinaryOperator::Power {
            Precedence::Unary
        } else {
            precedence
        };
        let right = self.parse_expression_prec(right_precedence)?;
        let span = Self::union_spans(&Self::union_spans(&left.span, &operator_span), &right.span);
        Ok(Self::make_expression(
            span,
            ExpressionKind::Binary(BinaryExpression {
                operator,
                left: Box::new(left),
                right: Box::new(right),
            }),
        ))
    }

    fn expect_token(&mut self, expected: TokenKind, message: &str) -> Result<()> {
        if std::mem::discriminant(self.peek_kind()) == std::mem::discriminant(&expected) {
            self.advance();
            Ok(())
        } else {
            let token = self.peek().clone();
            self.diagnostics
                .push_error_with_span(message, Some(Self::span_from_token(&token)));
            bail!(
                "{} at line {}, column {} (found '{}')",
                message,
                token.line,
                token.column,
                token.lexeme
            );
        }
    }

    fn finish_call(&mut self, name_token: Token) -> Result<Expression> {
        let name_span = Self::span_from_token(&name_token);
        self.expect_token(TokenKind::LParen, "expected '(' to start argument list")?;
        let id = self.allocate_call_id();

        let mut arguments = Vec::new();
        if !matches!(self.peek_kind(), TokenKind::RParen) {
            loop {
                arguments.push(self.parse_expression_prec(Precedence::Lowest)?);
                match self.peek_kind() {
                    TokenKind::Comma => {
                        self.advance();
                    }
                    TokenKind::RParen => break,
                    _ => {
                        let token = self.peek().clone();
                        self.diagnostics.push_error_with_span(
                            format!(
                                "expected ',' or ')' in argument list, found '{}'",
                                token.lexeme
                            ),
                            Some(Self::span_from_token(&token)),
                        );
                        bail!("invalid argument separator");
                    }
                }
            }
        }

        let closing_token = self.advance().clone();
        let span = Self::union_spans(&name_span, &Self::span_from_token(&closing_token));
        Ok(Self::make_expression(
            span,
            ExpressionKind::Call(CallExpression {
                id,
                name: name_token.lexeme,
                name_span,
                arguments,
            }),
        ))
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.current]
    }

    fn peek_kind(&self) -> &TokenKind {
        &self.tokens[self.current].kind
    }

    fn peek_kind_at(&self, offset: usize) -> Option<TokenKind> {
        self.tokens
            .get(self.current + offset)
            .map(|token| token.kind.clone())
    }

    fn advance(&mut self) -> &Token {
        if !self.is_at_end() {
            self.current += 1;
        }
        &self.tokens[self.current - 1]
    }

    fn is_at_end(&self) -> bool {
        matches!(self.peek_kind(), TokenKind::Eof)
    }
}

fn binary_operator_from_token(kind: &TokenKind) -> Result<BinaryOperator> {
    let operator = match kind {
        TokenKind::Plus => BinaryOperator::Add,
        TokenKind::Minus => BinaryOperator::Subtract,
        TokenKind::Star => BinaryOperator::Multiply,
        TokenKind::Slash => BinaryOperator::Divide,
        TokenKind::Percent => BinaryOperator::Modulo,
        TokenKind::Caret => BinaryOperator::Power,
        TokenKind::DoubleEqual => BinaryOperator::Equal,
        TokenKind::BangEqual => BinaryOperator::NotEqual,
        TokenKind::Greater => BinaryOperator::Greater,
        TokenKind::GreaterEqual => BinaryOperator::GreaterEqual,
        TokenKind::Less => BinaryOperator::Less,
        TokenKind::LessEqual => BinaryOperator::LessEqual,
        other => bail!("unsupported binary operator {:?}", other),
    };
    Ok(operator)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;

    fn parse(source: &str) -> Result<Script> {
        let file = SourceFile::inline(source);
        let tokens = Lexer::new(&file).tokenize()?;
        Parser::new(&file, tokens).parse()
    }

    #[test]
    fn assignments_precede_result() {
        let script = parse("a = 1; b = a * 2; b + 1").expect("parse");
        assert_eq!(script.assignments.len(), 2);
        assert_eq!(script.assignments[1].name, "b");
        assert!(matches!(script.result.kind, ExpressionKind::Binary(_)));
    }

    #[test]
    fn power_is_right_associative_and_binds_tighter_than_negation() {
        let script = parse("-2 ^ 3 ^ 2").expect("parse");
        let ExpressionKind::Unary(negate) = &script.result.kind else {
            panic!("expected negation at the root, got {:?}", script.result.kind);
        };
        let ExpressionKind::Binary(power) = &negate.operand.kind else {
            panic!("expected power under negation");
        };
        assert_eq!(power.operator, BinaryOperator::Power);
        assert!(matches!(power.right.kind, ExpressionKind::Binary(_)));
    }

    #[test]
    fn call_sites_receive_distinct_ids() {
        let script = parse("add(add(1, 2), $x)").expect("parse");
        let ids: Vec<_> = script.call_sites().iter().map(|call| call.id).collect();
        assert_eq!(ids.len(), 2);
        assert_ne!(ids[0], ids[1]);
    }

    #[test]
    fn rejects_script_without_result() {
        assert!(parse("a = 1;").is_err());
    }

    #[test]
    fn rejects_trailing_tokens() {
        assert!(parse("1 2").is_err());
    }
}
