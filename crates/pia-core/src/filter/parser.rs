//! Recursive-descent parser for the OData filter subset
//!
//! Precedence, loosest first: `or`, `and`, `not`, then comparisons,
//! `in`, function calls and lambdas. Binary operators are left-associative.

use super::ast::{CompareOp, Expr, FunctionName, Literal, Quantifier};
use super::lexer::{tokenize, Token, TokenKind};
use crate::error::SyntaxError;
use std::sync::Arc;

/// Nesting limit for groups and `not` chains
const MAX_DEPTH: usize = 64;

/// Limit on `and`/`or` operators in one filter. Chains build left-deep
/// trees, so this also bounds the depth every tree walk recurses to.
pub const MAX_OPERATORS: usize = 256;

/// Parse filter text. Empty or whitespace-only text means "no filter".
pub fn parse(text: &str) -> Result<Option<Arc<Expr>>, SyntaxError> {
    if text.trim().is_empty() {
        return Ok(None);
    }

    let tokens = tokenize(text)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
        operators: 0,
    };

    let expr = parser.parse_or()?;
    let next = parser.peek();
    if next.kind != TokenKind::Eof {
        let expected = if next.kind == TokenKind::RParen {
            "unbalanced closing parenthesis"
        } else {
            "expected 'and', 'or' or end of input"
        };
        return Err(SyntaxError::new(next.offset, expected).found(next.kind.to_string()));
    }

    Ok(Some(expr))
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
    operators: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_at(&self, ahead: usize) -> &TokenKind {
        &self.tokens[(self.pos + ahead).min(self.tokens.len() - 1)].kind
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn at_keyword(&self, keyword: &str) -> bool {
        matches!(&self.peek().kind, TokenKind::Ident(word) if word == keyword)
    }

    fn error(&self, expected: &str) -> SyntaxError {
        let next = self.peek();
        SyntaxError::new(next.offset, expected).found(next.kind.to_string())
    }

    fn expect(&mut self, kind: TokenKind, expected: &str) -> Result<Token, SyntaxError> {
        if self.peek().kind == kind {
            Ok(self.advance())
        } else {
            Err(self.error(expected))
        }
    }

    fn enter(&mut self) -> Result<(), SyntaxError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(self.error("filter nested too deeply"));
        }
        Ok(())
    }

    /// Consume an `and`/`or` keyword, counting it against the budget
    fn operator(&mut self) -> Result<(), SyntaxError> {
        self.operators += 1;
        if self.operators > MAX_OPERATORS {
            return Err(SyntaxError::new(self.peek().offset, "filter too long"));
        }
        self.advance();
        Ok(())
    }

    fn parse_or(&mut self) -> Result<Arc<Expr>, SyntaxError> {
        let mut left = self.parse_and()?;
        while self.at_keyword("or") {
            self.operator()?;
            let right = self.parse_and()?;
            left = Arc::new(Expr::or(left, right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Arc<Expr>, SyntaxError> {
        let mut left = self.parse_unary()?;
        while self.at_keyword("and") {
            self.operator()?;
            let right = self.parse_unary()?;
            left = Arc::new(Expr::and(left, right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Arc<Expr>, SyntaxError> {
        if self.at_keyword("not") {
            self.advance();
            self.enter()?;
            let operand = self.parse_unary()?;
            self.depth -= 1;
            return Ok(Arc::new(Expr::not(operand)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Arc<Expr>, SyntaxError> {
        let token = self.peek().clone();
        match &token.kind {
            TokenKind::LParen => {
                self.advance();
                self.enter()?;
                let inner = self.parse_or()?;
                self.depth -= 1;
                self.expect(TokenKind::RParen, "expected closing parenthesis")?;
                Ok(inner)
            }
            TokenKind::Ident(word) if word == "true" || word == "false" => {
                self.advance();
                Ok(Arc::new(Expr::Literal(Literal::Bool(word == "true"))))
            }
            TokenKind::Ident(word) => {
                if let Some(name) = FunctionName::from_keyword(word) {
                    if *self.peek_at(1) == TokenKind::LParen {
                        return self.parse_function(name);
                    }
                }
                self.parse_field_predicate()
            }
            TokenKind::Eof => Err(self.error("expected filter expression")),
            _ => Err(self.error("expected field name, function or '('")),
        }
    }

    /// `contains(Field, 'text')`
    fn parse_function(&mut self, name: FunctionName) -> Result<Arc<Expr>, SyntaxError> {
        self.advance();
        self.expect(TokenKind::LParen, "expected '('")?;
        let field = self.parse_field_path()?;
        self.expect(TokenKind::Comma, "expected ',' after field name")?;

        let token = self.advance();
        let value = match token.kind {
            TokenKind::Str(s) => Literal::String(s),
            other => {
                return Err(SyntaxError::new(
                    token.offset,
                    format!("expected string literal for {}()", name.as_str()),
                )
                .found(other.to_string()))
            }
        };

        self.expect(TokenKind::RParen, "expected closing parenthesis")?;
        Ok(Arc::new(Expr::Function { name, field, value }))
    }

    /// `Field op literal`, `Field in (...)` or `Path/any(v: ...)`
    fn parse_field_predicate(&mut self) -> Result<Arc<Expr>, SyntaxError> {
        let mut segments = vec![self.parse_ident("expected field name")?];

        while self.peek().kind == TokenKind::Slash {
            self.advance();
            let segment = self.parse_ident("expected field name after '/'")?;
            if let Some(quantifier) = Quantifier::from_keyword(&segment) {
                if self.peek().kind == TokenKind::LParen {
                    return self.parse_lambda(segments.join("/"), quantifier);
                }
            }
            segments.push(segment);
        }
        let field = segments.join("/");

        let op_token = self.peek().clone();
        let word = match &op_token.kind {
            TokenKind::Ident(word) => word.clone(),
            _ => return Err(self.error("expected comparison operator")),
        };

        if word == "in" {
            self.advance();
            let values = self.parse_literal_list()?;
            return Ok(Arc::new(Expr::ListMembership { field, values }));
        }

        match CompareOp::from_keyword(&word) {
            Some(op) => {
                self.advance();
                let value = self.parse_literal()?;
                Ok(Arc::new(Expr::Comparison { field, op, value }))
            }
            None => Err(SyntaxError::new(op_token.offset, "unknown operator")
                .found(format!("'{}'", word))),
        }
    }

    fn parse_lambda(
        &mut self,
        collection: String,
        quantifier: Quantifier,
    ) -> Result<Arc<Expr>, SyntaxError> {
        self.expect(TokenKind::LParen, "expected '('")?;
        let variable = self.parse_ident("expected lambda variable")?;
        self.expect(TokenKind::Colon, "expected ':' after lambda variable")?;
        self.enter()?;
        let predicate = self.parse_or()?;
        self.depth -= 1;
        self.expect(TokenKind::RParen, "expected closing parenthesis")?;
        Ok(Arc::new(Expr::Lambda {
            collection,
            quantifier,
            variable,
            predicate,
        }))
    }

    fn parse_field_path(&mut self) -> Result<String, SyntaxError> {
        let mut segments = vec![self.parse_ident("expected field name")?];
        while self.peek().kind == TokenKind::Slash {
            self.advance();
            segments.push(self.parse_ident("expected field name after '/'")?);
        }
        Ok(segments.join("/"))
    }

    fn parse_ident(&mut self, expected: &str) -> Result<String, SyntaxError> {
        match &self.peek().kind {
            TokenKind::Ident(name) if !is_reserved(name) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            _ => Err(self.error(expected)),
        }
    }

    fn parse_literal_list(&mut self) -> Result<Vec<Literal>, SyntaxError> {
        self.expect(TokenKind::LParen, "expected '(' after 'in'")?;
        let mut values = vec![self.parse_literal()?];
        while self.peek().kind == TokenKind::Comma {
            self.advance();
            values.push(self.parse_literal()?);
        }
        self.expect(TokenKind::RParen, "expected closing parenthesis")?;
        Ok(values)
    }

    fn parse_literal(&mut self) -> Result<Literal, SyntaxError> {
        let literal = match &self.peek().kind {
            TokenKind::Str(s) => Literal::String(s.clone()),
            TokenKind::Number(n) => Literal::Number(*n),
            TokenKind::Date(d) => Literal::Date(*d),
            TokenKind::Ident(word) if word == "true" => Literal::Bool(true),
            TokenKind::Ident(word) if word == "false" => Literal::Bool(false),
            _ => return Err(self.error("expected literal value")),
        };
        self.advance();
        Ok(literal)
    }
}

fn is_reserved(word: &str) -> bool {
    matches!(word, "and" | "or" | "not" | "in" | "true" | "false")
}
