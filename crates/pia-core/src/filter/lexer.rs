//! Tokenizer for filter text

use super::ast::DateValue;
use crate::error::SyntaxError;
use chrono::{DateTime, NaiveDate};
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    LParen,
    RParen,
    Comma,
    Colon,
    Slash,
    Ident(String),
    Str(String),
    Number(f64),
    Date(DateValue),
    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LParen => write!(f, "'('"),
            Self::RParen => write!(f, "')'"),
            Self::Comma => write!(f, "','"),
            Self::Colon => write!(f, "':'"),
            Self::Slash => write!(f, "'/'"),
            Self::Ident(name) => write!(f, "'{}'", name),
            Self::Str(_) => write!(f, "string literal"),
            Self::Number(_) => write!(f, "number"),
            Self::Date(_) => write!(f, "date"),
            Self::Eof => write!(f, "end of input"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub offset: usize,
}

/// Split filter text into tokens, ending with a single `Eof`
pub fn tokenize(text: &str) -> Result<Vec<Token>, SyntaxError> {
    let bytes = text.as_bytes();
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < bytes.len() {
        let c = bytes[pos];
        let start = pos;

        let kind = match c {
            b' ' | b'\t' | b'\r' | b'\n' => {
                pos += 1;
                continue;
            }
            b'(' => {
                pos += 1;
                TokenKind::LParen
            }
            b')' => {
                pos += 1;
                TokenKind::RParen
            }
            b',' => {
                pos += 1;
                TokenKind::Comma
            }
            b':' => {
                pos += 1;
                TokenKind::Colon
            }
            b'/' => {
                pos += 1;
                TokenKind::Slash
            }
            b'\'' => {
                let (value, end) = lex_string(text, pos)?;
                pos = end;
                TokenKind::Str(value)
            }
            b'0'..=b'9' => {
                let end = scan_bare(bytes, pos);
                let kind = classify_bare(&text[start..end], start)?;
                pos = end;
                kind
            }
            b'-' if bytes.get(pos + 1).is_some_and(u8::is_ascii_digit) => {
                let end = scan_bare(bytes, pos + 1);
                let kind = classify_bare(&text[start..end], start)?;
                pos = end;
                kind
            }
            c if c.is_ascii_alphabetic() || c == b'_' => {
                while pos < bytes.len() && (bytes[pos].is_ascii_alphanumeric() || bytes[pos] == b'_')
                {
                    pos += 1;
                }
                TokenKind::Ident(text[start..pos].to_string())
            }
            _ => {
                let ch = text[start..].chars().next().unwrap_or('?');
                return Err(SyntaxError::new(start, "unexpected character")
                    .found(format!("'{}'", ch)));
            }
        };

        tokens.push(Token {
            kind,
            offset: start,
        });
    }

    tokens.push(Token {
        kind: TokenKind::Eof,
        offset: text.len(),
    });
    Ok(tokens)
}

/// Lex a single-quoted string starting at `start`; `''` is an escaped quote
fn lex_string(text: &str, start: usize) -> Result<(String, usize), SyntaxError> {
    let mut value = String::new();
    let mut chars = text[start + 1..].char_indices().peekable();

    while let Some((i, ch)) = chars.next() {
        if ch == '\'' {
            if matches!(chars.peek(), Some((_, '\''))) {
                chars.next();
                value.push('\'');
            } else {
                return Ok((value, start + 1 + i + 1));
            }
        } else {
            value.push(ch);
        }
    }

    Err(SyntaxError::new(
        text.len(),
        "expected closing quote for string literal",
    ))
}

/// End of a bare numeric or date token
fn scan_bare(bytes: &[u8], mut pos: usize) -> usize {
    while pos < bytes.len() {
        match bytes[pos] {
            b'0'..=b'9' | b'a'..=b'z' | b'A'..=b'Z' | b'.' | b':' | b'+' | b'-' | b'_' => pos += 1,
            _ => break,
        }
    }
    pos
}

fn looks_like_date(raw: &str) -> bool {
    let b = raw.as_bytes();
    b.len() >= 10 && b[..4].iter().all(u8::is_ascii_digit) && b[4] == b'-'
}

fn classify_bare(raw: &str, offset: usize) -> Result<TokenKind, SyntaxError> {
    if looks_like_date(raw) {
        return parse_date(raw)
            .map(TokenKind::Date)
            .ok_or_else(|| {
                SyntaxError::new(offset, "malformed date literal").found(format!("'{}'", raw))
            });
    }

    if is_number_shape(raw) {
        if let Ok(value) = raw.parse::<f64>() {
            if value.is_finite() {
                return Ok(TokenKind::Number(value));
            }
        }
    }

    Err(SyntaxError::new(offset, "malformed numeric literal").found(format!("'{}'", raw)))
}

/// Parse `YYYY-MM-DD` or an RFC 3339 timestamp
pub fn parse_date(raw: &str) -> Option<DateValue> {
    if raw.len() == 10 {
        return NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .ok()
            .map(DateValue::Date);
    }
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(DateValue::DateTime)
}

/// `-?digits(.digits)?([eE][+-]?digits)?`
fn is_number_shape(raw: &str) -> bool {
    let b = raw.as_bytes();
    let mut i = 0;
    if b.first() == Some(&b'-') {
        i += 1;
    }

    let digits = |i: &mut usize| {
        let start = *i;
        while *i < b.len() && b[*i].is_ascii_digit() {
            *i += 1;
        }
        *i > start
    };

    if !digits(&mut i) {
        return false;
    }
    if i < b.len() && b[i] == b'.' {
        i += 1;
        if !digits(&mut i) {
            return false;
        }
    }
    if i < b.len() && (b[i] == b'e' || b[i] == b'E') {
        i += 1;
        if i < b.len() && (b[i] == b'+' || b[i] == b'-') {
            i += 1;
        }
        if !digits(&mut i) {
            return false;
        }
    }
    i == b.len()
}
