// SPDX-FileCopyrightText: 2025 Jörg Thalheim
// SPDX-License-Identifier: MIT

//! Parser for textual filter expressions.
//!
//! ```text
//! expr  := term (logic term)*
//! term  := '(' expr ')' | field op value
//! value := number | string | null | '(' scalar (',' scalar)* ')'
//! logic := '&' | '&&' | 'and' | '|' | '||' | 'or'
//! ```
//!
//! Logic operators have no precedence; terms combine left to right.

use super::{Combinator, Filter, FilterExpr, FilterValue, LogicOp, Operator};
use crate::error::FilterError;
use crate::schema::SchemaRegistry;
use crate::value::Value;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Int(i64),
    Real(f64),
    Str(String),
    Symbol(&'static str),
    LParen,
    RParen,
    Comma,
}

const SYMBOLS: &[&str] = &[
    "%in%", "==", "!=", ">=", "<=", "&&", "||", "=", ">", "<", "&", "|",
];

fn error(position: usize, message: impl Into<String>) -> FilterError {
    FilterError::Parse {
        position,
        message: message.into(),
    }
}

fn tokenize(input: &str) -> Result<Vec<(usize, Token)>, FilterError> {
    let bytes = input.as_bytes();
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < bytes.len() {
        let c = bytes[pos];
        if c.is_ascii_whitespace() {
            pos += 1;
            continue;
        }
        let start = pos;
        match c {
            b'(' => {
                tokens.push((start, Token::LParen));
                pos += 1;
            }
            b')' => {
                tokens.push((start, Token::RParen));
                pos += 1;
            }
            b',' => {
                tokens.push((start, Token::Comma));
                pos += 1;
            }
            b'\'' | b'"' => {
                let mut text = String::new();
                let mut chars = input[pos + 1..].char_indices();
                let mut closed = false;
                while let Some((i, ch)) = chars.next() {
                    match ch {
                        '\\' => match chars.next() {
                            Some((_, escaped)) => text.push(escaped),
                            None => break,
                        },
                        ch if ch as u32 == c as u32 => {
                            pos += 1 + i + 1;
                            closed = true;
                            break;
                        }
                        ch => text.push(ch),
                    }
                }
                if !closed {
                    return Err(error(start, "unterminated string"));
                }
                tokens.push((start, Token::Str(text)));
            }
            b'0'..=b'9' | b'-' | b'.' => {
                pos += 1;
                while pos < bytes.len() {
                    let b = bytes[pos];
                    let exponent_sign =
                        (b == b'+' || b == b'-') && matches!(bytes[pos - 1], b'e' | b'E');
                    if b.is_ascii_digit() || matches!(b, b'.' | b'e' | b'E') || exponent_sign {
                        pos += 1;
                    } else {
                        break;
                    }
                }
                let literal = &input[start..pos];
                let token = if let Ok(i) = literal.parse::<i64>() {
                    Token::Int(i)
                } else if let Ok(r) = literal.parse::<f64>() {
                    Token::Real(r)
                } else {
                    return Err(error(start, format!("invalid number '{literal}'")));
                };
                tokens.push((start, token));
            }
            c if c.is_ascii_alphabetic() || c == b'_' => {
                while pos < bytes.len()
                    && (bytes[pos].is_ascii_alphanumeric() || matches!(bytes[pos], b'_' | b'.'))
                {
                    pos += 1;
                }
                tokens.push((start, Token::Ident(input[start..pos].to_owned())));
            }
            _ => {
                let Some(symbol) = SYMBOLS.iter().find(|s| input[pos..].starts_with(**s)) else {
                    return Err(error(start, format!("unexpected character '{}'", c as char)));
                };
                pos += symbol.len();
                tokens.push((start, Token::Symbol(*symbol)));
            }
        }
    }
    Ok(tokens)
}

struct Parser<'a> {
    registry: &'a SchemaRegistry,
    tokens: Vec<(usize, Token)>,
    cursor: usize,
    end: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.cursor).map(|(_, t)| t)
    }

    fn position(&self) -> usize {
        self.tokens
            .get(self.cursor)
            .map(|(p, _)| *p)
            .unwrap_or(self.end)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.cursor).map(|(_, t)| t.clone());
        if token.is_some() {
            self.cursor += 1;
        }
        token
    }

    fn logic(&self) -> Option<LogicOp> {
        match self.peek()? {
            Token::Symbol(s) => s.parse().ok(),
            Token::Ident(word) => word.parse().ok(),
            _ => None,
        }
    }

    fn expr(&mut self) -> Result<FilterExpr, FilterError> {
        let mut filters = vec![self.term()?];
        let mut ops = Vec::new();
        while let Some(op) = self.logic() {
            self.cursor += 1;
            ops.push(op);
            filters.push(self.term()?);
        }
        if filters.len() == 1 {
            return Ok(filters.remove(0));
        }
        Ok(Combinator::new(filters, ops)?.into())
    }

    fn term(&mut self) -> Result<FilterExpr, FilterError> {
        let position = self.position();
        match self.next() {
            Some(Token::LParen) => {
                let expr = self.expr()?;
                match self.next() {
                    Some(Token::RParen) => Ok(expr),
                    _ => Err(error(self.end_or(position), "expected ')'")),
                }
            }
            Some(Token::Ident(field)) => {
                let op = self.operator()?;
                let value = self.value(op)?;
                Ok(Filter::new(self.registry, &field, op, value)?.into())
            }
            _ => Err(error(position, "expected a field name or '('")),
        }
    }

    fn end_or(&self, fallback: usize) -> usize {
        self.tokens
            .get(self.cursor.saturating_sub(1))
            .map(|(p, _)| *p)
            .unwrap_or(fallback)
    }

    fn operator(&mut self) -> Result<Operator, FilterError> {
        let position = self.position();
        let token = match self.next() {
            Some(Token::Symbol(s)) => s.to_owned(),
            Some(Token::Ident(word)) => word,
            _ => return Err(error(position, "expected an operator")),
        };
        token
            .parse()
            .map_err(|_| error(position, format!("unknown operator '{token}'")))
    }

    fn value(&mut self, op: Operator) -> Result<FilterValue, FilterError> {
        if self.peek() == Some(&Token::LParen) {
            let position = self.position();
            self.cursor += 1;
            let mut values = vec![self.scalar()?];
            loop {
                match self.next() {
                    Some(Token::Comma) => values.push(self.scalar()?),
                    Some(Token::RParen) => break,
                    _ => return Err(error(position, "unterminated value list")),
                }
            }
            if !op.takes_set() && values.len() == 1 {
                return Ok(FilterValue::Scalar(values.remove(0)));
            }
            return Ok(FilterValue::Set(values));
        }
        Ok(FilterValue::Scalar(self.scalar()?))
    }

    fn scalar(&mut self) -> Result<Value, FilterError> {
        let position = self.position();
        match self.next() {
            Some(Token::Int(i)) => Ok(Value::Integer(i)),
            Some(Token::Real(r)) => Ok(Value::Real(r)),
            Some(Token::Str(s)) => Ok(Value::Text(s)),
            Some(Token::Ident(word)) if word.eq_ignore_ascii_case("null") => Ok(Value::Null),
            _ => Err(error(position, "expected a value")),
        }
    }
}

pub(super) fn parse(registry: &SchemaRegistry, input: &str) -> Result<FilterExpr, FilterError> {
    let tokens = tokenize(input)?;
    let mut parser = Parser {
        registry,
        tokens,
        cursor: 0,
        end: input.len(),
    };
    let expr = parser.expr()?;
    if parser.peek().is_some() {
        return Err(error(parser.position(), "unexpected trailing input"));
    }
    Ok(expr)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::schema::Table;

    fn parse_builtin(input: &str) -> Result<FilterExpr, FilterError> {
        parse(&SchemaRegistry::builtin(), input)
    }

    #[test]
    fn single_comparison() {
        let expr = parse_builtin("exactmass > 190").unwrap();
        let FilterExpr::Filter(filter) = expr else {
            panic!("expected a single filter");
        };
        assert_eq!(filter.column().column, "exactmass");
        assert_eq!(filter.op(), Operator::Gt);
        assert_eq!(filter.value(), &FilterValue::Scalar(Value::Integer(190)));
    }

    #[test]
    fn chain_is_left_to_right() {
        let expr =
            parse_builtin("name == 'Caffeine' | exactmass < 1e2 and ion_adduct startsWith \"[M\"")
                .unwrap();
        let FilterExpr::Combined(c) = &expr else {
            panic!("expected a combinator");
        };
        assert_eq!(c.filters().len(), 3);
        assert_eq!(c.ops(), [LogicOp::Or, LogicOp::And]);
        assert_eq!(expr.tables(), vec![Table::Compound, Table::Ion]);
    }

    #[test]
    fn parentheses_nest() {
        let expr = parse_builtin("name = 'a' & (exactmass > 1 | exactmass < -2.5)").unwrap();
        let FilterExpr::Combined(c) = &expr else {
            panic!("expected a combinator");
        };
        assert_eq!(c.ops(), [LogicOp::And]);
        assert!(matches!(c.filters()[1], FilterExpr::Combined(_)));
    }

    #[test]
    fn value_lists_and_null() {
        let expr = parse_builtin("compound_id %in% ('1', 2, \"x\") & formula != NULL").unwrap();
        let leaves = expr.leaves();
        assert_eq!(
            leaves[0].value(),
            &FilterValue::Set(vec![Value::from("1"), Value::from("2"), Value::from("x")])
        );
        assert_eq!(leaves[1].value(), &FilterValue::Scalar(Value::Null));
    }

    #[test]
    fn escaped_quotes() {
        let expr = parse_builtin(r"name contains 'O\'Brien'").unwrap();
        assert_eq!(
            expr.leaves()[0].value(),
            &FilterValue::Scalar(Value::from("O'Brien"))
        );
    }

    #[rstest]
    #[case("exactmass >", 11)]
    #[case("exactmass > 1 &", 15)]
    #[case("(exactmass > 1", 13)]
    #[case("name = 'open", 7)]
    #[case("exactmass ~ 3", 10)]
    #[case("exactmass > 1 name = 'a'", 14)]
    #[case("exactmass > 1 ^ 2", 14)]
    fn malformed_input_reports_position(#[case] input: &str, #[case] expected: usize) {
        match parse_builtin(input).unwrap_err() {
            FilterError::Parse { position, .. } => assert_eq!(position, expected, "{input}"),
            other => panic!("expected a parse error, got {other:?}"),
        }
    }

    #[test]
    fn semantic_errors_pass_through() {
        assert_eq!(
            parse_builtin("weight > 3").unwrap_err(),
            FilterError::UnknownField("weight".into())
        );
        assert!(matches!(
            parse_builtin("exactmass contains '19'").unwrap_err(),
            FilterError::IncompatibleOperator { .. }
        ));
    }
}
