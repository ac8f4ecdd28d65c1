//! Predicate trees for Record rules
//!
//! Grammar, loosest binding first:
//!
//! ```text
//! or         := and (("OR" | "||" | "|") and)*
//! and        := not (("AND" | "&&" | "&") not)*
//! not        := ("NOT" | "!" | "~") not | comparison
//! comparison := operand (op operand)?
//! operand    := "(" or ")" | field | number | "quoted" | 'quoted' | `field` | true | false
//! op         := == | = | != | <> | < | <= | > | >=
//! ```
//!
//! Keywords are case-insensitive. A condition is compiled once per rule and
//! then evaluated against every row of the pool.

use claimscan_core::{ClaimRef, Value};
use std::borrow::Cow;
use std::fmt;

use crate::condition::{CompareOp, ConditionError};

/// Compiled boolean predicate
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Comparison {
        op: CompareOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Not(Box<Expr>),
    FieldRef(String),
    Literal(Value),
}

impl Expr {
    /// Compile a normalized condition string
    pub fn parse(condition: &str) -> Result<Self, ConditionError> {
        let tokens = tokenize(condition)?;
        let mut parser = Parser { tokens, pos: 0 };
        let expr = parser.parse_or()?;

        if let Some((token, offset)) = parser.tokens.get(parser.pos) {
            return Err(ConditionError::UnexpectedToken {
                found: token.to_string(),
                expected: "end of condition",
                offset: *offset,
            });
        }

        expr.check_boolean()?;
        Ok(expr)
    }

    /// Evaluate against one claim
    ///
    /// A comparison touching a missing column, a null, or two values of
    /// incompatible types is false.
    pub fn matches(&self, row: &ClaimRef<'_>) -> bool {
        match self {
            Expr::Comparison { op, left, right } => {
                match (left.resolve(row), right.resolve(row)) {
                    (Some(l), Some(r)) => op.test(l.compare(&r)),
                    _ => false,
                }
            }
            Expr::And(terms) => terms.iter().all(|t| t.matches(row)),
            Expr::Or(terms) => terms.iter().any(|t| t.matches(row)),
            Expr::Not(inner) => !inner.matches(row),
            Expr::FieldRef(name) => matches!(row.get(name), Some(Value::Bool(true))),
            Expr::Literal(value) => matches!(value, Value::Bool(true)),
        }
    }

    fn resolve<'v>(&'v self, row: &ClaimRef<'v>) -> Option<Cow<'v, Value>> {
        match self {
            Expr::FieldRef(name) => row.get(name).map(Cow::Borrowed),
            Expr::Literal(value) => Some(Cow::Borrowed(value)),
            other => Some(Cow::Owned(Value::Bool(other.matches(row)))),
        }
    }

    /// Columns referenced anywhere in the tree, in first-seen order
    pub fn fields(&self) -> Vec<&str> {
        let mut fields = Vec::new();
        self.collect_fields(&mut fields);
        fields
    }

    fn collect_fields<'a>(&'a self, fields: &mut Vec<&'a str>) {
        match self {
            Expr::Comparison { left, right, .. } => {
                left.collect_fields(fields);
                right.collect_fields(fields);
            }
            Expr::And(terms) | Expr::Or(terms) => {
                for term in terms {
                    term.collect_fields(fields);
                }
            }
            Expr::Not(inner) => inner.collect_fields(fields),
            Expr::FieldRef(name) => {
                if !fields.contains(&name.as_str()) {
                    fields.push(name);
                }
            }
            Expr::Literal(_) => {}
        }
    }

    /// Number and text literals cannot stand where a condition is expected
    fn check_boolean(&self) -> Result<(), ConditionError> {
        match self {
            Expr::And(terms) | Expr::Or(terms) => {
                terms.iter().try_for_each(|t| t.check_boolean())
            }
            Expr::Not(inner) => inner.check_boolean(),
            Expr::Literal(value @ (Value::Number(_) | Value::Text(_))) => {
                Err(ConditionError::NotBoolean(format!("literal `{}`", value)))
            }
            _ => Ok(()),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Comparison { op, left, right } => write!(f, "{} {} {}", left, op, right),
            Expr::And(terms) => write_joined(f, terms, " AND "),
            Expr::Or(terms) => write_joined(f, terms, " OR "),
            Expr::Not(inner) => write!(f, "NOT {}", inner),
            Expr::FieldRef(name) => f.write_str(name),
            Expr::Literal(Value::Text(s)) => write!(f, "\"{}\"", s),
            Expr::Literal(value) => write!(f, "{}", value),
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, terms: &[Expr], sep: &str) -> fmt::Result {
    f.write_str("(")?;
    for (i, term) in terms.iter().enumerate() {
        if i > 0 {
            f.write_str(sep)?;
        }
        write!(f, "{}", term)?;
    }
    f.write_str(")")
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Number(f64),
    Str(String),
    Bool(bool),
    Op(CompareOp),
    And,
    Or,
    Not,
    LParen,
    RParen,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Ident(name) => write!(f, "field `{}`", name),
            Token::Number(n) => write!(f, "number `{}`", n),
            Token::Str(s) => write!(f, "string \"{}\"", s),
            Token::Bool(b) => write!(f, "`{}`", b),
            Token::Op(op) => write!(f, "operator `{}`", op),
            Token::And => f.write_str("`AND`"),
            Token::Or => f.write_str("`OR`"),
            Token::Not => f.write_str("`NOT`"),
            Token::LParen => f.write_str("`(`"),
            Token::RParen => f.write_str("`)`"),
        }
    }
}

fn tokenize(src: &str) -> Result<Vec<(Token, usize)>, ConditionError> {
    let bytes = src.as_bytes();
    let mut tokens: Vec<(Token, usize)> = Vec::new();
    let mut cursor = 0;

    while cursor < bytes.len() {
        let start = cursor;
        let byte = bytes[cursor];
        let next = bytes.get(cursor + 1).copied();

        let token = match byte {
            b if b.is_ascii_whitespace() => {
                cursor += 1;
                continue;
            }
            b'(' => {
                cursor += 1;
                Token::LParen
            }
            b')' => {
                cursor += 1;
                Token::RParen
            }
            b'"' | b'\'' | b'`' => {
                let body = &src[cursor + 1..];
                let Some(len) = body.find(byte as char) else {
                    return Err(ConditionError::UnterminatedQuote(start));
                };
                cursor += len + 2;
                let text = body[..len].to_string();
                if byte == b'`' {
                    Token::Ident(text)
                } else {
                    Token::Str(text)
                }
            }
            b'=' => {
                cursor += if next == Some(b'=') { 2 } else { 1 };
                Token::Op(CompareOp::Eq)
            }
            b'!' => {
                if next == Some(b'=') {
                    cursor += 2;
                    Token::Op(CompareOp::Ne)
                } else {
                    cursor += 1;
                    Token::Not
                }
            }
            b'<' => match next {
                Some(b'=') => {
                    cursor += 2;
                    Token::Op(CompareOp::Le)
                }
                Some(b'>') => {
                    cursor += 2;
                    Token::Op(CompareOp::Ne)
                }
                _ => {
                    cursor += 1;
                    Token::Op(CompareOp::Lt)
                }
            },
            b'>' => {
                if next == Some(b'=') {
                    cursor += 2;
                    Token::Op(CompareOp::Ge)
                } else {
                    cursor += 1;
                    Token::Op(CompareOp::Gt)
                }
            }
            b'&' => {
                cursor += if next == Some(b'&') { 2 } else { 1 };
                Token::And
            }
            b'|' => {
                cursor += if next == Some(b'|') { 2 } else { 1 };
                Token::Or
            }
            b'~' => {
                cursor += 1;
                Token::Not
            }
            b'-' => {
                let operand_expected = matches!(
                    tokens.last(),
                    None | Some((
                        Token::Op(_) | Token::And | Token::Or | Token::Not | Token::LParen,
                        _
                    ))
                );
                let starts_number = next.is_some_and(|b| b.is_ascii_digit() || b == b'.');
                if !(operand_expected && starts_number) {
                    return Err(ConditionError::Arithmetic(start));
                }
                let (value, end) = lex_number(src, cursor + 1)?;
                cursor = end;
                Token::Number(-value)
            }
            b if b.is_ascii_digit() || (b == b'.' && next.is_some_and(|n| n.is_ascii_digit())) => {
                let (value, end) = lex_number(src, cursor)?;
                cursor = end;
                Token::Number(value)
            }
            b if b.is_ascii_alphabetic() || b == b'_' => {
                while cursor < bytes.len()
                    && (bytes[cursor].is_ascii_alphanumeric()
                        || bytes[cursor] == b'_'
                        || bytes[cursor] == b'.')
                {
                    cursor += 1;
                }
                let word = &src[start..cursor];
                match word.to_ascii_lowercase().as_str() {
                    "and" => Token::And,
                    "or" => Token::Or,
                    "not" => Token::Not,
                    "true" => Token::Bool(true),
                    "false" => Token::Bool(false),
                    _ => Token::Ident(word.to_string()),
                }
            }
            _ => {
                let ch = src[cursor..].chars().next().unwrap_or('\u{fffd}');
                return Err(ConditionError::UnexpectedChar { ch, offset: start });
            }
        };

        tokens.push((token, start));
    }

    Ok(tokens)
}

fn lex_number(src: &str, start: usize) -> Result<(f64, usize), ConditionError> {
    let bytes = src.as_bytes();
    let mut end = start;
    let mut seen_dot = false;
    while end < bytes.len() {
        match bytes[end] {
            b'0'..=b'9' => end += 1,
            b'.' if !seen_dot => {
                seen_dot = true;
                end += 1;
            }
            _ => break,
        }
    }

    if bytes
        .get(end)
        .is_some_and(|b| b.is_ascii_alphabetic() || *b == b'_')
    {
        let ch = src[end..].chars().next().unwrap_or('\u{fffd}');
        return Err(ConditionError::UnexpectedChar { ch, offset: end });
    }

    src[start..end]
        .parse::<f64>()
        .map(|value| (value, end))
        .map_err(|_| ConditionError::UnexpectedToken {
            found: format!("`{}`", &src[start..end]),
            expected: "a number",
            offset: start,
        })
}

struct Parser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn parse_or(&mut self) -> Result<Expr, ConditionError> {
        let mut terms = vec![self.parse_and()?];
        while self.eat(&Token::Or) {
            terms.push(self.parse_and()?);
        }
        Ok(collapse(terms, Expr::Or))
    }

    fn parse_and(&mut self) -> Result<Expr, ConditionError> {
        let mut terms = vec![self.parse_not()?];
        while self.eat(&Token::And) {
            terms.push(self.parse_not()?);
        }
        Ok(collapse(terms, Expr::And))
    }

    fn parse_not(&mut self) -> Result<Expr, ConditionError> {
        if self.eat(&Token::Not) {
            return Ok(Expr::Not(Box::new(self.parse_not()?)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr, ConditionError> {
        let left = self.parse_operand()?;

        let Some(Token::Op(op)) = self.peek().cloned() else {
            return Ok(left);
        };
        self.pos += 1;
        let right = self.parse_operand()?;

        if let Some((Token::Op(_), offset)) = self.tokens.get(self.pos) {
            return Err(ConditionError::ChainedComparison(*offset));
        }

        Ok(Expr::Comparison {
            op,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    fn parse_operand(&mut self) -> Result<Expr, ConditionError> {
        const EXPECTED: &str = "a field, literal or `(`";

        let Some((token, offset)) = self.tokens.get(self.pos).cloned() else {
            return Err(ConditionError::UnexpectedEnd(EXPECTED));
        };
        self.pos += 1;

        match token {
            Token::LParen => {
                let inner = self.parse_or()?;
                if !self.eat(&Token::RParen) {
                    return match self.tokens.get(self.pos) {
                        Some((found, offset)) => Err(ConditionError::UnexpectedToken {
                            found: found.to_string(),
                            expected: "`)`",
                            offset: *offset,
                        }),
                        None => Err(ConditionError::UnexpectedEnd("`)`")),
                    };
                }
                Ok(inner)
            }
            Token::Ident(name) => Ok(Expr::FieldRef(name)),
            Token::Number(n) => Ok(Expr::Literal(Value::Number(n))),
            Token::Str(s) => Ok(Expr::Literal(Value::Text(s))),
            Token::Bool(b) => Ok(Expr::Literal(Value::Bool(b))),
            other => Err(ConditionError::UnexpectedToken {
                found: other.to_string(),
                expected: EXPECTED,
                offset,
            }),
        }
    }
}

fn collapse(mut terms: Vec<Expr>, combine: fn(Vec<Expr>) -> Expr) -> Expr {
    if terms.len() == 1 {
        terms.remove(0)
    } else {
        combine(terms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use claimscan_core::ClaimTable;

    fn table() -> ClaimTable {
        ClaimTable::from_records(vec![vec![
            ("claim_id", Value::from("C1")),
            ("paid_amount", Value::from(1500.0)),
            ("status", Value::from("A=B")),
            ("flagged", Value::from(true)),
            ("claim_service_from", Value::Date(chrono::NaiveDate::from_ymd_opt(2024, 3, 10).unwrap())),
            ("allowed_amount", Value::from(1200.0)),
            ("note", Value::Null),
        ]])
    }

    fn eval(condition: &str) -> bool {
        let table = table();
        let row = table.row(0).unwrap();
        Expr::parse(condition).unwrap().matches(&row)
    }

    #[test]
    fn test_simple_comparisons() {
        assert!(eval("paid_amount > 1000"));
        assert!(!eval("paid_amount < 1000"));
        assert!(eval("paid_amount >= 1500 and paid_amount <= 1500"));
        assert!(eval(r#"status == "A=B""#));
        assert!(eval("claim_id != 'C2'"));
    }

    #[test]
    fn test_boolean_structure() {
        assert!(eval("paid_amount > 2000 OR (status == 'A=B' AND NOT paid_amount < 10)"));
        assert!(!eval("paid_amount > 2000 || claim_id == 'C9'"));
        assert!(eval("flagged"));
        assert!(eval("flagged == true"));
        assert!(eval("~(paid_amount < 0)"));
    }

    #[test]
    fn test_field_to_field() {
        assert!(eval("paid_amount > allowed_amount"));
        assert!(!eval("paid_amount == allowed_amount"));
    }

    #[test]
    fn test_missing_and_mismatched_are_false() {
        assert!(!eval("unknown_column > 1"));
        assert!(!eval("unknown_column != 1"));
        assert!(!eval("paid_amount == '1500'"));
        assert!(!eval("paid_amount != '1500'"));
        assert!(!eval("note == ''"));
    }

    #[test]
    fn test_dates_against_text_literals() {
        assert!(eval("claim_service_from >= '2024-03-01'"));
        assert!(!eval("claim_service_from > '2024-12-31'"));
        assert!(!eval("claim_service_from > 'soon'"));
    }

    #[test]
    fn test_negative_numbers() {
        assert!(eval("paid_amount > -5"));
        assert_eq!(
            Expr::parse("paid_amount - allowed_amount > 3"),
            Err(ConditionError::Arithmetic(12))
        );
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            Expr::parse("paid_amount >"),
            Err(ConditionError::UnexpectedEnd(_))
        ));
        assert!(matches!(
            Expr::parse("(paid_amount > 1"),
            Err(ConditionError::UnexpectedEnd("`)`"))
        ));
        assert!(matches!(
            Expr::parse("1 < paid_amount < 5"),
            Err(ConditionError::ChainedComparison(_))
        ));
        assert!(matches!(
            Expr::parse("paid_amount > 1 2"),
            Err(ConditionError::UnexpectedToken { .. })
        ));
        assert!(matches!(
            Expr::parse("paid_amount $ 1"),
            Err(ConditionError::UnexpectedChar { ch: '$', .. })
        ));
        assert!(matches!(Expr::parse("42"), Err(ConditionError::NotBoolean(_))));
        assert!(matches!(
            Expr::parse("status == 'open"),
            Err(ConditionError::UnterminatedQuote(10))
        ));
    }

    #[test]
    fn test_fields_and_display() {
        let expr = Expr::parse("a > 1 AND (b == 'x' OR a < c)").unwrap();
        assert_eq!(expr.fields(), vec!["a", "b", "c"]);
        assert_eq!(expr.to_string(), "(a > 1 AND (b == \"x\" OR a < c))");
    }
}
