//! Structured filter expressions for the query layer.
//!
//! A deliberately small grammar: comparison operators over literal
//! column references, combined with boolean connectives. Nothing in a
//! filter can reach outside the record being tested.
//!
//! ```text
//! expr    := or
//! or      := and ( ("||" | "or") and )*
//! and     := unary ( ("&&" | "and") unary )*
//! unary   := ("!" | "not") unary | cmp
//! cmp     := primary ( ("==" | "!=" | "<" | "<=" | ">" | ">=") primary )?
//! primary := "(" expr ")" | literal | column
//! ```
//!
//! Referencing a column a record does not carry is a query error, not a
//! silent drop. Equality across mismatched types is simply `false`;
//! ordering across mismatched types is a query error.

use serde_json::Value;

use crate::error::CatalogError;
use crate::models::Record;

/// A parsed filter expression, ready to evaluate against records.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Column(String),
    Literal(Value),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Cmp(CmpOp, Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Expr {
    /// Parse a filter expression.
    pub fn parse(input: &str) -> Result<Expr, CatalogError> {
        let tokens = tokenize(input)?;
        let mut parser = Parser { tokens, pos: 0 };
        let expr = parser.parse_or()?;
        if parser.pos != parser.tokens.len() {
            return Err(invalid(format!(
                "unexpected trailing input at token {:?}",
                parser.tokens[parser.pos]
            )));
        }
        Ok(expr)
    }

    /// Evaluate this expression against one record as a boolean predicate.
    pub fn matches(&self, record: &Record) -> Result<bool, CatalogError> {
        match self.eval(record)? {
            Value::Bool(b) => Ok(b),
            other => Err(invalid(format!(
                "filter must evaluate to a boolean, got {other}"
            ))),
        }
    }

    fn eval(&self, record: &Record) -> Result<Value, CatalogError> {
        match self {
            Expr::Literal(v) => Ok(v.clone()),
            Expr::Column(name) => record
                .get(name)
                .cloned()
                .ok_or_else(|| invalid(format!("unknown column {name:?}"))),
            Expr::Not(inner) => match inner.eval(record)? {
                Value::Bool(b) => Ok(Value::Bool(!b)),
                other => Err(invalid(format!("cannot negate {other}"))),
            },
            Expr::And(lhs, rhs) => {
                let l = as_bool(lhs.eval(record)?)?;
                if !l {
                    return Ok(Value::Bool(false));
                }
                Ok(Value::Bool(as_bool(rhs.eval(record)?)?))
            }
            Expr::Or(lhs, rhs) => {
                let l = as_bool(lhs.eval(record)?)?;
                if l {
                    return Ok(Value::Bool(true));
                }
                Ok(Value::Bool(as_bool(rhs.eval(record)?)?))
            }
            Expr::Cmp(op, lhs, rhs) => {
                let l = lhs.eval(record)?;
                let r = rhs.eval(record)?;
                compare(*op, &l, &r).map(Value::Bool)
            }
        }
    }
}

fn as_bool(value: Value) -> Result<bool, CatalogError> {
    match value {
        Value::Bool(b) => Ok(b),
        other => Err(invalid(format!("expected a boolean, got {other}"))),
    }
}

fn compare(op: CmpOp, lhs: &Value, rhs: &Value) -> Result<bool, CatalogError> {
    use std::cmp::Ordering;

    // Equality works across all value shapes; mismatched types are unequal.
    match op {
        CmpOp::Eq | CmpOp::Ne => {
            let equal = match (lhs.as_f64(), rhs.as_f64()) {
                (Some(a), Some(b)) => a == b,
                _ => lhs == rhs,
            };
            return Ok(if op == CmpOp::Eq { equal } else { !equal });
        }
        _ => {}
    }

    let ordering: Ordering = match (lhs, rhs) {
        (Value::Number(_), Value::Number(_)) => {
            let a = lhs.as_f64().unwrap_or(f64::NAN);
            let b = rhs.as_f64().unwrap_or(f64::NAN);
            a.partial_cmp(&b)
                .ok_or_else(|| invalid("cannot order NaN".to_string()))?
        }
        (Value::String(a), Value::String(b)) => a.cmp(b),
        _ => {
            return Err(invalid(format!(
                "cannot order {lhs} against {rhs}"
            )))
        }
    };

    Ok(match op {
        CmpOp::Lt => ordering == Ordering::Less,
        CmpOp::Le => ordering != Ordering::Greater,
        CmpOp::Gt => ordering == Ordering::Greater,
        CmpOp::Ge => ordering != Ordering::Less,
        CmpOp::Eq | CmpOp::Ne => unreachable!(),
    })
}

fn invalid(msg: String) -> CatalogError {
    CatalogError::InvalidQuery(msg)
}

// ───────────────────────── lexer ─────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Literal(Value),
    Op(CmpOp),
    AndAnd,
    OrOr,
    Bang,
    LParen,
    RParen,
}

fn tokenize(input: &str) -> Result<Vec<Token>, CatalogError> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\n' | '\r' => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '&' => {
                if chars.get(i + 1) == Some(&'&') {
                    tokens.push(Token::AndAnd);
                    i += 2;
                } else {
                    return Err(invalid("expected '&&'".to_string()));
                }
            }
            '|' => {
                if chars.get(i + 1) == Some(&'|') {
                    tokens.push(Token::OrOr);
                    i += 2;
                } else {
                    return Err(invalid("expected '||'".to_string()));
                }
            }
            '=' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Op(CmpOp::Eq));
                    i += 2;
                } else {
                    return Err(invalid("expected '=='".to_string()));
                }
            }
            '!' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Op(CmpOp::Ne));
                    i += 2;
                } else {
                    tokens.push(Token::Bang);
                    i += 1;
                }
            }
            '<' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Op(CmpOp::Le));
                    i += 2;
                } else {
                    tokens.push(Token::Op(CmpOp::Lt));
                    i += 1;
                }
            }
            '>' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Op(CmpOp::Ge));
                    i += 2;
                } else {
                    tokens.push(Token::Op(CmpOp::Gt));
                    i += 1;
                }
            }
            '"' | '\'' => {
                let quote = c;
                let start = i + 1;
                let mut end = start;
                while end < chars.len() && chars[end] != quote {
                    end += 1;
                }
                if end == chars.len() {
                    return Err(invalid("unterminated string literal".to_string()));
                }
                let s: String = chars[start..end].iter().collect();
                tokens.push(Token::Literal(Value::String(s)));
                i = end + 1;
            }
            c if c.is_ascii_digit() || c == '-' => {
                let start = i;
                i += 1;
                while i < chars.len()
                    && (chars[i].is_ascii_digit()
                        || chars[i] == '.'
                        || chars[i] == 'e'
                        || chars[i] == 'E'
                        || chars[i] == '+'
                        || (chars[i] == '-' && matches!(chars[i - 1], 'e' | 'E')))
                {
                    i += 1;
                }
                let raw: String = chars[start..i].iter().collect();
                let number = parse_number(&raw)?;
                tokens.push(Token::Literal(number));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                tokens.push(match word.as_str() {
                    "true" => Token::Literal(Value::Bool(true)),
                    "false" => Token::Literal(Value::Bool(false)),
                    "null" => Token::Literal(Value::Null),
                    "and" => Token::AndAnd,
                    "or" => Token::OrOr,
                    "not" => Token::Bang,
                    _ => Token::Ident(word),
                });
            }
            other => return Err(invalid(format!("unexpected character {other:?}"))),
        }
    }

    Ok(tokens)
}

fn parse_number(raw: &str) -> Result<Value, CatalogError> {
    if !raw.contains('.') && !raw.contains('e') && !raw.contains('E') {
        if let Ok(n) = raw.parse::<i64>() {
            return Ok(Value::from(n));
        }
    }
    raw.parse::<f64>()
        .map(Value::from)
        .map_err(|_| invalid(format!("invalid number {raw:?}")))
}

// ───────────────────────── parser ─────────────────────────

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn parse_or(&mut self) -> Result<Expr, CatalogError> {
        let mut lhs = self.parse_and()?;
        while self.peek() == Some(&Token::OrOr) {
            self.bump();
            let rhs = self.parse_and()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, CatalogError> {
        let mut lhs = self.parse_unary()?;
        while self.peek() == Some(&Token::AndAnd) {
            self.bump();
            let rhs = self.parse_unary()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, CatalogError> {
        if self.peek() == Some(&Token::Bang) {
            self.bump();
            let inner = self.parse_unary()?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_cmp()
    }

    fn parse_cmp(&mut self) -> Result<Expr, CatalogError> {
        let lhs = self.parse_primary()?;
        if let Some(Token::Op(op)) = self.peek().cloned() {
            self.bump();
            let rhs = self.parse_primary()?;
            return Ok(Expr::Cmp(op, Box::new(lhs), Box::new(rhs)));
        }
        Ok(lhs)
    }

    fn parse_primary(&mut self) -> Result<Expr, CatalogError> {
        match self.bump() {
            Some(Token::LParen) => {
                let expr = self.parse_or()?;
                match self.bump() {
                    Some(Token::RParen) => Ok(expr),
                    _ => Err(invalid("expected ')'".to_string())),
                }
            }
            Some(Token::Literal(v)) => Ok(Expr::Literal(v)),
            Some(Token::Ident(name)) => Ok(Expr::Column(name)),
            Some(tok) => Err(invalid(format!("unexpected token {tok:?}"))),
            None => Err(invalid("unexpected end of filter".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(pairs: &[(&str, Value)]) -> Record {
        let mut rec = Record::new();
        for (col, val) in pairs {
            rec.insert(*col, val.clone());
        }
        rec
    }

    fn sample() -> Record {
        record(&[
            ("Name", json!("shami")),
            ("Year", json!(2021)),
            ("Cluster", json!(3)),
            ("License", json!("MIT")),
            ("Missing", json!(null)),
        ])
    }

    #[test]
    fn numeric_comparison() {
        let expr = Expr::parse("Year >= 2020").unwrap();
        assert!(expr.matches(&sample()).unwrap());
        let expr = Expr::parse("Year < 2020").unwrap();
        assert!(!expr.matches(&sample()).unwrap());
    }

    #[test]
    fn string_equality_with_both_quote_styles() {
        assert!(Expr::parse("License == \"MIT\"")
            .unwrap()
            .matches(&sample())
            .unwrap());
        assert!(Expr::parse("License == 'MIT'")
            .unwrap()
            .matches(&sample())
            .unwrap());
    }

    #[test]
    fn boolean_connectives_and_parentheses() {
        let expr = Expr::parse("(Year > 2019 && License == 'MIT') || Cluster == 99").unwrap();
        assert!(expr.matches(&sample()).unwrap());

        let expr = Expr::parse("Year > 2021 || Cluster == 99").unwrap();
        assert!(!expr.matches(&sample()).unwrap());
    }

    #[test]
    fn keyword_connectives_are_aliases() {
        let expr = Expr::parse("Year > 2019 and not (License == 'GPL') or false").unwrap();
        assert!(expr.matches(&sample()).unwrap());
    }

    #[test]
    fn unknown_column_is_a_query_error() {
        let expr = Expr::parse("Nope == 1").unwrap();
        let err = expr.matches(&sample()).unwrap_err();
        assert!(matches!(err, CatalogError::InvalidQuery(_)));
    }

    #[test]
    fn null_equality() {
        let expr = Expr::parse("Missing == null").unwrap();
        assert!(expr.matches(&sample()).unwrap());
    }

    #[test]
    fn cross_type_equality_is_false_not_an_error() {
        let expr = Expr::parse("Year == 'MIT'").unwrap();
        assert!(!expr.matches(&sample()).unwrap());
        let expr = Expr::parse("Year != 'MIT'").unwrap();
        assert!(expr.matches(&sample()).unwrap());
    }

    #[test]
    fn cross_type_ordering_is_an_error() {
        let expr = Expr::parse("Year < 'MIT'").unwrap();
        assert!(matches!(
            expr.matches(&sample()),
            Err(CatalogError::InvalidQuery(_))
        ));
    }

    #[test]
    fn non_boolean_filter_is_rejected() {
        let expr = Expr::parse("Year").unwrap();
        assert!(matches!(
            expr.matches(&sample()),
            Err(CatalogError::InvalidQuery(_))
        ));
    }

    #[test]
    fn negative_and_float_literals() {
        let rec = record(&[("Delta", json!(-1.5))]);
        let expr = Expr::parse("Delta <= -1.5").unwrap();
        assert!(expr.matches(&rec).unwrap());
    }

    #[test]
    fn parse_errors() {
        assert!(Expr::parse("Year ==").is_err());
        assert!(Expr::parse("(Year == 1").is_err());
        assert!(Expr::parse("Year = 1").is_err());
        assert!(Expr::parse("Year == 1 extra").is_err());
        assert!(Expr::parse("License == \"unterminated").is_err());
    }
}
