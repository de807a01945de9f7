//! Port values.
//!
//! Every input and output port holds one [`Value`]. The set is kept
//! small on purpose: it covers the elementary IEC 61131 data types a
//! function block network exchanges, plus `Null` for ports that have
//! never been written.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Value carried by a port
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// No value yet
    #[default]
    Null,
    /// BOOL
    Bool(bool),
    /// Any integer type
    Int(i64),
    /// REAL / LREAL
    Real(f64),
    /// STRING / WSTRING
    Text(String),
}

impl Value {
    /// Parse a literal as written in a WRITE command.
    ///
    /// Accepts `TRUE`/`FALSE`, integers, reals and quoted strings, with
    /// an optional IEC 61131 type prefix (`INT#5`, `REAL#1.5`,
    /// `STRING#'abc'`). Anything else is kept as text; an empty literal
    /// is `Null`.
    #[must_use]
    pub fn parse_literal(literal: &str) -> Self {
        let literal = literal.trim();
        if literal.is_empty() {
            return Self::Null;
        }

        let (hint, body) = match literal.split_once('#') {
            Some((prefix, rest))
                if !prefix.is_empty()
                    && prefix.chars().all(|c| c.is_ascii_alphabetic() || c == '_') =>
            {
                (Some(prefix.to_ascii_uppercase()), rest)
            }
            _ => (None, literal),
        };

        if let Some(text) = unquote(body) {
            return Self::Text(text.to_string());
        }

        match hint.as_deref() {
            Some("STRING" | "WSTRING") => Self::Text(body.to_string()),
            Some("REAL" | "LREAL") => body
                .parse::<f64>()
                .map(Self::Real)
                .unwrap_or_else(|_| Self::Text(body.to_string())),
            Some("BOOL") => match body {
                "1" => Self::Bool(true),
                "0" => Self::Bool(false),
                other => parse_untyped(other),
            },
            _ => parse_untyped(body),
        }
    }

    /// Integer view; booleans map to 0/1 and reals are truncated
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::Bool(b) => Some(i64::from(*b)),
            #[allow(clippy::cast_possible_truncation)]
            Self::Real(r) => Some(*r as i64),
            Self::Null | Self::Text(_) => None,
        }
    }

    /// Real view
    #[must_use]
    pub fn as_real(&self) -> Option<f64> {
        match self {
            Self::Real(r) => Some(*r),
            #[allow(clippy::cast_precision_loss)]
            Self::Int(v) => Some(*v as f64),
            Self::Bool(_) | Self::Null | Self::Text(_) => None,
        }
    }
}

fn unquote(body: &str) -> Option<&str> {
    let bytes = body.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if first == last && (first == b'\'' || first == b'"') {
            return Some(&body[1..body.len() - 1]);
        }
    }
    None
}

fn parse_untyped(body: &str) -> Value {
    if body.eq_ignore_ascii_case("true") {
        return Value::Bool(true);
    }
    if body.eq_ignore_ascii_case("false") {
        return Value::Bool(false);
    }
    if let Ok(v) = body.parse::<i64>() {
        return Value::Int(v);
    }
    if let Ok(r) = body.parse::<f64>() {
        return Value::Real(r);
    }
    Value::Text(body.to_string())
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Bool(true) => write!(f, "TRUE"),
            Self::Bool(false) => write!(f, "FALSE"),
            Self::Int(v) => write!(f, "{}", v),
            Self::Real(r) => write!(f, "{}", r),
            Self::Text(s) => write!(f, "'{}'", s),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Real(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_literal_plain() {
        assert_eq!(Value::parse_literal("42"), Value::Int(42));
        assert_eq!(Value::parse_literal("-7"), Value::Int(-7));
        assert_eq!(Value::parse_literal("1.5"), Value::Real(1.5));
        assert_eq!(Value::parse_literal("TRUE"), Value::Bool(true));
        assert_eq!(Value::parse_literal("false"), Value::Bool(false));
        assert_eq!(Value::parse_literal("hello"), Value::Text("hello".to_string()));
    }

    #[test]
    fn test_parse_literal_typed() {
        assert_eq!(Value::parse_literal("INT#5"), Value::Int(5));
        assert_eq!(Value::parse_literal("REAL#2"), Value::Real(2.0));
        assert_eq!(Value::parse_literal("BOOL#1"), Value::Bool(true));
        assert_eq!(Value::parse_literal("STRING#12"), Value::Text("12".to_string()));
    }

    #[test]
    fn test_parse_literal_quoted() {
        assert_eq!(Value::parse_literal("'abc'"), Value::Text("abc".to_string()));
        assert_eq!(Value::parse_literal("STRING#'a#b'"), Value::Text("a#b".to_string()));
        assert_eq!(Value::parse_literal("\"x\""), Value::Text("x".to_string()));
    }

    #[test]
    fn test_parse_literal_empty() {
        assert_eq!(Value::parse_literal(""), Value::Null);
        assert_eq!(Value::parse_literal("   "), Value::Null);
    }

    #[test]
    fn test_views() {
        assert_eq!(Value::Bool(true).as_int(), Some(1));
        assert_eq!(Value::Int(3).as_real(), Some(3.0));
        assert_eq!(Value::Text("a".into()).as_real(), None);
        assert_eq!(Value::Null.as_int(), None);
    }

    #[test]
    fn test_json_shape() {
        let json = serde_json::to_string(&vec![
            Value::Null,
            Value::Bool(true),
            Value::Int(3),
            Value::Text("x".into()),
        ])
        .unwrap();
        assert_eq!(json, r#"[null,true,3,"x"]"#);

        let back: Vec<Value> = serde_json::from_str("[null, false, 7, 2.5, \"y\"]").unwrap();
        assert_eq!(
            back,
            vec![
                Value::Null,
                Value::Bool(false),
                Value::Int(7),
                Value::Real(2.5),
                Value::Text("y".into())
            ]
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::Bool(true).to_string(), "TRUE");
        assert_eq!(Value::Text("a".into()).to_string(), "'a'");
        assert_eq!(Value::Null.to_string(), "NULL");
    }

    proptest::proptest! {
        #[test]
        fn prop_int_literal_parses_back(n: i64) {
            proptest::prop_assert_eq!(Value::parse_literal(&n.to_string()), Value::Int(n));
            proptest::prop_assert_eq!(Value::parse_literal(&format!("DINT#{}", n)), Value::Int(n));
        }

        #[test]
        fn prop_quoted_text_is_kept(text in "[a-zA-Z0-9 #._-]{0,24}") {
            let literal = format!("'{}'", text);
            proptest::prop_assert_eq!(Value::parse_literal(&literal), Value::Text(text));
        }
    }
}
