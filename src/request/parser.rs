//! Parses a raw request scalar into an operator and value(s).
//!
//! Grammar: `null`, `!null`, `!v`, `<v`, `<=v`, `>v`, `>=v`, `(v1,v2,...)`, or a value
//! prefixed by `\` to pass an operator character through literally.

use crate::request::Operator;

/// Result of parsing one raw value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedValue {
    pub operator: Operator,
    /// `None` for IsNull/IsNotNull and In.
    pub value: Option<String>,
    /// `Some` only for In.
    pub in_values: Option<Vec<String>>,
}

impl ParsedValue {
    fn scalar(operator: Operator, value: &str) -> Self {
        ParsedValue {
            operator,
            value: Some(value.to_string()),
            in_values: None,
        }
    }

    fn bare(operator: Operator) -> Self {
        ParsedValue {
            operator,
            value: None,
            in_values: None,
        }
    }

    /// Escaped never leaves the parser.
    fn normalized(mut self) -> Self {
        self.operator = self.operator.normalized();
        self
    }
}

pub fn parse(raw: &str) -> ParsedValue {
    if raw.eq_ignore_ascii_case("null") {
        return ParsedValue::bare(Operator::IsNull);
    }
    if raw.eq_ignore_ascii_case("!null") {
        return ParsedValue::bare(Operator::IsNotNull);
    }
    if is_escaped(raw) {
        let parsed = ParsedValue::scalar(Operator::Escaped, &raw[1..]);
        return parsed.normalized();
    }
    if let Some(rest) = raw.strip_prefix('!') {
        return ParsedValue::scalar(Operator::NotEquals, rest);
    }
    if let Some(rest) = raw.strip_prefix("<=") {
        return ParsedValue::scalar(Operator::LessThanOrEqualTo, rest);
    }
    if let Some(rest) = raw.strip_prefix('<') {
        return ParsedValue::scalar(Operator::LessThan, rest);
    }
    if let Some(rest) = raw.strip_prefix(">=") {
        return ParsedValue::scalar(Operator::GreaterThanOrEqualTo, rest);
    }
    if let Some(rest) = raw.strip_prefix('>') {
        return ParsedValue::scalar(Operator::GreaterThan, rest);
    }
    if raw.len() >= 2 && raw.starts_with('(') && raw.ends_with(')') {
        return ParsedValue {
            operator: Operator::In,
            value: None,
            in_values: Some(split_in_list(&raw[1..raw.len() - 1])),
        };
    }
    ParsedValue::scalar(Operator::Equals, raw)
}

fn is_escaped(raw: &str) -> bool {
    if raw.eq_ignore_ascii_case("\\null") {
        return true;
    }
    let mut chars = raw.chars();
    chars.next() == Some('\\') && matches!(chars.next(), Some('!' | '<' | '>' | '('))
}

/// Comma-split; a token ending in `\` is an escaped comma and joins the next token.
fn split_in_list(inner: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut pending: Option<String> = None;
    for token in inner.split(',') {
        let mut current = pending.take().unwrap_or_default();
        if let Some(stripped) = token.strip_suffix('\\') {
            current.push_str(stripped);
            current.push(',');
            pending = Some(current);
        } else {
            current.push_str(token);
            out.push(current);
        }
    }
    if let Some(rest) = pending {
        // trailing escaped comma with nothing after it
        out.push(rest);
    }
    out
}
