//! Structured requests against a resource.

pub mod parser;

use crate::error::RequestError;
use std::fmt;
use std::str::FromStr;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RequestType {
    Select,
    Insert,
    Update,
    Delete,
}

impl RequestType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestType::Select => "SELECT",
            RequestType::Insert => "INSERT",
            RequestType::Update => "UPDATE",
            RequestType::Delete => "DELETE",
        }
    }

    pub fn is_write(&self) -> bool {
        !matches!(self, RequestType::Select)
    }
}

impl fmt::Display for RequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operator {
    Equals,
    NotEquals,
    LessThan,
    LessThanOrEqualTo,
    GreaterThan,
    GreaterThanOrEqualTo,
    In,
    IsNull,
    IsNotNull,
    /// Parser-internal; always normalized to Equals.
    Escaped,
}

impl Operator {
    pub fn normalized(self) -> Self {
        match self {
            Operator::Escaped => Operator::Equals,
            other => other,
        }
    }

    /// SQL comparison token.
    pub fn sql(&self) -> &'static str {
        match self {
            Operator::Equals | Operator::Escaped => "=",
            Operator::NotEquals => "!=",
            Operator::LessThan => "<",
            Operator::LessThanOrEqualTo => "<=",
            Operator::GreaterThan => ">",
            Operator::GreaterThanOrEqualTo => ">=",
            Operator::In => "IN",
            Operator::IsNull => "IS NULL",
            Operator::IsNotNull => "IS NOT NULL",
        }
    }
}

impl FromStr for Operator {
    type Err = RequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "Equals" => Operator::Equals,
            "NotEquals" => Operator::NotEquals,
            "LessThan" => Operator::LessThan,
            "LessThanOrEqualTo" => Operator::LessThanOrEqualTo,
            "GreaterThan" => Operator::GreaterThan,
            "GreaterThanOrEqualTo" => Operator::GreaterThanOrEqualTo,
            "In" => Operator::In,
            "IsNull" => Operator::IsNull,
            "IsNotNull" => Operator::IsNotNull,
            "Escaped" => Operator::Escaped,
            other => return Err(RequestError::UnknownOperator(other.to_string())),
        })
    }
}

/// One named value of a request: a resource identifier, filter or column value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestValue {
    pub name: String,
    pub operator: Operator,
    pub value: Option<String>,
    pub in_values: Option<Vec<String>>,
}

impl RequestValue {
    /// Equality value taken verbatim (no operator parsing).
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        RequestValue {
            name: name.into(),
            operator: Operator::Equals,
            value: Some(value.into()),
            in_values: None,
        }
    }

    pub fn null(name: impl Into<String>) -> Self {
        RequestValue {
            name: name.into(),
            operator: Operator::IsNull,
            value: None,
            in_values: None,
        }
    }

    /// Value run through the operator grammar.
    pub fn parse(name: impl Into<String>, raw: &str) -> Self {
        let parsed = parser::parse(raw);
        RequestValue {
            name: name.into(),
            operator: parsed.operator,
            value: parsed.value,
            in_values: parsed.in_values,
        }
    }

    /// Value from a JSON body: strings verbatim, null as IsNull, scalars by their text.
    pub fn from_json(name: impl Into<String>, value: &serde_json::Value) -> Result<Self, RequestError> {
        let name = name.into();
        Ok(match value {
            serde_json::Value::Null => RequestValue::null(name),
            serde_json::Value::String(s) => RequestValue::new(name, s.as_str()),
            serde_json::Value::Bool(b) => RequestValue::new(name, b.to_string()),
            serde_json::Value::Number(n) => RequestValue::new(name, n.to_string()),
            serde_json::Value::Array(_) | serde_json::Value::Object(_) => {
                return Err(RequestError::Malformed(format!("{} must be a scalar value", name)))
            }
        })
    }

    pub fn matches_name(&self, label: &str) -> bool {
        self.name.eq_ignore_ascii_case(label)
    }
}

/// Limit/offset pair. Both or neither.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Page {
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Request {
    pub request_type: RequestType,
    pub resource: String,
    pub res_ids: Vec<RequestValue>,
    pub params: Vec<RequestValue>,
    /// Parameter sets for individual children of a hierarchical write.
    pub child_rows: Option<Vec<Vec<RequestValue>>>,
    pub page: Option<Page>,
}

impl Request {
    pub fn new(request_type: RequestType, resource: impl Into<String>) -> Self {
        Request {
            request_type,
            resource: resource.into(),
            res_ids: Vec::new(),
            params: Vec::new(),
            child_rows: None,
            page: None,
        }
    }

    pub fn with_res_id(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.res_ids.push(RequestValue::new(name, value));
        self
    }

    pub fn with_param(mut self, param: RequestValue) -> Self {
        self.params.push(param);
        self
    }

    pub fn with_child_row(mut self, row: Vec<RequestValue>) -> Self {
        self.child_rows.get_or_insert_with(Vec::new).push(row);
        self
    }

    pub fn with_page(mut self, limit: Option<u64>, offset: Option<u64>) -> Self {
        self.page = Some(Page { limit, offset });
        self
    }

    pub fn has_child_rows(&self) -> bool {
        self.child_rows.as_ref().map(|c| !c.is_empty()).unwrap_or(false)
    }

    /// Split raw query-string pairs into operator-parsed params and the reserved pagination pair.
    pub fn apply_query_params(
        mut self,
        pairs: &[(String, String)],
        limit_param: &str,
        offset_param: &str,
    ) -> Result<Self, RequestError> {
        let mut limit = None;
        let mut offset = None;
        for (k, v) in pairs {
            if k == limit_param {
                limit = Some(parse_page_value(k, v)?);
            } else if k == offset_param {
                offset = Some(parse_page_value(k, v)?);
            } else {
                self.params.push(RequestValue::parse(k.as_str(), v));
            }
        }
        if limit.is_some() || offset.is_some() {
            self.page = Some(Page { limit, offset });
        }
        Ok(self)
    }
}

fn parse_page_value(name: &str, value: &str) -> Result<u64, RequestError> {
    value.trim().parse().map_err(|_| RequestError::InvalidPagination {
        name: name.to_string(),
        value: value.to_string(),
    })
}
