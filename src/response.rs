//! Read/write results and their wire serializers, selected by media type.

use crate::db::Record;
use crate::error::AppError;
use crate::meta::ResourceMetaData;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

pub const JSON_MEDIA_TYPE: &str = "application/json";

/// Records of a read; hierarchical records carry their children as an array value.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ReadResponse {
    pub records: Vec<Record>,
}

/// Nested child rows of one written parent.
#[derive(Clone, Debug, PartialEq)]
pub struct ChildRows {
    pub key: String,
    pub rows: Vec<ResponseRow>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResponseRow {
    /// Column values by label, in column-number order.
    pub values: Record,
    pub children: Option<ChildRows>,
}

impl ResponseRow {
    pub fn to_value(&self) -> Value {
        let mut out = self.values.clone();
        if let Some(children) = &self.children {
            out.insert(
                children.key.clone(),
                Value::Array(children.rows.iter().map(ResponseRow::to_value).collect()),
            );
        }
        Value::Object(out)
    }
}

/// Affected-row count; INSERT also reports the written rows.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WriteResponse {
    pub rows_affected: u64,
    pub rows: Vec<ResponseRow>,
}

pub trait Serializer: Send + Sync {
    fn media_type(&self) -> &'static str;
    fn read(&self, meta: &ResourceMetaData, response: &ReadResponse) -> Result<String, AppError>;
    fn write(&self, meta: &ResourceMetaData, response: &WriteResponse) -> Result<String, AppError>;
}

/// `{"<row set>": [...]}` for reads; `{"rows_affected": n, "<row set>": [...]}` for writes.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonSerializer;

fn to_json(value: &Value) -> Result<String, AppError> {
    serde_json::to_string(value).map_err(|e| AppError::NotAcceptable(e.to_string()))
}

impl Serializer for JsonSerializer {
    fn media_type(&self) -> &'static str {
        JSON_MEDIA_TYPE
    }

    fn read(&self, meta: &ResourceMetaData, response: &ReadResponse) -> Result<String, AppError> {
        let records = response.records.iter().cloned().map(Value::Object).collect();
        let mut body = serde_json::Map::new();
        body.insert(meta.parent_row_set_name(), Value::Array(records));
        to_json(&Value::Object(body))
    }

    fn write(&self, meta: &ResourceMetaData, response: &WriteResponse) -> Result<String, AppError> {
        let mut body = serde_json::Map::new();
        body.insert("rows_affected".into(), Value::from(response.rows_affected));
        if !response.rows.is_empty() {
            body.insert(
                meta.parent_row_set_name(),
                Value::Array(response.rows.iter().map(ResponseRow::to_value).collect()),
            );
        }
        to_json(&Value::Object(body))
    }
}

/// Serializers by media type, populated at startup.
#[derive(Clone)]
pub struct SerializerRegistry {
    by_media_type: HashMap<String, Arc<dyn Serializer>>,
    default_media_type: String,
}

impl Default for SerializerRegistry {
    fn default() -> Self {
        let mut registry = SerializerRegistry {
            by_media_type: HashMap::new(),
            default_media_type: JSON_MEDIA_TYPE.to_string(),
        };
        registry.register(Arc::new(JsonSerializer));
        registry
    }
}

impl SerializerRegistry {
    pub fn register(&mut self, serializer: Arc<dyn Serializer>) {
        self.by_media_type
            .insert(serializer.media_type().to_string(), serializer);
    }

    /// Serializer for an `Accept` header value; absent or wildcard gets the default.
    pub fn for_accept(&self, accept: Option<&str>) -> Option<Arc<dyn Serializer>> {
        let Some(accept) = accept else {
            return self.by_media_type.get(&self.default_media_type).cloned();
        };
        for range in accept.split(',') {
            let media = range.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
            if media == "*/*" || media.is_empty() {
                return self.by_media_type.get(&self.default_media_type).cloned();
            }
            if let Some(found) = self.by_media_type.get(&media) {
                return Some(found.clone());
            }
            if let Some(kind) = media.strip_suffix("/*") {
                if let Some(found) = self
                    .by_media_type
                    .iter()
                    .find(|(k, _)| k.split('/').next() == Some(kind))
                    .map(|(_, s)| s.clone())
                {
                    return Some(found);
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accept_negotiation() {
        let registry = SerializerRegistry::default();
        assert!(registry.for_accept(None).is_some());
        assert!(registry.for_accept(Some("*/*")).is_some());
        assert!(registry.for_accept(Some("text/html, application/json;q=0.9")).is_some());
        assert!(registry.for_accept(Some("application/*")).is_some());
        assert!(registry.for_accept(Some("application/xml")).is_none());
    }

    #[test]
    fn response_row_nests_children() {
        let mut values = Record::new();
        values.insert("film_id".into(), Value::from(1));
        let mut child = Record::new();
        child.insert("actor_id".into(), Value::from(5));
        let row = ResponseRow {
            values,
            children: Some(ChildRows {
                key: "actors".into(),
                rows: vec![ResponseRow {
                    values: child,
                    children: None,
                }],
            }),
        };
        assert_eq!(
            row.to_value(),
            serde_json::json!({"film_id": 1, "actors": [{"actor_id": 5}]})
        );
    }
}
