//! Resource handlers: list, read, create, update, delete.

use crate::error::{AppError, RequestError};
use crate::service::SecurityContext;
use crate::meta::ResourceMetaData;
use crate::request::{Request, RequestType, RequestValue};
use crate::response::Serializer;
use crate::state::AppState;
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    Json,
};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

type Rendered = (StatusCode, [(header::HeaderName, &'static str); 1], String);

fn render(status: StatusCode, serializer: &dyn Serializer, body: String) -> Rendered {
    (status, [(header::CONTENT_TYPE, serializer.media_type())], body)
}

/// Serializer for the request's `Accept` header, checked before any work is done.
fn negotiate(state: &AppState, headers: &HeaderMap) -> Result<Arc<dyn Serializer>, AppError> {
    let accept = headers.get(header::ACCEPT).and_then(|v| v.to_str().ok());
    state
        .serializers
        .for_accept(accept)
        .ok_or_else(|| AppError::NotAcceptable(accept.unwrap_or_default().to_string()))
}

/// Resource name and the `/`-separated identifiers after it.
fn split_path(path: &HashMap<String, String>) -> Result<(String, Vec<String>), AppError> {
    let resource = path
        .get("resource")
        .cloned()
        .ok_or_else(|| RequestError::Malformed("missing resource".into()))?;
    let ids = path
        .get("ids")
        .map(|s| {
            s.split('/')
                .filter(|seg| !seg.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    Ok((resource, ids))
}

/// Path identifiers mapped in order onto the parent primary keys.
fn resource_ids(meta: &ResourceMetaData, ids: &[String]) -> Result<Vec<RequestValue>, RequestError> {
    let keys = &meta.parent().primary_keys;
    if ids.len() > keys.len() {
        return Err(RequestError::Malformed(format!(
            "{} identifiers given but {} has {} primary key(s)",
            ids.len(),
            meta.name,
            keys.len()
        )));
    }
    Ok(keys
        .iter()
        .zip(ids)
        .map(|(key, id)| RequestValue::new(key.as_str(), id.as_str()))
        .collect())
}

/// Column values of one body object plus any nested child rows.
struct BodyRow {
    params: Vec<RequestValue>,
    child_rows: Vec<Vec<RequestValue>>,
}

fn object_values(object: &Map<String, Value>) -> Result<Vec<RequestValue>, RequestError> {
    object
        .iter()
        .map(|(k, v)| RequestValue::from_json(k.as_str(), v))
        .collect()
}

fn body_row(meta: &ResourceMetaData, value: &Value) -> Result<BodyRow, RequestError> {
    let Value::Object(object) = value else {
        return Err(RequestError::Malformed("body rows must be JSON objects".into()));
    };
    let child_key = meta.child_row_set_name();
    let mut row = BodyRow {
        params: Vec::new(),
        child_rows: Vec::new(),
    };
    for (key, value) in object {
        let is_child_set = child_key
            .as_deref()
            .map(|c| c.eq_ignore_ascii_case(key))
            .unwrap_or(false);
        if !is_child_set {
            row.params.push(RequestValue::from_json(key.as_str(), value)?);
            continue;
        }
        let Value::Array(children) = value else {
            return Err(RequestError::Malformed(format!("{} must be an array", key)));
        };
        for child in children {
            match child {
                Value::Object(o) => row.child_rows.push(object_values(o)?),
                _ => return Err(RequestError::Malformed(format!("{} entries must be objects", key))),
            }
        }
    }
    Ok(row)
}

/// Body rows: nothing for an empty body, one for an object, one per element for an array.
fn body_rows(meta: &ResourceMetaData, body: &Bytes) -> Result<Vec<BodyRow>, RequestError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| RequestError::Malformed(format!("invalid JSON body: {}", e)))?;
    match &value {
        Value::Array(items) => items.iter().map(|v| body_row(meta, v)).collect(),
        other => Ok(vec![body_row(meta, other)?]),
    }
}

/// Folds a body row into `request`. With child rows, parent key values become identifiers.
fn apply_body_row(meta: &ResourceMetaData, mut request: Request, row: BodyRow) -> Request {
    if row.child_rows.is_empty() {
        request.params.extend(row.params);
        return request;
    }
    for param in row.params {
        let is_key = meta.parent().primary_keys.iter().any(|k| param.matches_name(k));
        let already = request.res_ids.iter().any(|id| id.matches_name(&param.name));
        match (is_key, param.value.clone()) {
            (true, Some(value)) if !already => {
                request.res_ids.push(RequestValue::new(param.name, value))
            }
            _ => request.params.push(param),
        }
    }
    request.child_rows = Some(row.child_rows);
    request
}

/// GET /res
pub async fn list_resources(State(state): State<AppState>) -> Json<Value> {
    let names: Vec<Value> = state
        .service
        .registry()
        .names()
        .into_iter()
        .map(Value::from)
        .collect();
    Json(serde_json::json!({ "resources": names }))
}

/// GET /res/:resource[/*ids]
pub async fn read(
    State(state): State<AppState>,
    ctx: SecurityContext,
    Path(path): Path<HashMap<String, String>>,
    Query(query): Query<Vec<(String, String)>>,
    headers: HeaderMap,
) -> Result<Rendered, AppError> {
    let serializer = negotiate(&state, &headers)?;
    let (resource, ids) = split_path(&path)?;
    state.service.authorize(&ctx, &Request::new(RequestType::Select, resource.as_str()))?;
    let meta = state.service.metadata(&resource).await?;
    let mut request = Request::new(RequestType::Select, resource).apply_query_params(
        &query,
        &state.settings.limit_param,
        &state.settings.offset_param,
    )?;
    request.res_ids = resource_ids(&meta, &ids)?;

    let (meta, response) = state.service.read(&ctx, &request).await?;
    if !request.res_ids.is_empty() && response.records.is_empty() {
        return Err(AppError::NotFound(format!("{}/{}", meta.name, ids.join("/"))));
    }
    let body = serializer.read(&meta, &response)?;
    Ok(render(StatusCode::OK, serializer.as_ref(), body))
}

/// POST /res/:resource[/*ids]. An array body writes every element in one transaction.
pub async fn create(
    State(state): State<AppState>,
    ctx: SecurityContext,
    Path(path): Path<HashMap<String, String>>,
    Query(query): Query<Vec<(String, String)>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Rendered, AppError> {
    let serializer = negotiate(&state, &headers)?;
    let (resource, ids) = split_path(&path)?;
    state.service.authorize(&ctx, &Request::new(RequestType::Insert, resource.as_str()))?;
    let meta = state.service.metadata(&resource).await?;
    let mut base = Request::new(RequestType::Insert, resource);
    base.res_ids = resource_ids(&meta, &ids)?;
    for (k, v) in &query {
        base.params.push(RequestValue::new(k.as_str(), v.as_str()));
    }

    let mut rows = body_rows(&meta, &body)?;
    if rows.is_empty() {
        rows.push(BodyRow {
            params: Vec::new(),
            child_rows: Vec::new(),
        });
    }
    let requests: Vec<Request> = rows
        .into_iter()
        .map(|row| apply_body_row(&meta, base.clone(), row))
        .collect();
    let (_, response) = state.service.write_all(&ctx, &requests).await?;
    let body = serializer.write(&meta, &response)?;
    Ok(render(StatusCode::CREATED, serializer.as_ref(), body))
}

/// PUT /res/:resource[/*ids]. Values come from the body and the query string.
pub async fn update(
    State(state): State<AppState>,
    ctx: SecurityContext,
    Path(path): Path<HashMap<String, String>>,
    Query(query): Query<Vec<(String, String)>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Rendered, AppError> {
    let serializer = negotiate(&state, &headers)?;
    let (resource, ids) = split_path(&path)?;
    state.service.authorize(&ctx, &Request::new(RequestType::Update, resource.as_str()))?;
    let meta = state.service.metadata(&resource).await?;
    let mut request = Request::new(RequestType::Update, resource);
    request.res_ids = resource_ids(&meta, &ids)?;
    for (k, v) in &query {
        request.params.push(RequestValue::new(k.as_str(), v.as_str()));
    }
    let mut rows = body_rows(&meta, &body)?.into_iter();
    if let Some(row) = rows.next() {
        if rows.next().is_some() {
            return Err(RequestError::Malformed("update takes a single object".into()).into());
        }
        request = apply_body_row(&meta, request, row);
    }

    let (meta, response) = state.service.write(&ctx, &request).await?;
    let body = serializer.write(&meta, &response)?;
    Ok(render(StatusCode::OK, serializer.as_ref(), body))
}

/// DELETE /res/:resource[/*ids]. Query parameters are filters.
pub async fn remove(
    State(state): State<AppState>,
    ctx: SecurityContext,
    Path(path): Path<HashMap<String, String>>,
    Query(query): Query<Vec<(String, String)>>,
    headers: HeaderMap,
) -> Result<Rendered, AppError> {
    let serializer = negotiate(&state, &headers)?;
    let (resource, ids) = split_path(&path)?;
    state.service.authorize(&ctx, &Request::new(RequestType::Delete, resource.as_str()))?;
    let meta = state.service.metadata(&resource).await?;
    let mut request = Request::new(RequestType::Delete, resource).apply_query_params(
        &query,
        &state.settings.limit_param,
        &state.settings.offset_param,
    )?;
    request.res_ids = resource_ids(&meta, &ids)?;

    let (meta, response) = state.service.write(&ctx, &request).await?;
    let body = serializer.write(&meta, &response)?;
    Ok(render(StatusCode::OK, serializer.as_ref(), body))
}
