//! Typed errors per layer and HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Structurally invalid resource definition.
#[derive(Error, Debug)]
pub enum DefinitionError {
    #[error("resource {0}: missing query")]
    MissingQuery(String),
    #[error("resource {0}: no table declarations")]
    MissingTables(String),
    #[error("resource {resource}: expected exactly one Parent table, found {count}")]
    ParentCount { resource: String, count: usize },
    #[error("resource {resource}: at most one {role} table allowed, found {count}")]
    TooMany {
        resource: String,
        role: &'static str,
        count: usize,
    },
    #[error("resource {resource}: {role} declared without a Child table")]
    OrphanRole { resource: String, role: &'static str },
    #[error("definition load: {0}")]
    Load(String),
}

/// Schema introspection failure. Driver failures keep the SQL that was attempted.
#[derive(Error, Debug)]
pub enum MetaDataError {
    #[error("introspection of {resource} failed: {source} (sql: {sql})")]
    Driver {
        resource: String,
        sql: String,
        #[source]
        source: sqlx::Error,
    },
    #[error("introspection of {resource} failed: {message}")]
    Shape { resource: String, message: String },
}

/// Invalid client request.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum RequestError {
    #[error("column {0} is read-only")]
    ReadOnlyColumn(String),
    #[error("no valid parameters found")]
    NoValidParameters,
    #[error("limit and offset must be supplied together")]
    IncompletePagination,
    #[error("invalid pagination value for {name}: {value}")]
    InvalidPagination { name: String, value: String },
    #[error("unrecognized operator: {0}")]
    UnknownOperator(String),
    #[error("no predicate could be built for {0}")]
    MissingPredicate(String),
    #[error("{0}")]
    Malformed(String),
}

/// Statement execution failure, with the failed SQL.
#[derive(Error, Debug)]
#[error("execution failed: {source} (sql: {sql})")]
pub struct ExecutionError {
    pub sql: String,
    #[source]
    pub source: sqlx::Error,
}

/// Raised by trigger hooks.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TriggerError {
    #[error("validation: {0}")]
    Validation(String),
    #[error("trigger failure: {0}")]
    Fatal(String),
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Definition(#[from] DefinitionError),
    #[error(transparent)]
    MetaData(#[from] MetaDataError),
    #[error(transparent)]
    Request(#[from] RequestError),
    #[error(transparent)]
    Execution(#[from] ExecutionError),
    #[error(transparent)]
    Trigger(#[from] TriggerError),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("not acceptable: {0}")]
    NotAcceptable(String),
    #[error("connection: {0}")]
    Connection(#[source] sqlx::Error),
}

impl AppError {
    /// HTTP status and stable error code for this error.
    pub fn status(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Definition(_) => (StatusCode::BAD_REQUEST, "definition_error"),
            AppError::Request(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
            AppError::Trigger(TriggerError::Validation(_)) => {
                (StatusCode::BAD_REQUEST, "validation_error")
            }
            AppError::Trigger(TriggerError::Fatal(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "trigger_error")
            }
            AppError::MetaData(_) => (StatusCode::INTERNAL_SERVER_ERROR, "metadata_error"),
            AppError::Execution(_) => (StatusCode::INTERNAL_SERVER_ERROR, "database_error"),
            AppError::Connection(_) => (StatusCode::INTERNAL_SERVER_ERROR, "connection_error"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            AppError::Forbidden(_) => (StatusCode::FORBIDDEN, "forbidden"),
            AppError::NotAcceptable(_) => (StatusCode::NOT_ACCEPTABLE, "not_acceptable"),
        }
    }
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message: self.to_string(),
                details: None,
            },
        };
        (status, Json(body)).into_response()
    }
}
