//! Pluggable collaborators around request execution: triggers, authorization, request logging.

use crate::config::Privilege;
use crate::error::{AppError, TriggerError};
use crate::request::{Request, RequestType};
use crate::response::{ReadResponse, WriteResponse};
use crate::sql::Statement;
use std::collections::HashMap;
use std::sync::Arc;

/// Caller identity, from transport headers.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SecurityContext {
    pub user: Option<String>,
    pub roles: Vec<String>,
}

impl SecurityContext {
    pub fn new(user: impl Into<String>, roles: Vec<String>) -> Self {
        SecurityContext {
            user: Some(user.into()),
            roles,
        }
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

/// What a request produced, handed to after-hooks.
#[derive(Clone, Copy, Debug)]
pub enum Outcome<'a> {
    Read(&'a ReadResponse),
    Write(&'a WriteResponse),
}

/// Runs around a logical request. A `Validation` error from `before` aborts with no
/// statement executed; any error from `after` on a write rolls it back.
pub trait TriggerHook: Send + Sync {
    fn before(&self, _request: &Request) -> Result<(), TriggerError> {
        Ok(())
    }

    fn after(&self, _request: &Request, _outcome: Outcome<'_>) -> Result<(), TriggerError> {
        Ok(())
    }
}

/// Hooks by resource name and optionally request type; `*` applies to every resource.
#[derive(Clone, Default)]
pub struct TriggerRegistry {
    by_key: HashMap<(String, Option<RequestType>), Vec<Arc<dyn TriggerHook>>>,
}

impl TriggerRegistry {
    pub const ALL: &'static str = "*";

    /// Hook for every request type on `resource`.
    pub fn register(&mut self, resource: impl Into<String>, hook: Arc<dyn TriggerHook>) {
        self.by_key.entry((resource.into(), None)).or_default().push(hook);
    }

    /// Hook for one request type on `resource`.
    pub fn register_for(
        &mut self,
        resource: impl Into<String>,
        request_type: RequestType,
        hook: Arc<dyn TriggerHook>,
    ) {
        self.by_key
            .entry((resource.into(), Some(request_type)))
            .or_default()
            .push(hook);
    }

    pub fn hooks_for<'a>(
        &'a self,
        resource: &'a str,
        request_type: RequestType,
    ) -> impl Iterator<Item = &'a Arc<dyn TriggerHook>> {
        [Self::ALL, resource]
            .into_iter()
            .flat_map(move |name| [None, Some(request_type)].map(|t| (name, t)))
            .filter_map(move |(name, t)| self.by_key.get(&(name.to_string(), t)))
            .flatten()
    }

    pub fn before(&self, request: &Request) -> Result<(), TriggerError> {
        for hook in self.hooks_for(&request.resource, request.request_type) {
            hook.before(request)?;
        }
        Ok(())
    }

    pub fn after(&self, request: &Request, outcome: Outcome<'_>) -> Result<(), TriggerError> {
        for hook in self.hooks_for(&request.resource, request.request_type) {
            hook.after(request, outcome)?;
        }
        Ok(())
    }
}

pub trait Authorizer: Send + Sync {
    fn allowed(&self, ctx: &SecurityContext, request_type: RequestType, resource: &str) -> bool;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct AllowAll;

impl Authorizer for AllowAll {
    fn allowed(&self, _ctx: &SecurityContext, _request_type: RequestType, _resource: &str) -> bool {
        true
    }
}

/// Grants from `{role, resource, method}` privileges; `*` matches anything. Methods may be
/// named by request type (`SELECT`) or HTTP verb (`GET`).
#[derive(Clone, Debug, Default)]
pub struct RoleAuthorizer {
    privileges: Vec<Privilege>,
}

impl RoleAuthorizer {
    pub fn new(privileges: Vec<Privilege>) -> Self {
        RoleAuthorizer { privileges }
    }
}

fn http_verb(request_type: RequestType) -> &'static str {
    match request_type {
        RequestType::Select => "GET",
        RequestType::Insert => "POST",
        RequestType::Update => "PUT",
        RequestType::Delete => "DELETE",
    }
}

impl Authorizer for RoleAuthorizer {
    fn allowed(&self, ctx: &SecurityContext, request_type: RequestType, resource: &str) -> bool {
        self.privileges.iter().any(|p| {
            (p.role == "*" || ctx.has_role(&p.role))
                && (p.resource == "*" || p.resource == resource)
                && (p.method == "*"
                    || p.method.eq_ignore_ascii_case(request_type.as_str())
                    || p.method.eq_ignore_ascii_case(http_verb(request_type)))
        })
    }
}

pub trait RequestLogger: Send + Sync {
    fn statement(&self, request: &Request, statement: &Statement);
    /// `Ok` carries the record count of a read or the affected rows of a write.
    fn outcome(&self, request: &Request, result: Result<u64, &AppError>);
}

#[derive(Clone, Copy, Debug, Default)]
pub struct TracingRequestLogger;

impl RequestLogger for TracingRequestLogger {
    fn statement(&self, request: &Request, statement: &Statement) {
        tracing::debug!(
            resource = %request.resource,
            request_type = %request.request_type,
            sql = %statement.sql(),
            params = ?statement.params(),
            "statement"
        );
    }

    fn outcome(&self, request: &Request, result: Result<u64, &AppError>) {
        match result {
            Ok(rows) => tracing::info!(
                resource = %request.resource,
                request_type = %request.request_type,
                rows,
                "request completed"
            ),
            Err(e) => tracing::warn!(
                resource = %request.resource,
                request_type = %request.request_type,
                error = %e,
                "request failed"
            ),
        }
    }
}
