//! Runs reads and multi-table writes against one connection per logical request.

use super::assembly::assemble;
use super::hooks::{
    AllowAll, Authorizer, Outcome, RequestLogger, SecurityContext, TracingRequestLogger,
    TriggerRegistry,
};
use crate::db::{ConnectionProvider, Record, SqlConnection};
use crate::error::{AppError, ExecutionError, RequestError};
use crate::meta::{MetaDataRegistry, ResourceMetaData};
use crate::request::{Request, RequestType, RequestValue};
use crate::response::{ChildRows, ReadResponse, ResponseRow, WriteResponse};
use crate::sql::{build_select, build_write, TableStatement, WritePass};
use serde_json::Value;
use std::sync::Arc;

pub struct ResourceService {
    registry: Arc<MetaDataRegistry>,
    provider: Arc<dyn ConnectionProvider>,
    triggers: TriggerRegistry,
    authorizer: Arc<dyn Authorizer>,
    logger: Arc<dyn RequestLogger>,
}

impl ResourceService {
    pub fn new(registry: Arc<MetaDataRegistry>, provider: Arc<dyn ConnectionProvider>) -> Self {
        ResourceService {
            registry,
            provider,
            triggers: TriggerRegistry::default(),
            authorizer: Arc::new(AllowAll),
            logger: Arc::new(TracingRequestLogger),
        }
    }

    pub fn with_triggers(mut self, triggers: TriggerRegistry) -> Self {
        self.triggers = triggers;
        self
    }

    pub fn with_authorizer(mut self, authorizer: Arc<dyn Authorizer>) -> Self {
        self.authorizer = authorizer;
        self
    }

    pub fn with_logger(mut self, logger: Arc<dyn RequestLogger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn registry(&self) -> &MetaDataRegistry {
        &self.registry
    }

    /// Fails with `Forbidden` unless the authorizer grants the request.
    pub fn authorize(&self, ctx: &SecurityContext, request: &Request) -> Result<(), AppError> {
        if self
            .authorizer
            .allowed(ctx, request.request_type, &request.resource)
        {
            Ok(())
        } else {
            Err(AppError::Forbidden(format!(
                "{} on {}",
                request.request_type, request.resource
            )))
        }
    }

    async fn connect(&self, resource: &str) -> Result<Box<dyn SqlConnection>, AppError> {
        let definition = self
            .registry
            .definition(resource)
            .ok_or_else(|| AppError::NotFound(format!("resource {}", resource)))?;
        self.provider
            .acquire(&definition.default_database)
            .await
            .map_err(AppError::Connection)
    }

    /// Metadata graph of `resource`, introspecting on first use.
    pub async fn metadata(&self, resource: &str) -> Result<Arc<ResourceMetaData>, AppError> {
        if let Some(meta) = self.registry.cached(resource) {
            return Ok(meta);
        }
        let mut conn = self.connect(resource).await?;
        self.registry.get(resource, conn.as_mut()).await
    }

    pub async fn read(
        &self,
        ctx: &SecurityContext,
        request: &Request,
    ) -> Result<(Arc<ResourceMetaData>, ReadResponse), AppError> {
        let result = self.read_inner(ctx, request).await;
        self.logger.outcome(
            request,
            result.as_ref().map(|(_, r)| r.records.len() as u64),
        );
        result
    }

    async fn read_inner(
        &self,
        ctx: &SecurityContext,
        request: &Request,
    ) -> Result<(Arc<ResourceMetaData>, ReadResponse), AppError> {
        if request.request_type != RequestType::Select {
            return Err(RequestError::Malformed(format!("{} is not a read", request.request_type)).into());
        }
        self.authorize(ctx, request)?;
        let mut conn = self.connect(&request.resource).await?;
        let meta = self.registry.get(&request.resource, conn.as_mut()).await?;
        self.triggers.before(request)?;

        let statement = build_select(
            self.registry.dialect(),
            &meta,
            &request.res_ids,
            &request.params,
            request.page.as_ref(),
        )?;
        self.logger.statement(request, &statement);
        let rows = conn
            .query(&statement)
            .await
            .map_err(|source| ExecutionError {
                sql: statement.literal_sql().to_string(),
                source,
            })?;
        let response = ReadResponse {
            records: assemble(&meta, rows),
        };
        self.triggers.after(request, Outcome::Read(&response))?;
        Ok((meta, response))
    }

    /// INSERT, UPDATE or DELETE as one transaction.
    pub async fn write(
        &self,
        ctx: &SecurityContext,
        request: &Request,
    ) -> Result<(Arc<ResourceMetaData>, WriteResponse), AppError> {
        self.write_all(ctx, std::slice::from_ref(request)).await
    }

    /// Several writes on one resource sharing a single transaction: all commit or none do.
    /// Affected rows are summed and written rows concatenated in request order.
    pub async fn write_all(
        &self,
        ctx: &SecurityContext,
        requests: &[Request],
    ) -> Result<(Arc<ResourceMetaData>, WriteResponse), AppError> {
        let Some(first) = requests.first() else {
            return Err(RequestError::Malformed("no writes requested".into()).into());
        };
        let result = self.write_inner(ctx, first, requests).await;
        self.logger
            .outcome(first, result.as_ref().map(|(_, r)| r.rows_affected));
        result
    }

    async fn write_inner(
        &self,
        ctx: &SecurityContext,
        first: &Request,
        requests: &[Request],
    ) -> Result<(Arc<ResourceMetaData>, WriteResponse), AppError> {
        for request in requests {
            if !request.request_type.is_write() {
                return Err(RequestError::Malformed("SELECT is not a write".into()).into());
            }
            if request.resource != first.resource {
                return Err(RequestError::Malformed(format!(
                    "one transaction cannot span {} and {}",
                    first.resource, request.resource
                ))
                .into());
            }
            self.authorize(ctx, request)?;
        }
        let mut conn = self.connect(&first.resource).await?;
        let meta = self.registry.get(&first.resource, conn.as_mut()).await?;
        for request in requests {
            self.triggers.before(request)?;
        }

        conn.begin().await.map_err(|source| ExecutionError {
            sql: "BEGIN".into(),
            source,
        })?;
        let result = self.run_writes(conn.as_mut(), &meta, requests).await;
        match result {
            Ok(response) => {
                conn.commit().await.map_err(|source| ExecutionError {
                    sql: "COMMIT".into(),
                    source,
                })?;
                Ok((meta, response))
            }
            Err(e) => {
                if let Err(rollback) = conn.rollback().await {
                    tracing::warn!(resource = %first.resource, error = %rollback, "rollback failed");
                }
                Err(e)
            }
        }
    }

    /// Each write followed by its after-hooks, inside the open transaction.
    async fn run_writes(
        &self,
        conn: &mut dyn SqlConnection,
        meta: &ResourceMetaData,
        requests: &[Request],
    ) -> Result<WriteResponse, AppError> {
        let mut combined = WriteResponse::default();
        for request in requests {
            let response = self.run_write(conn, meta, request).await?;
            self.triggers.after(request, Outcome::Write(&response))?;
            combined.rows_affected += response.rows_affected;
            combined.rows.extend(response.rows);
        }
        Ok(combined)
    }

    async fn run_write(
        &self,
        conn: &mut dyn SqlConnection,
        meta: &ResourceMetaData,
        request: &Request,
    ) -> Result<WriteResponse, AppError> {
        let mut response = WriteResponse::default();
        let is_insert = request.request_type == RequestType::Insert;

        match request.child_rows.as_deref() {
            Some(child_rows) if meta.is_hierarchical() && !child_rows.is_empty() => {
                let mut children = Vec::new();
                for params in child_rows {
                    let mut child = request.clone();
                    child.child_rows = None;
                    child.params = params.clone();
                    if is_insert {
                        for id in &request.res_ids {
                            if !child.params.iter().any(|p| p.matches_name(&id.name)) {
                                child.params.push(id.clone());
                            }
                        }
                    }
                    let (affected, values) = self.run_pass(conn, meta, &child, WritePass::Child).await?;
                    response.rows_affected += affected;
                    if is_insert {
                        children.push(ResponseRow {
                            values,
                            children: None,
                        });
                    }
                }
                if is_insert {
                    response.rows.push(ResponseRow {
                        values: response_values(meta, WritePass::Parent, &request.res_ids, &Record::new()),
                        children: Some(ChildRows {
                            key: meta.child_row_set_name().unwrap_or_default(),
                            rows: children,
                        }),
                    });
                }
            }
            _ if request.request_type == RequestType::Delete && meta.is_hierarchical() => {
                // dependents first
                let (children, _) = self.run_pass(conn, meta, request, WritePass::Child).await?;
                let (parents, _) = self.run_pass(conn, meta, request, WritePass::Parent).await?;
                response.rows_affected = children + parents;
            }
            _ => {
                let (affected, values) = self.run_pass(conn, meta, request, WritePass::Parent).await?;
                response.rows_affected = affected;
                if is_insert {
                    response.rows.push(ResponseRow {
                        values,
                        children: None,
                    });
                }
            }
        }
        Ok(response)
    }

    /// One pass; returns affected rows and, for INSERT, the written values.
    async fn run_pass(
        &self,
        conn: &mut dyn SqlConnection,
        meta: &ResourceMetaData,
        request: &Request,
        pass: WritePass,
    ) -> Result<(u64, Record), AppError> {
        let dialect = self.registry.dialect();
        let plan = build_write(dialect, meta, request, pass)?;
        let mut affected = 0;

        if request.request_type != RequestType::Insert {
            for extension in &plan.extensions {
                if extension.predicate_count == 0 {
                    tracing::debug!(table = %extension.qualified_table_name, "skipping unconstrained extension write");
                    continue;
                }
                affected += self.run_statement(conn, request, extension).await?.0;
            }
            if let Some(main) = &plan.main {
                affected += self.run_statement(conn, request, main).await?.0;
            }
            return Ok((affected, Record::new()));
        }

        let mut generated = Record::new();
        let mut extensions = plan.extensions;
        if let Some(main) = &plan.main {
            let (count, returned) = self.run_statement(conn, request, main).await?;
            affected += count;
            if let Some(row) = returned.into_iter().next() {
                generated = row;
            }
            if !generated.is_empty() {
                // extension rows reference the generated key
                let mut augmented = request.clone();
                for (name, value) in &generated {
                    if !augmented.params.iter().any(|p| p.matches_name(name)) {
                        augmented.params.push(RequestValue::from_json(name.as_str(), value)?);
                    }
                }
                extensions = build_write(dialect, meta, &augmented, pass)?.extensions;
            }
        }
        for extension in &extensions {
            affected += self.run_statement(conn, request, extension).await?.0;
        }
        Ok((affected, response_values(meta, pass, &request.params, &generated)))
    }

    async fn run_statement(
        &self,
        conn: &mut dyn SqlConnection,
        request: &Request,
        table_statement: &TableStatement,
    ) -> Result<(u64, Vec<Record>), AppError> {
        let statement = &table_statement.statement;
        self.logger.statement(request, statement);
        let to_error = |source| ExecutionError {
            sql: statement.literal_sql().to_string(),
            source,
        };
        if table_statement.returning.is_empty() {
            let count = conn.execute(statement).await.map_err(to_error)?;
            Ok((count, Vec::new()))
        } else {
            let rows = conn.query(statement).await.map_err(to_error)?;
            Ok((rows.len() as u64, rows))
        }
    }
}

/// Written values by label in column order, over the tables of `pass`.
fn response_values(
    meta: &ResourceMetaData,
    pass: WritePass,
    supplied: &[RequestValue],
    generated: &Record,
) -> Record {
    let tables = match pass {
        WritePass::Parent => meta.parent_tables(),
        WritePass::Child => meta.child_tables(),
    };
    let mut out = Record::new();
    for column in ResourceMetaData::read_columns_of(&tables) {
        if let Some(value) = generated.get(&column.label) {
            out.insert(column.label.clone(), value.clone());
        } else if let Some(param) = supplied.iter().find(|p| p.matches_name(&column.label)) {
            let value = param
                .value
                .as_deref()
                .map(|text| column.json_value(text))
                .unwrap_or(Value::Null);
            out.insert(column.label.clone(), value);
        }
    }
    out
}
