//! Builds the parameterized SELECT and per-table INSERT/UPDATE/DELETE for a resource.

use super::{Statement, StatementBuilder};
use crate::dialect::{trim_query, Dialect};
use crate::error::RequestError;
use crate::meta::{ColumnMetaData, ResourceMetaData, TableMetaData};
use crate::request::{Operator, Page, Request, RequestType, RequestValue};
use regex::Regex;
use std::sync::OnceLock;

/// Which side of a hierarchical resource a write addresses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WritePass {
    Parent,
    Child,
}

/// Statement against one target table.
#[derive(Clone, Debug)]
pub struct TableStatement {
    pub qualified_table_name: String,
    pub statement: Statement,
    /// WHERE predicates emitted; zero for inserts.
    pub predicate_count: usize,
    /// Labels of generated columns returned by an INSERT.
    pub returning: Vec<String>,
}

/// Statements of one write pass: the main table kept apart so callers can sequence it.
#[derive(Clone, Debug, Default)]
pub struct WritePlan {
    pub main: Option<TableStatement>,
    pub extensions: Vec<TableStatement>,
}

fn where_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bwhere\b").ok()).as_ref()
}

/// Appends `WHERE`/`AND` predicates and counts them.
struct Predicates {
    count: usize,
    base_has_where: bool,
}

impl Predicates {
    fn new(base_has_where: bool) -> Self {
        Predicates {
            count: 0,
            base_has_where,
        }
    }

    fn push(
        &mut self,
        b: &mut StatementBuilder<'_>,
        reference: &str,
        value: &RequestValue,
        column: &ColumnMetaData,
    ) -> Result<(), RequestError> {
        let joiner = if self.count == 0 && !self.base_has_where {
            " WHERE "
        } else {
            " AND "
        };
        b.push(joiner).push(reference);
        match value.operator.normalized() {
            Operator::IsNull | Operator::IsNotNull => {
                b.push(" ").push(value.operator.sql());
            }
            Operator::In => {
                b.push(" IN (");
                let items = value.in_values.as_deref().unwrap_or(&[]);
                if items.is_empty() {
                    b.push("NULL");
                }
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        b.push(", ");
                    }
                    b.param(item, column);
                }
                b.push(")");
            }
            Operator::Equals => {
                let raw = required_value(value)?;
                if has_unescaped_percent(raw) {
                    b.push(" LIKE ").param(raw, column);
                } else {
                    b.push(" = ").param(&raw.replace("\\%", "%"), column);
                }
            }
            op => {
                let raw = required_value(value)?;
                b.push(" ").push(op.sql()).push(" ").param(raw, column);
            }
        }
        self.count += 1;
        Ok(())
    }
}

fn required_value(value: &RequestValue) -> Result<&str, RequestError> {
    value
        .value
        .as_deref()
        .ok_or_else(|| RequestError::Malformed(format!("{} requires a value", value.name)))
}

fn has_unescaped_percent(s: &str) -> bool {
    let mut escaped = false;
    for c in s.chars() {
        match c {
            '\\' if !escaped => escaped = true,
            '%' if !escaped => return true,
            _ => escaped = false,
        }
    }
    false
}

/// Queried column first, synthetic fallback.
fn resolve_column<'a>(meta: &'a ResourceMetaData, label: &str) -> Option<&'a ColumnMetaData> {
    let mut synthetic = None;
    for table in meta.tables() {
        if let Some(column) = table.column(label) {
            if !column.non_queried_foreign_key {
                return Some(column);
            }
            synthetic.get_or_insert(column);
        }
    }
    synthetic
}

/// SELECT: base query, identifier and filter predicates, ORDER BY keys, then paging.
pub fn build_select(
    dialect: &dyn Dialect,
    meta: &ResourceMetaData,
    res_ids: &[RequestValue],
    params: &[RequestValue],
    page: Option<&Page>,
) -> Result<Statement, RequestError> {
    let base = trim_query(&meta.definition.query);
    let base_has_where = where_re().map(|re| re.is_match(base)).unwrap_or(false);
    let mut b = StatementBuilder::new(dialect);
    b.push(base);

    let mut predicates = Predicates::new(base_has_where);
    for value in res_ids.iter().chain(params) {
        let Some(column) = resolve_column(meta, &value.name) else {
            tracing::debug!(resource = %meta.name, param = %value.name, "ignoring unknown parameter");
            continue;
        };
        if column.read_only {
            return Err(RequestError::ReadOnlyColumn(column.label.clone()));
        }
        if column.non_queried_foreign_key {
            tracing::debug!(resource = %meta.name, param = %value.name, "ignoring non-queried column");
            continue;
        }
        let reference = dialect.column_reference(column, meta.multiple_databases());
        predicates.push(&mut b, &reference, value, column)?;
    }

    let mut order: Vec<String> = meta
        .parent()
        .primary_key_columns()
        .into_iter()
        .map(|c| dialect.column_reference(c, meta.multiple_databases()))
        .collect();
    if let Some(child) = meta.child() {
        order.extend(
            child
                .primary_key_columns()
                .into_iter()
                .map(|c| dialect.column_reference(c, meta.multiple_databases())),
        );
    }
    if !order.is_empty() {
        b.push(" ORDER BY ").push(&order.join(", "));
    }

    if let Some(page) = page {
        match (page.limit, page.offset) {
            (Some(limit), Some(offset)) => {
                b.push(&dialect.limit_clause(limit, offset));
            }
            (None, None) => {}
            _ => return Err(RequestError::IncompletePagination),
        }
    }
    Ok(b.finish())
}

/// Tables written by `pass`; the first is the main table.
pub fn write_targets(
    meta: &ResourceMetaData,
    request_type: RequestType,
    pass: WritePass,
) -> Vec<&TableMetaData> {
    if !meta.is_hierarchical() || pass == WritePass::Parent {
        return meta.parent_tables();
    }
    match meta.join() {
        Some(join) if request_type != RequestType::Update => vec![join],
        _ => meta.child_tables(),
    }
}

pub fn build_write(
    dialect: &dyn Dialect,
    meta: &ResourceMetaData,
    request: &Request,
    pass: WritePass,
) -> Result<WritePlan, RequestError> {
    let targets = write_targets(meta, request.request_type, pass);
    match request.request_type {
        RequestType::Insert => build_insert(dialect, &targets, &request.params),
        RequestType::Update => build_update(dialect, &targets, request),
        RequestType::Delete => build_delete(dialect, &targets, request, pass),
        RequestType::Select => Err(RequestError::Malformed("SELECT is not a write".into())),
    }
}

fn push_value(
    b: &mut StatementBuilder<'_>,
    value: &RequestValue,
    column: &ColumnMetaData,
) -> Result<(), RequestError> {
    // only a plain value or null can be assigned
    match (value.operator.normalized(), value.value.as_deref()) {
        (Operator::IsNull, _) => {
            b.push("NULL");
        }
        (Operator::Equals, Some(v)) if value.in_values.is_none() => {
            b.param(v, column);
        }
        (Operator::Equals, None) if value.in_values.is_none() => {
            b.push("NULL");
        }
        (operator, _) => {
            return Err(RequestError::Malformed(format!(
                "{} cannot be assigned with operator {}",
                value.name,
                operator.sql()
            )))
        }
    }
    Ok(())
}

fn build_insert(
    dialect: &dyn Dialect,
    targets: &[&TableMetaData],
    params: &[RequestValue],
) -> Result<WritePlan, RequestError> {
    let mut plan = WritePlan::default();
    for (i, table) in targets.iter().enumerate() {
        let mut supplied: Vec<(&ColumnMetaData, &RequestValue)> = Vec::new();
        for value in params {
            let Some(column) = table.column(&value.name) else {
                continue;
            };
            if column.read_only {
                return Err(RequestError::ReadOnlyColumn(column.label.clone()));
            }
            if supplied.iter().any(|(c, _)| c.label == column.label) {
                continue;
            }
            supplied.push((column, value));
        }
        if supplied.is_empty() {
            if i == 0 {
                return Err(RequestError::NoValidParameters);
            }
            continue;
        }

        let mut b = StatementBuilder::new(dialect);
        b.push("INSERT INTO ")
            .push(&dialect.write_table_name(&table.table_ref()))
            .push(" (");
        let names: Vec<&str> = supplied.iter().map(|(c, _)| c.column_name.as_str()).collect();
        b.push(&names.join(", ")).push(") VALUES (");
        for (n, (column, value)) in supplied.iter().enumerate() {
            if n > 0 {
                b.push(", ");
            }
            push_value(&mut b, value, column)?;
        }
        b.push(")");

        let generated: Vec<&ColumnMetaData> = table
            .columns()
            .into_iter()
            .filter(|c| c.is_sequence() && !supplied.iter().any(|(s, _)| s.label == c.label))
            .collect();
        let exprs: Vec<String> = generated
            .iter()
            .map(|c| {
                if c.column_name == c.label {
                    c.column_name.clone()
                } else {
                    format!("{} AS {}", c.column_name, c.label)
                }
            })
            .collect();
        let expr_refs: Vec<&str> = exprs.iter().map(String::as_str).collect();
        let mut returning = Vec::new();
        if let Some(clause) = dialect.returning_clause(&expr_refs) {
            b.push(&clause);
            returning = generated.iter().map(|c| c.label.clone()).collect();
        }

        let stmt = TableStatement {
            qualified_table_name: table.qualified_table_name.clone(),
            statement: b.finish(),
            predicate_count: 0,
            returning,
        };
        if i == 0 {
            plan.main = Some(stmt);
        } else {
            plan.extensions.push(stmt);
        }
    }
    Ok(plan)
}

/// WHERE over `values` restricted to `table`'s own columns.
fn push_table_predicates(
    b: &mut StatementBuilder<'_>,
    table: &TableMetaData,
    values: &[&RequestValue],
) -> Result<usize, RequestError> {
    let mut predicates = Predicates::new(false);
    for value in values {
        let Some(column) = table.column(&value.name) else {
            continue;
        };
        if column.read_only {
            continue;
        }
        predicates.push(b, &column.column_name, value, column)?;
    }
    Ok(predicates.count)
}

fn build_update(
    dialect: &dyn Dialect,
    targets: &[&TableMetaData],
    request: &Request,
) -> Result<WritePlan, RequestError> {
    // Key params join the ids on a copy; later passes still see the request ids.
    let mut ids: Vec<RequestValue> = request.res_ids.clone();
    let mut sets: Vec<(&str, &ColumnMetaData, &RequestValue)> = Vec::new();
    for value in &request.params {
        let Some((table, column)) = ResourceMetaData::find_column(targets, &value.name) else {
            tracing::debug!(resource = %request.resource, param = %value.name, "ignoring unknown parameter");
            continue;
        };
        if column.read_only {
            return Err(RequestError::ReadOnlyColumn(column.label.clone()));
        }
        if column.primary_key {
            ids.push(value.clone());
            continue;
        }
        if column.non_queried_foreign_key {
            continue;
        }
        sets.push((table.qualified_table_name.as_str(), column, value));
    }
    if sets.is_empty() {
        return Err(RequestError::NoValidParameters);
    }

    let id_refs: Vec<&RequestValue> = ids.iter().collect();
    let mut plan = WritePlan::default();
    for (i, table) in targets.iter().enumerate() {
        let assignments: Vec<_> = sets
            .iter()
            .filter(|(owner, _, _)| *owner == table.qualified_table_name)
            .collect();
        if assignments.is_empty() {
            continue;
        }
        let mut b = StatementBuilder::new(dialect);
        b.push("UPDATE ")
            .push(&dialect.write_table_name(&table.table_ref()))
            .push(" SET ");
        for (n, (_, column, value)) in assignments.iter().enumerate() {
            if n > 0 {
                b.push(", ");
            }
            b.push(&column.column_name).push(" = ");
            push_value(&mut b, value, column)?;
        }
        let predicate_count = push_table_predicates(&mut b, table, &id_refs)?;
        if i == 0 && predicate_count == 0 {
            return Err(RequestError::MissingPredicate(table.qualified_table_name.clone()));
        }
        let stmt = TableStatement {
            qualified_table_name: table.qualified_table_name.clone(),
            statement: b.finish(),
            predicate_count,
            returning: Vec::new(),
        };
        if i == 0 {
            plan.main = Some(stmt);
        } else {
            plan.extensions.push(stmt);
        }
    }
    Ok(plan)
}

fn build_delete(
    dialect: &dyn Dialect,
    targets: &[&TableMetaData],
    request: &Request,
    pass: WritePass,
) -> Result<WritePlan, RequestError> {
    let values: Vec<&RequestValue> = request.res_ids.iter().chain(&request.params).collect();
    let mut plan = WritePlan::default();
    for (i, table) in targets.iter().enumerate() {
        let mut b = StatementBuilder::new(dialect);
        b.push("DELETE FROM ")
            .push(&dialect.write_table_name(&table.table_ref()));
        let predicate_count = push_table_predicates(&mut b, table, &values)?;
        if predicate_count == 0 {
            if i == 0 && pass == WritePass::Parent {
                return Err(RequestError::MissingPredicate(table.qualified_table_name.clone()));
            }
            continue;
        }
        let stmt = TableStatement {
            qualified_table_name: table.qualified_table_name.clone(),
            statement: b.finish(),
            predicate_count,
            returning: Vec::new(),
        };
        if i == 0 {
            plan.main = Some(stmt);
        } else {
            plan.extensions.push(stmt);
        }
    }
    Ok(plan)
}
