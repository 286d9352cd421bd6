//! Builds a [`ResourceMetaData`] from a definition and the live schema.

use super::{ColumnMetaData, ResourceMetaData, TableMetaData};
use crate::config::{ResourceDefinition, TableRole};
use crate::db::{record_str, Record, ResultColumn, SqlConnection};
use crate::dialect::{CatalogColumn, Dialect, TableRef};
use crate::error::MetaDataError;
use crate::sql::Statement;

fn driver_error(resource: &str, sql: &str, source: sqlx::Error) -> MetaDataError {
    MetaDataError::Driver {
        resource: resource.to_string(),
        sql: sql.to_string(),
        source,
    }
}

async fn catalog(
    conn: &mut dyn SqlConnection,
    resource: &str,
    statement: Statement,
) -> Result<Vec<Record>, MetaDataError> {
    tracing::debug!(resource, sql = %statement.literal_sql(), "catalog query");
    conn.query(&statement)
        .await
        .map_err(|e| driver_error(resource, statement.literal_sql(), e))
}

async fn primary_key_names(
    conn: &mut dyn SqlConnection,
    dialect: &dyn Dialect,
    resource: &str,
    table: &TableRef,
) -> Result<Vec<String>, MetaDataError> {
    let rows = catalog(conn, resource, dialect.primary_keys_query(table)).await?;
    Ok(rows.iter().filter_map(|r| record_str(r, "column_name")).collect())
}

async fn catalog_columns(
    conn: &mut dyn SqlConnection,
    dialect: &dyn Dialect,
    resource: &str,
    table: &TableRef,
) -> Result<Vec<CatalogColumn>, MetaDataError> {
    let rows = catalog(conn, resource, dialect.columns_query(table)).await?;
    Ok(rows.iter().filter_map(|r| dialect.read_catalog_column(r)).collect())
}

fn queried_column(
    dialect: &dyn Dialect,
    number: usize,
    result: &ResultColumn,
    table: &TableMetaData,
) -> ColumnMetaData {
    let column_name = result.column_name.clone().unwrap_or_else(|| result.label.clone());
    let mut column = ColumnMetaData {
        column_number: number,
        label: result.label.clone(),
        qualified_column_name: format!("{}.{}", table.qualified_table_name, column_name),
        column_name,
        table_name: table.table_name.clone(),
        qualified_table_name: table.qualified_table_name.clone(),
        database_name: table.database_name.clone(),
        schema_name: table.schema_name.clone(),
        type_name: result.type_name.clone(),
        type_class: dialect.type_class(&result.type_name),
        primary_key: false,
        read_only: false,
        non_queried_foreign_key: false,
        sequence_name: None,
    };
    dialect.adjust_column(&mut column);
    column
}

/// Column not in the select list, used only to link writes.
fn synthetic_column(
    dialect: &dyn Dialect,
    number: usize,
    catalog: &CatalogColumn,
    table: &TableMetaData,
) -> ColumnMetaData {
    let table_ref = table.table_ref();
    let mut column = ColumnMetaData {
        column_number: number,
        label: catalog.name.clone(),
        column_name: catalog.name.clone(),
        qualified_column_name: format!("{}.{}", table.qualified_table_name, catalog.name),
        table_name: table.table_name.clone(),
        qualified_table_name: table.qualified_table_name.clone(),
        database_name: table.database_name.clone(),
        schema_name: table.schema_name.clone(),
        type_name: catalog.type_name.clone(),
        type_class: dialect.type_class(&catalog.type_name),
        primary_key: false,
        read_only: false,
        non_queried_foreign_key: true,
        sequence_name: dialect.sequence_name(&table_ref, catalog),
    };
    dialect.adjust_column(&mut column);
    column
}

/// Flag key columns and record the key in catalog order.
fn mark_primary_keys(table: &mut TableMetaData, key_names: &[String]) {
    let mut labels = Vec::new();
    for name in key_names {
        if let Some(column) = table.column_mut_by_name(name) {
            column.primary_key = true;
            labels.push(column.label.clone());
        }
    }
    table.primary_keys = labels;
}

/// Introspect the schema behind `definition`.
pub async fn introspect(
    definition: &ResourceDefinition,
    conn: &mut dyn SqlConnection,
    dialect: &dyn Dialect,
) -> Result<ResourceMetaData, MetaDataError> {
    let resource = definition.name.as_str();
    let shape_error = |message: String| MetaDataError::Shape {
        resource: resource.to_string(),
        message,
    };

    // 1. shape of the base query
    let probe = dialect.probe_query(&definition.query);
    let shape = conn
        .describe(&probe)
        .await
        .map_err(|e| driver_error(resource, &probe, e))?;

    // 2-3. tables, roles and queried columns
    let mut tables: Vec<TableMetaData> = Vec::new();
    let mut expressions: Vec<(usize, &ResultColumn)> = Vec::new();
    for (i, result) in shape.iter().enumerate() {
        let number = i + 1;
        let Some(table_ref) = &result.table else {
            expressions.push((number, result));
            continue;
        };
        let qualified = dialect.qualified_table_name(table_ref);
        let idx = match tables.iter().position(|t| t.qualified_table_name == qualified) {
            Some(idx) => idx,
            None => {
                let schema_qualified = table_ref
                    .schema
                    .as_ref()
                    .map(|s| format!("{}.{}", s, table_ref.table));
                let role = definition.role_of(&qualified, schema_qualified.as_deref(), &table_ref.table);
                tables.push(TableMetaData::new(table_ref.clone(), qualified, role));
                tables.len() - 1
            }
        };
        let column = queried_column(dialect, number, result, &tables[idx]);
        tables[idx].add_column(column);
    }

    let parent_idx = tables
        .iter()
        .position(|t| t.role == TableRole::Parent)
        .ok_or_else(|| shape_error("parent table not found in the query's select list".into()))?;
    for (number, result) in expressions {
        let parent = &tables[parent_idx];
        let column = ColumnMetaData {
            column_number: number,
            label: result.label.clone(),
            column_name: result.label.clone(),
            qualified_column_name: format!("{}.{}", parent.qualified_table_name, result.label),
            table_name: parent.table_name.clone(),
            qualified_table_name: parent.qualified_table_name.clone(),
            database_name: parent.database_name.clone(),
            schema_name: parent.schema_name.clone(),
            type_name: result.type_name.clone(),
            type_class: dialect.type_class(&result.type_name),
            primary_key: false,
            read_only: true,
            non_queried_foreign_key: false,
            sequence_name: None,
        };
        tables[parent_idx].add_column(column);
    }

    // 4. primary keys, by column name
    let mut key_names: Vec<Vec<String>> = Vec::with_capacity(tables.len());
    for table in &tables {
        key_names.push(primary_key_names(conn, dialect, resource, &table.table_ref()).await?);
    }

    // 5. sequences and synthetic foreign-key columns
    let child_idx = tables.iter().position(|t| t.role == TableRole::Child);
    let mut next_number = shape.len() + 1;
    for idx in 0..tables.len() {
        let table_ref = tables[idx].table_ref();
        let columns = catalog_columns(conn, dialect, resource, &table_ref).await?;
        let role = tables[idx].role;
        let owner_keys: Vec<&String> = match role {
            TableRole::Parent => Vec::new(),
            TableRole::ChildExtension => child_idx.map(|c| key_names[c].iter().collect()).unwrap_or_default(),
            TableRole::Join => key_names[parent_idx]
                .iter()
                .chain(child_idx.map(|c| key_names[c].as_slice()).unwrap_or(&[]))
                .collect(),
            _ => key_names[parent_idx].iter().collect(),
        };
        for catalog in &columns {
            if let Some(column) = tables[idx].column_mut_by_name(&catalog.name) {
                if !column.read_only {
                    column.sequence_name = dialect.sequence_name(&table_ref, catalog);
                }
                continue;
            }
            if owner_keys.iter().any(|k| k.eq_ignore_ascii_case(&catalog.name)) {
                let column = synthetic_column(dialect, next_number, catalog, &tables[idx]);
                next_number += 1;
                tables[idx].add_column(column);
            }
        }
    }
    for (table, keys) in tables.iter_mut().zip(&key_names) {
        mark_primary_keys(table, keys);
    }

    // 6. join table absent from the select list
    if let Some(declared) = definition.first_with_role(TableRole::Join) {
        if !tables.iter().any(|t| t.role == TableRole::Join) {
            let rows = catalog(
                conn,
                resource,
                dialect.join_table_query(&declared.name, &definition.default_database),
            )
            .await?;
            let table_ref = rows
                .first()
                .and_then(|r| dialect.read_table_ref(r))
                .ok_or_else(|| shape_error(format!("join table {} not found", declared.name)))?;
            let qualified = dialect.qualified_table_name(&table_ref);
            let mut join = TableMetaData::new(table_ref.clone(), qualified, TableRole::Join);
            for catalog in catalog_columns(conn, dialect, resource, &table_ref).await? {
                let column = synthetic_column(dialect, next_number, &catalog, &join);
                next_number += 1;
                join.add_column(column);
            }
            let keys = primary_key_names(conn, dialect, resource, &table_ref).await?;
            mark_primary_keys(&mut join, &keys);
            tables.push(join);
        }
    }

    // 7. graph
    let meta = ResourceMetaData::assemble(definition.clone(), tables)?;
    tracing::info!(
        resource,
        tables = meta.tables().len(),
        multiple_databases = meta.multiple_databases(),
        "introspected resource"
    );
    Ok(meta)
}
