//! Turns result rows into resource records.

use crate::db::Record;
use crate::meta::{ColumnMetaData, ResourceMetaData};
use serde_json::Value;

pub fn assemble(meta: &ResourceMetaData, rows: Vec<Record>) -> Vec<Record> {
    if meta.is_hierarchical() {
        fold_hierarchical(meta, rows)
    } else {
        fold_flat(meta, rows)
    }
}

fn project(row: &Record, columns: &[ColumnMetaData]) -> Record {
    let mut out = Record::new();
    for column in columns {
        let value = row.get(&column.label).cloned().unwrap_or(Value::Null);
        out.insert(column.label.clone(), value);
    }
    out
}

/// One record per row, queried columns only.
pub fn fold_flat(meta: &ResourceMetaData, rows: Vec<Record>) -> Vec<Record> {
    let columns: Vec<ColumnMetaData> = meta.read_columns().into_iter().cloned().collect();
    rows.iter().map(|row| project(row, &columns)).collect()
}

/// Values of `labels` in `row`; a missing label reads as null.
fn key_of(row: &Record, labels: &[String]) -> Vec<Value> {
    labels
        .iter()
        .map(|l| row.get(l).cloned().unwrap_or(Value::Null))
        .collect()
}

/// Parent records with nested children. Rows must arrive ordered by parent key.
pub fn fold_hierarchical(meta: &ResourceMetaData, rows: Vec<Record>) -> Vec<Record> {
    let parent_columns = ResourceMetaData::read_columns_of(&meta.parent_tables());
    let child_columns = ResourceMetaData::read_columns_of(&meta.child_tables());
    let child_key = meta
        .child_row_set_name()
        .unwrap_or_else(|| meta.parent().table_name.clone());

    // without a declared key, the whole parent projection identifies the parent
    let parent_labels: Vec<String> = if meta.parent().primary_keys.is_empty() {
        parent_columns.iter().map(|c| c.label.clone()).collect()
    } else {
        meta.parent().primary_keys.clone()
    };
    let mut child_labels: Vec<String> = meta
        .child()
        .map(|c| {
            c.primary_keys
                .iter()
                .filter(|l| child_columns.iter().any(|col| &col.label == *l))
                .cloned()
                .collect()
        })
        .unwrap_or_default();
    if child_labels.is_empty() {
        child_labels = child_columns.iter().map(|c| c.label.clone()).collect();
    }

    let mut out: Vec<(Record, Vec<Value>)> = Vec::new();
    let mut current: Option<Vec<Value>> = None;
    for row in &rows {
        let key = key_of(row, &parent_labels);
        if current.as_ref() != Some(&key) {
            out.push((project(row, &parent_columns), Vec::new()));
            current = Some(key);
        }
        // outer-join artifact: no child for this parent
        if key_of(row, &child_labels).iter().all(Value::is_null) {
            continue;
        }
        if let Some((_, children)) = out.last_mut() {
            children.push(Value::Object(project(row, &child_columns)));
        }
    }

    out.into_iter()
        .map(|(mut record, children)| {
            record.insert(child_key.clone(), Value::Array(children));
            record
        })
        .collect()
}
