//! Scripted in-memory database and sakila-style fixtures for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use resource_sql::config::{ResourceDefinition, TableDeclaration, TableRole};
use resource_sql::db::{ConnectionProvider, Record, ResultColumn, SqlConnection};
use resource_sql::dialect::{PostgresDialect, TableRef};
use resource_sql::meta::MetaDataRegistry;
use resource_sql::service::ResourceService;
use resource_sql::sql::Statement;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

pub const FILM_QUERY: &str =
    "SELECT film_id, title, length, upper(title) AS upper_title FROM film";
pub const LANGUAGE_FILMS_QUERY: &str = "SELECT language.language_id, language.name, film.film_id, film.title \
     FROM language LEFT OUTER JOIN film ON film.language_id = language.language_id";
pub const FILM_ACTORS_QUERY: &str = "SELECT film.film_id, film.title, actor.actor_id, actor.first_name, actor.last_name \
     FROM film LEFT OUTER JOIN film_actor ON film_actor.film_id = film.film_id \
     LEFT OUTER JOIN actor ON actor.actor_id = film_actor.actor_id";
pub const FILM_DETAIL_QUERY: &str = "SELECT film.film_id, film.title, film.length, film_text.description \
     FROM film JOIN film_text ON film_text.film_id = film.film_id";
pub const LANGUAGE_FILM_TEXTS_QUERY: &str = "SELECT language.language_id, language.name, film.film_id, film.title, film_text.description \
     FROM language LEFT OUTER JOIN film ON film.language_id = language.language_id \
     LEFT OUTER JOIN film_text ON film_text.film_id = film.film_id";
const PROBE_SUFFIX: &str = " LIMIT 1 OFFSET 0";

#[derive(Default)]
struct Script {
    shapes: Vec<(String, Vec<ResultColumn>)>,
    primary_keys: HashMap<String, Vec<String>>,
    columns: HashMap<String, Vec<Record>>,
    tables: HashMap<String, TableRef>,
    results: Vec<(String, Vec<Record>)>,
    affected: Vec<(String, u64)>,
    failures: Vec<String>,
}

#[derive(Default)]
struct Journal {
    events: Vec<String>,
    describes: usize,
}

/// Shared script and journal; every connection handed out records into the same journal.
#[derive(Clone, Default)]
pub struct MockDb {
    script: Arc<Mutex<Script>>,
    journal: Arc<Mutex<Journal>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

pub fn sakila(table: &str) -> TableRef {
    TableRef {
        database: "sakila".into(),
        schema: Some("public".into()),
        table: table.into(),
    }
}

pub fn result_column(label: &str, table: Option<&str>, type_name: &str) -> ResultColumn {
    ResultColumn {
        label: label.into(),
        column_name: table.map(|_| label.to_string()),
        table: table.map(sakila),
        type_name: type_name.into(),
    }
}

/// Catalog row as returned by the postgres columns query.
pub fn catalog_column(name: &str, type_name: &str, default: Option<&str>) -> Record {
    record(json!({
        "column_name": name,
        "type_name": type_name,
        "column_default": default,
        "is_identity": false,
    }))
}

pub fn record(value: Value) -> Record {
    match value {
        Value::Object(map) => map,
        other => panic!("not an object: {}", other),
    }
}

impl MockDb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Result shape for the probe of `query`.
    pub fn shape(&self, query: &str, columns: Vec<ResultColumn>) -> &Self {
        lock(&self.script).shapes.push((query.to_string(), columns));
        self
    }

    pub fn table(&self, name: &str, keys: &[&str], columns: Vec<Record>) -> &Self {
        let mut script = lock(&self.script);
        script
            .primary_keys
            .insert(name.to_string(), keys.iter().map(|k| k.to_string()).collect());
        script.columns.insert(name.to_string(), columns);
        script.tables.insert(name.to_string(), sakila(name));
        self
    }

    /// Rows returned by any statement whose literal SQL contains `needle`.
    pub fn rows(&self, needle: &str, rows: Vec<Record>) -> &Self {
        lock(&self.script).results.push((needle.to_string(), rows));
        self
    }

    pub fn affected(&self, needle: &str, count: u64) -> &Self {
        lock(&self.script).affected.push((needle.to_string(), count));
        self
    }

    /// Fail every statement whose literal SQL contains `needle`.
    pub fn fail_on(&self, needle: &str) -> &Self {
        lock(&self.script).failures.push(needle.to_string());
        self
    }

    /// Statements and transaction markers in execution order. Catalog queries are omitted.
    pub fn events(&self) -> Vec<String> {
        lock(&self.journal).events.clone()
    }

    /// Data statements only.
    pub fn statements(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter(|e| !matches!(e.as_str(), "BEGIN" | "COMMIT" | "ROLLBACK"))
            .collect()
    }

    pub fn describes(&self) -> usize {
        lock(&self.journal).describes
    }

    pub fn clear_events(&self) {
        lock(&self.journal).events.clear();
    }

    pub fn provider(&self) -> Arc<dyn ConnectionProvider> {
        Arc::new(MockProvider { db: self.clone() })
    }

    pub fn connection(&self) -> Box<dyn SqlConnection> {
        Box::new(MockConnection { db: self.clone() })
    }

    fn log(&self, event: impl Into<String>) {
        lock(&self.journal).events.push(event.into());
    }

    fn check_failure(&self, literal: &str) -> Result<(), sqlx::Error> {
        let script = lock(&self.script);
        if script.failures.iter().any(|f| literal.contains(f.as_str())) {
            return Err(sqlx::Error::Protocol(format!("scripted failure: {}", literal)));
        }
        Ok(())
    }

    fn catalog(&self, statement: &Statement) -> Option<Vec<Record>> {
        let sql = statement.sql();
        let arg = |i: usize| {
            statement
                .params()
                .get(i)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        let script = lock(&self.script);
        if sql.contains("information_schema.key_column_usage") {
            let keys = script.primary_keys.get(&arg(1)).cloned().unwrap_or_default();
            return Some(
                keys.into_iter()
                    .map(|k| record(json!({ "column_name": k })))
                    .collect(),
            );
        }
        if sql.contains("information_schema.columns") {
            return Some(script.columns.get(&arg(1)).cloned().unwrap_or_default());
        }
        if sql.contains("information_schema.tables") {
            return Some(
                script
                    .tables
                    .get(&arg(0))
                    .map(|t| {
                        vec![record(json!({
                            "table_catalog": t.database,
                            "table_schema": t.schema,
                            "table_name": t.table,
                        }))]
                    })
                    .unwrap_or_default(),
            );
        }
        None
    }
}

pub struct MockConnection {
    db: MockDb,
}

#[async_trait]
impl SqlConnection for MockConnection {
    async fn describe(&mut self, sql: &str) -> Result<Vec<ResultColumn>, sqlx::Error> {
        lock(&self.db.journal).describes += 1;
        // widen the window for concurrent first access
        tokio::time::sleep(Duration::from_millis(20)).await;
        let query = sql.strip_suffix(PROBE_SUFFIX).unwrap_or(sql);
        let script = lock(&self.db.script);
        script
            .shapes
            .iter()
            .find(|(q, _)| q == query)
            .map(|(_, columns)| columns.clone())
            .ok_or_else(|| sqlx::Error::Protocol(format!("relation does not exist: {}", sql)))
    }

    async fn query(&mut self, statement: &Statement) -> Result<Vec<Record>, sqlx::Error> {
        if let Some(rows) = self.db.catalog(statement) {
            return Ok(rows);
        }
        let literal = statement.literal_sql();
        self.db.log(literal);
        self.db.check_failure(literal)?;
        let script = lock(&self.db.script);
        Ok(script
            .results
            .iter()
            .find(|(needle, _)| literal.contains(needle.as_str()))
            .map(|(_, rows)| rows.clone())
            .unwrap_or_default())
    }

    async fn execute(&mut self, statement: &Statement) -> Result<u64, sqlx::Error> {
        let literal = statement.literal_sql();
        self.db.log(literal);
        self.db.check_failure(literal)?;
        let script = lock(&self.db.script);
        Ok(script
            .affected
            .iter()
            .find(|(needle, _)| literal.contains(needle.as_str()))
            .map(|(_, n)| *n)
            .unwrap_or(1))
    }

    async fn begin(&mut self) -> Result<(), sqlx::Error> {
        self.db.log("BEGIN");
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), sqlx::Error> {
        self.db.log("COMMIT");
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), sqlx::Error> {
        self.db.log("ROLLBACK");
        Ok(())
    }
}

pub struct MockProvider {
    db: MockDb,
}

#[async_trait]
impl ConnectionProvider for MockProvider {
    async fn acquire(&self, _default_database: &str) -> Result<Box<dyn SqlConnection>, sqlx::Error> {
        Ok(self.db.connection())
    }
}

/// film, language, actor, film_actor and film_text, with the shapes of the fixture resources.
pub fn sakila_db() -> MockDb {
    let db = MockDb::new();
    db.table(
        "film",
        &["film_id"],
        vec![
            catalog_column("film_id", "int4", Some("nextval('film_film_id_seq'::regclass)")),
            catalog_column("title", "varchar", None),
            catalog_column("length", "int2", None),
            catalog_column("language_id", "int2", None),
        ],
    )
    .table(
        "language",
        &["language_id"],
        vec![
            catalog_column("language_id", "int4", Some("nextval('language_language_id_seq'::regclass)")),
            catalog_column("name", "bpchar", None),
            catalog_column("last_update", "timestamp", Some("now()")),
        ],
    )
    .table(
        "actor",
        &["actor_id"],
        vec![
            catalog_column("actor_id", "int4", Some("nextval('actor_actor_id_seq'::regclass)")),
            catalog_column("first_name", "varchar", None),
            catalog_column("last_name", "varchar", None),
        ],
    )
    .table(
        "film_actor",
        &["actor_id", "film_id"],
        vec![
            catalog_column("actor_id", "int2", None),
            catalog_column("film_id", "int2", None),
            catalog_column("last_update", "timestamp", Some("now()")),
        ],
    )
    .table(
        "film_text",
        &["film_id"],
        vec![
            catalog_column("film_id", "int2", None),
            catalog_column("description", "text", None),
        ],
    )
    .shape(
        FILM_QUERY,
        vec![
            result_column("film_id", Some("film"), "int4"),
            result_column("title", Some("film"), "varchar"),
            result_column("length", Some("film"), "int2"),
            result_column("upper_title", None, "text"),
        ],
    )
    .shape(
        LANGUAGE_FILMS_QUERY,
        vec![
            result_column("language_id", Some("language"), "int4"),
            result_column("name", Some("language"), "bpchar"),
            result_column("film_id", Some("film"), "int4"),
            result_column("title", Some("film"), "varchar"),
        ],
    )
    .shape(
        FILM_ACTORS_QUERY,
        vec![
            result_column("film_id", Some("film"), "int4"),
            result_column("title", Some("film"), "varchar"),
            result_column("actor_id", Some("actor"), "int4"),
            result_column("first_name", Some("actor"), "varchar"),
            result_column("last_name", Some("actor"), "varchar"),
        ],
    )
    .shape(
        FILM_DETAIL_QUERY,
        vec![
            result_column("film_id", Some("film"), "int4"),
            result_column("title", Some("film"), "varchar"),
            result_column("length", Some("film"), "int2"),
            result_column("description", Some("film_text"), "text"),
        ],
    )
    .shape(
        LANGUAGE_FILM_TEXTS_QUERY,
        vec![
            result_column("language_id", Some("language"), "int4"),
            result_column("name", Some("language"), "bpchar"),
            result_column("film_id", Some("film"), "int4"),
            result_column("title", Some("film"), "varchar"),
            result_column("description", Some("film_text"), "text"),
        ],
    );
    db
}

pub fn film_definition() -> ResourceDefinition {
    ResourceDefinition {
        name: "film".into(),
        query: FILM_QUERY.into(),
        default_database: "sakila".into(),
        tables: vec![TableDeclaration::new("film", TableRole::Parent)],
    }
}

pub fn language_films_definition() -> ResourceDefinition {
    let mut films = TableDeclaration::new("film", TableRole::Child);
    films.row_set_alias = Some("films".into());
    let mut languages = TableDeclaration::new("language", TableRole::Parent);
    languages.row_set_alias = Some("languages".into());
    ResourceDefinition {
        name: "language_films".into(),
        query: LANGUAGE_FILMS_QUERY.into(),
        default_database: "sakila".into(),
        tables: vec![languages, films],
    }
}

pub fn film_actors_definition() -> ResourceDefinition {
    let mut actors = TableDeclaration::new("actor", TableRole::Child);
    actors.row_set_alias = Some("actors".into());
    ResourceDefinition {
        name: "film_actors".into(),
        query: FILM_ACTORS_QUERY.into(),
        default_database: "sakila".into(),
        tables: vec![
            TableDeclaration::new("film", TableRole::Parent),
            actors,
            TableDeclaration::new("film_actor", TableRole::Join),
        ],
    }
}

/// film with its film_text row as a parent extension.
pub fn film_detail_definition() -> ResourceDefinition {
    ResourceDefinition {
        name: "film_detail".into(),
        query: FILM_DETAIL_QUERY.into(),
        default_database: "sakila".into(),
        tables: vec![
            TableDeclaration::new("film", TableRole::Parent),
            TableDeclaration::new("film_text", TableRole::ParentExtension),
        ],
    }
}

/// language_films with film_text extending each child film.
pub fn language_film_texts_definition() -> ResourceDefinition {
    let mut films = TableDeclaration::new("film", TableRole::Child);
    films.row_set_alias = Some("films".into());
    ResourceDefinition {
        name: "language_film_texts".into(),
        query: LANGUAGE_FILM_TEXTS_QUERY.into(),
        default_database: "sakila".into(),
        tables: vec![
            TableDeclaration::new("language", TableRole::Parent),
            films,
            TableDeclaration::new("film_text", TableRole::ChildExtension),
        ],
    }
}

fn registry_of(definitions: Vec<ResourceDefinition>) -> Arc<MetaDataRegistry> {
    match MetaDataRegistry::new(definitions, Arc::new(PostgresDialect)) {
        Ok(registry) => Arc::new(registry),
        Err(e) => panic!("fixture definitions are invalid: {}", e),
    }
}

pub fn registry() -> Arc<MetaDataRegistry> {
    registry_of(vec![
        film_definition(),
        language_films_definition(),
        film_actors_definition(),
    ])
}

pub fn service(db: &MockDb) -> ResourceService {
    ResourceService::new(registry(), db.provider())
}

/// Service over the extension-table resources only.
pub fn extension_service(db: &MockDb) -> ResourceService {
    ResourceService::new(
        registry_of(vec![film_detail_definition(), language_film_texts_definition()]),
        db.provider(),
    )
}
