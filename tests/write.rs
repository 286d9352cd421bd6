mod common;

use common::*;
use resource_sql::error::{AppError, RequestError, TriggerError};
use resource_sql::request::{Request, RequestType, RequestValue};
use resource_sql::service::{Outcome, RequestLogger, SecurityContext, TriggerHook, TriggerRegistry};
use resource_sql::sql::Statement;
use serde_json::json;
use std::sync::{Arc, Mutex};

fn ctx() -> SecurityContext {
    SecurityContext::default()
}

#[tokio::test]
async fn insert_runs_in_a_transaction_and_reports_generated_key() {
    let db = sakila_db();
    db.rows("INSERT INTO public.film", vec![record(json!({ "film_id": 1001 }))]);
    let service = service(&db);
    let request = Request::new(RequestType::Insert, "film")
        .with_param(RequestValue::new("title", "ACE GOLDFINGER"))
        .with_param(RequestValue::new("length", "48"));

    let (_, response) = service.write(&ctx(), &request).await.unwrap();
    assert_eq!(
        db.events(),
        vec![
            "BEGIN".to_string(),
            "INSERT INTO public.film (title, length) VALUES ('ACE GOLDFINGER', 48) RETURNING film_id"
                .to_string(),
            "COMMIT".to_string(),
        ]
    );
    assert_eq!(response.rows_affected, 1);
    assert_eq!(
        response.rows[0].to_value(),
        json!({ "film_id": 1001, "title": "ACE GOLDFINGER", "length": 48 })
    );
}

#[tokio::test]
async fn child_insert_links_to_parent_through_synthetic_key() {
    let db = sakila_db();
    db.rows("INSERT INTO public.film", vec![record(json!({ "film_id": 1001 }))]);
    let service = service(&db);
    let request = Request::new(RequestType::Insert, "language_films")
        .with_res_id("language_id", "1")
        .with_child_row(vec![RequestValue::new("title", "NEW FILM")]);

    let (_, response) = service.write(&ctx(), &request).await.unwrap();
    assert_eq!(
        db.statements(),
        vec!["INSERT INTO public.film (title, language_id) VALUES ('NEW FILM', 1) RETURNING film_id"
            .to_string()]
    );
    assert_eq!(
        response.rows[0].to_value(),
        json!({
            "language_id": 1,
            "films": [{ "film_id": 1001, "title": "NEW FILM" }]
        })
    );
}

#[tokio::test]
async fn many_to_many_child_insert_and_delete_target_the_join_table() {
    let db = sakila_db();
    let service = service(&db);
    let insert = Request::new(RequestType::Insert, "film_actors")
        .with_res_id("film_id", "1")
        .with_child_row(vec![RequestValue::new("actor_id", "5")])
        .with_child_row(vec![RequestValue::new("actor_id", "6")]);
    let (_, response) = service.write(&ctx(), &insert).await.unwrap();
    assert_eq!(response.rows_affected, 2);
    assert_eq!(
        db.statements(),
        vec![
            "INSERT INTO public.film_actor (actor_id, film_id) VALUES (5, 1)".to_string(),
            "INSERT INTO public.film_actor (actor_id, film_id) VALUES (6, 1)".to_string(),
        ]
    );

    db.clear_events();
    let delete = Request::new(RequestType::Delete, "film_actors").with_res_id("film_id", "1");
    service.write(&ctx(), &delete).await.unwrap();
    assert_eq!(
        db.events(),
        vec![
            "BEGIN".to_string(),
            "DELETE FROM public.film_actor WHERE film_id = 1".to_string(),
            "DELETE FROM public.film WHERE film_id = 1".to_string(),
            "COMMIT".to_string(),
        ]
    );
}

#[tokio::test]
async fn many_to_many_child_update_targets_the_child_table() {
    let db = sakila_db();
    let service = service(&db);
    let update = Request::new(RequestType::Update, "film_actors")
        .with_res_id("film_id", "1")
        .with_child_row(vec![
            RequestValue::new("actor_id", "5"),
            RequestValue::new("first_name", "PENELOPE"),
        ]);
    service.write(&ctx(), &update).await.unwrap();
    assert_eq!(
        db.statements(),
        vec!["UPDATE public.actor SET first_name = 'PENELOPE' WHERE actor_id = 5".to_string()]
    );
}

#[tokio::test]
async fn parent_extension_insert_follows_the_generated_key() {
    let db = sakila_db();
    db.rows("INSERT INTO public.film", vec![record(json!({ "film_id": 1001 }))]);
    let service = extension_service(&db);
    let request = Request::new(RequestType::Insert, "film_detail")
        .with_param(RequestValue::new("title", "ACE GOLDFINGER"))
        .with_param(RequestValue::new("description", "A Astounding Epistle"));

    let (_, response) = service.write(&ctx(), &request).await.unwrap();
    assert_eq!(
        db.events(),
        vec![
            "BEGIN".to_string(),
            "INSERT INTO public.film (title) VALUES ('ACE GOLDFINGER') RETURNING film_id".to_string(),
            "INSERT INTO public.film_text (description, film_id) VALUES ('A Astounding Epistle', 1001)"
                .to_string(),
            "COMMIT".to_string(),
        ]
    );
    assert_eq!(response.rows_affected, 2);
    assert_eq!(
        response.rows[0].to_value(),
        json!({ "film_id": 1001, "title": "ACE GOLDFINGER", "description": "A Astounding Epistle" })
    );
}

#[tokio::test]
async fn parent_extension_update_and_delete_run_before_the_main_table() {
    let db = sakila_db();
    let service = extension_service(&db);
    let update = Request::new(RequestType::Update, "film_detail")
        .with_res_id("film_id", "7")
        .with_param(RequestValue::new("title", "Y"))
        .with_param(RequestValue::new("description", "E"));
    service.write(&ctx(), &update).await.unwrap();
    assert_eq!(
        db.events(),
        vec![
            "BEGIN".to_string(),
            "UPDATE public.film_text SET description = 'E' WHERE film_id = 7".to_string(),
            "UPDATE public.film SET title = 'Y' WHERE film_id = 7".to_string(),
            "COMMIT".to_string(),
        ]
    );

    db.clear_events();
    let delete = Request::new(RequestType::Delete, "film_detail").with_res_id("film_id", "7");
    let (_, response) = service.write(&ctx(), &delete).await.unwrap();
    assert_eq!(response.rows_affected, 2);
    assert_eq!(
        db.events(),
        vec![
            "BEGIN".to_string(),
            "DELETE FROM public.film_text WHERE film_id = 7".to_string(),
            "DELETE FROM public.film WHERE film_id = 7".to_string(),
            "COMMIT".to_string(),
        ]
    );
}

#[tokio::test]
async fn extension_update_without_its_own_predicate_is_skipped() {
    let db = sakila_db();
    let service = extension_service(&db);
    let update = Request::new(RequestType::Update, "film_detail")
        .with_res_id("title", "ACADEMY DINOSAUR")
        .with_param(RequestValue::new("length", "90"))
        .with_param(RequestValue::new("description", "E"));
    let (_, response) = service.write(&ctx(), &update).await.unwrap();
    assert_eq!(response.rows_affected, 1);
    assert_eq!(
        db.statements(),
        vec!["UPDATE public.film SET length = 90 WHERE title = 'ACADEMY DINOSAUR'".to_string()]
    );
}

#[tokio::test]
async fn child_extension_insert_links_to_the_new_child() {
    let db = sakila_db();
    db.rows("INSERT INTO public.film", vec![record(json!({ "film_id": 1001 }))]);
    let service = extension_service(&db);
    let request = Request::new(RequestType::Insert, "language_film_texts")
        .with_res_id("language_id", "1")
        .with_child_row(vec![
            RequestValue::new("title", "NEW FILM"),
            RequestValue::new("description", "D"),
        ]);

    let (_, response) = service.write(&ctx(), &request).await.unwrap();
    assert_eq!(
        db.statements(),
        vec![
            "INSERT INTO public.film (title, language_id) VALUES ('NEW FILM', 1) RETURNING film_id"
                .to_string(),
            "INSERT INTO public.film_text (description, film_id) VALUES ('D', 1001)".to_string(),
        ]
    );
    assert_eq!(
        response.rows[0].to_value(),
        json!({
            "language_id": 1,
            "films": [{ "film_id": 1001, "title": "NEW FILM", "description": "D" }]
        })
    );
}

#[tokio::test]
async fn batched_writes_share_one_transaction() {
    let db = sakila_db();
    let service = service(&db);
    let requests = vec![
        Request::new(RequestType::Delete, "film").with_res_id("film_id", "1"),
        Request::new(RequestType::Delete, "film").with_res_id("film_id", "2"),
    ];
    let (_, response) = service.write_all(&ctx(), &requests).await.unwrap();
    assert_eq!(response.rows_affected, 2);
    assert_eq!(
        db.events(),
        vec![
            "BEGIN".to_string(),
            "DELETE FROM public.film WHERE film_id = 1".to_string(),
            "DELETE FROM public.film WHERE film_id = 2".to_string(),
            "COMMIT".to_string(),
        ]
    );

    db.clear_events();
    let mixed = vec![
        Request::new(RequestType::Delete, "film").with_res_id("film_id", "1"),
        Request::new(RequestType::Delete, "language_films").with_res_id("language_id", "1"),
    ];
    let err = service.write_all(&ctx(), &mixed).await.unwrap_err();
    assert!(matches!(err, AppError::Request(RequestError::Malformed(_))));
    assert!(db.events().is_empty());
}

#[tokio::test]
async fn failed_statement_rolls_back_and_keeps_the_sql() {
    let db = sakila_db();
    db.fail_on("UPDATE public.film");
    let service = service(&db);
    let request = Request::new(RequestType::Update, "film")
        .with_res_id("film_id", "1")
        .with_param(RequestValue::new("title", "X"));

    let err = service.write(&ctx(), &request).await.unwrap_err();
    let sql = "UPDATE public.film SET title = 'X' WHERE film_id = 1";
    match &err {
        AppError::Execution(e) => assert_eq!(e.sql, sql),
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(
        db.events(),
        vec!["BEGIN".to_string(), sql.to_string(), "ROLLBACK".to_string()]
    );
}

#[tokio::test]
async fn read_only_column_is_rejected_before_any_statement() {
    let db = sakila_db();
    let service = service(&db);
    let request = Request::new(RequestType::Insert, "film")
        .with_param(RequestValue::new("upper_title", "X"));
    let err = service.write(&ctx(), &request).await.unwrap_err();
    assert!(matches!(
        err,
        AppError::Request(RequestError::ReadOnlyColumn(ref c)) if c == "upper_title"
    ));
    assert!(db.statements().is_empty());
}

struct RequireTitle;

impl TriggerHook for RequireTitle {
    fn before(&self, request: &resource_sql::request::Request) -> Result<(), TriggerError> {
        if request.params.iter().any(|p| p.matches_name("title")) {
            Ok(())
        } else {
            Err(TriggerError::Validation("title is required".into()))
        }
    }
}

#[tokio::test]
async fn validation_in_before_hook_prevents_all_statements() {
    let db = sakila_db();
    let mut triggers = TriggerRegistry::default();
    triggers.register("film", Arc::new(RequireTitle));
    let service = service(&db).with_triggers(triggers);
    let request = Request::new(RequestType::Insert, "film")
        .with_param(RequestValue::new("length", "90"));

    let err = service.write(&ctx(), &request).await.unwrap_err();
    assert!(matches!(err, AppError::Trigger(TriggerError::Validation(_))));
    assert!(db.events().is_empty());
}

struct Audit;

impl TriggerHook for Audit {
    fn after(&self, _request: &resource_sql::request::Request, outcome: Outcome<'_>) -> Result<(), TriggerError> {
        match outcome {
            Outcome::Write(_) => Err(TriggerError::Fatal("audit log unavailable".into())),
            Outcome::Read(_) => Ok(()),
        }
    }
}

#[tokio::test]
async fn failing_after_hook_rolls_back_the_write() {
    let db = sakila_db();
    let mut triggers = TriggerRegistry::default();
    triggers.register(TriggerRegistry::ALL, Arc::new(Audit));
    let service = service(&db).with_triggers(triggers);
    let request = Request::new(RequestType::Delete, "film").with_res_id("film_id", "7");

    let err = service.write(&ctx(), &request).await.unwrap_err();
    assert!(matches!(err, AppError::Trigger(TriggerError::Fatal(_))));
    assert_eq!(
        db.events(),
        vec![
            "BEGIN".to_string(),
            "DELETE FROM public.film WHERE film_id = 7".to_string(),
            "ROLLBACK".to_string(),
        ]
    );
}

#[derive(Default)]
struct Recording {
    lines: Mutex<Vec<String>>,
}

impl RequestLogger for Recording {
    fn statement(&self, _request: &resource_sql::request::Request, statement: &Statement) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push(statement.sql().to_string());
        }
    }

    fn outcome(&self, request: &resource_sql::request::Request, result: Result<u64, &AppError>) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push(format!("{} {:?}", request.request_type, result.map_err(|e| e.to_string())));
        }
    }
}

#[tokio::test]
async fn logger_sees_parameterized_sql_and_outcome() {
    let db = sakila_db();
    db.affected("DELETE FROM public.film", 3);
    let logger = Arc::new(Recording::default());
    let service = service(&db).with_logger(logger.clone());
    let request = Request::new(RequestType::Delete, "film")
        .with_param(RequestValue::parse("length", "<60"));

    let (_, response) = service.write(&ctx(), &request).await.unwrap();
    assert_eq!(response.rows_affected, 3);
    let lines = logger.lines.lock().unwrap().clone();
    assert_eq!(
        lines,
        vec![
            "DELETE FROM public.film WHERE length < $1::int2".to_string(),
            "DELETE Ok(3)".to_string(),
        ]
    );
}
