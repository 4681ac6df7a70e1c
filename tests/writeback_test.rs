mod common;

use std::collections::BTreeMap;
use std::sync::Arc;

use common::{context_with, RecordingWarehouse};
use dashlink::context::{ContextKind, ExecutionContext};
use dashlink::session::{SqliteOptions, SqliteWarehouse};
use dashlink::writeback::FieldRule;
use dashlink::{
    DashlinkError, RecordValidator, Statement, TableRef, Value, ValueKind, Warehouse, WriteKind, WritebackExecutor,
};
use pretty_assertions::assert_eq;

fn record(pairs: &[(&str, Value)]) -> BTreeMap<String, Value> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}

async fn sqlite_context() -> (Arc<SqliteWarehouse>, Arc<ExecutionContext>) {
    let warehouse = Arc::new(SqliteWarehouse::open("writeback", ":memory:", &SqliteOptions::default()).unwrap());
    warehouse
        .execute(&Statement::new(
            "CREATE TABLE feedback (id INTEGER PRIMARY KEY, name TEXT NOT NULL, email TEXT, rating INTEGER)",
            vec![],
        ))
        .await
        .unwrap();
    let ctx = Arc::new(ExecutionContext::new(
        ContextKind::Local {
            profile: "writeback".to_string(),
        },
        warehouse.clone(),
    ));
    (warehouse, ctx)
}

fn feedback_rules() -> RecordValidator {
    RecordValidator::new()
        .field("name", FieldRule::Required)
        .field("email", FieldRule::Email)
        .field("rating", FieldRule::Kind(ValueKind::Integer))
        .field("rating", FieldRule::Range { min: Some(1.0), max: Some(5.0) })
}

#[tokio::test]
async fn test_empty_column_map_never_reaches_warehouse() {
    let warehouse = Arc::new(RecordingWarehouse::new("writes"));
    let executor = WritebackExecutor::new(context_with(warehouse.clone()));

    let request = RecordValidator::new()
        .validate(TableRef::new("feedback"), WriteKind::Insert, BTreeMap::new())
        .unwrap();
    let err = executor.submit(request).await.unwrap_err();

    assert!(matches!(err, DashlinkError::Validation(_)));
    assert_eq!(warehouse.call_count(), 0);
}

#[tokio::test]
async fn test_update_without_key_is_rejected() {
    let warehouse = Arc::new(RecordingWarehouse::new("writes"));
    let executor = WritebackExecutor::new(context_with(warehouse.clone()));

    let request = RecordValidator::new()
        .validate(
            TableRef::new("feedback"),
            WriteKind::Update { key: BTreeMap::new() },
            record(&[("rating", Value::Integer(4))]),
        )
        .unwrap();
    let err = executor.submit(request).await.unwrap_err();
    assert_eq!(
        err,
        DashlinkError::Validation(vec!["update requires at least one key column".to_string()])
    );
    assert_eq!(warehouse.call_count(), 0);
}

#[tokio::test]
async fn test_one_statement_per_request() {
    let warehouse = Arc::new(RecordingWarehouse::new("writes"));
    let executor = WritebackExecutor::new(context_with(warehouse.clone()));

    let request = feedback_rules()
        .validate(
            TableRef::new("feedback"),
            WriteKind::Insert,
            record(&[("name", Value::from("Ada")), ("rating", Value::Integer(5))]),
        )
        .unwrap();
    let outcome = executor.submit(request).await.unwrap();

    let statements = warehouse.statements();
    assert_eq!(statements.len(), 1);
    assert_eq!(statements[0].id, outcome.statement_id);
    assert_eq!(statements[0].sql, r#"INSERT INTO "feedback" ("name", "rating") VALUES (?, ?)"#);
    assert_eq!(outcome.kind, "INSERT");
    assert_eq!(outcome.rows_affected, 1);
}

#[tokio::test]
async fn test_warehouse_failure_is_not_retried() {
    let warehouse = Arc::new(RecordingWarehouse::new("writes").failing(DashlinkError::Query("constraint failed".to_string())));
    let executor = WritebackExecutor::new(context_with(warehouse.clone()));

    let request = RecordValidator::new()
        .validate(TableRef::new("feedback"), WriteKind::Insert, record(&[("name", Value::from("x"))]))
        .unwrap();
    let err = executor.submit(request).await.unwrap_err();
    assert_eq!(err, DashlinkError::Query("constraint failed".to_string()));
    assert_eq!(warehouse.execute_count(), 1);
}

#[tokio::test]
async fn test_validation_failure_lists_every_field() {
    let err = feedback_rules()
        .validate(
            TableRef::new("feedback"),
            WriteKind::Insert,
            record(&[("email", Value::from("nope")), ("rating", Value::Integer(9))]),
        )
        .unwrap_err();
    assert_eq!(
        err,
        DashlinkError::Validation(vec![
            "name is required".to_string(),
            "email must be a valid email address".to_string(),
            "rating must be at most 5".to_string(),
        ])
    );
}

#[tokio::test]
async fn test_insert_then_update_against_sqlite() {
    let (warehouse, ctx) = sqlite_context().await;
    let executor = WritebackExecutor::new(ctx);

    let insert = feedback_rules()
        .validate(
            TableRef::new("feedback"),
            WriteKind::Insert,
            record(&[
                ("id", Value::Integer(1)),
                ("name", Value::from("Grace")),
                ("email", Value::from("grace@example.com")),
                ("rating", Value::Integer(3)),
            ]),
        )
        .unwrap();
    assert_eq!(executor.submit(insert).await.unwrap().rows_affected, 1);

    let update = feedback_rules()
        .validate(
            TableRef::parse("main.feedback").unwrap(),
            WriteKind::Update {
                key: record(&[("id", Value::Integer(1))]),
            },
            record(&[("name", Value::from("Grace H.")), ("rating", Value::Integer(5))]),
        )
        .unwrap();
    let outcome = executor.submit(update).await.unwrap();
    assert_eq!(outcome.kind, "UPDATE");
    assert_eq!(outcome.rows_affected, 1);

    let rows = warehouse
        .query(&Statement::new("SELECT name, rating FROM feedback WHERE id = ?", vec![Value::Integer(1)]))
        .await
        .unwrap();
    assert_eq!(rows.get(0, "name"), Some(&Value::from("Grace H.")));
    assert_eq!(rows.get(0, "rating"), Some(&Value::Integer(5)));
}

#[tokio::test]
async fn test_update_matching_nothing_affects_zero_rows() {
    let (_warehouse, ctx) = sqlite_context().await;
    let executor = WritebackExecutor::new(ctx);

    let update = RecordValidator::new()
        .validate(
            TableRef::new("feedback"),
            WriteKind::Update {
                key: record(&[("id", Value::Integer(404))]),
            },
            record(&[("rating", Value::Integer(1))]),
        )
        .unwrap();
    assert_eq!(executor.submit(update).await.unwrap().rows_affected, 0);
}
