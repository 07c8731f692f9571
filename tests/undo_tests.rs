//! Integration tests for undoing recorded migration runs

use docmigrate::{
    Document, MemoryConnector, MigrateError, MigrationConfig, MigrationLog, MigrationRequest,
    Migrator, UndoOrder, UndoRequest,
};
use serde_json::{Value, json};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

fn doc(value: Value) -> Document {
    value.as_object().cloned().unwrap()
}

fn write_json(path: &Path, value: Value) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, serde_json::to_string_pretty(&value).unwrap()).unwrap();
}

fn setup(people: Value) -> (TempDir, MemoryConnector, Migrator) {
    let temp_dir = TempDir::new().unwrap();
    write_json(
        &temp_dir.path().join("templates/users.json"),
        json!({
            "_meta": {"matchFields": ["email"]},
            "email": "{{email}}",
            "name": "{{name}}",
            "tag": "{{tag}}"
        }),
    );
    write_json(&temp_dir.path().join("data/people.json"), people);

    let connector = MemoryConnector::new();
    let migrator = Migrator::new(
        MigrationConfig::new("memory://").root_dir(temp_dir.path()),
        Arc::new(connector.clone()),
    );
    (temp_dir, connector, migrator)
}

#[tokio::test]
async fn test_worked_example_insert_then_undo() {
    let (_temp_dir, connector, migrator) = setup(json!([{"email": "a@x.com", "name": "Ann"}]));
    let request = MigrationRequest::new("users", "users", "people");

    let summary = migrator.run(&request).await.unwrap();
    assert_eq!(summary.inserted, 1);

    let report = migrator
        .undo(&UndoRequest::new(summary.tag.clone(), "users"))
        .await
        .unwrap();
    assert_eq!(report.reverted, 1);
    assert!(report.is_clean());
    assert!(connector.database("test_db").collection("users").await.is_empty());

    // Starting over inserts again; the run after that only updates.
    let again = migrator.run(&request).await.unwrap();
    assert_eq!(again.inserted, 1);
    let third = migrator.run(&request).await.unwrap();
    assert_eq!((third.inserted, third.updated), (0, 1));
}

#[tokio::test]
async fn test_round_trip_restores_snapshots() {
    let (_temp_dir, connector, migrator) = setup(json!([
        {"email": "a@x.com", "name": "Ann B."},
        {"email": "new@x.com", "name": "Nia"}
    ]));
    let db = connector.database("test_db");
    db.seed(
        "users",
        vec![
            doc(json!({"email": "a@x.com", "name": "Ann", "role": "admin"})),
            doc(json!({"email": "z@x.com", "name": "Zed"})),
        ],
    )
    .await
    .unwrap();
    let before = db.collection("users").await;

    let summary = migrator
        .run(&MigrationRequest::new("users", "users", "people"))
        .await
        .unwrap();
    assert_eq!((summary.inserted, summary.updated), (1, 1));
    assert_ne!(db.collection("users").await, before);

    let report = migrator
        .undo(&UndoRequest::new(summary.tag.clone(), "users"))
        .await
        .unwrap();
    assert_eq!(report.selected, 2);
    assert_eq!(report.reverted, 2);
    assert_eq!(db.collection("users").await, before);
}

#[tokio::test]
async fn test_round_trip_keeps_numeric_ids() {
    let (_temp_dir, connector, migrator) = setup(json!([
        {"email": "a@x.com", "name": "Ann B."},
        {"email": "b@x.com", "name": "Bob"}
    ]));
    let db = connector.database("test_db");
    db.seed(
        "users",
        vec![
            doc(json!({"_id": 7, "email": "a@x.com", "name": "Ann"})),
            doc(json!({"_id": "7", "email": "b@x.com", "name": "Bea"})),
        ],
    )
    .await
    .unwrap();
    let before = db.collection("users").await;

    let summary = migrator
        .run(&MigrationRequest::new("users", "users", "people"))
        .await
        .unwrap();
    assert_eq!(summary.updated, 2);
    let users = db.collection("users").await;
    assert_eq!(users[0]["name"], json!("Ann B."));
    assert_eq!(users[1]["name"], json!("Bob"));

    migrator
        .undo(&UndoRequest::new(summary.tag.clone(), "users"))
        .await
        .unwrap();
    let after = db.collection("users").await;
    assert_eq!(after, before);
    assert_eq!(after[0]["_id"], json!(7));
}

#[tokio::test]
async fn test_undo_single_id() {
    let (temp_dir, connector, migrator) = setup(json!([
        {"email": "a@x.com", "name": "Ann"},
        {"email": "b@x.com", "name": "Bob"},
        {"email": "c@x.com", "name": "Cid"}
    ]));
    let summary = migrator
        .run(&MigrationRequest::new("users", "users", "people"))
        .await
        .unwrap();

    let log = MigrationLog::load(&temp_dir.path().join("migrations"), "users", &summary.tag).unwrap();
    assert_eq!(log.actions.len(), 3);
    let bob_id = log.actions[1].id_text().unwrap();

    let report = migrator
        .undo(&UndoRequest::new(summary.tag.clone(), "users").only_id(&bob_id))
        .await
        .unwrap();
    assert_eq!(report.selected, 1);
    assert_eq!(report.reverted, 1);

    let users = connector.database("test_db").collection("users").await;
    let emails: Vec<_> = users.iter().map(|u| u["email"].clone()).collect();
    assert_eq!(emails, [json!("a@x.com"), json!("c@x.com")]);

    let unknown = migrator
        .undo(&UndoRequest::new(summary.tag.clone(), "users").only_id("000000000000000000000000"))
        .await
        .unwrap();
    assert_eq!(unknown.selected, 0);
    assert_eq!(connector.database("test_db").collection("users").await.len(), 2);
}

#[tokio::test]
async fn test_undo_skips_dry_run_records() {
    let (_temp_dir, connector, migrator) = setup(json!([{"email": "a@x.com", "name": "Ann"}]));
    let summary = migrator
        .run(&MigrationRequest::new("users", "users", "people").dry_run(true))
        .await
        .unwrap();

    let report = migrator
        .undo(&UndoRequest::new(summary.tag.clone(), "users"))
        .await
        .unwrap();
    assert_eq!(report.skipped, 1);
    assert_eq!(report.reverted, 0);
    assert_eq!(connector.database("test_db").mutation_count(), 0);
}

#[tokio::test]
async fn test_undo_twice_reports_missing() {
    let (_temp_dir, _connector, migrator) = setup(json!([{"email": "a@x.com", "name": "Ann"}]));
    let summary = migrator
        .run(&MigrationRequest::new("users", "users", "people"))
        .await
        .unwrap();
    let request = UndoRequest::new(summary.tag.clone(), "users");

    migrator.undo(&request).await.unwrap();
    let second = migrator.undo(&request).await.unwrap();
    assert_eq!(second.reverted, 0);
    assert_eq!(second.missing, 1);
    assert!(second.is_clean());
}

#[tokio::test]
async fn test_colliding_items_need_reverse_order() {
    // Both items match the same seeded record within one run.
    let people = json!([
        {"email": "a@x.com", "name": "First"},
        {"email": "a@x.com", "name": "Second"}
    ]);

    for (order, restored) in [(UndoOrder::Reverse, true), (UndoOrder::Recorded, false)] {
        let (_temp_dir, connector, migrator) = setup(people.clone());
        let db = connector.database("test_db");
        db.seed("users", vec![doc(json!({"email": "a@x.com", "name": "Original"}))])
            .await
            .unwrap();
        let before = db.collection("users").await;

        let summary = migrator
            .run(&MigrationRequest::new("users", "users", "people"))
            .await
            .unwrap();
        assert_eq!(summary.updated, 2);

        migrator
            .undo(&UndoRequest::new(summary.tag.clone(), "users").order(order))
            .await
            .unwrap();
        assert_eq!(db.collection("users").await == before, restored, "order {}", order);
    }
}

#[tokio::test]
async fn test_missing_log_fails_before_connecting() {
    let (_temp_dir, connector, migrator) = setup(json!([]));

    let err = migrator
        .undo(&UndoRequest::new("2024-01-01T00:00:00.000Z", "users"))
        .await
        .unwrap_err();
    assert!(matches!(err, MigrateError::MigrationLogNotFound(_)));
    assert_eq!(connector.connections_opened(), 0);
}
