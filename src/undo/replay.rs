use super::{UndoFailure, UndoOrder, UndoReport};
use crate::core::{MigrateError, Result};
use crate::migration::{ActionKind, ActionRecord, MigrationLog};
use crate::store::DocumentStore;
use std::collections::HashMap;
use tracing::{error, info, warn};

enum Reverted {
    Done,
    Skipped,
    /// The target document no longer exists.
    Missing,
}

/// Picks the records to reverse: all of them, or those whose `_id` equals
/// `filter_id`, in the requested order.
pub fn select_actions<'a>(
    log: &'a MigrationLog,
    filter_id: Option<&str>,
    order: UndoOrder,
) -> Vec<&'a ActionRecord> {
    let mut selected: Vec<&ActionRecord> = log
        .actions
        .iter()
        .filter(|a| filter_id.is_none_or(|id| a.matches_id(id)))
        .collect();

    if order == UndoOrder::Reverse {
        selected.reverse();
    }
    selected
}

/// Ids with more than one update among the selection. Reverting those in
/// recorded order leaves an intermediate snapshot behind.
pub fn repeated_updates(actions: &[&ActionRecord]) -> Vec<String> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for action in actions {
        if action.action == ActionKind::Update && !action.is_dry_run() {
            if let Some(id) = action.id_text() {
                *counts.entry(id).or_default() += 1;
            }
        }
    }
    let mut repeated: Vec<String> = counts
        .into_iter()
        .filter(|(_, n)| *n > 1)
        .map(|(id, _)| id)
        .collect();
    repeated.sort();
    repeated
}

/// Reverses each record in turn. A failure is logged and collected, and
/// the remaining records are still attempted.
pub async fn replay(store: &dyn DocumentStore, actions: &[&ActionRecord], report: &mut UndoReport) {
    for action in actions {
        match revert(store, action).await {
            Ok(Reverted::Done) => report.reverted += 1,
            Ok(Reverted::Skipped) => report.skipped += 1,
            Ok(Reverted::Missing) => {
                warn!(
                    collection = %action.collection,
                    id = %display_id(action),
                    "Nothing to revert; document no longer exists"
                );
                report.missing += 1;
            }
            Err(e) => {
                error!(
                    collection = %action.collection,
                    id = %display_id(action),
                    "Undo failed: {}",
                    e
                );
                report.failures.push(UndoFailure {
                    id: action.id.clone(),
                    action: action.action,
                    error: e.to_string(),
                });
            }
        }
    }
}

fn display_id(action: &ActionRecord) -> String {
    action.id_text().unwrap_or_else(|| "(no _id)".to_string())
}

async fn revert(store: &dyn DocumentStore, action: &ActionRecord) -> Result<Reverted> {
    if action.is_dry_run() {
        info!(id = %display_id(action), "Skipping dryRun action");
        return Ok(Reverted::Skipped);
    }

    let id = action.id.as_ref().ok_or_else(|| {
        MigrateError::InvalidDocument(format!("{} record has no _id", action.action))
    })?;

    let found = match action.action {
        ActionKind::Insert => {
            let deleted = store.delete(&action.collection, id).await?;
            if deleted {
                info!(collection = %action.collection, id = %id, "Deleted inserted doc");
            }
            deleted
        }
        ActionKind::Update => {
            let previous = action.previous.clone().ok_or_else(|| {
                MigrateError::InvalidDocument(format!("update record {} has no previous snapshot", id))
            })?;
            let replaced = store.replace(&action.collection, id, previous).await?;
            if replaced {
                info!(collection = %action.collection, id = %id, "Reverted update");
            }
            replaced
        }
        ActionKind::DryRun => return Ok(Reverted::Skipped),
    };

    Ok(if found { Reverted::Done } else { Reverted::Missing })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Document, DocumentId};
    use crate::migration::RunTag;
    use crate::store::MemoryStore;
    use serde_json::{Value, json};

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    fn log_with(actions: Vec<ActionRecord>) -> MigrationLog {
        let mut log = MigrationLog::new("users", RunTag::new("t"));
        log.actions = actions;
        log
    }

    fn report() -> UndoReport {
        UndoReport::new("users", RunTag::new("t"))
    }

    #[test]
    fn test_select_by_id_and_order() {
        let log = log_with(vec![
            ActionRecord::insert("users", DocumentId::new("1"), Document::new()),
            ActionRecord::insert("users", DocumentId::new("2"), Document::new()),
            ActionRecord::insert("users", DocumentId::new("3"), Document::new()),
        ]);

        let ids = |selected: Vec<&ActionRecord>| -> Vec<String> {
            selected.iter().map(|a| a.id_text().unwrap()).collect()
        };

        assert_eq!(ids(select_actions(&log, None, UndoOrder::Recorded)), ["1", "2", "3"]);
        assert_eq!(ids(select_actions(&log, None, UndoOrder::Reverse)), ["3", "2", "1"]);
        assert_eq!(ids(select_actions(&log, Some("2"), UndoOrder::Reverse)), ["2"]);
        assert!(select_actions(&log, Some("9"), UndoOrder::Reverse).is_empty());
    }

    #[test]
    fn test_select_numeric_id_by_text() {
        let numeric = DocumentId::of(&doc(json!({"_id": 7}))).unwrap();
        let log = log_with(vec![
            ActionRecord::insert("users", numeric.clone(), Document::new()),
            ActionRecord::insert("users", DocumentId::new("8"), Document::new()),
        ]);

        let selected = select_actions(&log, Some("7"), UndoOrder::Reverse);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].id, Some(numeric));
    }

    #[test]
    fn test_repeated_updates() {
        let log = log_with(vec![
            ActionRecord::update("users", DocumentId::new("1"), Document::new(), Document::new()),
            ActionRecord::update("users", DocumentId::new("1"), Document::new(), Document::new()),
            ActionRecord::update("users", DocumentId::new("2"), Document::new(), Document::new()),
        ]);
        let selected = select_actions(&log, None, UndoOrder::Recorded);
        assert_eq!(repeated_updates(&selected), ["1"]);
    }

    #[tokio::test]
    async fn test_reverse_order_restores_original_for_colliding_updates() {
        let store = MemoryStore::new();
        let ids = store
            .seed("users", vec![doc(json!({"email": "a@x.com", "name": "v0"}))])
            .await
            .unwrap();
        let id = ids[0].clone();

        // Two items of one run hit the same document.
        let v0 = store.collection("users").await[0].clone();
        store.update_set("users", &id, &doc(json!({"name": "v1"}))).await.unwrap();
        let v1 = store.collection("users").await[0].clone();
        store.update_set("users", &id, &doc(json!({"name": "v2"}))).await.unwrap();

        let log = log_with(vec![
            ActionRecord::update("users", id.clone(), v0.clone(), doc(json!({"name": "v1"}))),
            ActionRecord::update("users", id.clone(), v1, doc(json!({"name": "v2"}))),
        ]);

        let mut rep = report();
        let selected = select_actions(&log, None, UndoOrder::Reverse);
        replay(&store, &selected, &mut rep).await;

        assert_eq!(rep.reverted, 2);
        assert_eq!(store.collection("users").await[0], v0);
    }

    #[tokio::test]
    async fn test_failures_are_isolated() {
        let store = MemoryStore::new();
        let ids = store
            .seed("users", vec![doc(json!({"name": "Ann"})), doc(json!({"name": "Bob"}))])
            .await
            .unwrap();

        let mut broken = ActionRecord::update("users", ids[0].clone(), Document::new(), Document::new());
        broken.previous = None;

        let log = log_with(vec![
            broken,
            ActionRecord::insert("users", ids[1].clone(), Document::new()),
            ActionRecord::dry_run("users", None, Document::new(), Document::new()),
            ActionRecord::insert("users", DocumentId::new("gone"), Document::new()),
        ]);

        let mut rep = report();
        let selected = select_actions(&log, None, UndoOrder::Recorded);
        replay(&store, &selected, &mut rep).await;

        assert_eq!(rep.failures.len(), 1);
        assert_eq!(rep.failures[0].id, Some(ids[0].clone()));
        assert_eq!(rep.reverted, 1);
        assert_eq!(rep.skipped, 1);
        assert_eq!(rep.missing, 1);
        assert_eq!(store.collection("users").await.len(), 1);
    }
}
