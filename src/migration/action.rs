use crate::core::{Document, DocumentId};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActionKind {
    Insert,
    Update,
    /// Only found in logs written by older tools; never undone.
    DryRun,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Insert => f.write_str("insert"),
            Self::Update => f.write_str("update"),
            Self::DryRun => f.write_str("dryRun"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActionStatus {
    Success,
    DryRun,
}

/// One logged write, carrying what is needed to reverse it.
///
/// - `insert`: `_id` and the inserted `document`; undone by deleting `_id`.
/// - `update`: `_id`, the fields applied (`update`) and the full pre-update
///   snapshot (`previous`); undone by replacing `_id` with `previous`.
/// - dry run: the match `filter` and the rendered `document`; never undone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRecord {
    pub collection: String,
    pub action: ActionKind,
    pub status: ActionStatus,
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<DocumentId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Document>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<Document>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update: Option<Document>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous: Option<Document>,
}

impl ActionRecord {
    pub fn insert(collection: &str, id: DocumentId, document: Document) -> Self {
        Self {
            collection: collection.to_string(),
            action: ActionKind::Insert,
            status: ActionStatus::Success,
            id: Some(id),
            filter: None,
            document: Some(document),
            update: None,
            previous: None,
        }
    }

    pub fn update(collection: &str, id: DocumentId, previous: Document, update: Document) -> Self {
        Self {
            collection: collection.to_string(),
            action: ActionKind::Update,
            status: ActionStatus::Success,
            id: Some(id),
            filter: None,
            document: None,
            update: Some(update),
            previous: Some(previous),
        }
    }

    /// `existing` is the document the match filter found, if any; it
    /// decides whether the planned action is an update or an insert. The
    /// matched document's `_id`, when it has one, is carried along.
    pub fn dry_run(
        collection: &str,
        existing: Option<&Document>,
        filter: Document,
        document: Document,
    ) -> Self {
        let action = if existing.is_some() {
            ActionKind::Update
        } else {
            ActionKind::Insert
        };
        Self {
            collection: collection.to_string(),
            action,
            status: ActionStatus::DryRun,
            id: existing.and_then(DocumentId::of),
            filter: Some(filter),
            document: Some(document),
            update: None,
            previous: None,
        }
    }

    pub fn is_dry_run(&self) -> bool {
        self.status == ActionStatus::DryRun || self.action == ActionKind::DryRun
    }

    /// Identifier as text, for display.
    pub fn id_text(&self) -> Option<String> {
        self.id.as_ref().map(DocumentId::to_string)
    }

    /// Whether the record's `_id` matches identifier text, as given to
    /// `undo --id`.
    pub fn matches_id(&self, text: &str) -> bool {
        self.id.as_ref().is_some_and(|id| id.matches_text(text))
    }
}
