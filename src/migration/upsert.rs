use super::action::{ActionKind, ActionRecord};
use super::log::ActionSink;
use crate::core::{Document, DocumentId, MigrateError, Result};
use crate::store::{DocumentStore, Filter};
use tracing::{info, warn};

/// Projects a rendered document onto the match fields. Fields the document
/// does not have are left out of the filter.
pub fn match_filter(document: &Document, match_fields: &[String]) -> Filter {
    match_fields
        .iter()
        .filter_map(|field| document.get(field).map(|v| (field.clone(), v.clone())))
        .collect()
}

/// Decides insert versus update by match fields and logs every write.
#[derive(Debug, Clone, Copy, Default)]
pub struct UpsertExecutor {
    dry_run: bool,
}

impl UpsertExecutor {
    pub fn new(dry_run: bool) -> Self {
        Self { dry_run }
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Upserts one rendered document and records exactly one action in
    /// `sink` before returning. Store errors propagate without retries.
    ///
    /// An update copies the rendered fields onto the existing record, so
    /// attributes only the existing record has are kept.
    pub async fn upsert(
        &self,
        store: &dyn DocumentStore,
        collection: &str,
        document: Document,
        match_fields: &[String],
        tag: &str,
        sink: &mut dyn ActionSink,
    ) -> Result<ActionKind> {
        let filter = match_filter(&document, match_fields);
        if filter.is_empty() {
            warn!(collection, tag, "empty match filter; any existing document will match");
        }

        let existing = store.find_one(collection, &filter).await?;
        let filter_text = serde_json::Value::Object(filter.clone());

        if self.dry_run {
            let record = ActionRecord::dry_run(collection, existing.as_ref(), filter, document);
            info!(
                collection,
                tag,
                filter = %filter_text,
                "[DRY RUN] Would {} document",
                record.action
            );
            let kind = record.action;
            sink.record(record)?;
            return Ok(kind);
        }

        match existing {
            Some(previous) => {
                let id = DocumentId::of(&previous).ok_or_else(|| {
                    MigrateError::Store(format!(
                        "matched document in '{}' has no _id (filter {})",
                        collection, filter_text
                    ))
                })?;
                store.update_set(collection, &id, &document).await?;
                info!(collection, tag, id = %id, "Updated document");
                sink.record(ActionRecord::update(collection, id, previous, document))?;
                Ok(ActionKind::Update)
            }
            None => {
                let id = store.insert_one(collection, document.clone()).await?;
                info!(collection, tag, id = %id, "Inserted document");
                sink.record(ActionRecord::insert(collection, id, document))?;
                Ok(ActionKind::Insert)
            }
        }
    }
}
