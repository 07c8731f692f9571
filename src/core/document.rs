//! Document representation shared by the renderer, the stores and the log.

use super::{MigrateError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Reserved attribute holding a document's store-assigned identifier.
pub const ID_FIELD: &str = "_id";

/// A JSON object as stored in a collection.
pub type Document = Map<String, Value>;

/// One unit of migration input: placeholder name to scalar value.
pub type DataItem = Map<String, Value>;

/// Store-assigned document identifier.
///
/// Stores generate 24 lowercase hex digits, the same width as a MongoDB
/// ObjectId. Identifiers written by other tools keep their JSON type, so
/// `7` and `"7"` are different documents and a replaced document gets its
/// identifier back unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(Value);

impl DocumentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(Value::String(id.into()))
    }

    pub fn generate() -> Self {
        let mut hex = uuid::Uuid::new_v4().simple().to_string();
        hex.truncate(24);
        Self::new(hex)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// The identifier when it is a JSON string.
    pub fn as_str(&self) -> Option<&str> {
        self.0.as_str()
    }

    /// Compares against identifier text as typed on a command line: strings
    /// verbatim, anything else by its JSON text.
    pub fn matches_text(&self, text: &str) -> bool {
        match &self.0 {
            Value::String(s) => s == text,
            other => other.to_string() == text,
        }
    }

    /// Reads the `_id` attribute of a document. A null `_id` counts as none.
    pub fn of(document: &Document) -> Option<Self> {
        match document.get(ID_FIELD)? {
            Value::Null => None,
            value => Some(Self(value.clone())),
        }
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Value::String(s) => f.write_str(s),
            other => write!(f, "{}", other),
        }
    }
}

impl From<DocumentId> for Value {
    fn from(id: DocumentId) -> Self {
        id.0
    }
}

/// Converts a JSON value into a document, rejecting anything but an object.
pub fn into_document(value: Value) -> Result<Document> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(MigrateError::InvalidDocument(format!(
            "expected a JSON object, found {}",
            json_kind(&other)
        ))),
    }
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
