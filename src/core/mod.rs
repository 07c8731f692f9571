pub mod document;
pub mod error;
pub mod fsutil;

pub use document::{DataItem, Document, DocumentId, ID_FIELD, into_document};
pub use error::{MigrateError, Result};
