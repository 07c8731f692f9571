//! Template Module
//!
//! A template is a JSON tree with `{{identifier}}` placeholders in string
//! positions, plus a reserved `_meta` attribute declaring the match fields
//! used to recognise an already-migrated document.
//!
//! - `placeholder.rs` - identifier resolution (tag, timestamps, uuid, data)
//! - `renderer.rs` - typed and textual rendering of a whole template

mod placeholder;
mod renderer;

pub use placeholder::RenderContext;
pub use renderer::{RenderMode, TemplateRenderer, render};

use crate::core::{MigrateError, Result};
use serde_json::Value;
use std::path::Path;

/// Reserved top-level template attribute.
pub const META_FIELD: &str = "_meta";

/// A parsed template with its `_meta` block stripped.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    body: Value,
    match_fields: Vec<String>,
}

impl Template {
    /// Builds a template from parsed JSON, extracting `_meta.matchFields`.
    pub fn from_value(mut value: Value) -> Result<Self> {
        let meta = value.as_object_mut().and_then(|obj| obj.remove(META_FIELD));
        let match_fields = match meta {
            Some(meta) => parse_match_fields(&meta)?,
            None => Vec::new(),
        };

        Ok(Self { body: value, match_fields })
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| MigrateError::Render(format!("template is not valid JSON: {}", e)))?;
        Self::from_value(value)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn body(&self) -> &Value {
        &self.body
    }

    pub fn match_fields(&self) -> &[String] {
        &self.match_fields
    }

    pub fn with_match_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.match_fields = fields.into_iter().map(Into::into).collect();
        self
    }
}

fn parse_match_fields(meta: &Value) -> Result<Vec<String>> {
    let Some(fields) = meta.get("matchFields") else {
        return Ok(Vec::new());
    };

    let list = fields.as_array().ok_or_else(|| {
        MigrateError::Render("_meta.matchFields must be an array of strings".to_string())
    })?;

    list.iter()
        .map(|f| {
            f.as_str().map(str::to_string).ok_or_else(|| {
                MigrateError::Render(format!("_meta.matchFields entry {} is not a string", f))
            })
        })
        .collect()
}
