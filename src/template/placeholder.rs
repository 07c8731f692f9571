//! Placeholder resolution for `{{identifier}}` tokens.

use crate::core::DataItem;
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;

lazy_static! {
    pub(crate) static ref PLACEHOLDER: Regex = Regex::new(r"\{\{(.*?)\}\}").unwrap();
}

/// Values available to placeholders while rendering one document.
pub struct RenderContext<'a> {
    tag: &'a str,
    item: &'a DataItem,
    /// Captured once per rendered document.
    now: String,
}

impl<'a> RenderContext<'a> {
    pub fn new(tag: &'a str, item: &'a DataItem) -> Self {
        Self {
            tag,
            item,
            now: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        }
    }

    /// Resolves one placeholder identifier. First match wins:
    /// run tag, render timestamp, fresh uuid, then the data item.
    pub fn resolve(&self, key: &str) -> Value {
        match key.trim() {
            "tag" => Value::String(self.tag.to_string()),
            "createdAt" | "currentTime" => Value::String(self.now.clone()),
            "uuid" => Value::String(uuid::Uuid::new_v4().to_string()),
            other => match self.item.get(other) {
                None | Some(Value::Null) => Value::String(String::new()),
                Some(value) => value.clone(),
            },
        }
    }

    /// Resolves a placeholder to the text spliced into a surrounding string.
    pub fn resolve_text(&self, key: &str) -> String {
        match self.resolve(key) {
            Value::String(s) => s,
            other => other.to_string(),
        }
    }
}

/// Returns the identifier when `text` consists of exactly one placeholder.
pub fn whole_placeholder(text: &str) -> Option<&str> {
    let caps = PLACEHOLDER.captures(text)?;
    let whole = caps.get(0)?;
    if whole.start() == 0 && whole.end() == text.len() {
        caps.get(1).map(|m| m.as_str())
    } else {
        None
    }
}

/// Replaces every placeholder in `text` with its textual value.
pub fn substitute(text: &str, ctx: &RenderContext<'_>) -> String {
    PLACEHOLDER
        .replace_all(text, |caps: &regex::Captures<'_>| ctx.resolve_text(&caps[1]))
        .into_owned()
}
