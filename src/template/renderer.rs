use super::Template;
use super::placeholder::{PLACEHOLDER, RenderContext, substitute, whole_placeholder};
use crate::core::{DataItem, Document, MigrateError, Result};
use crate::core::document::json_kind;
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// How placeholder values are written into the rendered document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderMode {
    /// Walks the template tree. A string that is exactly one placeholder
    /// takes the resolved value with its JSON type.
    #[default]
    Typed,
    /// Serializes the template, replaces placeholders in the text and parses
    /// it back. Every substituted field comes out as a string.
    Textual,
}

impl FromStr for RenderMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "typed" => Ok(Self::Typed),
            "textual" | "text" => Ok(Self::Textual),
            other => Err(format!("unknown render mode '{}' (expected typed or textual)", other)),
        }
    }
}

impl fmt::Display for RenderMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Typed => f.write_str("typed"),
            Self::Textual => f.write_str("textual"),
        }
    }
}

/// Turns a template plus one data item into a concrete document.
///
/// Rendering is pure apart from reading the clock and generating uuids:
/// neither the template nor the item is modified.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateRenderer {
    mode: RenderMode,
}

impl TemplateRenderer {
    pub fn new(mode: RenderMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> RenderMode {
        self.mode
    }

    pub fn render(&self, template: &Template, item: &DataItem, tag: &str) -> Result<Document> {
        let ctx = RenderContext::new(tag, item);
        let rendered = match self.mode {
            RenderMode::Typed => render_typed(template.body(), &ctx),
            RenderMode::Textual => render_textual(template.body(), &ctx)?,
        };

        match rendered {
            Value::Object(doc) => Ok(doc),
            other => Err(MigrateError::Render(format!(
                "template rendered to {} instead of an object",
                json_kind(&other)
            ))),
        }
    }
}

/// Renders with the default (typed) mode.
pub fn render(template: &Template, item: &DataItem, tag: &str) -> Result<Document> {
    TemplateRenderer::default().render(template, item, tag)
}

fn render_typed(value: &Value, ctx: &RenderContext<'_>) -> Value {
    match value {
        Value::String(text) => match whole_placeholder(text) {
            Some(key) => ctx.resolve(key),
            None => Value::String(substitute(text, ctx)),
        },
        Value::Array(items) => Value::Array(items.iter().map(|v| render_typed(v, ctx)).collect()),
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (key, v) in map {
                out.insert(substitute(key, ctx), render_typed(v, ctx));
            }
            Value::Object(out)
        }
        scalar => scalar.clone(),
    }
}

fn render_textual(value: &Value, ctx: &RenderContext<'_>) -> Result<Value> {
    let text = serde_json::to_string(value)?;
    let substituted = PLACEHOLDER.replace_all(&text, |caps: &regex::Captures<'_>| {
        escape_json_fragment(&ctx.resolve_text(&caps[1]))
    });
    serde_json::from_str(&substituted)
        .map_err(|e| MigrateError::Render(format!("substituted template is not valid JSON: {}", e)))
}

/// Escapes text for splicing inside an already-quoted JSON string.
fn escape_json_fragment(text: &str) -> String {
    let quoted = Value::String(text.to_string()).to_string();
    quoted[1..quoted.len() - 1].to_string()
}
