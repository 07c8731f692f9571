//! Data sources feeding a migration run.
//!
//! A source is resolved from the data directory before any store connection
//! is opened and loaded once the connection exists:
//!
//! - `<name>.json` - a static array of flat data items
//! - `<name>.query.json` - a query against the live store whose matching
//!   documents become the data items
//!
//! [`DynamicDataSource`] wraps a closure with full store access. It runs with
//! the privileges of the migration itself, so only build one from code the
//! operator controls.

use crate::core::{DataItem, Document, MigrateError, Result, into_document};
use crate::store::{DocumentStore, Filter};
use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};

const INPUT_PREFIX: &str = "$input.";

#[async_trait]
pub trait DataSource: Send + Sync {
    async fn load(&self, store: &dyn DocumentStore) -> Result<Vec<DataItem>>;
}

/// A fixed sequence of items.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StaticDataSource {
    items: Vec<DataItem>,
}

impl StaticDataSource {
    pub fn new(items: Vec<DataItem>) -> Self {
        Self { items }
    }

    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Array(items) = value else {
            return Err(MigrateError::InvalidDocument(
                "data file must hold a JSON array of objects".to_string(),
            ));
        };
        let items = items.into_iter().map(into_document).collect::<Result<Vec<_>>>()?;
        Ok(Self { items })
    }

    pub fn load_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_value(serde_json::from_str(&text)?)
    }

    pub fn items(&self) -> &[DataItem] {
        &self.items
    }
}

#[async_trait]
impl DataSource for StaticDataSource {
    async fn load(&self, _store: &dyn DocumentStore) -> Result<Vec<DataItem>> {
        Ok(self.items.clone())
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct QueryFile {
    collection: String,
    #[serde(default)]
    filter: Filter,
    #[serde(default)]
    fields: Option<Vec<String>>,
    #[serde(default)]
    input: Option<PathBuf>,
}

/// Documents of a collection matching a filter, projected onto `fields`
/// (all attributes except `_id` when no projection is given).
///
/// A query file may name an `input` JSON object next to it; any filter
/// string of the form `"$input.<key>"` is replaced by that key's value,
/// e.g. `{"email": {"$in": "$input.emails"}}`.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryDataSource {
    collection: String,
    filter: Filter,
    fields: Option<Vec<String>>,
}

impl QueryDataSource {
    pub fn new(collection: impl Into<String>, filter: Filter) -> Self {
        Self {
            collection: collection.into(),
            filter,
            fields: None,
        }
    }

    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Reads a query file; `input` paths are relative to the file's directory.
    pub fn load_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let query: QueryFile = serde_json::from_str(&text)?;
        let base = path.parent().unwrap_or(Path::new("."));

        let filter = match &query.input {
            Some(input) => {
                let input_path = base.join(input);
                if !input_path.is_file() {
                    return Err(MigrateError::SourceNotFound {
                        name: input.display().to_string(),
                        tried: input_path.display().to_string(),
                    });
                }
                let input_doc = into_document(serde_json::from_str(&fs::read_to_string(&input_path)?)?)?;
                bind_inputs(query.filter, &input_doc)?
            }
            None => query.filter,
        };

        Ok(Self {
            collection: query.collection,
            filter,
            fields: query.fields,
        })
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn filter(&self) -> &Filter {
        &self.filter
    }

    fn project(&self, document: Document) -> DataItem {
        match &self.fields {
            Some(fields) => fields
                .iter()
                .filter_map(|f| document.get(f).map(|v| (f.clone(), v.clone())))
                .collect(),
            None => document
                .into_iter()
                .filter(|(k, _)| k != crate::core::ID_FIELD)
                .collect(),
        }
    }
}

fn bind_inputs(filter: Filter, input: &Document) -> Result<Filter> {
    filter
        .into_iter()
        .map(|(k, v)| Ok((k, bind_value(v, input)?)))
        .collect()
}

fn bind_value(value: Value, input: &Document) -> Result<Value> {
    match value {
        Value::String(s) => match s.strip_prefix(INPUT_PREFIX) {
            Some(key) => input.get(key).cloned().ok_or_else(|| {
                MigrateError::InvalidDocument(format!("query input has no key '{}'", key))
            }),
            None => Ok(Value::String(s)),
        },
        Value::Array(items) => items
            .into_iter()
            .map(|v| bind_value(v, input))
            .collect::<Result<Vec<_>>>()
            .map(Value::Array),
        Value::Object(map) => map
            .into_iter()
            .map(|(k, v)| Ok((k, bind_value(v, input)?)))
            .collect::<Result<Map<_, _>>>()
            .map(Value::Object),
        other => Ok(other),
    }
}

#[async_trait]
impl DataSource for QueryDataSource {
    async fn load(&self, store: &dyn DocumentStore) -> Result<Vec<DataItem>> {
        let documents = store.find(&self.collection, &self.filter).await?;
        Ok(documents.into_iter().map(|d| self.project(d)).collect())
    }
}

/// Data produced by a closure at run time, with direct store access.
pub struct DynamicDataSource<F> {
    producer: F,
}

impl<F> DynamicDataSource<F>
where
    F: for<'a> Fn(&'a dyn DocumentStore) -> BoxFuture<'a, Result<Vec<DataItem>>> + Send + Sync,
{
    pub fn new(producer: F) -> Self {
        Self { producer }
    }
}

#[async_trait]
impl<F> DataSource for DynamicDataSource<F>
where
    F: for<'a> Fn(&'a dyn DocumentStore) -> BoxFuture<'a, Result<Vec<DataItem>>> + Send + Sync,
{
    async fn load(&self, store: &dyn DocumentStore) -> Result<Vec<DataItem>> {
        (self.producer)(store).await
    }
}

/// Finds `<name>.json` or `<name>.query.json` in the data directory.
pub fn resolve_data_source(data_dir: &Path, name: &str) -> Result<Box<dyn DataSource>> {
    let static_path = data_dir.join(format!("{}.json", name));
    if static_path.is_file() {
        return Ok(Box::new(StaticDataSource::load_file(&static_path)?));
    }

    let query_path = data_dir.join(format!("{}.query.json", name));
    if query_path.is_file() {
        return Ok(Box::new(QueryDataSource::load_file(&query_path)?));
    }

    Err(MigrateError::SourceNotFound {
        name: name.to_string(),
        tried: format!("{} or {}", static_path.display(), query_path.display()),
    })
}
