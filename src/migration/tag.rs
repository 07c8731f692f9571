use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of one migration invocation.
///
/// Derived from the UTC start instant in RFC 3339 form with `:` and `.`
/// replaced by `_`, e.g. `2024-01-01T00_00_00_000Z`, so it can be used in
/// file names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunTag(String);

impl RunTag {
    pub fn generate() -> Self {
        Self::at(Utc::now())
    }

    pub fn at(instant: DateTime<Utc>) -> Self {
        Self::new(&instant.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    /// Accepts either a tag or the raw instant it was derived from. Path
    /// separators are replaced too, so a tag always names a file directly
    /// inside the migration directory.
    pub fn new(raw: &str) -> Self {
        Self(raw.trim().replace([':', '.', '/', '\\'], "_"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RunTag {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}
