#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;

use crate::database::NewRow;
use crate::database::schema::{CollectionSchema, fields};

/// Category stored when a chunk carries none
pub const DEFAULT_CATEGORY: &str = "unknown";

/// Metadata keys owned by the store
const RESERVED_KEYS: &[&str] = &[fields::ID, fields::VECTOR, fields::TEXT];

/// A parsed span of a source document, as produced by the external chunker
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    #[serde(default, alias = "pageContent", alias = "page_content")]
    pub text: Option<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl Chunk {
    #[inline]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            metadata: Map::new(),
        }
    }

    #[inline]
    pub fn without_text() -> Self {
        Self::default()
    }

    #[inline]
    pub fn with_metadata(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// Text that will be indexed; missing and empty text count as absent
    #[inline]
    pub fn indexable_text(&self) -> Option<&str> {
        self.text.as_deref().filter(|t| !t.is_empty())
    }
}

/// Chunk metadata mapped onto the fixed row layout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkRecord {
    pub text: String,
    pub file_id: i64,
    pub filename: String,
    pub filetype: String,
    pub page_number: i32,
    pub category: String,
    pub user_id: Vec<i64>,
}

impl ChunkRecord {
    #[inline]
    pub fn into_row(self, vector: Vec<f32>) -> NewRow {
        NewRow {
            text: self.text,
            vector,
            file_id: self.file_id,
            filename: self.filename,
            filetype: self.filetype,
            page_number: self.page_number,
            category: self.category,
            user_id: self.user_id,
        }
    }
}

fn integer(key: &str, value: &Value) -> Result<i64, String> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| format!("{} must be an integer, got {}", key, n)),
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| format!("{} must be an integer, got \"{}\"", key, s)),
        other => Err(format!("{} must be an integer, got {}", key, other)),
    }
}

fn string(key: &str, value: &Value) -> Result<String, String> {
    match value {
        Value::Null => Ok(String::new()),
        Value::String(s) => Ok(s.clone()),
        other => Err(format!("{} must be a string, got {}", key, other)),
    }
}

fn owners(value: &Value) -> Result<Vec<i64>, String> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => items
            .iter()
            .filter(|v| !v.is_null())
            .map(|v| integer(fields::USER_ID, v))
            .collect(),
        single => Ok(vec![integer(fields::USER_ID, single)?]),
    }
}

/// Maps free-form chunk metadata onto the row layout.
///
/// Keys outside the layout are rejected unless they are allow-listed, in which case
/// they are dropped. Store-owned keys are always rejected.
#[derive(Debug, Clone, Default)]
pub struct MetadataPolicy {
    allowed_extra_fields: HashSet<String>,
}

impl MetadataPolicy {
    #[inline]
    pub fn new(allowed_extra_fields: impl IntoIterator<Item = String>) -> Self {
        Self {
            allowed_extra_fields: allowed_extra_fields.into_iter().collect(),
        }
    }

    /// Normalize one chunk, or explain why it cannot be stored
    pub fn normalize(
        &self,
        schema: &CollectionSchema,
        text: &str,
        metadata: &Map<String, Value>,
    ) -> Result<ChunkRecord, String> {
        let mut file_id = None;
        let mut record = ChunkRecord {
            text: text.to_string(),
            file_id: 0,
            filename: String::new(),
            filetype: String::new(),
            page_number: 0,
            category: DEFAULT_CATEGORY.to_string(),
            user_id: Vec::new(),
        };

        for (key, value) in metadata {
            match key.as_str() {
                fields::FILE_ID => file_id = Some(integer(key, value)?),
                fields::FILENAME => record.filename = string(key, value)?,
                fields::FILETYPE => record.filetype = string(key, value)?,
                fields::PAGE_NUMBER if value.is_null() => {}
                fields::PAGE_NUMBER => {
                    let page = integer(key, value)?;
                    record.page_number = i32::try_from(page)
                        .map_err(|_| format!("page_number {} is out of range", page))?;
                }
                fields::CATEGORY => {
                    let category = string(key, value)?;
                    if !category.trim().is_empty() {
                        record.category = category;
                    }
                }
                fields::USER_ID => record.user_id = owners(value)?,
                reserved if RESERVED_KEYS.contains(&reserved) => {
                    return Err(format!("metadata key '{}' is reserved", reserved));
                }
                extra if self.allowed_extra_fields.contains(extra) => {}
                unknown => return Err(format!("unknown metadata field '{}'", unknown)),
            }
        }

        record.file_id = file_id.ok_or_else(|| "metadata is missing file_id".to_string())?;

        schema.check_varchar(fields::TEXT, &record.text)?;
        schema.check_varchar(fields::FILENAME, &record.filename)?;
        schema.check_varchar(fields::FILETYPE, &record.filetype)?;
        schema.check_varchar(fields::CATEGORY, &record.category)?;
        schema.check_user_ids(&record.user_id)?;

        Ok(record)
    }
}
