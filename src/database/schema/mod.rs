#[cfg(test)]
mod tests;

use crate::config::HnswConfig;

use super::NewRow;

pub const TEXT_MAX_LENGTH: usize = 65_535;
pub const FILENAME_MAX_LENGTH: usize = 512;
pub const FILETYPE_MAX_LENGTH: usize = 128;
pub const CATEGORY_MAX_LENGTH: usize = 32;
pub const USER_ID_MAX_CAPACITY: usize = 255;

pub const CATEGORY_INDEX: &str = "category_index";
pub const FILE_ID_INDEX: &str = "file_id_index";
pub const VECTOR_INDEX: &str = "vector_index";

/// Field names of the chunk row layout
pub mod fields {
    pub const ID: &str = "id";
    pub const TEXT: &str = "text";
    pub const VECTOR: &str = "vector";
    pub const FILE_ID: &str = "file_id";
    pub const FILENAME: &str = "filename";
    pub const FILETYPE: &str = "filetype";
    pub const PAGE_NUMBER: &str = "page_number";
    pub const CATEGORY: &str = "category";
    pub const USER_ID: &str = "user_id";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Int64,
    Int32,
    VarChar { max_length: usize },
    FloatVector { dim: usize },
    Int64Array { max_capacity: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: String,
    pub field_type: FieldType,
    pub primary_key: bool,
    pub auto_id: bool,
}

impl FieldSpec {
    pub(crate) fn new(name: &str, field_type: FieldType) -> Self {
        Self {
            name: name.to_string(),
            field_type,
            primary_key: false,
            auto_id: false,
        }
    }

    pub(crate) fn primary_auto(name: &str) -> Self {
        Self {
            name: name.to_string(),
            field_type: FieldType::Int64,
            primary_key: true,
            auto_id: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    L2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    Scalar,
    Hnsw {
        metric: Metric,
        m: u32,
        ef_construction: u32,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    pub name: String,
    pub field: String,
    pub kind: IndexKind,
}

/// Declared field layout of a collection. Types are fixed at creation time and never
/// inferred from data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionSchema {
    fields: Vec<FieldSpec>,
}

impl CollectionSchema {
    #[inline]
    pub fn new(fields: Vec<FieldSpec>) -> Self {
        Self { fields }
    }

    /// Layout of an indexed document chunk with `dim`-wide vectors
    #[inline]
    pub fn chunks(dim: usize) -> Self {
        Self::new(vec![
            FieldSpec::primary_auto(fields::ID),
            FieldSpec::new(
                fields::TEXT,
                FieldType::VarChar {
                    max_length: TEXT_MAX_LENGTH,
                },
            ),
            FieldSpec::new(fields::VECTOR, FieldType::FloatVector { dim }),
            FieldSpec::new(fields::FILE_ID, FieldType::Int64),
            FieldSpec::new(
                fields::FILENAME,
                FieldType::VarChar {
                    max_length: FILENAME_MAX_LENGTH,
                },
            ),
            FieldSpec::new(fields::PAGE_NUMBER, FieldType::Int32),
            FieldSpec::new(
                fields::FILETYPE,
                FieldType::VarChar {
                    max_length: FILETYPE_MAX_LENGTH,
                },
            ),
            FieldSpec::new(
                fields::CATEGORY,
                FieldType::VarChar {
                    max_length: CATEGORY_MAX_LENGTH,
                },
            ),
            FieldSpec::new(
                fields::USER_ID,
                FieldType::Int64Array {
                    max_capacity: USER_ID_MAX_CAPACITY,
                },
            ),
        ])
    }

    #[inline]
    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    #[inline]
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    #[inline]
    pub fn vector_dimension(&self) -> Option<usize> {
        self.fields.iter().find_map(|f| match f.field_type {
            FieldType::FloatVector { dim } => Some(dim),
            _ => None,
        })
    }

    /// Indexes every chunk collection carries: scalar indexes on the two filter fields
    /// and an L2 graph index on the vector
    #[inline]
    pub fn indexes(&self, hnsw: HnswConfig) -> Vec<IndexSpec> {
        vec![
            IndexSpec {
                name: CATEGORY_INDEX.to_string(),
                field: fields::CATEGORY.to_string(),
                kind: IndexKind::Scalar,
            },
            IndexSpec {
                name: FILE_ID_INDEX.to_string(),
                field: fields::FILE_ID.to_string(),
                kind: IndexKind::Scalar,
            },
            IndexSpec {
                name: VECTOR_INDEX.to_string(),
                field: fields::VECTOR.to_string(),
                kind: IndexKind::Hnsw {
                    metric: Metric::L2,
                    m: hnsw.m,
                    ef_construction: hnsw.ef_construction,
                },
            },
        ]
    }

    /// Check that an existing collection can hold rows of this layout.
    ///
    /// Field sets must match exactly and the vector width must be equal; string and
    /// array bounds on the existing side may be wider.
    #[inline]
    pub fn check_compatible(&self, actual: &CollectionSchema) -> Result<(), String> {
        for expected in &self.fields {
            let Some(found) = actual.field(&expected.name) else {
                return Err(format!("missing field '{}'", expected.name));
            };

            let compatible = match (expected.field_type, found.field_type) {
                (FieldType::Int64, FieldType::Int64) | (FieldType::Int32, FieldType::Int32) => {
                    true
                }
                (
                    FieldType::VarChar { max_length: want },
                    FieldType::VarChar { max_length: have },
                ) => have >= want,
                (FieldType::FloatVector { dim: want }, FieldType::FloatVector { dim: have }) => {
                    have == want
                }
                (
                    FieldType::Int64Array { max_capacity: want },
                    FieldType::Int64Array { max_capacity: have },
                ) => have >= want,
                _ => false,
            };

            if !compatible {
                return Err(format!(
                    "field '{}' has type {:?}, expected {:?}",
                    expected.name, found.field_type, expected.field_type
                ));
            }
        }

        if let Some(extra) = actual
            .fields
            .iter()
            .find(|f| self.field(&f.name).is_none())
        {
            return Err(format!("unexpected field '{}'", extra.name));
        }

        Ok(())
    }

    /// Check a string value against the declared bound of a VarChar field
    #[inline]
    pub fn check_varchar(&self, name: &str, value: &str) -> Result<(), String> {
        match self.field(name).map(|f| f.field_type) {
            Some(FieldType::VarChar { max_length }) if value.len() > max_length => Err(format!(
                "{} is {} bytes long, limit is {}",
                name,
                value.len(),
                max_length
            )),
            Some(FieldType::VarChar { .. }) => Ok(()),
            _ => Err(format!("'{}' is not a string field", name)),
        }
    }

    #[inline]
    pub fn check_user_ids(&self, user_ids: &[i64]) -> Result<(), String> {
        match self.field(fields::USER_ID).map(|f| f.field_type) {
            Some(FieldType::Int64Array { max_capacity }) if user_ids.len() > max_capacity => {
                Err(format!(
                    "user_id holds {} entries, limit is {}",
                    user_ids.len(),
                    max_capacity
                ))
            }
            Some(FieldType::Int64Array { .. }) => Ok(()),
            _ => Err("user_id is not an array field".to_string()),
        }
    }

    /// Validate every bounded field of a row, including the vector width
    #[inline]
    pub fn validate_row(&self, row: &NewRow) -> Result<(), String> {
        if let Some(dim) = self.vector_dimension() {
            if row.vector.len() != dim {
                return Err(format!(
                    "vector has {} dimensions, collection expects {}",
                    row.vector.len(),
                    dim
                ));
            }
        }

        if row.category.is_empty() {
            return Err("category cannot be empty".to_string());
        }

        self.check_varchar(fields::TEXT, &row.text)?;
        self.check_varchar(fields::FILENAME, &row.filename)?;
        self.check_varchar(fields::FILETYPE, &row.filetype)?;
        self.check_varchar(fields::CATEGORY, &row.category)?;
        self.check_user_ids(&row.user_id)
    }
}
