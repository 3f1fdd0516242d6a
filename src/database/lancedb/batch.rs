// Conversion between collection schemas, rows and Arrow record batches

use arrow::array::{
    Array, ArrayRef, FixedSizeListArray, Float32Array, Int32Array, Int64Array, ListArray,
    RecordBatch, StringArray,
};
use arrow::datatypes::{DataType, Field, Int64Type, Schema, SchemaRef};
use std::collections::HashMap;
use std::sync::Arc;

use super::super::schema::{FieldSpec, FieldType, fields};
use super::super::{CollectionSchema, NewRow, StoreError, StoredRow};

const MAX_LENGTH_KEY: &str = "max_length";
const MAX_CAPACITY_KEY: &str = "max_capacity";
const DISTANCE_COLUMN: &str = "_distance";

/// Every stored column except the vector
pub(super) const ROW_COLUMNS: &[&str] = &[
    fields::ID,
    fields::TEXT,
    fields::FILE_ID,
    fields::FILENAME,
    fields::PAGE_NUMBER,
    fields::FILETYPE,
    fields::CATEGORY,
    fields::USER_ID,
];

fn batch_err(message: impl Into<String>) -> StoreError {
    StoreError::Backend(message.into())
}

/// Arrow schema for a collection; string and array bounds travel as field metadata
pub(super) fn arrow_schema(schema: &CollectionSchema) -> Result<SchemaRef, StoreError> {
    let arrow_fields = schema
        .fields()
        .iter()
        .map(|spec| match spec.field_type {
            FieldType::Int64 => Ok(Field::new(&spec.name, DataType::Int64, false)),
            FieldType::Int32 => Ok(Field::new(&spec.name, DataType::Int32, false)),
            FieldType::VarChar { max_length } => Ok(Field::new(
                &spec.name,
                DataType::Utf8,
                false,
            )
            .with_metadata(HashMap::from([(
                MAX_LENGTH_KEY.to_string(),
                max_length.to_string(),
            )]))),
            FieldType::FloatVector { dim } => {
                let width = i32::try_from(dim)
                    .map_err(|_| batch_err(format!("vector width {} is too large", dim)))?;
                Ok(Field::new(
                    &spec.name,
                    DataType::FixedSizeList(
                        Arc::new(Field::new("item", DataType::Float32, false)),
                        width,
                    ),
                    false,
                ))
            }
            FieldType::Int64Array { max_capacity } => Ok(Field::new(
                &spec.name,
                DataType::List(Arc::new(Field::new("item", DataType::Int64, true))),
                false,
            )
            .with_metadata(HashMap::from([(
                MAX_CAPACITY_KEY.to_string(),
                max_capacity.to_string(),
            )]))),
        })
        .collect::<Result<Vec<_>, StoreError>>()?;

    Ok(Arc::new(Schema::new(arrow_fields)))
}

fn bound(field: &Field, key: &str) -> usize {
    field
        .metadata()
        .get(key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(usize::MAX)
}

/// Read a table's Arrow schema back into a collection schema
pub(super) fn collection_schema(schema: &Schema) -> Result<CollectionSchema, StoreError> {
    let specs = schema
        .fields()
        .iter()
        .map(|field| {
            let name = field.name().as_str();
            let field_type = match field.data_type() {
                DataType::Int64 if name == fields::ID => return Ok(FieldSpec::primary_auto(name)),
                DataType::Int64 => FieldType::Int64,
                DataType::Int32 => FieldType::Int32,
                DataType::Utf8 | DataType::LargeUtf8 => FieldType::VarChar {
                    max_length: bound(field, MAX_LENGTH_KEY),
                },
                DataType::FixedSizeList(_, size) => FieldType::FloatVector {
                    dim: usize::try_from(*size).unwrap_or_default(),
                },
                DataType::List(item) if item.data_type() == &DataType::Int64 => {
                    FieldType::Int64Array {
                        max_capacity: bound(field, MAX_CAPACITY_KEY),
                    }
                }
                other => {
                    return Err(batch_err(format!(
                        "column '{}' has unsupported type {}",
                        name, other
                    )));
                }
            };
            Ok(FieldSpec::new(name, field_type))
        })
        .collect::<Result<Vec<_>, StoreError>>()?;

    Ok(CollectionSchema::new(specs))
}

/// Build one record batch holding `rows`, with `ids` assigned in order
pub(super) fn build_record_batch(
    arrow_schema: &SchemaRef,
    schema: &CollectionSchema,
    ids: &[i64],
    rows: &[NewRow],
) -> Result<RecordBatch, StoreError> {
    let dim = schema
        .vector_dimension()
        .ok_or_else(|| batch_err("collection has no vector field"))?;

    let columns = arrow_schema
        .fields()
        .iter()
        .map(|field| -> Result<ArrayRef, StoreError> {
            let column: ArrayRef = match field.name().as_str() {
                fields::ID => Arc::new(Int64Array::from(ids.to_vec())),
                fields::TEXT => Arc::new(StringArray::from_iter_values(
                    rows.iter().map(|r| r.text.as_str()),
                )),
                fields::FILE_ID => Arc::new(Int64Array::from_iter_values(
                    rows.iter().map(|r| r.file_id),
                )),
                fields::FILENAME => Arc::new(StringArray::from_iter_values(
                    rows.iter().map(|r| r.filename.as_str()),
                )),
                fields::FILETYPE => Arc::new(StringArray::from_iter_values(
                    rows.iter().map(|r| r.filetype.as_str()),
                )),
                fields::PAGE_NUMBER => Arc::new(Int32Array::from_iter_values(
                    rows.iter().map(|r| r.page_number),
                )),
                fields::CATEGORY => Arc::new(StringArray::from_iter_values(
                    rows.iter().map(|r| r.category.as_str()),
                )),
                fields::USER_ID => Arc::new(ListArray::from_iter_primitive::<Int64Type, _, _>(
                    rows.iter()
                        .map(|r| Some(r.user_id.iter().copied().map(Some).collect::<Vec<_>>())),
                )),
                fields::VECTOR => {
                    let DataType::FixedSizeList(item, width) = field.data_type() else {
                        return Err(batch_err("vector column is not a fixed size list"));
                    };
                    let values: Vec<f32> =
                        rows.iter().flat_map(|r| r.vector.iter().copied()).collect();
                    debug_assert_eq!(values.len(), rows.len() * dim);
                    Arc::new(
                        FixedSizeListArray::try_new(
                            Arc::clone(item),
                            *width,
                            Arc::new(Float32Array::from(values)),
                            None,
                        )
                        .map_err(|e| {
                            batch_err(format!("Failed to create vector array: {}", e))
                        })?,
                    )
                }
                other => return Err(batch_err(format!("unexpected column '{}'", other))),
            };
            Ok(column)
        })
        .collect::<Result<Vec<_>, StoreError>>()?;

    RecordBatch::try_new(Arc::clone(arrow_schema), columns)
        .map_err(|e| batch_err(format!("Failed to create record batch: {}", e)))
}

fn column<'a, T: 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T, StoreError> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<T>())
        .ok_or_else(|| batch_err(format!("result is missing column '{}'", name)))
}

/// Parse result rows, with the `_distance` column when the batch came from a search
pub(super) fn parse_rows(
    batch: &RecordBatch,
) -> Result<Vec<(StoredRow, Option<f32>)>, StoreError> {
    let ids = column::<Int64Array>(batch, fields::ID)?;
    let texts = column::<StringArray>(batch, fields::TEXT)?;
    let file_ids = column::<Int64Array>(batch, fields::FILE_ID)?;
    let filenames = column::<StringArray>(batch, fields::FILENAME)?;
    let filetypes = column::<StringArray>(batch, fields::FILETYPE)?;
    let pages = column::<Int32Array>(batch, fields::PAGE_NUMBER)?;
    let categories = column::<StringArray>(batch, fields::CATEGORY)?;
    let user_ids = column::<ListArray>(batch, fields::USER_ID)?;
    let distances = batch
        .column_by_name(DISTANCE_COLUMN)
        .and_then(|c| c.as_any().downcast_ref::<Float32Array>());

    (0..batch.num_rows())
        .map(|i| {
            let owners = if user_ids.is_null(i) {
                Vec::new()
            } else {
                let values = user_ids.value(i);
                let values = values
                    .as_any()
                    .downcast_ref::<Int64Array>()
                    .ok_or_else(|| batch_err("user_id items are not Int64"))?;
                values.iter().flatten().collect()
            };

            let row = StoredRow {
                id: ids.value(i),
                text: texts.value(i).to_string(),
                file_id: file_ids.value(i),
                filename: filenames.value(i).to_string(),
                filetype: filetypes.value(i).to_string(),
                page_number: pages.value(i),
                category: categories.value(i).to_string(),
                user_id: owners,
            };
            Ok((row, distances.map(|d| d.value(i))))
        })
        .collect()
}

/// Largest id in a batch holding the `id` column
pub(super) fn max_id(batch: &RecordBatch) -> Result<Option<i64>, StoreError> {
    let ids = column::<Int64Array>(batch, fields::ID)?;
    Ok(ids.iter().flatten().max())
}
