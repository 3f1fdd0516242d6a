use super::*;
use serde_json::json;

fn metadata(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => panic!("test metadata must be an object"),
    }
}

fn normalize(value: Value) -> Result<ChunkRecord, String> {
    MetadataPolicy::default().normalize(&CollectionSchema::chunks(4), "body", &metadata(value))
}

#[test]
fn langchain_documents_deserialize() {
    let chunk: Chunk = serde_json::from_value(json!({
        "pageContent": "Revenue grew 4%",
        "metadata": { "file_id": 7, "category": "NarrativeText" }
    }))
    .expect("should parse LangChain shape");
    assert_eq!(chunk.indexable_text(), Some("Revenue grew 4%"));

    let missing: Chunk = serde_json::from_value(json!({ "metadata": {} }))
        .expect("should parse without text");
    assert_eq!(missing.indexable_text(), None);
}

#[test]
fn only_missing_or_empty_text_is_not_indexable() {
    assert_eq!(Chunk::new("").indexable_text(), None);
    assert_eq!(Chunk::new("  \n\t").indexable_text(), Some("  \n\t"));
    assert_eq!(Chunk::without_text().indexable_text(), None);
}

#[test]
fn defaults_fill_missing_fields() {
    let record = normalize(json!({ "file_id": 42 })).expect("should normalize");
    assert_eq!(record.file_id, 42);
    assert_eq!(record.page_number, 0);
    assert_eq!(record.category, DEFAULT_CATEGORY);
    assert_eq!(record.filename, "");
    assert!(record.user_id.is_empty());

    let blank_category = normalize(json!({ "file_id": 42, "category": " " }))
        .expect("should normalize");
    assert_eq!(blank_category.category, DEFAULT_CATEGORY);
}

#[test]
fn integer_strings_are_accepted() {
    let record = normalize(json!({
        "file_id": "42",
        "page_number": "3",
        "user_id": ["5", null, 6]
    }))
    .expect("should normalize");
    assert_eq!(record.file_id, 42);
    assert_eq!(record.page_number, 3);
    assert_eq!(record.user_id, vec![5, 6]);
}

#[test]
fn single_owner_becomes_list() {
    let record = normalize(json!({ "file_id": 1, "user_id": 9 })).expect("should normalize");
    assert_eq!(record.user_id, vec![9]);
}

#[test]
fn file_id_is_required() {
    let error = normalize(json!({ "filename": "a.pdf" })).expect_err("file_id missing");
    assert!(error.contains("file_id"));

    assert!(normalize(json!({ "file_id": 1.5 })).is_err());
    assert!(normalize(json!({ "file_id": "abc" })).is_err());
}

#[test]
fn page_number_must_fit() {
    assert!(normalize(json!({ "file_id": 1, "page_number": 5_000_000_000_i64 })).is_err());
}

#[test]
fn unknown_and_reserved_keys() {
    let error = normalize(json!({ "file_id": 1, "languages": ["eng"] }))
        .expect_err("unknown field");
    assert!(error.contains("languages"));

    let error = normalize(json!({ "file_id": 1, "vector": [0.0] })).expect_err("reserved");
    assert!(error.contains("reserved"));

    let policy = MetadataPolicy::new(["languages".to_string(), "vector".to_string()]);
    let schema = CollectionSchema::chunks(4);
    assert!(
        policy
            .normalize(
                &schema,
                "body",
                &metadata(json!({ "file_id": 1, "languages": ["eng"] }))
            )
            .is_ok()
    );
    assert!(
        policy
            .normalize(&schema, "body", &metadata(json!({ "file_id": 1, "vector": [0.0] })))
            .is_err()
    );
}

#[test]
fn length_limits_apply_before_embedding() {
    let error = normalize(json!({ "file_id": 1, "category": "c".repeat(33) }))
        .expect_err("category too long");
    assert!(error.contains("category"));

    let owners: Vec<i64> = (0..300).collect();
    assert!(normalize(json!({ "file_id": 1, "user_id": owners })).is_err());
}

#[test]
fn record_becomes_row() {
    let row = normalize(json!({ "file_id": 3, "filename": "a.pdf" }))
        .expect("should normalize")
        .into_row(vec![0.0; 4]);
    assert_eq!(row.file_id, 3);
    assert_eq!(row.filename, "a.pdf");
    assert_eq!(row.vector.len(), 4);
}
