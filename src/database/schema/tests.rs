use super::*;

fn row(dim: usize) -> NewRow {
    NewRow {
        text: "Quarterly budget summary".to_string(),
        vector: vec![0.5; dim],
        file_id: 42,
        filename: "budget.pdf".to_string(),
        filetype: "application/pdf".to_string(),
        page_number: 3,
        category: "NarrativeText".to_string(),
        user_id: vec![7],
    }
}

#[test]
fn chunk_layout_has_fixed_fields() {
    let schema = CollectionSchema::chunks(3072);
    let names: Vec<&str> = schema.fields().iter().map(|f| f.name.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "id",
            "text",
            "vector",
            "file_id",
            "filename",
            "page_number",
            "filetype",
            "category",
            "user_id"
        ]
    );

    let id = schema.field(fields::ID).expect("id field exists");
    assert!(id.primary_key && id.auto_id);
    assert_eq!(schema.vector_dimension(), Some(3072));
}

#[test]
fn declared_indexes() {
    let schema = CollectionSchema::chunks(8);
    let indexes = schema.indexes(HnswConfig {
        m: 16,
        ef_construction: 128,
    });

    assert_eq!(indexes.len(), 3);
    assert_eq!(indexes[0].field, "category");
    assert_eq!(indexes[0].kind, IndexKind::Scalar);
    assert_eq!(indexes[1].field, "file_id");
    assert_eq!(
        indexes[2].kind,
        IndexKind::Hnsw {
            metric: Metric::L2,
            m: 16,
            ef_construction: 128
        }
    );
}

#[test]
fn compatible_with_itself() {
    let schema = CollectionSchema::chunks(16);
    assert!(schema.check_compatible(&schema.clone()).is_ok());
}

#[test]
fn vector_width_mismatch_is_incompatible() {
    let expected = CollectionSchema::chunks(16);
    let actual = CollectionSchema::chunks(32);
    let error = expected
        .check_compatible(&actual)
        .expect_err("widths differ");
    assert!(error.contains("vector"));
}

#[test]
fn missing_and_extra_fields_are_incompatible() {
    let expected = CollectionSchema::chunks(4);

    let mut layout = expected.fields().to_vec();
    layout.retain(|f| f.name != fields::CATEGORY);
    let missing = CollectionSchema::new(layout);
    assert!(
        expected
            .check_compatible(&missing)
            .expect_err("category missing")
            .contains("category")
    );

    let mut layout = expected.fields().to_vec();
    layout.push(FieldSpec::new("languages", FieldType::VarChar { max_length: 64 }));
    let extra = CollectionSchema::new(layout);
    assert!(
        expected
            .check_compatible(&extra)
            .expect_err("extra field")
            .contains("languages")
    );
}

#[test]
fn wider_string_bounds_are_compatible() {
    let expected = CollectionSchema::chunks(4);
    let widened = CollectionSchema::new(
        expected
            .fields()
            .iter()
            .cloned()
            .map(|mut f| {
                if let FieldType::VarChar { .. } = f.field_type {
                    f.field_type = FieldType::VarChar {
                        max_length: usize::MAX,
                    };
                }
                f
            })
            .collect(),
    );
    assert!(expected.check_compatible(&widened).is_ok());
    assert!(widened.check_compatible(&expected).is_err());
}

#[test]
fn validate_row_bounds() {
    let schema = CollectionSchema::chunks(4);
    assert!(schema.validate_row(&row(4)).is_ok());

    assert!(schema.validate_row(&row(5)).is_err());

    let mut long_category = row(4);
    long_category.category = "c".repeat(CATEGORY_MAX_LENGTH + 1);
    assert!(schema.validate_row(&long_category).is_err());

    let mut empty_category = row(4);
    empty_category.category = String::new();
    assert!(schema.validate_row(&empty_category).is_err());

    let mut long_text = row(4);
    long_text.text = "x".repeat(TEXT_MAX_LENGTH + 1);
    assert!(schema.validate_row(&long_text).is_err());

    let mut many_owners = row(4);
    many_owners.user_id = (0..=USER_ID_MAX_CAPACITY as i64).collect();
    assert!(schema.validate_row(&many_owners).is_err());
}

#[test]
fn limits_are_measured_in_bytes() {
    let schema = CollectionSchema::chunks(4);
    // 12 characters, 36 bytes
    let value = "ドキュメント・カテゴリー";
    assert!(value.len() > CATEGORY_MAX_LENGTH);
    assert!(schema.check_varchar(fields::CATEGORY, value).is_err());
    assert!(schema.check_varchar(fields::FILE_ID, "1").is_err());
}
