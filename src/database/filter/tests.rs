use super::*;

fn stored(file_id: i64, category: &str) -> StoredRow {
    StoredRow {
        id: 1,
        text: "chunk".to_string(),
        file_id,
        filename: "report.docx".to_string(),
        filetype: "docx".to_string(),
        page_number: 0,
        category: category.to_string(),
        user_id: vec![],
    }
}

#[test]
fn unrestricted_filter() {
    let filter = Filter::all();
    assert!(filter.is_unrestricted());
    assert_eq!(filter.to_sql(), None);
    assert!(filter.matches(&stored(1, "Title")));
}

#[test]
fn file_id_and_categories_render_as_conjunction() {
    let filter = Filter::all()
        .with_file_id(42)
        .with_categories(["NarrativeText", "ListItem"]);

    assert_eq!(
        filter.to_sql().as_deref(),
        Some("file_id = 42 AND category IN ('NarrativeText', 'ListItem')")
    );
    assert!(filter.matches(&stored(42, "ListItem")));
    assert!(!filter.matches(&stored(42, "Other")));
    assert!(!filter.matches(&stored(43, "ListItem")));
}

#[test]
fn quotes_are_escaped() {
    let filter = Filter::all().with_categories(["it's"]);
    assert_eq!(filter.to_sql().as_deref(), Some("category IN ('it''s')"));
    assert!(filter.matches(&stored(1, "it's")));
}

#[test]
fn empty_category_set_matches_nothing() {
    let filter = Filter::all().with_categories(Vec::<String>::new());
    assert!(!filter.is_unrestricted());
    assert_eq!(filter.to_sql().as_deref(), Some("1 = 0"));
    assert!(!filter.matches(&stored(1, "NarrativeText")));
}

#[test]
fn negative_file_ids_render() {
    let filter = Filter::all().with_file_id(-3);
    assert_eq!(filter.to_sql().as_deref(), Some("file_id = -3"));
    assert_eq!(filter.file_id(), Some(-3));
}
