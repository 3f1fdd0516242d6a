use super::*;
use crate::config::HnswConfig;

const DIM: usize = 3;

fn new_row(file_id: i64, text: &str, vector: [f32; DIM], category: &str) -> NewRow {
    NewRow {
        text: text.to_string(),
        vector: vector.to_vec(),
        file_id,
        filename: format!("file_{file_id}.pdf"),
        filetype: "application/pdf".to_string(),
        page_number: 1,
        category: category.to_string(),
        user_id: vec![9],
    }
}

async fn store_with_collection(name: &str) -> MemoryVectorStore {
    let store = MemoryVectorStore::new();
    store
        .create_collection(name, &CollectionSchema::chunks(DIM))
        .await
        .expect("should create collection");
    store
}

#[tokio::test]
async fn create_and_describe() {
    let store = store_with_collection("artifacts").await;

    assert!(store.has_collection("artifacts").await.expect("has works"));
    assert!(!store.has_collection("board_1").await.expect("has works"));
    assert_eq!(
        store
            .describe_collection("artifacts")
            .await
            .expect("should describe"),
        CollectionSchema::chunks(DIM)
    );

    let duplicate = store
        .create_collection("artifacts", &CollectionSchema::chunks(DIM))
        .await;
    assert!(matches!(duplicate, Err(StoreError::CollectionExists(_))));
}

#[tokio::test]
async fn indexes_are_recorded_once() {
    let store = store_with_collection("artifacts").await;
    let schema = CollectionSchema::chunks(DIM);
    for index in schema.indexes(HnswConfig::default()) {
        assert_eq!(
            store
                .create_index("artifacts", &index)
                .await
                .expect("should build"),
            IndexBuild::Built
        );
        store
            .create_index("artifacts", &index)
            .await
            .expect("rebuild is a no-op");
    }

    let indexes = store.list_indexes("artifacts").await.expect("should list");
    assert_eq!(indexes.len(), 3);
}

#[tokio::test]
async fn reads_require_load() {
    let store = store_with_collection("artifacts").await;
    store
        .insert("artifacts", vec![new_row(1, "a", [0.0, 0.0, 0.0], "Title")])
        .await
        .expect("insert does not need load");

    let result = store.query("artifacts", &Filter::all()).await;
    assert!(matches!(result, Err(StoreError::NotLoaded(_))));

    store
        .load_collection("artifacts")
        .await
        .expect("should load");
    assert_eq!(
        store
            .query("artifacts", &Filter::all())
            .await
            .expect("query works")
            .len(),
        1
    );

    store
        .release_collection("artifacts")
        .await
        .expect("should release");
    let result = store
        .search("artifacts", &[0.0, 0.0, 0.0], &Filter::all(), 5)
        .await;
    assert!(matches!(result, Err(StoreError::NotLoaded(_))));
}

#[tokio::test]
async fn insert_reports_invalid_rows_and_keeps_valid_ones() {
    let store = store_with_collection("artifacts").await;

    let mut wrong_width = new_row(1, "bad", [0.0, 0.0, 0.0], "Title");
    wrong_width.vector.push(1.0);

    let outcome = store
        .insert(
            "artifacts",
            vec![
                new_row(1, "first", [0.0, 0.0, 0.0], "Title"),
                wrong_width,
                new_row(1, "third", [1.0, 0.0, 0.0], "Title"),
            ],
        )
        .await
        .expect("insert should run");

    assert_eq!(outcome.ids.len(), 2);
    assert!(outcome.ids[0] < outcome.ids[1]);
    assert_eq!(outcome.rejected.len(), 1);
    assert_eq!(outcome.rejected[0].0, 1);
    assert_eq!(store.count_rows("artifacts").await.expect("count"), 2);
}

#[tokio::test]
async fn search_ranks_by_distance_with_filter() {
    let store = store_with_collection("artifacts").await;
    store
        .insert(
            "artifacts",
            vec![
                new_row(1, "far", [5.0, 5.0, 5.0], "NarrativeText"),
                new_row(1, "near", [0.1, 0.0, 0.0], "NarrativeText"),
                new_row(2, "exact", [0.0, 0.0, 0.0], "Other"),
                new_row(2, "middle", [1.0, 1.0, 0.0], "ListItem"),
            ],
        )
        .await
        .expect("should insert");
    store
        .load_collection("artifacts")
        .await
        .expect("should load");

    let filter = Filter::all().with_categories(["NarrativeText", "ListItem"]);
    let hits = store
        .search("artifacts", &[0.0, 0.0, 0.0], &filter, 10)
        .await
        .expect("search works");

    let texts: Vec<&str> = hits.iter().map(|h| h.row.text.as_str()).collect();
    assert_eq!(texts, vec!["near", "middle", "far"]);
    assert!(hits.windows(2).all(|w| w[0].distance <= w[1].distance));

    let limited = store
        .search("artifacts", &[0.0, 0.0, 0.0], &Filter::all(), 1)
        .await
        .expect("search works");
    assert_eq!(limited.len(), 1);
    assert_eq!(limited[0].row.text, "exact");
}

#[tokio::test]
async fn delete_removes_only_given_ids() {
    let store = store_with_collection("artifacts").await;
    let outcome = store
        .insert(
            "artifacts",
            vec![
                new_row(1, "a", [0.0, 0.0, 0.0], "Title"),
                new_row(2, "b", [0.0, 0.0, 0.0], "Title"),
            ],
        )
        .await
        .expect("should insert");
    store
        .load_collection("artifacts")
        .await
        .expect("should load");

    let deleted = store
        .delete("artifacts", &[outcome.ids[0], 999])
        .await
        .expect("delete works");
    assert_eq!(deleted, 1);

    let remaining = store
        .query("artifacts", &Filter::all())
        .await
        .expect("query works");
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].file_id, 2);
}

#[tokio::test]
async fn missing_collection_is_reported() {
    let store = MemoryVectorStore::new();
    assert!(matches!(
        store.load_collection("user_5").await,
        Err(StoreError::CollectionNotFound(_))
    ));
    assert!(matches!(
        store.insert("user_5", Vec::new()).await,
        Err(StoreError::CollectionNotFound(_))
    ));
}
