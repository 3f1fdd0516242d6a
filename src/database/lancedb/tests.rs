use super::*;
use crate::config::HnswConfig;
use tempfile::TempDir;

const DIM: usize = 4;

async fn create_test_store() -> (LanceVectorStore, TempDir) {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let uri = temp_dir.path().join("vectors");
    let store = LanceVectorStore::connect(&uri.to_string_lossy(), 16)
        .await
        .expect("should connect to lancedb");
    (store, temp_dir)
}

fn test_row(file_id: i64, text: &str, offset: f32, category: &str) -> NewRow {
    NewRow {
        text: text.to_string(),
        vector: (0..DIM).map(|i| offset + i as f32 * 0.1).collect(),
        file_id,
        filename: format!("report_{}.pdf", file_id),
        filetype: "application/pdf".to_string(),
        page_number: 2,
        category: category.to_string(),
        user_id: vec![3, 4],
    }
}

#[tokio::test]
async fn created_collection_describes_declared_schema() {
    let (store, _temp_dir) = create_test_store().await;
    let schema = CollectionSchema::chunks(DIM);

    store
        .create_collection("artifacts", &schema)
        .await
        .expect("should create collection");

    assert!(store.has_collection("artifacts").await.expect("should list"));
    let described = store
        .describe_collection("artifacts")
        .await
        .expect("should describe");
    assert!(schema.check_compatible(&described).is_ok());
    assert_eq!(described.vector_dimension(), Some(DIM));

    let again = store.create_collection("artifacts", &schema).await;
    assert!(matches!(again, Err(StoreError::CollectionExists(_))));
}

#[tokio::test]
async fn indexes_wait_for_data() {
    let (store, _temp_dir) = create_test_store().await;
    let schema = CollectionSchema::chunks(DIM);
    store
        .create_collection("board_1", &schema)
        .await
        .expect("should create collection");

    for index in schema.indexes(HnswConfig::default()) {
        assert_eq!(
            store
                .create_index("board_1", &index)
                .await
                .expect("should accept index request"),
            IndexBuild::Deferred
        );
    }

    store
        .insert("board_1", vec![test_row(1, "alpha", 0.0, "Title")])
        .await
        .expect("should insert");

    let file_id_index = &schema.indexes(HnswConfig::default())[1];
    assert_eq!(
        store
            .create_index("board_1", file_id_index)
            .await
            .expect("should build scalar index"),
        IndexBuild::Built
    );
    let names = store.list_indexes("board_1").await.expect("should list");
    assert!(names.iter().any(|n| n == &file_id_index.name));
}

#[tokio::test]
async fn insert_query_and_delete_round_trip() {
    let (store, _temp_dir) = create_test_store().await;
    store
        .create_collection("user_7", &CollectionSchema::chunks(DIM))
        .await
        .expect("should create collection");

    let outcome = store
        .insert(
            "user_7",
            vec![
                test_row(10, "first", 0.0, "NarrativeText"),
                test_row(10, "second", 1.0, "ListItem"),
                test_row(11, "other file", 2.0, "NarrativeText"),
            ],
        )
        .await
        .expect("should insert");
    assert_eq!(outcome.ids.len(), 3);
    assert!(outcome.rejected.is_empty());

    let unloaded = store.query("user_7", &Filter::all()).await;
    assert!(matches!(unloaded, Err(StoreError::NotLoaded(_))));

    store.load_collection("user_7").await.expect("should load");
    let rows = store
        .query("user_7", &Filter::all().with_file_id(10))
        .await
        .expect("should query");
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|r| r.file_id == 10 && r.user_id == vec![3, 4]));

    let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
    let deleted = store.delete("user_7", &ids).await.expect("should delete");
    assert_eq!(deleted, 2);
    assert_eq!(store.count_rows("user_7").await.expect("should count"), 1);
}

#[tokio::test]
async fn invalid_rows_are_rejected_individually() {
    let (store, _temp_dir) = create_test_store().await;
    store
        .create_collection("artifacts", &CollectionSchema::chunks(DIM))
        .await
        .expect("should create collection");

    let mut oversized = test_row(1, "bad", 0.0, "Title");
    oversized.filetype = "x".repeat(1000);

    let outcome = store
        .insert(
            "artifacts",
            vec![test_row(1, "good", 0.0, "Title"), oversized],
        )
        .await
        .expect("insert should run");
    assert_eq!(outcome.ids.len(), 1);
    assert_eq!(outcome.rejected.len(), 1);
    assert_eq!(outcome.rejected[0].0, 1);
}

#[tokio::test]
async fn search_returns_nearest_rows_with_filter() {
    let (store, _temp_dir) = create_test_store().await;
    store
        .create_collection("artifacts", &CollectionSchema::chunks(DIM))
        .await
        .expect("should create collection");
    store
        .insert(
            "artifacts",
            vec![
                test_row(1, "close", 0.0, "NarrativeText"),
                test_row(1, "distant", 5.0, "NarrativeText"),
                test_row(2, "title", 0.0, "Title"),
            ],
        )
        .await
        .expect("should insert");
    store.load_collection("artifacts").await.expect("should load");

    let query: Vec<f32> = (0..DIM).map(|i| i as f32 * 0.1).collect();
    let filter = Filter::all().with_categories(["NarrativeText"]);
    let hits = store
        .search("artifacts", &query, &filter, 5)
        .await
        .expect("should search");

    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].row.text, "close");
    assert!(hits[0].distance <= hits[1].distance);
    assert!(hits.iter().all(|h| h.row.category == "NarrativeText"));
}

#[tokio::test]
async fn ids_keep_increasing_across_connections() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let uri = temp_dir.path().join("vectors").to_string_lossy().to_string();

    let first_ids = {
        let store = LanceVectorStore::connect(&uri, 16)
            .await
            .expect("should connect");
        store
            .create_collection("artifacts", &CollectionSchema::chunks(DIM))
            .await
            .expect("should create collection");
        store
            .insert("artifacts", vec![test_row(1, "a", 0.0, "Title")])
            .await
            .expect("should insert")
            .ids
    };

    let store = LanceVectorStore::connect(&uri, 16)
        .await
        .expect("should reconnect");
    let second_ids = store
        .insert("artifacts", vec![test_row(1, "b", 0.0, "Title")])
        .await
        .expect("should insert")
        .ids;

    assert!(second_ids[0] > first_ids[0]);
}

#[tokio::test]
async fn missing_collection_is_reported() {
    let (store, _temp_dir) = create_test_store().await;
    assert!(matches!(
        store.load_collection("board_99").await,
        Err(StoreError::CollectionNotFound(_))
    ));
    assert!(matches!(
        store.search("board_99", &[0.0; DIM], &Filter::all(), 3).await,
        Err(StoreError::CollectionNotFound(_))
    ));
}
