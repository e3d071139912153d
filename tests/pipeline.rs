//! End-to-end tests: refresh pipeline against an in-memory store with
//! mock collaborators, then the query layer over the published
//! generation.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use adawat::embedding::EmbeddingProvider;
use adawat::error::CatalogError;
use adawat::models::Record;
use adawat::query::{ListParams, QueryEngine};
use adawat::refresh::{Refresher, RefreshPipeline};
use adawat::source::DatasetSource;
use adawat::store::{load_generation, CacheStore, MemoryStore};

const CATALOG_SIZE: usize = 20;

/// Fixed catalog of 20 records with the columns the extractor treats
/// specially.
fn fixture_records() -> Vec<Record> {
    (0..CATALOG_SIZE)
        .map(|i| {
            let mut rec = Record::new();
            rec.insert("Name", json!(format!("dataset-{i:02}")));
            rec.insert(
                "Description",
                json!(format!("corpus number {i} about topic {}", i % 4)),
            );
            rec.insert("Tasks", json!(["nlp, ner", "nlp, sentiment ", "vision"][i % 3]));
            rec.insert(
                "Dialect",
                json!(if i % 2 == 0 {
                    "Arabic (Egypt)"
                } else {
                    "Arabic (Modern Standard Arabic), Arabic (Levant)"
                }),
            );
            rec.insert("License", json!(if i < 10 { "MIT" } else { "nan" }));
            rec.insert("Year", json!(2010 + (i as i64 % 5)));
            rec
        })
        .collect()
}

struct StaticSource {
    records: Vec<Record>,
    delay: Option<Duration>,
}

impl StaticSource {
    fn new() -> Self {
        Self {
            records: fixture_records(),
            delay: None,
        }
    }

    fn slow(delay: Duration) -> Self {
        Self {
            records: fixture_records(),
            delay: Some(delay),
        }
    }
}

#[async_trait]
impl DatasetSource for StaticSource {
    fn name(&self) -> String {
        "static:fixture".to_string()
    }

    async fn fetch_records(&self) -> Result<Vec<Record>, CatalogError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.records.clone())
    }
}

struct FailingSource;

#[async_trait]
impl DatasetSource for FailingSource {
    fn name(&self) -> String {
        "static:failing".to_string()
    }

    async fn fetch_records(&self) -> Result<Vec<Record>, CatalogError> {
        Err(CatalogError::SourceUnavailable("fixture outage".to_string()))
    }
}

/// Deterministic embedder: a small vector derived from the text bytes,
/// spread enough for t-SNE and k-means to chew on.
struct MockEmbedder {
    calls: AtomicUsize,
}

impl MockEmbedder {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbedder {
    fn model_name(&self) -> &str {
        "mock-embedder"
    }

    fn dims(&self) -> usize {
        8
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, CatalogError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let bytes = text.as_bytes();
        Ok((0..8)
            .map(|d| {
                bytes
                    .iter()
                    .enumerate()
                    .map(|(i, b)| ((*b as usize * (i + d + 1)) % 97) as f32 * 0.1)
                    .sum::<f32>()
            })
            .collect())
    }
}

fn pipeline(store: Arc<dyn CacheStore>) -> RefreshPipeline {
    RefreshPipeline::new(
        Arc::new(StaticSource::new()),
        Arc::new(MockEmbedder::new()),
        store,
    )
}

#[tokio::test]
async fn refresh_publishes_enriched_generation() {
    let store: Arc<dyn CacheStore> = Arc::new(MemoryStore::new());
    let summary = pipeline(store.clone()).run().await.unwrap();
    assert_eq!(summary.records, CATALOG_SIZE);

    let generation = load_generation(store.as_ref()).await.unwrap();
    assert_eq!(generation.records.len(), CATALOG_SIZE);

    for (i, record) in generation.records.iter().enumerate() {
        // Sequential 1-based ids in refresh order.
        assert_eq!(record.get("Id"), Some(&json!(i + 1)));

        // Cluster ids in [0, 15).
        let cluster = record.get("Cluster").and_then(Value::as_u64).unwrap();
        assert!(cluster < 15);

        // Two-element coordinate pair, non-negative after translation.
        let coords = record.get("Embeddings").and_then(Value::as_array).unwrap();
        assert_eq!(coords.len(), 2);
        assert!(coords.iter().all(|c| c.as_f64().unwrap() >= 0.0));
    }

    // The global minimum coordinate is exactly zero.
    let min = generation
        .records
        .iter()
        .flat_map(|r| {
            r.get("Embeddings")
                .and_then(Value::as_array)
                .unwrap()
                .iter()
                .map(|c| c.as_f64().unwrap())
                .collect::<Vec<_>>()
        })
        .fold(f64::INFINITY, f64::min);
    assert!(min.abs() < 1e-9, "min coordinate was {min}");

    // Every record carries the same key set.
    let columns = generation.records[0].columns();
    for record in &generation.records {
        assert_eq!(record.columns(), columns);
    }
}

#[tokio::test]
async fn refresh_extracts_expected_tags() {
    let store: Arc<dyn CacheStore> = Arc::new(MemoryStore::new());
    pipeline(store.clone()).run().await.unwrap();

    let generation = load_generation(store.as_ref()).await.unwrap();
    let tags = &generation.tags;

    assert_eq!(tags["Tasks"], json!(["ner", "nlp", "sentiment", "vision"]));
    assert_eq!(tags["Dialect"], json!(["Egypt", "Levant", "MSA"]));
    // The literal "nan" never appears in a tag list.
    assert_eq!(tags["License"], json!(["MIT"]));
}

#[tokio::test]
async fn refresh_is_deterministic() {
    let store_a: Arc<dyn CacheStore> = Arc::new(MemoryStore::new());
    let store_b: Arc<dyn CacheStore> = Arc::new(MemoryStore::new());

    pipeline(store_a.clone()).run().await.unwrap();
    pipeline(store_b.clone()).run().await.unwrap();

    let a = load_generation(store_a.as_ref()).await.unwrap();
    let b = load_generation(store_b.as_ref()).await.unwrap();
    assert_eq!(a, b);
}

#[tokio::test]
async fn failed_refresh_retains_previous_generation() {
    let store: Arc<dyn CacheStore> = Arc::new(MemoryStore::new());
    pipeline(store.clone()).run().await.unwrap();
    let before = load_generation(store.as_ref()).await.unwrap();

    let failing = RefreshPipeline::new(
        Arc::new(FailingSource),
        Arc::new(MockEmbedder::new()),
        store.clone(),
    );
    let err = failing.run().await.unwrap_err();
    assert!(matches!(err, CatalogError::SourceUnavailable(_)));

    let after = load_generation(store.as_ref()).await.unwrap();
    assert_eq!(before, after);
}

#[tokio::test]
async fn second_refresh_trigger_is_rejected_while_in_flight() {
    let store: Arc<dyn CacheStore> = Arc::new(MemoryStore::new());
    let slow = RefreshPipeline::new(
        Arc::new(StaticSource::slow(Duration::from_millis(200))),
        Arc::new(MockEmbedder::new()),
        store,
    );
    let refresher = Refresher::new(slow);

    let handle = refresher.spawn().unwrap();
    assert!(refresher.is_running());
    assert!(matches!(
        refresher.spawn(),
        Err(CatalogError::RefreshInFlight)
    ));

    handle.await.unwrap().unwrap();
    assert!(!refresher.is_running());

    // Once the first refresh completed, a new one may start.
    let handle = refresher.spawn().unwrap();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn embedding_cache_prevents_recomputation_across_refreshes() {
    use adawat::embedding::CachedEmbedder;

    let store: Arc<dyn CacheStore> = Arc::new(MemoryStore::new());
    let calls = Arc::new(AtomicUsize::new(0));

    struct SharedCountEmbedder {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl EmbeddingProvider for SharedCountEmbedder {
        fn model_name(&self) -> &str {
            "shared-count"
        }
        fn dims(&self) -> usize {
            8
        }
        async fn embed(&self, text: &str) -> Result<Vec<f32>, CatalogError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let seed = text.len() as f32;
            Ok((0..8).map(|d| seed + d as f32).collect())
        }
    }

    let embedder = Arc::new(CachedEmbedder::new(
        Box::new(SharedCountEmbedder {
            calls: calls.clone(),
        }),
        store.clone(),
    ));

    let pipeline = RefreshPipeline::new(Arc::new(StaticSource::new()), embedder, store);
    pipeline.run().await.unwrap();
    let first_run = calls.load(Ordering::SeqCst);
    assert!(first_run <= CATALOG_SIZE);

    pipeline.run().await.unwrap();
    // Identical record texts: the second refresh hits the cache only.
    assert_eq!(calls.load(Ordering::SeqCst), first_run);
}

#[tokio::test]
async fn query_layer_serves_published_generation() {
    let store: Arc<dyn CacheStore> = Arc::new(MemoryStore::new());
    pipeline(store.clone()).run().await.unwrap();
    let engine = QueryEngine::new(store);

    let schema = engine.schema().await.unwrap();
    assert!(schema.contains(&"Id".to_string()));
    assert!(schema.contains(&"Cluster".to_string()));
    assert!(schema.contains(&"Embeddings".to_string()));

    // Filtered listing over enrichment and source columns together.
    let params = ListParams {
        query: Some("Id <= 5 && Cluster >= 0".to_string()),
        ..Default::default()
    };
    let records = engine.list(&params).await.unwrap();
    assert_eq!(records.len(), 5);

    // Projection by name.
    let rec = engine.get(1, &["Name".to_string()]).await.unwrap();
    assert_eq!(rec.columns(), vec!["Name"]);

    // Full record via the sentinel.
    let rec = engine.get(1, &["all".to_string()]).await.unwrap();
    assert_eq!(rec.columns(), schema);
}

#[tokio::test]
async fn queries_before_any_refresh_report_empty_catalog() {
    let engine = QueryEngine::new(Arc::new(MemoryStore::new()));
    assert!(matches!(
        engine.schema().await,
        Err(CatalogError::EmptyCatalog)
    ));
    assert!(matches!(
        engine.list(&ListParams::default()).await,
        Err(CatalogError::EmptyCatalog)
    ));
    assert!(matches!(
        engine.get(1, &["all".to_string()]).await,
        Err(CatalogError::EmptyCatalog)
    ));
    assert!(matches!(
        engine.tags(&["all".to_string()]).await,
        Err(CatalogError::EmptyCatalog)
    ));
}

#[tokio::test]
async fn record_count_always_matches_tag_source_generation() {
    // Publish generation A, then interleave reads with a second refresh
    // whose record set is identical; a reader must never see records
    // and tags from different generations. With the snapshot read this
    // reduces to: both keys always load together.
    let store: Arc<dyn CacheStore> = Arc::new(MemoryStore::new());
    pipeline(store.clone()).run().await.unwrap();

    let reader = {
        let store = store.clone();
        tokio::spawn(async move {
            for _ in 0..50 {
                let generation = load_generation(store.as_ref()).await.unwrap();
                assert_eq!(generation.records.len(), CATALOG_SIZE);
                assert!(!generation.tags.is_empty());
                tokio::task::yield_now().await;
            }
        })
    };

    let writer = {
        let store = store.clone();
        tokio::spawn(async move {
            pipeline(store).run().await.unwrap();
        })
    };

    reader.await.unwrap();
    writer.await.unwrap();
}
