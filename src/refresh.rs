//! Refresh pipeline orchestration.
//!
//! Coordinates a full catalog regeneration: fetch raw records →
//! extract tags → embed each record → reduce embeddings to 2-D and
//! assign clusters → merge enrichments back by index → publish both
//! keys atomically. Any step failure aborts the refresh and leaves the
//! previously published generation visible.
//!
//! [`Refresher`] enforces the at-most-one-refresh-in-flight discipline:
//! [`Refresher::spawn`] returns immediately with a join handle, and a
//! second trigger while one is running is rejected with
//! [`CatalogError::RefreshInFlight`] rather than racing to publish.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::json;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::cluster::assign_clusters;
use crate::embedding::EmbeddingProvider;
use crate::error::CatalogError;
use crate::models::{Generation, Record, CLUSTER_COLUMN, EMBEDDINGS_COLUMN, ID_COLUMN};
use crate::reduce::reduce_to_plane;
use crate::source::DatasetSource;
use crate::store::{publish_generation, CacheStore};
use crate::tags::extract_tags;

/// Counters reported after a successful refresh.
#[derive(Debug, Clone)]
pub struct RefreshSummary {
    pub records: usize,
    pub tag_columns: usize,
}

/// Orchestrates one full regeneration of the catalog.
pub struct RefreshPipeline {
    source: Arc<dyn DatasetSource>,
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn CacheStore>,
}

impl RefreshPipeline {
    pub fn new(
        source: Arc<dyn DatasetSource>,
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn CacheStore>,
    ) -> Self {
        Self {
            source,
            embedder,
            store,
        }
    }

    /// Run the full refresh to completion and publish the new
    /// generation. On error nothing is written: the old generation, if
    /// any, stays visible.
    pub async fn run(&self) -> Result<RefreshSummary, CatalogError> {
        info!(source = %self.source.name(), "starting catalog refresh");

        let mut records = self.source.fetch_records().await?;
        info!(records = records.len(), "fetched raw records");

        validate_uniform_schema(&records)?;

        let tags = extract_tags(&records)?;

        let mut embeddings = Vec::with_capacity(records.len());
        for record in &records {
            let vector = self.embedder.embed(&record.embedding_text()).await?;
            embeddings.push(vector);
        }
        info!(
            vectors = embeddings.len(),
            model = self.embedder.model_name(),
            "embedded records"
        );

        // Both consumers read the same ordered batch; merge-back below
        // relies on that order being preserved.
        let points = reduce_to_plane(&embeddings)?;
        let clusters = assign_clusters(&embeddings)?;

        for (index, record) in records.iter_mut().enumerate() {
            record.insert(ID_COLUMN, json!(index + 1));
            record.insert(CLUSTER_COLUMN, json!(clusters[index]));
            record.insert(
                EMBEDDINGS_COLUMN,
                json!([points[index][0], points[index][1]]),
            );
        }

        let generation = Generation {
            records,
            tags,
        };
        publish_generation(self.store.as_ref(), &generation).await?;

        let summary = RefreshSummary {
            records: generation.records.len(),
            tag_columns: generation.tags.len(),
        };
        info!(
            records = summary.records,
            tag_columns = summary.tag_columns,
            "published new generation"
        );
        Ok(summary)
    }
}

/// Every record in a generation must carry the same key set; drift
/// indicates an upstream export problem and aborts the refresh.
fn validate_uniform_schema(records: &[Record]) -> Result<(), CatalogError> {
    let Some(first) = records.first() else {
        return Ok(());
    };
    let expected = first.columns();

    for (row, record) in records.iter().enumerate().skip(1) {
        for column in &expected {
            if record.get(column).is_none() {
                return Err(CatalogError::SchemaMismatch {
                    row,
                    column: column.clone(),
                });
            }
        }
        for column in record.columns() {
            if first.get(&column).is_none() {
                return Err(CatalogError::SchemaMismatch { row: 0, column });
            }
        }
    }

    Ok(())
}

/// Launches refreshes as background tasks, at most one in flight.
pub struct Refresher {
    pipeline: Arc<RefreshPipeline>,
    in_flight: Arc<AtomicBool>,
}

/// Clears the in-flight flag when the refresh task finishes, even if
/// the pipeline panicked.
struct InFlightGuard(Arc<AtomicBool>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Refresher {
    pub fn new(pipeline: RefreshPipeline) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Start a refresh in the background and return immediately.
    ///
    /// The result is observed either through the returned handle or
    /// simply through the next published generation. Fails with
    /// [`CatalogError::RefreshInFlight`] when one is already running.
    pub fn spawn(&self) -> Result<JoinHandle<Result<RefreshSummary, CatalogError>>, CatalogError> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(CatalogError::RefreshInFlight);
        }

        let pipeline = self.pipeline.clone();
        let guard = InFlightGuard(self.in_flight.clone());

        Ok(tokio::spawn(async move {
            let _guard = guard;
            let result = pipeline.run().await;
            if let Err(ref e) = result {
                warn!(error = %e, "refresh aborted; previous generation retained");
            }
            result
        }))
    }

    /// Whether a refresh is currently running.
    pub fn is_running(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }
}
