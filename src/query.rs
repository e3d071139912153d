//! Query layer: read-only access to the current generation.
//!
//! Serves schema, paginated listings, single-record lookups, and the
//! tag index from the cache store. Every operation loads the generation
//! as one consistent snapshot, applies the shared projection rule, and
//! never mutates state.

use std::sync::Arc;

use crate::error::CatalogError;
use crate::filter::Expr;
use crate::models::{project_keys, Record, TagIndex, ALL_FEATURES};
use crate::store::{load_generation, CacheStore};

/// Parameters for [`QueryEngine::list`].
#[derive(Debug, Clone)]
pub struct ListParams {
    /// 1-based page number.
    pub page: usize,
    /// Page size; `None` means the full generation length.
    pub size: Option<usize>,
    /// Column projection; `["all"]` means no projection.
    pub features: Vec<String>,
    /// Optional filter expression applied to the page slice.
    pub query: Option<String>,
}

impl Default for ListParams {
    fn default() -> Self {
        Self {
            page: 1,
            size: None,
            features: vec![ALL_FEATURES.to_string()],
            query: None,
        }
    }
}

/// Parse a comma-separated `features` argument. An empty or
/// whitespace-only argument means "no projection".
pub fn parse_features(raw: &str) -> Vec<String> {
    let features: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .map(str::to_string)
        .collect();

    if features.is_empty() {
        vec![ALL_FEATURES.to_string()]
    } else {
        features
    }
}

/// Read-only view over the most recently published generation.
pub struct QueryEngine {
    store: Arc<dyn CacheStore>,
}

impl QueryEngine {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }

    /// Ordered column names of the first record.
    pub async fn schema(&self) -> Result<Vec<String>, CatalogError> {
        let generation = load_generation(self.store.as_ref()).await?;
        let first = generation.records.first().ok_or(CatalogError::EmptyCatalog)?;
        Ok(first.columns())
    }

    /// Paginated, filtered, projected listing.
    ///
    /// Slices `[(page-1)*size, page*size)` first, then applies the
    /// filter to the slice, then the projection.
    pub async fn list(&self, params: &ListParams) -> Result<Vec<Record>, CatalogError> {
        let generation = load_generation(self.store.as_ref()).await?;
        let records = generation.records;

        if params.page == 0 {
            return Err(CatalogError::PageNotFound { page: 0 });
        }

        let size = params.size.unwrap_or(records.len());
        let start = (params.page - 1).saturating_mul(size);
        let end = start.saturating_add(size).min(records.len());

        if start >= end {
            return Err(CatalogError::PageNotFound { page: params.page });
        }

        let filter = params
            .query
            .as_deref()
            .filter(|q| !q.trim().is_empty())
            .map(Expr::parse)
            .transpose()?;

        let mut page = Vec::new();
        for record in &records[start..end] {
            let keep = match &filter {
                Some(expr) => expr.matches(record)?,
                None => true,
            };
            if keep {
                page.push(record.project(&params.features));
            }
        }

        Ok(page)
    }

    /// Single record by 1-based index, projected.
    pub async fn get(&self, index: usize, features: &[String]) -> Result<Record, CatalogError> {
        let generation = load_generation(self.store.as_ref()).await?;
        let len = generation.records.len();

        if index == 0 || index > len {
            return Err(CatalogError::IndexOutOfRange { index, len });
        }

        Ok(generation.records[index - 1].project(features))
    }

    /// The tag index, projected with the shared rule.
    pub async fn tags(&self, features: &[String]) -> Result<TagIndex, CatalogError> {
        let generation = load_generation(self.store.as_ref()).await?;
        Ok(project_keys(&generation.tags, features))
    }
}
