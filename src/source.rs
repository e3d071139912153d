//! Dataset source connectors.
//!
//! A [`DatasetSource`] produces the raw record set the refresh pipeline
//! enriches. Two implementations: [`HuggingFaceSource`] pages through
//! the datasets-server `/rows` API, and [`FileSource`] reads a local
//! JSON array for offline use and fixtures.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::config::SourceConfig;
use crate::error::CatalogError;
use crate::models::Record;

/// Environment variable holding the HuggingFace API token, if any.
const HF_TOKEN_ENV: &str = "HF_SECRET_KEY";

const DEFAULT_API_URL: &str = "https://datasets-server.huggingface.co";

/// External collaborator that yields the ordered raw record set.
///
/// Fetching may be slow and network-bound; retrying is the caller's
/// concern beyond the per-request backoff the HTTP source applies.
#[async_trait]
pub trait DatasetSource: Send + Sync {
    /// Short label for logging (e.g. `"huggingface:arbml/adawat"`).
    fn name(&self) -> String;

    /// Fetch all raw records, in source order.
    async fn fetch_records(&self) -> Result<Vec<Record>, CatalogError>;
}

/// Instantiate the source described by the configuration.
pub fn create_source(config: &SourceConfig) -> Result<Box<dyn DatasetSource>> {
    match config.provider.as_str() {
        "huggingface" => Ok(Box::new(HuggingFaceSource::new(config)?)),
        "file" => Ok(Box::new(FileSource::new(config)?)),
        other => anyhow::bail!("Unknown dataset source provider: {}", other),
    }
}

// ============ HuggingFace source ============

/// Pages through the datasets-server rows API:
/// `GET /rows?dataset=…&config=…&split=…&offset=…&length=…`.
pub struct HuggingFaceSource {
    dataset: String,
    subset: String,
    split: String,
    url: String,
    page_size: usize,
    timeout_secs: u64,
    max_retries: u32,
}

impl HuggingFaceSource {
    pub fn new(config: &SourceConfig) -> Result<Self> {
        let dataset = config
            .dataset
            .clone()
            .ok_or_else(|| anyhow::anyhow!("source.dataset required for huggingface provider"))?;

        Ok(Self {
            dataset,
            subset: config.subset.clone(),
            split: config.split.clone(),
            url: config
                .url
                .clone()
                .unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            page_size: config.page_size,
            timeout_secs: config.timeout_secs,
            max_retries: config.max_retries,
        })
    }

    async fn fetch_page(
        &self,
        client: &reqwest::Client,
        offset: usize,
    ) -> Result<Value, CatalogError> {
        let mut last_err: Option<CatalogError> = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s, 8s, ...
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let mut request = client
                .get(format!("{}/rows", self.url))
                .query(&[
                    ("dataset", self.dataset.as_str()),
                    ("config", self.subset.as_str()),
                    ("split", self.split.as_str()),
                ])
                .query(&[("offset", offset), ("length", self.page_size)]);

            if let Ok(token) = std::env::var(HF_TOKEN_ENV) {
                request = request.header("Authorization", format!("Bearer {token}"));
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        return response.json::<Value>().await.map_err(|e| {
                            CatalogError::SourceUnavailable(format!(
                                "invalid rows response: {e}"
                            ))
                        });
                    }

                    let body = response.text().await.unwrap_or_default();
                    let err = CatalogError::SourceUnavailable(format!(
                        "datasets-server error {status}: {body}"
                    ));

                    // Rate limited or server error: retry; any other
                    // client error is final.
                    if status.as_u16() == 429 || status.is_server_error() {
                        last_err = Some(err);
                        continue;
                    }
                    return Err(err);
                }
                Err(e) => {
                    last_err = Some(CatalogError::SourceUnavailable(format!(
                        "request to {} failed: {e}",
                        self.url
                    )));
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| {
            CatalogError::SourceUnavailable("dataset fetch failed after retries".to_string())
        }))
    }
}

#[async_trait]
impl DatasetSource for HuggingFaceSource {
    fn name(&self) -> String {
        format!("huggingface:{}", self.dataset)
    }

    async fn fetch_records(&self) -> Result<Vec<Record>, CatalogError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(self.timeout_secs))
            .build()
            .map_err(|e| CatalogError::SourceUnavailable(e.to_string()))?;

        let mut records = Vec::new();
        let mut offset = 0usize;

        loop {
            let page = self.fetch_page(&client, offset).await?;
            let rows = page
                .get("rows")
                .and_then(Value::as_array)
                .ok_or_else(|| {
                    CatalogError::SourceUnavailable("rows response missing 'rows' array".into())
                })?;

            for row in rows {
                let cells = row.get("row").and_then(Value::as_object).ok_or_else(|| {
                    CatalogError::SourceUnavailable("row entry missing 'row' object".into())
                })?;
                records.push(Record(cells.clone()));
            }

            let total = page
                .get("num_rows_total")
                .and_then(Value::as_u64)
                .unwrap_or(records.len() as u64) as usize;

            offset += rows.len();
            debug!(offset, total, "fetched dataset page");

            if rows.is_empty() || offset >= total {
                break;
            }
        }

        Ok(records)
    }
}

// ============ File source ============

/// Reads the raw record set from a local JSON file holding an array of
/// flat objects. Used for offline runs and test fixtures.
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(config: &SourceConfig) -> Result<Self> {
        let path = config
            .path
            .clone()
            .ok_or_else(|| anyhow::anyhow!("source.path required for file provider"))?;
        Ok(Self { path })
    }
}

#[async_trait]
impl DatasetSource for FileSource {
    fn name(&self) -> String {
        format!("file:{}", self.path.display())
    }

    async fn fetch_records(&self) -> Result<Vec<Record>, CatalogError> {
        let raw = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            CatalogError::SourceUnavailable(format!(
                "failed to read {}: {e}",
                self.path.display()
            ))
        })?;

        serde_json::from_str::<Vec<Record>>(&raw).map_err(|e| {
            CatalogError::SourceUnavailable(format!(
                "{} is not a JSON array of records: {e}",
                self.path.display()
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn file_source_reads_records_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("adawat.json");
        std::fs::write(
            &path,
            r#"[{"Name": "a", "Year": 1}, {"Name": "b", "Year": 2}]"#,
        )
        .unwrap();

        let source = FileSource { path };
        let records = source.fetch_records().await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get("Name"), Some(&Value::from("a")));
        assert_eq!(records[1].get("Year"), Some(&Value::from(2)));
    }

    #[tokio::test]
    async fn missing_file_is_source_unavailable() {
        let source = FileSource {
            path: PathBuf::from("/nonexistent/adawat.json"),
        };
        let err = source.fetch_records().await.unwrap_err();
        assert!(matches!(err, CatalogError::SourceUnavailable(_)));
    }

    #[tokio::test]
    async fn malformed_file_is_source_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{\"not\": \"an array\"}").unwrap();

        let source = FileSource { path };
        let err = source.fetch_records().await.unwrap_err();
        assert!(matches!(err, CatalogError::SourceUnavailable(_)));
    }
}
