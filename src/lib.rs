//! # Adawat Catalog
//!
//! A refreshable catalog of dataset metadata enriched with derived
//! tags and a 2-D visual layout.
//!
//! The refresh pipeline fetches the raw record set from a dataset
//! source, extracts categorical tags, embeds each record's descriptive
//! text, reduces the embedding batch to 2-D coordinates (seeded t-SNE),
//! assigns k-means clusters, and publishes the enriched generation
//! atomically to a cache store. The query engine serves the published
//! generation with pagination, column projection, and structured
//! filtering.
//!
//! ```text
//! ┌──────────┐   ┌───────────────────────────────┐   ┌──────────┐
//! │ Dataset  │──▶│ RefreshPipeline               │──▶│  Cache   │
//! │ source   │   │ tags + embed + t-SNE + kmeans │   │  store   │
//! └──────────┘   └───────────────────────────────┘   └────┬─────┘
//!                                                         │
//!                                                         ▼
//!                                                   ┌──────────┐
//!                                                   │  Query   │
//!                                                   │  engine  │
//!                                                   └──────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Records, tag index, generations |
//! | [`source`] | Dataset source connectors |
//! | [`embedding`] | Embedding provider abstraction + caching |
//! | [`tags`] | Tag extraction |
//! | [`reduce`] | 2-D dimensionality reduction |
//! | [`cluster`] | K-means cluster assignment |
//! | [`refresh`] | Pipeline orchestration and publish |
//! | [`query`] | Pagination, projection, filtering |
//! | [`filter`] | Filter expression grammar |
//! | [`store`] | Cache store (SQLite, in-memory) |

pub mod cluster;
pub mod config;
pub mod embedding;
pub mod error;
pub mod filter;
pub mod models;
pub mod query;
pub mod reduce;
pub mod refresh;
pub mod source;
pub mod store;
pub mod tags;
