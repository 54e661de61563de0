//! 🔌 Backends — where the real I/O happens.
//!
//! 🚰 The source cluster pours documents out, the destination cluster slurps them up.
//! Both are the same kind of thing: a cluster that can count, report aliases and indices,
//! hand over a mapping, create things, scroll, and swallow bulk bodies.
//!
//! 🎭 This module is the casting agency. Need a real Elasticsearch over HTTP? Got it.
//! Need a cluster that lives entirely in RAM so a test can peek at every bulk body?
//! Got that too. Same trait, same enum dispatch, zero surprises for the reindexer.
//!
//! 🦆 The duck is here because every file must have one. This is law. Do not question the duck.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;

pub mod common_config;
pub mod elasticsearch;
pub mod in_mem;

pub use common_config::CommonClusterConfig;
pub use elasticsearch::{ElasticsearchCluster, ElasticsearchConfig, ElasticsearchScroll};
pub use in_mem::{InMemoryCluster, InMemoryClusterConfig, InMemoryScroll};

use crate::app_config::ClusterConfig;

/// 🗺️ A mapping body, shaped the way index creation wants it: `{"mappings": {...}}`.
pub type Mapping = Value;

/// 📄 A pull-style cursor over every document in an index, one raw page per call.
///
/// # Contract 📜
/// - `next_page` returns `Ok(Some(page))` while pages flow; the page is the raw search
///   response body, uninterpreted. Parsing belongs to the bulk builder.
/// - `Ok(None)` = exhausted. The well is dry. The golden retriever goes home. 🐕
/// - Restartable per call to `open_scroll`, not resumable after an error.
/// - The caller stops pulling the moment its own handling fails; nothing is read ahead.
/// - `close` releases whatever the cluster holds for the cursor. Best-effort, idempotent,
///   and called whether the walk finished or was abandoned.
#[async_trait]
pub trait PageSource: std::fmt::Debug + Send {
    async fn next_page(&mut self) -> Result<Option<String>>;
    async fn close(&mut self);
}

/// 🏛️ Everything the reindexer needs from a search cluster. Nothing more.
///
/// Existence checks return `Result<bool>`: "I couldn't ask" is an error, never a quiet
/// "it doesn't exist" that would send the provisioner off creating things.
#[async_trait]
pub trait Cluster: std::fmt::Debug + Send + Sync {
    /// 🔢 Documents currently visible in `index` (alias or physical).
    async fn count(&self, index: &str) -> Result<u64>;
    async fn alias_exists(&self, alias: &str) -> Result<bool>;
    async fn index_exists(&self, index: &str) -> Result<bool>;
    /// 🗺️ `{"mappings": {...}}` of `index`, ready to hand to `create_index_with_mapping`.
    async fn get_mapping(&self, index: &str) -> Result<Mapping>;
    async fn create_index_with_mapping(&self, index: &str, mapping: &Mapping) -> Result<()>;
    /// 🏷️ Point `alias` at `index`.
    async fn put_alias(&self, index: &str, alias: &str) -> Result<()>;
    /// 📜 Open a scroll over `index` with `query`. Pages are pulled from the returned cursor.
    async fn open_scroll(&self, index: &str, query: &Value) -> Result<ScrollBackend>;
    /// 📡 Send one NDJSON bulk body at `index`. Per-item failures count as failure.
    async fn bulk(&self, body: String, index: &str) -> Result<()>;
}

/// 🎭 The many faces of a cluster. Callers never need to know (or care) whether they're
/// talking to RAM or to a cluster of overworked Elasticsearch nodes.
#[derive(Debug, Clone)]
pub enum ClusterBackend {
    InMemory(InMemoryCluster),
    Elasticsearch(ElasticsearchCluster),
}

impl ClusterBackend {
    /// 🔧 Build the backend a config asks for. Elasticsearch pings the cluster on the way in,
    /// so an unreachable URL fails here, not 50,000 documents later.
    pub async fn from_config(config: &ClusterConfig) -> Result<Self> {
        match config {
            ClusterConfig::InMemory(in_mem_config) => Ok(Self::InMemory(
                InMemoryCluster::from_config(in_mem_config)
                    .context("💀 Could not seed the in-memory cluster from its config")?,
            )),
            ClusterConfig::Elasticsearch(es_config) => Ok(Self::Elasticsearch(
                ElasticsearchCluster::new(es_config.clone()).await?,
            )),
        }
    }
}

#[async_trait]
impl Cluster for ClusterBackend {
    async fn count(&self, index: &str) -> Result<u64> {
        match self {
            Self::InMemory(c) => c.count(index).await,
            Self::Elasticsearch(c) => c.count(index).await,
        }
    }

    async fn alias_exists(&self, alias: &str) -> Result<bool> {
        match self {
            Self::InMemory(c) => c.alias_exists(alias).await,
            Self::Elasticsearch(c) => c.alias_exists(alias).await,
        }
    }

    async fn index_exists(&self, index: &str) -> Result<bool> {
        match self {
            Self::InMemory(c) => c.index_exists(index).await,
            Self::Elasticsearch(c) => c.index_exists(index).await,
        }
    }

    async fn get_mapping(&self, index: &str) -> Result<Mapping> {
        match self {
            Self::InMemory(c) => c.get_mapping(index).await,
            Self::Elasticsearch(c) => c.get_mapping(index).await,
        }
    }

    async fn create_index_with_mapping(&self, index: &str, mapping: &Mapping) -> Result<()> {
        match self {
            Self::InMemory(c) => c.create_index_with_mapping(index, mapping).await,
            Self::Elasticsearch(c) => c.create_index_with_mapping(index, mapping).await,
        }
    }

    async fn put_alias(&self, index: &str, alias: &str) -> Result<()> {
        match self {
            Self::InMemory(c) => c.put_alias(index, alias).await,
            Self::Elasticsearch(c) => c.put_alias(index, alias).await,
        }
    }

    async fn open_scroll(&self, index: &str, query: &Value) -> Result<ScrollBackend> {
        match self {
            Self::InMemory(c) => c.open_scroll(index, query).await,
            Self::Elasticsearch(c) => c.open_scroll(index, query).await,
        }
    }

    async fn bulk(&self, body: String, index: &str) -> Result<()> {
        match self {
            Self::InMemory(c) => c.bulk(body, index).await,
            Self::Elasticsearch(c) => c.bulk(body, index).await,
        }
    }
}

/// 🎭 Same trick for scroll cursors: one enum, one `next_page`, whichever cluster made it.
#[derive(Debug)]
pub enum ScrollBackend {
    InMemory(InMemoryScroll),
    Elasticsearch(ElasticsearchScroll),
}

#[async_trait]
impl PageSource for ScrollBackend {
    async fn next_page(&mut self) -> Result<Option<String>> {
        match self {
            Self::InMemory(s) => s.next_page().await,
            Self::Elasticsearch(s) => s.next_page().await,
        }
    }

    async fn close(&mut self) {
        match self {
            Self::InMemory(s) => s.close().await,
            Self::Elasticsearch(s) => s.close().await,
        }
    }
}
