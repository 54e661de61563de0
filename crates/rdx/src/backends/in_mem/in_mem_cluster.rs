use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde::de::IgnoredAny;
use serde_json::{Value, json};
use tokio::sync::Mutex;
use tracing::{debug, trace};

use super::InMemoryScroll;
use crate::backends::{Cluster, Mapping, ScrollBackend};

/// 📦 Config for an in-memory cluster: optional seed indices, and how big a scroll page is.
///
/// ```toml
/// [source_config.InMemory]
/// scroll_page_size = 2
///
/// [[source_config.InMemory.indices]]
/// name = "accounts"
/// mapping = { properties = { balance = { type = "keyword" } } }
/// documents = [ { id = "a", source = { balance = "10" } } ]
/// ```
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct InMemoryClusterConfig {
    #[serde(default)]
    pub indices: Vec<SeedIndex>,
    #[serde(default = "default_scroll_page_size")]
    pub scroll_page_size: usize,
}

fn default_scroll_page_size() -> usize {
    1000
}

fn empty_object() -> Value {
    json!({})
}

impl Default for InMemoryClusterConfig {
    fn default() -> Self {
        Self {
            indices: Vec::new(),
            scroll_page_size: default_scroll_page_size(),
        }
    }
}

/// 🌱 One index to plant in the cluster at startup. `mapping` is the inner mappings object.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct SeedIndex {
    pub name: String,
    #[serde(default = "empty_object")]
    pub mapping: Value,
    #[serde(default)]
    pub documents: Vec<SeedDocument>,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct SeedDocument {
    pub id: String,
    pub source: Value,
}

/// 📡 One bulk body as it arrived, and the index name it was aimed at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkRecord {
    pub index: String,
    pub body: String,
}

/// 🧨 Operations a test can sabotage on purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum InMemoryOperation {
    Count,
    GetMapping,
    CreateIndex,
    PutAlias,
    OpenScroll,
    Bulk,
}

#[derive(Debug, Clone, Default)]
struct StoredIndex {
    mapping: Value,
    // 🔑 keyed by _id: a second write of the same id replaces, exactly like the real thing
    documents: BTreeMap<String, String>,
}

/// 🏛️ Everything the in-memory cluster knows, plus a ledger of every mutating call.
#[derive(Debug, Default)]
pub struct InMemoryState {
    indices: BTreeMap<String, StoredIndex>,
    aliases: BTreeMap<String, String>,
    /// 🏗️ every `create_index_with_mapping`, in call order
    pub created_indices: Vec<String>,
    /// 🏷️ every `put_alias` as `(index, alias)`, in call order
    pub put_aliases: Vec<(String, String)>,
    /// 🗺️ every `get_mapping`, in call order
    pub mapping_fetches: Vec<String>,
    /// 🔢 every `count`, in call order
    pub counts: Vec<String>,
    /// 📜 every `open_scroll`, in call order
    pub scrolls_opened: Vec<String>,
    /// 📡 every `bulk`, in call order
    pub bulk_requests: Vec<BulkRecord>,
    failing: BTreeSet<InMemoryOperation>,
}

impl InMemoryState {
    /// 🔍 Alias first, then physical index. Same lookup order Elasticsearch uses for reads.
    fn resolve<'s>(&'s self, name: &'s str) -> Option<&'s str> {
        if let Some(target) = self.aliases.get(name) {
            return Some(target.as_str());
        }
        self.indices.contains_key(name).then_some(name)
    }

    fn resolve_or_bail<'s>(&'s self, name: &'s str) -> Result<&'s str> {
        self.resolve(name).with_context(|| {
            format!("💀 index_not_found_exception: no such index [{name}]. We looked under the couch. Nothing.")
        })
    }

    fn check(&self, operation: InMemoryOperation) -> Result<()> {
        if self.failing.contains(&operation) {
            anyhow::bail!("💀 simulated {:?} failure — the in-memory cluster was told to have a bad day", operation);
        }
        Ok(())
    }

    /// 🏷️ Where `alias` points, if anywhere.
    pub fn alias_target(&self, alias: &str) -> Option<&str> {
        self.aliases.get(alias).map(String::as_str)
    }

    pub fn has_index(&self, index: &str) -> bool {
        self.indices.contains_key(index)
    }

    /// 🔑 Ids stored in `name` (alias or physical), sorted.
    pub fn document_ids(&self, name: &str) -> Vec<String> {
        self.resolve(name)
            .and_then(|physical| self.indices.get(physical))
            .map(|index| index.documents.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// 📄 The stored source line for one document.
    pub fn document(&self, name: &str, id: &str) -> Option<&str> {
        let physical = self.resolve(name)?;
        self.indices
            .get(physical)?
            .documents
            .get(id)
            .map(String::as_str)
    }

    /// 🗺️ The inner mappings object of `name`.
    pub fn mapping(&self, name: &str) -> Option<&Value> {
        let physical = self.resolve(name)?;
        self.indices.get(physical).map(|index| &index.mapping)
    }
}

/// 📦 A cluster that never forgets. Unlike my dad, who forgot my soccer game in 1998.
///
/// Clone-able because tests need to peek inside after handing a clone off to the
/// reindexer. The `Arc` means everyone shares the same state. The borrow checker
/// approved. Barely. It had notes.
#[derive(Debug, Clone)]
pub struct InMemoryCluster {
    state: Arc<Mutex<InMemoryState>>,
    scroll_page_size: usize,
}

impl Default for InMemoryCluster {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryCluster {
    /// 🚀 An empty cluster. No indices, no aliases, no drama.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(InMemoryState::default())),
            scroll_page_size: default_scroll_page_size(),
        }
    }

    /// 📄 Smaller pages make multi-page scrolls easy to provoke in tests.
    pub fn with_scroll_page_size(mut self, scroll_page_size: usize) -> Self {
        self.scroll_page_size = scroll_page_size.max(1);
        self
    }

    /// 🌱 Build a cluster and plant every seed index from the config.
    pub fn from_config(config: &InMemoryClusterConfig) -> Result<Self> {
        let mut state = InMemoryState::default();
        for seed in &config.indices {
            if seed.name.is_empty() {
                anyhow::bail!("💀 A seed index showed up without a name. We can't file it anywhere.");
            }
            let documents = seed
                .documents
                .iter()
                .map(|doc| (doc.id.clone(), doc.source.to_string()))
                .collect();
            state.indices.insert(
                seed.name.clone(),
                StoredIndex {
                    mapping: seed.mapping.clone(),
                    documents,
                },
            );
        }
        debug!("🌱 In-memory cluster seeded with {} indices", state.indices.len());
        Ok(Self {
            state: Arc::new(Mutex::new(state)),
            scroll_page_size: config.scroll_page_size.max(1),
        })
    }

    /// 🌱 Plant one index directly. Replaces any index with the same name.
    pub async fn insert_index(&self, name: &str, mapping: Value, documents: Vec<(String, Value)>) {
        let documents = documents
            .into_iter()
            .map(|(id, source)| (id, source.to_string()))
            .collect();
        self.state
            .lock()
            .await
            .indices
            .insert(name.to_string(), StoredIndex { mapping, documents });
    }

    /// 🏷️ Point an alias at an index without going through the ledger.
    pub async fn insert_alias(&self, alias: &str, index: &str) {
        self.state
            .lock()
            .await
            .aliases
            .insert(alias.to_string(), index.to_string());
    }

    /// 🔍 Peek at the state. The lock is held for the duration of `f`, so keep it short.
    pub async fn inspect<R>(&self, f: impl FnOnce(&InMemoryState) -> R) -> R {
        let state = self.state.lock().await;
        f(&state)
    }

    #[cfg(test)]
    pub(crate) async fn fail_on(&self, operation: InMemoryOperation) {
        self.state.lock().await.failing.insert(operation);
    }
}

#[async_trait]
impl Cluster for InMemoryCluster {
    async fn count(&self, index: &str) -> Result<u64> {
        let mut state = self.state.lock().await;
        state.counts.push(index.to_string());
        state.check(InMemoryOperation::Count)?;
        let physical = state.resolve_or_bail(index)?;
        Ok(state
            .indices
            .get(physical)
            .map_or(0, |stored| stored.documents.len() as u64))
    }

    async fn alias_exists(&self, alias: &str) -> Result<bool> {
        Ok(self.state.lock().await.aliases.contains_key(alias))
    }

    async fn index_exists(&self, index: &str) -> Result<bool> {
        Ok(self.state.lock().await.indices.contains_key(index))
    }

    async fn get_mapping(&self, index: &str) -> Result<Mapping> {
        let mut state = self.state.lock().await;
        state.mapping_fetches.push(index.to_string());
        state.check(InMemoryOperation::GetMapping)?;
        let physical = state.resolve_or_bail(index)?;
        let mapping = state
            .indices
            .get(physical)
            .map(|stored| stored.mapping.clone())
            .unwrap_or_else(empty_object);
        Ok(json!({ "mappings": mapping }))
    }

    async fn create_index_with_mapping(&self, index: &str, mapping: &Mapping) -> Result<()> {
        let mut state = self.state.lock().await;
        state.check(InMemoryOperation::CreateIndex)?;
        if state.indices.contains_key(index) || state.aliases.contains_key(index) {
            anyhow::bail!("💀 resource_already_exists_exception: index [{index}] already exists");
        }
        let inner = mapping.get("mappings").cloned().unwrap_or_else(empty_object);
        state.indices.insert(
            index.to_string(),
            StoredIndex {
                mapping: inner,
                documents: BTreeMap::new(),
            },
        );
        state.created_indices.push(index.to_string());
        trace!("🏗️ in-memory index '{}' created", index);
        Ok(())
    }

    async fn put_alias(&self, index: &str, alias: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state.check(InMemoryOperation::PutAlias)?;
        if !state.indices.contains_key(index) {
            anyhow::bail!("💀 index_not_found_exception: cannot alias missing index [{index}]");
        }
        if state.indices.contains_key(alias) {
            anyhow::bail!("💀 invalid_alias_name_exception: an index named [{alias}] already exists");
        }
        state.aliases.insert(alias.to_string(), index.to_string());
        state.put_aliases.push((index.to_string(), alias.to_string()));
        Ok(())
    }

    async fn open_scroll(&self, index: &str, query: &Value) -> Result<ScrollBackend> {
        let mut state = self.state.lock().await;
        state.scrolls_opened.push(index.to_string());
        state.check(InMemoryOperation::OpenScroll)?;
        let physical = state.resolve_or_bail(index)?;
        // 📜 RAM has no query engine; everything is a match_all here
        trace!("📜 in-memory scroll over '{}' (query ignored: {})", physical, query);
        let documents = state
            .indices
            .get(physical)
            .map(|stored| {
                stored
                    .documents
                    .iter()
                    .map(|(id, source)| (id.clone(), source.clone()))
                    .collect()
            })
            .unwrap_or_default();
        Ok(ScrollBackend::InMemory(InMemoryScroll::new(
            physical.to_string(),
            documents,
            self.scroll_page_size,
        )))
    }

    /// 📡 Parse the NDJSON pairs and store them. Like Elasticsearch, an unknown target
    /// index is created on the spot, and an alias target writes through to its index.
    async fn bulk(&self, body: String, index: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state.bulk_requests.push(BulkRecord {
            index: index.to_string(),
            body: body.clone(),
        });
        state.check(InMemoryOperation::Bulk)?;

        let mut pairs = Vec::new();
        let mut lines = body.lines();
        while let Some(action_line) = lines.next() {
            let action: Value = serde_json::from_str(action_line)
                .with_context(|| format!("💀 bulk action line is not JSON: '{action_line}'"))?;
            let id = action
                .get("index")
                .and_then(|meta| meta.get("_id"))
                .and_then(Value::as_str)
                .with_context(|| format!("💀 bulk action line without index._id: '{action_line}'"))?
                .to_string();
            let source_line = lines
                .next()
                .with_context(|| format!("💀 bulk action for '{id}' arrived without a source line"))?;
            serde_json::from_str::<IgnoredAny>(source_line)
                .with_context(|| format!("💀 bulk source for '{id}' is not JSON"))?;
            pairs.push((id, source_line.to_string()));
        }

        let physical = state.resolve(index).unwrap_or(index).to_string();
        let stored = state.indices.entry(physical).or_insert_with(|| StoredIndex {
            mapping: empty_object(),
            documents: BTreeMap::new(),
        });
        for (id, source) in pairs {
            stored.documents.insert(id, source);
        }
        Ok(())
    }
}
