//! 🔧 App Configuration — the sacred TOML-to-struct pipeline.
//!
//! 📡 "Config not found: We looked everywhere. Under the couch. Behind the fridge.
//! In the junk drawer. Nothing." — every developer at 3am 🦆
//!
//! 🏗️ Powered by Figment: `RDX_*` environment variables first, then an optional TOML file
//! layered on top. The file wins on conflicts.

use std::path::Path;

use anyhow::Context;
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::Deserialize;
use tracing::info;

use crate::backends::{ElasticsearchConfig, InMemoryClusterConfig};

/// 🎭 Which kind of cluster sits on one end of the migration.
///
/// ```toml
/// [source_config.Elasticsearch]
/// url = "http://localhost:9200"
/// ```
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub enum ClusterConfig {
    Elasticsearch(ElasticsearchConfig),
    InMemory(InMemoryClusterConfig),
}

/// ⚙️ Knobs for the migration run itself, not for either cluster.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// 📦 upper bound for one `_bulk` body. A single bigger document still ships, alone.
    #[serde(default = "default_max_bulk_size_bytes")]
    pub max_bulk_size_bytes: usize,
    /// 📣 progress events in flight before new ones get dropped
    #[serde(default = "default_progress_queue_capacity")]
    pub progress_queue_capacity: usize,
}

fn default_max_bulk_size_bytes() -> usize {
    800_000
}

fn default_progress_queue_capacity() -> usize {
    64
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_bulk_size_bytes: default_max_bulk_size_bytes(),
            progress_queue_capacity: default_progress_queue_capacity(),
        }
    }
}

/// 📦 The AppConfig: one struct to rule them all, one struct to find them,
/// one struct to bring them all, and in the Figment bind them.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct AppConfig {
    /// 🏷️ logical index names, migrated in this order
    #[serde(default)]
    pub indices: Vec<String>,
    /// ♻️ reuse an existing destination alias/index instead of refusing
    #[serde(default)]
    pub overwrite: bool,
    pub source_config: ClusterConfig,
    pub destination_config: ClusterConfig,
    #[serde(default, alias = "supervisor_config")]
    pub runtime: RuntimeConfig,
}

/// 🚀 Load the config — from a file, from env vars, or from the sheer power of hoping.
///
/// - `None` → `RDX_*` env vars only. Nested keys use `__`: `RDX_RUNTIME__MAX_BULK_SIZE_BYTES`.
/// - `Some(path)` → env vars + the TOML file, merged. TOML wins on conflicts.
pub fn load_config(config_file_name: Option<&Path>) -> anyhow::Result<AppConfig> {
    info!(
        "🔧 Loading configuration: {:#?}",
        config_file_name.unwrap_or(Path::new(""))
    );

    let config = Figment::new().merge(Env::prefixed("RDX_").split("__"));
    let config = match config_file_name {
        Some(file_name) => config.merge(Toml::file(file_name)),
        None => config,
    };

    let context_msg = match config_file_name {
        Some(path) => format!(
            "💀 Failed to parse configuration from file '{}' and environment variables (RDX_*). \
             The file exists in our hearts, but apparently not on disk.",
            path.display()
        ),
        None => "💀 Failed to parse configuration from environment variables (RDX_*). \
                 No file was provided — this one's all on the environment. Classic."
            .to_string(),
    };

    config.extract().context(context_msg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_test_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .expect("💀 Failed to create a temp config. The filesystem said 'new phone who dis'.");
        file.write_all(contents.as_bytes())
            .expect("💀 Failed to write test config.");
        file
    }

    #[test]
    fn the_one_where_a_full_elasticsearch_config_parses() {
        let file = write_test_config(
            r#"
            indices = ["accounts", "blocks"]
            overwrite = true

            [source_config.Elasticsearch]
            url = "http://localhost:9200"
            scroll_page_size = 500
            scroll_keep_alive = "2m"

            [destination_config.Elasticsearch]
            url = "http://localhost:9201"

            [runtime]
            max_bulk_size_bytes = 123456
            "#,
        );

        let app_config = load_config(Some(file.path())).expect("💀 config should parse");

        assert_eq!(app_config.indices, vec!["accounts", "blocks"]);
        assert!(app_config.overwrite);
        assert_eq!(app_config.runtime.max_bulk_size_bytes, 123456);
        assert_eq!(app_config.runtime.progress_queue_capacity, 64);
        match app_config.source_config {
            ClusterConfig::Elasticsearch(es) => {
                assert_eq!(es.url, "http://localhost:9200");
                assert_eq!(es.common_config.scroll_page_size, 500);
                assert_eq!(es.common_config.scroll_keep_alive, "2m");
                assert_eq!(es.common_config.connect_timeout_secs, 10);
            }
            honestly_who_knows => panic!(
                "💀 Expected an Elasticsearch source, serde took us to {:?}. Plot twist energy.",
                honestly_who_knows
            ),
        }
        match app_config.destination_config {
            ClusterConfig::Elasticsearch(es) => {
                assert_eq!(es.common_config.scroll_page_size, 9000);
                assert_eq!(es.common_config.scroll_keep_alive, "10m");
            }
            other => panic!("💀 Expected an Elasticsearch destination, got {:?}", other),
        }
    }

    #[test]
    fn the_one_where_in_memory_clusters_come_pre_seeded() {
        let file = write_test_config(
            r#"
            indices = ["accounts"]

            [source_config.InMemory]
            scroll_page_size = 2

            [[source_config.InMemory.indices]]
            name = "accounts"
            mapping = { properties = { owner = { type = "keyword" } } }
            documents = [
                { id = "a", source = { owner = "ann" } },
                { id = "b", source = { owner = "bob" } },
            ]

            [destination_config.InMemory]
            "#,
        );

        let app_config = load_config(Some(file.path())).expect("💀 config should parse");

        assert!(!app_config.overwrite);
        assert_eq!(app_config.runtime, RuntimeConfig::default());
        match app_config.source_config {
            ClusterConfig::InMemory(cfg) => {
                assert_eq!(cfg.scroll_page_size, 2);
                assert_eq!(cfg.indices.len(), 1);
                assert_eq!(cfg.indices[0].documents.len(), 2);
                assert_eq!(cfg.indices[0].documents[1].id, "b");
            }
            other => panic!("💀 Expected an in-memory source, got {:?}", other),
        }
        assert_eq!(
            app_config.destination_config,
            ClusterConfig::InMemory(InMemoryClusterConfig::default())
        );
    }

    #[test]
    fn the_one_where_runtime_answers_to_its_former_stage_name() {
        let file = write_test_config(
            r#"
            [supervisor_config]
            progress_queue_capacity = 8

            [source_config.InMemory]
            [destination_config.InMemory]
            "#,
        );

        let app_config = load_config(Some(file.path())).expect("💀 alias should parse");

        assert_eq!(app_config.runtime.progress_queue_capacity, 8);
        assert_eq!(app_config.runtime.max_bulk_size_bytes, 800_000);
        assert!(app_config.indices.is_empty());
    }

    #[test]
    fn the_one_where_a_missing_destination_is_a_loud_error() {
        let file = write_test_config(
            r#"
            [source_config.InMemory]
            "#,
        );

        let err = load_config(Some(file.path())).expect_err("destination is required");
        assert!(format!("{err:#}").contains("Failed to parse configuration"));
    }
}
