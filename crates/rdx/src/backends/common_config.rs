//! 🎬 *[two clusters walk into a struct. both need a page size. both need a timeout.]*
//! *["We belong together," they said. "In the backends module." The module system nodded.]*
//!
//! 📦 **Common cluster config** — the knobs every cluster backend shares.
//!
//! 🧠 Knowledge graph:
//! - Flattened into `ElasticsearchConfig`, so the TOML stays flat:
//!   `[source_config.Elasticsearch]` → `url`, `scroll_page_size`, `scroll_keep_alive`, ...
//! - Read by the scroll (page size, keep-alive) and by the HTTP client (timeouts).
//! - The core layers no deadlines of its own; these timeouts are the deadlines. 🦆

use serde::Deserialize;

/// 📦 Shared cluster knobs: how big a scroll page, how long a scroll lives, how long we wait.
///
/// No cap: these defaults were chosen empirically by staring at them until they felt right,
/// and by noticing that 9000 hits per page is what the old Go tooling used without incident.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct CommonClusterConfig {
    /// 📄 Hits per scroll page. The server-side page bound.
    #[serde(default = "default_scroll_page_size")]
    pub scroll_page_size: usize,
    /// ⏳ How long the cluster keeps the scroll context warm between pages.
    #[serde(default = "default_scroll_keep_alive")]
    pub scroll_keep_alive: String,
    /// 🔌 TCP connect deadline, in seconds.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// ⏱️ Whole-request deadline, in seconds. Bulk bodies are meaty; be generous.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_scroll_page_size() -> usize {
    9000
}

fn default_scroll_keep_alive() -> String {
    "10m".to_string()
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for CommonClusterConfig {
    fn default() -> Self {
        Self {
            scroll_page_size: default_scroll_page_size(),
            scroll_keep_alive: default_scroll_keep_alive(),
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}
