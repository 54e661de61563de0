//! # 📡 THE ELASTICSEARCH BACKEND
//!
//! *Previously, on rdx...*
//!
//! 🎬 COLD OPEN — INT. SERVER ROOM — 3:47 AM
//!
//! Two clusters. One old, one new. The old one has the data. The new one has the
//! better hardware and an empty alias table. "I'll just reindex it," they whispered.
//! "It'll be fast," they said. Reader, it was a scroll cursor and a lot of `_bulk`.
//!
//! 🚀 This module talks to Elasticsearch over plain HTTP: `_count`, `_alias`, `_mapping`,
//! index creation, `_search?scroll=...`, and `_bulk`. It is equal parts HTTP client,
//! bulk API whisperer, and coping mechanism.
//!
//! 🦆 (mandatory duck, no context provided, none shall be requested)

mod elasticsearch_cluster;
mod elasticsearch_scroll;

pub use elasticsearch_cluster::{ElasticsearchCluster, ElasticsearchConfig};
pub use elasticsearch_scroll::ElasticsearchScroll;

use anyhow::{Context, Result};

/// 🔧 Glue a base URL and a path together with exactly one slash between them.
/// Without the trim: `https://host//my-index`. One slash of difference. Infinite suffering.
pub(crate) fn join_url(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// 📡 Send a request and insist on a 2xx. Anything else bails with status + body,
/// because Elasticsearch error bodies are poetry. Dark poetry. But informative.
pub(crate) async fn send_expecting_success(
    request: reqwest::RequestBuilder,
    what: &str,
) -> Result<String> {
    let response = request
        .send()
        .await
        .with_context(|| format!("💀 The {what} request never made it to Elasticsearch. The network is giving us the silent treatment."))?;

    let status = response.status();
    let body = response
        .text()
        .await
        .with_context(|| format!("💀 The {what} response body got lost somewhere between the socket and us."))?;

    if !status.is_success() {
        anyhow::bail!(
            "💀 The {} request arrived, but Elasticsearch said '{}'. The body of the response read: '{}'.",
            what,
            status,
            body
        );
    }
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_one_where_slashes_are_neither_doubled_nor_missing() {
        assert_eq!(join_url("http://es:9200/", "/accounts/_count"), "http://es:9200/accounts/_count");
        assert_eq!(join_url("http://es:9200", "_bulk"), "http://es:9200/_bulk");
    }
}
