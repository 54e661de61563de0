use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, trace};

use super::{ElasticsearchScroll, join_url, send_expecting_success};
use crate::backends::{Cluster, CommonClusterConfig, Mapping, ScrollBackend};

// 📡 ElasticsearchConfig — "It's just Elasticsearch", she said, before the cluster went red.
// The same shape serves the source and the destination; they may even be the same cluster.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct ElasticsearchConfig {
    /// 📡 The URL of your Elasticsearch cluster. Include scheme + port. Yes, all of it.
    /// No, `localhost` alone is not enough. Yes, I know it worked in dev. Yes, I know.
    pub url: String,
    /// 🔧 Page size, keep-alive, timeouts. The bassist of this band. Underappreciated. Vital.
    #[serde(flatten)]
    pub common_config: CommonClusterConfig,
}

/// 📡 An Elasticsearch cluster reached over HTTP.
///
/// Holds one `reqwest::Client`, reused across every request, because spinning up a new
/// client per request is the networking equivalent of buying a new car every time you
/// need to go to the grocery store. Cheap to clone: the client is an `Arc` inside.
#[derive(Debug, Clone)]
pub struct ElasticsearchCluster {
    client: reqwest::Client,
    config: ElasticsearchConfig,
}

// 🔢 `GET /{index}/_count` → `{"count": 42, "_shards": {...}}`
#[derive(Debug, Deserialize)]
struct CountResponse {
    count: u64,
}

// 📡 `POST /{index}/_bulk` → `{"errors": bool, "items": [{"index": {...}}]}`
#[derive(Debug, Deserialize)]
struct BulkResponse {
    #[serde(default)]
    errors: bool,
    #[serde(default)]
    items: Vec<Value>,
}

impl ElasticsearchCluster {
    /// 🚀 Stand up a cluster handle, fully wired.
    ///
    /// 1. Builds the `reqwest::Client` with the configured timeouts.
    ///    Like a polite person — we will wait, but not forever.
    /// 2. Pings the cluster root to confirm it's alive and talking to us.
    ///    If this fails, we fail loudly here, rather than quietly 50,000 docs later.
    pub async fn new(config: ElasticsearchConfig) -> Result<Self> {
        // -- 🚫 size=0 returns zero hits, which the scroll reads as "done": an empty migration
        if config.common_config.scroll_page_size == 0 {
            anyhow::bail!(
                "💀 scroll_page_size for '{}' is 0. A scroll of zero hits per page ends before it starts.",
                config.url
            );
        }

        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.common_config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.common_config.request_timeout_secs))
            .build()
            .context("💀 The HTTP client refused to be born. The TLS stack wept. The architect shrugged.")?;

        send_expecting_success(client.get(&config.url), "cluster ping")
            .await
            .with_context(|| {
                format!(
                    "💀 Knocked on '{}' and nobody answered. Is the cluster up? Is the URL right?",
                    config.url
                )
            })?;
        debug!("✅ Cluster at '{}' answered the door", config.url);

        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        join_url(&self.config.url, path)
    }

    /// 🔍 HEAD something and translate 200/404 into yes/no. Anything else is an error,
    /// because "the cluster is on fire" is not the same answer as "no".
    async fn head_exists(&self, path: &str, what: &str) -> Result<bool> {
        let response = self
            .client
            .head(self.url(path))
            .send()
            .await
            .with_context(|| format!("💀 Could not ask whether {what} exists. The network ghosted us."))?;

        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => anyhow::bail!(
                "💀 Asked whether {} exists and Elasticsearch answered '{}'. That is neither yes nor no.",
                what,
                status
            ),
        }
    }
}

#[async_trait]
impl Cluster for ElasticsearchCluster {
    async fn count(&self, index: &str) -> Result<u64> {
        let body = send_expecting_success(
            self.client.get(self.url(&format!("{index}/_count"))),
            "count",
        )
        .await?;
        let parsed: CountResponse = serde_json::from_str(&body)
            .with_context(|| format!("💀 The _count response for '{index}' had no count in it: '{body}'"))?;
        trace!("🔢 '{}' holds {} documents", index, parsed.count);
        Ok(parsed.count)
    }

    async fn alias_exists(&self, alias: &str) -> Result<bool> {
        self.head_exists(&format!("_alias/{alias}"), &format!("alias '{alias}'"))
            .await
    }

    async fn index_exists(&self, index: &str) -> Result<bool> {
        self.head_exists(index, &format!("index '{index}'")).await
    }

    /// 🗺️ `GET /{index}/_mapping` answers keyed by the *physical* index name, even when asked
    /// through an alias. There is exactly one entry; we take its `mappings` and rewrap it.
    async fn get_mapping(&self, index: &str) -> Result<Mapping> {
        let body = send_expecting_success(
            self.client.get(self.url(&format!("{index}/_mapping"))),
            "get mapping",
        )
        .await?;
        let parsed: Value = serde_json::from_str(&body)
            .with_context(|| format!("💀 The mapping response for '{index}' was not JSON"))?;

        let mappings = parsed
            .as_object()
            .and_then(|indices| indices.values().next())
            .and_then(|entry| entry.get("mappings"))
            .cloned()
            .with_context(|| {
                format!("💀 The mapping response for '{index}' had no mappings in it: '{body}'")
            })?;
        Ok(json!({ "mappings": mappings }))
    }

    async fn create_index_with_mapping(&self, index: &str, mapping: &Mapping) -> Result<()> {
        send_expecting_success(
            self.client
                .put(self.url(index))
                .header("Content-Type", "application/json")
                .body(mapping.to_string()),
            "create index",
        )
        .await
        .with_context(|| format!("💀 Could not create index '{index}' with the copied mapping"))?;
        debug!("🏗️ Created index '{}'", index);
        Ok(())
    }

    async fn put_alias(&self, index: &str, alias: &str) -> Result<()> {
        send_expecting_success(
            self.client.put(self.url(&format!("{index}/_alias/{alias}"))),
            "put alias",
        )
        .await
        .with_context(|| format!("💀 Could not point alias '{alias}' at '{index}'"))?;
        debug!("🏷️ Alias '{}' now points at '{}'", alias, index);
        Ok(())
    }

    async fn open_scroll(&self, index: &str, query: &Value) -> Result<ScrollBackend> {
        Ok(ScrollBackend::Elasticsearch(ElasticsearchScroll::new(
            self.client.clone(),
            self.config.url.clone(),
            index.to_string(),
            query.clone(),
            self.config.common_config.scroll_page_size,
            self.config.common_config.scroll_keep_alive.clone(),
        )))
    }

    /// 📡 POST the NDJSON body to `/{index}/_bulk`.
    ///
    /// ⚠️ Content-Type: application/x-ndjson — not application/json. VERY important.
    /// ⚠️ A 200 with `"errors": true` is still a failure: some documents were rejected,
    /// and silently shrugging that off is how counts stop matching at 3am.
    /// 🔄 This function does not retry. Retries are the caller's problem. Good luck.
    async fn bulk(&self, body: String, index: &str) -> Result<()> {
        let bytes = body.len();
        let response_body = send_expecting_success(
            self.client
                .post(self.url(&format!("{index}/_bulk")))
                .header("Content-Type", "application/x-ndjson")
                .body(body),
            "bulk",
        )
        .await?;

        let parsed: BulkResponse = serde_json::from_str(&response_body).with_context(|| {
            format!("💀 The bulk response for '{index}' was not the JSON we were promised")
        })?;
        if parsed.errors {
            let first_failure = parsed
                .items
                .iter()
                .filter_map(|item| item.as_object()?.values().next())
                .find(|outcome| outcome.get("error").is_some())
                .map(Value::to_string)
                .unwrap_or_else(|| "no item carried an error object".to_string());
            anyhow::bail!(
                "💀 Elasticsearch accepted the bulk request for '{}' but rejected some documents. First casualty: {}",
                index,
                first_failure
            );
        }

        trace!("🚀 {} bytes landed in '{}' — documents have left the building", bytes, index);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::PageSource;
    use wiremock::matchers::{body_string, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn cluster_for(server: &MockServer) -> Result<ElasticsearchCluster> {
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"tagline": "You Know, for Search"})))
            .mount(server)
            .await;
        ElasticsearchCluster::new(ElasticsearchConfig {
            url: server.uri(),
            common_config: CommonClusterConfig::default(),
        })
        .await
    }

    #[tokio::test]
    async fn the_one_where_an_unreachable_cluster_fails_at_the_door() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let result = ElasticsearchCluster::new(ElasticsearchConfig {
            url: server.uri(),
            common_config: CommonClusterConfig::default(),
        })
        .await;
        assert!(result.is_err(), "A 503 at the front door is not a welcome mat.");
    }

    #[tokio::test]
    async fn the_one_where_a_zero_page_size_is_refused_before_knocking() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let result = ElasticsearchCluster::new(ElasticsearchConfig {
            url: server.uri(),
            common_config: CommonClusterConfig {
                scroll_page_size: 0,
                ..CommonClusterConfig::default()
            },
        })
        .await;
        let err = result.expect_err("zero hits per page migrates nothing");
        assert!(err.to_string().contains("scroll_page_size"));
    }

    #[tokio::test]
    async fn the_one_where_count_reads_the_count() -> Result<()> {
        let server = MockServer::start().await;
        let cluster = cluster_for(&server).await?;
        Mock::given(method("GET"))
            .and(path("/accounts/_count"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"count": 3, "_shards": {"total": 1}})))
            .mount(&server)
            .await;

        assert_eq!(cluster.count("accounts").await?, 3);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_a_missing_index_count_is_an_error() -> Result<()> {
        let server = MockServer::start().await;
        let cluster = cluster_for(&server).await?;
        Mock::given(method("GET"))
            .and(path("/ghost/_count"))
            .respond_with(ResponseTemplate::new(404).set_body_string(r#"{"error":"index_not_found_exception"}"#))
            .mount(&server)
            .await;

        let err = cluster.count("ghost").await.expect_err("404 must not read as zero");
        assert!(format!("{err:#}").contains("index_not_found_exception"));
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_existence_checks_speak_head() -> Result<()> {
        let server = MockServer::start().await;
        let cluster = cluster_for(&server).await?;
        Mock::given(method("HEAD"))
            .and(path("/_alias/accounts"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("HEAD"))
            .and(path("/_alias/blocks"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("HEAD"))
            .and(path("/accounts-000001"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("HEAD"))
            .and(path("/burning-000001"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        assert!(cluster.alias_exists("accounts").await?);
        assert!(!cluster.alias_exists("blocks").await?);
        assert!(!cluster.index_exists("accounts-000001").await?);
        assert!(
            cluster.index_exists("burning-000001").await.is_err(),
            "A 500 is not a 'no'. It's a 'help'."
        );
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_the_mapping_is_unwrapped_from_the_physical_name() -> Result<()> {
        let server = MockServer::start().await;
        let cluster = cluster_for(&server).await?;
        Mock::given(method("GET"))
            .and(path("/accounts/_mapping"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "accounts-v7": {"mappings": {"properties": {"balance": {"type": "keyword"}}}}
            })))
            .mount(&server)
            .await;

        let mapping = cluster.get_mapping("accounts").await?;
        assert_eq!(
            mapping,
            json!({"mappings": {"properties": {"balance": {"type": "keyword"}}}})
        );
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_index_and_alias_creation_hit_the_right_urls() -> Result<()> {
        let server = MockServer::start().await;
        let cluster = cluster_for(&server).await?;
        let mapping = json!({"mappings": {"properties": {"v": {"type": "long"}}}});
        Mock::given(method("PUT"))
            .and(path("/accounts-000001"))
            .and(body_string(mapping.to_string()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"acknowledged": true})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/accounts-000001/_alias/accounts"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"acknowledged": true})))
            .expect(1)
            .mount(&server)
            .await;

        cluster.create_index_with_mapping("accounts-000001", &mapping).await?;
        cluster.put_alias("accounts-000001", "accounts").await?;
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_bulk_sends_ndjson_to_the_physical_index() -> Result<()> {
        let server = MockServer::start().await;
        let cluster = cluster_for(&server).await?;
        let body = "{\"index\":{\"_id\":\"a\"}}\n{\"v\":1}\n".to_string();
        Mock::given(method("POST"))
            .and(path("/accounts-000001/_bulk"))
            .and(header("Content-Type", "application/x-ndjson"))
            .and(body_string(body.clone()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"took": 1, "errors": false, "items": []})))
            .expect(1)
            .mount(&server)
            .await;

        cluster.bulk(body, "accounts-000001").await?;
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_partial_bulk_rejections_are_still_failures() -> Result<()> {
        let server = MockServer::start().await;
        let cluster = cluster_for(&server).await?;
        Mock::given(method("POST"))
            .and(path("/accounts-000001/_bulk"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "took": 1,
                "errors": true,
                "items": [
                    {"index": {"_id": "a", "status": 201}},
                    {"index": {"_id": "b", "status": 400, "error": {"type": "mapper_parsing_exception"}}}
                ]
            })))
            .mount(&server)
            .await;

        let err = cluster
            .bulk("{\"index\":{\"_id\":\"a\"}}\n{}\n".to_string(), "accounts-000001")
            .await
            .expect_err("errors:true must not be waved through");
        assert!(err.to_string().contains("mapper_parsing_exception"));
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_open_scroll_hands_back_a_lazy_cursor() -> Result<()> {
        let server = MockServer::start().await;
        let cluster = cluster_for(&server).await?;
        Mock::given(method("POST"))
            .and(path("/empty/_search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "_scroll_id": "s-1",
                "hits": {"hits": []}
            })))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/_search/scroll"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let mut scroll = cluster.open_scroll("empty", &json!({"query": {"match_all": {}}})).await?;
        assert!(scroll.next_page().await?.is_none());
        Ok(())
    }
}
