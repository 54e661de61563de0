use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde::de::IgnoredAny;
use serde_json::{Value, json};
use tracing::{debug, trace, warn};

use super::{join_url, send_expecting_success};
use crate::backends::PageSource;

/// 📜 A scroll cursor over one index.
///
/// Lazy: nothing is sent until the first `next_page`. The first page opens the scroll with
/// the query; every page after that trades the latest `_scroll_id` for the next batch of hits.
/// A page with zero hits means the scroll is spent: we clear the context and return `None`.
///
/// ⚠️ No snapshot promises. Documents written to the source after the scroll opens may or
/// may not show up. The source is expected to be read-mostly while we migrate.
#[derive(Debug)]
pub struct ElasticsearchScroll {
    client: reqwest::Client,
    base_url: String,
    index: String,
    query: Value,
    page_size: usize,
    keep_alive: String,
    scroll_id: Option<String>,
    exhausted: bool,
}

// 📦 The only two things we need to know about a page before handing it on raw:
// its scroll id, and whether it has any hits left.
#[derive(Debug, Deserialize)]
struct ScrollEnvelope {
    #[serde(rename = "_scroll_id")]
    scroll_id: Option<String>,
    hits: EnvelopeHits,
}

#[derive(Debug, Deserialize)]
struct EnvelopeHits {
    #[serde(default)]
    hits: Vec<IgnoredAny>,
}

impl ElasticsearchScroll {
    pub(crate) fn new(
        client: reqwest::Client,
        base_url: String,
        index: String,
        query: Value,
        page_size: usize,
        keep_alive: String,
    ) -> Self {
        Self {
            client,
            base_url,
            index,
            query,
            page_size,
            keep_alive,
            scroll_id: None,
            exhausted: false,
        }
    }

    /// 🗑️ Let the cluster drop the scroll context early instead of waiting out the keep-alive.
    /// Best-effort: the data already made it; a failed cleanup is a warning, not a failure.
    async fn clear(&mut self) {
        let Some(scroll_id) = self.scroll_id.take() else {
            return;
        };
        let request = self
            .client
            .delete(join_url(&self.base_url, "_search/scroll"))
            .header("Content-Type", "application/json")
            .body(json!({ "scroll_id": scroll_id }).to_string());
        if let Err(err) = send_expecting_success(request, "clear scroll").await {
            warn!("⚠️ Could not clear the scroll for '{}': {:#}", self.index, err);
        }
    }
}

#[async_trait]
impl PageSource for ElasticsearchScroll {
    async fn next_page(&mut self) -> Result<Option<String>> {
        if self.exhausted {
            return Ok(None);
        }

        let request = match &self.scroll_id {
            None => {
                debug!("📜 Opening scroll over '{}' ({} hits per page)", self.index, self.page_size);
                self.client
                    .post(join_url(
                        &self.base_url,
                        &format!(
                            "{}/_search?scroll={}&size={}",
                            self.index, self.keep_alive, self.page_size
                        ),
                    ))
                    .header("Content-Type", "application/json")
                    .body(self.query.to_string())
            }
            Some(scroll_id) => self
                .client
                .post(join_url(&self.base_url, "_search/scroll"))
                .header("Content-Type", "application/json")
                .body(json!({ "scroll": self.keep_alive, "scroll_id": scroll_id }).to_string()),
        };

        let page = send_expecting_success(request, "scroll")
            .await
            .with_context(|| format!("💀 The scroll over '{}' broke mid-stride", self.index))?;

        let envelope: ScrollEnvelope = serde_json::from_str(&page).with_context(|| {
            format!("💀 A scroll page for '{}' was not a search response", self.index)
        })?;
        let has_hits = !envelope.hits.hits.is_empty();
        match envelope.scroll_id {
            Some(scroll_id) => self.scroll_id = Some(scroll_id),
            // 💀 without an id the next call would reopen the scroll and replay this page forever
            None if has_hits => {
                self.close().await;
                anyhow::bail!(
                    "💀 A scroll page for '{}' carried hits but no _scroll_id. There is no way to ask for the next page.",
                    self.index
                );
            }
            None => {}
        }

        if !has_hits {
            trace!("🏁 Scroll over '{}' ran dry", self.index);
            self.close().await;
            return Ok(None);
        }

        Ok(Some(page))
    }

    async fn close(&mut self) {
        self.exhausted = true;
        self.clear().await;
    }
}
