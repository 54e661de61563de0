use std::collections::VecDeque;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::value::RawValue;
use tracing::trace;

use crate::backends::PageSource;

/// 📜 A scroll over a snapshot of one in-memory index, taken when the scroll opened.
///
/// Pages come out shaped like an Elasticsearch search response so the rest of the
/// pipeline can't tell the difference. It's method acting, basically.
#[derive(Debug)]
pub struct InMemoryScroll {
    scroll_id: String,
    index: String,
    total: usize,
    documents: VecDeque<(String, String)>,
    page_size: usize,
}

#[derive(Serialize)]
struct Page<'a> {
    #[serde(rename = "_scroll_id")]
    scroll_id: &'a str,
    hits: PageHits<'a>,
}

#[derive(Serialize)]
struct PageHits<'a> {
    total: PageTotal,
    hits: Vec<PageHit<'a>>,
}

#[derive(Serialize)]
struct PageTotal {
    value: usize,
    relation: &'static str,
}

#[derive(Serialize)]
struct PageHit<'a> {
    #[serde(rename = "_index")]
    index: &'a str,
    #[serde(rename = "_id")]
    id: &'a str,
    #[serde(rename = "_source")]
    source: &'a RawValue,
}

impl InMemoryScroll {
    pub(crate) fn new(index: String, documents: Vec<(String, String)>, page_size: usize) -> Self {
        Self {
            scroll_id: format!("in-mem-scroll-{index}"),
            total: documents.len(),
            index,
            documents: documents.into(),
            page_size: page_size.max(1),
        }
    }
}

#[async_trait]
impl PageSource for InMemoryScroll {
    async fn next_page(&mut self) -> Result<Option<String>> {
        if self.documents.is_empty() {
            return Ok(None);
        }

        let take = self.page_size.min(self.documents.len());
        let drained: Vec<(String, String)> = self.documents.drain(..take).collect();
        let hits = drained
            .iter()
            .map(|(id, source)| {
                let source: &RawValue = serde_json::from_str(source)
                    .with_context(|| format!("💀 Stored source for '{id}' is not JSON anymore. Spooky."))?;
                Ok(PageHit {
                    index: &self.index,
                    id,
                    source,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let page = Page {
            scroll_id: &self.scroll_id,
            hits: PageHits {
                total: PageTotal {
                    value: self.total,
                    relation: "eq",
                },
                hits,
            },
        };
        trace!("📜 in-memory page of {} hits from '{}'", take, self.index);
        Ok(Some(serde_json::to_string(&page)?))
    }

    async fn close(&mut self) {
        self.documents.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    #[tokio::test]
    async fn the_one_where_pages_look_like_search_responses() -> Result<()> {
        let mut scroll = InMemoryScroll::new(
            "accounts".into(),
            vec![
                ("a".into(), r#"{"v":1}"#.into()),
                ("b".into(), r#"{"v":2}"#.into()),
                ("c".into(), r#"{"v":3}"#.into()),
            ],
            2,
        );

        let first: Value = serde_json::from_str(&scroll.next_page().await?.expect("page one"))?;
        assert_eq!(first["hits"]["hits"].as_array().map(Vec::len), Some(2));
        assert_eq!(first["hits"]["hits"][0]["_id"], json!("a"));
        assert_eq!(first["hits"]["hits"][0]["_source"], json!({"v": 1}));
        assert_eq!(first["hits"]["total"]["value"], json!(3));

        let second: Value = serde_json::from_str(&scroll.next_page().await?.expect("page two"))?;
        assert_eq!(second["hits"]["hits"][0]["_id"], json!("c"));

        assert!(scroll.next_page().await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_a_closed_scroll_has_nothing_left_to_give() -> Result<()> {
        let mut scroll = InMemoryScroll::new(
            "accounts".into(),
            vec![("a".into(), r#"{"v":1}"#.into()), ("b".into(), r#"{"v":2}"#.into())],
            1,
        );
        assert!(scroll.next_page().await?.is_some());
        scroll.close().await;
        assert!(scroll.next_page().await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_an_empty_index_has_no_pages_at_all() -> Result<()> {
        let mut scroll = InMemoryScroll::new("empty".into(), vec![], 5);
        assert!(scroll.next_page().await?.is_none());
        Ok(())
    }
}
