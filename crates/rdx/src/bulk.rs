//! 🎬 *[a page lands. it is heavy. the bulk endpoint has a weight limit.]*
//! *[somewhere in the heap, a RawValue sits patiently, unparsed and unbothered.]*
//! *["Split me," whispers the page. "But never split my documents."]*
//!
//! 🎼 The bulk module — turning one scroll page into one or more `_bulk` request bodies.
//!
//! 🧠 Knowledge graph:
//! - Input: a raw scroll page (`String`) → [`parse_page`] → `Vec<Document>` borrowing from it.
//! - Output: `Vec<BulkBatch>`, each a ready-to-POST NDJSON body under the byte budget.
//! - Wire format per document, two lines, both `\n`-terminated:
//!   ```text
//!   {"index":{"_id":"<id>"}}
//!   <_source exactly as the source cluster stored it>
//!   ```
//! - No `_index` on the action line: the batch is POSTed to `/{physical_index}/_bulk`,
//!   so the URL decides where documents land. Never the alias.
//!
//! ⚠️ Budget rule: if appending the next action+source pair would push the current batch
//! over `max_batch_size_bytes`, the batch closes and a new one opens. A pair that is
//! bigger than the whole budget still ships, alone, in its own batch. Documents are never
//! dropped and never truncated. The bulk API can complain about it. That's its right.
//!
//! 🦆 (the duck weighs exactly one document. it ships alone.)

use anyhow::{Context, Result};
use serde_json::json;
use tracing::{debug, info};

use crate::common::{Document, parse_page};

/// 📦 One `_bulk` request body plus how many documents rode along in it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub(crate) struct BulkBatch {
    /// 📡 NDJSON: action line, source line, action line, source line... trailing `\n` included.
    pub body: String,
    /// 🔢 Documents in this batch. Half the line count. Always.
    pub docs: usize,
}

/// 📄 What one page turned into: the batches, and a little accounting for progress.
#[derive(Debug, Clone, Default)]
pub(crate) struct PreparedPage {
    pub batches: Vec<BulkBatch>,
    pub documents: usize,
    pub bytes: usize,
}

/// 🏗️ Packs documents into size-bounded bulk bodies.
///
/// Stateless between pages: every call starts a fresh batch, so a page never shares a
/// request with the page before it. Peak memory is one page plus its batches.
#[derive(Debug, Clone, Copy)]
pub(crate) struct BulkBatchBuilder {
    max_batch_size_bytes: usize,
}

impl BulkBatchBuilder {
    pub(crate) fn new(max_batch_size_bytes: usize) -> Self {
        Self {
            max_batch_size_bytes,
        }
    }

    /// 📎 `{"index":{"_id":"<id>"}}` — serialized by serde so ids with quotes or
    /// backslashes come out properly escaped instead of as a bulk-API syntax error.
    pub(crate) fn action_line(id: &str) -> Result<String> {
        serde_json::to_string(&json!({ "index": { "_id": id } })).context(
            "💀 Failed to serialize a bulk action line. The JSON that describes JSON has failed to become JSON.",
        )
    }

    /// 🔄 Pack documents, in order, into as few batches as the budget allows.
    ///
    /// Empty input → no batches. We do not POST empty bulk bodies. Elasticsearch doesn't
    /// want them and frankly neither do we.
    pub(crate) fn build(&self, documents: &[Document<'_>]) -> Result<Vec<BulkBatch>> {
        let mut batches = Vec::new();
        let mut current = BulkBatch::default();

        for document in documents {
            let action = Self::action_line(&document.id)?;
            let source = document.source_line();
            let pair_len = action.len() + 1 + source.len() + 1;

            // ⚠️ close before overflowing, but never leave a batch empty: an oversized
            // pair lands in a fresh batch and sails alone.
            if current.docs > 0 && current.body.len() + pair_len > self.max_batch_size_bytes {
                batches.push(std::mem::take(&mut current));
            }

            current.body.push_str(&action);
            current.body.push('\n');
            current.body.push_str(&source);
            current.body.push('\n');
            current.docs += 1;
        }

        if current.docs > 0 {
            batches.push(current);
        }
        Ok(batches)
    }

    /// 🚀 Parse one raw scroll page and pack it. `page_number` is for the logs only.
    pub(crate) fn prepare_page(
        &self,
        raw_page: &str,
        index: &str,
        page_number: u64,
    ) -> Result<PreparedPage> {
        let documents = parse_page(raw_page)?;
        info!(
            "📦 indexing page {} of '{}' — {} documents in this bulk",
            page_number,
            index,
            documents.len()
        );

        let batches = self.build(&documents)?;
        let bytes = batches.iter().map(|batch| batch.body.len()).sum();
        debug!(
            "🎼 page {} of '{}' packed into {} batch(es), {} bytes",
            page_number,
            index,
            batches.len(),
            bytes
        );

        Ok(PreparedPage {
            documents: documents.len(),
            batches,
            bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page_of(docs: &[(&str, &str)]) -> String {
        let hits: Vec<String> = docs
            .iter()
            .map(|(id, source)| format!(r#"{{"_index":"src","_id":"{id}","_source":{source}}}"#))
            .collect();
        format!(r#"{{"_scroll_id":"s","hits":{{"hits":[{}]}}}}"#, hits.join(","))
    }

    fn pair(id: &str, source: &str) -> String {
        format!("{{\"index\":{{\"_id\":\"{id}\"}}}}\n{source}\n")
    }

    #[test]
    fn the_one_where_a_small_page_fits_in_a_single_batch_in_order() -> Result<()> {
        let raw = page_of(&[("a", r#"{"v":1}"#), ("b", r#"{"v":2}"#), ("c", r#"{"v":3}"#)]);
        let documents = parse_page(&raw)?;
        let batches = BulkBatchBuilder::new(10_000).build(&documents)?;

        assert_eq!(batches.len(), 1, "Everything fits. One trip. Point of honor.");
        assert_eq!(batches[0].docs, 3);
        assert_eq!(
            batches[0].body,
            format!(
                "{}{}{}",
                pair("a", r#"{"v":1}"#),
                pair("b", r#"{"v":2}"#),
                pair("c", r#"{"v":3}"#)
            )
        );
        Ok(())
    }

    #[test]
    fn the_one_where_the_budget_splits_a_page_between_documents() -> Result<()> {
        // 🧮 each pair is 22 + 8 = 30 bytes; a 70 byte budget holds two of them.
        let raw = page_of(&[
            ("a", r#"{"v":1}"#),
            ("b", r#"{"v":2}"#),
            ("c", r#"{"v":3}"#),
            ("d", r#"{"v":4}"#),
            ("e", r#"{"v":5}"#),
        ]);
        let documents = parse_page(&raw)?;
        assert_eq!(pair("a", r#"{"v":1}"#).len(), 30);

        let batches = BulkBatchBuilder::new(70).build(&documents)?;

        assert_eq!(batches.iter().map(|b| b.docs).collect::<Vec<_>>(), vec![2, 2, 1]);
        for batch in &batches {
            assert!(batch.body.len() <= 70, "No batch may exceed the budget.");
            assert_eq!(batch.body.lines().count(), batch.docs * 2);
        }
        let rejoined: String = batches.iter().map(|b| b.body.as_str()).collect();
        assert_eq!(
            rejoined,
            ["a", "b", "c", "d", "e"]
                .iter()
                .enumerate()
                .map(|(i, id)| pair(id, &format!(r#"{{"v":{}}}"#, i + 1)))
                .collect::<String>(),
            "Splitting must not reorder or lose a single line."
        );
        Ok(())
    }

    #[test]
    fn the_one_where_a_batch_exactly_at_the_budget_stays_whole() -> Result<()> {
        let raw = page_of(&[("a", r#"{"v":1}"#), ("b", r#"{"v":2}"#)]);
        let documents = parse_page(&raw)?;
        let batches = BulkBatchBuilder::new(60).build(&documents)?;
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].body.len(), 60);
        Ok(())
    }

    #[test]
    fn the_one_where_the_oversized_document_ships_alone_untruncated() -> Result<()> {
        let big_source = format!(r#"{{"blob":"{}"}}"#, "x".repeat(500));
        let raw = page_of(&[
            ("small-1", r#"{"v":1}"#),
            ("huge", big_source.as_str()),
            ("small-2", r#"{"v":2}"#),
        ]);
        let documents = parse_page(&raw)?;
        let batches = BulkBatchBuilder::new(100).build(&documents)?;

        assert_eq!(batches.len(), 3);
        assert_eq!(batches[1].docs, 1);
        assert_eq!(batches[1].body, pair("huge", &big_source));
        assert!(batches[1].body.len() > 100, "Over budget, shipped anyway. Never dropped.");
        assert_eq!(batches[0].body, pair("small-1", r#"{"v":1}"#));
        assert_eq!(batches[2].body, pair("small-2", r#"{"v":2}"#));
        Ok(())
    }

    #[test]
    fn the_one_where_an_oversized_first_document_does_not_leave_an_empty_batch() -> Result<()> {
        let big_source = format!(r#"{{"blob":"{}"}}"#, "y".repeat(200));
        let raw = page_of(&[("huge", big_source.as_str())]);
        let documents = parse_page(&raw)?;
        let batches = BulkBatchBuilder::new(10).build(&documents)?;
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].docs, 1);
        Ok(())
    }

    #[test]
    fn the_one_where_no_documents_means_no_batches() -> Result<()> {
        let batches = BulkBatchBuilder::new(100).build(&[])?;
        assert!(batches.is_empty(), "No empty bulk bodies. Boundaries are healthy.");
        Ok(())
    }

    #[test]
    fn the_one_where_spicy_ids_are_escaped_on_the_action_line() -> Result<()> {
        let action = BulkBatchBuilder::action_line(r#"id"with\quotes"#)?;
        let parsed: serde_json::Value = serde_json::from_str(&action)?;
        assert_eq!(parsed["index"]["_id"], r#"id"with\quotes"#);
        assert_eq!(BulkBatchBuilder::action_line("a")?, r#"{"index":{"_id":"a"}}"#);
        Ok(())
    }

    #[test]
    fn the_one_where_prepare_page_counts_documents_and_bytes() -> Result<()> {
        let raw = page_of(&[("a", r#"{"v":1}"#), ("b", r#"{"v":2}"#)]);
        let prepared = BulkBatchBuilder::new(1_000).prepare_page(&raw, "accounts", 1)?;
        assert_eq!(prepared.documents, 2);
        assert_eq!(prepared.batches.len(), 1);
        assert_eq!(prepared.bytes, 60);
        Ok(())
    }

    #[test]
    fn the_one_where_prepare_page_rejects_a_malformed_page() {
        let result = BulkBatchBuilder::new(1_000).prepare_page("{not json", "accounts", 7);
        assert!(result.is_err());
    }
}
