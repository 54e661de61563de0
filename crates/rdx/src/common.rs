//! 📦 Common data structures — the building blocks of rdx
//!
//! ---
//!
//! 🎬 COLD OPEN — INT. DATA CENTER — 3:47 AM
//!
//! 🌩️  The old cluster hums. The new cluster waits, empty, alias-less, a little
//! smug about its fresh hardware. Between them: a scroll cursor and a dream.
//!
//! ✅ A page arrives. It holds hits. Each hit holds an `_id` and a `_source`.
//! We do not read the `_source`. We do not judge the `_source`. We borrow it,
//! carry it across, and set it down exactly as we found it. Like a good house guest.
//!
//! 🦆
//!
//! This module owns the vocabulary every other module speaks: what a document is,
//! how a logical index maps onto its physical sibling, which phase a migration is
//! in, and how a raw scroll page turns into documents.

use std::borrow::Cow;
use std::fmt;

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::value::RawValue;
use serde_json::{Value, json};

/// 🏷️ Suffix glued onto a logical index name to get the first-generation physical index.
/// The alias keeps the pretty name. The physical index keeps the data. Everyone keeps their job.
pub(crate) const PHYSICAL_INDEX_SUFFIX: &str = "-000001";

/// 🔧 `accounts` → `accounts-000001`. The alias points at this. Readers never see it.
pub(crate) fn physical_index_name(logical_index: &str) -> String {
    format!("{logical_index}{PHYSICAL_INDEX_SUFFIX}")
}

/// 📡 The query every scroll opens with: give me everything. All of it. No filters, no mercy.
pub(crate) fn match_all_query() -> Value {
    json!({ "query": { "match_all": {} } })
}

/// 🔄 Where a single index migration currently stands.
///
/// `Counting → Provisioning → Streaming → Verifying → Done`. Failure can strike from any
/// of them; when it does, the phase travels with the error and the `Failed` progress event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationPhase {
    Counting,
    Provisioning,
    Streaming,
    Verifying,
    Done,
}

impl fmt::Display for MigrationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MigrationPhase::Counting => "counting",
            MigrationPhase::Provisioning => "provisioning",
            MigrationPhase::Streaming => "streaming",
            MigrationPhase::Verifying => "verifying",
            MigrationPhase::Done => "done",
        };
        f.write_str(name)
    }
}

/// 🎯 One document, borrowed straight out of the page it arrived in.
///
/// `source` is a [`RawValue`]: the exact bytes of `_source`, never parsed into a tree,
/// never re-serialized, never reordered. The migration's whole promise is "what went in
/// comes out", and `RawValue` is how we keep it without paying for a full parse.
#[derive(Debug, Deserialize)]
pub(crate) struct Document<'a> {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_source", borrow)]
    pub source: &'a RawValue,
}

impl<'a> Document<'a> {
    /// 📄 The source, ready to sit on a single NDJSON line.
    ///
    /// Compact sources come back borrowed, zero-copy. A pretty-printed source carries raw
    /// line breaks, which JSON only allows as whitespace between tokens, so stripping them
    /// leaves the document identical while keeping the bulk framing intact.
    pub(crate) fn source_line(&self) -> Cow<'a, str> {
        let raw: &'a str = self.source.get();
        if memchr::memchr2(b'\n', b'\r', raw.as_bytes()).is_none() {
            return Cow::Borrowed(raw);
        }
        Cow::Owned(raw.chars().filter(|c| *c != '\n' && *c != '\r').collect())
    }
}

// 📦 Just enough of a scroll response to find the hits. Everything else is ignored.
#[derive(Debug, Deserialize)]
struct ScrollPage<'a> {
    #[serde(borrow)]
    hits: PageHits<'a>,
}

#[derive(Debug, Deserialize)]
struct PageHits<'a> {
    #[serde(borrow, default)]
    hits: Vec<Document<'a>>,
}

/// 🔍 Pull `(_id, _source)` pairs out of one raw scroll page, in page order.
///
/// 💀 A page that is not a search response (no `hits.hits`, a hit without `_source`,
/// plain garbage) is a parse error. The caller aborts streaming for the index.
pub(crate) fn parse_page(raw_page: &str) -> Result<Vec<Document<'_>>> {
    let page: ScrollPage<'_> = serde_json::from_str(raw_page).context(
        "💀 The scroll page did not look like a search response. We expected hits.hits[*]._id and _source, and got something that would make a JSON linter weep.",
    )?;
    Ok(page.hits.hits)
}
