//! 🎬 *[camera pans across two clusters, staring at each other across a data center]*
//! 🎬 "One of them has the documents. The other has an empty alias table and dreams."
//! 🎬 *[record scratch]* 🦆
//!
//! 🚚 The reindexer — the orchestrator that walks every requested index through
//! `Counting → Provisioning → Streaming → Verifying → Done`, one index at a time, one page
//! at a time, one batch at a time. No pipelining. No retries. No surprises.
//!
//! 🧠 Knowledge graph:
//! - [`Reindexer::new`] validates the index list up front. Nothing touches the network
//!   until the list is non-empty, every name is non-empty, and no name repeats.
//! - [`Reindexer::process`] runs indices in order. The first error stops the whole run;
//!   indices that already finished stay finished.
//! - Writes go to the physical index (`<name>-000001`), never the alias.
//! - The final destination count is advisory. Near-real-time indexing means it can lag,
//!   so a mismatch is a `warn!`, never an error.
//! - Every phase wraps its error with the phase and the index, and a
//!   [`ProgressEvent::Failed`] goes out before the error does.

use std::collections::HashSet;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::backends::{Cluster, ClusterBackend, PageSource, ScrollBackend};
use crate::bulk::BulkBatchBuilder;
use crate::common::{MigrationPhase, match_all_query, physical_index_name};
use crate::progress::{ProgressEvent, ProgressReporter, format_number};
use crate::provisioner::Provisioner;

/// 📋 How one index's migration went.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationResult {
    /// 🏷️ logical name: the source index, and the destination alias
    pub index: String,
    /// 🏗️ the real destination index behind the alias
    pub physical_index: String,
    pub source_count: u64,
    /// 🔢 observed after streaming. May lag. Don't build a religion on it.
    pub destination_count: u64,
    pub documents_streamed: u64,
    pub pages: u64,
    pub batches: u64,
}

impl MigrationResult {
    pub fn counts_match(&self) -> bool {
        self.source_count == self.destination_count
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct StreamStats {
    documents: u64,
    pages: u64,
    batches: u64,
}

/// 🚦 Refuse an index list that can't be migrated: empty, containing a blank name, or
/// naming the same index twice.
pub fn validate_indices(indices: &[String]) -> Result<()> {
    if indices.is_empty() {
        anyhow::bail!("💀 No indices to reindex. Pass --indices or set `indices` in the config.");
    }
    let mut seen = HashSet::with_capacity(indices.len());
    for index in indices {
        if index.trim().is_empty() {
            anyhow::bail!("💀 The index list contains an empty name. Even ghosts need names.");
        }
        if !seen.insert(index.as_str()) {
            anyhow::bail!("💀 Index '{}' is listed more than once. Once is plenty.", index);
        }
    }
    Ok(())
}

/// 🚚 Moves indices from a source cluster to a destination cluster.
#[derive(Debug)]
pub struct Reindexer {
    source: ClusterBackend,
    destination: ClusterBackend,
    indices: Vec<String>,
    builder: BulkBatchBuilder,
    progress: ProgressReporter,
}

impl Reindexer {
    /// 🔧 Preconditions are checked here, before any request can go out.
    pub fn new(
        source: ClusterBackend,
        destination: ClusterBackend,
        indices: Vec<String>,
        max_bulk_size_bytes: usize,
        progress: ProgressReporter,
    ) -> Result<Self> {
        validate_indices(&indices)?;
        Ok(Self {
            source,
            destination,
            indices,
            builder: BulkBatchBuilder::new(max_bulk_size_bytes),
            progress,
        })
    }

    /// 🚀 Migrate every index, in order. Returns one result per index, or the first error.
    pub async fn process(&self, overwrite: bool) -> Result<Vec<MigrationResult>> {
        let mut results = Vec::with_capacity(self.indices.len());
        for index in &self.indices {
            let result = self.migrate_index(index, overwrite).await?;
            results.push(result);
        }
        info!("🏁 reindexed {} indices", results.len());
        Ok(results)
    }

    fn enter(&self, index: &str, phase: MigrationPhase) {
        self.progress.emit(ProgressEvent::PhaseEntered {
            index: index.to_string(),
            phase,
        });
    }

    fn fail(&self, index: &str, phase: MigrationPhase, err: &anyhow::Error) {
        self.progress.emit(ProgressEvent::Failed {
            index: index.to_string(),
            phase,
            cause: format!("{err:#}"),
        });
    }

    async fn migrate_index(&self, index: &str, overwrite: bool) -> Result<MigrationResult> {
        let physical_index = physical_index_name(index);

        // 🔢 1. how many are we moving?
        self.enter(index, MigrationPhase::Counting);
        let source_count = self
            .source
            .count(index)
            .await
            .with_context(|| format!("💀 while getting the source count for index {index}"))
            .inspect_err(|err| self.fail(index, MigrationPhase::Counting, err))?;
        info!("🔢 source index '{}' holds {} documents", index, format_number(source_count));
        self.progress.emit(ProgressEvent::SourceCounted {
            index: index.to_string(),
            count: source_count,
        });

        // 🏗️ 2. somewhere to put them
        self.enter(index, MigrationPhase::Provisioning);
        Provisioner::new(&self.source, &self.destination)
            .ensure(index, &physical_index, overwrite)
            .await
            .with_context(|| format!("💀 while provisioning the destination for index {index}"))
            .inspect_err(|err| self.fail(index, MigrationPhase::Provisioning, err))?;

        // 📡 3. move them
        self.enter(index, MigrationPhase::Streaming);
        let stats = self
            .stream(index, &physical_index)
            .await
            .with_context(|| format!("💀 while reindexing data for index {index}"))
            .inspect_err(|err| self.fail(index, MigrationPhase::Streaming, err))?;

        // 🔍 4. see how it landed
        self.enter(index, MigrationPhase::Verifying);
        let destination_count = self
            .destination
            .count(index)
            .await
            .with_context(|| format!("💀 while getting the destination count for index {index}"))
            .inspect_err(|err| self.fail(index, MigrationPhase::Verifying, err))?;

        let result = MigrationResult {
            index: index.to_string(),
            physical_index,
            source_count,
            destination_count,
            documents_streamed: stats.documents,
            pages: stats.pages,
            batches: stats.batches,
        };

        if result.counts_match() {
            info!(
                "✅ '{}' reindexed: {} source, {} destination",
                index, source_count, destination_count
            );
        } else {
            // ⚠️ the destination may still be refreshing; this is an observation, not a verdict
            warn!(
                "⚠️ '{}' count mismatch: {} source, {} destination ({} streamed)",
                index, source_count, destination_count, stats.documents
            );
        }

        self.enter(index, MigrationPhase::Done);
        self.progress.emit(ProgressEvent::IndexFinished {
            result: result.clone(),
        });
        Ok(result)
    }

    /// 📜 Open a scroll, drain it into the destination, and close it whether the walk
    /// finished or not, so an aborted index doesn't leave a scroll context behind.
    async fn stream(&self, index: &str, physical_index: &str) -> Result<StreamStats> {
        let mut scroll = self
            .source
            .open_scroll(index, &match_all_query())
            .await
            .with_context(|| format!("💀 Could not open a scroll over '{index}'"))?;

        let outcome = self.drain(&mut scroll, index, physical_index).await;
        scroll.close().await;
        outcome
    }

    /// 🔄 Pull a page, pack it, write every batch, repeat until the scroll runs dry.
    /// Any failure stops pulling on the spot.
    async fn drain(
        &self,
        scroll: &mut ScrollBackend,
        index: &str,
        physical_index: &str,
    ) -> Result<StreamStats> {
        let mut stats = StreamStats::default();
        while let Some(page) = scroll.next_page().await? {
            let page_number = stats.pages + 1;
            let prepared = self
                .builder
                .prepare_page(&page, index, page_number)
                .with_context(|| format!("💀 Page {page_number} of '{index}' could not be parsed"))?;

            let batch_count = prepared.batches.len();
            for (batch_number, batch) in prepared.batches.into_iter().enumerate() {
                self.destination
                    .bulk(batch.body, physical_index)
                    .await
                    .with_context(|| {
                        format!(
                            "💀 Bulk batch {} of page {} ({} documents) into '{}' failed",
                            batch_number + 1,
                            page_number,
                            batch.docs,
                            physical_index
                        )
                    })?;
            }

            stats.pages = page_number;
            stats.documents += prepared.documents as u64;
            stats.batches += batch_count as u64;
            self.progress.emit(ProgressEvent::PageWritten {
                index: index.to_string(),
                page_number,
                documents: prepared.documents,
                batches: batch_count,
                bytes: prepared.bytes,
            });
        }
        Ok(stats)
    }
}
