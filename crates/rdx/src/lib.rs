//! 🚚 rdx — move Elasticsearch indices from one cluster to another, one scroll page at a
//! time, into a fresh `<name>-000001` index fronted by an alias called `<name>`.
//!
//! 🦆

pub mod app_config;
pub mod backends;
pub(crate) mod bulk;
pub(crate) mod common;
pub mod progress;
pub(crate) mod provisioner;
pub mod reindexer;

pub use common::MigrationPhase;
pub use provisioner::ProvisionConflict;
pub use reindexer::{MigrationResult, Reindexer};

use anyhow::{Context, Result};

use crate::app_config::AppConfig;
use crate::backends::ClusterBackend;
use crate::progress::{ProgressReporter, spawn_progress_display};

/// 🚀 The whole run: validate the index list, connect both clusters, migrate, report.
///
/// The index list is checked before either backend is built, so a bad list never reaches
/// the network.
pub async fn run(app_config: AppConfig) -> Result<Vec<MigrationResult>> {
    reindexer::validate_indices(&app_config.indices)?;

    let source = ClusterBackend::from_config(&app_config.source_config)
        .await
        .context("💀 Could not connect to the source cluster")?;
    let destination = ClusterBackend::from_config(&app_config.destination_config)
        .await
        .context("💀 Could not connect to the destination cluster")?;

    let (progress, progress_rx) =
        ProgressReporter::channel(app_config.runtime.progress_queue_capacity);
    let display = spawn_progress_display(progress_rx);

    let reindexer = Reindexer::new(
        source,
        destination,
        app_config.indices,
        app_config.runtime.max_bulk_size_bytes,
        progress,
    )?;
    let outcome = reindexer.process(app_config.overwrite).await;

    // -- 🔌 last sender gone → the display drains what's left and exits
    drop(reindexer);
    if let Err(err) = display.await {
        tracing::warn!("⚠️ The progress display ended badly: {}", err);
    }

    outcome
}
