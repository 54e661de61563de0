//! 🏗️ The destination provisioner: make sure a physical index and its alias exist before a
//! single document is written, and refuse to touch anything that is already there unless
//! told to with `overwrite`.
//!
//! ```text
//!  alias?   physical?   overwrite=false        overwrite=true
//!  yes      any         ProvisionConflict      keep alias; create physical only if missing
//!  no       yes         ProvisionConflict      keep index; create alias
//!  no       no          copy mapping, create physical, create alias (both columns)
//! ```
//!
//! The mapping is copied once, from the source, and only when the physical index has to be
//! created. No diffing, no merging. A destination somebody tuned by hand stays tuned.

use std::fmt;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::backends::{Cluster, ClusterBackend};

/// 🚧 The destination already has the alias or the physical index, and `overwrite` was off.
/// Downcast it out of an `anyhow::Error` to tell a conflict apart from a broken network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionConflict {
    /// 🏷️ `"alias"` or `"index"`
    pub kind: &'static str,
    pub name: String,
}

impl fmt::Display for ProvisionConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "💀 The destination {} '{}' already exists. Please clean the destination before retrying, or rerun with --overwrite",
            self.kind, self.name
        )
    }
}

impl std::error::Error for ProvisionConflict {}

/// 📋 What the provisioner actually had to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct ProvisionOutcome {
    pub created_index: bool,
    pub created_alias: bool,
}

#[derive(Debug)]
pub(crate) struct Provisioner<'a> {
    source: &'a ClusterBackend,
    destination: &'a ClusterBackend,
}

impl<'a> Provisioner<'a> {
    pub(crate) fn new(source: &'a ClusterBackend, destination: &'a ClusterBackend) -> Self {
        Self {
            source,
            destination,
        }
    }

    /// 🔧 Ensure `physical_index` exists with the source mapping of `index`, and that the
    /// alias `index` exists. A conflict returns before anything is created.
    pub(crate) async fn ensure(
        &self,
        index: &str,
        physical_index: &str,
        overwrite: bool,
    ) -> Result<ProvisionOutcome> {
        let alias_exists = self
            .destination
            .alias_exists(index)
            .await
            .with_context(|| format!("💀 Could not check whether alias '{index}' exists"))?;
        if alias_exists && !overwrite {
            return Err(ProvisionConflict {
                kind: "alias",
                name: index.to_string(),
            }
            .into());
        }

        let index_exists = self
            .destination
            .index_exists(physical_index)
            .await
            .with_context(|| format!("💀 Could not check whether index '{physical_index}' exists"))?;
        if index_exists && !overwrite {
            return Err(ProvisionConflict {
                kind: "index",
                name: physical_index.to_string(),
            }
            .into());
        }

        let mut outcome = ProvisionOutcome::default();

        if index_exists {
            debug!("♻️ '{}' already exists, keeping its mapping", physical_index);
        } else {
            let mapping = self
                .source
                .get_mapping(index)
                .await
                .with_context(|| format!("💀 Could not fetch the mapping of source index '{index}'"))?;
            self.destination
                .create_index_with_mapping(physical_index, &mapping)
                .await
                .with_context(|| format!("💀 Could not create destination index '{physical_index}'"))?;
            info!("🏗️ created destination index '{}' with the source mapping", physical_index);
            outcome.created_index = true;
        }

        if alias_exists {
            debug!("♻️ alias '{}' already exists, leaving it where it points", index);
        } else {
            self.destination
                .put_alias(physical_index, index)
                .await
                .with_context(|| format!("💀 Could not point alias '{index}' at '{physical_index}'"))?;
            info!("🏷️ alias '{}' → '{}'", index, physical_index);
            outcome.created_alias = true;
        }

        Ok(outcome)
    }
}
