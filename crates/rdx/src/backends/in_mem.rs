//! # Previously, on rdx...
//!
//! 🎬 The data was trapped. Stranded between two search clusters like a traveler stuck
//! in a connecting airport with no WiFi. Someone had to move it. Someone had to write a
//! cluster so simple it lives entirely in RAM, gone the moment you blink.
//!
//! That someone was this module.
//!
//! `in_mem` provides an in-memory [`Cluster`](crate::backends::Cluster): indices with
//! mappings and documents, aliases, a scroll that pages through a snapshot, and a bulk
//! endpoint that parses real NDJSON. It also keeps a ledger of every mutating call so a
//! test can ask "did anything get created?" and get an honest answer.
//!
//! 🦆
//!
//! ⚠️ This is for tests and dry runs. If you're deploying this to prod, please also
//! deploy a therapist.

mod in_mem_cluster;
mod in_mem_scroll;

pub use in_mem_cluster::{
    BulkRecord, InMemoryCluster, InMemoryClusterConfig, InMemoryState, SeedDocument, SeedIndex,
};
pub use in_mem_scroll::InMemoryScroll;

#[cfg(test)]
pub(crate) use in_mem_cluster::InMemoryOperation;
