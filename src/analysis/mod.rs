//! The diagnostic clustering algorithm, modeled only by its I/O contract
//! (§1 Out of scope: "embedding + density clustering ... specified only by
//! its I/O contract"). `pipeline::diagnose` drives Stage 1 using whichever
//! `Clusterer` is configured.
//!
//! Multi-backend dispatch shape grounded on the same pattern as
//! `knowledge::embedding::EmbeddingSource`
//! (`other_examples/12b776f7_josephleblanc-ploke__...ploke-embed-src-indexer-mod.rs.rs`).

mod clusterer;

pub use clusterer::{ClusterAssignment, Clusterer, DeterministicClusterer};
