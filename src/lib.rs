//! dataforge: a distributed data-optimization pipeline.
//!
//! Transforms a raw collection of question/answer records into a curated,
//! quality-improved collection via diagnostic clustering, batched
//! external-model invocations, retrieval-augmented verification, and privacy
//! redaction. See `SPEC_FULL.md` for the full design.

pub mod analysis;
pub mod cli;
pub mod config;
pub mod knowledge;
pub mod llm;
pub mod models;
pub mod pipeline;
pub mod redact;
pub mod repository;
pub mod scheduler;
pub mod schema;
pub mod server;
pub mod storage;
pub mod worker;
