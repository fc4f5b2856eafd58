//! Repository layer: the Task Store (SPEC_FULL.md §4.1, component A).

#![allow(dead_code)]

pub mod diesel_task_store;
pub mod pool;
pub mod task_store;
pub mod util;

pub use diesel_task_store::DieselTaskStore;
pub use pool::DbPool;
pub use task_store::{InMemoryTaskStore, StoreError, TaskStore, TaskUpdate};
