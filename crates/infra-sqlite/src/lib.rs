// Conveyor Infrastructure - SQLite
//
// Test and embedded-deployment implementation of the task store port.
// SQLite has no row-level locks; its single-writer serialization stands in
// for skip-locked selection while preserving the ordering contract.

mod connection;
mod migration;
mod store;

pub use connection::{create_pool, memory_pool};
pub use migration::run_migrations;
pub use store::SqliteTaskStore;
