// Conveyor Infrastructure - PostgreSQL
//
// Production implementation of the task store port. Selection locks rows
// with FOR UPDATE SKIP LOCKED so competing agents never block each other;
// dependency sets are text[], payloads jsonb.

mod connection;
mod migration;
mod store;

pub use connection::create_pool;
pub use migration::run_migrations;
pub use store::PgTaskStore;
