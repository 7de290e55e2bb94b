// Conveyor Core - Domain Logic & Ports
// NO infrastructure dependencies: the datastore, object store and clock are ports

pub mod application;
pub mod domain;
pub mod engine;
pub mod error;
pub mod port;
pub mod settings;

pub use engine::{Engine, EngineConfig};
pub use error::{EngineError, Result};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
