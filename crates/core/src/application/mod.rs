// Application Layer - engine components composed from store primitives

pub mod agent;
pub(crate) mod dispatch;
pub(crate) mod instantiate;
pub(crate) mod journal;
pub mod lifecycle;

pub use agent::{shutdown_channel, AgentConfig, ServiceAgent, ShutdownSender, ShutdownToken};
pub use lifecycle::{FailDisposition, RetryConfig, RetryPolicy};
