//! Infrastructure layer: event log, aggregate client, projections, workers
//! and configuration.

pub mod aggregate_client;
pub mod config;
pub mod context;
pub mod event_log;
pub mod projections;
pub mod workers;


pub use aggregate_client::{AggregateClient, ClientError, Loaded};
pub use config::{ConfigError, EngineConfig};
pub use context::EngineContext;
