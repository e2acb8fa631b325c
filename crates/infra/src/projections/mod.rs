//! Declarative projections (read model builders).
//!
//! Projections consume the per-aggregate-type feeds of the event log and
//! maintain JSON documents that can be queried by id or by reference key.
//! All projections are:
//! - **Declarative**: rule tables validated before use
//! - **Rebuildable**: can be recomputed from the start of their feed
//! - **Idempotent**: safe for at-least-once delivery

pub mod definition;
pub mod engine;
pub mod query;
pub mod registry;
pub mod selector;
pub mod store;

pub mod shipping_stats;
pub mod todo_lists;

pub use definition::{
    DefinitionError, FunctionSpec, ProjectionDefinition, ProjectionDefinitionBuilder, ProjectionFunction,
    ProjectionHandler, ProjectionKind, ProjectionRule, ValueSource, clear, dec, inc, prepend, push, set, setref,
};
pub use engine::{ProjectionEngine, ProjectionError};
pub use query::{ProjectionQueryService, QueryError};
pub use registry::{ProjectionRegistry, Registration};
pub use store::{DocumentStore, InMemoryDocumentStore, ProjectionDocument};
