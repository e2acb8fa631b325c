//! Append-only event log boundary.
//!
//! The log stores one stream per aggregate and exposes every committed append
//! batch on a feed named after the aggregate type. The trait makes no storage
//! assumptions; [`InMemoryEventLog`] backs tests, benches and the demo.

pub mod in_memory;
pub mod r#trait;

pub use in_memory::InMemoryEventLog;
pub use r#trait::{EventLog, EventLogError, NewEvent};
