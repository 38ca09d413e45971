//! In-process notifications about ingestion outcomes.
//!
//! - [`EventBus`]: publish/subscribe hub backed by `tokio::sync::broadcast`.
//! - [`IngestEvent`]: what happened to one discovered file.

pub mod bus;

pub use bus::{EventBus, IngestEvent};
