//! Domain types and pure building blocks for generated-picture ingestion.
//!
//! Nothing in this crate touches the database. Filesystem access is limited
//! to the scoped probes in [`fs_guard`] and [`image_probe`].

pub mod config;
pub mod error;
pub mod fs_guard;
pub mod image_probe;
pub mod naming;
pub mod types;
