//! Filesystem-to-record ingestion of generated pictures.
//!
//! - [`watcher`]: debounced, non-recursive directory watching.
//! - [`coordinator`]: turns a quiet-period notification into picture rows.
//! - [`resolver`]: pluggable mapping from a file name to its task.
//! - [`report`]: per-cycle outcome and failure taxonomy.

pub mod coordinator;
pub mod report;
pub mod resolver;
pub mod watcher;

pub use coordinator::IngestionCoordinator;
pub use report::{FileFailure, IngestError, IngestFailure, IngestReport, IngestedFile};
pub use resolver::{FileNameTaskResolver, TaskResolver};
pub use watcher::{DirectoryWatcher, NotificationHandler};
