//! Mapping a discovered file to the generation task that produced it.
//!
//! How a file is tied to its task is decided by whatever runs the tasks, so
//! the lookup is a trait. [`FileNameTaskResolver`] implements the
//! `task-{id}-...` naming convention from [`genpic_core::naming`].

use std::sync::Arc;

use async_trait::async_trait;
use genpic_core::naming::task_id_from_file_name;
use genpic_core::types::DbId;
use genpic_db::dao::Dao;
use genpic_db::models::generation_task::GenerationTask;

/// Resolves the owning task of a file.
///
/// `Ok(None)` means no task matches (an orphan file). Implementations must
/// only return ids of tasks that exist at the time of the call.
#[async_trait]
pub trait TaskResolver: Send + Sync {
    async fn resolve(&self, file_name: &str) -> Result<Option<DbId>, sqlx::Error>;
}

/// Parses the task id out of the file name, then confirms the task exists.
pub struct FileNameTaskResolver {
    tasks: Arc<dyn Dao<GenerationTask>>,
}

impl FileNameTaskResolver {
    pub fn new(tasks: Arc<dyn Dao<GenerationTask>>) -> Self {
        Self { tasks }
    }
}

#[async_trait]
impl TaskResolver for FileNameTaskResolver {
    async fn resolve(&self, file_name: &str) -> Result<Option<DbId>, sqlx::Error> {
        let Some(task_id) = task_id_from_file_name(file_name) else {
            return Ok(None);
        };
        Ok(self.tasks.find(task_id).await?.map(|task| task.id))
    }
}
