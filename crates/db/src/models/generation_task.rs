//! Generation task entity and DTOs.

use genpic_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Postgres, QueryBuilder};

use crate::dao::Entity;

/// A row from the `generationTasks` table.
///
/// One accepted request to produce one or more images. Rows are created
/// upstream; ingestion only reads them.
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationTask {
    pub id: DbId,
    pub prompt: String,
    #[serde(rename = "creationTime")]
    pub created_at: Timestamp,
}

/// DTO for creating a new generation task.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateGenerationTask {
    pub prompt: String,
}

/// DTO for updating an existing generation task.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateGenerationTask {
    pub prompt: Option<String>,
}

/// Filter for listing generation tasks.
#[derive(Debug, Clone, Default)]
pub struct GenerationTaskFilter {
    /// Only tasks created strictly after this instant.
    pub created_after: Option<Timestamp>,
}

impl Entity for GenerationTask {
    const TABLE: &'static str = "generationTasks";
    const COLUMNS: &'static str = "id, prompt, created_at";

    type Create = CreateGenerationTask;
    type Patch = UpdateGenerationTask;
    type Filter = GenerationTaskFilter;

    fn push_insert(qb: &mut QueryBuilder<'_, Postgres>, input: &CreateGenerationTask) {
        qb.push("(prompt) VALUES (");
        qb.push_bind(input.prompt.clone());
        qb.push(")");
    }

    fn push_patch(qb: &mut QueryBuilder<'_, Postgres>, patch: &UpdateGenerationTask) {
        qb.push("prompt = COALESCE(");
        qb.push_bind(patch.prompt.clone());
        qb.push(", prompt)");
    }

    fn push_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &GenerationTaskFilter) {
        if let Some(after) = filter.created_after {
            qb.push(" AND created_at > ");
            qb.push_bind(after);
        }
    }

    fn from_create(id: DbId, created_at: Timestamp, input: &CreateGenerationTask) -> Self {
        Self {
            id,
            prompt: input.prompt.clone(),
            created_at,
        }
    }

    fn apply_patch(&mut self, patch: &UpdateGenerationTask) {
        if let Some(prompt) = &patch.prompt {
            self.prompt = prompt.clone();
        }
    }

    fn matches(&self, filter: &GenerationTaskFilter) -> bool {
        filter
            .created_after
            .map_or(true, |after| self.created_at > after)
    }
}
