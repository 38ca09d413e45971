//! Picture entity, its public projection, and DTOs.
//!
//! [`Picture`] is the full server-side row and deliberately does not
//! implement `Serialize`. Anything leaving the process goes through
//! [`StripServerData`] and becomes a [`PublicPicture`].

use genpic_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Postgres, QueryBuilder};

use crate::dao::{Entity, StripServerData};

/// Path under which the external API serves a picture's bytes.
pub fn picture_data_path(id: DbId) -> String {
    format!("/api/getPictureData?id={id}")
}

// ---------------------------------------------------------------------------
// Picture
// ---------------------------------------------------------------------------

/// A row from the `pictures` table.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct Picture {
    pub id: DbId,
    pub generation_task_id: DbId,
    /// Server-only: absolute path the bytes are served from.
    pub direct_link: String,
    /// Server-only: on-disk name in the watched directory.
    pub file_name: String,
    pub width: i64,
    pub height: i64,
    pub format: String,
    pub created_at: Timestamp,
}

/// The only picture shape allowed across the API boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicPicture {
    pub id: DbId,
    pub creation_time: Timestamp,
    pub generation_task_id: DbId,
}

impl StripServerData for Picture {
    type Public = PublicPicture;

    fn strip_server_data(&self) -> PublicPicture {
        PublicPicture {
            id: self.id,
            creation_time: self.created_at,
            generation_task_id: self.generation_task_id,
        }
    }
}

impl StripServerData for PublicPicture {
    type Public = PublicPicture;

    fn strip_server_data(&self) -> PublicPicture {
        self.clone()
    }
}

// ---------------------------------------------------------------------------
// DTOs
// ---------------------------------------------------------------------------

/// DTO for creating a new picture. Every field is required: a picture is
/// only inserted once its file has been probed and its task resolved.
#[derive(Debug, Clone)]
pub struct CreatePicture {
    pub generation_task_id: DbId,
    pub direct_link: String,
    pub file_name: String,
    pub width: i64,
    pub height: i64,
    pub format: String,
}

/// DTO for relocating a picture's backing file.
#[derive(Debug, Clone, Default)]
pub struct UpdatePicture {
    pub direct_link: Option<String>,
    pub file_name: Option<String>,
}

/// Filter for listing pictures.
#[derive(Debug, Clone, Default)]
pub struct PictureFilter {
    pub generation_task_id: Option<DbId>,
    pub file_name: Option<String>,
}

impl PictureFilter {
    pub fn by_file_name(file_name: impl Into<String>) -> Self {
        Self {
            file_name: Some(file_name.into()),
            ..Self::default()
        }
    }

    pub fn by_task(generation_task_id: DbId) -> Self {
        Self {
            generation_task_id: Some(generation_task_id),
            ..Self::default()
        }
    }
}

impl Entity for Picture {
    const TABLE: &'static str = "pictures";
    const COLUMNS: &'static str =
        "id, generation_task_id, direct_link, file_name, width, height, format, created_at";

    type Create = CreatePicture;
    type Patch = UpdatePicture;
    type Filter = PictureFilter;

    fn push_insert(qb: &mut QueryBuilder<'_, Postgres>, input: &CreatePicture) {
        qb.push("(generation_task_id, direct_link, file_name, width, height, format) VALUES (");
        let mut values = qb.separated(", ");
        values.push_bind(input.generation_task_id);
        values.push_bind(input.direct_link.clone());
        values.push_bind(input.file_name.clone());
        values.push_bind(input.width);
        values.push_bind(input.height);
        values.push_bind(input.format.clone());
        values.push_unseparated(")");
    }

    fn push_patch(qb: &mut QueryBuilder<'_, Postgres>, patch: &UpdatePicture) {
        qb.push("direct_link = COALESCE(");
        qb.push_bind(patch.direct_link.clone());
        qb.push(", direct_link), file_name = COALESCE(");
        qb.push_bind(patch.file_name.clone());
        qb.push(", file_name)");
    }

    fn push_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &PictureFilter) {
        if let Some(task_id) = filter.generation_task_id {
            qb.push(" AND generation_task_id = ");
            qb.push_bind(task_id);
        }
        if let Some(name) = &filter.file_name {
            qb.push(" AND file_name = ");
            qb.push_bind(name.clone());
        }
    }

    fn from_create(id: DbId, created_at: Timestamp, input: &CreatePicture) -> Self {
        Self {
            id,
            generation_task_id: input.generation_task_id,
            direct_link: input.direct_link.clone(),
            file_name: input.file_name.clone(),
            width: input.width,
            height: input.height,
            format: input.format.clone(),
            created_at,
        }
    }

    fn apply_patch(&mut self, patch: &UpdatePicture) {
        if let Some(link) = &patch.direct_link {
            self.direct_link = link.clone();
        }
        if let Some(name) = &patch.file_name {
            self.file_name = name.clone();
        }
    }

    fn matches(&self, filter: &PictureFilter) -> bool {
        filter
            .generation_task_id
            .map_or(true, |id| self.generation_task_id == id)
            && filter
                .file_name
                .as_deref()
                .map_or(true, |name| self.file_name == name)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
