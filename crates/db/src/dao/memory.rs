//! In-process [`Dao`] used by tests and dry runs.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use genpic_core::types::DbId;

use super::{Dao, Entity};

struct Table<E> {
    rows: BTreeMap<DbId, E>,
    next_id: DbId,
}

/// A table held in memory. Ids start at 1 and increase monotonically, like a
/// BIGSERIAL column. Never returns an error.
pub struct MemoryDao<E> {
    table: Mutex<Table<E>>,
}

impl<E: Entity> MemoryDao<E> {
    pub fn new() -> Self {
        Self {
            table: Mutex::new(Table {
                rows: BTreeMap::new(),
                next_id: 1,
            }),
        }
    }

    /// Number of stored rows.
    pub fn len(&self) -> usize {
        self.lock().rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Table<E>> {
        self.table.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<E: Entity> Default for MemoryDao<E> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<E: Entity> Dao<E> for MemoryDao<E> {
    async fn find(&self, id: DbId) -> Result<Option<E>, sqlx::Error> {
        Ok(self.lock().rows.get(&id).cloned())
    }

    async fn list(&self, filter: &E::Filter) -> Result<Vec<E>, sqlx::Error> {
        Ok(self
            .lock()
            .rows
            .values()
            .filter(|row| row.matches(filter))
            .cloned()
            .collect())
    }

    async fn insert(&self, input: &E::Create) -> Result<DbId, sqlx::Error> {
        let mut table = self.lock();
        let id = table.next_id;
        table.next_id += 1;
        table.rows.insert(id, E::from_create(id, Utc::now(), input));
        Ok(id)
    }

    async fn update(&self, id: DbId, patch: &E::Patch) -> Result<bool, sqlx::Error> {
        match self.lock().rows.get_mut(&id) {
            Some(row) => {
                row.apply_patch(patch);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
