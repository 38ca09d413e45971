//! Generic table access.
//!
//! One [`Entity`] impl per table supplies the table name, column list, and
//! the few query fragments that differ between tables. [`PgDao`] and
//! [`MemoryDao`] implement the [`Dao`] contract for any such entity.

use async_trait::async_trait;
use genpic_core::types::{DbId, Timestamp};
use sqlx::postgres::PgRow;
use sqlx::{FromRow, Postgres, QueryBuilder};

mod memory;
mod pg;

pub use memory::MemoryDao;
pub use pg::PgDao;

// ---------------------------------------------------------------------------
// Entity
// ---------------------------------------------------------------------------

/// A row type bound to exactly one table.
pub trait Entity: for<'r> FromRow<'r, PgRow> + Clone + Send + Sync + Unpin + 'static {
    /// Storage table name. Quoted in SQL, so case is preserved.
    const TABLE: &'static str;

    /// Column list shared across queries, in `FromRow` order.
    const COLUMNS: &'static str;

    /// DTO for inserting a row. Storage assigns `id` and `created_at`.
    type Create: Send + Sync;

    /// Partial update; `None` fields are left unchanged.
    type Patch: Send + Sync;

    /// Equality filter for [`Dao::list`]; `Default` matches every row.
    type Filter: Default + Send + Sync;

    /// Push `(col, ...) VALUES (bind, ...)`.
    fn push_insert(qb: &mut QueryBuilder<'_, Postgres>, input: &Self::Create);

    /// Push the `SET` assignment list.
    fn push_patch(qb: &mut QueryBuilder<'_, Postgres>, patch: &Self::Patch);

    /// Push zero or more ` AND cond` clauses after `WHERE TRUE`.
    fn push_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &Self::Filter);

    /// Materialise a row without a database (see [`MemoryDao`]).
    fn from_create(id: DbId, created_at: Timestamp, input: &Self::Create) -> Self;

    /// In-memory counterpart of [`Entity::push_patch`].
    fn apply_patch(&mut self, patch: &Self::Patch);

    /// In-memory counterpart of [`Entity::push_filter`].
    fn matches(&self, filter: &Self::Filter) -> bool;
}

// ---------------------------------------------------------------------------
// Dao
// ---------------------------------------------------------------------------

/// Typed CRUD over one entity's table.
///
/// "Not found" is a normal result (`Ok(None)` / `Ok(false)`); storage
/// failures come back as `sqlx::Error` for the caller to handle.
#[async_trait]
pub trait Dao<E: Entity>: Send + Sync {
    /// Find a row by id.
    async fn find(&self, id: DbId) -> Result<Option<E>, sqlx::Error>;

    /// List matching rows, ordered by id ascending.
    async fn list(&self, filter: &E::Filter) -> Result<Vec<E>, sqlx::Error>;

    /// Insert a row and return its storage-assigned id.
    async fn insert(&self, input: &E::Create) -> Result<DbId, sqlx::Error>;

    /// Apply `patch` to the row. Returns `false` if no row has that id.
    async fn update(&self, id: DbId, patch: &E::Patch) -> Result<bool, sqlx::Error>;
}

// ---------------------------------------------------------------------------
// Server-only field stripping
// ---------------------------------------------------------------------------

/// Projection of an entity onto the shape allowed across the API boundary.
///
/// Implementations must be total and pure. Public shapes implement this as
/// the identity so stripping twice equals stripping once.
pub trait StripServerData {
    type Public;

    fn strip_server_data(&self) -> Self::Public;
}
