//! PostgreSQL-backed [`Dao`].

use std::marker::PhantomData;

use async_trait::async_trait;
use genpic_core::types::DbId;
use sqlx::{PgPool, QueryBuilder};

use super::{Dao, Entity};

/// Provides CRUD operations for any [`Entity`] against its table.
pub struct PgDao<E> {
    pool: PgPool,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> PgDao<E> {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            _entity: PhantomData,
        }
    }
}

impl<E> Clone for PgDao<E> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            _entity: PhantomData,
        }
    }
}

#[async_trait]
impl<E: Entity> Dao<E> for PgDao<E> {
    async fn find(&self, id: DbId) -> Result<Option<E>, sqlx::Error> {
        let query = format!(
            "SELECT {} FROM \"{}\" WHERE id = $1",
            E::COLUMNS,
            E::TABLE
        );
        sqlx::query_as::<_, E>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn list(&self, filter: &E::Filter) -> Result<Vec<E>, sqlx::Error> {
        let mut qb = QueryBuilder::new(format!(
            "SELECT {} FROM \"{}\" WHERE TRUE",
            E::COLUMNS,
            E::TABLE
        ));
        E::push_filter(&mut qb, filter);
        qb.push(" ORDER BY id ASC");
        qb.build_query_as::<E>().fetch_all(&self.pool).await
    }

    async fn insert(&self, input: &E::Create) -> Result<DbId, sqlx::Error> {
        let mut qb = QueryBuilder::new(format!("INSERT INTO \"{}\" ", E::TABLE));
        E::push_insert(&mut qb, input);
        qb.push(" RETURNING id");
        qb.build_query_scalar::<DbId>().fetch_one(&self.pool).await
    }

    async fn update(&self, id: DbId, patch: &E::Patch) -> Result<bool, sqlx::Error> {
        let mut qb = QueryBuilder::new(format!("UPDATE \"{}\" SET ", E::TABLE));
        E::push_patch(&mut qb, patch);
        qb.push(" WHERE id = ");
        qb.push_bind(id);
        let result = qb.build().execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }
}
