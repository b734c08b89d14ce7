use async_trait::async_trait;
use diesel::prelude::*;
use diesel_async::pooled_connection::bb8::Pool;
use diesel_async::pooled_connection::AsyncDieselConnectionManager;
use diesel_async::{AnsiTransactionManager, AsyncPgConnection, RunQueryDsl, TransactionManager};
use tracing::debug;

use super::*;
use crate::schema::*;

pub type DbPool = Pool<AsyncPgConnection>;

type PooledConn = bb8::PooledConnection<'static, AsyncDieselConnectionManager<AsyncPgConnection>>;

/// Postgres-backed ledger. Allocation reads take row locks (`FOR UPDATE`),
/// so concurrent reservations on the same product serialize on the
/// `stored_products` rows they read.
#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

/// A transaction pinned to one pooled connection for its whole lifetime.
pub struct PgTransaction {
    conn: PooledConn,
}

#[async_trait]
impl TransactionalStore for PgStore {
    type Tx = PgTransaction;

    async fn begin(&self) -> LedgerResult<PgTransaction> {
        let mut conn = self
            .pool
            .get_owned()
            .await
            .map_err(|e| LedgerError::Pool(e.to_string()))?;
        <AnsiTransactionManager as TransactionManager<AsyncPgConnection>>::begin_transaction(&mut *conn).await?;
        debug!("transaction started");
        Ok(PgTransaction { conn })
    }
}

#[async_trait]
impl Transaction for PgTransaction {
    async fn commit(mut self) -> LedgerResult<()> {
        <AnsiTransactionManager as TransactionManager<AsyncPgConnection>>::commit_transaction(&mut *self.conn).await?;
        debug!("transaction committed");
        Ok(())
    }

    async fn rollback(mut self) -> LedgerResult<()> {
        <AnsiTransactionManager as TransactionManager<AsyncPgConnection>>::rollback_transaction(&mut *self.conn).await?;
        debug!("transaction rolled back");
        Ok(())
    }
}

#[async_trait]
impl StorageRepository for PgTransaction {
    async fn create_storages(&mut self, rows: Vec<NewStorage>) -> LedgerResult<Vec<Storage>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let mut created = diesel::insert_into(storages::table)
            .values(&rows)
            .get_results::<Storage>(&mut *self.conn)
            .await?;
        // ids come from a sequence, so id order is insertion order
        created.sort_by_key(|s| s.id);
        Ok(created)
    }

    async fn get_storage(&mut self, id: Id) -> LedgerResult<Option<Storage>> {
        let storage = storages::table
            .find(id)
            .first::<Storage>(&mut *self.conn)
            .await
            .optional()?;
        Ok(storage)
    }
}

#[async_trait]
impl ProductRepository for PgTransaction {
    async fn create_products(&mut self, rows: Vec<NewProduct>) -> LedgerResult<Vec<Product>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let mut created = diesel::insert_into(products::table)
            .values(&rows)
            .get_results::<Product>(&mut *self.conn)
            .await?;
        created.sort_by_key(|p| p.id);
        Ok(created)
    }

    async fn get_products(&mut self, ids: &[Id]) -> LedgerResult<Vec<Product>> {
        let found = products::table
            .filter(products::id.eq_any(ids))
            .order(products::id.asc())
            .load::<Product>(&mut *self.conn)
            .await?;
        Ok(found)
    }
}

#[async_trait]
impl StoredProductRepository for PgTransaction {
    async fn create_stored_products(&mut self, rows: Vec<NewStoredProduct>) -> LedgerResult<Vec<StoredProduct>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let created = diesel::insert_into(stored_products::table)
            .values(&rows)
            .get_results::<StoredProduct>(&mut *self.conn)
            .await?;
        Ok(created)
    }

    async fn stored_by_products(&mut self, product_ids: &[Id]) -> LedgerResult<Vec<StoredProduct>> {
        let rows = stored_products::table
            .filter(stored_products::product_id.eq_any(product_ids))
            .order((stored_products::product_id.asc(), stored_products::storage_id.asc()))
            .for_update()
            .load::<StoredProduct>(&mut *self.conn)
            .await?;
        Ok(rows)
    }

    async fn stored_by_storages(&mut self, storage_ids: &[Id]) -> LedgerResult<Vec<StoredProduct>> {
        let rows = stored_products::table
            .filter(stored_products::storage_id.eq_any(storage_ids))
            .order((stored_products::storage_id.asc(), stored_products::product_id.asc()))
            .load::<StoredProduct>(&mut *self.conn)
            .await?;
        Ok(rows)
    }
}

#[async_trait]
impl ReservationRepository for PgTransaction {
    async fn reservations_by_products(&mut self, product_ids: &[Id]) -> LedgerResult<Vec<ProductReservation>> {
        let rows = product_reservations::table
            .filter(product_reservations::product_id.eq_any(product_ids))
            .order((product_reservations::product_id.asc(), product_reservations::storage_id.asc()))
            .for_update()
            .load::<ProductReservation>(&mut *self.conn)
            .await?;
        Ok(rows)
    }

    async fn reservations_by_storages(&mut self, storage_ids: &[Id]) -> LedgerResult<Vec<ProductReservation>> {
        let rows = product_reservations::table
            .filter(product_reservations::storage_id.eq_any(storage_ids))
            .order((product_reservations::storage_id.asc(), product_reservations::product_id.asc()))
            .load::<ProductReservation>(&mut *self.conn)
            .await?;
        Ok(rows)
    }

    async fn create_reservations(&mut self, rows: Vec<NewReservation>) -> LedgerResult<Vec<ProductReservation>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let created = diesel::insert_into(product_reservations::table)
            .values(&rows)
            .get_results::<ProductReservation>(&mut *self.conn)
            .await?;
        Ok(created)
    }

    async fn update_reservations(&mut self, rows: Vec<ReservationAmount>) -> LedgerResult<()> {
        for row in rows {
            let updated = diesel::update(product_reservations::table.find(row.id))
                .set(product_reservations::amount.eq(row.amount))
                .execute(&mut *self.conn)
                .await?;
            if updated != 1 {
                return Err(LedgerError::Rejected(format!("reservation {} vanished during update", row.id)));
            }
        }
        Ok(())
    }

    async fn delete_reservations(&mut self, ids: Vec<Id>) -> LedgerResult<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let deleted = diesel::delete(product_reservations::table.filter(product_reservations::id.eq_any(&ids)))
            .execute(&mut *self.conn)
            .await?;
        if deleted != ids.len() {
            return Err(LedgerError::Rejected(format!(
                "expected to delete {} reservations, deleted {}",
                ids.len(),
                deleted
            )));
        }
        Ok(())
    }
}
