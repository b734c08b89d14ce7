//! Ledger access, split into one repository trait per record kind.
//!
//! Every method takes `&mut self` on a transaction handle, so a repository
//! call can only happen inside an open transaction. `Ledger` is the aggregate
//! of the four sub-repositories and is implemented automatically.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;

use crate::error::LedgerError;
use crate::models::*;

pub type LedgerResult<T> = Result<T, LedgerError>;

#[async_trait]
pub trait StorageRepository: Send {
    /// Inserts storages and returns them in insertion order.
    async fn create_storages(&mut self, storages: Vec<NewStorage>) -> LedgerResult<Vec<Storage>>;

    async fn get_storage(&mut self, id: Id) -> LedgerResult<Option<Storage>>;
}

#[async_trait]
pub trait ProductRepository: Send {
    async fn create_products(&mut self, products: Vec<NewProduct>) -> LedgerResult<Vec<Product>>;

    async fn get_products(&mut self, ids: &[Id]) -> LedgerResult<Vec<Product>>;
}

#[async_trait]
pub trait StoredProductRepository: Send {
    async fn create_stored_products(&mut self, rows: Vec<NewStoredProduct>) -> LedgerResult<Vec<StoredProduct>>;

    /// Rows for the given products, locked for the rest of the transaction.
    async fn stored_by_products(&mut self, product_ids: &[Id]) -> LedgerResult<Vec<StoredProduct>>;

    async fn stored_by_storages(&mut self, storage_ids: &[Id]) -> LedgerResult<Vec<StoredProduct>>;
}

#[async_trait]
pub trait ReservationRepository: Send {
    /// Rows for the given products, locked for the rest of the transaction.
    async fn reservations_by_products(&mut self, product_ids: &[Id]) -> LedgerResult<Vec<ProductReservation>>;

    async fn reservations_by_storages(&mut self, storage_ids: &[Id]) -> LedgerResult<Vec<ProductReservation>>;

    async fn create_reservations(&mut self, rows: Vec<NewReservation>) -> LedgerResult<Vec<ProductReservation>>;

    async fn update_reservations(&mut self, rows: Vec<ReservationAmount>) -> LedgerResult<()>;

    async fn delete_reservations(&mut self, ids: Vec<Id>) -> LedgerResult<()>;
}

pub trait Ledger: StorageRepository + ProductRepository + StoredProductRepository + ReservationRepository {}

impl<T> Ledger for T where T: StorageRepository + ProductRepository + StoredProductRepository + ReservationRepository {}

/// An open transaction. Dropping it without `commit` discards its writes.
#[async_trait]
pub trait Transaction: Ledger + Sized {
    async fn commit(self) -> LedgerResult<()>;

    async fn rollback(self) -> LedgerResult<()>;
}

#[async_trait]
pub trait TransactionalStore: Send + Sync {
    type Tx: Transaction;

    async fn begin(&self) -> LedgerResult<Self::Tx>;
}
