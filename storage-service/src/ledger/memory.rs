//! In-process ledger with the same transactional contract as the Postgres one.
//!
//! The whole ledger sits behind one async mutex. A transaction holds the
//! owned guard for its lifetime, so transactions are fully serialized, and it
//! mutates a private copy that only replaces the shared state on commit.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::debug;

use super::*;

/// Write operations that can be made to fail via [`MemoryStore::fail_on`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOp {
    CreateStorages,
    CreateProducts,
    CreateStoredProducts,
    CreateReservations,
    UpdateReservations,
    DeleteReservations,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerState {
    pub storages: BTreeMap<Id, Storage>,
    pub products: BTreeMap<Id, Product>,
    pub stored: BTreeMap<Id, StoredProduct>,
    pub reservations: BTreeMap<Id, ProductReservation>,
    next_id: Id,
}

impl LedgerState {
    fn next_id(&mut self) -> Id {
        self.next_id += 1;
        self.next_id
    }

    /// Reserved amount for (storage, product), 0 when no row exists.
    pub fn reserved(&self, storage_id: Id, product_id: Id) -> i64 {
        self.reservations
            .values()
            .find(|r| r.storage_id == storage_id && r.product_id == product_id)
            .map_or(0, |r| r.amount)
    }

    pub fn total_reserved(&self, product_id: Id) -> i64 {
        self.reservations
            .values()
            .filter(|r| r.product_id == product_id)
            .map(|r| r.amount)
            .sum()
    }
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<AsyncMutex<LedgerState>>,
    fail_on: Arc<Mutex<Option<WriteOp>>>,
    stall_on: Arc<Mutex<Option<(WriteOp, Duration)>>>,
    begun: Arc<Mutex<usize>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `op` fail with [`LedgerError::Rejected`].
    pub fn fail_on(&self, op: WriteOp) {
        if let Ok(mut slot) = self.fail_on.lock() {
            *slot = Some(op);
        }
    }

    /// Makes the next `op` sleep for `delay` before it writes.
    pub fn stall_on(&self, op: WriteOp, delay: Duration) {
        if let Ok(mut slot) = self.stall_on.lock() {
            *slot = Some((op, delay));
        }
    }

    /// Committed state. Waits for any open transaction to finish.
    pub async fn snapshot(&self) -> LedgerState {
        self.state.lock().await.clone()
    }

    /// Number of transactions begun so far.
    pub fn transactions_begun(&self) -> usize {
        self.begun.lock().map_or(0, |n| *n)
    }
}

pub struct MemoryTransaction {
    guard: OwnedMutexGuard<LedgerState>,
    working: LedgerState,
    fail_on: Arc<Mutex<Option<WriteOp>>>,
    stall_on: Arc<Mutex<Option<(WriteOp, Duration)>>>,
}

impl MemoryTransaction {
    fn check(&self, op: WriteOp) -> LedgerResult<()> {
        let mut slot = self
            .fail_on
            .lock()
            .map_err(|_| LedgerError::Rejected("fault injection lock poisoned".to_string()))?;
        if *slot == Some(op) {
            *slot = None;
            return Err(LedgerError::Rejected(format!("{:?} failed", op)));
        }
        Ok(())
    }

    fn take_stall(&self, op: WriteOp) -> Option<Duration> {
        let mut slot = self.stall_on.lock().ok()?;
        let (stalled, delay) = (*slot)?;
        if stalled != op {
            return None;
        }
        *slot = None;
        Some(delay)
    }

    async fn stall(&self, op: WriteOp) {
        if let Some(delay) = self.take_stall(op) {
            debug!("stalling {:?} for {:?}", op, delay);
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl TransactionalStore for MemoryStore {
    type Tx = MemoryTransaction;

    async fn begin(&self) -> LedgerResult<MemoryTransaction> {
        let guard = self.state.clone().lock_owned().await;
        if let Ok(mut n) = self.begun.lock() {
            *n += 1;
        }
        let working = guard.clone();
        Ok(MemoryTransaction {
            guard,
            working,
            fail_on: self.fail_on.clone(),
            stall_on: self.stall_on.clone(),
        })
    }
}

#[async_trait]
impl Transaction for MemoryTransaction {
    async fn commit(mut self) -> LedgerResult<()> {
        *self.guard = self.working;
        debug!("memory transaction committed");
        Ok(())
    }

    async fn rollback(self) -> LedgerResult<()> {
        debug!("memory transaction rolled back");
        Ok(())
    }
}

#[async_trait]
impl StorageRepository for MemoryTransaction {
    async fn create_storages(&mut self, rows: Vec<NewStorage>) -> LedgerResult<Vec<Storage>> {
        self.check(WriteOp::CreateStorages)?;
        self.stall(WriteOp::CreateStorages).await;
        let mut created = Vec::with_capacity(rows.len());
        for row in rows {
            let storage = Storage {
                id: self.working.next_id(),
                is_available: row.is_available,
            };
            self.working.storages.insert(storage.id, storage.clone());
            created.push(storage);
        }
        Ok(created)
    }

    async fn get_storage(&mut self, id: Id) -> LedgerResult<Option<Storage>> {
        Ok(self.working.storages.get(&id).cloned())
    }
}

#[async_trait]
impl ProductRepository for MemoryTransaction {
    async fn create_products(&mut self, rows: Vec<NewProduct>) -> LedgerResult<Vec<Product>> {
        self.check(WriteOp::CreateProducts)?;
        self.stall(WriteOp::CreateProducts).await;
        let mut created = Vec::with_capacity(rows.len());
        for row in rows {
            let product = Product {
                id: self.working.next_id(),
                name: row.name,
                vendor: row.vendor,
                size: row.size,
            };
            self.working.products.insert(product.id, product.clone());
            created.push(product);
        }
        Ok(created)
    }

    async fn get_products(&mut self, ids: &[Id]) -> LedgerResult<Vec<Product>> {
        Ok(self
            .working
            .products
            .values()
            .filter(|p| ids.contains(&p.id))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl StoredProductRepository for MemoryTransaction {
    async fn create_stored_products(&mut self, rows: Vec<NewStoredProduct>) -> LedgerResult<Vec<StoredProduct>> {
        self.check(WriteOp::CreateStoredProducts)?;
        self.stall(WriteOp::CreateStoredProducts).await;
        let mut created = Vec::with_capacity(rows.len());
        for row in rows {
            if row.amount < 0 {
                return Err(LedgerError::Rejected(format!("negative stored amount {}", row.amount)));
            }
            let duplicate = self
                .working
                .stored
                .values()
                .any(|s| s.storage_id == row.storage_id && s.product_id == row.product_id);
            if duplicate {
                return Err(LedgerError::Rejected(format!(
                    "product {} already stored at storage {}",
                    row.product_id, row.storage_id
                )));
            }
            let stored = StoredProduct {
                id: self.working.next_id(),
                storage_id: row.storage_id,
                product_id: row.product_id,
                amount: row.amount,
            };
            self.working.stored.insert(stored.id, stored.clone());
            created.push(stored);
        }
        Ok(created)
    }

    async fn stored_by_products(&mut self, product_ids: &[Id]) -> LedgerResult<Vec<StoredProduct>> {
        let mut rows: Vec<_> = self
            .working
            .stored
            .values()
            .filter(|s| product_ids.contains(&s.product_id))
            .cloned()
            .collect();
        rows.sort_by_key(|s| (s.product_id, s.storage_id));
        Ok(rows)
    }

    async fn stored_by_storages(&mut self, storage_ids: &[Id]) -> LedgerResult<Vec<StoredProduct>> {
        let mut rows: Vec<_> = self
            .working
            .stored
            .values()
            .filter(|s| storage_ids.contains(&s.storage_id))
            .cloned()
            .collect();
        rows.sort_by_key(|s| (s.storage_id, s.product_id));
        Ok(rows)
    }
}

#[async_trait]
impl ReservationRepository for MemoryTransaction {
    async fn reservations_by_products(&mut self, product_ids: &[Id]) -> LedgerResult<Vec<ProductReservation>> {
        let mut rows: Vec<_> = self
            .working
            .reservations
            .values()
            .filter(|r| product_ids.contains(&r.product_id))
            .cloned()
            .collect();
        rows.sort_by_key(|r| (r.product_id, r.storage_id));
        Ok(rows)
    }

    async fn reservations_by_storages(&mut self, storage_ids: &[Id]) -> LedgerResult<Vec<ProductReservation>> {
        let mut rows: Vec<_> = self
            .working
            .reservations
            .values()
            .filter(|r| storage_ids.contains(&r.storage_id))
            .cloned()
            .collect();
        rows.sort_by_key(|r| (r.storage_id, r.product_id));
        Ok(rows)
    }

    async fn create_reservations(&mut self, rows: Vec<NewReservation>) -> LedgerResult<Vec<ProductReservation>> {
        self.check(WriteOp::CreateReservations)?;
        self.stall(WriteOp::CreateReservations).await;
        let mut created = Vec::with_capacity(rows.len());
        for row in rows {
            if row.amount < 0 {
                return Err(LedgerError::Rejected(format!("negative reserved amount {}", row.amount)));
            }
            let duplicate = self
                .working
                .reservations
                .values()
                .any(|r| r.storage_id == row.storage_id && r.product_id == row.product_id);
            if duplicate {
                return Err(LedgerError::Rejected(format!(
                    "reservation for product {} at storage {} already exists",
                    row.product_id, row.storage_id
                )));
            }
            let reservation = ProductReservation {
                id: self.working.next_id(),
                storage_id: row.storage_id,
                product_id: row.product_id,
                amount: row.amount,
            };
            self.working.reservations.insert(reservation.id, reservation.clone());
            created.push(reservation);
        }
        Ok(created)
    }

    async fn update_reservations(&mut self, rows: Vec<ReservationAmount>) -> LedgerResult<()> {
        self.check(WriteOp::UpdateReservations)?;
        self.stall(WriteOp::UpdateReservations).await;
        for row in rows {
            if row.amount < 0 {
                return Err(LedgerError::Rejected(format!("negative reserved amount {}", row.amount)));
            }
            match self.working.reservations.get_mut(&row.id) {
                Some(existing) => existing.amount = row.amount,
                None => {
                    return Err(LedgerError::Rejected(format!("reservation {} vanished during update", row.id)));
                }
            }
        }
        Ok(())
    }

    async fn delete_reservations(&mut self, ids: Vec<Id>) -> LedgerResult<()> {
        self.check(WriteOp::DeleteReservations)?;
        self.stall(WriteOp::DeleteReservations).await;
        for id in ids {
            if self.working.reservations.remove(&id).is_none() {
                return Err(LedgerError::Rejected(format!("reservation {} vanished during delete", id)));
            }
        }
        Ok(())
    }
}
