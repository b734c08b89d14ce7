//! Unit of work: one atomic transaction shared down a call chain.
//!
//! A caller that already holds an open transaction passes it as `outer` and
//! the unit of work joins it; nothing is begun, committed, or rolled back on
//! its behalf. Otherwise the unit of work owns a fresh transaction and
//! settles it in [`UnitOfWork::finish`].

use std::future::Future;

use tokio::time::{timeout_at, Instant};
use tracing::warn;

use crate::error::{LedgerError, ServiceError, ServiceResult};
use crate::ledger::{Transaction, TransactionalStore};

enum Scope<'s, Tx> {
    Owned(Tx),
    Joined(&'s mut Tx),
}

pub struct UnitOfWork<'s, Tx: Transaction> {
    scope: Scope<'s, Tx>,
}

impl<'s, Tx: Transaction> UnitOfWork<'s, Tx> {
    pub async fn open<S>(store: &S, outer: Option<&'s mut Tx>) -> Result<Self, LedgerError>
    where
        S: TransactionalStore<Tx = Tx>,
    {
        let scope = match outer {
            Some(tx) => Scope::Joined(tx),
            None => Scope::Owned(store.begin().await?),
        };
        Ok(Self { scope })
    }

    pub fn is_joined(&self) -> bool {
        matches!(self.scope, Scope::Joined(_))
    }

    pub fn ledger(&mut self) -> &mut Tx {
        match &mut self.scope {
            Scope::Owned(tx) => tx,
            Scope::Joined(tx) => &mut **tx,
        }
    }

    /// Commits an owned transaction on `Ok`, rolls it back on `Err`.
    ///
    /// The error from `outcome` is always the one returned; a failed rollback is
    /// only logged. A failed commit turns `Ok` into `Err`.
    pub async fn finish<T, E>(self, outcome: Result<T, E>) -> Result<T, E>
    where
        E: From<LedgerError> + std::fmt::Display,
    {
        let tx = match self.scope {
            Scope::Joined(_) => return outcome,
            Scope::Owned(tx) => tx,
        };
        match outcome {
            Ok(value) => {
                tx.commit().await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!("Rollback after \"{}\" failed: {}", err, rollback_err);
                }
                Err(err)
            }
        }
    }
}

/// Runs `work` against the deadline, mapping expiry to `DeadlineExceeded`.
pub async fn within<F, T>(deadline: Instant, work: F) -> ServiceResult<T>
where
    F: Future<Output = ServiceResult<T>>,
{
    timeout_at(deadline, work)
        .await
        .unwrap_or(Err(ServiceError::DeadlineExceeded))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::memory::{MemoryStore, WriteOp};
    use crate::ledger::StorageRepository;
    use crate::models::NewStorage;

    async fn add_storage(uow: &mut UnitOfWork<'_, crate::ledger::memory::MemoryTransaction>) -> ServiceResult<()> {
        uow.ledger()
            .create_storages(vec![NewStorage { is_available: true }])
            .await?;
        Ok(())
    }

    #[tokio::test]
    async fn owned_scope_commits_on_success() {
        let store = MemoryStore::new();
        let mut uow = UnitOfWork::open(&store, None).await.unwrap();
        let outcome = add_storage(&mut uow).await;
        uow.finish(outcome).await.unwrap();

        assert_eq!(store.snapshot().await.storages.len(), 1);
    }

    #[tokio::test]
    async fn owned_scope_rolls_back_and_keeps_error() {
        let store = MemoryStore::new();
        let mut uow = UnitOfWork::open(&store, None).await.unwrap();
        let outcome: ServiceResult<()> = add_storage(&mut uow)
            .await
            .and(Err(ServiceError::StorageNotFound(7)));
        let err = uow.finish(outcome).await.unwrap_err();

        assert!(matches!(err, ServiceError::StorageNotFound(7)));
        assert!(store.snapshot().await.storages.is_empty());
    }

    #[tokio::test]
    async fn joined_scope_leaves_settlement_to_owner() {
        let store = MemoryStore::new();
        let mut outer = store.begin().await.unwrap();
        {
            let mut inner = UnitOfWork::open(&store, Some(&mut outer)).await.unwrap();
            assert!(inner.is_joined());
            let outcome = add_storage(&mut inner).await;
            inner.finish(outcome).await.unwrap();
        }
        assert_eq!(store.transactions_begun(), 1);

        outer.rollback().await.unwrap();
        assert!(store.snapshot().await.storages.is_empty());
    }

    #[tokio::test]
    async fn failed_write_surfaces_as_transaction_error() {
        let store = MemoryStore::new();
        store.fail_on(WriteOp::CreateStorages);
        let mut uow = UnitOfWork::open(&store, None).await.unwrap();
        let outcome = add_storage(&mut uow).await;
        let err = uow.finish(outcome).await.unwrap_err();

        assert!(matches!(err, ServiceError::Transaction(LedgerError::Rejected(_))));
    }

    #[tokio::test]
    async fn expired_deadline_is_reported() {
        let deadline = Instant::now();
        let result: ServiceResult<()> = within(deadline, async {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            Ok(())
        })
        .await;

        assert!(matches!(result, Err(ServiceError::DeadlineExceeded)));
    }
}
