pub mod plan;

use shared::ProductAmount;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::error::{ServiceError, ServiceResult, ValidationError};
use crate::grouping::{first_duplicate, unique_ids};
use crate::ledger::{Ledger, TransactionalStore};
use crate::models::Id;
use crate::unit_of_work::{within, UnitOfWork};

use self::plan::{changes_for_release, changes_for_reserve, plan_release, plan_reserve, LedgerView, ReservationChanges};

/// Reserves and releases product quantities across storages.
///
/// Holds no state between calls; mutual exclusion comes from the row locks
/// taken by the store when the allocation snapshot is read.
pub struct ReservationService<S> {
    store: S,
}

impl<S: TransactionalStore> ReservationService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Reserves every item or nothing. Joins `outer` when one is given.
    pub async fn reserve(
        &self,
        items: &[ProductAmount],
        deadline: Instant,
        outer: Option<&mut S::Tx>,
    ) -> ServiceResult<()> {
        validate_items(items)?;
        let mut uow = within(deadline, async move {
            UnitOfWork::open(&self.store, outer)
                .await
                .map_err(ServiceError::from)
        })
        .await?;
        let outcome = within(deadline, reserve_in(uow.ledger(), items)).await;
        uow.finish(outcome).await
    }

    /// Releases every item or nothing. Joins `outer` when one is given.
    pub async fn release(
        &self,
        items: &[ProductAmount],
        deadline: Instant,
        outer: Option<&mut S::Tx>,
    ) -> ServiceResult<()> {
        validate_items(items)?;
        let mut uow = within(deadline, async move {
            UnitOfWork::open(&self.store, outer)
                .await
                .map_err(ServiceError::from)
        })
        .await?;
        let outcome = within(deadline, release_in(uow.ledger(), items)).await;
        uow.finish(outcome).await
    }
}

/// Non-empty, positive amounts, each product at most once.
pub fn validate_items(items: &[ProductAmount]) -> Result<(), ValidationError> {
    if items.is_empty() {
        return Err(ValidationError::Empty);
    }
    if let Some(item) = items.iter().find(|i| i.amount <= 0) {
        return Err(ValidationError::NonPositiveAmount {
            product_id: item.id,
            amount: item.amount,
        });
    }
    if let Some(id) = first_duplicate(items, |i| i.id) {
        return Err(ValidationError::DuplicateProduct(id));
    }
    Ok(())
}

fn product_ids(items: &[ProductAmount]) -> Vec<Id> {
    unique_ids(items, |i| i.id)
}

async fn reserve_in<L: Ledger>(ledger: &mut L, items: &[ProductAmount]) -> ServiceResult<()> {
    let view = LedgerView::load(ledger, &product_ids(items)).await?;
    let allocations = plan_reserve(&view, items)?;
    let changes = changes_for_reserve(&view, &allocations)?;
    debug!(
        "Reserve plan: {} allocations, {} inserts, {} updates",
        allocations.len(),
        changes.inserts.len(),
        changes.updates.len()
    );
    apply(ledger, changes).await?;
    info!("Reserved {} products across {} storage slots", items.len(), allocations.len());
    Ok(())
}

async fn release_in<L: Ledger>(ledger: &mut L, items: &[ProductAmount]) -> ServiceResult<()> {
    let view = LedgerView::load(ledger, &product_ids(items)).await?;
    let allocations = plan_release(&view, items)?;
    let changes = changes_for_release(&view, &allocations)?;
    debug!(
        "Release plan: {} allocations, {} updates, {} deletes",
        allocations.len(),
        changes.updates.len(),
        changes.deletes.len()
    );
    apply(ledger, changes).await?;
    info!("Released {} products across {} storage slots", items.len(), allocations.len());
    Ok(())
}

async fn apply<L: Ledger>(ledger: &mut L, changes: ReservationChanges) -> ServiceResult<()> {
    if changes.is_empty() {
        return Err(ServiceError::Consistency("allocation produced no ledger changes".to_string()));
    }
    ledger.update_reservations(changes.updates).await?;
    ledger.create_reservations(changes.inserts).await?;
    ledger.delete_reservations(changes.deletes).await?;
    Ok(())
}
