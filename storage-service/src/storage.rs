use std::collections::{HashMap, HashSet};

use shared::{ProductView, StorageGroup, StorageView};
use tokio::time::Instant;
use tracing::info;

use crate::error::{ServiceError, ServiceResult, ValidationError};
use crate::grouping::{first_duplicate, group_by, unique_ids};
use crate::ledger::{Ledger, TransactionalStore};
use crate::models::*;
use crate::unit_of_work::{within, UnitOfWork};

const MAX_VENDOR_LEN: usize = 20;

/// Warehouse intake (storages, products, initial stock) and per-storage views.
pub struct StorageService<S> {
    store: S,
}

impl<S: TransactionalStore> StorageService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub async fn define_schema(
        &self,
        groups: &[StorageGroup],
        deadline: Instant,
        outer: Option<&mut S::Tx>,
    ) -> ServiceResult<Vec<StorageView>> {
        validate_schema(groups)?;
        let mut uow = within(deadline, async move {
            UnitOfWork::open(&self.store, outer)
                .await
                .map_err(ServiceError::from)
        })
        .await?;
        let outcome = within(deadline, define_in(uow.ledger(), groups)).await;
        uow.finish(outcome).await
    }

    /// Products of an available storage with their free (unreserved) amounts.
    pub async fn unreserved_storage(
        &self,
        storage_id: Id,
        deadline: Instant,
        outer: Option<&mut S::Tx>,
    ) -> ServiceResult<StorageView> {
        let mut uow = within(deadline, async move {
            UnitOfWork::open(&self.store, outer)
                .await
                .map_err(ServiceError::from)
        })
        .await?;
        let outcome = within(deadline, unreserved_in(uow.ledger(), storage_id)).await;
        uow.finish(outcome).await
    }
}

pub fn validate_schema(groups: &[StorageGroup]) -> Result<(), ValidationError> {
    if groups.is_empty() {
        return Err(ValidationError::Empty);
    }
    for group in groups {
        for p in &group.products {
            if p.vendor.chars().count() > MAX_VENDOR_LEN {
                return Err(ValidationError::VendorTooLong(p.vendor.clone()));
            }
            if p.amount <= 0 {
                return Err(ValidationError::NonPositiveStock(p.vendor.clone()));
            }
        }
        if let Some(vendor) = first_duplicate(&group.products, |p| p.vendor.clone()) {
            return Err(ValidationError::DuplicateVendor(vendor));
        }
    }
    Ok(())
}

async fn define_in<L: Ledger>(ledger: &mut L, groups: &[StorageGroup]) -> ServiceResult<Vec<StorageView>> {
    let storages = ledger
        .create_storages(
            groups
                .iter()
                .map(|g| NewStorage { is_available: g.is_available })
                .collect(),
        )
        .await?;
    if storages.len() != groups.len() {
        return Err(ServiceError::Consistency(format!(
            "created {} storages for {} groups",
            storages.len(),
            groups.len()
        )));
    }

    // one catalog entry per vendor; the first occurrence names it
    let mut seen = HashSet::new();
    let products = ledger
        .create_products(
            groups
                .iter()
                .flat_map(|g| g.products.iter())
                .filter(|p| seen.insert(p.vendor.as_str()))
                .map(|p| NewProduct {
                    name: p.name.clone(),
                    vendor: p.vendor.clone(),
                    size: p.size.clone(),
                })
                .collect(),
        )
        .await?;
    let by_vendor: HashMap<&str, &Product> = products.iter().map(|p| (p.vendor.as_str(), p)).collect();

    let mut stock = Vec::new();
    let mut views = Vec::with_capacity(groups.len());
    for (group, storage) in groups.iter().zip(&storages) {
        let mut view = StorageView {
            id: storage.id,
            is_available: storage.is_available,
            products: Vec::with_capacity(group.products.len()),
        };
        for p in &group.products {
            let product = by_vendor.get(p.vendor.as_str()).ok_or_else(|| {
                ServiceError::Consistency(format!("product with vendor {:?} was not created", p.vendor))
            })?;
            stock.push(NewStoredProduct {
                storage_id: storage.id,
                product_id: product.id,
                amount: p.amount,
            });
            view.products.push(ProductView {
                id: product.id,
                name: product.name.clone(),
                vendor: product.vendor.clone(),
                size: product.size.clone(),
                amount: p.amount,
            });
        }
        views.push(view);
    }
    ledger.create_stored_products(stock).await?;

    info!(
        "Defined {} storages holding {} products",
        storages.len(),
        products.len()
    );
    Ok(views)
}

async fn unreserved_in<L: Ledger>(ledger: &mut L, storage_id: Id) -> ServiceResult<StorageView> {
    let storage = ledger
        .get_storage(storage_id)
        .await?
        .ok_or(ServiceError::StorageNotFound(storage_id))?;
    if !storage.is_available {
        return Err(ServiceError::StorageUnavailable(storage_id));
    }

    let stored = ledger.stored_by_storages(&[storage_id]).await?;
    let reservations = group_by(
        ledger.reservations_by_storages(&[storage_id]).await?,
        |r| r.product_id,
    );
    let products: HashMap<Id, Product> = ledger
        .get_products(&unique_ids(&stored, |s| s.product_id))
        .await?
        .into_iter()
        .map(|p| (p.id, p))
        .collect();

    let mut view = StorageView {
        id: storage.id,
        is_available: storage.is_available,
        products: Vec::with_capacity(stored.len()),
    };
    for s in &stored {
        let product = products.get(&s.product_id).ok_or_else(|| {
            ServiceError::Consistency(format!("stored product {} has no catalog entry", s.product_id))
        })?;
        let reserved: i64 = reservations
            .get(&s.product_id)
            .map_or(0, |rows| rows.iter().map(|r| r.amount).sum());
        view.products.push(ProductView {
            id: product.id,
            name: product.name.clone(),
            vendor: product.vendor.clone(),
            size: product.size.clone(),
            amount: s.amount - reserved,
        });
    }
    Ok(view)
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::StockedProduct;

    fn group(is_available: bool, products: Vec<StockedProduct>) -> StorageGroup {
        StorageGroup { is_available, products }
    }

    #[test]
    fn accepts_unique_vendors() {
        let groups = vec![
            group(true, vec![StockedProduct::new("A-1", "Bolt", "M8", 10)]),
            group(false, vec![StockedProduct::new("A-2", "Nut", "M8", 3)]),
        ];
        assert_eq!(validate_schema(&groups), Ok(()));
    }

    #[test]
    fn accepts_vendor_shared_between_groups() {
        let groups = vec![
            group(true, vec![StockedProduct::new("A-1", "Bolt", "M8", 10)]),
            group(true, vec![StockedProduct::new("A-1", "Bolt", "M8", 2)]),
        ];
        assert_eq!(validate_schema(&groups), Ok(()));
    }

    #[test]
    fn rejects_vendor_repeated_within_group() {
        let groups = vec![
            group(true, vec![StockedProduct::new("A-2", "Nut", "M8", 1)]),
            group(
                true,
                vec![
                    StockedProduct::new("A-1", "Bolt", "M8", 10),
                    StockedProduct::new("A-1", "Bolt", "M8", 2),
                ],
            ),
        ];
        assert_eq!(
            validate_schema(&groups),
            Err(ValidationError::DuplicateVendor("A-1".to_string()))
        );
    }

    #[test]
    fn rejects_zero_stock() {
        let groups = vec![group(true, vec![StockedProduct::new("A-1", "Bolt", "M8", 0)])];
        assert_eq!(
            validate_schema(&groups),
            Err(ValidationError::NonPositiveStock("A-1".to_string()))
        );
    }

    #[test]
    fn rejects_long_vendor() {
        let vendor = "V".repeat(21);
        let groups = vec![group(true, vec![StockedProduct::new(vendor.clone(), "Bolt", "M8", 1)])];
        assert_eq!(validate_schema(&groups), Err(ValidationError::VendorTooLong(vendor)));
    }

    #[test]
    fn rejects_empty_schema() {
        assert_eq!(validate_schema(&[]), Err(ValidationError::Empty));
    }
}
