#![allow(dead_code)]

use std::time::Duration;

use storage_service::ledger::memory::{LedgerState, MemoryStore};
use storage_service::ledger::*;
use storage_service::models::*;
use tokio::time::Instant;

pub struct Layout {
    pub storages: Vec<Id>,
    pub products: Vec<Id>,
}

/// `stock[p][s]` is the (stored, reserved) pair of product `p` at storage `s`.
pub async fn seed(store: &MemoryStore, stock: &[&[(i64, i64)]]) -> Layout {
    let storage_count = stock.iter().map(|p| p.len()).max().unwrap_or(0);
    let mut tx = store.begin().await.unwrap();

    let storages: Vec<Id> = tx
        .create_storages((0..storage_count).map(|_| NewStorage { is_available: true }).collect())
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.id)
        .collect();
    let products: Vec<Id> = tx
        .create_products(
            (0..stock.len())
                .map(|i| NewProduct {
                    name: format!("product-{i}"),
                    vendor: format!("V-{i}"),
                    size: "M".to_string(),
                })
                .collect(),
        )
        .await
        .unwrap()
        .into_iter()
        .map(|p| p.id)
        .collect();

    let mut stored = Vec::new();
    let mut reserved = Vec::new();
    for (p, slots) in stock.iter().enumerate() {
        for (s, &(amount, taken)) in slots.iter().enumerate() {
            stored.push(NewStoredProduct {
                storage_id: storages[s],
                product_id: products[p],
                amount,
            });
            if taken > 0 {
                reserved.push(NewReservation {
                    storage_id: storages[s],
                    product_id: products[p],
                    amount: taken,
                });
            }
        }
    }
    tx.create_stored_products(stored).await.unwrap();
    tx.create_reservations(reserved).await.unwrap();
    tx.commit().await.unwrap();

    Layout { storages, products }
}

pub fn deadline() -> Instant {
    Instant::now() + Duration::from_secs(5)
}

/// Every reservation stays within the stock it draws from.
pub fn assert_capacity_invariant(state: &LedgerState) {
    for s in state.stored.values() {
        let reserved = state.reserved(s.storage_id, s.product_id);
        assert!(
            (0..=s.amount).contains(&reserved),
            "storage {} reserves {} of product {} but stores {}",
            s.storage_id,
            reserved,
            s.product_id,
            s.amount
        );
    }
}
