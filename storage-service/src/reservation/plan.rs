//! Pure allocation planning: no I/O happens here.
//!
//! Reserve drains the storages with the most free stock first; release
//! drains the storages with the least free stock (the most reserved) first.
//! Equal free amounts are ordered by ascending storage id in both directions.

use std::cmp::Ordering;
use std::collections::HashMap;

use shared::ProductAmount;

use crate::error::{ServiceError, ServiceResult};
use crate::grouping::group_by;
use crate::ledger::Ledger;
use crate::models::*;

/// Stored and reserved rows for a set of products, grouped by product id.
#[derive(Debug, Default)]
pub struct LedgerView {
    stored: HashMap<Id, Vec<StoredProduct>>,
    reservations: HashMap<Id, Vec<ProductReservation>>,
}

/// Stock of one product at one storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    pub storage_id: Id,
    pub product_id: Id,
    pub stored: i64,
    pub reserved: i64,
}

impl Slot {
    pub fn free(&self) -> i64 {
        self.stored - self.reserved
    }
}

/// Amount to add to (reserve) or remove from (release) one storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allocation {
    pub storage_id: Id,
    pub product_id: Id,
    pub amount: i64,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ReservationChanges {
    pub inserts: Vec<NewReservation>,
    pub updates: Vec<ReservationAmount>,
    pub deletes: Vec<Id>,
}

impl ReservationChanges {
    pub fn is_empty(&self) -> bool {
        self.inserts.is_empty() && self.updates.is_empty() && self.deletes.is_empty()
    }
}

impl LedgerView {
    pub fn new(stored: Vec<StoredProduct>, reservations: Vec<ProductReservation>) -> Self {
        Self {
            stored: group_by(stored, |s| s.product_id),
            reservations: group_by(reservations, |r| r.product_id),
        }
    }

    pub async fn load<L: Ledger>(ledger: &mut L, product_ids: &[Id]) -> ServiceResult<Self> {
        let stored = ledger.stored_by_products(product_ids).await?;
        let reservations = ledger.reservations_by_products(product_ids).await?;
        Ok(Self::new(stored, reservations))
    }

    pub fn reservation(&self, storage_id: Id, product_id: Id) -> Option<&ProductReservation> {
        self.reservations
            .get(&product_id)
            .and_then(|rows| rows.iter().find(|r| r.storage_id == storage_id))
    }

    fn stored_amount(&self, storage_id: Id, product_id: Id) -> Option<i64> {
        self.stored
            .get(&product_id)
            .and_then(|rows| rows.iter().find(|s| s.storage_id == storage_id))
            .map(|s| s.amount)
    }

    /// Every storage holding `product_id`, with its reserved amount.
    pub fn slots(&self, product_id: Id) -> ServiceResult<Vec<Slot>> {
        let stored = match self.stored.get(&product_id) {
            Some(rows) if !rows.is_empty() => rows,
            _ => return Err(ServiceError::ProductNotFound(product_id)),
        };
        stored
            .iter()
            .map(|s| {
                let reserved = self.reservation(s.storage_id, product_id).map_or(0, |r| r.amount);
                let slot = Slot {
                    storage_id: s.storage_id,
                    product_id,
                    stored: s.amount,
                    reserved,
                };
                if slot.free() < 0 || reserved < 0 {
                    return Err(ServiceError::Consistency(format!(
                        "storage {} reserves {} of product {} but stores {}",
                        s.storage_id, reserved, product_id, s.amount
                    )));
                }
                Ok(slot)
            })
            .collect()
    }
}

/// Sum of non-negative amounts, clamped at `i64::MAX`. A clamped total still
/// exceeds any valid request, so capacity checks stay correct.
fn saturating_total(amounts: impl Iterator<Item = i64>) -> i64 {
    amounts.fold(0, i64::saturating_add)
}

fn most_free_first(a: &Slot, b: &Slot) -> Ordering {
    b.free().cmp(&a.free()).then(a.storage_id.cmp(&b.storage_id))
}

fn least_free_first(a: &Slot, b: &Slot) -> Ordering {
    a.free().cmp(&b.free()).then(a.storage_id.cmp(&b.storage_id))
}

/// Greedy placement of every requested amount. Capacity is checked for the
/// whole request before anything is allocated.
pub fn plan_reserve(view: &LedgerView, items: &[ProductAmount]) -> ServiceResult<Vec<Allocation>> {
    let mut candidates = Vec::with_capacity(items.len());
    for item in items {
        let slots = view.slots(item.id)?;
        let available = saturating_total(slots.iter().map(Slot::free));
        if available < item.amount {
            return Err(ServiceError::InsufficientCapacity {
                product_id: item.id,
                requested: item.amount,
                available,
            });
        }
        candidates.push((item, slots));
    }

    let mut allocations = Vec::new();
    for (item, mut slots) in candidates {
        slots.sort_by(most_free_first);
        take_greedily(&slots, item.amount, Slot::free, &mut allocations);
    }
    Ok(allocations)
}

/// Greedy removal of every requested amount from existing reservations.
pub fn plan_release(view: &LedgerView, items: &[ProductAmount]) -> ServiceResult<Vec<Allocation>> {
    let mut candidates = Vec::with_capacity(items.len());
    for item in items {
        let slots = view.slots(item.id)?;
        let reserved = saturating_total(slots.iter().map(|s| s.reserved));
        if reserved < item.amount {
            return Err(ServiceError::OverRelease {
                product_id: item.id,
                requested: item.amount,
                reserved,
            });
        }
        candidates.push((item, slots));
    }

    let mut allocations = Vec::new();
    for (item, mut slots) in candidates {
        slots.sort_by(least_free_first);
        take_greedily(&slots, item.amount, |s| s.reserved, &mut allocations);
    }
    Ok(allocations)
}

fn take_greedily(slots: &[Slot], amount: i64, capacity: impl Fn(&Slot) -> i64, out: &mut Vec<Allocation>) {
    let mut remaining = amount;
    for slot in slots {
        if remaining == 0 {
            break;
        }
        let take = remaining.min(capacity(slot));
        if take <= 0 {
            continue;
        }
        out.push(Allocation {
            storage_id: slot.storage_id,
            product_id: slot.product_id,
            amount: take,
        });
        remaining -= take;
    }
}

/// Existing rows are incremented, missing rows are inserted.
pub fn changes_for_reserve(view: &LedgerView, allocations: &[Allocation]) -> ServiceResult<ReservationChanges> {
    let mut changes = ReservationChanges::default();
    for a in allocations {
        let stored = view.stored_amount(a.storage_id, a.product_id).ok_or_else(|| {
            ServiceError::Consistency(format!(
                "allocation targets storage {} which does not hold product {}",
                a.storage_id, a.product_id
            ))
        })?;
        let new_amount = match view.reservation(a.storage_id, a.product_id) {
            Some(existing) => {
                let amount = existing.amount + a.amount;
                changes.updates.push(ReservationAmount { id: existing.id, amount });
                amount
            }
            None => {
                changes.inserts.push(NewReservation {
                    storage_id: a.storage_id,
                    product_id: a.product_id,
                    amount: a.amount,
                });
                a.amount
            }
        };
        if new_amount > stored {
            return Err(ServiceError::Consistency(format!(
                "reserving {} of product {} at storage {} exceeds stored {}",
                new_amount, a.product_id, a.storage_id, stored
            )));
        }
    }
    Ok(changes)
}

/// Rows released in full are deleted, the rest are decremented.
pub fn changes_for_release(view: &LedgerView, allocations: &[Allocation]) -> ServiceResult<ReservationChanges> {
    let mut changes = ReservationChanges::default();
    for a in allocations {
        let existing = view.reservation(a.storage_id, a.product_id).ok_or_else(|| {
            ServiceError::Consistency(format!(
                "release targets missing reservation of product {} at storage {}",
                a.product_id, a.storage_id
            ))
        })?;
        match existing.amount.cmp(&a.amount) {
            Ordering::Equal => changes.deletes.push(existing.id),
            Ordering::Greater => changes.updates.push(ReservationAmount {
                id: existing.id,
                amount: existing.amount - a.amount,
            }),
            Ordering::Less => {
                return Err(ServiceError::Consistency(format!(
                    "releasing {} of product {} at storage {} exceeds reserved {}",
                    a.amount, a.product_id, a.storage_id, existing.amount
                )));
            }
        }
    }
    Ok(changes)
}
