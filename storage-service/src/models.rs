use diesel::prelude::*;
use serde::{Deserialize, Serialize};

/// Primary key of every ledger table.
pub type Id = i64;

#[derive(Debug, Clone, PartialEq, Eq, Queryable, Identifiable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::storages)]
pub struct Storage {
    pub id: Id,
    pub is_available: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Insertable)]
#[diesel(table_name = crate::schema::storages)]
pub struct NewStorage {
    pub is_available: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Queryable, Identifiable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::products)]
pub struct Product {
    pub id: Id,
    pub name: String,
    pub vendor: String,
    pub size: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Insertable)]
#[diesel(table_name = crate::schema::products)]
pub struct NewProduct {
    pub name: String,
    pub vendor: String,
    pub size: String,
}

/// Physical quantity of a product held at a storage.
#[derive(Debug, Clone, PartialEq, Eq, Queryable, Identifiable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::stored_products)]
pub struct StoredProduct {
    pub id: Id,
    pub storage_id: Id,
    pub product_id: Id,
    pub amount: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Insertable)]
#[diesel(table_name = crate::schema::stored_products)]
pub struct NewStoredProduct {
    pub storage_id: Id,
    pub product_id: Id,
    pub amount: i64,
}

/// Quantity of a product at a storage that is currently committed.
#[derive(Debug, Clone, PartialEq, Eq, Queryable, Identifiable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::product_reservations)]
pub struct ProductReservation {
    pub id: Id,
    pub storage_id: Id,
    pub product_id: Id,
    pub amount: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Insertable)]
#[diesel(table_name = crate::schema::product_reservations)]
pub struct NewReservation {
    pub storage_id: Id,
    pub product_id: Id,
    pub amount: i64,
}

/// New absolute amount for an existing reservation row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReservationAmount {
    pub id: Id,
    pub amount: i64,
}
