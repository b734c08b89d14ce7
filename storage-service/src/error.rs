use thiserror::Error;

use crate::models::Id;

/// Failure at the transactional store boundary (begin, read, write, commit, rollback).
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("connection pool error: {0}")]
    Pool(String),

    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("ledger write rejected: {0}")]
    Rejected(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("request contains no items")]
    Empty,

    #[error("amount for product {product_id} must be positive (got {amount})")]
    NonPositiveAmount { product_id: Id, amount: i64 },

    #[error("product {0} appears more than once in the request")]
    DuplicateProduct(Id),

    #[error("stocked amount for vendor {0:?} must be positive")]
    NonPositiveStock(String),

    #[error("vendor {0:?} is longer than 20 characters")]
    VendorTooLong(String),

    #[error("vendor {0:?} appears more than once in a storage group")]
    DuplicateVendor(String),
}

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("no ledger entry for product {0}")]
    ProductNotFound(Id),

    #[error("storage {0} not found")]
    StorageNotFound(Id),

    #[error("storage {0} is not available")]
    StorageUnavailable(Id),

    #[error("cannot reserve {requested} of product {product_id}: only {available} free")]
    InsufficientCapacity {
        product_id: Id,
        requested: i64,
        available: i64,
    },

    #[error("cannot release {requested} of product {product_id}: only {reserved} reserved")]
    OverRelease {
        product_id: Id,
        requested: i64,
        reserved: i64,
    },

    #[error("ledger inconsistency: {0}")]
    Consistency(String),

    #[error("transaction failed: {0}")]
    Transaction(#[from] LedgerError),

    #[error("request deadline exceeded")]
    DeadlineExceeded,
}

pub type ServiceResult<T> = Result<T, ServiceError>;
