pub mod api;
pub mod error;
pub mod grouping;
pub mod ledger;
pub mod models;
pub mod reservation;
pub mod schema;
pub mod storage;
pub mod unit_of_work;
