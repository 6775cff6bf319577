//! Repository layer for the destination store.
//!
//! All database access uses Diesel ORM. Supports both SQLite and PostgreSQL
//! backends.

pub mod context;
pub mod diesel_models;
pub mod diesel_store;
pub mod pool;
pub mod store;
pub mod util;

pub use context::DbContext;
pub use diesel_store::DieselStore;
pub use pool::{DbError, DbPool};
pub use store::{DestinationStore, StoreError, Upserted};
