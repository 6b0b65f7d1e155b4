//! Database access for lv-transfer
//!
//! Single-statement operations are generic over the sqlx executor so they
//! run equally against the pool, a pooled connection, or an open
//! transaction. Multi-statement operations take `&mut SqliteConnection`.

pub mod businesses;
pub mod regions;
