//! HTTP API handlers for lv-transfer
//!
//! `/health` is open; everything under `/api/admin` sits behind the admin
//! allowlist.

pub mod auth;
pub mod health;
pub mod regions;
pub mod transfer;

pub use auth::AdminAuthLayer;
pub use health::health_routes;
pub use regions::region_routes;
pub use transfer::transfer_routes;
