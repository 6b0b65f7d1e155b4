//! # Local Voices Common Library
//!
//! Shared code for the Local Voices admin services including:
//! - Region and business models
//! - Database initialization and schema
//! - Configuration loading and root folder resolution
//! - Utility functions

pub mod config;
pub mod db;
pub mod error;
pub mod time;
pub mod uuid_utils;

pub use db::models::{Business, BusinessStatus, Region, RegionType};
pub use error::{Error, Result};
