//! Persistence layer for the oncology registry backend.
//!
//! This crate contains:
//! - Database connection management
//! - Entity definitions (database row mappings)
//! - Repository implementations backing the domain ledger and case store
//! - Database metrics helpers

pub mod db;
pub mod entities;
pub mod metrics;
pub mod repositories;
