//! Shared utilities and common types for Onco Registry backend.
//!
//! This crate provides common functionality used across all other crates:
//! - Checksum utilities for uploaded files
//! - Common validation logic for case record fields

pub mod checksum;
pub mod validation;
