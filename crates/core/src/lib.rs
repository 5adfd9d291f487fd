//! Verdant Organics Core - Shared types and pure storefront logic.
//!
//! This crate provides common types used across all Verdant components:
//! - `storefront` - Public-facing shop
//! - `admin` - Internal administration panel
//! - `cli` - Command-line tools for migrations and catalog management
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no HTTP
//! clients. The hosted backend re-validates everything computed here; these
//! functions exist so the storefront can show accurate carts and totals
//! before the round trip.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for IDs, prices, emails, slugs, and statuses
//! - [`cart`] - Cart merging and reconciliation against live stock
//! - [`pricing`] - Coupon evaluation, shipping, and order totals

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cart;
pub mod pricing;
pub mod types;

pub use types::*;
