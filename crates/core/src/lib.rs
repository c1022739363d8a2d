//! Cartwheel Core - Shared domain types.
//!
//! This crate provides the types shared by the checkout engine and its
//! command-line front end:
//! - `checkout` - Checkout state-synchronization engine
//! - `cli` - Command-line driver for checkout sessions
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no HTTP clients, no caches.
//! This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for type-safe IDs, money, contact details,
//!   payment methods and location tiers

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
