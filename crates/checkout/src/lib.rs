//! Cartwheel checkout engine.
//!
//! Keeps a cart's selected lines, the shipping destination, a carrier-quoted
//! shipping fee, an optional discount and the order total consistent while the
//! buyer edits any of them, then drives order submission through cash on
//! delivery or an external payment gateway.
//!
//! # Architecture
//!
//! - [`location`] - TTL cache of province/district/ward reference data with
//!   request coalescing (`moka`)
//! - [`address`] - Saved-address CRUD, single-default invariant, display names
//! - [`cart`] - Selected cart lines with optimistic quantity updates
//! - [`pricing`] - Serialized subtotal/discount/shipping/total recomputation
//! - [`order`] - Submission state machine with gateway redirects
//! - [`session`] - One buyer's checkout, wiring the pieces together
//! - [`api`] - `reqwest` client implementing every remote service trait
//!
//! Remote collaborators are reached through the service traits defined next to
//! their consumers, so every component takes its dependencies through its
//! constructor.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod address;
pub mod api;
pub mod cart;
pub mod config;
pub mod error;
pub mod location;
pub mod notice;
pub mod order;
pub mod pricing;
pub mod session;

#[cfg(test)]
mod testing;

pub use error::{CheckoutError, Field, Rejection, Result, ValidationError};
pub use notice::{Notice, NoticeLevel};
pub use session::{CheckoutDeps, CheckoutMode, CheckoutSession, Customer};
