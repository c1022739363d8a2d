//! Core types for Cartwheel.
//!
//! This module provides type-safe wrappers for common checkout concepts.

pub mod contact;
pub mod id;
pub mod location;
pub mod money;
pub mod payment;

pub use contact::{ContactError, Email, Phone};
pub use id::*;
pub use location::{LocationTier, WardCode};
pub use money::Money;
pub use payment::{PaymentGateway, PaymentMethod};
