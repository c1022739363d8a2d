//! Cart lines selected for checkout.
//!
//! Quantity changes are optimistic: the local quantity (and so the line total
//! and price summary) changes first, then the change is sent to the cart
//! service. If the service refuses, the line reverts to the last quantity the
//! service confirmed.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use cartwheel_core::{CartId, CartLineId, Money, ProductId};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::api::ApiError;
use crate::error::{CheckoutError, Field, Result, ValidationError};
use crate::order::ProductStatus;

/// Upper bound on any line quantity, regardless of stock.
pub const MAX_LINE_QUANTITY: u32 = 99;

/// One product entry selected for checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartLine {
    pub id: CartLineId,
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity: u32,
    pub unit_price: Money,
    pub stock: u32,
    pub is_purchasable: bool,
    pub chosen: bool,
}

impl CartLine {
    /// Derived from quantity and unit price; never stored.
    #[must_use]
    pub fn line_total(&self) -> Money {
        self.unit_price * self.quantity
    }

    /// Largest quantity the buyer may enter, never below 1.
    #[must_use]
    pub fn max_quantity(&self) -> u32 {
        self.stock.clamp(1, MAX_LINE_QUANTITY)
    }

    /// Whether the line contributes to the subtotal.
    ///
    /// Out-of-stock lines keep quantity 1 for display but are not charged.
    #[must_use]
    pub const fn counts_toward_subtotal(&self) -> bool {
        self.chosen && self.is_purchasable && self.stock > 0
    }
}

/// Clamp raw quantity input into `[1, min(stock, 99)]`.
///
/// Empty or non-numeric input becomes 1; numbers too large to parse become the
/// maximum.
#[must_use]
pub fn clamp_quantity(raw: &str, stock: u32) -> u32 {
    let max = stock.clamp(1, MAX_LINE_QUANTITY);
    let raw = raw.trim();

    if !raw.is_empty() && raw.bytes().all(|b| b.is_ascii_digit()) {
        return raw
            .parse::<u64>()
            .map_or(max, |n| u32::try_from(n).unwrap_or(max).clamp(1, max));
    }
    1
}

/// Keystroke-level event from a quantity input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuantityEvent {
    /// The input text changed.
    Changed(String),
    Blur,
    Enter,
}

/// Buffers typed quantity text until the input is committed.
///
/// Typing never syncs; only `Blur` and `Enter` yield a clamped quantity, and
/// only when it differs from the last committed one.
#[derive(Debug, Clone)]
pub struct QuantityEditor {
    line_id: CartLineId,
    stock: u32,
    committed: u32,
    text: String,
}

impl QuantityEditor {
    #[must_use]
    pub fn new(line: &CartLine) -> Self {
        Self {
            line_id: line.id,
            stock: line.stock,
            committed: line.quantity,
            text: line.quantity.to_string(),
        }
    }

    #[must_use]
    pub const fn line_id(&self) -> CartLineId {
        self.line_id
    }

    /// Current input text.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Feed one event; returns the quantity to sync, if any.
    pub fn handle(&mut self, event: QuantityEvent) -> Option<u32> {
        match event {
            QuantityEvent::Changed(text) => {
                self.text = text;
                None
            }
            QuantityEvent::Blur | QuantityEvent::Enter => {
                let quantity = clamp_quantity(&self.text, self.stock);
                self.text = quantity.to_string();
                if quantity == self.committed {
                    None
                } else {
                    self.committed = quantity;
                    Some(quantity)
                }
            }
        }
    }
}

/// `PUT cartLine/{cartId}/{lineId}` body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LineUpdate {
    pub quantity: u32,
    pub choose: bool,
}

/// Remote cart service.
#[async_trait]
pub trait CartService: Send + Sync {
    async fn current_cart(&self) -> std::result::Result<CartId, ApiError>;
    async fn selected_lines(&self, cart_id: CartId) -> std::result::Result<Vec<CartLine>, ApiError>;
    async fn update_line(
        &self,
        cart_id: CartId,
        line_id: CartLineId,
        update: LineUpdate,
    ) -> std::result::Result<(), ApiError>;
}

// =============================================================================
// CartLineStore
// =============================================================================

/// The chosen lines of one cart.
pub struct CartLineStore {
    service: Arc<dyn CartService>,
    cart_id: CartId,
    lines: Vec<CartLine>,
    /// Quantities last acknowledged by the cart service
    confirmed: HashMap<CartLineId, u32>,
}

impl std::fmt::Debug for CartLineStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CartLineStore")
            .field("cart_id", &self.cart_id)
            .field("lines", &self.lines)
            .finish_non_exhaustive()
    }
}

impl CartLineStore {
    /// Load the current cart's selected lines.
    ///
    /// Quantities arriving outside `[1, min(stock, 99)]` are clamped locally.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::Transient` if the cart service is unreachable.
    #[instrument(skip(service))]
    pub async fn load(service: Arc<dyn CartService>) -> Result<Self> {
        let cart_id = service.current_cart().await?;
        let mut lines = service.selected_lines(cart_id).await?;
        lines.retain(|line| line.chosen);
        for line in &mut lines {
            line.quantity = line.quantity.clamp(1, line.max_quantity());
        }

        let confirmed = lines.iter().map(|l| (l.id, l.quantity)).collect();
        info!(cart_id = %cart_id, lines = lines.len(), "Loaded checkout lines");

        Ok(Self {
            service,
            cart_id,
            lines,
            confirmed,
        })
    }

    #[must_use]
    pub const fn cart_id(&self) -> CartId {
        self.cart_id
    }

    #[must_use]
    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    #[must_use]
    pub fn get(&self, id: CartLineId) -> Option<&CartLine> {
        self.lines.iter().find(|l| l.id == id)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    fn line_mut(&mut self, id: CartLineId) -> Result<&mut CartLine> {
        self.lines
            .iter_mut()
            .find(|l| l.id == id)
            .ok_or_else(|| CheckoutError::NotFound(format!("cart line {id}")))
    }

    /// Apply a quantity locally, clamped to the line's range.
    ///
    /// Returns the applied quantity. Nothing is sent until
    /// [`CartLineStore::commit_quantity`].
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::NotFound` for an unknown line.
    pub fn stage_quantity(&mut self, id: CartLineId, quantity: u32) -> Result<u32> {
        let line = self.line_mut(id)?;
        line.quantity = quantity.clamp(1, line.max_quantity());
        debug!(line_id = %id, quantity = line.quantity, "Staged quantity");
        Ok(line.quantity)
    }

    /// Send the staged quantity of a line to the cart service.
    ///
    /// # Errors
    ///
    /// On failure the line reverts to its last confirmed quantity and the
    /// service error is returned.
    #[instrument(skip(self), fields(cart_id = %self.cart_id))]
    pub async fn commit_quantity(&mut self, id: CartLineId) -> Result<()> {
        let quantity = self.line_mut(id)?.quantity;
        if self.confirmed.get(&id) == Some(&quantity) {
            return Ok(());
        }

        let update = LineUpdate {
            quantity,
            choose: true,
        };
        match self.service.update_line(self.cart_id, id, update).await {
            Ok(()) => {
                self.confirmed.insert(id, quantity);
                info!(quantity, "Quantity updated");
                Ok(())
            }
            Err(e) => {
                let previous = self.confirmed.get(&id).copied();
                if let Some(previous) = previous {
                    self.line_mut(id)?.quantity = previous;
                }
                warn!(error = %e, reverted_to = ?previous, "Quantity update failed");
                Err(e.into())
            }
        }
    }

    /// Stage and commit in one step.
    ///
    /// # Errors
    ///
    /// Same as [`CartLineStore::commit_quantity`].
    pub async fn set_quantity(&mut self, id: CartLineId, quantity: u32) -> Result<u32> {
        let applied = self.stage_quantity(id, quantity)?;
        self.commit_quantity(id).await?;
        Ok(applied)
    }

    /// Remove a line from checkout by flipping its `choose` flag.
    ///
    /// The request carries the line's current quantity.
    ///
    /// # Errors
    ///
    /// On failure the line stays selected.
    #[instrument(skip(self), fields(cart_id = %self.cart_id))]
    pub async fn unselect(&mut self, id: CartLineId) -> Result<CartLine> {
        let quantity = self.line_mut(id)?.quantity;
        let update = LineUpdate {
            quantity,
            choose: false,
        };
        self.service.update_line(self.cart_id, id, update).await?;

        let position = self
            .lines
            .iter()
            .position(|l| l.id == id)
            .ok_or_else(|| CheckoutError::NotFound(format!("cart line {id}")))?;
        let mut line = self.lines.remove(position);
        line.chosen = false;
        self.confirmed.remove(&id);
        info!(quantity, "Line unselected");
        Ok(line)
    }

    /// Record live product status on a line.
    ///
    /// Returns a validation error when the line can no longer be bought as is.
    pub fn apply_product_status(
        &mut self,
        id: CartLineId,
        status: ProductStatus,
    ) -> Option<ValidationError> {
        let line = self.lines.iter_mut().find(|l| l.id == id)?;
        line.stock = status.stock;
        line.is_purchasable = status.active;

        if !status.active {
            return Some(ValidationError::new(
                Field::Line(id),
                format!("{} is no longer available", line.product_name),
            ));
        }
        if status.stock == 0 {
            line.quantity = 1;
            return Some(ValidationError::new(
                Field::Line(id),
                format!("{} is out of stock", line.product_name),
            ));
        }
        if line.quantity > status.stock {
            return Some(ValidationError::new(
                Field::Line(id),
                format!("Only {} of {} left in stock", status.stock, line.product_name),
            ));
        }
        None
    }
}
