//! Price summary recomputation.
//!
//! [`PricingSnapshot`] is the pure part: given lines, a fee and a discount it
//! derives the summary with `total = subtotal + shipping_fee - discount_amount`.
//!
//! [`PricingEngine`] owns the volatile inputs (the applied discount and the
//! last shipping quote) and runs the full sequence
//! subtotal → discount revalidation → shipping quote → total
//! under one async lock, so two recomputations never interleave.

use std::sync::Arc;

use async_trait::async_trait;
use cartwheel_core::{DistrictId, Money, WardCode};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::api::ApiError;
use crate::cart::CartLine;
use crate::error::{CheckoutError, Field, Rejection, Result, ValidationError};
use crate::notice::Notice;

/// Fixed parcel dimensions sent with every shipping quote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ParcelProfile {
    /// Grams
    pub weight: u32,
    /// Centimetres
    pub length: u32,
    pub width: u32,
    pub height: u32,
}

impl Default for ParcelProfile {
    fn default() -> Self {
        Self {
            weight: 1000,
            length: 20,
            width: 20,
            height: 10,
        }
    }
}

/// Where the order ships, as far as the carrier is concerned.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Destination {
    pub district_id: DistrictId,
    pub ward_code: WardCode,
}

/// A discount code and the amount the discount service granted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscountApplication {
    pub code: String,
    pub discount_amount: Money,
    /// Subtotal the amount was computed for
    pub computed_against_subtotal: Money,
    /// Set when revalidation against a new subtotal failed
    pub stale: bool,
}

impl DiscountApplication {
    /// Whether the amount can be trusted for `subtotal`.
    #[must_use]
    pub fn is_valid_for(&self, subtotal: Money) -> bool {
        !self.stale && self.computed_against_subtotal == subtotal
    }
}

/// The price summary shown next to the checkout form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct PricingSnapshot {
    pub subtotal: Money,
    pub shipping_fee: Money,
    pub discount_amount: Money,
    pub total: Money,
    /// The discount amount was not confirmed for this subtotal
    pub discount_stale: bool,
}

impl PricingSnapshot {
    #[must_use]
    pub fn new(subtotal: Money, shipping_fee: Money, discount_amount: Money) -> Self {
        Self {
            subtotal,
            shipping_fee,
            discount_amount,
            total: subtotal + shipping_fee - discount_amount,
            discount_stale: false,
        }
    }

    /// Derive a snapshot from its inputs.
    ///
    /// A stale discount counts at most the subtotal.
    #[must_use]
    pub fn compute(
        lines: &[CartLine],
        shipping_fee: Money,
        discount: Option<&DiscountApplication>,
    ) -> Self {
        let subtotal = subtotal(lines);
        let Some(discount) = discount else {
            return Self::new(subtotal, shipping_fee, Money::ZERO);
        };

        if discount.is_valid_for(subtotal) {
            Self::new(subtotal, shipping_fee, discount.discount_amount)
        } else {
            let mut snapshot =
                Self::new(subtotal, shipping_fee, discount.discount_amount.min(subtotal));
            snapshot.discount_stale = true;
            snapshot
        }
    }
}

/// Sum of line totals over chosen, purchasable, in-stock lines.
#[must_use]
pub fn subtotal(lines: &[CartLine]) -> Money {
    lines
        .iter()
        .filter(|l| l.counts_toward_subtotal())
        .map(CartLine::line_total)
        .sum()
}

/// Remote shipping quote and discount services.
#[async_trait]
pub trait QuoteService: Send + Sync {
    async fn shipping_fee(
        &self,
        destination: &Destination,
        parcel: ParcelProfile,
    ) -> std::result::Result<Money, ApiError>;

    /// Discount granted for `code` at `order_total`.
    async fn apply_discount(&self, code: &str, order_total: Money)
    -> std::result::Result<Money, ApiError>;
}

/// Result of a recomputation.
#[derive(Debug, Clone)]
pub struct Repricing {
    pub snapshot: PricingSnapshot,
    /// Degradations the buyer should hear about
    pub notices: Vec<Notice>,
}

// =============================================================================
// PricingEngine
// =============================================================================

#[derive(Debug, Default)]
struct PricingState {
    snapshot: PricingSnapshot,
    discount: Option<DiscountApplication>,
    /// Last successful quote
    quote: Option<(Destination, Money)>,
}

/// Serialized price recomputation.
pub struct PricingEngine {
    quotes: Arc<dyn QuoteService>,
    parcel: ParcelProfile,
    state: Mutex<PricingState>,
}

impl std::fmt::Debug for PricingEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PricingEngine")
            .field("parcel", &self.parcel)
            .finish_non_exhaustive()
    }
}

impl PricingEngine {
    #[must_use]
    pub fn new(quotes: Arc<dyn QuoteService>, parcel: ParcelProfile) -> Self {
        Self {
            quotes,
            parcel,
            state: Mutex::new(PricingState::default()),
        }
    }

    /// The last snapshot produced.
    pub async fn snapshot(&self) -> PricingSnapshot {
        self.state.lock().await.snapshot
    }

    /// The applied discount, if any.
    pub async fn discount(&self) -> Option<DiscountApplication> {
        self.state.lock().await.discount.clone()
    }

    /// Recompute the full summary after any input changed.
    ///
    /// Never fails: quote failures degrade the fee to zero and revalidation
    /// failures leave the discount stale, each with a notice.
    #[instrument(skip(self, lines), fields(lines = lines.len()))]
    pub async fn recompute(&self, lines: &[CartLine], destination: Option<&Destination>) -> Repricing {
        let mut state = self.state.lock().await;
        let mut notices = Vec::new();
        let subtotal = subtotal(lines);

        self.revalidate_discount(&mut state, subtotal, &mut notices).await;
        let shipping_fee = self.quote(&mut state, destination, &mut notices).await;

        let snapshot = PricingSnapshot::compute(lines, shipping_fee, state.discount.as_ref());
        state.snapshot = snapshot;
        debug!(
            subtotal = %snapshot.subtotal,
            shipping_fee = %snapshot.shipping_fee,
            discount = %snapshot.discount_amount,
            total = %snapshot.total,
            "Recomputed pricing"
        );

        Repricing { snapshot, notices }
    }

    /// Apply a discount code to the current subtotal.
    ///
    /// Re-applying the applied code against an unchanged subtotal returns the
    /// same amount without a service call.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::Validation` for an empty code and
    /// `CheckoutError::Rejected` when the service refuses it. The previous
    /// discount, if any, is kept on failure.
    #[instrument(skip(self, lines))]
    pub async fn apply_discount(&self, code: &str, lines: &[CartLine]) -> Result<PricingSnapshot> {
        let code = code.trim().to_uppercase();
        if code.is_empty() {
            return Err(ValidationError::new(Field::DiscountCode, "Enter a discount code").into());
        }

        let mut state = self.state.lock().await;
        let subtotal = subtotal(lines);

        let already_applied = state
            .discount
            .as_ref()
            .is_some_and(|current| current.code == code && current.is_valid_for(subtotal));
        if already_applied {
            debug!("Discount already applied for this subtotal");
            return Ok(state.snapshot);
        }

        let amount = self.quotes.apply_discount(&code, subtotal).await?;
        info!(discount = %amount, subtotal = %subtotal, "Discount applied");

        state.discount = Some(DiscountApplication {
            code,
            discount_amount: amount,
            computed_against_subtotal: subtotal,
            stale: false,
        });
        let shipping_fee = state.snapshot.shipping_fee;
        state.snapshot = PricingSnapshot::compute(lines, shipping_fee, state.discount.as_ref());
        Ok(state.snapshot)
    }

    /// Drop the applied discount.
    pub async fn remove_discount(&self, lines: &[CartLine]) -> PricingSnapshot {
        let mut state = self.state.lock().await;
        state.discount = None;
        state.snapshot = PricingSnapshot::compute(lines, state.snapshot.shipping_fee, None);
        state.snapshot
    }

    async fn revalidate_discount(
        &self,
        state: &mut PricingState,
        subtotal: Money,
        notices: &mut Vec<Notice>,
    ) {
        let Some(discount) = state.discount.as_mut() else {
            return;
        };
        if discount.is_valid_for(subtotal) {
            return;
        }

        match self.quotes.apply_discount(&discount.code, subtotal).await {
            Ok(amount) => {
                info!(code = %discount.code, discount = %amount, subtotal = %subtotal, "Discount revalidated");
                discount.discount_amount = amount;
                discount.computed_against_subtotal = subtotal;
                discount.stale = false;
            }
            Err(e) => match CheckoutError::from(e) {
                CheckoutError::Rejected {
                    rejection: Rejection::InvalidDiscount,
                    message,
                } => {
                    info!(code = %discount.code, %message, "Discount no longer applies");
                    notices.push(Notice::warning(format!(
                        "Discount code {} no longer applies to this order and was removed.",
                        discount.code
                    )));
                    state.discount = None;
                }
                err => {
                    warn!(code = %discount.code, error = %err, "Discount revalidation failed");
                    if !discount.stale {
                        notices.push(Notice::warning(format!(
                            "We couldn't confirm discount {} for your new total. It will be checked again before your order is placed.",
                            discount.code
                        )));
                    }
                    discount.stale = true;
                }
            },
        }
    }

    async fn quote(
        &self,
        state: &mut PricingState,
        destination: Option<&Destination>,
        notices: &mut Vec<Notice>,
    ) -> Money {
        let Some(destination) = destination else {
            return Money::ZERO;
        };

        if let Some((_, fee)) = state.quote.as_ref().filter(|(quoted_for, _)| quoted_for == destination) {
            return *fee;
        }

        match self.quotes.shipping_fee(destination, self.parcel).await {
            Ok(fee) => {
                state.quote = Some((destination.clone(), fee));
                fee
            }
            Err(e) => {
                warn!(error = %e, "Shipping quote failed, using zero fee");
                state.quote = None;
                notices.push(Notice::warning(
                    "We couldn't get a shipping quote. Shipping is shown as 0 ₫ for now.",
                ));
                Money::ZERO
            }
        }
    }
}
