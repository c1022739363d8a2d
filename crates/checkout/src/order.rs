//! Order submission.
//!
//! ```text
//! Idle ─► Validating ─► Submitting ─► Completed                 (COD)
//!  ▲          │             │    └──► Redirecting(gateway)      (VNPAY, MoMo)
//!  └──────────┘             ▼                 └─► Completed      (payment URL failed)
//!                         Failed ─► Validating                   (retry)
//! ```
//!
//! Validation failures return to `Idle` with a field-specific message. A
//! failed order creation moves to `Failed`: no order exists and the buyer may
//! retry. Once an order exists it is never reported as a failure; a gateway
//! URL failure completes with a warning instead.

use std::sync::Arc;

use async_trait::async_trait;
use cartwheel_core::{
    CartId, DistrictId, Email, OrderId, PaymentGateway, PaymentMethod, Phone, ProductId,
    ProvinceId, WardCode,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};

use crate::address::Address;
use crate::api::ApiError;
use crate::cart::CartLineStore;
use crate::error::{CheckoutError, Field, Result, ValidationError, add_breadcrumb};
use crate::pricing::Destination;
use crate::session::Customer;

/// Live purchasability of a product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ProductStatus {
    #[serde(alias = "quantityInStock", alias = "stockQuantity")]
    pub stock: u32,
    #[serde(default = "default_active", alias = "isActive")]
    pub active: bool,
}

const fn default_active() -> bool {
    true
}

/// Shipping and payment fields as the buyer entered them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShippingForm {
    pub name: String,
    pub phone: String,
    pub email: String,
    pub province_id: Option<ProvinceId>,
    pub district_id: Option<DistrictId>,
    pub ward_code: Option<WardCode>,
    pub address_detail: String,
    pub payment_method: Option<PaymentMethod>,
    pub note: String,
}

impl ShippingForm {
    /// Overwrite the recipient and location fields from a saved address.
    ///
    /// Email, payment method and note are kept.
    pub fn fill_from_address(&mut self, address: &Address) {
        self.name.clone_from(&address.name);
        self.phone.clone_from(&address.phone);
        self.province_id = Some(address.province_id);
        self.district_id = Some(address.district_id);
        self.ward_code = Some(address.ward_code.clone());
        self.address_detail.clone_from(&address.address_detail);
    }

    /// Clear the location fields.
    pub fn clear_location(&mut self) {
        self.province_id = None;
        self.district_id = None;
        self.ward_code = None;
        self.address_detail.clear();
    }

    /// Choose a province; clears district and ward.
    pub fn set_province(&mut self, province_id: ProvinceId) {
        if self.province_id != Some(province_id) {
            self.district_id = None;
            self.ward_code = None;
        }
        self.province_id = Some(province_id);
    }

    /// Choose a district; clears the ward.
    pub fn set_district(&mut self, district_id: DistrictId) {
        if self.district_id != Some(district_id) {
            self.ward_code = None;
        }
        self.district_id = Some(district_id);
    }

    pub fn set_ward(&mut self, ward_code: WardCode) {
        self.ward_code = Some(ward_code);
    }

    /// Carrier destination, once district and ward are chosen.
    #[must_use]
    pub fn destination(&self) -> Option<Destination> {
        Some(Destination {
            district_id: self.district_id?,
            ward_code: self.ward_code.clone()?,
        })
    }

    /// Check every required field, in form order.
    ///
    /// # Errors
    ///
    /// Returns the first missing or malformed field.
    pub fn validate(&self) -> std::result::Result<ValidShipping, ValidationError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(ValidationError::new(Field::Name, "Enter the recipient's name"));
        }
        let phone = Phone::parse(&self.phone)
            .map_err(|e| ValidationError::new(Field::Phone, format!("Invalid phone: {e}")))?;
        let email = Email::parse(&self.email)
            .map_err(|e| ValidationError::new(Field::Email, format!("Invalid email: {e}")))?;
        let province_id = self
            .province_id
            .ok_or_else(|| ValidationError::new(Field::Province, "Select a province"))?;
        let district_id = self
            .district_id
            .ok_or_else(|| ValidationError::new(Field::District, "Select a district"))?;
        let ward_code = self
            .ward_code
            .clone()
            .filter(|w| !w.as_str().trim().is_empty())
            .ok_or_else(|| ValidationError::new(Field::Ward, "Select a ward"))?;
        let address_detail = self.address_detail.trim();
        if address_detail.is_empty() {
            return Err(ValidationError::new(
                Field::AddressDetail,
                "Enter the street address",
            ));
        }
        let payment_method = self
            .payment_method
            .ok_or_else(|| ValidationError::new(Field::PaymentMethod, "Choose a payment method"))?;

        Ok(ValidShipping {
            name: name.to_string(),
            phone,
            email,
            province_id,
            district_id,
            ward_code,
            address_detail: address_detail.to_string(),
            payment_method,
            note: self.note.trim().to_string(),
        })
    }
}

/// A [`ShippingForm`] that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidShipping {
    pub name: String,
    pub phone: Phone,
    pub email: Email,
    pub province_id: ProvinceId,
    pub district_id: DistrictId,
    pub ward_code: WardCode,
    pub address_detail: String,
    pub payment_method: PaymentMethod,
    pub note: String,
}

/// `POST order/{cartId}` body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderDraft {
    #[serde(skip)]
    pub cart_id: CartId,
    pub name: String,
    pub phone: Phone,
    pub email: Email,
    pub province_id: ProvinceId,
    pub district_id: DistrictId,
    pub ward_code: WardCode,
    pub address_detail: String,
    pub payment_method: PaymentMethod,
    pub note: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discount_code: Option<String>,
}

impl OrderDraft {
    #[must_use]
    pub fn new(cart_id: CartId, shipping: ValidShipping, discount_code: Option<String>) -> Self {
        Self {
            cart_id,
            name: shipping.name,
            phone: shipping.phone,
            email: shipping.email,
            province_id: shipping.province_id,
            district_id: shipping.district_id,
            ward_code: shipping.ward_code,
            address_detail: shipping.address_detail,
            payment_method: shipping.payment_method,
            note: shipping.note,
            discount_code,
        }
    }
}

/// Where the buyer lands after a completed order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConfirmationRoute {
    /// Signed-in order history.
    Account { order_id: OrderId },
    /// Guest lookup keyed by order ID and email, no access token.
    GuestLookup { order_id: OrderId, email: Email },
}

impl ConfirmationRoute {
    #[must_use]
    pub fn for_customer(customer: &Customer, order_id: OrderId, email: &Email) -> Self {
        match customer {
            Customer::Authenticated { .. } => Self::Account { order_id },
            Customer::Guest => Self::GuestLookup {
                order_id,
                email: email.clone(),
            },
        }
    }

    #[must_use]
    pub fn path(&self) -> String {
        match self {
            Self::Account { order_id } => format!("/account/orders/{order_id}"),
            Self::GuestLookup { order_id, email } => format!(
                "/orders/lookup/{order_id}?email={}",
                urlencoding::encode(email.as_str())
            ),
        }
    }
}

/// How a successful submission ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SubmissionOutcome {
    /// Navigate away to the gateway's hosted payment page.
    Redirect {
        order_id: OrderId,
        gateway: PaymentGateway,
        url: String,
    },
    /// Show the order confirmation.
    Completed {
        order_id: OrderId,
        route: ConfirmationRoute,
        /// Set when the order exists but payment could not be started
        warning: Option<String>,
    },
}

impl SubmissionOutcome {
    #[must_use]
    pub const fn order_id(&self) -> OrderId {
        match self {
            Self::Redirect { order_id, .. } | Self::Completed { order_id, .. } => *order_id,
        }
    }
}

/// Submission state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionState {
    Idle,
    Validating,
    Submitting,
    Redirecting(PaymentGateway),
    Completed,
    Failed,
}

/// Remote order and payment services.
#[async_trait]
pub trait OrderService: Send + Sync {
    async fn product_status(&self, product_id: ProductId)
    -> std::result::Result<ProductStatus, ApiError>;
    async fn create_order(
        &self,
        cart_id: CartId,
        draft: &OrderDraft,
    ) -> std::result::Result<OrderId, ApiError>;
    async fn create_payment_url(
        &self,
        gateway: PaymentGateway,
        order_id: OrderId,
    ) -> std::result::Result<String, ApiError>;
}

// =============================================================================
// OrderSubmission
// =============================================================================

/// Drives one checkout's order submission.
pub struct OrderSubmission {
    service: Arc<dyn OrderService>,
    state: SubmissionState,
}

impl std::fmt::Debug for OrderSubmission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderSubmission")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl OrderSubmission {
    #[must_use]
    pub fn new(service: Arc<dyn OrderService>) -> Self {
        Self {
            service,
            state: SubmissionState::Idle,
        }
    }

    #[must_use]
    pub const fn state(&self) -> SubmissionState {
        self.state
    }

    /// Return a failed submission to `Idle`.
    ///
    /// Returns `false` in any other state.
    pub fn reset(&mut self) -> bool {
        if self.state == SubmissionState::Failed {
            self.state = SubmissionState::Idle;
            true
        } else {
            false
        }
    }

    /// Validate, create the order and start payment.
    ///
    /// Accepted from `Idle` and `Failed`.
    ///
    /// # Errors
    ///
    /// - `CheckoutError::SubmissionInProgress` in any other state
    /// - `CheckoutError::Validation` for a bad field or an unavailable line
    ///   (state returns to `Idle`)
    /// - `CheckoutError::Transient` if product status could not be checked
    ///   (state returns to `Idle`)
    /// - `CheckoutError::SubmissionFailed` if order creation failed
    ///   (state becomes `Failed`)
    #[instrument(skip_all, fields(cart_id = %cart.cart_id()))]
    pub async fn submit(
        &mut self,
        cart: &mut CartLineStore,
        form: &ShippingForm,
        discount_code: Option<String>,
        customer: &Customer,
    ) -> Result<SubmissionOutcome> {
        if !matches!(self.state, SubmissionState::Idle | SubmissionState::Failed) {
            warn!(state = ?self.state, "Refusing duplicate submission");
            return Err(CheckoutError::SubmissionInProgress);
        }

        self.state = SubmissionState::Validating;
        let draft = match self.validate(cart, form, discount_code).await {
            Ok(draft) => draft,
            Err(e) => {
                self.state = SubmissionState::Idle;
                return Err(e);
            }
        };

        self.state = SubmissionState::Submitting;
        let method = draft.payment_method.to_string();
        add_breadcrumb(
            "checkout",
            "Submitting order",
            Some(&[("payment_method", method.as_str())]),
        );
        let order_id = match self.service.create_order(draft.cart_id, &draft).await {
            Ok(order_id) => order_id,
            Err(e) => {
                error!(error = %e, "Order creation failed");
                self.state = SubmissionState::Failed;
                return Err(CheckoutError::SubmissionFailed(e));
            }
        };
        info!(order_id = %order_id, payment_method = %draft.payment_method, "Order created");

        let route = ConfirmationRoute::for_customer(customer, order_id, &draft.email);
        let Some(gateway) = draft.payment_method.gateway() else {
            self.state = SubmissionState::Completed;
            return Ok(SubmissionOutcome::Completed {
                order_id,
                route,
                warning: None,
            });
        };

        self.state = SubmissionState::Redirecting(gateway);
        match self.service.create_payment_url(gateway, order_id).await {
            Ok(url) => {
                info!(order_id = %order_id, gateway = %gateway, "Redirecting to payment gateway");
                Ok(SubmissionOutcome::Redirect {
                    order_id,
                    gateway,
                    url,
                })
            }
            Err(e) => {
                let event_id = sentry::capture_error(&e);
                warn!(
                    order_id = %order_id,
                    gateway = %gateway,
                    error = %e,
                    sentry_event_id = %event_id,
                    "Payment URL creation failed after order was created"
                );
                self.state = SubmissionState::Completed;
                Ok(SubmissionOutcome::Completed {
                    order_id,
                    route,
                    warning: Some(format!(
                        "Order #{order_id} was placed, but the {gateway} payment page could not be opened. You can pay from your order details."
                    )),
                })
            }
        }
    }

    async fn validate(
        &self,
        cart: &mut CartLineStore,
        form: &ShippingForm,
        discount_code: Option<String>,
    ) -> Result<OrderDraft> {
        if cart.is_empty() {
            return Err(ValidationError::new(Field::Cart, "Your checkout has no items").into());
        }

        // Lines are only touched once every status is in hand
        let mut statuses = Vec::with_capacity(cart.lines().len());
        for line in cart.lines() {
            statuses.push((line.id, self.service.product_status(line.product_id).await?));
        }
        let mut first_problem = None;
        for (line_id, status) in statuses {
            if let Some(problem) = cart.apply_product_status(line_id, status) {
                first_problem.get_or_insert(problem);
            }
        }
        if let Some(problem) = first_problem {
            info!(field = %problem.field, "Line failed live status check");
            return Err(problem.into());
        }

        let shipping = form.validate()?;
        Ok(OrderDraft::new(cart.cart_id(), shipping, discount_code))
    }
}
