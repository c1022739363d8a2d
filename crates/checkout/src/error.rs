//! Checkout error taxonomy with Sentry integration.
//!
//! Every remote failure is caught where it happens and converted into a
//! [`CheckoutError`]; [`CheckoutError::notice`] turns it into the toast the
//! buyer sees. Nothing here is fatal: each variant leaves the session usable.

use std::time::Duration;

use cartwheel_core::CartLineId;
use thiserror::Error;

use crate::api::ApiError;
use crate::notice::Notice;

/// Input a validation failure refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Name,
    Phone,
    Email,
    Province,
    District,
    Ward,
    AddressDetail,
    PaymentMethod,
    DiscountCode,
    /// The checkout has no selected lines.
    Cart,
    /// A specific selected cart line.
    Line(CartLineId),
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Name => write!(f, "name"),
            Self::Phone => write!(f, "phone"),
            Self::Email => write!(f, "email"),
            Self::Province => write!(f, "province"),
            Self::District => write!(f, "district"),
            Self::Ward => write!(f, "ward"),
            Self::AddressDetail => write!(f, "address_detail"),
            Self::PaymentMethod => write!(f, "payment_method"),
            Self::DiscountCode => write!(f, "discount_code"),
            Self::Cart => write!(f, "cart"),
            Self::Line(id) => write!(f, "line:{id}"),
        }
    }
}

/// A user-correctable input problem.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: Field,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: Field, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Business rule a service rejected a request for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Tried to delete the owner's default address.
    DefaultAddressDelete,
    /// Discount code unknown, expired, or not applicable to the order total.
    InvalidDiscount,
    Other,
}

impl Rejection {
    /// Classify a 4xx response.
    ///
    /// A structured `code` wins. Services that only send free text are matched
    /// on message substrings as a compatibility shim.
    #[must_use]
    pub fn classify(code: Option<&str>, message: &str) -> Self {
        if let Some(code) = code {
            match code.to_ascii_uppercase().as_str() {
                "DEFAULT_ADDRESS" | "ADDRESS_IS_DEFAULT" | "DEFAULT_ADDRESS_DELETE" => {
                    return Self::DefaultAddressDelete;
                }
                "INVALID_DISCOUNT" | "DISCOUNT_EXPIRED" | "DISCOUNT_NOT_APPLICABLE" => {
                    return Self::InvalidDiscount;
                }
                _ => {}
            }
        }

        let lower = message.to_lowercase();
        if lower.contains("default address") {
            Self::DefaultAddressDelete
        } else if lower.contains("discount") {
            Self::InvalidDiscount
        } else {
            Self::Other
        }
    }
}

/// Checkout-level error type.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// Remote call failed for a reason the buyer can retry.
    #[error("Transient failure: {0}")]
    Transient(ApiError),

    /// Input failed validation. No state was changed.
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// A service refused the request on business grounds.
    #[error("Rejected ({rejection:?}): {message}")]
    Rejected { rejection: Rejection, message: String },

    /// Order creation failed; no order exists and the buyer may retry.
    #[error("Order submission failed: {0}")]
    SubmissionFailed(ApiError),

    /// A bounded wait ran out.
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// Referenced entity is not part of this checkout.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A submission is already running or has finished.
    #[error("Submission already in progress")]
    SubmissionInProgress,
}

impl From<ApiError> for CheckoutError {
    fn from(err: ApiError) -> Self {
        match &err {
            ApiError::Status {
                status,
                code,
                message,
            } if (400..500).contains(status) && *status != 404 && *status != 429 => {
                Self::Rejected {
                    rejection: Rejection::classify(code.as_deref(), message),
                    message: message.clone(),
                }
            }
            ApiError::NotFound(what) => Self::NotFound(what.clone()),
            _ => Self::Transient(err),
        }
    }
}

impl CheckoutError {
    /// Text shown to the buyer.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Transient(_) => {
                "We couldn't reach the store. Check your connection and try again.".to_string()
            }
            Self::Validation(err) => err.message.clone(),
            Self::Rejected {
                rejection: Rejection::DefaultAddressDelete,
                ..
            } => "This is your default address. Set another address as default before deleting it."
                .to_string(),
            Self::Rejected {
                rejection: Rejection::InvalidDiscount,
                message,
            } if message.is_empty() => "This discount code can't be applied.".to_string(),
            Self::Rejected { message, .. } => message.clone(),
            Self::SubmissionFailed(err) => match err {
                ApiError::Status { status, message, .. } if (400..500).contains(status) => {
                    format!("Your order was not placed: {message}")
                }
                _ => "Your order was not placed because the store could not be reached. Please try again."
                    .to_string(),
            },
            Self::Timeout(_) => {
                "Checkout is taking longer than expected. Please retry.".to_string()
            }
            Self::NotFound(_) => "That item is no longer part of your checkout.".to_string(),
            Self::SubmissionInProgress => "Your order is already being submitted.".to_string(),
        }
    }

    /// Whether the failure originates on the server side of the boundary.
    #[must_use]
    pub const fn is_server_fault(&self) -> bool {
        matches!(
            self,
            Self::Transient(_) | Self::SubmissionFailed(_) | Self::Timeout(_)
        )
    }

    /// Convert into a toast, reporting server-side failures to Sentry.
    #[must_use]
    pub fn notice(&self) -> Notice {
        if self.is_server_fault() {
            let event_id = sentry::capture_error(self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Checkout error"
            );
        } else {
            tracing::info!(error = %self, "Checkout request refused");
        }

        let message = self.user_message();
        match self {
            Self::Validation(_) | Self::Rejected { .. } | Self::NotFound(_) => {
                Notice::warning(message)
            }
            _ => Notice::error(message),
        }
    }
}

/// Result type alias for `CheckoutError`.
pub type Result<T> = std::result::Result<T, CheckoutError>;

/// Add a breadcrumb for buyer actions.
///
/// Breadcrumbs appear in Sentry error reports to show the trail of actions
/// leading up to an error.
///
/// # Example
///
/// ```rust,ignore
/// add_breadcrumb("cart", "Changed quantity", Some(&[("line_id", "12")]));
/// ```
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}
