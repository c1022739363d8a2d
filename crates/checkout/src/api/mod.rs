//! REST client for the checkout backend services.
//!
//! One [`ApiClient`] talks to every remote collaborator: geo lookup, cart,
//! address book, shipping quotes, discounts, orders and payment URLs. It
//! implements the service trait each engine component depends on, so the
//! engine never sees HTTP directly.
//!
//! Guest carts are tracked by the backend's session cookie, so the client
//! keeps a cookie store. Authenticated buyers additionally send a bearer token.

pub mod types;

use std::sync::Arc;

use async_trait::async_trait;
use cartwheel_core::{
    AddressId, CartId, CartLineId, Money, OrderId, OwnerId, PaymentGateway, ProductId,
};
use reqwest::{Method, RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, instrument};
use url::Url;
use uuid::Uuid;

use crate::address::{Address, AddressPayload, AddressService};
use crate::cart::{CartLine, CartService, LineUpdate};
use crate::config::ApiConfig;
use crate::location::{GeoLookup, LocationKey};
use crate::order::{OrderDraft, OrderService, ProductStatus};
use crate::pricing::{Destination, ParcelProfile, QuoteService};

use types::{
    AddressRecord, AppliedDiscount, ApplyDiscount, CartLineRecord, CurrentCart, ErrorBody,
    OrderCreated, PaymentUrl, location_records, parse_fee,
};

/// Errors that can occur when calling the backend services.
#[derive(Debug, Error)]
pub enum ApiError {
    /// HTTP request failed before a response arrived.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The service answered with a non-success status.
    #[error("HTTP {status}: {message}")]
    Status {
        status: u16,
        code: Option<String>,
        message: String,
    },

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Rate limited by the service.
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// An endpoint URL could not be built.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl ApiError {
    /// HTTP status of the failed response, if one arrived.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::RateLimited(_) => Some(429),
            Self::NotFound(_) => Some(404),
            _ => None,
        }
    }
}

// =============================================================================
// ApiClient
// =============================================================================

/// Client for the checkout backend.
///
/// Cheap to clone; clones share the connection pool and cookie store.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ApiClientInner>,
}

struct ApiClientInner {
    client: reqwest::Client,
    api_base: Url,
    geo_base: Url,
    token: Option<SecretString>,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("api_base", &self.inner.api_base.as_str())
            .field("geo_base", &self.inner.geo_base.as_str())
            .field("token", &self.inner.token.as_ref().map(|_| "[REDACTED]"))
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    /// Create a new API client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client fails to build.
    pub fn new(config: &ApiConfig) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .cookie_store(true)
            .build()?;

        Ok(Self {
            inner: Arc::new(ApiClientInner {
                client,
                api_base: config.base_url.clone(),
                geo_base: config.geo_base_url.clone(),
                token: config.token.clone(),
            }),
        })
    }

    fn api_url(&self, path: &str) -> Result<Url, ApiError> {
        Ok(self.inner.api_base.join(path)?)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let request_id = Uuid::new_v4();
        debug!(%request_id, %method, %url, "Sending request");

        let builder = self
            .inner
            .client
            .request(method, url)
            .header("X-Request-Id", request_id.to_string())
            .header("Accept", "application/json");

        match &self.inner.token {
            Some(token) => builder.bearer_auth(token.expose_secret()),
            None => builder,
        }
    }

    /// Send a request and return the raw response body on success.
    async fn execute(&self, builder: RequestBuilder) -> Result<String, ApiError> {
        let response = builder.send().await?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(1);
            return Err(ApiError::RateLimited(retry_after));
        }

        // Body first, for better diagnostics on failures
        let body = response.text().await?;

        if status == StatusCode::NOT_FOUND {
            return Err(ApiError::NotFound(error_message(&body)));
        }

        if !status.is_success() {
            let parsed: ErrorBody = serde_json::from_str(&body).unwrap_or_default();
            let message = parsed
                .message
                .unwrap_or_else(|| body.chars().take(200).collect::<String>());
            tracing::warn!(
                status = %status,
                code = ?parsed.code,
                body = %body.chars().take(500).collect::<String>(),
                "Checkout service returned non-success status"
            );
            return Err(ApiError::Status {
                status: status.as_u16(),
                code: parsed.code,
                message,
            });
        }

        Ok(body)
    }

    async fn execute_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, ApiError> {
        let body = self.execute(builder).await?;
        serde_json::from_str(&body).map_err(|e| {
            tracing::error!(
                error = %e,
                body = %body.chars().take(500).collect::<String>(),
                "Failed to parse checkout service response"
            );
            ApiError::Parse(e)
        })
    }
}

/// Best-effort message from an error body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.message)
        .unwrap_or_else(|| body.chars().take(200).collect())
}

// =============================================================================
// Geo lookup
// =============================================================================

#[async_trait]
impl GeoLookup for ApiClient {
    #[instrument(skip(self), fields(path = %key.path()))]
    async fn fetch_locations(&self, key: &LocationKey) -> Result<Vec<serde_json::Value>, ApiError> {
        let url = self.inner.geo_base.join(&key.path())?;
        let value: serde_json::Value = self.execute_json(self.request(Method::GET, url)).await?;

        location_records(value).map_err(|value| ApiError::Status {
            status: 502,
            code: None,
            message: format!(
                "Unrecognized location response: {}",
                value.to_string().chars().take(200).collect::<String>()
            ),
        })
    }
}

// =============================================================================
// Cart
// =============================================================================

#[async_trait]
impl CartService for ApiClient {
    #[instrument(skip(self))]
    async fn current_cart(&self) -> Result<CartId, ApiError> {
        let url = self.api_url("cart/current")?;
        let cart: CurrentCart = self.execute_json(self.request(Method::GET, url)).await?;
        Ok(cart.cart_id)
    }

    #[instrument(skip(self), fields(cart_id = %cart_id))]
    async fn selected_lines(&self, cart_id: CartId) -> Result<Vec<CartLine>, ApiError> {
        let url = self.api_url(&format!("cart/{cart_id}/selected-products"))?;
        let records: Vec<CartLineRecord> =
            self.execute_json(self.request(Method::GET, url)).await?;
        Ok(records.into_iter().map(CartLine::from).collect())
    }

    #[instrument(skip(self), fields(cart_id = %cart_id, line_id = %line_id))]
    async fn update_line(
        &self,
        cart_id: CartId,
        line_id: CartLineId,
        update: LineUpdate,
    ) -> Result<(), ApiError> {
        let url = self.api_url(&format!("cartLine/{cart_id}/{line_id}"))?;
        self.execute(self.request(Method::PUT, url).json(&update))
            .await
            .map(|_| ())
    }
}

// =============================================================================
// Addresses
// =============================================================================

#[async_trait]
impl AddressService for ApiClient {
    #[instrument(skip(self), fields(owner_id = %owner_id))]
    async fn list_addresses(&self, owner_id: OwnerId) -> Result<Vec<Address>, ApiError> {
        let url = self.api_url(&format!("addresses/{owner_id}"))?;
        let records: Vec<AddressRecord> = self.execute_json(self.request(Method::GET, url)).await?;
        Ok(records
            .into_iter()
            .map(|r| r.into_address(owner_id))
            .collect())
    }

    #[instrument(skip(self), fields(owner_id = %owner_id, address_id = %id))]
    async fn get_address(&self, owner_id: OwnerId, id: AddressId) -> Result<Address, ApiError> {
        let url = self.api_url(&format!("addresses/{owner_id}/{id}"))?;
        let record: AddressRecord = self.execute_json(self.request(Method::GET, url)).await?;
        Ok(record.into_address(owner_id))
    }

    #[instrument(skip(self, payload), fields(owner_id = %owner_id))]
    async fn create_address(
        &self,
        owner_id: OwnerId,
        payload: &AddressPayload,
    ) -> Result<Address, ApiError> {
        let url = self.api_url(&format!("addresses/{owner_id}"))?;
        let record: AddressRecord = self
            .execute_json(self.request(Method::POST, url).json(payload))
            .await?;
        Ok(record.into_address(owner_id))
    }

    #[instrument(skip(self, payload), fields(owner_id = %owner_id, address_id = %id))]
    async fn update_address(
        &self,
        owner_id: OwnerId,
        id: AddressId,
        payload: &AddressPayload,
    ) -> Result<Address, ApiError> {
        let url = self.api_url(&format!("addresses/{owner_id}/{id}"))?;
        let record: AddressRecord = self
            .execute_json(self.request(Method::PUT, url).json(payload))
            .await?;
        Ok(record.into_address(owner_id))
    }

    #[instrument(skip(self), fields(owner_id = %owner_id, address_id = %id))]
    async fn delete_address(&self, owner_id: OwnerId, id: AddressId) -> Result<(), ApiError> {
        let url = self.api_url(&format!("addresses/{owner_id}/{id}"))?;
        self.execute(self.request(Method::DELETE, url))
            .await
            .map(|_| ())
    }
}

// =============================================================================
// Shipping quotes and discounts
// =============================================================================

#[async_trait]
impl QuoteService for ApiClient {
    #[instrument(skip(self), fields(district_id = %destination.district_id, ward_code = %destination.ward_code))]
    async fn shipping_fee(
        &self,
        destination: &Destination,
        parcel: ParcelProfile,
    ) -> Result<Money, ApiError> {
        let mut url = self.api_url("shipping/calculate-fee")?;
        url.query_pairs_mut()
            .append_pair("toDistrictId", &destination.district_id.to_string())
            .append_pair("toWardCode", destination.ward_code.as_str())
            .append_pair("weight", &parcel.weight.to_string())
            .append_pair("length", &parcel.length.to_string())
            .append_pair("width", &parcel.width.to_string())
            .append_pair("height", &parcel.height.to_string());

        let value: serde_json::Value = self.execute_json(self.request(Method::GET, url)).await?;
        parse_fee(&value).ok_or_else(|| ApiError::Status {
            status: 502,
            code: None,
            message: format!("Unrecognized shipping fee response: {value}"),
        })
    }

    #[instrument(skip(self), fields(order_total = %order_total))]
    async fn apply_discount(&self, code: &str, order_total: Money) -> Result<Money, ApiError> {
        let url = self.api_url("discounts/apply")?;
        let body = ApplyDiscount {
            discount_code: code,
            order_total: order_total.to_dong(),
        };
        let applied: AppliedDiscount = self
            .execute_json(self.request(Method::POST, url).json(&body))
            .await?;
        Ok(applied.discount_amount)
    }
}

// =============================================================================
// Orders and payments
// =============================================================================

#[async_trait]
impl OrderService for ApiClient {
    #[instrument(skip(self), fields(product_id = %product_id))]
    async fn product_status(&self, product_id: ProductId) -> Result<ProductStatus, ApiError> {
        let url = self.api_url(&format!("products/{product_id}/status"))?;
        self.execute_json(self.request(Method::GET, url)).await
    }

    #[instrument(skip(self, draft), fields(cart_id = %cart_id, payment_method = %draft.payment_method))]
    async fn create_order(&self, cart_id: CartId, draft: &OrderDraft) -> Result<OrderId, ApiError> {
        let url = self.api_url(&format!("order/{cart_id}"))?;
        let created: OrderCreated = self
            .execute_json(self.request(Method::POST, url).json(draft))
            .await?;
        Ok(created.order_id)
    }

    #[instrument(skip(self), fields(gateway = %gateway, order_id = %order_id))]
    async fn create_payment_url(
        &self,
        gateway: PaymentGateway,
        order_id: OrderId,
    ) -> Result<String, ApiError> {
        let url = self.api_url(&format!(
            "payment/{}/create/{order_id}",
            gateway.path_segment()
        ))?;
        let payment: PaymentUrl = self.execute_json(self.request(Method::POST, url)).await?;
        Ok(payment.payment_url)
    }
}
