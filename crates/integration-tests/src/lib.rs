//! Integration tests for Cartwheel.
//!
//! The checkout engine is driven end to end through its real HTTP client
//! against a [`wiremock`] server standing in for the cart, address, geo,
//! shipping, discount, order and payment services.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p cartwheel-integration-tests
//! ```
//!
//! # Test Categories
//!
//! - `locations` - Geo lookups through the location cache
//! - `addresses` - Saved address management
//! - `checkout_flow` - Bootstrap, repricing and order submission

use std::time::Duration;

use cartwheel_checkout::config::CheckoutConfig;
use cartwheel_checkout::{CheckoutDeps, CheckoutSession, Customer};
use cartwheel_core::OwnerId;
use serde_json::{Value, json};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Cart ID served by [`mount_cart`].
pub const CART_ID: i64 = 77;

/// Account used by authenticated sessions.
pub const OWNER_ID: i64 = 8;

/// Configuration pointing every service at `server`.
///
/// # Panics
///
/// Panics if the mock server URI is not a valid base URL.
#[must_use]
pub fn config(server: &MockServer, owner_id: Option<i64>) -> CheckoutConfig {
    let uri = server.uri();
    let owner = owner_id.map(|id| id.to_string());
    CheckoutConfig::from_source(|key| match key {
        "CHECKOUT_API_BASE_URL" => Some(uri.clone()),
        "CHECKOUT_GEO_BASE_URL" => Some(format!("{uri}/geo")),
        "CHECKOUT_BOOTSTRAP_TIMEOUT_SECS" => Some("5".to_string()),
        "CHECKOUT_OWNER_ID" => owner.clone(),
        _ => None,
    })
    .unwrap_or_else(|e| panic!("test config: {e}"))
}

/// Bootstrap a session against `server`.
///
/// # Panics
///
/// Panics if the session fails to load.
pub async fn session(server: &MockServer, owner_id: Option<i64>) -> CheckoutSession {
    let config = config(server, owner_id);
    let deps = CheckoutDeps::connect(&config).unwrap_or_else(|e| panic!("client: {e}"));
    let customer = Customer::from_owner(owner_id.map(OwnerId::new));
    CheckoutSession::bootstrap(customer, deps, config.bootstrap_timeout)
        .await
        .unwrap_or_else(|e| panic!("bootstrap: {e}"))
}

/// A selected cart line record as the cart service returns it.
#[must_use]
pub fn cart_line(id: i64, name: &str, price: i64, quantity: u32, stock: u32) -> Value {
    json!({
        "idCartLine": id,
        "idProduct": 1000 + id,
        "name": name,
        "quantity": quantity,
        "price": price,
        "quantityInStock": stock,
        "isActive": true,
        "choose": true
    })
}

/// An address record as the address service returns it.
#[must_use]
pub fn address_record(id: i64, is_default: bool) -> Value {
    json!({
        "idAddress": id,
        "name": "Lan",
        "phone": "0901234567",
        "provinceID": 79,
        "districtID": 1442,
        "wardCode": "20308",
        "addressDetail": "12 Nguyen Hue",
        "isDefault": is_default
    })
}

/// Serve `GET cart/current` and the selected lines.
pub async fn mount_cart(server: &MockServer, lines: Value) {
    Mock::given(method("GET"))
        .and(path("/cart/current"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "idCart": CART_ID })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/cart/{CART_ID}/selected-products")))
        .respond_with(ResponseTemplate::new(200).set_body_json(lines))
        .mount(server)
        .await;
}

/// Serve the owner's address list.
pub async fn mount_addresses(server: &MockServer, addresses: Value) {
    Mock::given(method("GET"))
        .and(path(format!("/addresses/{OWNER_ID}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(addresses))
        .mount(server)
        .await;
}

/// Serve one province, district and ward matching [`address_record`].
pub async fn mount_geo(server: &MockServer) {
    let lists = [
        (
            "/geo/provinces",
            json!({ "data": [{ "ProvinceID": 79, "ProvinceName": "Hồ Chí Minh" }] }),
        ),
        (
            "/geo/districts/79",
            json!([{ "DistrictID": 1442, "DistrictName": "Quận 1" }]),
        ),
        (
            "/geo/wards/1442",
            json!([{ "WardCode": "20308", "WardName": "Bến Nghé" }]),
        ),
    ];
    for (list_path, body) in lists {
        Mock::given(method("GET"))
            .and(path(list_path))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(server)
            .await;
    }
}

/// Serve a flat shipping fee for district 1442, ward 20308.
pub async fn mount_shipping_fee(server: &MockServer, fee: i64) {
    Mock::given(method("GET"))
        .and(path("/shipping/calculate-fee"))
        .and(query_param("toDistrictId", "1442"))
        .and(query_param("toWardCode", "20308"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": { "total": fee } })))
        .mount(server)
        .await;
}

/// Report every product as active with plenty of stock.
pub async fn mount_product_status(server: &MockServer) {
    Mock::given(method("GET"))
        .and(wiremock::matchers::path_regex(r"^/products/\d+/status$"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "quantityInStock": 50, "isActive": true })),
        )
        .mount(server)
        .await;
}

/// Short pause for delayed mock responses.
pub const SLOW: Duration = Duration::from_millis(200);
