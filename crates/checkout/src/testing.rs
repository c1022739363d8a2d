//! In-memory service fakes for unit tests.

#![allow(clippy::unwrap_used)]

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use cartwheel_core::{
    AddressId, CartId, CartLineId, DistrictId, Money, OrderId, OwnerId, PaymentGateway, ProductId,
    ProvinceId, WardCode,
};
use serde_json::json;

use crate::address::{Address, AddressPayload, AddressService};
use crate::api::ApiError;
use crate::cart::{CartLine, CartService, LineUpdate};
use crate::location::{GeoLookup, LocationKey};
use crate::order::{OrderDraft, OrderService, ProductStatus};
use crate::pricing::{Destination, ParcelProfile, QuoteService};

fn unavailable() -> ApiError {
    ApiError::Status {
        status: 503,
        code: None,
        message: "Service unavailable".to_string(),
    }
}

fn bad_request(code: Option<&str>, message: &str) -> ApiError {
    ApiError::Status {
        status: 400,
        code: code.map(String::from),
        message: message.to_string(),
    }
}

/// A cart line for product `1000 + id`.
pub fn line(id: i64, unit_price: i64, quantity: u32, stock: u32) -> CartLine {
    CartLine {
        id: CartLineId::new(id),
        product_id: ProductId::new(1000 + id),
        product_name: format!("Product {id}"),
        quantity,
        unit_price: Money::from_dong(unit_price),
        stock,
        is_purchasable: true,
        chosen: true,
    }
}

/// A valid address owned by owner 8, in Bến Nghé, Quận 1, Hồ Chí Minh.
pub fn address(id: i64, is_default: bool) -> Address {
    Address {
        id: AddressId::new(id),
        owner_id: OwnerId::new(8),
        name: "Lan".to_string(),
        phone: "0901234567".to_string(),
        province_id: ProvinceId::new(79),
        district_id: DistrictId::new(1442),
        ward_code: WardCode::from("20308"),
        address_detail: "12 Nguyen Hue".to_string(),
        is_default,
    }
}

// =============================================================================
// Geo
// =============================================================================

pub struct FakeGeo {
    calls: AtomicUsize,
    delay: Option<Duration>,
    failures_left: AtomicUsize,
}

impl FakeGeo {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            delay: None,
            failures_left: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn failing_first(self, n: usize) -> Self {
        self.failures_left.store(n, Ordering::SeqCst);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GeoLookup for FakeGeo {
    async fn fetch_locations(&self, key: &LocationKey) -> Result<Vec<serde_json::Value>, ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(unavailable());
        }

        Ok(match key {
            LocationKey::Provinces => vec![
                json!({"ProvinceID": 79, "ProvinceName": "Hồ Chí Minh"}),
                json!({"ProvinceID": 1, "ProvinceName": "Hà Nội"}),
            ],
            LocationKey::Districts(_) => vec![
                json!({"DistrictID": 1442, "DistrictName": "Quận 1"}),
                json!({"DistrictID": 1443, "DistrictName": "Quận 3"}),
            ],
            LocationKey::Wards(_) => vec![
                json!({"WardCode": "20308", "WardName": "Bến Nghé"}),
                json!({"WardCode": "20309", "WardName": "Bến Thành"}),
            ],
        })
    }
}

// =============================================================================
// Addresses
// =============================================================================

/// Address service that refuses to delete the default, like the real one.
pub struct FakeAddresses {
    addresses: Mutex<Vec<Address>>,
    next_id: AtomicUsize,
    calls: AtomicUsize,
}

impl FakeAddresses {
    pub fn new(addresses: Vec<Address>) -> Self {
        Self {
            addresses: Mutex::new(addresses),
            next_id: AtomicUsize::new(100),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn store(owner_id: OwnerId, id: AddressId, payload: &AddressPayload) -> Address {
        Address {
            id,
            owner_id,
            name: payload.name.clone(),
            phone: payload.phone.clone(),
            province_id: payload.province_id,
            district_id: payload.district_id,
            ward_code: payload.ward_code.clone(),
            address_detail: payload.address_detail.clone(),
            is_default: payload.is_default,
        }
    }
}

#[async_trait]
impl AddressService for FakeAddresses {
    async fn list_addresses(&self, _owner_id: OwnerId) -> Result<Vec<Address>, ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.addresses.lock().unwrap().clone())
    }

    async fn get_address(&self, _owner_id: OwnerId, id: AddressId) -> Result<Address, ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.addresses
            .lock()
            .unwrap()
            .iter()
            .find(|a| a.id == id)
            .cloned()
            .ok_or_else(|| ApiError::NotFound(format!("address {id}")))
    }

    async fn create_address(&self, owner_id: OwnerId, payload: &AddressPayload) -> Result<Address, ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let id = AddressId::new(i64::try_from(self.next_id.fetch_add(1, Ordering::SeqCst)).unwrap());
        let address = Self::store(owner_id, id, payload);
        let mut addresses = self.addresses.lock().unwrap();
        if address.is_default {
            addresses.iter_mut().for_each(|a| a.is_default = false);
        }
        addresses.push(address.clone());
        Ok(address)
    }

    async fn update_address(
        &self,
        owner_id: OwnerId,
        id: AddressId,
        payload: &AddressPayload,
    ) -> Result<Address, ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let address = Self::store(owner_id, id, payload);
        let mut addresses = self.addresses.lock().unwrap();
        if address.is_default {
            addresses.iter_mut().for_each(|a| a.is_default = false);
        }
        let slot = addresses
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| ApiError::NotFound(format!("address {id}")))?;
        *slot = address.clone();
        Ok(address)
    }

    async fn delete_address(&self, _owner_id: OwnerId, id: AddressId) -> Result<(), ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut addresses = self.addresses.lock().unwrap();
        if addresses.iter().any(|a| a.id == id && a.is_default) {
            return Err(bad_request(None, "Cannot delete default address"));
        }
        addresses.retain(|a| a.id != id);
        Ok(())
    }
}

// =============================================================================
// Cart
// =============================================================================

pub struct FakeCart {
    lines: Vec<CartLine>,
    delay: Mutex<Option<Duration>>,
    fail_updates: AtomicBool,
    updates: Mutex<Vec<(CartLineId, LineUpdate)>>,
}

impl FakeCart {
    pub fn new(lines: Vec<CartLine>) -> Self {
        Self {
            lines,
            delay: Mutex::new(None),
            fail_updates: AtomicBool::new(false),
            updates: Mutex::new(Vec::new()),
        }
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }

    /// Successful updates, in order.
    pub fn updates(&self) -> Vec<(CartLineId, LineUpdate)> {
        self.updates.lock().unwrap().clone()
    }
}

#[async_trait]
impl CartService for FakeCart {
    async fn current_cart(&self) -> Result<CartId, ApiError> {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(CartId::new(77))
    }

    async fn selected_lines(&self, _cart_id: CartId) -> Result<Vec<CartLine>, ApiError> {
        Ok(self.lines.clone())
    }

    async fn update_line(
        &self,
        _cart_id: CartId,
        line_id: CartLineId,
        update: LineUpdate,
    ) -> Result<(), ApiError> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        self.updates.lock().unwrap().push((line_id, update));
        Ok(())
    }
}

// =============================================================================
// Quotes and discounts
// =============================================================================

/// Flat shipping fee; `SALE10` grants 10% of the order total.
pub struct FakeQuotes {
    fee: Option<Money>,
    minimum: Money,
    fail_discounts: AtomicBool,
    quote_calls: AtomicUsize,
    discount_calls: Mutex<Vec<(String, Money)>>,
}

impl FakeQuotes {
    pub fn new(fee: Money) -> Self {
        Self {
            fee: Some(fee),
            minimum: Money::ZERO,
            fail_discounts: AtomicBool::new(false),
            quote_calls: AtomicUsize::new(0),
            discount_calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_quotes() -> Self {
        Self {
            fee: None,
            ..Self::new(Money::ZERO)
        }
    }

    /// Refuse `SALE10` below this order total.
    pub fn with_minimum(mut self, minimum: Money) -> Self {
        self.minimum = minimum;
        self
    }

    pub fn fail_discounts(&self, fail: bool) {
        self.fail_discounts.store(fail, Ordering::SeqCst);
    }

    pub fn quote_calls(&self) -> usize {
        self.quote_calls.load(Ordering::SeqCst)
    }

    pub fn discount_calls(&self) -> Vec<(String, Money)> {
        self.discount_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl QuoteService for FakeQuotes {
    async fn shipping_fee(&self, _destination: &Destination, _parcel: ParcelProfile) -> Result<Money, ApiError> {
        self.quote_calls.fetch_add(1, Ordering::SeqCst);
        self.fee.ok_or_else(unavailable)
    }

    async fn apply_discount(&self, code: &str, order_total: Money) -> Result<Money, ApiError> {
        self.discount_calls
            .lock()
            .unwrap()
            .push((code.to_string(), order_total));
        if self.fail_discounts.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        if code != "SALE10" {
            return Err(bad_request(Some("INVALID_DISCOUNT"), "Invalid discount code"));
        }
        if order_total < self.minimum {
            return Err(bad_request(
                Some("DISCOUNT_NOT_APPLICABLE"),
                "Order total below discount minimum",
            ));
        }
        Ok(Money::from_dong(order_total.to_dong() / 10))
    }
}

// =============================================================================
// Orders
// =============================================================================

pub struct FakeOrders {
    statuses: Mutex<HashMap<ProductId, ProductStatus>>,
    unreachable: Mutex<HashSet<ProductId>>,
    fail_orders: AtomicBool,
    fail_payment_urls: AtomicBool,
    create_calls: AtomicUsize,
    last_draft: Mutex<Option<OrderDraft>>,
}

impl FakeOrders {
    pub fn new() -> Self {
        Self {
            statuses: Mutex::new(HashMap::new()),
            unreachable: Mutex::new(HashSet::new()),
            fail_orders: AtomicBool::new(false),
            fail_payment_urls: AtomicBool::new(false),
            create_calls: AtomicUsize::new(0),
            last_draft: Mutex::new(None),
        }
    }

    /// Override a product's status; unknown products are active with stock 99.
    pub fn set_status(&self, product_id: ProductId, status: ProductStatus) {
        self.statuses.lock().unwrap().insert(product_id, status);
    }

    /// Make status lookups for `product_id` fail with a 503.
    pub fn fail_status(&self, product_id: ProductId) {
        self.unreachable.lock().unwrap().insert(product_id);
    }

    pub fn fail_orders(&self, fail: bool) {
        self.fail_orders.store(fail, Ordering::SeqCst);
    }

    pub fn fail_payment_urls(&self, fail: bool) {
        self.fail_payment_urls.store(fail, Ordering::SeqCst);
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn last_draft(&self) -> Option<OrderDraft> {
        self.last_draft.lock().unwrap().clone()
    }
}

#[async_trait]
impl OrderService for FakeOrders {
    async fn product_status(&self, product_id: ProductId) -> Result<ProductStatus, ApiError> {
        if self.unreachable.lock().unwrap().contains(&product_id) {
            return Err(unavailable());
        }
        Ok(self
            .statuses
            .lock()
            .unwrap()
            .get(&product_id)
            .copied()
            .unwrap_or(ProductStatus {
                stock: 99,
                active: true,
            }))
    }

    async fn create_order(&self, _cart_id: CartId, draft: &OrderDraft) -> Result<OrderId, ApiError> {
        let n = self.create_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_draft.lock().unwrap() = Some(draft.clone());
        if self.fail_orders.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        Ok(OrderId::new(5000 + i64::try_from(n).unwrap()))
    }

    async fn create_payment_url(&self, gateway: PaymentGateway, order_id: OrderId) -> Result<String, ApiError> {
        if self.fail_payment_urls.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        Ok(format!(
            "https://pay.test/{}/{order_id}",
            gateway.path_segment()
        ))
    }
}
