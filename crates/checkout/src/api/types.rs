//! Wire types for the checkout REST services.
//!
//! These mirror the JSON bodies exchanged with the backend. Field names vary
//! between services, so records accept the known aliases and are converted
//! into domain types once, here.

use cartwheel_core::{
    AddressId, CartId, CartLineId, DistrictId, Money, OrderId, OwnerId, ProductId, ProvinceId,
    WardCode,
};
use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::cart::{CartLine, MAX_LINE_QUANTITY};

const fn default_true() -> bool {
    true
}

/// `GET cart/current`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentCart {
    #[serde(alias = "idCart", alias = "id")]
    pub cart_id: CartId,
}

/// One entry of `GET cart/{cartId}/selected-products`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLineRecord {
    #[serde(alias = "idCartLine", alias = "id")]
    pub cart_line_id: CartLineId,
    #[serde(alias = "idProduct")]
    pub product_id: ProductId,
    #[serde(default, alias = "name")]
    pub product_name: String,
    pub quantity: u32,
    #[serde(alias = "price")]
    pub unit_price: Money,
    #[serde(default, alias = "quantityInStock")]
    pub stock: Option<u32>,
    #[serde(default = "default_true", alias = "isActive", alias = "active")]
    pub is_purchasable: bool,
    #[serde(default = "default_true", alias = "choose")]
    pub chosen: bool,
}

impl From<CartLineRecord> for CartLine {
    fn from(record: CartLineRecord) -> Self {
        Self {
            id: record.cart_line_id,
            product_id: record.product_id,
            product_name: record.product_name,
            quantity: record.quantity,
            unit_price: record.unit_price,
            stock: record.stock.unwrap_or(MAX_LINE_QUANTITY),
            is_purchasable: record.is_purchasable,
            chosen: record.chosen,
        }
    }
}

/// An address as returned by the address service.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressRecord {
    #[serde(alias = "idAddress")]
    pub id: AddressId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub phone: String,
    #[serde(alias = "provinceID")]
    pub province_id: ProvinceId,
    #[serde(alias = "districtID")]
    pub district_id: DistrictId,
    pub ward_code: WardCode,
    #[serde(default, alias = "address")]
    pub address_detail: String,
    #[serde(default, alias = "default")]
    pub is_default: bool,
}

impl AddressRecord {
    /// Attach the owner taken from the request path.
    #[must_use]
    pub fn into_address(self, owner_id: OwnerId) -> Address {
        Address {
            id: self.id,
            owner_id,
            name: self.name,
            phone: self.phone,
            province_id: self.province_id,
            district_id: self.district_id,
            ward_code: self.ward_code,
            address_detail: self.address_detail,
            is_default: self.is_default,
        }
    }
}

/// `POST discounts/apply` request body.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyDiscount<'a> {
    pub discount_code: &'a str,
    pub order_total: i64,
}

/// `POST discounts/apply` response body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedDiscount {
    #[serde(alias = "amount")]
    pub discount_amount: Money,
}

/// `POST order/{cartId}` response body.
#[derive(Debug, Deserialize)]
pub struct OrderCreated {
    #[serde(rename = "idOrder", alias = "orderId", alias = "id")]
    pub order_id: OrderId,
}

/// `POST payment/{gateway}/create/{orderId}` response body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentUrl {
    #[serde(alias = "url")]
    pub payment_url: String,
}

/// Error body sent with non-success statuses.
#[derive(Debug, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default, alias = "error", alias = "msg")]
    pub message: Option<String>,
    #[serde(default, alias = "errorCode")]
    pub code: Option<String>,
}

/// Extract the record list from a geo lookup response.
///
/// Accepts a bare array or `{"data": [...]}`; any other shape is handed back.
///
/// # Errors
///
/// Returns the unrecognized value.
pub fn location_records(value: serde_json::Value) -> Result<Vec<serde_json::Value>, serde_json::Value> {
    match value {
        serde_json::Value::Array(records) => Ok(records),
        serde_json::Value::Object(mut map) => match map.remove("data") {
            Some(serde_json::Value::Array(records)) => Ok(records),
            Some(data) => {
                map.insert("data".to_string(), data);
                Err(serde_json::Value::Object(map))
            }
            None => Err(serde_json::Value::Object(map)),
        },
        other => Err(other),
    }
}

/// Extract a fee from `GET shipping/calculate-fee`.
///
/// Accepts a bare number, `{"fee": n}`, `{"total": n}` or `{"data": {"total": n}}`.
#[must_use]
pub fn parse_fee(value: &serde_json::Value) -> Option<Money> {
    match value {
        serde_json::Value::Number(_) => serde_json::from_value(value.clone()).ok(),
        serde_json::Value::String(s) => s.trim().parse::<i64>().ok().map(Money::from_dong),
        serde_json::Value::Object(map) => ["fee", "total", "data"]
            .iter()
            .find_map(|key| map.get(*key))
            .and_then(parse_fee),
        _ => None,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_cart_line_record_aliases() {
        let record: CartLineRecord = serde_json::from_value(json!({
            "idCartLine": 5,
            "idProduct": 90,
            "name": "Ceramic mug",
            "quantity": 2,
            "price": 125000,
            "quantityInStock": 4,
            "isActive": true
        }))
        .unwrap();
        let line = CartLine::from(record);
        assert_eq!(line.id, CartLineId::new(5));
        assert_eq!(line.stock, 4);
        assert!(line.chosen);
        assert_eq!(line.line_total(), Money::from_dong(250_000));
    }

    #[test]
    fn test_cart_line_missing_stock_is_unbounded() {
        let record: CartLineRecord = serde_json::from_value(json!({
            "cartLineId": 1, "productId": 2, "quantity": 1, "unitPrice": 1000
        }))
        .unwrap();
        assert_eq!(CartLine::from(record).stock, MAX_LINE_QUANTITY);
    }

    #[test]
    fn test_address_record_into_address() {
        let record: AddressRecord = serde_json::from_value(json!({
            "idAddress": 3,
            "name": "Lan",
            "phone": "0901234567",
            "provinceID": 79,
            "districtId": 1442,
            "wardCode": "20308",
            "addressDetail": "12 Nguyen Hue",
            "isDefault": true
        }))
        .unwrap();
        let address = record.into_address(OwnerId::new(8));
        assert_eq!(address.owner_id, OwnerId::new(8));
        assert_eq!(address.ward_code.as_str(), "20308");
        assert!(address.is_default);
    }

    #[test]
    fn test_parse_fee_shapes() {
        assert_eq!(parse_fee(&json!(30000)), Some(Money::from_dong(30_000)));
        assert_eq!(parse_fee(&json!("22000")), Some(Money::from_dong(22_000)));
        assert_eq!(parse_fee(&json!({"fee": 15000})), Some(Money::from_dong(15_000)));
        assert_eq!(
            parse_fee(&json!({"data": {"total": 41000}})),
            Some(Money::from_dong(41_000))
        );
        assert_eq!(parse_fee(&json!({"unexpected": true})), None);
    }

    #[test]
    fn test_location_records_shapes() {
        assert_eq!(location_records(json!([{"ProvinceID": 79}])).unwrap().len(), 1);
        assert_eq!(location_records(json!({"data": []})), Ok(Vec::new()));
        assert!(location_records(json!({"data": null})).is_err());
        assert_eq!(
            location_records(json!({"error": "quota exceeded"})),
            Err(json!({"error": "quota exceeded"}))
        );
        assert!(location_records(json!("ok")).is_err());
    }

    #[test]
    fn test_order_created_aliases() {
        let created: OrderCreated = serde_json::from_value(json!({"idOrder": 1001})).unwrap();
        assert_eq!(created.order_id, OrderId::new(1001));
        let created: OrderCreated = serde_json::from_value(json!({"orderId": 7})).unwrap();
        assert_eq!(created.order_id, OrderId::new(7));
    }
}
