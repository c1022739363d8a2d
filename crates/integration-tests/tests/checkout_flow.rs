//! Bootstrap, repricing and order submission end to end.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use std::time::Duration;

use cartwheel_checkout::order::{ConfirmationRoute, SubmissionOutcome, SubmissionState};
use cartwheel_checkout::{
    CheckoutDeps, CheckoutError, CheckoutMode, CheckoutSession, Customer, Field, NoticeLevel,
};
use cartwheel_core::{CartLineId, DistrictId, OrderId, PaymentGateway, PaymentMethod, ProvinceId, WardCode};
use cartwheel_integration_tests::{
    OWNER_ID, address_record, cart_line, config, mount_addresses, mount_cart, mount_geo,
    mount_product_status, mount_shipping_fee, session,
};
use serde_json::json;
use wiremock::matchers::{body_json, body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Cart of one line: 2 x 250.000 ₫.
async fn standard_cart(server: &MockServer) {
    mount_cart(server, json!([cart_line(1, "Ceramic mug", 250_000, 2, 10)])).await;
    mount_shipping_fee(server, 30_000).await;
}

async fn mount_discount(server: &MockServer, order_total: i64, amount: i64) {
    Mock::given(method("POST"))
        .and(path("/discounts/apply"))
        .and(body_json(json!({ "discountCode": "SALE10", "orderTotal": order_total })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "discountAmount": amount })))
        .expect(1)
        .mount(server)
        .await;
}

async fn signed_in(server: &MockServer) -> CheckoutSession {
    mount_addresses(server, json!([address_record(3, true)])).await;
    mount_geo(server).await;
    session(server, Some(OWNER_ID)).await
}

#[tokio::test]
async fn test_guest_cod_checkout_with_discount() {
    let server = MockServer::start().await;
    standard_cart(&server).await;
    mount_discount(&server, 500_000, 50_000).await;
    mount_product_status(&server).await;
    Mock::given(method("POST"))
        .and(path("/order/77"))
        .and(body_partial_json(json!({
            "name": "Lan",
            "phone": "0901234567",
            "email": "lan@example.vn",
            "provinceId": 79,
            "districtId": 1442,
            "wardCode": "20308",
            "addressDetail": "12 Nguyen Hue",
            "paymentMethod": "COD",
            "discountCode": "SALE10"
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "idOrder": 5001 })))
        .expect(1)
        .mount(&server)
        .await;

    let mut session = session(&server, None).await;
    assert_eq!(session.mode(), CheckoutMode::Guest);

    let snapshot = session
        .set_destination(ProvinceId::new(79), DistrictId::new(1442), WardCode::new("20308"))
        .await;
    assert_eq!(snapshot.shipping_fee.to_dong(), 30_000);

    let snapshot = session.apply_discount(" sale10 ").await.unwrap();
    assert_eq!(snapshot.subtotal.to_dong(), 500_000);
    assert_eq!(snapshot.discount_amount.to_dong(), 50_000);
    assert_eq!(snapshot.total.to_dong(), 480_000);

    let form = session.form_mut();
    form.name = "Lan".to_string();
    form.phone = "090 123 4567".to_string();
    form.email = "lan@example.vn".to_string();
    form.address_detail = "12 Nguyen Hue".to_string();
    form.payment_method = Some(PaymentMethod::Cod);

    let outcome = session.submit().await.unwrap();

    assert_eq!(
        outcome,
        SubmissionOutcome::Completed {
            order_id: OrderId::new(5001),
            route: ConfirmationRoute::GuestLookup {
                order_id: OrderId::new(5001),
                email: "lan@example.vn".parse().unwrap(),
            },
            warning: None,
        }
    );
    if let SubmissionOutcome::Completed { route, .. } = &outcome {
        assert_eq!(route.path(), "/orders/lookup/5001?email=lan%40example.vn");
    }
    assert_eq!(session.submission_state(), SubmissionState::Completed);
}

#[tokio::test]
async fn test_quantity_change_revalidates_discount() {
    let server = MockServer::start().await;
    standard_cart(&server).await;
    mount_discount(&server, 500_000, 50_000).await;
    mount_discount(&server, 750_000, 75_000).await;
    Mock::given(method("PUT"))
        .and(path("/cartLine/77/1"))
        .and(body_json(json!({ "quantity": 3, "choose": true })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let mut session = signed_in(&server).await;
    session.apply_discount("SALE10").await.unwrap();

    let snapshot = session.change_quantity(CartLineId::new(1), 3).await.unwrap();

    assert_eq!(snapshot.subtotal.to_dong(), 750_000);
    assert_eq!(snapshot.discount_amount.to_dong(), 75_000);
    assert!(!snapshot.discount_stale);
    assert_eq!(snapshot.total.to_dong(), 705_000);
}

#[tokio::test]
async fn test_failed_quantity_sync_reverts_line_and_total() {
    let server = MockServer::start().await;
    standard_cart(&server).await;
    Mock::given(method("PUT"))
        .and(path("/cartLine/77/1"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream error"))
        .mount(&server)
        .await;

    let mut session = signed_in(&server).await;
    session.drain_notices();

    let err = session.change_quantity(CartLineId::new(1), 5).await.unwrap_err();

    assert!(matches!(err, CheckoutError::Transient(_)));
    assert_eq!(session.lines()[0].quantity, 2);
    assert_eq!(session.snapshot().subtotal.to_dong(), 500_000);
    let notices = session.drain_notices();
    assert!(notices.iter().any(|n| n.level == NoticeLevel::Error));
}

#[tokio::test]
async fn test_quantity_input_is_clamped_to_stock() {
    let server = MockServer::start().await;
    mount_cart(&server, json!([cart_line(1, "Ceramic mug", 250_000, 2, 4)])).await;
    mount_shipping_fee(&server, 30_000).await;
    Mock::given(method("PUT"))
        .and(path("/cartLine/77/1"))
        .and(body_json(json!({ "quantity": 4, "choose": true })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let mut session = signed_in(&server).await;
    let snapshot = session
        .change_quantity_input(CartLineId::new(1), "250")
        .await
        .unwrap();

    assert_eq!(snapshot.subtotal.to_dong(), 1_000_000);
}

#[tokio::test]
async fn test_unselected_line_leaves_checkout() {
    let server = MockServer::start().await;
    mount_cart(
        &server,
        json!([
            cart_line(1, "Ceramic mug", 250_000, 2, 10),
            cart_line(2, "Teapot", 400_000, 1, 10)
        ]),
    )
    .await;
    mount_shipping_fee(&server, 30_000).await;
    Mock::given(method("PUT"))
        .and(path("/cartLine/77/2"))
        .and(body_json(json!({ "quantity": 1, "choose": false })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let mut session = signed_in(&server).await;
    assert_eq!(session.snapshot().subtotal.to_dong(), 900_000);

    let snapshot = session.unselect_line(CartLineId::new(2)).await.unwrap();

    assert_eq!(session.lines().len(), 1);
    assert_eq!(snapshot.subtotal.to_dong(), 500_000);
    assert_eq!(snapshot.total.to_dong(), 530_000);
}

#[tokio::test]
async fn test_rejected_discount_keeps_summary() {
    let server = MockServer::start().await;
    standard_cart(&server).await;
    Mock::given(method("POST"))
        .and(path("/discounts/apply"))
        .respond_with(
            ResponseTemplate::new(400)
                .set_body_json(json!({ "code": "DISCOUNT_EXPIRED", "message": "Code has expired" })),
        )
        .mount(&server)
        .await;

    let mut session = signed_in(&server).await;
    let before = session.snapshot();

    let err = session.apply_discount("OLD2020").await.unwrap_err();

    assert_eq!(err.user_message(), "Code has expired");
    assert_eq!(session.snapshot(), before);
    assert!(session.discount().await.is_none());
}

#[tokio::test]
async fn test_shipping_quote_failure_shows_zero_fee() {
    let server = MockServer::start().await;
    mount_cart(&server, json!([cart_line(1, "Ceramic mug", 250_000, 2, 10)])).await;
    Mock::given(method("GET"))
        .and(path("/shipping/calculate-fee"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let mut session = signed_in(&server).await;

    assert_eq!(session.snapshot().shipping_fee.to_dong(), 0);
    assert_eq!(session.snapshot().total.to_dong(), 500_000);
    let notices = session.drain_notices();
    assert!(notices.iter().any(|n| n.level == NoticeLevel::Warning));
}

#[tokio::test]
async fn test_saved_address_names_resolved_on_bootstrap() {
    let server = MockServer::start().await;
    standard_cart(&server).await;

    let session = signed_in(&server).await;
    let shipping = session.shipping_address().unwrap();

    assert_eq!(
        shipping.display_line(),
        "12 Nguyen Hue, Bến Nghé, Quận 1, Hồ Chí Minh"
    );
    assert_eq!(session.snapshot().total.to_dong(), 530_000);
}

#[tokio::test]
async fn test_payment_url_failure_still_completes_order() {
    let server = MockServer::start().await;
    standard_cart(&server).await;
    mount_product_status(&server).await;
    Mock::given(method("POST"))
        .and(path("/order/77"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "idOrder": 5002 })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/payment/vnpay/create/5002"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let mut session = signed_in(&server).await;
    session.form_mut().email = "lan@example.vn".to_string();
    session.form_mut().payment_method = Some(PaymentMethod::Vnpay);

    let outcome = session.submit().await.unwrap();

    let SubmissionOutcome::Completed { order_id, route, warning } = outcome else {
        panic!("expected completed outcome");
    };
    assert_eq!(order_id, OrderId::new(5002));
    assert_eq!(route.path(), "/account/orders/5002");
    assert!(warning.unwrap().contains("Order #5002 was placed"));
    assert_eq!(session.submission_state(), SubmissionState::Completed);

    // A finished submission is never sent twice
    let err = session.submit().await.unwrap_err();
    assert!(matches!(err, CheckoutError::SubmissionInProgress));
}

#[tokio::test]
async fn test_momo_order_redirects_to_gateway() {
    let server = MockServer::start().await;
    standard_cart(&server).await;
    mount_product_status(&server).await;
    Mock::given(method("POST"))
        .and(path("/order/77"))
        .and(body_partial_json(json!({ "paymentMethod": "MOMO" })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "orderId": 5003 })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/payment/momo/create/5003"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "paymentUrl": "https://test-payment.momo.vn/pay/5003" })),
        )
        .mount(&server)
        .await;

    let mut session = signed_in(&server).await;
    session.form_mut().email = "lan@example.vn".to_string();
    session.form_mut().payment_method = Some(PaymentMethod::Momo);

    let outcome = session.submit().await.unwrap();

    assert_eq!(
        outcome,
        SubmissionOutcome::Redirect {
            order_id: OrderId::new(5003),
            gateway: PaymentGateway::Momo,
            url: "https://test-payment.momo.vn/pay/5003".to_string(),
        }
    );
    assert_eq!(
        session.submission_state(),
        SubmissionState::Redirecting(PaymentGateway::Momo)
    );
}

#[tokio::test]
async fn test_failed_order_creation_can_be_retried() {
    let server = MockServer::start().await;
    standard_cart(&server).await;
    mount_product_status(&server).await;
    Mock::given(method("POST"))
        .and(path("/order/77"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/order/77"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "idOrder": 5004 })))
        .mount(&server)
        .await;

    let mut session = signed_in(&server).await;
    session.form_mut().email = "lan@example.vn".to_string();
    session.form_mut().payment_method = Some(PaymentMethod::Cod);

    let err = session.submit().await.unwrap_err();
    assert!(matches!(err, CheckoutError::SubmissionFailed(_)));
    assert_eq!(session.submission_state(), SubmissionState::Failed);

    let outcome = session.submit().await.unwrap();
    assert_eq!(outcome.order_id(), OrderId::new(5004));
}

#[tokio::test]
async fn test_out_of_stock_line_blocks_submission() {
    let server = MockServer::start().await;
    standard_cart(&server).await;
    Mock::given(method("GET"))
        .and(path("/products/1001/status"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "quantityInStock": 0, "isActive": true })),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/order/77"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;

    let mut session = signed_in(&server).await;
    session.form_mut().email = "lan@example.vn".to_string();
    session.form_mut().payment_method = Some(PaymentMethod::Cod);

    let err = session.submit().await.unwrap_err();

    assert!(matches!(
        err,
        CheckoutError::Validation(ref e) if e.field == Field::Line(CartLineId::new(1))
    ));
    assert_eq!(session.lines()[0].quantity, 1);
    assert_eq!(session.snapshot().subtotal.to_dong(), 0);
    assert_eq!(session.submission_state(), SubmissionState::Idle);
}

#[tokio::test]
async fn test_missing_payment_method_returns_to_idle() {
    let server = MockServer::start().await;
    standard_cart(&server).await;
    mount_product_status(&server).await;
    Mock::given(method("POST"))
        .and(path("/order/77"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;

    let mut session = signed_in(&server).await;
    session.form_mut().email = "lan@example.vn".to_string();

    let err = session.submit().await.unwrap_err();

    assert!(matches!(
        err,
        CheckoutError::Validation(ref e) if e.field == Field::PaymentMethod
    ));
    assert_eq!(session.submission_state(), SubmissionState::Idle);
}

#[tokio::test]
async fn test_slow_bootstrap_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cart/current"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_secs(2))
                .set_body_json(json!({ "idCart": 77 })),
        )
        .mount(&server)
        .await;

    let deps = CheckoutDeps::connect(&config(&server, None)).unwrap();
    let err = CheckoutSession::bootstrap(Customer::Guest, deps, Duration::from_millis(100))
        .await
        .unwrap_err();

    assert!(matches!(err, CheckoutError::Timeout(_)));
}
