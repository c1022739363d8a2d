//! Commands that run against a bootstrapped checkout session.
//!
//! Each invocation loads the cart and addresses afresh, applies one change
//! and prints the resulting price summary.

use cartwheel_checkout::address::ResolvedAddress;
use cartwheel_checkout::cart::CartLine;
use cartwheel_checkout::config::CheckoutConfig;
use cartwheel_checkout::order::SubmissionOutcome;
use cartwheel_checkout::pricing::{DiscountApplication, PricingSnapshot};
use cartwheel_checkout::{CheckoutDeps, CheckoutError, CheckoutMode, CheckoutSession, Customer};
use cartwheel_core::{CartLineId, WardCode};
use serde::Serialize;
use tracing::info;

use super::{CommandError, Output, table};
use crate::SubmitArgs;

async fn open(config: &CheckoutConfig) -> Result<CheckoutSession, CommandError> {
    let deps = CheckoutDeps::connect(config)?;
    let customer = Customer::from_owner(config.owner_id);
    Ok(CheckoutSession::bootstrap(customer, deps, config.bootstrap_timeout).await?)
}

/// Print what the session queued, then hand back the error.
///
/// The error's own notice is left out; it is reported once by the caller.
fn abort(session: &mut CheckoutSession, output: Output, err: CheckoutError) -> CommandError {
    let message = err.user_message();
    let notices: Vec<_> = session
        .drain_notices()
        .into_iter()
        .filter(|notice| notice.message != message)
        .collect();
    output.notices(&notices);
    err.into()
}

#[derive(Serialize)]
struct SummaryView<'a> {
    mode: CheckoutMode,
    shipping_address: Option<&'a ResolvedAddress>,
    lines: &'a [CartLine],
    discount: Option<DiscountApplication>,
    pricing: PricingSnapshot,
}

impl<'a> SummaryView<'a> {
    async fn of(session: &'a CheckoutSession) -> Self {
        Self {
            mode: session.mode(),
            shipping_address: session.shipping_address(),
            lines: session.lines(),
            discount: session.discount().await,
            pricing: session.snapshot(),
        }
    }

    fn render(&self) -> String {
        let mut out = Vec::new();

        match self.shipping_address {
            Some(resolved) => out.push(format!(
                "Ship to: {} ({}), {}",
                resolved.address.name,
                resolved.address.phone,
                resolved.display_line()
            )),
            None => out.push("Ship to: guest address (not set)".to_string()),
        }
        out.push(String::new());

        if self.lines.is_empty() {
            out.push("No items selected.".to_string());
        } else {
            let rows: Vec<Vec<String>> = self
                .lines
                .iter()
                .map(|line| {
                    let note = if !line.is_purchasable {
                        "unavailable"
                    } else if line.stock == 0 {
                        "out of stock"
                    } else {
                        ""
                    };
                    vec![
                        line.id.to_string(),
                        line.product_name.clone(),
                        line.quantity.to_string(),
                        line.unit_price.to_string(),
                        line.line_total().to_string(),
                        note.to_string(),
                    ]
                })
                .collect();
            out.push(table(&["LINE", "PRODUCT", "QTY", "PRICE", "TOTAL", ""], &rows));
        }
        out.push(String::new());

        let pricing = &self.pricing;
        out.push(format!("Subtotal: {}", pricing.subtotal));
        out.push(format!("Shipping: {}", pricing.shipping_fee));
        if let Some(discount) = &self.discount {
            let stale = if pricing.discount_stale { " (unconfirmed)" } else { "" };
            out.push(format!(
                "Discount {}: -{}{stale}",
                discount.code, pricing.discount_amount
            ));
        }
        out.push(format!("Total: {}", pricing.total));
        out.join("\n")
    }
}

async fn show(session: &mut CheckoutSession, output: Output) -> Result<(), CommandError> {
    let (rendered, json) = {
        let view = SummaryView::of(session).await;
        (view.render(), serde_json::to_value(&view)?)
    };
    let notices = session.drain_notices();
    output.emit(&json, &notices, |_| rendered)
}

pub async fn summary(config: &CheckoutConfig, output: Output) -> Result<(), CommandError> {
    let mut session = open(config).await?;
    show(&mut session, output).await
}

pub async fn quantity(
    config: &CheckoutConfig,
    line_id: CartLineId,
    raw: &str,
    output: Output,
) -> Result<(), CommandError> {
    let mut session = open(config).await?;
    if let Err(e) = session.change_quantity_input(line_id, raw).await {
        return Err(abort(&mut session, output, e));
    }
    show(&mut session, output).await
}

pub async fn unselect(
    config: &CheckoutConfig,
    line_id: CartLineId,
    output: Output,
) -> Result<(), CommandError> {
    let mut session = open(config).await?;
    if let Err(e) = session.unselect_line(line_id).await {
        return Err(abort(&mut session, output, e));
    }
    show(&mut session, output).await
}

pub async fn discount(config: &CheckoutConfig, code: &str, output: Output) -> Result<(), CommandError> {
    let mut session = open(config).await?;
    if let Err(e) = session.apply_discount(code).await {
        return Err(abort(&mut session, output, e));
    }
    show(&mut session, output).await
}

/// Fill the shipping form from flags and place the order.
pub async fn submit(config: &CheckoutConfig, args: SubmitArgs, output: Output) -> Result<(), CommandError> {
    let mut session = open(config).await?;

    if let Some(id) = args.address {
        if let Err(e) = session.select_address(id).await {
            return Err(abort(&mut session, output, e));
        }
    }

    let shipping = args.shipping;
    match (shipping.province, shipping.district, shipping.ward) {
        (Some(province), Some(district), Some(ward)) => {
            session
                .set_destination(province, district, WardCode::new(ward))
                .await;
        }
        (province, district, ward) => {
            let form = session.form_mut();
            if let Some(province) = province {
                form.set_province(province);
            }
            if let Some(district) = district {
                form.set_district(district);
            }
            if let Some(ward) = ward {
                form.set_ward(WardCode::new(ward));
            }
        }
    }

    let form = session.form_mut();
    if let Some(name) = shipping.name {
        form.name = name;
    }
    if let Some(phone) = shipping.phone {
        form.phone = phone;
    }
    if let Some(detail) = shipping.detail {
        form.address_detail = detail;
    }
    form.email = args.email;
    form.payment_method = Some(args.payment);
    form.note = args.note.unwrap_or_default();

    if let Some(code) = args.discount.as_deref() {
        if let Err(e) = session.apply_discount(code).await {
            return Err(abort(&mut session, output, e));
        }
    }

    let outcome = match session.submit().await {
        Ok(outcome) => outcome,
        Err(e) => return Err(abort(&mut session, output, e)),
    };
    info!(order_id = %outcome.order_id(), total = %session.snapshot().total, "Order submitted");

    let notices = session.drain_notices();
    output.emit(&outcome, &notices, |outcome| match outcome {
        SubmissionOutcome::Redirect { order_id, gateway, url } => {
            format!("Order #{order_id}: open this {gateway} page to pay:\n{url}")
        }
        SubmissionOutcome::Completed { order_id, route, .. } => {
            format!("Order #{order_id} confirmed: {}", route.path())
        }
    })
}
