//! One buyer's checkout.
//!
//! [`CheckoutSession`] owns the cart lines, the address book, the shipping
//! form, the pricing engine and the submission state machine. Every mutation
//! reprices before it returns, and every failure is turned into a [`Notice`]
//! on the session's queue as well as being returned to the caller.

use std::sync::Arc;
use std::time::Duration;

use cartwheel_core::{AddressId, CartId, CartLineId, DistrictId, OwnerId, ProvinceId, WardCode};
use tracing::{info, instrument, warn};

pub use crate::address::CheckoutMode;
use crate::address::{
    Address, AddressBook, AddressPayload, AddressRepository, AddressService, ResolvedAddress,
};
use crate::api::{ApiClient, ApiError};
use crate::cart::{CartLine, CartLineStore, CartService, QuantityEditor, QuantityEvent, clamp_quantity};
use crate::config::CheckoutConfig;
use crate::error::{CheckoutError, Field, Rejection, Result, ValidationError, add_breadcrumb};
use crate::location::LocationCache;
use crate::notice::Notice;
use crate::order::{OrderService, OrderSubmission, ShippingForm, SubmissionOutcome, SubmissionState};
use crate::pricing::{DiscountApplication, ParcelProfile, PricingEngine, PricingSnapshot, QuoteService};

/// Who is checking out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Customer {
    Authenticated { owner_id: OwnerId },
    Guest,
}

impl Customer {
    #[must_use]
    pub const fn from_owner(owner_id: Option<OwnerId>) -> Self {
        match owner_id {
            Some(owner_id) => Self::Authenticated { owner_id },
            None => Self::Guest,
        }
    }

    #[must_use]
    pub const fn owner_id(&self) -> Option<OwnerId> {
        match self {
            Self::Authenticated { owner_id } => Some(*owner_id),
            Self::Guest => None,
        }
    }
}

/// Remote collaborators a session is built from.
#[derive(Clone)]
pub struct CheckoutDeps {
    pub locations: LocationCache,
    pub addresses: Arc<dyn AddressService>,
    pub cart: Arc<dyn CartService>,
    pub quotes: Arc<dyn QuoteService>,
    pub orders: Arc<dyn OrderService>,
    pub parcel: ParcelProfile,
}

impl CheckoutDeps {
    /// Route every service through one API client.
    #[must_use]
    pub fn from_client(client: &ApiClient, locations: LocationCache, parcel: ParcelProfile) -> Self {
        let client = Arc::new(client.clone());
        Self {
            locations,
            addresses: client.clone(),
            cart: client.clone(),
            quotes: client.clone(),
            orders: client,
            parcel,
        }
    }

    /// Build the API client and location cache from configuration.
    ///
    /// Must be called inside a Tokio runtime for the location sweeper to run.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client fails to build.
    pub fn connect(config: &CheckoutConfig) -> std::result::Result<Self, ApiError> {
        let client = ApiClient::new(&config.api)?;
        let locations = LocationCache::new(Arc::new(client.clone()), &config.location);
        Ok(Self::from_client(&client, locations, config.parcel))
    }
}

/// A live checkout.
#[derive(Debug)]
pub struct CheckoutSession {
    customer: Customer,
    addresses: AddressRepository,
    book: AddressBook,
    shipping_address: Option<ResolvedAddress>,
    cart: CartLineStore,
    pricing: PricingEngine,
    submission: OrderSubmission,
    form: ShippingForm,
    snapshot: PricingSnapshot,
    notices: Vec<Notice>,
}

impl CheckoutSession {
    /// Load the cart, the saved addresses and the first price summary.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::Timeout` if loading takes longer than
    /// `timeout`; anything still in flight is dropped and the caller may retry.
    /// Load failures are returned as they occurred.
    #[instrument(skip(deps))]
    pub async fn bootstrap(customer: Customer, deps: CheckoutDeps, timeout: Duration) -> Result<Self> {
        if let Ok(result) = tokio::time::timeout(timeout, Self::load(customer, deps)).await {
            result
        } else {
            warn!(?timeout, "Checkout bootstrap timed out");
            Err(CheckoutError::Timeout(timeout))
        }
    }

    async fn load(customer: Customer, deps: CheckoutDeps) -> Result<Self> {
        let addresses = AddressRepository::new(deps.addresses, deps.locations);

        let (cart, saved) = tokio::join!(CartLineStore::load(deps.cart), async {
            match customer.owner_id() {
                Some(owner_id) => addresses.list(owner_id).await,
                None => Ok(Vec::new()),
            }
        });

        let mut session = Self {
            customer,
            addresses,
            book: AddressBook::from_list(saved?),
            shipping_address: None,
            cart: cart?,
            pricing: PricingEngine::new(deps.quotes, deps.parcel),
            submission: OrderSubmission::new(deps.orders),
            form: ShippingForm::default(),
            snapshot: PricingSnapshot::default(),
            notices: Vec::new(),
        };

        match session.book.selected().cloned() {
            Some(address) => session.ship_to(&address).await,
            None => session.reprice().await,
        }
        info!(
            mode = ?session.mode(),
            lines = session.cart.lines().len(),
            total = %session.snapshot.total,
            "Checkout ready"
        );
        Ok(session)
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    #[must_use]
    pub const fn customer(&self) -> &Customer {
        &self.customer
    }

    #[must_use]
    pub const fn cart_id(&self) -> CartId {
        self.cart.cart_id()
    }

    #[must_use]
    pub fn lines(&self) -> &[CartLine] {
        self.cart.lines()
    }

    #[must_use]
    pub const fn snapshot(&self) -> PricingSnapshot {
        self.snapshot
    }

    pub async fn discount(&self) -> Option<DiscountApplication> {
        self.pricing.discount().await
    }

    #[must_use]
    pub const fn address_book(&self) -> &AddressBook {
        &self.book
    }

    #[must_use]
    pub fn mode(&self) -> CheckoutMode {
        self.book.mode()
    }

    /// The selected saved address, with names once resolved.
    #[must_use]
    pub const fn shipping_address(&self) -> Option<&ResolvedAddress> {
        self.shipping_address.as_ref()
    }

    #[must_use]
    pub const fn form(&self) -> &ShippingForm {
        &self.form
    }

    /// Edit recipient, email, payment and note fields.
    ///
    /// Location fields should go through [`CheckoutSession::set_destination`]
    /// so the shipping fee follows.
    pub const fn form_mut(&mut self) -> &mut ShippingForm {
        &mut self.form
    }

    #[must_use]
    pub const fn submission_state(&self) -> SubmissionState {
        self.submission.state()
    }

    /// The shared location cache, for cascading selectors.
    #[must_use]
    pub const fn locations(&self) -> &LocationCache {
        self.addresses.locations()
    }

    /// Take every queued notice.
    pub fn drain_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    fn fail<T>(&mut self, err: CheckoutError) -> Result<T> {
        self.notices.push(err.notice());
        Err(err)
    }

    async fn reprice(&mut self) {
        let destination = self.form.destination();
        let repriced = self
            .pricing
            .recompute(self.cart.lines(), destination.as_ref())
            .await;
        self.snapshot = repriced.snapshot;
        self.notices.extend(repriced.notices);
    }

    // -------------------------------------------------------------------------
    // Cart
    // -------------------------------------------------------------------------

    /// Change a line's quantity: local first, then synced.
    ///
    /// # Errors
    ///
    /// If the cart service refuses, the line and summary revert and the error
    /// is returned.
    pub async fn change_quantity(&mut self, line_id: CartLineId, quantity: u32) -> Result<PricingSnapshot> {
        add_breadcrumb(
            "cart",
            "Changed quantity",
            Some(&[("line_id", line_id.to_string().as_str())]),
        );
        if let Err(e) = self.cart.stage_quantity(line_id, quantity) {
            return self.fail(e);
        }
        self.reprice().await;

        if let Err(e) = self.cart.commit_quantity(line_id).await {
            self.reprice().await;
            return self.fail(e);
        }
        Ok(self.snapshot)
    }

    /// Change a line's quantity from raw input text, clamping it first.
    ///
    /// # Errors
    ///
    /// Same as [`CheckoutSession::change_quantity`].
    pub async fn change_quantity_input(&mut self, line_id: CartLineId, raw: &str) -> Result<PricingSnapshot> {
        let Some(line) = self.cart.get(line_id) else {
            return self.fail(CheckoutError::NotFound(format!("cart line {line_id}")));
        };
        let quantity = clamp_quantity(raw, line.stock);
        self.change_quantity(line_id, quantity).await
    }

    /// Editor for a line's quantity input.
    #[must_use]
    pub fn quantity_editor(&self, line_id: CartLineId) -> Option<QuantityEditor> {
        self.cart.get(line_id).map(QuantityEditor::new)
    }

    /// Feed an input event; syncs on blur or Enter.
    ///
    /// Returns the new summary when a quantity was synced.
    ///
    /// # Errors
    ///
    /// Same as [`CheckoutSession::change_quantity`]; the editor is reset to the
    /// reverted quantity.
    pub async fn edit_quantity(
        &mut self,
        editor: &mut QuantityEditor,
        event: QuantityEvent,
    ) -> Result<Option<PricingSnapshot>> {
        let Some(quantity) = editor.handle(event) else {
            return Ok(None);
        };
        match self.change_quantity(editor.line_id(), quantity).await {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(e) => {
                if let Some(line) = self.cart.get(editor.line_id()) {
                    *editor = QuantityEditor::new(line);
                }
                Err(e)
            }
        }
    }

    /// Remove a line from this checkout.
    ///
    /// # Errors
    ///
    /// Returns the cart service error; the line stays selected.
    pub async fn unselect_line(&mut self, line_id: CartLineId) -> Result<PricingSnapshot> {
        add_breadcrumb(
            "cart",
            "Unselected line",
            Some(&[("line_id", line_id.to_string().as_str())]),
        );
        if let Err(e) = self.cart.unselect(line_id).await {
            return self.fail(e);
        }
        self.reprice().await;
        Ok(self.snapshot)
    }

    // -------------------------------------------------------------------------
    // Addresses and destination
    // -------------------------------------------------------------------------

    /// Fill the form from an address, reprice, then patch in location names.
    async fn ship_to(&mut self, address: &Address) {
        self.form.fill_from_address(address);
        self.shipping_address = Some(ResolvedAddress::unresolved(address.clone()));
        self.reprice().await;
        self.shipping_address = Some(self.addresses.resolve_display_names(address).await);
    }

    /// Look up location names for the selected address again.
    pub async fn resolve_address_names(&mut self) -> Option<&ResolvedAddress> {
        let address = self.book.selected().cloned()?;
        self.shipping_address = Some(self.addresses.resolve_display_names(&address).await);
        self.shipping_address.as_ref()
    }

    /// Ship to a saved address.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::NotFound` if the address is not in the book.
    pub async fn select_address(&mut self, id: AddressId) -> Result<PricingSnapshot> {
        let address = match self.book.select(id) {
            Ok(address) => address.clone(),
            Err(e) => return self.fail(e),
        };
        self.ship_to(&address).await;
        Ok(self.snapshot)
    }

    /// Set the destination from the cascading selectors.
    pub async fn set_destination(
        &mut self,
        province_id: ProvinceId,
        district_id: DistrictId,
        ward_code: WardCode,
    ) -> PricingSnapshot {
        self.form.set_province(province_id);
        self.form.set_district(district_id);
        self.form.set_ward(ward_code);
        self.reprice().await;
        self.snapshot
    }

    fn require_owner(&mut self) -> Result<OwnerId> {
        match self.customer.owner_id() {
            Some(owner_id) => Ok(owner_id),
            None => self.fail(CheckoutError::Rejected {
                rejection: Rejection::Other,
                message: "Sign in to save addresses.".to_string(),
            }),
        }
    }

    /// Save a new address.
    ///
    /// The first address saved in guest mode becomes the shipping address.
    ///
    /// # Errors
    ///
    /// Returns validation or service errors; the book is unchanged.
    pub async fn add_address(&mut self, payload: AddressPayload) -> Result<Address> {
        let owner_id = self.require_owner()?;
        let address = match self.addresses.create(owner_id, payload).await {
            Ok(address) => address,
            Err(e) => return self.fail(e),
        };

        let was_guest = self.book.selected().is_none();
        self.book.apply_created(address.clone());
        if was_guest {
            self.ship_to(&address).await;
        }
        self.notices.push(Notice::success("Address saved."));
        Ok(address)
    }

    /// Edit a saved address.
    ///
    /// # Errors
    ///
    /// Returns validation or service errors; the book is unchanged.
    pub async fn update_address(&mut self, id: AddressId, payload: AddressPayload) -> Result<Address> {
        let owner_id = self.require_owner()?;
        let address = match self.addresses.update(owner_id, id, payload).await {
            Ok(address) => address,
            Err(e) => return self.fail(e),
        };

        self.book.apply_updated(address.clone());
        if self.book.selected().is_some_and(|a| a.id == id) {
            self.ship_to(&address).await;
        }
        self.notices.push(Notice::success("Address updated."));
        Ok(address)
    }

    /// Make a saved address the default.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::NotFound` for an unknown address, or service
    /// errors.
    pub async fn set_default_address(&mut self, id: AddressId) -> Result<Address> {
        let Some(address) = self.book.get(id).cloned() else {
            return self.fail(CheckoutError::NotFound(format!("address {id}")));
        };
        let updated = match self.addresses.set_default(&address).await {
            Ok(updated) => updated,
            Err(e) => return self.fail(e),
        };
        self.book.apply_updated(updated.clone());
        Ok(updated)
    }

    /// Delete a saved address.
    ///
    /// Deleting the selected address falls back to the default, then the
    /// first remaining address, then guest mode.
    ///
    /// # Errors
    ///
    /// Deleting the default address is refused with a message asking the buyer
    /// to choose another default first.
    pub async fn delete_address(&mut self, id: AddressId) -> Result<()> {
        let owner_id = self.require_owner()?;
        add_breadcrumb(
            "address",
            "Deleting address",
            Some(&[("address_id", id.to_string().as_str())]),
        );
        if let Err(e) = self.addresses.delete(owner_id, id).await {
            return self.fail(e);
        }

        let was_selected = self.book.selected().is_some_and(|a| a.id == id);
        self.book.apply_deleted(id);
        if was_selected {
            match self.book.selected().cloned() {
                Some(next) => self.ship_to(&next).await,
                None => {
                    info!("No saved addresses left, switching to guest form");
                    self.shipping_address = None;
                    self.form.clear_location();
                    self.reprice().await;
                }
            }
        }
        self.notices.push(Notice::success("Address deleted."));
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Discount and submission
    // -------------------------------------------------------------------------

    /// Apply a discount code.
    ///
    /// # Errors
    ///
    /// Returns the refusal; any previously applied discount stays.
    pub async fn apply_discount(&mut self, code: &str) -> Result<PricingSnapshot> {
        match self.pricing.apply_discount(code, self.cart.lines()).await {
            Ok(snapshot) => {
                self.snapshot = snapshot;
                self.notices.push(Notice::success(format!(
                    "Discount applied: -{}",
                    snapshot.discount_amount
                )));
                Ok(snapshot)
            }
            Err(e) => self.fail(e),
        }
    }

    pub async fn remove_discount(&mut self) -> PricingSnapshot {
        self.snapshot = self.pricing.remove_discount(self.cart.lines()).await;
        self.snapshot
    }

    /// Place the order.
    ///
    /// # Errors
    ///
    /// See [`OrderSubmission::submit`]. A discount that could not be confirmed
    /// after the last cart change is checked again first; if it still cannot
    /// be confirmed, or no longer applies, nothing is submitted. Validation
    /// failures leave the session editable; a failed order creation may be
    /// retried by calling `submit` again.
    pub async fn submit(&mut self) -> Result<SubmissionOutcome> {
        if let Some(stale) = self.pricing.discount().await.filter(|d| d.stale) {
            self.reprice().await;
            let confirmed = self.pricing.discount().await.is_some_and(|d| !d.stale);
            if !confirmed {
                info!(code = %stale.code, "Holding submission for unconfirmed discount");
                return self.fail(
                    ValidationError::new(
                        Field::DiscountCode,
                        format!("Discount {} could not be confirmed. Review your total and try again.", stale.code),
                    )
                    .into(),
                );
            }
        }

        let discount_code = self.pricing.discount().await.map(|d| d.code);
        let result = self
            .submission
            .submit(&mut self.cart, &self.form, discount_code, &self.customer)
            .await;

        match result {
            Ok(outcome) => {
                let notice = match &outcome {
                    SubmissionOutcome::Completed {
                        warning: Some(warning),
                        ..
                    } => Notice::warning(warning.clone()),
                    SubmissionOutcome::Completed { order_id, .. } => {
                        Notice::success(format!("Order #{order_id} placed."))
                    }
                    SubmissionOutcome::Redirect { gateway, .. } => {
                        Notice::info(format!("Redirecting to {gateway}..."))
                    }
                };
                self.notices.push(notice);
                Ok(outcome)
            }
            Err(e) => {
                // Live status checks may have changed stock or availability
                if matches!(e, CheckoutError::Validation(_) | CheckoutError::Transient(_)) {
                    self.reprice().await;
                }
                self.fail(e)
            }
        }
    }

    /// Return a failed submission to idle.
    pub fn reset_submission(&mut self) -> bool {
        self.submission.reset()
    }
}
