//! Saved shipping addresses.
//!
//! [`AddressRepository`] wraps the remote address service and the shared
//! [`LocationCache`]. [`AddressBook`] is the session-local view of one owner's
//! addresses: it picks the initially selected address and keeps the
//! at-most-one-default invariant after every create, update and delete.

use std::sync::Arc;

use async_trait::async_trait;
use cartwheel_core::{AddressId, DistrictId, OwnerId, Phone, ProvinceId, WardCode};
use serde::Serialize;
use tracing::{info, instrument};

use crate::api::ApiError;
use crate::error::{CheckoutError, Field, Rejection, Result, ValidationError};
use crate::location::LocationCache;

/// A saved shipping address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Address {
    pub id: AddressId,
    pub owner_id: OwnerId,
    pub name: String,
    pub phone: String,
    pub province_id: ProvinceId,
    pub district_id: DistrictId,
    pub ward_code: WardCode,
    pub address_detail: String,
    pub is_default: bool,
}

/// Body for creating or updating an address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressPayload {
    pub name: String,
    pub phone: String,
    pub province_id: ProvinceId,
    pub district_id: DistrictId,
    pub ward_code: WardCode,
    pub address_detail: String,
    pub is_default: bool,
}

impl AddressPayload {
    /// Payload that rewrites an existing address unchanged.
    #[must_use]
    pub fn from_address(address: &Address) -> Self {
        Self {
            name: address.name.clone(),
            phone: address.phone.clone(),
            province_id: address.province_id,
            district_id: address.district_id,
            ward_code: address.ward_code.clone(),
            address_detail: address.address_detail.clone(),
            is_default: address.is_default,
        }
    }

    /// Check required fields and normalize the phone number.
    ///
    /// # Errors
    ///
    /// Returns the first field that fails.
    pub fn validate(&mut self) -> std::result::Result<(), ValidationError> {
        self.name = self.name.trim().to_string();
        if self.name.is_empty() {
            return Err(ValidationError::new(Field::Name, "Enter the recipient's name"));
        }

        let phone = Phone::parse(&self.phone)
            .map_err(|e| ValidationError::new(Field::Phone, format!("Invalid phone: {e}")))?;
        self.phone = phone.as_str().to_string();

        if self.ward_code.as_str().trim().is_empty() {
            return Err(ValidationError::new(Field::Ward, "Select a ward"));
        }

        self.address_detail = self.address_detail.trim().to_string();
        if self.address_detail.is_empty() {
            return Err(ValidationError::new(
                Field::AddressDetail,
                "Enter the street address",
            ));
        }
        Ok(())
    }
}

/// Remote address book service.
#[async_trait]
pub trait AddressService: Send + Sync {
    async fn list_addresses(&self, owner_id: OwnerId) -> std::result::Result<Vec<Address>, ApiError>;
    async fn get_address(&self, owner_id: OwnerId, id: AddressId) -> std::result::Result<Address, ApiError>;
    async fn create_address(
        &self,
        owner_id: OwnerId,
        payload: &AddressPayload,
    ) -> std::result::Result<Address, ApiError>;
    async fn update_address(
        &self,
        owner_id: OwnerId,
        id: AddressId,
        payload: &AddressPayload,
    ) -> std::result::Result<Address, ApiError>;
    async fn delete_address(&self, owner_id: OwnerId, id: AddressId) -> std::result::Result<(), ApiError>;
}

// =============================================================================
// Display names
// =============================================================================

/// An address with its location names looked up.
///
/// Starts with raw IDs; names are patched in once the lookups finish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedAddress {
    pub address: Address,
    pub province_name: Option<String>,
    pub district_name: Option<String>,
    pub ward_name: Option<String>,
}

impl ResolvedAddress {
    /// Address with no names resolved yet.
    #[must_use]
    pub const fn unresolved(address: Address) -> Self {
        Self {
            address,
            province_name: None,
            district_name: None,
            ward_name: None,
        }
    }

    #[must_use]
    pub const fn is_resolved(&self) -> bool {
        self.province_name.is_some() && self.district_name.is_some() && self.ward_name.is_some()
    }

    /// One-line address: `detail, ward, district, province`.
    ///
    /// Parts whose name is unknown fall back to the raw ID.
    #[must_use]
    pub fn display_line(&self) -> String {
        let address = &self.address;
        let ward = self
            .ward_name
            .clone()
            .unwrap_or_else(|| address.ward_code.to_string());
        let district = self
            .district_name
            .clone()
            .unwrap_or_else(|| address.district_id.to_string());
        let province = self
            .province_name
            .clone()
            .unwrap_or_else(|| address.province_id.to_string());

        [address.address_detail.clone(), ward, district, province]
            .into_iter()
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

// =============================================================================
// AddressRepository
// =============================================================================

/// CRUD façade over the address service.
#[derive(Clone)]
pub struct AddressRepository {
    service: Arc<dyn AddressService>,
    locations: LocationCache,
}

impl std::fmt::Debug for AddressRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AddressRepository").finish_non_exhaustive()
    }
}

impl AddressRepository {
    #[must_use]
    pub fn new(service: Arc<dyn AddressService>, locations: LocationCache) -> Self {
        Self { service, locations }
    }

    /// The shared location cache, for cascading selectors.
    #[must_use]
    pub const fn locations(&self) -> &LocationCache {
        &self.locations
    }

    /// # Errors
    ///
    /// Returns `CheckoutError::Transient` if the service is unreachable.
    #[instrument(skip(self), fields(owner_id = %owner_id))]
    pub async fn list(&self, owner_id: OwnerId) -> Result<Vec<Address>> {
        Ok(self.service.list_addresses(owner_id).await?)
    }

    /// # Errors
    ///
    /// Returns `CheckoutError::NotFound` for an unknown address.
    #[instrument(skip(self), fields(owner_id = %owner_id, address_id = %id))]
    pub async fn get(&self, owner_id: OwnerId, id: AddressId) -> Result<Address> {
        Ok(self.service.get_address(owner_id, id).await?)
    }

    /// Validate and create an address.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::Validation` before any network call if a field
    /// is invalid.
    #[instrument(skip(self, payload), fields(owner_id = %owner_id))]
    pub async fn create(&self, owner_id: OwnerId, mut payload: AddressPayload) -> Result<Address> {
        payload.validate()?;
        let address = self.service.create_address(owner_id, &payload).await?;
        info!(address_id = %address.id, is_default = address.is_default, "Address created");
        Ok(address)
    }

    /// Validate and update an address.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::Validation` before any network call if a field
    /// is invalid.
    #[instrument(skip(self, payload), fields(owner_id = %owner_id, address_id = %id))]
    pub async fn update(
        &self,
        owner_id: OwnerId,
        id: AddressId,
        mut payload: AddressPayload,
    ) -> Result<Address> {
        payload.validate()?;
        let address = self.service.update_address(owner_id, id, &payload).await?;
        info!(is_default = address.is_default, "Address updated");
        Ok(address)
    }

    /// Make an address the owner's default.
    ///
    /// # Errors
    ///
    /// Same as [`AddressRepository::update`].
    pub async fn set_default(&self, address: &Address) -> Result<Address> {
        let mut payload = AddressPayload::from_address(address);
        payload.is_default = true;
        self.update(address.owner_id, address.id, payload).await
    }

    /// Delete an address.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::Rejected` with
    /// [`Rejection::DefaultAddressDelete`] when the service refuses to delete
    /// the current default.
    #[instrument(skip(self), fields(owner_id = %owner_id, address_id = %id))]
    pub async fn delete(&self, owner_id: OwnerId, id: AddressId) -> Result<()> {
        match self.service.delete_address(owner_id, id).await {
            Ok(()) => {
                info!("Address deleted");
                Ok(())
            }
            Err(e) => {
                let err = CheckoutError::from(e);
                if matches!(
                    err,
                    CheckoutError::Rejected {
                        rejection: Rejection::DefaultAddressDelete,
                        ..
                    }
                ) {
                    info!("Refused to delete default address");
                }
                Err(err)
            }
        }
    }

    /// Look up province, district and ward names concurrently.
    ///
    /// Lookups that fail leave the corresponding name unset.
    #[instrument(skip(self, address), fields(address_id = %address.id))]
    pub async fn resolve_display_names(&self, address: &Address) -> ResolvedAddress {
        let (provinces, districts, wards) = tokio::join!(
            self.locations.provinces(),
            self.locations.districts(address.province_id),
            self.locations.wards(address.district_id),
        );

        ResolvedAddress {
            province_name: provinces
                .name_of(&address.province_id.to_string())
                .map(String::from),
            district_name: districts
                .name_of(&address.district_id.to_string())
                .map(String::from),
            ward_name: wards.name_of(address.ward_code.as_str()).map(String::from),
            address: address.clone(),
        }
    }
}

// =============================================================================
// AddressBook
// =============================================================================

/// Whether checkout ships to a saved address or to the free-form guest form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutMode {
    SavedAddress,
    Guest,
}

/// One owner's addresses plus the checkout's selected address.
#[derive(Debug, Clone, Default)]
pub struct AddressBook {
    addresses: Vec<Address>,
    selected: Option<AddressId>,
}

/// Pick the address preselected for shipping: the default, else the first.
#[must_use]
pub fn select_default(addresses: &[Address]) -> Option<&Address> {
    addresses
        .iter()
        .find(|a| a.is_default)
        .or_else(|| addresses.first())
}

impl AddressBook {
    /// Build from a freshly loaded list.
    #[must_use]
    pub fn from_list(mut addresses: Vec<Address>) -> Self {
        // Keep only the first default if the service sent several
        let mut seen_default = false;
        for address in &mut addresses {
            if address.is_default {
                address.is_default = !seen_default;
                seen_default = true;
            }
        }
        let selected = select_default(&addresses).map(|a| a.id);
        Self {
            addresses,
            selected,
        }
    }

    #[must_use]
    pub fn addresses(&self) -> &[Address] {
        &self.addresses
    }

    #[must_use]
    pub fn get(&self, id: AddressId) -> Option<&Address> {
        self.addresses.iter().find(|a| a.id == id)
    }

    #[must_use]
    pub fn selected(&self) -> Option<&Address> {
        self.selected.and_then(|id| self.get(id))
    }

    #[must_use]
    pub fn default_address(&self) -> Option<&Address> {
        self.addresses.iter().find(|a| a.is_default)
    }

    #[must_use]
    pub fn mode(&self) -> CheckoutMode {
        if self.addresses.is_empty() {
            CheckoutMode::Guest
        } else {
            CheckoutMode::SavedAddress
        }
    }

    /// Select an address for shipping.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::NotFound` if the address is not in the book.
    pub fn select(&mut self, id: AddressId) -> Result<&Address> {
        if self.get(id).is_none() {
            return Err(CheckoutError::NotFound(format!("address {id}")));
        }
        self.selected = Some(id);
        self.get(id)
            .ok_or_else(|| CheckoutError::NotFound(format!("address {id}")))
    }

    /// Record a newly created address.
    ///
    /// The first address of a guest-mode book becomes the selection.
    pub fn apply_created(&mut self, address: Address) {
        if address.is_default {
            self.clear_default_except(address.id);
        }
        if self.selected.is_none() {
            self.selected = Some(address.id);
        }
        self.addresses.push(address);
    }

    /// Record an updated address.
    pub fn apply_updated(&mut self, address: Address) {
        if address.is_default {
            self.clear_default_except(address.id);
        }
        match self.addresses.iter_mut().find(|a| a.id == address.id) {
            Some(existing) => *existing = address,
            None => self.apply_created(address),
        }
    }

    /// Record a deletion, reselecting if the selected address went away.
    pub fn apply_deleted(&mut self, id: AddressId) {
        self.addresses.retain(|a| a.id != id);
        if self.selected == Some(id) {
            self.selected = select_default(&self.addresses).map(|a| a.id);
        }
    }

    fn clear_default_except(&mut self, id: AddressId) {
        for address in &mut self.addresses {
            if address.id != id {
                address.is_default = false;
            }
        }
    }
}
