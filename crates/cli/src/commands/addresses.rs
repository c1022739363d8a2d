//! Saved address management.
//!
//! # Usage
//!
//! ```bash
//! cartwheel addresses list
//! cartwheel addresses add -n Lan --phone 0901234567 --province 79 --district 1442 \
//!     --ward 20308 --detail "12 Nguyen Hue" --default
//! cartwheel addresses set-default 3
//! cartwheel addresses delete 4
//! ```
//!
//! All commands need an account (`CHECKOUT_OWNER_ID` or `--owner`).

use cartwheel_checkout::address::{AddressPayload, AddressRepository, ResolvedAddress};
use cartwheel_checkout::config::CheckoutConfig;
use cartwheel_checkout::{CheckoutDeps, Notice};
use cartwheel_core::{AddressId, OwnerId, WardCode};

use super::{CommandError, Output, table};
use crate::AddressArgs;

fn repository(config: &CheckoutConfig) -> Result<(AddressRepository, OwnerId), CommandError> {
    let owner_id = config.owner_id.ok_or(CommandError::SignInRequired)?;
    let deps = CheckoutDeps::connect(config)?;
    Ok((AddressRepository::new(deps.addresses, deps.locations), owner_id))
}

fn render(addresses: &[ResolvedAddress]) -> String {
    if addresses.is_empty() {
        return "No saved addresses.".to_string();
    }
    let rows: Vec<Vec<String>> = addresses
        .iter()
        .map(|resolved| {
            vec![
                resolved.address.id.to_string(),
                if resolved.address.is_default { "*" } else { "" }.to_string(),
                resolved.address.name.clone(),
                resolved.address.phone.clone(),
                resolved.display_line(),
            ]
        })
        .collect();
    table(&["ID", "DEFAULT", "NAME", "PHONE", "ADDRESS"], &rows)
}

/// Build a payload, requiring every field.
pub fn payload(args: AddressArgs, is_default: bool) -> Result<AddressPayload, CommandError> {
    Ok(AddressPayload {
        name: args.name.ok_or(CommandError::MissingArgument("--name"))?,
        phone: args.phone.ok_or(CommandError::MissingArgument("--phone"))?,
        province_id: args.province.ok_or(CommandError::MissingArgument("--province"))?,
        district_id: args.district.ok_or(CommandError::MissingArgument("--district"))?,
        ward_code: args
            .ward
            .map(WardCode::new)
            .ok_or(CommandError::MissingArgument("--ward"))?,
        address_detail: args.detail.ok_or(CommandError::MissingArgument("--detail"))?,
        is_default,
    })
}

pub async fn list(config: &CheckoutConfig, output: Output) -> Result<(), CommandError> {
    let (repository, owner_id) = repository(config)?;
    let addresses = repository.list(owner_id).await?;

    let mut resolved = Vec::with_capacity(addresses.len());
    for address in &addresses {
        resolved.push(repository.resolve_display_names(address).await);
    }
    output.emit(&resolved, &[], |addresses| render(addresses))
}

pub async fn add(
    config: &CheckoutConfig,
    args: AddressArgs,
    is_default: bool,
    output: Output,
) -> Result<(), CommandError> {
    let (repository, owner_id) = repository(config)?;
    let address = repository.create(owner_id, payload(args, is_default)?).await?;
    let resolved = repository.resolve_display_names(&address).await;

    output.emit(&resolved, &[Notice::success("Address saved.")], |resolved| {
        format!("#{} {}", resolved.address.id, resolved.display_line())
    })
}

pub async fn set_default(
    config: &CheckoutConfig,
    id: AddressId,
    output: Output,
) -> Result<(), CommandError> {
    let (repository, owner_id) = repository(config)?;
    let address = repository.get(owner_id, id).await?;
    let updated = repository.set_default(&address).await?;

    output.emit(&updated, &[], |updated| {
        format!("Address #{} is now the default.", updated.id)
    })
}

pub async fn delete(config: &CheckoutConfig, id: AddressId, output: Output) -> Result<(), CommandError> {
    let (repository, owner_id) = repository(config)?;
    repository.delete(owner_id, id).await?;

    output.emit(&id, &[], |id| format!("Address #{id} deleted."))
}
