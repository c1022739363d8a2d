//! Location hierarchy listing.
//!
//! # Usage
//!
//! ```bash
//! cartwheel locations provinces
//! cartwheel locations districts 79
//! cartwheel locations wards 1442
//! ```

use std::sync::Arc;

use cartwheel_checkout::api::ApiClient;
use cartwheel_checkout::config::CheckoutConfig;
use cartwheel_checkout::location::{LocationCache, LocationKey, LocationNode, Lookup};
use cartwheel_core::{DistrictId, ProvinceId};

use super::{CommandError, Output, table};

fn cache(config: &CheckoutConfig) -> Result<LocationCache, CommandError> {
    let client = ApiClient::new(&config.api)?;
    Ok(LocationCache::new(Arc::new(client), &config.location))
}

async fn list(config: &CheckoutConfig, key: LocationKey, output: Output) -> Result<(), CommandError> {
    let tier = key.tier();
    let nodes = match cache(config)?.get(key).await {
        Lookup::Ready(nodes) => nodes,
        Lookup::Unavailable => return Err(CommandError::Unavailable(tier)),
    };

    output.emit(&nodes.to_vec(), &[], |nodes: &Vec<LocationNode>| {
        if nodes.is_empty() {
            return format!("No {tier}s found.");
        }
        let rows: Vec<Vec<String>> = nodes
            .iter()
            .map(|node| vec![node.id.clone(), node.name.clone()])
            .collect();
        table(&["ID", "NAME"], &rows)
    })
}

pub async fn provinces(config: &CheckoutConfig, output: Output) -> Result<(), CommandError> {
    list(config, LocationKey::Provinces, output).await
}

pub async fn districts(
    config: &CheckoutConfig,
    province_id: ProvinceId,
    output: Output,
) -> Result<(), CommandError> {
    list(config, LocationKey::Districts(province_id), output).await
}

pub async fn wards(
    config: &CheckoutConfig,
    district_id: DistrictId,
    output: Output,
) -> Result<(), CommandError> {
    list(config, LocationKey::Wards(district_id), output).await
}
