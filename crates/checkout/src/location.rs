//! Province → district → ward reference data cache.
//!
//! A single [`LocationCache`] is shared by every form that shows cascading
//! location selectors (checkout, add-address, edit-address). Lists are fetched
//! lazily per parent and kept for a fixed TTL:
//!
//! - Hits are served from memory without a network call.
//! - Misses and expired entries trigger exactly one fetch per key; concurrent
//!   callers for the same key await that one fetch (`moka`'s
//!   `try_get_with` coalesces initializations).
//! - Failed fetches are not cached, so the next read retries.
//! - Expired entries are dropped on read; a background sweeper started with
//!   the cache runs its housekeeping every `sweep_interval` and stops when the
//!   last clone is dropped.
//!
//! Records are normalized once, at fill time, by [`normalize_location`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cartwheel_core::{DistrictId, LocationTier, ProvinceId};
use moka::future::Cache;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, instrument, warn};

use crate::api::ApiError;
use crate::config::LocationConfig;

/// Remote geo lookup service.
#[async_trait]
pub trait GeoLookup: Send + Sync {
    /// Fetch the raw records for one list.
    async fn fetch_locations(&self, key: &LocationKey) -> Result<Vec<serde_json::Value>, ApiError>;
}

/// Identifies one cached list.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LocationKey {
    Provinces,
    Districts(ProvinceId),
    Wards(DistrictId),
}

impl LocationKey {
    /// Tier of the nodes in this list.
    #[must_use]
    pub const fn tier(&self) -> LocationTier {
        match self {
            Self::Provinces => LocationTier::Province,
            Self::Districts(_) => LocationTier::District,
            Self::Wards(_) => LocationTier::Ward,
        }
    }

    /// Parent node ID, if any.
    #[must_use]
    pub fn parent_id(&self) -> Option<String> {
        match self {
            Self::Provinces => None,
            Self::Districts(province) => Some(province.to_string()),
            Self::Wards(district) => Some(district.to_string()),
        }
    }

    /// Path relative to the geo service base URL.
    #[must_use]
    pub fn path(&self) -> String {
        match self {
            Self::Provinces => "provinces".to_string(),
            Self::Districts(province) => format!("districts/{province}"),
            Self::Wards(district) => format!("wards/{district}"),
        }
    }
}

/// One province, district or ward.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocationNode {
    /// Province/district ID or ward code, as text.
    pub id: String,
    pub name: String,
    pub tier: LocationTier,
    pub parent_id: Option<String>,
}

/// Result of a cache read.
#[derive(Debug, Clone)]
pub enum Lookup {
    /// The list, possibly empty.
    Ready(Arc<[LocationNode]>),
    /// The fetch failed; render a "no data" placeholder.
    Unavailable,
}

impl Lookup {
    /// Nodes in service order; empty when unavailable.
    #[must_use]
    pub fn nodes(&self) -> &[LocationNode] {
        match self {
            Self::Ready(nodes) => nodes,
            Self::Unavailable => &[],
        }
    }

    #[must_use]
    pub const fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable)
    }

    /// Name of the node with the given ID.
    #[must_use]
    pub fn name_of(&self, id: &str) -> Option<&str> {
        self.nodes()
            .iter()
            .find(|node| node.id == id)
            .map(|node| node.name.as_str())
    }
}

const PROVINCE_ID_KEYS: &[&str] = &["ProvinceID", "provinceId", "province_id", "provinceID", "id", "code"];
const DISTRICT_ID_KEYS: &[&str] = &["DistrictID", "districtId", "district_id", "districtID", "id", "code"];
const WARD_ID_KEYS: &[&str] = &["WardCode", "wardCode", "ward_code", "code", "id"];
const PROVINCE_NAME_KEYS: &[&str] = &["ProvinceName", "provinceName", "province_name", "name", "full_name", "fullName"];
const DISTRICT_NAME_KEYS: &[&str] = &["DistrictName", "districtName", "district_name", "name", "full_name", "fullName"];
const WARD_NAME_KEYS: &[&str] = &["WardName", "wardName", "ward_name", "name", "full_name", "fullName"];

/// Normalize one raw geo record.
///
/// Returns `None` when the record has no usable ID or name.
#[must_use]
pub fn normalize_location(
    tier: LocationTier,
    parent_id: Option<&str>,
    record: &serde_json::Value,
) -> Option<LocationNode> {
    let (id_keys, name_keys) = match tier {
        LocationTier::Province => (PROVINCE_ID_KEYS, PROVINCE_NAME_KEYS),
        LocationTier::District => (DISTRICT_ID_KEYS, DISTRICT_NAME_KEYS),
        LocationTier::Ward => (WARD_ID_KEYS, WARD_NAME_KEYS),
    };

    let object = record.as_object()?;
    let field = |keys: &[&str]| {
        keys.iter().find_map(|key| match object.get(*key)? {
            serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
    };

    Some(LocationNode {
        id: field(id_keys)?,
        name: field(name_keys)?,
        tier,
        parent_id: parent_id.map(String::from),
    })
}

fn normalize_all(key: &LocationKey, records: &[serde_json::Value]) -> Arc<[LocationNode]> {
    let parent = key.parent_id();
    let nodes: Vec<LocationNode> = records
        .iter()
        .filter_map(|record| {
            let node = normalize_location(key.tier(), parent.as_deref(), record);
            if node.is_none() {
                debug!(record = %record, "Dropping location record without id or name");
            }
            node
        })
        .collect();
    nodes.into()
}

// =============================================================================
// LocationCache
// =============================================================================

/// Process-wide location cache.
///
/// Cheap to clone; clones share the same entries.
#[derive(Clone)]
pub struct LocationCache {
    inner: Arc<LocationCacheInner>,
}

struct LocationCacheInner {
    lookup: Arc<dyn GeoLookup>,
    cache: Cache<LocationKey, Arc<[LocationNode]>>,
    sweeper: Option<JoinHandle<()>>,
}

impl Drop for LocationCacheInner {
    fn drop(&mut self) {
        if let Some(sweeper) = &self.sweeper {
            sweeper.abort();
        }
    }
}

impl LocationCache {
    /// Create a cache backed by the given lookup service.
    ///
    /// When called inside a Tokio runtime the expiry sweeper is started on
    /// `config.sweep_interval`. Outside a runtime expired entries are still
    /// dropped on read, just never swept.
    #[must_use]
    pub fn new(lookup: Arc<dyn GeoLookup>, config: &LocationConfig) -> Self {
        let cache = Cache::builder()
            .max_capacity(config.capacity)
            .time_to_live(config.ttl)
            .build();

        let sweeper = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => Some(spawn_sweeper(&runtime, cache.clone(), config.sweep_interval)),
            Err(_) => {
                debug!("No runtime, location sweeper not started");
                None
            }
        };

        Self {
            inner: Arc::new(LocationCacheInner {
                lookup,
                cache,
                sweeper,
            }),
        }
    }

    /// Read one list, fetching it if missing or expired.
    #[instrument(skip(self), fields(path = %key.path()))]
    pub async fn get(&self, key: LocationKey) -> Lookup {
        if let Some(nodes) = self.inner.cache.get(&key).await {
            debug!("Cache hit for locations");
            return Lookup::Ready(nodes);
        }

        let lookup = Arc::clone(&self.inner.lookup);
        let fetch_key = key.clone();
        let result = self
            .inner
            .cache
            .try_get_with(key, async move {
                let records = lookup.fetch_locations(&fetch_key).await?;
                Ok::<_, ApiError>(normalize_all(&fetch_key, &records))
            })
            .await;

        match result {
            Ok(nodes) => Lookup::Ready(nodes),
            Err(e) => {
                warn!(error = %e, "Location lookup failed");
                Lookup::Unavailable
            }
        }
    }

    pub async fn provinces(&self) -> Lookup {
        self.get(LocationKey::Provinces).await
    }

    pub async fn districts(&self, province_id: ProvinceId) -> Lookup {
        self.get(LocationKey::Districts(province_id)).await
    }

    pub async fn wards(&self, district_id: DistrictId) -> Lookup {
        self.get(LocationKey::Wards(district_id)).await
    }

    /// Drop one list so the next read refetches it.
    pub async fn invalidate(&self, key: &LocationKey) {
        self.inner.cache.invalidate(key).await;
    }

    /// Drop every list.
    pub async fn invalidate_all(&self) {
        self.inner.cache.invalidate_all();
        self.inner.cache.run_pending_tasks().await;
    }

    /// Number of lists currently held, after pending housekeeping.
    pub async fn entry_count(&self) -> u64 {
        self.inner.cache.run_pending_tasks().await;
        self.inner.cache.entry_count()
    }
}

/// Run expiry housekeeping every `interval` on a background task.
fn spawn_sweeper(
    runtime: &tokio::runtime::Handle,
    cache: Cache<LocationKey, Arc<[LocationNode]>>,
    interval: Duration,
) -> JoinHandle<()> {
    runtime.spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            cache.run_pending_tasks().await;
            debug!(entries = cache.entry_count(), "Swept location cache");
        }
    })
}
