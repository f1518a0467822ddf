use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::AppConfig;
use crate::error::ServiceError;
use crate::geocode::GeoPoint;
use crate::http::{self, RetryPolicy};

pub const MIN_RADIUS_KM: f64 = 1.0;
pub const MAX_RADIUS_KM: f64 = 20.0;
pub const DEFAULT_RADIUS_KM: f64 = 5.0;

/// OpenStreetMap `amenity` values we search for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FacilityCategory {
    Hospital,
    Pharmacy,
    Clinic,
    Doctors,
    Dentist,
}

impl FacilityCategory {
    pub const ALL: [FacilityCategory; 5] = [
        FacilityCategory::Hospital,
        FacilityCategory::Pharmacy,
        FacilityCategory::Clinic,
        FacilityCategory::Doctors,
        FacilityCategory::Dentist,
    ];

    pub fn amenity_tag(&self) -> &'static str {
        match self {
            FacilityCategory::Hospital => "hospital",
            FacilityCategory::Pharmacy => "pharmacy",
            FacilityCategory::Clinic => "clinic",
            FacilityCategory::Doctors => "doctors",
            FacilityCategory::Dentist => "dentist",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            FacilityCategory::Hospital => "Hospital",
            FacilityCategory::Pharmacy => "Pharmacy",
            FacilityCategory::Clinic => "Clinic",
            FacilityCategory::Doctors => "Doctor",
            FacilityCategory::Dentist => "Dentist",
        }
    }
}

impl fmt::Display for FacilityCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.amenity_tag())
    }
}

impl FromStr for FacilityCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        FacilityCategory::ALL
            .into_iter()
            .find(|c| c.amenity_tag() == wanted)
            .ok_or_else(|| {
                let known: Vec<_> = FacilityCategory::ALL.iter().map(|c| c.amenity_tag()).collect();
                format!("unknown facility category '{}' (expected one of: {})", s, known.join(", "))
            })
    }
}

/// Search radius, always within `[MIN_RADIUS_KM, MAX_RADIUS_KM]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Radius(f64);

impl Radius {
    pub fn clamped_km(km: f64) -> Self {
        let km = if km.is_finite() { km } else { DEFAULT_RADIUS_KM };
        Self(km.clamp(MIN_RADIUS_KM, MAX_RADIUS_KM))
    }

    pub fn km(&self) -> f64 {
        self.0
    }

    pub fn meters(&self) -> u32 {
        (self.0 * 1000.0).round() as u32
    }
}

impl Default for Radius {
    fn default() -> Self {
        Self(DEFAULT_RADIUS_KM)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FacilityRecord {
    pub category: FacilityCategory,
    pub location: GeoPoint,
    pub name: Option<String>,
}

impl FacilityRecord {
    pub fn label(&self) -> String {
        match &self.name {
            Some(name) => format!("{} ({})", name, self.category.display_name()),
            None => self.category.display_name().to_string(),
        }
    }
}

#[async_trait]
pub trait PlaceSearchService: Send + Sync {
    async fn search(
        &self,
        center: GeoPoint,
        category: FacilityCategory,
        radius: Radius,
    ) -> Result<Vec<FacilityRecord>, ServiceError>;
}

#[derive(Debug, Deserialize)]
struct OverpassResponse {
    #[serde(default)]
    elements: Vec<OverpassElement>,
}

#[derive(Debug, Deserialize)]
struct OverpassElement {
    lat: Option<f64>,
    lon: Option<f64>,
    center: Option<OverpassCenter>,
    #[serde(default)]
    tags: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct OverpassCenter {
    lat: f64,
    lon: f64,
}

impl OverpassElement {
    /// Nodes carry coordinates directly, ways only through `out center`.
    fn into_record(self, category: FacilityCategory) -> Option<FacilityRecord> {
        let (lat, lon) = match (self.lat, self.lon, self.center) {
            (Some(lat), Some(lon), _) => (lat, lon),
            (_, _, Some(center)) => (center.lat, center.lon),
            _ => return None,
        };
        let location = GeoPoint::new(lat, lon)?;
        let name = self.tags.get("name").map(|n| n.trim().to_string()).filter(|n| !n.is_empty());
        Some(FacilityRecord {
            category,
            location,
            name,
        })
    }
}

/// Overpass QL for amenity nodes and ways inside a circle.
pub fn overpass_query(center: GeoPoint, category: FacilityCategory, radius: Radius) -> String {
    let tag = category.amenity_tag();
    let around = format!("around:{},{},{}", radius.meters(), center.lat, center.lon);
    format!(
        "[out:json];(node[\"amenity\"=\"{tag}\"]({around});way[\"amenity\"=\"{tag}\"]({around}););out center;"
    )
}

fn parse_overpass(body: &str, category: FacilityCategory) -> Result<Vec<FacilityRecord>, ServiceError> {
    let response: OverpassResponse =
        serde_json::from_str(body).map_err(|e| ServiceError::Malformed(e.to_string()))?;
    Ok(response
        .elements
        .into_iter()
        .filter_map(|el| el.into_record(category))
        .collect())
}

/// Overpass API interpreter endpoint.
pub struct OverpassClient {
    client: Client,
    base_url: String,
    retry: RetryPolicy,
}

impl OverpassClient {
    pub fn new(config: &AppConfig) -> Result<Self, ServiceError> {
        Ok(Self {
            client: http::build_client(&config.user_agent, config.network.timeout())?,
            base_url: config.places.base_url.clone(),
            retry: RetryPolicy::from_config(&config.network),
        })
    }
}

#[async_trait]
impl PlaceSearchService for OverpassClient {
    async fn search(
        &self,
        center: GeoPoint,
        category: FacilityCategory,
        radius: Radius,
    ) -> Result<Vec<FacilityRecord>, ServiceError> {
        let query = overpass_query(center, category, radius);
        let response = http::send_with_retry(self.retry, "place-search", || {
            self.client.post(&self.base_url).form(&[("data", query.as_str())])
        })
        .await?;
        let body = response.text().await?;
        parse_overpass(&body, category)
    }
}

/// Finds amenities around a resolved point. Never fails: an unreachable
/// service looks the same as an empty neighbourhood.
#[derive(Clone)]
pub struct PlaceFinder {
    service: Arc<dyn PlaceSearchService>,
}

impl PlaceFinder {
    pub fn new(service: Arc<dyn PlaceSearchService>) -> Self {
        Self { service }
    }

    pub async fn find_nearby(
        &self,
        center: GeoPoint,
        category: FacilityCategory,
        radius: Radius,
    ) -> Vec<FacilityRecord> {
        match self.service.search(center, category, radius).await {
            Ok(records) => {
                debug!(%category, count = records.len(), radius_m = radius.meters(), "nearby search done");
                records
            }
            Err(e) => {
                warn!(%category, error = %e, "nearby search failed");
                Vec::new()
            }
        }
    }
}
