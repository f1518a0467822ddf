use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::AppConfig;
use crate::error::ServiceError;
use crate::http::{self, RetryPolicy};

/// Latitude/longitude pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    /// Checked constructor; rejects non-finite and out-of-range values.
    pub fn new(lat: f64, lon: f64) -> Option<Self> {
        let valid = lat.is_finite()
            && lon.is_finite()
            && (-90.0..=90.0).contains(&lat)
            && (-180.0..=180.0).contains(&lon);
        valid.then_some(Self { lat, lon })
    }
}

impl fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.5}, {:.5})", self.lat, self.lon)
    }
}

/// One candidate from the geocoding service, coordinates still unparsed.
#[derive(Debug, Clone, Deserialize)]
pub struct GeoCandidate {
    pub lat: String,
    pub lon: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

/// Outcome of resolving a free-text address.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Resolution {
    Resolved(GeoPoint),
    Unresolved,
}

impl Resolution {
    pub fn point(&self) -> Option<GeoPoint> {
        match self {
            Resolution::Resolved(point) => Some(*point),
            Resolution::Unresolved => None,
        }
    }
}

#[async_trait]
pub trait GeocodingService: Send + Sync {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<GeoCandidate>, ServiceError>;
}

/// Nominatim `/search` endpoint.
pub struct NominatimClient {
    client: Client,
    base_url: String,
    retry: RetryPolicy,
}

impl NominatimClient {
    pub fn new(config: &AppConfig) -> Result<Self, ServiceError> {
        Ok(Self {
            client: http::build_client(&config.user_agent, config.network.timeout())?,
            base_url: config.geocoding.base_url.trim_end_matches('/').to_string(),
            retry: RetryPolicy::from_config(&config.network),
        })
    }
}

#[async_trait]
impl GeocodingService for NominatimClient {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<GeoCandidate>, ServiceError> {
        let url = format!("{}/search", self.base_url);
        let limit = limit.to_string();
        let response = http::send_with_retry(self.retry, "geocoding", || {
            self.client
                .get(&url)
                .query(&[("q", query), ("format", "json"), ("limit", limit.as_str())])
        })
        .await?;

        response
            .json::<Vec<GeoCandidate>>()
            .await
            .map_err(|e| ServiceError::Malformed(e.to_string()))
    }
}

/// Turns place descriptions into coordinates. Failure is a normal outcome.
#[derive(Clone)]
pub struct CoordinateResolver {
    service: Arc<dyn GeocodingService>,
}

impl CoordinateResolver {
    pub fn new(service: Arc<dyn GeocodingService>) -> Self {
        Self { service }
    }

    pub async fn resolve(&self, address: &str) -> Resolution {
        let address = address.trim();
        if address.is_empty() {
            return Resolution::Unresolved;
        }

        let candidates = match self.service.search(address, 1).await {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!(address, error = %e, "geocoding failed");
                return Resolution::Unresolved;
            }
        };

        let Some(first) = candidates.first() else {
            debug!(address, "no geocoding candidates");
            return Resolution::Unresolved;
        };

        let parsed = first
            .lat
            .trim()
            .parse::<f64>()
            .ok()
            .zip(first.lon.trim().parse::<f64>().ok())
            .and_then(|(lat, lon)| GeoPoint::new(lat, lon));

        match parsed {
            Some(point) => {
                debug!(
                    address,
                    %point,
                    name = first.display_name.as_deref().unwrap_or(""),
                    "address resolved"
                );
                Resolution::Resolved(point)
            }
            None => {
                warn!(address, lat = %first.lat, lon = %first.lon, "malformed coordinates in geocoding response");
                Resolution::Unresolved
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Deterministic geocoder answering from a fixed table.
    #[derive(Default)]
    pub(crate) struct FakeGeocoder {
        pub places: HashMap<String, (String, String)>,
        pub fail: bool,
        pub calls: AtomicUsize,
    }

    impl FakeGeocoder {
        pub(crate) fn with(places: &[(&str, f64, f64)]) -> Self {
            Self {
                places: places
                    .iter()
                    .map(|(name, lat, lon)| (name.to_string(), (lat.to_string(), lon.to_string())))
                    .collect(),
                ..Self::default()
            }
        }

        pub(crate) fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl GeocodingService for FakeGeocoder {
        async fn search(&self, query: &str, _limit: usize) -> Result<Vec<GeoCandidate>, ServiceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ServiceError::Status(503));
            }
            Ok(self
                .places
                .get(query)
                .map(|(lat, lon)| {
                    vec![GeoCandidate {
                        lat: lat.clone(),
                        lon: lon.clone(),
                        display_name: Some(query.to_string()),
                    }]
                })
                .unwrap_or_default())
        }
    }

    #[tokio::test]
    async fn test_resolves_first_candidate() {
        let fake = Arc::new(FakeGeocoder::with(&[("Paris, France", 48.8566, 2.3522)]));
        let resolver = CoordinateResolver::new(fake);

        let point = resolver.resolve("Paris, France").await.point().unwrap();
        assert!((point.lat - 48.85).abs() < 0.1);
        assert!((point.lon - 2.35).abs() < 0.1);
    }

    #[tokio::test]
    async fn test_zero_candidates_is_unresolved() {
        let resolver = CoordinateResolver::new(Arc::new(FakeGeocoder::default()));
        assert_eq!(
            resolver.resolve("Qwxyznotarealplace123").await,
            Resolution::Unresolved
        );
    }

    #[tokio::test]
    async fn test_service_error_is_unresolved() {
        let fake = Arc::new(FakeGeocoder {
            fail: true,
            ..FakeGeocoder::default()
        });
        let resolver = CoordinateResolver::new(fake);
        assert_eq!(resolver.resolve("London").await, Resolution::Unresolved);
    }

    #[tokio::test]
    async fn test_malformed_coordinates_are_unresolved() {
        let mut fake = FakeGeocoder::default();
        fake.places
            .insert("Nowhere".to_string(), ("north".to_string(), "2.0".to_string()));
        fake.places
            .insert("Offworld".to_string(), ("123.0".to_string(), "2.0".to_string()));
        let resolver = CoordinateResolver::new(Arc::new(fake));

        assert_eq!(resolver.resolve("Nowhere").await, Resolution::Unresolved);
        assert_eq!(resolver.resolve("Offworld").await, Resolution::Unresolved);
    }

    #[tokio::test]
    async fn test_blank_address_skips_service() {
        let fake = Arc::new(FakeGeocoder::default());
        let resolver = CoordinateResolver::new(fake.clone());
        assert_eq!(resolver.resolve("   ").await, Resolution::Unresolved);
        assert_eq!(fake.calls(), 0);
    }

    #[test]
    fn test_candidate_parses_nominatim_json() {
        let body = r#"[{"place_id": 1, "lat": "48.8534951", "lon": "2.3483915", "display_name": "Paris, France"}]"#;
        let candidates: Vec<GeoCandidate> = serde_json::from_str(body).unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].lat, "48.8534951");
    }

    #[test]
    fn test_geopoint_rejects_out_of_range() {
        assert!(GeoPoint::new(91.0, 0.0).is_none());
        assert!(GeoPoint::new(0.0, f64::NAN).is_none());
        assert!(GeoPoint::new(-33.9, 151.2).is_some());
    }
}
