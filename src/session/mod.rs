//! Per-request orchestration.
//!
//! `Idle → Validating → Resolving → Generating → Localizing → Rendering →
//! Done | Failed`. Only blank input and an unresolvable address stop a
//! request; every other component degrades in place.

use futures::future::join_all;
use std::fmt;
use tracing::{info, warn};

use crate::document::{DocumentRenderer, RenderedDocument};
use crate::error::{RenderError, ResolutionFailure, ValidationError};
use crate::geocode::{CoordinateResolver, GeoPoint, Resolution};
use crate::localize::{AudioClip, LocalizedText, Localizer};
use crate::map::{self, MapDocument};
use crate::places::{FacilityCategory, FacilityRecord, PlaceFinder, Radius};
use crate::report::{HealthReport, ReportGenerator};
use crate::voice::TextSource;

pub const USER_LOCATION_LABEL: &str = "Your Location";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Validating,
    Resolving,
    Generating,
    Localizing,
    Rendering,
    Done,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Idle => "Idle",
            Stage::Validating => "Checking input...",
            Stage::Resolving => "Locating address...",
            Stage::Generating => "Analyzing symptoms...",
            Stage::Localizing => "Translating report...",
            Stage::Rendering => "Preparing report and map...",
            Stage::Done => "Done",
            Stage::Failed => "Failed",
        };
        f.write_str(name)
    }
}

/// Receives stage transitions, e.g. to drive a spinner.
pub trait StageObserver: Send + Sync {
    fn on_stage(&self, stage: Stage);
}

#[derive(Debug, Clone)]
pub struct SessionRequest {
    pub symptoms: TextSource,
    pub address: String,
    /// User-supplied; clamped before any place search.
    pub radius_km: f64,
    pub language: String,
    pub speak: bool,
}

#[derive(Debug)]
pub struct SessionReport {
    pub location: GeoPoint,
    pub report: HealthReport,
    pub localized: LocalizedText,
    pub document: Result<RenderedDocument, RenderError>,
    pub radius: Radius,
    pub facilities: Vec<FacilityRecord>,
    pub map: MapDocument,
    pub speech: Option<AudioClip>,
}

#[derive(Debug)]
pub enum SessionOutcome {
    /// Missing input; nothing was sent anywhere.
    Warning(ValidationError),
    Failed(ResolutionFailure),
    Done(Box<SessionReport>),
}

pub struct Session {
    resolver: CoordinateResolver,
    generator: ReportGenerator,
    localizer: Localizer,
    renderer: DocumentRenderer,
    places: PlaceFinder,
    categories: Vec<FacilityCategory>,
    pivot_language: String,
}

fn validate(request: &SessionRequest) -> Result<(), ValidationError> {
    let symptoms_blank = request.symptoms.text().trim().is_empty();
    let address_blank = request.address.trim().is_empty();
    match (symptoms_blank, address_blank) {
        (true, true) => Err(ValidationError::EmptySymptomsAndAddress),
        (true, false) => Err(ValidationError::EmptySymptoms),
        (false, true) => Err(ValidationError::EmptyAddress),
        (false, false) => Ok(()),
    }
}

impl Session {
    pub fn new(
        resolver: CoordinateResolver,
        generator: ReportGenerator,
        localizer: Localizer,
        renderer: DocumentRenderer,
        places: PlaceFinder,
    ) -> Self {
        Self {
            resolver,
            generator,
            localizer,
            renderer,
            places,
            categories: vec![FacilityCategory::Hospital, FacilityCategory::Pharmacy],
            pivot_language: "en".to_string(),
        }
    }

    pub fn with_categories(mut self, categories: Vec<FacilityCategory>) -> Self {
        self.categories = categories;
        self
    }

    pub fn with_pivot_language(mut self, language: impl Into<String>) -> Self {
        self.pivot_language = language.into();
        self
    }

    pub async fn run(&self, request: &SessionRequest, observer: &dyn StageObserver) -> SessionOutcome {
        observer.on_stage(Stage::Validating);
        if let Err(e) = validate(request) {
            info!(reason = %e, "request rejected");
            observer.on_stage(Stage::Idle);
            return SessionOutcome::Warning(e);
        }

        observer.on_stage(Stage::Resolving);
        let location = match self.resolver.resolve(&request.address).await {
            Resolution::Resolved(point) => point,
            Resolution::Unresolved => {
                warn!(address = %request.address, "address could not be resolved");
                observer.on_stage(Stage::Failed);
                return SessionOutcome::Failed(ResolutionFailure {
                    address: request.address.trim().to_string(),
                });
            }
        };
        info!(%location, "address resolved");

        observer.on_stage(Stage::Generating);
        let symptoms = self
            .localizer
            .localize(request.symptoms.text(), &request.language, &self.pivot_language)
            .await;
        let report = match self.generator.generate(&symptoms.text, &self.pivot_language).await {
            Ok(report) => report,
            Err(e) => {
                observer.on_stage(Stage::Idle);
                return SessionOutcome::Warning(e);
            }
        };

        observer.on_stage(Stage::Localizing);
        let localized = self
            .localizer
            .localize(&report.text, &report.language, &request.language)
            .await;
        let speech = if request.speak {
            self.localizer
                .synthesize_speech(&localized.text, &localized.language)
                .await
        } else {
            None
        };

        observer.on_stage(Stage::Rendering);
        let document = self.renderer.render(&localized.text);
        if let Err(e) = &document {
            warn!(error = %e, "report document could not be rendered");
        }

        let radius = Radius::clamped_km(request.radius_km);
        let searches = self
            .categories
            .iter()
            .map(|category| self.places.find_nearby(location, *category, radius));
        let facilities: Vec<FacilityRecord> = join_all(searches).await.into_iter().flatten().collect();
        let map = map::compose(location, USER_LOCATION_LABEL, &facilities);

        info!(
            facilities = facilities.len(),
            radius_km = radius.km(),
            translated = localized.is_translated(),
            "session complete"
        );
        observer.on_stage(Stage::Done);

        SessionOutcome::Done(Box::new(SessionReport {
            location,
            report,
            localized,
            document,
            radius,
            facilities,
            map,
            speech,
        }))
    }
}

#[derive(Debug)]
pub enum RouteOutcome {
    Warning(ValidationError),
    Failed(ResolutionFailure),
    Done(MapDocument),
}

/// Resolve both places and draw the straight route between them.
pub async fn plan_route(resolver: &CoordinateResolver, from: &str, to: &str) -> RouteOutcome {
    if from.trim().is_empty() || to.trim().is_empty() {
        return RouteOutcome::Warning(ValidationError::EmptyAddress);
    }

    let (start, end) = futures::join!(resolver.resolve(from), resolver.resolve(to));
    let Some(start) = start.point() else {
        return RouteOutcome::Failed(ResolutionFailure {
            address: from.trim().to_string(),
        });
    };
    let Some(end) = end.point() else {
        return RouteOutcome::Failed(ResolutionFailure {
            address: to.trim().to_string(),
        });
    };

    let map = map::compose_route(
        start,
        &format!("Start Location: {}", from.trim()),
        end,
        &format!("End Location: {}", to.trim()),
    );
    if let Some(route) = &map.route {
        info!(from, to, distance_km = route.distance_km, "route planned");
    }
    RouteOutcome::Done(map)
}
