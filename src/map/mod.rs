//! Map assembly and HTML export. Everything here works on already-resolved
//! data; no network access happens until the page is opened in a browser.

use geo::{GeodesicDistance, Point};
use serde::Serialize;

use crate::geocode::GeoPoint;
use crate::places::{FacilityCategory, FacilityRecord};

pub const NEARBY_ZOOM: u8 = 13;
pub const ROUTE_ZOOM: u8 = 6;

const LEAFLET_VERSION: &str = "1.9.4";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerKind {
    UserLocation,
    Facility(FacilityCategory),
    RouteEnd,
}

impl MarkerKind {
    pub fn color(&self) -> &'static str {
        match self {
            MarkerKind::UserLocation => "red",
            MarkerKind::Facility(FacilityCategory::Hospital) => "blue",
            MarkerKind::Facility(FacilityCategory::Pharmacy) => "green",
            MarkerKind::Facility(FacilityCategory::Clinic) => "purple",
            MarkerKind::Facility(FacilityCategory::Doctors) => "orange",
            MarkerKind::Facility(FacilityCategory::Dentist) => "cadetblue",
            MarkerKind::RouteEnd => "darkblue",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Marker {
    pub point: GeoPoint,
    pub label: String,
    pub kind: MarkerKind,
}

/// Straight line between two points with its geodesic length.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteLine {
    pub start: GeoPoint,
    pub end: GeoPoint,
    pub midpoint: GeoPoint,
    /// Rounded to two decimals.
    pub distance_km: f64,
}

impl RouteLine {
    pub fn label(&self) -> String {
        format!("{:.2} km", self.distance_km)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapDocument {
    pub center: GeoPoint,
    pub zoom: u8,
    pub markers: Vec<Marker>,
    pub route: Option<RouteLine>,
}

/// Geodesic (WGS-84 ellipsoid) distance in kilometres.
pub fn geodesic_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let from = Point::new(a.lon, a.lat);
    let to = Point::new(b.lon, b.lat);
    from.geodesic_distance(&to) / 1000.0
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// One user-location marker at `center` plus one marker per facility.
pub fn compose(center: GeoPoint, center_label: &str, facilities: &[FacilityRecord]) -> MapDocument {
    let mut markers = Vec::with_capacity(facilities.len() + 1);
    markers.push(Marker {
        point: center,
        label: center_label.to_string(),
        kind: MarkerKind::UserLocation,
    });
    markers.extend(facilities.iter().map(|f| Marker {
        point: f.location,
        label: f.label(),
        kind: MarkerKind::Facility(f.category),
    }));

    MapDocument {
        center,
        zoom: NEARBY_ZOOM,
        markers,
        route: None,
    }
}

/// Map from `start` to `end` with the distance shown at the midpoint.
pub fn compose_route(start: GeoPoint, start_label: &str, end: GeoPoint, end_label: &str) -> MapDocument {
    compose(start, start_label, &[]).add_route(start, end, end_label)
}

impl MapDocument {
    /// Adds an end marker, the connecting line and the distance label, and
    /// re-centres on the midpoint.
    pub fn add_route(mut self, start: GeoPoint, end: GeoPoint, end_label: &str) -> Self {
        let midpoint = GeoPoint {
            lat: (start.lat + end.lat) / 2.0,
            lon: (start.lon + end.lon) / 2.0,
        };
        self.markers.push(Marker {
            point: end,
            label: end_label.to_string(),
            kind: MarkerKind::RouteEnd,
        });
        self.route = Some(RouteLine {
            start,
            end,
            midpoint,
            distance_km: round2(geodesic_km(start, end)),
        });
        self.center = midpoint;
        self.zoom = ROUTE_ZOOM;
        self
    }

    pub fn user_markers(&self) -> usize {
        self.markers
            .iter()
            .filter(|m| m.kind == MarkerKind::UserLocation)
            .count()
    }

    pub fn facility_markers(&self) -> usize {
        self.markers
            .iter()
            .filter(|m| matches!(m.kind, MarkerKind::Facility(_)))
            .count()
    }

    /// Standalone Leaflet page. Labels are inserted as text nodes, never as
    /// HTML.
    pub fn to_html(&self, title: &str) -> String {
        let payload = MapPayload::from(self);
        // Keeps the JSON from terminating the surrounding <script> element.
        let data = serde_json::to_string(&payload)
            .unwrap_or_else(|_| "{}".to_string())
            .replace("</", "<\\/");

        format!(
            r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>{title}</title>
<link rel="stylesheet" href="https://unpkg.com/leaflet@{v}/dist/leaflet.css">
<script src="https://unpkg.com/leaflet@{v}/dist/leaflet.js"></script>
<style>html, body, #map {{ height: 100%; margin: 0; }} .distance-label {{ font-size: 12pt; color: blue; white-space: nowrap; }}</style>
</head>
<body>
<div id="map"></div>
<script>
const data = {data};
const map = L.map('map').setView(data.center, data.zoom);
L.tileLayer('https://{{s}}.tile.openstreetmap.org/{{z}}/{{x}}/{{y}}.png', {{
  maxZoom: 19,
  attribution: '&copy; OpenStreetMap contributors'
}}).addTo(map);
function textNode(text) {{
  const el = document.createElement('div');
  el.textContent = text;
  return el;
}}
for (const m of data.markers) {{
  L.circleMarker([m.lat, m.lon], {{ radius: 8, color: m.color, fillColor: m.color, fillOpacity: 0.8 }})
    .bindPopup(textNode(m.label))
    .bindTooltip(textNode(m.label))
    .addTo(map);
}}
if (data.route) {{
  L.polyline(data.route.path, {{ color: 'blue', weight: 2.5, opacity: 1 }}).addTo(map);
  const label = textNode(data.route.label);
  label.className = 'distance-label';
  L.marker(data.route.midpoint, {{ icon: L.divIcon({{ html: label, className: '' }}) }})
    .bindTooltip(textNode('Distance: ' + data.route.label))
    .addTo(map);
}}
</script>
</body>
</html>
"#,
            title = escape_html(title),
            v = LEAFLET_VERSION,
            data = data,
        )
    }
}

#[derive(Serialize)]
struct MapPayload {
    center: [f64; 2],
    zoom: u8,
    markers: Vec<MarkerPayload>,
    route: Option<RoutePayload>,
}

#[derive(Serialize)]
struct MarkerPayload {
    lat: f64,
    lon: f64,
    label: String,
    color: &'static str,
}

#[derive(Serialize)]
struct RoutePayload {
    path: [[f64; 2]; 2],
    midpoint: [f64; 2],
    label: String,
}

impl From<&MapDocument> for MapPayload {
    fn from(doc: &MapDocument) -> Self {
        Self {
            center: [doc.center.lat, doc.center.lon],
            zoom: doc.zoom,
            markers: doc
                .markers
                .iter()
                .map(|m| MarkerPayload {
                    lat: m.point.lat,
                    lon: m.point.lon,
                    label: m.label.clone(),
                    color: m.kind.color(),
                })
                .collect(),
            route: doc.route.as_ref().map(|r| RoutePayload {
                path: [[r.start.lat, r.start.lon], [r.end.lat, r.end.lon]],
                midpoint: [r.midpoint.lat, r.midpoint.lon],
                label: r.label(),
            }),
        }
    }
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}
