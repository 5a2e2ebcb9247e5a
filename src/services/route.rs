// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Event route loading and route conformance checking.
//!
//! Distances to the route use a flattened 3-D projection
//! (`x = R cos(lon)`, `y = R sin(lon)`, `z = R sin(lat)`), which is only
//! accurate for short segments. Penalties accrue in proportion to the
//! wall-clock time between updates, so a sparser GPS cadence yields a
//! different total for the same excursion.

use geo::{Distance, Haversine, LineString, Point};
use geojson::GeoJson;
use std::fs;
use std::path::Path;

use crate::config::RouteConfig;
use crate::models::{EventRoute, PathPoint, Run};

/// Mean Earth radius in meters.
const EARTH_RADIUS_M: f64 = 6_371_008.8;

type Vec3 = [f64; 3];

fn to_cartesian(point: Point<f64>) -> Vec3 {
    let lat = point.y().to_radians();
    let lon = point.x().to_radians();
    [
        EARTH_RADIUS_M * lon.cos(),
        EARTH_RADIUS_M * lon.sin(),
        EARTH_RADIUS_M * lat.sin(),
    ]
}

fn sub(a: &Vec3, b: &Vec3) -> Vec3 {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

fn dot(a: &Vec3, b: &Vec3) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

fn norm(a: &Vec3) -> f64 {
    dot(a, a).sqrt()
}

/// Distance from `p` to the segment `a`-`b`.
fn distance_to_segment(p: &Vec3, a: &Vec3, b: &Vec3) -> f64 {
    let ab = sub(b, a);
    let ap = sub(p, a);
    let len2 = dot(&ab, &ab);
    if len2 == 0.0 {
        return norm(&ap);
    }
    let t = (dot(&ap, &ab) / len2).clamp(0.0, 1.0);
    let closest = [a[0] + t * ab[0], a[1] + t * ab[1], a[2] + t * ab[2]];
    norm(&sub(p, &closest))
}

/// Outcome of checking one location against the route.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RouteVerdict {
    OnRoute,
    OffRoute { distance: f64, penalty: f64 },
    /// Penalty exceeded the ceiling; the run must be aborted.
    Disqualified { penalty: f64 },
    /// Last waypoint reached with the declared distance covered.
    Finished,
}

/// Tracks a runner's progress along an event route.
#[derive(Debug, Clone)]
pub struct RouteChecker {
    route: EventRoute,
    config: RouteConfig,
    waypoints: Vec<Vec3>,
    active: bool,
}

impl RouteChecker {
    pub fn new(route: EventRoute, config: RouteConfig) -> Self {
        let waypoints = route.waypoints.iter().copied().map(to_cartesian).collect();
        Self {
            route,
            config,
            waypoints,
            active: true,
        }
    }

    pub fn route(&self) -> &EventRoute {
        &self.route
    }

    /// False once the run finished or was disqualified.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Distance from `point` to the route segment ending at waypoint `cur`.
    ///
    /// `cur` past the end means the last waypoint. `None` if the route has
    /// no waypoints.
    pub fn distance_from_route(&self, point: Point<f64>, cur: usize) -> Option<f64> {
        let last = self.waypoints.len().checked_sub(1)?;
        Some(self.distance_to(&to_cartesian(point), cur.min(last)))
    }

    fn distance_to(&self, p: &Vec3, cur: usize) -> f64 {
        match cur {
            0 => norm(&sub(p, &self.waypoints[0])),
            _ => distance_to_segment(p, &self.waypoints[cur - 1], &self.waypoints[cur]),
        }
    }

    /// Check one accepted location. Updates `run.cur` and `run.penalty`.
    ///
    /// `elapsed_ms` is the time since the previous checked location.
    pub fn check(&mut self, point: &PathPoint, elapsed_ms: i64, run: &mut Run) -> RouteVerdict {
        if !self.active || self.waypoints.is_empty() {
            return RouteVerdict::OnRoute;
        }

        let last = self.waypoints.len() - 1;
        let mut cur = run.cur.unwrap_or(0).min(last);
        let p = to_cartesian(point.point());

        let verdict = loop {
            let distance = self.distance_to(&p, cur);
            if distance > self.route.tolerance {
                let excess = distance - self.route.tolerance;
                let penalty = run.penalty.unwrap_or(0.0) + elapsed_ms.max(0) as f64 * excess;
                run.penalty = Some(penalty);
                tracing::warn!(
                    event = %self.route.id,
                    cur,
                    distance,
                    penalty,
                    "Runner off route"
                );
                if penalty > self.config.penalty_ceiling {
                    self.active = false;
                    break RouteVerdict::Disqualified { penalty };
                }
                break RouteVerdict::OffRoute { distance, penalty };
            }

            if cur < last && norm(&sub(&p, &self.waypoints[cur])) < self.config.proximity {
                cur += 1;
                tracing::debug!(event = %self.route.id, cur, "Waypoint reached");
                continue;
            }
            break RouteVerdict::OnRoute;
        };
        run.cur = Some(cur);

        if verdict == RouteVerdict::OnRoute && cur == last && point.distance >= self.route.distance
        {
            self.active = false;
            return RouteVerdict::Finished;
        }
        verdict
    }
}

/// Haversine length of a waypoint sequence.
pub fn route_length(waypoints: &[Point<f64>]) -> f64 {
    waypoints
        .windows(2)
        .map(|pair| Haversine.distance(pair[0], pair[1]))
        .sum()
}

/// Service for loading event routes.
#[derive(Default, Clone)]
pub struct RouteService {
    routes: Vec<EventRoute>,
    default_tolerance: f64,
}

impl RouteService {
    pub fn new(config: &RouteConfig) -> Self {
        Self {
            routes: Vec::new(),
            default_tolerance: config.default_tolerance,
        }
    }

    /// Load routes from a GeoJSON file.
    pub fn load_from_file<P: AsRef<Path>>(
        path: P,
        config: &RouteConfig,
    ) -> Result<Self, RouteError> {
        let json_data =
            fs::read_to_string(path.as_ref()).map_err(|e| RouteError::IoError(e.to_string()))?;
        Self::load_from_json(&json_data, config)
    }

    /// Load routes from a GeoJSON FeatureCollection of LineStrings.
    ///
    /// Feature properties: `id` (required), `name`, `distance` (meters,
    /// defaults to the line length) and `tolerance` (meters).
    pub fn load_from_json(json_data: &str, config: &RouteConfig) -> Result<Self, RouteError> {
        let geojson: GeoJson = json_data
            .parse()
            .map_err(|e: geojson::Error| RouteError::ParseError(e.to_string()))?;

        let mut service = Self::new(config);

        if let GeoJson::FeatureCollection(collection) = geojson {
            for feature in collection.features {
                let Some(id) = feature
                    .property("id")
                    .and_then(|v| v.as_str())
                    .map(str::to_string)
                else {
                    continue;
                };
                let name = feature
                    .property("name")
                    .and_then(|v| v.as_str())
                    .unwrap_or(&id)
                    .to_string();
                let distance = feature.property("distance").and_then(|v| v.as_f64());
                let tolerance = feature.property("tolerance").and_then(|v| v.as_f64());

                if let Some(geom) = feature.geometry {
                    let line: LineString<f64> = geom
                        .value
                        .try_into()
                        .map_err(|_| RouteError::UnsupportedGeometry)?;
                    let waypoints: Vec<Point<f64>> = line.points().collect();
                    service.add(id, name, waypoints, distance, tolerance)?;
                }
            }
        }

        tracing::info!(count = service.routes.len(), "Loaded event routes");
        Ok(service)
    }

    /// Add a route from an encoded polyline (precision 5).
    pub fn add_polyline(
        &mut self,
        id: impl Into<String>,
        name: impl Into<String>,
        encoded: &str,
        distance: Option<f64>,
        tolerance: Option<f64>,
    ) -> Result<&EventRoute, RouteError> {
        let line = polyline::decode_polyline(encoded, 5)
            .map_err(|e| RouteError::PolylineError(e.to_string()))?;
        self.add(
            id.into(),
            name.into(),
            line.points().collect(),
            distance,
            tolerance,
        )
    }

    fn add(
        &mut self,
        id: String,
        name: String,
        waypoints: Vec<Point<f64>>,
        distance: Option<f64>,
        tolerance: Option<f64>,
    ) -> Result<&EventRoute, RouteError> {
        if waypoints.is_empty() {
            return Err(RouteError::EmptyRoute(id));
        }
        let distance = distance.unwrap_or_else(|| route_length(&waypoints));
        self.routes.retain(|r| r.id != id);
        self.routes.push(EventRoute {
            id,
            name,
            waypoints,
            distance,
            tolerance: tolerance.unwrap_or(self.default_tolerance),
        });
        Ok(&self.routes[self.routes.len() - 1])
    }

    pub fn routes(&self) -> &[EventRoute] {
        &self.routes
    }

    pub fn get(&self, id: &str) -> Option<&EventRoute> {
        self.routes.iter().find(|r| r.id == id)
    }
}

/// Errors from route loading.
#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    #[error("Failed to read file: {0}")]
    IoError(String),

    #[error("Failed to parse GeoJSON: {0}")]
    ParseError(String),

    #[error("Unsupported geometry type (expected LineString)")]
    UnsupportedGeometry,

    #[error("Failed to decode polyline: {0}")]
    PolylineError(String),

    #[error("Route {0} has no waypoints")]
    EmptyRoute(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LocationSample;

    fn config() -> RouteConfig {
        RouteConfig {
            default_tolerance: 20.0,
            proximity: 25.0,
            penalty_ceiling: 1_000_000.0,
        }
    }

    fn at(lat: f64, lon: f64, distance: f64) -> PathPoint {
        PathPoint {
            distance,
            ..PathPoint::at(&LocationSample::new(lat, lon, 0.0, 0))
        }
    }

    /// Three waypoints ~111 m apart going north along lon 7.
    fn route() -> EventRoute {
        EventRoute {
            id: "north".to_string(),
            name: "North".to_string(),
            waypoints: vec![
                Point::new(7.0, 45.0),
                Point::new(7.0, 45.001),
                Point::new(7.0, 45.002),
            ],
            distance: 200.0,
            tolerance: 20.0,
        }
    }

    #[test]
    fn test_segment_distance_on_meridian_is_zero() {
        let checker = RouteChecker::new(route(), config());
        let d = checker.distance_from_route(Point::new(7.0, 45.0005), 1).unwrap();
        assert!(d < 1e-6, "got {}", d);
    }

    #[test]
    fn test_distance_clamped_to_segment_end() {
        let checker = RouteChecker::new(route(), config());
        let beyond = checker.distance_from_route(Point::new(7.0, 45.0015), 1).unwrap();
        let to_end = checker.distance_from_route(Point::new(7.0, 45.0015), 0).unwrap();
        assert!(beyond > 0.0);
        assert!(to_end > beyond, "cur 0 measures to the first waypoint only");
    }

    #[test]
    fn test_distance_handles_out_of_range_cur_and_empty_route() {
        let checker = RouteChecker::new(route(), config());
        let p = Point::new(7.0, 45.003);
        assert_eq!(
            checker.distance_from_route(p, 99),
            checker.distance_from_route(p, 2)
        );

        let empty = EventRoute {
            waypoints: Vec::new(),
            ..route()
        };
        let checker = RouteChecker::new(empty, config());
        assert_eq!(checker.distance_from_route(p, 0), None);
    }

    #[test]
    fn test_cur_advances_through_nearby_waypoints() {
        let mut checker = RouteChecker::new(route(), config());
        let mut run = Run::new("alice").for_event("north");
        run.cur = Some(0);

        let verdict = checker.check(&at(45.0, 7.0, 0.0), 1000, &mut run);
        assert_eq!(verdict, RouteVerdict::OnRoute);
        assert_eq!(run.cur, Some(1));

        let verdict = checker.check(&at(45.001, 7.0, 111.0), 1000, &mut run);
        assert_eq!(verdict, RouteVerdict::OnRoute);
        assert_eq!(run.cur, Some(2));
    }

    #[test]
    fn test_finish_requires_declared_distance() {
        let mut checker = RouteChecker::new(route(), config());
        let mut run = Run::new("alice").for_event("north");
        run.cur = Some(2);

        let short = checker.check(&at(45.002, 7.0, 150.0), 1000, &mut run);
        assert_eq!(short, RouteVerdict::OnRoute);

        let done = checker.check(&at(45.002, 7.0, 222.0), 1000, &mut run);
        assert_eq!(done, RouteVerdict::Finished);
        assert!(!checker.is_active());
    }

    #[test]
    fn test_penalty_ceiling_disqualifies() {
        let mut checker = RouteChecker::new(route(), config());
        let mut run = Run::new("alice").for_event("north");
        run.cur = Some(1);

        // 0.001 degree east is about 111 m off the route in the projection
        let off = at(45.0005, 7.001, 50.0);
        assert!(matches!(
            checker.check(&off, 10_000, &mut run),
            RouteVerdict::OffRoute { .. }
        ));
        assert!(matches!(
            checker.check(&off, 10_000, &mut run),
            RouteVerdict::Disqualified { .. }
        ));
        assert!(!checker.is_active());
        assert_eq!(checker.check(&off, 10_000, &mut run), RouteVerdict::OnRoute);
    }

    #[test]
    fn test_load_routes_from_geojson() {
        let json = r#"{
            "type": "FeatureCollection",
            "features": [
                {
                    "type": "Feature",
                    "properties": { "id": "loop", "name": "Park Loop", "tolerance": 30.0 },
                    "geometry": { "type": "LineString", "coordinates": [[7.0, 45.0], [7.0, 45.001]] }
                },
                {
                    "type": "Feature",
                    "properties": { "name": "No id" },
                    "geometry": { "type": "LineString", "coordinates": [[7.0, 45.0], [7.0, 45.001]] }
                }
            ]
        }"#;
        let service = RouteService::load_from_json(json, &config()).unwrap();
        assert_eq!(service.routes().len(), 1);

        let route = service.get("loop").unwrap();
        assert_eq!(route.name, "Park Loop");
        assert_eq!(route.tolerance, 30.0);
        assert!((route.distance - 111.2).abs() < 0.5, "got {}", route.distance);
    }

    #[test]
    fn test_polyline_route_uses_default_tolerance() {
        let mut service = RouteService::new(&config());
        // Google's documented example polyline
        let route = service
            .add_polyline("ex", "Example", "_p~iF~ps|U_ulLnnqC_mqNvxq`@", None, None)
            .unwrap();
        assert_eq!(route.waypoints.len(), 3);
        assert_eq!(route.tolerance, 20.0);
        assert!(route.distance > 0.0);
    }

    #[test]
    fn test_point_polygon_geometry_rejected() {
        let json = r#"{
            "type": "FeatureCollection",
            "features": [{
                "type": "Feature",
                "properties": { "id": "bad" },
                "geometry": { "type": "Point", "coordinates": [7.0, 45.0] }
            }]
        }"#;
        assert!(matches!(
            RouteService::load_from_json(json, &config()),
            Err(RouteError::UnsupportedGeometry)
        ));
    }
}
