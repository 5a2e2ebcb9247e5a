// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from environment variables.
//!
//! Every threshold used by the filters, the route checker and the
//! synchronization loops is configuration rather than a constant.

use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Location noise filter thresholds.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationFilterConfig {
    /// Moving-average window for latitude
    pub lat_window: usize,
    /// Moving-average window for longitude
    pub lon_window: usize,
    /// Moving-average window for altitude
    pub alt_window: usize,
    /// Samples closer than this (meters) to every recent sample are jitter
    pub radius: f64,
    /// Number of recently accepted samples remembered (at least 1)
    pub rate: usize,
    /// Force-accept after this many milliseconds without an accepted sample
    pub max_update_interval_ms: i64,
}

impl Default for LocationFilterConfig {
    fn default() -> Self {
        Self {
            lat_window: 3,
            lon_window: 3,
            alt_window: 5,
            radius: 5.0,
            rate: 3,
            max_update_interval_ms: 10_000,
        }
    }
}

/// Rolling speed estimator settings.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeedConfig {
    /// Minimum time span of the estimation window (ms)
    pub min_span_ms: i64,
    /// Speed reported before any history exists (m/s)
    pub default_speed: f64,
}

impl Default for SpeedConfig {
    fn default() -> Self {
        Self {
            min_span_ms: 10_000,
            default_speed: 0.5,
        }
    }
}

/// Route conformance thresholds for event runs.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteConfig {
    /// Tolerance used when a route does not declare its own (meters)
    pub default_tolerance: f64,
    /// Distance to the next waypoint that counts as reaching it (meters)
    pub proximity: f64,
    /// Accumulated penalty (meter-milliseconds) that disqualifies a run
    pub penalty_ceiling: f64,
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self {
            default_tolerance: 50.0,
            proximity: 25.0,
            penalty_ceiling: 3_000_000.0,
        }
    }
}

/// Everything the run state machine needs.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackingConfig {
    pub filter: LocationFilterConfig,
    pub speed: SpeedConfig,
    pub route: RouteConfig,
    /// Body weight used for energy expenditure (kg)
    pub body_weight_kg: f64,
    /// Cadence of the running-time ticker
    pub tick_interval: Duration,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            filter: LocationFilterConfig::default(),
            speed: SpeedConfig::default(),
            route: RouteConfig::default(),
            body_weight_kg: 70.0,
            tick_interval: Duration::from_millis(1000),
        }
    }
}

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Owner of the runs tracked on this device
    pub user: String,
    /// Base URL of the remote run service
    pub remote_base_url: String,
    /// Bearer token for the remote run service
    pub remote_token: Option<String>,
    /// Path of the local durable store document
    pub store_path: String,
    pub tracking: TrackingConfig,
    /// Interval between reconciliation passes
    pub reconcile_interval: Duration,
    /// Interval between polls of another participant's run
    pub viewer_poll_interval: Duration,
}

impl Default for Config {
    /// Default config for testing only.
    fn default() -> Self {
        Self {
            user: "test_user".to_string(),
            remote_base_url: "http://localhost:8080/api".to_string(),
            remote_token: None,
            store_path: "run-store.json".to_string(),
            tracking: TrackingConfig::default(),
            reconcile_interval: Duration::from_secs(30),
            viewer_poll_interval: Duration::from_secs(5),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Only `RUN_USER` is required; everything else has a default.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let defaults = Config::default();
        let filter = LocationFilterConfig {
            lat_window: env_or("FILTER_LAT_WINDOW", defaults.tracking.filter.lat_window)?,
            lon_window: env_or("FILTER_LON_WINDOW", defaults.tracking.filter.lon_window)?,
            alt_window: env_or("FILTER_ALT_WINDOW", defaults.tracking.filter.alt_window)?,
            radius: env_or("FILTER_RADIUS_M", defaults.tracking.filter.radius)?,
            rate: env_or("FILTER_RATE", defaults.tracking.filter.rate)?.max(1),
            max_update_interval_ms: env_or(
                "FILTER_MAX_UPDATE_INTERVAL_MS",
                defaults.tracking.filter.max_update_interval_ms,
            )?,
        };
        let speed = SpeedConfig {
            min_span_ms: env_or("SPEED_WINDOW_MS", defaults.tracking.speed.min_span_ms)?,
            default_speed: env_or("SPEED_DEFAULT_MPS", defaults.tracking.speed.default_speed)?,
        };
        let route = RouteConfig {
            default_tolerance: env_or(
                "ROUTE_TOLERANCE_M",
                defaults.tracking.route.default_tolerance,
            )?,
            proximity: env_or("ROUTE_PROXIMITY_M", defaults.tracking.route.proximity)?,
            penalty_ceiling: env_or("PENALTY_CEILING", defaults.tracking.route.penalty_ceiling)?,
        };

        Ok(Self {
            user: env::var("RUN_USER")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("RUN_USER"))?,
            remote_base_url: env::var("REMOTE_BASE_URL").unwrap_or(defaults.remote_base_url),
            remote_token: env::var("REMOTE_TOKEN")
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty()),
            store_path: env::var("STORE_PATH").unwrap_or(defaults.store_path),
            tracking: TrackingConfig {
                filter,
                speed,
                route,
                body_weight_kg: env_or("BODY_WEIGHT_KG", defaults.tracking.body_weight_kg)?,
                tick_interval: Duration::from_millis(env_or("TICK_INTERVAL_MS", 1000u64)?),
            },
            reconcile_interval: Duration::from_secs(env_or("RECONCILE_INTERVAL_SECS", 30u64)?),
            viewer_poll_interval: Duration::from_secs(env_or("VIEWER_POLL_INTERVAL_SECS", 5u64)?),
        })
    }
}

/// Read and parse an optional environment variable.
fn env_or<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(name, raw)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {0}: {1:?}")]
    Invalid(&'static str, String),
}
