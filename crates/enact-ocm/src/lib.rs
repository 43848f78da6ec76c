//! `enact-ocm` — adapter for the Open Charge Map search API.
//!
//! Two lookups are offered through the [`StationSource`] trait: a single
//! station by identifier and every station within a radius of a point.
//! [`OcmClient`] is the HTTP implementation; tests elsewhere in the workspace
//! substitute in-memory sources.

mod client;
mod error;

use async_trait::async_trait;
use enact_core::{DistanceUnit, Station};

pub use client::OcmClient;
pub use error::{Result, UpstreamError};

pub const DEFAULT_DISTANCE: f64 = 50.0;
pub const DEFAULT_MAX_RESULTS: u32 = 10;

/// Parameters of a radius search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StationQuery {
    pub latitude: f64,
    pub longitude: f64,
    pub distance: f64,
    pub unit: DistanceUnit,
    pub max_results: u32,
}

impl StationQuery {
    /// Search around a point with the default radius (50 KM) and result cap (10).
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            distance: DEFAULT_DISTANCE,
            unit: DistanceUnit::Km,
            max_results: DEFAULT_MAX_RESULTS,
        }
    }

    pub fn with_distance(mut self, distance: f64) -> Self {
        self.distance = distance;
        self
    }

    pub fn with_unit(mut self, unit: DistanceUnit) -> Self {
        self.unit = unit;
        self
    }

    pub fn with_max_results(mut self, max_results: u32) -> Self {
        self.max_results = max_results;
        self
    }
}

/// Read access to the upstream station catalogue.
#[async_trait]
pub trait StationSource: Send + Sync {
    /// Exactly one record by identifier; `None` when upstream has no match.
    async fn fetch_one(&self, id: i64) -> Result<Option<Station>>;

    /// All records within `query.distance` of the point, at most
    /// `query.max_results`. Empty when nothing matches.
    async fn fetch_many(&self, query: &StationQuery) -> Result<Vec<Station>>;
}
