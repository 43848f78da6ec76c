//! Job task types, shared between the queue and the worker.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{EnactError, Result};

pub const FETCH_STATIONS: &str = "fetch_stations";

/// A geographic search area: centre point plus radius.
///
/// Stored as the JSON payload of a `fetch_stations` job.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FetchStationsPayload {
    pub latitude: f64,
    pub longitude: f64,
    pub distance: f64,
}

impl FetchStationsPayload {
    /// Validate the sector and fold `-0.0` into `0.0` so equal sectors share
    /// one dedup key.
    fn checked(self) -> Result<Self> {
        let Self {
            latitude,
            longitude,
            distance,
        } = self;
        if !(latitude.is_finite() && longitude.is_finite() && distance.is_finite()) {
            return Err(invalid(format!(
                "coordinates and distance must be finite numbers, got ({latitude}, {longitude}, {distance})"
            )));
        }
        if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
            return Err(invalid(format!(
                "coordinates out of range: ({latitude}, {longitude})"
            )));
        }
        if distance < 0.0 {
            return Err(invalid(format!("distance must not be negative, got {distance}")));
        }
        Ok(Self {
            latitude: latitude + 0.0,
            longitude: longitude + 0.0,
            distance: distance + 0.0,
        })
    }
}

fn invalid(reason: String) -> EnactError {
    EnactError::InvalidPayload {
        kind: FETCH_STATIONS.to_string(),
        reason,
    }
}

/// Work the queue can carry.
///
/// The queue persists `kind` and `payload` separately and rebuilds a `Task`
/// with [`Task::from_parts`] when a job is claimed. Kinds this build does not
/// know become [`Task::Unknown`] so older workers can drain newer queues.
#[derive(Debug, Clone, PartialEq)]
pub enum Task {
    FetchStations(FetchStationsPayload),
    Unknown { kind: String, payload: Value },
}

impl Task {
    /// Sector sync task. Rejects sectors upstream cannot be asked about:
    /// non-finite values, out-of-range coordinates, negative radius.
    pub fn fetch_stations(latitude: f64, longitude: f64, distance: f64) -> Result<Self> {
        FetchStationsPayload {
            latitude,
            longitude,
            distance,
        }
        .checked()
        .map(Self::FetchStations)
    }

    pub fn kind(&self) -> &str {
        match self {
            Self::FetchStations(_) => FETCH_STATIONS,
            Self::Unknown { kind, .. } => kind,
        }
    }

    pub fn payload(&self) -> Result<Value> {
        match self {
            Self::FetchStations(p) => Ok(serde_json::to_value(p)?),
            Self::Unknown { payload, .. } => Ok(payload.clone()),
        }
    }

    /// Rebuild a task from its persisted columns.
    ///
    /// A known kind with a payload that does not fit its type is an error;
    /// an unknown kind never is.
    pub fn from_parts(kind: &str, payload: Value) -> Result<Self> {
        match kind {
            FETCH_STATIONS => serde_json::from_value::<FetchStationsPayload>(payload)
                .map_err(|e| invalid(e.to_string()))?
                .checked()
                .map(Self::FetchStations),
            other => Ok(Self::Unknown {
                kind: other.to_string(),
                payload,
            }),
        }
    }

    /// Identity used to suppress duplicate recurring schedules: the kind plus
    /// the exact serialized payload. Object keys serialize in sorted order, so
    /// equal payloads always yield equal keys.
    pub fn dedup_key(&self) -> Result<String> {
        let payload = serde_json::to_string(&self.payload()?)?;
        Ok(format!("{}:{}", self.kind(), payload))
    }
}
