//! Station record model shared by the fetch client, the worker and the store.
//!
//! Field names follow the Open Charge Map POI schema (`ID`, `AddressInfo`,
//! `Connections`). Everything the model does not name is kept in `extra` so a
//! stored record is the full upstream document.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// A charging station (point of interest) as returned by the upstream API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Station {
    /// Provider-assigned identifier; the natural key for persistence.
    #[serde(rename = "ID", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(rename = "UUID", default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    #[serde(rename = "AddressInfo", default, skip_serializing_if = "Option::is_none")]
    pub address: Option<AddressInfo>,
    #[serde(rename = "Connections", default, deserialize_with = "null_as_default")]
    pub connections: Vec<Connection>,
    /// Provider-specific fields not modelled above.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Station {
    /// Minimal record with an identifier and a title.
    pub fn new(id: i64, title: impl Into<String>) -> Self {
        Self {
            id: Some(id),
            uuid: None,
            address: Some(AddressInfo {
                title: Some(title.into()),
                ..AddressInfo::default()
            }),
            connections: Vec::new(),
            extra: Map::new(),
        }
    }

    pub fn title(&self) -> Option<&str> {
        self.address.as_ref()?.title.as_deref()
    }

    /// `(latitude, longitude)` when the upstream record carries both.
    pub fn position(&self) -> Option<(f64, f64)> {
        let address = self.address.as_ref()?;
        Some((address.latitude?, address.longitude?))
    }
}

/// Location block of a station.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AddressInfo {
    #[serde(rename = "ID", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(rename = "Title", default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(rename = "AddressLine1", default, skip_serializing_if = "Option::is_none")]
    pub address_line1: Option<String>,
    #[serde(rename = "Town", default, skip_serializing_if = "Option::is_none")]
    pub town: Option<String>,
    #[serde(rename = "StateOrProvince", default, skip_serializing_if = "Option::is_none")]
    pub state_or_province: Option<String>,
    #[serde(rename = "Postcode", default, skip_serializing_if = "Option::is_none")]
    pub postcode: Option<String>,
    #[serde(rename = "CountryID", default, skip_serializing_if = "Option::is_none")]
    pub country_id: Option<i64>,
    #[serde(rename = "Latitude", default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(rename = "Longitude", default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    /// Distance from the query point, only present on radius searches.
    #[serde(rename = "Distance", default, skip_serializing_if = "Option::is_none")]
    pub distance: Option<f64>,
    #[serde(rename = "DistanceUnit", default, skip_serializing_if = "Option::is_none")]
    pub distance_unit: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One connector on a station.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    #[serde(rename = "ID", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(rename = "ConnectionTypeID", default, skip_serializing_if = "Option::is_none")]
    pub connection_type_id: Option<i64>,
    #[serde(rename = "ConnectionType", default, skip_serializing_if = "Option::is_none")]
    pub connection_type: Option<ConnectionType>,
    #[serde(rename = "PowerKW", default, skip_serializing_if = "Option::is_none")]
    pub power_kw: Option<f64>,
    #[serde(rename = "Amps", default, skip_serializing_if = "Option::is_none")]
    pub amps: Option<f64>,
    #[serde(rename = "Voltage", default, skip_serializing_if = "Option::is_none")]
    pub voltage: Option<f64>,
    #[serde(rename = "Quantity", default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<i64>,
    #[serde(rename = "StatusTypeID", default, skip_serializing_if = "Option::is_none")]
    pub status_type_id: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectionType {
    #[serde(rename = "ID", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(rename = "Title", default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Unit for radius searches, as accepted by the `distanceunit` parameter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DistanceUnit {
    #[default]
    #[serde(rename = "KM")]
    Km,
    #[serde(rename = "Miles")]
    Miles,
}

impl fmt::Display for DistanceUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Km => write!(f, "KM"),
            Self::Miles => write!(f, "Miles"),
        }
    }
}

impl std::str::FromStr for DistanceUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "km" | "kilometers" | "kilometres" => Ok(Self::Km),
            "miles" | "mi" => Ok(Self::Miles),
            other => Err(format!("unknown distance unit: {other}")),
        }
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
