//! `enact-core` — configuration, errors and the data shapes shared by every
//! other Enact crate: the station record and the job task union.

pub mod config;
pub mod error;
pub mod task;
pub mod types;

pub use config::EnactConfig;
pub use error::{EnactError, Result};
pub use task::{FetchStationsPayload, Task, FETCH_STATIONS};
pub use types::{AddressInfo, Connection, ConnectionType, DistanceUnit, Station};
