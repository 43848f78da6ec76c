//! `enact-pipeline` — the station sync workflow on top of the queue.
//!
//! - [`worker::StationWorker`] runs `fetch_stations` jobs: fetch a sector
//!   upstream, upsert every station into the tactical store.
//! - [`observer::OutcomeObserver`] turns queue outcomes into counters and logs.
//! - [`facade::StationFacade`] is the synchronous entry point used by callers.

pub mod error;
pub mod facade;
pub mod observer;
pub mod worker;

pub use error::{PipelineError, Result};
pub use facade::StationFacade;
pub use observer::{JobMetrics, OutcomeObserver};
pub use worker::StationWorker;

#[cfg(test)]
mod testing;
