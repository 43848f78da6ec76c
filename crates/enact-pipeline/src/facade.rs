use std::sync::Arc;

use chrono::Utc;
use enact_core::config::DEFAULT_FETCH_INTERVAL_SECS;
use enact_core::{DistanceUnit, Station, Task};
use enact_ocm::{StationQuery, StationSource, DEFAULT_DISTANCE};
use enact_queue::JobQueue;
use enact_store::TacticalStore;
use tracing::{debug, info};

use crate::error::Result;

/// Synchronous entry points for callers (API layer, CLI).
///
/// Reads go straight to upstream. Writes of a single station go through the
/// tactical store. Sector syncs are handed to the job queue and only
/// acknowledged here; their outcomes surface through the queue observers.
pub struct StationFacade {
    source: Arc<dyn StationSource>,
    store: Arc<dyn TacticalStore>,
    queue: Arc<JobQueue>,
    fetch_interval_secs: u64,
}

impl StationFacade {
    pub fn new(
        source: Arc<dyn StationSource>,
        store: Arc<dyn TacticalStore>,
        queue: Arc<JobQueue>,
    ) -> Self {
        Self {
            source,
            store,
            queue,
            fetch_interval_secs: DEFAULT_FETCH_INTERVAL_SECS,
        }
    }

    pub fn with_fetch_interval(mut self, secs: u64) -> Self {
        self.fetch_interval_secs = secs;
        self
    }

    pub async fn get_station(&self, id: i64) -> Result<Option<Station>> {
        Ok(self.source.fetch_one(id).await?)
    }

    /// Stations around a point. Unset options fall back to 50 KM and 10 results.
    pub async fn get_stations(
        &self,
        latitude: f64,
        longitude: f64,
        distance: Option<f64>,
        unit: Option<DistanceUnit>,
        max_results: Option<u32>,
    ) -> Result<Vec<Station>> {
        let mut query = StationQuery::new(latitude, longitude);
        if let Some(distance) = distance {
            query = query.with_distance(distance);
        }
        if let Some(unit) = unit {
            query = query.with_unit(unit);
        }
        if let Some(max_results) = max_results {
            query = query.with_max_results(max_results);
        }
        Ok(self.source.fetch_many(&query).await?)
    }

    /// Fetch one station upstream and persist it. `None` (and no write) when
    /// upstream does not know the identifier.
    pub async fn save_station(&self, id: i64) -> Result<Option<Station>> {
        let Some(station) = self.source.fetch_one(id).await? else {
            debug!(station_id = id, "station not found upstream, nothing saved");
            return Ok(None);
        };
        self.store.upsert(&station).await?;
        info!(station_id = id, "station saved");
        Ok(Some(station))
    }

    /// Register a recurring sync of the sector around a point.
    ///
    /// Returns `true` once the schedule is registered (or already was). The
    /// sync itself runs later on the queue runtime.
    pub fn spawn_fetch_job(
        &self,
        latitude: f64,
        longitude: f64,
        distance: Option<f64>,
    ) -> Result<bool> {
        let distance = distance.unwrap_or(DEFAULT_DISTANCE);
        let task = Task::fetch_stations(latitude, longitude, distance)?;
        let handle = self
            .queue
            .submit_repeating(&task, self.fetch_interval_secs, Utc::now())?;

        info!(
            job_id = %handle.id,
            latitude,
            longitude,
            distance,
            created = handle.created,
            every_secs = self.fetch_interval_secs,
            "spawned recurring fetch job for sector"
        );
        Ok(true)
    }
}
