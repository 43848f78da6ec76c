use std::sync::Arc;

use async_trait::async_trait;
use enact_core::{FetchStationsPayload, Task};
use enact_ocm::{StationQuery, StationSource};
use enact_queue::{Job, JobProcessor};
use enact_store::TacticalStore;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::error::{PipelineError, Result};

/// Executes queued station jobs.
///
/// Errors are not swallowed: an upstream or store failure fails the attempt
/// and the queue decides whether to retry.
pub struct StationWorker {
    source: Arc<dyn StationSource>,
    store: Arc<dyn TacticalStore>,
}

impl StationWorker {
    pub fn new(source: Arc<dyn StationSource>, store: Arc<dyn TacticalStore>) -> Self {
        Self { source, store }
    }

    /// Fetch every station in the sector and upsert them one by one.
    /// Returns the number of stations written.
    pub async fn sync_sector(&self, sector: &FetchStationsPayload) -> Result<usize> {
        let query =
            StationQuery::new(sector.latitude, sector.longitude).with_distance(sector.distance);
        let stations = self.source.fetch_many(&query).await?;

        for station in &stations {
            debug!(station_id = ?station.id, "upserting station");
            self.store.upsert(station).await?;
        }
        Ok(stations.len())
    }
}

#[async_trait]
impl JobProcessor for StationWorker {
    type Error = PipelineError;

    async fn process(&self, job: &Job) -> Result<Value> {
        match job.task()? {
            Task::FetchStations(sector) => {
                let count = self.sync_sector(&sector).await?;
                info!(
                    job_id = %job.id,
                    latitude = sector.latitude,
                    longitude = sector.longitude,
                    distance = sector.distance,
                    count,
                    "sector synced"
                );
                Ok(json!({ "count": count }))
            }
            Task::Unknown { kind, .. } => {
                warn!(job_id = %job.id, %kind, "no handler for job kind, skipping");
                Ok(json!({}))
            }
        }
    }
}
