//! In-memory collaborators for unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use enact_core::Station;
use enact_ocm::{StationQuery, StationSource, UpstreamError};
use enact_store::{StoreError, TacticalStore};

pub struct FakeSource {
    stations: Vec<Station>,
    fail: bool,
    queries: Mutex<Vec<StationQuery>>,
}

impl FakeSource {
    pub fn with(stations: Vec<Station>) -> Arc<Self> {
        Arc::new(Self {
            stations,
            fail: false,
            queries: Mutex::new(Vec::new()),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            stations: Vec::new(),
            fail: true,
            queries: Mutex::new(Vec::new()),
        })
    }

    pub fn queries(&self) -> Vec<StationQuery> {
        self.queries.lock().unwrap().clone()
    }

    fn check(&self) -> enact_ocm::Result<()> {
        if self.fail {
            return Err(UpstreamError::Api {
                status: 503,
                message: "service unavailable".into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl StationSource for FakeSource {
    async fn fetch_one(&self, id: i64) -> enact_ocm::Result<Option<Station>> {
        self.check()?;
        Ok(self.stations.iter().find(|s| s.id == Some(id)).cloned())
    }

    async fn fetch_many(&self, query: &StationQuery) -> enact_ocm::Result<Vec<Station>> {
        self.queries.lock().unwrap().push(*query);
        self.check()?;
        Ok(self
            .stations
            .iter()
            .take(query.max_results as usize)
            .cloned()
            .collect())
    }
}

/// Records writes. Optionally rejects every write from the `fail_from`-th
/// attempt on (1-based).
pub struct RecordingStore {
    upserts: Mutex<Vec<Station>>,
    attempts: AtomicUsize,
    fail_from: Option<usize>,
}

impl RecordingStore {
    pub fn new() -> Arc<Self> {
        Self::build(None)
    }

    pub fn unavailable() -> Arc<Self> {
        Self::build(Some(1))
    }

    pub fn failing_from(attempt: usize) -> Arc<Self> {
        Self::build(Some(attempt))
    }

    fn build(fail_from: Option<usize>) -> Arc<Self> {
        Arc::new(Self {
            upserts: Mutex::new(Vec::new()),
            attempts: AtomicUsize::new(0),
            fail_from,
        })
    }

    pub fn upserted_ids(&self) -> Vec<i64> {
        self.upserts
            .lock()
            .unwrap()
            .iter()
            .filter_map(|s| s.id)
            .collect()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TacticalStore for RecordingStore {
    async fn connect(&self) -> enact_store::Result<()> {
        Ok(())
    }

    async fn upsert(&self, station: &Station) -> enact_store::Result<()> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_from.is_some_and(|n| attempt >= n) {
            return Err(StoreError::Unavailable("not connected".into()));
        }
        self.upserts.lock().unwrap().push(station.clone());
        Ok(())
    }

    async fn disconnect(&self) -> enact_store::Result<()> {
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.fail_from != Some(1)
    }
}
