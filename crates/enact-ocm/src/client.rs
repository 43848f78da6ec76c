//! Open Charge Map POI client.

use std::time::Duration;

use async_trait::async_trait;
use enact_core::config::UpstreamConfig;
use enact_core::Station;
use tracing::{debug, warn};

use crate::error::{Result, UpstreamError};
use crate::{StationQuery, StationSource};

/// Client for the Open Charge Map `/poi` endpoint.
///
/// Stateless apart from the pooled HTTP connection; cheap to clone.
#[derive(Debug, Clone)]
pub struct OcmClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    timeout_secs: u64,
}

impl OcmClient {
    pub fn new(config: &UpstreamConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("enact/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            timeout_secs: config.timeout_secs,
        })
    }

    /// Issue one GET and decode the JSON array body.
    async fn get(&self, mut params: Vec<(&'static str, String)>) -> Result<Vec<Station>> {
        params.insert(0, ("output", "json".to_string()));
        if !self.api_key.is_empty() {
            params.push(("key", self.api_key.clone()));
        }

        let resp = self
            .http
            .get(&self.base_url)
            .query(&params)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), body = %text, "upstream API error");
            return Err(UpstreamError::Api {
                status: status.as_u16(),
                message: text,
            });
        }

        let body = resp.text().await.map_err(|e| self.classify(e))?;
        serde_json::from_str(&body).map_err(|e| UpstreamError::Parse(e.to_string()))
    }

    fn classify(&self, e: reqwest::Error) -> UpstreamError {
        if e.is_timeout() {
            UpstreamError::Timeout {
                secs: self.timeout_secs,
            }
        } else {
            UpstreamError::Http(e)
        }
    }
}

#[async_trait]
impl StationSource for OcmClient {
    async fn fetch_one(&self, id: i64) -> Result<Option<Station>> {
        debug!(station_id = id, "fetching station");
        let stations = self
            .get(vec![
                ("chargepointid", id.to_string()),
                ("maxresults", "1".to_string()),
            ])
            .await?;
        Ok(stations.into_iter().next())
    }

    async fn fetch_many(&self, query: &StationQuery) -> Result<Vec<Station>> {
        debug!(
            latitude = query.latitude,
            longitude = query.longitude,
            distance = query.distance,
            "fetching stations in radius"
        );
        self.get(vec![
            ("latitude", query.latitude.to_string()),
            ("longitude", query.longitude.to_string()),
            ("distance", query.distance.to_string()),
            ("distanceunit", query.unit.to_string()),
            ("maxresults", query.max_results.to_string()),
        ])
        .await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::net::SocketAddr;
    use std::sync::{Arc, Mutex};

    use axum::extract::{Query, State};
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use axum::routing::get;
    use axum::Router;
    use enact_core::DistanceUnit;

    use super::*;

    type Seen = Arc<Mutex<Vec<HashMap<String, String>>>>;

    /// Stand-in for the upstream `/poi` endpoint. Behaviour is picked by the
    /// `chargepointid` or `latitude` parameter.
    async fn poi(
        State(seen): State<Seen>,
        Query(params): Query<HashMap<String, String>>,
    ) -> axum::response::Response {
        seen.lock().unwrap().push(params.clone());
        let selector = params
            .get("chargepointid")
            .or_else(|| params.get("latitude"))
            .cloned()
            .unwrap_or_default();
        match selector.as_str() {
            "7" => r#"[{"ID":7,"AddressInfo":{"Title":"Seven"}}]"#.into_response(),
            "404" | "0" => "[]".into_response(),
            "500" => (StatusCode::INTERNAL_SERVER_ERROR, "boom").into_response(),
            "garbage" => "<html>not json</html>".into_response(),
            "slow" => {
                tokio::time::sleep(Duration::from_secs(5)).await;
                "[]".into_response()
            }
            _ => r#"[{"ID":1,"AddressInfo":{"Title":"X"}},{"ID":2,"AddressInfo":{"Title":"Y"}}]"#
                .into_response(),
        }
    }

    async fn spawn_upstream() -> (SocketAddr, Seen) {
        let seen: Seen = Arc::default();
        let app = Router::new()
            .route("/poi", get(poi))
            .with_state(seen.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (addr, seen)
    }

    fn client_for(addr: SocketAddr, timeout_secs: u64) -> OcmClient {
        OcmClient::new(&UpstreamConfig {
            api_key: "test-key".to_string(),
            base_url: format!("http://{addr}/poi"),
            timeout_secs,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn fetch_many_sends_defaults_and_parses() {
        let (addr, seen) = spawn_upstream().await;
        let client = client_for(addr, 5);

        let stations = client
            .fetch_many(&StationQuery::new(48.8566, 2.3522))
            .await
            .unwrap();
        assert_eq!(stations.len(), 2);
        assert_eq!(stations[0].id, Some(1));
        assert_eq!(stations[1].title(), Some("Y"));

        let params = seen.lock().unwrap()[0].clone();
        assert_eq!(params["output"], "json");
        assert_eq!(params["latitude"], "48.8566");
        assert_eq!(params["longitude"], "2.3522");
        assert_eq!(params["distance"], "50");
        assert_eq!(params["distanceunit"], "KM");
        assert_eq!(params["maxresults"], "10");
        assert_eq!(params["key"], "test-key");
    }

    #[tokio::test]
    async fn fetch_many_passes_explicit_options() {
        let (addr, seen) = spawn_upstream().await;
        let client = client_for(addr, 5);

        let query = StationQuery::new(51.5, -0.12)
            .with_distance(12.5)
            .with_unit(DistanceUnit::Miles)
            .with_max_results(3);
        client.fetch_many(&query).await.unwrap();

        let params = seen.lock().unwrap()[0].clone();
        assert_eq!(params["distance"], "12.5");
        assert_eq!(params["distanceunit"], "Miles");
        assert_eq!(params["maxresults"], "3");
    }

    #[tokio::test]
    async fn fetch_many_empty_is_empty_vec() {
        let (addr, _) = spawn_upstream().await;
        let stations = client_for(addr, 5)
            .fetch_many(&StationQuery::new(0.0, 0.0))
            .await
            .unwrap();
        assert!(stations.is_empty());
    }

    #[tokio::test]
    async fn fetch_one_returns_first_record() {
        let (addr, seen) = spawn_upstream().await;
        let station = client_for(addr, 5).fetch_one(7).await.unwrap().unwrap();
        assert_eq!(station.id, Some(7));
        assert_eq!(station.title(), Some("Seven"));

        let params = seen.lock().unwrap()[0].clone();
        assert_eq!(params["chargepointid"], "7");
        assert_eq!(params["maxresults"], "1");
    }

    #[tokio::test]
    async fn fetch_one_none_when_no_results() {
        let (addr, _) = spawn_upstream().await;
        assert!(client_for(addr, 5).fetch_one(404).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn non_success_status_is_api_error() {
        let (addr, _) = spawn_upstream().await;
        let err = client_for(addr, 5).fetch_one(500).await.unwrap_err();
        match err {
            UpstreamError::Api { status, message } => {
                assert_eq!(status, 500);
                assert_eq!(message, "boom");
            }
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn malformed_body_is_parse_error() {
        let (addr, _) = spawn_upstream().await;
        let err = client_for(addr, 5)
            .get(vec![("latitude", "garbage".to_string())])
            .await
            .unwrap_err();
        assert!(matches!(err, UpstreamError::Parse(_)));
    }

    #[tokio::test]
    async fn slow_upstream_times_out() {
        let (addr, _) = spawn_upstream().await;
        let err = client_for(addr, 1)
            .get(vec![("latitude", "slow".to_string())])
            .await
            .unwrap_err();
        assert!(matches!(err, UpstreamError::Timeout { secs: 1 }));
    }

    #[tokio::test]
    async fn unreachable_upstream_is_http_error() {
        // bind then drop to get a port nobody listens on
        let addr = {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };
        let err = client_for(addr, 5).fetch_one(1).await.unwrap_err();
        assert!(matches!(err, UpstreamError::Http(_)));
    }
}
