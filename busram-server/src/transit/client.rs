//! HTTP client for the transit open-data API

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use super::normalize::excerpt;
use crate::config::UpstreamConfig;
use crate::observability::Metrics;
use crate::tools::ToolError;

const STATION_PATH: &str = "BusSttnInfoInqireService/getSttnNoList";
const ARRIVAL_PATH: &str = "ArvlInfoInqireService/getSttnAcctoArvlPrearngeInfoList";

/// Raw access to the transit API
///
/// Implementations return the decoded JSON document untouched; shape checks
/// live in [`super::normalize_items`].
#[async_trait]
pub trait TransitApi: Send + Sync {
    /// Stops whose name matches `keyword` in `city_code`
    async fn search_stations(&self, city_code: &str, keyword: &str) -> Result<Value, ToolError>;

    /// Expected arrivals at `station_id` in `city_code`
    async fn arrivals(&self, city_code: &str, station_id: &str) -> Result<Value, ToolError>;
}

/// Production [`TransitApi`] over HTTPS
///
/// A fresh `reqwest::Client` is built per call with the configured timeout.
/// Each call is a single attempt.
pub struct HttpTransitClient {
    base_url: String,
    service_key: String,
    timeout: Duration,
    station_rows: u32,
    arrival_rows: u32,
}

impl HttpTransitClient {
    pub fn new(config: &UpstreamConfig) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            service_key: config.service_key.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            station_rows: config.station_rows,
            arrival_rows: config.arrival_rows,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn get_json(&self, path: &str, params: &[(&str, String)]) -> Result<Value, ToolError> {
        let start = Instant::now();
        let result = self.fetch(path, params).await;
        let elapsed = start.elapsed().as_millis() as u64;

        Metrics::global().record_upstream(result.is_ok());
        match &result {
            Ok(_) => debug!(path, elapsed_ms = elapsed, "transit request ok"),
            Err(e) => warn!(path, elapsed_ms = elapsed, "transit request failed: {}", e),
        }
        result
    }

    async fn fetch(&self, path: &str, params: &[(&str, String)]) -> Result<Value, ToolError> {
        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| ToolError::UpstreamUnavailable(e.to_string()))?;

        let mut query: Vec<(&str, String)> = vec![
            ("serviceKey", self.service_key.clone()),
            ("_type", "json".to_string()),
        ];
        query.extend(params.iter().cloned());

        let response = client.get(self.url(path)).query(&query).send().await?;
        let status = response.status();
        let text = response.text().await?;

        // A rejected key comes back as XML, sometimes with a 200 status
        serde_json::from_str(&text).map_err(|_| {
            ToolError::UpstreamMalformed(format!(
                "response is not JSON (HTTP {}; check the service key): {}",
                status.as_u16(),
                excerpt(&text)
            ))
        })
    }
}

#[async_trait]
impl TransitApi for HttpTransitClient {
    async fn search_stations(&self, city_code: &str, keyword: &str) -> Result<Value, ToolError> {
        self.get_json(
            STATION_PATH,
            &[
                ("cityCode", city_code.to_string()),
                ("nodeNm", keyword.to_string()),
                ("numOfRows", self.station_rows.to_string()),
            ],
        )
        .await
    }

    async fn arrivals(&self, city_code: &str, station_id: &str) -> Result<Value, ToolError> {
        self.get_json(
            ARRIVAL_PATH,
            &[
                ("cityCode", city_code.to_string()),
                ("nodeId", station_id.to_string()),
                ("numOfRows", self.arrival_rows.to_string()),
            ],
        )
        .await
    }
}
