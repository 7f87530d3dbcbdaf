//! In-memory transit API for tests

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use super::{transit_registry, ToolError, ToolRegistry};
use crate::transit::TransitApi;

/// Canned [`TransitApi`]
///
/// Station search answers with a single "Gangnam" stop unless overridden.
/// Arrival lookup answers with one bus whose route number is the station id,
/// so tests can tell calls apart. Per-key delays simulate slow upstreams.
#[derive(Clone, Default)]
pub struct FakeTransit {
    stations: Option<Value>,
    arrivals: Option<Value>,
    delays: HashMap<String, Duration>,
    unavailable: bool,
    calls: Arc<AtomicUsize>,
    completed: Arc<AtomicUsize>,
    last_city_code: Arc<Mutex<Option<String>>>,
}

impl FakeTransit {
    pub fn with_stations(mut self, payload: Value) -> Self {
        self.stations = Some(payload);
        self
    }

    pub fn with_arrivals(mut self, payload: Value) -> Self {
        self.arrivals = Some(payload);
        self
    }

    /// Delay answers for a keyword or station id
    pub fn with_delay(mut self, key: &str, delay: Duration) -> Self {
        self.delays.insert(key.to_string(), delay);
        self
    }

    /// Fail every call as if the network were down
    pub fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    /// Calls started
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Calls that ran to the end
    pub fn completed_count(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    pub fn last_city_code(&self) -> Option<String> {
        self.last_city_code.lock().clone()
    }

    async fn answer(&self, city_code: &str, key: &str, payload: Value) -> Result<Value, ToolError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_city_code.lock() = Some(city_code.to_string());

        if let Some(delay) = self.delays.get(key) {
            tokio::time::sleep(*delay).await;
        }
        self.completed.fetch_add(1, Ordering::SeqCst);

        if self.unavailable {
            return Err(ToolError::UpstreamUnavailable("connection refused".into()));
        }
        Ok(payload)
    }
}

/// Upstream document for a single station search hit
pub fn gangnam_fixture() -> Value {
    json!({
        "response": {
            "header": {"resultCode": "00"},
            "body": {
                "totalCount": 1,
                "items": {"item": {"nodeNm": "Gangnam", "nodeid": "121000977"}}
            }
        }
    })
}

fn arrival_fixture(station_id: &str) -> Value {
    json!({
        "response": {
            "header": {"resultCode": "00", "resultMsg": "NORMAL SERVICE."},
            "body": {
                "totalCount": 1,
                "items": {"item": {"routeno": station_id, "arrtime": 125}}
            }
        }
    })
}

#[async_trait]
impl TransitApi for FakeTransit {
    async fn search_stations(&self, city_code: &str, keyword: &str) -> Result<Value, ToolError> {
        let payload = self.stations.clone().unwrap_or_else(gangnam_fixture);
        self.answer(city_code, keyword, payload).await
    }

    async fn arrivals(&self, city_code: &str, station_id: &str) -> Result<Value, ToolError> {
        let payload = self
            .arrivals
            .clone()
            .unwrap_or_else(|| arrival_fixture(station_id));
        self.answer(city_code, station_id, payload).await
    }
}

/// Transit tools bound to a fake
pub fn fake_registry(fake: FakeTransit) -> ToolRegistry {
    transit_registry(Arc::new(fake))
}
