//! Response shape normalization for the transit open-data API
//!
//! The API wraps everything in `response.header` / `response.body`. Its
//! quirks, all handled here and nowhere else:
//! - `items.item` is an object for one result, an array for several, and
//!   `items` is an empty string when there are none
//! - `totalCount` and numeric fields arrive as numbers or numeric strings
//! - failures are reported in `header.resultCode` with a 200 status

use serde_json::{Map, Value};

use crate::tools::ToolError;

/// Result code the API uses for success
const RESULT_OK: &str = "00";

/// Longest excerpt of a bad payload echoed back to the agent
pub const EXCERPT_LEN: usize = 200;

/// Items extracted from one API response, in upstream order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemSet {
    pub total_count: u64,
    pub items: Vec<Map<String, Value>>,
}

impl ItemSet {
    pub fn is_empty(&self) -> bool {
        self.total_count == 0 || self.items.is_empty()
    }
}

/// Validate the envelope and coerce `items.item` into an ordered list
pub fn normalize_items(payload: &Value) -> Result<ItemSet, ToolError> {
    let response = payload
        .get("response")
        .and_then(Value::as_object)
        .ok_or_else(|| {
            ToolError::UpstreamMalformed(format!(
                "missing 'response' object: {}",
                excerpt(&payload.to_string())
            ))
        })?;

    check_header(response.get("header"))?;

    let body = response
        .get("body")
        .and_then(Value::as_object)
        .ok_or_else(|| ToolError::UpstreamMalformed("missing 'body' object".into()))?;

    let items = match body.get("items") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::String(s)) if s.trim().is_empty() => Vec::new(),
        Some(Value::Object(wrapper)) => coerce_item(wrapper.get("item"))?,
        Some(other) => {
            return Err(ToolError::UpstreamMalformed(format!(
                "unexpected 'items' value: {}",
                excerpt(&other.to_string())
            )))
        }
    };

    let total_count = match body.get("totalCount") {
        None | Some(Value::Null) => items.len() as u64,
        Some(v) => as_u64(v).ok_or_else(|| {
            ToolError::UpstreamMalformed(format!("bad totalCount: {}", v))
        })?,
    };

    if total_count == 0 {
        return Ok(ItemSet::default());
    }

    Ok(ItemSet { total_count, items })
}

fn check_header(header: Option<&Value>) -> Result<(), ToolError> {
    let header = header
        .and_then(Value::as_object)
        .ok_or_else(|| ToolError::UpstreamMalformed("missing 'header' object".into()))?;

    let code = header.get("resultCode").and_then(as_string);
    match code.as_deref() {
        Some(RESULT_OK) => Ok(()),
        Some(code) => Err(ToolError::UpstreamReportedError {
            code: code.to_string(),
            message: header
                .get("resultMsg")
                .and_then(as_string)
                .unwrap_or_else(|| "no message".into()),
        }),
        None => Err(ToolError::UpstreamMalformed("missing resultCode".into())),
    }
}

fn coerce_item(item: Option<&Value>) -> Result<Vec<Map<String, Value>>, ToolError> {
    match item {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Object(single)) => Ok(vec![single.clone()]),
        Some(Value::Array(list)) => Ok(list
            .iter()
            .filter_map(Value::as_object)
            .cloned()
            .collect()),
        Some(other) => Err(ToolError::UpstreamMalformed(format!(
            "unexpected 'item' value: {}",
            excerpt(&other.to_string())
        ))),
    }
}

/// String view of a field that may be a string or a number
pub fn as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Non-negative integer view of a field that may be a string or a number
pub fn as_u64(value: &Value) -> Option<u64> {
    as_i64(value).map(|n| n.max(0) as u64)
}

/// Integer view of a field that may be a string or a number
pub fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// First `EXCERPT_LEN` characters of a payload
pub fn excerpt(text: &str) -> String {
    let trimmed = text.trim();
    match trimmed.char_indices().nth(EXCERPT_LEN) {
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}

/// One bus stop from a station search
#[derive(Debug, Clone, PartialEq)]
pub struct Station {
    pub name: String,
    pub node_id: String,
    /// Stop number printed on the sign (ARS)
    pub ars_no: Option<String>,
}

impl Station {
    pub fn from_item(item: &Map<String, Value>) -> Self {
        Self {
            name: field(item, "nodeNm").unwrap_or_else(|| "(unnamed)".into()),
            node_id: field(item, "nodeid").unwrap_or_else(|| "?".into()),
            ars_no: field(item, "nodeno"),
        }
    }
}

/// One expected arrival at a stop
#[derive(Debug, Clone, PartialEq)]
pub struct Arrival {
    pub route_no: String,
    /// Seconds until arrival, floored at zero
    pub arrival_secs: u64,
    /// Stops between the bus and this station
    pub stops_away: Option<u64>,
}

impl Arrival {
    pub fn from_item(item: &Map<String, Value>) -> Self {
        Self {
            route_no: field(item, "routeno").unwrap_or_else(|| "?".into()),
            arrival_secs: item.get("arrtime").and_then(as_u64).unwrap_or(0),
            stops_away: item.get("arrprevstationcnt").and_then(as_u64),
        }
    }

    pub fn minutes(&self) -> u64 {
        self.arrival_secs / 60
    }

    pub fn seconds(&self) -> u64 {
        self.arrival_secs % 60
    }
}

fn field(item: &Map<String, Value>, key: &str) -> Option<String> {
    item.get(key)
        .and_then(as_string)
        .filter(|s| !s.trim().is_empty())
}
