//! `search_station`: find stop ids by name

use std::fmt::Write;
use std::sync::Arc;

use async_trait::async_trait;

use super::error::ToolError;
use super::registry::{ArgSpec, ToolArguments, ToolContract, ToolHandler};
use crate::transit::{normalize_items, Station, TransitApi};

pub const NAME: &str = "search_station";

/// City code used when the caller gives none (Seoul)
pub const DEFAULT_CITY_CODE: &str = "11";

struct SearchStation {
    api: Arc<dyn TransitApi>,
}

#[async_trait]
impl ToolHandler for SearchStation {
    async fn call(&self, arguments: ToolArguments) -> Result<String, ToolError> {
        let keyword = arguments.require("keyword")?;
        let city_code = arguments.require("city_code")?;

        let payload = self.api.search_stations(city_code, keyword).await?;
        let set = normalize_items(&payload)?;

        let stations: Vec<Station> = set.items.iter().map(Station::from_item).collect();
        Ok(format_stations(keyword, &stations))
    }
}

pub fn contract(api: Arc<dyn TransitApi>) -> ToolContract {
    ToolContract {
        name: NAME,
        description: "Search bus stops by name and return their station IDs and ARS numbers. \
                      city_code: Seoul 11, Gyeonggi 12, and so on.",
        args: vec![
            ArgSpec::required("keyword", "Part of the stop name, e.g. Gangnam"),
            ArgSpec::optional("city_code", "City code (Seoul is 11)", DEFAULT_CITY_CODE),
        ],
        handler: Arc::new(SearchStation { api }),
    }
}

pub fn format_stations(keyword: &str, stations: &[Station]) -> String {
    if stations.is_empty() {
        return format!("No stations found for '{}'.", keyword);
    }

    let mut out = format!("Stations matching '{}':\n", keyword);
    for station in stations {
        let _ = match &station.ars_no {
            Some(ars) => writeln!(
                out,
                "- {} (ID: {}, ARS: {})",
                station.name, station.node_id, ars
            ),
            None => writeln!(out, "- {} (ID: {})", station.name, station.node_id),
        };
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testing::FakeTransit;
    use serde_json::json;

    fn bound(keyword: &str) -> ToolArguments {
        let mut args = ToolArguments::default();
        args.insert("keyword", keyword);
        args.insert("city_code", DEFAULT_CITY_CODE);
        args
    }

    #[tokio::test]
    async fn test_single_result_object() {
        let contract = contract(Arc::new(FakeTransit::default()));
        let text = contract.handler.call(bound("Gangnam")).await.unwrap();

        assert!(text.contains("Gangnam"));
        assert!(text.contains("121000977"));
    }

    #[tokio::test]
    async fn test_zero_results_is_a_message() {
        let fake = FakeTransit::default().with_stations(json!({
            "response": {
                "header": {"resultCode": "00"},
                "body": {"totalCount": 0, "items": ""}
            }
        }));
        let contract = contract(Arc::new(fake));
        let text = contract.handler.call(bound("Nowhere")).await.unwrap();

        assert!(!text.is_empty());
        assert!(text.contains("No stations found"));
    }

    #[tokio::test]
    async fn test_reported_error_propagates() {
        let fake = FakeTransit::default().with_stations(json!({
            "response": {"header": {"resultCode": "22", "resultMsg": "LIMIT EXCEEDED"}}
        }));
        let contract = contract(Arc::new(fake));
        let err = contract.handler.call(bound("Gangnam")).await.unwrap_err();
        assert_eq!(err.kind(), "upstream_reported_error");
    }

    #[test]
    fn test_format_includes_ars_when_present() {
        let stations = vec![Station {
            name: "Gangnam Stn.".into(),
            node_id: "121000977".into(),
            ars_no: Some("22009".into()),
        }];
        let text = format_stations("Gangnam", &stations);
        assert!(text.contains("ARS: 22009"));
    }
}
