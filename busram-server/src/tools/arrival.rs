//! `check_arrival`: upcoming buses at a stop

use std::fmt::Write;
use std::sync::Arc;

use async_trait::async_trait;

use super::error::ToolError;
use super::registry::{ArgSpec, ToolArguments, ToolContract, ToolHandler};
use crate::transit::{normalize_items, Arrival, TransitApi};

pub const NAME: &str = "check_arrival";

/// Arrivals closer than this many minutes are reported as arriving soon
const SOON_MINUTES: u64 = 2;

struct CheckArrival {
    api: Arc<dyn TransitApi>,
}

#[async_trait]
impl ToolHandler for CheckArrival {
    async fn call(&self, arguments: ToolArguments) -> Result<String, ToolError> {
        let city_code = arguments.require("city_code")?;
        let station_id = arguments.require("station_id")?;

        let payload = self.api.arrivals(city_code, station_id).await?;
        let set = normalize_items(&payload)?;

        let arrivals: Vec<Arrival> = set.items.iter().map(Arrival::from_item).collect();
        Ok(format_arrivals(station_id, &arrivals))
    }
}

pub fn contract(api: Arc<dyn TransitApi>) -> ToolContract {
    ToolContract {
        name: NAME,
        description: "Look up buses arriving at a stop, by station ID.",
        args: vec![
            ArgSpec::required("city_code", "City code (Seoul is 11)"),
            ArgSpec::required("station_id", "Station ID from search_station"),
        ],
        handler: Arc::new(CheckArrival { api }),
    }
}

pub fn format_arrivals(station_id: &str, arrivals: &[Arrival]) -> String {
    if arrivals.is_empty() {
        return "No buses are currently expected at this stop.".to_string();
    }

    let mut out = format!("Arrivals at station {}:\n", station_id);
    for arrival in arrivals {
        let eta = format!("{} min {} sec", arrival.minutes(), arrival.seconds());
        let when = if arrival.minutes() < SOON_MINUTES {
            format!("arriving soon ({})", eta)
        } else {
            eta
        };
        let _ = match arrival.stops_away {
            Some(stops) => writeln!(
                out,
                "- [Route {}] {}, {} stops away",
                arrival.route_no, when, stops
            ),
            None => writeln!(out, "- [Route {}] {}", arrival.route_no, when),
        };
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testing::FakeTransit;
    use serde_json::json;

    fn arrival(secs: u64) -> Arrival {
        Arrival {
            route_no: "146".into(),
            arrival_secs: secs,
            stops_away: None,
        }
    }

    #[test]
    fn test_minutes_and_seconds() {
        let text = format_arrivals("X", &[arrival(125)]);
        assert!(text.contains("2 min 5 sec"));
        assert!(!text.contains("arriving soon"));
    }

    #[test]
    fn test_under_two_minutes_is_soon() {
        let text = format_arrivals("X", &[arrival(45)]);
        assert!(text.contains("arriving soon"));
        assert!(text.contains("0 min 45 sec"));

        let text = format_arrivals("X", &[arrival(119)]);
        assert!(text.contains("arriving soon (1 min 59 sec)"));
    }

    #[test]
    fn test_stops_away() {
        let text = format_arrivals(
            "X",
            &[Arrival {
                stops_away: Some(4),
                ..arrival(600)
            }],
        );
        assert!(text.contains("10 min 0 sec, 4 stops away"));
    }

    #[tokio::test]
    async fn test_zero_results_is_a_message() {
        let fake = FakeTransit::default().with_arrivals(json!({
            "response": {
                "header": {"resultCode": "00"},
                "body": {"totalCount": "0", "items": ""}
            }
        }));
        let contract = contract(Arc::new(fake));

        let mut args = ToolArguments::default();
        args.insert("city_code", "11");
        args.insert("station_id", "121000977");
        let text = contract.handler.call(args).await.unwrap();

        assert!(text.contains("No buses"));
    }

    #[tokio::test]
    async fn test_list_of_arrivals_keeps_order() {
        let fake = FakeTransit::default().with_arrivals(json!({
            "response": {
                "header": {"resultCode": "00"},
                "body": {"totalCount": 2, "items": {"item": [
                    {"routeno": "146", "arrtime": 125},
                    {"routeno": 341, "arrtime": "45"}
                ]}}
            }
        }));
        let contract = contract(Arc::new(fake));

        let mut args = ToolArguments::default();
        args.insert("city_code", "11");
        args.insert("station_id", "121000977");
        let text = contract.handler.call(args).await.unwrap();

        let first = text.find("Route 146").unwrap();
        let second = text.find("Route 341").unwrap();
        assert!(first < second);
    }
}
