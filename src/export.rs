use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;
use clap::ValueEnum;
use tracing::info;

use crate::model::{FlightSearchResult, TripCandidate};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Csv,
    Json,
    Both,
}

impl OutputFormat {
    fn wants_csv(self) -> bool {
        matches!(self, OutputFormat::Csv | OutputFormat::Both)
    }

    fn wants_json(self) -> bool {
        matches!(self, OutputFormat::Json | OutputFormat::Both)
    }
}

const FLIGHT_CSV_HEADER: &str = "route,flight_number,airline,departure_airport,departure_date,\
departure_time,arrival_airport,arrival_date,arrival_time,price,currency,seats_available,\
time_slot,crawl_timestamp,source_url";

/// Write per-route search results as timestamped CSV and/or JSON files under
/// `dir`. Returns the paths written; nothing is written when every route
/// came back empty.
pub fn save_search_results(
    results: &BTreeMap<String, FlightSearchResult>,
    dir: &Path,
    format: OutputFormat,
) -> Result<Vec<PathBuf>> {
    let total_flights: usize = results.values().map(|r| r.flights.len()).sum();
    if total_flights == 0 {
        info!("no flights to save");
        return Ok(Vec::new());
    }

    fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    let timestamp = Local::now().format("%Y%m%d_%H%M%S");
    let mut written = Vec::new();

    if format.wants_csv() {
        let mut csv = String::from(FLIGHT_CSV_HEADER);
        csv.push('\n');
        for (route, result) in results {
            for f in &result.flights {
                let price = f.price.map(|p| p.to_string()).unwrap_or_default();
                let seats = f
                    .seats_available
                    .map(|s| s.to_string())
                    .unwrap_or_default();
                writeln!(
                    csv,
                    "{},{},{},{},{},{},{},{},{},{},{},{},{},{},{}",
                    csv_field(route),
                    csv_field(&f.flight_number),
                    csv_field(&f.airline),
                    csv_field(&f.departure_airport),
                    csv_field(&f.departure_date),
                    csv_field(&f.departure_time),
                    csv_field(&f.arrival_airport),
                    csv_field(&f.arrival_date),
                    csv_field(&f.arrival_time),
                    price,
                    csv_field(&f.currency),
                    seats,
                    f.time_slot.as_str(),
                    f.crawl_timestamp.to_rfc3339(),
                    csv_field(&f.source_url),
                )?;
            }
        }
        let path = dir.join(format!("tigerair_flights_{timestamp}.csv"));
        fs::write(&path, csv).with_context(|| format!("writing {}", path.display()))?;
        info!(path = %path.display(), "CSV saved");
        written.push(path);
    }

    if format.wants_json() {
        let routes_summary: BTreeMap<&String, serde_json::Value> = results
            .iter()
            .map(|(route, r)| {
                (
                    route,
                    serde_json::json!({
                        "flight_count": r.success_count,
                        "error_count": r.error_count,
                    }),
                )
            })
            .collect();
        let payload = serde_json::json!({
            "timestamp": timestamp.to_string(),
            "total_flights": total_flights,
            "routes": results,
            "summary": {
                "total_routes": results.len(),
                "total_flights": total_flights,
                "routes_summary": routes_summary,
            },
        });
        let path = dir.join(format!("tigerair_flights_{timestamp}.json"));
        fs::write(&path, serde_json::to_string_pretty(&payload)?)
            .with_context(|| format!("writing {}", path.display()))?;
        info!(path = %path.display(), "JSON saved");
        written.push(path);
    }

    Ok(written)
}

const TRIP_CSV_HEADER: &str = "rank,route,route_name,departure_date,return_date,total_price,\
price_per_day,outbound_flight,outbound_departure,outbound_arrival,outbound_price,\
inbound_flight,inbound_departure,inbound_arrival,inbound_price";

/// Write a ranked trip list as timestamped CSV + JSON under `dir`.
pub fn save_trips(trips: &[TripCandidate], dir: &Path) -> Result<Vec<PathBuf>> {
    if trips.is_empty() {
        info!("no trips to save");
        return Ok(Vec::new());
    }

    fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    let timestamp = Local::now().format("%Y%m%d_%H%M%S");

    let mut csv = String::from(TRIP_CSV_HEADER);
    csv.push('\n');
    for (i, trip) in trips.iter().enumerate() {
        writeln!(
            csv,
            "{},{},{},{},{},{},{:.1},{},{},{},{},{},{},{},{}",
            i + 1,
            csv_field(&trip.route),
            csv_field(&trip.route_name),
            trip.departure_date,
            trip.return_date,
            trip.total_price,
            trip.price_per_day,
            csv_field(&trip.outbound_flight.flight_number),
            trip.outbound_flight.departure_time,
            trip.outbound_flight.arrival_time,
            trip.outbound_flight.price,
            csv_field(&trip.inbound_flight.flight_number),
            trip.inbound_flight.departure_time,
            trip.inbound_flight.arrival_time,
            trip.inbound_flight.price,
        )?;
    }
    let csv_path = dir.join(format!("japan_cheapest_trips_{timestamp}.csv"));
    fs::write(&csv_path, csv).with_context(|| format!("writing {}", csv_path.display()))?;

    let json_path = dir.join(format!("japan_cheapest_trips_{timestamp}.json"));
    fs::write(&json_path, serde_json::to_string_pretty(trips)?)
        .with_context(|| format!("writing {}", json_path.display()))?;

    info!(csv = %csv_path.display(), json = %json_path.display(), "trips saved");
    Ok(vec![csv_path, json_path])
}

/// Quote a CSV field when it carries a delimiter, quote, or newline.
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FlightInfo, LegSummary};

    fn sample_results() -> BTreeMap<String, FlightSearchResult> {
        let mut result = FlightSearchResult::new();
        let mut flight = FlightInfo::new("IT200");
        flight.price = Some(3799.0);
        flight.seats_available = Some(true);
        flight.departure_time = "07:55".into();
        result.add_flight(flight);
        result.add_error("2025-06-03: timed out");

        let mut results = BTreeMap::new();
        results.insert("TPE_NRT".to_string(), result);
        results
    }

    fn sample_trip() -> TripCandidate {
        TripCandidate {
            route: "TPE_NRT".into(),
            route_name: "台北-東京成田".into(),
            departure_date: "2025-06-02".into(),
            return_date: "2025-06-06".into(),
            outbound_flight: LegSummary {
                flight_number: "IT200".into(),
                departure_time: "07:55".into(),
                arrival_time: "12:10".into(),
                price: 3799.0,
            },
            inbound_flight: LegSummary {
                flight_number: "IT201".into(),
                departure_time: "13:30".into(),
                arrival_time: "16:05".into(),
                price: 3999.0,
            },
            total_price: 7798.0,
            price_per_day: 1559.6,
        }
    }

    #[test]
    fn csv_field_quotes_delimiters() {
        assert_eq!(csv_field("IT200"), "IT200");
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn search_results_written_in_requested_formats() {
        let dir = tempfile::tempdir().unwrap();
        let written =
            save_search_results(&sample_results(), dir.path(), OutputFormat::Both).unwrap();
        assert_eq!(written.len(), 2);

        let csv = fs::read_to_string(&written[0]).unwrap();
        assert!(csv.starts_with("route,flight_number"));
        assert_eq!(csv.lines().count(), 2);
        assert!(csv.contains("IT200"));

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&written[1]).unwrap()).unwrap();
        assert_eq!(json["total_flights"], 1);
        assert_eq!(json["summary"]["routes_summary"]["TPE_NRT"]["error_count"], 1);
    }

    #[test]
    fn empty_results_write_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let written =
            save_search_results(&BTreeMap::new(), dir.path(), OutputFormat::Both).unwrap();
        assert!(written.is_empty());
    }

    #[test]
    fn trips_round_trip_through_json() {
        let dir = tempfile::tempdir().unwrap();
        let written = save_trips(&[sample_trip()], dir.path()).unwrap();
        assert_eq!(written.len(), 2);

        let csv = fs::read_to_string(&written[0]).unwrap();
        assert!(csv.starts_with("rank,route"));
        assert!(csv.contains("台北-東京成田"));

        let trips: Vec<TripCandidate> =
            serde_json::from_str(&fs::read_to_string(&written[1]).unwrap()).unwrap();
        assert_eq!(trips[0].total_price, 7798.0);
        assert_eq!(trips[0].outbound_flight.flight_number, "IT200");
    }
}
