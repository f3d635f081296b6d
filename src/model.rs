use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_AIRLINE: &str = "Tigerair Taiwan";
pub const DEFAULT_CURRENCY: &str = "TWD";

/// Departure-time band, bucketed by hour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TimeSlot {
    EarlyMorning,
    Morning,
    Afternoon,
    Evening,
    #[default]
    Unknown,
}

impl TimeSlot {
    /// Stable machine name, matching the serde representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeSlot::EarlyMorning => "early_morning",
            TimeSlot::Morning => "morning",
            TimeSlot::Afternoon => "afternoon",
            TimeSlot::Evening => "evening",
            TimeSlot::Unknown => "unknown",
        }
    }

    /// Display label in the source market's language.
    pub fn label(&self) -> &'static str {
        match self {
            TimeSlot::EarlyMorning => "早班",
            TimeSlot::Morning => "上午",
            TimeSlot::Afternoon => "下午",
            TimeSlot::Evening => "晚班",
            TimeSlot::Unknown => "未知",
        }
    }
}

impl fmt::Display for TimeSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One extracted flight. `flight_number` is never empty: extractors discard
/// candidates without one before a record is built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlightInfo {
    pub flight_number: String,
    pub airline: String,
    pub departure_airport: String,
    pub departure_time: String,
    pub departure_date: String,
    pub arrival_airport: String,
    pub arrival_time: String,
    pub arrival_date: String,
    pub price: Option<f64>,
    pub currency: String,
    pub seats_available: Option<bool>,
    pub time_slot: TimeSlot,
    pub crawl_timestamp: DateTime<Utc>,
    pub source_url: String,
}

impl FlightInfo {
    pub fn new(flight_number: impl Into<String>) -> Self {
        Self {
            flight_number: flight_number.into(),
            airline: DEFAULT_AIRLINE.to_string(),
            departure_airport: String::new(),
            departure_time: String::new(),
            departure_date: String::new(),
            arrival_airport: String::new(),
            arrival_time: String::new(),
            arrival_date: String::new(),
            price: None,
            currency: DEFAULT_CURRENCY.to_string(),
            seats_available: None,
            time_slot: TimeSlot::Unknown,
            crawl_timestamp: Utc::now(),
            source_url: String::new(),
        }
    }

    /// A leg usable in a round-trip: priced and confirmed available.
    pub fn is_bookable(&self) -> bool {
        self.price.is_some() && self.seats_available == Some(true)
    }
}

/// Result of one search call. Flights stay in discovery order;
/// `success_count` tracks `flights.len()` because records are only ever added.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlightSearchResult {
    pub flights: Vec<FlightInfo>,
    pub search_params: BTreeMap<String, String>,
    pub success_count: usize,
    pub error_count: usize,
    pub errors: Vec<String>,
}

impl FlightSearchResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_flight(&mut self, flight: FlightInfo) {
        self.flights.push(flight);
        self.success_count += 1;
    }

    pub fn add_error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
        self.error_count += 1;
    }

    /// Ran to completion but the page yielded nothing. Distinct from
    /// execution failure, which leaves `errors` non-empty.
    pub fn is_empty_success(&self) -> bool {
        self.success_count == 0 && self.errors.is_empty()
    }

    pub fn available_flights(&self) -> Vec<&FlightInfo> {
        self.flights
            .iter()
            .filter(|f| f.seats_available == Some(true))
            .collect()
    }

    pub fn flights_in_slot(&self, slot: TimeSlot) -> Vec<&FlightInfo> {
        self.flights.iter().filter(|f| f.time_slot == slot).collect()
    }

    /// Cheapest bookable flights, ascending by price.
    pub fn cheapest_flights(&self, limit: usize) -> Vec<&FlightInfo> {
        let mut bookable: Vec<&FlightInfo> =
            self.flights.iter().filter(|f| f.is_bookable()).collect();
        bookable.sort_by(|a, b| {
            a.price
                .unwrap_or(f64::MAX)
                .total_cmp(&b.price.unwrap_or(f64::MAX))
        });
        bookable.truncate(limit);
        bookable
    }
}

/// The subset of a leg carried into a trip candidate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegSummary {
    pub flight_number: String,
    pub departure_time: String,
    pub arrival_time: String,
    pub price: f64,
}

impl LegSummary {
    pub fn from_flight(flight: &FlightInfo, price: f64) -> Self {
        Self {
            flight_number: flight.flight_number.clone(),
            departure_time: flight.departure_time.clone(),
            arrival_time: flight.arrival_time.clone(),
            price,
        }
    }
}

/// One round-trip combination: cheapest bookable outbound and inbound legs
/// for a route and departure date.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TripCandidate {
    pub route: String,
    pub route_name: String,
    pub departure_date: String,
    pub return_date: String,
    pub outbound_flight: LegSummary,
    pub inbound_flight: LegSummary,
    pub total_price: f64,
    pub price_per_day: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_counters_track_additions() {
        let mut result = FlightSearchResult::new();
        assert!(result.is_empty_success());

        result.add_flight(FlightInfo::new("IT200"));
        result.add_flight(FlightInfo::new("IT202"));
        result.add_error("timeout");

        assert_eq!(result.success_count, result.flights.len());
        assert_eq!(result.error_count, 1);
        assert!(!result.is_empty_success());
    }

    #[test]
    fn bookable_requires_price_and_seats() {
        let mut f = FlightInfo::new("IT200");
        assert!(!f.is_bookable());
        f.price = Some(3999.0);
        assert!(!f.is_bookable());
        f.seats_available = Some(true);
        assert!(f.is_bookable());
        f.seats_available = Some(false);
        assert!(!f.is_bookable());
    }

    #[test]
    fn cheapest_skips_unavailable() {
        let mut result = FlightSearchResult::new();
        let mut cheap = FlightInfo::new("IT200");
        cheap.price = Some(2000.0);
        cheap.seats_available = Some(false);
        let mut pricy = FlightInfo::new("IT202");
        pricy.price = Some(5000.0);
        pricy.seats_available = Some(true);
        result.add_flight(cheap);
        result.add_flight(pricy);

        let cheapest = result.cheapest_flights(5);
        assert_eq!(cheapest.len(), 1);
        assert_eq!(cheapest[0].flight_number, "IT202");
    }

    #[test]
    fn time_slot_serializes_snake_case() {
        let json = serde_json::to_string(&TimeSlot::EarlyMorning).unwrap();
        assert_eq!(json, "\"early_morning\"");
        assert_eq!(TimeSlot::Evening.label(), "晚班");
    }
}
