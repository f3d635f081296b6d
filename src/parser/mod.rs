pub mod fields;
pub mod strategies;

pub use strategies::{run_chain, ChainOutcome, Strategy};

use crate::model::FlightInfo;

/// Parse one results page: DOM → strategy chain → validated records.
pub fn parse_results(html: &str, source_url: &str) -> Vec<FlightInfo> {
    strategies::run_chain(html, source_url).flights
}
