use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{Duration as ChronoDuration, NaiveDate};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::time::sleep;
use tracing::{info, warn};

use crate::fetch::SessionProvider;
use crate::model::{FlightInfo, LegSummary, TripCandidate};
use crate::search::FlightSearcher;

/// Return date for a trip of `trip_days` days (nights = days - 1).
pub fn return_date_for(departure_date: &str, trip_days: u32) -> Result<String> {
    let departure = NaiveDate::parse_from_str(departure_date, "%Y-%m-%d")
        .with_context(|| format!("bad departure date: {departure_date}"))?;
    let back = departure + ChronoDuration::days(i64::from(trip_days) - 1);
    Ok(back.format("%Y-%m-%d").to_string())
}

/// Cheapest leg that is actually sellable: priced and seats confirmed.
/// Ties keep the first-encountered record.
pub fn cheapest_bookable(flights: &[FlightInfo]) -> Option<(&FlightInfo, f64)> {
    flights
        .iter()
        .filter_map(|f| match (f.price, f.seats_available) {
            (Some(price), Some(true)) => Some((f, price)),
            _ => None,
        })
        .min_by(|a, b| a.1.total_cmp(&b.1))
}

/// Stable ascending sort by total price, truncated to `max_results`.
pub fn rank_trips(mut trips: Vec<TripCandidate>, max_results: usize) -> Vec<TripCandidate> {
    trips.sort_by(|a, b| a.total_price.total_cmp(&b.total_price));
    trips.truncate(max_results);
    trips
}

/// Pairs cheapest outbound/inbound legs per route and date, then ranks the
/// whole route × date cross-product by total price.
pub struct TripFinder<P: SessionProvider> {
    searcher: FlightSearcher<P>,
    cancel: Arc<AtomicBool>,
}

impl<P: SessionProvider> TripFinder<P> {
    pub fn new(searcher: FlightSearcher<P>) -> Self {
        Self {
            searcher,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag checked between route/date iterations; setting it aborts the
    /// sweep but already-collected candidates are still ranked and returned.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Search both legs of one route on one departure date. None when either
    /// leg has no bookable flight.
    pub async fn round_trip(
        &self,
        route_code: &str,
        departure_date: &str,
    ) -> Option<TripCandidate> {
        let config = self.searcher.config();
        let spec = match config.route(route_code) {
            Some(spec) => spec.clone(),
            None => {
                warn!("unknown route: {route_code}");
                return None;
            }
        };
        let trip_days = config.trip_duration_days;
        let delay = config.inter_request_delay;

        let return_date = match return_date_for(departure_date, trip_days) {
            Ok(date) => date,
            Err(e) => {
                warn!("{e:#}");
                return None;
            }
        };

        info!(
            route = %spec.route_name,
            %departure_date,
            %return_date,
            "searching round trip"
        );

        let outbound = self
            .searcher
            .search_flights(&spec.from, &spec.to, departure_date, None)
            .await;
        sleep(delay).await;
        let inbound = self
            .searcher
            .search_flights(&spec.to, &spec.from, &return_date, None)
            .await;

        let (out_flight, out_price) = match cheapest_bookable(&outbound.flights) {
            Some(found) => found,
            None => {
                info!(route = %spec.route_name, %departure_date, "no bookable outbound leg");
                return None;
            }
        };
        let (in_flight, in_price) = match cheapest_bookable(&inbound.flights) {
            Some(found) => found,
            None => {
                info!(route = %spec.route_name, %return_date, "no bookable inbound leg");
                return None;
            }
        };

        let total_price = out_price + in_price;
        info!(
            route = %spec.route_name,
            outbound = out_price,
            inbound = in_price,
            total = total_price,
            "round trip priced"
        );

        Some(TripCandidate {
            route: route_code.to_string(),
            route_name: spec.route_name.clone(),
            departure_date: departure_date.to_string(),
            return_date,
            outbound_flight: LegSummary::from_flight(out_flight, out_price),
            inbound_flight: LegSummary::from_flight(in_flight, in_price),
            total_price,
            price_per_day: total_price / f64::from(trip_days),
        })
    }

    /// Full cross-product of `routes` × `dates`, sequential with the
    /// politeness delay between iterations, ranked ascending by total price.
    pub async fn find_cheapest_trips(
        &self,
        routes: &[String],
        dates: &[String],
        max_results: usize,
    ) -> Vec<TripCandidate> {
        let delay = self.searcher.config().inter_request_delay;
        let pb = ProgressBar::new((routes.len() * dates.len()) as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")
                .unwrap()
                .progress_chars("=> "),
        );

        let mut candidates = Vec::new();

        'routes: for route_code in routes {
            for date in dates {
                if self.cancel.load(Ordering::SeqCst) {
                    warn!(
                        collected = candidates.len(),
                        "sweep interrupted, flushing collected candidates"
                    );
                    break 'routes;
                }
                if let Some(trip) = self.round_trip(route_code, date).await {
                    candidates.push(trip);
                }
                pb.inc(1);
                sleep(delay).await;
            }
        }

        pb.finish_and_clear();
        info!(candidates = candidates.len(), "sweep complete");
        rank_trips(candidates, max_results)
    }
}
