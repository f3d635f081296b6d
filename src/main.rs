mod config;
mod export;
mod fetch;
mod model;
mod parser;
mod search;
mod trips;

use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::time::Instant;

use anyhow::bail;
use clap::{Parser, Subcommand};
use tracing::warn;

use crate::config::Config;
use crate::export::OutputFormat;
use crate::fetch::HttpSessionProvider;
use crate::model::FlightSearchResult;
use crate::search::FlightSearcher;
use crate::trips::TripFinder;

#[derive(Parser)]
#[command(name = "tigerair_scraper", about = "Tigerair Taiwan fare scraper")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List configured routes
    Routes,
    /// Search one route on one date
    Search {
        /// Route code (e.g. TPE_NRT)
        route: String,
        /// Departure date (YYYY-MM-DD)
        date: String,
        /// Optional return date for a round-trip form
        #[arg(long)]
        return_date: Option<String>,
        #[arg(long, value_enum, default_value = "both")]
        format: OutputFormat,
    },
    /// Sweep routes over upcoming dates and save the merged results
    Sweep {
        /// Route codes to sweep
        #[arg(short, long)]
        routes: Vec<String>,
        /// Sweep every configured route
        #[arg(long)]
        all_routes: bool,
        /// Explicit dates (YYYY-MM-DD); overrides --days
        #[arg(short, long)]
        dates: Vec<String>,
        /// Search the next N days when no dates are given
        #[arg(long, default_value = "7")]
        days: u32,
        #[arg(long, value_enum, default_value = "both")]
        format: OutputFormat,
    },
    /// Rank the cheapest round trips over the upcoming window
    Trips {
        /// Search the next N departure days
        #[arg(long, default_value = "30")]
        days: u32,
        /// Max ranked trips to keep
        #[arg(short = 'n', long, default_value = "10")]
        max_results: usize,
        /// Route codes to consider (default: all configured)
        #[arg(short, long)]
        routes: Vec<String>,
    },
    /// Re-run the extraction chain over saved HTML pages
    Parse {
        /// Saved results pages
        files: Vec<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let config = Config::default();

    let result = match cli.command {
        Commands::Routes => {
            println!("{:<10} | {:<5} | {:<5} | {}", "Code", "From", "To", "Route");
            println!("{}", "-".repeat(50));
            for (code, spec) in &config.routes {
                println!(
                    "{:<10} | {:<5} | {:<5} | {}",
                    code, spec.from, spec.to, spec.route_name
                );
            }
            Ok(())
        }
        Commands::Search {
            route,
            date,
            return_date,
            format,
        } => {
            let Some(spec) = config.route(&route).cloned() else {
                bail!(
                    "unknown route {route}; known: {}",
                    config.routes.keys().cloned().collect::<Vec<_>>().join(", ")
                );
            };
            let searcher = FlightSearcher::new(HttpSessionProvider, config.clone());
            let result = searcher
                .search_flights(&spec.from, &spec.to, &date, return_date.as_deref())
                .await;
            print_result(&spec.route_name, &result);

            let mut results = std::collections::BTreeMap::new();
            results.insert(route, result);
            export::save_search_results(&results, &config.output_dir, format)?;
            Ok(())
        }
        Commands::Sweep {
            routes,
            all_routes,
            dates,
            days,
            format,
        } => {
            let routes = if all_routes {
                config.routes.keys().cloned().collect()
            } else if routes.is_empty() {
                bail!("pass --routes or --all-routes");
            } else {
                routes
            };
            let dates = if dates.is_empty() {
                config::default_search_dates(days)
            } else {
                dates
            };

            println!(
                "Sweeping {} route(s) over {} date(s)...",
                routes.len(),
                dates.len()
            );
            let searcher = FlightSearcher::new(HttpSessionProvider, config.clone());
            let results = searcher.search_routes(&routes, &dates).await;
            for (code, result) in &results {
                println!(
                    "{:<10} {} flights, {} errors",
                    code, result.success_count, result.error_count
                );
            }
            export::save_search_results(&results, &config.output_dir, format)?;
            Ok(())
        }
        Commands::Trips {
            days,
            max_results,
            routes,
        } => {
            let routes: Vec<String> = if routes.is_empty() {
                config.routes.keys().cloned().collect()
            } else {
                routes
            };
            let dates = config::default_search_dates(days);
            println!(
                "Searching cheapest {}-day round trips: {} route(s), departures over {} days",
                config.trip_duration_days,
                routes.len(),
                days
            );

            let searcher = FlightSearcher::new(HttpSessionProvider, config.clone());
            let finder = TripFinder::new(searcher);

            // Ctrl-C aborts remaining iterations; collected candidates are
            // still ranked and saved.
            let cancel = finder.cancel_flag();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("interrupt received, finishing current search");
                    cancel.store(true, Ordering::SeqCst);
                }
            });

            let trips = finder.find_cheapest_trips(&routes, &dates, max_results).await;
            print_trips(&trips);
            export::save_trips(&trips, &config.output_dir)?;
            Ok(())
        }
        Commands::Parse { files } => {
            if files.is_empty() {
                bail!("no files given");
            }
            parse_saved_pages(&files)
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

/// Offline mode: run the extraction chain over saved pages in parallel.
fn parse_saved_pages(files: &[PathBuf]) -> anyhow::Result<()> {
    use indicatif::{ProgressBar, ProgressStyle};
    use rayon::prelude::*;

    let pb = ProgressBar::new(files.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len}")?
            .progress_chars("=> "),
    );

    let parsed: Vec<(String, anyhow::Result<Vec<model::FlightInfo>>)> = files
        .par_iter()
        .map(|path| {
            let name = path.display().to_string();
            let flights = std::fs::read_to_string(path)
                .map(|html| parser::parse_results(&html, &name))
                .map_err(anyhow::Error::from);
            pb.inc(1);
            (name, flights)
        })
        .collect();
    pb.finish_and_clear();

    let mut total = 0usize;
    for (name, flights) in parsed {
        match flights {
            Ok(flights) => {
                println!("{}: {} flight(s)", name, flights.len());
                for f in &flights {
                    println!(
                        "  {} {}-{} {} {}",
                        f.flight_number,
                        f.departure_time,
                        f.arrival_time,
                        f.time_slot.label(),
                        f.price
                            .map(|p| format!("TWD {}", fmt_price(p)))
                            .unwrap_or_else(|| "-".into()),
                    );
                }
                total += flights.len();
            }
            Err(e) => println!("{}: failed to read ({})", name, e),
        }
    }
    println!("\n{} flight(s) across {} file(s)", total, files.len());
    Ok(())
}

fn print_result(route_name: &str, result: &FlightSearchResult) {
    println!("\n{route_name}");
    println!("{}", "-".repeat(60));
    if result.flights.is_empty() {
        if result.is_empty_success() {
            println!("Search ran fine, no flights found.");
        } else {
            println!("Search failed:");
        }
    }
    for (i, f) in result.flights.iter().enumerate() {
        let price = f
            .price
            .map(|p| format!("TWD {}", fmt_price(p)))
            .unwrap_or_else(|| "-".into());
        let seats = match f.seats_available {
            Some(true) => "available",
            Some(false) => "sold out",
            None => "unknown",
        };
        println!(
            "{:>3} | {:<7} | {:>5}-{:<5} | {:<4} | {:>10} | {}",
            i + 1,
            f.flight_number,
            f.departure_time,
            f.arrival_time,
            f.time_slot.label(),
            price,
            seats,
        );
    }
    if !result.flights.is_empty() {
        println!(
            "{} flight(s), {} with seats",
            result.success_count,
            result.available_flights().len()
        );
        let slots: Vec<String> = [
            model::TimeSlot::EarlyMorning,
            model::TimeSlot::Morning,
            model::TimeSlot::Afternoon,
            model::TimeSlot::Evening,
        ]
        .iter()
        .map(|&slot| (slot, result.flights_in_slot(slot).len()))
        .filter(|(_, n)| *n > 0)
        .map(|(slot, n)| format!("{} {}", slot.label(), n))
        .collect();
        if !slots.is_empty() {
            println!("by slot: {}", slots.join(", "));
        }
        if let Some(cheapest) = result.cheapest_flights(1).first() {
            println!(
                "cheapest: {} TWD {}",
                cheapest.flight_number,
                fmt_price(cheapest.price.unwrap_or_default())
            );
        }
    }
    for error in &result.errors {
        println!("  ! {error}");
    }
}

fn print_trips(trips: &[model::TripCandidate]) {
    if trips.is_empty() {
        println!("\nNo bookable round-trip combination found.");
        return;
    }
    println!("\nCheapest {} round trip(s)", trips.len());
    println!("{}", "=".repeat(60));
    for (i, trip) in trips.iter().enumerate() {
        println!(
            "#{} {}  {} ~ {}",
            i + 1,
            trip.route_name,
            trip.departure_date,
            trip.return_date
        );
        println!(
            "   total TWD {} (TWD {}/day)",
            fmt_price(trip.total_price),
            fmt_price(trip.price_per_day),
        );
        println!(
            "   outbound {} {}-{} TWD {}",
            trip.outbound_flight.flight_number,
            trip.outbound_flight.departure_time,
            trip.outbound_flight.arrival_time,
            fmt_price(trip.outbound_flight.price),
        );
        println!(
            "   inbound  {} {}-{} TWD {}",
            trip.inbound_flight.flight_number,
            trip.inbound_flight.departure_time,
            trip.inbound_flight.arrival_time,
            fmt_price(trip.inbound_flight.price),
        );
        println!("{}", "-".repeat(60));
    }
}

/// Thousands-grouped whole-TWD amount, e.g. 7598.0 -> "7,598".
fn fmt_price(value: f64) -> String {
    let whole = value.round() as i64;
    let digits = whole.abs().to_string();
    let mut grouped = String::new();
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    if whole < 0 {
        format!("-{grouped}")
    } else {
        grouped
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
