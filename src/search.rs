use std::collections::BTreeMap;

use chrono::NaiveDate;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{info, info_span, warn, Instrument};

use crate::config::{airport_aliases, Config};
use crate::fetch::{FetchError, PageFetcher, SessionProvider};
use crate::model::FlightSearchResult;
use crate::parser;

/// A logical form target as a prioritized list of selector candidates.
/// The first candidate the page accepts wins.
pub struct Target {
    pub field: &'static str,
    pub selectors: &'static [&'static str],
}

pub const ORIGIN: Target = Target {
    field: "origin",
    selectors: &[
        "input[placeholder*='出發地']",
        "input[placeholder*='出發']",
        "input[name*='departure']",
        "input[id*='departure']",
        ".departure-input",
        "#departure",
        "[data-testid*='origin']",
    ],
};

pub const DESTINATION: Target = Target {
    field: "destination",
    selectors: &[
        "input[placeholder*='目的地']",
        "input[placeholder*='抵達']",
        "input[name*='arrival']",
        "input[id*='arrival']",
        ".arrival-input",
        "#arrival",
        "[data-testid*='destination']",
    ],
};

pub const DEPARTURE_DATE: Target = Target {
    field: "departure date",
    selectors: &[
        "input[placeholder*='去程']",
        "input[placeholder*='出發日期']",
        "input[name*='departure']",
        "input[name*='outbound']",
        "#departure-date",
        "#departureDate",
        ".departure-date",
        "input[type='date']",
    ],
};

pub const RETURN_DATE: Target = Target {
    field: "return date",
    selectors: &[
        "input[placeholder*='回程']",
        "input[placeholder*='回程日期']",
        "input[name*='return']",
        "input[name*='inbound']",
        "#return-date",
        "#returnDate",
        ".return-date",
    ],
};

/// Dropdown containers the airport suggestion list has shipped under.
const SUGGESTION_LISTS: &[&str] = &[
    ".dropdown-menu",
    ".airport-list",
    ".suggestion-list",
    "[role='listbox']",
    ".autocomplete-results",
    ".airport-options",
    "ul[class*='dropdown']",
    "div[class*='dropdown']",
    ".menu-list",
];

const SUBMIT_SELECTORS: &[&str] = &[
    ".search-btn",
    ".btn-search",
    "#search-btn",
    "#searchBtn",
    "button[type='submit']",
    "input[type='submit']",
    ".btn-primary",
    ".search-button",
    ".btn-orange",
    ".submit-btn",
    "[data-testid*='search']",
    "button[class*='search']",
    "button[class*='submit']",
    ".flight-search-btn",
];

const SUBMIT_TEXTS: &[&str] = &["搜尋", "Search", "搜索"];

const RESULTS_REGION: &str =
    ".flight-card, .flight-result, .flight-item, .price, [class*='flight'], [class*='itinerary']";

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("could not fill {field}: no selector candidate accepted a value")]
    FormFill { field: &'static str },
    #[error("search form could not be submitted")]
    Submit,
    #[error("navigation failed: {0}")]
    Navigation(FetchError),
}

/// Drives one page-fetcher session through the fill/submit/wait protocol and
/// hands the resulting markup to the extraction chain. Never returns an
/// error: every failure degrades to error strings on the result.
pub struct FlightSearcher<P: SessionProvider> {
    provider: P,
    config: Config,
}

impl<P: SessionProvider> FlightSearcher<P> {
    pub fn new(provider: P, config: Config) -> Self {
        Self { provider, config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Search one direction on one date. The session acquired for this call
    /// is released on every exit path.
    pub async fn search_flights(
        &self,
        departure: &str,
        arrival: &str,
        departure_date: &str,
        return_date: Option<&str>,
    ) -> FlightSearchResult {
        let mut result = FlightSearchResult::new();
        result
            .search_params
            .insert("departure".into(), departure.into());
        result.search_params.insert("arrival".into(), arrival.into());
        result
            .search_params
            .insert("departure_date".into(), departure_date.into());
        if let Some(rd) = return_date {
            result.search_params.insert("return_date".into(), rd.into());
        }

        let mut session = match self.provider.acquire().await {
            Ok(session) => session,
            Err(e) => {
                warn!("session acquisition failed: {e}");
                result.add_error(format!("page-fetcher session unavailable: {e}"));
                return result;
            }
        };

        // Span-scoped logging keeps concurrent searches from interleaving.
        let span = info_span!("search", %departure, %arrival, %departure_date);
        info!(parent: &span, "searching flights");
        if let Err(e) = self
            .run_search(
                &mut session,
                &mut result,
                departure,
                arrival,
                departure_date,
                return_date,
            )
            .instrument(span)
            .await
        {
            warn!("search aborted: {e}");
            result.add_error(e.to_string());
        }
        session.close().await;

        result
    }

    async fn run_search(
        &self,
        session: &mut P::Session,
        result: &mut FlightSearchResult,
        departure: &str,
        arrival: &str,
        departure_date: &str,
        return_date: Option<&str>,
    ) -> Result<(), SearchError> {
        session
            .navigate(&self.config.base_url)
            .await
            .map_err(SearchError::Navigation)?;
        sleep(self.config.settle_after_nav).await;

        // Field failures are recorded but non-fatal: submission proceeds
        // with whatever was set.
        if let Err(e) = self.fill_airport(session, &ORIGIN, departure).await {
            warn!("{e}");
            result.add_error(e.to_string());
        }
        if let Err(e) = self.fill_airport(session, &DESTINATION, arrival).await {
            warn!("{e}");
            result.add_error(e.to_string());
        }
        if let Err(e) = self.set_date(session, &DEPARTURE_DATE, departure_date).await {
            warn!("{e}");
            result.add_error(e.to_string());
        }
        if let Some(rd) = return_date {
            if let Err(e) = self.set_date(session, &RETURN_DATE, rd).await {
                warn!("{e}");
                result.add_error(e.to_string());
            }
        }

        self.submit(session).await?;
        sleep(self.config.settle_after_submit).await;

        if let Err(e) = session
            .wait_for(RESULTS_REGION, self.config.results_timeout)
            .await
        {
            // The chain still runs against whatever is on the page.
            warn!("results region never appeared ({e}), parsing current page");
        }

        let html = session.page_html().await.map_err(SearchError::Navigation)?;
        let source_url = session.current_url();
        for mut flight in parser::parse_results(&html, &source_url) {
            flight.departure_airport = departure.to_string();
            flight.arrival_airport = arrival.to_string();
            flight.departure_date = departure_date.to_string();
            result.add_flight(flight);
        }

        info!(flights = result.success_count, "search finished");
        Ok(())
    }

    /// Activate an airport input, type search terms (code first, then
    /// localized aliases) and click the first matching suggestion.
    async fn fill_airport(
        &self,
        session: &mut P::Session,
        target: &Target,
        code: &str,
    ) -> Result<(), SearchError> {
        let mut terms: Vec<&str> = vec![code];
        terms.extend_from_slice(airport_aliases(code));

        for css in target.selectors {
            if session
                .wait_for(css, self.config.step_timeout)
                .await
                .is_err()
                || session.click(css, None).await.is_err()
            {
                continue;
            }
            for &term in &terms {
                if session.fill(css, term).await.is_err() {
                    continue;
                }
                for list in SUGGESTION_LISTS {
                    if session
                        .wait_for(list, self.config.implicit_wait)
                        .await
                        .is_err()
                    {
                        continue;
                    }
                    let option_css = format!("{list} *");
                    for needle in [code, term] {
                        if session.click(&option_css, Some(needle)).await.is_ok() {
                            info!(field = target.field, %code, %term, "airport set");
                            return Ok(());
                        }
                    }
                }
            }
        }

        Err(SearchError::FormFill {
            field: target.field,
        })
    }

    /// Try each date input candidate with each accepted date format.
    async fn set_date(
        &self,
        session: &mut P::Session,
        target: &Target,
        date: &str,
    ) -> Result<(), SearchError> {
        let formats = date_formats(date);

        for css in target.selectors {
            if session
                .wait_for(css, self.config.step_timeout)
                .await
                .is_err()
                || session.click(css, None).await.is_err()
            {
                continue;
            }
            for value in &formats {
                if session.fill(css, value).await.is_ok() {
                    info!(field = target.field, %value, "date set");
                    return Ok(());
                }
            }
        }

        Err(SearchError::FormFill {
            field: target.field,
        })
    }

    /// Submit via selector candidates, then button-text matching, then a
    /// bare Enter against the page body.
    async fn submit(&self, session: &mut P::Session) -> Result<(), SearchError> {
        for css in SUBMIT_SELECTORS {
            if session.click(css, None).await.is_ok() {
                info!(selector = css, "search submitted");
                return Ok(());
            }
        }
        for text in SUBMIT_TEXTS {
            if session.click("button", Some(text)).await.is_ok() {
                info!(%text, "search submitted via button text");
                return Ok(());
            }
        }
        if session.press_enter().await.is_ok() {
            info!("search submitted via Enter fallback");
            return Ok(());
        }
        Err(SearchError::Submit)
    }

    /// Sweep several routes over several dates, merging each route's daily
    /// results. Unknown route codes are skipped with a warning.
    pub async fn search_routes(
        &self,
        routes: &[String],
        dates: &[String],
    ) -> BTreeMap<String, FlightSearchResult> {
        let mut results = BTreeMap::new();

        for code in routes {
            let Some(spec) = self.config.route(code) else {
                warn!("unknown route: {code}");
                continue;
            };
            info!(route = %spec.route_name, dates = dates.len(), "sweeping route");

            let mut merged = FlightSearchResult::new();
            merged
                .search_params
                .insert("route".into(), spec.route_name.clone());

            for date in dates {
                let daily = self.search_flights(&spec.from, &spec.to, date, None).await;
                for flight in daily.flights {
                    merged.add_flight(flight);
                }
                for error in daily.errors {
                    merged.add_error(format!("{date}: {error}"));
                }
                sleep(self.config.inter_request_delay).await;
            }

            info!(route = %spec.route_name, flights = merged.success_count, "route swept");
            results.insert(code.clone(), merged);
        }

        results
    }
}

/// Regional spellings tried against the date input, ISO first.
fn date_formats(date: &str) -> Vec<String> {
    match NaiveDate::parse_from_str(date, "%Y-%m-%d") {
        Ok(parsed) => vec![
            date.to_string(),
            parsed.format("%Y/%m/%d").to_string(),
            parsed.format("%m/%d/%Y").to_string(),
            parsed.format("%d/%m/%Y").to_string(),
            parsed.format("%Y年%m月%d日").to_string(),
        ],
        Err(_) => vec![date.to_string()],
    }
}
