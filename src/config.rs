use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Local};

pub const BASE_URL: &str = "https://www.tigerairtw.com";

pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36";
pub const ACCEPT_LANGUAGE: &str = "zh-TW,zh;q=0.9,en;q=0.8";

/// One configured route: origin, destination, display name.
#[derive(Debug, Clone)]
pub struct RouteSpec {
    pub from: String,
    pub to: String,
    pub route_name: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub base_url: String,
    pub routes: BTreeMap<String, RouteSpec>,
    /// Trip length in days, nights = days - 1.
    pub trip_duration_days: u32,
    pub implicit_wait: Duration,
    pub step_timeout: Duration,
    pub results_timeout: Duration,
    pub settle_after_nav: Duration,
    pub settle_after_submit: Duration,
    /// Politeness delay between orchestrator calls.
    pub inter_request_delay: Duration,
    /// Reserved for callers; the core does not retry on its own.
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub output_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let mut routes = BTreeMap::new();
        for (code, from, to, name) in [
            ("TPE_NRT", "TPE", "NRT", "台北-東京成田"),
            ("TPE_KIX", "TPE", "KIX", "台北-大阪關西"),
            ("TPE_FUK", "TPE", "FUK", "台北-福岡"),
            ("TPE_OKA", "TPE", "OKA", "台北-沖繩那霸"),
            ("KHH_NRT", "KHH", "NRT", "高雄-東京成田"),
            ("KHH_KIX", "KHH", "KIX", "高雄-大阪關西"),
            ("TSA_NRT", "TSA", "NRT", "台北松山-東京成田"),
        ] {
            routes.insert(
                code.to_string(),
                RouteSpec {
                    from: from.to_string(),
                    to: to.to_string(),
                    route_name: name.to_string(),
                },
            );
        }

        Self {
            base_url: BASE_URL.to_string(),
            routes,
            trip_duration_days: 5,
            implicit_wait: Duration::from_secs(5),
            step_timeout: Duration::from_secs(10),
            results_timeout: Duration::from_secs(15),
            settle_after_nav: Duration::from_secs(3),
            settle_after_submit: Duration::from_secs(5),
            inter_request_delay: Duration::from_secs(2),
            max_retries: 3,
            retry_delay: Duration::from_secs(2),
            output_dir: PathBuf::from("flight_data"),
        }
    }
}

impl Config {
    pub fn route(&self, code: &str) -> Option<&RouteSpec> {
        self.routes.get(code)
    }
}

/// Localized search terms tried after the bare IATA code when filtering the
/// site's airport dropdown.
pub fn airport_aliases(code: &str) -> &'static [&'static str] {
    match code {
        "TPE" => &["台北", "桃園", "台北(桃園)"],
        "TSA" => &["台北松山", "松山"],
        "KHH" => &["高雄"],
        "NRT" => &["東京", "成田", "東京成田"],
        "KIX" => &["大阪", "關西"],
        "FUK" => &["福岡"],
        "OKA" => &["沖繩", "那霸", "沖繩(那霸)"],
        "NGO" => &["名古屋", "中部"],
        _ => &[],
    }
}

/// Upcoming search dates: tomorrow through `days_ahead` days out, YYYY-MM-DD.
pub fn default_search_dates(days_ahead: u32) -> Vec<String> {
    let today = Local::now().date_naive();
    (1..=days_ahead as i64)
        .map(|i| (today + ChronoDuration::days(i)).format("%Y-%m-%d").to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_routes_present() {
        let config = Config::default();
        let tpe_nrt = config.route("TPE_NRT").unwrap();
        assert_eq!(tpe_nrt.from, "TPE");
        assert_eq!(tpe_nrt.to, "NRT");
        assert!(config.route("TPE_XXX").is_none());
    }

    #[test]
    fn search_dates_start_tomorrow() {
        let dates = default_search_dates(7);
        assert_eq!(dates.len(), 7);
        let today = Local::now().date_naive().format("%Y-%m-%d").to_string();
        assert!(!dates.contains(&today));
        // All parseable and strictly increasing
        for pair in dates.windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }

    #[test]
    fn retry_knobs_reserved_for_callers() {
        // Declared for orchestrator callers; the core never retries itself.
        let config = Config::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.retry_delay, Duration::from_secs(2));
    }

    #[test]
    fn aliases_cover_configured_airports() {
        let config = Config::default();
        for route in config.routes.values() {
            assert!(
                !airport_aliases(&route.from).is_empty(),
                "no aliases for {}",
                route.from
            );
            assert!(
                !airport_aliases(&route.to).is_empty(),
                "no aliases for {}",
                route.to
            );
        }
    }
}
