use std::sync::LazyLock;

use regex::Regex;

use crate::model::{FlightInfo, TimeSlot};

static FLIGHT_NO_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b(IT|TT)\s*(\d+)").unwrap());
static TIME_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b(\d{1,2}:\d{2})").unwrap());
static DEPARTURE_TIME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:起飛|出發|departure)[：:]?\s*(\d{1,2}:\d{2})").unwrap());
static ARRIVAL_TIME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:降落|抵達|arrival)[：:]?\s*(\d{1,2}:\d{2})").unwrap());

/// Price patterns, tried in order: currency-prefixed, labeled, bare
/// grouped-digit numbers.
static PRICE_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"TWD\s*([0-9][0-9,]*)",
        r"NT\$\s*([0-9][0-9,]*)",
        r"(?:票價|價格)[：:]\s*([0-9][0-9,]*)",
        r"\b([1-9]\d{0,2}(?:,\d{3})+|[1-9]\d{3,4})\b",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

/// Plausible one-way fare range; matches outside it are noise, not prices.
pub const PRICE_MIN: f64 = 1000.0;
pub const PRICE_MAX: f64 = 50000.0;

const UNAVAILABLE_KEYWORDS: &[&str] =
    &["售完", "已滿", "sold out", "unavailable", "無座位", "額滿"];

/// Carrier flight number (IT/TT prefix), internal whitespace removed.
/// A fragment without one yields no record.
pub fn flight_number(text: &str) -> Option<String> {
    FLIGHT_NO_RE
        .captures(text)
        .map(|caps| format!("{}{}", &caps[1], &caps[2]))
}

/// All HH:MM substrings in document order, labeled variants included,
/// deduplicated preserving first occurrence.
pub fn times(text: &str) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    for re in [&*TIME_RE, &*DEPARTURE_TIME_RE, &*ARRIVAL_TIME_RE] {
        for caps in re.captures_iter(text) {
            let t = caps[1].to_string();
            if !found.contains(&t) {
                found.push(t);
            }
        }
    }
    found
}

/// First price match within the sanity bound, or None. Out-of-bound matches
/// are skipped, not treated as errors.
pub fn price(text: &str) -> Option<f64> {
    for re in PRICE_RES.iter() {
        for caps in re.captures_iter(text) {
            if let Ok(value) = caps[1].replace(',', "").parse::<f64>() {
                if (PRICE_MIN..=PRICE_MAX).contains(&value) {
                    return Some(value);
                }
            }
        }
    }
    None
}

/// Every in-bound price match across all patterns, in pattern-then-document
/// order, duplicates included. The calendar fallback dedups numerically.
pub fn prices(text: &str) -> Vec<f64> {
    let mut found = Vec::new();
    for re in PRICE_RES.iter() {
        for caps in re.captures_iter(text) {
            if let Ok(value) = caps[1].replace(',', "").parse::<f64>() {
                if (PRICE_MIN..=PRICE_MAX).contains(&value) {
                    found.push(value);
                }
            }
        }
    }
    found
}

/// Seats default to available; any sold-out keyword flips the answer.
pub fn seats_available(text: &str) -> bool {
    let lower = text.to_lowercase();
    !UNAVAILABLE_KEYWORDS.iter().any(|kw| lower.contains(kw))
}

/// Bucket a departure time by hour: [0,6) early, [6,12) morning,
/// [12,18) afternoon, [18,24) evening. Anything unparsable is Unknown.
pub fn time_slot(time: &str) -> TimeSlot {
    let hour: u32 = match time.split(':').next().and_then(|h| h.parse().ok()) {
        Some(h) => h,
        None => return TimeSlot::Unknown,
    };
    match hour {
        0..=5 => TimeSlot::EarlyMorning,
        6..=11 => TimeSlot::Morning,
        12..=17 => TimeSlot::Afternoon,
        18..=23 => TimeSlot::Evening,
        _ => TimeSlot::Unknown,
    }
}

/// Run every field extractor over one text blob. Returns None when no flight
/// number is present — such fragments never become records.
pub fn extract_flight(text: &str) -> Option<FlightInfo> {
    let number = flight_number(text)?;
    let mut flight = FlightInfo::new(number);

    let found_times = times(text);
    if let Some(t) = found_times.first() {
        flight.departure_time = t.clone();
    }
    if let Some(t) = found_times.get(1) {
        flight.arrival_time = t.clone();
    }

    flight.price = price(text);
    flight.seats_available = Some(seats_available(text));
    flight.time_slot = time_slot(&flight.departure_time);

    Some(flight)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flight_number_normalizes_whitespace() {
        assert_eq!(flight_number("航班 IT 202 直飛").as_deref(), Some("IT202"));
        assert_eq!(flight_number("TT627").as_deref(), Some("TT627"));
    }

    #[test]
    fn no_carrier_token_no_record() {
        assert!(flight_number("JL 802 08:00 TWD 5,999").is_none());
        assert!(extract_flight("BR189 07:30-11:30 NT$ 8,200").is_none());
        assert!(extract_flight("just some page chrome").is_none());
    }

    #[test]
    fn times_dedup_in_document_order() {
        let t = times("起飛 08:10 ... 降落 12:30 ... 08:10");
        assert_eq!(t, vec!["08:10", "12:30"]);
    }

    #[test]
    fn labeled_times_recognized() {
        let t = times("出發:06:55 抵達:10:40");
        assert_eq!(t, vec!["06:55", "10:40"]);
    }

    #[test]
    fn price_prefers_currency_prefix() {
        assert_eq!(price("IT202 TWD 3,999 含稅"), Some(3999.0));
        assert_eq!(price("NT$ 4599"), Some(4599.0));
        assert_eq!(price("價格: 2,888"), Some(2888.0));
    }

    #[test]
    fn price_sanity_bound_is_inclusive() {
        assert_eq!(price("TWD 1,000"), Some(1000.0));
        assert_eq!(price("TWD 50,000"), Some(50000.0));
        assert_eq!(price("TWD 999"), None);
        assert_eq!(price("TWD 50,001"), None);
    }

    #[test]
    fn out_of_bound_match_falls_through_to_next() {
        // The TWD match is rejected, the bare grouped number is accepted.
        assert_eq!(price("TWD 120 手續費, 票價 5,400 元"), Some(5400.0));
    }

    #[test]
    fn no_valid_price_is_none() {
        assert_eq!(price("暫無報價"), None);
        assert_eq!(price("TWD 999,999"), None);
    }

    #[test]
    fn seats_default_available() {
        assert!(seats_available("IT202 08:10 TWD 3,999"));
        assert!(!seats_available("IT202 已滿"));
        assert!(!seats_available("IT202 SOLD OUT"));
        assert!(!seats_available("IT202 售完"));
    }

    #[test]
    fn time_slot_band_boundaries() {
        assert_eq!(time_slot("00:30"), TimeSlot::EarlyMorning);
        assert_eq!(time_slot("05:59"), TimeSlot::EarlyMorning);
        assert_eq!(time_slot("06:00"), TimeSlot::Morning);
        assert_eq!(time_slot("11:45"), TimeSlot::Morning);
        assert_eq!(time_slot("12:00"), TimeSlot::Afternoon);
        assert_eq!(time_slot("17:59"), TimeSlot::Afternoon);
        assert_eq!(time_slot("18:00"), TimeSlot::Evening);
        assert_eq!(time_slot("23:10"), TimeSlot::Evening);
        assert_eq!(time_slot(""), TimeSlot::Unknown);
        assert_eq!(time_slot("不明"), TimeSlot::Unknown);
        assert_eq!(time_slot("24:00"), TimeSlot::Unknown);
    }

    #[test]
    fn extract_flight_full_fragment() {
        let flight = extract_flight("IT 202 台北(桃園) 08:10 → 東京成田 12:30 TWD 4,299").unwrap();
        assert_eq!(flight.flight_number, "IT202");
        assert_eq!(flight.departure_time, "08:10");
        assert_eq!(flight.arrival_time, "12:30");
        assert_eq!(flight.price, Some(4299.0));
        assert_eq!(flight.seats_available, Some(true));
        assert_eq!(flight.time_slot, TimeSlot::Morning);
    }

    #[test]
    fn extract_flight_single_time_leaves_arrival_empty() {
        let flight = extract_flight("IT216 21:40 售完").unwrap();
        assert_eq!(flight.departure_time, "21:40");
        assert_eq!(flight.arrival_time, "");
        assert_eq!(flight.seats_available, Some(false));
        assert_eq!(flight.time_slot, TimeSlot::Evening);
        assert_eq!(flight.price, None);
    }
}
