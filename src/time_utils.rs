use chrono::{DateTime, Datelike, Utc};
use chrono_tz::Tz;

pub fn default_timezone() -> Tz {
    chrono_tz::Asia::Ho_Chi_Minh
}

/// Accepts IANA names plus the usual `UTC`/`GMT` spellings and the
/// `Asia/Saigon` alias.
pub fn parse_timezone(raw: &str) -> Option<Tz> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let normalized = if trimmed.eq_ignore_ascii_case("utc") || trimmed.eq_ignore_ascii_case("gmt") {
        "UTC"
    } else if trimmed == "Asia/Saigon" {
        "Asia/Ho_Chi_Minh"
    } else {
        trimmed
    };

    normalized.parse::<Tz>().ok()
}

/// Calendar year of `utc_dt` as seen in `tz`. Rankings are bucketed by this year.
pub fn local_year(tz: Tz, utc_dt: DateTime<Utc>) -> i32 {
    utc_dt.with_timezone(&tz).year()
}

pub fn format_local_time(tz: Tz, utc_dt: DateTime<Utc>) -> String {
    utc_dt.with_timezone(&tz).format("%Y-%m-%d %H:%M").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn parses_aliases() {
        assert_eq!(parse_timezone("utc"), Some(chrono_tz::UTC));
        assert_eq!(parse_timezone(" Asia/Saigon "), Some(chrono_tz::Asia::Ho_Chi_Minh));
        assert_eq!(parse_timezone("Asia/Bangkok"), Some(chrono_tz::Asia::Bangkok));
        assert_eq!(parse_timezone("Mars/Base"), None);
        assert_eq!(parse_timezone(""), None);
    }

    #[test]
    fn year_rolls_over_in_local_time() {
        // 2023-12-31 18:00 UTC is already 2024 in Vietnam (UTC+7).
        let dt = Utc.with_ymd_and_hms(2023, 12, 31, 18, 0, 0).unwrap();
        assert_eq!(local_year(default_timezone(), dt), 2024);
        assert_eq!(local_year(chrono_tz::UTC, dt), 2023);
        assert_eq!(format_local_time(default_timezone(), dt), "2024-01-01 01:00");
    }
}
