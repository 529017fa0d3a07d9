use chrono::NaiveDate;

use crate::process::utils::clean_str;

/// Formats tried in order. The registry itself publishes `DD/MM/YYYY`.
const DATE_FORMATS: &[&str] = &["%d/%m/%Y", "%d-%m-%Y", "%Y-%m-%d", "%Y/%m/%d"];

/// Parse a publication date, ignoring any trailing time part
/// (`"15/01/2024 10:30:00"`, `"2024-01-15T10:30:00"`).
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let cleaned = clean_str(raw);
    let date_part = cleaned
        .split(|c: char| c.is_whitespace() || c == 'T')
        .next()
        .filter(|s| !s.is_empty())?;

    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(date_part, fmt).ok())
}

/// Days since the unix epoch, the `Date32` representation.
pub fn to_epoch_days(date: NaiveDate) -> i32 {
    (date - unix_epoch()).num_days() as i32
}

pub fn from_epoch_days(days: i32) -> NaiveDate {
    unix_epoch() + chrono::Duration::days(days as i64)
}

fn unix_epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).expect("1970-01-01 is a valid date")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_parse_registry_format_first() {
        // 02/01 must be read day-first
        assert_eq!(parse_date("02/01/2024"), Some(ymd(2024, 1, 2)));
        assert_eq!(parse_date(" \"15/01/2024\" "), Some(ymd(2024, 1, 15)));
    }

    #[test]
    fn test_parse_other_formats_and_time_suffix() {
        assert_eq!(parse_date("2024-03-10"), Some(ymd(2024, 3, 10)));
        assert_eq!(parse_date("2024/03/10"), Some(ymd(2024, 3, 10)));
        assert_eq!(parse_date("10-03-2024"), Some(ymd(2024, 3, 10)));
        assert_eq!(parse_date("15/01/2024 10:30:00"), Some(ymd(2024, 1, 15)));
        assert_eq!(parse_date("2024-01-15T10:30:00"), Some(ymd(2024, 1, 15)));
    }

    #[test]
    fn test_unparsable_is_none() {
        assert_eq!(parse_date(""), None);
        assert_eq!(parse_date("sin fecha"), None);
        assert_eq!(parse_date("31/02/2024"), None);
    }

    #[test]
    fn test_epoch_days_roundtrip_anchor() {
        assert_eq!(to_epoch_days(ymd(1970, 1, 2)), 1);
        assert_eq!(from_epoch_days(19737), ymd(2024, 1, 15));
    }
}
