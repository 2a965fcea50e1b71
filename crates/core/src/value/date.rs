//! Date parsing and formatting.
//!
//! Custom formats use the `time` crate's format description syntax,
//! e.g. `[year]/[month]/[day]`.

use time::format_description::{self, well_known::Rfc3339};
use time::macros::format_description;
use time::{Date, OffsetDateTime, PrimitiveDateTime, UtcOffset};

/// Parse `text` as a date. Each of `formats` is tried exactly first, then
/// the ISO-8601 family.
pub fn parse_date(text: &str, formats: &[String]) -> Option<PrimitiveDateTime> {
    let text = text.trim();
    formats
        .iter()
        .find_map(|f| parse_with(text, f))
        .or_else(|| free_parse(text))
}

fn parse_with(text: &str, format: &str) -> Option<PrimitiveDateTime> {
    let items = format_description::parse(format).ok()?;
    PrimitiveDateTime::parse(text, &items)
        .ok()
        .or_else(|| Date::parse(text, &items).ok().map(|d| d.midnight()))
}

fn free_parse(text: &str) -> Option<PrimitiveDateTime> {
    let with_fraction = format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond]");
    let with_seconds = format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");
    let with_minutes = format_description!("[year]-[month]-[day]T[hour]:[minute]");
    let spaced = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    let date_only = format_description!("[year]-[month]-[day]");

    for items in [with_fraction, with_seconds, with_minutes, spaced] {
        if let Ok(dt) = PrimitiveDateTime::parse(text, items) {
            return Some(dt);
        }
    }
    if let Ok(d) = Date::parse(text, date_only) {
        return Some(d.midnight());
    }
    OffsetDateTime::parse(text, &Rfc3339).ok().map(|o| {
        let utc = o.to_offset(UtcOffset::UTC);
        PrimitiveDateTime::new(utc.date(), utc.time())
    })
}

/// Format a date, using `format` when given and valid, else the canonical
/// `yyyy-MM-ddTHH:mm:ss` form (with fractional seconds when present).
pub fn format_date(value: &PrimitiveDateTime, format: Option<&str>) -> String {
    if let Some(f) = format {
        if let Ok(items) = format_description::parse(f) {
            if let Ok(s) = value.format(&items) {
                return s;
            }
        }
    }
    let result = if value.nanosecond() == 0 {
        value.format(format_description!(
            "[year]-[month]-[day]T[hour]:[minute]:[second]"
        ))
    } else {
        value.format(format_description!(
            "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond]"
        ))
    };
    result.unwrap_or_else(|_| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn free_parse_accepts_iso_forms() {
        assert_eq!(
            parse_date("2020-01-03T04:05:06", &[]),
            Some(datetime!(2020-01-03 04:05:06))
        );
        assert_eq!(parse_date("2020-01-03", &[]), Some(datetime!(2020-01-03 0:00)));
        assert_eq!(parse_date("not a date", &[]), None);
    }

    #[test]
    fn explicit_formats_fall_back_to_free_parse() {
        let formats = vec!["[day]/[month]/[year]".to_string()];
        assert_eq!(
            parse_date("03/01/2020", &formats),
            Some(datetime!(2020-01-03 0:00))
        );
        assert_eq!(
            parse_date("2020-01-03", &formats),
            Some(datetime!(2020-01-03 0:00))
        );
        assert_eq!(parse_date("03.01.2020", &formats), None);
    }

    #[test]
    fn canonical_format() {
        let d = datetime!(2020-01-03 04:05:06);
        assert_eq!(format_date(&d, None), "2020-01-03T04:05:06");
        assert_eq!(format_date(&d, Some("[year]")), "2020");
    }
}
