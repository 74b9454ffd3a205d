use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime};

pub fn now_utc() -> OffsetDateTime {
    OffsetDateTime::now_utc()
}

/// Format a timestamp as RFC 3339. Falls back to unix seconds for
/// timestamps RFC 3339 cannot represent.
pub fn rfc3339(ts: OffsetDateTime) -> String {
    ts.format(&Rfc3339)
        .unwrap_or_else(|_| ts.unix_timestamp().to_string())
}

/// `YYYY-MM-DD`, used in tag names.
pub fn iso_date(date: Date) -> String {
    date.format(format_description!("[year]-[month]-[day]"))
        .unwrap_or_else(|_| date.to_string())
}

/// Filesystem-safe compact timestamp, e.g. `20261015T093000Z`.
pub fn compact_stamp(ts: OffsetDateTime) -> String {
    let ts = ts.to_offset(time::UtcOffset::UTC);
    ts.format(format_description!(
        "[year][month][day]T[hour][minute][second]Z"
    ))
    .unwrap_or_else(|_| ts.unix_timestamp().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::{date, datetime};

    #[test]
    fn iso_date_is_zero_padded() {
        assert_eq!(iso_date(date!(2026 - 03 - 05)), "2026-03-05");
    }

    #[test]
    fn compact_stamp_format() {
        let ts = datetime!(2026-10-15 09:30:00 UTC);
        assert_eq!(compact_stamp(ts), "20261015T093000Z");
    }

    #[test]
    fn rfc3339_format() {
        let ts = datetime!(2026-10-15 09:30:00 UTC);
        assert_eq!(rfc3339(ts), "2026-10-15T09:30:00Z");
    }
}
