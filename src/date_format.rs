//! Serde helpers for the calendar dates sent over the wire.
//!
//! Dates are written as "YYYY-MM-DD". Browsers tend to send full ISO timestamps for date
//! inputs (e.g. "2024-05-01T00:00:00.000Z"), so parsing only looks at the leading date part.
//!
//! Query parameters that compare against record timestamps take an RFC 3339 timestamp or a
//! plain date, which means midnight UTC.

use time::{
    Date, OffsetDateTime, UtcOffset,
    format_description::{BorrowedFormatItem, well_known::Rfc3339},
    macros::format_description,
};

/// Date format for calendar dates, e.g. "2024-05-01".
pub(crate) const DATE_FORMAT: &[BorrowedFormatItem] = format_description!("[year]-[month]-[day]");

/// Parse a date from either "YYYY-MM-DD" or a timestamp that starts with one.
pub(crate) fn parse_date(text: &str) -> Result<Date, time::error::Parse> {
    let text = text.trim();
    let date_part = text.get(..10).unwrap_or(text);

    Date::parse(date_part, DATE_FORMAT)
}

/// Parse an RFC 3339 timestamp, or a "YYYY-MM-DD" date as midnight UTC, and convert it to UTC.
pub(crate) fn parse_timestamp(text: &str) -> Result<OffsetDateTime, time::error::Parse> {
    let text = text.trim();

    match OffsetDateTime::parse(text, &Rfc3339) {
        Ok(timestamp) => Ok(timestamp.to_offset(UtcOffset::UTC)),
        Err(_) => Date::parse(text, DATE_FORMAT).map(|date| date.midnight().assume_utc()),
    }
}

/// Deserialize an optional timestamp with [parse_timestamp].
///
/// Use together with `#[serde(default)]` so that a missing field becomes `None`.
pub(crate) mod option_timestamp {
    use serde::{Deserialize, Deserializer};
    use time::OffsetDateTime;

    use super::parse_timestamp;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<OffsetDateTime>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<String>::deserialize(deserializer)? {
            Some(s) if s.trim().is_empty() => Ok(None),
            Some(s) => parse_timestamp(&s).map(Some).map_err(serde::de::Error::custom),
            None => Ok(None),
        }
    }
}

/// Serialize and deserialize a required [Date].
pub(crate) mod date {
    use serde::{Deserialize, Deserializer, Serializer};
    use time::Date;

    use super::{DATE_FORMAT, parse_date};

    pub fn serialize<S>(date: &Date, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let formatted = date
            .format(DATE_FORMAT)
            .map_err(serde::ser::Error::custom)?;
        serializer.serialize_str(&formatted)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Date, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_date(&s).map_err(serde::de::Error::custom)
    }
}

/// Serialize and deserialize an optional [Date].
///
/// Use together with `#[serde(default)]` so that a missing field becomes `None`.
pub(crate) mod option_date {
    use serde::{Deserialize, Deserializer, Serializer};
    use time::Date;

    use super::{DATE_FORMAT, parse_date};

    pub fn serialize<S>(date: &Option<Date>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match date {
            Some(date) => {
                let formatted = date
                    .format(DATE_FORMAT)
                    .map_err(serde::ser::Error::custom)?;
                serializer.serialize_some(&formatted)
            }
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Date>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<String>::deserialize(deserializer)? {
            Some(s) if s.trim().is_empty() => Ok(None),
            Some(s) => parse_date(&s).map(Some).map_err(serde::de::Error::custom),
            None => Ok(None),
        }
    }
}
