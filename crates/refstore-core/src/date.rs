//! Date handling for record timestamps and the persisted watermark.

use chrono::{NaiveDate, NaiveDateTime, Timelike};

use crate::error::SourceError;
use crate::record::Record;

const WATERMARK_SECONDS: &str = "%Y-%m-%dT%H:%M:%S";
const WATERMARK_FRACTION: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// Floor value used when the store holds no watermark yet: any real indexed
/// timestamp advances past it.
pub fn watermark_floor() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1900, 1, 1)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .expect("constant date is valid")
}

/// Format a watermark as ISO-8601 without a zone designator.
pub fn format_watermark(timestamp: NaiveDateTime) -> String {
    if timestamp.nanosecond() == 0 {
        timestamp.format(WATERMARK_SECONDS).to_string()
    } else {
        timestamp.format(WATERMARK_FRACTION).to_string()
    }
}

/// Parse a stored watermark string.
pub fn parse_watermark(value: &str) -> Result<NaiveDateTime, SourceError> {
    NaiveDateTime::parse_from_str(value, WATERMARK_FRACTION)
        .map_err(|_| SourceError::InvalidTimestamp(value.to_string()))
}

/// Parse an upstream `date-time` string, which must carry a trailing `Z`.
pub fn parse_indexed_datetime(value: &str) -> Result<NaiveDateTime, SourceError> {
    let Some(naive_part) = value.strip_suffix('Z') else {
        return Err(SourceError::InvalidTimestamp(value.to_string()));
    };

    NaiveDateTime::parse_from_str(naive_part, WATERMARK_FRACTION)
        .map_err(|_| SourceError::InvalidTimestamp(value.to_string()))
}

/// The record's indexed timestamp, from the nested `indexed.date-time` field.
///
/// A missing field is `None`; a present but malformed field is an error.
pub fn indexed_datetime(record: &Record) -> Result<Option<NaiveDateTime>, SourceError> {
    let Some(indexed) = record.as_value().get("indexed") else {
        return Ok(None);
    };

    let shape_err = || SourceError::MalformedInput("Unexpected JSON format".into());

    let indexed = indexed.as_object().ok_or_else(shape_err)?;

    let Some(date_time) = indexed.get("date-time") else {
        return Ok(None);
    };

    let date_time = date_time.as_str().ok_or_else(shape_err)?;

    parse_indexed_datetime(date_time).map(Some)
}

/// The record's publication date: the maximum over the `published.date-parts`
/// entries, each `[Y]`, `[Y, M]`, or `[Y, M, D]`.
///
/// Exposed for caller-supplied filter predicates.
pub fn published_date(record: &Record) -> Result<Option<NaiveDate>, SourceError> {
    let Some(published) = record.as_value().get("published") else {
        return Ok(None);
    };

    let shape_err = || SourceError::MalformedInput("Unexpected JSON format".into());

    let published = published.as_object().ok_or_else(shape_err)?;

    let Some(date_parts) = published.get("date-parts") else {
        return Ok(None);
    };

    let date_parts = date_parts.as_array().ok_or_else(shape_err)?;

    let mut latest: Option<NaiveDate> = None;

    for raw_parts in date_parts {
        let parts: Vec<i64> = raw_parts
            .as_array()
            .ok_or_else(shape_err)?
            .iter()
            .map(|part| part.as_i64().ok_or_else(shape_err))
            .collect::<Result<_, _>>()?;

        let (year, month, day) = match parts[..] {
            [year] => (year, 1, 1),
            [year, month] => (year, month, 1),
            [year, month, day] => (year, month, day),
            _ => {
                return Err(SourceError::MalformedInput(format!(
                    "Unknown date format: {raw_parts}"
                )))
            }
        };

        let date = NaiveDate::from_ymd_opt(year as i32, month as u32, day as u32)
            .ok_or_else(|| SourceError::InvalidTimestamp(format!("{year}-{month}-{day}")))?;

        latest = Some(latest.map_or(date, |current| current.max(date)));
    }

    Ok(latest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn record(value: Value) -> Record {
        Record::from_value(value).unwrap()
    }

    #[test]
    fn test_watermark_round_trip() {
        let with_fraction = parse_indexed_datetime("2024-11-02T04:13:48.123Z").unwrap();
        assert_eq!(
            parse_watermark(&format_watermark(with_fraction)).unwrap(),
            with_fraction
        );

        let whole_seconds = parse_indexed_datetime("2024-11-02T04:13:48Z").unwrap();
        assert_eq!(format_watermark(whole_seconds), "2024-11-02T04:13:48");
        assert_eq!(
            parse_watermark("2024-11-02T04:13:48").unwrap(),
            whole_seconds
        );
    }

    #[test]
    fn test_indexed_datetime_requires_zone_designator() {
        assert!(parse_indexed_datetime("2024-11-02T04:13:48").is_err());
        assert!(parse_indexed_datetime("not a date").is_err());
    }

    #[test]
    fn test_indexed_datetime_extraction() {
        let rec = record(json!({
            "DOI": "10.1/a",
            "indexed": {"date-time": "2024-11-02T04:13:48Z"},
        }));
        assert_eq!(
            indexed_datetime(&rec).unwrap(),
            Some(parse_indexed_datetime("2024-11-02T04:13:48Z").unwrap())
        );

        let rec = record(json!({"DOI": "10.1/a"}));
        assert_eq!(indexed_datetime(&rec).unwrap(), None);

        let rec = record(json!({"DOI": "10.1/a", "indexed": {}}));
        assert_eq!(indexed_datetime(&rec).unwrap(), None);

        let rec = record(json!({"DOI": "10.1/a", "indexed": {"date-time": 5}}));
        assert!(indexed_datetime(&rec).is_err());
    }

    #[test]
    fn test_published_date_takes_maximum() {
        let rec = record(json!({
            "published": {"date-parts": [[2020, 5], [2021], [2019, 3, 14]]},
        }));
        assert_eq!(
            published_date(&rec).unwrap(),
            NaiveDate::from_ymd_opt(2021, 1, 1)
        );

        let rec = record(json!({"DOI": "10.1/a"}));
        assert_eq!(published_date(&rec).unwrap(), None);

        let rec = record(json!({"published": {"date-parts": [[1, 2, 3, 4]]}}));
        assert!(published_date(&rec).is_err());
    }
}
