pub mod ingest;
pub mod schema;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

pub use ingest::{read_observations, IngestError, ObservationBatch};
pub use schema::{ColumnMap, PoiType, PoiTypeParseError, SchemaError};

/// One timestamped reading of a point of interest's mask stock.
///
/// `observed_at` is the clock reading the upstream publisher recorded; it
/// carries no offset and is never shifted into another timezone. Coordinates
/// are present when the export includes the map columns.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Observation {
    pub code: String,
    pub name: String,
    pub address: String,
    pub poi_type: PoiType,
    pub quantity_diff: i64,
    pub observed_at: NaiveDateTime,
    pub longitude: Option<f64>,
    pub latitude: Option<f64>,
}

impl Observation {
    /// A plausible reading, for tests and examples.
    pub fn sample(code: impl Into<String>, observed_at: NaiveDateTime) -> Self {
        Self {
            code: code.into(),
            name: "同善堂第二診所".to_string(),
            address: "澳門新馬路某號".to_string(),
            poi_type: PoiType::Pharmacy,
            quantity_diff: 4_800,
            observed_at,
            longitude: Some(113.545521),
            latitude: Some(22.198818),
        }
    }

    /// Calendar date of the observation, taken literally from the stored
    /// clock reading.
    pub fn observed_date(&self) -> NaiveDate {
        self.observed_at.date()
    }
}

const TIMESTAMP_FORMATS: [&str; 3] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// Parse a source timestamp. Accepts the date-time spellings observed in the
/// feed history; an RFC 3339 value with an offset is taken at its local clock
/// reading, and a bare date maps to midnight.
pub fn parse_observed_at(raw: &str) -> Option<NaiveDateTime> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    for format in TIMESTAMP_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(parsed);
        }
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(parsed.naive_local());
    }
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}

/// Parse a stock quantity. Tolerates whitespace, thousands separators, and
/// the float formatting some exports applied to integer columns.
pub fn parse_quantity(raw: &str) -> Option<i64> {
    let sanitized = raw.trim().replace([',', '_'], "");
    if sanitized.is_empty() {
        return None;
    }
    if let Ok(value) = sanitized.parse::<i64>() {
        return Some(value);
    }
    let float = sanitized.parse::<f64>().ok()?;
    if float.is_finite() && float.fract() == 0.0 {
        Some(float as i64)
    } else {
        None
    }
}

/// Parse an optional coordinate column. Unusable values become `None` rather
/// than invalidating the row.
pub fn parse_coordinate(raw: &str) -> Option<f64> {
    let value = raw.trim().parse::<f64>().ok()?;
    value.is_finite().then_some(value)
}
