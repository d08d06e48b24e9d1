use std::fmt::{Display, Formatter};
use std::str::FromStr;

use csv::StringRecord;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Kind of location a stock observation refers to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PoiType {
    #[serde(rename = "pharmacy")]
    Pharmacy,
    #[serde(rename = "organization")]
    Organization,
    #[serde(rename = "health centre")]
    HealthCentre,
}

impl PoiType {
    pub const ALL: [PoiType; 3] = [PoiType::Pharmacy, PoiType::Organization, PoiType::HealthCentre];

    /// The value as it appears in the source table.
    pub fn as_label(&self) -> &'static str {
        match self {
            Self::Pharmacy => "pharmacy",
            Self::Organization => "organization",
            Self::HealthCentre => "health centre",
        }
    }
}

impl Display for PoiType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_label())
    }
}

#[derive(Debug, Error)]
#[error("unknown poi type: {0}")]
pub struct PoiTypeParseError(pub String);

impl FromStr for PoiType {
    type Err = PoiTypeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "pharmacy" => Ok(Self::Pharmacy),
            "organization" | "organisation" => Ok(Self::Organization),
            "health centre" | "health center" | "health_centre" | "health-centre" => {
                Ok(Self::HealthCentre)
            }
            _ => Err(PoiTypeParseError(s.to_string())),
        }
    }
}

/// Raised when the source table lacks one or more required columns. The batch
/// is rejected whole; there is no partial processing of a malformed table.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("source table is missing required column(s): {}", missing.join(", "))]
pub struct SchemaError {
    pub missing: Vec<String>,
}

/// Canonical column names, with the spellings older exports used. The first
/// header matching either the canonical name or an alias wins; extra columns
/// are ignored.
const CODE_COLUMNS: [&str; 1] = ["code"];
const NAME_COLUMNS: [&str; 1] = ["name"];
const ADDRESS_COLUMNS: [&str; 1] = ["address"];
const POI_TYPE_COLUMNS: [&str; 2] = ["poi_type", "type"];
const QUANTITY_COLUMNS: [&str; 2] = ["quantity_diff", "tolqty_diff"];
const OBSERVED_AT_COLUMNS: [&str; 2] = ["observed_at", "human_parsed_timestamp"];
const LONGITUDE_COLUMNS: [&str; 3] = ["longitude", "lon", "x"];
const LATITUDE_COLUMNS: [&str; 3] = ["latitude", "lat", "y"];

/// Positions of the recognised columns within one source table.
///
/// Coordinates are optional: exports produced before the map view lack them,
/// and nothing in the aggregation depends on them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMap {
    pub code: usize,
    pub name: usize,
    pub address: usize,
    pub poi_type: usize,
    pub quantity_diff: usize,
    pub observed_at: usize,
    pub longitude: Option<usize>,
    pub latitude: Option<usize>,
}

impl ColumnMap {
    pub fn from_headers(headers: &StringRecord) -> Result<Self, SchemaError> {
        let required = [
            position_of(headers, &CODE_COLUMNS),
            position_of(headers, &NAME_COLUMNS),
            position_of(headers, &ADDRESS_COLUMNS),
            position_of(headers, &POI_TYPE_COLUMNS),
            position_of(headers, &QUANTITY_COLUMNS),
            position_of(headers, &OBSERVED_AT_COLUMNS),
        ];

        match required {
            [Some(code), Some(name), Some(address), Some(poi_type), Some(quantity_diff), Some(observed_at)] => {
                Ok(Self {
                    code,
                    name,
                    address,
                    poi_type,
                    quantity_diff,
                    observed_at,
                    longitude: position_of(headers, &LONGITUDE_COLUMNS),
                    latitude: position_of(headers, &LATITUDE_COLUMNS),
                })
            }
            found => {
                let canonical = [
                    CODE_COLUMNS[0],
                    NAME_COLUMNS[0],
                    ADDRESS_COLUMNS[0],
                    POI_TYPE_COLUMNS[0],
                    QUANTITY_COLUMNS[0],
                    OBSERVED_AT_COLUMNS[0],
                ];
                let missing = canonical
                    .iter()
                    .zip(found.iter())
                    .filter(|(_, position)| position.is_none())
                    .map(|(column, _)| column.to_string())
                    .collect();
                Err(SchemaError { missing })
            }
        }
    }
}

fn position_of(headers: &StringRecord, accepted: &[&'static str]) -> Option<usize> {
    for candidate in accepted {
        if let Some(index) = headers
            .iter()
            .position(|header| header.trim().eq_ignore_ascii_case(candidate))
        {
            return Some(index);
        }
    }
    None
}
