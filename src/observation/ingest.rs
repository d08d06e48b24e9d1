use std::io::Read;

use csv::ReaderBuilder;
use thiserror::Error;
use tracing::warn;

use crate::observation::schema::{ColumnMap, SchemaError};
use crate::observation::{parse_coordinate, parse_observed_at, parse_quantity, Observation};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error("failed reading source table: {0}")]
    Csv(#[from] csv::Error),
}

/// Result of one ingest pass: the rows that parsed, and how many were
/// dropped on the floor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObservationBatch {
    pub observations: Vec<Observation>,
    pub skipped_rows: usize,
}

/// Read a raw observation table from CSV.
///
/// The header row is validated up front: a missing required column rejects
/// the whole table with [`SchemaError`]. After that, rows are best-effort —
/// a row whose timestamp, type, or quantity does not parse is skipped and
/// logged, and the rest of the batch proceeds.
pub fn read_observations<R: Read>(reader: R) -> Result<ObservationBatch, IngestError> {
    let mut csv_reader = ReaderBuilder::new().flexible(true).from_reader(reader);
    let columns = ColumnMap::from_headers(csv_reader.headers()?)?;

    let mut batch = ObservationBatch::default();
    for (index, record) in csv_reader.records().enumerate() {
        // Data rows start on line 2, after the header.
        let line = index + 2;
        let record = record?;
        match parse_record(&record, &columns) {
            Ok(observation) => batch.observations.push(observation),
            Err(reason) => {
                warn!("skipping row at line {line}: {reason}");
                batch.skipped_rows += 1;
            }
        }
    }
    Ok(batch)
}

fn parse_record(
    record: &csv::StringRecord,
    columns: &ColumnMap,
) -> Result<Observation, String> {
    let field = |index: usize, column: &str| -> Result<&str, String> {
        record
            .get(index)
            .ok_or_else(|| format!("row is too short, no {column} field"))
    };

    let code = field(columns.code, "code")?.trim();
    if code.is_empty() {
        return Err("empty code".to_string());
    }

    let raw_poi_type = field(columns.poi_type, "poi_type")?;
    let poi_type = raw_poi_type
        .parse()
        .map_err(|err| format!("{err}"))?;

    let raw_quantity = field(columns.quantity_diff, "quantity_diff")?;
    let quantity_diff = parse_quantity(raw_quantity)
        .ok_or_else(|| format!("unparseable quantity: {raw_quantity:?}"))?;

    let raw_observed_at = field(columns.observed_at, "observed_at")?;
    let observed_at = parse_observed_at(raw_observed_at)
        .ok_or_else(|| format!("unparseable timestamp: {raw_observed_at:?}"))?;

    Ok(Observation {
        code: code.to_string(),
        name: field(columns.name, "name")?.trim().to_string(),
        address: field(columns.address, "address")?.trim().to_string(),
        poi_type,
        quantity_diff,
        observed_at,
        longitude: columns
            .longitude
            .and_then(|index| record.get(index))
            .and_then(parse_coordinate),
        latitude: columns
            .latitude
            .and_then(|index| record.get(index))
            .and_then(parse_coordinate),
    })
}
