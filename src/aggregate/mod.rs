pub mod style;

use std::collections::{BTreeMap, HashSet};

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::aggregate::style::{display_color, render_summary};
use crate::config::DisplayConfig;
use crate::observation::{Observation, PoiType};

/// One row of a derived stock table: the winning observation for its group
/// key, plus the presentation fields attached during aggregation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StockRow {
    pub code: String,
    pub name: String,
    pub address: String,
    pub poi_type: PoiType,
    pub quantity_diff: i64,
    pub observed_at: NaiveDateTime,
    pub longitude: Option<f64>,
    pub latitude: Option<f64>,
    pub display_color: String,
    pub summary_text: String,
}

impl StockRow {
    fn from_observation(observation: &Observation, display: &DisplayConfig) -> Self {
        Self {
            code: observation.code.clone(),
            name: observation.name.clone(),
            address: observation.address.clone(),
            poi_type: observation.poi_type,
            quantity_diff: observation.quantity_diff,
            observed_at: observation.observed_at,
            longitude: observation.longitude,
            latitude: observation.latitude,
            display_color: display_color(
                observation.poi_type,
                observation.quantity_diff,
                display.low_stock_threshold,
            )
            .to_string(),
            summary_text: render_summary(observation, display),
        }
    }

    pub fn observed_date(&self) -> NaiveDate {
        self.observed_at.date()
    }
}

/// The two tables every refresh cycle recomputes from scratch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DerivedTables {
    /// Latest observation per POI, sorted by `code`.
    pub most_recent: Vec<StockRow>,
    /// Latest observation per (POI, calendar day), newest first.
    pub by_poi_and_day: Vec<StockRow>,
    /// Content hash over both tables; doubles as the HTTP ETag.
    pub table_hash: String,
}

impl DerivedTables {
    pub fn poi(&self, code: &str) -> Option<&StockRow> {
        self.most_recent.iter().find(|row| row.code == code)
    }

    pub fn is_empty(&self) -> bool {
        self.most_recent.is_empty()
    }
}

/// Sum of `quantity_diff` across POIs for one calendar day.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DailyTotal {
    pub date: NaiveDate,
    pub total_quantity: i64,
}

/// Reduce a raw observation table to its two derived views.
///
/// Observations are stably sorted newest-first, then the first row seen per
/// group key wins. The stable sort fixes the tie-break: among observations
/// with the same `observed_at`, the one earlier in the input takes the slot.
/// An empty input produces empty tables.
pub fn aggregate(observations: &[Observation], display: &DisplayConfig) -> DerivedTables {
    let mut sorted: Vec<&Observation> = observations.iter().collect();
    sorted.sort_by(|a, b| b.observed_at.cmp(&a.observed_at));

    let mut seen_codes: HashSet<&str> = HashSet::new();
    let mut seen_days: HashSet<(&str, NaiveDate)> = HashSet::new();
    let mut most_recent = Vec::new();
    let mut by_poi_and_day = Vec::new();

    for observation in sorted {
        if seen_days.insert((observation.code.as_str(), observation.observed_date())) {
            by_poi_and_day.push(StockRow::from_observation(observation, display));
        }
        if seen_codes.insert(observation.code.as_str()) {
            most_recent.push(StockRow::from_observation(observation, display));
        }
    }

    // Matches the original one-row-per-POI view, which came out keyed and
    // therefore ordered by code.
    most_recent.sort_by(|a, b| a.code.cmp(&b.code));

    let table_hash = hash_tables(&most_recent, &by_poi_and_day);
    DerivedTables {
        most_recent,
        by_poi_and_day,
        table_hash,
    }
}

/// The daily bar series: `quantity_diff` summed per calendar day over the
/// per-(POI, day) table, dates ascending.
pub fn daily_totals(by_poi_and_day: &[StockRow]) -> Vec<DailyTotal> {
    let mut totals: BTreeMap<NaiveDate, i64> = BTreeMap::new();
    for row in by_poi_and_day {
        *totals.entry(row.observed_date()).or_insert(0) += row.quantity_diff;
    }
    totals
        .into_iter()
        .map(|(date, total_quantity)| DailyTotal {
            date,
            total_quantity,
        })
        .collect()
}

fn hash_tables(most_recent: &[StockRow], by_poi_and_day: &[StockRow]) -> String {
    let mut hasher = Sha256::new();
    for table in [most_recent, by_poi_and_day] {
        let canonical = serde_json::to_string(table).unwrap_or_default();
        hasher.update(canonical.as_bytes());
        hasher.update([0u8]);
    }
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::{aggregate, daily_totals, DerivedTables};
    use crate::aggregate::style::{LOW_SUPPLY_COLOR, PHARMACY_COLOR};
    use crate::config::DisplayConfig;
    use crate::observation::{parse_observed_at, Observation};

    fn obs(code: &str, quantity: i64, timestamp: &str) -> Observation {
        let observed_at = parse_observed_at(timestamp).expect("test timestamp must parse");
        Observation {
            quantity_diff: quantity,
            ..Observation::sample(code, observed_at)
        }
    }

    fn run(observations: &[Observation]) -> DerivedTables {
        aggregate(observations, &DisplayConfig::default())
    }

    #[test]
    fn keeps_latest_per_poi_and_per_poi_day() {
        let input = vec![
            obs("A", 1_000, "2020-02-09 08:00:00"),
            obs("A", 900, "2020-02-09 12:00:00"),
            obs("A", 800, "2020-02-09 18:30:00"),
            obs("B", 5_000, "2020-02-10 09:00:00"),
        ];
        let tables = run(&input);

        assert_eq!(tables.most_recent.len(), 2);
        assert_eq!(tables.most_recent[0].code, "A");
        assert_eq!(tables.most_recent[0].quantity_diff, 800);
        assert_eq!(tables.most_recent[1].code, "B");

        assert_eq!(tables.by_poi_and_day.len(), 2);
        // Newest first: B's day is later than A's.
        assert_eq!(tables.by_poi_and_day[0].code, "B");
        assert_eq!(tables.by_poi_and_day[1].code, "A");
        assert_eq!(tables.by_poi_and_day[1].quantity_diff, 800);
    }

    #[test]
    fn one_row_per_code_and_per_code_day() {
        let input = vec![
            obs("A", 10, "2020-02-08 10:00:00"),
            obs("A", 20, "2020-02-09 10:00:00"),
            obs("B", 30, "2020-02-09 11:00:00"),
            obs("B", 40, "2020-02-09 15:00:00"),
            obs("C", 50, "2020-02-10 09:00:00"),
        ];
        let tables = run(&input);

        let codes: Vec<&str> = tables
            .most_recent
            .iter()
            .map(|row| row.code.as_str())
            .collect();
        assert_eq!(codes, ["A", "B", "C"]);

        let mut pairs: Vec<(String, NaiveDate)> = tables
            .by_poi_and_day
            .iter()
            .map(|row| (row.code.clone(), row.observed_date()))
            .collect();
        let before = pairs.len();
        pairs.sort();
        pairs.dedup();
        assert_eq!(pairs.len(), before);
        assert_eq!(before, 4);
    }

    #[test]
    fn most_recent_rows_dominate_their_code() {
        let input = vec![
            obs("A", 10, "2020-02-08 10:00:00"),
            obs("B", 30, "2020-02-09 11:00:00"),
            obs("A", 20, "2020-02-09 23:59:59"),
            obs("B", 40, "2020-02-07 15:00:00"),
        ];
        let tables = run(&input);
        for row in &tables.most_recent {
            for observation in input.iter().filter(|o| o.code == row.code) {
                assert!(row.observed_at >= observation.observed_at);
            }
        }
    }

    #[test]
    fn equal_timestamps_keep_the_earlier_input_row() {
        let input = vec![
            obs("A", 111, "2020-02-09 12:00:00"),
            obs("A", 222, "2020-02-09 12:00:00"),
        ];
        let tables = run(&input);
        assert_eq!(tables.most_recent.len(), 1);
        assert_eq!(tables.most_recent[0].quantity_diff, 111);
        assert_eq!(tables.by_poi_and_day.len(), 1);
        assert_eq!(tables.by_poi_and_day[0].quantity_diff, 111);
    }

    #[test]
    fn rerun_is_identical() {
        let input = vec![
            obs("B", 40, "2020-02-09 15:00:00"),
            obs("A", 10, "2020-02-08 10:00:00"),
            obs("A", 20, "2020-02-09 10:00:00"),
        ];
        let first = run(&input);
        let second = run(&input);
        assert_eq!(first, second);
        assert_eq!(first.table_hash, second.table_hash);
    }

    #[test]
    fn permuted_input_changes_nothing_but_tie_breaks() {
        let input = vec![
            obs("A", 10, "2020-02-08 10:00:00"),
            obs("B", 30, "2020-02-09 11:00:00"),
            obs("A", 20, "2020-02-09 10:00:00"),
        ];
        let mut reversed = input.clone();
        reversed.reverse();
        // No equal timestamps here, so input order must not matter.
        assert_eq!(run(&input), run(&reversed));
    }

    #[test]
    fn empty_input_produces_empty_tables() {
        let tables = run(&[]);
        assert!(tables.is_empty());
        assert!(tables.most_recent.is_empty());
        assert!(tables.by_poi_and_day.is_empty());
        assert!(!tables.table_hash.is_empty());
    }

    #[test]
    fn zero_stock_row_gets_the_alert_color() {
        let tables = run(&[obs("A", 0, "2020-02-09 12:00:00")]);
        assert_eq!(tables.most_recent[0].display_color, LOW_SUPPLY_COLOR);
        assert_eq!(tables.by_poi_and_day[0].display_color, LOW_SUPPLY_COLOR);
    }

    #[test]
    fn colors_follow_the_configured_threshold() {
        let display = DisplayConfig {
            low_stock_threshold: 50,
            ..DisplayConfig::default()
        };
        let tables = aggregate(
            &[
                obs("A", 50, "2020-02-09 12:00:00"),
                obs("B", 51, "2020-02-09 12:00:00"),
            ],
            &display,
        );
        assert_eq!(tables.most_recent[0].display_color, LOW_SUPPLY_COLOR);
        assert_eq!(tables.most_recent[1].display_color, PHARMACY_COLOR);
    }

    #[test]
    fn rows_carry_summary_text() {
        let tables = run(&[obs("A", 4_800, "2020-02-09 14:05:00")]);
        let summary = &tables.most_recent[0].summary_text;
        assert!(summary.contains("4800"));
        assert!(summary.contains("2020年02月09日"));
    }

    #[test]
    fn daily_totals_sum_per_day_ascending() {
        let input = vec![
            obs("A", 100, "2020-02-09 18:00:00"),
            obs("B", 200, "2020-02-09 17:00:00"),
            obs("A", 400, "2020-02-10 09:00:00"),
        ];
        let tables = run(&input);
        let series = daily_totals(&tables.by_poi_and_day);
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].date, NaiveDate::from_ymd_opt(2020, 2, 9).unwrap());
        assert_eq!(series[0].total_quantity, 300);
        assert_eq!(series[1].date, NaiveDate::from_ymd_opt(2020, 2, 10).unwrap());
        assert_eq!(series[1].total_quantity, 400);
    }
}
