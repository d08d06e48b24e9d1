use std::fmt::Write as _;

use crate::config::DisplayConfig;
use crate::observation::{Observation, PoiType};

pub const PHARMACY_COLOR: &str = "#0000ff";
pub const ORGANIZATION_COLOR: &str = "#088A08";
pub const HEALTH_CENTRE_COLOR: &str = "#FF8000";
pub const LOW_SUPPLY_COLOR: &str = "#FF0000";

/// Marker color for one observation: the type color, unless stock is at or
/// below the low-stock threshold, which overrides everything with the alert
/// color.
pub fn display_color(poi_type: PoiType, quantity_diff: i64, low_stock_threshold: i64) -> &'static str {
    if quantity_diff <= low_stock_threshold {
        return LOW_SUPPLY_COLOR;
    }
    match poi_type {
        PoiType::Pharmacy => PHARMACY_COLOR,
        PoiType::Organization => ORGANIZATION_COLOR,
        PoiType::HealthCentre => HEALTH_CENTRE_COLOR,
    }
}

/// Render the human-readable summary for one observation from the configured
/// template.
pub fn render_summary(observation: &Observation, display: &DisplayConfig) -> String {
    display
        .summary_template
        .replace("{name}", &observation.name)
        .replace("{poi_type}", observation.poi_type.as_label())
        .replace("{address}", &observation.address)
        .replace("{quantity}", &observation.quantity_diff.to_string())
        .replace(
            "{observed_at}",
            &format_observed_at(observation, &display.timestamp_format),
        )
}

fn format_observed_at(observation: &Observation, format: &str) -> String {
    // An invalid user-supplied format string makes chrono's formatter error
    // mid-write; fall back to the plain timestamp instead of panicking.
    let mut rendered = String::new();
    if write!(rendered, "{}", observation.observed_at.format(format)).is_ok() {
        rendered
    } else {
        observation.observed_at.format("%Y-%m-%d %H:%M").to_string()
    }
}
