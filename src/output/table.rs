use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color, ContentArrangement, Table};

use crate::aggregate::style::LOW_SUPPLY_COLOR;
use crate::aggregate::{DailyTotal, StockRow};

pub fn render_stock_table(rows: &[StockRow]) -> String {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        "Code",
        "Name",
        "Type",
        "Address",
        "Masks",
        "Observed At",
    ]);

    for row in rows {
        let quantity_cell = if row.display_color == LOW_SUPPLY_COLOR {
            Cell::new(row.quantity_diff.to_string()).fg(Color::Red)
        } else {
            Cell::new(row.quantity_diff.to_string())
        };
        table.add_row(vec![
            Cell::new(&row.code),
            Cell::new(&row.name),
            Cell::new(row.poi_type.to_string()),
            Cell::new(&row.address),
            quantity_cell,
            Cell::new(row.observed_at.format("%Y-%m-%d %H:%M").to_string()),
        ]);
    }
    table.to_string()
}

pub fn render_daily_table(series: &[DailyTotal]) -> String {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Date", "Total Masks"]);
    for total in series {
        table.add_row(vec![
            total.date.to_string(),
            total.total_quantity.to_string(),
        ]);
    }
    table.to_string()
}
