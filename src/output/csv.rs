use anyhow::Result;

use crate::aggregate::{DailyTotal, StockRow};

pub fn stock_rows_to_csv(rows: &[StockRow]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(vec![]);
    writer.write_record([
        "code",
        "name",
        "address",
        "poi_type",
        "quantity_diff",
        "observed_at",
        "longitude",
        "latitude",
        "display_color",
    ])?;
    for row in rows {
        writer.write_record([
            row.code.clone(),
            row.name.clone(),
            row.address.clone(),
            row.poi_type.to_string(),
            row.quantity_diff.to_string(),
            row.observed_at.to_string(),
            row.longitude.map(|v| v.to_string()).unwrap_or_default(),
            row.latitude.map(|v| v.to_string()).unwrap_or_default(),
            row.display_color.clone(),
        ])?;
    }
    let data = writer.into_inner()?;
    Ok(String::from_utf8_lossy(&data).to_string())
}

pub fn daily_to_csv(series: &[DailyTotal]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(vec![]);
    writer.write_record(["date", "total_quantity"])?;
    for total in series {
        writer.write_record([total.date.to_string(), total.total_quantity.to_string()])?;
    }
    let data = writer.into_inner()?;
    Ok(String::from_utf8_lossy(&data).to_string())
}
