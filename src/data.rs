use crate::config::AppConfig;
use crate::types::Record;
use anyhow::{Context, Result, anyhow};
use csv::ReaderBuilder;
use std::fs::File;
use std::io::Read;
use tracing::info;

const REQUIRED_COLUMNS: [&str; 4] = ["Neighbourhood", "Type", "YearOfInstallation", "geo_point_2d"];

pub fn load_data(config: &AppConfig) -> Result<Vec<Record>> {
    info!(path = ?config.input.data_csv, "Loading public art dataset");

    let file = File::open(&config.input.data_csv)
        .with_context(|| format!("Failed to open CSV file: {:?}", config.input.data_csv))?;
    let records = load_records(file)
        .with_context(|| format!("Failed to read CSV file: {:?}", config.input.data_csv))?;

    info!(records = records.len(), "Loaded dataset");
    Ok(records)
}

/// Read every row in file order and normalize it.
///
/// Individual cells are never rejected; a missing header column or a row the
/// CSV reader itself cannot split fails the whole load.
pub fn load_records<R: Read>(reader: R) -> Result<Vec<Record>> {
    let mut rdr = ReaderBuilder::new().flexible(true).from_reader(reader);
    let headers = rdr.headers()?.clone();

    if let Some(missing) = REQUIRED_COLUMNS.iter().find(|c| !headers.iter().any(|h| h == **c)) {
        return Err(anyhow!("Column '{}' not found in CSV", missing));
    }

    let mut records = Vec::new();
    for result in rdr.deserialize::<Record>() {
        let record = result?;
        records.push(record.normalize());
    }

    Ok(records)
}
