use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use super::record::Record;
use crate::normalize::{normalize_digits, normalize_identifier, FieldNormalizer, RawCell};

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("could not open dataset `{path}`: {source}")]
    Open { path: PathBuf, source: std::io::Error },
    #[error("could not read dataset `{path}`: {source}")]
    Read { path: PathBuf, source: csv::Error },
    #[error("dataset `{path}` is missing required columns: {missing:?}")]
    MissingColumns { path: PathBuf, missing: Vec<String> },
}

pub trait DatasetLoader: Send + Sync {
    fn describe(&self) -> String;
    fn load(&self) -> Result<Vec<Record>, LoadError>;
}

/// Header names for each record field in the source sheet.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnMap {
    pub building: String,
    pub block: String,
    pub unit: String,
    pub full_name: String,
    pub father_name: String,
    pub mobile: String,
    pub secondary_phone: String,
    pub landline: String,
    pub floor: String,
    pub amount: String,
    pub modem_type: String,
}

impl Default for ColumnMap {
    fn default() -> Self {
        Self {
            building: "building".to_owned(),
            block: "block".to_owned(),
            unit: "unit".to_owned(),
            full_name: "full_name".to_owned(),
            father_name: "father_name".to_owned(),
            mobile: "mobile".to_owned(),
            secondary_phone: "secondary_phone".to_owned(),
            landline: "landline".to_owned(),
            floor: "floor".to_owned(),
            amount: "amount".to_owned(),
            modem_type: "modem_type".to_owned(),
        }
    }
}

impl ColumnMap {
    fn required(&self) -> [&str; 5] {
        [&self.building, &self.block, &self.unit, &self.full_name, &self.mobile]
    }
}

pub struct CsvDatasetLoader {
    path: PathBuf,
    columns: ColumnMap,
    normalizer: FieldNormalizer,
}

impl CsvDatasetLoader {
    pub fn new(path: impl Into<PathBuf>, columns: ColumnMap, normalizer: FieldNormalizer) -> Self {
        Self { path: path.into(), columns, normalizer }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DatasetLoader for CsvDatasetLoader {
    fn describe(&self) -> String {
        format!("csv:{}", self.path.display())
    }

    fn load(&self) -> Result<Vec<Record>, LoadError> {
        let file = File::open(&self.path)
            .map_err(|source| LoadError::Open { path: self.path.clone(), source })?;
        let mut reader =
            csv::ReaderBuilder::new().flexible(true).trim(csv::Trim::All).from_reader(file);

        let headers = reader
            .headers()
            .map_err(|source| LoadError::Read { path: self.path.clone(), source })?
            .clone();
        let positions: HashMap<&str, usize> = headers
            .iter()
            .enumerate()
            .map(|(index, name)| (name.trim_start_matches('\u{feff}'), index))
            .collect();

        let missing: Vec<String> = self
            .columns
            .required()
            .iter()
            .filter(|name| !positions.contains_key(**name))
            .map(|name| (*name).to_owned())
            .collect();
        if !missing.is_empty() {
            return Err(LoadError::MissingColumns { path: self.path.clone(), missing });
        }

        let mut records = Vec::new();
        for (line, row) in reader.records().enumerate() {
            let row = row.map_err(|source| LoadError::Read { path: self.path.clone(), source })?;
            let cell = |name: &str| -> RawCell {
                positions
                    .get(name)
                    .and_then(|&index| row.get(index))
                    .map(RawCell::from_text)
                    .unwrap_or(RawCell::Empty)
            };
            let record = build_record(&self.columns, &self.normalizer, &cell);
            if record.amount_due.is_none() && !cell(&self.columns.amount).is_blank() {
                debug!(
                    event_name = "dataset.load.amount_unparsed",
                    line = line + 2,
                    "amount cell is not numeric; treating as unknown"
                );
            }
            records.push(record);
        }

        if records.is_empty() {
            warn!(
                event_name = "dataset.load.empty",
                source = %self.describe(),
                "dataset loaded without any rows"
            );
        }
        Ok(records)
    }
}

fn build_record<F>(columns: &ColumnMap, normalizer: &FieldNormalizer, cell: F) -> Record
where
    F: Fn(&str) -> RawCell,
{
    let optional = |name: &str| Some(cell(name).render()).filter(|value| !value.is_empty());
    let secondary = cell(&columns.secondary_phone);

    Record {
        building: cell(&columns.building).render(),
        block: normalize_identifier(&cell(&columns.block)),
        unit: normalize_identifier(&cell(&columns.unit)),
        full_name: cell(&columns.full_name).render(),
        father_name: optional(&columns.father_name),
        mobile: normalizer.normalize_phone(&cell(&columns.mobile), &secondary),
        secondary_phone: normalizer.normalize_phone(&secondary, &RawCell::Empty),
        landline: optional(&columns.landline),
        floor: normalize_identifier(&cell(&columns.floor)),
        amount_due: parse_amount(&cell(&columns.amount)),
        modem_type: optional(&columns.modem_type),
    }
}

/// Parses an amount cell, tolerating thousands separators. Non-numeric cells become `None`.
pub fn parse_amount(raw: &RawCell) -> Option<Decimal> {
    match raw {
        RawCell::Empty => None,
        RawCell::Number(value) => Decimal::from_str(&value.to_string()).ok(),
        RawCell::Text(text) => {
            let cleaned: String = normalize_digits(text.trim())
                .chars()
                .filter(|ch| !matches!(ch, ',' | '\u{066C}' | ' '))
                .collect();
            if cleaned.eq_ignore_ascii_case("nan") {
                return None;
            }
            Decimal::from_str(&cleaned).ok()
        }
    }
}

/// Serves a fixed set of records; used by tests and offline tooling.
#[derive(Clone, Debug, Default)]
pub struct StaticDatasetLoader {
    records: Vec<Record>,
}

impl StaticDatasetLoader {
    pub fn new(records: Vec<Record>) -> Self {
        Self { records }
    }
}

impl DatasetLoader for StaticDatasetLoader {
    fn describe(&self) -> String {
        format!("static:{} rows", self.records.len())
    }

    fn load(&self) -> Result<Vec<Record>, LoadError> {
        Ok(self.records.clone())
    }
}
