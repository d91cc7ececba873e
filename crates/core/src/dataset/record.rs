use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::normalize::composite_key;

/// One subscriber row after normalization.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub building: String,
    pub block: String,
    pub unit: String,
    pub full_name: String,
    pub father_name: Option<String>,
    pub mobile: String,
    pub secondary_phone: String,
    pub landline: Option<String>,
    pub floor: String,
    pub amount_due: Option<Decimal>,
    pub modem_type: Option<String>,
}

impl Record {
    pub fn key(&self) -> String {
        composite_key(&self.building, &self.block, &self.unit)
    }
}
