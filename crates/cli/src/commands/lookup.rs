use rosterbot_core::format::SearchContext;
use rosterbot_core::normalize::composite_key;
use rosterbot_core::ResultFormatter;
use serde::Serialize;

use crate::commands::{load_catalog, CommandResult};

#[derive(Debug, Serialize)]
struct LookupReport {
    key: String,
    matches: usize,
}

/// Exact match on the `building_block_unit` key, without the block and name tolerance of
/// `search`.
pub fn run(building: &str, block: &str, unit: &str) -> CommandResult {
    let (config, catalog) = match load_catalog("lookup") {
        Ok(loaded) => loaded,
        Err(result) => return result,
    };

    let key = composite_key(building, block, unit);
    let records = match catalog.lookup(building, block, unit) {
        Ok(records) => records,
        Err(error) => {
            return CommandResult::failure("lookup", "dataset_unavailable", error.to_string(), 4)
        }
    };
    if records.is_empty() {
        let message = format!("no record has key `{key}`");
        return CommandResult::failure("lookup", "no_match", message, 1);
    }

    let formatter = ResultFormatter::new(config.search.currency_suffix.clone());
    let rendered = formatter.render(&SearchContext { building, block, term: unit }, &records);
    let report = LookupReport { key, matches: records.len() };
    CommandResult::success_with("lookup", rendered, Some(report))
}
