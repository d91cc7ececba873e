use rosterbot_core::format::SearchContext;
use rosterbot_core::ResultFormatter;
use serde::Serialize;

use crate::commands::{load_catalog, CommandResult};

#[derive(Debug, Serialize)]
struct SearchReport {
    building: String,
    block: String,
    term: String,
    matches: usize,
    keys: Vec<String>,
}

/// Runs the same lookup a chat user reaches after picking building and block, and prints the
/// reply text the bot would send.
pub fn run(building: &str, block: &str, term: &str, limit: Option<usize>) -> CommandResult {
    let (config, catalog) = match load_catalog("search") {
        Ok(loaded) => loaded,
        Err(result) => return result,
    };

    let term = term.trim();
    if term.is_empty() {
        return CommandResult::failure("search", "invalid_term", "search term is empty", 1);
    }

    let limit = limit.unwrap_or(config.search.max_results);
    let records = match catalog.find(building, block, term, limit) {
        Ok(records) => records,
        Err(error) => {
            return CommandResult::failure("search", "dataset_unavailable", error.to_string(), 4)
        }
    };
    if records.is_empty() {
        return CommandResult::failure(
            "search",
            "no_match",
            format!("no subscriber matched `{term}` in building {building}, block {block}"),
            1,
        );
    }

    let formatter = ResultFormatter::new(config.search.currency_suffix.clone());
    let rendered = formatter.render(&SearchContext { building, block, term }, &records);
    let report = SearchReport {
        building: building.to_string(),
        block: block.to_string(),
        term: term.to_string(),
        matches: records.len(),
        keys: records.iter().map(|record| record.key()).collect(),
    };
    CommandResult::success_with("search", rendered, Some(report))
}
