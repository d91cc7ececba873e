use rosterbot_core::dataset::same_building;
use serde::Serialize;

use crate::commands::{load_catalog, CommandResult};

#[derive(Debug, Serialize)]
struct BuildingSummary {
    building: String,
    blocks: Vec<String>,
    records: usize,
}

#[derive(Debug, Serialize)]
struct DatasetSummary {
    source: String,
    records: usize,
    buildings: Vec<BuildingSummary>,
}

/// Summarizes the loaded dataset, optionally narrowed to one building.
pub fn run(building: Option<&str>) -> CommandResult {
    let (config, catalog) = match load_catalog("inspect") {
        Ok(loaded) => loaded,
        Err(result) => return result,
    };
    let dataset = match catalog.snapshot() {
        Ok(dataset) => dataset,
        Err(error) => {
            return CommandResult::failure("inspect", "dataset_unavailable", error.to_string(), 4)
        }
    };

    if let Some(building) = building {
        if !dataset.has_building(building) {
            return CommandResult::failure(
                "inspect",
                "unknown_building",
                format!("building `{building}` does not appear in the dataset"),
                1,
            );
        }
    }

    let buildings: Vec<BuildingSummary> = dataset
        .distinct_buildings()
        .iter()
        .filter(|name| building.map_or(true, |wanted| same_building(name, wanted)))
        .map(|name| BuildingSummary {
            building: name.clone(),
            blocks: dataset.distinct_blocks(name).to_vec(),
            records: dataset
                .records()
                .iter()
                .filter(|record| same_building(&record.building, name))
                .count(),
        })
        .collect();

    let summary = DatasetSummary {
        source: config.dataset.path.display().to_string(),
        records: dataset.len(),
        buildings,
    };
    let message = format!(
        "{} records across {} buildings",
        summary.records,
        dataset.distinct_buildings().len()
    );
    CommandResult::success_with("inspect", message, Some(summary))
}
