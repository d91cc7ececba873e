use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{info, warn};

use super::index::{search, Dataset};
use super::loader::DatasetLoader;
use super::record::Record;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DatasetError {
    #[error("dataset unavailable: {0}")]
    Unavailable(String),
}

/// What the catalog currently serves.
#[derive(Clone, Debug)]
pub enum DatasetStatus {
    Ready { dataset: Arc<Dataset>, source: String, loaded_at: DateTime<Utc> },
    Unavailable { reason: String },
}

/// Holds the active dataset snapshot; reloads swap the whole snapshot.
#[derive(Debug)]
pub struct DatasetCatalog {
    status: RwLock<DatasetStatus>,
}

impl Default for DatasetCatalog {
    fn default() -> Self {
        Self::unavailable("dataset has not been loaded")
    }
}

impl DatasetCatalog {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self { status: RwLock::new(DatasetStatus::Unavailable { reason: reason.into() }) }
    }

    pub fn ready(dataset: Dataset) -> Self {
        Self {
            status: RwLock::new(DatasetStatus::Ready {
                dataset: Arc::new(dataset),
                source: "in-memory".to_owned(),
                loaded_at: Utc::now(),
            }),
        }
    }

    /// Loads through `loader`. A failed load leaves the catalog unavailable rather than
    /// serving partial data.
    pub fn load_from(loader: &dyn DatasetLoader) -> Self {
        let catalog = Self::default();
        // The first load has nothing to fall back to.
        let _ = catalog.reload(loader);
        catalog
    }

    /// Replaces the snapshot with a fresh load. On failure the catalog becomes unavailable.
    pub fn reload(&self, loader: &dyn DatasetLoader) -> Result<usize, DatasetError> {
        let source = loader.describe();
        let next = match loader.load() {
            Ok(records) => {
                let dataset = Dataset::new(records);
                info!(
                    event_name = "dataset.load.completed",
                    correlation_id = "dataset",
                    source = %source,
                    records = dataset.len(),
                    buildings = dataset.distinct_buildings().len(),
                    "dataset loaded"
                );
                DatasetStatus::Ready { dataset: Arc::new(dataset), source, loaded_at: Utc::now() }
            }
            Err(error) => {
                warn!(
                    event_name = "dataset.load.failed",
                    correlation_id = "dataset",
                    source = %source,
                    error = %error,
                    "dataset load failed; lookups will report unavailable"
                );
                DatasetStatus::Unavailable { reason: error.to_string() }
            }
        };

        let outcome = match &next {
            DatasetStatus::Ready { dataset, .. } => Ok(dataset.len()),
            DatasetStatus::Unavailable { reason } => Err(DatasetError::Unavailable(reason.clone())),
        };
        match self.status.write() {
            Ok(mut status) => *status = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
        outcome
    }

    pub fn status(&self) -> DatasetStatus {
        match self.status.read() {
            Ok(status) => status.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn snapshot(&self) -> Result<Arc<Dataset>, DatasetError> {
        match self.status() {
            DatasetStatus::Ready { dataset, .. } => Ok(dataset),
            DatasetStatus::Unavailable { reason } => Err(DatasetError::Unavailable(reason)),
        }
    }

    pub fn distinct_buildings(&self) -> Result<Vec<String>, DatasetError> {
        Ok(self.snapshot()?.distinct_buildings().to_vec())
    }

    pub fn distinct_blocks(&self, building: &str) -> Result<Vec<String>, DatasetError> {
        Ok(self.snapshot()?.distinct_blocks(building).to_vec())
    }

    pub fn filter_by_building_and_block(
        &self,
        building: &str,
        block: &str,
    ) -> Result<Vec<Record>, DatasetError> {
        let dataset = self.snapshot()?;
        Ok(dataset.filter_by_building_and_block(building, block).into_iter().cloned().collect())
    }

    /// Filter and search in one pass against a single snapshot.
    pub fn find(
        &self,
        building: &str,
        block: &str,
        term: &str,
        limit: usize,
    ) -> Result<Vec<Record>, DatasetError> {
        let dataset = self.snapshot()?;
        let subset = dataset.filter_by_building_and_block(building, block);
        Ok(search(&subset, term, limit).into_iter().cloned().collect())
    }

    pub fn lookup(
        &self,
        building: &str,
        block: &str,
        unit: &str,
    ) -> Result<Vec<Record>, DatasetError> {
        let dataset = self.snapshot()?;
        Ok(dataset.lookup_key(building, block, unit).into_iter().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::{DatasetCatalog, DatasetError, DatasetStatus};
    use crate::dataset::loader::{DatasetLoader, LoadError, StaticDatasetLoader};
    use crate::dataset::record::Record;

    struct FailingLoader;

    impl DatasetLoader for FailingLoader {
        fn describe(&self) -> String {
            "failing".to_owned()
        }

        fn load(&self) -> Result<Vec<Record>, LoadError> {
            Err(LoadError::Open {
                path: "missing.csv".into(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
            })
        }
    }

    fn row(building: &str, block: &str, unit: &str) -> Record {
        Record {
            building: building.to_owned(),
            block: block.to_owned(),
            unit: unit.to_owned(),
            full_name: format!("Resident {unit}"),
            ..Record::default()
        }
    }

    #[test]
    fn unloaded_catalog_reports_unavailable_for_every_operation() {
        let catalog = DatasetCatalog::default();

        assert!(matches!(catalog.distinct_buildings(), Err(DatasetError::Unavailable(_))));
        assert!(matches!(catalog.distinct_blocks("A"), Err(DatasetError::Unavailable(_))));
        assert!(matches!(
            catalog.filter_by_building_and_block("A", "1"),
            Err(DatasetError::Unavailable(_))
        ));
        assert!(matches!(catalog.find("A", "1", "12", 5), Err(DatasetError::Unavailable(_))));
    }

    #[test]
    fn failed_load_is_unavailable_not_partial() {
        let catalog = DatasetCatalog::load_from(&FailingLoader);
        match catalog.status() {
            DatasetStatus::Unavailable { reason } => assert!(reason.contains("missing.csv")),
            DatasetStatus::Ready { .. } => panic!("catalog should be unavailable"),
        }
    }

    #[test]
    fn reload_swaps_snapshot() {
        let loader = StaticDatasetLoader::new(vec![row("A", "1", "1")]);
        let catalog = DatasetCatalog::load_from(&loader);
        let before = catalog.snapshot().expect("ready");

        let count = catalog
            .reload(&StaticDatasetLoader::new(vec![row("A", "1", "1"), row("B", "2", "2")]))
            .expect("reload succeeds");

        assert_eq!(count, 2);
        assert_eq!(before.len(), 1, "existing snapshots stay intact");
        assert_eq!(catalog.distinct_buildings().expect("ready"), vec!["A", "B"]);
    }

    #[test]
    fn failed_reload_makes_catalog_unavailable() {
        let loader = StaticDatasetLoader::new(vec![row("A", "1", "1")]);
        let catalog = DatasetCatalog::load_from(&loader);
        assert!(catalog.reload(&FailingLoader).is_err());
        assert!(catalog.snapshot().is_err());
    }
}
