pub mod catalog;
pub mod index;
pub mod loader;
pub mod record;

pub use catalog::{DatasetCatalog, DatasetError, DatasetStatus};
pub use index::{same_building, search, Dataset, SearchTerm, DEFAULT_MAX_RESULTS};
pub use loader::{ColumnMap, CsvDatasetLoader, DatasetLoader, LoadError, StaticDatasetLoader};
pub use record::Record;
