pub mod access;
pub mod config;
pub mod conversation;
pub mod dataset;
pub mod errors;
pub mod format;
pub mod normalize;

pub use access::{
    AccessDecision, AccessGate, AccessStore, AccessStoreError, FileAccessStore,
    InMemoryAccessStore, UserId,
};
pub use conversation::{
    Command, ConversationEngine, ConversationInput, ConversationService, ConversationState, Menu,
    MenuOption, Reply, ReplyMessage, Stage, Terminal,
};
pub use dataset::{
    ColumnMap, CsvDatasetLoader, Dataset, DatasetCatalog, DatasetError, DatasetLoader,
    DatasetStatus, LoadError, Record, StaticDatasetLoader,
};
pub use errors::ConversationError;
pub use format::ResultFormatter;
pub use normalize::{FieldNormalizer, RawCell, RewriteRule};
