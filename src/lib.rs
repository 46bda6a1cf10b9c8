pub mod aggregate;
pub mod config;
pub mod database;
pub mod error;
pub mod ingest;
pub mod logging;
pub mod service;
pub mod storage;

pub use aggregate::Aggregator;
pub use config::Config;
pub use database::{Dataset, DatasetId, DatasetStore};
pub use error::{Error, Result};
pub use ingest::Ingestor;
pub use service::{table, TableService};
pub use storage::{DatasetStorage, Format};
