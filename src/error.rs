use polars::prelude::PolarsError;
use thiserror::Error;

use crate::database::DatasetId;
use crate::storage::Format;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid format. Use 'csv' or 'parquet'.")]
    InvalidFormat(String),

    #[error("failed to parse upload as csv: {0}")]
    Parse(#[source] PolarsError),

    #[error("failed to write dataset {id} as {format}: {source}")]
    Write {
        id: DatasetId,
        format: Format,
        #[source]
        source: Box<Error>,
    },

    #[error("failed to read column '{column}' from {path}: {source}")]
    Read {
        path: String,
        column: String,
        #[source]
        source: PolarsError,
    },

    #[error("dataset {0} has no {1} location")]
    MissingLocation(DatasetId, Format),

    #[error(transparent)]
    Polars(#[from] PolarsError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("timed out waiting for data")]
    Timeout,

    #[error("failed to build thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("internal error: {0}")]
    Internal(String),
}
