use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use rayon::{ThreadPool, ThreadPoolBuilder};
use tokio::sync::oneshot;
use tokio::task::JoinError;
use tonic::{Request, Response, Status};
use tracing::error;

use crate::aggregate::Aggregator;
use crate::config::Config;
use crate::database::DatasetStore;
use crate::error::{Error, Result as CoreResult};
use crate::ingest::Ingestor;
use crate::storage::DatasetStorage;

pub mod table {
    tonic::include_proto!("table");
}

use table::table_server::Table;
pub use table::table_server::TableServer;
use table::{ColumnSumRequest, ColumnSumResponse, UploadRequest, UploadResponse};

/// gRPC front of the ingestion and aggregation services.
///
/// Uploads run on their own thread pool. Column sums run on the tokio
/// blocking pool, where they may park waiting for the first dataset.
pub struct TableService {
    ingestor: Arc<Ingestor>,
    aggregator: Arc<Aggregator>,
    upload_pool: Arc<ThreadPool>,
}

impl TableService {
    pub fn new(ingestor: Arc<Ingestor>, aggregator: Arc<Aggregator>, upload_pool: Arc<ThreadPool>) -> Self {
        Self { ingestor, aggregator, upload_pool }
    }

    /// Both services over one fresh store. `upload_threads == 0` sizes the
    /// upload pool to the number of cpus.
    pub fn from_storages(
        storages: Vec<DatasetStorage>,
        timeout: Option<Duration>,
        upload_threads: usize,
    ) -> CoreResult<Self> {
        let upload_pool = ThreadPoolBuilder::new()
            .num_threads(upload_threads)
            .thread_name(|i| format!("upload-{}", i))
            .build()?;
        let store = Arc::new(DatasetStore::new());
        let ingestor = Ingestor::new(store.clone(), storages.clone());
        let aggregator = Aggregator::new(store, storages).with_timeout(timeout);
        Ok(Self::new(Arc::new(ingestor), Arc::new(aggregator), Arc::new(upload_pool)))
    }

    pub fn from_config(config: &Config) -> CoreResult<Self> {
        Self::from_storages(config.storages(), config.column_sum_timeout(), config.upload_threads)
    }

    pub fn into_server(self) -> TableServer<Self> {
        TableServer::new(self)
    }
}

fn join_error(e: JoinError) -> Error {
    Error::Internal(e.to_string())
}

#[tonic::async_trait]
impl Table for TableService {
    async fn upload(
        &self,
        request: Request<UploadRequest>,
    ) -> Result<Response<UploadResponse>, Status> {
        let raw = request.into_inner().csv_data;
        let ingestor = self.ingestor.clone();
        let (tx, rx) = oneshot::channel();
        self.upload_pool.spawn(move || {
            let result = catch_unwind(AssertUnwindSafe(|| ingestor.upload(&raw)))
                .unwrap_or_else(|_| Err(Error::Internal("upload panicked".to_string())));
            tx.send(result).ok();
        });
        let result = rx
            .await
            .map_err(|_| Error::Internal("upload task dropped".to_string()))
            .and_then(|r| r);

        let error = match result {
            Ok(_) => String::new(),
            Err(e) => {
                error!(error = %e, "upload failed");
                e.to_string()
            }
        };
        Ok(Response::new(UploadResponse { error }))
    }

    async fn column_sum(
        &self,
        request: Request<ColumnSumRequest>,
    ) -> Result<Response<ColumnSumResponse>, Status> {
        let ColumnSumRequest { column, format } = request.into_inner();
        let aggregator = self.aggregator.clone();
        let result = tokio::task::spawn_blocking(move || aggregator.column_sum(&format, &column))
            .await
            .map_err(join_error)
            .and_then(|r| r);

        match result {
            Ok(total) => Ok(Response::new(ColumnSumResponse { total, error: String::new() })),
            Err(Error::Timeout) => Err(Status::deadline_exceeded(Error::Timeout.to_string())),
            Err(e) => {
                error!(error = %e, "column sum failed");
                Ok(Response::new(ColumnSumResponse { total: 0, error: e.to_string() }))
            }
        }
    }
}
