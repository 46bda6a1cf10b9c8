use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::database::{Dataset, DatasetStore};
use crate::error::{Error, Result};
use crate::storage::{ColumnValues, DatasetStorage, Format};

/// Answers column sums over every registered dataset.
pub struct Aggregator {
    store: Arc<DatasetStore>,
    storages: HashMap<Format, DatasetStorage>,
    timeout: Option<Duration>,
}

impl Aggregator {
    pub fn new(store: Arc<DatasetStore>, storages: Vec<DatasetStorage>) -> Self {
        let storages = storages.into_iter().map(|s| (s.format, s)).collect();
        Self { store, storages, timeout: None }
    }

    /// Bounds how long a sum waits for the first dataset.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sums `column` over every dataset stored as `format`, truncated toward zero.
    ///
    /// Blocks while no dataset has been registered. Datasets without the
    /// column, or whose file cannot be read, contribute zero.
    pub fn column_sum(&self, format: &str, column: &str) -> Result<i64> {
        let format: Format = format.parse()?;
        let storage = self
            .storages
            .get(&format)
            .ok_or_else(|| Error::InvalidFormat(format.to_string()))?;
        info!(%format, column, "column sum requested");

        let datasets = match self.timeout {
            Some(timeout) => self.store.wait_for_datasets_timeout(timeout).ok_or(Error::Timeout)?,
            None => self.store.wait_for_datasets(),
        };
        debug!(%format, column, datasets = datasets.len(), "datasets available");

        let contributions = datasets
            .par_iter()
            .map(|ds| read_dataset(storage, ds, column))
            .collect::<Vec<_>>();

        let mut total = Total::default();
        for (ds, contribution) in datasets.iter().zip(contributions) {
            match contribution {
                Ok(Some(values)) => {
                    let sum = Total::of(&values);
                    debug!(id = ds.id, int = %sum.int, float = sum.float, "dataset contribution");
                    total.add(sum);
                }
                Ok(None) => debug!(id = ds.id, column, "column absent, skipping dataset"),
                Err(e) => warn!(id = ds.id, error = %e, "skipping unreadable dataset"),
            }
        }

        let total = total.truncate();
        info!(%format, column, datasets = datasets.len(), total, "column sum computed");
        Ok(total)
    }
}

fn read_dataset(storage: &DatasetStorage, ds: &Dataset, column: &str) -> Result<Option<ColumnValues>> {
    let path = ds
        .location(storage.format)
        .ok_or(Error::MissingLocation(ds.id, storage.format))?;
    storage.read_column(path, column)
}

/// Running sum kept exact for integer columns.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
struct Total {
    int: i128,
    float: f64,
}

impl Total {
    fn of(values: &ColumnValues) -> Self {
        match values {
            ColumnValues::Int(v) => Self { int: v.iter().map(|x| *x as i128).sum(), float: 0.0 },
            ColumnValues::Float(v) => Self { int: 0, float: v.iter().sum() },
        }
    }

    fn add(&mut self, other: Total) {
        self.int = self.int.saturating_add(other.int);
        self.float += other.float;
    }

    /// `int + float` truncated toward zero, saturating at the `i64` bounds.
    fn truncate(self) -> i64 {
        let whole = self.float.trunc();
        let frac = self.float - whole;
        let mut total = self.int.saturating_add(whole as i128);
        // Fractional part pulls a whole total one step toward zero
        if total > 0 && frac < 0.0 {
            total -= 1;
        } else if total < 0 && frac > 0.0 {
            total += 1;
        }
        i64::try_from(total).unwrap_or(if total < 0 { i64::MIN } else { i64::MAX })
    }
}
