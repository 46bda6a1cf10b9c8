use std::collections::HashMap;
use std::fs;
use std::sync::Arc;

use tracing::{info, warn};

use crate::database::{Dataset, DatasetId, DatasetStore};
use crate::error::Result;
use crate::storage::{self, DatasetStorage};

/// Persists uploads in every configured format and registers them.
pub struct Ingestor {
    store: Arc<DatasetStore>,
    storages: Vec<DatasetStorage>,
}

impl Ingestor {
    pub fn new(store: Arc<DatasetStore>, storages: Vec<DatasetStorage>) -> Self {
        Self { store, storages }
    }

    pub fn upload(&self, raw: &[u8]) -> Result<DatasetId> {
        let id = self.store.allocate_id();
        info!(id, bytes = raw.len(), "received upload");

        let mut df = storage::parse(raw)?;
        let mut locations = HashMap::with_capacity(self.storages.len());
        for s in &self.storages {
            match s.save(id, raw, &mut df) {
                Ok(path) => {
                    info!(id, format = %s.format, path = %path.display(), "saved dataset");
                    locations.insert(s.format, path);
                }
                Err(e) => {
                    // Nothing gets registered, drop what was already written
                    for path in locations.values() {
                        if let Err(rm) = fs::remove_file(path) {
                            warn!(id, path = %path.display(), error = %rm, "failed to remove partial upload");
                        }
                    }
                    return Err(e);
                }
            }
        }

        self.store.register(Dataset::new(id, locations));
        info!(id, shape = ?df.shape(), "registered dataset");
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Format;
    use anyhow::Result;

    fn ingestor(root: &std::path::Path) -> Result<Ingestor> {
        let storages = Format::ALL
            .iter()
            .map(|f| DatasetStorage::new(root.join(f.extension()), *f))
            .collect::<Vec<_>>();
        for s in &storages {
            s.create_root()?;
        }
        Ok(Ingestor::new(Arc::new(DatasetStore::new()), storages))
    }

    #[test]
    fn upload_registers_every_format() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let ingestor = ingestor(dir.path())?;

        let id = ingestor.upload(b"x\n1\n2\n3\n")?;
        assert_eq!(id, 1);

        let snapshot = ingestor.store.snapshot();
        assert_eq!(snapshot.len(), 1);
        for f in Format::ALL {
            let path = snapshot[0].location(f).unwrap();
            assert!(path.exists());
            assert_eq!(path, &dir.path().join(f.extension()).join(format!("file_1.{}", f.extension())));
        }
        Ok(())
    }

    #[test]
    fn same_data_twice_gets_two_ids() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let ingestor = ingestor(dir.path())?;
        let raw = b"x\n1\n";
        assert_eq!(ingestor.upload(raw)?, 1);
        assert_eq!(ingestor.upload(raw)?, 2);
        assert_eq!(ingestor.store.len(), 2);
        Ok(())
    }

    #[test]
    fn bad_payload_registers_nothing() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let ingestor = ingestor(dir.path())?;

        assert!(ingestor.upload(b"").is_err());
        assert!(ingestor.store.is_empty());
        assert!(!dir.path().join("csv").join("file_1.csv").exists());

        // Failed id is skipped, not reused
        assert_eq!(ingestor.upload(b"x\n1\n")?, 2);
        Ok(())
    }

    #[test]
    fn failed_format_removes_earlier_files() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let csv = DatasetStorage::new(dir.path().join("csv"), Format::Csv);
        csv.create_root()?;
        // Parquet root is never created, so its write fails
        let parquet = DatasetStorage::new(dir.path().join("parquet"), Format::Parquet);
        let ingestor = Ingestor::new(Arc::new(DatasetStore::new()), vec![csv.clone(), parquet]);

        let err = ingestor.upload(b"x\n1\n").unwrap_err();
        assert!(err.to_string().contains("as parquet"));
        assert!(!csv.file_path(1).exists());
        assert!(ingestor.store.is_empty());
        Ok(())
    }
}
