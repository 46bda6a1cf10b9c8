use std::fmt;
use std::fs;
use std::io::{BufWriter, Cursor, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use polars::prelude::*;
use polars_io::SerReader;

use crate::database::DatasetId;
use crate::error::{Error, Result};

/// On-disk encodings every dataset is stored in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Format {
    Csv,
    Parquet,
}

impl Format {
    pub const ALL: [Format; 2] = [Format::Csv, Format::Parquet];

    pub fn extension(&self) -> &'static str {
        match self {
            Format::Csv => "csv",
            Format::Parquet => "parquet",
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for Format {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(Format::Csv),
            "parquet" => Ok(Format::Parquet),
            _ => Err(Error::InvalidFormat(s.to_string())),
        }
    }
}

/// Parses a raw upload (CSV with a header row) into a table.
pub fn parse(raw: &[u8]) -> Result<DataFrame> {
    CsvReader::new(Cursor::new(raw))
        .has_header(true)
        .infer_schema(None)
        .finish()
        .map_err(Error::Parse)
}

/// Numbers read from one column. Integer columns stay integers.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValues {
    Int(Vec<i64>),
    Float(Vec<f64>),
}

#[derive(Debug, Clone)]
pub struct DatasetStorage {
    pub root: PathBuf, // One directory per format
    pub format: Format,
}

impl DatasetStorage {
    pub fn new(root: impl Into<PathBuf>, format: Format) -> Self {
        Self { root: root.into(), format }
    }

    pub fn create_root(&self) -> Result<()> {
        fs::create_dir_all(&self.root)?;
        Ok(())
    }

    /// Location of a dataset's file, derived from the id alone.
    pub fn file_path(&self, id: DatasetId) -> PathBuf {
        self.root.join(format!("file_{}.{}", id, self.format.extension()))
    }

    /// Writes dataset `id` in this storage's format and returns the final path.
    ///
    /// The file is written under a temporary name and renamed into place, so
    /// the final path either holds a complete file or does not exist.
    pub fn save(&self, id: DatasetId, raw: &[u8], df: &mut DataFrame) -> Result<PathBuf> {
        let path = self.file_path(id);
        let tmp = path.with_extension(format!("{}.tmp", self.format.extension()));
        let written = self.write_file(&tmp, raw, df).and_then(|_| Ok(fs::rename(&tmp, &path)?));
        if let Err(e) = written {
            fs::remove_file(&tmp).ok();
            return Err(Error::Write { id, format: self.format, source: Box::new(e) });
        }
        Ok(path)
    }

    fn write_file(&self, path: &Path, raw: &[u8], df: &mut DataFrame) -> Result<()> {
        let mut file = BufWriter::new(fs::File::create(path)?);
        match self.format {
            // The csv copy is the upload itself
            Format::Csv => file.write_all(raw)?,
            Format::Parquet => {
                ParquetWriter::new(&mut file).finish(df)?;
            }
        }
        file.flush()?;
        Ok(())
    }

    /// Reads `column` from the file at `path` as numbers.
    ///
    /// Returns `Ok(None)` when the file has no such column. Null cells are
    /// dropped; values that cannot be read as numbers are an error.
    pub fn read_column(&self, path: &Path, column: &str) -> Result<Option<ColumnValues>> {
        let read_err = |source| Error::Read {
            path: path.display().to_string(),
            column: column.to_string(),
            source,
        };
        let lf = match self.format {
            Format::Csv => LazyCsvReader::new(path)
                .has_header(true)
                .with_infer_schema_length(None)
                .finish(),
            Format::Parquet => LazyFrame::scan_parquet(path, ScanArgsParquet::default()),
        }
        .map_err(read_err)?;

        let integral = match lf.schema().map_err(read_err)?.get(column) {
            Some(dtype) => dtype.is_integer() || *dtype == DataType::Boolean,
            None => return Ok(None),
        };
        let target = if integral { DataType::Int64 } else { DataType::Float64 };

        let df = lf
            .select([col(column).strict_cast(target)])
            .collect()
            .map_err(read_err)?;
        let s = df.column(column).map_err(read_err)?;
        let values = if integral {
            s.i64().map(|ca| ColumnValues::Int(ca.into_iter().flatten().collect()))
        } else {
            s.f64().map(|ca| ColumnValues::Float(ca.into_iter().flatten().collect()))
        }
        .map_err(read_err)?;
        Ok(Some(values))
    }
}
