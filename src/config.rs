use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use figment::{
    providers::{Env, Format as _, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::storage::{DatasetStorage, Format};

/// Env var naming an optional TOML config file.
pub const CONFIG_ENV_VAR: &str = "TABLE_LAKE_CONFIG";
/// Prefix of env vars overriding single config values.
pub const ENV_PREFIX: &str = "TABLE_LAKE_";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub addr: SocketAddr,
    pub csv_dir: PathBuf,
    pub parquet_dir: PathBuf,
    pub concurrency_limit_per_connection: usize,
    /// Unset means a column sum waits for the first upload indefinitely.
    pub column_sum_timeout_secs: Option<u64>,
    /// Threads writing uploads; 0 means one per cpu.
    pub upload_threads: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            addr: ([0, 0, 0, 0], 5440).into(),
            csv_dir: PathBuf::from("/inputs"),
            parquet_dir: PathBuf::from("/parquets"),
            concurrency_limit_per_connection: 100,
            column_sum_timeout_secs: None,
            upload_threads: 0,
        }
    }
}

impl Config {
    /// Defaults, then the file named by `TABLE_LAKE_CONFIG` if set, then `TABLE_LAKE_*` env vars.
    pub fn load() -> Result<Self, figment::Error> {
        let file = std::env::var_os(CONFIG_ENV_VAR).map(PathBuf::from);
        Self::figment(file).extract()
    }

    pub fn figment(file: Option<PathBuf>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(file) = file {
            figment = figment.merge(Toml::file(file));
        }
        figment.merge(Env::prefixed(ENV_PREFIX).ignore(&["config"]))
    }

    pub fn storages(&self) -> Vec<DatasetStorage> {
        vec![
            DatasetStorage::new(&self.csv_dir, Format::Csv),
            DatasetStorage::new(&self.parquet_dir, Format::Parquet),
        ]
    }

    pub fn column_sum_timeout(&self) -> Option<Duration> {
        self.column_sum_timeout_secs.map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config: Config = Config::figment(None).extract().unwrap();
        assert_eq!(config.addr.port(), 5440);
        assert_eq!(config.column_sum_timeout(), None);
        let formats = config.storages().iter().map(|s| s.format).collect::<Vec<_>>();
        assert_eq!(formats, Format::ALL.to_vec());
    }

    #[test]
    fn file_and_env_override_defaults() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "lake.toml",
                r#"
                    csv_dir = "data/csv"
                    column_sum_timeout_secs = 30
                "#,
            )?;
            jail.set_env("TABLE_LAKE_PARQUET_DIR", "data/parquet");
            jail.set_env("TABLE_LAKE_UPLOAD_THREADS", "4");

            let config: Config = Config::figment(Some("lake.toml".into())).extract()?;
            assert_eq!(config.csv_dir, PathBuf::from("data/csv"));
            assert_eq!(config.parquet_dir, PathBuf::from("data/parquet"));
            assert_eq!(config.column_sum_timeout(), Some(Duration::from_secs(30)));
            assert_eq!(config.concurrency_limit_per_connection, 100);
            assert_eq!(config.upload_threads, 4);
            Ok(())
        });
    }
}
