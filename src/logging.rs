use std::sync::Once;

use tracing_subscriber::{filter::LevelFilter, EnvFilter};

/// Installs the global `tracing` subscriber, filtered by `RUST_LOG` (default `info`).
pub fn register_logger() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = EnvFilter::builder()
            .with_default_directive(LevelFilter::INFO.into())
            .from_env_lossy();
        tracing_subscriber::fmt().with_env_filter(filter).init();
    });
}
