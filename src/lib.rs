pub mod adapters;
pub mod app;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliConfig;
pub use config::{cli::LocalStorage, toml_config::TomlConfig};

pub use adapters::{InMemoryReferenceStore, InMemoryRunLedger};
pub use app::pipelines::CsvEnrichmentPipeline;
pub use core::{
    enrichment::{CancellationHandle, EnrichmentPipeline, EnrichmentResponse},
    etl::EtlEngine,
};
pub use domain::model::{
    ActionType, Civility, ContactRow, EnrichmentOutput, EnrichmentSettings, ProcessingStats, RunId,
    RunStatus,
};
pub use utils::error::{EtlError, Result};
