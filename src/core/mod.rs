pub mod column_detector;
pub mod enrichment;
pub mod etl;
pub mod inversion;

pub use crate::domain::model::{ContactRow, EnrichmentOutput, SourceBatch};
pub use crate::domain::ports::{
    ConfigProvider, Pipeline, ReferenceNameStore, ReferenceSink, RunLedger, Storage,
};
pub use crate::utils::error::Result;
