use crate::domain::model::{
    ActionType, Civility, EnrichmentOutput, EnrichmentSettings, ReferenceEntry, RunId, SourceBatch,
};
use crate::utils::error::Result;
use async_trait::async_trait;

pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

pub trait ConfigProvider: Send + Sync {
    fn input_file(&self) -> &str;
    fn reference_file(&self) -> Option<&str>;
    fn output_path(&self) -> &str;
    fn settings(&self) -> EnrichmentSettings;
}

/// 參考名字表的查詢介面；對 pipeline 而言唯讀
#[async_trait]
pub trait ReferenceNameStore: Send + Sync {
    async fn civility_for(&self, normalized_first_name: &str) -> Result<Option<Civility>>;

    async fn exists(&self, normalized_first_name: &str) -> Result<bool> {
        Ok(self.civility_for(normalized_first_name).await?.is_some())
    }
}

/// 參考表匯入用的寫入介面
#[async_trait]
pub trait ReferenceSink: Send + Sync {
    async fn upsert_batch(&self, entries: Vec<ReferenceEntry>) -> Result<usize>;
}

#[async_trait]
pub trait RunLedger: Send + Sync {
    async fn create_run(&self, source_file_name: &str, total_rows: usize) -> Result<RunId>;
    async fn update_progress(&self, run_id: RunId, rows_processed: usize) -> Result<()>;
    async fn finalize(&self, run_id: RunId) -> Result<()>;
    async fn mark_failed(&self, run_id: RunId, reason: &str) -> Result<()>;
    async fn append_log(
        &self,
        run_id: RunId,
        row_number: usize,
        action_type: ActionType,
        details: serde_json::Value,
    ) -> Result<()>;
}

#[async_trait]
pub trait Pipeline: Send + Sync {
    async fn extract(&self) -> Result<SourceBatch>;
    async fn transform(&self, batch: SourceBatch) -> Result<EnrichmentOutput>;
    async fn load(&self, output: EnrichmentOutput) -> Result<String>;
}
