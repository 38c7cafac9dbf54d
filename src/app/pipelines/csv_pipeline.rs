use crate::adapters::csv_rows::{read_contact_rows, sniff_delimiter, write_contact_rows};
use crate::adapters::reference_import::import_reference;
use crate::adapters::{InMemoryReferenceStore, InMemoryRunLedger};
use crate::core::enrichment::{CancellationHandle, EnrichmentPipeline};
use crate::core::{ConfigProvider, EnrichmentOutput, Pipeline, SourceBatch, Storage};
use crate::utils::error::Result;
use std::path::Path;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// 讀取聯絡人 CSV、匯入參考表、補齊稱謂並寫出結果檔
pub struct CsvEnrichmentPipeline<S: Storage, C: ConfigProvider> {
    input: S,
    output: S,
    config: C,
    store: Arc<InMemoryReferenceStore>,
    ledger: Arc<InMemoryRunLedger>,
    enrichment: EnrichmentPipeline<InMemoryReferenceStore, InMemoryRunLedger>,
    delimiter: AtomicU8,
}

impl<S: Storage, C: ConfigProvider> CsvEnrichmentPipeline<S, C> {
    pub fn new(input: S, output: S, config: C) -> Self {
        Self::with_store(input, output, config, Arc::new(InMemoryReferenceStore::new()))
    }

    /// 使用已載入的參考表 (例如多個檔案共用同一份)
    pub fn with_store(input: S, output: S, config: C, store: Arc<InMemoryReferenceStore>) -> Self {
        let ledger = Arc::new(InMemoryRunLedger::new());
        let enrichment = EnrichmentPipeline::new(Arc::clone(&store), Arc::clone(&ledger))
            .with_settings(config.settings());

        Self {
            input,
            output,
            config,
            store,
            ledger,
            enrichment,
            delimiter: AtomicU8::new(b','),
        }
    }

    pub fn ledger(&self) -> Arc<InMemoryRunLedger> {
        Arc::clone(&self.ledger)
    }

    pub fn cancellation_handle(&self) -> CancellationHandle {
        self.enrichment.cancellation_handle()
    }

    fn file_stem(&self) -> String {
        Path::new(self.config.input_file())
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or("contacts")
            .to_string()
    }
}

#[async_trait::async_trait]
impl<S: Storage, C: ConfigProvider> Pipeline for CsvEnrichmentPipeline<S, C> {
    async fn extract(&self) -> Result<SourceBatch> {
        if let Some(reference_file) = self.config.reference_file() {
            tracing::info!("📚 Loading reference first names from {}", reference_file);
            let content = self.input.read_file(reference_file).await?;
            let report = import_reference(self.store.as_ref(), &content).await?;
            tracing::debug!("Reference import report: {:?}", report);
        }

        if self.store.is_empty().await {
            tracing::warn!("⚠️ Reference store is empty, every name will be reported as not found");
        }

        let content = self.input.read_file(self.config.input_file()).await?;
        // 輸出沿用最近一次讀入檔案的分隔符號
        self.delimiter.store(sniff_delimiter(&content), Ordering::SeqCst);
        let rows = read_contact_rows(&content)?;

        Ok(SourceBatch {
            file_name: self.config.input_file().to_string(),
            rows,
        })
    }

    async fn transform(&self, batch: SourceBatch) -> Result<EnrichmentOutput> {
        self.enrichment.process(batch.rows, &batch.file_name).await
    }

    async fn load(&self, output: EnrichmentOutput) -> Result<String> {
        let stem = self.file_stem();

        let delimiter = self.delimiter.load(Ordering::SeqCst);

        let csv_name = format!("{}_enrichi.csv", stem);
        let csv_data = write_contact_rows(&output.rows, delimiter)?;
        self.output.write_file(&csv_name, &csv_data).await?;

        let stats_name = format!("{}_stats.json", stem);
        let stats_data = serde_json::to_vec_pretty(&serde_json::json!({
            "run_id": output.run_id,
            "statistics": output.stats,
        }))?;
        self.output.write_file(&stats_name, &stats_data).await?;

        let ledger_name = format!("{}_ledger.json", stem);
        let snapshot = self.ledger.snapshot().await;
        let ledger_data = serde_json::to_vec_pretty(&snapshot)?;
        self.output.write_file(&ledger_name, &ledger_data).await?;

        Ok(Path::new(self.config.output_path())
            .join(csv_name)
            .to_string_lossy()
            .into_owned())
    }
}
