use crate::core::column_detector;
use crate::core::inversion::{with_deadline, InversionResolver};
use crate::domain::model::{
    normalize_name, ActionType, Civility, ContactRow, EnrichmentOutput, EnrichmentSettings,
    ProcessingStats, ResolvedColumns, RowOutcome, RunId,
};
use crate::domain::ports::{ReferenceNameStore, RunLedger};
use crate::utils::error::{EtlError, Result};
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// 在批次之間檢查的取消旗標
#[derive(Debug, Clone, Default)]
pub struct CancellationHandle {
    flag: Arc<AtomicBool>,
}

impl CancellationHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// 回傳給上游呼叫者的結果；序列化時 `success` 由變體決定
#[derive(Debug, Clone)]
pub enum EnrichmentResponse {
    Success {
        run_id: RunId,
        stats: ProcessingStats,
        rows: Vec<ContactRow>,
    },
    Failure {
        error: String,
    },
}

impl Serialize for EnrichmentResponse {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            EnrichmentResponse::Success { run_id, stats, rows } => {
                let mut map = serializer.serialize_map(Some(4))?;
                map.serialize_entry("success", &true)?;
                map.serialize_entry("run_id", run_id)?;
                map.serialize_entry("stats", stats)?;
                map.serialize_entry("rows", rows)?;
                map.end()
            }
            EnrichmentResponse::Failure { error } => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("success", &false)?;
                map.serialize_entry("error", error)?;
                map.end()
            }
        }
    }
}

impl EnrichmentResponse {
    pub fn is_success(&self) -> bool {
        matches!(self, EnrichmentResponse::Success { .. })
    }
}

impl From<Result<EnrichmentOutput>> for EnrichmentResponse {
    fn from(result: Result<EnrichmentOutput>) -> Self {
        match result {
            Ok(output) => EnrichmentResponse::Success {
                run_id: output.run_id,
                stats: output.stats,
                rows: output.rows,
            },
            Err(e) => EnrichmentResponse::Failure {
                error: e.user_friendly_message(),
            },
        }
    }
}

/// 單筆資料的處理器；批次並行時每個 task 持有一份 clone
struct RowProcessor<R: ?Sized, L: ?Sized> {
    store: Arc<R>,
    ledger: Arc<L>,
    columns: Arc<ResolvedColumns>,
    settings: Arc<EnrichmentSettings>,
    run_id: RunId,
}

impl<R: ?Sized, L: ?Sized> Clone for RowProcessor<R, L> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            ledger: Arc::clone(&self.ledger),
            columns: Arc::clone(&self.columns),
            settings: Arc::clone(&self.settings),
            run_id: self.run_id,
        }
    }
}

struct RowEnrichment {
    first: String,
    last: String,
    civility: Option<Civility>,
    outcome: RowOutcome,
}

impl<R, L> RowProcessor<R, L>
where
    R: ReferenceNameStore + ?Sized + 'static,
    L: RunLedger + ?Sized + 'static,
{
    async fn process(&self, row_number: usize, mut row: ContactRow) -> (ContactRow, RowOutcome) {
        let first = row.text(&self.columns.first_name_field);
        let last = row.text(&self.columns.last_name_field);

        if first.is_empty() && last.is_empty() {
            row.set_text(self.settings.civility_field.as_str(), "");
            return (row, RowOutcome::Empty);
        }

        match self.enrich(row_number, &first, &last).await {
            Ok(enrichment) => {
                row.set_text(self.columns.first_name_field.as_str(), enrichment.first);
                row.set_text(self.columns.last_name_field.as_str(), enrichment.last);
                row.set_text(
                    self.settings.civility_field.as_str(),
                    enrichment
                        .civility
                        .map(|civility| civility.label().to_string())
                        .unwrap_or_default(),
                );
                (row, enrichment.outcome)
            }
            Err(e) => self.fail(row_number, row, &e.to_string()).await,
        }
    }

    async fn enrich(&self, row_number: usize, first: &str, last: &str) -> Result<RowEnrichment> {
        let timeout = self.settings.lookup_timeout;
        let resolution = InversionResolver::new(self.store.as_ref())
            .with_lookup_timeout(timeout)
            .resolve(first, last)
            .await?;

        if resolution.inverted {
            self.ledger
                .append_log(
                    self.run_id,
                    row_number,
                    ActionType::Inversion,
                    serde_json::json!({
                        "before": { "first_name": first, "last_name": last },
                        "after": { "first_name": resolution.first, "last_name": resolution.last },
                    }),
                )
                .await?;
            tracing::debug!("Row {}: inversion corrected \"{}\" <-> \"{}\"", row_number, first, last);
        }

        let key = normalize_name(&resolution.first);
        let civility = with_deadline(&resolution.first, timeout, self.store.civility_for(&key))
            .await?
            .filter(Civility::is_usable);

        let outcome = match &civility {
            Some(found) => {
                self.ledger
                    .append_log(
                        self.run_id,
                        row_number,
                        ActionType::Enrichment,
                        serde_json::json!({ "first_name": resolution.first, "civility": found.label() }),
                    )
                    .await?;
                RowOutcome::Enriched {
                    inverted: resolution.inverted,
                }
            }
            None => {
                self.ledger
                    .append_log(
                        self.run_id,
                        row_number,
                        ActionType::NotFound,
                        serde_json::json!({ "first_name": resolution.first }),
                    )
                    .await?;
                RowOutcome::NotFound {
                    inverted: resolution.inverted,
                }
            }
        };

        Ok(RowEnrichment {
            first: resolution.first,
            last: resolution.last,
            civility,
            outcome,
        })
    }

    /// 單筆失敗：保留原始資料、標記錯誤並繼續
    async fn fail(&self, row_number: usize, mut row: ContactRow, message: &str) -> (ContactRow, RowOutcome) {
        tracing::warn!("⚠️ Row {}: {}", row_number, message);
        row.set_text(self.settings.civility_field.as_str(), self.settings.error_marker.as_str());

        if let Err(e) = self
            .ledger
            .append_log(
                self.run_id,
                row_number,
                ActionType::Error,
                serde_json::json!({ "error": message }),
            )
            .await
        {
            tracing::warn!("⚠️ Row {}: error entry not recorded: {}", row_number, e);
        }

        (row, RowOutcome::Failed)
    }
}

/// 名字反轉偵測與稱謂補齊的主流程
pub struct EnrichmentPipeline<R: ?Sized, L: ?Sized> {
    store: Arc<R>,
    ledger: Arc<L>,
    settings: EnrichmentSettings,
    cancellation: CancellationHandle,
}

impl<R, L> EnrichmentPipeline<R, L>
where
    R: ReferenceNameStore + ?Sized + 'static,
    L: RunLedger + ?Sized + 'static,
{
    pub fn new(store: Arc<R>, ledger: Arc<L>) -> Self {
        Self {
            store,
            ledger,
            settings: EnrichmentSettings::default(),
            cancellation: CancellationHandle::new(),
        }
    }

    pub fn with_settings(mut self, settings: EnrichmentSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_cancellation(mut self, cancellation: CancellationHandle) -> Self {
        self.cancellation = cancellation;
        self
    }

    pub fn cancellation_handle(&self) -> CancellationHandle {
        self.cancellation.clone()
    }

    pub fn settings(&self) -> &EnrichmentSettings {
        &self.settings
    }

    /// 處理整份資料並包成上游的回應格式
    pub async fn respond(&self, rows: Vec<ContactRow>, source_file_name: &str) -> EnrichmentResponse {
        let result = self.process(rows, source_file_name).await;
        if let Err(e) = &result {
            tracing::error!("❌ Processing of {} failed: {}", source_file_name, e);
        }
        EnrichmentResponse::from(result)
    }

    pub async fn process(&self, rows: Vec<ContactRow>, source_file_name: &str) -> Result<EnrichmentOutput> {
        let first_row = rows.first().ok_or(EtlError::EmptyInput)?;
        tracing::info!("🚀 Processing {} - {} rows", source_file_name, rows.len());

        let columns = column_detector::detect(first_row.field_names()).require(first_row.field_names())?;
        tracing::info!(
            "🔎 Detected columns - first name: \"{}\", last name: \"{}\"",
            columns.first_name_field,
            columns.last_name_field
        );

        let run_id = self.ledger.create_run(source_file_name, rows.len()).await?;
        tracing::info!("📝 Run {} created", run_id);

        match self.process_run(run_id, columns, rows).await {
            Ok(output) => Ok(output),
            Err(e @ EtlError::Cancelled { .. }) => {
                // 取消時維持 running，讓呼叫者可辨識未完成的 run
                tracing::warn!("⏹️ {}", e);
                Err(e)
            }
            Err(e) => {
                if let Err(mark_error) = self.ledger.mark_failed(run_id, &e.to_string()).await {
                    tracing::warn!("⚠️ Run {} could not be marked failed: {}", run_id, mark_error);
                }
                Err(e)
            }
        }
    }

    async fn process_run(
        &self,
        run_id: RunId,
        columns: ResolvedColumns,
        rows: Vec<ContactRow>,
    ) -> Result<EnrichmentOutput> {
        let total_rows = rows.len();
        let batch_size = self.settings.batch_size.max(1);
        let processor = RowProcessor {
            store: Arc::clone(&self.store),
            ledger: Arc::clone(&self.ledger),
            columns: Arc::new(columns),
            settings: Arc::new(self.settings.clone()),
            run_id,
        };

        let mut stats = ProcessingStats::new(total_rows);
        let mut output = Vec::with_capacity(total_rows);
        let mut rows_processed = 0;
        let mut remaining = rows.into_iter().enumerate().peekable();
        let mut batch_number = 0;

        while remaining.peek().is_some() {
            if self.cancellation.is_cancelled() {
                return Err(EtlError::Cancelled {
                    run_id: run_id.0,
                    rows_processed,
                });
            }

            batch_number += 1;
            // 行號為整份資料中的位置 (從 1 開始)，與批次無關
            let batch: Vec<(usize, ContactRow)> = remaining
                .by_ref()
                .take(batch_size)
                .map(|(index, row)| (index + 1, row))
                .collect();
            let batch_len = batch.len();
            tracing::debug!("Processing batch {} ({} rows)", batch_number, batch_len);

            for (row, outcome) in self.process_batch(&processor, batch).await? {
                stats.record(outcome);
                output.push(row);
            }

            rows_processed += batch_len;
            if let Err(e) = self.ledger.update_progress(run_id, rows_processed).await {
                tracing::warn!("⚠️ Run {}: progress update failed: {}", run_id, e);
            }
        }

        self.ledger.finalize(run_id).await?;
        tracing::info!(
            "✅ Run {} completed - enriched: {}, inversions: {}, not found: {}, errors: {}",
            run_id,
            stats.enriched,
            stats.inversions_corrected,
            stats.not_found,
            stats.errors
        );

        Ok(EnrichmentOutput {
            run_id,
            stats,
            rows: output,
        })
    }

    async fn process_batch(
        &self,
        processor: &RowProcessor<R, L>,
        batch: Vec<(usize, ContactRow)>,
    ) -> Result<Vec<(ContactRow, RowOutcome)>> {
        // concurrent_lookups = 1 也走 task，worker panic 一律在單筆邊界收斂
        let semaphore = Arc::new(Semaphore::new(self.settings.concurrent_lookups.max(1)));
        let mut tasks = JoinSet::new();
        let mut pending = HashMap::new();
        let mut slots: Vec<Option<(ContactRow, RowOutcome)>> = (0..batch.len()).map(|_| None).collect();

        for (position, (row_number, row)) in batch.into_iter().enumerate() {
            let permit = Arc::clone(&semaphore)
                .acquire_owned()
                .await
                .map_err(|e| EtlError::ProcessingError {
                    message: format!("Worker pool closed: {}", e),
                })?;
            let worker = processor.clone();
            let fallback = row.clone();

            let handle = tasks.spawn(async move {
                let _permit = permit;
                (position, worker.process(row_number, row).await)
            });
            pending.insert(handle.id(), (position, row_number, fallback));
        }

        // 結果依原始位置放回，順序與輸入一致
        while let Some(joined) = tasks.join_next_with_id().await {
            match joined {
                Ok((id, (position, result))) => {
                    pending.remove(&id);
                    slots[position] = Some(result);
                }
                Err(join_error) => {
                    if let Some((position, row_number, row)) = pending.remove(&join_error.id()) {
                        let message = format!("Row worker failed: {}", join_error);
                        slots[position] = Some(processor.fail(row_number, row, &message).await);
                    }
                }
            }
        }

        Ok(slots.into_iter().flatten().collect())
    }
}
