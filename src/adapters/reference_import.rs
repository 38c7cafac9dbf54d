use crate::domain::model::{Civility, ReferenceEntry};
use crate::domain::ports::ReferenceSink;
use crate::utils::error::Result;
use serde::Serialize;

pub const IMPORT_BATCH_SIZE: usize = 2000;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub total_lines: usize,
    pub processed: usize,
    pub inserted: usize,
    pub errors: usize,
    pub skipped: usize,
}

impl ImportReport {
    pub fn message(&self) -> String {
        format!(
            "Import terminé: {} prénoms insérés, {} erreurs, {} lignes ignorées",
            self.inserted, self.errors, self.skipped
        )
    }
}

/// 解析 `prénom;civilité` 格式的參考檔；第一行為標題
///
/// 空白行不計入；缺少名字或稱謂的行回傳 `None` (計為 skipped)。
pub fn parse_reference_lines(content: &[u8]) -> Vec<Option<ReferenceEntry>> {
    let content = content.strip_prefix("\u{feff}".as_bytes()).unwrap_or(content);

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b';')
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(content);

    let mut lines = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!("⚠️ Reference line {} unreadable: {}", index + 2, e);
                lines.push(None);
                continue;
            }
        };

        if record.iter().all(str::is_empty) {
            continue;
        }

        let first_name = record.get(0).unwrap_or_default();
        let civility_raw = record.get(1).unwrap_or_default();
        if first_name.is_empty() || civility_raw.is_empty() {
            lines.push(None);
            continue;
        }

        lines.push(Some(ReferenceEntry::new(first_name, Civility::normalize(civility_raw))));
    }

    lines
}

/// 將參考檔分批 upsert 到參考表；單批失敗只計入 errors，不中斷匯入
pub async fn import_reference<S: ReferenceSink + ?Sized>(sink: &S, content: &[u8]) -> Result<ImportReport> {
    let lines = parse_reference_lines(content);
    let mut report = ImportReport {
        total_lines: lines.len(),
        ..ImportReport::default()
    };

    tracing::info!("📥 Importing {} reference lines", report.total_lines);

    for (batch_index, batch) in lines.chunks(IMPORT_BATCH_SIZE).enumerate() {
        let records: Vec<ReferenceEntry> = batch.iter().flatten().cloned().collect();
        report.skipped += batch.len() - records.len();

        if records.is_empty() {
            tracing::debug!("Batch {}: no valid records, skipping", batch_index + 1);
            report.processed += batch.len();
            continue;
        }

        let count = records.len();
        match sink.upsert_batch(records).await {
            Ok(written) => report.inserted += written,
            Err(e) => {
                tracing::error!("❌ Reference batch {} failed: {}", batch_index + 1, e);
                report.errors += count;
            }
        }
        report.processed += batch.len();

        if batch_index % 5 == 0 {
            tracing::info!(
                "📊 Progress: {}/{} - Inserted: {}, Errors: {}, Skipped: {}",
                report.processed,
                report.total_lines,
                report.inserted,
                report.errors,
                report.skipped
            );
        }
    }

    tracing::info!("✅ {}", report.message());
    Ok(report)
}
