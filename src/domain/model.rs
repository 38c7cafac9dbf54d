use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// 一筆聯絡人資料，欄位保持原始順序 (serde_json 啟用 preserve_order)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContactRow {
    pub data: serde_json::Map<String, serde_json::Value>,
}

impl ContactRow {
    pub fn new() -> Self {
        Self::default()
    }

    /// 依序建立一筆資料，方便測試與上游轉換
    pub fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut row = Self::new();
        for (key, value) in pairs {
            row.set_text(key, value);
        }
        row
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.data.keys().map(String::as_str)
    }

    /// 讀取欄位文字並去除前後空白；缺少或 null 時回傳空字串
    pub fn text(&self, field: &str) -> String {
        match self.data.get(field) {
            None | Some(serde_json::Value::Null) => String::new(),
            Some(serde_json::Value::String(s)) => s.trim().to_string(),
            Some(other) => other.to_string().trim().to_string(),
        }
    }

    /// 新增或覆寫欄位；已存在的欄位保留原本位置
    pub fn set_text(&mut self, field: impl Into<String>, value: impl Into<String>) {
        self.data
            .insert(field.into(), serde_json::Value::String(value.into()));
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// 名字比對用的正規化：去空白 + 小寫，重音保留
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// 參考表查不到時某些來源會回傳的哨兵文字
pub const NOT_FOUND_SENTINEL: &str = "Non trouvé";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Civility {
    Monsieur,
    Madame,
    Other(String),
}

impl Civility {
    /// 將原始稱謂文字轉為標準值 (monsieur/m/m. -> M., madame/mme/mme. -> Mme)
    pub fn normalize(raw: &str) -> Self {
        let trimmed = raw.trim();
        match trimmed.to_lowercase().as_str() {
            "monsieur" | "m" | "m." => Civility::Monsieur,
            "madame" | "mme" | "mme." => Civility::Madame,
            _ => Civility::Other(trimmed.to_string()),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Civility::Monsieur => "M.",
            Civility::Madame => "Mme",
            Civility::Other(label) => label,
        }
    }

    /// 空值或哨兵文字不算找到
    pub fn is_usable(&self) -> bool {
        let label = self.label().trim();
        !label.is_empty() && label != NOT_FOUND_SENTINEL
    }
}

impl fmt::Display for Civility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl Serialize for Civility {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

impl<'de> Deserialize<'de> for Civility {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Civility::normalize(&raw))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceEntry {
    pub normalized_first_name: String,
    pub civility: Civility,
}

impl ReferenceEntry {
    pub fn new(first_name: &str, civility: Civility) -> Self {
        Self {
            normalized_first_name: normalize_name(first_name),
            civility,
        }
    }
}

/// 欄位偵測結果；任一角色缺少時整批無法處理
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ColumnMapping {
    pub first_name_field: Option<String>,
    pub last_name_field: Option<String>,
}

/// 兩個角色都已確定的欄位對應
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedColumns {
    pub first_name_field: String,
    pub last_name_field: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InversionResult {
    pub inverted: bool,
    pub first: String,
    pub last: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub u64);

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Done,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingRun {
    pub id: RunId,
    pub source_file_name: String,
    pub total_rows: usize,
    pub rows_processed: usize,
    pub status: RunStatus,
    pub failure: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Inversion,
    Enrichment,
    NotFound,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub run_id: RunId,
    pub row_number: usize,
    pub action_type: ActionType,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// 單筆資料處理後的結果分類，用於累加統計
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowOutcome {
    Empty,
    Enriched { inverted: bool },
    NotFound { inverted: bool },
    Failed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingStats {
    pub total_lines: usize,
    pub enriched: usize,
    pub inversions_corrected: usize,
    pub errors: usize,
    pub not_found: usize,
    pub empty_rows: usize,
}

impl ProcessingStats {
    pub fn new(total_lines: usize) -> Self {
        Self {
            total_lines,
            ..Self::default()
        }
    }

    pub fn record(&mut self, outcome: RowOutcome) {
        match outcome {
            RowOutcome::Empty => self.empty_rows += 1,
            RowOutcome::Enriched { inverted } => {
                self.enriched += 1;
                self.inversions_corrected += usize::from(inverted);
            }
            RowOutcome::NotFound { inverted } => {
                self.not_found += 1;
                self.inversions_corrected += usize::from(inverted);
            }
            RowOutcome::Failed => self.errors += 1,
        }
    }

    /// 每筆資料恰好落在一個分類
    pub fn accounted_rows(&self) -> usize {
        self.enriched + self.not_found + self.errors + self.empty_rows
    }
}

/// 處理參數
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentSettings {
    pub batch_size: usize,
    pub concurrent_lookups: usize,
    pub lookup_timeout: Option<Duration>,
    pub civility_field: String,
    pub error_marker: String,
}

impl Default for EnrichmentSettings {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            concurrent_lookups: 1,
            lookup_timeout: None,
            civility_field: "Civilité".to_string(),
            error_marker: "Erreur".to_string(),
        }
    }
}

/// 上游交給 pipeline 的原始資料
#[derive(Debug, Clone)]
pub struct SourceBatch {
    pub file_name: String,
    pub rows: Vec<ContactRow>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EnrichmentOutput {
    pub run_id: RunId,
    pub stats: ProcessingStats,
    pub rows: Vec<ContactRow>,
}
