use crate::domain::model::{ActionType, LogEntry, ProcessingRun, RunId, RunStatus};
use crate::domain::ports::RunLedger;
use crate::utils::error::{EtlError, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug, Default)]
struct LedgerState {
    next_id: u64,
    runs: BTreeMap<RunId, ProcessingRun>,
    logs: Vec<LogEntry>,
}

/// 匯出用快照
#[derive(Debug, Clone, Serialize)]
pub struct LedgerSnapshot {
    pub runs: Vec<ProcessingRun>,
    pub logs: Vec<LogEntry>,
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryRunLedger {
    state: Arc<Mutex<LedgerState>>,
}

impl InMemoryRunLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn run(&self, run_id: RunId) -> Option<ProcessingRun> {
        self.state.lock().await.runs.get(&run_id).cloned()
    }

    pub async fn logs_for(&self, run_id: RunId) -> Vec<LogEntry> {
        let state = self.state.lock().await;
        state
            .logs
            .iter()
            .filter(|entry| entry.run_id == run_id)
            .cloned()
            .collect()
    }

    pub async fn snapshot(&self) -> LedgerSnapshot {
        let state = self.state.lock().await;
        LedgerSnapshot {
            runs: state.runs.values().cloned().collect(),
            logs: state.logs.clone(),
        }
    }
}

fn unknown_run(run_id: RunId) -> EtlError {
    EtlError::LedgerError {
        message: format!("Unknown run id {}", run_id),
    }
}

#[async_trait]
impl RunLedger for InMemoryRunLedger {
    async fn create_run(&self, source_file_name: &str, total_rows: usize) -> Result<RunId> {
        let mut state = self.state.lock().await;
        state.next_id += 1;
        let id = RunId(state.next_id);
        let now = Utc::now();

        state.runs.insert(
            id,
            ProcessingRun {
                id,
                source_file_name: source_file_name.to_string(),
                total_rows,
                rows_processed: 0,
                status: RunStatus::Running,
                failure: None,
                created_at: now,
                updated_at: now,
            },
        );
        Ok(id)
    }

    async fn update_progress(&self, run_id: RunId, rows_processed: usize) -> Result<()> {
        let mut state = self.state.lock().await;
        let run = state.runs.get_mut(&run_id).ok_or_else(|| unknown_run(run_id))?;

        // 進度只增不減
        run.rows_processed = run.rows_processed.max(rows_processed.min(run.total_rows));
        run.updated_at = Utc::now();
        Ok(())
    }

    async fn finalize(&self, run_id: RunId) -> Result<()> {
        let mut state = self.state.lock().await;
        let run = state.runs.get_mut(&run_id).ok_or_else(|| unknown_run(run_id))?;

        if run.status != RunStatus::Running {
            return Err(EtlError::LedgerError {
                message: format!("Run {} is already {:?}", run_id, run.status),
            });
        }

        run.status = RunStatus::Done;
        run.rows_processed = run.total_rows;
        run.updated_at = Utc::now();
        Ok(())
    }

    async fn mark_failed(&self, run_id: RunId, reason: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        let run = state.runs.get_mut(&run_id).ok_or_else(|| unknown_run(run_id))?;

        if run.status == RunStatus::Running {
            run.status = RunStatus::Failed;
            run.failure = Some(reason.to_string());
            run.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn append_log(
        &self,
        run_id: RunId,
        row_number: usize,
        action_type: ActionType,
        details: serde_json::Value,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        if !state.runs.contains_key(&run_id) {
            return Err(unknown_run(run_id));
        }

        state.logs.push(LogEntry {
            run_id,
            row_number,
            action_type,
            details,
            created_at: Utc::now(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_lifecycle() {
        let ledger = InMemoryRunLedger::new();
        let run_id = ledger.create_run("contacts.csv", 2500).await.unwrap();

        let run = ledger.run(run_id).await.unwrap();
        assert_eq!(run.status, RunStatus::Running);
        assert_eq!(run.rows_processed, 0);

        ledger.update_progress(run_id, 1000).await.unwrap();
        ledger.update_progress(run_id, 500).await.unwrap();
        assert_eq!(ledger.run(run_id).await.unwrap().rows_processed, 1000);

        ledger.finalize(run_id).await.unwrap();
        let run = ledger.run(run_id).await.unwrap();
        assert_eq!(run.status, RunStatus::Done);
        assert_eq!(run.rows_processed, 2500);

        // done 只能發生一次
        assert!(ledger.finalize(run_id).await.is_err());
    }

    #[tokio::test]
    async fn test_mark_failed_keeps_done_runs() {
        let ledger = InMemoryRunLedger::new();
        let failed = ledger.create_run("a.csv", 10).await.unwrap();
        let done = ledger.create_run("b.csv", 10).await.unwrap();
        assert_ne!(failed, done);

        ledger.mark_failed(failed, "boom").await.unwrap();
        ledger.finalize(done).await.unwrap();
        ledger.mark_failed(done, "late").await.unwrap();

        let failed_run = ledger.run(failed).await.unwrap();
        assert_eq!(failed_run.status, RunStatus::Failed);
        assert_eq!(failed_run.failure.as_deref(), Some("boom"));
        assert_eq!(ledger.run(done).await.unwrap().status, RunStatus::Done);
    }

    #[tokio::test]
    async fn test_logs_are_scoped_by_run() {
        let ledger = InMemoryRunLedger::new();
        let first = ledger.create_run("a.csv", 1).await.unwrap();
        let second = ledger.create_run("b.csv", 1).await.unwrap();

        ledger
            .append_log(first, 1, ActionType::NotFound, serde_json::json!({"first_name": "Zorg"}))
            .await
            .unwrap();
        ledger
            .append_log(second, 1, ActionType::Enrichment, serde_json::json!({}))
            .await
            .unwrap();

        let logs = ledger.logs_for(first).await;
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].action_type, ActionType::NotFound);
        assert!(ledger
            .append_log(RunId(99), 1, ActionType::Error, serde_json::json!({}))
            .await
            .is_err());

        let snapshot = ledger.snapshot().await;
        assert_eq!(snapshot.runs.len(), 2);
        assert_eq!(snapshot.logs.len(), 2);
    }
}
