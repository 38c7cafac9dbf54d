use async_trait::async_trait;
use contact_etl::core::{ReferenceNameStore, RunLedger};
use contact_etl::domain::model::{EnrichmentSettings, RunId};
use contact_etl::{
    ActionType, CancellationHandle, Civility, ContactRow, EnrichmentPipeline, EtlError,
    InMemoryReferenceStore, InMemoryRunLedger, RunStatus,
};
use std::sync::{Arc, Mutex};

fn reference_store() -> Arc<InMemoryReferenceStore> {
    Arc::new(InMemoryReferenceStore::from_entries([
        ("Marie", Civility::Madame),
        ("Jean", Civility::Monsieur),
        ("Claire", Civility::Madame),
        ("Paul", Civility::Monsieur),
    ]))
}

fn contact(first: &str, last: &str) -> ContactRow {
    ContactRow::from_pairs([("Prénom", first), ("Nom", last), ("Email", "contact@example.fr")])
}

/// 對特定名字回傳錯誤的參考表
struct FailingStore {
    inner: Arc<InMemoryReferenceStore>,
    failing_name: String,
}

#[async_trait]
impl ReferenceNameStore for FailingStore {
    async fn civility_for(&self, normalized_first_name: &str) -> contact_etl::Result<Option<Civility>> {
        if normalized_first_name == self.failing_name {
            return Err(EtlError::ReferenceStoreError {
                message: "connection reset".to_string(),
            });
        }
        self.inner.civility_for(normalized_first_name).await
    }
}

/// 查到指定名字時觸發取消
struct CancellingStore {
    inner: Arc<InMemoryReferenceStore>,
    trigger: String,
    cancellation: CancellationHandle,
}

#[async_trait]
impl ReferenceNameStore for CancellingStore {
    async fn civility_for(&self, normalized_first_name: &str) -> contact_etl::Result<Option<Civility>> {
        if normalized_first_name == self.trigger {
            self.cancellation.cancel();
        }
        self.inner.civility_for(normalized_first_name).await
    }
}

/// 查到指定名字時 panic，模擬驅動程式錯誤
struct PanickingStore {
    inner: Arc<InMemoryReferenceStore>,
    panic_on: String,
}

#[async_trait]
impl ReferenceNameStore for PanickingStore {
    async fn civility_for(&self, normalized_first_name: &str) -> contact_etl::Result<Option<Civility>> {
        if normalized_first_name == self.panic_on {
            panic!("store driver bug");
        }
        self.inner.civility_for(normalized_first_name).await
    }
}

/// 記錄每次進度更新的值
#[derive(Default)]
struct RecordingLedger {
    inner: InMemoryRunLedger,
    progress: Mutex<Vec<usize>>,
    fail_create: bool,
    fail_finalize: bool,
    fail_append_for_row: Option<usize>,
}

#[async_trait]
impl RunLedger for RecordingLedger {
    async fn create_run(&self, source_file_name: &str, total_rows: usize) -> contact_etl::Result<RunId> {
        if self.fail_create {
            return Err(EtlError::LedgerError {
                message: "ledger unavailable".to_string(),
            });
        }
        self.inner.create_run(source_file_name, total_rows).await
    }

    async fn update_progress(&self, run_id: RunId, rows_processed: usize) -> contact_etl::Result<()> {
        if let Ok(mut progress) = self.progress.lock() {
            progress.push(rows_processed);
        }
        self.inner.update_progress(run_id, rows_processed).await
    }

    async fn finalize(&self, run_id: RunId) -> contact_etl::Result<()> {
        if self.fail_finalize {
            return Err(EtlError::LedgerError {
                message: "commit rejected".to_string(),
            });
        }
        self.inner.finalize(run_id).await
    }

    async fn mark_failed(&self, run_id: RunId, reason: &str) -> contact_etl::Result<()> {
        self.inner.mark_failed(run_id, reason).await
    }

    async fn append_log(
        &self,
        run_id: RunId,
        row_number: usize,
        action_type: ActionType,
        details: serde_json::Value,
    ) -> contact_etl::Result<()> {
        if self.fail_append_for_row == Some(row_number) {
            return Err(EtlError::LedgerError {
                message: format!("log write refused for row {}", row_number),
            });
        }
        self.inner.append_log(run_id, row_number, action_type, details).await
    }
}

#[tokio::test]
async fn test_mixed_file_scenarios() -> anyhow::Result<()> {
    let ledger = Arc::new(InMemoryRunLedger::new());
    let pipeline = EnrichmentPipeline::new(reference_store(), Arc::clone(&ledger));

    let rows = vec![
        contact("Dupont", "Marie"),
        contact("Jean", "Dupont"),
        contact("Xyzabc", "Martin"),
    ];

    let output = pipeline.process(rows, "contacts.csv").await?;

    assert_eq!(output.stats.total_lines, 3);
    assert_eq!(output.stats.enriched, 2);
    assert_eq!(output.stats.inversions_corrected, 1);
    assert_eq!(output.stats.not_found, 1);
    assert_eq!(output.stats.errors, 0);

    assert_eq!(output.rows[0].text("Prénom"), "Marie");
    assert_eq!(output.rows[0].text("Nom"), "Dupont");
    assert_eq!(output.rows[0].text("Civilité"), "Mme");
    assert_eq!(output.rows[1].text("Civilité"), "M.");
    assert_eq!(output.rows[2].text("Prénom"), "Xyzabc");
    assert_eq!(output.rows[2].text("Civilité"), "");
    assert_eq!(output.rows[2].text("Email"), "contact@example.fr");

    let logs = ledger.logs_for(output.run_id).await;
    let summary: Vec<(usize, ActionType)> = logs.iter().map(|l| (l.row_number, l.action_type)).collect();
    assert_eq!(
        summary,
        vec![
            (1, ActionType::Inversion),
            (1, ActionType::Enrichment),
            (2, ActionType::Enrichment),
            (3, ActionType::NotFound),
        ]
    );
    assert_eq!(logs[3].details["first_name"], "Xyzabc");

    let run = ledger.run(output.run_id).await.expect("run recorded");
    assert_eq!(run.status, RunStatus::Done);
    assert_eq!(run.rows_processed, 3);
    assert_eq!(run.source_file_name, "contacts.csv");
    Ok(())
}

#[tokio::test]
async fn test_second_pass_finds_no_inversions() -> anyhow::Result<()> {
    let pipeline = EnrichmentPipeline::new(reference_store(), Arc::new(InMemoryRunLedger::new()));

    let rows = vec![
        contact("Dupont", "Marie"),
        contact("Martin", "Paul"),
        contact("Claire", "Leroy"),
    ];

    let first_pass = pipeline.process(rows, "contacts.csv").await?;
    assert_eq!(first_pass.stats.inversions_corrected, 2);

    let second_pass = pipeline.process(first_pass.rows.clone(), "contacts_enrichi.csv").await?;
    assert_eq!(second_pass.stats.inversions_corrected, 0);
    assert_eq!(second_pass.rows, first_pass.rows);
    assert_ne!(second_pass.run_id, first_pass.run_id);
    Ok(())
}

#[tokio::test]
async fn test_row_error_is_isolated_with_absolute_row_number() -> anyhow::Result<()> {
    let store = Arc::new(FailingStore {
        inner: reference_store(),
        failing_name: "boom".to_string(),
    });
    let ledger = Arc::new(InMemoryRunLedger::new());
    let pipeline = EnrichmentPipeline::new(store, Arc::clone(&ledger));

    let rows: Vec<ContactRow> = (1..=3000)
        .map(|n| if n == 2457 { contact("Boom", "Dupont") } else { contact("Jean", "Dupont") })
        .collect();

    let output = pipeline.process(rows, "big.csv").await?;

    assert_eq!(output.rows.len(), 3000);
    assert_eq!(output.stats.errors, 1);
    assert_eq!(output.stats.enriched, 2999);
    assert_eq!(output.stats.accounted_rows(), output.stats.total_lines);
    assert_eq!(output.rows[2456].text("Prénom"), "Boom");
    assert_eq!(output.rows[2456].text("Civilité"), "Erreur");
    assert_eq!(output.rows[2457].text("Civilité"), "M.");

    let errors: Vec<_> = ledger
        .logs_for(output.run_id)
        .await
        .into_iter()
        .filter(|entry| entry.action_type == ActionType::Error)
        .collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].row_number, 2457);
    assert!(errors[0].details["error"].as_str().unwrap_or_default().contains("connection reset"));

    let run = ledger.run(output.run_id).await.expect("run recorded");
    assert_eq!(run.status, RunStatus::Done);
    Ok(())
}

#[tokio::test]
async fn test_progress_is_reported_per_batch() -> anyhow::Result<()> {
    let ledger = Arc::new(RecordingLedger::default());
    let pipeline = EnrichmentPipeline::new(reference_store(), Arc::clone(&ledger)).with_settings(
        EnrichmentSettings {
            batch_size: 1000,
            ..EnrichmentSettings::default()
        },
    );

    let rows: Vec<ContactRow> = (0..2500).map(|_| contact("Marie", "Curie")).collect();
    let output = pipeline.process(rows, "contacts.csv").await?;

    let progress = ledger.progress.lock().map(|p| p.clone()).unwrap_or_default();
    assert_eq!(progress, vec![1000, 2000, 2500]);

    let run = ledger.inner.run(output.run_id).await.expect("run recorded");
    assert_eq!(run.rows_processed, 2500);
    assert_eq!(run.status, RunStatus::Done);
    Ok(())
}

#[tokio::test]
async fn test_concurrent_lookups_preserve_row_order() -> anyhow::Result<()> {
    let ledger = Arc::new(InMemoryRunLedger::new());
    let pipeline = EnrichmentPipeline::new(reference_store(), Arc::clone(&ledger)).with_settings(
        EnrichmentSettings {
            batch_size: 7,
            concurrent_lookups: 4,
            ..EnrichmentSettings::default()
        },
    );

    let rows: Vec<ContactRow> = (0..40)
        .map(|n| {
            let mut row = if n % 2 == 0 { contact("Dupont", "Marie") } else { contact("Paul", "Martin") };
            row.set_text("id", n.to_string());
            row
        })
        .collect();

    let output = pipeline.process(rows, "contacts.csv").await?;

    assert_eq!(output.stats.enriched, 40);
    assert_eq!(output.stats.inversions_corrected, 20);
    for (n, row) in output.rows.iter().enumerate() {
        assert_eq!(row.text("id"), n.to_string());
        let expected = if n % 2 == 0 { ("Marie", "Mme") } else { ("Paul", "M.") };
        assert_eq!((row.text("Prénom").as_str(), row.text("Civilité").as_str()), expected);
    }

    let mut row_numbers: Vec<usize> = ledger
        .logs_for(output.run_id)
        .await
        .iter()
        .filter(|entry| entry.action_type == ActionType::Enrichment)
        .map(|entry| entry.row_number)
        .collect();
    row_numbers.sort_unstable();
    assert_eq!(row_numbers, (1..=40).collect::<Vec<_>>());
    Ok(())
}

#[tokio::test]
async fn test_cancellation_stops_at_batch_boundary() -> anyhow::Result<()> {
    let cancellation = CancellationHandle::new();
    let store = Arc::new(CancellingStore {
        inner: reference_store(),
        trigger: "claire".to_string(),
        cancellation: cancellation.clone(),
    });
    let ledger = Arc::new(InMemoryRunLedger::new());
    let pipeline = EnrichmentPipeline::new(store, Arc::clone(&ledger))
        .with_settings(EnrichmentSettings {
            batch_size: 2,
            ..EnrichmentSettings::default()
        })
        .with_cancellation(cancellation);

    let rows = vec![
        contact("Jean", "Dupont"),
        contact("Marie", "Curie"),
        contact("Claire", "Leroy"),
        contact("Paul", "Martin"),
        contact("Jean", "Valjean"),
        contact("Marie", "Durand"),
    ];

    let err = pipeline.process(rows, "contacts.csv").await.unwrap_err();
    assert!(matches!(err, EtlError::Cancelled { rows_processed: 4, .. }));

    let snapshot = ledger.snapshot().await;
    assert_eq!(snapshot.runs.len(), 1);
    assert_eq!(snapshot.runs[0].status, RunStatus::Running);
    assert_eq!(snapshot.runs[0].rows_processed, 4);
    assert!(snapshot.logs.iter().all(|entry| entry.row_number <= 4));
    Ok(())
}

#[tokio::test]
async fn test_ledger_failure_at_creation_is_fatal() {
    let ledger = Arc::new(RecordingLedger {
        fail_create: true,
        ..RecordingLedger::default()
    });
    let pipeline = EnrichmentPipeline::new(reference_store(), Arc::clone(&ledger));

    let result = pipeline.process(vec![contact("Jean", "Dupont")], "contacts.csv").await;

    assert!(matches!(result, Err(EtlError::LedgerError { .. })));
    assert!(ledger.inner.snapshot().await.runs.is_empty());
}

#[tokio::test]
async fn test_lookup_timeout_marks_row_as_error() -> anyhow::Result<()> {
    struct SlowStore;

    #[async_trait]
    impl ReferenceNameStore for SlowStore {
        async fn civility_for(&self, _normalized_first_name: &str) -> contact_etl::Result<Option<Civility>> {
            tokio::time::sleep(std::time::Duration::from_secs(5)).await;
            Ok(Some(Civility::Monsieur))
        }
    }

    let ledger = Arc::new(InMemoryRunLedger::new());
    let pipeline = EnrichmentPipeline::new(Arc::new(SlowStore), Arc::clone(&ledger)).with_settings(
        EnrichmentSettings {
            lookup_timeout: Some(std::time::Duration::from_millis(20)),
            ..EnrichmentSettings::default()
        },
    );

    let output = pipeline.process(vec![contact("Jean", "Dupont")], "contacts.csv").await?;

    assert_eq!(output.stats.errors, 1);
    assert_eq!(output.rows[0].text("Civilité"), "Erreur");
    assert_eq!(output.rows[0].text("Prénom"), "Jean");
    Ok(())
}

#[tokio::test]
async fn test_worker_panic_is_contained_with_default_settings() -> anyhow::Result<()> {
    let store = Arc::new(PanickingStore {
        inner: reference_store(),
        panic_on: "boom".to_string(),
    });
    let ledger = Arc::new(InMemoryRunLedger::new());
    let pipeline = EnrichmentPipeline::new(store, Arc::clone(&ledger));
    assert_eq!(pipeline.settings().concurrent_lookups, 1);

    let rows = vec![contact("Boom", "X"), contact("Jean", "Y")];
    let output = pipeline.process(rows, "contacts.csv").await?;

    assert_eq!(output.stats.errors, 1);
    assert_eq!(output.stats.enriched, 1);
    assert_eq!(output.rows[0].text("Prénom"), "Boom");
    assert_eq!(output.rows[0].text("Civilité"), "Erreur");
    assert_eq!(output.rows[1].text("Civilité"), "M.");

    let errors: Vec<_> = ledger
        .logs_for(output.run_id)
        .await
        .into_iter()
        .filter(|entry| entry.action_type == ActionType::Error)
        .collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].row_number, 1);
    assert!(errors[0].details["error"].as_str().unwrap_or_default().contains("panicked"));

    let run = ledger.run(output.run_id).await.expect("run recorded");
    assert_eq!(run.status, RunStatus::Done);
    Ok(())
}

#[tokio::test]
async fn test_log_write_failure_fails_only_that_row() -> anyhow::Result<()> {
    let ledger = Arc::new(RecordingLedger {
        fail_append_for_row: Some(2),
        ..RecordingLedger::default()
    });
    let pipeline = EnrichmentPipeline::new(reference_store(), Arc::clone(&ledger));

    let rows = vec![
        contact("Marie", "Curie"),
        contact("Jean", "Dupont"),
        contact("Paul", "Martin"),
    ];
    let output = pipeline.process(rows, "contacts.csv").await?;

    assert_eq!(output.stats.errors, 1);
    assert_eq!(output.stats.enriched, 2);
    assert_eq!(output.stats.accounted_rows(), 3);
    assert_eq!(output.rows[1].text("Prénom"), "Jean");
    assert_eq!(output.rows[1].text("Civilité"), "Erreur");
    assert_eq!(output.rows[2].text("Civilité"), "M.");

    let logged_rows: Vec<usize> = ledger
        .inner
        .logs_for(output.run_id)
        .await
        .iter()
        .map(|entry| entry.row_number)
        .collect();
    assert_eq!(logged_rows, vec![1, 3]);

    let run = ledger.inner.run(output.run_id).await.expect("run recorded");
    assert_eq!(run.status, RunStatus::Done);
    Ok(())
}

#[tokio::test]
async fn test_finalize_failure_marks_run_failed() {
    let ledger = Arc::new(RecordingLedger {
        fail_finalize: true,
        ..RecordingLedger::default()
    });
    let pipeline = EnrichmentPipeline::new(reference_store(), Arc::clone(&ledger));

    let result = pipeline.process(vec![contact("Jean", "Dupont")], "contacts.csv").await;
    assert!(matches!(result, Err(EtlError::LedgerError { .. })));

    let snapshot = ledger.inner.snapshot().await;
    assert_eq!(snapshot.runs.len(), 1);
    assert_eq!(snapshot.runs[0].status, RunStatus::Failed);
    assert!(snapshot.runs[0]
        .failure
        .as_deref()
        .unwrap_or_default()
        .contains("commit rejected"));
    assert_eq!(snapshot.runs[0].rows_processed, 1);
}
