use crate::core::Pipeline;
use crate::utils::error::Result;
use crate::utils::monitor::SystemMonitor;

pub struct EtlEngine<P: Pipeline> {
    pipeline: P,
    monitor: SystemMonitor,
}

impl<P: Pipeline> EtlEngine<P> {
    pub fn new(pipeline: P) -> Self {
        Self::new_with_monitoring(pipeline, false)
    }

    pub fn new_with_monitoring(pipeline: P, monitor_enabled: bool) -> Self {
        Self {
            pipeline,
            monitor: SystemMonitor::new(monitor_enabled),
        }
    }

    pub async fn run(&self) -> Result<String> {
        tracing::info!("Starting ETL process...");
        self.monitor.log_stats("Start");

        // Extract
        let batch = self.pipeline.extract().await?;
        tracing::info!("📥 Extracted {} rows from {}", batch.rows.len(), batch.file_name);
        self.monitor.log_stats("Extract");

        // Transform
        let output = self.pipeline.transform(batch).await?;
        tracing::info!(
            "🔄 Run {}: {} rows, {} enriched, {} inversions corrected, {} not found, {} errors",
            output.run_id,
            output.stats.total_lines,
            output.stats.enriched,
            output.stats.inversions_corrected,
            output.stats.not_found,
            output.stats.errors
        );
        self.monitor.log_stats("Transform");
        self.monitor.log_throughput("Transform", output.stats.total_lines);

        // Load
        let output_path = self.pipeline.load(output).await?;
        tracing::info!("💾 Output saved to: {}", output_path);
        self.monitor.log_final_stats();

        Ok(output_path)
    }
}
