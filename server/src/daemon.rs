//! Long-running indexing loop.
//!
//! Runs an indexing cycle, sleeps for the poll interval, and repeats until
//! the cancellation token fires. A failed cycle is logged and retried after
//! a back-off. On shutdown any unpersisted state is flushed.

use std::sync::Arc;
use std::time::Duration;

use hextrackr_memory::{
    CanonicalNotesLog, CycleReport, EmbeddingProvider, EvidenceLog, IncrementalIndexer,
    IndexState,
};
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::DaemonResult;

/// Build an indexer over the evidence and canonical-note logs named in `config`.
pub fn build_indexer(config: &Config, provider: Arc<dyn EmbeddingProvider>) -> IncrementalIndexer {
    IncrementalIndexer::new(provider, config.indexer_config())
        .with_source(EvidenceLog::new(config.paths.evidence_log_path()))
        .with_source(CanonicalNotesLog::new(config.paths.canonical_notes_path()))
}

pub struct IndexDaemon {
    indexer: IncrementalIndexer,
    state: IndexState,
    poll_interval: Duration,
    error_backoff: Duration,
}

impl IndexDaemon {
    pub fn new(
        indexer: IncrementalIndexer,
        state: IndexState,
        poll_interval: Duration,
        error_backoff: Duration,
    ) -> Self {
        Self {
            indexer,
            state,
            poll_interval,
            error_backoff,
        }
    }

    /// Open persisted state from the configured export dir and wire up the sources.
    pub fn from_config(config: &Config, provider: Arc<dyn EmbeddingProvider>) -> DaemonResult<Self> {
        let state = IndexState::open(config.paths.export_dir_path(), config.indexer.threshold)?;
        Ok(Self::new(
            build_indexer(config, provider),
            state,
            config.indexer.poll_interval(),
            config.indexer.error_backoff(),
        ))
    }

    pub fn state(&self) -> &IndexState {
        &self.state
    }

    /// Run exactly one cycle.
    pub async fn run_once(&mut self, cancel: &CancellationToken) -> DaemonResult<CycleReport> {
        let report = self.indexer.run_cycle(&mut self.state, cancel).await?;
        log_report(&report);
        Ok(report)
    }

    /// Loop until `cancel` fires, then flush.
    pub async fn run(&mut self, cancel: CancellationToken) -> DaemonResult<()> {
        tracing::info!(
            "Indexing daemon started (poll every {:?}, export dir {})",
            self.poll_interval,
            self.state.export_dir().display()
        );

        loop {
            let pause = match self.indexer.run_cycle(&mut self.state, &cancel).await {
                Ok(report) => {
                    log_report(&report);
                    self.poll_interval
                }
                Err(e) => {
                    tracing::error!("Indexing cycle failed: {}", e);
                    self.error_backoff
                }
            };

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(pause) => {}
            }
        }

        tracing::info!("Shutdown requested");
        if self.state.is_dirty() {
            tracing::info!("Flushing pending exports");
            self.indexer.flush(&mut self.state).await?;
        }
        Ok(())
    }
}

fn log_report(report: &CycleReport) {
    if report.embedded > 0 || report.retried > 0 || report.rebuilt {
        tracing::info!(
            "Cycle complete: {} embedded, {} retried, {} pending retry, {} records, {} edges",
            report.embedded,
            report.retried,
            report.failed,
            report.total_records,
            report.total_edges
        );
    } else {
        tracing::debug!("Cycle complete: nothing new");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use hextrackr_memory::indexer::{EMBEDDINGS_FILE, INDEX_STATE_FILE, SEARCH_MATRIX_FILE};
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct AxisProvider {
        calls: AtomicUsize,
    }

    impl AxisProvider {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl EmbeddingProvider for AxisProvider {
        fn model_name(&self) -> &str {
            "axis-test"
        }

        async fn embed(&self, text: &str) -> hextrackr_memory::Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if text.contains("router") {
                Ok(vec![1.0, 0.0])
            } else {
                Ok(vec![0.0, 1.0])
            }
        }
    }

    fn temp_config(root: &Path) -> Config {
        let mut config = Config::default();
        config.paths.memory_dir = root.to_path_buf();
        config.indexer.request_delay_ms = 0;
        config.indexer.poll_interval_secs = 3600;
        config
    }

    fn write_evidence(config: &Config, items: serde_json::Value) {
        let path = config.paths.evidence_log_path();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, serde_json::to_vec(&items).unwrap()).unwrap();
    }

    #[tokio::test]
    async fn test_run_once_persists_exports() {
        let dir = TempDir::new().unwrap();
        let config = temp_config(dir.path());
        write_evidence(
            &config,
            serde_json::json!([
                {"id": "e1", "topic_key": "network:router", "text": "router reboot loop"},
                {"id": "e2", "topic_key": "network:router", "text": "router firmware update"},
            ]),
        );

        let mut daemon = IndexDaemon::from_config(&config, Arc::new(AxisProvider::new())).unwrap();
        let report = daemon.run_once(&CancellationToken::new()).await.unwrap();

        assert_eq!(report.embedded, 2);
        assert_eq!(report.total_edges, 1);
        let export_dir = config.paths.export_dir_path();
        assert!(export_dir.join(EMBEDDINGS_FILE).exists());
        assert!(export_dir.join(SEARCH_MATRIX_FILE).exists());
        assert!(export_dir.join(INDEX_STATE_FILE).exists());
    }

    #[tokio::test]
    async fn test_reopened_daemon_does_not_re_embed() {
        let dir = TempDir::new().unwrap();
        let config = temp_config(dir.path());
        write_evidence(
            &config,
            serde_json::json!([{"id": "e1", "text": "router reboot loop"}]),
        );

        let mut first = IndexDaemon::from_config(&config, Arc::new(AxisProvider::new())).unwrap();
        first.run_once(&CancellationToken::new()).await.unwrap();

        let provider = Arc::new(AxisProvider::new());
        let mut second = IndexDaemon::from_config(&config, provider.clone()).unwrap();
        let report = second.run_once(&CancellationToken::new()).await.unwrap();

        assert_eq!(report.embedded, 0);
        assert_eq!(report.total_records, 1);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_run_stops_on_cancel() {
        let dir = TempDir::new().unwrap();
        let config = temp_config(dir.path());
        write_evidence(
            &config,
            serde_json::json!([{"id": "e1", "text": "switch port flapping"}]),
        );

        let mut daemon = IndexDaemon::from_config(&config, Arc::new(AxisProvider::new())).unwrap();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        tokio::time::timeout(Duration::from_secs(5), daemon.run(cancel))
            .await
            .expect("daemon did not stop")
            .unwrap();

        assert_eq!(daemon.state().store().len(), 1);
        assert!(!daemon.state().is_dirty());
    }

    #[tokio::test]
    async fn test_failed_cycle_does_not_stop_loop() {
        let dir = TempDir::new().unwrap();
        let config = temp_config(dir.path());
        write_evidence(
            &config,
            serde_json::json!([{"id": "e1", "text": "router reboot loop"}]),
        );

        let export_dir = config.paths.export_dir_path();
        let state = IndexState::open(&export_dir, 0.3).unwrap();
        // a regular file where the export dir should be makes every persist fail
        std::fs::write(&export_dir, "x").unwrap();

        let provider = Arc::new(AxisProvider::new());
        let mut daemon = IndexDaemon::new(
            build_indexer(&config, provider.clone()),
            state,
            Duration::from_secs(3600),
            Duration::from_millis(10),
        );

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            trigger.cancel();
        });

        // the shutdown flush fails too, so the loop reports it
        let result = tokio::time::timeout(Duration::from_secs(5), daemon.run(cancel))
            .await
            .expect("daemon did not stop");
        assert!(result.is_err());
        assert!(daemon.state().is_dirty());
        // embedded once, then only re-persisted on later cycles
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }
}
