//! Script bundle sources and the per-URL execution bookkeeping.

use std::collections::HashMap;
use std::error::Error as StdError;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Value, json};
use thiserror::Error;

use crate::boundary::{BoundaryError, NativeBoundary};
use crate::logging::{LogLevel, Logger, emit, json_kv};
use crate::metrics::BridgeMetrics;

use super::audit::{InstanceAudit, InstanceAuditEventBuilder, InstanceAuditStage};
use super::{InstanceConfig, InstanceId, record_metrics};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BundleExecutionStatus {
    Running,
    Done,
}

#[derive(Debug, Error)]
pub enum BundleLoadError {
    #[error("failed to load bundle from {url}: {source}")]
    Transport {
        url: String,
        source: Box<dyn StdError + Send + Sync>,
    },
    #[error("bundle {url} failed to execute: {source}")]
    Execution { url: String, source: BoundaryError },
    #[error("all bundle providers failed ({} errors)", .errors.len())]
    Aggregate { errors: Vec<BundleLoadError> },
    #[error("no bundle providers configured")]
    NoProviders,
}

impl BundleLoadError {
    pub fn transport(url: impl Into<String>, source: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        BundleLoadError::Transport {
            url: url.into(),
            source: source.into(),
        }
    }

    /// URL of the failed attempt, when the error concerns a single source.
    pub fn url(&self) -> Option<&str> {
        match self {
            BundleLoadError::Transport { url, .. } | BundleLoadError::Execution { url, .. } => Some(url),
            BundleLoadError::Aggregate { .. } | BundleLoadError::NoProviders => None,
        }
    }
}

#[async_trait]
pub trait JsBundleProvider: Send + Sync {
    fn url(&self) -> String;

    async fn bundle(&self) -> Result<Vec<u8>, BundleLoadError>;
}

/// Bundle bytes already held in memory.
#[derive(Debug, Clone)]
pub struct StaticJsBundleProvider {
    url: String,
    bytes: Arc<[u8]>,
}

impl StaticJsBundleProvider {
    pub fn new(url: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        let bytes: Vec<u8> = bytes.into();
        Self {
            url: url.into(),
            bytes: Arc::from(bytes),
        }
    }
}

#[async_trait]
impl JsBundleProvider for StaticJsBundleProvider {
    fn url(&self) -> String {
        self.url.clone()
    }

    async fn bundle(&self) -> Result<Vec<u8>, BundleLoadError> {
        Ok(self.bytes.to_vec())
    }
}

/// Reads the bundle from the local filesystem.
#[derive(Debug, Clone)]
pub struct FileJsBundleProvider {
    path: PathBuf,
}

impl FileJsBundleProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl JsBundleProvider for FileJsBundleProvider {
    fn url(&self) -> String {
        format!("file://{}", self.path.display())
    }

    async fn bundle(&self) -> Result<Vec<u8>, BundleLoadError> {
        tokio::fs::read(&self.path)
            .await
            .map_err(|err| BundleLoadError::transport(self.url(), err))
    }
}

/// Tries each provider in priority order. `url()` reports the provider that
/// last produced a bundle (the first one until then).
pub struct AnyJsBundleProvider {
    providers: Vec<Box<dyn JsBundleProvider>>,
    picked: AtomicUsize,
}

impl AnyJsBundleProvider {
    pub fn new(providers: Vec<Box<dyn JsBundleProvider>>) -> Result<Self, BundleLoadError> {
        if providers.is_empty() {
            return Err(BundleLoadError::NoProviders);
        }
        Ok(Self {
            providers,
            picked: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl JsBundleProvider for AnyJsBundleProvider {
    fn url(&self) -> String {
        self.providers
            .get(self.picked.load(Ordering::Acquire))
            .map(|provider| provider.url())
            .unwrap_or_default()
    }

    async fn bundle(&self) -> Result<Vec<u8>, BundleLoadError> {
        let mut errors = Vec::new();
        for (index, provider) in self.providers.iter().enumerate() {
            match provider.bundle().await {
                Ok(bytes) => {
                    self.picked.store(index, Ordering::Release);
                    return Ok(bytes);
                }
                Err(err) => errors.push(err),
            }
        }
        Err(BundleLoadError::Aggregate { errors })
    }
}

type StatusMap = Arc<Mutex<HashMap<String, BundleExecutionStatus>>>;
type FingerprintMap = Arc<Mutex<HashMap<String, blake3::Hash>>>;

/// Executes bundles for one instance. Cloneable and `'static`, so a fetch can
/// be driven from a spawned task while the controller keeps serving other
/// operations. Status and fingerprint maps are shared with the controller.
#[derive(Clone)]
pub struct BundleRunner {
    instance_id: InstanceId,
    boundary: Arc<dyn NativeBoundary>,
    statuses: StatusMap,
    fingerprints: FingerprintMap,
    logger: Option<Logger>,
    metrics: Option<Arc<Mutex<BridgeMetrics>>>,
    audit: Arc<dyn InstanceAudit>,
}

impl BundleRunner {
    pub(crate) fn new(instance_id: InstanceId, boundary: Arc<dyn NativeBoundary>, config: &InstanceConfig) -> Self {
        Self {
            instance_id,
            boundary,
            statuses: Arc::default(),
            fingerprints: Arc::default(),
            logger: config.logger.clone(),
            metrics: config.metrics_handle(),
            audit: Arc::clone(&config.audit),
        }
    }

    pub fn instance_id(&self) -> InstanceId {
        self.instance_id
    }

    pub fn status(&self, url: &str) -> Option<BundleExecutionStatus> {
        lock(&self.statuses).get(url).copied()
    }

    /// blake3 digest of the last bundle from `url` that executed successfully.
    pub fn fingerprint(&self, url: &str) -> Option<blake3::Hash> {
        lock(&self.fingerprints).get(url).copied()
    }

    /// Fetch and execute one bundle. The status for the provider's URL is
    /// `Running` while in flight, `Done` on success and cleared on failure.
    pub async fn run(&self, provider: &dyn JsBundleProvider) -> Result<(), BundleLoadError> {
        let url = provider.url();
        lock(&self.statuses).insert(url.clone(), BundleExecutionStatus::Running);
        self.record_audit(InstanceAuditStage::BundleStarted, &url, std::iter::empty());
        emit(
            self.logger.as_ref(),
            LogLevel::Info,
            "rnoh::instance.bundle",
            "bundle_started",
            [json_kv("instance", json!(self.instance_id.0)), json_kv("url", json!(url))],
        );

        match self.fetch_and_execute(provider, &url).await {
            Ok((fingerprint, len)) => {
                lock(&self.statuses).insert(url.clone(), BundleExecutionStatus::Done);
                lock(&self.fingerprints).insert(url.clone(), fingerprint);
                record_metrics(self.metrics.as_ref(), |metrics| metrics.record_bundle(true));
                let details = [
                    json_kv("fingerprint", json!(fingerprint.to_hex().as_str())),
                    json_kv("bytes", json!(len)),
                ];
                self.record_audit(InstanceAuditStage::BundleFinished, &url, details.clone());
                emit(
                    self.logger.as_ref(),
                    LogLevel::Info,
                    "rnoh::instance.bundle",
                    "bundle_loaded",
                    [json_kv("instance", json!(self.instance_id.0)), json_kv("url", json!(url))]
                        .into_iter()
                        .chain(details),
                );
                Ok(())
            }
            Err(err) => {
                lock(&self.statuses).remove(&url);
                record_metrics(self.metrics.as_ref(), |metrics| metrics.record_bundle(false));
                let error = json_kv("error", json!(err.to_string()));
                self.record_audit(InstanceAuditStage::BundleFailed, &url, [error.clone()]);
                emit(
                    self.logger.as_ref(),
                    LogLevel::Error,
                    "rnoh::instance.bundle",
                    "bundle_failed",
                    [
                        json_kv("instance", json!(self.instance_id.0)),
                        json_kv("url", json!(url)),
                        error,
                    ],
                );
                Err(err)
            }
        }
    }

    async fn fetch_and_execute(
        &self,
        provider: &dyn JsBundleProvider,
        url: &str,
    ) -> Result<(blake3::Hash, usize), BundleLoadError> {
        let bytes = provider.bundle().await?;
        let fingerprint = blake3::hash(&bytes);
        self.boundary
            .load_script_from_string(self.instance_id, &bytes, url)
            .map_err(|source| BundleLoadError::Execution {
                url: url.to_string(),
                source,
            })?;
        Ok((fingerprint, bytes.len()))
    }

    fn record_audit<I>(&self, stage: InstanceAuditStage, url: &str, details: I)
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        let mut builder = InstanceAuditEventBuilder::new(self.instance_id, stage);
        builder.detail("url", json!(url));
        for (key, value) in details {
            builder.detail(key, value);
        }
        self.audit.record(builder.finish());
    }
}

fn lock<T>(map: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    map.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boundary::{BoundaryCall, RecordingBoundary};
    use crate::runtime::audit::MemoryInstanceAudit;
    use std::io;
    use tokio::sync::Notify;

    struct Failing(&'static str);

    #[async_trait]
    impl JsBundleProvider for Failing {
        fn url(&self) -> String {
            self.0.to_string()
        }

        async fn bundle(&self) -> Result<Vec<u8>, BundleLoadError> {
            Err(BundleLoadError::transport(
                self.0,
                io::Error::new(io::ErrorKind::NotFound, "missing"),
            ))
        }
    }

    struct Gated {
        gate: Arc<Notify>,
    }

    #[async_trait]
    impl JsBundleProvider for Gated {
        fn url(&self) -> String {
            "gated.bundle".to_string()
        }

        async fn bundle(&self) -> Result<Vec<u8>, BundleLoadError> {
            self.gate.notified().await;
            Ok(b"gated()".to_vec())
        }
    }

    fn runner(boundary: &RecordingBoundary, config: &InstanceConfig) -> BundleRunner {
        BundleRunner::new(InstanceId(0), Arc::new(boundary.clone()), config)
    }

    #[tokio::test]
    async fn any_provider_falls_back_and_reports_picked_url() {
        let providers: Vec<Box<dyn JsBundleProvider>> = vec![
            Box::new(Failing("a.bundle")),
            Box::new(StaticJsBundleProvider::new("b.bundle", b"b()".to_vec())),
        ];
        let any = AnyJsBundleProvider::new(providers).unwrap();

        assert_eq!(any.url(), "a.bundle");
        assert_eq!(any.bundle().await.unwrap(), b"b()".to_vec());
        assert_eq!(any.url(), "b.bundle");
    }

    #[tokio::test]
    async fn any_provider_aggregates_every_failure() {
        let providers: Vec<Box<dyn JsBundleProvider>> =
            vec![Box::new(Failing("a.bundle")), Box::new(Failing("b.bundle"))];
        let any = AnyJsBundleProvider::new(providers).unwrap();

        match any.bundle().await.unwrap_err() {
            BundleLoadError::Aggregate { errors } => {
                let urls: Vec<_> = errors.iter().filter_map(|err| err.url()).collect();
                assert_eq!(urls, vec!["a.bundle", "b.bundle"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn any_provider_requires_sources() {
        assert!(matches!(
            AnyJsBundleProvider::new(Vec::new()),
            Err(BundleLoadError::NoProviders)
        ));
    }

    #[tokio::test]
    async fn file_provider_reads_and_reports_missing_files() {
        let path = std::env::temp_dir().join(format!("rnoh-bridge-{}.bundle", std::process::id()));
        std::fs::write(&path, b"file()").unwrap();

        let provider = FileJsBundleProvider::new(&path);
        assert_eq!(provider.bundle().await.unwrap(), b"file()".to_vec());
        std::fs::remove_file(&path).unwrap();

        let err = provider.bundle().await.unwrap_err();
        assert!(matches!(err, BundleLoadError::Transport { .. }));
        assert!(provider.url().starts_with("file://"));
    }

    #[tokio::test]
    async fn status_runs_then_completes() {
        let boundary = RecordingBoundary::new();
        let runner = runner(&boundary, &InstanceConfig::default());
        let gate = Arc::new(Notify::new());
        let provider = Gated { gate: gate.clone() };

        assert_eq!(runner.status("gated.bundle"), None);
        let task = {
            let runner = runner.clone();
            tokio::spawn(async move { runner.run(&provider).await })
        };
        while runner.status("gated.bundle").is_none() {
            tokio::task::yield_now().await;
        }
        assert_eq!(runner.status("gated.bundle"), Some(BundleExecutionStatus::Running));

        gate.notify_one();
        task.await.unwrap().unwrap();

        assert_eq!(runner.status("gated.bundle"), Some(BundleExecutionStatus::Done));
        assert_eq!(runner.fingerprint("gated.bundle"), Some(blake3::hash(b"gated()")));
        assert!(boundary.calls().iter().any(|call| matches!(
            call,
            BoundaryCall::LoadScript { url, len: 7, .. } if url == "gated.bundle"
        )));
    }

    #[tokio::test]
    async fn failure_clears_status_and_is_reraised() {
        let boundary = RecordingBoundary::new();
        let audit = Arc::new(MemoryInstanceAudit::new());
        let mut config = InstanceConfig::default().with_audit(audit.clone());
        config.enable_metrics();
        let runner = runner(&boundary, &config);

        let err = runner.run(&Failing("broken.bundle")).await.unwrap_err();
        assert_eq!(err.url(), Some("broken.bundle"));
        assert_eq!(runner.status("broken.bundle"), None);
        assert_eq!(
            audit.stages(),
            vec![InstanceAuditStage::BundleStarted, InstanceAuditStage::BundleFailed]
        );

        let metrics = config.metrics_handle().unwrap();
        let snapshot = metrics.lock().unwrap().snapshot(std::time::Duration::ZERO);
        assert_eq!(snapshot.bundle_failures, 1);
    }

    #[tokio::test]
    async fn script_errors_surface_as_execution_failures() {
        let boundary = RecordingBoundary::new();
        boundary.fail_script("app.bundle");
        let runner = runner(&boundary, &InstanceConfig::default());

        let err = runner
            .run(&StaticJsBundleProvider::new("app.bundle", b"throw 1".to_vec()))
            .await
            .unwrap_err();

        assert!(matches!(err, BundleLoadError::Execution { .. }));
        assert_eq!(runner.status("app.bundle"), None);
        assert_eq!(runner.fingerprint("app.bundle"), None);
    }
}
