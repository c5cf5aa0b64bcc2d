use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::analyze::cache::MemoryCache;
use crate::analyze::collab::{
    ActionExtractor, AlwaysOnline, AnalysisCache, CloudInference, LocalInference, NetworkState,
    PiiRedactor,
};
use crate::analyze::heuristic::{heuristic_analysis, minimal_analysis};
use crate::analyze::queue::JobQueue;
use crate::analyze::types::{AnalysisKind, AnalysisResult, AnalyzeError, Provenance, Settings};
use crate::extract::engine::ExtractionEngine;
use crate::message::EmailMessage;

// Bounded waits per tier; expiry counts as tier failure.
const LOCAL_TIER_TIMEOUT: Duration = Duration::from_secs(20);
const CLOUD_TIER_TIMEOUT: Duration = Duration::from_secs(30);
const REDACTION_TIMEOUT: Duration = Duration::from_secs(10);
const EXTRACTOR_TIMEOUT: Duration = Duration::from_secs(15);

/// Turns a message into an analysis result by escalating through the tiers:
/// cache, local inference, cloud inference, deterministic heuristics, and a
/// guaranteed-success minimal tier. Apart from the explicit
/// `LocalProcessingDisabled` rejection, `analyze` always returns a result.
pub struct Orchestrator {
    engine: Arc<ExtractionEngine>,
    local: Option<Arc<dyn LocalInference>>,
    cloud: Vec<Arc<dyn CloudInference>>,
    redactor: Option<Arc<dyn PiiRedactor>>,
    extractor: Option<Arc<dyn ActionExtractor>>,
    cache: Arc<dyn AnalysisCache>,
    network: Arc<dyn NetworkState>,
    queue: JobQueue,
    // Single lane: requests serialize here, FIFO-fair.
    lane: Mutex<()>,
}

impl Orchestrator {
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::default()
    }

    pub fn queue(&self) -> &JobQueue {
        &self.queue
    }

    pub fn engine(&self) -> &ExtractionEngine {
        &self.engine
    }

    pub async fn analyze(
        &self,
        message: &EmailMessage,
        settings: &Settings,
    ) -> Result<AnalysisResult, AnalyzeError> {
        // Cache hits short-circuit before any job is queued.
        if settings.enable_caching {
            if let Some(hit) = self.cache.get(&message.id).await {
                debug!(message_id = %message.id, "cache hit");
                return Ok(hit);
            }
        }

        let job_id = self.queue.enqueue(&message.id, AnalysisKind::Full);
        self.queue.sweep_expired(Utc::now());

        if !settings.enable_local_processing {
            let err = AnalyzeError::LocalProcessingDisabled;
            self.queue.mark_failed(job_id, &err.to_string());
            return Err(err);
        }

        let _lane = self.lane.lock().await;
        self.queue.set_draining(true);
        self.queue.mark_processing(job_id);

        let result = self.escalate(message, settings).await;

        self.queue.mark_completed(job_id, &result);
        self.queue.set_draining(false);

        if settings.enable_caching {
            self.cache.set(&message.id, &result).await;
        }
        Ok(result)
    }

    /// Tiers strictly in order, each attempted at most once, first success
    /// wins. Tier failures are logged and absorbed.
    async fn escalate(&self, message: &EmailMessage, settings: &Settings) -> AnalysisResult {
        if self.network.is_offline() {
            debug!("declared offline, skipping local inference tier");
        } else if let Some(local) = &self.local {
            match timeout(LOCAL_TIER_TIMEOUT, local.analyze(message)).await {
                Ok(Ok(mut result)) => {
                    result.provenance = Provenance::Local;
                    return result;
                }
                Ok(Err(e)) => warn!(error = %e, "local inference failed, escalating"),
                Err(_) => warn!("local inference timed out, escalating"),
            }
        }

        if settings.enable_cloud_fallback && !self.cloud.is_empty() {
            if let Some(outbound) = self.redacted_for_cloud(message, settings).await {
                for provider in &self.cloud {
                    let call = provider.analyze(&outbound, AnalysisKind::Full, settings);
                    match timeout(CLOUD_TIER_TIMEOUT, call).await {
                        Ok(Ok(mut result)) => {
                            result.provenance = Provenance::Cloud;
                            result.message_id = message.id.clone();
                            return result;
                        }
                        Ok(Err(e)) => warn!(error = %e, "cloud provider failed, trying next"),
                        Err(_) => warn!("cloud provider timed out, trying next"),
                    }
                }
            }
        }

        match catch_unwind(AssertUnwindSafe(|| self.engine.extract(message))) {
            Ok(mut extraction) => {
                if let Some(extractor) = &self.extractor {
                    match timeout(EXTRACTOR_TIMEOUT, extractor.extract_actions(message)).await {
                        Ok(Ok(external)) => extraction = extraction.merge(external),
                        Ok(Err(e)) => {
                            debug!(error = %e, "model extraction unavailable, keeping heuristic result")
                        }
                        Err(_) => debug!("model extraction timed out, keeping heuristic result"),
                    }
                }
                match catch_unwind(AssertUnwindSafe(|| heuristic_analysis(message, extraction))) {
                    Ok(result) => return result,
                    Err(_) => warn!("heuristic tier panicked, falling back to minimal tier"),
                }
            }
            Err(_) => warn!("extraction panicked, falling back to minimal tier"),
        }

        minimal_analysis(message)
    }

    /// The message as it may leave the device. With redaction enabled, a
    /// missing/failing redactor skips the cloud tier entirely; raw text is
    /// never transmitted.
    async fn redacted_for_cloud(
        &self,
        message: &EmailMessage,
        settings: &Settings,
    ) -> Option<EmailMessage> {
        if !settings.enable_pii_redaction {
            return Some(message.clone());
        }
        let Some(redactor) = &self.redactor else {
            warn!("redaction enabled but no redactor configured, skipping cloud tier");
            return None;
        };
        match timeout(REDACTION_TIMEOUT, redactor.redact(message)).await {
            Ok(Ok((redacted, summary))) => {
                debug!(%summary, "message redacted for cloud analysis");
                Some(redacted)
            }
            Ok(Err(e)) => {
                warn!(error = %e, "redaction failed, skipping cloud tier");
                None
            }
            Err(_) => {
                warn!("redaction timed out, skipping cloud tier");
                None
            }
        }
    }
}

/// Explicit dependency injection: collaborators are wired once at session
/// start and passed in, no global accessors.
#[derive(Default)]
pub struct OrchestratorBuilder {
    engine: Option<Arc<ExtractionEngine>>,
    local: Option<Arc<dyn LocalInference>>,
    cloud: Vec<Arc<dyn CloudInference>>,
    redactor: Option<Arc<dyn PiiRedactor>>,
    extractor: Option<Arc<dyn ActionExtractor>>,
    cache: Option<Arc<dyn AnalysisCache>>,
    network: Option<Arc<dyn NetworkState>>,
}

impl OrchestratorBuilder {
    pub fn engine(mut self, engine: Arc<ExtractionEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn local(mut self, local: Arc<dyn LocalInference>) -> Self {
        self.local = Some(local);
        self
    }

    pub fn cloud_provider(mut self, provider: Arc<dyn CloudInference>) -> Self {
        self.cloud.push(provider);
        self
    }

    pub fn redactor(mut self, redactor: Arc<dyn PiiRedactor>) -> Self {
        self.redactor = Some(redactor);
        self
    }

    pub fn extractor(mut self, extractor: Arc<dyn ActionExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    pub fn cache(mut self, cache: Arc<dyn AnalysisCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn network(mut self, network: Arc<dyn NetworkState>) -> Self {
        self.network = Some(network);
        self
    }

    pub fn build(self) -> Orchestrator {
        Orchestrator {
            engine: self.engine.unwrap_or_else(|| Arc::new(ExtractionEngine::new())),
            local: self.local,
            cloud: self.cloud,
            redactor: self.redactor,
            extractor: self.extractor,
            cache: self
                .cache
                .unwrap_or_else(|| Arc::new(MemoryCache::default())),
            network: self.network.unwrap_or_else(|| Arc::new(AlwaysOnline)),
            queue: JobQueue::new(),
            lane: Mutex::new(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyze::queue::JobStatus;
    use crate::analyze::types::Sentiment;
    use crate::extract::types::{Category, ExtractionMethod, ExtractionResult, Priority};
    use anyhow::{Result, bail};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn sample_result(id: &str, summary: &str, provenance: Provenance) -> AnalysisResult {
        AnalysisResult {
            message_id: id.to_string(),
            summary: summary.to_string(),
            action_items: Vec::new(),
            suggested_replies: Vec::new(),
            grammar_issues: Vec::new(),
            sentiment: Sentiment::Neutral,
            priority: Priority::Medium,
            categories: Vec::new(),
            dates: Vec::new(),
            created_at: Utc::now(),
            provenance,
        }
    }

    #[derive(Default)]
    struct MockLocal {
        calls: AtomicUsize,
        fail: bool,
    }

    impl MockLocal {
        fn failing() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail: true,
            }
        }
    }

    #[async_trait]
    impl LocalInference for MockLocal {
        async fn analyze(&self, message: &EmailMessage) -> Result<AnalysisResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                bail!("local model crashed");
            }
            Ok(sample_result(&message.id, "local summary", Provenance::Local))
        }
    }

    #[derive(Default)]
    struct MockCloud {
        calls: AtomicUsize,
        fail: bool,
        seen_bodies: std::sync::Mutex<Vec<String>>,
    }

    #[async_trait]
    impl CloudInference for MockCloud {
        async fn analyze(
            &self,
            message: &EmailMessage,
            _kind: AnalysisKind,
            _settings: &Settings,
        ) -> Result<AnalysisResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen_bodies
                .lock()
                .unwrap()
                .push(message.body.clone());
            if self.fail {
                bail!("quota exceeded");
            }
            Ok(sample_result(&message.id, "cloud summary", Provenance::Cloud))
        }
    }

    struct MockRedactor;

    #[async_trait]
    impl PiiRedactor for MockRedactor {
        async fn redact(&self, message: &EmailMessage) -> Result<(EmailMessage, String)> {
            let mut redacted = message.clone();
            redacted.body = "[redacted]".to_string();
            Ok((redacted, "removed 1 name".to_string()))
        }
    }

    struct MockExtractor;

    #[async_trait]
    impl ActionExtractor for MockExtractor {
        async fn extract_actions(&self, _message: &EmailMessage) -> Result<ExtractionResult> {
            Ok(ExtractionResult {
                items: vec![crate::extract::types::ActionItem::new(
                    "circulate the minutes",
                    Priority::Medium,
                    Category::Communication,
                )],
                dates: Vec::new(),
                confidence: 0.9,
                method: ExtractionMethod::Llm,
            })
        }
    }

    struct Offline;

    impl NetworkState for Offline {
        fn is_offline(&self) -> bool {
            true
        }
    }

    /// Holds the call for a while and tracks how many run at once.
    #[derive(Default)]
    struct SlowLocal {
        active: AtomicUsize,
        max_active: AtomicUsize,
    }

    #[async_trait]
    impl LocalInference for SlowLocal {
        async fn analyze(&self, message: &EmailMessage) -> Result<AnalysisResult> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(30)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(sample_result(&message.id, "slow local", Provenance::Local))
        }
    }

    fn message(id: &str, body: &str) -> EmailMessage {
        EmailMessage::new(id, "", body)
    }

    #[tokio::test]
    async fn cache_hit_returns_without_invoking_any_tier() {
        let local = Arc::new(MockLocal::default());
        let cloud = Arc::new(MockCloud::default());
        let cache = Arc::new(MemoryCache::default());

        let cached = sample_result("m1", "cached summary", Provenance::Local);
        cache.set("m1", &cached).await;

        let orchestrator = Orchestrator::builder()
            .local(local.clone())
            .cloud_provider(cloud.clone())
            .cache(cache)
            .build();

        let result = orchestrator
            .analyze(&message("m1", "anything"), &Settings::default())
            .await
            .unwrap();

        assert_eq!(result.summary, "cached summary");
        // A cache hit does not refresh the stored creation time.
        assert_eq!(result.created_at, cached.created_at);
        assert_eq!(local.calls.load(Ordering::SeqCst), 0);
        assert_eq!(cloud.calls.load(Ordering::SeqCst), 0);
        assert!(orchestrator.queue().is_empty());
    }

    #[tokio::test]
    async fn local_success_wins_and_is_cached() {
        let local = Arc::new(MockLocal::default());
        let cloud = Arc::new(MockCloud::default());
        let orchestrator = Orchestrator::builder()
            .local(local.clone())
            .cloud_provider(cloud.clone())
            .build();

        let msg = message("m1", "hello");
        let first = orchestrator.analyze(&msg, &Settings::default()).await.unwrap();
        assert_eq!(first.summary, "local summary");
        assert_eq!(first.provenance, Provenance::Local);
        assert_eq!(cloud.calls.load(Ordering::SeqCst), 0);

        // Second call is served from cache; the local tier runs only once.
        let second = orchestrator.analyze(&msg, &Settings::default()).await.unwrap();
        assert_eq!(second.created_at, first.created_at);
        assert_eq!(local.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cloud_tier_runs_after_local_failure_and_only_sees_redacted_text() {
        let local = Arc::new(MockLocal::failing());
        let cloud = Arc::new(MockCloud::default());
        let orchestrator = Orchestrator::builder()
            .local(local)
            .cloud_provider(cloud.clone())
            .redactor(Arc::new(MockRedactor))
            .build();

        let result = orchestrator
            .analyze(&message("m1", "call me at 555-0100"), &Settings::default())
            .await
            .unwrap();

        assert_eq!(result.provenance, Provenance::Cloud);
        assert_eq!(result.message_id, "m1");
        let bodies = cloud.seen_bodies.lock().unwrap();
        assert_eq!(bodies.as_slice(), ["[redacted]"]);
    }

    #[tokio::test]
    async fn redaction_enabled_without_redactor_skips_cloud() {
        let cloud = Arc::new(MockCloud::default());
        let orchestrator = Orchestrator::builder()
            .local(Arc::new(MockLocal::failing()))
            .cloud_provider(cloud.clone())
            .build();

        let result = orchestrator
            .analyze(
                &message("m1", "URGENT: rotate the leaked key."),
                &Settings::default(),
            )
            .await
            .unwrap();

        assert_eq!(cloud.calls.load(Ordering::SeqCst), 0);
        assert_eq!(result.provenance, Provenance::Local);
    }

    #[tokio::test]
    async fn redaction_disabled_sends_original_body() {
        let cloud = Arc::new(MockCloud::default());
        let orchestrator = Orchestrator::builder()
            .local(Arc::new(MockLocal::failing()))
            .cloud_provider(cloud.clone())
            .build();

        let settings = Settings {
            enable_pii_redaction: false,
            ..Settings::default()
        };
        orchestrator
            .analyze(&message("m1", "plain body"), &settings)
            .await
            .unwrap();

        let bodies = cloud.seen_bodies.lock().unwrap();
        assert_eq!(bodies.as_slice(), ["plain body"]);
    }

    #[tokio::test]
    async fn local_disabled_without_cache_is_the_single_rejection() {
        let orchestrator = Orchestrator::builder().build();
        let settings = Settings {
            enable_local_processing: false,
            ..Settings::default()
        };

        let err = orchestrator
            .analyze(&message("m1", "body"), &settings)
            .await
            .unwrap_err();
        assert!(matches!(err, AnalyzeError::LocalProcessingDisabled));

        // The rejected request is still tracked, as a failed job.
        let jobs = orchestrator.queue().jobs();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].status, JobStatus::Failed);
        assert!(jobs[0].error.as_deref().unwrap().contains("disabled"));
    }

    #[tokio::test]
    async fn local_disabled_with_cached_result_still_serves_it() {
        let cache = Arc::new(MemoryCache::default());
        cache
            .set("m1", &sample_result("m1", "cached", Provenance::Local))
            .await;
        let orchestrator = Orchestrator::builder().cache(cache).build();

        let settings = Settings {
            enable_local_processing: false,
            ..Settings::default()
        };
        let result = orchestrator
            .analyze(&message("m1", "body"), &settings)
            .await
            .unwrap();
        assert_eq!(result.summary, "cached");
    }

    #[tokio::test]
    async fn heuristic_tier_carries_local_provenance_when_cloud_is_disabled() {
        let orchestrator = Orchestrator::builder()
            .local(Arc::new(MockLocal::failing()))
            .build();

        let settings = Settings {
            enable_cloud_fallback: false,
            ..Settings::default()
        };
        let result = orchestrator
            .analyze(
                &message("m1", "Please review the handover notes by tomorrow."),
                &settings,
            )
            .await
            .unwrap();

        assert_eq!(result.provenance, Provenance::Local);
        assert!(
            result
                .action_items
                .iter()
                .any(|i| i.text.contains("review the handover notes"))
        );
    }

    #[tokio::test]
    async fn failing_local_and_cloud_still_produce_a_result() {
        let local = Arc::new(MockLocal::failing());
        let cloud = Arc::new(MockCloud {
            fail: true,
            ..MockCloud::default()
        });
        let orchestrator = Orchestrator::builder()
            .local(local)
            .cloud_provider(cloud)
            .redactor(Arc::new(MockRedactor))
            .build();

        let result = orchestrator
            .analyze(
                &message("m1", "URGENT: restart the ingest workers."),
                &Settings::default(),
            )
            .await
            .unwrap();

        assert!(!result.summary.is_empty());
        assert!(
            result
                .action_items
                .iter()
                .any(|i| i.category == Category::Urgent)
        );
    }

    #[tokio::test]
    async fn offline_mode_skips_the_local_tier() {
        let local = Arc::new(MockLocal::default());
        let orchestrator = Orchestrator::builder()
            .local(local.clone())
            .network(Arc::new(Offline))
            .build();

        let settings = Settings {
            enable_cloud_fallback: false,
            ..Settings::default()
        };
        let result = orchestrator
            .analyze(&message("m1", "Please send the agenda."), &settings)
            .await
            .unwrap();

        assert_eq!(local.calls.load(Ordering::SeqCst), 0);
        assert_eq!(result.provenance, Provenance::Local);
    }

    #[tokio::test]
    async fn model_extraction_is_merged_into_the_heuristic_tier() {
        let orchestrator = Orchestrator::builder()
            .local(Arc::new(MockLocal::failing()))
            .extractor(Arc::new(MockExtractor))
            .build();

        let settings = Settings {
            enable_cloud_fallback: false,
            ..Settings::default()
        };
        let result = orchestrator
            .analyze(
                &message("m1", "Please review the incident doc."),
                &settings,
            )
            .await
            .unwrap();

        assert!(result.action_items.iter().any(|i| i.text.contains("review")));
        assert!(
            result
                .action_items
                .iter()
                .any(|i| i.text == "circulate the minutes")
        );
    }

    #[tokio::test]
    async fn concurrent_requests_are_serialized() {
        let local = Arc::new(SlowLocal::default());
        let orchestrator = Arc::new(
            Orchestrator::builder().local(local.clone()).build(),
        );

        let m1 = message("m1", "one");
        let m2 = message("m2", "two");
        let settings = Settings::default();
        let a = orchestrator.analyze(&m1, &settings);
        let b = orchestrator.analyze(&m2, &settings);
        let (ra, rb) = tokio::join!(a, b);
        ra.unwrap();
        rb.unwrap();

        assert_eq!(local.max_active.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn jobs_record_the_request_lifecycle() {
        let orchestrator = Orchestrator::builder().build();
        orchestrator
            .analyze(&message("m1", "Please send the notes."), &Settings::default())
            .await
            .unwrap();

        let jobs = orchestrator.queue().jobs();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].message_id, "m1");
        assert_eq!(jobs[0].status, JobStatus::Completed);
        assert!(jobs[0].result.is_some());
        assert!(jobs[0].completed_at.is_some());
        assert!(!orchestrator.queue().is_draining());
    }

    #[tokio::test]
    async fn caching_disabled_skips_read_and_write() {
        let local = Arc::new(MockLocal::default());
        let orchestrator = Orchestrator::builder().local(local.clone()).build();

        let settings = Settings {
            enable_caching: false,
            ..Settings::default()
        };
        let msg = message("m1", "hello");
        orchestrator.analyze(&msg, &settings).await.unwrap();
        orchestrator.analyze(&msg, &settings).await.unwrap();

        // No cache short-circuit: the local tier ran both times.
        assert_eq!(local.calls.load(Ordering::SeqCst), 2);
    }
}
