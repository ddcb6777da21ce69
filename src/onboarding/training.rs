//! Website scan/training progress engine.
//!
//! A scan delivers a fixed, ordered batch of [`PageScanRecord`]s one at a
//! time, one page delay apart, then waits a training delay and settles the
//! aggregate [`TrainingStatus`]. Each run carries a generation number and a
//! cancellation token; a run that has been superseded by a retry, a new scan
//! or a cancel never touches state again.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{RwLock, broadcast};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::events::SessionEvent;
use super::model::{
    ChunkContent, ContentChunk, EntityType, PageMetadata, PageScanRecord, PageStatus,
    WebsiteAnalysisSummary,
};
use crate::clock::Clock;
use crate::error::OnboardingError;

/// Aggregate status of website training.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainingStatus {
    #[default]
    NotStarted,
    InProgress,
    Completed,
    Failed,
}

impl TrainingStatus {
    /// Check if a transition from `self` to `target` is valid.
    pub fn can_transition_to(&self, target: TrainingStatus) -> bool {
        use TrainingStatus::*;
        matches!(
            (self, target),
            (NotStarted, InProgress)
                | (InProgress, Completed)
                | (InProgress, Failed)
                | (InProgress, NotStarted)
                | (Completed, InProgress)
                | (Completed, NotStarted)
                | (Failed, InProgress)
                | (Failed, NotStarted)
        )
    }

    /// Whether the scan has settled.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for TrainingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::NotStarted => "not_started",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// How per-page failures roll up into the aggregate status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationMode {
    /// Always end `completed`, whatever individual pages report.
    #[default]
    Lenient,
    /// End `failed` if any page in the batch failed.
    Strict,
}

impl AggregationMode {
    pub fn settle(&self, pages: &[PageScanRecord]) -> TrainingStatus {
        match self {
            Self::Lenient => TrainingStatus::Completed,
            Self::Strict if pages.iter().any(|p| p.status == PageStatus::Failed) => {
                TrainingStatus::Failed
            }
            Self::Strict => TrainingStatus::Completed,
        }
    }
}

/// Where scan batches come from. A real crawler would stream pages instead
/// of returning a fixed plan, but must keep the same one-at-a-time order.
pub trait PageSource: Send + Sync {
    fn plan(&self, website_url: &str) -> Vec<PageScanRecord>;
}

/// The simulated crawler: always the same four pages.
#[derive(Debug, Default, Clone, Copy)]
pub struct SimulatedCrawl;

impl PageSource for SimulatedCrawl {
    fn plan(&self, _website_url: &str) -> Vec<PageScanRecord> {
        reference_batch()
    }
}

fn metadata(title: &str, description: &str, primary_topic: &str) -> Option<PageMetadata> {
    Some(PageMetadata {
        title: title.to_string(),
        description: description.to_string(),
        language: "English".to_string(),
        primary_topic: primary_topic.to_string(),
    })
}

fn text_chunk(
    id: &str,
    text: &str,
    confidence_score: f32,
    source_selector: &str,
    keywords: &[&str],
) -> ContentChunk {
    ContentChunk {
        id: id.to_string(),
        content: ChunkContent::Text {
            text: text.to_string(),
        },
        confidence_score,
        source_selector: source_selector.to_string(),
        keywords: keywords.iter().map(|k| k.to_string()).collect::<BTreeSet<_>>(),
        entity_type: EntityType::About,
    }
}

/// Root, about, products, contact, in that order.
pub fn reference_batch() -> Vec<PageScanRecord> {
    vec![
        PageScanRecord {
            url: "/".to_string(),
            status: PageStatus::Scraped,
            progress: 100,
            metadata: metadata("Home", "Welcome to our company", "Company Overview"),
            content_chunks: vec![text_chunk(
                "1",
                "We are a leading innovator in technology solutions",
                0.95,
                "homepage main text",
                &["innovation", "technology", "solutions"],
            )],
        },
        PageScanRecord {
            url: "/about".to_string(),
            status: PageStatus::Scraped,
            progress: 100,
            metadata: metadata("About Us", "Learn about our mission", "Company Mission"),
            content_chunks: vec![text_chunk(
                "2",
                "Our mission is to deliver cutting-edge solutions",
                0.92,
                "mission statement",
                &["mission", "solutions", "cutting-edge"],
            )],
        },
        PageScanRecord {
            url: "/products".to_string(),
            status: PageStatus::Pending,
            progress: 45,
            metadata: metadata("Our Products", "Explore our product lineup", "Product Catalog"),
            content_chunks: Vec::new(),
        },
        PageScanRecord {
            url: "/contact".to_string(),
            status: PageStatus::Failed,
            progress: 0,
            metadata: metadata("Contact Us", "Get in touch with our team", "Customer Support"),
            content_chunks: Vec::new(),
        },
    ]
}

/// Delays and aggregation rule for one engine.
#[derive(Debug, Clone)]
pub struct TrainingTiming {
    pub page_delay: Duration,
    pub training_delay: Duration,
    pub aggregation: AggregationMode,
}

impl Default for TrainingTiming {
    fn default() -> Self {
        Self {
            page_delay: Duration::from_secs(1),
            training_delay: Duration::from_secs(2),
            aggregation: AggregationMode::Lenient,
        }
    }
}

/// Observable training state.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TrainingState {
    pub status: TrainingStatus,
    /// URL of the most recent scan, kept for retries.
    pub website_url: Option<String>,
    /// Pages delivered so far in the current run, in arrival order.
    pub pages: Vec<PageScanRecord>,
    pub analysis: Option<WebsiteAnalysisSummary>,
    /// Batch size fixed when the current run started.
    pub batch_size: usize,
    #[serde(skip)]
    run: u64,
}

impl TrainingState {
    /// Start a new run and return its generation.
    fn begin(
        &mut self,
        website_url: &str,
        batch_size: usize,
        seed: Option<WebsiteAnalysisSummary>,
    ) -> u64 {
        self.run += 1;
        self.website_url = Some(website_url.to_string());
        self.pages.clear();
        self.batch_size = batch_size;
        let mut analysis = seed.or_else(|| self.analysis.take()).unwrap_or_else(|| {
            WebsiteAnalysisSummary {
                total_pages: batch_size as u32,
                ..Default::default()
            }
        });
        analysis.reset_progress();
        self.analysis = Some(analysis);
        self.status = TrainingStatus::InProgress;
        self.run
    }

    fn record_arrival(&mut self, page: PageScanRecord) {
        self.pages.push(page);
        let batch_size = self.batch_size;
        if let Some(analysis) = self.analysis.as_mut() {
            analysis.record_arrival(batch_size);
        }
    }

    fn finish(&mut self, aggregation: AggregationMode) -> TrainingStatus {
        let status = aggregation.settle(&self.pages);
        self.set_status(status);
        status
    }

    /// Drop the current run's records and return to `not_started`.
    fn reset(&mut self) {
        self.run += 1;
        self.pages.clear();
        if let Some(analysis) = self.analysis.as_mut() {
            analysis.reset_progress();
        }
        self.set_status(TrainingStatus::NotStarted);
    }

    fn set_status(&mut self, target: TrainingStatus) {
        if self.status != target && !self.status.can_transition_to(target) {
            warn!(from = %self.status, to = %target, "Unexpected training status transition");
        }
        self.status = target;
    }
}

/// Reject empty (or whitespace-only) website URLs.
pub fn validate_website_url(website_url: &str) -> Result<&str, OnboardingError> {
    let url = website_url.trim();
    if url.is_empty() {
        return Err(OnboardingError::required(
            "website_url",
            "Please enter a website URL",
        ));
    }
    Ok(url)
}

/// Drives simulated scans for one session.
pub struct TrainingEngine {
    timing: TrainingTiming,
    clock: Arc<dyn Clock>,
    source: Arc<dyn PageSource>,
    state: Arc<RwLock<TrainingState>>,
    events: broadcast::Sender<SessionEvent>,
    active: Mutex<Option<CancellationToken>>,
}

impl TrainingEngine {
    pub fn new(
        timing: TrainingTiming,
        clock: Arc<dyn Clock>,
        source: Arc<dyn PageSource>,
        events: broadcast::Sender<SessionEvent>,
    ) -> Self {
        Self {
            timing,
            clock,
            source,
            state: Arc::new(RwLock::new(TrainingState::default())),
            events,
            active: Mutex::new(None),
        }
    }

    /// Current state snapshot.
    pub async fn snapshot(&self) -> TrainingState {
        self.state.read().await.clone()
    }

    pub async fn status(&self) -> TrainingStatus {
        self.state.read().await.status
    }

    /// Begin a scan of `website_url`, discarding any earlier run.
    ///
    /// `seed` replaces the analysis baseline; `None` keeps the previous one.
    pub async fn start_scan(
        &self,
        website_url: &str,
        seed: Option<WebsiteAnalysisSummary>,
    ) -> Result<(), OnboardingError> {
        let url = match validate_website_url(website_url) {
            Ok(url) => url,
            Err(e) => {
                emit_validation(&self.events, &e);
                return Err(e);
            }
        };

        let batch = self.source.plan(url);
        let token = self.replace_token();

        let run = {
            let mut state = self.state.write().await;
            let run = state.begin(url, batch.len(), seed);
            let _ = self.events.send(SessionEvent::TrainingStatusChanged {
                status: state.status,
            });
            if let Some(analysis) = state.analysis.clone() {
                let _ = self.events.send(SessionEvent::AnalysisUpdated { analysis });
            }
            run
        };

        info!(url, run, pages = batch.len(), "Website scan started");
        self.spawn_run(run, batch, token);
        Ok(())
    }

    /// Clear everything and scan the previous URL again from scratch.
    pub async fn retry_training(&self) -> Result<(), OnboardingError> {
        self.cancel_token();
        let url = {
            let mut state = self.state.write().await;
            let url = state
                .website_url
                .clone()
                .ok_or(OnboardingError::NothingToRetry)?;
            state.reset();
            let _ = self.events.send(SessionEvent::TrainingStatusChanged {
                status: TrainingStatus::NotStarted,
            });
            url
        };
        info!(url = %url, "Retrying website training");
        self.start_scan(&url, None).await
    }

    /// Abandon the running scan. Returns `true` if one was in progress.
    pub async fn cancel(&self) -> bool {
        self.cancel_token();
        let mut state = self.state.write().await;
        if state.status != TrainingStatus::InProgress {
            return false;
        }
        state.reset();
        let _ = self.events.send(SessionEvent::TrainingStatusChanged {
            status: TrainingStatus::NotStarted,
        });
        debug!("Website scan cancelled");
        true
    }

    /// Forget the scan entirely, including the stored URL.
    pub async fn reset(&self) {
        self.cancel_token();
        let mut state = self.state.write().await;
        let previous = state.status;
        *state = TrainingState {
            run: state.run + 1,
            ..TrainingState::default()
        };
        if previous != TrainingStatus::NotStarted {
            let _ = self.events.send(SessionEvent::TrainingStatusChanged {
                status: TrainingStatus::NotStarted,
            });
        }
    }

    fn replace_token(&self) -> CancellationToken {
        let token = CancellationToken::new();
        let mut active = self.active.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(previous) = active.replace(token.clone()) {
            previous.cancel();
        }
        token
    }

    fn cancel_token(&self) {
        let mut active = self.active.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(token) = active.take() {
            token.cancel();
        }
    }

    fn spawn_run(&self, run: u64, batch: Vec<PageScanRecord>, token: CancellationToken) {
        let clock = Arc::clone(&self.clock);
        let state = Arc::clone(&self.state);
        let events = self.events.clone();
        let timing = self.timing.clone();

        tokio::spawn(async move {
            for (index, page) in batch.into_iter().enumerate() {
                tokio::select! {
                    _ = token.cancelled() => {
                        debug!(run, "Scan run cancelled before page {}", index);
                        return;
                    }
                    _ = clock.sleep(timing.page_delay) => {}
                }

                let mut guard = state.write().await;
                if guard.run != run {
                    return;
                }
                debug!(run, url = %page.url, status = %page.status, "Page arrived");
                guard.record_arrival(page.clone());
                let _ = events.send(SessionEvent::PageArrived { index, page });
                if let Some(analysis) = guard.analysis.clone() {
                    let _ = events.send(SessionEvent::AnalysisUpdated { analysis });
                }
            }

            tokio::select! {
                _ = token.cancelled() => {
                    debug!(run, "Scan run cancelled during training");
                    return;
                }
                _ = clock.sleep(timing.training_delay) => {}
            }

            let mut guard = state.write().await;
            if guard.run != run {
                return;
            }
            let status = guard.finish(timing.aggregation);
            let _ = events.send(SessionEvent::TrainingStatusChanged { status });
            info!(run, %status, pages = guard.pages.len(), "Website training finished");
        });
    }
}

/// Publish a validation failure for the presentation layer.
pub(crate) fn emit_validation(events: &broadcast::Sender<SessionEvent>, err: &OnboardingError) {
    if let OnboardingError::Validation { field, message } = err {
        warn!(field = %field, "{}", message);
        let _ = events.send(SessionEvent::ValidationFailed {
            field: field.clone(),
            message: message.clone(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    const STEP: Duration = Duration::from_secs(1);

    fn engine(
        clock: Arc<ManualClock>,
        aggregation: AggregationMode,
    ) -> (TrainingEngine, broadcast::Receiver<SessionEvent>) {
        let (tx, rx) = broadcast::channel(256);
        let timing = TrainingTiming {
            aggregation,
            ..TrainingTiming::default()
        };
        (
            TrainingEngine::new(timing, clock, Arc::new(SimulatedCrawl), tx),
            rx,
        )
    }

    async fn next_event(rx: &mut broadcast::Receiver<SessionEvent>) -> SessionEvent {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event channel closed")
    }

    async fn expect_status(rx: &mut broadcast::Receiver<SessionEvent>, expected: TrainingStatus) {
        match next_event(rx).await {
            SessionEvent::TrainingStatusChanged { status } => assert_eq!(status, expected),
            other => panic!("expected status {expected}, got {other:?}"),
        }
    }

    /// Advance one page delay and return the arrived page and analysis.
    async fn next_page(
        clock: &ManualClock,
        rx: &mut broadcast::Receiver<SessionEvent>,
    ) -> (usize, PageScanRecord, WebsiteAnalysisSummary) {
        clock.advance_parked(STEP).await;
        let (index, page) = match next_event(rx).await {
            SessionEvent::PageArrived { index, page } => (index, page),
            other => panic!("expected page_arrived, got {other:?}"),
        };
        let analysis = match next_event(rx).await {
            SessionEvent::AnalysisUpdated { analysis } => analysis,
            other => panic!("expected analysis_updated, got {other:?}"),
        };
        (index, page, analysis)
    }

    async fn drain_start(rx: &mut broadcast::Receiver<SessionEvent>) {
        expect_status(rx, TrainingStatus::InProgress).await;
        assert!(matches!(
            next_event(rx).await,
            SessionEvent::AnalysisUpdated { .. }
        ));
    }

    #[test]
    fn valid_transitions() {
        use TrainingStatus::*;
        assert!(NotStarted.can_transition_to(InProgress));
        assert!(InProgress.can_transition_to(Completed));
        assert!(InProgress.can_transition_to(Failed));
        assert!(Completed.can_transition_to(NotStarted));
        assert!(!NotStarted.can_transition_to(Completed));
        assert!(!NotStarted.can_transition_to(Failed));
        assert!(Completed.is_terminal());
        assert!(!InProgress.is_terminal());
    }

    #[test]
    fn display_matches_serde() {
        use TrainingStatus::*;
        for status in [NotStarted, InProgress, Completed, Failed] {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(format!("\"{status}\""), json);
        }
    }

    #[test]
    fn reference_batch_order_and_outcomes() {
        let batch = reference_batch();
        let urls: Vec<_> = batch.iter().map(|p| p.url.as_str()).collect();
        assert_eq!(urls, ["/", "/about", "/products", "/contact"]);
        assert_eq!(batch[0].status, PageStatus::Scraped);
        assert_eq!(batch[2].status, PageStatus::Pending);
        assert_eq!(batch[2].progress, 45);
        assert_eq!(batch[3].status, PageStatus::Failed);
        assert_eq!(batch[0].content_chunks[0].confidence_score, 0.95);
        assert!(batch[3].content_chunks.is_empty());
    }

    #[test]
    fn strict_aggregation_fails_on_failed_page() {
        let batch = reference_batch();
        assert_eq!(AggregationMode::Lenient.settle(&batch), TrainingStatus::Completed);
        assert_eq!(AggregationMode::Strict.settle(&batch), TrainingStatus::Failed);
        assert_eq!(
            AggregationMode::Strict.settle(&batch[..2]),
            TrainingStatus::Completed
        );
    }

    #[test]
    fn validate_rejects_blank() {
        assert!(validate_website_url("").is_err());
        assert!(validate_website_url("   ").is_err());
        assert_eq!(
            validate_website_url(" https://example.com ").unwrap(),
            "https://example.com"
        );
    }

    #[tokio::test]
    async fn empty_url_changes_nothing() {
        let clock = ManualClock::new();
        let (engine, mut rx) = engine(clock.clone(), AggregationMode::Lenient);

        let err = engine.start_scan("", None).await.unwrap_err();
        assert!(matches!(err, OnboardingError::Validation { .. }));

        match next_event(&mut rx).await {
            SessionEvent::ValidationFailed { field, .. } => assert_eq!(field, "website_url"),
            other => panic!("expected validation_failed, got {other:?}"),
        }
        let state = engine.snapshot().await;
        assert_eq!(state.status, TrainingStatus::NotStarted);
        assert!(state.pages.is_empty());
        assert!(rx.try_recv().is_err());
        assert_eq!(clock.registrations(), 0);
    }

    #[tokio::test]
    async fn scan_delivers_batch_in_order_then_completes() {
        let clock = ManualClock::new();
        let (engine, mut rx) = engine(clock.clone(), AggregationMode::Lenient);

        engine.start_scan("https://example.com", None).await.unwrap();
        drain_start(&mut rx).await;

        let expected = reference_batch();
        for (i, want) in expected.iter().enumerate() {
            let (index, page, analysis) = next_page(&clock, &mut rx).await;
            assert_eq!(index, i);
            assert_eq!(&page, want);
            assert_eq!(analysis.scraped_pages, i as u32 + 1);
            assert_eq!(
                analysis.training_completion_percent,
                ((i + 1) * 100 / expected.len()) as u8
            );
            assert_eq!(engine.status().await, TrainingStatus::InProgress);
        }

        // Training delay is two units: one unit is not enough.
        clock.advance_parked(STEP).await;
        tokio::task::yield_now().await;
        assert_eq!(engine.status().await, TrainingStatus::InProgress);

        clock.advance(STEP);
        expect_status(&mut rx, TrainingStatus::Completed).await;

        let state = engine.snapshot().await;
        assert_eq!(state.pages, expected);
        let analysis = state.analysis.unwrap();
        assert_eq!(analysis.scraped_pages, 4);
        assert_eq!(analysis.training_completion_percent, 100);
    }

    #[tokio::test]
    async fn strict_mode_ends_failed() {
        let clock = ManualClock::new();
        let (engine, mut rx) = engine(clock.clone(), AggregationMode::Strict);

        engine.start_scan("https://example.com", None).await.unwrap();
        drain_start(&mut rx).await;
        for _ in 0..4 {
            next_page(&clock, &mut rx).await;
        }
        clock.advance_parked(STEP * 2).await;
        expect_status(&mut rx, TrainingStatus::Failed).await;
    }

    #[tokio::test]
    async fn retry_mid_run_restarts_from_empty() {
        let clock = ManualClock::new();
        let (engine, mut rx) = engine(clock.clone(), AggregationMode::Lenient);

        engine.start_scan("https://example.com", None).await.unwrap();
        drain_start(&mut rx).await;
        next_page(&clock, &mut rx).await;
        next_page(&clock, &mut rx).await;

        // Two page sleeps done plus the third now parked.
        clock.wait_for_registrations(3).await;
        engine.retry_training().await.unwrap();
        expect_status(&mut rx, TrainingStatus::NotStarted).await;
        drain_start(&mut rx).await;

        let state = engine.snapshot().await;
        assert!(state.pages.is_empty());
        assert_eq!(state.analysis.as_ref().unwrap().scraped_pages, 0);

        clock.wait_for_registrations(4).await;
        let mut urls = Vec::new();
        for i in 0..4 {
            clock.advance(STEP);
            let (index, page, analysis) = match next_event(&mut rx).await {
                SessionEvent::PageArrived { index, page } => match next_event(&mut rx).await {
                    SessionEvent::AnalysisUpdated { analysis } => (index, page, analysis),
                    other => panic!("expected analysis_updated, got {other:?}"),
                },
                other => panic!("expected page_arrived, got {other:?}"),
            };
            assert_eq!(index, i);
            assert_eq!(analysis.scraped_pages, i as u32 + 1);
            urls.push(page.url);
            clock.wait_for_registrations(5 + i as u64).await;
        }
        assert_eq!(urls, ["/", "/about", "/products", "/contact"]);

        clock.advance(STEP * 2);
        expect_status(&mut rx, TrainingStatus::Completed).await;
        assert_eq!(engine.snapshot().await.pages, reference_batch());
    }

    #[tokio::test]
    async fn retry_after_completion_matches_fresh_scan() {
        let clock = ManualClock::new();
        let (engine, mut rx) = engine(clock.clone(), AggregationMode::Lenient);

        engine.start_scan("https://example.com", None).await.unwrap();
        drain_start(&mut rx).await;
        for _ in 0..4 {
            next_page(&clock, &mut rx).await;
        }
        clock.advance_parked(STEP * 2).await;
        expect_status(&mut rx, TrainingStatus::Completed).await;
        let first = engine.snapshot().await.pages;

        engine.retry_training().await.unwrap();
        expect_status(&mut rx, TrainingStatus::NotStarted).await;
        drain_start(&mut rx).await;
        assert!(engine.snapshot().await.pages.is_empty());

        for _ in 0..4 {
            next_page(&clock, &mut rx).await;
        }
        clock.advance_parked(STEP * 2).await;
        expect_status(&mut rx, TrainingStatus::Completed).await;
        assert_eq!(engine.snapshot().await.pages, first);
    }

    #[tokio::test]
    async fn retry_without_scan_is_rejected() {
        let clock = ManualClock::new();
        let (engine, _rx) = engine(clock, AggregationMode::Lenient);
        assert_eq!(
            engine.retry_training().await.unwrap_err(),
            OnboardingError::NothingToRetry
        );
    }

    #[tokio::test]
    async fn cancel_stops_stale_updates() {
        let clock = ManualClock::new();
        let (engine, mut rx) = engine(clock.clone(), AggregationMode::Lenient);

        engine.start_scan("https://example.com", None).await.unwrap();
        drain_start(&mut rx).await;
        next_page(&clock, &mut rx).await;

        assert!(engine.cancel().await);
        expect_status(&mut rx, TrainingStatus::NotStarted).await;

        clock.advance(STEP * 10);
        tokio::task::yield_now().await;
        let state = engine.snapshot().await;
        assert_eq!(state.status, TrainingStatus::NotStarted);
        assert!(state.pages.is_empty());
        assert!(rx.try_recv().is_err());

        assert!(!engine.cancel().await);
    }

    #[tokio::test]
    async fn reset_forgets_url() {
        let clock = ManualClock::new();
        let (engine, mut rx) = engine(clock.clone(), AggregationMode::Lenient);

        engine.start_scan("https://example.com", None).await.unwrap();
        drain_start(&mut rx).await;
        next_page(&clock, &mut rx).await;

        engine.reset().await;
        expect_status(&mut rx, TrainingStatus::NotStarted).await;
        let state = engine.snapshot().await;
        assert!(state.website_url.is_none());
        assert!(state.analysis.is_none());
        assert_eq!(
            engine.retry_training().await.unwrap_err(),
            OnboardingError::NothingToRetry
        );
    }

    #[tokio::test]
    async fn seed_sets_total_pages_but_not_percent_base() {
        let clock = ManualClock::new();
        let (engine, mut rx) = engine(clock.clone(), AggregationMode::Lenient);
        let seed = WebsiteAnalysisSummary {
            total_pages: 15,
            primary_topics: vec!["AI".to_string()],
            ..Default::default()
        };

        engine.start_scan("https://example.com", Some(seed)).await.unwrap();
        drain_start(&mut rx).await;
        let (_, _, analysis) = next_page(&clock, &mut rx).await;
        assert_eq!(analysis.total_pages, 15);
        assert_eq!(analysis.training_completion_percent, 25);
        assert_eq!(analysis.primary_topics, vec!["AI"]);
    }
}
