//! Strategy sequencing for one transcript request.

use std::sync::Arc;

use log::{debug, info, warn};
use tokio::sync::Mutex;

use crate::assemble::{self, DEFAULT_ESTIMATED_CUE_SECONDS};
use crate::cache::{self, Claim, SessionCache};
use crate::dom::page::TranscriptPage;
use crate::dom::{PanelConfig, PanelExtractor};
use crate::error::ExtractError;
use crate::fetch::HttpFetch;
use crate::locator::{self, CaptionTrackDescriptor};
use crate::{ExtractionMethod, Transcript, TranscriptOutcome, caption_xml, innertube, metadata, selection, watch_url};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    TrackApi,
    DomPanel,
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Strategy::TrackApi => write!(f, "caption track"),
            Strategy::DomPanel => write!(f, "transcript panel"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionState {
    Idle,
    TryTrackApi,
    TryDomPanel,
    Succeeded,
    Failed,
}

/// Why one strategy gave up
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyFailure {
    pub strategy: Strategy,
    pub error: ExtractError,
}

impl std::fmt::Display for StrategyFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.strategy, self.error)
    }
}

#[derive(Debug, Clone)]
pub struct ExtractConfig {
    /// Preferred caption languages, most preferred first
    pub languages: Vec<String>,
    /// Ask the InnerTube player endpoint when the page embeds no tracks
    pub innertube: bool,
    /// Fall back to the transcript panel of the live page
    pub dom_fallback: bool,
    pub estimated_cue_seconds: f64,
    pub panel: PanelConfig,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            languages: vec!["en".to_string(), "en-US".to_string()],
            innertube: true,
            dom_fallback: true,
            estimated_cue_seconds: DEFAULT_ESTIMATED_CUE_SECONDS,
            panel: PanelConfig::default(),
        }
    }
}

/// Runs the extraction strategies for a video, caching successes for the session.
pub struct Extractor {
    fetch: Arc<dyn HttpFetch>,
    page: Option<Arc<dyn TranscriptPage>>,
    cache: Arc<SessionCache>,
    panel_lock: Mutex<()>,
    last_markup: std::sync::Mutex<Option<(String, String)>>,
    config: ExtractConfig,
}

impl Extractor {
    pub fn new(fetch: Arc<dyn HttpFetch>, config: ExtractConfig) -> Self {
        Self {
            fetch,
            page: None,
            cache: Arc::new(SessionCache::new()),
            panel_lock: Mutex::new(()),
            last_markup: std::sync::Mutex::new(None),
            config,
        }
    }

    /// Attach the live page used for the transcript panel strategy
    pub fn with_page(mut self, page: Arc<dyn TranscriptPage>) -> Self {
        self.page = Some(page);
        self
    }

    pub fn with_cache(mut self, cache: Arc<SessionCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn cache(&self) -> &SessionCache {
        &self.cache
    }

    pub fn config(&self) -> &ExtractConfig {
        &self.config
    }

    /// Watch page markup read while extracting `video_id`, if any
    pub fn watch_markup_for(&self, video_id: &str) -> Option<String> {
        let last = self.last_markup.lock().unwrap_or_else(|e| e.into_inner());
        last.as_ref()
            .filter(|(id, _)| id == video_id)
            .map(|(_, markup)| markup.clone())
    }

    /// Transcript for `video_id`, or the unavailable sentinel.
    ///
    /// Concurrent calls for the same video share one extraction and receive
    /// the same transcript.
    pub async fn extract(&self, video_id: &str) -> TranscriptOutcome {
        loop {
            match self.cache.claim(video_id) {
                Claim::Hit(t) => return TranscriptOutcome::Available(t),
                Claim::Wait(slot) => match cache::wait(slot).await {
                    Some(outcome) => return outcome,
                    None => debug!("Extraction of {video_id} was abandoned, retrying"),
                },
                Claim::Lead(pending) => {
                    let outcome = self.run(video_id).await;
                    pending.complete(&outcome);
                    return outcome;
                }
            }
        }
    }

    async fn run(&self, video_id: &str) -> TranscriptOutcome {
        info!("Extracting transcript for {video_id}");
        let mut trace = vec![ExtractionState::Idle, ExtractionState::TryTrackApi];
        let mut failures = Vec::new();

        match self.try_track_api(video_id).await {
            Ok(t) => return self.succeed(t, trace),
            Err(error) => {
                warn!("Caption track extraction failed for {video_id}: {error}");
                failures.push(StrategyFailure {
                    strategy: Strategy::TrackApi,
                    error,
                });
            }
        }

        if self.config.dom_fallback {
            trace.push(ExtractionState::TryDomPanel);
            match self.try_dom_panel(video_id).await {
                Ok(t) => return self.succeed(t, trace),
                Err(error) => {
                    warn!("Transcript panel extraction failed for {video_id}: {error}");
                    failures.push(StrategyFailure {
                        strategy: Strategy::DomPanel,
                        error,
                    });
                }
            }
        }

        trace.push(ExtractionState::Failed);
        debug!("Extraction trace for {video_id}: {trace:?}");
        info!("No transcript available for {video_id}");
        TranscriptOutcome::Unavailable {
            video_id: video_id.to_string(),
            failures,
        }
    }

    fn succeed(&self, transcript: Transcript, mut trace: Vec<ExtractionState>) -> TranscriptOutcome {
        trace.push(ExtractionState::Succeeded);
        debug!("Extraction trace for {}: {trace:?}", transcript.video_id);
        info!(
            "Got {} segments for {} via {}",
            transcript.segments.len(),
            transcript.video_id,
            transcript.extraction_method
        );
        TranscriptOutcome::Available(Arc::new(transcript))
    }

    /// Watch page markup, from the network or else from the live page
    async fn watch_markup(&self, video_id: &str) -> Result<String, ExtractError> {
        let markup = match self.fetch.get_text(&watch_url(video_id)).await {
            Ok(markup) => markup,
            Err(e) => match &self.page {
                Some(page) => {
                    debug!("Watch page fetch failed ({e}), using the live page");
                    page.snapshot().await?
                }
                None => return Err(e.into()),
            },
        };
        let mut last = self.last_markup.lock().unwrap_or_else(|e| e.into_inner());
        *last = Some((video_id.to_string(), markup.clone()));
        drop(last);
        Ok(markup)
    }

    async fn find_tracks(
        &self,
        markup: &str,
        video_id: &str,
    ) -> Result<(Vec<CaptionTrackDescriptor>, ExtractionMethod), ExtractError> {
        if let Some(located) = locator::locate(markup) {
            return Ok((located.tracks, located.source.method()));
        }

        if self.config.innertube && innertube::extract_api_key(markup).is_some() {
            debug!("No tracks embedded in the page, asking the InnerTube player");
            let lang = self.config.languages.first().map(String::as_str).unwrap_or("en");
            let tracks = innertube::fetch_tracks(self.fetch.as_ref(), markup, video_id, lang).await?;
            return Ok((tracks, ExtractionMethod::TrackApi));
        }

        Err(ExtractError::TranscriptUnavailable(format!(
            "no caption tracks found for {video_id}"
        )))
    }

    async fn try_track_api(&self, video_id: &str) -> Result<Transcript, ExtractError> {
        let markup = self.watch_markup(video_id).await?;
        let (tracks, method) = self.find_tracks(&markup, video_id).await?;

        let track = selection::select_track(&tracks, &self.config.languages)
            .ok_or_else(|| ExtractError::TranscriptUnavailable("no caption track to select".to_string()))?;
        debug!(
            "Selected {} track{} {}",
            track.language_code,
            if track.is_auto_generated { " (auto-generated)" } else { "" },
            track.payload_url
        );

        let xml = self.fetch.get_text(&track.payload_url).await?;
        let raw = caption_xml::decode(&xml)
            .ok_or_else(|| ExtractError::MalformedSource("caption track payload has no segments".to_string()))?;

        assemble::assemble(
            video_id,
            &raw,
            method,
            Some(track.language_code.clone()),
            self.config.estimated_cue_seconds,
        )
        .ok_or_else(|| ExtractError::MalformedSource("caption track segments are all empty".to_string()))
    }

    async fn try_dom_panel(&self, video_id: &str) -> Result<Transcript, ExtractError> {
        let Some(page) = &self.page else {
            return Err(ExtractError::TranscriptUnavailable("no live page attached".to_string()));
        };

        let _panel = self.panel_lock.lock().await;
        let shown = metadata::page_video_id(&page.snapshot().await?);
        if let Some(shown) = shown.filter(|shown| shown != video_id) {
            return Err(ExtractError::TranscriptUnavailable(format!(
                "live page shows {shown}, not {video_id}"
            )));
        }
        let raw = PanelExtractor::new(page.as_ref(), &self.config.panel).extract().await?;

        assemble::assemble(
            video_id,
            &raw,
            ExtractionMethod::DomPanel,
            None,
            self.config.estimated_cue_seconds,
        )
        .ok_or_else(|| ExtractError::TranscriptUnavailable("transcript panel segments are all empty".to_string()))
    }
}
