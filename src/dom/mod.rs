//! Transcript extraction from the watch page's own transcript panel.

#[cfg(test)]
pub(crate) mod fake;
pub mod locate;
pub mod page;
pub mod scrape;

use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::watch;
use tokio::time::sleep;

use crate::RawSegment;
use crate::error::ExtractError;
use page::{NodeRef, TranscriptPage};

pub use page::StaticPage;

/// Seconds per segment assumed when a rendered segment shows no timestamp
pub const DEFAULT_ESTIMATED_SEGMENT_SECONDS: f64 = 8.0;

/// Delays and budgets for driving the panel
#[derive(Debug, Clone)]
pub struct PanelConfig {
    /// Wait after opening the overflow menu
    pub menu_delay: Duration,
    /// Wait after clicking the transcript trigger
    pub open_delay: Duration,
    /// Longest wait for the first segment to render
    pub render_timeout: Duration,
    /// Re-check interval while waiting for segments
    pub poll_interval: Duration,
    pub initial_settle: Duration,
    pub bottom_settle: Duration,
    pub step_settle: Duration,
    pub final_settle: Duration,
    /// Wait after scrolling finishes, before scraping
    pub post_scroll_settle: Duration,
    pub scroll_steps: u32,
    /// Passes with an unchanged segment count before scrolling stops
    pub stable_passes: u32,
    /// Passes with an unchanged scroll extent before scrolling stops
    pub stable_extent_passes: u32,
    pub max_passes: u32,
    pub estimated_segment_seconds: f64,
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            menu_delay: Duration::from_millis(200),
            open_delay: Duration::from_millis(400),
            render_timeout: Duration::from_millis(5000),
            poll_interval: Duration::from_millis(100),
            initial_settle: Duration::from_millis(800),
            bottom_settle: Duration::from_millis(200),
            step_settle: Duration::from_millis(50),
            final_settle: Duration::from_millis(300),
            post_scroll_settle: Duration::from_millis(1000),
            scroll_steps: 8,
            stable_passes: 5,
            stable_extent_passes: 3,
            max_passes: 50,
            estimated_segment_seconds: DEFAULT_ESTIMATED_SEGMENT_SECONDS,
        }
    }
}

impl PanelConfig {
    /// No settle delays. For pages that do not render asynchronously, such as
    /// a [`StaticPage`].
    pub fn immediate() -> Self {
        Self {
            menu_delay: Duration::ZERO,
            open_delay: Duration::ZERO,
            render_timeout: Duration::from_millis(500),
            poll_interval: Duration::from_millis(5),
            initial_settle: Duration::ZERO,
            bottom_settle: Duration::ZERO,
            step_settle: Duration::ZERO,
            final_settle: Duration::ZERO,
            post_scroll_settle: Duration::ZERO,
            ..Self::default()
        }
    }
}

/// Drives one open/scroll/scrape/close cycle on a page.
///
/// The caller must hold exclusive access to the page for the whole call.
pub struct PanelExtractor<'a> {
    page: &'a dyn TranscriptPage,
    config: &'a PanelConfig,
}

impl<'a> PanelExtractor<'a> {
    pub fn new(page: &'a dyn TranscriptPage, config: &'a PanelConfig) -> Self {
        Self { page, config }
    }

    pub async fn extract(&self) -> Result<Vec<RawSegment>, ExtractError> {
        info!("Starting transcript extraction from panel");
        self.open().await?;

        let result = self.extract_opened().await;
        self.close().await;

        if let Ok(ref segments) = result {
            info!("Extracted {} transcript segments from panel", segments.len());
        }
        result
    }

    async fn extract_opened(&self) -> Result<Vec<RawSegment>, ExtractError> {
        self.await_render().await?;
        sleep(self.config.initial_settle).await;

        if let Err(e) = self.scroll_all().await {
            warn!("Scrolling the transcript panel failed, scraping what is rendered: {e}");
        }
        sleep(self.config.post_scroll_settle).await;

        let markup = self.page.snapshot().await?;
        let segments = scrape::scrape_segments(&markup, self.config.estimated_segment_seconds);
        if segments.is_empty() {
            return Err(ExtractError::TranscriptUnavailable(
                "transcript panel rendered no usable segments".to_string(),
            ));
        }
        if segments.len() < 5 {
            warn!("Only found {} segments, extraction may be incomplete", segments.len());
        }
        Ok(segments)
    }

    async fn open(&self) -> Result<(), ExtractError> {
        let markup = self.page.snapshot().await?;
        let trigger = match locate::find_first(&markup, locate::TRANSCRIPT_TRIGGERS) {
            Some(node) => Some(node),
            None => self.open_via_menu(&markup).await?,
        };

        let Some(trigger) = trigger else {
            return Err(ExtractError::TranscriptUnavailable(
                "no transcript button on the page".to_string(),
            ));
        };

        debug!("Clicking transcript trigger {trigger}");
        self.page.click(&trigger).await?;
        sleep(self.config.open_delay).await;
        Ok(())
    }

    async fn open_via_menu(&self, markup: &str) -> Result<Option<NodeRef>, ExtractError> {
        debug!("Transcript button not visible, checking the overflow menu");
        let Some(menu) = locate::find_first(markup, locate::OVERFLOW_MENU_TRIGGERS) else {
            return Ok(None);
        };

        debug!("Opening overflow menu {menu}");
        self.page.click(&menu).await?;
        sleep(self.config.menu_delay).await;

        let markup = self.page.snapshot().await?;
        let item = locate::find_first(&markup, locate::MENU_TRANSCRIPT_ITEMS);
        if item.is_none() {
            debug!("Overflow menu has no transcript item, closing it");
            if let Err(e) = self.page.click(&menu).await {
                warn!("Could not close the overflow menu: {e}");
            }
        }
        Ok(item)
    }

    /// Wait for the first segment node, bounded by `render_timeout`.
    async fn await_render(&self) -> Result<(), ExtractError> {
        let mut observer = self.page.mutations();
        let outcome = tokio::time::timeout(self.config.render_timeout, self.poll_for_segments(&mut observer)).await;
        // Disconnect before the caller moves on, on success and timeout alike
        drop(observer);

        match outcome {
            Ok(result) => result,
            Err(_) => Err(ExtractError::Timeout {
                what: "transcript segments to render".to_string(),
                after: self.config.render_timeout,
            }),
        }
    }

    async fn poll_for_segments(&self, observer: &mut watch::Receiver<u64>) -> Result<(), ExtractError> {
        let mut observing = true;
        loop {
            let markup = self.page.snapshot().await?;
            if locate::segment_count(&markup, None) > 0 {
                return Ok(());
            }

            tokio::select! {
                changed = observer.changed(), if observing => {
                    if changed.is_err() {
                        observing = false;
                    }
                }
                _ = sleep(self.config.poll_interval) => {}
            }
        }
    }

    /// Scroll the panel until segment count and scroll extent both settle.
    /// Returns the last segment count seen.
    async fn scroll_all(&self) -> Result<usize, ExtractError> {
        let markup = self.page.snapshot().await?;
        let Some(container) = locate::find_first(&markup, locate::CONTAINERS) else {
            info!("No transcript container found, skipping scroll");
            return Ok(locate::segment_count(&markup, None));
        };
        debug!("Scrolling transcript container {container}");

        let mut count = locate::segment_count(&markup, Some(&container));
        let mut last_extent = None;
        let mut stable = 0;
        let mut extent_stable = 0;
        let mut passes = 0;

        while passes < self.config.max_passes {
            passes += 1;
            let previous = count;
            let extent = self.page.scroll_height(&container).await?;

            self.scroll_to_bottom(&container, self.config.bottom_settle).await?;

            let total = self.page.scroll_height(&container).await?;
            let steps = self.config.scroll_steps.max(1);
            for i in 1..=steps {
                self.page
                    .scroll_to(&container, total * f64::from(i) / f64::from(steps))
                    .await?;
                sleep(self.config.step_settle).await;
            }

            self.scroll_to_bottom(&container, self.config.final_settle).await?;

            let markup = self.page.snapshot().await?;
            count = locate::segment_count(&markup, Some(&container));

            if last_extent == Some(extent) {
                extent_stable += 1;
            } else {
                extent_stable = 0;
                last_extent = Some(extent);
            }
            if count == previous {
                stable += 1;
            } else {
                stable = 0;
            }

            debug!("Scroll pass {passes}: {count} segments (previous {previous}), extent {extent}");

            if count <= previous && stable >= self.config.stable_passes && extent_stable >= self.config.stable_extent_passes {
                break;
            }
        }

        info!("Finished scrolling after {passes} passes, {count} segments loaded");

        // Verification pass: top, then bottom
        self.page.scroll_to(&container, 0.0).await?;
        sleep(self.config.step_settle).await;
        self.scroll_to_bottom(&container, self.config.final_settle).await?;

        Ok(count)
    }

    async fn scroll_to_bottom(&self, container: &NodeRef, settle: Duration) -> Result<(), ExtractError> {
        let height = self.page.scroll_height(container).await?;
        self.page.scroll_to(container, height).await?;
        sleep(settle).await;
        Ok(())
    }

    /// Best effort; failures are logged, never returned.
    async fn close(&self) {
        let markup = match self.page.snapshot().await {
            Ok(m) => m,
            Err(e) => {
                warn!("Could not read page to close transcript panel: {e}");
                return;
            }
        };

        let target = locate::find_first(&markup, locate::CLOSE_TRIGGERS)
            .or_else(|| locate::find_first(&markup, locate::TRANSCRIPT_TRIGGERS));
        match target {
            Some(node) => {
                if let Err(e) = self.page.click(&node).await {
                    warn!("Closing transcript panel failed: {e}");
                }
            }
            None => warn!("No control found to close the transcript panel"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::fake::{FakePage, Trigger};
    use super::*;

    fn quick() -> PanelConfig {
        PanelConfig {
            render_timeout: Duration::from_millis(100),
            ..PanelConfig::immediate()
        }
    }

    fn numbered(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("{}:{:02} line {i}", i / 60, i % 60)).collect()
    }

    #[tokio::test]
    async fn test_extract_direct_trigger() {
        let page = FakePage::with_segments(Trigger::Direct, &["0:05 hello", "0:12 there", "1:20 world"]);
        let config = quick();
        let segments = PanelExtractor::new(&page, &config).extract().await.unwrap();

        assert_eq!(
            segments,
            vec![
                RawSegment::new(Some(5.0), None, "hello"),
                RawSegment::new(Some(12.0), None, "there"),
                RawSegment::new(Some(80.0), None, "world"),
            ]
        );
        assert!(!page.panel_open(), "panel should be closed afterwards");
        assert_eq!(page.clicks(), vec!["show transcript", "close transcript"]);
    }

    #[tokio::test]
    async fn test_extract_through_overflow_menu() {
        let page = FakePage::with_segments(Trigger::InMenu, &["0:01 a", "0:02 b"]);
        let config = quick();
        let segments = PanelExtractor::new(&page, &config).extract().await.unwrap();

        assert_eq!(segments.len(), 2);
        assert_eq!(page.clicks(), vec!["more actions", "open transcript", "close transcript"]);
        assert!(!page.menu_open());
    }

    #[tokio::test]
    async fn test_menu_without_transcript_is_closed_again() {
        let page = FakePage::with_segments(Trigger::MenuWithoutTranscript, &["0:01 never shown"]);
        let config = quick();
        let err = PanelExtractor::new(&page, &config).extract().await.unwrap_err();

        assert!(matches!(err, ExtractError::TranscriptUnavailable(_)));
        assert_eq!(page.clicks(), vec!["more actions", "more actions"]);
        assert!(!page.menu_open());
        assert!(!page.panel_open());
    }

    #[tokio::test]
    async fn test_extract_scrolls_until_everything_loaded() {
        let page = FakePage::new(Trigger::Direct, numbered(130), 20, 20);
        let config = quick();
        let segments = PanelExtractor::new(&page, &config).extract().await.unwrap();

        assert_eq!(segments.len(), 130);
        assert_eq!(segments[129].text, "line 129");
        assert_eq!(segments[129].start, Some(129.0));
    }

    #[tokio::test]
    async fn test_scroll_is_bounded_on_endless_page() {
        let page = FakePage::new(Trigger::Direct, numbered(100_000), 1, 1);
        let config = PanelConfig {
            max_passes: 3,
            ..quick()
        };
        let segments = PanelExtractor::new(&page, &config).extract().await.unwrap();

        assert!(segments.len() > 1);
        assert!(segments.len() < 100);
    }

    #[tokio::test]
    async fn test_no_trigger_is_unavailable() {
        let page = FakePage::with_segments(Trigger::Absent, &["0:01 never shown"]);
        let config = quick();
        let err = PanelExtractor::new(&page, &config).extract().await.unwrap_err();

        assert!(matches!(err, ExtractError::TranscriptUnavailable(_)));
        assert!(page.clicks().is_empty());
    }

    #[tokio::test]
    async fn test_render_timeout_closes_panel() {
        let page = FakePage::with_segments(Trigger::Direct, &[]);
        let config = quick();
        let err = PanelExtractor::new(&page, &config).extract().await.unwrap_err();

        assert!(matches!(err, ExtractError::Timeout { .. }));
        assert!(!page.panel_open());
    }

    #[tokio::test]
    async fn test_static_page_with_expanded_panel() {
        let page = StaticPage::new(
            r#"<button aria-label="Show transcript">t</button>
            <div id="transcript-scrollbox">
                <div class="transcript-segment">0:00 saved</div>
                <div class="transcript-segment">0:04 page</div>
            </div>"#,
        );
        let config = PanelConfig::immediate();
        let segments = PanelExtractor::new(&page, &config).extract().await.unwrap();

        assert_eq!(segments.len(), 2);
        assert_eq!(segments[1].start, Some(4.0));
    }
}
