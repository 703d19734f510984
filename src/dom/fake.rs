//! In-memory watch page that lazy-loads transcript segments as it is scrolled.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use scraper::Html;
use tokio::sync::watch;

use super::locate;
use super::page::{NodeRef, TranscriptPage};
use crate::error::PageError;

const SEGMENT_HEIGHT: f64 = 40.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// "Show transcript" button visible in the description
    Direct,
    /// Only reachable through the "More actions" menu
    InMenu,
    /// "More actions" menu without a transcript item
    MenuWithoutTranscript,
    /// No way to open a transcript
    Absent,
}

#[derive(Debug, Default)]
struct State {
    menu_open: bool,
    panel_open: bool,
    loaded: usize,
    clicks: Vec<String>,
}

pub struct FakePage {
    trigger: Trigger,
    segments: Vec<String>,
    initial: usize,
    batch: usize,
    video_id: Option<String>,
    state: Mutex<State>,
    changes: watch::Sender<u64>,
    pub snapshots: AtomicUsize,
}

impl FakePage {
    /// A page whose panel renders `segments` (inner text of each node),
    /// `initial` at first and `batch` more per scroll to the bottom.
    pub fn new(trigger: Trigger, segments: Vec<String>, initial: usize, batch: usize) -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            trigger,
            segments,
            initial,
            batch,
            video_id: None,
            state: Mutex::new(State::default()),
            changes,
            snapshots: AtomicUsize::new(0),
        }
    }

    /// Every segment renders as soon as the panel opens
    pub fn with_segments(trigger: Trigger, segments: &[&str]) -> Self {
        let segments: Vec<String> = segments.iter().map(|s| s.to_string()).collect();
        let n = segments.len();
        Self::new(trigger, segments, n, n)
    }

    /// Render a canonical link naming the video the page shows
    pub fn showing(mut self, video_id: &str) -> Self {
        self.video_id = Some(video_id.to_string());
        self
    }

    pub fn menu_open(&self) -> bool {
        self.state.lock().unwrap().menu_open
    }

    pub fn panel_open(&self) -> bool {
        self.state.lock().unwrap().panel_open
    }

    pub fn clicks(&self) -> Vec<String> {
        self.state.lock().unwrap().clicks.clone()
    }

    pub fn snapshot_count(&self) -> usize {
        self.snapshots.load(Ordering::SeqCst)
    }

    fn bump(&self) {
        self.changes.send_modify(|v| *v += 1);
    }

    fn render(&self) -> String {
        let state = self.state.lock().unwrap();
        let mut html = String::from("<html><head>");
        if let Some(id) = &self.video_id {
            html.push_str(&format!(r#"<link rel="canonical" href="https://www.youtube.com/watch?v={id}">"#));
        }
        html.push_str("</head><body><div id=\"description\">");

        match self.trigger {
            Trigger::Direct => html.push_str(r#"<button aria-label="Show transcript">Show transcript</button>"#),
            Trigger::InMenu => {
                html.push_str(r#"<button aria-label="More actions">...</button>"#);
                if state.menu_open {
                    html.push_str(
                        r#"<ytd-menu-service-item-renderer aria-label="Open transcript">Open transcript</ytd-menu-service-item-renderer>"#,
                    );
                }
            }
            Trigger::MenuWithoutTranscript => {
                html.push_str(r#"<button aria-label="More actions">...</button>"#);
                if state.menu_open {
                    html.push_str(r#"<ytd-menu-service-item-renderer aria-label="Report">Report</ytd-menu-service-item-renderer>"#);
                }
            }
            Trigger::Absent => html.push_str(r#"<button aria-label="Like">Like</button>"#),
        }
        html.push_str("</div>");

        if state.panel_open {
            html.push_str(r#"<button aria-label="Close transcript">X</button><div id="transcript-scrollbox">"#);
            for text in self.segments.iter().take(state.loaded) {
                html.push_str(&format!(r#"<div data-testid="transcript-segment">{text}</div>"#));
            }
            html.push_str("</div>");
        }

        html.push_str("</body></html>");
        html
    }

    /// Read back what a node points at, the way a browser would resolve it
    fn describe(&self, node: &NodeRef) -> Option<(String, String)> {
        let doc = Html::parse_document(&self.render());
        let el = locate::resolve(&doc, node)?;
        let label = el.value().attr("aria-label").unwrap_or_default().to_lowercase();
        let id = el.value().attr("id").unwrap_or_default().to_string();
        Some((label, id))
    }
}

#[async_trait]
impl TranscriptPage for FakePage {
    async fn snapshot(&self) -> Result<String, PageError> {
        self.snapshots.fetch_add(1, Ordering::SeqCst);
        Ok(self.render())
    }

    async fn click(&self, node: &NodeRef) -> Result<(), PageError> {
        let (label, _) = self
            .describe(node)
            .ok_or_else(|| PageError(format!("no element at {node}")))?;

        {
            let mut state = self.state.lock().unwrap();
            state.clicks.push(label.clone());
            if label.contains("more actions") {
                state.menu_open = !state.menu_open;
            } else if label.contains("close transcript") {
                state.panel_open = false;
            } else if label.contains("transcript") {
                state.panel_open = !state.panel_open;
                state.menu_open = false;
                if state.panel_open {
                    state.loaded = self.initial.min(self.segments.len());
                }
            }
        }
        self.bump();
        Ok(())
    }

    async fn scroll_to(&self, node: &NodeRef, offset: f64) -> Result<(), PageError> {
        let (_, id) = self
            .describe(node)
            .ok_or_else(|| PageError(format!("no element at {node}")))?;
        if id != "transcript-scrollbox" {
            return Ok(());
        }

        let grew = {
            let mut state = self.state.lock().unwrap();
            let bottom = state.loaded as f64 * SEGMENT_HEIGHT;
            if offset >= bottom && state.loaded < self.segments.len() {
                state.loaded = (state.loaded + self.batch).min(self.segments.len());
                true
            } else {
                false
            }
        };
        if grew {
            self.bump();
        }
        Ok(())
    }

    async fn scroll_height(&self, _node: &NodeRef) -> Result<f64, PageError> {
        Ok(self.state.lock().unwrap().loaded as f64 * SEGMENT_HEIGHT)
    }

    fn mutations(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }
}
