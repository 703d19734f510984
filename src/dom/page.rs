use std::path::Path;

use async_trait::async_trait;
use tokio::sync::watch;

use crate::error::PageError;

/// Address of an element on the live page: the `n`th match of a CSS selector,
/// counted over the whole document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeRef {
    pub selector: String,
    pub index: usize,
}

impl NodeRef {
    pub fn new(selector: impl Into<String>, index: usize) -> Self {
        Self {
            selector: selector.into(),
            index,
        }
    }
}

impl std::fmt::Display for NodeRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}[{}]", self.selector, self.index)
    }
}

/// Handle on a rendered watch page.
///
/// Implemented by whatever drives the browser. The page is externally owned
/// and mutable; callers serialize access to it.
#[async_trait]
pub trait TranscriptPage: Send + Sync {
    /// Current document markup
    async fn snapshot(&self) -> Result<String, PageError>;

    async fn click(&self, node: &NodeRef) -> Result<(), PageError>;

    /// Set the scroll offset of a scrollable element
    async fn scroll_to(&self, node: &NodeRef, offset: f64) -> Result<(), PageError>;

    /// Total scrollable extent of an element
    async fn scroll_height(&self, node: &NodeRef) -> Result<f64, PageError>;

    /// Change notifications for the document. The value is bumped on every
    /// observed mutation; dropping the receiver disconnects the observer.
    fn mutations(&self) -> watch::Receiver<u64>;
}

/// A saved watch page. Clicks and scrolls are accepted and ignored, so the
/// transcript panel must already be expanded in the saved markup.
pub struct StaticPage {
    markup: String,
    changes: watch::Sender<u64>,
}

impl StaticPage {
    pub fn new(markup: impl Into<String>) -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            markup: markup.into(),
            changes,
        }
    }

    pub fn from_file(path: &Path) -> std::io::Result<Self> {
        Ok(Self::new(std::fs::read_to_string(path)?))
    }
}

#[async_trait]
impl TranscriptPage for StaticPage {
    async fn snapshot(&self) -> Result<String, PageError> {
        Ok(self.markup.clone())
    }

    async fn click(&self, _node: &NodeRef) -> Result<(), PageError> {
        Ok(())
    }

    async fn scroll_to(&self, _node: &NodeRef, _offset: f64) -> Result<(), PageError> {
        Ok(())
    }

    async fn scroll_height(&self, _node: &NodeRef) -> Result<f64, PageError> {
        Ok(0.0)
    }

    fn mutations(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }
}
