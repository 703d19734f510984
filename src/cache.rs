//! Per-session transcript cache with in-flight de-duplication.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use log::debug;
use tokio::sync::watch;

use crate::{Transcript, TranscriptOutcome};

type Slot = watch::Receiver<Option<TranscriptOutcome>>;

#[derive(Default)]
struct Inner {
    current: Option<String>,
    generation: u64,
    next_token: u64,
    done: HashMap<String, Arc<Transcript>>,
    pending: HashMap<String, (u64, Slot)>,
}

/// What a caller should do for a video id
pub enum Claim<'a> {
    /// Already extracted this session
    Hit(Arc<Transcript>),
    /// Another caller is extracting it; wait with [`wait`]
    Wait(Slot),
    /// The caller must extract it and report back through the guard
    Lead(Pending<'a>),
}

/// Cache of extracted transcripts keyed by video id.
///
/// Only successes are stored. Failures are handed to callers already waiting
/// on the same id and then forgotten, so a later request tries again.
#[derive(Default)]
pub struct SessionCache {
    inner: Mutex<Inner>,
}

impl SessionCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panic while holding the lock leaves the maps consistent
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn get(&self, video_id: &str) -> Option<Arc<Transcript>> {
        self.lock().done.get(video_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().done.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Look up `video_id`, joining an extraction already in flight or
    /// claiming the extraction for the caller.
    pub fn claim(&self, video_id: &str) -> Claim<'_> {
        let mut inner = self.lock();

        if let Some(t) = inner.done.get(video_id) {
            debug!("Cache hit for {video_id}");
            return Claim::Hit(Arc::clone(t));
        }

        if let Some((_, rx)) = inner.pending.get(video_id) {
            // A closed channel means the leader was dropped; take over
            if rx.has_changed().is_ok() {
                debug!("Extraction for {video_id} already in flight, waiting");
                return Claim::Wait(rx.clone());
            }
        }

        let (tx, rx) = watch::channel(None);
        inner.next_token += 1;
        let token = inner.next_token;
        inner.pending.insert(video_id.to_string(), (token, rx));
        Claim::Lead(Pending {
            cache: self,
            video_id: video_id.to_string(),
            generation: inner.generation,
            token,
            tx,
        })
    }

    /// Record that the page now shows `video_id`. Entries for any other
    /// video are dropped.
    pub fn navigate_to(&self, video_id: &str) {
        let mut inner = self.lock();
        if inner.current.as_deref() == Some(video_id) {
            return;
        }
        debug!("Navigated to {video_id}, clearing transcript cache");
        inner.done.retain(|id, _| id == video_id);
        inner.pending.retain(|id, _| id == video_id);
        inner.generation += 1;
        inner.current = Some(video_id.to_string());
    }

    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.done.clear();
        inner.pending.clear();
        inner.generation += 1;
    }
}

/// Guard held by the caller that claimed an extraction. Dropping it without
/// calling [`Pending::complete`] releases any waiters to run their own.
pub struct Pending<'a> {
    cache: &'a SessionCache,
    video_id: String,
    generation: u64,
    token: u64,
    tx: watch::Sender<Option<TranscriptOutcome>>,
}

impl Pending<'_> {
    /// Publish the outcome. Successes are stored before waiters are woken.
    pub fn complete(self, outcome: &TranscriptOutcome) {
        {
            let mut inner = self.cache.lock();
            if inner.generation == self.generation {
                if let Some(t) = outcome.transcript() {
                    inner.done.insert(self.video_id.clone(), Arc::clone(t));
                }
            } else {
                debug!("Cache cleared while extracting {}, not storing", self.video_id);
            }
        }
        self.tx.send_replace(Some(outcome.clone()));
    }
}

impl Drop for Pending<'_> {
    fn drop(&mut self) {
        let mut inner = self.cache.lock();
        if inner.pending.get(&self.video_id).is_some_and(|(token, _)| *token == self.token) {
            inner.pending.remove(&self.video_id);
        }
    }
}

/// Wait for the leading caller's outcome. `None` when the leader went away
/// without one.
pub async fn wait(mut slot: Slot) -> Option<TranscriptOutcome> {
    match slot.wait_for(Option::is_some).await {
        Ok(value) => value.clone(),
        Err(_) => None,
    }
}
