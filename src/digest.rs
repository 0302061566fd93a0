//! Pending digest records and their review lifecycle.
//!
//! A digest is generated, parked for human review, and then either
//! approved (possibly after an edit), or dismissed. Approved and Dismissed
//! are terminal; records reaching them are evicted from the store.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::compose::ComposedDigest;

/// Where a review message landed, so later notices can thread or update it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRef {
    pub channel: String,
    pub ts: String,
}

/// Review lifecycle of a pending digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewState {
    /// Awaiting a reviewer decision on the generated text.
    Pending,
    /// A reviewer replaced the text; still awaiting approval.
    Edited { text: String },
    /// Published to the target channel. Terminal.
    Approved,
    /// Discarded without publishing. Terminal.
    Dismissed,
}

#[derive(Debug, Clone)]
pub struct DigestRecord {
    pub id: String,
    /// The structured digest, kept so an unedited approval can publish rich
    /// blocks instead of the flat prerender.
    pub digest: ComposedDigest,
    /// Flat mrkdwn prerender, computed at creation so the edit modal opens
    /// without re-rendering.
    pub rendered_text: String,
    pub state: ReviewState,
    pub created_at: DateTime<Utc>,
    /// The review message carrying the action buttons, once posted.
    pub review_message: Option<MessageRef>,
}

impl DigestRecord {
    pub fn new(digest: ComposedDigest, rendered_text: String) -> Self {
        DigestRecord {
            id: short_id(),
            digest,
            rendered_text,
            state: ReviewState::Pending,
            created_at: Utc::now(),
            review_message: None,
        }
    }

    /// The text that would be published right now: the reviewer's edit if
    /// one exists, otherwise the prerender.
    pub fn current_text(&self) -> &str {
        match &self.state {
            ReviewState::Edited { text } => text,
            _ => &self.rendered_text,
        }
    }

    pub fn was_edited(&self) -> bool {
        matches!(self.state, ReviewState::Edited { .. })
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.state, ReviewState::Approved | ReviewState::Dismissed)
    }

    /// Replace the reviewable text. Repeatable until a terminal transition;
    /// callers evict terminal records so this never observes one.
    pub fn store_edit(&mut self, text: String) {
        self.state = ReviewState::Edited { text };
    }

    pub fn approve(&mut self) {
        self.state = ReviewState::Approved;
    }

    pub fn dismiss(&mut self) {
        self.state = ReviewState::Dismissed;
    }
}

/// Short opaque id used in action payloads and log lines.
fn short_id() -> String {
    let full = Uuid::new_v4().simple().to_string();
    full[..8].to_string()
}
