//! Coalescing announcement queue
//!
//! Each worker keeps an ordered queue of pending spoken events. A subject
//! has at most one pending event: queueing a welcome for someone whose
//! goodbye has not been spoken yet drops the goodbye (and vice versa), so a
//! quick leave-and-rejoin is announced once instead of twice.

use std::collections::VecDeque;
use std::fmt;

/// What is being announced about a subject
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnnouncementKind {
    /// Subject joined the channel
    Welcome,
    /// Subject left the channel
    Goodbye,
}

impl AnnouncementKind {
    /// Phrase spoken before the subject
    #[must_use]
    pub const fn phrase(self) -> &'static str {
        match self {
            Self::Welcome => "Welcome",
            Self::Goodbye => "Goodbye",
        }
    }
}

/// A pending announcement
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AnnouncementEvent {
    /// Welcome or goodbye
    pub kind: AnnouncementKind,
    /// Display name of the member being announced
    pub subject: String,
}

impl AnnouncementEvent {
    /// Create a welcome for `subject`
    #[must_use]
    pub fn welcome(subject: impl Into<String>) -> Self {
        Self {
            kind: AnnouncementKind::Welcome,
            subject: subject.into(),
        }
    }

    /// Create a goodbye for `subject`
    #[must_use]
    pub fn goodbye(subject: impl Into<String>) -> Self {
        Self {
            kind: AnnouncementKind::Goodbye,
            subject: subject.into(),
        }
    }

    /// Text to synthesize, e.g. "Welcome Alice"
    #[must_use]
    pub fn text(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for AnnouncementEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind.phrase(), self.subject)
    }
}

/// Ordered queue of pending announcements, one entry per subject at most
#[derive(Debug, Default, Clone)]
pub struct AnnouncementQueue {
    entries: VecDeque<AnnouncementEvent>,
}

impl AnnouncementQueue {
    /// Create an empty queue
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: VecDeque::new(),
        }
    }

    /// Queue a welcome, dropping any pending goodbye for the same subject
    pub fn add_welcome(&mut self, subject: &str) {
        self.push(AnnouncementEvent::welcome(subject));
    }

    /// Queue a goodbye, dropping any pending welcome for the same subject
    pub fn add_goodbye(&mut self, subject: &str) {
        self.push(AnnouncementEvent::goodbye(subject));
    }

    /// Queue `event` behind everything else after removing the subject's
    /// pending entry, if any
    pub fn push(&mut self, event: AnnouncementEvent) {
        self.entries.retain(|e| e.subject != event.subject);
        self.entries.push_back(event);
    }

    /// Oldest entry, without removing it
    #[must_use]
    pub fn peek_front(&self) -> Option<&AnnouncementEvent> {
        self.entries.front()
    }

    /// Remove and return the oldest entry
    pub fn pop_front(&mut self) -> Option<AnnouncementEvent> {
        self.entries.pop_front()
    }

    /// Remove the oldest entry only if it is still `expected`
    ///
    /// The drain loop speaks an entry across suspension points; if the entry
    /// was coalesced away in the meantime, whatever replaced the front must
    /// stay queued.
    pub fn pop_front_if(&mut self, expected: &AnnouncementEvent) -> bool {
        if self.entries.front() == Some(expected) {
            self.entries.pop_front();
            true
        } else {
            false
        }
    }

    /// Discard every pending entry
    pub fn clear_all(&mut self) {
        self.entries.clear();
    }

    /// Number of pending entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is pending
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate pending entries, oldest first
    pub fn iter(&self) -> impl Iterator<Item = &AnnouncementEvent> {
        self.entries.iter()
    }
}
