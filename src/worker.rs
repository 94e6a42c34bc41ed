//! A single announcer worker
//!
//! A worker owns one platform [`Connection`], an [`AnnouncementQueue`] and a
//! priority score that only the fleet mutates. Membership changes in the
//! worker's channel are queued and spoken by a drain task:
//!
//! ```text
//! Idle ──event──▶ Debouncing ──delay──▶ Draining ──queue empty──▶ Idle
//!                                           │
//!                                           └──no humans left──▶ Abandoned
//! ```
//!
//! The debounce delay applies once per trigger. Events arriving while the
//! drain task is running are coalesced into the queue and spoken without a
//! further delay.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use tokio::task::JoinHandle;

use crate::announce::{AnnouncementEvent, AnnouncementQueue};
use crate::config::Timing;
use crate::speech::{AudioClip, SpeechProvider};
use crate::transport::{Announce, ChannelRef, Connection, MembershipChange};
use crate::{Error, Result};

/// Phrase spoken when a worker joins a channel
pub const SELF_ANNOUNCEMENT: &str = "ATC Online";

/// Drain state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainState {
    /// Nothing to say
    Idle,
    /// Waiting out the delay after a triggering event
    Debouncing,
    /// Speaking queued entries
    Draining,
    /// Queue discarded because nobody was left to hear it
    Abandoned,
}

/// One connection to the voice platform plus its announcement pipeline
pub struct Worker {
    id: String,
    priority: AtomicI64,
    queue: Mutex<AnnouncementQueue>,
    connection: Arc<dyn Connection>,
    speech: RwLock<Arc<dyn SpeechProvider>>,
    timing: Timing,
    state: Mutex<DrainState>,
    draining: AtomicBool,
    closed: AtomicBool,
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("id", &self.id)
            .field("priority", &self.priority())
            .field("state", &self.drain_state())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl Worker {
    /// Create a worker around an open connection
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        priority: i64,
        connection: Arc<dyn Connection>,
        speech: Arc<dyn SpeechProvider>,
        timing: Timing,
    ) -> Self {
        Self {
            id: id.into(),
            priority: AtomicI64::new(priority),
            queue: Mutex::new(AnnouncementQueue::new()),
            connection,
            speech: RwLock::new(speech),
            timing,
            state: Mutex::new(DrainState::Idle),
            draining: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    /// Worker identity within the fleet
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Current selection priority
    #[must_use]
    pub fn priority(&self) -> i64 {
        self.priority.load(Ordering::Acquire)
    }

    /// Lower the priority by one; only the fleet calls this
    pub(crate) fn decay_priority(&self) -> i64 {
        self.priority.fetch_sub(1, Ordering::AcqRel) - 1
    }

    /// Underlying platform connection
    #[must_use]
    pub fn connection(&self) -> &Arc<dyn Connection> {
        &self.connection
    }

    /// Voice channel the worker is in, if any
    #[must_use]
    pub fn connected_channel(&self) -> Option<ChannelRef> {
        self.connection.connected_channel()
    }

    /// Whether the worker is in exactly `channel`
    #[must_use]
    pub fn is_connected_to(&self, channel: ChannelRef) -> bool {
        self.connected_channel() == Some(channel)
    }

    /// Whether `channel` holds at least one non-automated member
    #[must_use]
    pub fn has_human_listener(&self, channel: ChannelRef) -> bool {
        self.connection
            .members(channel)
            .iter()
            .any(|m| !m.is_automated)
    }

    /// Connected, with at least one human in the channel
    #[must_use]
    pub fn check_is_active(&self) -> bool {
        self.connected_channel()
            .is_some_and(|channel| self.has_human_listener(channel))
    }

    /// Speech provider used for announcements
    #[must_use]
    pub fn speech(&self) -> Arc<dyn SpeechProvider> {
        Arc::clone(&self.speech.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Swap the speech provider
    pub fn set_speech(&self, speech: Arc<dyn SpeechProvider>) {
        *self.speech.write().unwrap_or_else(PoisonError::into_inner) = speech;
    }

    /// Current drain state
    #[must_use]
    pub fn drain_state(&self) -> DrainState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether a drain task is scheduled or running
    #[must_use]
    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::Acquire)
    }

    fn set_state(&self, state: DrainState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    fn queue(&self) -> MutexGuard<'_, AnnouncementQueue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of the pending announcements, oldest first
    #[must_use]
    pub fn pending(&self) -> Vec<AnnouncementEvent> {
        self.queue().iter().cloned().collect()
    }

    fn peek_front(&self) -> Option<AnnouncementEvent> {
        self.queue().peek_front().cloned()
    }

    /// Whether the session has ended or the worker was shut down
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire) || self.connection.is_closed()
    }

    /// Shut the worker down: drop pending announcements and log out
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        self.queue().clear_all();
        self.connection.close().await;
        tracing::info!(worker = %self.id, "worker closed");
    }

    /// React to a membership change seen by this worker
    ///
    /// Queues a welcome or goodbye when the change concerns the worker's
    /// channel and starts draining. Returns what was announced.
    pub fn handle_membership(self: &Arc<Self>, change: &MembershipChange) -> Option<Announce> {
        if self.is_closed() {
            return None;
        }

        if change.is_self {
            if change.moved() {
                // Announcements for the old channel are stale
                self.queue().clear_all();
            }
            tracing::debug!(worker = %self.id, "not greeting self");
            return None;
        }

        let announce = change.announce_for(self.connected_channel())?;
        let name = change.spoken_name();
        match announce {
            Announce::Join => self.queue().add_welcome(name),
            Announce::Leave => self.queue().add_goodbye(name),
        }

        tracing::debug!(worker = %self.id, member = name, ?announce, "queued announcement");
        self.trigger_drain();
        Some(announce)
    }

    /// Start the drain task unless one is already running
    ///
    /// The task waits the debounce delay, then speaks until the queue is
    /// empty. Returns `None` if a drain was already in progress.
    pub fn trigger_drain(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        if self.is_closed() || self.draining.swap(true, Ordering::AcqRel) {
            return None;
        }

        self.set_state(DrainState::Debouncing);
        let worker = Arc::clone(self);

        Some(tokio::spawn(async move {
            tokio::time::sleep(worker.timing.debounce).await;

            loop {
                let outcome = worker.drain().await;
                worker.set_state(outcome);
                worker.draining.store(false, Ordering::Release);

                // An entry queued after the loop saw an empty queue would
                // otherwise wait for the next event
                let settled = worker.is_closed() || worker.queue().is_empty();
                if settled || worker.draining.swap(true, Ordering::AcqRel) {
                    break;
                }
            }
        }))
    }

    /// Speak queued entries until the queue is empty
    ///
    /// Each entry is synthesized once; the clip is reused while playback is
    /// refused. Temporary clips are discarded once the connection has
    /// finished playing them, or as soon as their entry is dropped.
    async fn drain(&self) -> DrainState {
        self.set_state(DrainState::Draining);

        let mut prepared: Option<(AnnouncementEvent, AudioClip)> = None;
        let mut playing: Option<AudioClip> = None;

        let outcome = loop {
            if self.peek_front().is_none() || !self.wait_until_quiet().await {
                break DrainState::Idle;
            }
            if let Some(clip) = playing.take() {
                clip.discard().await;
            }

            // The front may have been coalesced away while audio was playing
            let Some(event) = self.peek_front() else {
                break DrainState::Idle;
            };

            let listening = self
                .connected_channel()
                .filter(|channel| self.has_human_listener(*channel));
            let Some(channel) = listening else {
                let dropped = {
                    let mut queue = self.queue();
                    let n = queue.len();
                    queue.clear_all();
                    n
                };
                tracing::info!(
                    worker = %self.id,
                    dropped,
                    "clearing queue since nobody is there to hear anything"
                );
                break DrainState::Abandoned;
            };

            let text = event.text();
            let clip = match prepared.take() {
                Some((for_event, clip)) if for_event == event => clip,
                stale => {
                    if let Some((_, clip)) = stale {
                        clip.discard().await;
                    }
                    match self.speech().synthesize(&text).await {
                        Ok(clip) => clip,
                        Err(e) => {
                            tracing::warn!(worker = %self.id, error = %e, text = %text, "synthesis failed, skipping");
                            self.queue().pop_front_if(&event);
                            continue;
                        }
                    }
                }
            };

            if self.peek_front().as_ref() != Some(&event) {
                clip.discard().await;
                continue;
            }

            match self.connection.play(&clip).await {
                Ok(()) => {
                    tracing::info!(worker = %self.id, channel = %channel, text = %text, "announced");
                    self.queue().pop_front_if(&event);
                    playing = Some(clip);
                }
                Err(Error::PlaybackBusy) => {
                    tracing::debug!(worker = %self.id, text = %text, "playback busy, retrying");
                    prepared = Some((event, clip));
                    tokio::time::sleep(self.timing.retry).await;
                }
                Err(e) => {
                    tracing::warn!(worker = %self.id, error = %e, text = %text, "playback failed, skipping");
                    self.queue().pop_front_if(&event);
                    clip.discard().await;
                }
            }
        };

        if let Some((_, clip)) = prepared {
            clip.discard().await;
        }
        if let Some(clip) = playing {
            self.wait_until_quiet().await;
            clip.discard().await;
        }

        outcome
    }

    /// Poll until nothing is playing; `false` if the worker closed meanwhile
    async fn wait_until_quiet(&self) -> bool {
        while self.connection.is_playing().await {
            if self.is_closed() {
                return false;
            }
            tokio::time::sleep(self.timing.poll).await;
        }
        !self.is_closed()
    }

    /// Join `channel` unless already there
    ///
    /// Connection failures are logged and reported as `false`.
    pub async fn external_join_channel(&self, channel: ChannelRef) -> bool {
        if self.is_connected_to(channel) {
            return true;
        }

        match self.connection.connect(channel).await {
            Ok(()) => {
                tracing::info!(worker = %self.id, channel = %channel, "joined voice channel");
            }
            Err(e) => {
                tracing::warn!(worker = %self.id, channel = %channel, error = %e, "failed to join voice channel");
            }
        }

        self.is_connected_to(channel)
    }

    /// Speak [`SELF_ANNOUNCEMENT`] right away if connected in `channel`'s guild
    ///
    /// Best-effort: failures are logged and reported as `false`.
    pub async fn external_announce_self(&self, channel: ChannelRef) -> bool {
        let in_guild = self
            .connected_channel()
            .is_some_and(|c| c.guild_id == channel.guild_id);
        if !in_guild {
            return false;
        }

        let clip = match self.speech().synthesize(SELF_ANNOUNCEMENT).await {
            Ok(clip) => clip,
            Err(e) => {
                tracing::debug!(worker = %self.id, error = %e, "self announcement skipped");
                return false;
            }
        };

        if let Err(e) = self.connection.play(&clip).await {
            tracing::debug!(worker = %self.id, error = %e, "self announcement skipped");
            clip.discard().await;
            return false;
        }

        if clip.is_temporary() {
            let connection = Arc::clone(&self.connection);
            let poll = self.timing.poll;
            tokio::spawn(async move {
                while connection.is_playing().await && !connection.is_closed() {
                    tokio::time::sleep(poll).await;
                }
                clip.discard().await;
            });
        }

        true
    }

    /// Post `text` to a text channel
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTextChannel`] if the channel does not resolve
    pub async fn external_send_message(&self, channel_id: u64, text: &str) -> Result<()> {
        self.connection.send_text(channel_id, text).await
    }
}
