//! Contracts between the fleet and the voice platform
//!
//! The fleet never talks to the platform directly: each worker holds a
//! [`Connection`] opened by a [`Connector`], and the connection pushes
//! [`FleetEvent`]s into the fleet's event channel.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::Result;
use crate::speech::AudioClip;

/// Name spoken for automated members
pub const AUTOMATED_MEMBER_NAME: &str = "service droid";

/// A voice channel within a guild
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelRef {
    /// Guild the channel belongs to
    pub guild_id: u64,
    /// Channel id
    pub channel_id: u64,
}

impl ChannelRef {
    /// Refer to `channel_id` inside `guild_id`
    #[must_use]
    pub const fn new(guild_id: u64, channel_id: u64) -> Self {
        Self {
            guild_id,
            channel_id,
        }
    }
}

impl fmt::Display for ChannelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.guild_id, self.channel_id)
    }
}

/// A member present in a voice channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Participant {
    /// Platform user id
    pub user_id: u64,
    /// Bots and other automated accounts
    pub is_automated: bool,
}

/// Membership announcement derived from a voice state change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Announce {
    Join,
    Leave,
}

/// A member's voice state changed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipChange {
    /// Member whose state changed
    pub member_id: u64,
    /// Name to announce
    pub display_name: String,
    /// Channel before the change
    pub before: Option<ChannelRef>,
    /// Channel after the change
    pub after: Option<ChannelRef>,
    /// The member is the receiving worker itself
    pub is_self: bool,
    /// The member is a bot
    pub is_automated: bool,
}

impl MembershipChange {
    /// Whether the member actually changed channel (not a mute or deafen)
    #[must_use]
    pub fn moved(&self) -> bool {
        self.before != self.after
    }

    /// What to announce for a worker connected to `connected`
    #[must_use]
    pub fn announce_for(&self, connected: Option<ChannelRef>) -> Option<Announce> {
        let connected = connected?;
        if self.is_self || !self.moved() {
            return None;
        }

        if self.after == Some(connected) {
            Some(Announce::Join)
        } else if self.before == Some(connected) {
            Some(Announce::Leave)
        } else {
            None
        }
    }

    /// Name spoken in the announcement
    #[must_use]
    pub fn spoken_name(&self) -> &str {
        if self.is_automated {
            AUTOMATED_MEMBER_NAME
        } else {
            &self.display_name
        }
    }
}

/// A text message that may hold a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandMessage {
    /// Platform message id, identical for every worker that sees it
    pub message_id: u64,
    pub author_id: u64,
    pub content: String,
    /// Text channel the message was posted in
    pub text_channel_id: u64,
    /// Voice channel the author is in, if any
    pub author_voice: Option<ChannelRef>,
}

/// Notification delivered by a worker's connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FleetEvent {
    /// A member's voice state changed, as seen by `worker`
    Membership {
        worker: String,
        change: MembershipChange,
    },
    /// A message was posted, as seen by `worker`
    Command {
        worker: String,
        message: CommandMessage,
    },
}

/// One worker's session with the voice platform
#[async_trait]
pub trait Connection: Send + Sync {
    /// Voice channel currently joined, if any
    fn connected_channel(&self) -> Option<ChannelRef>;

    /// Members currently in `channel`
    fn members(&self, channel: ChannelRef) -> Vec<Participant>;

    /// Join `channel`, moving away from any other voice channel
    ///
    /// # Errors
    ///
    /// Returns error if the voice connection cannot be established
    async fn connect(&self, channel: ChannelRef) -> Result<()>;

    /// Whether a clip is currently playing
    async fn is_playing(&self) -> bool;

    /// Start playing `clip`
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::PlaybackBusy`] if audio is already playing,
    /// [`crate::Error::NotConnected`] without a voice connection
    async fn play(&self, clip: &AudioClip) -> Result<()>;

    /// Post `text` to a text channel
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidTextChannel`] if `channel_id` does not
    /// resolve to a text channel
    async fn send_text(&self, channel_id: u64, text: &str) -> Result<()>;

    /// Log out, releasing voice and gateway resources
    async fn close(&self);

    /// Whether the session has ended
    fn is_closed(&self) -> bool;

    /// Resolves once the session has ended
    async fn closed(&self);
}

/// Opens worker sessions
#[async_trait]
pub trait Connector: Send + Sync {
    /// Log in with `token`, delivering events tagged with `worker`
    ///
    /// # Errors
    ///
    /// Returns error if the session cannot be started
    async fn open(
        &self,
        worker: &str,
        token: &str,
        events: mpsc::Sender<FleetEvent>,
    ) -> Result<Arc<dyn Connection>>;
}
