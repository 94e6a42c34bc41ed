//! ATC - a fleet of voice-channel announcer bots
//!
//! Each configured bot token runs as a worker. A worker sits in one voice
//! channel and speaks "Welcome <name>" and "Goodbye <name>" as members come
//! and go. The fleet routes join requests to idle workers, retires workers
//! nobody is listening to and restarts them on a fresh session.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                 Discord (serenity)                   │
//! │   voice state updates  │  messages  │  songbird      │
//! └────────────────────┬────────────────────────────────┘
//!                      │ FleetEvent
//! ┌────────────────────▼────────────────────────────────┐
//! │                   FleetManager                       │
//! │   selection  │  priority decay  │  commands  │ shed  │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                     Worker                           │
//! │   AnnouncementQueue  │  debounced drain  │  speech   │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod announce;
pub mod command;
pub mod config;
pub mod discord;
pub mod error;
pub mod fleet;
pub mod shed;
pub mod speech;
pub mod transport;
pub mod worker;

pub use announce::{AnnouncementEvent, AnnouncementKind, AnnouncementQueue};
pub use command::{Command, CommandDedup};
pub use config::Config;
pub use discord::{DiscordConnection, DiscordConnector};
pub use error::{Error, Result};
pub use fleet::{FleetManager, JoinOutcome};
pub use shed::ShedPolicy;
pub use speech::{AudioClip, SpeechProvider, make_provider};
pub use transport::{
    Announce, ChannelRef, CommandMessage, Connection, Connector, FleetEvent, MembershipChange,
    Participant,
};
pub use worker::{DrainState, Worker};
