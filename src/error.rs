//! Error types for the announcer fleet

use thiserror::Error;

/// Result type alias for fleet operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the announcer fleet
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Speech synthesis error
    #[error("speech error: {0}")]
    Speech(String),

    /// Voice connection could not be established or was lost
    #[error("connection error: {0}")]
    Connection(String),

    /// The transport refused to start playback because audio is already playing
    #[error("playback busy: audio is already playing")]
    PlaybackBusy,

    /// Operation needs a voice connection but the worker has none
    #[error("not connected to a voice channel")]
    NotConnected,

    /// Text destination does not resolve or is not a text channel
    #[error("invalid text channel: {0}")]
    InvalidTextChannel(String),

    /// Discord gateway or REST error
    #[error("discord error: {0}")]
    Discord(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization error
    #[error("toml serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),
}

impl From<serenity::Error> for Error {
    fn from(e: serenity::Error) -> Self {
        Self::Discord(e.to_string())
    }
}
