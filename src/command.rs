//! Text commands
//!
//! A command is a message whose first word is the configured prefix:
//!
//! ```text
//! `atc                 join the author's voice channel
//! `atc join            same
//! `atc voice [name]    switch speech provider (admin)
//! `atc shutdown        stop the fleet (admin)
//! ```

use std::time::Duration;

use mini_moka::sync::Cache;

use crate::config::DEFAULT_VOICE_NAME;

/// How long a handled message id is remembered
const SEEN_TTL: Duration = Duration::from_secs(300);

/// Message ids remembered at once
const SEEN_CAPACITY: u64 = 2000;

/// A parsed command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Bring a worker into the author's voice channel
    Join,
    /// Switch every worker to the named speech provider
    Voice(String),
    /// Stop the fleet
    Shutdown,
}

impl Command {
    /// Whether only admins may run this command
    #[must_use]
    pub const fn requires_admin(&self) -> bool {
        matches!(self, Self::Voice(_) | Self::Shutdown)
    }
}

/// Parse `content` as a command, or `None` if it isn't one
///
/// Unknown sub-commands fall back to [`Command::Join`].
#[must_use]
pub fn parse(prefix: &str, content: &str) -> Option<Command> {
    let mut args = content.split_whitespace();
    if args.next()? != prefix {
        return None;
    }

    let command = match args.next().map(str::to_lowercase).as_deref() {
        Some("shutdown") => Command::Shutdown,
        Some("voice") => Command::Voice(
            args.next()
                .map_or_else(|| DEFAULT_VOICE_NAME.to_string(), str::to_lowercase),
        ),
        _ => Command::Join,
    };

    Some(command)
}

/// Message ids some worker has already handled
///
/// Every worker in a guild is delivered the same message, so without this
/// a command would run once per worker.
#[derive(Clone)]
pub struct CommandDedup {
    seen: Cache<u64, ()>,
}

impl Default for CommandDedup {
    fn default() -> Self {
        Self::with_ttl(SEEN_TTL)
    }
}

impl CommandDedup {
    /// Remember message ids for `ttl`
    #[must_use]
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            seen: Cache::builder()
                .max_capacity(SEEN_CAPACITY)
                .time_to_live(ttl)
                .build(),
        }
    }

    /// Claim `message_id` for the caller
    ///
    /// `false` means this delivery is the first and should be handled.
    pub fn is_duplicate(&self, message_id: u64) -> bool {
        if self.seen.contains_key(&message_id) {
            return true;
        }
        self.seen.insert(message_id, ());
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PREFIX: &str = "`atc";

    #[test]
    fn bare_prefix_is_join() {
        assert_eq!(parse(PREFIX, "`atc"), Some(Command::Join));
        assert_eq!(parse(PREFIX, "  `atc   join "), Some(Command::Join));
        assert_eq!(parse(PREFIX, "`atc dance"), Some(Command::Join));
    }

    #[test]
    fn other_messages_are_not_commands() {
        assert_eq!(parse(PREFIX, "hello `atc"), None);
        assert_eq!(parse(PREFIX, ""), None);
        assert_eq!(parse(PREFIX, "`atcjoin"), None);
    }

    #[test]
    fn voice_defaults_to_festival() {
        assert_eq!(
            parse(PREFIX, "`atc voice"),
            Some(Command::Voice("festival".to_string()))
        );
        assert_eq!(
            parse(PREFIX, "`atc VOICE Pico"),
            Some(Command::Voice("pico".to_string()))
        );
    }

    #[test]
    fn shutdown_is_case_insensitive() {
        assert_eq!(parse(PREFIX, "`atc Shutdown"), Some(Command::Shutdown));
    }

    #[test]
    fn admin_commands() {
        assert!(Command::Shutdown.requires_admin());
        assert!(Command::Voice("gtts".to_string()).requires_admin());
        assert!(!Command::Join.requires_admin());
    }

    #[test]
    fn second_delivery_is_duplicate() {
        let dedup = CommandDedup::default();
        assert!(!dedup.is_duplicate(1));
        assert!(dedup.is_duplicate(1));
        assert!(!dedup.is_duplicate(2));
        assert!(dedup.is_duplicate(2));
    }

    #[test]
    fn ids_are_forgotten_after_ttl() {
        let dedup = CommandDedup::with_ttl(Duration::from_millis(20));
        assert!(!dedup.is_duplicate(1));
        std::thread::sleep(Duration::from_millis(60));
        assert!(!dedup.is_duplicate(1));
    }

    #[test]
    fn clones_share_what_they_have_seen() {
        let dedup = CommandDedup::default();
        let other = dedup.clone();
        assert!(!dedup.is_duplicate(9));
        assert!(other.is_duplicate(9));
    }
}
