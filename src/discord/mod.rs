//! Discord backend using serenity for the gateway and songbird for voice
//!
//! Each worker logs in with its own bot token. Voice state updates and
//! messages are forwarded to the fleet; the fleet drives voice through
//! [`DiscordConnection`].

mod handler;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serenity::Client;
use serenity::all::{Cache, Channel, ChannelId, ChannelType, GatewayIntents, GuildId, Http, ShardManager};
use songbird::input::File;
use songbird::tracks::{PlayMode, TrackHandle};
use songbird::{SerenityInit, Songbird};
use tokio::sync::{mpsc, watch};

use self::handler::FleetHandler;
use crate::speech::AudioClip;
use crate::transport::{ChannelRef, Connection, Connector, FleetEvent, Participant};
use crate::{Error, Result};

/// Gateway intents a worker needs
///
/// `GUILD_MEMBERS` (privileged, enable it in the developer portal) fills the
/// member cache that tells bots from humans in a voice channel.
fn intents() -> GatewayIntents {
    GatewayIntents::GUILDS
        | GatewayIntents::GUILD_MEMBERS
        | GatewayIntents::GUILD_VOICE_STATES
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT
}

/// Opens one Discord client per worker token
#[derive(Debug, Default, Clone, Copy)]
pub struct DiscordConnector;

#[async_trait]
impl Connector for DiscordConnector {
    async fn open(
        &self,
        worker: &str,
        token: &str,
        events: mpsc::Sender<FleetEvent>,
    ) -> Result<Arc<dyn Connection>> {
        let songbird = Songbird::serenity();
        let voice = Arc::new(Mutex::new(None));
        let handler = FleetHandler::new(worker.to_string(), events, Arc::clone(&voice));

        let mut client = Client::builder(token, intents())
            .event_handler(handler)
            .register_songbird_with(Arc::clone(&songbird))
            .await?;

        let (closed_tx, closed_rx) = watch::channel(false);
        let connection = Arc::new(DiscordConnection {
            worker: worker.to_string(),
            http: Arc::clone(&client.http),
            cache: Arc::clone(&client.cache),
            shard_manager: Arc::clone(&client.shard_manager),
            songbird,
            voice,
            track: Mutex::new(None),
            closed: closed_rx,
        });

        let id = worker.to_string();
        tokio::spawn(async move {
            if let Err(e) = client.start().await {
                tracing::error!(worker = %id, error = %e, "discord client error");
            }
            closed_tx.send_replace(true);
        });

        tracing::info!(worker, "discord client started");
        Ok(connection)
    }
}

/// A worker's Discord session
pub struct DiscordConnection {
    worker: String,
    http: Arc<Http>,
    cache: Arc<Cache>,
    shard_manager: Arc<ShardManager>,
    songbird: Arc<Songbird>,
    voice: Arc<Mutex<Option<ChannelRef>>>,
    track: Mutex<Option<TrackHandle>>,
    closed: watch::Receiver<bool>,
}

impl DiscordConnection {
    fn voice(&self) -> MutexGuard<'_, Option<ChannelRef>> {
        self.voice.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn track(&self) -> MutexGuard<'_, Option<TrackHandle>> {
        self.track.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn leave(&self, guild_id: u64) {
        if let Err(e) = self.songbird.remove(GuildId::new(guild_id)).await {
            tracing::debug!(worker = %self.worker, error = %e, "leave voice");
        }
    }
}

#[async_trait]
impl Connection for DiscordConnection {
    fn connected_channel(&self) -> Option<ChannelRef> {
        *self.voice()
    }

    fn members(&self, channel: ChannelRef) -> Vec<Participant> {
        let Some(guild) = self.cache.guild(GuildId::new(channel.guild_id)) else {
            return Vec::new();
        };

        guild
            .voice_states
            .values()
            .filter(|state| state.channel_id.map(ChannelId::get) == Some(channel.channel_id))
            .map(|state| {
                let is_automated = state
                    .member
                    .as_ref()
                    .or_else(|| guild.members.get(&state.user_id))
                    .is_some_and(|m| m.user.bot);
                Participant {
                    user_id: state.user_id.get(),
                    is_automated,
                }
            })
            .collect()
    }

    async fn connect(&self, channel: ChannelRef) -> Result<()> {
        let previous = self.connected_channel();
        if let Some(previous) = previous.filter(|p| p.guild_id != channel.guild_id) {
            self.leave(previous.guild_id).await;
        }

        self.songbird
            .join(GuildId::new(channel.guild_id), ChannelId::new(channel.channel_id))
            .await
            .map_err(|e| Error::Connection(e.to_string()))?;

        *self.voice() = Some(channel);
        Ok(())
    }

    async fn is_playing(&self) -> bool {
        let handle = self.track().clone();
        match handle {
            Some(handle) => handle
                .get_info()
                .await
                .is_ok_and(|state| matches!(state.playing, PlayMode::Play)),
            None => false,
        }
    }

    async fn play(&self, clip: &AudioClip) -> Result<()> {
        if self.is_playing().await {
            return Err(Error::PlaybackBusy);
        }

        let channel = self.connected_channel().ok_or(Error::NotConnected)?;
        let call = self
            .songbird
            .get(GuildId::new(channel.guild_id))
            .ok_or(Error::NotConnected)?;

        let input = File::new(clip.path().to_path_buf());
        let handle = call.lock().await.play_input(input.into());
        *self.track() = Some(handle);

        Ok(())
    }

    async fn send_text(&self, channel_id: u64, text: &str) -> Result<()> {
        let channel = ChannelId::new(channel_id);
        match channel.to_channel((&self.cache, &*self.http)).await {
            Ok(Channel::Guild(c)) if c.kind == ChannelType::Text => {}
            Ok(_) => {
                return Err(Error::InvalidTextChannel(format!(
                    "no text channel with id {channel_id}"
                )));
            }
            Err(e) => {
                return Err(Error::InvalidTextChannel(format!(
                    "cannot find channel with id {channel_id}: {e}"
                )));
            }
        }

        channel.say(&*self.http, text).await?;
        Ok(())
    }

    async fn close(&self) {
        let previous = self.voice().take();
        if let Some(previous) = previous {
            self.leave(previous.guild_id).await;
        }
        self.shard_manager.shutdown_all().await;
    }

    fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    async fn closed(&self) {
        let mut closed = self.closed.clone();
        let _ = closed.wait_for(|c| *c).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intents_cover_members_and_commands() {
        let intents = intents();
        assert!(intents.contains(GatewayIntents::GUILD_MEMBERS));
        assert!(intents.contains(GatewayIntents::GUILD_VOICE_STATES));
        assert!(intents.contains(GatewayIntents::MESSAGE_CONTENT));
        assert!(!intents.contains(GatewayIntents::GUILD_PRESENCES));
    }
}
