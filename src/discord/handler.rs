//! Gateway event handler for one worker

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serenity::all::{
    Cache, ChunkGuildFilter, Context, EventHandler, Guild, GuildId, Message, Ready, UserId,
    VoiceState,
};
use tokio::sync::mpsc;

use crate::transport::{ChannelRef, CommandMessage, FleetEvent, MembershipChange};

/// Forwards voice state updates and messages into the fleet's event channel
pub(super) struct FleetHandler {
    worker: String,
    events: mpsc::Sender<FleetEvent>,
    voice: Arc<Mutex<Option<ChannelRef>>>,
}

impl FleetHandler {
    pub(super) const fn new(
        worker: String,
        events: mpsc::Sender<FleetEvent>,
        voice: Arc<Mutex<Option<ChannelRef>>>,
    ) -> Self {
        Self {
            worker,
            events,
            voice,
        }
    }

    async fn forward(&self, event: FleetEvent) {
        if self.events.send(event).await.is_err() {
            tracing::debug!(worker = %self.worker, "fleet event channel closed");
        }
    }
}

#[async_trait]
impl EventHandler for FleetHandler {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        tracing::info!(worker = %self.worker, user = %ready.user.name, "logged in");
    }

    async fn guild_create(&self, ctx: Context, guild: Guild, _is_new: Option<bool>) {
        // Large guilds arrive without their full member list
        if guild.large {
            tracing::debug!(worker = %self.worker, guild = %guild.id, "requesting member chunks");
            ctx.shard.chunk_guild(guild.id, None, false, ChunkGuildFilter::None, None);
        }
    }

    async fn message(&self, ctx: Context, msg: Message) {
        if msg.author.bot {
            return;
        }

        let author_voice = msg
            .guild_id
            .and_then(|guild_id| voice_channel_of(&ctx.cache, guild_id, msg.author.id));

        let message = CommandMessage {
            message_id: msg.id.get(),
            author_id: msg.author.id.get(),
            content: msg.content,
            text_channel_id: msg.channel_id.get(),
            author_voice,
        };

        self.forward(FleetEvent::Command {
            worker: self.worker.clone(),
            message,
        })
        .await;
    }

    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let Some(guild_id) = new
            .guild_id
            .or_else(|| old.as_ref().and_then(|o| o.guild_id))
        else {
            return;
        };

        let is_self = new.user_id == ctx.cache.current_user().id;
        let before = old
            .as_ref()
            .and_then(|o| o.channel_id)
            .map(|c| ChannelRef::new(guild_id.get(), c.get()));
        let after = new
            .channel_id
            .map(|c| ChannelRef::new(guild_id.get(), c.get()));

        if is_self {
            // Moved or kicked by someone else
            *self.voice.lock().unwrap_or_else(PoisonError::into_inner) = after;
        }

        let (display_name, is_automated) = member_info(&ctx.cache, guild_id, &new);
        let change = MembershipChange {
            member_id: new.user_id.get(),
            display_name,
            before,
            after,
            is_self,
            is_automated,
        };

        self.forward(FleetEvent::Membership {
            worker: self.worker.clone(),
            change,
        })
        .await;
    }
}

/// Voice channel `user_id` is in, from the cache
fn voice_channel_of(cache: &Cache, guild_id: GuildId, user_id: UserId) -> Option<ChannelRef> {
    let guild = cache.guild(guild_id)?;
    let channel_id = guild.voice_states.get(&user_id)?.channel_id?;
    Some(ChannelRef::new(guild_id.get(), channel_id.get()))
}

/// Display name and bot flag of the member behind `state`
fn member_info(cache: &Cache, guild_id: GuildId, state: &VoiceState) -> (String, bool) {
    if let Some(member) = &state.member {
        return (member.display_name().to_string(), member.user.bot);
    }

    cache
        .guild(guild_id)
        .and_then(|guild| {
            guild
                .members
                .get(&state.user_id)
                .map(|m| (m.display_name().to_string(), m.user.bot))
        })
        .unwrap_or_else(|| (state.user_id.to_string(), false))
}
