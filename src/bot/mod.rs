//! # Bot Module
//!
//! Discord front end for the player registry.
//!
//! [`GuildPlayerBot`] implements Serenity's [`EventHandler`]: prefixed text
//! messages are parsed into [`commands::Command`]s, voice joins and track
//! resolution happen here, and everything else is delegated to
//! [`commands::execute`]. Playback announcements are posted by the task in
//! [`events`].
//!
//! Guild lifecycle is tied to the registry: leaving voice, being kicked from
//! the channel or removed from the guild destroys that guild's player.

use anyhow::Result;
use dashmap::DashMap;
use serenity::{
    all::{ChannelId, Context, EventHandler, Guild, GuildId, Message, Ready, UnavailableGuild, UserId, VoiceState},
    async_trait,
    builder::CreateMessage,
};
use songbird::Songbird;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub mod commands;
pub mod events;

use crate::{
    audio::{registry::PlayerRegistry, songbird_transport::SongbirdTransport},
    config::Config,
    sources::{Query, TrackResolver},
    ui::{embeds, messages},
};
use commands::{Command, CommandReply};

/// Main Discord event handler.
///
/// Shares the registry with the transport event pump and the gauge reporter;
/// `announce_channels` remembers the last text channel used per guild so
/// [`events::run_announcer`] knows where to post.
pub struct GuildPlayerBot {
    config: Arc<Config>,
    registry: Arc<PlayerRegistry>,
    songbird: Arc<Songbird>,
    transport: Arc<SongbirdTransport>,
    resolver: Arc<dyn TrackResolver>,
    announce_channels: Arc<DashMap<GuildId, ChannelId>>,
}

impl GuildPlayerBot {
    pub fn new(
        config: Arc<Config>,
        registry: Arc<PlayerRegistry>,
        songbird: Arc<Songbird>,
        transport: Arc<SongbirdTransport>,
        resolver: Arc<dyn TrackResolver>,
    ) -> Self {
        Self {
            config,
            registry,
            songbird,
            transport,
            resolver,
            announce_channels: Arc::new(DashMap::new()),
        }
    }

    pub fn announce_channels(&self) -> Arc<DashMap<GuildId, ChannelId>> {
        Arc::clone(&self.announce_channels)
    }

    async fn handle_command(&self, ctx: &Context, msg: &Message, guild_id: GuildId, command: Command) -> Result<()> {
        let prefix = &self.config.command_prefix;

        let reply = match command {
            Command::Play(query) => self.play(ctx, msg, guild_id, query).await,
            Command::Join => self
                .join_author_channel(ctx, guild_id, msg.author.id)
                .await
                .map(|()| CommandReply::Joined),
            Command::Leave => {
                self.leave(guild_id).await?;
                Ok(CommandReply::Left)
            }
            Command::Help => Ok(CommandReply::Help { prefix: prefix.clone() }),
            Command::Control(control) => {
                commands::execute(&self.registry, guild_id, control).map_err(|e| messages::render_error(&e))
            }
        };

        let embed = match reply {
            Ok(reply) => {
                let (tone, text) = messages::render(&reply);
                embeds::create_reply_embed(tone, &text)
            }
            Err(text) => embeds::create_error_embed(&text),
        };

        msg.channel_id
            .send_message(&ctx.http, CreateMessage::new().embed(embed))
            .await?;
        Ok(())
    }

    /// Une al bot al canal del autor si hace falta, resuelve el track y lo encola
    async fn play(
        &self,
        ctx: &Context,
        msg: &Message,
        guild_id: GuildId,
        query: Query,
    ) -> std::result::Result<CommandReply, String> {
        if !self.is_connected(guild_id).await {
            self.join_author_channel(ctx, guild_id, msg.author.id).await?;
        }

        let track = self.resolver.resolve(&query, msg.author.id).await.map_err(|e| {
            warn!("❌ No se pudo resolver {:?}: {:?}", query, e);
            "❌ Could not find anything to play for that".to_string()
        })?;

        Ok(commands::enqueue(&self.registry, guild_id, track))
    }

    async fn is_connected(&self, guild_id: GuildId) -> bool {
        match self.songbird.get(guild_id) {
            Some(call) => call.lock().await.current_channel().is_some(),
            None => false,
        }
    }

    /// Conecta al canal de voz del autor del mensaje
    async fn join_author_channel(
        &self,
        ctx: &Context,
        guild_id: GuildId,
        author: UserId,
    ) -> std::result::Result<(), String> {
        let channel_id = ctx
            .cache
            .guild(guild_id)
            .and_then(|guild| guild.voice_states.get(&author).and_then(|vs| vs.channel_id))
            .ok_or_else(|| "🔇 Join a voice channel first".to_string())?;

        self.songbird.join(guild_id, channel_id).await.map_err(|e| {
            error!("Error al conectar al canal de voz en guild {}: {:?}", guild_id, e);
            "❌ Could not connect to the voice channel".to_string()
        })?;

        // Registra la salida de audio para el player del guild
        self.registry.get_or_create(guild_id);
        info!("🔊 Conectado al canal de voz {} en guild {}", channel_id, guild_id);
        Ok(())
    }

    /// Destruye el player y abandona el canal de voz
    async fn leave(&self, guild_id: GuildId) -> Result<()> {
        self.registry.destroy(guild_id);
        self.announce_channels.remove(&guild_id);
        self.transport.disconnect(guild_id).await
    }
}

#[async_trait]
impl EventHandler for GuildPlayerBot {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());
    }

    async fn message(&self, ctx: Context, msg: Message) {
        if msg.author.bot {
            return;
        }
        let Some(guild_id) = msg.guild_id else {
            return;
        };
        let prefix = self.config.command_prefix.as_str();
        let Some(parsed) = commands::parse(&msg.content, prefix) else {
            return;
        };

        let command = match parsed {
            Ok(command) => command,
            Err(e) => {
                debug!("Comando inválido en guild {}: {}", guild_id, e);
                let embed = embeds::create_error_embed(&messages::render_command_error(&e, prefix));
                if let Err(e) = msg
                    .channel_id
                    .send_message(&ctx.http, CreateMessage::new().embed(embed))
                    .await
                {
                    error!("Error al responder: {:?}", e);
                }
                return;
            }
        };

        info!("📝 Comando {:?} usado por {} en guild {}", command, msg.author.name, guild_id);
        self.announce_channels.insert(guild_id, msg.channel_id);

        if let Err(e) = self.handle_command(&ctx, &msg, guild_id, command).await {
            error!("Error manejando comando: {:?}", e);
        }
    }

    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        // Detectar si el bot fue desconectado
        let current_user_id = ctx.cache.current_user().id;
        if new.user_id != current_user_id || old.is_none() || new.channel_id.is_some() {
            return;
        }
        let Some(guild_id) = new.guild_id else {
            return;
        };

        info!("🔌 Bot desconectado en guild {}", guild_id);
        if let Err(e) = self.leave(guild_id).await {
            error!("Error al limpiar guild {}: {:?}", guild_id, e);
        }
    }

    async fn guild_delete(&self, _ctx: Context, incomplete: UnavailableGuild, _full: Option<Guild>) {
        // Un guild no disponible (caída de Discord) no implica que nos hayan quitado
        if incomplete.unavailable {
            return;
        }

        info!("🚪 Removido del guild {}", incomplete.id);
        if let Err(e) = self.leave(incomplete.id).await {
            error!("Error al limpiar guild {}: {:?}", incomplete.id, e);
        }
    }
}
