use dashmap::DashMap;
use serenity::model::id::GuildId;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use tokio::sync::broadcast;
use tracing::{debug, info};

use super::{
    player::{GuildPlayer, PlayerEvent, PlayerSettings},
    transport::{AudioTransport, TransportEvent, TransportEventKind},
};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Contadores de solo lectura para un recolector externo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RegistryStats {
    pub active: usize,
    pub playing: usize,
    pub created_total: u64,
    pub destroyed_total: u64,
}

/// Registro de players, uno por guild.
///
/// Built once at startup and shared as `Arc<PlayerRegistry>` by the command
/// layer, the transport event pump and the gauge reporter. The map is
/// sharded, so guilds never contend on a global lock, and insertion is a
/// single check-and-set per key: concurrent `get_or_create` calls for the
/// same guild always see the same player.
pub struct PlayerRegistry {
    players: DashMap<GuildId, Arc<GuildPlayer>>,
    transport: Arc<dyn AudioTransport>,
    settings: PlayerSettings,
    events: broadcast::Sender<PlayerEvent>,
    created_total: AtomicU64,
    destroyed_total: AtomicU64,
}

impl PlayerRegistry {
    pub fn new(transport: Arc<dyn AudioTransport>, settings: PlayerSettings) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            players: DashMap::new(),
            transport,
            settings,
            events,
            created_total: AtomicU64::new(0),
            destroyed_total: AtomicU64::new(0),
        }
    }

    /// Obtiene el player del guild, creándolo si no existe.
    ///
    /// Also (re)binds the local audio output, which matters after a shard
    /// reconnect. Skipped when the transport is a remote relay.
    pub fn get_or_create(&self, guild_id: GuildId) -> Arc<GuildPlayer> {
        let player = self
            .players
            .entry(guild_id)
            .or_insert_with(|| {
                self.created_total.fetch_add(1, Ordering::Relaxed);
                info!("🎛️ Nuevo player para guild {}", guild_id);
                Arc::new(GuildPlayer::new(
                    guild_id,
                    Arc::clone(&self.transport),
                    self.settings,
                    self.events.clone(),
                ))
            })
            .clone();

        if !self.transport.is_remote_relay() {
            self.transport.bind_output(guild_id);
        }

        player
    }

    /// Never creates a player.
    pub fn get_existing(&self, guild_id: GuildId) -> Option<Arc<GuildPlayer>> {
        self.players.get(&guild_id).map(|entry| Arc::clone(entry.value()))
    }

    /// Detaches the player without touching its state.
    pub fn remove(&self, guild_id: GuildId) -> Option<Arc<GuildPlayer>> {
        self.players.remove(&guild_id).map(|(_, player)| player)
    }

    /// Detiene el player del guild, libera su transporte y lo quita del registro.
    ///
    /// Returns `true` only for the call that actually removed the entry. The
    /// entry is only removed if it still holds the player that was stopped, so
    /// a player created concurrently for the same guild survives.
    pub fn destroy(&self, guild_id: GuildId) -> bool {
        let Some(player) = self.get_existing(guild_id) else {
            return false;
        };

        player.destroy();
        let removed = self
            .players
            .remove_if(&guild_id, |_, current| Arc::ptr_eq(current, &player))
            .is_some();

        if removed {
            self.destroyed_total.fetch_add(1, Ordering::Relaxed);
            info!("👋 Player destruido en guild {}", guild_id);
        } else {
            debug!("Player de guild {} ya había sido quitado del registro", guild_id);
        }
        removed
    }

    /// Players currently in the `Playing` state.
    pub fn list_playing(&self) -> Vec<Arc<GuildPlayer>> {
        self.players
            .iter()
            .filter(|entry| entry.value().is_playing())
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    pub fn count_playing(&self) -> usize {
        self.players
            .iter()
            .filter(|entry| entry.value().is_playing())
            .count()
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn guild_ids(&self) -> Vec<GuildId> {
        self.players.iter().map(|entry| *entry.key()).collect()
    }

    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            active: self.len(),
            playing: self.count_playing(),
            created_total: self.created_total.load(Ordering::Relaxed),
            destroyed_total: self.destroyed_total.load(Ordering::Relaxed),
        }
    }

    /// Playback events from every player.
    pub fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
        self.events.subscribe()
    }

    /// Routes a transport callback to the guild's player, if it still exists.
    pub fn dispatch_transport_event(&self, event: TransportEvent) {
        let Some(player) = self.get_existing(event.guild_id) else {
            debug!("Evento de transporte para guild {} sin player: {:?}", event.guild_id, event.kind);
            return;
        };

        match event.kind {
            TransportEventKind::Position(position_ms) => player.on_position_update(position_ms),
            TransportEventKind::Ended(reason) => player.on_track_ended(reason),
        }
    }

    /// Destroys every player. Called once at process shutdown.
    pub fn shutdown(&self) {
        if self.is_empty() {
            return;
        }
        let guilds = self.guild_ids();
        info!("⚠️ Cerrando {} players", guilds.len());
        for guild_id in guilds {
            self.destroy(guild_id);
        }
    }
}
