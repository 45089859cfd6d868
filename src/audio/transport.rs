//! Boundary between the players and whatever actually sends audio.
//!
//! Commands go out through [`AudioTransport`] and never block; results come
//! back later as [`TransportEvent`]s, which [`pump_transport_events`] feeds
//! into the owning player.

use serenity::model::id::GuildId;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;

use super::registry::PlayerRegistry;
use super::track::Track;

/// Outbound transport commands, addressed per guild.
///
/// Implementations must not call back into a player synchronously: players
/// issue these while holding their own state lock.
#[cfg_attr(test, mockall::automock)]
pub trait AudioTransport: Send + Sync {
    /// Registers the local audio sender for the guild. Called on every
    /// registry fetch, so it must be idempotent.
    fn bind_output(&self, guild_id: GuildId);

    fn load(&self, guild_id: GuildId, track: &Track);

    fn play(&self, guild_id: GuildId);

    fn pause(&self, guild_id: GuildId);

    fn seek(&self, guild_id: GuildId, position_ms: u64);

    fn set_volume(&self, guild_id: GuildId, volume: f32);

    fn stop(&self, guild_id: GuildId);

    /// Drops whatever the transport holds for the guild.
    fn release(&self, guild_id: GuildId);

    /// Remote relays (Lavalink-style nodes) send audio themselves, so no local
    /// output binding is needed.
    fn is_remote_relay(&self) -> bool {
        false
    }
}

/// Why the transport stopped playing a track.
#[derive(Debug, Clone, PartialEq)]
pub enum TrackEndReason {
    Finished,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransportEventKind {
    Position(u64),
    Ended(TrackEndReason),
}

/// Callback from the transport for one guild.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportEvent {
    pub guild_id: GuildId,
    pub kind: TransportEventKind,
}

impl TransportEvent {
    pub fn position(guild_id: GuildId, position_ms: u64) -> Self {
        Self {
            guild_id,
            kind: TransportEventKind::Position(position_ms),
        }
    }

    pub fn ended(guild_id: GuildId, reason: TrackEndReason) -> Self {
        Self {
            guild_id,
            kind: TransportEventKind::Ended(reason),
        }
    }
}

pub type TransportEventSender = mpsc::UnboundedSender<TransportEvent>;
pub type TransportEventReceiver = mpsc::UnboundedReceiver<TransportEvent>;

pub fn transport_event_channel() -> (TransportEventSender, TransportEventReceiver) {
    mpsc::unbounded_channel()
}

/// Delivers transport callbacks to their players until every sender is gone.
///
/// A single consumer keeps the order of events within each guild.
pub async fn pump_transport_events(registry: Arc<PlayerRegistry>, mut events: TransportEventReceiver) {
    while let Some(event) = events.recv().await {
        registry.dispatch_transport_event(event);
    }
    info!("📴 Canal de eventos del transporte cerrado");
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use parking_lot::Mutex;

    /// Command as seen by [`RecordingTransport`].
    #[derive(Debug, Clone, PartialEq)]
    pub enum Sent {
        Bind,
        Load(String),
        Play,
        Pause,
        Seek(u64),
        Volume(f32),
        Stop,
        Release,
    }

    /// Transport fake that records every command per guild.
    #[derive(Default)]
    pub struct RecordingTransport {
        sent: Mutex<Vec<(GuildId, Sent)>>,
    }

    impl RecordingTransport {
        pub fn sent(&self, guild_id: GuildId) -> Vec<Sent> {
            self.sent
                .lock()
                .iter()
                .filter(|(g, _)| *g == guild_id)
                .map(|(_, s)| s.clone())
                .collect()
        }

        pub fn loads(&self, guild_id: GuildId) -> Vec<String> {
            self.sent(guild_id)
                .into_iter()
                .filter_map(|s| match s {
                    Sent::Load(title) => Some(title),
                    _ => None,
                })
                .collect()
        }

        fn record(&self, guild_id: GuildId, sent: Sent) {
            self.sent.lock().push((guild_id, sent));
        }
    }

    impl AudioTransport for RecordingTransport {
        fn bind_output(&self, guild_id: GuildId) {
            self.record(guild_id, Sent::Bind);
        }
        fn load(&self, guild_id: GuildId, track: &Track) {
            self.record(guild_id, Sent::Load(track.title().to_string()));
        }
        fn play(&self, guild_id: GuildId) {
            self.record(guild_id, Sent::Play);
        }
        fn pause(&self, guild_id: GuildId) {
            self.record(guild_id, Sent::Pause);
        }
        fn seek(&self, guild_id: GuildId, position_ms: u64) {
            self.record(guild_id, Sent::Seek(position_ms));
        }
        fn set_volume(&self, guild_id: GuildId, volume: f32) {
            self.record(guild_id, Sent::Volume(volume));
        }
        fn stop(&self, guild_id: GuildId) {
            self.record(guild_id, Sent::Stop);
        }
        fn release(&self, guild_id: GuildId) {
            self.record(guild_id, Sent::Release);
        }
    }
}
