use dashmap::DashMap;
use serenity::{
    all::{ChannelId, GuildId},
    builder::CreateMessage,
    http::Http,
};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    audio::player::{EventCause, PlayerEvent},
    ui::{embeds, messages},
};

fn event_guild(event: &PlayerEvent) -> GuildId {
    match event {
        PlayerEvent::TrackStarted { guild_id, .. }
        | PlayerEvent::TrackFailed { guild_id, .. }
        | PlayerEvent::QueueFinished { guild_id, .. } => *guild_id,
    }
}

/// Lo que cambió por un comando ya lo cuenta la respuesta al comando
fn announces(event: &PlayerEvent) -> bool {
    !matches!(
        event,
        PlayerEvent::TrackStarted {
            cause: EventCause::Command,
            ..
        } | PlayerEvent::QueueFinished {
            cause: EventCause::Command,
            ..
        }
    )
}

/// Publica los eventos de reproducción en el último canal de texto usado en cada guild
pub async fn run_announcer(
    http: Arc<Http>,
    mut events: broadcast::Receiver<PlayerEvent>,
    channels: Arc<DashMap<GuildId, ChannelId>>,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            received = events.recv() => match received {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    warn!("⚠️ Anuncios atrasados, se omitieron {} eventos", skipped);
                    continue;
                }
                Err(RecvError::Closed) => break,
            },
        };

        if !announces(&event) {
            continue;
        }

        let guild_id = event_guild(&event);
        let Some(channel_id) = channels.get(&guild_id).map(|entry| *entry.value()) else {
            debug!("Sin canal de anuncios para guild {}", guild_id);
            continue;
        };

        let (tone, text) = messages::render_event(&event);
        let message = CreateMessage::new().embed(embeds::create_reply_embed(tone, &text));
        if let Err(e) = channel_id.send_message(&http, message).await {
            warn!("No se pudo anunciar en guild {}: {:?}", guild_id, e);
        }
    }

    info!("📣 Anuncios detenidos");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        audio::{
            player::PlayerSettings,
            registry::PlayerRegistry,
            track::Track,
            transport::{testing::RecordingTransport, TrackEndReason, TransportEvent},
        },
        bot::commands::{self, ControlCommand},
    };
    use pretty_assertions::assert_eq;
    use serenity::model::id::UserId;
    use std::time::Duration;

    fn track(name: &str) -> Track {
        Track::new(
            format!("https://example.com/{name}"),
            name,
            Some(Duration::from_secs(90)),
            UserId::new(1),
        )
    }

    #[test]
    fn every_start_is_posted_once() {
        let registry = PlayerRegistry::new(Arc::new(RecordingTransport::default()), PlayerSettings::default());
        let mut events = registry.subscribe();
        let guild_id = GuildId::new(10);
        let mut posted = Vec::new();

        // a empieza con el enqueue, b con el skip, c cuando b termina solo
        for name in ["a", "b", "c"] {
            posted.push(messages::render(&commands::enqueue(&registry, guild_id, track(name))).1);
        }
        let skipped = commands::execute(&registry, guild_id, ControlCommand::Skip).unwrap();
        posted.push(messages::render(&skipped).1);
        registry.dispatch_transport_event(TransportEvent::ended(guild_id, TrackEndReason::Finished));
        registry.dispatch_transport_event(TransportEvent::ended(guild_id, TrackEndReason::Finished));

        posted.extend(
            std::iter::from_fn(|| events.try_recv().ok())
                .filter(announces)
                .map(|event| messages::render_event(&event).1),
        );

        for name in ["a", "b", "c"] {
            let needle = format!("now playing **{name}**");
            let count = posted
                .iter()
                .filter(|text| text.to_lowercase().contains(&needle))
                .count();
            assert_eq!(count, 1, "{name}: {posted:?}");
        }
        assert_eq!(
            posted.iter().filter(|text| text.contains("queue is finished")).count(),
            1
        );
    }

    #[test]
    fn command_driven_changes_are_not_announced() {
        let guild_id = GuildId::new(11);
        let started = |cause| PlayerEvent::TrackStarted {
            guild_id,
            track: track("a"),
            cause,
        };

        assert!(!announces(&started(EventCause::Command)));
        assert!(announces(&started(EventCause::TrackEnded)));
        assert!(!announces(&PlayerEvent::QueueFinished {
            guild_id,
            cause: EventCause::Command,
        }));
        assert!(announces(&PlayerEvent::QueueFinished {
            guild_id,
            cause: EventCause::TrackEnded,
        }));
    }

    #[test]
    fn every_event_knows_its_guild() {
        let guild_id = GuildId::new(10);
        let track = Track::new("https://example.com/a", "a", None, UserId::new(1));

        for event in [
            PlayerEvent::TrackStarted {
                guild_id,
                track: track.clone(),
                cause: EventCause::TrackEnded,
            },
            PlayerEvent::TrackFailed {
                guild_id,
                track,
                reason: "boom".into(),
            },
            PlayerEvent::QueueFinished {
                guild_id,
                cause: EventCause::Command,
            },
        ] {
            assert_eq!(event_guild(&event), guild_id);
        }
    }
}
