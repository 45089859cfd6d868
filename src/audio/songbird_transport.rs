//! [`AudioTransport`] backed by songbird.
//!
//! Players issue commands while holding their state lock, so nothing here may
//! block: every command is pushed onto a per-guild channel and applied by a
//! worker task that owns the guild's songbird call. One worker per guild keeps
//! commands in the order the player issued them.
//!
//! Track callbacks come back through [`TransportEventSender`]. Each load gets
//! a generation number, made live on the caller's thread before the command
//! is queued; `stop` and `release` retire it the same way. End/error/progress
//! events from a generation that is no longer live are dropped, so the player
//! never hears about a track it no longer owns, even while the worker is
//! still catching up.

use dashmap::DashMap;
use serenity::{async_trait, model::id::GuildId};
use songbird::{
    input::YoutubeDl,
    tracks::TrackHandle,
    Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{runtime::Handle, sync::mpsc};
use tracing::{debug, error, info, warn};

use super::{
    track::Track,
    transport::{AudioTransport, TrackEndReason, TransportEvent, TransportEventSender},
};

/// Comandos pendientes para el worker de un guild
#[derive(Debug)]
enum VoiceCommand {
    Load { track: Track, generation: u64 },
    Play,
    Pause,
    Seek(u64),
    Volume(f32),
    Stop,
    Release,
}

/// Generación del track vigente en cada guild.
#[derive(Debug, Default)]
struct Generations {
    next: AtomicU64,
    live: DashMap<GuildId, u64>,
}

impl Generations {
    /// Starts a new generation and makes it the guild's live one.
    fn begin(&self, guild_id: GuildId) -> u64 {
        let generation = self.next.fetch_add(1, Ordering::Relaxed) + 1;
        self.live.insert(guild_id, generation);
        generation
    }

    fn retire(&self, guild_id: GuildId) {
        self.live.remove(&guild_id);
    }

    /// Retires `generation` if it is still live. Only the first claim wins.
    fn claim(&self, guild_id: GuildId, generation: u64) -> bool {
        self.live
            .remove_if(&guild_id, |_, live| *live == generation)
            .is_some()
    }

    fn live(&self, guild_id: GuildId) -> Option<u64> {
        self.live.get(&guild_id).map(|entry| *entry.value())
    }

    fn is_live(&self, guild_id: GuildId, generation: u64) -> bool {
        self.live(guild_id) == Some(generation)
    }
}

pub struct SongbirdTransport {
    songbird: Arc<Songbird>,
    http: reqwest::Client,
    events: TransportEventSender,
    position_interval: Duration,
    workers: DashMap<GuildId, mpsc::UnboundedSender<VoiceCommand>>,
    generations: Arc<Generations>,
    runtime: Handle,
}

impl SongbirdTransport {
    /// Must be called from inside the tokio runtime that will run the workers.
    pub fn new(
        songbird: Arc<Songbird>,
        http: reqwest::Client,
        events: TransportEventSender,
        position_interval: Duration,
    ) -> Self {
        Self {
            songbird,
            http,
            events,
            position_interval,
            workers: DashMap::new(),
            generations: Arc::new(Generations::default()),
            runtime: Handle::current(),
        }
    }

    fn send(&self, guild_id: GuildId, command: VoiceCommand) {
        let sender = self.worker(guild_id);
        if let Err(mpsc::error::SendError(command)) = sender.send(command) {
            // El worker terminó; se crea uno nuevo
            self.workers.remove(&guild_id);
            if self.worker(guild_id).send(command).is_err() {
                error!("❌ No se pudo enviar comando de voz al guild {}", guild_id);
            }
        }
    }

    /// Leaves the voice channel and retires the guild's worker.
    ///
    /// Pending commands still run before the worker exits. The next
    /// `bind_output` for the guild starts a fresh one.
    pub async fn disconnect(&self, guild_id: GuildId) -> anyhow::Result<()> {
        self.generations.retire(guild_id);
        self.workers.remove(&guild_id);
        if self.songbird.get(guild_id).is_some() {
            self.songbird.remove(guild_id).await?;
            info!("👋 Desconectado del canal de voz en guild {}", guild_id);
        }
        Ok(())
    }

    fn worker(&self, guild_id: GuildId) -> mpsc::UnboundedSender<VoiceCommand> {
        self.workers
            .entry(guild_id)
            .or_insert_with(|| {
                let (tx, rx) = mpsc::unbounded_channel();
                let worker = VoiceWorker {
                    guild_id,
                    songbird: Arc::clone(&self.songbird),
                    http: self.http.clone(),
                    events: self.events.clone(),
                    position_interval: self.position_interval,
                    generations: Arc::clone(&self.generations),
                    current: None,
                };
                self.runtime.spawn(worker.run(rx));
                debug!("🧵 Worker de voz iniciado para guild {}", guild_id);
                tx
            })
            .clone()
    }
}

impl AudioTransport for SongbirdTransport {
    fn bind_output(&self, guild_id: GuildId) {
        // get_or_insert es idempotente: registra el Call sin unirse a ningún canal
        self.songbird.get_or_insert(guild_id);
        self.worker(guild_id);
    }

    fn load(&self, guild_id: GuildId, track: &Track) {
        let generation = self.generations.begin(guild_id);
        self.send(
            guild_id,
            VoiceCommand::Load {
                track: track.clone(),
                generation,
            },
        );
    }

    fn play(&self, guild_id: GuildId) {
        self.send(guild_id, VoiceCommand::Play);
    }

    fn pause(&self, guild_id: GuildId) {
        self.send(guild_id, VoiceCommand::Pause);
    }

    fn seek(&self, guild_id: GuildId, position_ms: u64) {
        self.send(guild_id, VoiceCommand::Seek(position_ms));
    }

    fn set_volume(&self, guild_id: GuildId, volume: f32) {
        self.send(guild_id, VoiceCommand::Volume(volume));
    }

    fn stop(&self, guild_id: GuildId) {
        self.generations.retire(guild_id);
        self.send(guild_id, VoiceCommand::Stop);
    }

    fn release(&self, guild_id: GuildId) {
        self.generations.retire(guild_id);
        self.send(guild_id, VoiceCommand::Release);
    }
}

struct VoiceWorker {
    guild_id: GuildId,
    songbird: Arc<Songbird>,
    http: reqwest::Client,
    events: TransportEventSender,
    position_interval: Duration,
    generations: Arc<Generations>,
    current: Option<TrackHandle>,
}

impl VoiceWorker {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<VoiceCommand>) {
        while let Some(command) = commands.recv().await {
            match command {
                VoiceCommand::Load { track, generation } => self.load(track, generation).await,
                VoiceCommand::Play => self.with_handle("play", |h| h.play()),
                VoiceCommand::Pause => self.with_handle("pause", |h| h.pause()),
                VoiceCommand::Seek(position_ms) => {
                    // El resultado llega por el callback; la posición real la reporta el evento periódico
                    self.with_handle("seek", |h| {
                        drop(h.seek(Duration::from_millis(position_ms)));
                        Ok(())
                    })
                }
                VoiceCommand::Volume(volume) => self.with_handle("volume", |h| h.set_volume(volume)),
                VoiceCommand::Stop => self.stop_current(),
                VoiceCommand::Release => {
                    self.stop_current();
                    if let Some(call) = self.songbird.get(self.guild_id) {
                        call.lock().await.stop();
                    }
                    debug!("🔌 Transporte liberado en guild {}", self.guild_id);
                }
            }
        }
        debug!("🧵 Worker de voz terminado para guild {}", self.guild_id);
    }

    async fn load(&mut self, track: Track, generation: u64) {
        self.stop_current();

        if !self.generations.is_live(self.guild_id, generation) {
            debug!("Carga reemplazada antes de empezar en guild {}: {}", self.guild_id, track.title());
            return;
        }

        let Some(call) = self.songbird.get(self.guild_id) else {
            warn!("⚠️ Sin conexión de voz en guild {} para '{}'", self.guild_id, track.title());
            if self.generations.claim(self.guild_id, generation) {
                self.report(TrackEndReason::Failed("not connected to a voice channel".into()));
            }
            return;
        };

        let input = YoutubeDl::new(self.http.clone(), track.uri().to_string());
        let handle = call.lock().await.play_only_input(input.into());

        for (event, kind) in [
            (Event::Track(TrackEvent::End), RelayKind::End),
            (Event::Track(TrackEvent::Error), RelayKind::Error),
            (Event::Periodic(self.position_interval, None), RelayKind::Position),
        ] {
            let relay = TrackEventRelay {
                guild_id: self.guild_id,
                generation,
                kind,
                generations: Arc::clone(&self.generations),
                events: self.events.clone(),
            };
            if let Err(e) = handle.add_event(event, relay) {
                warn!("No se pudo registrar evento de track en guild {}: {:?}", self.guild_id, e);
            }
        }

        self.current = Some(handle);
        info!("🎶 Track cargado en guild {}: {}", self.guild_id, track.title());
    }

    fn with_handle<F>(&self, op: &str, apply: F)
    where
        F: FnOnce(&TrackHandle) -> songbird::tracks::TrackResult<()>,
    {
        let Some(handle) = &self.current else {
            debug!("Comando '{}' sin track cargado en guild {}", op, self.guild_id);
            return;
        };
        if let Err(e) = apply(handle) {
            warn!("⚠️ Comando '{}' falló en guild {}: {:?}", op, self.guild_id, e);
        }
    }

    fn stop_current(&mut self) {
        if let Some(handle) = self.current.take() {
            if let Err(e) = handle.stop() {
                debug!("Track ya detenido en guild {}: {:?}", self.guild_id, e);
            }
        }
    }

    fn report(&self, reason: TrackEndReason) {
        if self.events.send(TransportEvent::ended(self.guild_id, reason)).is_err() {
            warn!("Canal de eventos cerrado; se descarta fin de track en guild {}", self.guild_id);
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum RelayKind {
    End,
    Error,
    Position,
}

/// Reenvía eventos de songbird como [`TransportEvent`]s.
struct TrackEventRelay {
    guild_id: GuildId,
    generation: u64,
    kind: RelayKind,
    generations: Arc<Generations>,
    events: TransportEventSender,
}

impl TrackEventRelay {
    /// End and error claim the live generation, so only the first of them
    /// gets through; progress only needs it to still be live.
    fn admits(&self) -> bool {
        match self.kind {
            RelayKind::End | RelayKind::Error => self.generations.claim(self.guild_id, self.generation),
            RelayKind::Position => self.generations.is_live(self.guild_id, self.generation),
        }
    }
}

#[async_trait]
impl VoiceEventHandler for TrackEventRelay {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        if !self.admits() {
            return None;
        }

        let event = match self.kind {
            RelayKind::End => TransportEvent::ended(self.guild_id, TrackEndReason::Finished),
            RelayKind::Error => {
                let reason = match ctx {
                    EventContext::Track(tracks) => tracks
                        .first()
                        .map(|(state, _)| format!("{:?}", state.playing))
                        .unwrap_or_else(|| "unknown playback error".to_string()),
                    _ => "unknown playback error".to_string(),
                };
                error!("❌ Error en track para guild {}: {}", self.guild_id, reason);
                TransportEvent::ended(self.guild_id, TrackEndReason::Failed(reason))
            }
            RelayKind::Position => {
                let EventContext::Track(tracks) = ctx else {
                    return None;
                };
                let (state, _) = tracks.first()?;
                let position_ms = u64::try_from(state.position.as_millis()).unwrap_or(u64::MAX);
                TransportEvent::position(self.guild_id, position_ms)
            }
        };

        if self.events.send(event).is_err() {
            debug!("Canal de eventos cerrado en guild {}", self.guild_id);
        }
        None
    }
}
