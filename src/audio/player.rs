use parking_lot::Mutex;
use serenity::model::id::GuildId;
use std::{fmt, sync::Arc, time::Duration};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::{
    queue::{QueueInfo, RepeatMode, TrackQueue},
    track::Track,
    transport::{AudioTransport, TrackEndReason},
};
use crate::error::{PlayerError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayState {
    Idle,
    Playing,
    Paused,
    Stopped,
}

impl fmt::Display for PlayState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PlayState::Idle => "idle",
            PlayState::Playing => "playing",
            PlayState::Paused => "paused",
            PlayState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Per-player limits and policies, derived from the bot configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerSettings {
    pub default_volume: f32,
    pub min_volume: f32,
    pub max_volume: f32,
    /// Start playing as soon as a track is queued on a player with nothing loaded.
    pub auto_play: bool,
    pub max_history: usize,
}

impl PlayerSettings {
    pub fn clamp_volume(&self, volume: f32) -> f32 {
        if volume.is_nan() {
            return self.min_volume;
        }
        volume.clamp(self.min_volume, self.max_volume)
    }
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            default_volume: 1.0,
            min_volume: 0.0,
            max_volume: 1.5,
            auto_play: true,
            max_history: 50,
        }
    }
}

/// Qué provocó un cambio de reproducción.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventCause {
    /// A command (enqueue, play, skip) made the change and already returns it
    /// to the caller.
    Command,
    /// The transport reported the previous track as ended.
    TrackEnded,
}

/// Eventos de reproducción emitidos por los players.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    TrackStarted { guild_id: GuildId, track: Track, cause: EventCause },
    TrackFailed { guild_id: GuildId, track: Track, reason: String },
    QueueFinished { guild_id: GuildId, cause: EventCause },
}

#[derive(Debug, Clone, PartialEq)]
pub enum EnqueueOutcome {
    /// Nothing was loaded, so playback started right away.
    Started(Track),
    /// Position in the queue, 1 being the next track.
    Queued { position: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlayOutcome {
    Started(Track),
    Resumed(Track),
    AlreadyPlaying(Track),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkipOutcome {
    pub skipped: Option<Track>,
    pub next: Option<Track>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SeekOutcome {
    pub track: Track,
    pub from_ms: u64,
    pub to_ms: u64,
}

#[derive(Debug)]
struct PlayerState {
    queue: TrackQueue,
    current: Option<Track>,
    position_ms: u64,
    volume: f32,
    play_state: PlayState,
    repeat_mode: RepeatMode,
    destroyed: bool,
}

/// Máquina de estados de reproducción de un guild.
///
/// Every operation takes `&self`; the mutable state sits behind one mutex so
/// transport callbacks (position updates, track end) can interleave with
/// commands. Invariant: a track is loaded exactly when the state is
/// `Playing` or `Paused`, and the position never leaves `[0, duration]`.
///
/// Once [`GuildPlayer::destroy`] runs the player stays `Stopped` for good;
/// a plain [`GuildPlayer::stop`] can be followed by a fresh `play`.
pub struct GuildPlayer {
    guild_id: GuildId,
    settings: PlayerSettings,
    transport: Arc<dyn AudioTransport>,
    events: broadcast::Sender<PlayerEvent>,
    state: Mutex<PlayerState>,
}

impl GuildPlayer {
    pub fn new(
        guild_id: GuildId,
        transport: Arc<dyn AudioTransport>,
        settings: PlayerSettings,
        events: broadcast::Sender<PlayerEvent>,
    ) -> Self {
        Self {
            guild_id,
            transport,
            events,
            state: Mutex::new(PlayerState {
                queue: TrackQueue::new(settings.max_history),
                current: None,
                position_ms: 0,
                volume: settings.clamp_volume(settings.default_volume),
                play_state: PlayState::Idle,
                repeat_mode: RepeatMode::Off,
                destroyed: false,
            }),
            settings,
        }
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    /// Agrega un track a la cola
    pub fn enqueue(&self, track: Track) -> EnqueueOutcome {
        let mut state = self.state.lock();
        let position = state.queue.push(track);

        if self.settings.auto_play && state.current.is_none() && !state.destroyed {
            if let Some(started) = self.advance(&mut state, EventCause::Command) {
                return EnqueueOutcome::Started(started);
            }
        }

        EnqueueOutcome::Queued { position }
    }

    /// No track loaded and nothing waiting.
    pub fn is_queue_empty(&self) -> bool {
        let state = self.state.lock();
        state.current.is_none() && state.queue.is_empty()
    }

    /// Reanuda si está en pausa, o carga el siguiente track si no hay nada cargado.
    pub fn play(&self) -> Result<PlayOutcome> {
        let mut state = self.state.lock();
        if state.destroyed {
            return Err(PlayerError::InvalidState {
                op: "play",
                state: state.play_state,
            });
        }

        match state.play_state {
            PlayState::Paused => self.resume_locked(&mut state).map(PlayOutcome::Resumed),
            PlayState::Playing => state
                .current
                .clone()
                .map(PlayOutcome::AlreadyPlaying)
                .ok_or(PlayerError::NothingLoaded),
            PlayState::Idle | PlayState::Stopped => self
                .advance(&mut state, EventCause::Command)
                .map(PlayOutcome::Started)
                .ok_or(PlayerError::QueueEmpty),
        }
    }

    pub fn resume(&self) -> Result<Track> {
        let mut state = self.state.lock();
        self.resume_locked(&mut state)
    }

    pub fn pause(&self) -> Result<Track> {
        let mut state = self.state.lock();
        if state.play_state != PlayState::Playing {
            return Err(PlayerError::InvalidState {
                op: "pause",
                state: state.play_state,
            });
        }
        let track = state.current.clone().ok_or(PlayerError::NothingLoaded)?;

        state.play_state = PlayState::Paused;
        self.transport.pause(self.guild_id);
        info!("⏸️ Reproducción pausada en guild {}", self.guild_id);
        Ok(track)
    }

    /// Detiene la reproducción y libera el transporte. La cola se conserva.
    pub fn stop(&self) {
        let mut state = self.state.lock();
        self.stop_locked(&mut state);
    }

    /// Salta al siguiente track según el modo de repetición
    pub fn skip(&self) -> Result<SkipOutcome> {
        let mut state = self.state.lock();
        if state.destroyed {
            return Err(PlayerError::InvalidState {
                op: "skip",
                state: state.play_state,
            });
        }
        if state.current.is_none() && state.queue.is_empty() {
            return Err(PlayerError::QueueEmpty);
        }

        let skipped = state.current.take();
        let mode = state.repeat_mode;
        let next = match skipped.clone() {
            Some(finished) => self.advance_after(&mut state, finished, mode, EventCause::Command),
            None => self.advance(&mut state, EventCause::Command),
        };
        if next.is_none() {
            self.finish_queue(&mut state, EventCause::Command);
        }

        Ok(SkipOutcome { skipped, next })
    }

    /// Salta a una posición absoluta. El objetivo se ajusta a `[0, duración]`.
    pub fn seek_to(&self, target_ms: i64) -> Result<u64> {
        let mut state = self.state.lock();
        let max = Self::seekable(&state)?.max_position_ms();

        let to = u64::try_from(target_ms.max(0)).unwrap_or(0).min(max);
        self.seek_locked(&mut state, to);
        Ok(to)
    }

    /// Retrocede `by` desde la posición actual, sin bajar de cero.
    ///
    /// The position is read and the seek issued under the same lock, so a
    /// progress callback landing in between cannot skew the target.
    pub fn rewind(&self, by: Duration) -> Result<SeekOutcome> {
        let mut state = self.state.lock();
        let track = Self::seekable(&state)?.clone();

        let from_ms = state.position_ms;
        let to_ms = from_ms.saturating_sub(duration_ms(by));
        self.seek_locked(&mut state, to_ms);
        Ok(SeekOutcome { track, from_ms, to_ms })
    }

    /// Avanza `by` desde la posición actual, sin pasar del final del track.
    pub fn forward(&self, by: Duration) -> Result<SeekOutcome> {
        let mut state = self.state.lock();
        let track = Self::seekable(&state)?.clone();

        let from_ms = state.position_ms;
        let to_ms = from_ms
            .saturating_add(duration_ms(by))
            .min(track.max_position_ms());
        self.seek_locked(&mut state, to_ms);
        Ok(SeekOutcome { track, from_ms, to_ms })
    }

    /// Ajusta el volumen dentro de los límites configurados y devuelve el valor aplicado.
    pub fn set_volume(&self, volume: f32) -> f32 {
        let clamped = self.settings.clamp_volume(volume);
        let mut state = self.state.lock();
        state.volume = clamped;
        if !state.destroyed {
            self.transport.set_volume(self.guild_id, clamped);
        }
        debug!("🔊 Volumen en guild {} ajustado a {}%", self.guild_id, (clamped * 100.0).round());
        clamped
    }

    pub fn set_repeat_mode(&self, mode: RepeatMode) {
        self.state.lock().repeat_mode = mode;
        info!("🔁 Modo de repetición en guild {}: {}", self.guild_id, mode);
    }

    pub fn set_shuffle(&self, enabled: bool) {
        self.state.lock().queue.set_shuffle(enabled);
    }

    /// Mezcla la cola una vez y devuelve cuántos tracks contiene
    pub fn shuffle_queue(&self) -> usize {
        let mut state = self.state.lock();
        state.queue.shuffle();
        state.queue.len()
    }

    pub fn clear_queue(&self) -> usize {
        self.state.lock().queue.clear()
    }

    /// Quita un track de la cola (0 = siguiente)
    pub fn remove_at(&self, index: usize) -> Result<Track> {
        self.state.lock().queue.remove(index)
    }

    pub fn move_track(&self, from: usize, to: usize) -> Result<()> {
        self.state.lock().queue.move_track(from, to)
    }

    /// Progress callback from the transport; never changes the play state.
    pub fn on_position_update(&self, position_ms: u64) {
        let mut state = self.state.lock();
        if state.destroyed {
            return;
        }
        if let Some(max) = state.current.as_ref().map(Track::max_position_ms) {
            state.position_ms = position_ms.min(max);
        }
    }

    /// End-of-track callback from the transport.
    ///
    /// A finished track advances like [`GuildPlayer::skip`]. A failed one is
    /// reported and dropped without being re-queued by the repeat mode, then
    /// playback carries on with the next track.
    pub fn on_track_ended(&self, reason: TrackEndReason) {
        let mut state = self.state.lock();
        if state.destroyed {
            return;
        }
        let Some(finished) = state.current.take() else {
            debug!("Fin de track ignorado en guild {}: nada cargado", self.guild_id);
            return;
        };

        let next = match reason {
            TrackEndReason::Finished => {
                let mode = state.repeat_mode;
                self.advance_after(&mut state, finished, mode, EventCause::TrackEnded)
            }
            TrackEndReason::Failed(reason) => {
                warn!(
                    "❌ Error al reproducir '{}' en guild {}: {}",
                    finished.title(),
                    self.guild_id,
                    reason
                );
                self.emit(PlayerEvent::TrackFailed {
                    guild_id: self.guild_id,
                    track: finished.clone(),
                    reason,
                });
                state.queue.discard(finished);
                self.advance(&mut state, EventCause::TrackEnded)
            }
        };

        if next.is_none() {
            self.finish_queue(&mut state, EventCause::TrackEnded);
        }
    }

    /// Stops for good and releases the transport binding. Later commands
    /// leave the player `Stopped`.
    pub fn destroy(&self) {
        let mut state = self.state.lock();
        state.destroyed = true;
        self.stop_locked(&mut state);
    }

    // Getters

    pub fn is_playing(&self) -> bool {
        self.state.lock().play_state == PlayState::Playing
    }

    pub fn play_state(&self) -> PlayState {
        self.state.lock().play_state
    }

    pub fn current_track(&self) -> Option<Track> {
        self.state.lock().current.clone()
    }

    /// Latest known position of the loaded track, in milliseconds.
    pub fn position_ms(&self) -> u64 {
        self.state.lock().position_ms
    }

    pub fn volume(&self) -> f32 {
        self.state.lock().volume
    }

    pub fn repeat_mode(&self) -> RepeatMode {
        self.state.lock().repeat_mode
    }

    pub fn is_shuffle(&self) -> bool {
        self.state.lock().queue.is_shuffle()
    }

    pub fn history(&self, limit: usize) -> Vec<Track> {
        self.state.lock().queue.history().take(limit).cloned().collect()
    }

    /// Obtiene información de la cola
    pub fn snapshot(&self) -> QueueInfo {
        let state = self.state.lock();
        QueueInfo {
            current: state.current.clone(),
            position_ms: state.position_ms,
            items: state.queue.iter().cloned().collect(),
            repeat_mode: state.repeat_mode,
            shuffle: state.queue.is_shuffle(),
            total_duration: state.queue.total_duration(),
        }
    }

    // Funciones privadas

    fn resume_locked(&self, state: &mut PlayerState) -> Result<Track> {
        if state.play_state != PlayState::Paused {
            return Err(PlayerError::InvalidState {
                op: "resume",
                state: state.play_state,
            });
        }
        let track = state.current.clone().ok_or(PlayerError::NothingLoaded)?;

        state.play_state = PlayState::Playing;
        self.transport.play(self.guild_id);
        info!("▶️ Reproducción reanudada en guild {}", self.guild_id);
        Ok(track)
    }

    fn stop_locked(&self, state: &mut PlayerState) {
        if let Some(track) = state.current.take() {
            state.queue.discard(track);
        }
        state.position_ms = 0;
        state.play_state = PlayState::Stopped;
        self.transport.stop(self.guild_id);
        self.transport.release(self.guild_id);
        info!("⏹️ Reproducción detenida en guild {}", self.guild_id);
    }

    fn seekable(state: &PlayerState) -> Result<&Track> {
        let track = state.current.as_ref().ok_or(PlayerError::NothingLoaded)?;
        if track.is_stream() {
            return Err(PlayerError::NotSeekable);
        }
        Ok(track)
    }

    fn seek_locked(&self, state: &mut PlayerState, position_ms: u64) {
        self.transport.seek(self.guild_id, position_ms);
        state.position_ms = position_ms;
        debug!("⏩ Guild {} posicionado en {} ms", self.guild_id, position_ms);
    }

    fn advance_after(
        &self,
        state: &mut PlayerState,
        finished: Track,
        mode: RepeatMode,
        cause: EventCause,
    ) -> Option<Track> {
        let next = state.queue.next_after(Some(finished), mode)?;
        self.load(state, next.clone(), cause);
        Some(next)
    }

    fn advance(&self, state: &mut PlayerState, cause: EventCause) -> Option<Track> {
        let next = state.queue.pop()?;
        self.load(state, next.clone(), cause);
        Some(next)
    }

    fn load(&self, state: &mut PlayerState, track: Track, cause: EventCause) {
        self.transport.load(self.guild_id, &track);
        self.transport.set_volume(self.guild_id, state.volume);

        info!("🎵 Reproduciendo '{}' en guild {}", track.title(), self.guild_id);
        state.position_ms = 0;
        state.play_state = PlayState::Playing;
        state.current = Some(track.clone());
        self.emit(PlayerEvent::TrackStarted {
            guild_id: self.guild_id,
            track,
            cause,
        });
    }

    fn finish_queue(&self, state: &mut PlayerState, cause: EventCause) {
        state.current = None;
        state.position_ms = 0;
        state.play_state = PlayState::Idle;
        self.transport.stop(self.guild_id);
        info!("📭 Cola terminada en guild {}", self.guild_id);
        self.emit(PlayerEvent::QueueFinished {
            guild_id: self.guild_id,
            cause,
        });
    }

    fn emit(&self, event: PlayerEvent) {
        // Sin suscriptores no es un error
        let _ = self.events.send(event);
    }
}

impl fmt::Debug for GuildPlayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuildPlayer")
            .field("guild_id", &self.guild_id)
            .field("state", &*self.state.lock())
            .finish()
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
