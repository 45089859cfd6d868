//! Error types for guild player operations.

use serenity::model::id::GuildId;
use thiserror::Error;

use crate::audio::player::PlayState;

/// Failures surfaced by the registry and the per-guild players.
///
/// None of these are fatal: the command layer turns them into soft replies
/// ("nothing playing", "queue is empty", ...).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlayerError {
    /// No player exists for the guild and the operation must not create one.
    #[error("no active player for guild {0}")]
    NotFound(GuildId),

    /// Nothing loaded and nothing queued.
    #[error("the queue is empty")]
    QueueEmpty,

    /// The operation needs a loaded track.
    #[error("no track is loaded")]
    NothingLoaded,

    /// Operation not valid in the current play state.
    #[error("cannot {op} while {state}")]
    InvalidState { op: &'static str, state: PlayState },

    /// Live streams have no length to seek within.
    #[error("the current track is a live stream and cannot be seeked")]
    NotSeekable,

    #[error("no queued track at position {0}")]
    IndexOutOfRange(usize),
}

pub type Result<T> = std::result::Result<T, PlayerError>;
