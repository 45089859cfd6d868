use chrono::{DateTime, Utc};
use serenity::model::id::UserId;
use std::time::Duration;

/// Representa un track reproducible.
///
/// Immutable once built: the queue, the player and the history all hold
/// clones of the same value.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    uri: String,
    title: String,
    artist: Option<String>,
    duration: Option<Duration>,
    requested_by: UserId,
    requested_at: DateTime<Utc>,
}

impl Track {
    pub fn new(
        uri: impl Into<String>,
        title: impl Into<String>,
        duration: Option<Duration>,
        requested_by: UserId,
    ) -> Self {
        Self {
            uri: uri.into(),
            title: title.into(),
            artist: None,
            duration,
            requested_by,
            requested_at: Utc::now(),
        }
    }

    pub fn with_artist(mut self, artist: impl Into<String>) -> Self {
        self.artist = Some(artist.into());
        self
    }

    // Getters
    pub fn uri(&self) -> &str {
        &self.uri
    }
    pub fn title(&self) -> &str {
        &self.title
    }
    pub fn artist(&self) -> Option<&str> {
        self.artist.as_deref()
    }
    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }
    pub fn requested_by(&self) -> UserId {
        self.requested_by
    }
    pub fn requested_at(&self) -> DateTime<Utc> {
        self.requested_at
    }

    /// Tracks without a known length are live streams.
    pub fn is_stream(&self) -> bool {
        self.duration.is_none()
    }

    /// Upper bound for the playback position, in milliseconds.
    pub fn max_position_ms(&self) -> u64 {
        self.duration
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or(u64::MAX)
    }
}
