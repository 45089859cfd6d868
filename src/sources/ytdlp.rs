use anyhow::{Context, Result};
use async_trait::async_trait;
use serenity::model::id::UserId;
use songbird::input::{AuxMetadata, Compose, YoutubeDl};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info};

use super::{Query, TrackResolver};
use crate::audio::track::Track;

const RESOLVE_TIMEOUT: Duration = Duration::from_secs(25);

/// Resolver basado en yt-dlp, vía el input `YoutubeDl` de songbird.
///
/// Searches go through `ytsearch1:`, so the resolved track always carries
/// the concrete page URL the transport will later hand back to yt-dlp.
pub struct YtDlpResolver {
    http: reqwest::Client,
}

impl YtDlpResolver {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    fn target(query: &Query) -> String {
        match query {
            Query::Url(url) => url.to_string(),
            Query::Search(terms) => format!("ytsearch1:{terms}"),
        }
    }
}

#[async_trait]
impl TrackResolver for YtDlpResolver {
    async fn resolve(&self, query: &Query, requested_by: UserId) -> Result<Track> {
        let target = Self::target(query);
        debug!("🔍 Resolviendo: {}", target);

        let mut source = YoutubeDl::new(self.http.clone(), target.clone());
        let metadata = timeout(RESOLVE_TIMEOUT, source.aux_metadata())
            .await
            .with_context(|| format!("yt-dlp tardó demasiado en resolver '{target}'"))?
            .map_err(|e| anyhow::anyhow!("yt-dlp no pudo resolver '{target}': {e}"))?;

        let track = track_from_metadata(metadata, query, requested_by)?;
        info!("✅ Track resuelto: {} ({})", track.title(), track.uri());
        Ok(track)
    }
}

fn track_from_metadata(metadata: AuxMetadata, query: &Query, requested_by: UserId) -> Result<Track> {
    let uri = match (metadata.source_url, query) {
        (Some(url), _) => url,
        (None, Query::Url(url)) => url.to_string(),
        (None, Query::Search(terms)) => anyhow::bail!("no results for '{terms}'"),
    };
    let title = metadata
        .title
        .or(metadata.track)
        .unwrap_or_else(|| uri.clone());

    let track = Track::new(uri, title, metadata.duration, requested_by);
    Ok(match metadata.artist {
        Some(artist) => track.with_artist(artist),
        None => track,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn searches_use_the_first_result() {
        let query = Query::parse("lofi beats").unwrap();
        assert_eq!(YtDlpResolver::target(&query), "ytsearch1:lofi beats");
    }

    #[test]
    fn metadata_fills_the_track() {
        let query = Query::parse("lofi beats").unwrap();
        let metadata = AuxMetadata {
            title: Some("Lofi Beats".into()),
            artist: Some("Chill Channel".into()),
            duration: Some(Duration::from_secs(3600)),
            source_url: Some("https://www.youtube.com/watch?v=abc".into()),
            ..AuxMetadata::default()
        };

        let track = track_from_metadata(metadata, &query, UserId::new(5)).unwrap();

        assert_eq!(track.uri(), "https://www.youtube.com/watch?v=abc");
        assert_eq!(track.title(), "Lofi Beats");
        assert_eq!(track.artist(), Some("Chill Channel"));
        assert!(!track.is_stream());
    }

    #[test]
    fn live_streams_have_no_duration() {
        let query = Query::parse("https://radio.example/live").unwrap();
        let track = track_from_metadata(AuxMetadata::default(), &query, UserId::new(5)).unwrap();

        assert_eq!(track.uri(), "https://radio.example/live");
        assert_eq!(track.title(), "https://radio.example/live");
        assert!(track.is_stream());
    }

    #[test]
    fn empty_search_result_is_an_error() {
        let query = Query::parse("zzzz no such song").unwrap();
        assert!(track_from_metadata(AuxMetadata::default(), &query, UserId::new(5)).is_err());
    }
}
