//! Turning user input into playable [`Track`]s.

pub mod ytdlp;

use anyhow::Result;
use async_trait::async_trait;
use serenity::model::id::UserId;
use tracing::{error, info};
use url::Url;

use crate::audio::track::Track;

pub use ytdlp::YtDlpResolver;

/// Resuelve una URL o búsqueda en un track reproducible
#[async_trait]
pub trait TrackResolver: Send + Sync {
    async fn resolve(&self, query: &Query, requested_by: UserId) -> Result<Track>;
}

/// Lo que el usuario pidió reproducir.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    Url(Url),
    Search(String),
}

impl Query {
    /// Accepts `http(s)` URLs, optionally wrapped in `<>` as Discord does to
    /// suppress embeds; anything else is a search. Blank input yields `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }

        let unwrapped = trimmed
            .strip_prefix('<')
            .and_then(|s| s.strip_suffix('>'))
            .unwrap_or(trimmed);

        match Url::parse(unwrapped) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => Some(Query::Url(url)),
            _ => Some(Query::Search(trimmed.to_string())),
        }
    }
}

/// Verifica que yt-dlp y ffmpeg estén instalados
pub async fn verify_dependencies() -> Result<()> {
    for (binary, flag) in [("yt-dlp", "--version"), ("ffmpeg", "-version")] {
        match async_process::Command::new(binary).arg(flag).output().await {
            Ok(output) if output.status.success() => {
                let version = String::from_utf8_lossy(&output.stdout);
                info!("✅ {} versión: {}", binary, version.lines().next().unwrap_or("").trim());
            }
            _ => {
                error!("❌ {} no encontrado", binary);
                anyhow::bail!("{} no disponible", binary);
            }
        }
    }
    Ok(())
}
