use serenity::model::mention::Mentionable;
use std::time::Duration;

use crate::{
    audio::{player::PlayerEvent, track::Track},
    bot::commands::{CommandError, CommandReply, QUEUE_PAGE_SIZE},
    error::PlayerError,
};

/// Tono del mensaje; decide el color del embed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Success,
    Info,
    Music,
    Warning,
    Error,
}

/// Texto de respuesta para un comando exitoso
pub fn render(reply: &CommandReply) -> (Tone, String) {
    match reply {
        CommandReply::Started(track) => (Tone::Music, format!("🎵 Now playing {}", describe(track))),
        CommandReply::Queued { track, position } => (
            Tone::Success,
            format!("➕ Queued {} at position #{}", describe(track), position),
        ),
        CommandReply::Paused(track) => (Tone::Info, format!("⏸️ Paused **{}**", track.title())),
        CommandReply::Resumed(track) => (Tone::Info, format!("▶️ Resumed **{}**", track.title())),
        CommandReply::AlreadyPlaying(track) => {
            (Tone::Info, format!("🎵 Already playing **{}**", track.title()))
        }
        CommandReply::Stopped { cleared } => (
            Tone::Info,
            format!("⏹️ Stopped playback and cleared {}", plural(*cleared, "track")),
        ),
        CommandReply::Skipped { skipped, next } => {
            let skipped = skipped
                .as_ref()
                .map(|t| format!("⏭️ Skipped **{}**", t.title()))
                .unwrap_or_else(|| "⏭️ Skipped".to_string());
            let next = match next {
                Some(track) => format!(", now playing {}", describe(track)),
                None => ". The queue is finished".to_string(),
            };
            (Tone::Music, format!("{skipped}{next}"))
        }
        CommandReply::Seeked { track, position_ms } => (
            Tone::Info,
            format!(
                "⏩ **{}** is now at `{}`",
                track.title(),
                position_label(*position_ms, track.duration())
            ),
        ),
        CommandReply::QueueEmpty => (Tone::Warning, "📭 The queue is empty".to_string()),
        CommandReply::Volume(volume) => (
            Tone::Info,
            format!("🔊 Volume set to {}%", (volume * 100.0).round() as u32),
        ),
        CommandReply::Repeat(mode) => (Tone::Info, format!("🔁 Repeat mode: **{mode}**")),
        CommandReply::Shuffle(enabled) => (
            Tone::Info,
            format!("🔀 Shuffle {}", if *enabled { "enabled" } else { "disabled" }),
        ),
        CommandReply::Shuffled(count) => (Tone::Info, format!("🔀 Shuffled {}", plural(*count, "track"))),
        CommandReply::NowPlaying {
            track,
            position_ms,
            paused,
        } => {
            let icon = if *paused { "⏸️" } else { "🎵" };
            let bar = track
                .duration()
                .map(|d| format!("\n{}", progress_bar(*position_ms, d)))
                .unwrap_or_default();
            (
                Tone::Music,
                format!(
                    "{icon} {} `{}`{bar}\nRequested by {} <t:{}:R>",
                    describe(track),
                    position_label(*position_ms, track.duration()),
                    track.requested_by().mention(),
                    track.requested_at().timestamp()
                ),
            )
        }
        CommandReply::NothingPlaying => (Tone::Warning, "🔇 Nothing is playing".to_string()),
        CommandReply::Queue { info, page } => {
            let page = info.get_page(*page, QUEUE_PAGE_SIZE);
            let mut lines = Vec::new();
            if let Some(current) = &info.current {
                lines.push(format!(
                    "🎵 **Now:** {} `{}`",
                    describe(current),
                    position_label(info.position_ms, current.duration())
                ));
            }
            for (offset, track) in page.items.iter().enumerate() {
                lines.push(format!(
                    "`{}.` {} `{}` · {}",
                    page.first_index + offset + 1,
                    describe(track),
                    length_label(track.duration()),
                    track.requested_by().mention()
                ));
            }
            lines.push(format!(
                "Page {}/{} · {} · {} total · repeat {} · shuffle {}",
                page.current_page,
                page.total_pages,
                plural(page.total_items, "track"),
                format_time(duration_ms(info.total_duration)),
                info.repeat_mode,
                if info.shuffle { "on" } else { "off" }
            ));
            (Tone::Info, lines.join("\n"))
        }
        CommandReply::Cleared(count) => (Tone::Info, format!("🗑️ Removed {} from the queue", plural(*count, "track"))),
        CommandReply::Removed(track) => (Tone::Info, format!("🗑️ Removed **{}**", track.title())),
        CommandReply::Moved { from, to } => (Tone::Info, format!("↕️ Moved track #{from} to #{to}")),
        CommandReply::History(tracks) if tracks.is_empty() => {
            (Tone::Warning, "📜 Nothing has been played yet".to_string())
        }
        CommandReply::History(tracks) => {
            let lines: Vec<String> = tracks
                .iter()
                .enumerate()
                .map(|(i, t)| format!("`{}.` {}", i + 1, describe(t)))
                .collect();
            (Tone::Info, format!("📜 Recently played\n{}", lines.join("\n")))
        }
        CommandReply::Joined => (Tone::Success, "🔊 Joined your voice channel".to_string()),
        CommandReply::Left => (Tone::Info, "👋 Left the voice channel".to_string()),
        CommandReply::Help { prefix } => (Tone::Info, help(prefix)),
    }
}

/// Texto para errores del player
pub fn render_error(error: &PlayerError) -> String {
    match error {
        PlayerError::NotFound(_) => "🔇 Nothing is playing in this server".to_string(),
        PlayerError::QueueEmpty => "📭 The queue is empty".to_string(),
        PlayerError::NothingLoaded => "🔇 No track is loaded".to_string(),
        PlayerError::InvalidState { op, state } => format!("⚠️ Can't {op} while the player is {state}"),
        PlayerError::NotSeekable => "📡 Live streams can't be seeked".to_string(),
        PlayerError::IndexOutOfRange(position) => format!("❌ There is no track at position #{position}"),
    }
}

pub fn render_command_error(error: &CommandError, prefix: &str) -> String {
    match error {
        CommandError::Unknown(name) => format!("❓ Unknown command `{prefix}{name}`. Try `{prefix}help`"),
        CommandError::MissingArgument(usage) => format!("❌ Usage: `{prefix}{usage}`"),
        CommandError::InvalidArgument { value, usage } => {
            format!("❌ `{value}` is not valid. Usage: `{prefix}{usage}`")
        }
    }
}

/// Anuncio para el canal de texto cuando cambia la reproducción
pub fn render_event(event: &PlayerEvent) -> (Tone, String) {
    match event {
        PlayerEvent::TrackStarted { track, .. } => (Tone::Music, format!("🎵 Now playing {}", describe(track))),
        PlayerEvent::TrackFailed { track, reason, .. } => (
            Tone::Error,
            format!("❌ Could not play **{}**: {}", track.title(), reason),
        ),
        PlayerEvent::QueueFinished { .. } => (Tone::Info, "📭 The queue is finished".to_string()),
    }
}

/// Formatea milisegundos como `m:ss` o `h:mm:ss`
pub fn format_time(ms: u64) -> String {
    let total_seconds = ms / 1000;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}

/// Barra de progreso de 20 segmentos
pub fn progress_bar(position_ms: u64, length: Duration) -> String {
    const SEGMENTS: u64 = 20;
    let length_ms = duration_ms(length).max(1);
    let filled = (position_ms.min(length_ms) * SEGMENTS / length_ms) as usize;
    let empty = SEGMENTS as usize - filled;
    format!("`[{}{}]`", "█".repeat(filled), "▒".repeat(empty))
}

fn help(prefix: &str) -> String {
    let commands = [
        ("play <url|search>", "queue a track, or resume without arguments"),
        ("pause / resume", "pause or resume playback"),
        ("skip", "skip the current track"),
        ("stop", "stop and clear the queue"),
        ("seek <time>", "jump to a position, e.g. 1:30"),
        ("forward <time> / rewind <time>", "move within the track"),
        ("volume <0-150>", "set the volume"),
        ("repeat [off|track|queue]", "set or cycle the repeat mode"),
        ("shuffle [now]", "toggle shuffle mode, or shuffle the queue once"),
        ("queue [page] / np / history", "show the queue, current or past tracks"),
        ("remove <position> / move <from> <to> / clear", "edit the queue"),
        ("join / leave", "join or leave your voice channel"),
    ];
    let lines: Vec<String> = commands
        .iter()
        .map(|(usage, what)| format!("`{prefix}{usage}` {what}"))
        .collect();
    format!("📖 **Commands**\n{}", lines.join("\n"))
}

fn describe(track: &Track) -> String {
    match track.artist() {
        Some(artist) => format!("**{}** by {}", track.title(), artist),
        None => format!("**{}**", track.title()),
    }
}

fn position_label(position_ms: u64, length: Option<Duration>) -> String {
    format!("{} / {}", format_time(position_ms), length_label(length))
}

fn length_label(length: Option<Duration>) -> String {
    match length {
        Some(length) => format_time(duration_ms(length)),
        None => "🔴 LIVE".to_string(),
    }
}

fn plural(count: usize, noun: &str) -> String {
    if count == 1 {
        format!("1 {noun}")
    } else {
        format!("{count} {noun}s")
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
