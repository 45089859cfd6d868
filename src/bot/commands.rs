//! Comandos de texto y su ejecución sobre el registro de players.
//!
//! Parsing is pure and produces a closed set of [`Command`]s with validated
//! arguments. [`execute`] runs everything that only touches the registry;
//! joining voice and resolving tracks stay in the event handler.

use serenity::model::id::GuildId;
use std::{str::FromStr, time::Duration};
use thiserror::Error;

use crate::{
    audio::{
        player::{EnqueueOutcome, PlayOutcome},
        queue::{QueueInfo, RepeatMode},
        registry::PlayerRegistry,
        track::Track,
    },
    error::{PlayerError, Result},
    sources::Query,
};

pub const QUEUE_PAGE_SIZE: usize = 10;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Resolve and enqueue; `play` without arguments resumes instead.
    Play(Query),
    Join,
    Leave,
    Help,
    Control(ControlCommand),
}

/// Comandos que solo operan sobre el player del guild
#[derive(Debug, Clone, PartialEq)]
pub enum ControlCommand {
    /// `play` without arguments: resume, or start the next queued track.
    Play,
    Pause,
    Resume,
    /// Vacía la cola y detiene la reproducción
    Stop,
    Skip,
    Seek(Duration),
    Forward(Duration),
    Rewind(Duration),
    /// Percentage, 100 = unity gain.
    Volume(u16),
    /// `None` cycles to the next mode.
    Repeat(Option<RepeatMode>),
    /// Toggles shuffle mode.
    Shuffle,
    /// Reorders the queue once.
    ShuffleQueue,
    NowPlaying,
    Queue { page: usize },
    Clear,
    /// 1-based queue position.
    Remove(usize),
    /// 1-based positions, `from` then `to`.
    Move { from: usize, to: usize },
    History,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("unknown command `{0}`")]
    Unknown(String),

    #[error("missing argument, usage: `{0}`")]
    MissingArgument(&'static str),

    #[error("invalid argument `{value}`, usage: `{usage}`")]
    InvalidArgument { value: String, usage: &'static str },
}

/// Parses a message. Returns `None` when it does not start with `prefix`.
pub fn parse(content: &str, prefix: &str) -> Option<std::result::Result<Command, CommandError>> {
    let body = content.trim_start().strip_prefix(prefix)?;
    let (name, args) = match body.split_once(char::is_whitespace) {
        Some((name, args)) => (name, args.trim()),
        None => (body, ""),
    };
    if name.is_empty() {
        return None;
    }

    Some(parse_command(&name.to_ascii_lowercase(), args))
}

fn parse_command(name: &str, args: &str) -> std::result::Result<Command, CommandError> {
    use ControlCommand as C;

    let control = |c: ControlCommand| -> std::result::Result<Command, CommandError> { Ok(Command::Control(c)) };
    match name {
        "play" | "p" => match Query::parse(args) {
            Some(query) => Ok(Command::Play(query)),
            None => control(C::Play),
        },
        "join" | "summon" => Ok(Command::Join),
        "leave" | "disconnect" | "dc" => Ok(Command::Leave),
        "help" | "h" => Ok(Command::Help),
        "pause" => control(C::Pause),
        "resume" | "unpause" => control(C::Resume),
        "stop" => control(C::Stop),
        "skip" | "s" | "next" => control(C::Skip),
        "seek" => control(C::Seek(required_time(args, "seek <[[hh:]mm:]ss>")?)),
        "forward" | "fwd" => control(C::Forward(required_time(args, "forward <[[hh:]mm:]ss>")?)),
        "rewind" | "rew" => control(C::Rewind(required_time(args, "rewind <[[hh:]mm:]ss>")?)),
        "volume" | "vol" => control(C::Volume(required(args, "volume <0-150>")?)),
        "repeat" | "loop" => {
            if args.is_empty() {
                control(C::Repeat(None))
            } else {
                control(C::Repeat(Some(required(args, "repeat [off|track|queue]")?)))
            }
        }
        "shuffle" => match args {
            "" => control(C::Shuffle),
            "now" | "once" => control(C::ShuffleQueue),
            other => Err(CommandError::InvalidArgument {
                value: other.to_string(),
                usage: "shuffle [now]",
            }),
        },
        "nowplaying" | "np" => control(C::NowPlaying),
        "queue" | "q" | "list" => {
            let page = if args.is_empty() { 1 } else { required(args, "queue [page]")? };
            control(C::Queue { page })
        }
        "clear" => control(C::Clear),
        "remove" | "rm" => control(C::Remove(required(args, "remove <position>")?)),
        "move" | "mv" => {
            const USAGE: &str = "move <from> <to>";
            let mut positions = args.split_whitespace();
            let (Some(from), Some(to)) = (positions.next(), positions.next()) else {
                return Err(CommandError::MissingArgument(USAGE));
            };
            control(C::Move {
                from: required(from, USAGE)?,
                to: required(to, USAGE)?,
            })
        }
        "history" => control(C::History),
        other => Err(CommandError::Unknown(other.to_string())),
    }
}

fn required<T: FromStr>(args: &str, usage: &'static str) -> std::result::Result<T, CommandError> {
    if args.is_empty() {
        return Err(CommandError::MissingArgument(usage));
    }
    args.parse().map_err(|_| CommandError::InvalidArgument {
        value: args.to_string(),
        usage,
    })
}

fn required_time(args: &str, usage: &'static str) -> std::result::Result<Duration, CommandError> {
    if args.is_empty() {
        return Err(CommandError::MissingArgument(usage));
    }
    parse_time(args).ok_or_else(|| CommandError::InvalidArgument {
        value: args.to_string(),
        usage,
    })
}

/// Parses `ss`, `mm:ss`, `hh:mm:ss` or a humantime span such as `1m30s`.
pub fn parse_time(input: &str) -> Option<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }

    if input.contains(':') || input.chars().all(|c| c.is_ascii_digit()) {
        let parts: Vec<&str> = input.split(':').collect();
        if parts.len() > 3 {
            return None;
        }
        let mut seconds: u64 = 0;
        for (i, part) in parts.iter().enumerate() {
            let value: u64 = part.parse().ok()?;
            // Minutos y segundos por debajo de 60, salvo en el primer campo
            if i > 0 && value >= 60 {
                return None;
            }
            seconds = seconds.checked_mul(60)?.checked_add(value)?;
        }
        return Some(Duration::from_secs(seconds));
    }

    humantime::parse_duration(input).ok()
}

/// Resultado de un comando, listo para mostrar
#[derive(Debug, Clone, PartialEq)]
pub enum CommandReply {
    Started(Track),
    Queued { track: Track, position: usize },
    Paused(Track),
    Resumed(Track),
    AlreadyPlaying(Track),
    Stopped { cleared: usize },
    Skipped { skipped: Option<Track>, next: Option<Track> },
    Seeked { track: Track, position_ms: u64 },
    QueueEmpty,
    Volume(f32),
    Repeat(RepeatMode),
    Shuffle(bool),
    Shuffled(usize),
    NowPlaying { track: Track, position_ms: u64, paused: bool },
    NothingPlaying,
    Queue { info: QueueInfo, page: usize },
    Cleared(usize),
    Removed(Track),
    Moved { from: usize, to: usize },
    History(Vec<Track>),
    Joined,
    Left,
    Help { prefix: String },
}

/// Adds a resolved track to the guild's player, creating it if needed.
pub fn enqueue(registry: &PlayerRegistry, guild_id: GuildId, track: Track) -> CommandReply {
    let player = registry.get_or_create(guild_id);
    match player.enqueue(track.clone()) {
        EnqueueOutcome::Started(started) => CommandReply::Started(started),
        EnqueueOutcome::Queued { position } => CommandReply::Queued { track, position },
    }
}

/// Runs a control command against the guild's player.
///
/// Commands that only read or tweak an existing session never create one;
/// they fail with [`PlayerError::NotFound`] instead.
pub fn execute(registry: &PlayerRegistry, guild_id: GuildId, command: ControlCommand) -> Result<CommandReply> {
    let existing = || registry.get_existing(guild_id).ok_or(PlayerError::NotFound(guild_id));

    match command {
        ControlCommand::Pause => existing()?.pause().map(CommandReply::Paused),
        ControlCommand::Resume => existing()?.resume().map(CommandReply::Resumed),
        ControlCommand::Play => Ok(match registry.get_or_create(guild_id).play()? {
            PlayOutcome::Started(track) => CommandReply::Started(track),
            PlayOutcome::Resumed(track) => CommandReply::Resumed(track),
            PlayOutcome::AlreadyPlaying(track) => CommandReply::AlreadyPlaying(track),
        }),
        ControlCommand::Stop => {
            let player = existing()?;
            let cleared = player.clear_queue();
            player.stop();
            Ok(CommandReply::Stopped { cleared })
        }
        ControlCommand::Skip => {
            let outcome = existing()?.skip()?;
            Ok(CommandReply::Skipped {
                skipped: outcome.skipped,
                next: outcome.next,
            })
        }
        ControlCommand::Seek(to) => {
            let player = existing()?;
            let target = i64::try_from(to.as_millis()).unwrap_or(i64::MAX);
            let position_ms = player.seek_to(target)?;
            let track = player.current_track().ok_or(PlayerError::NothingLoaded)?;
            Ok(CommandReply::Seeked { track, position_ms })
        }
        ControlCommand::Forward(by) | ControlCommand::Rewind(by) => {
            let Some(player) = registry.get_existing(guild_id) else {
                return Ok(CommandReply::QueueEmpty);
            };
            if player.is_queue_empty() {
                return Ok(CommandReply::QueueEmpty);
            }
            let outcome = if matches!(command, ControlCommand::Rewind(_)) {
                player.rewind(by)?
            } else {
                player.forward(by)?
            };
            Ok(CommandReply::Seeked {
                track: outcome.track,
                position_ms: outcome.to_ms,
            })
        }
        ControlCommand::Volume(percent) => {
            let applied = registry
                .get_or_create(guild_id)
                .set_volume(f32::from(percent) / 100.0);
            Ok(CommandReply::Volume(applied))
        }
        ControlCommand::Repeat(mode) => {
            let player = registry.get_or_create(guild_id);
            let mode = mode.unwrap_or_else(|| player.repeat_mode().cycle());
            player.set_repeat_mode(mode);
            Ok(CommandReply::Repeat(mode))
        }
        ControlCommand::Shuffle => {
            let player = registry.get_or_create(guild_id);
            let enabled = !player.is_shuffle();
            player.set_shuffle(enabled);
            Ok(CommandReply::Shuffle(enabled))
        }
        ControlCommand::ShuffleQueue => Ok(CommandReply::Shuffled(existing()?.shuffle_queue())),
        ControlCommand::NowPlaying => {
            let Some(player) = registry.get_existing(guild_id) else {
                return Ok(CommandReply::NothingPlaying);
            };
            let snapshot = player.snapshot();
            Ok(match snapshot.current {
                Some(track) => CommandReply::NowPlaying {
                    track,
                    position_ms: snapshot.position_ms,
                    paused: !player.is_playing(),
                },
                None => CommandReply::NothingPlaying,
            })
        }
        ControlCommand::Queue { page } => {
            let player = registry.get_existing(guild_id).filter(|p| !p.is_queue_empty());
            Ok(match player {
                Some(player) => CommandReply::Queue {
                    info: player.snapshot(),
                    page,
                },
                None => CommandReply::QueueEmpty,
            })
        }
        ControlCommand::Clear => Ok(CommandReply::Cleared(existing()?.clear_queue())),
        ControlCommand::Remove(position) => {
            let index = position.checked_sub(1).ok_or(PlayerError::IndexOutOfRange(0))?;
            existing()?
                .remove_at(index)
                .map(CommandReply::Removed)
                .map_err(|_| PlayerError::IndexOutOfRange(position))
        }
        ControlCommand::Move { from, to } => {
            let from_index = from.checked_sub(1).ok_or(PlayerError::IndexOutOfRange(from))?;
            let to_index = to.checked_sub(1).ok_or(PlayerError::IndexOutOfRange(to))?;
            existing()?.move_track(from_index, to_index).map_err(|e| match e {
                PlayerError::IndexOutOfRange(index) if index == from_index => PlayerError::IndexOutOfRange(from),
                PlayerError::IndexOutOfRange(_) => PlayerError::IndexOutOfRange(to),
                other => other,
            })?;
            Ok(CommandReply::Moved { from, to })
        }
        ControlCommand::History => Ok(CommandReply::History(
            registry
                .get_existing(guild_id)
                .map(|p| p.history(QUEUE_PAGE_SIZE))
                .unwrap_or_default(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{
        player::{PlayState, PlayerSettings},
        transport::testing::RecordingTransport,
    };
    use pretty_assertions::assert_eq;
    use serenity::model::id::UserId;
    use std::sync::Arc;

    fn guild() -> GuildId {
        GuildId::new(77)
    }

    fn registry() -> PlayerRegistry {
        PlayerRegistry::new(Arc::new(RecordingTransport::default()), PlayerSettings::default())
    }

    fn track(name: &str, secs: u64) -> Track {
        Track::new(
            format!("https://example.com/{name}"),
            name,
            Some(Duration::from_secs(secs)),
            UserId::new(1),
        )
    }

    fn cmd(content: &str) -> Command {
        parse(content, "!").expect("prefixed").expect("valid")
    }

    #[test]
    fn ignores_messages_without_prefix() {
        assert!(parse("hello there", "!").is_none());
        assert!(parse("!", "!").is_none());
        assert!(parse("! skip", "!").is_none());
    }

    #[test]
    fn parses_commands_and_arguments() {
        assert_eq!(cmd("!skip"), Command::Control(ControlCommand::Skip));
        assert_eq!(cmd("!NP"), Command::Control(ControlCommand::NowPlaying));
        assert_eq!(
            cmd("!rewind 1:30"),
            Command::Control(ControlCommand::Rewind(Duration::from_secs(90)))
        );
        assert_eq!(
            cmd("!repeat all"),
            Command::Control(ControlCommand::Repeat(Some(RepeatMode::Queue)))
        );
        assert_eq!(cmd("!loop"), Command::Control(ControlCommand::Repeat(None)));
        assert_eq!(cmd("!queue 3"), Command::Control(ControlCommand::Queue { page: 3 }));
        assert_eq!(cmd("!play"), Command::Control(ControlCommand::Play));
        assert_eq!(cmd("!unpause"), Command::Control(ControlCommand::Resume));
        assert_eq!(cmd("!shuffle now"), Command::Control(ControlCommand::ShuffleQueue));
        assert_eq!(
            cmd("!play   daft punk  "),
            Command::Play(Query::Search("daft punk".into()))
        );
        assert_eq!(
            parse(";;vol 80", ";;"),
            Some(Ok(Command::Control(ControlCommand::Volume(80))))
        );
    }

    #[test]
    fn reports_bad_input() {
        assert_eq!(parse("!dance", "!"), Some(Err(CommandError::Unknown("dance".into()))));
        assert!(matches!(parse("!seek", "!"), Some(Err(CommandError::MissingArgument(_)))));
        assert!(matches!(
            parse("!volume loud", "!"),
            Some(Err(CommandError::InvalidArgument { value, .. })) if value == "loud"
        ));
        assert!(matches!(parse("!rewind 1:75", "!"), Some(Err(CommandError::InvalidArgument { .. }))));
    }

    #[test]
    fn time_formats() {
        assert_eq!(parse_time("45"), Some(Duration::from_secs(45)));
        assert_eq!(parse_time("2:05"), Some(Duration::from_secs(125)));
        assert_eq!(parse_time("1:00:01"), Some(Duration::from_secs(3601)));
        assert_eq!(parse_time("90:00"), Some(Duration::from_secs(5400)));
        assert_eq!(parse_time("1m30s"), Some(Duration::from_secs(90)));
        assert_eq!(parse_time("1:2:3:4"), None);
        assert_eq!(parse_time("soon"), None);
        assert_eq!(parse_time(""), None);
    }

    #[test]
    fn rewind_without_player_reports_empty_queue() {
        let registry = registry();
        assert_eq!(
            execute(&registry, guild(), ControlCommand::Rewind(Duration::from_secs(10))),
            Ok(CommandReply::QueueEmpty)
        );
        assert!(registry.get_existing(guild()).is_none());

        registry.get_or_create(guild());
        assert_eq!(
            execute(&registry, guild(), ControlCommand::Rewind(Duration::from_secs(10))),
            Ok(CommandReply::QueueEmpty)
        );
    }

    #[test]
    fn rewind_clamps_at_track_start() {
        let registry = registry();
        enqueue(&registry, guild(), track("a", 300));
        registry.get_existing(guild()).unwrap().on_position_update(90_000);

        let reply = execute(&registry, guild(), ControlCommand::Rewind(Duration::from_secs(120))).unwrap();
        assert!(matches!(reply, CommandReply::Seeked { position_ms: 0, .. }));

        registry.get_existing(guild()).unwrap().on_position_update(90_000);
        let reply = execute(&registry, guild(), ControlCommand::Rewind(Duration::from_secs(30))).unwrap();
        assert!(matches!(reply, CommandReply::Seeked { position_ms: 60_000, .. }));
    }

    #[test]
    fn enqueue_reports_start_then_position() {
        let registry = registry();
        assert!(matches!(
            enqueue(&registry, guild(), track("a", 100)),
            CommandReply::Started(t) if t.title() == "a"
        ));
        assert!(matches!(
            enqueue(&registry, guild(), track("b", 100)),
            CommandReply::Queued { position: 1, .. }
        ));
    }

    #[test]
    fn control_commands_need_an_existing_player() {
        let registry = registry();
        assert_eq!(
            execute(&registry, guild(), ControlCommand::Pause),
            Err(PlayerError::NotFound(guild()))
        );
        assert_eq!(
            execute(&registry, guild(), ControlCommand::Skip),
            Err(PlayerError::NotFound(guild()))
        );
        assert_eq!(execute(&registry, guild(), ControlCommand::NowPlaying), Ok(CommandReply::NothingPlaying));
        assert_eq!(
            execute(&registry, guild(), ControlCommand::Queue { page: 1 }),
            Ok(CommandReply::QueueEmpty)
        );
        assert!(registry.is_empty());
    }

    #[test]
    fn stop_clears_queue_and_stops() {
        let registry = registry();
        enqueue(&registry, guild(), track("a", 100));
        enqueue(&registry, guild(), track("b", 100));
        enqueue(&registry, guild(), track("c", 100));

        assert_eq!(
            execute(&registry, guild(), ControlCommand::Stop),
            Ok(CommandReply::Stopped { cleared: 2 })
        );
        let player = registry.get_existing(guild()).unwrap();
        assert_eq!(player.play_state(), PlayState::Stopped);
        assert!(player.is_queue_empty());
    }

    #[test]
    fn volume_percentages_are_clamped() {
        let registry = registry();
        assert_eq!(execute(&registry, guild(), ControlCommand::Volume(80)), Ok(CommandReply::Volume(0.8)));
        assert_eq!(execute(&registry, guild(), ControlCommand::Volume(400)), Ok(CommandReply::Volume(1.5)));
    }

    #[test]
    fn repeat_cycles_and_shuffle_toggles() {
        let registry = registry();
        assert_eq!(
            execute(&registry, guild(), ControlCommand::Repeat(None)),
            Ok(CommandReply::Repeat(RepeatMode::Queue))
        );
        assert_eq!(
            execute(&registry, guild(), ControlCommand::Repeat(Some(RepeatMode::Off))),
            Ok(CommandReply::Repeat(RepeatMode::Off))
        );
        assert_eq!(execute(&registry, guild(), ControlCommand::Shuffle), Ok(CommandReply::Shuffle(true)));
        assert_eq!(execute(&registry, guild(), ControlCommand::Shuffle), Ok(CommandReply::Shuffle(false)));
    }

    #[test]
    fn remove_uses_one_based_positions() {
        let registry = registry();
        enqueue(&registry, guild(), track("a", 100));
        enqueue(&registry, guild(), track("b", 100));
        enqueue(&registry, guild(), track("c", 100));

        assert!(matches!(
            execute(&registry, guild(), ControlCommand::Remove(2)),
            Ok(CommandReply::Removed(t)) if t.title() == "c"
        ));
        assert_eq!(
            execute(&registry, guild(), ControlCommand::Remove(0)),
            Err(PlayerError::IndexOutOfRange(0))
        );
        assert_eq!(
            execute(&registry, guild(), ControlCommand::Remove(5)),
            Err(PlayerError::IndexOutOfRange(5))
        );
    }

    #[test]
    fn move_reorders_the_queue() {
        let registry = registry();
        enqueue(&registry, guild(), track("a", 100));
        enqueue(&registry, guild(), track("b", 100));
        enqueue(&registry, guild(), track("c", 100));
        enqueue(&registry, guild(), track("d", 100));

        assert_eq!(
            parse("!move 3 1", "!"),
            Some(Ok(Command::Control(ControlCommand::Move { from: 3, to: 1 })))
        );
        assert_eq!(
            execute(&registry, guild(), ControlCommand::Move { from: 3, to: 1 }),
            Ok(CommandReply::Moved { from: 3, to: 1 })
        );
        let order: Vec<String> = registry
            .get_existing(guild())
            .unwrap()
            .snapshot()
            .items
            .iter()
            .map(|t| t.title().to_string())
            .collect();
        assert_eq!(order, vec!["d", "b", "c"]);
        assert_eq!(
            execute(&registry, guild(), ControlCommand::Move { from: 9, to: 1 }),
            Err(PlayerError::IndexOutOfRange(9))
        );
    }

    #[test]
    fn now_playing_reports_pause() {
        let registry = registry();
        enqueue(&registry, guild(), track("a", 100));
        execute(&registry, guild(), ControlCommand::Pause).unwrap();

        assert!(matches!(
            execute(&registry, guild(), ControlCommand::NowPlaying),
            Ok(CommandReply::NowPlaying { paused: true, .. })
        ));
        assert!(matches!(
            execute(&registry, guild(), ControlCommand::Resume),
            Ok(CommandReply::Resumed(_))
        ));
    }

    #[test]
    fn resume_needs_a_paused_player_but_play_starts_one() {
        let registry = PlayerRegistry::new(
            Arc::new(RecordingTransport::default()),
            PlayerSettings {
                auto_play: false,
                ..PlayerSettings::default()
            },
        );
        assert_eq!(
            execute(&registry, guild(), ControlCommand::Resume),
            Err(PlayerError::NotFound(guild()))
        );

        enqueue(&registry, guild(), track("a", 100));
        assert_eq!(
            execute(&registry, guild(), ControlCommand::Resume),
            Err(PlayerError::InvalidState {
                op: "resume",
                state: PlayState::Idle
            })
        );
        assert!(matches!(
            execute(&registry, guild(), ControlCommand::Play),
            Ok(CommandReply::Started(t)) if t.title() == "a"
        ));
    }

    #[test]
    fn shuffle_now_keeps_every_queued_track() {
        let registry = registry();
        for name in ["a", "b", "c", "d"] {
            enqueue(&registry, guild(), track(name, 100));
        }

        assert_eq!(
            execute(&registry, guild(), ControlCommand::ShuffleQueue),
            Ok(CommandReply::Shuffled(3))
        );
        let mut titles: Vec<String> = registry
            .get_existing(guild())
            .unwrap()
            .snapshot()
            .items
            .iter()
            .map(|t| t.title().to_string())
            .collect();
        titles.sort();
        assert_eq!(titles, vec!["b", "c", "d"]);
    }
}
