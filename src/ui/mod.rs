//! Rendering of command replies and playback announcements.
//!
//! [`messages`] turns replies into plain text; [`embeds`] wraps that text for
//! Discord.

pub mod embeds;
pub mod messages;
