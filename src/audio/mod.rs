//! # Audio Module
//!
//! Per-guild playback sessions and the boundary to the audio backend.
//!
//! ## Architecture
//!
//! ### [`registry`] - Player Registry
//! - Exactly one [`player::GuildPlayer`] per guild, created on demand
//! - Destroy-on-leave, with a read-only view for the metrics reporter
//!
//! ### [`player`] - Guild Player
//! - State machine `Idle -> Playing <-> Paused`, any state `-> Stopped`
//! - Repeat modes, seeking with clamped positions, volume limits
//!
//! ### [`queue`] - Queue Management
//! - FIFO queue with shuffle and repeat handling
//! - Bounded play history and paged snapshots
//!
//! ### [`transport`] - Transport Boundary
//! - Fire-and-forget commands out, [`transport::TransportEvent`]s back in
//! - [`songbird_transport`] is the production implementation
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! let registry = Arc::new(PlayerRegistry::new(transport, PlayerSettings::default()));
//!
//! let player = registry.get_or_create(guild_id);
//! player.enqueue(track);
//! player.rewind(Duration::from_secs(10))?;
//!
//! registry.destroy(guild_id);
//! ```

pub mod player;
pub mod queue;
pub mod registry;
pub mod songbird_transport;
pub mod track;
pub mod transport;
