use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{str::FromStr, time::Duration};

use crate::audio::player::PlayerSettings;
use crate::monitoring::MonitoringConfig;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub command_prefix: String,

    // Audio
    pub default_volume: f32,
    pub min_volume: f32,
    pub max_volume: f32,
    pub auto_play: bool,
    pub max_history: usize,
    pub position_update_ms: u64,

    // Métricas
    pub gauge_interval_secs: u64,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup, falling back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let config = Self {
            // Discord
            discord_token: lookup("DISCORD_TOKEN").context("DISCORD_TOKEN no está definido")?,
            command_prefix: lookup("COMMAND_PREFIX").unwrap_or(defaults.command_prefix),

            // Audio
            default_volume: parse_or(&lookup, "DEFAULT_VOLUME", defaults.default_volume)?,
            min_volume: parse_or(&lookup, "MIN_VOLUME", defaults.min_volume)?,
            max_volume: parse_or(&lookup, "MAX_VOLUME", defaults.max_volume)?,
            auto_play: parse_or(&lookup, "AUTO_PLAY", defaults.auto_play)?,
            max_history: parse_or(&lookup, "MAX_HISTORY", defaults.max_history)?,
            position_update_ms: parse_or(&lookup, "POSITION_UPDATE_MS", defaults.position_update_ms)?,

            // Métricas
            gauge_interval_secs: parse_or(&lookup, "GAUGE_INTERVAL_SECS", defaults.gauge_interval_secs)?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - The Discord token and command prefix must not be empty
    /// - `MIN_VOLUME <= DEFAULT_VOLUME <= MAX_VOLUME`, all finite and non-negative
    /// - Intervals must be greater than 0
    pub fn validate(&self) -> Result<()> {
        if self.discord_token.trim().is_empty() {
            anyhow::bail!("DISCORD_TOKEN must not be empty");
        }

        if self.command_prefix.trim().is_empty() {
            anyhow::bail!("COMMAND_PREFIX must not be empty");
        }

        for (name, value) in [
            ("MIN_VOLUME", self.min_volume),
            ("DEFAULT_VOLUME", self.default_volume),
            ("MAX_VOLUME", self.max_volume),
        ] {
            if !value.is_finite() || value < 0.0 {
                anyhow::bail!("{} must be a non-negative number, got: {}", name, value);
            }
        }

        if self.min_volume > self.max_volume {
            anyhow::bail!(
                "MIN_VOLUME ({}) cannot exceed MAX_VOLUME ({})",
                self.min_volume,
                self.max_volume
            );
        }

        if !(self.min_volume..=self.max_volume).contains(&self.default_volume) {
            anyhow::bail!(
                "Default volume must be between {} and {}, got: {}",
                self.min_volume,
                self.max_volume,
                self.default_volume
            );
        }

        if self.gauge_interval_secs == 0 {
            anyhow::bail!("Gauge interval must be greater than 0");
        }

        if self.position_update_ms == 0 {
            anyhow::bail!("Position update interval must be greater than 0");
        }

        Ok(())
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// The Discord token is never included.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Commands: prefix '{}'\n  \
            Audio: {}% vol ({}%-{}%), autoplay={}, history={}\n  \
            Timers: position every {}ms, gauge every {}s",
            self.command_prefix,
            (self.default_volume * 100.0).round() as u32,
            (self.min_volume * 100.0).round() as u32,
            (self.max_volume * 100.0).round() as u32,
            self.auto_play,
            self.max_history,
            self.position_update_ms,
            self.gauge_interval_secs
        )
    }

    pub fn player_settings(&self) -> PlayerSettings {
        PlayerSettings {
            default_volume: self.default_volume,
            min_volume: self.min_volume,
            max_volume: self.max_volume,
            auto_play: self.auto_play,
            max_history: self.max_history,
        }
    }

    pub fn monitoring(&self) -> MonitoringConfig {
        MonitoringConfig {
            gauge_interval: Duration::from_secs(self.gauge_interval_secs),
        }
    }

    pub fn position_update_interval(&self) -> Duration {
        Duration::from_millis(self.position_update_ms)
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .with_context(|| format!("valor inválido para {key}: '{raw}'")),
        _ => Ok(default),
    }
}

/// Default configuration values.
///
/// Used as fallbacks when environment variables are not provided.
impl Default for Config {
    fn default() -> Self {
        let player = PlayerSettings::default();
        Self {
            // Discord (sin default para el token)
            discord_token: String::new(),
            command_prefix: "!".to_string(),

            // Audio
            default_volume: player.default_volume,
            min_volume: player.min_volume,
            max_volume: player.max_volume,
            auto_play: player.auto_play,
            max_history: player.max_history,
            position_update_ms: 1000,

            // Métricas
            gauge_interval_secs: 60,
        }
    }
}
