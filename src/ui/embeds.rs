use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
};

use super::messages::Tone;

/// Paleta de colores estandarizada para el bot
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
    pub const WARNING_ORANGE: Colour = Colour::from_rgb(255, 193, 7);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const MUSIC_PURPLE: Colour = Colour::from_rgb(138, 43, 226);
}

/// Footer estandarizado para todos los embeds
const STANDARD_FOOTER: &str = "🎵 Guild Player";

/// Envuelve un mensaje ya renderizado en un embed con el color de su tono
pub fn create_reply_embed(tone: Tone, description: &str) -> CreateEmbed {
    let color = match tone {
        Tone::Success => colors::SUCCESS_GREEN,
        Tone::Info => colors::INFO_BLUE,
        Tone::Music => colors::MUSIC_PURPLE,
        Tone::Warning => colors::WARNING_ORANGE,
        Tone::Error => colors::ERROR_RED,
    };

    CreateEmbed::default()
        .description(description)
        .color(color)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
        .timestamp(Timestamp::now())
}

pub fn create_error_embed(description: &str) -> CreateEmbed {
    create_reply_embed(Tone::Error, description)
}
