use anyhow::Result;
use serenity::{model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::{sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

mod audio;
mod bot;
mod config;
mod error;
mod monitoring;
mod sources;
mod ui;

use crate::audio::{
    registry::PlayerRegistry,
    songbird_transport::SongbirdTransport,
    transport::{pump_transport_events, transport_event_channel},
};
use crate::bot::{events::run_announcer, GuildPlayerBot};
use crate::config::Config;
use crate::monitoring::{GaugeReporter, TracingSink};
use crate::sources::YtDlpResolver;

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("guild_player=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Iniciando Guild Player v{}", env!("CARGO_PKG_VERSION"));

    // Manejar health check si es necesario
    if std::env::args().any(|arg| arg == "--health-check") {
        sources::verify_dependencies().await?;
        println!("OK");
        return Ok(());
    }

    // Cargar configuración
    let config = Arc::new(Config::load()?);
    info!("{}", config.summary());

    // Cliente HTTP compartido por los inputs de songbird
    let http = reqwest::Client::builder()
        .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36")
        .tcp_keepalive(Duration::from_secs(30))
        .pool_idle_timeout(Duration::from_secs(60))
        .build()?;

    // Transporte y registro de players
    let songbird = Songbird::serenity();
    let (event_tx, event_rx) = transport_event_channel();
    let transport = Arc::new(SongbirdTransport::new(
        Arc::clone(&songbird),
        http.clone(),
        event_tx,
        config.position_update_interval(),
    ));
    let registry = Arc::new(PlayerRegistry::new(transport.clone(), config.player_settings()));

    let shutdown = CancellationToken::new();
    tokio::spawn(pump_transport_events(Arc::clone(&registry), event_rx));
    GaugeReporter::new(Arc::clone(&registry), Box::new(TracingSink), config.monitoring()).spawn(shutdown.clone());
    info!("📊 Sistema de monitoreo activado");

    // Configurar intents mínimos necesarios
    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_VOICE_STATES
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT;

    // Crear handler del bot
    let handler = GuildPlayerBot::new(
        Arc::clone(&config),
        Arc::clone(&registry),
        Arc::clone(&songbird),
        transport,
        Arc::new(YtDlpResolver::new(http)),
    );
    let announce_channels = handler.announce_channels();

    // Construir cliente
    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird_with(songbird)
        .await?;

    tokio::spawn(run_announcer(
        client.http.clone(),
        registry.subscribe(),
        announce_channels,
        shutdown.clone(),
    ));

    // Manejar shutdown graceful
    let shard_manager = client.shard_manager.clone();
    let shutdown_registry = Arc::clone(&registry);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Error al registrar Ctrl+C: {:?}", e);
            return;
        }
        info!("⚠️ Señal de shutdown recibida, cerrando...");
        shutdown.cancel();
        shutdown_registry.shutdown();
        shard_manager.shutdown_all().await;
    });

    // Iniciar bot
    info!("🚀 Bot iniciado exitosamente");
    if let Err(why) = client.start().await {
        error!("Error al ejecutar cliente: {:?}", why);
    }

    let stats = registry.stats();
    info!(
        "👋 Bot detenido ({} players activos, {} reproduciendo, {} creados, {} destruidos)",
        stats.active, stats.playing, stats.created_total, stats.destroyed_total
    );
    Ok(())
}
