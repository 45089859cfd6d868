//! Periodic gauge of playing players.
//!
//! A single background task samples [`PlayerRegistry::count_playing`] on a
//! fixed interval and republishes it through a [`MetricsSink`]. The first
//! sample is taken right away. A publish error only loses that sample; the
//! next tick runs as usual. Sink panics are caught only where they unwind,
//! which the release profile (`panic = "abort"`) does not.

use std::{
    panic::{self, AssertUnwindSafe},
    sync::Arc,
    time::Duration,
};
use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::audio::registry::PlayerRegistry;

pub const PLAYING_PLAYERS_GAUGE: &str = "music_players_playing_total";
pub const PLAYING_PLAYERS_HELP: &str = "Total playing music players";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitoringConfig {
    pub gauge_interval: Duration,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            gauge_interval: Duration::from_secs(60),
        }
    }
}

/// Destino de las métricas publicadas.
#[cfg_attr(test, mockall::automock)]
pub trait MetricsSink: Send + Sync {
    fn publish(&self, name: &str, value: u64) -> anyhow::Result<()>;
}

/// Escribe cada muestra como una línea de log estructurada.
#[derive(Debug, Default)]
pub struct TracingSink;

impl MetricsSink for TracingSink {
    fn publish(&self, name: &str, value: u64) -> anyhow::Result<()> {
        info!(metric = name, value, help = PLAYING_PLAYERS_HELP, "📊 Métrica actualizada");
        Ok(())
    }
}

pub struct GaugeReporter {
    registry: Arc<PlayerRegistry>,
    sink: Box<dyn MetricsSink>,
    config: MonitoringConfig,
}

impl GaugeReporter {
    pub fn new(registry: Arc<PlayerRegistry>, sink: Box<dyn MetricsSink>, config: MonitoringConfig) -> Self {
        Self {
            registry,
            sink,
            config,
        }
    }

    /// Toma una muestra y la publica. Devuelve `false` si falló.
    pub fn sample(&self) -> bool {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            let playing = self.registry.count_playing() as u64;
            self.sink
                .publish(PLAYING_PLAYERS_GAUGE, playing)
                .map(|()| playing)
        }));

        match outcome {
            Ok(Ok(playing)) => {
                debug!("📊 {} = {}", PLAYING_PLAYERS_GAUGE, playing);
                true
            }
            Ok(Err(e)) => {
                warn!("⚠️ No se pudo publicar {}: {:?}", PLAYING_PLAYERS_GAUGE, e);
                false
            }
            Err(_) => {
                warn!("⚠️ Pánico al publicar {}; se reintenta en el próximo ciclo", PLAYING_PLAYERS_GAUGE);
                false
            }
        }
    }

    /// Runs until `cancel` fires.
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.config.gauge_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(
                "📊 Reporte de {} cada {}",
                PLAYING_PLAYERS_GAUGE,
                humantime::format_duration(self.config.gauge_interval)
            );

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!("📊 Reporte de métricas detenido");
                        break;
                    }
                    _ = interval.tick() => {
                        self.sample();
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{
        player::PlayerSettings,
        track::Track,
        transport::testing::RecordingTransport,
    };
    use mockall::Sequence;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use serenity::model::id::{GuildId, UserId};

    #[derive(Default)]
    struct RecordingSink {
        published: Arc<Mutex<Vec<(String, u64)>>>,
    }

    impl MetricsSink for RecordingSink {
        fn publish(&self, name: &str, value: u64) -> anyhow::Result<()> {
            self.published.lock().push((name.to_string(), value));
            Ok(())
        }
    }

    fn registry_with_playing(playing: u64) -> Arc<PlayerRegistry> {
        let registry = Arc::new(PlayerRegistry::new(
            Arc::new(RecordingTransport::default()),
            PlayerSettings::default(),
        ));
        for id in 1..=playing {
            registry.get_or_create(GuildId::new(id)).enqueue(Track::new(
                "https://example.com/a.mp3",
                "a",
                Some(Duration::from_secs(60)),
                UserId::new(1),
            ));
        }
        registry
    }

    #[test]
    fn sample_publishes_playing_count() {
        let sink = RecordingSink::default();
        let published = Arc::clone(&sink.published);
        let reporter = GaugeReporter::new(registry_with_playing(3), Box::new(sink), MonitoringConfig::default());

        assert!(reporter.sample());
        assert_eq!(*published.lock(), vec![(PLAYING_PLAYERS_GAUGE.to_string(), 3)]);
    }

    struct PanickingSink;

    impl MetricsSink for PanickingSink {
        fn publish(&self, _name: &str, _value: u64) -> anyhow::Result<()> {
            panic!("sink exploded")
        }
    }

    #[test]
    fn sink_panics_are_contained() {
        let reporter = GaugeReporter::new(
            registry_with_playing(1),
            Box::new(PanickingSink),
            MonitoringConfig::default(),
        );

        assert!(!reporter.sample());
    }

    #[tokio::test(start_paused = true)]
    async fn keeps_reporting_after_a_failed_publish() {
        let mut seq = Sequence::new();
        let mut sink = MockMetricsSink::new();
        sink.expect_publish()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Err(anyhow::anyhow!("collector unavailable")));
        sink.expect_publish()
            .withf(|_, value| *value == 2)
            .times(2)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));

        let cancel = CancellationToken::new();
        let reporter = GaugeReporter::new(
            registry_with_playing(2),
            Box::new(sink),
            MonitoringConfig {
                gauge_interval: Duration::from_secs(60),
            },
        );
        let handle = reporter.spawn(cancel.clone());

        // Ticks en t=0, 60s y 120s
        tokio::time::sleep(Duration::from_secs(150)).await;
        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn stops_when_cancelled() {
        let cancel = CancellationToken::new();
        let handle = GaugeReporter::new(
            registry_with_playing(0),
            Box::new(TracingSink),
            MonitoringConfig::default(),
        )
        .spawn(cancel.clone());

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("reporter did not stop")
            .unwrap();
    }
}
