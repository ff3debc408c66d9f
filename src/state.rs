use std::sync::Arc;
use std::time::Duration;

use crate::notify::{BroadcastNotifier, ChangeNotifier};
use crate::observability::metrics::Metrics;
use crate::store::{MemoryStore, PositionStore};

pub struct AppState {
    pub store: Arc<dyn PositionStore>,
    pub notifier: Arc<dyn ChangeNotifier>,
    pub metrics: Metrics,
    pub settings: TrackingSettings,
}

/// Knobs for the server-driven simulated route.
#[derive(Debug, Clone, Copy)]
pub struct TrackingSettings {
    pub resend_interval: Duration,
    pub simulation_speed_kmh: f64,
}

impl Default for TrackingSettings {
    fn default() -> Self {
        Self {
            resend_interval: Duration::from_secs(15),
            simulation_speed_kmh: 40.0,
        }
    }
}

impl AppState {
    pub fn new(event_buffer_size: usize) -> Self {
        Self::with_store(Arc::new(MemoryStore::new()), event_buffer_size)
    }

    pub fn with_store(store: Arc<dyn PositionStore>, event_buffer_size: usize) -> Self {
        let metrics = Metrics::new();
        let notifier = BroadcastNotifier::new(
            event_buffer_size,
            metrics.active_subscriptions.clone(),
            metrics.notifications_total.clone(),
        );

        Self {
            store,
            notifier: Arc::new(notifier),
            metrics,
            settings: TrackingSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: TrackingSettings) -> Self {
        self.settings = settings;
        self
    }
}
