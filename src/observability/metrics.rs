use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub ingest_total: IntCounterVec,
    pub ingest_latency_seconds: HistogramVec,
    pub active_subscriptions: IntGauge,
    pub notifications_total: IntCounter,
    pub bookings_total: IntCounter,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let ingest_total = IntCounterVec::new(
            Opts::new("ingest_total", "Location ingest calls by outcome"),
            &["outcome"],
        )
        .expect("valid ingest_total metric");

        let ingest_latency_seconds = HistogramVec::new(
            HistogramOpts::new(
                "ingest_latency_seconds",
                "Latency of location ingest in seconds",
            ),
            &["outcome"],
        )
        .expect("valid ingest_latency_seconds metric");

        let active_subscriptions = IntGauge::new(
            "active_subscriptions",
            "Open booking change-feed subscriptions",
        )
        .expect("valid active_subscriptions metric");

        let notifications_total = IntCounter::new(
            "notifications_total",
            "Booking snapshots delivered to subscribers",
        )
        .expect("valid notifications_total metric");

        let bookings_total = IntCounter::new("bookings_total", "Bookings created")
            .expect("valid bookings_total metric");

        registry
            .register(Box::new(ingest_total.clone()))
            .expect("register ingest_total");
        registry
            .register(Box::new(ingest_latency_seconds.clone()))
            .expect("register ingest_latency_seconds");
        registry
            .register(Box::new(active_subscriptions.clone()))
            .expect("register active_subscriptions");
        registry
            .register(Box::new(notifications_total.clone()))
            .expect("register notifications_total");
        registry
            .register(Box::new(bookings_total.clone()))
            .expect("register bookings_total");

        Self {
            registry,
            ingest_total,
            ingest_latency_seconds,
            active_subscriptions,
            notifications_total,
            bookings_total,
        }
    }

    pub fn observe_ingest(&self, outcome: &str, elapsed_secs: f64) {
        self.ingest_latency_seconds
            .with_label_values(&[outcome])
            .observe(elapsed_secs);
        self.ingest_total.with_label_values(&[outcome]).inc();
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}
