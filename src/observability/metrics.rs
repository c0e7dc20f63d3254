use prometheus::{
    Encoder, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub connect_attempts_total: IntCounterVec,
    pub messages_sent_total: IntCounter,
    pub messages_dropped_total: IntCounter,
    pub frames_malformed_total: IntCounter,
    pub notifications_published_total: IntCounterVec,
    pub offer_fetch_seconds: HistogramVec,
    pub connection_state: IntGauge,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let connect_attempts_total = IntCounterVec::new(
            Opts::new("connect_attempts_total", "Channel dial attempts by outcome"),
            &["outcome"],
        )
        .expect("valid connect_attempts_total metric");

        let messages_sent_total =
            IntCounter::new("messages_sent_total", "Outbound frames sent while connected")
                .expect("valid messages_sent_total metric");

        let messages_dropped_total = IntCounter::new(
            "messages_dropped_total",
            "Outbound frames dropped because the channel was not connected",
        )
        .expect("valid messages_dropped_total metric");

        let frames_malformed_total = IntCounter::new(
            "frames_malformed_total",
            "Inbound frames dropped because they failed to parse",
        )
        .expect("valid frames_malformed_total metric");

        let notifications_published_total = IntCounterVec::new(
            Opts::new(
                "notifications_published_total",
                "Notifications published by priority",
            ),
            &["priority"],
        )
        .expect("valid notifications_published_total metric");

        let offer_fetch_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "offer_fetch_seconds",
                "Latency of ride offer fetches in seconds",
            ),
            &["outcome"],
        )
        .expect("valid offer_fetch_seconds metric");

        let connection_state = IntGauge::new(
            "connection_state",
            "Current channel state (0 disconnected, 1 connecting, 2 connected, 3 backoff)",
        )
        .expect("valid connection_state metric");

        registry
            .register(Box::new(connect_attempts_total.clone()))
            .expect("register connect_attempts_total");
        registry
            .register(Box::new(messages_sent_total.clone()))
            .expect("register messages_sent_total");
        registry
            .register(Box::new(messages_dropped_total.clone()))
            .expect("register messages_dropped_total");
        registry
            .register(Box::new(frames_malformed_total.clone()))
            .expect("register frames_malformed_total");
        registry
            .register(Box::new(notifications_published_total.clone()))
            .expect("register notifications_published_total");
        registry
            .register(Box::new(offer_fetch_seconds.clone()))
            .expect("register offer_fetch_seconds");
        registry
            .register(Box::new(connection_state.clone()))
            .expect("register connection_state");

        Self {
            registry,
            connect_attempts_total,
            messages_sent_total,
            messages_dropped_total,
            frames_malformed_total,
            notifications_published_total,
            offer_fetch_seconds,
            connection_state,
        }
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

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::Metrics;

    #[test]
    fn encode_produces_text_exposition() {
        let metrics = Metrics::new();
        metrics.messages_dropped_total.inc();
        metrics
            .connect_attempts_total
            .with_label_values(&["success"])
            .inc();

        let body = metrics.encode().unwrap();
        assert!(body.contains("messages_dropped_total"));
        assert!(body.contains("connect_attempts_total"));
        assert!(body.contains("outcome=\"success\""));
    }
}
