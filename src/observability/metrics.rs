use prometheus::{
    Encoder, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub dispatch_ticks_total: IntCounterVec,
    pub tick_latency_seconds: HistogramVec,
    pub notifications_pushed_total: IntCounter,
    pub accept_attempts_total: IntCounterVec,
    pub active_dispatch_tasks: IntGauge,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let dispatch_ticks_total = IntCounterVec::new(
            Opts::new("dispatch_ticks_total", "Dispatch ticks by outcome"),
            &["outcome"],
        )
        .expect("valid dispatch_ticks_total metric");

        let tick_latency_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "tick_latency_seconds",
                "Latency of dispatch tick processing in seconds",
            ),
            &["outcome"],
        )
        .expect("valid tick_latency_seconds metric");

        let notifications_pushed_total = IntCounter::new(
            "notifications_pushed_total",
            "Order notifications pushed to driver inboxes",
        )
        .expect("valid notifications_pushed_total metric");

        let accept_attempts_total = IntCounterVec::new(
            Opts::new("accept_attempts_total", "Acceptance attempts by outcome"),
            &["outcome"],
        )
        .expect("valid accept_attempts_total metric");

        let active_dispatch_tasks = IntGauge::new(
            "active_dispatch_tasks",
            "Currently live dispatch tasks, one per awaiting order",
        )
        .expect("valid active_dispatch_tasks metric");

        registry
            .register(Box::new(dispatch_ticks_total.clone()))
            .expect("register dispatch_ticks_total");
        registry
            .register(Box::new(tick_latency_seconds.clone()))
            .expect("register tick_latency_seconds");
        registry
            .register(Box::new(notifications_pushed_total.clone()))
            .expect("register notifications_pushed_total");
        registry
            .register(Box::new(accept_attempts_total.clone()))
            .expect("register accept_attempts_total");
        registry
            .register(Box::new(active_dispatch_tasks.clone()))
            .expect("register active_dispatch_tasks");

        Self {
            registry,
            dispatch_ticks_total,
            tick_latency_seconds,
            notifications_pushed_total,
            accept_attempts_total,
            active_dispatch_tasks,
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
