use std::time::Duration;

use autometrics::objectives::Objective;
use autometrics::objectives::ObjectiveLatency;
use autometrics::objectives::ObjectivePercentile;
use lazy_static::lazy_static;
use prometheus::exponential_buckets;
use prometheus::HistogramOpts;
use prometheus::HistogramVec;
use prometheus::IntCounterVec;
use prometheus::IntGauge;
use prometheus::Opts;
use prometheus::Registry;
use tracing::warn;

/// autometrics: https://docs.autometrics.dev/rust/adding-alerts-and-slos
pub(crate) const API_SLO: Objective = Objective::new("kv_broker_api")
    .success_rate(ObjectivePercentile::P99_9)
    .latency(ObjectiveLatency::Ms10, ObjectivePercentile::P99);

lazy_static! {
    pub static ref BROKER_OPS: IntCounterVec = IntCounterVec::new(
        Opts::new("kv_broker_ops_total", "Backend calls issued by the broker"),
        &["op", "outcome"]
    )
    .expect("metric can not be created");

    pub static ref BROKER_OP_LATENCY_MS: HistogramVec = HistogramVec::new(
        HistogramOpts::new("kv_broker_op_latency_ms", "Broker operation latency in ms")
            .buckets(exponential_buckets(0.05, 2.0, 16).expect("valid buckets")),
        &["op"]
    )
    .expect("metric can not be created");

    pub static ref ACTIVE_WATCH_STREAMS: IntGauge = IntGauge::new(
        "kv_broker_active_watch_streams",
        "Native watch streams currently open"
    )
    .expect("metric can not be created");

    pub static ref WATCH_EVENTS_DELIVERED: IntCounterVec = IntCounterVec::new(
        Opts::new("kv_broker_watch_events_delivered_total", "Watch events pushed to subscribers"),
        &["event_type"]
    )
    .expect("metric can not be created");

    pub static ref WATCH_EVENTS_DROPPED: IntCounterVec = IntCounterVec::new(
        Opts::new("kv_broker_watch_events_dropped_total", "Watch events dropped for slow subscribers"),
        &["prefix"]
    )
    .expect("metric can not be created");

    pub static ref REGISTRY: Registry = {
        let registry = Registry::new();
        register_custom_metrics(&registry);
        registry
    };
}

fn register_custom_metrics(registry: &Registry) {
    registry
        .register(Box::new(BROKER_OPS.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(BROKER_OP_LATENCY_MS.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(ACTIVE_WATCH_STREAMS.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(WATCH_EVENTS_DELIVERED.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(WATCH_EVENTS_DROPPED.clone()))
        .expect("collector can be registered");
}

pub(crate) fn record_op(
    op: &'static str,
    ok: bool,
) {
    let outcome = if ok { "ok" } else { "err" };
    BROKER_OPS.with_label_values(&[op, outcome]).inc();
}

pub(crate) fn observe_latency(
    op: &'static str,
    elapsed: Duration,
) {
    BROKER_OP_LATENCY_MS
        .with_label_values(&[op])
        .observe(elapsed.as_secs_f64() * 1000.0);
}

/// Renders the broker's collectors in the Prometheus text exposition format
pub fn gather_metrics() -> String {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        warn!("could not encode broker metrics: {}", e);
    }
    match String::from_utf8(buffer) {
        Ok(v) => v,
        Err(e) => {
            warn!("broker metrics could not be from_utf8'd: {}", e);
            String::default()
        }
    }
}
