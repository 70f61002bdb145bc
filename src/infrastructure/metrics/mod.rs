//! Prometheus Metrics Module
//!
//! Gateway metrics collected with Prometheus.
//!
//! # Metrics Collected
//! - Live gateway connections by state
//! - Emitted events by scope
//! - Event deliveries by outcome
//! - Heartbeat watchdog timeouts
//! - Gateway closes by close code

use once_cell::sync::Lazy;
use prometheus::{Encoder, GaugeVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

/// Global metrics registry
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

/// Live gateway connections gauge
pub static GATEWAY_CONNECTIONS_ACTIVE: Lazy<GaugeVec> = Lazy::new(|| {
    GaugeVec::new(
        Opts::new(
            "gateway_connections_active",
            "Number of live gateway connections",
        )
        .namespace("chat_gateway"),
        &["state"], // "connected", "identified"
    )
    .expect("Failed to create GATEWAY_CONNECTIONS_ACTIVE metric")
});

/// Events handed to the bus, by scope
pub static EVENTS_EMITTED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("events_emitted_total", "Total number of emitted events").namespace("chat_gateway"),
        &["scope"],
    )
    .expect("Failed to create EVENTS_EMITTED_TOTAL metric")
});

/// Per-connection deliveries, by outcome
pub static EVENT_DELIVERIES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "event_deliveries_total",
            "Total number of event deliveries to connections",
        )
        .namespace("chat_gateway"),
        &["outcome"], // "delivered", "failed"
    )
    .expect("Failed to create EVENT_DELIVERIES_TOTAL metric")
});

/// Connections dropped by the heartbeat watchdog
pub static HEARTBEAT_TIMEOUTS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::with_opts(
        Opts::new(
            "heartbeat_timeouts_total",
            "Total number of connections dropped for missing heartbeats",
        )
        .namespace("chat_gateway"),
    )
    .expect("Failed to create HEARTBEAT_TIMEOUTS_TOTAL metric")
});

/// Server initiated closes, by close code
pub static GATEWAY_CLOSES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("gateway_closes_total", "Total number of gateway closes").namespace("chat_gateway"),
        &["code"],
    )
    .expect("Failed to create GATEWAY_CLOSES_TOTAL metric")
});

/// Register all metrics with the registry
fn register_metrics(registry: &Registry) {
    registry
        .register(Box::new(GATEWAY_CONNECTIONS_ACTIVE.clone()))
        .expect("Failed to register GATEWAY_CONNECTIONS_ACTIVE");
    registry
        .register(Box::new(EVENTS_EMITTED_TOTAL.clone()))
        .expect("Failed to register EVENTS_EMITTED_TOTAL");
    registry
        .register(Box::new(EVENT_DELIVERIES_TOTAL.clone()))
        .expect("Failed to register EVENT_DELIVERIES_TOTAL");
    registry
        .register(Box::new(HEARTBEAT_TIMEOUTS_TOTAL.clone()))
        .expect("Failed to register HEARTBEAT_TIMEOUTS_TOTAL");
    registry
        .register(Box::new(GATEWAY_CLOSES_TOTAL.clone()))
        .expect("Failed to register GATEWAY_CLOSES_TOTAL");
}

/// Collect and encode all metrics as Prometheus text format
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .expect("Failed to encode metrics");
    String::from_utf8(buffer).expect("Metrics should be valid UTF-8")
}

/// A socket was attached to the gateway
pub fn connection_opened() {
    GATEWAY_CONNECTIONS_ACTIVE
        .with_label_values(&["connected"])
        .inc();
}

/// A connection completed IDENTIFY
pub fn connection_identified() {
    GATEWAY_CONNECTIONS_ACTIVE
        .with_label_values(&["identified"])
        .inc();
}

/// A connection was detached, `identified` if it had completed IDENTIFY
pub fn connection_closed(identified: bool) {
    GATEWAY_CONNECTIONS_ACTIVE
        .with_label_values(&["connected"])
        .dec();
    if identified {
        GATEWAY_CONNECTIONS_ACTIVE
            .with_label_values(&["identified"])
            .dec();
    }
}

pub fn record_event(scope: &str) {
    EVENTS_EMITTED_TOTAL.with_label_values(&[scope]).inc();
}

pub fn record_delivery(delivered: bool) {
    let outcome = if delivered { "delivered" } else { "failed" };
    EVENT_DELIVERIES_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn record_heartbeat_timeout() {
    HEARTBEAT_TIMEOUTS_TOTAL.inc();
}

pub fn record_close(code: u16) {
    GATEWAY_CLOSES_TOTAL
        .with_label_values(&[&code.to_string()])
        .inc();
}
