//! Prometheus metrics for qa-service.
//!
//! Metrics are no-ops until [`init_metrics`] has run, so library code and
//! tests can record freely.

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::OnceLock;

// Global registry
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

// Chat turn metrics
pub static CHAT_TURNS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
pub static STREAM_FRAGMENTS_TOTAL: OnceLock<IntCounter> = OnceLock::new();
pub static GENERATION_LATENCY_SECONDS: OnceLock<Histogram> = OnceLock::new();

// Collaborator metrics
pub static SESSION_RESOLUTIONS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
pub static HISTORY_WRITES_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Initialize all metrics. Call once at startup.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    let registry = Registry::new();

    // mode: sync, stream; outcome: ok or an error kind
    let chat_turns = IntCounterVec::new(
        Opts::new("qa_chat_turns_total", "Total chat turns handled"),
        &["mode", "outcome"],
    )?;

    let fragments = IntCounter::with_opts(Opts::new(
        "qa_stream_fragments_total",
        "Content fragments relayed to streaming clients",
    ))?;

    let generation_latency = Histogram::with_opts(
        HistogramOpts::new(
            "qa_generation_latency_seconds",
            "Generation backend latency in seconds",
        )
        .buckets(vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0, 120.0]),
    )?;

    // result: reused, created, conflict_absorbed, failed
    let resolutions = IntCounterVec::new(
        Opts::new(
            "qa_session_resolutions_total",
            "Session resolutions by result",
        ),
        &["result"],
    )?;

    // path: sync, stream; outcome: ok, failed
    let history_writes = IntCounterVec::new(
        Opts::new("qa_history_writes_total", "Chat history writes"),
        &["path", "outcome"],
    )?;

    registry.register(Box::new(chat_turns.clone()))?;
    registry.register(Box::new(fragments.clone()))?;
    registry.register(Box::new(generation_latency.clone()))?;
    registry.register(Box::new(resolutions.clone()))?;
    registry.register(Box::new(history_writes.clone()))?;

    let _ = REGISTRY.set(registry);
    let _ = CHAT_TURNS_TOTAL.set(chat_turns);
    let _ = STREAM_FRAGMENTS_TOTAL.set(fragments);
    let _ = GENERATION_LATENCY_SECONDS.set(generation_latency);
    let _ = SESSION_RESOLUTIONS_TOTAL.set(resolutions);
    let _ = HISTORY_WRITES_TOTAL.set(history_writes);

    tracing::info!("Prometheus metrics initialized");
    Ok(())
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();

    let registry = match REGISTRY.get() {
        Some(r) => r,
        None => {
            tracing::error!("Metrics registry not initialized");
            return "# Metrics registry not initialized\n".to_string();
        }
    };

    if let Err(e) = encoder.encode(&registry.gather(), &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return format!("# Failed to encode metrics: {}\n", e);
    }

    match String::from_utf8(buffer) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "Failed to convert metrics to UTF-8");
            format!("# Failed to convert metrics to UTF-8: {}\n", e)
        }
    }
}

pub fn record_chat_turn(mode: &str, outcome: &str) {
    if let Some(counter) = CHAT_TURNS_TOTAL.get() {
        counter.with_label_values(&[mode, outcome]).inc();
    }
}

pub fn record_fragment() {
    if let Some(counter) = STREAM_FRAGMENTS_TOTAL.get() {
        counter.inc();
    }
}

/// Record backend latency as reported by the backend itself.
pub fn record_generation_latency(latency_ms: Option<i64>) {
    if let (Some(histogram), Some(ms)) = (GENERATION_LATENCY_SECONDS.get(), latency_ms) {
        histogram.observe(ms as f64 / 1000.0);
    }
}

pub fn record_session_resolution(result: &str) {
    if let Some(counter) = SESSION_RESOLUTIONS_TOTAL.get() {
        counter.with_label_values(&[result]).inc();
    }
}

pub fn record_history_write(path: &str, outcome: &str) {
    if let Some(counter) = HISTORY_WRITES_TOTAL.get() {
        counter.with_label_values(&[path, outcome]).inc();
    }
}
