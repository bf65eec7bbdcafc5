use once_cell::sync::Lazy;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};

// Global Prometheus registry
pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

/// Cache hits by tier: `result`, `embedding`, `page`
pub static CACHE_HITS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let c = IntCounterVec::new(Opts::new("cache_hits_total", "Cache hits by tier"), &["tier"])
        .expect("valid metric definition");
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

pub static CACHE_MISSES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let c = IntCounterVec::new(Opts::new("cache_misses_total", "Cache misses by tier"), &["tier"])
        .expect("valid metric definition");
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

/// Cache reads/writes that failed and fell back to the slow path
pub static CACHE_ERRORS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let c = IntCounterVec::new(
        Opts::new("cache_errors_total", "Cache operations that failed and were bypassed"),
        &["op"],
    )
    .expect("valid metric definition");
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

pub static LOCK_REJECTIONS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    let c = IntCounter::new(
        "session_lock_rejections_total",
        "Lock acquisitions that timed out waiting for another holder",
    )
    .expect("valid metric definition");
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

pub static SESSION_STORE_OP_MS: Lazy<HistogramVec> = Lazy::new(|| {
    let h = HistogramVec::new(
        HistogramOpts::new("session_store_op_ms", "Session store operation latency in milliseconds")
            .buckets(vec![0.5, 1.0, 2.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 1000.0]),
        &["backend", "op"],
    )
    .expect("valid metric definition");
    REGISTRY.register(Box::new(h.clone())).ok();
    h
});

pub fn record_cache_hit(tier: &str) {
    CACHE_HITS_TOTAL.with_label_values(&[tier]).inc();
}

pub fn record_cache_miss(tier: &str) {
    CACHE_MISSES_TOTAL.with_label_values(&[tier]).inc();
}

pub fn record_cache_error(op: &str) {
    CACHE_ERRORS_TOTAL.with_label_values(&[op]).inc();
}

pub fn observe_session_op_ms(backend: &str, op: &str, ms: f64) {
    SESSION_STORE_OP_MS.with_label_values(&[backend, op]).observe(ms);
}

/// Render all registered metrics in the Prometheus text format
pub fn export_prometheus() -> String {
    // Touch the lazies so every family shows up even before first use.
    Lazy::force(&CACHE_HITS_TOTAL);
    Lazy::force(&CACHE_MISSES_TOTAL);
    Lazy::force(&CACHE_ERRORS_TOTAL);
    Lazy::force(&LOCK_REJECTIONS_TOTAL);
    Lazy::force(&SESSION_STORE_OP_MS);

    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
