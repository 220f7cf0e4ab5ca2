use prometheus::{
    register_int_counter, register_int_counter_vec, register_int_gauge, IntCounter,
    IntCounterVec, IntGauge,
};

lazy_static::lazy_static! {
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "polyglot_http_requests_total", "Total HTTP requests", &["method", "path", "status"]
    ).unwrap();
    pub static ref ASSIGNMENTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "polyglot_assignments_total", "Experiment responses by selected payload", &["payload"]
    ).unwrap();
    pub static ref PAYLOAD_VARIANTS: IntGauge = register_int_gauge!(
        "polyglot_payload_variants", "Number of payload variants loaded at boot"
    ).unwrap();

    // Connection bounds
    pub static ref OPEN_CONNECTIONS: IntGauge = register_int_gauge!(
        "polyglot_open_connections", "Connections currently holding a slot"
    ).unwrap();
    pub static ref CONNECTIONS_REJECTED_TOTAL: IntCounter = register_int_counter!(
        "polyglot_connections_rejected_total", "Connections closed because every slot was taken"
    ).unwrap();
    pub static ref CONNECTION_TIMEOUTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "polyglot_connection_timeouts_total", "Connections closed by a read, write or idle deadline",
        &["kind"]
    ).unwrap();
}

/// RAII guard that decrements an IntGauge on drop.
pub struct GaugeGuard<'a>(pub &'a IntGauge);

impl<'a> GaugeGuard<'a> {
    pub fn inc(gauge: &'a IntGauge) -> Self {
        gauge.inc();
        Self(gauge)
    }
}

impl Drop for GaugeGuard<'_> {
    fn drop(&mut self) {
        self.0.dec();
    }
}

pub fn init() {
    lazy_static::initialize(&HTTP_REQUESTS_TOTAL);
    lazy_static::initialize(&ASSIGNMENTS_TOTAL);
    lazy_static::initialize(&PAYLOAD_VARIANTS);
    lazy_static::initialize(&OPEN_CONNECTIONS);
    lazy_static::initialize(&CONNECTIONS_REJECTED_TOTAL);
    lazy_static::initialize(&CONNECTION_TIMEOUTS_TOTAL);
}
