// Prometheus metrics for the HTTP surface

use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, Encoder, HistogramVec, IntCounterVec,
    TextEncoder,
};

lazy_static! {
    pub static ref HTTP_REQUESTS: IntCounterVec = register_int_counter_vec!(
        "cascade_http_requests_total",
        "HTTP requests received, by endpoint",
        &["endpoint"]
    )
    .expect("metric registration");

    pub static ref EXECUTIONS: IntCounterVec = register_int_counter_vec!(
        "cascade_executions_total",
        "Single executions, by final status id",
        &["status_id"]
    )
    .expect("metric registration");

    pub static ref TEST_RUNS: IntCounterVec = register_int_counter_vec!(
        "cascade_test_runs_total",
        "Test runs, by overall status",
        &["status"]
    )
    .expect("metric registration");

    pub static ref EXECUTION_LATENCY: HistogramVec = register_histogram_vec!(
        "cascade_execution_latency_seconds",
        "Wall time spent serving execution endpoints",
        &["endpoint"],
        vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    )
    .expect("metric registration");
}

/// Render every registered metric in the text exposition format
pub fn render() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&prometheus::gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}
