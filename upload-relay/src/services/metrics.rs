use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use service_core::error::AppError;
use std::sync::{Mutex, OnceLock};
use std::time::Duration;

pub static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();
static INIT_LOCK: Mutex<()> = Mutex::new(());

const UPLOADS_TOTAL: &str = "upload_relay_uploads_total";
const UPLOAD_BYTES: &str = "upload_relay_upload_bytes";
const UPSTREAM_DURATION: &str = "upload_relay_upstream_duration_seconds";
const COMPRESSIONS_TOTAL: &str = "upload_relay_compressions_total";

const UPSTREAM_DURATION_BUCKETS: &[f64] = &[
    0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 540.0,
];
const UPLOAD_BYTES_BUCKETS: &[f64] = &[
    16_384.0, 65_536.0, 262_144.0, 1_048_576.0, 2_097_152.0, 5_242_880.0, 10_485_760.0,
];

/// Install the Prometheus recorder. Safe to call more than once; later calls
/// are no-ops.
pub fn init_metrics() -> Result<(), AppError> {
    let _guard = INIT_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    if METRICS_HANDLE.get().is_some() {
        return Ok(());
    }

    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full(UPSTREAM_DURATION.to_string()),
            UPSTREAM_DURATION_BUCKETS,
        )
        .and_then(|builder| {
            builder.set_buckets_for_metric(
                Matcher::Full(UPLOAD_BYTES.to_string()),
                UPLOAD_BYTES_BUCKETS,
            )
        })
        .and_then(|builder| builder.install_recorder())
        .map_err(|e| {
            AppError::InternalError(anyhow::anyhow!(
                "Failed to install Prometheus recorder: {}",
                e
            ))
        })?;

    let _ = METRICS_HANDLE.set(handle);
    Ok(())
}

pub fn get_metrics() -> String {
    METRICS_HANDLE
        .get()
        .map(|handle| handle.render())
        .unwrap_or_else(|| "# Metrics recorder not initialized\n".to_string())
}

/// Count a finished upload request by outcome (`success` or an error label).
pub fn record_upload(outcome: &'static str) {
    metrics::counter!(UPLOADS_TOTAL, "outcome" => outcome).increment(1);
}

pub fn record_upload_size(bytes: u64) {
    metrics::histogram!(UPLOAD_BYTES).record(bytes as f64);
}

pub fn record_upstream(duration: Duration, outcome: &'static str) {
    metrics::histogram!(UPSTREAM_DURATION, "outcome" => outcome).record(duration.as_secs_f64());
}

/// `result` is `compressed` or `failed`.
pub fn record_compression(result: &'static str) {
    metrics::counter!(COMPRESSIONS_TOTAL, "result" => result).increment(1);
}
