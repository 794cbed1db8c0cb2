//! Prometheus metrics, rendered at `/metrics`.

use metrics::{counter, describe_counter};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

/// Install the global recorder. Call once at startup, before anything is recorded.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    describe_counter!("barakah_otp_sent_total", "One-time codes issued, by purpose");
    describe_counter!(
        "barakah_otp_verify_total",
        "Code verification attempts, by outcome"
    );
    describe_counter!(
        "barakah_password_resets_total",
        "Password reset completions, by result"
    );
    describe_counter!(
        "barakah_transactions_synced_total",
        "Transactions inserted from the bank feed"
    );
    describe_counter!(
        "barakah_swept_records_total",
        "Records removed by the scheduled sweep, by kind"
    );

    Ok(handle)
}

pub fn record_otp_sent(purpose: &'static str, delivered: bool) {
    let delivered = if delivered { "true" } else { "false" };
    counter!("barakah_otp_sent_total", "purpose" => purpose, "delivered" => delivered)
        .increment(1);
}

pub fn record_otp_verify(outcome: &'static str) {
    counter!("barakah_otp_verify_total", "outcome" => outcome).increment(1);
}

pub fn record_password_reset(result: &'static str) {
    counter!("barakah_password_resets_total", "result" => result).increment(1);
}

pub fn record_transactions_synced(count: usize) {
    counter!("barakah_transactions_synced_total").increment(count as u64);
}

pub fn record_swept(kind: &'static str, count: u64) {
    counter!("barakah_swept_records_total", "kind" => kind).increment(count);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_recorder_is_noop() {
        // Without an installed recorder these go to the no-op recorder
        record_otp_sent("sign_up", true);
        record_otp_verify("success");
        record_password_reset("success");
        record_transactions_synced(3);
        record_swept("otp", 2);
    }
}
