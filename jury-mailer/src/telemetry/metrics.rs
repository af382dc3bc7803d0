//! Metric definitions for credential email delivery
//!
//! Only the `metrics` facade is used; without an installed recorder every
//! call is a no-op.

use crate::domain::TransportKind;
use metrics::{counter, describe_counter, describe_histogram, histogram};
use std::time::Duration;

pub const SEND_TOTAL: &str = "jury_mailer_email_send_total";
pub const SEND_DURATION: &str = "jury_mailer_email_send_duration_seconds";

pub fn describe_metrics() {
    describe_counter!(
        SEND_TOTAL,
        "Credential emails handed to a transport, by transport and outcome"
    );
    describe_histogram!(
        SEND_DURATION,
        "Time spent in a single transport delivery in seconds"
    );
}

/// Record one delivery attempt
pub fn record_send(transport: TransportKind, success: bool, elapsed: Duration) {
    let outcome = if success { "success" } else { "failure" };
    counter!(
        SEND_TOTAL,
        "transport" => transport.as_str(),
        "outcome" => outcome
    )
    .increment(1);
    histogram!(SEND_DURATION, "transport" => transport.as_str()).record(elapsed.as_secs_f64());
}
