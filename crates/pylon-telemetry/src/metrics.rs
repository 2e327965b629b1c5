//! Bridge metrics.
//!
//! Recorded through the `metrics` facade. See the crate docs for the full
//! list of names and labels.

use metrics::{counter, describe_counter, describe_gauge, gauge};

/// Envelopes pushed onto the deferred queue.
pub const EVENTS_QUEUED_TOTAL: &str = "pylon_events_queued_total";
/// Live WebSocket connections.
pub const CONNECTIONS_OPEN: &str = "pylon_connections_open";
/// WebSocket sends by outcome.
pub const MESSAGES_SENT_TOTAL: &str = "pylon_messages_sent_total";
/// HTTP requests handed to the host.
pub const REQUESTS_TOTAL: &str = "pylon_requests_total";
/// Envelope payloads cut to the maximum size.
pub const PAYLOAD_TRUNCATIONS_TOTAL: &str = "pylon_payload_truncations_total";

/// Registers descriptions for all pylon metrics with the installed recorder.
pub fn describe_metrics() {
    describe_counter!(
        EVENTS_QUEUED_TOTAL,
        "Total envelopes pushed onto the deferred queue by kind"
    );
    describe_gauge!(CONNECTIONS_OPEN, "Number of live WebSocket connections");
    describe_counter!(
        MESSAGES_SENT_TOTAL,
        "Total WebSocket messages sent by outcome"
    );
    describe_counter!(REQUESTS_TOTAL, "Total HTTP requests handed to the host");
    describe_counter!(
        PAYLOAD_TRUNCATIONS_TOTAL,
        "Total envelope payloads truncated to the configured maximum"
    );
}

/// Records one queued envelope.
pub fn record_event_queued(kind: &'static str, truncated: bool) {
    counter!(EVENTS_QUEUED_TOTAL, "kind" => kind).increment(1);
    if truncated {
        counter!(PAYLOAD_TRUNCATIONS_TOTAL).increment(1);
    }
}

/// Records a connection opening.
pub fn connection_opened() {
    gauge!(CONNECTIONS_OPEN).increment(1.0);
}

/// Records a connection closing.
pub fn connection_closed() {
    gauge!(CONNECTIONS_OPEN).decrement(1.0);
}

/// Records one send attempt.
pub fn record_message_sent(status: &'static str) {
    counter!(MESSAGES_SENT_TOTAL, "status" => status).increment(1);
}

/// Records one HTTP request handed to the host.
pub fn record_request(verb: &'static str) {
    counter!(REQUESTS_TOTAL, "verb" => verb).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_functions_dont_panic() {
        describe_metrics();
        record_event_queued("MESSAGE", false);
        record_event_queued("HTTP_DATA", true);
        connection_opened();
        connection_closed();
        record_message_sent("success");
        record_request("GET");
    }

    #[test]
    fn test_metric_names_are_prefixed() {
        for name in [
            EVENTS_QUEUED_TOTAL,
            CONNECTIONS_OPEN,
            MESSAGES_SENT_TOTAL,
            REQUESTS_TOTAL,
            PAYLOAD_TRUNCATIONS_TOTAL,
        ] {
            assert!(name.starts_with("pylon_"));
        }
    }
}
