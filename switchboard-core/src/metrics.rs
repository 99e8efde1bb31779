// ABOUTME: Session metrics recorded through the `metrics` facade
// ABOUTME: No-ops unless the binary installs a recorder (e.g. the Prometheus exporter)

pub fn record_event(outcome: &'static str) {
    metrics::counter!("switchboard_inbound_events_total", "outcome" => outcome).increment(1);
}

pub fn record_message_dispatched() {
    metrics::counter!("switchboard_messages_dispatched_total").increment(1);
}

pub fn record_reply_dropped(reason: &'static str) {
    metrics::counter!("switchboard_replies_dropped_total", "reason" => reason).increment(1);
}

pub fn record_send(outcome: &'static str) {
    metrics::counter!("switchboard_sends_total", "outcome" => outcome).increment(1);
}

pub fn record_flush(batch_size: usize) {
    metrics::counter!("switchboard_flushes_total").increment(1);
    metrics::histogram!("switchboard_flush_batch_size").record(batch_size as f64);
}

pub fn record_connect(outcome: &'static str) {
    metrics::counter!("switchboard_connects_total", "outcome" => outcome).increment(1);
}

pub fn record_disconnect() {
    metrics::counter!("switchboard_disconnects_total").increment(1);
}

pub fn record_brain_error(call: &'static str) {
    metrics::counter!("switchboard_brain_errors_total", "call" => call).increment(1);
}
