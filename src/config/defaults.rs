use std::time::Duration;

pub(super) fn default_feed_url() -> String {
    "https://rss.sasmex.net/api/v1/alerts/latest/cap/".to_string()
}

pub(super) const fn default_request_timeout() -> Duration {
    Duration::from_secs(2)
}

pub(super) const fn default_connect_timeout() -> Duration {
    Duration::from_secs(2)
}

pub(super) fn default_telegram_api_url() -> String {
    "https://api.telegram.org".to_string()
}

pub(super) fn default_push_url() -> String {
    "https://fcm.googleapis.com/fcm/send".to_string()
}

pub(super) fn default_server_bind() -> String {
    "0.0.0.0:5000".to_string()
}

pub(super) const fn default_poll_interval() -> Duration {
    Duration::from_secs(1)
}

pub(super) const fn default_idle_delay() -> Duration {
    Duration::from_millis(100)
}

pub(super) const fn default_liveness_every() -> u64 {
    600
}

pub(super) const fn default_sink_timeout() -> Duration {
    Duration::from_secs(5)
}

pub(super) const fn default_broadcast_capacity() -> usize {
    256
}
