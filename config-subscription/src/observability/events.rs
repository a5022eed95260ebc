//! Canonical structured event names used across `config-subscription`.

// Controller lifecycle and protocol events.
pub const SUBSCRIPTION_START: &str = "subscription_start";
pub const SUBSCRIPTION_UPDATE_RESOURCES: &str = "subscription_update_resources";
pub const SUBSCRIPTION_UPDATE_UNCHANGED: &str = "subscription_update_unchanged";
pub const SUBSCRIPTION_SHUTDOWN: &str = "subscription_shutdown";
pub const REQUEST_SEND: &str = "request_send";
pub const REQUEST_SEND_FAILED: &str = "request_send_failed";
pub const REQUEST_RESEND: &str = "request_resend";
pub const RESPONSE_ACCEPTED: &str = "response_accepted";
pub const RESPONSE_REACCEPTED: &str = "response_reaccepted";
pub const RESPONSE_REJECTED: &str = "response_rejected";
pub const RESPONSE_DROPPED: &str = "response_dropped";
pub const TRANSPORT_FAILURE: &str = "transport_failure";

// Streaming and aggregated channel events.
pub const STREAM_CONNECT_OK: &str = "stream_connect_ok";
pub const STREAM_CONNECT_FAILED: &str = "stream_connect_failed";
pub const STREAM_CLOSED: &str = "stream_closed";
pub const STREAM_BACKOFF: &str = "stream_backoff";
pub const STREAM_STALE_REQUESTS_DISCARDED: &str = "stream_stale_requests_discarded";
pub const MUX_GROUP_REGISTERED: &str = "mux_group_registered";
pub const MUX_GROUP_UNREGISTERED: &str = "mux_group_unregistered";
pub const MUX_UNKNOWN_GROUP: &str = "mux_unknown_group";

// Polling events.
pub const POLL_EXCHANGE_START: &str = "poll_exchange_start";
pub const POLL_EXCHANGE_OK: &str = "poll_exchange_ok";
pub const POLL_EXCHANGE_FAILED: &str = "poll_exchange_failed";
pub const POLL_REQUEST_SUPERSEDED: &str = "poll_request_superseded";
pub const POLL_EXCHANGE_ABANDONED: &str = "poll_exchange_abandoned";

// File-watch events.
pub const FILE_CHANGE_DETECTED: &str = "file_change_detected";
pub const FILE_READ_OK: &str = "file_read_ok";
pub const FILE_READ_FAILED: &str = "file_read_failed";
pub const FILE_ABSENT_AT_START: &str = "file_absent_at_start";
pub const FILE_WATCH_START_FAILED: &str = "file_watch_start_failed";

// Runtime events.
pub const DRIVER_EVENT_QUEUE_CLOSED: &str = "driver_event_queue_closed";
pub const TRANSPORT_TASK_EXIT: &str = "transport_task_exit";
