/// A random per-request trace id, attached to the tracing span and echoed
/// back as `x-plexus-request-id`.
pub fn new_trace_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// A time-ordered id suitable for primary keys that benefit from insertion
/// locality (task ids, event-adjacent rows).
pub fn new_request_id() -> String {
    uuid::Uuid::now_v7().to_string()
}
