//! Structured lifecycle events for submission sessions.
//!
//! Every event is emitted at `info!` with an `event` field so log pipelines
//! can follow a session from creation to recording. Attach [`session_span`]
//! to tag everything logged during a session with its id.

use tracing::{info, Span};

/// Span carrying `session_id`, for instrumenting a session's futures.
///
/// ```ignore
/// client.run(&cancel).instrument(session_span(client.id().as_str())).await
/// ```
pub fn session_span(session_id: &str) -> Span {
    tracing::info_span!("gradebox.session", session_id = %session_id)
}

pub fn emit_session_created(session_id: &str, app_name: &str) {
    info!(event = "session.created", session_id = %session_id, app_name = %app_name);
}

pub fn emit_session_validated(session_id: &str, username: &str, submission: Option<&str>) {
    info!(
        event = "session.validated",
        session_id = %session_id,
        username = %username,
        submission = submission.unwrap_or("none"),
    );
}

pub fn emit_session_uploaded(session_id: &str, upload_key: &str, bytes: usize) {
    info!(
        event = "session.uploaded",
        session_id = %session_id,
        upload_key = %upload_key,
        bytes = bytes as u64,
    );
}

pub fn emit_session_published(session_id: &str, queue: &str) {
    info!(event = "session.published", session_id = %session_id, queue = %queue);
}

pub fn emit_session_subscribed(session_id: &str, channel: &str) {
    info!(event = "session.subscribed", session_id = %session_id, channel = %channel);
}

/// The log stream finished; `parsed` tells whether any telemetry matched.
pub fn emit_session_completed(session_id: &str, duration_ms: u64, parsed: bool) {
    info!(
        event = "session.completed",
        session_id = %session_id,
        duration_ms = duration_ms,
        parsed = parsed,
    );
}

pub fn emit_session_recorded(session_id: &str, inferences: usize, team: Option<&str>) {
    info!(
        event = "session.recorded",
        session_id = %session_id,
        inferences = inferences as u64,
        team = team.unwrap_or("none"),
    );
}

/// Teardown of a transport failed (warning level).
pub fn emit_teardown_error(session_id: &str, error: &dyn std::fmt::Display) {
    tracing::warn!(event = "session.teardown_error", session_id = %session_id, error = %error);
}
