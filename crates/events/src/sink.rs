//! Delivery seam between the admission queue and client transports.

use crate::protocol::Notification;

/// Best-effort, non-blocking push of a [`Notification`] to one session.
///
/// Implementations must never block or buffer for absent sessions: a
/// message that cannot be handed off right now is dropped and `false` is
/// returned. Callers do not retry; the next state change resends current
/// state.
pub trait NotificationSink: Send + Sync {
    fn try_send(&self, session_id: &str, message: &Notification) -> bool;
}
