//! WebSocket transport for session notifications.
//!
//! Each socket is bound to one session id. Frames queued on the
//! [`SessionHub`](markswift_events::SessionHub) are written to the socket;
//! inbound `getStatus` requests are answered from the admission queue.

mod handler;
mod heartbeat;

pub use handler::{ws_handler, WsParams};
pub use heartbeat::start_heartbeat;
