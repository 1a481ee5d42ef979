//! MarkSwift notification protocol and delivery plumbing.
//!
//! - [`Notification`]: the closed set of messages pushed to a session.
//! - [`NotificationSink`]: best-effort, non-blocking delivery seam used by
//!   the admission queue.
//! - [`SessionHub`]: session-keyed channel registry implementing the sink
//!   for socket transports.
//! - [`EventBus`]: in-process broadcast of queue lifecycle events.

pub mod bus;
pub mod hub;
pub mod protocol;
pub mod sink;

pub use bus::{EventBus, QueueEvent, QueueEventKind};
pub use hub::{HubFrame, SessionHub};
pub use protocol::{ClientMessage, Envelope, Notification};
pub use sink::NotificationSink;
