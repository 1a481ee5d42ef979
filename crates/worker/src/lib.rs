//! Admission-controlled conversion job queue.
//!
//! - [`AdmissionQueue`]: FIFO queue over a fixed pool of processing slots,
//!   with wait estimation and session notification on every mutation.
//! - [`JobProcessor`] / [`JobReporter`]: the seam to whatever performs the
//!   conversion, and its way back into the queue.
//! - [`AdmissionDriver`]: periodic safety-net admission tick.
//! - [`watchdog`]: fails jobs that run past the configured timeout.

pub mod dispatcher;
pub mod processor;
pub mod queue;
pub mod watchdog;

pub use dispatcher::AdmissionDriver;
pub use processor::{JobProcessor, JobReporter, ProcessorError};
pub use queue::{AdmissionQueue, JobTicket, QueueSnapshot, QueuedSummary};
