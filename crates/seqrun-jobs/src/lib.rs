// Job service for the seqrun platform
//
// Publishes job requests onto the work stream, dispatches deliveries to
// registered handlers under a concurrency ceiling, and emits lifecycle
// status events that the projector reflects into submission records.

pub mod memory;
mod service;
mod status;

pub use memory::InMemoryQueue;
pub use service::{JobHandler, JobService};
pub use status::StatusProjector;
