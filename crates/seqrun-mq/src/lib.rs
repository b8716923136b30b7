// Broker gateway for the seqrun platform
//
// Two streams back the job core: a work-queue stream for job requests
// (a message disappears once any worker acks it) and a limits-retention
// stream for lifecycle events (messages persist for replay). The
// MessageQueue trait is the seam between the platform and the broker.

mod jetstream;
mod queue;

pub use jetstream::JetStreamQueue;
pub use queue::{
    AckPolicy, DeliverPolicy, Handler, MessageQueue, Retention, StreamSpec, SubscribeConfig,
};
