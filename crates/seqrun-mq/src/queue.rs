// Message queue abstraction
//
// The trait mirrors what the job core needs from the broker and nothing
// more: idempotent stream provisioning, acked publish, a durable
// work-queue subscription that dispatches deliveries concurrently, and a
// lower-level subscription form for ordered durable/ephemeral consumers.

use async_trait::async_trait;
use futures::future::BoxFuture;
use seqrun_core::Result;
use std::sync::Arc;
use tokio::sync::watch;

/// Per-delivery callback. Returning `Ok` acknowledges the message;
/// returning `Err` leaves it un-acked so the broker redelivers it after
/// the visibility window.
pub type Handler = Arc<dyn Fn(Vec<u8>) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Stream retention policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retention {
    /// Message removed once any consumer acks it (load-balanced fan-in)
    WorkQueue,
    /// Messages persist under time/size limits (replayable fan-out)
    Limits,
}

/// Where a new consumer starts reading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliverPolicy {
    /// Every retained message, then new ones
    All,
    /// Only messages published after the consumer was created
    New,
}

/// Acknowledgement policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckPolicy {
    /// Every delivery must be acked explicitly
    Explicit,
    /// Fire-and-forget delivery
    None,
}

/// Declarative stream description for `ensure_stream`
#[derive(Debug, Clone)]
pub struct StreamSpec {
    pub name: String,
    pub subjects: Vec<String>,
    pub retention: Retention,
}

impl StreamSpec {
    /// The work stream: job requests, removed on ack
    pub fn work() -> Self {
        Self {
            name: seqrun_core::subjects::WORK_STREAM.to_string(),
            subjects: vec![seqrun_core::subjects::JOB_REQUEST.to_string()],
            retention: Retention::WorkQueue,
        }
    }

    /// The event stream: lifecycle events, retained for replay
    pub fn events() -> Self {
        Self {
            name: seqrun_core::subjects::EVENT_STREAM.to_string(),
            subjects: vec![seqrun_core::subjects::JOB_EVENTS_WILDCARD.to_string()],
            retention: Retention::Limits,
        }
    }
}

/// Consumer description for `subscribe_with_config`
#[derive(Debug, Clone)]
pub struct SubscribeConfig {
    /// Stream the consumer reads from
    pub stream: String,
    /// Subject filter within the stream
    pub filter_subject: String,
    /// `Some` creates or resumes a named durable cursor; `None` is an
    /// ephemeral consumer that dies with the subscription
    pub durable_name: Option<String>,
    pub deliver_policy: DeliverPolicy,
    pub ack_policy: AckPolicy,
}

/// Broker operations used by the job core.
#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// Create the stream if it does not exist. Creation is idempotent;
    /// an existing stream with incompatible config is an error.
    async fn ensure_stream(&self, spec: StreamSpec) -> Result<()>;

    /// Publish and wait for the broker's ack. Fails if the subject does
    /// not belong to any provisioned stream.
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<()>;

    /// Durable work-queue subscription. Deliveries are dispatched
    /// concurrently (one task each); the message is acked when its
    /// handler returns `Ok`. Blocks until `shutdown` flips or the
    /// subscription fails.
    async fn subscribe(
        &self,
        stream: &str,
        subject: &str,
        consumer_name: &str,
        shutdown: watch::Receiver<bool>,
        handler: Handler,
    ) -> Result<()>;

    /// Lower-level subscription with explicit consumer config.
    /// Deliveries are handled sequentially in publication order; with
    /// `AckPolicy::Explicit` each message is acked when the handler
    /// returns `Ok`. Blocks until `shutdown` flips or the subscription
    /// fails.
    async fn subscribe_with_config(
        &self,
        config: SubscribeConfig,
        shutdown: watch::Receiver<bool>,
        handler: Handler,
    ) -> Result<()>;
}
