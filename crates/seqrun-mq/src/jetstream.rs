// JetStream implementation of the message queue
//
// One NATS connection per process, shared and thread-safe. Stream
// provisioning happens once at startup; durable consumers survive
// process restarts, ephemeral consumers die with their subscription.

use async_trait::async_trait;
use futures::StreamExt;
use seqrun_core::{JobError, Result};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use async_nats::jetstream::{self, consumer, stream};

use crate::queue::{
    AckPolicy, DeliverPolicy, Handler, MessageQueue, Retention, StreamSpec, SubscribeConfig,
};

/// Broker gateway backed by NATS JetStream
pub struct JetStreamQueue {
    context: jetstream::Context,
}

impl JetStreamQueue {
    /// Connect to the broker. Startup connectivity failure is fatal to
    /// the caller; there is no in-process retry here.
    pub async fn connect(url: &str) -> Result<Self> {
        info!(url = %url, "Connecting to broker");

        let client = async_nats::ConnectOptions::new()
            .connection_timeout(Duration::from_secs(5))
            .connect(url)
            .await
            .map_err(|e| JobError::broker(format!("failed to connect to {url}: {e}")))?;

        let context = jetstream::new(client);

        Ok(Self { context })
    }

    fn consumer_config(config: &SubscribeConfig) -> consumer::pull::Config {
        consumer::pull::Config {
            durable_name: config.durable_name.clone(),
            filter_subject: config.filter_subject.clone(),
            deliver_policy: match config.deliver_policy {
                DeliverPolicy::All => consumer::DeliverPolicy::All,
                DeliverPolicy::New => consumer::DeliverPolicy::New,
            },
            ack_policy: match config.ack_policy {
                AckPolicy::Explicit => consumer::AckPolicy::Explicit,
                AckPolicy::None => consumer::AckPolicy::None,
            },
            ..Default::default()
        }
    }
}

#[async_trait]
impl MessageQueue for JetStreamQueue {
    async fn ensure_stream(&self, spec: StreamSpec) -> Result<()> {
        let config = stream::Config {
            name: spec.name.clone(),
            subjects: spec.subjects.clone(),
            retention: match spec.retention {
                Retention::WorkQueue => stream::RetentionPolicy::WorkQueue,
                Retention::Limits => stream::RetentionPolicy::Limits,
            },
            storage: stream::StorageType::File,
            ..Default::default()
        };

        // Creation is idempotent for an identical config; a stream that
        // already exists with a different one is a startup error.
        match self.context.create_stream(config).await {
            Ok(_) => {
                debug!(stream = %spec.name, subjects = ?spec.subjects, "Stream ready");
                Ok(())
            }
            Err(e) => Err(JobError::broker(format!(
                "failed to provision stream {}: {e}",
                spec.name
            ))),
        }
    }

    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<()> {
        let ack = self
            .context
            .publish(subject.to_string(), payload.into())
            .await
            .map_err(|e| JobError::broker(format!("publish to {subject} failed: {e}")))?;

        // The ack future resolves once the stream has persisted the
        // message; a subject outside every stream fails here.
        ack.await
            .map_err(|e| JobError::broker(format!("publish to {subject} not acked: {e}")))?;

        Ok(())
    }

    async fn subscribe(
        &self,
        stream: &str,
        subject: &str,
        consumer_name: &str,
        mut shutdown: watch::Receiver<bool>,
        handler: Handler,
    ) -> Result<()> {
        let stream = self
            .context
            .get_stream(stream)
            .await
            .map_err(|e| JobError::broker(format!("stream lookup failed: {e}")))?;

        let config = consumer::pull::Config {
            durable_name: Some(consumer_name.to_string()),
            filter_subject: subject.to_string(),
            deliver_policy: consumer::DeliverPolicy::All,
            ack_policy: consumer::AckPolicy::Explicit,
            ..Default::default()
        };

        let consumer = stream
            .get_or_create_consumer(consumer_name, config)
            .await
            .map_err(|e| JobError::broker(format!("consumer {consumer_name} failed: {e}")))?;

        let mut messages = consumer
            .messages()
            .await
            .map_err(|e| JobError::broker(format!("consume loop failed to start: {e}")))?;

        info!(subject = %subject, consumer = %consumer_name, "Subscribed");

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    info!(consumer = %consumer_name, "Subscription shutting down");
                    return Ok(());
                }
                delivery = messages.next() => {
                    match delivery {
                        Some(Ok(message)) => {
                            // Deliveries are dispatched concurrently; the
                            // handler decides when work actually starts
                            // (the job service gates on its semaphore).
                            let handler = handler.clone();
                            tokio::spawn(async move {
                                let payload = message.payload.to_vec();
                                match handler(payload).await {
                                    Ok(()) => {
                                        if let Err(e) = message.ack().await {
                                            warn!(error = %e, "Failed to ack delivery");
                                        }
                                    }
                                    Err(e) => {
                                        // Left un-acked on purpose; the broker
                                        // redelivers after the ack wait.
                                        warn!(error = %e, "Delivery left un-acked");
                                    }
                                }
                            });
                        }
                        Some(Err(e)) => {
                            return Err(JobError::broker(format!("delivery error: {e}")));
                        }
                        None => {
                            return Err(JobError::broker("consume loop ended unexpectedly"));
                        }
                    }
                }
            }
        }
    }

    async fn subscribe_with_config(
        &self,
        config: SubscribeConfig,
        mut shutdown: watch::Receiver<bool>,
        handler: Handler,
    ) -> Result<()> {
        let stream = self
            .context
            .get_stream(&config.stream)
            .await
            .map_err(|e| JobError::broker(format!("stream lookup failed: {e}")))?;

        let consumer_config = Self::consumer_config(&config);
        let consumer = match &config.durable_name {
            Some(name) => stream
                .get_or_create_consumer(name, consumer_config)
                .await
                .map_err(|e| JobError::broker(format!("consumer {name} failed: {e}")))?,
            None => stream
                .create_consumer(consumer_config)
                .await
                .map_err(|e| JobError::broker(format!("ephemeral consumer failed: {e}")))?,
        };

        let mut messages = consumer
            .messages()
            .await
            .map_err(|e| JobError::broker(format!("consume loop failed to start: {e}")))?;

        debug!(
            subject = %config.filter_subject,
            durable = ?config.durable_name,
            "Subscribed with config"
        );

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    debug!(subject = %config.filter_subject, "Subscription shutting down");
                    return Ok(());
                }
                delivery = messages.next() => {
                    match delivery {
                        Some(Ok(message)) => {
                            // Sequential delivery preserves publication
                            // order for replay consumers.
                            match handler(message.payload.to_vec()).await {
                                Ok(()) => {
                                    if config.ack_policy == AckPolicy::Explicit {
                                        if let Err(e) = message.ack().await {
                                            warn!(error = %e, "Failed to ack delivery");
                                        }
                                    }
                                }
                                Err(e) => {
                                    warn!(error = %e, "Delivery left un-acked");
                                }
                            }
                        }
                        Some(Err(e)) => {
                            return Err(JobError::broker(format!("delivery error: {e}")));
                        }
                        None => {
                            return Err(JobError::broker("consume loop ended unexpectedly"));
                        }
                    }
                }
            }
        }
    }
}
