// In-process message queue
//
// A broker stand-in for tests and single-process development runs. It
// models what the job core relies on - subject routing, deliver-all
// replay in publication order, concurrent work-stream dispatch - and
// deliberately not what it doesn't (redelivery timers, cross-process
// load balancing, retention limits).

use async_trait::async_trait;
use seqrun_core::{subjects, JobError, Result};
use seqrun_mq::{
    DeliverPolicy, Handler, MessageQueue, StreamSpec, SubscribeConfig,
};
use std::sync::Mutex;
use tokio::sync::{broadcast, watch};

struct StreamState {
    spec: StreamSpec,
    /// Retained messages, in publication order
    history: Vec<(String, Vec<u8>)>,
    live: broadcast::Sender<(String, Vec<u8>)>,
}

/// In-memory implementation of `MessageQueue`.
#[derive(Default)]
pub struct InMemoryQueue {
    streams: Mutex<Vec<StreamState>>,
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// History snapshot filtered to `filter`, plus a live receiver
    /// registered atomically with the snapshot so no message is lost in
    /// between.
    fn snapshot(
        &self,
        stream: &str,
        filter: &str,
    ) -> Result<(Vec<(String, Vec<u8>)>, broadcast::Receiver<(String, Vec<u8>)>)> {
        let streams = self.streams.lock().unwrap_or_else(|e| e.into_inner());
        let state = streams
            .iter()
            .find(|s| s.spec.name == stream)
            .ok_or_else(|| JobError::broker(format!("unknown stream {stream}")))?;

        let history = state
            .history
            .iter()
            .filter(|(subject, _)| subjects::matches(filter, subject))
            .cloned()
            .collect();
        Ok((history, state.live.subscribe()))
    }
}

#[async_trait]
impl MessageQueue for InMemoryQueue {
    async fn ensure_stream(&self, spec: StreamSpec) -> Result<()> {
        let mut streams = self.streams.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(existing) = streams.iter().find(|s| s.spec.name == spec.name) {
            if existing.spec.subjects != spec.subjects || existing.spec.retention != spec.retention
            {
                return Err(JobError::broker(format!(
                    "stream {} exists with incompatible config",
                    spec.name
                )));
            }
            return Ok(());
        }

        let (live, _) = broadcast::channel(1024);
        streams.push(StreamState {
            spec,
            history: Vec::new(),
            live,
        });
        Ok(())
    }

    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<()> {
        let mut streams = self.streams.lock().unwrap_or_else(|e| e.into_inner());
        let state = streams
            .iter_mut()
            .find(|s| {
                s.spec
                    .subjects
                    .iter()
                    .any(|pattern| subjects::matches(pattern, subject))
            })
            .ok_or_else(|| {
                JobError::broker(format!("subject {subject} does not match any stream"))
            })?;

        state.history.push((subject.to_string(), payload.clone()));
        // No receivers yet is fine; history covers deliver-all joiners
        let _ = state.live.send((subject.to_string(), payload));
        Ok(())
    }

    async fn subscribe(
        &self,
        stream: &str,
        subject: &str,
        _consumer_name: &str,
        mut shutdown: watch::Receiver<bool>,
        handler: Handler,
    ) -> Result<()> {
        let (history, mut live) = self.snapshot(stream, subject)?;

        for (_, payload) in history {
            let handler = handler.clone();
            tokio::spawn(async move {
                let _ = handler(payload).await;
            });
        }

        loop {
            tokio::select! {
                _ = shutdown.changed() => return Ok(()),
                delivery = live.recv() => match delivery {
                    Ok((msg_subject, payload)) => {
                        if subjects::matches(subject, &msg_subject) {
                            let handler = handler.clone();
                            tokio::spawn(async move {
                                let _ = handler(payload).await;
                            });
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return Ok(()),
                },
            }
        }
    }

    async fn subscribe_with_config(
        &self,
        config: SubscribeConfig,
        mut shutdown: watch::Receiver<bool>,
        handler: Handler,
    ) -> Result<()> {
        let (history, mut live) = self.snapshot(&config.stream, &config.filter_subject)?;

        if config.deliver_policy == DeliverPolicy::All {
            for (_, payload) in history {
                let _ = handler(payload).await;
            }
        }

        loop {
            tokio::select! {
                _ = shutdown.changed() => return Ok(()),
                delivery = live.recv() => match delivery {
                    Ok((msg_subject, payload)) => {
                        if subjects::matches(&config.filter_subject, &msg_subject) {
                            let _ = handler(payload).await;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return Ok(()),
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use seqrun_mq::Retention;

    #[tokio::test]
    async fn publish_to_unmatched_subject_fails() {
        let queue = InMemoryQueue::new();
        queue.ensure_stream(StreamSpec::work()).await.unwrap();

        let err = queue
            .publish("other.subject", b"x".to_vec())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("does not match any stream"));
    }

    #[tokio::test]
    async fn ensure_stream_is_idempotent_but_rejects_config_changes() {
        let queue = InMemoryQueue::new();
        queue.ensure_stream(StreamSpec::events()).await.unwrap();
        queue.ensure_stream(StreamSpec::events()).await.unwrap();

        let incompatible = StreamSpec {
            name: StreamSpec::events().name,
            subjects: vec!["other.>".to_string()],
            retention: Retention::WorkQueue,
        };
        let err = queue.ensure_stream(incompatible).await.unwrap_err();
        assert!(err.to_string().contains("incompatible"));
    }
}
