//! Topic-exchange bus client. The core consumes three logical subjects —
//! `session.start`, `session.end`, and per-session `question.<sessionId>.start`
//! — all published as routing keys on a single durable topic exchange.
//!
//! Deliveries are consumed with `no_ack: true` (auto-ack): the spec assumes
//! at-least-once delivery and treats idempotency as the state machine's
//! responsibility rather than something the bus client can paper over by
//! withholding acks.

use std::future::Future;
use std::time::Duration;

use futures::StreamExt;
use lapin::{
    options::{
        BasicConsumeOptions, ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
    },
    types::FieldTable,
    Channel, Connection, ConnectionProperties, ExchangeKind,
};
use quiz_types::Quiz;
use serde::Deserialize;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const RECONNECT_BACKOFF: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum BusError {
    #[error("amqp connection error: {0}")]
    Connect(#[source] lapin::Error),

    #[error("amqp channel error: {0}")]
    Channel(#[source] lapin::Error),

    #[error("amqp setup error: {0}")]
    Setup(#[source] lapin::Error),

    #[error("malformed event body: {0}")]
    Decode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionStartEvent {
    #[serde(rename = "session_id")]
    pub session_id: String,
    pub quiz: Quiz,
}

#[derive(Debug, Clone)]
pub struct SessionEndEvent {
    pub session_id: String,
}

pub struct QuizBus {
    _connection: Connection,
    channel: Channel,
    exchange: String,
}

impl QuizBus {
    pub async fn connect(url: &str, exchange: &str) -> Result<Self, BusError> {
        let connection = Connection::connect(url, ConnectionProperties::default())
            .await
            .map_err(BusError::Connect)?;
        let channel = connection.create_channel().await.map_err(BusError::Channel)?;
        channel
            .exchange_declare(
                exchange,
                ExchangeKind::Topic,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(BusError::Setup)?;
        info!(exchange, "connected to bus");
        Ok(Self {
            _connection: connection,
            channel,
            exchange: exchange.to_string(),
        })
    }

    async fn durable_queue(&self, name: &str, routing_key: &str) -> Result<(), BusError> {
        self.channel
            .queue_declare(
                name,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(BusError::Setup)?;
        self.channel
            .queue_bind(
                name,
                &self.exchange,
                routing_key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(BusError::Setup)?;
        Ok(())
    }

    /// Runs the single durable logical consumer for `session.start` until the
    /// caller's future is dropped (this call never returns under normal
    /// operation; transient errors are logged and the consumer reconnects).
    pub async fn run_session_start<F, Fut>(&self, mut on_event: F) -> !
    where
        F: FnMut(SessionStartEvent) -> Fut,
        Fut: Future<Output = ()>,
    {
        loop {
            if let Err(e) = self.durable_queue("quiz.session.start", "session.start").await {
                error!(error = %e, "failed to declare session.start queue, retrying");
                tokio::time::sleep(RECONNECT_BACKOFF).await;
                continue;
            }
            let consumer = match self
                .channel
                .basic_consume(
                    "quiz.session.start",
                    "coordinator-session-start",
                    BasicConsumeOptions {
                        no_ack: true,
                        ..Default::default()
                    },
                    FieldTable::default(),
                )
                .await
            {
                Ok(c) => c,
                Err(e) => {
                    error!(error = %e, "failed to start session.start consumer, retrying");
                    tokio::time::sleep(RECONNECT_BACKOFF).await;
                    continue;
                }
            };

            let mut consumer = consumer;
            while let Some(delivery) = consumer.next().await {
                match delivery {
                    Ok(delivery) => match serde_json::from_slice::<SessionStartEvent>(&delivery.data) {
                        Ok(event) => on_event(event).await,
                        Err(e) => warn!(error = %e, "dropping malformed session.start event"),
                    },
                    Err(e) => {
                        error!(error = %e, "session.start delivery error, reconnecting");
                        break;
                    }
                }
            }
            warn!("session.start consumer stream ended, reconnecting");
            tokio::time::sleep(RECONNECT_BACKOFF).await;
        }
    }

    /// Runs the single durable logical consumer for `session.end`. The body
    /// is a bare JSON string containing the session id.
    pub async fn run_session_end<F, Fut>(&self, mut on_event: F) -> !
    where
        F: FnMut(SessionEndEvent) -> Fut,
        Fut: Future<Output = ()>,
    {
        loop {
            if let Err(e) = self.durable_queue("quiz.session.end", "session.end").await {
                error!(error = %e, "failed to declare session.end queue, retrying");
                tokio::time::sleep(RECONNECT_BACKOFF).await;
                continue;
            }
            let consumer = match self
                .channel
                .basic_consume(
                    "quiz.session.end",
                    "coordinator-session-end",
                    BasicConsumeOptions {
                        no_ack: true,
                        ..Default::default()
                    },
                    FieldTable::default(),
                )
                .await
            {
                Ok(c) => c,
                Err(e) => {
                    error!(error = %e, "failed to start session.end consumer, retrying");
                    tokio::time::sleep(RECONNECT_BACKOFF).await;
                    continue;
                }
            };

            let mut consumer = consumer;
            while let Some(delivery) = consumer.next().await {
                match delivery {
                    Ok(delivery) => match serde_json::from_slice::<String>(&delivery.data) {
                        Ok(session_id) => on_event(SessionEndEvent { session_id }).await,
                        Err(e) => warn!(error = %e, "dropping malformed session.end event"),
                    },
                    Err(e) => {
                        error!(error = %e, "session.end delivery error, reconnecting");
                        break;
                    }
                }
            }
            warn!("session.end consumer stream ended, reconnecting");
            tokio::time::sleep(RECONNECT_BACKOFF).await;
        }
    }

    /// Spawns the per-session, auto-deleted consumer for
    /// `question.<sessionId>.start`. The event body itself carries no
    /// information; the delivery is the signal.
    pub async fn spawn_question_consumer<F, Fut>(
        &self,
        session_id: &str,
        mut on_event: F,
    ) -> Result<QuestionConsumerHandle, BusError>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let routing_key = format!("question.{session_id}.start");
        let queue_name = format!("quiz.question.{session_id}.start");
        self.channel
            .queue_declare(
                &queue_name,
                QueueDeclareOptions {
                    durable: false,
                    auto_delete: true,
                    exclusive: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(BusError::Setup)?;
        self.channel
            .queue_bind(
                &queue_name,
                &self.exchange,
                &routing_key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(BusError::Setup)?;

        let consumer_tag = format!("coordinator-question-{session_id}");
        let mut consumer = self
            .channel
            .basic_consume(
                &queue_name,
                &consumer_tag,
                BasicConsumeOptions {
                    no_ack: true,
                    exclusive: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(BusError::Setup)?;

        let cancel = CancellationToken::new();
        let channel = self.channel.clone();
        let task_cancel = cancel.clone();
        let sid_for_log = session_id.to_string();
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = task_cancel.cancelled() => {
                        debug!(session_id = %sid_for_log, "question consumer cancelled");
                        break;
                    }
                    next = consumer.next() => {
                        match next {
                            Some(Ok(_delivery)) => on_event().await,
                            Some(Err(e)) => {
                                error!(session_id = %sid_for_log, error = %e, "question consumer delivery error");
                            }
                            None => {
                                debug!(session_id = %sid_for_log, "question consumer stream ended");
                                break;
                            }
                        }
                    }
                }
            }
            let _ = channel.basic_cancel(&consumer_tag, Default::default()).await;
        });

        Ok(QuestionConsumerHandle { cancel, task })
    }
}

/// Handle for the per-session `question.<sessionId>.start` consumer task.
/// Dropping this without calling [`cancel`](Self::cancel) leaves the task
/// running; callers own the handle for the session's lifetime.
pub struct QuestionConsumerHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl QuestionConsumerHandle {
    pub async fn cancel(self) {
        self.cancel.cancel();
        let _ = self.task.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_end_event_decodes_bare_string() {
        let raw = "\"abc-123\"";
        let sid: String = serde_json::from_str(raw).unwrap();
        assert_eq!(sid, "abc-123");
    }

    #[test]
    fn session_start_event_decodes_object() {
        let raw = r#"{"session_id":"s1","quiz":{"questions":[]}}"#;
        let event: SessionStartEvent = serde_json::from_str(raw).unwrap();
        assert_eq!(event.session_id, "s1");
        assert!(event.quiz.is_empty());
    }
}
