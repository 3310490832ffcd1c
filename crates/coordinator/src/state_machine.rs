use std::collections::HashMap;
use std::sync::Arc;

use quiz_bus::{QuestionConsumerHandle, QuizBus};
use quiz_types::{Quiz, Role, ServerMessage};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::registry::ConnectionRegistry;
use crate::tracker::{Advance, Tracker};

/// Ties the registry, tracker, and per-session bus consumers together per
/// the session/question state machine. Cheaply cloneable: every field is an
/// `Arc` or a registry (itself `Arc`-backed), so bus callbacks can hold a
/// clone without borrowing issues.
#[derive(Clone)]
pub struct SessionMachine {
    registry: ConnectionRegistry,
    tracker: Arc<Tracker>,
    bus: Arc<QuizBus>,
    consumers: Arc<Mutex<HashMap<String, QuestionConsumerHandle>>>,
}

impl SessionMachine {
    pub fn new(registry: ConnectionRegistry, tracker: Arc<Tracker>, bus: Arc<QuizBus>) -> Self {
        Self {
            registry,
            tracker,
            bus,
            consumers: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn tracker(&self) -> &Arc<Tracker> {
        &self.tracker
    }

    /// `session.start{sessionId, quiz}`. Registering the connection-registry
    /// entry is the tie-break for concurrent duplicate events: only the
    /// caller that wins that atomic insert proceeds to spawn the per-session
    /// question consumer.
    pub async fn on_session_start(&self, session_id: String, quiz: Quiz) {
        if !self.registry.register_session(&session_id) {
            warn!(session_id, "duplicate session.start, dropping");
            return;
        }
        if let Err(e) = self.tracker.new_session(&session_id, quiz).await {
            error!(session_id, error = %e, "failed to register session state");
            self.registry.unregister_session(&session_id);
            return;
        }
        let this = self.clone();
        let sid = session_id.clone();
        let result = self
            .bus
            .spawn_question_consumer(&session_id, move || {
                let this = this.clone();
                let sid = sid.clone();
                async move { this.on_question_start(&sid).await }
            })
            .await;
        match result {
            Ok(handle) => {
                self.consumers.lock().await.insert(session_id.clone(), handle);
                info!(session_id, "session registered, question consumer started");
            }
            Err(e) => {
                error!(session_id, error = %e, "failed to start question consumer");
            }
        }
    }

    /// `question.<sessionId>.start`. Unknown sessions are dropped silently.
    pub async fn on_question_start(&self, session_id: &str) {
        let advance = match self.tracker.advance_question(session_id).await {
            Ok(a) => a,
            Err(e) => {
                warn!(session_id, error = %e, "question.start for unknown/errored session, dropping");
                return;
            }
        };

        match advance {
            Advance::QuizExhausted => {
                self.registry
                    .broadcast_to_session(session_id, &ServerMessage::End, false);
                info!(session_id, "quiz exhausted, end broadcast to participants");
            }
            Advance::Advanced { idx } => {
                if idx >= 1 {
                    self.emit_previous_question_stats(session_id, idx).await;
                }
                self.emit_new_question(session_id, idx).await;
            }
        }
    }

    async fn emit_previous_question_stats(&self, session_id: &str, idx: i32) {
        match self.tracker.get_leaderboard(session_id).await {
            Ok(board) => {
                self.registry.send_to_admin(
                    session_id,
                    &ServerMessage::Leaderboard {
                        payload: board.table.clone(),
                    },
                );
                let prev_idx = (idx - 1).max(0) as usize;
                for ctx in self.registry.get_connections(session_id) {
                    if ctx.role != Role::Participant {
                        continue;
                    }
                    let correct = self
                        .tracker
                        .was_correct(session_id, &ctx.user_id, prev_idx)
                        .await;
                    self.registry.send_message(
                        &ServerMessage::QuestionStat {
                            correct,
                            payload: board.popular.clone(),
                        },
                        std::slice::from_ref(&ctx),
                    );
                }
            }
            Err(e) => {
                error!(session_id, error = %e, "leaderboard snapshot failed");
                self.registry
                    .broadcast_to_session(session_id, &ServerMessage::Error, true);
            }
        }
    }

    async fn emit_new_question(&self, session_id: &str, idx: i32) {
        match self.tracker.get_current_question(session_id).await {
            Ok((question_idx, questions_amount, question)) => {
                self.registry.send_to_admin(
                    session_id,
                    &ServerMessage::Question {
                        question_id: question_idx,
                        questions_amount,
                        text: question.text.clone(),
                        options: question.options.clone(),
                    },
                );
                self.registry
                    .broadcast_to_session(session_id, &ServerMessage::NextQuestion, false);
                info!(session_id, idx, "advanced to new question");
            }
            Err(e) => {
                error!(session_id, error = %e, "failed to load current question");
            }
        }
    }

    /// Cancels every still-running per-session bus consumer. Called on
    /// process shutdown (§10.5) so no consumer task outlives the HTTP
    /// listener it was spawned alongside.
    pub async fn shutdown(&self) {
        let handles: Vec<_> = self.consumers.lock().await.drain().collect();
        for (session_id, handle) in handles {
            handle.cancel().await;
            info!(session_id, "question consumer cancelled on shutdown");
        }
    }

    /// `session.end{sessionId}`: cancel the question consumer, notify
    /// participants, close every connection, and drop all session state.
    pub async fn on_session_end(&self, session_id: &str) {
        if let Some(handle) = self.consumers.lock().await.remove(session_id) {
            handle.cancel().await;
        }
        self.registry
            .broadcast_to_session(session_id, &ServerMessage::End, false);
        self.registry.unregister_session(session_id);
        if let Err(e) = self.tracker.end_session(session_id).await {
            error!(session_id, error = %e, "failed to clear session cache state");
        }
        info!(session_id, "session ended and torn down");
    }
}
