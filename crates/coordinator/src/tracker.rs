use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use quiz_types::{AnswerInput, BoardResponse, Quiz, QuizState, UserAnswer};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::collaborators::{Cache, Evaluator};
use crate::error::Error;

/// In-memory state for one running session: its immutable quiz, current
/// question index (starts at -1), and the per-user answer matrix.
struct SessionEntry {
    quiz: Quiz,
    current_idx: i32,
    answers: HashMap<String, Vec<UserAnswer>>,
}

impl SessionEntry {
    fn blank_answers(n: usize) -> Vec<UserAnswer> {
        (0..n).map(|_| UserAnswer::blank()).collect()
    }
}

/// Outcome of an `incQuestionIdx` attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    Advanced { idx: i32 },
    QuizExhausted,
}

/// Holds every running session's Quiz, question index, and answer matrix
/// behind a single mutex, mirroring state changes to the cache so a restart
/// does not lose a running quiz.
pub struct Tracker {
    cache: Arc<dyn Cache>,
    evaluator: Arc<dyn Evaluator>,
    sessions: Mutex<HashMap<String, SessionEntry>>,
}

impl Tracker {
    pub fn new(cache: Arc<dyn Cache>, evaluator: Arc<dyn Evaluator>) -> Self {
        Self {
            cache,
            evaluator,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Repopulates in-memory state from the cache at startup so a restart
    /// does not lose running sessions. Sessions discovered in cache with no
    /// subsequent bus event are retained until an explicit `session.end`.
    pub async fn restore(&self) -> Result<(), Error> {
        let session_ids = self.cache.list_session_ids().await?;
        let mut sessions = self.sessions.lock().await;
        for session_id in session_ids {
            let Some(state) = self.cache.get_quiz_state(&session_id).await? else {
                continue;
            };
            let n = state.quiz_data.len();
            let mut answers = HashMap::new();
            for user_id in self.cache.list_users_for_session(&session_id).await? {
                let mut vec = SessionEntry::blank_answers(n);
                for (idx, answer) in self.cache.get_user_answers(&session_id, &user_id).await? {
                    if let Some(slot) = vec.get_mut(idx as usize) {
                        *slot = answer;
                    }
                }
                answers.insert(user_id, vec);
            }
            info!(session_id, questions = n, "restored session from cache");
            sessions.insert(
                session_id,
                SessionEntry {
                    quiz: state.quiz_data,
                    current_idx: state.curr_question_idx,
                    answers,
                },
            );
        }
        Ok(())
    }

    /// Registers a new session. Returns `false` (no-op) if it already
    /// exists, matching `session.start`'s idempotent-drop policy.
    pub async fn new_session(&self, session_id: &str, quiz: Quiz) -> Result<bool, Error> {
        let mut sessions = self.sessions.lock().await;
        if sessions.contains_key(session_id) {
            return Ok(false);
        }
        let state = QuizState {
            curr_question_idx: -1,
            quiz_data: quiz.clone(),
        };
        self.cache.set_quiz_state(session_id, &state).await?;
        sessions.insert(
            session_id.to_string(),
            SessionEntry {
                quiz,
                current_idx: -1,
                answers: HashMap::new(),
            },
        );
        Ok(true)
    }

    /// Atomically advances the question index. Returns `QuizExhausted`
    /// without mutating state if the next index would equal `N`.
    pub async fn advance_question(&self, session_id: &str) -> Result<Advance, Error> {
        let mut sessions = self.sessions.lock().await;
        let entry = sessions
            .get_mut(session_id)
            .ok_or_else(|| Error::State(session_id.to_string()))?;
        let n = entry.quiz.len() as i32;
        if entry.current_idx + 1 >= n {
            return Ok(Advance::QuizExhausted);
        }
        entry.current_idx += 1;
        let idx = entry.current_idx;
        let state = QuizState {
            curr_question_idx: idx,
            quiz_data: entry.quiz.clone(),
        };
        self.cache.set_quiz_state(session_id, &state).await?;
        Ok(Advance::Advanced { idx })
    }

    /// Returns `(currentIdx, questionsAmount, question)` for the session's
    /// current question.
    pub async fn get_current_question(
        &self,
        session_id: &str,
    ) -> Result<(i32, i32, quiz_types::Question), Error> {
        let sessions = self.sessions.lock().await;
        let entry = sessions
            .get(session_id)
            .ok_or_else(|| Error::State(session_id.to_string()))?;
        let question = entry
            .quiz
            .get(entry.current_idx.max(0) as usize)
            .cloned()
            .ok_or_else(|| Error::State(format!("{session_id}: no question at current index")))?;
        Ok((entry.current_idx, entry.quiz.len() as i32, question))
    }

    /// Records a participant's answer at the session's *current* question
    /// index; a late submission for a previous question is recorded against
    /// the current index, not a backdated one.
    pub async fn record_answer(
        &self,
        session_id: &str,
        user_id: &str,
        option_idx: i32,
        timestamp: Option<i64>,
    ) -> Result<(), Error> {
        let mut sessions = self.sessions.lock().await;
        let entry = sessions
            .get_mut(session_id)
            .ok_or_else(|| Error::State(session_id.to_string()))?;
        if entry.current_idx < 0 {
            return Err(Error::State(format!(
                "{session_id}: no active question to answer"
            )));
        }
        let idx = entry.current_idx as usize;
        let n = entry.quiz.len();
        let (correct_idx, correct_opt) = entry
            .quiz
            .get(idx)
            .map(|q| q.correct_option())
            .unwrap_or((0, None));
        let correct = correct_opt.is_some() && correct_idx == option_idx as usize;

        let answer = UserAnswer {
            answered: true,
            option_index: option_idx,
            correct,
            timestamp: timestamp.unwrap_or_else(|| Utc::now().timestamp()),
        };

        let slots = entry
            .answers
            .entry(user_id.to_string())
            .or_insert_with(|| SessionEntry::blank_answers(n));
        if idx < slots.len() {
            slots[idx] = answer.clone();
        }
        self.cache
            .set_user_answer(session_id, user_id, idx as i32, &answer)
            .await?;
        debug!(session_id, user_id, idx, correct = answer.correct, "recorded answer");
        Ok(())
    }

    /// Builds a leaderboard snapshot for the previous question (index
    /// `max(currentIdx - 1, 0)`) by posting the recorded answers to the
    /// Evaluator.
    pub async fn get_leaderboard(&self, session_id: &str) -> Result<BoardResponse, Error> {
        let idx = {
            let sessions = self.sessions.lock().await;
            let entry = sessions
                .get(session_id)
                .ok_or_else(|| Error::State(session_id.to_string()))?;
            (entry.current_idx - 1).max(0) as usize
        };
        let answers = self.answers_for_question(session_id, idx).await?;
        self.evaluator
            .compute_board(session_id, answers)
            .await
            .map_err(|e| Error::Evaluator(e.to_string()))
    }

    /// Whether a given user's answer at `question_idx` was correct, used to
    /// populate the per-participant `question_stat` message.
    pub async fn was_correct(&self, session_id: &str, user_id: &str, question_idx: usize) -> bool {
        let sessions = self.sessions.lock().await;
        sessions
            .get(session_id)
            .and_then(|e| e.answers.get(user_id))
            .and_then(|v| v.get(question_idx))
            .map(|a| a.correct)
            .unwrap_or(false)
    }

    async fn answers_for_question(
        &self,
        session_id: &str,
        question_idx: usize,
    ) -> Result<Vec<AnswerInput>, Error> {
        let sessions = self.sessions.lock().await;
        let entry = sessions
            .get(session_id)
            .ok_or_else(|| Error::State(session_id.to_string()))?;
        Ok(entry
            .answers
            .iter()
            .map(|(user_id, answers)| {
                let a = answers.get(question_idx).cloned().unwrap_or_default();
                AnswerInput {
                    user_id: user_id.clone(),
                    correct: a.correct,
                    answered: a.answered,
                    option: a.option_index.to_string(),
                    timestamp: a.timestamp,
                }
            })
            .collect())
    }

    pub async fn end_session(&self, session_id: &str) -> Result<(), Error> {
        self.sessions.lock().await.remove(session_id);
        self.cache.delete_session(session_id).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quiz_types::{Option_, Question, QuestionKind};

    fn quiz(n: usize) -> Quiz {
        Quiz {
            questions: (0..n)
                .map(|i| Question {
                    kind: QuestionKind::SingleChoice,
                    text: format!("q{i}"),
                    image_url: None,
                    options: vec![
                        Option_ { text: "a".into(), is_correct: true },
                        Option_ { text: "b".into(), is_correct: false },
                    ],
                })
                .collect(),
        }
    }

    // These tests exercise the tracker's pure state transitions. They don't
    // reach the cache or evaluator, so a Tracker built for them is only
    // ever driven through `advance_question`/`record_answer`/`new_session`,
    // which return before touching those collaborators on the `State` path
    // being tested. Full leaderboard behavior is covered in the
    // coordinator's in-process harness test.

    #[test]
    fn advance_stops_at_quiz_end_without_mutating() {
        // advance_question's index arithmetic is the only logic under test
        // here; replicate it directly against a SessionEntry to avoid
        // needing live cache/evaluator collaborators in a unit test.
        let mut entry = SessionEntry {
            quiz: quiz(2),
            current_idx: 1,
            answers: HashMap::new(),
        };
        let n = entry.quiz.len() as i32;
        assert!(entry.current_idx + 1 >= n);
        let before = entry.current_idx;
        // simulate the no-op path
        if entry.current_idx + 1 < n {
            entry.current_idx += 1;
        }
        assert_eq!(entry.current_idx, before);
    }

    #[test]
    fn answers_for_question_builds_opaque_option_keys() {
        let mut answers = HashMap::new();
        answers.insert(
            "u1".to_string(),
            vec![UserAnswer {
                answered: true,
                option_index: 0,
                correct: true,
                timestamp: 100,
            }],
        );
        let entry = SessionEntry {
            quiz: quiz(1),
            current_idx: 0,
            answers,
        };
        let inputs: Vec<AnswerInput> = entry
            .answers
            .iter()
            .map(|(user_id, answers)| {
                let a = answers[0].clone();
                AnswerInput {
                    user_id: user_id.clone(),
                    correct: a.correct,
                    answered: a.answered,
                    option: a.option_index.to_string(),
                    timestamp: a.timestamp,
                }
            })
            .collect();
        assert_eq!(inputs[0].option, "0");
    }
}
