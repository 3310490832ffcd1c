//! Redis-backed shared substrate: the Coordinator's crash-recovery cache and
//! the Evaluator's cumulative score index both live behind this one client,
//! matching the key layout of the external interfaces section of the spec:
//!
//! - `session:<sid>:quiz_state` -> JSON `{currQuestionIdx, quizData}`, 24h TTL
//! - `session:<sid>:user:<uid>:answers` -> hash of question index -> JSON `UserAnswer`
//! - `leaderboard:<sid>` -> sorted set of `userId` -> cumulative score

use futures::StreamExt;
use quiz_types::{QuizState, ScoreEntry, UserAnswer};
use redis::{aio::ConnectionManager, AsyncCommands, Client};
use thiserror::Error;
use tracing::debug;

const QUIZ_STATE_TTL_SECS: i64 = 24 * 60 * 60;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("redis connection error: {0}")]
    Connect(#[source] redis::RedisError),

    #[error("redis command error: {0}")]
    Command(#[from] redis::RedisError),

    #[error("cache value decode error: {0}")]
    Decode(#[from] serde_json::Error),
}

fn quiz_state_key(session_id: &str) -> String {
    format!("session:{session_id}:quiz_state")
}

fn user_answers_key(session_id: &str, user_id: &str) -> String {
    format!("session:{session_id}:user:{user_id}:answers")
}

fn leaderboard_key(session_id: &str) -> String {
    format!("leaderboard:{session_id}")
}

/// Thin wrapper around a Redis connection manager; cheap to clone, safe to
/// share across every task that needs cache access.
#[derive(Clone)]
pub struct QuizCache {
    conn: ConnectionManager,
}

impl QuizCache {
    pub async fn connect(url: &str) -> Result<Self, CacheError> {
        let client = Client::open(url).map_err(CacheError::Connect)?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(CacheError::Connect)?;
        Ok(Self { conn })
    }

    pub async fn get_quiz_state(&self, session_id: &str) -> Result<Option<QuizState>, CacheError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(quiz_state_key(session_id)).await?;
        Ok(match raw {
            Some(s) => Some(serde_json::from_str(&s)?),
            None => None,
        })
    }

    pub async fn set_quiz_state(
        &self,
        session_id: &str,
        state: &QuizState,
    ) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let raw = serde_json::to_string(state)?;
        conn.set_ex::<_, _, ()>(quiz_state_key(session_id), raw, QUIZ_STATE_TTL_SECS as u64)
            .await?;
        Ok(())
    }

    pub async fn set_user_answer(
        &self,
        session_id: &str,
        user_id: &str,
        question_idx: i32,
        answer: &UserAnswer,
    ) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let raw = serde_json::to_string(answer)?;
        conn.hset::<_, _, _, ()>(user_answers_key(session_id, user_id), question_idx, raw)
            .await?;
        Ok(())
    }

    /// All recorded answers for one (session, user), keyed by question index.
    pub async fn get_user_answers(
        &self,
        session_id: &str,
        user_id: &str,
    ) -> Result<Vec<(i32, UserAnswer)>, CacheError> {
        let mut conn = self.conn.clone();
        let raw: Vec<(i32, String)> = conn
            .hgetall(user_answers_key(session_id, user_id))
            .await?;
        raw.into_iter()
            .map(|(idx, json)| Ok((idx, serde_json::from_str(&json)?)))
            .collect()
    }

    /// User ids with at least one recorded answer for this session, discovered
    /// by scanning the `session:<sid>:user:*:answers` key pattern.
    pub async fn list_users_for_session(&self, session_id: &str) -> Result<Vec<String>, CacheError> {
        let mut conn = self.conn.clone();
        let pattern = format!("session:{session_id}:user:*:answers");
        let mut keys: Vec<String> = conn.scan_match(&pattern).await?.collect().await;
        let prefix = format!("session:{session_id}:user:");
        let suffix = ":answers";
        keys.retain(|k| k.starts_with(&prefix) && k.ends_with(suffix));
        Ok(keys
            .into_iter()
            .map(|k| {
                k.trim_start_matches(&prefix)
                    .trim_end_matches(suffix)
                    .to_string()
            })
            .collect())
    }

    /// Session ids discovered by scanning `session:*:quiz_state`, used by the
    /// tracker's startup `restore()` to repopulate in-memory state.
    pub async fn list_session_ids(&self) -> Result<Vec<String>, CacheError> {
        let mut conn = self.conn.clone();
        let keys: Vec<String> = conn.scan_match("session:*:quiz_state").await?.collect().await;
        Ok(keys
            .into_iter()
            .filter_map(|k| {
                k.strip_prefix("session:")
                    .and_then(|s| s.strip_suffix(":quiz_state"))
                    .map(|s| s.to_string())
            })
            .collect())
    }

    /// Deletes every cache key belonging to a session: the quiz state, every
    /// user's answer hash, and the cumulative score index.
    pub async fn delete_session(&self, session_id: &str) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let users = self.list_users_for_session(session_id).await?;
        let mut keys = vec![quiz_state_key(session_id), leaderboard_key(session_id)];
        keys.extend(users.iter().map(|u| user_answers_key(session_id, u)));
        debug!(session_id, keys = keys.len(), "deleting session cache keys");
        conn.del::<_, ()>(keys).await?;
        Ok(())
    }

    /// Atomically increments each user's cumulative score in the session's
    /// sorted set, in a single pipeline.
    pub async fn incr_scores(
        &self,
        session_id: &str,
        deltas: &[(String, i64)],
    ) -> Result<(), CacheError> {
        if deltas.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.clone();
        let mut pipe = redis::pipe();
        let key = leaderboard_key(session_id);
        for (user_id, points) in deltas {
            pipe.zincr(&key, user_id, *points);
        }
        pipe.query_async::<()>(&mut conn).await?;
        Ok(())
    }

    /// Full score index for a session, descending by cumulative score.
    pub async fn get_scores_desc(&self, session_id: &str) -> Result<Vec<ScoreEntry>, CacheError> {
        let mut conn = self.conn.clone();
        let raw: Vec<(String, i64)> = conn
            .zrevrange_withscores(leaderboard_key(session_id), 0, -1)
            .await?;
        Ok(raw
            .into_iter()
            .map(|(user_id, total_score)| ScoreEntry {
                user_id,
                total_score,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_layout_matches_spec() {
        assert_eq!(quiz_state_key("s1"), "session:s1:quiz_state");
        assert_eq!(user_answers_key("s1", "u1"), "session:s1:user:u1:answers");
        assert_eq!(leaderboard_key("s1"), "leaderboard:s1");
    }
}
