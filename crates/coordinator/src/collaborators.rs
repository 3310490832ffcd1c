//! Trait seams for the tracker's two collaborators (cache, evaluator). The
//! only reason these exist, rather than the tracker holding the concrete
//! `quiz_cache::QuizCache`/`evaluator_client::EvaluatorClient` types
//! directly, is so the session/question state machine can be driven in an
//! in-process test harness against fakes, without a live Redis or Evaluator
//! process.

use async_trait::async_trait;
use quiz_cache::CacheError;
use quiz_types::{AnswerInput, BoardResponse, QuizState, UserAnswer};

use crate::evaluator_client::EvaluatorClientError;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Cache: Send + Sync {
    async fn get_quiz_state(&self, session_id: &str) -> Result<Option<QuizState>, CacheError>;
    async fn set_quiz_state(&self, session_id: &str, state: &QuizState) -> Result<(), CacheError>;
    async fn set_user_answer(
        &self,
        session_id: &str,
        user_id: &str,
        question_idx: i32,
        answer: &UserAnswer,
    ) -> Result<(), CacheError>;
    async fn get_user_answers(
        &self,
        session_id: &str,
        user_id: &str,
    ) -> Result<Vec<(i32, UserAnswer)>, CacheError>;
    async fn list_users_for_session(&self, session_id: &str) -> Result<Vec<String>, CacheError>;
    async fn list_session_ids(&self) -> Result<Vec<String>, CacheError>;
    async fn delete_session(&self, session_id: &str) -> Result<(), CacheError>;
}

#[async_trait]
impl Cache for quiz_cache::QuizCache {
    async fn get_quiz_state(&self, session_id: &str) -> Result<Option<QuizState>, CacheError> {
        quiz_cache::QuizCache::get_quiz_state(self, session_id).await
    }

    async fn set_quiz_state(&self, session_id: &str, state: &QuizState) -> Result<(), CacheError> {
        quiz_cache::QuizCache::set_quiz_state(self, session_id, state).await
    }

    async fn set_user_answer(
        &self,
        session_id: &str,
        user_id: &str,
        question_idx: i32,
        answer: &UserAnswer,
    ) -> Result<(), CacheError> {
        quiz_cache::QuizCache::set_user_answer(self, session_id, user_id, question_idx, answer).await
    }

    async fn get_user_answers(
        &self,
        session_id: &str,
        user_id: &str,
    ) -> Result<Vec<(i32, UserAnswer)>, CacheError> {
        quiz_cache::QuizCache::get_user_answers(self, session_id, user_id).await
    }

    async fn list_users_for_session(&self, session_id: &str) -> Result<Vec<String>, CacheError> {
        quiz_cache::QuizCache::list_users_for_session(self, session_id).await
    }

    async fn list_session_ids(&self) -> Result<Vec<String>, CacheError> {
        quiz_cache::QuizCache::list_session_ids(self).await
    }

    async fn delete_session(&self, session_id: &str) -> Result<(), CacheError> {
        quiz_cache::QuizCache::delete_session(self, session_id).await
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Evaluator: Send + Sync {
    async fn compute_board(
        &self,
        session_id: &str,
        answers: Vec<AnswerInput>,
    ) -> Result<BoardResponse, EvaluatorClientError>;
}

#[async_trait]
impl Evaluator for crate::evaluator_client::EvaluatorClient {
    async fn compute_board(
        &self,
        session_id: &str,
        answers: Vec<AnswerInput>,
    ) -> Result<BoardResponse, EvaluatorClientError> {
        crate::evaluator_client::EvaluatorClient::compute_board(self, session_id, answers).await
    }
}
