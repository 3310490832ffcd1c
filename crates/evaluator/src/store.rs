//! Trait seam around the cache's two scoring operations. `compute_board`
//! depends on this instead of the concrete `quiz_cache::QuizCache` type so
//! the HTTP layer can be exercised against a `MockScoreStore` in a router
//! test, without a live Redis instance.

use async_trait::async_trait;
use quiz_cache::CacheError;
use quiz_types::ScoreEntry;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ScoreStore: Send + Sync {
    async fn incr_scores(&self, session_id: &str, deltas: &[(String, i64)]) -> Result<(), CacheError>;
    async fn get_scores_desc(&self, session_id: &str) -> Result<Vec<ScoreEntry>, CacheError>;
}

#[async_trait]
impl ScoreStore for quiz_cache::QuizCache {
    async fn incr_scores(&self, session_id: &str, deltas: &[(String, i64)]) -> Result<(), CacheError> {
        quiz_cache::QuizCache::incr_scores(self, session_id, deltas).await
    }

    async fn get_scores_desc(&self, session_id: &str) -> Result<Vec<ScoreEntry>, CacheError> {
        quiz_cache::QuizCache::get_scores_desc(self, session_id).await
    }
}
