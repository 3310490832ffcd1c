use quiz_types::{AnswerInput, BoardResponse, SessionAnswers};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EvaluatorClientError {
    #[error("request to evaluator failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("evaluator returned status {0}")]
    Status(reqwest::StatusCode),
}

/// Thin HTTP client for the Leaderboard Evaluator's `POST /get-results`.
pub struct EvaluatorClient {
    http: reqwest::Client,
    base_url: String,
}

impl EvaluatorClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    pub async fn compute_board(
        &self,
        session_id: &str,
        answers: Vec<AnswerInput>,
    ) -> Result<BoardResponse, EvaluatorClientError> {
        let url = format!("{}/get-results", self.base_url.trim_end_matches('/'));
        let body = SessionAnswers {
            session_code: session_id.to_string(),
            answers,
        };
        let resp = self.http.post(&url).json(&body).send().await?;
        if !resp.status().is_success() {
            return Err(EvaluatorClientError::Status(resp.status()));
        }
        Ok(resp.json::<BoardResponse>().await?)
    }
}
