//! Stateless scoring engine: `computeBoard` turns one session's batch of
//! per-question answers into an updated cumulative leaderboard and an
//! answer-frequency histogram. No mutable state lives in this process; the
//! cumulative score index lives entirely in the shared cache, so any number
//! of replicas can serve `/get-results` behind a load balancer.

pub mod config;
pub mod error;
#[cfg(test)]
mod router_test;
pub mod store;

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use quiz_types::{AnswerInput, BoardResponse, PopularAns, ScoreTable, SessionAnswers};
use tracing::error;

pub use error::Error;
pub use store::ScoreStore;

/// Points awarded for an instant-correct answer; the score decays linearly
/// to zero over [`DECAY_WINDOW_SECS`].
pub const MAX_SCORE: i64 = 1000;

/// Window, in seconds, over which a correct answer's score decays from
/// `MAX_SCORE` to zero.
pub const DECAY_WINDOW_SECS: f64 = 20.0;

/// Shared state handed to every axum handler.
#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<dyn ScoreStore>,
}

/// Builds the Evaluator's HTTP surface: the scoring route plus the ambient
/// liveness check. Exposed here (rather than only assembled in `main`) so a
/// router test can exercise it end to end with `tower::ServiceExt::oneshot`
/// against a fake [`ScoreStore`], without a live cache.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/get-results", post(get_results))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

/// `POST /get-results`: scores one session's answer batch and returns the
/// updated standings plus this batch's popular-answer tally. 200 on
/// success, 400 on a malformed body (handled by axum's `Json` extractor
/// rejection before this handler runs), 500 on a cache failure.
#[tracing::instrument(skip_all, fields(session_code = %req.session_code))]
async fn get_results(
    State(state): State<AppState>,
    Json(req): Json<SessionAnswers>,
) -> Result<Json<BoardResponse>, Error> {
    match compute_board(state.cache.as_ref(), req).await {
        Ok(board) => Ok(Json(board)),
        Err(e) => {
            error!(error = %e, "scoring failed");
            Err(e)
        }
    }
}

/// Per-answer scoring law (testable property 3 / scenario F): incorrect
/// answers contribute 0; correct answers decay linearly from `MAX_SCORE` at
/// `t0` to 0 at `t0 + DECAY_WINDOW_SECS`, clamped so a very late answer
/// never goes negative.
fn points_for(correct: bool, timestamp: i64, t0: i64) -> i64 {
    if !correct {
        return 0;
    }
    let elapsed = (timestamp - t0).max(0) as f64;
    let penalty = elapsed / DECAY_WINDOW_SECS;
    let points = (MAX_SCORE as f64 * (1.0 - penalty)).floor() as i64;
    points.clamp(0, MAX_SCORE)
}

/// Tally of `option` across rows where `answered` is true. `option` is an
/// opaque string key as far as this service is concerned.
fn tally_popular(answers: &[AnswerInput]) -> PopularAns {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for a in answers.iter().filter(|a| a.answered) {
        *counts.entry(a.option.clone()).or_insert(0) += 1;
    }
    PopularAns { answers: counts }
}

/// The single operation the Evaluator exposes: score a batch, accumulate it
/// into the session's cumulative index, and return the current standings
/// plus this batch's popular-answer tally.
pub async fn compute_board(cache: &dyn ScoreStore, req: SessionAnswers) -> Result<BoardResponse, Error> {
    let popular = tally_popular(&req.answers);

    if let Some(t0) = req.answers.iter().map(|a| a.timestamp).min() {
        let deltas: Vec<(String, i64)> = req
            .answers
            .iter()
            .map(|a| (a.user_id.clone(), points_for(a.correct, a.timestamp, t0)))
            .collect();
        cache.incr_scores(&req.session_code, &deltas).await?;
    }

    let users = cache.get_scores_desc(&req.session_code).await?;
    Ok(BoardResponse {
        session_code: req.session_code,
        table: ScoreTable { users },
        popular,
    })
}
