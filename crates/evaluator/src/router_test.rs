//! Router-level contract test for `POST /get-results`, driven with
//! `tower::ServiceExt::oneshot` against a `MockScoreStore` so the HTTP
//! surface is exercised end to end without a live cache.

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use quiz_types::{BoardResponse, ScoreEntry};
use tower::ServiceExt;

use crate::store::MockScoreStore;
use crate::{build_router, AppState};

fn app(mock: MockScoreStore) -> Router {
    build_router(AppState {
        cache: Arc::new(mock),
    })
}

fn post(path: &str, body: String) -> Request<Body> {
    Request::post(path)
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap()
}

const BATCH: &str = r#"{
    "sessionCode": "ABCD",
    "answers": [
        {"userId": "u1", "correct": true, "answered": true, "option": "0", "timestamp": 0},
        {"userId": "u2", "correct": false, "answered": true, "option": "1", "timestamp": 1}
    ]
}"#;

#[tokio::test]
async fn get_results_returns_200_with_updated_board() {
    let mut mock = MockScoreStore::new();
    mock.expect_incr_scores().returning(|_, _| Ok(()));
    mock.expect_get_scores_desc().returning(|_| {
        Ok(vec![ScoreEntry {
            user_id: "u1".into(),
            total_score: 1000,
        }])
    });

    let resp = app(mock)
        .oneshot(post("/get-results", BATCH.to_string()))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = to_bytes(resp.into_body(), 1024 * 1024).await.unwrap();
    let board: BoardResponse = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(board.session_code, "ABCD");
    assert_eq!(board.table.users[0].user_id, "u1");
    assert_eq!(board.popular.answers.get("0"), Some(&1));
}

#[tokio::test]
async fn get_results_returns_400_on_malformed_body() {
    let mock = MockScoreStore::new();

    let resp = app(mock)
        .oneshot(post("/get-results", "not json".to_string()))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn get_results_returns_500_on_cache_failure() {
    let mut mock = MockScoreStore::new();
    mock.expect_incr_scores().returning(|_, _| {
        let decode_err = serde_json::from_str::<i32>("not json").unwrap_err();
        Err(quiz_cache::CacheError::Decode(decode_err))
    });

    let resp = app(mock)
        .oneshot(post("/get-results", BATCH.to_string()))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
}
