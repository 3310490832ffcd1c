use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::model::Option_;

/// Inbound frame from a participant's duplex connection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClientMessage {
    pub option: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

/// Outbound frame. `type` is the wire discriminant; the remaining fields
/// are populated according to the table in the external interfaces
/// section — most are `None`/default for any given variant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Question {
        #[serde(rename = "questionId")]
        question_id: i32,
        #[serde(rename = "questionsAmount")]
        questions_amount: i32,
        text: String,
        options: Vec<Option_>,
    },
    /// Constructible and serializable per the wire schema; not emitted by
    /// any transition in the active state machine (see design notes).
    Result {
        #[serde(rename = "questionId")]
        question_id: i32,
        correct: bool,
    },
    Leaderboard {
        payload: ScoreTable,
    },
    QuestionStat {
        correct: bool,
        payload: PopularAns,
    },
    NextQuestion,
    End,
    Error,
}

/// One user's cumulative standing in a session's sorted score index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScoreEntry {
    #[serde(rename = "userId")]
    pub user_id: String,
    #[serde(rename = "totalScore")]
    pub total_score: i64,
}

/// Cumulative standings for a session, ordered by `total_score` descending.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ScoreTable {
    pub users: Vec<ScoreEntry>,
}

/// Per-question answer-frequency histogram, keyed by the opaque option
/// string the Evaluator was given (not an index into any particular
/// client's option list).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct PopularAns {
    pub answers: HashMap<String, usize>,
}

/// Composite response of a single Evaluator invocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BoardResponse {
    #[serde(rename = "sessionCode")]
    pub session_code: String,
    pub table: ScoreTable,
    pub popular: PopularAns,
}

/// One answer row submitted to the Evaluator for scoring.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnswerInput {
    #[serde(rename = "userId")]
    pub user_id: String,
    pub correct: bool,
    pub answered: bool,
    pub option: String,
    /// Unix epoch seconds. The earliest timestamp in a batch is `t0` for
    /// the scoring law.
    pub timestamp: i64,
}

/// Request body of `POST /get-results`: one session's batch of answers for
/// a single question.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionAnswers {
    #[serde(rename = "sessionCode")]
    pub session_code: String,
    pub answers: Vec<AnswerInput>,
}
