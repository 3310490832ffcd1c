use serde::{Deserialize, Serialize};

/// One selectable answer to a [`Question`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Option_ {
    pub text: String,
    #[serde(rename = "isCorrect")]
    pub is_correct: bool,
}

/// The kind of prompt a [`Question`] presents. The realtime core treats all
/// kinds identically; `kind` is carried through for the client to render.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
    SingleChoice,
    MultipleChoice,
    TrueFalse,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Question {
    pub kind: QuestionKind,
    pub text: String,
    #[serde(rename = "imageUrl", skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub options: Vec<Option_>,
}

impl Question {
    /// Index and reference of the unique option flagged correct.
    ///
    /// Per invariant, exactly one option should have `is_correct == true`.
    /// If the data is corrupt and none is flagged, returns `(0, None)` and
    /// callers must treat every submission for this question as incorrect.
    pub fn correct_option(&self) -> (usize, Option<&Option_>) {
        match self.options.iter().position(|o| o.is_correct) {
            Some(idx) => (idx, self.options.get(idx)),
            None => (0, None),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Quiz {
    pub questions: Vec<Question>,
}

impl Quiz {
    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&Question> {
        self.questions.get(idx)
    }
}

/// Role a connected client carries; determines which outbound messages it
/// receives.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Participant,
}

/// One participant's recorded answer for a single question index.
///
/// Zero-initialised to `answered: false` when a session's answer matrix is
/// allocated; overwritten in place while the question is still current.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct UserAnswer {
    pub answered: bool,
    #[serde(rename = "optionIndex")]
    pub option_index: i32,
    pub correct: bool,
    pub timestamp: i64,
}

impl UserAnswer {
    pub fn blank() -> Self {
        Self {
            answered: false,
            option_index: -1,
            correct: false,
            timestamp: 0,
        }
    }
}

/// Lifecycle state of one session's question progression.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Waiting,
    Running,
    Ended,
}

/// Persisted snapshot of a session's progression, mirrored to the cache
/// under `session:<sid>:quiz_state` so a crash does not lose a running
/// quiz.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizState {
    #[serde(rename = "currQuestionIdx")]
    pub curr_question_idx: i32,
    #[serde(rename = "quizData")]
    pub quiz_data: Quiz,
}
