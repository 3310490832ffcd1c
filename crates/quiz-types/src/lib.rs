pub mod message;
pub mod model;

pub use message::{
    AnswerInput, BoardResponse, ClientMessage, PopularAns, ScoreEntry, ScoreTable,
    ServerMessage, SessionAnswers,
};
pub use model::{Option_, Question, QuestionKind, Quiz, Role, SessionState, UserAnswer, QuizState};
