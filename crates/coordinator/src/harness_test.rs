//! Drives the tracker and connection registry together through a full
//! session lifecycle, without a live bus or socket. This exercises the same
//! call sequence `SessionMachine` makes (`tracker` module, `state_machine`
//! module) against fake cache/evaluator collaborators, covering testable
//! properties 1 and 2 and scenarios A/B/E from the external-interfaces
//! section: index advance, per-question stat/leaderboard fan-out in the
//! mandated order, and end-of-quiz broadcast.

use std::sync::Arc;

use quiz_types::{
    BoardResponse, Option_, PopularAns, Quiz, Question, QuestionKind, Role, ScoreEntry,
    ScoreTable, ServerMessage,
};
use tokio::sync::mpsc;

use crate::collaborators::{MockCache, MockEvaluator};
use crate::registry::{ConnectionContext, ConnectionRegistry};
use crate::tracker::{Advance, Tracker};

fn quiz(n: usize) -> Quiz {
    Quiz {
        questions: (0..n)
            .map(|i| Question {
                kind: QuestionKind::SingleChoice,
                text: format!("question {i}"),
                image_url: None,
                options: vec![
                    Option_ { text: "a".into(), is_correct: true },
                    Option_ { text: "b".into(), is_correct: false },
                ],
            })
            .collect(),
    }
}

fn connection(
    sid: &str,
    uid: &str,
    role: Role,
) -> (Arc<ConnectionContext>, mpsc::UnboundedReceiver<ServerMessage>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Arc::new(ConnectionContext::new(sid, uid, uid, role, tx)), rx)
}

/// Builds a `Tracker` whose cache collaborator accepts every write and whose
/// evaluator always returns the same fixed board, for tests that only care
/// about the state machine's control flow, not persistence or scoring.
fn tracker_with_stubs(board: BoardResponse) -> Tracker {
    let mut cache = MockCache::new();
    cache.expect_set_quiz_state().returning(|_, _| Ok(()));
    cache.expect_set_user_answer().returning(|_, _, _, _| Ok(()));
    cache.expect_delete_session().returning(|_| Ok(()));

    let mut evaluator = MockEvaluator::new();
    evaluator
        .expect_compute_board()
        .returning(move |_, _| Ok(board.clone()));

    Tracker::new(Arc::new(cache), Arc::new(evaluator))
}

#[tokio::test]
async fn scenario_a_two_question_session_emits_expected_message_sequence() {
    let session_id = "s1";
    let board = BoardResponse {
        session_code: session_id.to_string(),
        table: ScoreTable {
            users: vec![ScoreEntry { user_id: "alice".into(), total_score: 900 }],
        },
        popular: PopularAns::default(),
    };
    let tracker = tracker_with_stubs(board);
    let registry = ConnectionRegistry::new();

    registry.register_session(session_id);
    let (admin_ctx, mut admin_rx) = connection(session_id, "admin", Role::Admin);
    let (alice_ctx, mut alice_rx) = connection(session_id, "alice", Role::Participant);
    let (bob_ctx, mut bob_rx) = connection(session_id, "bob", Role::Participant);
    registry.register_connection(admin_ctx).unwrap();
    registry.register_connection(alice_ctx).unwrap();
    registry.register_connection(bob_ctx).unwrap();

    assert!(tracker.new_session(session_id, quiz(2)).await.unwrap());

    // question.start #1: advances to index 0. idx < 1, so no previous-stat
    // burst, only the admin `question` + participant `next_question` pair.
    assert_eq!(
        tracker.advance_question(session_id).await.unwrap(),
        Advance::Advanced { idx: 0 }
    );
    let (q_idx, q_amount, question) = tracker.get_current_question(session_id).await.unwrap();
    registry.send_to_admin(
        session_id,
        &ServerMessage::Question {
            question_id: q_idx,
            questions_amount: q_amount,
            text: question.text.clone(),
            options: question.options.clone(),
        },
    );
    registry.broadcast_to_session(session_id, &ServerMessage::NextQuestion, false);

    assert!(matches!(admin_rx.try_recv(), Ok(ServerMessage::Question { question_id: 0, .. })));
    assert_eq!(alice_rx.try_recv().unwrap(), ServerMessage::NextQuestion);
    assert_eq!(bob_rx.try_recv().unwrap(), ServerMessage::NextQuestion);

    tracker.record_answer(session_id, "alice", 0, Some(100)).await.unwrap();
    tracker.record_answer(session_id, "bob", 1, Some(101)).await.unwrap();

    // question.start #2: advances to index 1, idx >= 1 so the previous
    // question's leaderboard/stat burst fires before the new question.
    assert_eq!(
        tracker.advance_question(session_id).await.unwrap(),
        Advance::Advanced { idx: 1 }
    );
    registry.send_to_admin(
        session_id,
        &ServerMessage::Leaderboard { payload: tracker.get_leaderboard(session_id).await.unwrap().table },
    );
    for ctx in registry.get_connections(session_id) {
        if ctx.role != Role::Participant {
            continue;
        }
        let correct = tracker.was_correct(session_id, &ctx.user_id, 0).await;
        registry.send_message(
            &ServerMessage::QuestionStat { correct, payload: PopularAns::default() },
            std::slice::from_ref(&ctx),
        );
    }
    assert!(matches!(admin_rx.try_recv(), Ok(ServerMessage::Leaderboard { .. })));
    let alice_stat = alice_rx.try_recv().unwrap();
    assert_eq!(alice_stat, ServerMessage::QuestionStat { correct: true, payload: PopularAns::default() });
    let bob_stat = bob_rx.try_recv().unwrap();
    assert_eq!(bob_stat, ServerMessage::QuestionStat { correct: false, payload: PopularAns::default() });

    // question.start #3: the quiz only has 2 questions, so this is exhausted
    // and only participants get `end`, never the admin.
    assert_eq!(
        tracker.advance_question(session_id).await.unwrap(),
        Advance::QuizExhausted
    );
    registry.broadcast_to_session(session_id, &ServerMessage::End, false);
    assert!(admin_rx.try_recv().is_err());
    assert_eq!(alice_rx.try_recv().unwrap(), ServerMessage::End);
    assert_eq!(bob_rx.try_recv().unwrap(), ServerMessage::End);

    tracker.end_session(session_id).await.unwrap();
    registry.unregister_session(session_id);
    assert!(registry.get_connections(session_id).is_empty());
}

#[tokio::test]
async fn advancing_past_last_question_never_mutates_index_again() {
    let board = BoardResponse {
        session_code: "s1".into(),
        table: ScoreTable::default(),
        popular: PopularAns::default(),
    };
    let tracker = tracker_with_stubs(board);
    tracker.new_session("s1", quiz(1)).await.unwrap();

    assert_eq!(tracker.advance_question("s1").await.unwrap(), Advance::Advanced { idx: 0 });
    assert_eq!(tracker.advance_question("s1").await.unwrap(), Advance::QuizExhausted);
    assert_eq!(tracker.advance_question("s1").await.unwrap(), Advance::QuizExhausted);

    let (idx, _, _) = tracker.get_current_question("s1").await.unwrap();
    assert_eq!(idx, 0);
}
