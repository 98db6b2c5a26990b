//! End-to-end quiz flows through the public crate surface, using an
//! in-memory score store.

use chrono::Utc;
use mathbot::quiz::answer::DEFAULT_TOLERANCE;
use mathbot::quiz::{Outcome, PenaltyPolicy, QuestionBank, QuizEngine, QuizStart};
use mathbot::storage::ScoreStore;

fn single_question_engine(store: ScoreStore) -> QuizEngine {
    let bank = QuestionBank::from_table(&[("What is 2 + 2?", "4")]);
    QuizEngine::new(bank, store, PenaltyPolicy::default(), DEFAULT_TOLERANCE)
}

#[tokio::test]
async fn a_full_round_updates_the_stored_score() {
    let store = ScoreStore::open_in_memory().unwrap();
    let engine = single_question_engine(store.clone());

    match engine.start_quiz("11").await {
        QuizStart::Posed { question, streak } => {
            assert_eq!(question, "What is 2 + 2?");
            assert_eq!(streak, 0);
        }
        other => panic!("expected a question, got {other:?}"),
    }

    match engine.handle_message("11", "4", Utc::now()).await {
        Outcome::Correct {
            points_earned,
            new_streak,
            recorded,
            next_question,
        } => {
            assert_eq!(points_earned, 12);
            assert_eq!(new_streak, 1);
            assert!(recorded);
            assert_eq!(next_question, "What is 2 + 2?");
        }
        other => panic!("expected a correct outcome, got {other:?}"),
    }

    match engine.handle_message("11", "five", Utc::now()).await {
        Outcome::Incorrect {
            points_lost,
            correct_answer,
            recorded,
        } => {
            assert_eq!(points_lost, 5);
            assert_eq!(correct_answer, "4");
            assert!(recorded);
        }
        other => panic!("expected an incorrect outcome, got {other:?}"),
    }

    let record = store.record("11").await.unwrap().unwrap();
    assert_eq!(record.points, 7);
    assert_eq!(record.highest_streak, 1);
    assert_eq!(record.total_correct, 1);
    assert!(record.last_active.is_some());
    assert_eq!(store.attempt_count("11").await.unwrap(), 2);

    // the wrong answer ended the session; chatter is ignored until /quest
    assert_eq!(
        engine.handle_message("11", "4", Utc::now()).await,
        Outcome::NotApplicable
    );
}

#[tokio::test]
async fn help_mode_pauses_the_quiz_until_cancelled() {
    let store = ScoreStore::open_in_memory().unwrap();
    let engine = single_question_engine(store);

    assert!(matches!(
        engine.start_quiz("22").await,
        QuizStart::Posed { .. }
    ));
    engine.enter_help_mode("22").await;

    // a would-be answer is not graded while helping
    assert_eq!(
        engine.handle_message("22", "4", Utc::now()).await,
        Outcome::NotApplicable
    );
    assert_eq!(engine.start_quiz("22").await, QuizStart::InHelpMode);

    let exit = engine.exit_help_mode("22").await;
    assert_eq!(
        exit,
        mathbot::quiz::engine::HelpExit::Resumed {
            question: "What is 2 + 2?".to_string()
        }
    );

    match engine.handle_message("22", "4", Utc::now()).await {
        Outcome::Correct { new_streak, .. } => assert_eq!(new_streak, 1),
        other => panic!("expected a correct outcome, got {other:?}"),
    }
}

#[tokio::test]
async fn leaderboard_ranks_users_by_points() {
    let store = ScoreStore::open_in_memory().unwrap();
    let engine = single_question_engine(store.clone());

    for user in ["31", "32"] {
        engine.start_quiz(user).await;
        engine.handle_message(user, "4", Utc::now()).await;
    }
    // second correct answer pushes one user ahead
    engine.handle_message("32", "4", Utc::now()).await;

    let top = store.top_records(10).await.unwrap();
    assert_eq!(top.len(), 2);
    assert_eq!(top[0].user_id, "32");
    assert_eq!(top[0].points, 12 + 14);
    assert_eq!(top[1].user_id, "31");
    assert_eq!(top[1].points, 12);
}
