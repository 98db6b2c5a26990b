//! The quiz state machine: one streak challenge per user, graded answers,
//! scores written through to storage.

use chrono::{DateTime, Utc};

use super::answer;
use super::bank::QuestionBank;
use super::session::{ConversationMode, QuizSession, SessionMap};
use crate::storage::ScoreStore;

/// How a wrong answer is priced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PenaltyPolicy {
    /// A flat deduction, regardless of streak.
    Fixed(i64),
    /// `base + per_streak * streak_at_posing`, so long streaks risk more.
    Scaled { base: i64, per_streak: i64 },
}

impl Default for PenaltyPolicy {
    fn default() -> Self {
        PenaltyPolicy::Fixed(5)
    }
}

impl PenaltyPolicy {
    fn price(&self, streak_at_posing: u32) -> i64 {
        match self {
            PenaltyPolicy::Fixed(points) => *points,
            PenaltyPolicy::Scaled { base, per_streak } => {
                base + per_streak * i64::from(streak_at_posing)
            }
        }
    }
}

/// Result of grading one message.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The message was not an answer to anything: no active question, or the
    /// user is in help mode.
    NotApplicable,
    Correct {
        next_question: String,
        points_earned: i64,
        new_streak: u32,
        /// False when the score could not be written; the quiz continues
        /// regardless, and the user should be told.
        recorded: bool,
    },
    Incorrect {
        correct_answer: String,
        points_lost: i64,
        recorded: bool,
    },
}

/// Result of asking for a new challenge.
#[derive(Debug, Clone, PartialEq)]
pub enum QuizStart {
    Posed { question: String, streak: u32 },
    /// Refused: the user must leave help mode first.
    InHelpMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HelpEntry {
    Entered,
    AlreadyHelping,
}

/// Result of leaving help mode.
#[derive(Debug, Clone, PartialEq)]
pub enum HelpExit {
    /// Help mode is off and a paused question is waiting again.
    Resumed { question: String },
    Idle,
    NotInHelp,
}

pub struct QuizEngine {
    bank: QuestionBank,
    sessions: SessionMap,
    store: ScoreStore,
    penalty: PenaltyPolicy,
    tolerance: f64,
}

impl QuizEngine {
    pub fn new(
        bank: QuestionBank,
        store: ScoreStore,
        penalty: PenaltyPolicy,
        tolerance: f64,
    ) -> Self {
        QuizEngine {
            bank,
            sessions: SessionMap::new(),
            store,
            penalty,
            tolerance,
        }
    }

    pub fn store(&self) -> &ScoreStore {
        &self.store
    }

    pub fn bank(&self) -> &QuestionBank {
        &self.bank
    }

    /// Poses a fresh question, replacing any unanswered one. The live streak
    /// carries over, so asking again is not a way to reset a bad run.
    pub async fn start_quiz(&self, user_id: &str) -> QuizStart {
        let lane = self.sessions.lane(user_id);
        let mut state = lane.lock().await;
        if state.mode == ConversationMode::HelpMode {
            return QuizStart::InHelpMode;
        }
        let (index, entry) = self.bank.draw(None);
        let streak = state.streak;
        state.session = Some(QuizSession {
            question: entry.prompt.clone(),
            bank_index: index,
            spec: entry.spec.clone(),
            streak_at_posing: streak,
        });
        log::debug!("posed question {index} to {user_id} (streak {streak})");
        QuizStart::Posed {
            question: entry.prompt.clone(),
            streak,
        }
    }

    /// Grades a plain chat message. The user's lane stays locked from read
    /// to state update, so concurrent messages from one user are graded
    /// strictly one after another against the question each one saw.
    pub async fn handle_message(&self, user_id: &str, text: &str, at: DateTime<Utc>) -> Outcome {
        let lane = self.sessions.lane(user_id);
        let mut state = lane.lock().await;
        if state.mode == ConversationMode::HelpMode {
            return Outcome::NotApplicable;
        }
        let Some(session) = state.session.clone() else {
            return Outcome::NotApplicable;
        };

        // Symbolic grading can chew CPU on adversarial input; keep it off
        // the async workers.
        let candidate = text.to_string();
        let spec = session.spec.clone();
        let tolerance = self.tolerance;
        let correct =
            tokio::task::spawn_blocking(move || answer::is_correct(&candidate, &spec, tolerance))
                .await
                .unwrap_or(false);

        if correct {
            let new_streak = session.streak_at_posing + 1;
            let points_earned = 10 + 2 * i64::from(new_streak);
            let recorded = self
                .persist(user_id, points_earned, true, new_streak, &session.question, text, at)
                .await;

            let (index, entry) = self.bank.draw(Some(session.bank_index));
            state.streak = new_streak;
            state.session = Some(QuizSession {
                question: entry.prompt.clone(),
                bank_index: index,
                spec: entry.spec.clone(),
                streak_at_posing: new_streak,
            });
            log::info!(
                "{user_id} answered correctly, streak {new_streak}, +{points_earned} points"
            );
            Outcome::Correct {
                next_question: entry.prompt.clone(),
                points_earned,
                new_streak,
                recorded,
            }
        } else {
            let points_lost = self.penalty.price(session.streak_at_posing);
            let recorded = self
                .persist(user_id, -points_lost, false, 0, &session.question, text, at)
                .await;
            state.streak = 0;
            state.session = None;
            log::info!("{user_id} answered incorrectly, streak reset, -{points_lost} points");
            Outcome::Incorrect {
                correct_answer: session.spec.display().to_string(),
                points_lost,
                recorded,
            }
        }
    }

    // Best effort: a storage failure is logged and reported through the
    // `recorded` flag while the in-memory quiz moves on.
    async fn persist(
        &self,
        user_id: &str,
        points_delta: i64,
        was_correct: bool,
        streak: u32,
        question: &str,
        answer_text: &str,
        at: DateTime<Utc>,
    ) -> bool {
        let mut recorded = true;
        if let Err(error) = self
            .store
            .apply_outcome(user_id, points_delta, was_correct, i64::from(streak), at)
            .await
        {
            log::error!("failed to update leaderboard for {user_id}: {error}");
            recorded = false;
        }
        if let Err(error) = self
            .store
            .append_attempt(user_id, question, answer_text, was_correct, at)
            .await
        {
            log::error!("failed to log attempt for {user_id}: {error}");
            recorded = false;
        }
        recorded
    }

    /// Switches free text over to the tutor. Any active question is kept
    /// aside untouched until help mode ends.
    pub async fn enter_help_mode(&self, user_id: &str) -> HelpEntry {
        let lane = self.sessions.lane(user_id);
        let mut state = lane.lock().await;
        if state.mode == ConversationMode::HelpMode {
            return HelpEntry::AlreadyHelping;
        }
        state.mode = ConversationMode::HelpMode;
        log::debug!("{user_id} entered help mode");
        HelpEntry::Entered
    }

    pub async fn exit_help_mode(&self, user_id: &str) -> HelpExit {
        let lane = self.sessions.lane(user_id);
        let mut state = lane.lock().await;
        if state.mode != ConversationMode::HelpMode {
            return HelpExit::NotInHelp;
        }
        state.mode = ConversationMode::Idle;
        log::debug!("{user_id} left help mode");
        match &state.session {
            Some(session) => HelpExit::Resumed {
                question: session.question.clone(),
            },
            None => HelpExit::Idle,
        }
    }

    pub async fn in_help_mode(&self, user_id: &str) -> bool {
        let lane = self.sessions.lane(user_id);
        let state = lane.lock().await;
        state.mode == ConversationMode::HelpMode
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::ScoreStore;

    fn engine_with(rows: &[(&str, &str)], penalty: PenaltyPolicy) -> QuizEngine {
        let store = ScoreStore::open_in_memory().expect("in-memory store should open");
        QuizEngine::new(
            QuestionBank::from_table(rows),
            store,
            penalty,
            answer::DEFAULT_TOLERANCE,
        )
    }

    // Two questions that both accept "4", so a correct reply works no matter
    // which one the draw picked.
    fn four_bank() -> QuizEngine {
        engine_with(
            &[("What is 2 + 2?", "4"), ("What is 8 / 2?", "4")],
            PenaltyPolicy::default(),
        )
    }

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    #[tokio::test]
    async fn streak_scoring_progression() {
        let engine = four_bank();
        let start = engine.start_quiz("1").await;
        assert!(matches!(start, QuizStart::Posed { streak: 0, .. }));

        let first = engine.handle_message("1", "4", now()).await;
        let Outcome::Correct {
            points_earned,
            new_streak,
            recorded,
            ..
        } = first
        else {
            panic!("expected a correct outcome, got {first:?}");
        };
        assert_eq!((points_earned, new_streak, recorded), (12, 1, true));

        let second = engine.handle_message("1", "4", now()).await;
        let Outcome::Correct {
            points_earned,
            new_streak,
            ..
        } = second
        else {
            panic!("expected a correct outcome, got {second:?}");
        };
        assert_eq!((points_earned, new_streak), (14, 2));

        let third = engine.handle_message("1", "nope", now()).await;
        let Outcome::Incorrect {
            points_lost,
            recorded,
            ..
        } = third
        else {
            panic!("expected an incorrect outcome, got {third:?}");
        };
        assert_eq!((points_lost, recorded), (5, true));

        let record = engine
            .store()
            .record("1")
            .await
            .expect("read")
            .expect("record exists");
        assert_eq!(record.points, 21);
        assert_eq!(record.highest_streak, 2);
        assert_eq!(record.total_correct, 2);
        assert_eq!(engine.store().attempt_count("1").await.expect("count"), 3);

        // session is gone until the next /quest
        let after = engine.handle_message("1", "4", now()).await;
        assert_eq!(after, Outcome::NotApplicable);
    }

    #[tokio::test]
    async fn wrong_answer_reveals_the_accepted_text() {
        let engine = engine_with(&[("Solve for x: 3x + 5 = 20", "5 or x=5")], PenaltyPolicy::default());
        engine.start_quiz("1").await;
        let outcome = engine.handle_message("1", "7", now()).await;
        let Outcome::Incorrect { correct_answer, .. } = outcome else {
            panic!("expected an incorrect outcome, got {outcome:?}");
        };
        assert_eq!(correct_answer, "5 or x=5");
    }

    #[tokio::test]
    async fn restarting_keeps_the_live_streak() {
        let engine = four_bank();
        engine.start_quiz("1").await;
        engine.handle_message("1", "4", now()).await;
        // a fresh /quest must not reset the run
        let start = engine.start_quiz("1").await;
        assert!(matches!(start, QuizStart::Posed { streak: 1, .. }));
        let outcome = engine.handle_message("1", "4", now()).await;
        assert!(matches!(
            outcome,
            Outcome::Correct {
                new_streak: 2,
                points_earned: 14,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn messages_without_a_question_are_ignored() {
        let engine = four_bank();
        assert_eq!(engine.handle_message("1", "4", now()).await, Outcome::NotApplicable);
        assert!(engine.store().record("1").await.expect("read").is_none());
    }

    #[tokio::test]
    async fn help_mode_shields_the_session() {
        let engine = four_bank();
        let started = engine.start_quiz("1").await;
        let QuizStart::Posed { question, .. } = started else {
            panic!("expected a posed question");
        };

        assert_eq!(engine.enter_help_mode("1").await, HelpEntry::Entered);
        assert_eq!(engine.enter_help_mode("1").await, HelpEntry::AlreadyHelping);
        assert!(engine.in_help_mode("1").await);

        // the correct answer is not graded while helping
        assert_eq!(engine.handle_message("1", "4", now()).await, Outcome::NotApplicable);
        assert!(engine.store().record("1").await.expect("read").is_none());

        // and /quest is refused
        assert_eq!(engine.start_quiz("1").await, QuizStart::InHelpMode);

        let exit = engine.exit_help_mode("1").await;
        assert_eq!(exit, HelpExit::Resumed { question });
        assert_eq!(engine.exit_help_mode("1").await, HelpExit::NotInHelp);

        // the kept question still grades, streak intact
        assert!(matches!(
            engine.handle_message("1", "4", now()).await,
            Outcome::Correct { new_streak: 1, .. }
        ));
    }

    #[tokio::test]
    async fn help_mode_without_a_session_exits_to_idle() {
        let engine = four_bank();
        engine.enter_help_mode("1").await;
        assert_eq!(engine.exit_help_mode("1").await, HelpExit::Idle);
    }

    #[tokio::test]
    async fn users_are_isolated() {
        let engine = four_bank();
        engine.start_quiz("1").await;
        engine.start_quiz("2").await;
        engine.handle_message("1", "4", now()).await;
        engine.handle_message("2", "wrong", now()).await;
        let one = engine.store().record("1").await.expect("read").expect("exists");
        let two = engine.store().record("2").await.expect("read").expect("exists");
        assert_eq!(one.points, 12);
        assert_eq!(two.points, 0);
        // user 2 lost their session, user 1 kept theirs
        assert!(matches!(
            engine.handle_message("1", "4", now()).await,
            Outcome::Correct { .. }
        ));
        assert_eq!(engine.handle_message("2", "4", now()).await, Outcome::NotApplicable);
    }

    #[tokio::test]
    async fn concurrent_answers_grade_in_sequence() {
        let engine = std::sync::Arc::new(four_bank());
        engine.start_quiz("1").await;
        let a = {
            let engine = std::sync::Arc::clone(&engine);
            tokio::spawn(async move { engine.handle_message("1", "4", now()).await })
        };
        let b = {
            let engine = std::sync::Arc::clone(&engine);
            tokio::spawn(async move { engine.handle_message("1", "4", now()).await })
        };
        let (a, b) = (a.await.expect("task"), b.await.expect("task"));

        // both graded correct, in some order, against consecutive streaks
        let mut streaks: Vec<u32> = [&a, &b]
            .iter()
            .map(|outcome| match outcome {
                Outcome::Correct { new_streak, .. } => *new_streak,
                other => panic!("expected a correct outcome, got {other:?}"),
            })
            .collect();
        streaks.sort_unstable();
        assert_eq!(streaks, vec![1, 2]);

        let record = engine
            .store()
            .record("1")
            .await
            .expect("read")
            .expect("exists");
        assert_eq!(record.points, 26);
        assert_eq!(record.highest_streak, 2);
    }

    #[tokio::test]
    async fn scaled_penalty_prices_by_streak() {
        let engine = engine_with(
            &[("What is 2 + 2?", "4"), ("What is 8 / 2?", "4")],
            PenaltyPolicy::Scaled { base: 5, per_streak: 1 },
        );
        engine.start_quiz("1").await;
        engine.handle_message("1", "4", now()).await;
        engine.handle_message("1", "4", now()).await;
        let outcome = engine.handle_message("1", "wrong", now()).await;
        assert!(matches!(outcome, Outcome::Incorrect { points_lost: 7, .. }));
        let record = engine.store().record("1").await.expect("read").expect("exists");
        assert_eq!(record.points, 19);
    }

    #[tokio::test]
    async fn storage_failure_degrades_but_does_not_stall() {
        let engine = four_bank();
        engine.start_quiz("1").await;
        engine.store().break_storage().await;

        let outcome = engine.handle_message("1", "4", now()).await;
        assert!(matches!(
            outcome,
            Outcome::Correct { recorded: false, new_streak: 1, .. }
        ));
        // the quiz keeps going in memory
        assert!(matches!(
            engine.handle_message("1", "4", now()).await,
            Outcome::Correct { recorded: false, new_streak: 2, .. }
        ));
    }
}
