//! Per-user conversation state and the lane map that serializes access to it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use super::answer::AnswerSpec;

/// A posed question waiting for an answer.
#[derive(Debug, Clone)]
pub struct QuizSession {
    pub question: String,
    /// Index into the bank, excluded on the follow-up draw.
    pub bank_index: usize,
    pub spec: AnswerSpec,
    /// The streak the user had when this question was posed; a correct
    /// answer scores against `streak_at_posing + 1`.
    pub streak_at_posing: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConversationMode {
    #[default]
    Idle,
    /// Free text goes to the tutor, and quiz answers are not graded.
    HelpMode,
}

#[derive(Debug, Default)]
pub struct UserState {
    pub mode: ConversationMode,
    pub streak: u32,
    pub session: Option<QuizSession>,
}

/// One async mutex per user. Holding the lane while grading makes each
/// message read-modify-write atomic, so two answers from the same user can
/// never score against the same question.
#[derive(Default)]
pub struct SessionMap {
    lanes: Mutex<HashMap<String, Arc<tokio::sync::Mutex<UserState>>>>,
}

impl SessionMap {
    pub fn new() -> Self {
        SessionMap::default()
    }

    pub fn lane(&self, user_id: &str) -> Arc<tokio::sync::Mutex<UserState>> {
        let mut lanes = self.lanes.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            lanes
                .entry(user_id.to_string())
                .or_insert_with(Default::default),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lanes_are_stable_per_user() {
        let map = SessionMap::new();
        let a = map.lane("1");
        let b = map.lane("1");
        let c = map.lane("2");
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
    }

    #[test]
    fn fresh_state_is_idle() {
        let map = SessionMap::new();
        let lane = map.lane("7");
        let state = lane.blocking_lock();
        assert_eq!(state.mode, ConversationMode::Idle);
        assert_eq!(state.streak, 0);
        assert!(state.session.is_none());
    }
}
