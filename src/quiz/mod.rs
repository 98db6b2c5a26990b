//! The quiz subsystem: question bank, answer grading, per-user sessions, and
//! the engine that ties them to score storage.

pub mod ai_helper;
pub mod answer;
pub mod bank;
pub mod engine;
pub mod session;

pub use answer::{is_correct, AnswerSpec};
pub use bank::QuestionBank;
pub use engine::{Outcome, PenaltyPolicy, QuizEngine, QuizStart};
