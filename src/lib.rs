//! A Telegram math-quiz bot: streak challenges with symbolic answer
//! checking, a persistent leaderboard, and an optional AI tutor mode.

pub mod algebra;
pub mod bot;
pub mod config;
pub mod quiz;
pub mod storage;
