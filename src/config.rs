//! Runtime configuration, read from the environment (a `.env` file is
//! loaded first by `main`). The Telegram token itself stays with
//! `Bot::from_env` and is not duplicated here.

use std::env;
use std::path::PathBuf;

use crate::quiz::engine::PenaltyPolicy;
use crate::quiz::answer::DEFAULT_TOLERANCE;

#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite file for scores, history and corrections.
    pub db_path: PathBuf,
    /// Missing key disables /solve and help-mode replies.
    pub chatgpt_api_key: Option<String>,
    pub penalty: PenaltyPolicy,
    pub tolerance: f64,
}

impl Config {
    pub fn from_env() -> Self {
        Config {
            db_path: env::var("MATHBOT_DB")
                .unwrap_or_else(|_| "mathbot.db".to_string())
                .into(),
            chatgpt_api_key: env::var("CHATGPT_API_KEY").ok().filter(|key| !key.is_empty()),
            penalty: penalty_from(env::var("MATHBOT_PENALTY").ok().as_deref()),
            tolerance: tolerance_from(env::var("MATHBOT_TOLERANCE").ok().as_deref()),
        }
    }
}

// Accepted forms: "fixed", "fixed:7", "scaled", "scaled:5,2".
fn penalty_from(value: Option<&str>) -> PenaltyPolicy {
    let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return PenaltyPolicy::default();
    };
    let (kind, args) = match value.split_once(':') {
        Some((kind, args)) => (kind.trim(), Some(args.trim())),
        None => (value, None),
    };
    match kind {
        "fixed" => {
            let points = args.and_then(|a| a.parse().ok()).unwrap_or(5);
            PenaltyPolicy::Fixed(points)
        }
        "scaled" => {
            let (base, per_streak) = args
                .and_then(|a| a.split_once(','))
                .and_then(|(base, per)| Some((base.trim().parse().ok()?, per.trim().parse().ok()?)))
                .unwrap_or((5, 1));
            PenaltyPolicy::Scaled { base, per_streak }
        }
        other => {
            log::warn!("unknown MATHBOT_PENALTY '{other}', using the default");
            PenaltyPolicy::default()
        }
    }
}

fn tolerance_from(value: Option<&str>) -> f64 {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(text) => match text.parse::<f64>() {
            Ok(parsed) if parsed > 0.0 && parsed.is_finite() => parsed,
            _ => {
                log::warn!("invalid MATHBOT_TOLERANCE '{text}', using {DEFAULT_TOLERANCE}");
                DEFAULT_TOLERANCE
            }
        },
        None => DEFAULT_TOLERANCE,
    }
}
