//! Telegram front end: command definitions, the dptree handler schema, and
//! the free-text router that feeds quiz answers and help-mode questions to
//! the engine.

use std::sync::Arc;

use chrono::Utc;
use teloxide::dispatching::UpdateHandler;
use teloxide::prelude::*;
use teloxide::types::ChatAction;
use teloxide::utils::command::BotCommands;

use crate::algebra::{self, Polynomial};
use crate::quiz::ai_helper::{MathSolver, SolverError};
use crate::quiz::answer::normalize;
use crate::quiz::engine::{HelpEntry, HelpExit, Outcome, QuizEngine, QuizStart};
use crate::storage::ScoreRecord;

pub type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Phrases that switch a chat into math help mode.
const HELP_TRIGGERS: [&str; 8] = [
    "help with math",
    "math question",
    "solve this",
    "how to calculate",
    "math help",
    "solve for",
    "how do i solve",
    "calculate",
];

/// Phrases that leave math help mode again.
const CANCEL_PHRASES: [&str; 4] = ["cancel", "stop", "done", "exit"];

const SOLVE_INPUT_LIMIT: usize = 1500;
const DEFAULT_LEADERBOARD_SIZE: u32 = 10;
const MAX_LEADERBOARD_SIZE: u32 = 25;

#[derive(BotCommands, Clone)]
#[command(
    rename_rule = "lowercase",
    description = "These commands are supported:"
)]
pub enum Command {
    #[command(description = "show this help text.")]
    Help,
    #[command(description = "start a math question streak challenge.")]
    Quest,
    #[command(description = "solve a math problem with the AI tutor.")]
    Solve(String),
    #[command(description = "simplify an expression.")]
    Simplify(String),
    #[command(description = "expand a polynomial expression.")]
    Expand(String),
    #[command(description = "differentiate an expression.")]
    Derive(String),
    #[command(description = "show the math leaderboard, optionally top N.")]
    Leaders(String),
    #[command(description = "show your quest statistics.")]
    Stats,
    #[command(description = "look up a saved correction.")]
    Lookup(String),
    #[command(description = "teach a correction: /learn wrong term; correct term.")]
    Learn(String),
    #[command(description = "list recently added corrections.")]
    Corrections,
    #[command(description = "leave math help mode.")]
    Cancel,
}

pub fn schema() -> UpdateHandler<Box<dyn std::error::Error + Send + Sync + 'static>> {
    Update::filter_message()
        .branch(
            dptree::entry()
                .filter_command::<Command>()
                .endpoint(handle_command),
        )
        .branch(dptree::endpoint(handle_free_text))
}

async fn handle_command(
    bot: Bot,
    msg: Message,
    cmd: Command,
    engine: Arc<QuizEngine>,
    solver: Arc<MathSolver>,
) -> HandlerResult {
    let Some(user) = msg.from() else {
        return Ok(());
    };
    let user_id = user.id.to_string();

    match cmd {
        Command::Help => {
            bot.send_message(msg.chat.id, Command::descriptions().to_string())
                .await?;
        }
        Command::Quest => {
            let reply = match engine.start_quiz(&user_id).await {
                QuizStart::Posed { question, streak } => format!(
                    "🧮 Math Challenge (Streak: {streak})\n\n{question}\n\nType your answer in chat!"
                ),
                QuizStart::InHelpMode => {
                    "⚠️ Please finish your current math help session (type cancel) \
                     before starting a new quest."
                        .to_string()
                }
            };
            bot.send_message(msg.chat.id, reply).await?;
        }
        Command::Solve(problem) => {
            let problem = problem.trim().to_string();
            if problem.is_empty() {
                bot.send_message(msg.chat.id, "Usage: /solve <problem>").await?;
                return Ok(());
            }
            if problem.len() > SOLVE_INPUT_LIMIT {
                bot.send_message(
                    msg.chat.id,
                    "❌ Your problem description is too long. Please keep it under 1500 characters.",
                )
                .await?;
                return Ok(());
            }
            bot.send_chat_action(msg.chat.id, ChatAction::Typing).await?;
            let reply = tutor_reply(solver.explain(&problem).await);
            bot.send_message(msg.chat.id, reply).await?;
        }
        Command::Simplify(input) => {
            bot.send_message(msg.chat.id, simplify_reply(&input)).await?;
        }
        Command::Expand(input) => {
            bot.send_message(msg.chat.id, expand_reply(&input)).await?;
        }
        Command::Derive(input) => {
            bot.send_message(msg.chat.id, derive_reply(&input)).await?;
        }
        Command::Leaders(limit) => {
            let limit = leaderboard_limit(&limit);
            let reply = match engine.store().top_records(limit).await {
                Ok(rows) => leaderboard_reply(&rows),
                Err(error) => {
                    log::error!("could not read the leaderboard: {error}");
                    "❌ Couldn't retrieve the leaderboard right now.".to_string()
                }
            };
            bot.send_message(msg.chat.id, reply).await?;
        }
        Command::Stats => {
            let record = engine.store().record(&user_id).await;
            let attempted = engine.store().attempt_count(&user_id).await;
            let reply = match (record, attempted) {
                (Ok(Some(record)), Ok(attempted)) => stats_reply(&record, attempted),
                (Ok(None), _) => {
                    "You haven't answered any math questions yet!\nUse /quest to get started."
                        .to_string()
                }
                (Err(error), _) | (_, Err(error)) => {
                    log::error!("could not read stats for {user_id}: {error}");
                    "❌ Couldn't retrieve your stats right now.".to_string()
                }
            };
            bot.send_message(msg.chat.id, reply).await?;
        }
        Command::Lookup(term) => {
            let term = term.trim().to_string();
            if term.is_empty() {
                bot.send_message(msg.chat.id, "Usage: /lookup <term>").await?;
                return Ok(());
            }
            let reply = match engine.store().lookup_correction(&term).await {
                Ok(Some(correct)) => {
                    format!("🔄 Correction found\nTerm: {term}\nCorrection: {correct}")
                }
                Ok(None) => format!(
                    "❓ No known correction for: {term}\nUse /learn {term}; <correction> to add one."
                ),
                Err(error) => {
                    log::error!("could not look up '{term}': {error}");
                    "❌ Couldn't retrieve that correction right now.".to_string()
                }
            };
            bot.send_message(msg.chat.id, reply).await?;
        }
        Command::Learn(input) => {
            let Some((wrong, correct)) = parse_learn_input(&input) else {
                bot.send_message(
                    msg.chat.id,
                    "Usage: /learn <wrong term>; <correct term>",
                )
                .await?;
                return Ok(());
            };
            if wrong.len() > 200 || correct.len() > 500 {
                bot.send_message(
                    msg.chat.id,
                    "Correction terms are too long (max 200 for the wrong term, 500 for the correction).",
                )
                .await?;
                return Ok(());
            }
            let reply = match engine
                .store()
                .learn_correction(&wrong, &correct, &user_id)
                .await
            {
                Ok(true) => format!(
                    "📚 Learned a new correction\nIncorrect: {wrong}\nCorrect: {correct}"
                ),
                Ok(false) => format!(
                    "⚠️ A correction for '{wrong}' already exists (case-insensitive)."
                ),
                Err(error) => {
                    log::error!("could not save correction '{wrong}': {error}");
                    "❌ Couldn't save that correction right now.".to_string()
                }
            };
            bot.send_message(msg.chat.id, reply).await?;
        }
        Command::Corrections => {
            let reply = match engine.store().recent_corrections(15).await {
                Ok(rows) if rows.is_empty() => {
                    "No corrections saved yet. Use /learn to add one.".to_string()
                }
                Ok(rows) => {
                    let mut text = String::from("📚 Recent corrections:\n");
                    for correction in rows {
                        text.push_str(&format!(
                            "• {} → {}\n",
                            correction.wrong, correction.correct
                        ));
                    }
                    text
                }
                Err(error) => {
                    log::error!("could not list corrections: {error}");
                    "❌ Couldn't retrieve corrections right now.".to_string()
                }
            };
            bot.send_message(msg.chat.id, reply).await?;
        }
        Command::Cancel => {
            let reply = exit_reply(engine.exit_help_mode(&user_id).await);
            bot.send_message(msg.chat.id, reply).await?;
        }
    }
    Ok(())
}

async fn handle_free_text(
    bot: Bot,
    msg: Message,
    engine: Arc<QuizEngine>,
    solver: Arc<MathSolver>,
) -> HandlerResult {
    let Some(text) = msg.text() else {
        return Ok(());
    };
    let Some(user) = msg.from() else {
        return Ok(());
    };
    let user_id = user.id.to_string();
    let trimmed = text.trim();
    let lowered = trimmed.to_lowercase();

    if engine.in_help_mode(&user_id).await {
        if CANCEL_PHRASES.contains(&lowered.as_str()) {
            let reply = exit_reply(engine.exit_help_mode(&user_id).await);
            bot.send_message(msg.chat.id, reply).await?;
            return Ok(());
        }
        bot.send_chat_action(msg.chat.id, ChatAction::Typing).await?;
        let reply = tutor_reply(solver.explain(trimmed).await);
        bot.send_message(msg.chat.id, reply).await?;
        return Ok(());
    }

    if HELP_TRIGGERS.iter().any(|trigger| lowered.contains(trigger)) {
        let reply = match engine.enter_help_mode(&user_id).await {
            HelpEntry::Entered => {
                "🧮 Math Help Activated\nSend me your math problems and I'll explain them.\n\
                 Type cancel or stop when you're finished."
            }
            HelpEntry::AlreadyHelping => {
                "You're already in math help mode! Just send your problems or type cancel."
            }
        };
        bot.send_message(msg.chat.id, reply).await?;
        return Ok(());
    }

    match engine.handle_message(&user_id, trimmed, Utc::now()).await {
        Outcome::NotApplicable => {
            log::debug!("ignoring chatter from {user_id}");
        }
        Outcome::Correct {
            next_question,
            points_earned,
            new_streak,
            recorded,
        } => {
            let mut reply = format!(
                "✅ Correct! Streak: {new_streak}\nYou earned {points_earned} points!\n\n\
                 Next question:\n{next_question}"
            );
            if !recorded {
                reply.push_str("\n\n⚠️ Your score could not be saved this time.");
            }
            bot.send_message(msg.chat.id, reply).await?;
        }
        Outcome::Incorrect {
            correct_answer,
            points_lost,
            recorded,
        } => {
            let mut reply = format!(
                "❌ Incorrect! Streak ended.\nThe correct answer was: {correct_answer}\n\
                 You lost {points_lost} points."
            );
            if !recorded {
                reply.push_str("\n⚠️ Your score could not be saved this time.");
            }
            reply.push_str("\nType /quest to start a new challenge.");
            bot.send_message(msg.chat.id, reply).await?;
        }
    }
    Ok(())
}

fn tutor_reply(result: Result<String, SolverError>) -> String {
    match result {
        Ok(answer) => answer,
        Err(SolverError::Disabled) => {
            "❌ The AI tutor is not configured. This command is unavailable.".to_string()
        }
        Err(error) => {
            log::error!("tutor request failed: {error}");
            "Sorry, something went wrong while solving that. Please try again later.".to_string()
        }
    }
}

fn exit_reply(exit: HelpExit) -> String {
    match exit {
        HelpExit::Resumed { question } => format!(
            "✅ Math help deactivated. Your quest question is still waiting:\n{question}"
        ),
        HelpExit::Idle => "✅ Math help deactivated. You can use other commands now.".to_string(),
        HelpExit::NotInHelp => "You're not in math help mode.".to_string(),
    }
}

fn leaderboard_limit(argument: &str) -> u32 {
    match argument.trim() {
        "" => DEFAULT_LEADERBOARD_SIZE,
        text => text
            .parse::<u32>()
            .map(|n| n.clamp(1, MAX_LEADERBOARD_SIZE))
            .unwrap_or(DEFAULT_LEADERBOARD_SIZE),
    }
}

// "/learn wrong; correct", split on the first semicolon so multi-word terms
// stay intact.
fn parse_learn_input(input: &str) -> Option<(String, String)> {
    let (wrong, correct) = input.split_once(';')?;
    let wrong = wrong.trim();
    let correct = correct.trim();
    if wrong.is_empty() || correct.is_empty() {
        return None;
    }
    Some((wrong.to_string(), correct.to_string()))
}

fn simplify_reply(input: &str) -> String {
    algebra_reply(input, "✨ Simplified", "Usage: /simplify <expression>", |expr| {
        Some(match Polynomial::from_expr(expr) {
            Some(poly) => poly.to_string(),
            None => expr.to_string(),
        })
    })
}

fn expand_reply(input: &str) -> String {
    algebra_reply(input, "📐 Expanded", "Usage: /expand <expression>", |expr| {
        Polynomial::from_expr(expr).map(|poly| poly.to_string())
    })
}

fn derive_reply(input: &str) -> String {
    let normalized = normalize(input);
    if normalized.is_empty() {
        return "Usage: /derive <expression>".to_string();
    }
    match algebra::parse(&normalized) {
        Ok(expr) => {
            let variables = expr.variables();
            let var = if variables.contains("x") || variables.is_empty() {
                "x".to_string()
            } else if variables.len() == 1 {
                variables.into_iter().next().unwrap_or_else(|| "x".to_string())
            } else {
                "x".to_string()
            };
            let derivative = expr.diff(&var);
            let rendered = match Polynomial::from_expr(&derivative) {
                Some(poly) => poly.to_string(),
                None => derivative.to_string(),
            };
            format!("📈 d/d{var}: {rendered}")
        }
        Err(error) => format!("❌ Couldn't read that expression: {error}"),
    }
}

fn algebra_reply(
    input: &str,
    title: &str,
    usage: &str,
    render: impl Fn(&algebra::Expr) -> Option<String>,
) -> String {
    let normalized = normalize(input);
    if normalized.is_empty() {
        return usage.to_string();
    }
    match algebra::parse(&normalized) {
        Ok(expr) => match render(&expr) {
            Some(rendered) => format!("{title}: {rendered}"),
            None => "Only polynomial expressions can be expanded here.".to_string(),
        },
        Err(error) => format!("❌ Couldn't read that expression: {error}"),
    }
}

fn leaderboard_reply(rows: &[ScoreRecord]) -> String {
    if rows.is_empty() {
        return "🏆 Math Leaderboard\nNo scores yet! Be the first with /quest".to_string();
    }
    let mut text = format!("🏆 Math Leaderboard (Top {})\n", rows.len());
    for (index, record) in rows.iter().enumerate() {
        text.push_str(&format!(
            "#{} User {} - {} pts (Best Streak: {})\n",
            index + 1,
            record.user_id,
            record.points,
            record.highest_streak
        ));
    }
    text.trim_end().to_string()
}

fn stats_reply(record: &ScoreRecord, attempted: i64) -> String {
    let accuracy = if attempted > 0 {
        record.total_correct as f64 / attempted as f64 * 100.0
    } else {
        0.0
    };
    let last_active = record
        .last_active
        .map(|at| at.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| "Never".to_string());
    format!(
        "📊 Your Math Stats\n\
         🏅 Points: {}\n\
         🔥 Best Streak: {}\n\
         ✅ Correct Answers: {}\n\
         📝 Total Attempted: {attempted}\n\
         🎯 Accuracy: {accuracy:.1}%\n\
         ⏱ Last Active: {last_active}",
        record.points, record.highest_streak, record.total_correct
    )
}
