use std::sync::Arc;

use dotenv::dotenv;
use teloxide::prelude::*;

use mathbot::config::Config;
use mathbot::quiz::ai_helper::MathSolver;
use mathbot::quiz::{QuestionBank, QuizEngine};
use mathbot::storage::ScoreStore;

#[tokio::main]
async fn main() {
    dotenv().ok();
    pretty_env_logger::init();
    log::info!("Starting the math quiz bot...");

    let config = Config::from_env();
    let bot = Bot::from_env();

    let store = ScoreStore::open(&config.db_path).expect("Failed to open the score database");
    let bank = QuestionBank::builtin();
    log::info!("Question bank loaded with {} questions", bank.len());

    if config.chatgpt_api_key.is_none() {
        log::warn!("CHATGPT_API_KEY is not set; the /solve tutor is disabled");
    }
    let solver = Arc::new(MathSolver::new(config.chatgpt_api_key.as_deref()));
    let engine = Arc::new(QuizEngine::new(
        bank,
        store,
        config.penalty,
        config.tolerance,
    ));

    Dispatcher::builder(bot, mathbot::bot::schema())
        .dependencies(dptree::deps![engine, solver])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
}
