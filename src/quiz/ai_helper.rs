use chatgpt::client::ChatGPT;
use chatgpt::config::ChatGPTEngine;
use chatgpt::types::CompletionResponse;

/// Step-by-step explanations for arbitrary problems, answered by ChatGPT.
/// Built without a key it stays disabled and every request says so.
pub struct MathSolver {
    chat_gpt: Option<ChatGPT>,
}

#[derive(Debug, thiserror::Error)]
pub enum SolverError {
    #[error("the AI tutor is not configured")]
    Disabled,
    #[error("tutor request failed: {0}")]
    Api(#[from] chatgpt::err::Error),
}

impl MathSolver {
    pub fn new(api_key: Option<&str>) -> Self {
        let chat_gpt = api_key.and_then(|key| match ChatGPT::new(key) {
            Ok(mut gpt) => {
                gpt.config.engine = ChatGPTEngine::Gpt35Turbo;
                gpt.config.timeout = std::time::Duration::from_secs(15);
                Some(gpt)
            }
            Err(error) => {
                log::error!("could not build the ChatGPT client: {error}");
                None
            }
        });
        Self { chat_gpt }
    }

    pub fn is_enabled(&self) -> bool {
        self.chat_gpt.is_some()
    }

    pub async fn explain(&self, problem: &str) -> Result<String, SolverError> {
        let Some(chat_gpt) = &self.chat_gpt else {
            return Err(SolverError::Disabled);
        };
        log::debug!("solving problem: {problem:.50}");

        let prompt = format!(
            "You are a friendly and precise math tutor bot. \
            Explain solutions clearly, showing step-by-step working. \
            For equations, show the solving process. \
            For word problems, explain the setup and reasoning. \
            Keep explanations concise but thorough, in plain text without markdown.\n\n\
            Solve and explain this math problem: {problem}"
        );

        let response: CompletionResponse = chat_gpt.send_message(&prompt).await?;
        let content = response.message().clone().content;

        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn without_a_key_the_solver_is_disabled() {
        let solver = MathSolver::new(None);
        assert!(!solver.is_enabled());
        assert!(matches!(
            solver.explain("2 + 2").await,
            Err(SolverError::Disabled)
        ));
    }
}
