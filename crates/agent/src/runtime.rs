use std::sync::Arc;
use std::time::Duration;

use ema_core::config::AgentConfig;
use serde_json::{Map, Value};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::action::parse_actions;
use crate::conversation::Conversation;
use crate::dispatcher::{ActionDispatcher, Dispatch};
use crate::llm::LlmClient;
use crate::prompt::{PromptError, PromptRenderer, ANSWER_TEMPLATE};

pub const DEFAULT_MAX_ITERATIONS: u32 = 10;
pub const DEFAULT_PACING: Duration = Duration::from_secs(10);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RunSettings {
    pub max_iterations: u32,
    /// Pause before every completion request after the first.
    pub pacing: Duration,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self { max_iterations: DEFAULT_MAX_ITERATIONS, pacing: DEFAULT_PACING }
    }
}

impl From<&AgentConfig> for RunSettings {
    fn from(config: &AgentConfig) -> Self {
        Self {
            max_iterations: config.max_iterations,
            pacing: Duration::from_secs(config.pacing_secs),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RunOutcome {
    Answered { answer: String, iterations: u32 },
    /// The iteration cap was reached without a terminal tag.
    Exhausted { iterations: u32 },
}

impl RunOutcome {
    pub fn answer(&self) -> Option<&str> {
        match self {
            Self::Answered { answer, .. } => Some(answer),
            Self::Exhausted { .. } => None,
        }
    }

    pub fn iterations(&self) -> u32 {
        match self {
            Self::Answered { iterations, .. } | Self::Exhausted { iterations } => *iterations,
        }
    }

    pub fn is_answered(&self) -> bool {
        matches!(self, Self::Answered { .. })
    }

    /// The answer text, or an empty string when the run was exhausted.
    pub fn into_text(self) -> String {
        match self {
            Self::Answered { answer, .. } => answer,
            Self::Exhausted { .. } => String::new(),
        }
    }
}

#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Prompt(#[from] PromptError),
    #[error("completion request failed: {0:#}")]
    Completion(anyhow::Error),
    #[error("run cancelled at iteration {iteration}")]
    Cancelled { iteration: u32 },
}

impl AgentError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Prompt(_) => "I could not prepare your question for the assistant.",
            Self::Completion(_) => {
                "The language model is unavailable right now. Please try again later."
            }
            Self::Cancelled { .. } => "The request was cancelled before an answer was found.",
        }
    }
}

/// Drives the think/act loop for one question at a time.
///
/// Each call to [`AgentRuntime::answer`] owns its own conversation; the
/// runtime itself only holds shared collaborators and may serve concurrent
/// runs.
pub struct AgentRuntime {
    llm: Arc<dyn LlmClient>,
    renderer: Arc<dyn PromptRenderer>,
    dispatcher: ActionDispatcher,
    settings: RunSettings,
    prompt_vars: Map<String, Value>,
}

impl AgentRuntime {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        renderer: Arc<dyn PromptRenderer>,
        dispatcher: ActionDispatcher,
        settings: RunSettings,
    ) -> Self {
        Self { llm, renderer, dispatcher, settings, prompt_vars: Map::new() }
    }

    /// Template variables shared by every run, such as schema text.
    pub fn with_prompt_vars(mut self, vars: Map<String, Value>) -> Self {
        self.prompt_vars.extend(vars);
        self
    }

    pub fn settings(&self) -> RunSettings {
        self.settings
    }

    pub async fn answer(
        &self,
        question: &str,
        user: &str,
        context_vars: Map<String, Value>,
    ) -> Result<RunOutcome, AgentError> {
        self.answer_with_cancel(question, user, context_vars, &CancellationToken::new()).await
    }

    pub async fn answer_with_cancel(
        &self,
        question: &str,
        user: &str,
        context_vars: Map<String, Value>,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, AgentError> {
        let run_id = Uuid::new_v4();
        let span = info_span!("agent_run", %run_id, user = %user);
        self.run(question, user, context_vars, cancel).instrument(span).await
    }

    async fn run(
        &self,
        question: &str,
        user: &str,
        context_vars: Map<String, Value>,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, AgentError> {
        let system_prompt = self.system_prompt(question, user, context_vars)?;
        let mut conversation = Conversation::new(system_prompt);
        info!(
            event_name = "agent.run.started",
            max_iterations = self.settings.max_iterations,
            "agent run started"
        );

        let mut iteration: u32 = 0;
        loop {
            iteration += 1;
            if iteration > self.settings.max_iterations {
                warn!(
                    event_name = "agent.run.exhausted",
                    iterations = self.settings.max_iterations,
                    "too many iterations, no answer produced"
                );
                return Ok(RunOutcome::Exhausted { iterations: self.settings.max_iterations });
            }
            if iteration > 1 {
                self.pace(iteration, cancel).await?;
            }

            debug!(
                event_name = "agent.run.iteration",
                iteration,
                messages = conversation.len(),
                "requesting completion"
            );
            let completion = tokio::select! {
                biased;

                () = cancel.cancelled() => {
                    info!(
                        event_name = "agent.run.cancelled",
                        iteration,
                        "completion request cancelled"
                    );
                    return Err(AgentError::Cancelled { iteration });
                }
                result = self.llm.complete(conversation.messages()) => {
                    result.map_err(AgentError::Completion)?
                }
            };

            let actions = parse_actions(&completion);
            conversation.push_assistant(completion);

            match self.dispatcher.dispatch(&actions).await {
                Dispatch::Terminal(answer) => {
                    info!(event_name = "agent.run.answered", iteration, "agent produced an answer");
                    return Ok(RunOutcome::Answered { answer, iterations: iteration });
                }
                Dispatch::Feedback(feedback) => conversation.push_feedback(feedback),
            }
        }
    }

    fn system_prompt(
        &self,
        question: &str,
        user: &str,
        context_vars: Map<String, Value>,
    ) -> Result<String, PromptError> {
        let mut vars = self.prompt_vars.clone();
        vars.extend(context_vars);
        vars.insert("question".to_string(), Value::String(question.to_string()));
        vars.insert("user".to_string(), Value::String(user.to_string()));
        self.renderer.render(ANSWER_TEMPLATE, &vars)
    }

    async fn pace(&self, iteration: u32, cancel: &CancellationToken) -> Result<(), AgentError> {
        if self.settings.pacing.is_zero() {
            return Ok(());
        }

        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                info!(event_name = "agent.run.cancelled", iteration, "run cancelled while pacing");
                Err(AgentError::Cancelled { iteration })
            }
            () = tokio::time::sleep(self.settings.pacing) => Ok(()),
        }
    }
}
