//! Agent runtime: answers natural-language questions about the team's work.
//!
//! A run seeds a conversation with a rendered system prompt, then loops:
//! request a completion, extract the action tags from it, execute them
//! against the issue tracker or the SQL store, and feed the outcome back as
//! the next user message. A `result` (or `answer`) tag ends the run; the
//! iteration cap ends it without an answer.
//!
//! # Key Types
//!
//! - `AgentRuntime` - the loop (see `runtime`)
//! - `ActionDispatcher` - executes one turn's actions (see `dispatcher`)
//! - `LlmClient` - pluggable completion backend for OpenAI/Anthropic/Ollama
//! - `PromptRenderer` - system prompt templates

pub mod action;
pub mod conversation;
pub mod dispatcher;
pub mod llm;
pub mod prompt;
pub mod runtime;
pub mod tags;

pub use action::Action;
pub use conversation::Conversation;
pub use dispatcher::{ActionDispatcher, Dispatch};
pub use llm::{client_from_config, AnthropicClient, ChatCompletionsClient, LlmClient};
pub use prompt::{schema_vars, PromptError, PromptRenderer, TeraPrompts};
pub use runtime::{AgentError, AgentRuntime, RunOutcome, RunSettings};
pub use tags::{first_tag, parse_tags, Tag};
