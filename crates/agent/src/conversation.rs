use ema_core::{Message, Role};

/// Append-only transcript of one run.
///
/// Starts with exactly one system message. The only mutators append an
/// assistant turn or a user feedback turn; nothing is ever removed or
/// edited, and the whole history is replayed to the model on every call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self { messages: vec![Message::system(system_prompt)] }
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.messages.push(Message::assistant(content));
    }

    pub fn push_feedback(&mut self, content: impl Into<String>) {
        self.messages.push(Message::user(content));
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn assistant_turns(&self) -> usize {
        self.messages.iter().filter(|message| message.role() == Role::Assistant).count()
    }
}
