//! Deterministic prompt assembly from retrieved context and history.
//!
//! [`ContextAssembler::assemble`] always emits, in this order:
//!
//! 1. the system directive (caller-supplied or [`DEFAULT_SYSTEM_PROMPT`]),
//! 2. each retrieved chunk, in retrieval rank order,
//! 3. the conversation history, oldest first, exactly as supplied,
//! 4. the current user message.
//!
//! History is never truncated here. Callers that want to bound prompt
//! growth must trim the history before calling.

use serde::Serialize;

use crate::models::{ConversationTurn, RetrievalResult, Role};

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful AI assistant with access to relevant \
context from a knowledge base. Use the provided context to answer questions accurately. Maintain \
conversation context and provide natural, conversational responses. If the context doesn't \
contain enough information, say so and provide the best answer you can based on your general \
knowledge.";

const CONTEXT_HEADER: &str = "Relevant Context from Knowledge Base:";
const HISTORY_HEADER: &str = "Previous Conversation:";

#[derive(Debug, Clone, PartialEq)]
pub enum PromptPart {
    System(String),
    Context {
        /// 1-based retrieval rank.
        rank: usize,
        chunk_id: u64,
        content: String,
    },
    Turn(ConversationTurn),
    UserMessage(String),
}

/// A role-tagged message for chat-completion style providers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}

/// Ordered prompt ready to hand to a [`GenerativeProvider`](crate::generation::GenerativeProvider).
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledPrompt {
    parts: Vec<PromptPart>,
}

impl AssembledPrompt {
    pub fn parts(&self) -> &[PromptPart] {
        &self.parts
    }

    pub fn system(&self) -> &str {
        self.parts
            .iter()
            .find_map(|p| match p {
                PromptPart::System(s) => Some(s.as_str()),
                _ => None,
            })
            .unwrap_or(DEFAULT_SYSTEM_PROMPT)
    }

    pub fn context_count(&self) -> usize {
        self.parts
            .iter()
            .filter(|p| matches!(p, PromptPart::Context { .. }))
            .count()
    }

    fn turn_count(&self) -> usize {
        self.parts
            .iter()
            .filter(|p| matches!(p, PromptPart::Turn(_)))
            .count()
    }

    fn context_block(&self) -> Option<String> {
        let blocks: Vec<String> = self
            .parts
            .iter()
            .filter_map(|p| match p {
                PromptPart::Context { rank, content, .. } => {
                    Some(format!("[Context {}] {}", rank, content))
                }
                _ => None,
            })
            .collect();
        if blocks.is_empty() {
            None
        } else {
            Some(blocks.join("\n\n"))
        }
    }

    /// Render the prompt as one text block for text-completion providers.
    pub fn render_text(&self) -> String {
        let has_history = self.turn_count() > 0;
        let has_context = self.context_count() > 0;
        let mut sections: Vec<String> = Vec::new();
        let mut history_lines: Vec<String> = Vec::new();

        for part in &self.parts {
            match part {
                PromptPart::System(s) => sections.push(s.clone()),
                PromptPart::Context { .. } => {}
                PromptPart::Turn(turn) => {
                    let speaker = match turn.role {
                        Role::User => "User",
                        Role::Assistant => "Assistant",
                    };
                    history_lines.push(format!("{}: {}", speaker, turn.content));
                }
                PromptPart::UserMessage(msg) => {
                    if let Some(block) = self.context_block() {
                        sections.push(format!("{}\n{}", CONTEXT_HEADER, block));
                    }
                    if !history_lines.is_empty() {
                        sections.push(format!("{}\n{}", HISTORY_HEADER, history_lines.join("\n")));
                    }
                    let label = if has_history {
                        "Current User Question"
                    } else {
                        "User Question"
                    };
                    sections.push(format!("{}: {}", label, msg));
                }
            }
        }

        let closing = match (has_context, has_history) {
            (true, true) => "Please provide a helpful and accurate response based on the context \
                and conversation history above. Maintain conversational flow."
                .to_string(),
            (true, false) => {
                "Please provide a helpful and accurate response based on the context above."
                    .to_string()
            }
            (false, true) => "Note: No relevant context was found in the knowledge base. Please \
                provide a helpful response based on your general knowledge and the conversation \
                history."
                .to_string(),
            (false, false) => "Note: No relevant context was found in the knowledge base. Please \
                provide a helpful response based on your general knowledge."
                .to_string(),
        };
        sections.push(closing);

        sections.join("\n\n")
    }

    /// Render the prompt as role-tagged messages.
    ///
    /// The system message carries the directive followed by the context
    /// block; history turns and the user message follow in order.
    pub fn to_messages(&self) -> Vec<ChatMessage> {
        let mut system = self.system().to_string();
        if let Some(block) = self.context_block() {
            system.push_str("\n\n");
            system.push_str(CONTEXT_HEADER);
            system.push('\n');
            system.push_str(&block);
        }

        let mut messages = vec![ChatMessage {
            role: "system",
            content: system,
        }];
        for part in &self.parts {
            match part {
                PromptPart::Turn(turn) => messages.push(ChatMessage {
                    role: turn.role.as_str(),
                    content: turn.content.clone(),
                }),
                PromptPart::UserMessage(msg) => messages.push(ChatMessage {
                    role: "user",
                    content: msg.clone(),
                }),
                PromptPart::System(_) | PromptPart::Context { .. } => {}
            }
        }
        messages
    }
}

#[derive(Debug, Clone, Default)]
pub struct ContextAssembler {
    default_system_prompt: Option<String>,
}

impl ContextAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace [`DEFAULT_SYSTEM_PROMPT`] for calls that supply none.
    pub fn with_default_system_prompt(mut self, prompt: Option<String>) -> Self {
        self.default_system_prompt = prompt.filter(|p| !p.trim().is_empty());
        self
    }

    pub fn assemble(
        &self,
        system_prompt: Option<&str>,
        chunks: &[RetrievalResult],
        history: &[ConversationTurn],
        user_message: &str,
    ) -> AssembledPrompt {
        let system = system_prompt
            .filter(|s| !s.trim().is_empty())
            .or(self.default_system_prompt.as_deref())
            .unwrap_or(DEFAULT_SYSTEM_PROMPT);

        let mut parts = Vec::with_capacity(chunks.len() + history.len() + 2);
        parts.push(PromptPart::System(system.to_string()));
        parts.extend(chunks.iter().enumerate().map(|(i, c)| PromptPart::Context {
            rank: i + 1,
            chunk_id: c.chunk_id,
            content: c.content.clone(),
        }));
        parts.extend(history.iter().cloned().map(PromptPart::Turn));
        parts.push(PromptPart::UserMessage(user_message.to_string()));

        AssembledPrompt { parts }
    }
}
