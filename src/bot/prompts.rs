//! System prompts for the two model calls of a turn.

use crate::llm::types::ChatMessage;

pub const CONTEXTUALIZE_SYSTEM_PROMPT: &str = "Given a chat history and the latest user question \
which might reference context in the chat history, formulate a standalone question \
which can be understood without the chat history. Do NOT answer the question, \
just reformulate it if needed and otherwise return it as is.";

pub const QA_SYSTEM_PROMPT: &str = "Use the following pieces of context to answer the user \
questions. If you don't know the answer, just say that you don't know, \
don't try to make up an answer.
Try to be descriptive and provide as much instructions as possible to guide the user
{context}";

/// Fills the `{context}` slot of the answer prompt.
pub fn qa_system_message(context: &str) -> ChatMessage {
    ChatMessage::system(QA_SYSTEM_PROMPT.replace("{context}", context))
}

pub fn contextualize_system_message() -> ChatMessage {
    ChatMessage::system(CONTEXTUALIZE_SYSTEM_PROMPT)
}
