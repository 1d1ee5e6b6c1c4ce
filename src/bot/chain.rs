//! Conversational RAG chain: rewrite → retrieve → answer.

use std::sync::Arc;

use serde::Serialize;

use super::prompts;
use crate::core::config::{LlmSettings, RetrievalSettings};
use crate::core::errors::ApiError;
use crate::history::{ChatHistory, Turn};
use crate::llm::types::{ChatMessage, ChatRequest};
use crate::llm::LlmProvider;
use crate::rag::{ChunkSearchResult, ContextBuilderConfig, RAGContextBuilder, RagStore, SourceRef};

#[derive(Debug, Clone, Serialize)]
pub struct RagAnswer {
    pub answer: String,
    /// The question actually used for retrieval.
    pub standalone_question: String,
    pub sources: Vec<SourceRef>,
}

/// Immutable once built; conversation state is passed in per call.
pub struct QaChatBot {
    provider: Arc<dyn LlmProvider>,
    store: Arc<dyn RagStore>,
    llm: LlmSettings,
    retrieval: RetrievalSettings,
    context_builder: RAGContextBuilder,
}

impl QaChatBot {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        store: Arc<dyn RagStore>,
        llm: LlmSettings,
        retrieval: RetrievalSettings,
    ) -> Self {
        let context_builder = RAGContextBuilder::new(ContextBuilderConfig {
            max_context_length: retrieval.max_context_chars,
        });
        Self {
            provider,
            store,
            llm,
            retrieval,
            context_builder,
        }
    }

    pub fn provider(&self) -> &Arc<dyn LlmProvider> {
        &self.provider
    }

    pub fn store(&self) -> &Arc<dyn RagStore> {
        &self.store
    }

    pub fn llm_settings(&self) -> &LlmSettings {
        &self.llm
    }

    pub fn retrieval_settings(&self) -> &RetrievalSettings {
        &self.retrieval
    }

    /// Rewrites a follow-up into a question that stands on its own.
    /// Without history the question is already standalone and no model call is made.
    pub async fn contextualize_question(
        &self,
        history: &[Turn],
        question: &str,
    ) -> Result<String, ApiError> {
        if history.is_empty() {
            return Ok(question.to_string());
        }

        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(prompts::contextualize_system_message());
        messages.extend(history.iter().map(Turn::to_chat_message));
        messages.push(ChatMessage::user(question));

        let rewritten = self.complete(messages).await?;
        let rewritten = rewritten.trim();
        if rewritten.is_empty() {
            tracing::warn!("Query rewrite came back empty, using the original question");
            return Ok(question.to_string());
        }
        Ok(rewritten.to_string())
    }

    pub async fn retrieve(&self, query: &str) -> Result<Vec<ChunkSearchResult>, ApiError> {
        if self.retrieval.top_k == 0 {
            return Ok(Vec::new());
        }

        let embedding = self
            .provider
            .embed(&[query.to_string()], &self.llm.embedding_model)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ApiError::Upstream("embedding response was empty".to_string()))?;

        self.store.search(&embedding, self.retrieval.top_k).await
    }

    /// Answers `question` from the retrieved passages and a window of recent turns.
    pub async fn answer(
        &self,
        window: &[Turn],
        question: &str,
        results: &[ChunkSearchResult],
    ) -> Result<String, ApiError> {
        let context = self.context_builder.build_context(results);

        let mut messages = Vec::with_capacity(window.len() + 2);
        messages.push(prompts::qa_system_message(&context));
        messages.extend(window.iter().map(Turn::to_chat_message));
        messages.push(ChatMessage::user(question));

        self.complete(messages).await
    }

    /// One conversational turn. The history is only updated when the turn succeeds.
    pub async fn ask(
        &self,
        history: &mut ChatHistory,
        session_id: &str,
        question: &str,
    ) -> Result<RagAnswer, ApiError> {
        if question.trim().is_empty() {
            return Err(ApiError::BadRequest("Question must not be empty".to_string()));
        }

        let turns = history.messages(session_id);
        let standalone_question = self.contextualize_question(turns, question).await?;
        tracing::debug!(session_id, %standalone_question, "Contextualized question");

        let results = self.retrieve(&standalone_question).await?;
        let sources = self.context_builder.sources(&results);
        let cited: Vec<String> = sources.iter().map(ToString::to_string).collect();
        tracing::info!("Retrieved {} passages from [{}]", results.len(), cited.join(", "));

        let window = history.recent(session_id, self.retrieval.history_window);
        let answer = self.answer(window, question, &results).await?;

        history.add_user_message(session_id, question);
        history.add_ai_message(session_id, answer.clone());

        Ok(RagAnswer {
            answer,
            standalone_question,
            sources,
        })
    }

    async fn complete(&self, messages: Vec<ChatMessage>) -> Result<String, ApiError> {
        let request = ChatRequest::new(messages)
            .with_temperature(self.llm.temperature)
            .with_max_tokens(self.llm.max_tokens);
        self.provider.chat(request, &self.llm.chat_model).await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::llm::mock::MockProvider;
    use crate::rag::{SqliteRagStore, StoredChunk};

    pub(crate) const VOCAB: &[&str] = &["engine", "oil", "warranty", "refund", "battery"];

    pub(crate) const PASSAGES: &[(&str, &str)] = &[
        ("Change the engine oil every year.", "manual.pdf"),
        ("Warranty refund requests take ten days.", "policy.pdf"),
        ("The battery lasts five years.", "manual.pdf"),
    ];

    pub(crate) async fn build_store(
        dir: &std::path::Path,
        provider: &MockProvider,
    ) -> Arc<dyn RagStore> {
        let store = SqliteRagStore::create(dir).await.unwrap();
        let items = PASSAGES
            .iter()
            .enumerate()
            .map(|(i, (text, source))| {
                (
                    StoredChunk {
                        chunk_id: format!("chunk-{}", i),
                        content: text.to_string(),
                        source: source.to_string(),
                        page: Some(i as u32),
                        chunk_index: 0,
                        metadata: None,
                    },
                    provider.embed_text(text),
                )
            })
            .collect();
        store
            .replace_all("mock-embed", VOCAB.len() + 1, items)
            .await
            .unwrap();
        Arc::new(store)
    }

    pub(crate) fn bot_with(
        provider: Arc<MockProvider>,
        store: Arc<dyn RagStore>,
        top_k: usize,
    ) -> QaChatBot {
        let llm = LlmSettings {
            embedding_model: "mock-embed".to_string(),
            ..Default::default()
        };
        let retrieval = RetrievalSettings {
            top_k,
            ..Default::default()
        };
        QaChatBot::new(provider, store, llm, retrieval)
    }

    #[tokio::test]
    async fn first_turn_skips_rewrite_and_answers_from_context() {
        let tmp = tempfile::tempdir().unwrap();
        let provider = Arc::new(MockProvider::new(VOCAB).with_replies(&["Once a year."]));
        let store = build_store(tmp.path(), &provider).await;
        let bot = bot_with(provider.clone(), store, 1);
        let mut history = ChatHistory::new();

        let answer = bot
            .ask(&mut history, "newsession", "How often do I change the engine oil?")
            .await
            .unwrap();

        assert_eq!(answer.answer, "Once a year.");
        assert_eq!(answer.standalone_question, "How often do I change the engine oil?");
        assert_eq!(answer.sources.len(), 1);
        assert_eq!(answer.sources[0].source, "manual.pdf");

        let requests = provider.chat_requests();
        assert_eq!(requests.len(), 1);
        let system = &requests[0].messages[0];
        assert_eq!(system.role, "system");
        assert!(system.content.ends_with("Change the engine oil every year."));
        assert_eq!(requests[0].temperature, Some(0.0));

        let turns = history.messages("newsession");
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[1].content, "Once a year.");
    }

    #[tokio::test]
    async fn follow_up_is_rewritten_before_retrieval() {
        let tmp = tempfile::tempdir().unwrap();
        let provider = Arc::new(
            MockProvider::new(VOCAB)
                .with_replies(&["How long does a warranty refund take?", "About ten days."]),
        );
        let store = build_store(tmp.path(), &provider).await;
        let bot = bot_with(provider.clone(), store, 1);

        let mut history = ChatHistory::new();
        history.add_user_message("newsession", "Do you handle warranty claims?");
        history.add_ai_message("newsession", "Yes, send the card.");

        let answer = bot
            .ask(&mut history, "newsession", "And how long does it take?")
            .await
            .unwrap();

        assert_eq!(answer.standalone_question, "How long does a warranty refund take?");
        assert_eq!(answer.sources[0].source, "policy.pdf");

        let requests = provider.chat_requests();
        assert_eq!(requests.len(), 2);
        let rewrite = &requests[0].messages;
        assert_eq!(rewrite.len(), 4);
        assert_eq!(rewrite[0].content, prompts::CONTEXTUALIZE_SYSTEM_PROMPT);
        assert_eq!(rewrite[1], ChatMessage::user("Do you handle warranty claims?"));
        assert_eq!(rewrite[3], ChatMessage::user("And how long does it take?"));

        let qa = &requests[1].messages;
        assert!(qa[0].content.contains("Warranty refund requests take ten days."));
        assert_eq!(qa.last().unwrap(), &ChatMessage::user("And how long does it take?"));

        assert_eq!(history.messages("newsession").len(), 4);
    }

    #[tokio::test]
    async fn answer_prompt_sees_only_the_history_window() {
        let tmp = tempfile::tempdir().unwrap();
        let provider = Arc::new(MockProvider::new(VOCAB).with_replies(&["standalone", "answer"]));
        let store = build_store(tmp.path(), &provider).await;
        let bot = bot_with(provider.clone(), store, 2);

        let mut history = ChatHistory::new();
        for i in 0..4 {
            history.add_user_message("newsession", format!("question {}", i));
            history.add_ai_message("newsession", format!("answer {}", i));
        }

        bot.ask(&mut history, "newsession", "next").await.unwrap();

        let requests = provider.chat_requests();
        // rewrite sees all 8 turns, the answer only the last 5
        assert_eq!(requests[0].messages.len(), 10);
        assert_eq!(requests[1].messages.len(), 7);
        assert_eq!(requests[1].messages[1], ChatMessage::assistant("answer 1"));
    }

    #[tokio::test]
    async fn failed_turn_leaves_history_untouched() {
        let tmp = tempfile::tempdir().unwrap();
        let provider = Arc::new(MockProvider::new(VOCAB).failing_chat());
        let store = build_store(tmp.path(), &provider).await;
        let bot = bot_with(provider, store, 4);
        let mut history = ChatHistory::new();

        let err = bot.ask(&mut history, "newsession", "engine?").await.unwrap_err();

        assert!(matches!(err, ApiError::Upstream(_)));
        assert!(history.messages("newsession").is_empty());
    }

    #[tokio::test]
    async fn blank_question_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let provider = Arc::new(MockProvider::new(VOCAB));
        let store = build_store(tmp.path(), &provider).await;
        let bot = bot_with(provider.clone(), store, 4);

        let err = bot.ask(&mut ChatHistory::new(), "s", "   ").await.unwrap_err();

        assert!(matches!(err, ApiError::BadRequest(_)));
        assert!(provider.chat_requests().is_empty());
    }

    #[tokio::test]
    async fn sessions_do_not_share_history() {
        let tmp = tempfile::tempdir().unwrap();
        let provider = Arc::new(MockProvider::new(VOCAB));
        let store = build_store(tmp.path(), &provider).await;
        let bot = bot_with(provider.clone(), store, 1);

        let mut history = ChatHistory::new();
        history.add_user_message("other", "battery?");
        history.add_ai_message("other", "five years");

        bot.ask(&mut history, "newsession", "engine oil?").await.unwrap();

        // no history in this session, so no rewrite call
        assert_eq!(provider.chat_requests().len(), 1);
        assert_eq!(history.messages("other").len(), 2);
        assert_eq!(history.messages("newsession").len(), 2);
    }
}
