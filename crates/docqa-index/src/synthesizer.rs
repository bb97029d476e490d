use std::sync::Arc;

use docqa_llm::{AnyProvider, LlmProvider, Message};

use crate::error::RagError;

/// Context substituted when retrieval returned nothing.
pub const NO_CONTEXT: &str = "No relevant context found.";

/// Reply the model is told to give when the context lacks the answer.
pub const FALLBACK_ANSWER: &str = "I'm not sure based on the available documents.";

/// Builds the grounded prompt and asks the chat model once.
#[derive(Debug, Clone)]
pub struct AnswerSynthesizer {
    provider: Arc<AnyProvider>,
}

impl AnswerSynthesizer {
    #[must_use]
    pub fn new(provider: Arc<AnyProvider>) -> Self {
        Self { provider }
    }

    /// Render the prompt for `question` over `contexts`, in retrieval order.
    #[must_use]
    pub fn build_prompt(question: &str, contexts: &[&str]) -> String {
        let context = if contexts.is_empty() {
            NO_CONTEXT.to_owned()
        } else {
            contexts.join("\n\n")
        };
        format!(
            "You are a document assistant.\n\
             Use ONLY the following context to answer the question.\n\
             If the context doesn't contain the answer, say:\n\
             \"{FALLBACK_ANSWER}\"\n\
             \n\
             Context:\n\
             {context}\n\
             \n\
             Question:\n\
             {question}"
        )
    }

    /// Returns the model output unmodified. The model is called even with no context.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ProviderUnavailable`] if the chat call fails.
    pub async fn synthesize(&self, question: &str, contexts: &[&str]) -> Result<String, RagError> {
        let prompt = Self::build_prompt(question, contexts);
        let answer = self.provider.chat(&[Message::user(prompt)]).await?;
        Ok(answer)
    }
}
