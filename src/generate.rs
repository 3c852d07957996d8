//! Answer synthesis from retrieved context.
//!
//! [`GenerationChain`] turns a question plus context into one model call.
//! [`RagChain`] is the full query path: retrieve, then generate.

use std::sync::Arc;

use tracing::debug;

use crate::error::{GenerationFailure, RagError};
use crate::llm::GenerativeModel;
use crate::models::ContextItem;
use crate::retriever::Retriever;

/// Render the investment-advice prompt for `question` over `context`.
pub fn build_prompt(question: &str, context: &[ContextItem]) -> String {
    let texts: Vec<&str> = context.iter().map(ContextItem::text).collect();
    let body = if texts.is_empty() {
        "(no matching documents; answer from general knowledge)".to_string()
    } else {
        texts.join("\n")
    };
    format!(
        "You are a financial analyst tasked with providing investment advice.\n\
         You will be given text and tables; if none are relevant, use your general knowledge.\n\
         Use this information to provide investment advice related to the user question.\n\
         User-provided question: {}\n\n\
         Text and / or tables:\n\
         {}",
        question, body
    )
}

pub struct GenerationChain {
    model: Arc<dyn GenerativeModel>,
}

impl GenerationChain {
    pub fn new(model: Arc<dyn GenerativeModel>) -> Self {
        Self { model }
    }

    pub async fn run(
        &self,
        question: &str,
        context: &[ContextItem],
    ) -> Result<String, GenerationFailure> {
        let prompt = build_prompt(question, context);
        debug!(model = self.model.model_name(), context = context.len(), "generating answer");
        let output = self.model.generate(&prompt).await.map_err(GenerationFailure)?;
        Ok(output.trim().to_string())
    }
}

/// Retriever and generation chain bound together; the memoized unit the
/// pipeline hands out once it is ready.
pub struct RagChain {
    retriever: Retriever,
    generation: GenerationChain,
}

impl RagChain {
    pub fn new(retriever: Retriever, generation: GenerationChain) -> Self {
        Self {
            retriever,
            generation,
        }
    }

    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    pub async fn invoke(&self, query: &str) -> Result<String, RagError> {
        let context = self
            .retriever
            .retrieve(query)
            .await
            .map_err(RagError::Retrieval)?;
        self.generation
            .run(query, &context)
            .await
            .map_err(RagError::Generation)
    }
}
